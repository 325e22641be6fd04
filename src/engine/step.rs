//! One alternating optimisation iteration.
//!
//! The Generator step completes (including its Adam update) before the
//! Discriminator step starts. Gradients the Generator step leaves in the
//! Discriminator are discarded by the Discriminator's own `zero_grad`.
//!
//! With `abort_on_non_finite` a network whose loss is not finite keeps its
//! weights; the iteration is still recorded before the error is returned.
use super::schedule::ScheduleEvent;
use super::state::TrainingState;
use crate::diagnostics::IterationLosses;
use crate::error::{EstimatorError, Result};
use crate::image::ImageF32;
use crate::kernel::extract_kernel_traced;
use crate::loss::{adversarial_loss, ConstraintValues, Label};
use crate::nn::Trainable;
use crate::sampling::{add_noise, CropPair, CROP_NOISE_STD};
use ndarray::Array2;

/// Losses of the iteration plus whatever the schedule changed after it.
#[derive(Clone, Debug)]
pub struct StepOutcome {
    pub losses: IterationLosses,
    pub events: Vec<ScheduleEvent>,
}

struct GeneratorLosses {
    total: f64,
    adversarial: f32,
    constraints: ConstraintValues,
}

/// Sample a crop pair, update the Generator, then the Discriminator, record
/// the losses and apply the schedule.
pub fn train_step(state: &mut TrainingState) -> Result<StepOutcome> {
    let iteration = state.iteration;
    let pair = state.sampler.sample(&mut state.rng);

    let g = generator_step(state, &pair.generator)?;
    let (discriminator_real, discriminator_fake) = discriminator_step(state, &pair);

    let losses = IterationLosses {
        iteration,
        generator_total: g.total,
        adversarial: g.adversarial,
        discriminator_real,
        discriminator_fake,
        constraints: g.constraints,
    };
    state.record.push(losses);
    if state.abort_on_non_finite {
        if let Some(term) = losses.non_finite_term() {
            return Err(EstimatorError::NonFiniteLoss { iteration, term });
        }
    }

    let events = state.schedule.update(
        iteration,
        losses.bicubic(),
        &mut state.coefficients,
        &mut state.g_optim,
        &mut state.d_optim,
    );
    state.iteration += 1;
    Ok(StepOutcome { losses, events })
}

fn generator_step(state: &mut TrainingState, g_input: &ImageF32) -> Result<GeneratorLosses> {
    state.generator.zero_grad();
    let input = Array2::from(g_input);
    let (g_output, g_trace) = state.generator.forward(input.view());

    let (logits, d_trace) = state.discriminator.forward(g_output.view());
    let (adversarial, grad_logits) = adversarial_loss(logits.view(), Label::Real);
    let mut grad_output = state.discriminator.backward(&d_trace, grad_logits.view());

    let (kernel, extraction) = extract_kernel_traced(&state.generator);
    let (mut constraints, kernel_grad) = state.constraints.evaluate(&kernel, &state.coefficients);
    let (bicubic, bicubic_grad) = state.bicubic.evaluate(g_input, g_output.view())?;
    constraints.bicubic = bicubic;
    let total = adversarial as f64 + constraints.weighted(&state.coefficients);

    let finite = adversarial.is_finite()
        && total.is_finite()
        && constraints.non_finite_term().is_none();
    if finite || !state.abort_on_non_finite {
        grad_output.scaled_add(state.coefficients.bicubic, &bicubic_grad);
        state.generator.backward(&g_trace, grad_output.view());
        extraction.backward(&mut state.generator, &kernel_grad);
        state.g_optim.step(state.generator.parameters_mut());
    }

    Ok(GeneratorLosses {
        total,
        adversarial,
        constraints,
    })
}

/// Returns the real and fake losses; the optimised loss is their mean.
fn discriminator_step(state: &mut TrainingState, pair: &CropPair) -> (f32, f32) {
    state.discriminator.zero_grad();

    let real = Array2::from(&pair.discriminator);
    let (real_logits, real_trace) = state.discriminator.forward(real.view());
    let (real_loss, mut real_grad) = adversarial_loss(real_logits.view(), Label::Real);
    real_grad.mapv_inplace(|g| 0.5 * g);
    state.discriminator.backward(&real_trace, real_grad.view());

    // Detached: the Generator sees no gradient from this pass.
    let g_input = Array2::from(&pair.generator);
    let (g_output, _) = state.generator.forward(g_input.view());
    let mut fake = ImageF32::from(g_output);
    add_noise(&mut fake, CROP_NOISE_STD, &mut state.rng);
    let fake = Array2::from(&fake);
    let (fake_logits, fake_trace) = state.discriminator.forward(fake.view());
    let (fake_loss, mut fake_grad) = adversarial_loss(fake_logits.view(), Label::Fake);
    fake_grad.mapv_inplace(|g| 0.5 * g);
    state.discriminator.backward(&fake_trace, fake_grad.view());

    let finite = real_loss.is_finite() && fake_loss.is_finite();
    if finite || !state.abort_on_non_finite {
        state.d_optim.step(state.discriminator.parameters_mut());
    }
    (real_loss, fake_loss)
}
