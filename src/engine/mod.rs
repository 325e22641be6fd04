//! Adversarial kernel estimation driven end-to-end.
//!
//! [`KernelEstimator`] turns one image into an [`EstimationReport`]:
//!
//! 1. prepare the input (shave synthetic borders, trim to multiples of the
//!    scale factor) and build the gradient-weighted [`CropSampler`];
//! 2. run `max_iters` calls of [`train_step`] on a fresh [`TrainingState`],
//!    reporting to an [`Observer`] and emitting checkpoints to a
//!    [`CheckpointSink`];
//! 3. extract and post-process the kernel of the final Generator weights.
//!
//! ```no_run
//! use kernel_estimator::prelude::*;
//!
//! # fn example(image: ImageF32) -> kernel_estimator::Result<()> {
//! let estimator = KernelEstimator::new(EstimatorConfig::default(), ComputeContext::cpu())?;
//! let report = estimator.estimate(&image, &mut LogObserver::default(), &mut NoCheckpoints)?;
//! println!("kernel side {}", report.kernels.base.size());
//! # Ok(())
//! # }
//! ```
pub mod checkpoint;
pub mod observer;
pub mod schedule;
mod state;
mod step;

pub use checkpoint::{CheckpointSink, FileCheckpointSink, NoCheckpoints};
pub use observer::{LogObserver, NullObserver, Observer};
pub use schedule::{Schedule, ScheduleEvent};
pub use state::TrainingState;
pub use step::{train_step, StepOutcome};

use crate::config::EstimatorConfig;
use crate::context::ComputeContext;
use crate::diagnostics::{TimingBreakdown, TrainingRecord};
use crate::error::Result;
use crate::image::ImageF32;
use crate::kernel::{EstimatedKernels, PostProcessOptions};
use crate::sampling::{prepare_input, CropSampler};
use std::time::Instant;

/// Result handed to the downstream super-resolution stage.
#[derive(Clone, Debug)]
pub struct EstimationReport {
    pub kernels: EstimatedKernels,
    pub record: TrainingRecord,
    pub timings: TimingBreakdown,
}

#[derive(Clone, Debug)]
pub struct KernelEstimator {
    config: EstimatorConfig,
    ctx: ComputeContext,
}

impl KernelEstimator {
    /// Validate `config` and bind it to a compute context.
    pub fn new(config: EstimatorConfig, ctx: ComputeContext) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, ctx })
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn post_process_options(&self) -> PostProcessOptions {
        PostProcessOptions {
            n_filtering: self.config.n_filtering,
            scale_factor: self.config.scale_factor,
            compose_larger: self.config.compose_larger,
        }
    }

    /// Prepare `image` and build the sampler and the initial training state.
    pub fn initial_state(&self, image: &ImageF32) -> Result<TrainingState> {
        let c = &self.config;
        let prepared = prepare_input(image, c.scale_factor, c.real_image);
        let sampler = CropSampler::new(
            prepared,
            c.scale_factor,
            c.input_crop_size,
            c.generator_output_size(),
        )?;
        Ok(TrainingState::new(c, &self.ctx, sampler))
    }

    /// Estimate the downscaling kernel of `image`.
    pub fn estimate(
        &self,
        image: &ImageF32,
        observer: &mut dyn Observer,
        sink: &mut dyn CheckpointSink,
    ) -> Result<EstimationReport> {
        let total_start = Instant::now();
        let mut timings = TimingBreakdown::default();
        let options = self.post_process_options();

        let prep_start = Instant::now();
        let mut state = self.initial_state(image)?;
        timings.push_since("prepare", prep_start);

        observer.on_start(&self.config);
        let train_start = Instant::now();
        let mut checkpoint_ms = 0.0;
        while state.iteration < self.config.max_iters {
            let outcome = train_step(&mut state)?;
            let iteration = outcome.losses.iteration;
            for event in &outcome.events {
                observer.on_schedule(iteration, event);
            }
            let flow = observer.on_iteration(&outcome.losses);

            let done = state.iteration;
            let due = self
                .config
                .checkpoint_every
                .is_some_and(|every| done % every == 0 && done < self.config.max_iters);
            if due {
                let start = Instant::now();
                let kernels = state.current_kernels(&options)?;
                sink.on_checkpoint(done, &kernels)?;
                observer.on_checkpoint(done, &kernels);
                checkpoint_ms += crate::diagnostics::elapsed_ms(start);
            }
            if flow.is_break() {
                break;
            }
        }
        timings.push_since("training", train_start);
        if checkpoint_ms > 0.0 {
            timings.push("checkpoints", checkpoint_ms);
        }

        let post_start = Instant::now();
        let kernels = state.current_kernels(&options)?;
        timings.push_since("post_process", post_start);
        timings.total_ms = crate::diagnostics::elapsed_ms(total_start);

        let report = EstimationReport {
            kernels,
            record: std::mem::take(&mut state.record),
            timings,
        };
        observer.on_finish(&report);
        Ok(report)
    }
}
