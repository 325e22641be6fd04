use super::schedule::Schedule;
use crate::config::{EstimatorConfig, LossCoefficients};
use crate::context::ComputeContext;
use crate::diagnostics::TrainingRecord;
use crate::discriminator::Discriminator;
use crate::error::Result;
use crate::generator::Generator;
use crate::kernel::{extract_kernel, post_process, EstimatedKernels, Kernel, PostProcessOptions};
use crate::loss::{BicubicConsistency, ConstraintSuite};
use crate::nn::Adam;
use crate::sampling::CropSampler;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Everything one estimation run mutates, advanced by
/// [`train_step`](super::train_step).
///
/// The state exclusively owns both networks and their optimisers; kernels are
/// only ever read from it.
pub struct TrainingState {
    /// Number of completed iterations.
    pub iteration: usize,
    pub generator: Generator,
    pub discriminator: Discriminator,
    pub g_optim: Adam,
    pub d_optim: Adam,
    /// Current loss coefficients, moved by the schedule.
    pub coefficients: LossCoefficients,
    pub schedule: Schedule,
    pub record: TrainingRecord,
    pub(crate) sampler: CropSampler,
    pub(crate) constraints: ConstraintSuite,
    pub(crate) bicubic: BicubicConsistency,
    pub(crate) rng: StdRng,
    pub(crate) abort_on_non_finite: bool,
}

impl TrainingState {
    /// Fresh networks and optimisers seeded from `config.seed`.
    pub fn new(config: &EstimatorConfig, ctx: &ComputeContext, sampler: CropSampler) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let generator = Generator::new(ctx, config, &mut rng);
        let discriminator = Discriminator::new(ctx, config, &mut rng);
        let g_optim = Adam::new(ctx, config.optim.g_lr, config.optim.beta1);
        let d_optim = Adam::new(ctx, config.optim.d_lr, config.optim.beta1);
        Self {
            iteration: 0,
            generator,
            discriminator,
            g_optim,
            d_optim,
            coefficients: config.coefficients,
            schedule: Schedule::new(config.schedule.clone()),
            record: TrainingRecord::default(),
            sampler,
            constraints: ConstraintSuite::new(config.kernel_size, config.scale_factor),
            bicubic: BicubicConsistency::new(config.scale_factor),
            rng,
            abort_on_non_finite: config.abort_on_non_finite,
        }
    }

    /// Raw kernel of the current Generator weights.
    pub fn raw_kernel(&self) -> Kernel {
        extract_kernel(&self.generator)
    }

    /// Post-processed kernels of the current Generator weights.
    pub fn current_kernels(&self, options: &PostProcessOptions) -> Result<EstimatedKernels> {
        post_process(&self.raw_kernel(), options)
    }
}
