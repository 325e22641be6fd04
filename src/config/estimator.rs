use crate::context::Device;
use crate::error::{EstimatorError, Result};
use serde::{Deserialize, Serialize};

/// Generator layout: kernel sizes of the linear convolution stack.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorOptions {
    pub structure: Vec<usize>,
    /// Hidden feature maps between layers.
    pub channels: usize,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            structure: vec![7, 5, 3, 1, 1, 1],
            channels: 64,
        }
    }
}

impl GeneratorOptions {
    /// Pixels lost by the stride-1 part of the stack.
    pub fn shave(&self) -> usize {
        self.structure.iter().map(|k| k.saturating_sub(1)).sum()
    }

    /// Side of the single kernel the stack is equivalent to.
    pub fn equivalent_kernel_size(&self) -> usize {
        1 + self.shave()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscriminatorOptions {
    pub channels: usize,
    /// Side of the first (and only spatial) convolution.
    pub kernel_size: usize,
    pub n_layers: usize,
}

impl Default for DiscriminatorOptions {
    fn default() -> Self {
        Self {
            channels: 64,
            kernel_size: 7,
            n_layers: 7,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimOptions {
    pub g_lr: f32,
    pub d_lr: f32,
    pub beta1: f32,
}

impl Default for OptimOptions {
    fn default() -> Self {
        Self {
            g_lr: 2e-4,
            d_lr: 2e-4,
            beta1: 0.5,
        }
    }
}

/// Weights of the constraint terms added to the Generator loss.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LossCoefficients {
    pub bicubic: f32,
    pub sum2one: f32,
    pub boundaries: f32,
    pub centralized: f32,
    pub sparse: f32,
}

impl Default for LossCoefficients {
    fn default() -> Self {
        Self {
            bicubic: 5.0,
            sum2one: 0.5,
            boundaries: 0.5,
            centralized: 0.0,
            sparse: 0.0,
        }
    }
}

/// Deterministic learning-rate and coefficient schedule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleOptions {
    pub enabled: bool,
    /// Both learning rates are divided by `lr_decay` every this many
    /// iterations.
    pub lr_update_every: usize,
    pub lr_decay: f32,
    /// Bicubic loss under which the Generator counts as bicubic-like.
    pub bicubic_threshold: f32,
    /// Consecutive low-loss checks required before decaying λ_bicubic.
    pub bicubic_patience: usize,
    pub lambda_update_every: usize,
    pub bicubic_decay: f32,
    pub bicubic_min: f32,
    /// λ_bicubic below which the centralized and sparse terms switch on.
    pub insert_constraints_below: f32,
    pub centralized_end: f32,
    /// Weight of the summed square-root sparsity term once inserted.
    pub sparse_end: f32,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            lr_update_every: 750,
            lr_decay: 10.0,
            bicubic_threshold: 0.4,
            bicubic_patience: 2,
            lambda_update_every: 200,
            bicubic_decay: 100.0,
            bicubic_min: 5e-6,
            insert_constraints_below: 5e-3,
            centralized_end: 1.0,
            sparse_end: 0.1,
        }
    }
}

/// Everything the estimator needs besides the image itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    pub kernel_size: usize,
    pub scale_factor: usize,
    /// Side of the square crop fed to the Generator.
    pub input_crop_size: usize,
    pub max_iters: usize,
    /// Emit a post-processed kernel every this many iterations.
    pub checkpoint_every: Option<usize>,
    /// Number of significant kernel values kept by thresholding.
    pub n_filtering: usize,
    /// Also produce the kernel for `scale_factor²` by analytic composition.
    pub compose_larger: bool,
    /// Real photographs keep their border; synthetic inputs are shaved.
    pub real_image: bool,
    pub seed: u64,
    pub abort_on_non_finite: bool,
    pub device: Device,
    pub generator: GeneratorOptions,
    pub discriminator: DiscriminatorOptions,
    pub optim: OptimOptions,
    pub coefficients: LossCoefficients,
    pub schedule: ScheduleOptions,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            kernel_size: 13,
            scale_factor: 2,
            input_crop_size: 64,
            max_iters: 3000,
            checkpoint_every: None,
            n_filtering: 40,
            compose_larger: false,
            real_image: false,
            seed: 0,
            abort_on_non_finite: true,
            device: Device::Cpu,
            generator: GeneratorOptions::default(),
            discriminator: DiscriminatorOptions::default(),
            optim: OptimOptions::default(),
            coefficients: LossCoefficients::default(),
            schedule: ScheduleOptions::default(),
        }
    }
}

impl EstimatorConfig {
    /// Side of the Generator output for the configured crop.
    pub fn generator_output_size(&self) -> usize {
        let valid = self
            .input_crop_size
            .saturating_sub(self.generator.shave());
        if valid == 0 {
            0
        } else {
            (valid - 1) / self.scale_factor.max(1) + 1
        }
    }

    /// Side of the Discriminator's logit map for a Generator-sized input.
    pub fn discriminator_output_size(&self) -> usize {
        self.generator_output_size()
            .saturating_sub(self.discriminator.kernel_size.saturating_sub(1))
    }

    /// Check that every size and count fits together.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(EstimatorError::InvalidConfig(msg));
        let mismatch = |msg: String| Err(EstimatorError::ShapeMismatch(msg));

        if self.scale_factor < 1 {
            return invalid("scale_factor must be at least 1".into());
        }
        if self.kernel_size < 1 {
            return invalid("kernel_size must be at least 1".into());
        }
        if self.generator.structure.is_empty() || self.generator.structure.contains(&0) {
            return invalid(format!(
                "generator structure {:?} must list non-zero kernel sizes",
                self.generator.structure
            ));
        }
        if self.generator.channels == 0 || self.discriminator.channels == 0 {
            return invalid("network channel counts must be non-zero".into());
        }
        if self.discriminator.n_layers < 2 || self.discriminator.kernel_size == 0 {
            return invalid(format!(
                "discriminator needs at least 2 layers and a non-zero kernel (got {} layers, kernel {})",
                self.discriminator.n_layers, self.discriminator.kernel_size
            ));
        }
        if self.n_filtering >= self.kernel_size * self.kernel_size {
            return invalid(format!(
                "n_filtering {} must be smaller than the {} kernel entries",
                self.n_filtering,
                self.kernel_size * self.kernel_size
            ));
        }
        if self.max_iters == 0 {
            return invalid("max_iters must be positive".into());
        }
        if self.checkpoint_every == Some(0) {
            return invalid("checkpoint_every must be positive when set".into());
        }
        if self.optim.g_lr <= 0.0 || self.optim.d_lr <= 0.0 {
            return invalid("learning rates must be positive".into());
        }
        if !(0.0..1.0).contains(&self.optim.beta1) {
            return invalid(format!("beta1 {} must lie in [0, 1)", self.optim.beta1));
        }

        let equivalent = self.generator.equivalent_kernel_size();
        if equivalent != self.kernel_size {
            return mismatch(format!(
                "generator structure {:?} is equivalent to a {equivalent}x{equivalent} kernel, expected {}",
                self.generator.structure, self.kernel_size
            ));
        }
        if self.input_crop_size <= self.generator.shave() {
            return mismatch(format!(
                "input crop {} does not survive the generator shave {}",
                self.input_crop_size,
                self.generator.shave()
            ));
        }
        if self.discriminator_output_size() == 0 {
            return mismatch(format!(
                "generator output {} is smaller than the discriminator kernel {}",
                self.generator_output_size(),
                self.discriminator.kernel_size
            ));
        }
        Ok(())
    }
}
