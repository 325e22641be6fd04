#![doc = include_str!("../README.md")]

// Public modules (stable-ish surface)
pub mod config;
pub mod context;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod image;
pub mod kernel;

// Building blocks – public for tools and tests, considered internals.
pub mod discriminator;
pub mod generator;
pub mod loss;
pub mod nn;
pub mod resample;
pub mod sampling;
pub mod synthetic;

// --- High-level re-exports -------------------------------------------------

// Main entry points: estimator + results.
pub use crate::config::{EstimatorConfig, RunConfig};
pub use crate::context::{ComputeContext, Device};
pub use crate::engine::{EstimationReport, KernelEstimator};
pub use crate::error::{EstimatorError, Result};
pub use crate::kernel::{EstimatedKernels, Kernel};

// Diagnostics returned with every estimate.
pub use crate::diagnostics::{IterationLosses, TimingBreakdown, TrainingRecord};

// --- Prelude ---------------------------------------------------------------

/// Small prelude for quick experiments.
///
/// ```no_run
/// use kernel_estimator::prelude::*;
/// use std::path::Path;
///
/// # fn main() -> kernel_estimator::Result<()> {
/// let image = load_grayscale_image(Path::new("lr.png"))?;
/// let config = EstimatorConfig {
///     max_iters: 500,
///     ..Default::default()
/// };
/// let estimator = KernelEstimator::new(config, ComputeContext::cpu())?;
/// let report = estimator.estimate(&image, &mut NullObserver, &mut NoCheckpoints)?;
/// println!("kernel sum={:.6}", report.kernels.base.sum());
/// # Ok(())
/// # }
/// ```
pub mod prelude {
    pub use crate::engine::{LogObserver, NoCheckpoints, NullObserver, Observer};
    pub use crate::image::io::load_grayscale_image;
    pub use crate::image::ImageF32;
    pub use crate::{ComputeContext, EstimatorConfig, Kernel, KernelEstimator};
}
