//! Clean-up of a raw extracted kernel before it is handed downstream.
//!
//! extract → threshold → recenter → (optionally) compose.
use super::compose::compose_kernel;
use super::shift::recenter;
use super::Kernel;
use crate::error::{EstimatorError, Result};
use serde::{Deserialize, Serialize};

/// Fraction of the (N+1)-th largest value used as the noise floor.
const FLOOR_FRACTION: f64 = 0.75;
/// Floor offset applied when the (N+1)-th and (N+2)-th values tie.
const TIE_OFFSET: f64 = 1e-6;
const CLIP_MAX: f64 = 100.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PostProcessOptions {
    pub n_filtering: usize,
    pub scale_factor: usize,
    pub compose_larger: bool,
}

/// Final (or checkpointed) kernels of one estimation.
#[derive(Clone, Debug, PartialEq)]
pub struct EstimatedKernels {
    /// Kernel for the configured scale factor.
    pub base: Kernel,
    /// Kernel for the squared scale factor, when composition is enabled.
    pub composed: Option<Kernel>,
}

/// Keep roughly the `n` dominant entries: subtract `0.75·v` where `v` is the
/// (n+1)-th largest value, clip to `[0, 100]` and renormalise.
pub fn threshold_significant(kernel: &Kernel, n: usize) -> Result<Kernel> {
    let count = kernel.values().len();
    if n >= count {
        return Err(EstimatorError::InvalidConfig(format!(
            "cannot keep {n} significant values of a {count}-entry kernel"
        )));
    }
    let mut sorted: Vec<f64> = kernel.values().iter().copied().collect();
    sorted.sort_by(|a, b| b.total_cmp(a));
    clip_and_normalise(kernel, noise_floor(&sorted, n))
}

/// `0.75·v` for the (n+1)-th largest value `v`, nudged down when it ties with
/// the (n+2)-th so a flat tail cannot clip everything away.
pub(super) fn noise_floor(sorted_desc: &[f64], n: usize) -> f64 {
    let pivot = sorted_desc[n];
    let floor = FLOOR_FRACTION * pivot;
    if sorted_desc.get(n + 1) == Some(&pivot) {
        floor - TIE_OFFSET
    } else {
        floor
    }
}

pub(super) fn clip_and_normalise(kernel: &Kernel, floor: f64) -> Result<Kernel> {
    let filtered = kernel.values().mapv(|v| (v - floor).clamp(0.0, CLIP_MAX));
    let total = filtered.sum();
    if total == 0.0 || !total.is_finite() {
        return Err(EstimatorError::DegenerateKernel(format!(
            "thresholded kernel sums to {total}"
        )));
    }
    Ok(Kernel::new(filtered / total))
}

/// Threshold, recenter and optionally compose a raw kernel.
pub fn post_process(raw: &Kernel, options: &PostProcessOptions) -> Result<EstimatedKernels> {
    let significant = threshold_significant(raw, options.n_filtering)?;
    let base = recenter(&significant, options.scale_factor)?;
    let composed = if options.compose_larger {
        Some(compose_kernel(&base, options.scale_factor)?)
    } else {
        None
    };
    Ok(EstimatedKernels { base, composed })
}
