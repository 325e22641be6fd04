use super::Kernel;
use crate::error::{EstimatorError, Result};
use ndarray::{s, Array2};

/// Kernel of two consecutive `scale_factor` downscalings with `kernel`.
///
/// Downscaling twice by `sf` with `k` equals one downscaling by `sf²` with
/// `k ∗ (k dilated by sf)`. The full result has side `s + sf·(s − 1)`; `s//2`
/// is cropped from each side and the result is renormalised.
pub fn compose_kernel(kernel: &Kernel, scale_factor: usize) -> Result<Kernel> {
    let k = kernel.values();
    let size = kernel.size();
    let sf = scale_factor.max(1);
    let big_size = size + sf * (size - 1);
    let mut big = Array2::<f64>::zeros((big_size, big_size));
    for ((r, c), &weight) in k.indexed_iter() {
        if weight == 0.0 {
            continue;
        }
        let mut window = big.slice_mut(s![sf * r..sf * r + size, sf * c..sf * c + size]);
        window.scaled_add(weight, k);
    }

    let crop = size / 2;
    let cropped = big
        .slice(s![crop..big_size - crop, crop..big_size - crop])
        .to_owned();
    let total = cropped.sum();
    if total == 0.0 || !total.is_finite() {
        return Err(EstimatorError::DegenerateKernel(format!(
            "composed kernel sums to {total}"
        )));
    }
    Ok(Kernel::new(cropped / total))
}
