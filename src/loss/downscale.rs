//! Consistency with a known reference downscaling.
//!
//! Early in training the Generator is anchored to bicubic downscaling: its
//! output is compared against the Generator input downscaled with the fixed
//! bicubic filter (zero padding, stride = scale factor), shaved symmetrically
//! to the Generator's output shape.
use crate::error::{EstimatorError, Result};
use crate::image::ImageF32;
use crate::resample::bicubic_downscale;
use ndarray::{Array2, ArrayView2, Zip};

#[derive(Clone, Debug)]
pub struct BicubicConsistency {
    scale_factor: usize,
}

impl BicubicConsistency {
    pub fn new(scale_factor: usize) -> Self {
        Self {
            scale_factor: scale_factor.max(1),
        }
    }

    /// Reference downscaled crop with the shape of `output_dim`.
    pub fn reference(&self, g_input: &ImageF32, output_dim: (usize, usize)) -> Array2<f32> {
        let down = bicubic_downscale(g_input, self.scale_factor);
        let (h, w) = output_dim;
        Array2::from(&down.shave_to(w, h))
    }

    /// Mean squared difference and its gradient w.r.t. the Generator output.
    ///
    /// Fails when the downscaled input is smaller than the Generator output.
    pub fn evaluate(
        &self,
        g_input: &ImageF32,
        g_output: ArrayView2<f32>,
    ) -> Result<(f32, Array2<f32>)> {
        let reference = self.reference(g_input, g_output.dim());
        if reference.dim() != g_output.dim() {
            return Err(EstimatorError::ShapeMismatch(format!(
                "bicubic reference {:?} cannot cover generator output {:?}",
                reference.dim(),
                g_output.dim()
            )));
        }
        let n = g_output.len().max(1) as f32;
        let mut value = 0.0f32;
        let mut grad = Array2::<f32>::zeros(g_output.dim());
        Zip::from(&mut grad)
            .and(&g_output)
            .and(&reference)
            .for_each(|d, &g, &r| {
                let diff = g - r;
                value += diff * diff;
                *d = 2.0 * diff / n;
            });
        Ok((value / n, grad))
    }
}
