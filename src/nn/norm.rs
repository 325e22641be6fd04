//! Batch normalisation for a batch of one: statistics are taken over the
//! spatial dimensions of each channel.
use super::Parameter;
use crate::context::ComputeContext;
use ndarray::{Array1, Array3, ArrayView3, Axis, Ix1, Zip};

pub const BATCH_NORM_EPS: f32 = 1e-5;

#[derive(Clone, Debug)]
pub struct BatchNorm2d {
    pub gamma: Parameter<Ix1>,
    pub beta: Parameter<Ix1>,
}

#[derive(Clone, Debug)]
pub struct BatchNormCache {
    normalized: Array3<f32>,
    inv_std: Array1<f32>,
}

impl BatchNorm2d {
    pub fn new(ctx: &ComputeContext, gamma: Array1<f32>) -> Self {
        let channels = gamma.len();
        Self {
            gamma: Parameter::new(ctx, gamma),
            beta: Parameter::new(ctx, Array1::zeros(channels)),
        }
    }

    pub fn forward(&self, input: ArrayView3<f32>) -> (Array3<f32>, BatchNormCache) {
        let (channels, h, w) = input.dim();
        let n = (h * w).max(1) as f32;
        let mut normalized = Array3::<f32>::zeros((channels, h, w));
        let mut inv_std = Array1::<f32>::zeros(channels);
        for (c, (plane, mut out)) in input
            .axis_iter(Axis(0))
            .zip(normalized.axis_iter_mut(Axis(0)))
            .enumerate()
        {
            let mean = plane.sum() / n;
            let var = plane.iter().map(|&v| (v - mean) * (v - mean)).sum::<f32>() / n;
            let istd = 1.0 / (var + BATCH_NORM_EPS).sqrt();
            inv_std[c] = istd;
            Zip::from(&mut out).and(&plane).for_each(|o, &v| *o = (v - mean) * istd);
        }
        let mut output = normalized.clone();
        for (c, mut plane) in output.axis_iter_mut(Axis(0)).enumerate() {
            let (g, b) = (self.gamma.value[c], self.beta.value[c]);
            plane.mapv_inplace(|v| g * v + b);
        }
        (
            output,
            BatchNormCache {
                normalized,
                inv_std,
            },
        )
    }

    /// `dx = γ·istd/N · (N·dy − Σdy − x̂·Σ(dy·x̂))`.
    pub fn backward(&mut self, cache: &BatchNormCache, grad_output: ArrayView3<f32>) -> Array3<f32> {
        let (channels, h, w) = grad_output.dim();
        let n = (h * w).max(1) as f32;
        let mut grad_input = Array3::<f32>::zeros((channels, h, w));
        for c in 0..channels {
            let dy = grad_output.index_axis(Axis(0), c);
            let xhat = cache.normalized.index_axis(Axis(0), c);
            let sum_dy = dy.sum();
            let sum_dy_xhat = (&dy * &xhat).sum();
            self.gamma.grad[c] += sum_dy_xhat;
            self.beta.grad[c] += sum_dy;
            let scale = self.gamma.value[c] * cache.inv_std[c] / n;
            let mut dx = grad_input.index_axis_mut(Axis(0), c);
            Zip::from(&mut dx)
                .and(&dy)
                .and(&xhat)
                .for_each(|d, &g, &xh| *d = scale * (n * g - sum_dy - xh * sum_dy_xhat));
        }
        grad_input
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn forward_normalises_each_channel() {
        let ctx = ComputeContext::cpu();
        let bn = BatchNorm2d::new(&ctx, Array1::ones(2));
        let input = Array3::from_shape_fn((2, 4, 4), |(c, y, x)| (c * 10 + y * 4 + x) as f32);
        let (out, _) = bn.forward(input.view());
        for plane in out.axis_iter(Axis(0)) {
            let mean = plane.sum() / 16.0;
            let var = plane.iter().map(|v| v * v).sum::<f32>() / 16.0 - mean * mean;
            assert!(mean.abs() < 1e-5);
            assert!((var - 1.0).abs() < 1e-3);
        }
    }

    #[test]
    fn backward_matches_finite_differences() {
        let ctx = ComputeContext::cpu();
        let mut rng = StdRng::seed_from_u64(9);
        let mut bn = BatchNorm2d::new(&ctx, Array1::from(vec![1.2f32, 0.7]));
        bn.beta.value = Array1::from(vec![0.1f32, -0.3]);
        let input = Array3::from_shape_fn((2, 3, 3), |_| rng.gen_range(-1.0f32..1.0));
        let r = Array3::from_shape_fn((2, 3, 3), |_| rng.gen_range(-1.0f32..1.0));
        let (_, cache) = bn.forward(input.view());
        let grad = bn.backward(&cache, r.view());

        let eps = 1e-3f32;
        for idx in [(0, 0, 0), (1, 2, 1), (0, 1, 2)] {
            let mut plus = input.clone();
            plus[idx] += eps;
            let mut minus = input.clone();
            minus[idx] -= eps;
            let lp = (&bn.forward(plus.view()).0 * &r).sum();
            let lm = (&bn.forward(minus.view()).0 * &r).sum();
            let numeric = (lp - lm) / (2.0 * eps);
            assert!((numeric - grad[idx]).abs() < 2e-2, "idx {idx:?}: {numeric} vs {}", grad[idx]);
        }
        let expected_beta: f32 = r.index_axis(Axis(0), 1).sum();
        assert!((bn.beta.grad[1] - expected_beta).abs() < 1e-5);
    }
}
