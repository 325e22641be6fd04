//! Spectrally normalised convolution.
//!
//! The raw weight `W` (viewed as an `[out, in·k·k]` matrix) is divided by an
//! estimate of its largest singular value `σ = uᵀ W v`. One power iteration
//! runs per forward pass and refines the persistent `u`:
//! `v = norm(Wᵀ u)`, `u = norm(W v)`.
//!
//! The backward pass treats `u` and `v` as constants:
//! `dL/dW = (G − ⟨G, W_sn⟩ · u vᵀ) / σ` where `G = dL/dW_sn`.
use super::conv::{conv2d_backward, conv2d_forward, ConvCache};
use super::Parameter;
use crate::context::ComputeContext;
use ndarray::{Array1, Array2, Array3, Array4, ArrayView3, Ix1, Ix4};
use rand::Rng;
use rand_distr::StandardNormal;

const NORMALIZE_EPS: f32 = 1e-12;

#[derive(Clone, Debug)]
pub struct SpectralConv2d {
    pub weight: Parameter<Ix4>,
    pub bias: Parameter<Ix1>,
    u: Array1<f32>,
}

#[derive(Clone, Debug)]
pub struct SpectralCache {
    conv: ConvCache,
    normalized_weight: Array4<f32>,
    u: Array1<f32>,
    v: Array1<f32>,
    sigma: f32,
}

impl SpectralCache {
    pub fn sigma(&self) -> f32 {
        self.sigma
    }
}

fn normalize(mut vector: Array1<f32>) -> Array1<f32> {
    let norm = vector.dot(&vector).sqrt().max(NORMALIZE_EPS);
    vector.mapv_inplace(|x| x / norm);
    vector
}

fn as_matrix(weight: &Array4<f32>) -> Array2<f32> {
    let (out_c, in_c, kh, kw) = weight.dim();
    let kk = kh * kw;
    Array2::from_shape_fn((out_c, in_c * kk), |(o, j)| {
        weight[[o, j / kk, (j % kk) / kw, j % kw]]
    })
}

impl SpectralConv2d {
    pub fn new<R: Rng + ?Sized>(ctx: &ComputeContext, weight: Array4<f32>, rng: &mut R) -> Self {
        let out_c = weight.dim().0;
        let u = normalize(Array1::from_shape_fn(out_c, |_| rng.sample(StandardNormal)));
        Self {
            weight: Parameter::new(ctx, weight),
            bias: Parameter::new(ctx, Array1::zeros(out_c)),
            u,
        }
    }

    pub fn kernel_size(&self) -> usize {
        self.weight.value.dim().2
    }

    /// Current estimate of the largest singular value (without iterating).
    pub fn sigma(&self) -> f32 {
        let w = as_matrix(&self.weight.value);
        let v = normalize(w.t().dot(&self.u));
        self.u.dot(&w.dot(&v))
    }

    /// Runs one power iteration, normalises the weight and correlates.
    pub fn forward(&mut self, input: ArrayView3<f32>) -> (Array3<f32>, SpectralCache) {
        let w = as_matrix(&self.weight.value);
        let v = normalize(w.t().dot(&self.u));
        let wv = w.dot(&v);
        self.u = normalize(wv.clone());
        let sigma = self.u.dot(&wv).max(NORMALIZE_EPS);
        let normalized_weight = self.weight.value.mapv(|x| x / sigma);

        let (out, conv) = conv2d_forward(
            input,
            normalized_weight.view(),
            Some(self.bias.value.view()),
            1,
            0,
        );
        let cache = SpectralCache {
            conv,
            normalized_weight,
            u: self.u.clone(),
            v,
            sigma,
        };
        (out, cache)
    }

    pub fn backward(&mut self, cache: &SpectralCache, grad_output: ArrayView3<f32>) -> Array3<f32> {
        let grads = conv2d_backward(&cache.conv, cache.normalized_weight.view(), grad_output, true);
        let g = grads.weight;
        let inner = (&g * &cache.normalized_weight).sum();
        let (_, in_c, kh, kw) = g.dim();
        let kk = kh * kw;
        let sigma = cache.sigma;
        let grad_raw = Array4::from_shape_fn(g.raw_dim(), |(o, c, y, x)| {
            let j = c * kk + y * kw + x;
            (g[[o, c, y, x]] - inner * cache.u[o] * cache.v[j]) / sigma
        });
        debug_assert_eq!(cache.v.len(), in_c * kk);
        self.weight.grad += &grad_raw;
        self.bias.grad += &grads.bias;
        grads.input.unwrap_or_else(|| Array3::zeros(cache.conv.input_dim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn layer(seed: u64) -> (SpectralConv2d, StdRng) {
        let mut rng = StdRng::seed_from_u64(seed);
        let weight = Array4::from_shape_fn((3, 2, 1, 1), |_| rng.gen_range(-1.0f32..1.0));
        let ctx = ComputeContext::cpu();
        (SpectralConv2d::new(&ctx, weight, &mut rng), rng)
    }

    #[test]
    fn power_iteration_converges_to_largest_singular_value() {
        let ctx = ComputeContext::cpu();
        let mut rng = StdRng::seed_from_u64(1);
        // Diagonal-ish weight with known singular values 3 and 1.
        let mut weight = Array4::<f32>::zeros((2, 2, 1, 1));
        weight[[0, 0, 0, 0]] = 3.0;
        weight[[1, 1, 0, 0]] = 1.0;
        let mut sn = SpectralConv2d::new(&ctx, weight, &mut rng);
        let input = Array3::<f32>::ones((2, 2, 2));
        let mut sigma = 0.0;
        for _ in 0..30 {
            sigma = sn.forward(input.view()).1.sigma();
        }
        assert!((sigma - 3.0).abs() < 1e-3, "sigma={sigma}");
    }

    #[test]
    fn backward_matches_finite_differences_with_frozen_vectors() {
        let (mut sn, mut rng) = layer(4);
        let input = Array3::from_shape_fn((2, 3, 3), |_| rng.gen_range(-1.0f32..1.0));
        let (out, cache) = sn.forward(input.view());
        let r = Array3::from_shape_fn(out.dim(), |_| rng.gen_range(-1.0f32..1.0));
        sn.backward(&cache, r.view());

        // Loss with u, v frozen at the cached values.
        let frozen_loss = |weight: &Array4<f32>| -> f32 {
            let w = as_matrix(weight);
            let sigma = cache.u.dot(&w.dot(&cache.v));
            let normalized = weight.mapv(|x| x / sigma);
            let (o, _) = conv2d_forward(input.view(), normalized.view(), Some(sn.bias.value.view()), 1, 0);
            (&o * &r).sum()
        };
        let eps = 1e-3f32;
        for idx in [(0, 0, 0, 0), (1, 1, 0, 0), (2, 0, 0, 0)] {
            let mut plus = sn.weight.value.clone();
            plus[idx] += eps;
            let mut minus = sn.weight.value.clone();
            minus[idx] -= eps;
            let numeric = (frozen_loss(&plus) - frozen_loss(&minus)) / (2.0 * eps);
            let analytic = sn.weight.grad[idx];
            assert!((numeric - analytic).abs() < 2e-2, "{idx:?}: {numeric} vs {analytic}");
        }
    }
}
