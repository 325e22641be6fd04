//! Linear Generator: a stack of bias-free, activation-free convolutions.
//!
//! Because nothing non-linear sits between the layers, the whole stack is one
//! convolution with a `(1 + Σ(k_i − 1))`-sized kernel followed by decimation
//! by the scale factor. All layers but the last are stride-1 valid
//! correlations; the last keeps every `scale_factor`-th sample.
use crate::config::EstimatorConfig;
use crate::context::ComputeContext;
use crate::error::{EstimatorError, Result};
use crate::nn::conv::output_len;
use crate::nn::init::{xavier_normal, SMALL_GAIN};
use crate::nn::{Conv2d, ConvCache, ParamMut, Trainable};
use ndarray::{Array2, Array4, ArrayView2, Axis};
use rand::Rng;

#[derive(Clone, Debug)]
pub struct Generator {
    layers: Vec<Conv2d>,
    scale_factor: usize,
}

/// Per-layer caches of one forward pass.
#[derive(Clone, Debug)]
pub struct GeneratorTrace {
    caches: Vec<ConvCache>,
}

impl Generator {
    /// Xavier-normal (gain 0.1) weights for the configured structure.
    pub fn new<R: Rng + ?Sized>(ctx: &ComputeContext, config: &EstimatorConfig, rng: &mut R) -> Self {
        let structure = &config.generator.structure;
        let channels = config.generator.channels;
        let last = structure.len().saturating_sub(1);
        let weights = structure
            .iter()
            .enumerate()
            .map(|(i, &k)| {
                let in_c = if i == 0 { 1 } else { channels };
                let out_c = if i == last { 1 } else { channels };
                xavier_normal(out_c, in_c, k, SMALL_GAIN, rng)
            })
            .collect::<Vec<_>>();
        Self::assemble(ctx, weights, config.scale_factor)
    }

    /// Build a Generator from explicit `[out, in, k, k]` weights.
    ///
    /// The first layer must take one channel, the last must produce one, and
    /// consecutive layers must chain.
    pub fn from_weights(
        ctx: &ComputeContext,
        weights: Vec<Array4<f32>>,
        scale_factor: usize,
    ) -> Result<Self> {
        let (Some(first), Some(last)) = (weights.first(), weights.last()) else {
            return Err(EstimatorError::InvalidConfig(
                "generator needs at least one layer".into(),
            ));
        };
        if first.dim().1 != 1 || last.dim().0 != 1 {
            return Err(EstimatorError::ShapeMismatch(format!(
                "generator must map 1 channel to 1 channel, got {} -> {}",
                first.dim().1,
                last.dim().0
            )));
        }
        for (i, pair) in weights.windows(2).enumerate() {
            if pair[0].dim().0 != pair[1].dim().1 {
                return Err(EstimatorError::ShapeMismatch(format!(
                    "layer {i} produces {} channels but layer {} expects {}",
                    pair[0].dim().0,
                    i + 1,
                    pair[1].dim().1
                )));
            }
        }
        if weights.iter().any(|w| w.dim().2 != w.dim().3) {
            return Err(EstimatorError::ShapeMismatch(
                "generator kernels must be square".into(),
            ));
        }
        Ok(Self::assemble(ctx, weights, scale_factor))
    }

    fn assemble(ctx: &ComputeContext, weights: Vec<Array4<f32>>, scale_factor: usize) -> Self {
        let scale_factor = scale_factor.max(1);
        let last = weights.len().saturating_sub(1);
        let layers = weights
            .into_iter()
            .enumerate()
            .map(|(i, w)| {
                let stride = if i == last { scale_factor } else { 1 };
                Conv2d::new(ctx, w, false, stride, 0)
            })
            .collect();
        Self {
            layers,
            scale_factor,
        }
    }

    pub fn layers(&self) -> &[Conv2d] {
        &self.layers
    }

    pub(crate) fn layers_mut(&mut self) -> &mut [Conv2d] {
        &mut self.layers
    }

    pub fn scale_factor(&self) -> usize {
        self.scale_factor
    }

    /// Pixels removed by the stride-1 part of the stack.
    pub fn shave(&self) -> usize {
        self.layers.iter().map(|l| l.kernel_size() - 1).sum()
    }

    /// Side of the equivalent single kernel.
    pub fn kernel_size(&self) -> usize {
        1 + self.shave()
    }

    /// Output side for a square input of side `input`.
    pub fn output_size(&self, input: usize) -> usize {
        self.layers
            .iter()
            .fold(input, |n, l| output_len(n, l.kernel_size(), l.stride, 0))
    }

    pub fn forward(&self, input: ArrayView2<f32>) -> (Array2<f32>, GeneratorTrace) {
        let mut x = input.insert_axis(Axis(0)).to_owned();
        let mut caches = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let (y, cache) = layer.forward(x.view());
            caches.push(cache);
            x = y;
        }
        (x.index_axis_move(Axis(0), 0), GeneratorTrace { caches })
    }

    /// Accumulate weight gradients for `dL/d output`.
    pub fn backward(&mut self, trace: &GeneratorTrace, grad_output: ArrayView2<f32>) {
        let mut grad = grad_output.insert_axis(Axis(0)).to_owned();
        for (i, (layer, cache)) in self
            .layers
            .iter_mut()
            .zip(&trace.caches)
            .enumerate()
            .rev()
        {
            match layer.backward(cache, grad.view(), i > 0) {
                Some(g) => grad = g,
                None => break,
            }
        }
    }
}

impl Trainable for Generator {
    fn parameters_mut(&mut self) -> Vec<ParamMut<'_>> {
        self.layers.iter_mut().map(|l| l.weight.slot()).collect()
    }

    fn zero_grad(&mut self) {
        self.layers.iter_mut().for_each(|l| l.weight.zero_grad());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn small_config() -> EstimatorConfig {
        let mut cfg = EstimatorConfig::default();
        cfg.generator.channels = 4;
        cfg
    }

    #[test]
    fn default_structure_shapes() {
        let ctx = ComputeContext::cpu();
        let mut rng = StdRng::seed_from_u64(0);
        let g = Generator::new(&ctx, &small_config(), &mut rng);
        assert_eq!(g.layers().len(), 6);
        assert_eq!(g.kernel_size(), 13);
        assert_eq!(g.output_size(64), 26);
        let (out, _) = g.forward(Array2::<f32>::zeros((64, 64)).view());
        assert_eq!(out.dim(), (26, 26));
        assert!(g.layers().iter().all(|l| l.bias.is_none()));
        assert_eq!(g.layers()[5].stride, 2);
    }

    #[test]
    fn rejects_unchained_weights() {
        let ctx = ComputeContext::cpu();
        let weights = vec![Array4::zeros((3, 1, 3, 3)), Array4::zeros((1, 2, 1, 1))];
        assert!(matches!(
            Generator::from_weights(&ctx, weights, 2),
            Err(EstimatorError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn backward_matches_finite_differences() {
        let ctx = ComputeContext::cpu();
        let mut rng = StdRng::seed_from_u64(2);
        let weights = vec![
            Array4::from_shape_fn((2, 1, 3, 3), |_| rng.gen_range(-0.5f32..0.5)),
            Array4::from_shape_fn((1, 2, 3, 3), |_| rng.gen_range(-0.5f32..0.5)),
        ];
        let mut g = Generator::from_weights(&ctx, weights, 2).expect("generator");
        let input = Array2::from_shape_fn((12, 12), |_| rng.gen_range(0.0f32..1.0));
        let (out, trace) = g.forward(input.view());
        let r = Array2::from_shape_fn(out.dim(), |_| rng.gen_range(-1.0f32..1.0));
        g.backward(&trace, r.view());

        let eps = 1e-2f32;
        for (layer, idx) in [(0, (1, 0, 2, 1)), (1, (0, 1, 0, 2))] {
            let mut plus = g.clone();
            plus.layers[layer].weight.value[idx] += eps;
            let mut minus = g.clone();
            minus.layers[layer].weight.value[idx] -= eps;
            let lp = (&plus.forward(input.view()).0 * &r).sum();
            let lm = (&minus.forward(input.view()).0 * &r).sum();
            let numeric = (lp - lm) / (2.0 * eps);
            let analytic = g.layers[layer].weight.grad[idx];
            assert!((numeric - analytic).abs() < 1e-2, "layer {layer}: {numeric} vs {analytic}");
        }
    }
}
