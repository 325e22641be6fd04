//! Fully convolutional patch Discriminator.
//!
//! One spectrally normalised `k × k` convolution sets the receptive field;
//! every following layer is a spectrally normalised 1×1 convolution, so each
//! output logit judges one `k × k` patch of the input independently.
use crate::config::EstimatorConfig;
use crate::context::ComputeContext;
use crate::nn::init::{normal, xavier_normal, SMALL_GAIN};
use crate::nn::{
    relu_backward, relu_forward, BatchNorm2d, BatchNormCache, ParamMut, SpectralCache,
    SpectralConv2d, Trainable,
};
use ndarray::{Array2, Array3, ArrayView2, Axis};
use rand::Rng;

/// Standard deviation of the batch-norm scale initialisation around 1.
const NORM_SCALE_STD: f32 = 0.02;

#[derive(Clone, Debug)]
struct Block {
    conv: SpectralConv2d,
    norm: BatchNorm2d,
}

#[derive(Clone, Debug)]
pub struct Discriminator {
    first: SpectralConv2d,
    blocks: Vec<Block>,
    last: SpectralConv2d,
}

#[derive(Clone, Debug)]
struct BlockTrace {
    conv: SpectralCache,
    norm: BatchNormCache,
    activated: Array3<f32>,
}

/// Caches of one forward pass.
#[derive(Clone, Debug)]
pub struct DiscriminatorTrace {
    first: SpectralCache,
    blocks: Vec<BlockTrace>,
    last: SpectralCache,
}

impl Discriminator {
    pub fn new<R: Rng + ?Sized>(ctx: &ComputeContext, config: &EstimatorConfig, rng: &mut R) -> Self {
        let opts = &config.discriminator;
        let ch = opts.channels;
        let first_w = xavier_normal(ch, 1, opts.kernel_size, SMALL_GAIN, rng);
        let first = SpectralConv2d::new(ctx, first_w, rng);
        let blocks = (0..opts.n_layers.saturating_sub(2))
            .map(|_| {
                let w = xavier_normal(ch, ch, 1, SMALL_GAIN, rng);
                let conv = SpectralConv2d::new(ctx, w, rng);
                let norm = BatchNorm2d::new(ctx, normal(ch, 1.0, NORM_SCALE_STD, rng));
                Block { conv, norm }
            })
            .collect();
        let last_w = xavier_normal(1, ch, 1, SMALL_GAIN, rng);
        let last = SpectralConv2d::new(ctx, last_w, rng);
        Self {
            first,
            blocks,
            last,
        }
    }

    /// Pixels lost between input and logit map.
    pub fn shave(&self) -> usize {
        self.first.kernel_size() - 1
    }

    pub fn output_size(&self, input: usize) -> usize {
        input.saturating_sub(self.shave())
    }

    /// Logit map for a single-channel input. Refines every spectral-norm `u`.
    pub fn forward(&mut self, input: ArrayView2<f32>) -> (Array2<f32>, DiscriminatorTrace) {
        let input = input.insert_axis(Axis(0));
        let (mut x, first) = self.first.forward(input);
        let mut traces = Vec::with_capacity(self.blocks.len());
        for block in self.blocks.iter_mut() {
            let (y, conv) = block.conv.forward(x.view());
            let (z, norm) = block.norm.forward(y.view());
            let activated = relu_forward(z.view());
            x = activated.clone();
            traces.push(BlockTrace {
                conv,
                norm,
                activated,
            });
        }
        let (logits, last) = self.last.forward(x.view());
        let trace = DiscriminatorTrace {
            first,
            blocks: traces,
            last,
        };
        (logits.index_axis_move(Axis(0), 0), trace)
    }

    /// Accumulate parameter gradients and return `dL/d input`.
    pub fn backward(&mut self, trace: &DiscriminatorTrace, grad_logits: ArrayView2<f32>) -> Array2<f32> {
        let grad = grad_logits.insert_axis(Axis(0));
        let mut grad = self.last.backward(&trace.last, grad);
        for (block, bt) in self.blocks.iter_mut().zip(&trace.blocks).rev() {
            let g = relu_backward(bt.activated.view(), grad.view());
            let g = block.norm.backward(&bt.norm, g.view());
            grad = block.conv.backward(&bt.conv, g.view());
        }
        let grad = self.first.backward(&trace.first, grad.view());
        grad.index_axis_move(Axis(0), 0)
    }
}

impl Trainable for Discriminator {
    fn parameters_mut(&mut self) -> Vec<ParamMut<'_>> {
        let mut params = vec![self.first.weight.slot(), self.first.bias.slot()];
        for block in self.blocks.iter_mut() {
            params.push(block.conv.weight.slot());
            params.push(block.conv.bias.slot());
            params.push(block.norm.gamma.slot());
            params.push(block.norm.beta.slot());
        }
        params.push(self.last.weight.slot());
        params.push(self.last.bias.slot());
        params
    }

    fn zero_grad(&mut self) {
        self.first.weight.zero_grad();
        self.first.bias.zero_grad();
        for block in self.blocks.iter_mut() {
            block.conv.weight.zero_grad();
            block.conv.bias.zero_grad();
            block.norm.gamma.zero_grad();
            block.norm.beta.zero_grad();
        }
        self.last.weight.zero_grad();
        self.last.bias.zero_grad();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn small_config() -> EstimatorConfig {
        let mut cfg = EstimatorConfig::default();
        cfg.discriminator.channels = 4;
        cfg.discriminator.n_layers = 4;
        cfg.discriminator.kernel_size = 3;
        cfg
    }

    #[test]
    fn output_map_is_shaved_by_kernel() {
        let ctx = ComputeContext::cpu();
        let mut rng = StdRng::seed_from_u64(1);
        let mut d = Discriminator::new(&ctx, &EstimatorConfig::default(), &mut rng);
        assert_eq!(d.shave(), 6);
        let (logits, _) = d.forward(Array2::<f32>::zeros((26, 26)).view());
        assert_eq!(logits.dim(), (20, 20));
        assert_eq!(d.output_size(26), 20);
        // first conv + bias, 5 blocks of four tensors, last conv + bias
        assert_eq!(d.parameters_mut().len(), 2 + 5 * 4 + 2);
    }

    #[test]
    fn input_gradient_matches_finite_differences() {
        let ctx = ComputeContext::cpu();
        let mut rng = StdRng::seed_from_u64(6);
        let mut d = Discriminator::new(&ctx, &small_config(), &mut rng);
        let input = Array2::from_shape_fn((7, 7), |_| rng.gen_range(0.0f32..1.0));
        // Settle the power iteration so u barely moves between calls.
        for _ in 0..50 {
            d.forward(input.view());
        }
        let (logits, trace) = d.forward(input.view());
        let r = Array2::from_shape_fn(logits.dim(), |_| rng.gen_range(-1.0f32..1.0));
        let grad = d.backward(&trace, r.view());

        let eps = 1e-2f32;
        for idx in [(2, 3), (0, 0), (6, 5)] {
            let mut plus = input.clone();
            plus[idx] += eps;
            let mut minus = input.clone();
            minus[idx] -= eps;
            let lp = (&d.clone().forward(plus.view()).0 * &r).sum();
            let lm = (&d.clone().forward(minus.view()).0 * &r).sum();
            let numeric = (lp - lm) / (2.0 * eps);
            assert!(
                (numeric - grad[idx]).abs() < 1e-2 + 0.05 * numeric.abs(),
                "{idx:?}: {numeric} vs {}",
                grad[idx]
            );
        }
    }
}
