//! Materialise the kernel a linear Generator implements.
//!
//! A unit impulse is correlated with the first layer using padding `K − 1`,
//! then with every following layer (valid, stride 1: the final decimation is
//! not part of the kernel). The single remaining map is the kernel rotated by
//! 180°, so it is flipped on both axes.
//!
//! [`extract_kernel_traced`] keeps the per-layer caches so that gradients of
//! kernel-space losses can flow back into the Generator weights.
use super::Kernel;
use crate::generator::Generator;
use crate::nn::conv::{conv2d_backward, conv2d_forward, ConvCache};
use ndarray::{s, Array2, Array3, Axis};

#[derive(Clone, Debug)]
pub struct ExtractionTrace {
    caches: Vec<ConvCache>,
}

/// Explicit `K × K` kernel of the Generator's current weights.
pub fn extract_kernel(generator: &Generator) -> Kernel {
    extract_kernel_traced(generator).0
}

pub fn extract_kernel_traced(generator: &Generator) -> (Kernel, ExtractionTrace) {
    let padding = generator.kernel_size() - 1;
    let mut x = Array3::<f32>::ones((1, 1, 1));
    let mut caches = Vec::with_capacity(generator.layers().len());
    for (i, layer) in generator.layers().iter().enumerate() {
        let pad = if i == 0 { padding } else { 0 };
        let (y, cache) = conv2d_forward(x.view(), layer.weight.value.view(), None, 1, pad);
        caches.push(cache);
        x = y;
    }
    let raw = x.index_axis_move(Axis(0), 0);
    let kernel = raw.slice(s![..;-1, ..;-1]).mapv(f64::from);
    (Kernel::new(kernel), ExtractionTrace { caches })
}

impl ExtractionTrace {
    /// Accumulate `dL/dW` for every Generator layer given `dL/d kernel`.
    pub fn backward(&self, generator: &mut Generator, grad_kernel: &Array2<f64>) {
        let flipped = grad_kernel.slice(s![..;-1, ..;-1]).mapv(|v| v as f32);
        let mut grad = flipped.insert_axis(Axis(0));
        for (i, (layer, cache)) in generator
            .layers_mut()
            .iter_mut()
            .zip(&self.caches)
            .enumerate()
            .rev()
        {
            let grads = conv2d_backward(cache, layer.weight.value.view(), grad.view(), i > 0);
            layer.weight.grad += &grads.weight;
            match grads.input {
                Some(g) => grad = g,
                None => break,
            }
        }
    }
}
