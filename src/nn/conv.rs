//! 2D cross-correlation via im2col and a single matrix product.
//!
//! Forward: unfold the padded input into a `[in·k·k, out_h·out_w]` column
//! matrix, multiply with the `[out, in·k·k]` weight matrix, add bias.
//! Backward: `dW = dY · colsᵀ`, `dcols = Wᵀ · dY`, then fold `dcols` back into
//! the input layout (col2im with accumulation).
use super::Parameter;
use crate::context::ComputeContext;
use ndarray::{Array1, Array2, Array3, Array4, ArrayView1, ArrayView3, ArrayView4, ArrayViewMut1, Axis, Ix1, Ix4};
#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Output length of a correlation along one axis.
#[inline]
pub fn output_len(input: usize, kernel: usize, stride: usize, padding: usize) -> usize {
    let padded = input + 2 * padding;
    if padded < kernel {
        0
    } else {
        (padded - kernel) / stride.max(1) + 1
    }
}

/// Everything the backward pass needs from a forward call.
#[derive(Clone, Debug)]
pub struct ConvCache {
    cols: Array2<f32>,
    input_dim: (usize, usize, usize),
    output_hw: (usize, usize),
    kernel: usize,
    stride: usize,
    padding: usize,
}

impl ConvCache {
    pub fn input_dim(&self) -> (usize, usize, usize) {
        self.input_dim
    }
}

/// Gradients produced by [`conv2d_backward`].
#[derive(Clone, Debug)]
pub struct ConvGrads {
    pub input: Option<Array3<f32>>,
    pub weight: Array4<f32>,
    pub bias: Array1<f32>,
}

fn im2col(
    input: ArrayView3<f32>,
    kernel: usize,
    stride: usize,
    padding: usize,
    out_h: usize,
    out_w: usize,
) -> Array2<f32> {
    let (channels, h, w) = input.dim();
    let kk = kernel * kernel;
    let mut cols = Array2::<f32>::zeros((channels * kk, out_h * out_w));
    let fill = |r: usize, mut row: ArrayViewMut1<f32>| {
        let c = r / kk;
        let ky = (r % kk) / kernel;
        let kx = r % kernel;
        for oy in 0..out_h {
            let iy = (oy * stride + ky) as isize - padding as isize;
            if iy < 0 || iy >= h as isize {
                continue;
            }
            for ox in 0..out_w {
                let ix = (ox * stride + kx) as isize - padding as isize;
                if ix < 0 || ix >= w as isize {
                    continue;
                }
                row[oy * out_w + ox] = input[[c, iy as usize, ix as usize]];
            }
        }
    };
    #[cfg(feature = "parallel")]
    cols.axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(r, row)| fill(r, row));
    #[cfg(not(feature = "parallel"))]
    cols.axis_iter_mut(Axis(0))
        .enumerate()
        .for_each(|(r, row)| fill(r, row));
    cols
}

fn col2im(cols: &Array2<f32>, cache: &ConvCache) -> Array3<f32> {
    let (channels, h, w) = cache.input_dim;
    let (out_h, out_w) = cache.output_hw;
    let (kernel, stride, padding) = (cache.kernel, cache.stride, cache.padding);
    let kk = kernel * kernel;
    let mut out = Array3::<f32>::zeros((channels, h, w));
    for (r, row) in cols.axis_iter(Axis(0)).enumerate() {
        let c = r / kk;
        let ky = (r % kk) / kernel;
        let kx = r % kernel;
        for oy in 0..out_h {
            let iy = (oy * stride + ky) as isize - padding as isize;
            if iy < 0 || iy >= h as isize {
                continue;
            }
            for ox in 0..out_w {
                let ix = (ox * stride + kx) as isize - padding as isize;
                if ix < 0 || ix >= w as isize {
                    continue;
                }
                out[[c, iy as usize, ix as usize]] += row[oy * out_w + ox];
            }
        }
    }
    out
}

fn weight_matrix(weight: ArrayView4<f32>) -> Array2<f32> {
    let (out_c, in_c, kh, kw) = weight.dim();
    let kk = kh * kw;
    Array2::from_shape_fn((out_c, in_c * kk), |(o, j)| {
        weight[[o, j / kk, (j % kk) / kw, j % kw]]
    })
}

/// Cross-correlate a `[in, h, w]` map with a `[out, in, k, k]` weight.
pub fn conv2d_forward(
    input: ArrayView3<f32>,
    weight: ArrayView4<f32>,
    bias: Option<ArrayView1<f32>>,
    stride: usize,
    padding: usize,
) -> (Array3<f32>, ConvCache) {
    let (channels, h, w) = input.dim();
    let (out_c, in_c, kernel, _) = weight.dim();
    debug_assert_eq!(channels, in_c, "input channels must match the weight");
    let stride = stride.max(1);
    let out_h = output_len(h, kernel, stride, padding);
    let out_w = output_len(w, kernel, stride, padding);

    let cols = im2col(input, kernel, stride, padding, out_h, out_w);
    let product = weight_matrix(weight).dot(&cols);
    let out = Array3::from_shape_fn((out_c, out_h, out_w), |(o, y, x)| {
        let b = bias.as_ref().map_or(0.0, |b| b[o]);
        product[[o, y * out_w + x]] + b
    });
    let cache = ConvCache {
        cols,
        input_dim: (channels, h, w),
        output_hw: (out_h, out_w),
        kernel,
        stride,
        padding,
    };
    (out, cache)
}

/// Backward pass of [`conv2d_forward`].
pub fn conv2d_backward(
    cache: &ConvCache,
    weight: ArrayView4<f32>,
    grad_output: ArrayView3<f32>,
    need_input_grad: bool,
) -> ConvGrads {
    let (out_c, in_c, kh, kw) = weight.dim();
    let (out_h, out_w) = cache.output_hw;
    let grad_matrix = Array2::from_shape_fn((out_c, out_h * out_w), |(o, q)| {
        grad_output[[o, q / out_w, q % out_w]]
    });

    let grad_w_matrix = grad_matrix.dot(&cache.cols.t());
    let kk = kh * kw;
    let grad_weight = Array4::from_shape_fn((out_c, in_c, kh, kw), |(o, c, y, x)| {
        grad_w_matrix[[o, c * kk + y * kw + x]]
    });
    let grad_bias = grad_matrix.sum_axis(Axis(1));

    let grad_input = need_input_grad.then(|| {
        let grad_cols = weight_matrix(weight).t().dot(&grad_matrix);
        col2im(&grad_cols, cache)
    });

    ConvGrads {
        input: grad_input,
        weight: grad_weight,
        bias: grad_bias,
    }
}

/// Convolution layer owning its weight and optional bias.
#[derive(Clone, Debug)]
pub struct Conv2d {
    pub weight: Parameter<Ix4>,
    pub bias: Option<Parameter<Ix1>>,
    pub stride: usize,
    pub padding: usize,
}

impl Conv2d {
    pub fn new(
        ctx: &ComputeContext,
        weight: Array4<f32>,
        with_bias: bool,
        stride: usize,
        padding: usize,
    ) -> Self {
        let out_c = weight.dim().0;
        Self {
            weight: Parameter::new(ctx, weight),
            bias: with_bias.then(|| Parameter::new(ctx, Array1::zeros(out_c))),
            stride: stride.max(1),
            padding,
        }
    }

    pub fn kernel_size(&self) -> usize {
        self.weight.value.dim().2
    }

    pub fn in_channels(&self) -> usize {
        self.weight.value.dim().1
    }

    pub fn out_channels(&self) -> usize {
        self.weight.value.dim().0
    }

    pub fn forward(&self, input: ArrayView3<f32>) -> (Array3<f32>, ConvCache) {
        conv2d_forward(
            input,
            self.weight.value.view(),
            self.bias.as_ref().map(|b| b.value.view()),
            self.stride,
            self.padding,
        )
    }

    /// Accumulate parameter gradients; returns the input gradient when asked.
    pub fn backward(
        &mut self,
        cache: &ConvCache,
        grad_output: ArrayView3<f32>,
        need_input_grad: bool,
    ) -> Option<Array3<f32>> {
        let grads = conv2d_backward(cache, self.weight.value.view(), grad_output, need_input_grad);
        self.weight.grad += &grads.weight;
        if let Some(bias) = self.bias.as_mut() {
            bias.grad += &grads.bias;
        }
        grads.input
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random3(dim: (usize, usize, usize), rng: &mut StdRng) -> Array3<f32> {
        Array3::from_shape_fn(dim, |_| rng.gen_range(-1.0..1.0))
    }

    fn random4(dim: (usize, usize, usize, usize), rng: &mut StdRng) -> Array4<f32> {
        Array4::from_shape_fn(dim, |_| rng.gen_range(-1.0..1.0))
    }

    /// Direct nested-loop correlation used as the reference.
    fn naive(
        input: &Array3<f32>,
        weight: &Array4<f32>,
        stride: usize,
        padding: usize,
    ) -> Array3<f32> {
        let (c, h, w) = input.dim();
        let (o, _, k, _) = weight.dim();
        let oh = output_len(h, k, stride, padding);
        let ow = output_len(w, k, stride, padding);
        Array3::from_shape_fn((o, oh, ow), |(oc, y, x)| {
            let mut acc = 0.0;
            for ic in 0..c {
                for ky in 0..k {
                    for kx in 0..k {
                        let iy = (y * stride + ky) as isize - padding as isize;
                        let ix = (x * stride + kx) as isize - padding as isize;
                        if iy >= 0 && ix >= 0 && (iy as usize) < h && (ix as usize) < w {
                            acc += input[[ic, iy as usize, ix as usize]] * weight[[oc, ic, ky, kx]];
                        }
                    }
                }
            }
            acc
        })
    }

    #[test]
    fn forward_matches_direct_correlation() {
        let mut rng = StdRng::seed_from_u64(11);
        let input = random3((2, 9, 8), &mut rng);
        let weight = random4((3, 2, 3, 3), &mut rng);
        for (stride, padding) in [(1, 0), (2, 0), (1, 2), (2, 1)] {
            let (out, _) = conv2d_forward(input.view(), weight.view(), None, stride, padding);
            let reference = naive(&input, &weight, stride, padding);
            assert_eq!(out.dim(), reference.dim());
            for (a, b) in out.iter().zip(reference.iter()) {
                assert!((a - b).abs() < 1e-4, "stride={stride} padding={padding}");
            }
        }
    }

    #[test]
    fn backward_matches_finite_differences() {
        let mut rng = StdRng::seed_from_u64(5);
        let input = random3((2, 7, 7), &mut rng);
        let weight = random4((2, 2, 3, 3), &mut rng);
        let bias = Array1::from(vec![0.3f32, -0.2]);
        let stride = 2;
        let padding = 1;
        let (out, cache) =
            conv2d_forward(input.view(), weight.view(), Some(bias.view()), stride, padding);
        // Loss = Σ r ⊙ out for a fixed random r, so dL/dout = r.
        let r = random3(out.dim(), &mut rng);
        let loss = |inp: &Array3<f32>, wt: &Array4<f32>| -> f32 {
            let (o, _) = conv2d_forward(inp.view(), wt.view(), Some(bias.view()), stride, padding);
            (&o * &r).sum()
        };
        let grads = conv2d_backward(&cache, weight.view(), r.view(), true);
        let eps = 1e-2;

        for idx in [(0, 0, 0, 0), (1, 1, 2, 1), (0, 1, 1, 2)] {
            let mut plus = weight.clone();
            plus[idx] += eps;
            let mut minus = weight.clone();
            minus[idx] -= eps;
            let numeric = (loss(&input, &plus) - loss(&input, &minus)) / (2.0 * eps);
            assert!((numeric - grads.weight[idx]).abs() < 1e-2, "weight {idx:?}");
        }
        let grad_input = grads.input.expect("input gradient requested");
        for idx in [(0, 0, 0), (1, 3, 4), (0, 6, 6)] {
            let mut plus = input.clone();
            plus[idx] += eps;
            let mut minus = input.clone();
            minus[idx] -= eps;
            let numeric = (loss(&plus, &weight) - loss(&minus, &weight)) / (2.0 * eps);
            assert!((numeric - grad_input[idx]).abs() < 1e-2, "input {idx:?}");
        }
        for (o, &g) in grads.bias.iter().enumerate() {
            let expected: f32 = r.index_axis(Axis(0), o).sum();
            assert!((g - expected).abs() < 1e-4);
        }
    }
}
