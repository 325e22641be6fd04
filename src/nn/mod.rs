//! Minimal numeric building blocks for the two networks.
//!
//! Everything operates on single images (`[channels, height, width]`
//! `Array3<f32>` maps) because the estimator trains with a batch of one.
//! Layers follow a functional pattern: `forward` returns the output together
//! with a cache, `backward` consumes that cache, accumulates parameter
//! gradients and returns the gradient with respect to the input.
pub mod activation;
pub mod conv;
pub mod init;
pub mod norm;
pub mod optim;
pub mod spectral;

use crate::context::{ComputeContext, Device};
use ndarray::{Array, ArrayViewD, ArrayViewMutD, Dimension};

pub use activation::{relu_backward, relu_forward, sigmoid};
pub use conv::{Conv2d, ConvCache};
pub use norm::{BatchNorm2d, BatchNormCache};
pub use optim::Adam;
pub use spectral::{SpectralCache, SpectralConv2d};

/// A learnable tensor with its gradient buffer and owning device.
#[derive(Clone, Debug)]
pub struct Parameter<D: Dimension> {
    pub value: Array<f32, D>,
    pub grad: Array<f32, D>,
    device: Device,
}

impl<D: Dimension> Parameter<D> {
    pub fn new(ctx: &ComputeContext, value: Array<f32, D>) -> Self {
        let grad = Array::zeros(value.raw_dim());
        Self {
            value,
            grad,
            device: ctx.device(),
        }
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn zero_grad(&mut self) {
        self.grad.fill(0.0);
    }

    /// Mutable value view paired with the gradient, as consumed by [`Adam`].
    pub fn slot(&mut self) -> ParamMut<'_> {
        ParamMut {
            value: self.value.view_mut().into_dyn(),
            grad: self.grad.view().into_dyn(),
            device: self.device,
        }
    }
}

pub struct ParamMut<'a> {
    pub value: ArrayViewMutD<'a, f32>,
    pub grad: ArrayViewD<'a, f32>,
    pub device: Device,
}

/// Implemented by every network that owns learnable parameters.
///
/// `parameters_mut` must always list parameters in the same order, the
/// optimiser keys its moment buffers by position.
pub trait Trainable {
    fn parameters_mut(&mut self) -> Vec<ParamMut<'_>>;

    fn zero_grad(&mut self);
}
