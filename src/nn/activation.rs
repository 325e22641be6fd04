use ndarray::{Array3, ArrayView3, Zip};

pub fn relu_forward(input: ArrayView3<f32>) -> Array3<f32> {
    input.mapv(|v| v.max(0.0))
}

/// Gradient of ReLU given the layer output it produced.
pub fn relu_backward(output: ArrayView3<f32>, grad_output: ArrayView3<f32>) -> Array3<f32> {
    let mut grad = grad_output.to_owned();
    Zip::from(&mut grad).and(&output).for_each(|g, &o| {
        if o <= 0.0 {
            *g = 0.0;
        }
    });
    grad
}

#[inline]
pub fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}
