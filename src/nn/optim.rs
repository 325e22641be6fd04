//! Adam optimiser with bias-corrected moments.
//!
//! `m_t = β1·m + (1 − β1)·g`, `v_t = β2·v + (1 − β2)·g²`,
//! `m̂ = m_t / (1 − β1ᵗ)`, `v̂ = v_t / (1 − β2ᵗ)`,
//! `θ ← θ − lr · m̂ / (√v̂ + ε)`.
use super::ParamMut;
use crate::context::{ComputeContext, Device};
use ndarray::{ArrayD, Zip};

#[derive(Clone, Debug)]
pub struct Adam {
    lr: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    t: u64,
    m: Vec<ArrayD<f32>>,
    v: Vec<ArrayD<f32>>,
    device: Device,
}

impl Adam {
    pub fn new(ctx: &ComputeContext, lr: f32, beta1: f32) -> Self {
        Self::with_params(ctx, lr, beta1, 0.999, 1e-8)
    }

    pub fn with_params(ctx: &ComputeContext, lr: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            lr,
            beta1,
            beta2,
            epsilon,
            t: 0,
            m: Vec::new(),
            v: Vec::new(),
            device: ctx.device(),
        }
    }

    pub fn lr(&self) -> f32 {
        self.lr
    }

    pub fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }

    pub fn step_count(&self) -> u64 {
        self.t
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Apply one update to every parameter, in the order they are listed.
    pub fn step(&mut self, params: Vec<ParamMut<'_>>) {
        if self.m.len() != params.len() {
            self.m = params.iter().map(|p| ArrayD::zeros(p.value.raw_dim())).collect();
            self.v = params.iter().map(|p| ArrayD::zeros(p.value.raw_dim())).collect();
        }
        self.t += 1;
        let t = self.t as i32;
        let bias1 = 1.0 - self.beta1.powi(t);
        let bias2 = 1.0 - self.beta2.powi(t);
        let (lr, beta1, beta2, eps) = (self.lr, self.beta1, self.beta2, self.epsilon);

        for ((param, m), v) in params.into_iter().zip(&mut self.m).zip(&mut self.v) {
            let ParamMut {
                mut value,
                grad,
                device,
            } = param;
            debug_assert_eq!(device, self.device, "parameter lives on another device");
            Zip::from(&mut value)
                .and(&grad)
                .and(m)
                .and(v)
                .for_each(|w, &g, m, v| {
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                    let v_hat = *v / bias2;
                    *w -= lr * (*m / bias1) / (v_hat.sqrt() + eps);
                });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::Parameter;
    use ndarray::Array1;

    #[test]
    fn first_step_moves_each_weight_by_lr() {
        let ctx = ComputeContext::cpu();
        let mut p = Parameter::new(&ctx, Array1::from(vec![1.0f32, -2.0, 0.5]));
        p.grad = Array1::from(vec![0.3f32, -4.0, 0.0]);
        let mut adam = Adam::new(&ctx, 0.01, 0.5);
        adam.step(vec![p.slot()]);
        // Bias-corrected first step is lr · sign(g).
        assert!((p.value[0] - 0.99).abs() < 1e-5);
        assert!((p.value[1] + 1.99).abs() < 1e-5);
        assert_eq!(p.value[2], 0.5);
        assert_eq!(adam.step_count(), 1);
    }

    #[test]
    fn epsilon_is_added_to_the_corrected_second_moment() {
        // With |g| = ε the first step is lr · g / (|g| + ε) = lr / 2.
        let ctx = ComputeContext::cpu();
        let mut p = Parameter::new(&ctx, Array1::from(vec![0.0f32]));
        p.grad = Array1::from(vec![1e-8f32]);
        let mut adam = Adam::new(&ctx, 0.1, 0.5);
        adam.step(vec![p.slot()]);
        assert!((p.value[0] + 0.05).abs() < 1e-4, "moved by {}", p.value[0]);
        assert_eq!(adam.device(), p.device());
    }

    #[test]
    fn minimises_a_quadratic() {
        let ctx = ComputeContext::cpu();
        let mut p = Parameter::new(&ctx, Array1::from(vec![3.0f32, -1.5]));
        let mut adam = Adam::new(&ctx, 0.05, 0.9);
        for _ in 0..2000 {
            p.grad = p.value.mapv(|x| 2.0 * (x - 0.25));
            adam.step(vec![p.slot()]);
        }
        for &x in p.value.iter() {
            assert!((x - 0.25).abs() < 5e-2, "x={x}");
        }
    }
}
