//! Sub-pixel recentring.
//!
//! The kernel is zero padded so the translated support cannot leave the grid,
//! then shifted by separable linear interpolation (`out[i] = in[i − s]`, zero
//! outside). Linear interpolation keeps both the total mass and the centroid
//! exact, so the result lands on the wanted centre up to rounding.
use super::Kernel;
use crate::error::{EstimatorError, Result};
use nalgebra::Vector2;
use ndarray::{s, Array1, Array2, ArrayView1, Axis};

/// Translate `kernel` so its centre of mass sits at
/// [`Kernel::wanted_center`] for its (padded) size.
pub fn recenter(kernel: &Kernel, scale_factor: usize) -> Result<Kernel> {
    let com = kernel.center_of_mass().ok_or_else(|| {
        EstimatorError::DegenerateKernel("cannot recenter a kernel without mass".into())
    })?;
    let wanted = Kernel::wanted_center(kernel.size(), scale_factor);
    let shift = Vector2::new(wanted, wanted) - com;
    let pad = shift.amax().ceil() as usize + 1;

    let size = kernel.size() + 2 * pad;
    let mut padded = Array2::<f64>::zeros((size, size));
    padded
        .slice_mut(s![pad..pad + kernel.size(), pad..pad + kernel.size()])
        .assign(kernel.values());
    Ok(Kernel::new(shift_2d(&padded, shift)))
}

/// Translate a grid by `(rows, cols)` with separable linear interpolation.
pub fn shift_2d(values: &Array2<f64>, shift: Vector2<f64>) -> Array2<f64> {
    let mut rows_shifted = Array2::<f64>::zeros(values.raw_dim());
    for (src, mut dst) in values
        .axis_iter(Axis(1))
        .zip(rows_shifted.axis_iter_mut(Axis(1)))
    {
        dst.assign(&shift_1d(src, shift.x));
    }
    let mut out = Array2::<f64>::zeros(values.raw_dim());
    for (src, mut dst) in rows_shifted
        .axis_iter(Axis(0))
        .zip(out.axis_iter_mut(Axis(0)))
    {
        dst.assign(&shift_1d(src, shift.y));
    }
    out
}

fn shift_1d(line: ArrayView1<f64>, shift: f64) -> Array1<f64> {
    let n = line.len() as i64;
    let sample = |j: i64| {
        if j < 0 || j >= n {
            0.0
        } else {
            line[j as usize]
        }
    };
    Array1::from_shape_fn(line.len(), |i| {
        let pos = i as f64 - shift;
        let base = pos.floor();
        let frac = pos - base;
        let j = base as i64;
        (1.0 - frac) * sample(j) + frac * sample(j + 1)
    })
}
