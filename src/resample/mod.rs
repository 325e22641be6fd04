//! Separable strided resampling used by the bicubic-consistency loss and the
//! crop sampler.
//!
//! Downsampling applies a separable filter and keeps every `factor`-th sample
//! in one pass per axis: output sample `y` reads input rows
//! `y·factor − pad + t` for every tap `t`. Out-of-range samples are either
//! zero (matching a zero-padded strided convolution) or clamped to the
//! nearest edge pixel.

pub mod filters;

use crate::image::{ImageF32, ImageView, ImageViewMut};
use crate::kernel::Kernel;
pub use filters::{BicubicFilter, SeparableFilter};

/// How samples outside the image are treated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Border {
    Zero,
    Clamp,
}

/// Output length of a strided filter pass over `len` samples.
pub fn downsampled_len(len: usize, taps: usize, pad: usize, factor: usize) -> usize {
    let padded = len + 2 * pad;
    if padded < taps {
        0
    } else {
        (padded - taps) / factor + 1
    }
}

/// Filter and decimate `src` by `factor` along both axes.
pub fn downsample(
    src: &ImageF32,
    filter: &dyn SeparableFilter,
    factor: usize,
    pad: usize,
    border: Border,
) -> ImageF32 {
    let taps = filter.taps();
    assert!(
        !taps.is_empty(),
        "filter must provide at least one tap for downsampling"
    );
    let factor = factor.max(1);
    let ow = downsampled_len(src.w, taps.len(), pad, factor);
    let oh = downsampled_len(src.h, taps.len(), pad, factor);
    if ow == 0 || oh == 0 || src.w == 0 || src.h == 0 {
        return ImageF32::new(ow, oh);
    }

    // horizontal pass: h × ow
    let mut tmp = ImageF32::new(ow, src.h);
    for y in 0..src.h {
        let src_row = src.row(y);
        let dst_row = tmp.row_mut(y);
        filter_row_downsample(src_row, dst_row, taps, factor, pad, border);
    }

    // vertical pass: oh × ow
    let mut out = ImageF32::new(ow, oh);
    let mut column = vec![0.0f32; src.h];
    let mut filtered = vec![0.0f32; oh];
    for x in 0..ow {
        for (y, v) in column.iter_mut().enumerate() {
            *v = tmp.get(x, y);
        }
        filter_row_downsample(&column, &mut filtered, taps, factor, pad, border);
        for (y, &v) in filtered.iter().enumerate() {
            out.set(x, y, v);
        }
    }
    out
}

/// Downscale with the reference bicubic filter for `factor`, zero padded.
pub fn bicubic_downscale(src: &ImageF32, factor: usize) -> ImageF32 {
    let filter = BicubicFilter::new(factor);
    downsample(src, &filter, factor, filter.padding(), Border::Zero)
}

/// Degrade `src` with an explicit 2D kernel: correlate (edge-clamped, kernel
/// anchored at `size/2`) and keep every `factor`-th sample, the way the
/// Generator downscales.
pub fn kernel_downscale(src: &ImageF32, kernel: &Kernel, factor: usize) -> ImageF32 {
    let factor = factor.max(1);
    let size = kernel.size();
    let pad = (size / 2) as isize;
    let ow = src.w.div_ceil(factor);
    let oh = src.h.div_ceil(factor);
    if src.w == 0 || src.h == 0 {
        return ImageF32::new(ow, oh);
    }
    let taps = kernel.to_f32();
    ImageF32::from_fn(ow, oh, |x, y| {
        let (ox, oy) = ((x * factor) as isize - pad, (y * factor) as isize - pad);
        let mut acc = 0.0f32;
        for ((r, c), &w) in taps.indexed_iter() {
            let sx = clamp_index(ox + c as isize, src.w);
            let sy = clamp_index(oy + r as isize, src.h);
            acc += w * src.get(sx, sy);
        }
        acc
    })
}

/// Nearest-neighbour upsampling by an integer factor.
pub fn upsample_nearest(src: &ImageF32, factor: usize) -> ImageF32 {
    let factor = factor.max(1);
    ImageF32::from_fn(src.w * factor, src.h * factor, |x, y| {
        src.get(x / factor, y / factor)
    })
}

fn filter_row_downsample(
    row: &[f32],
    out: &mut [f32],
    taps: &[f32],
    factor: usize,
    pad: usize,
    border: Border,
) {
    if row.is_empty() || out.is_empty() {
        return;
    }
    let len = row.len();
    for (i, dst_px) in out.iter_mut().enumerate() {
        let origin = (i * factor) as isize - pad as isize;
        let mut acc = 0.0f32;
        for (k, &tap) in taps.iter().enumerate() {
            let idx = origin + k as isize;
            let sample = match border {
                Border::Zero => {
                    if idx < 0 || idx as usize >= len {
                        continue;
                    }
                    row[idx as usize]
                }
                Border::Clamp => row[clamp_index(idx, len)],
            };
            acc += tap * sample;
        }
        *dst_px = acc;
    }
}

fn clamp_index(idx: isize, upper: usize) -> usize {
    if upper == 0 {
        return 0;
    }
    if idx < 0 {
        0
    } else if (idx as usize) >= upper {
        upper - 1
    } else {
        idx as usize
    }
}
