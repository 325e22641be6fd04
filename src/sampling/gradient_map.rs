//! Gradient-weighted importance maps for crop sampling.
//!
//! - Central-difference gradients (one-sided on the outermost pixels).
//! - Per-axis absolute gradients clipped at a percentile, combined with the
//!   magnitude and smoothed with a box window.
//! - Probability map over crop centres: box-summed importance with a border of
//!   half a crop zeroed so every centre yields a crop inside the image.
//!
//! Box windows follow the "same" convention: a window of size `m` around
//! pixel `i` covers `[i - m/2, i + (m-1)/2]`, zero outside the image.
use crate::image::{ImageF32, ImageView, ImageViewMut};

/// Width of the zeroed border and of the smoothing window.
pub const GRADIENT_WINDOW: usize = 5;
/// Percentile above which per-axis gradients saturate.
pub const CLIP_PERCENTILE: f32 = 0.97;

/// Central-difference derivatives along x (columns) and y (rows).
pub fn central_gradients(img: &ImageF32) -> (ImageF32, ImageF32) {
    let (w, h) = (img.w, img.h);
    let mut gx = ImageF32::new(w, h);
    let mut gy = ImageF32::new(w, h);
    for y in 0..h {
        let out = gx.row_mut(y);
        let row = img.row(y);
        for x in 0..w {
            out[x] = axis_difference(row, x);
        }
    }
    let mut column = vec![0.0f32; h];
    for x in 0..w {
        for (y, v) in column.iter_mut().enumerate() {
            *v = img.get(x, y);
        }
        for y in 0..h {
            gy.set(x, y, axis_difference(&column, y));
        }
    }
    (gx, gy)
}

fn axis_difference(line: &[f32], i: usize) -> f32 {
    let n = line.len();
    if n < 2 {
        return 0.0;
    }
    if i == 0 {
        line[1] - line[0]
    } else if i == n - 1 {
        line[n - 1] - line[n - 2]
    } else {
        0.5 * (line[i + 1] - line[i - 1])
    }
}

/// Zero a border of width `edge` without changing the image size.
pub fn zero_border(img: &mut ImageF32, edge: usize) {
    if edge == 0 {
        return;
    }
    for y in 0..img.h {
        let inside_rows = y >= edge && y + edge < img.h;
        let row = img.row_mut(y);
        let w = row.len();
        for (x, v) in row.iter_mut().enumerate() {
            if !inside_rows || x < edge || x + edge >= w {
                *v = 0.0;
            }
        }
    }
}

/// Saturate values at the given percentile and shift them to start at zero.
///
/// `v_min` is the sorted value at `percentile · n`; `v_max` the next one, or
/// `v_min + 1e-5` when they tie.
pub fn clip_extreme(img: &ImageF32, percentile: f32) -> ImageF32 {
    let n = img.data.len();
    if n == 0 {
        return img.clone();
    }
    let mut sorted = img.data.clone();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let pivot = ((percentile * n as f32) as usize).min(n - 1);
    let v_min = sorted[pivot];
    let v_max = match sorted.get(pivot + 1) {
        Some(&next) if next > v_min => next,
        _ => v_min + 1e-5,
    };
    let data = img
        .data
        .iter()
        .map(|&v| v.clamp(v_min, v_max) - v_min)
        .collect();
    ImageF32 {
        data,
        ..img.clone()
    }
}

/// Sum over a `size × size` window centred "same"-style, zero outside.
pub fn box_sum(img: &ImageF32, size: usize) -> ImageF32 {
    if size <= 1 {
        return img.clone();
    }
    let before = size / 2;
    let after = (size - 1) / 2;
    let (w, h) = (img.w, img.h);

    let mut horizontal = ImageF32::new(w, h);
    for y in 0..h {
        let row = img.row(y);
        let out = horizontal.row_mut(y);
        window_sums(row, out, before, after);
    }

    let mut out = ImageF32::new(w, h);
    let mut column = vec![0.0f32; h];
    let mut summed = vec![0.0f32; h];
    for x in 0..w {
        for (y, v) in column.iter_mut().enumerate() {
            *v = horizontal.get(x, y);
        }
        window_sums(&column, &mut summed, before, after);
        for (y, &v) in summed.iter().enumerate() {
            out.set(x, y, v);
        }
    }
    out
}

fn window_sums(line: &[f32], out: &mut [f32], before: usize, after: usize) {
    let n = line.len();
    let mut prefix = vec![0.0f64; n + 1];
    for (i, &v) in line.iter().enumerate() {
        prefix[i + 1] = prefix[i] + v as f64;
    }
    for (i, dst) in out.iter_mut().enumerate() {
        let lo = i.saturating_sub(before);
        let hi = (i + after + 1).min(n);
        *dst = (prefix[hi] - prefix[lo]) as f32;
    }
}

/// Importance map of textured regions, normalised to mean one.
///
/// Flat images (or images too small to survive the zeroed border) produce a
/// uniform map.
pub fn gradient_map(img: &ImageF32) -> ImageF32 {
    let (gx, gy) = central_gradients(img);
    let mut mag = ImageF32::new(img.w, img.h);
    for ((m, &x), &y) in mag.data.iter_mut().zip(&gx.data).zip(&gy.data) {
        *m = (x * x + y * y).sqrt();
    }
    let mut abs_x = ImageF32 {
        data: gx.data.iter().map(|v| v.abs()).collect(),
        ..gx
    };
    let mut abs_y = ImageF32 {
        data: gy.data.iter().map(|v| v.abs()).collect(),
        ..gy
    };
    zero_border(&mut abs_x, GRADIENT_WINDOW);
    zero_border(&mut abs_y, GRADIENT_WINDOW);
    zero_border(&mut mag, GRADIENT_WINDOW);

    let clipped_x = clip_extreme(&abs_x, CLIP_PERCENTILE);
    let clipped_y = clip_extreme(&abs_y, CLIP_PERCENTILE);

    let mut combined = ImageF32::new(img.w, img.h);
    for part in [&clipped_x, &clipped_y, &mag] {
        let total = part.sum();
        if total > 0.0 && total.is_finite() {
            for (c, &v) in combined.data.iter_mut().zip(&part.data) {
                *c += v / total;
            }
        }
    }

    let window_area = (GRADIENT_WINDOW * GRADIENT_WINDOW) as f32;
    let mut blurred = box_sum(&combined, GRADIENT_WINDOW);
    blurred.data.iter_mut().for_each(|v| *v /= window_area);
    let mean = blurred.mean();
    if mean > 0.0 && mean.is_finite() {
        blurred.data.iter_mut().for_each(|v| *v /= mean);
    } else {
        blurred.data.iter_mut().for_each(|v| *v = 1.0);
    }
    blurred
}

/// Probability of each pixel being chosen as the centre of a `crop`-sized
/// window, flattened row-major. Sums to one.
pub fn probability_map(importance: &ImageF32, crop: usize) -> Vec<f64> {
    let half = crop / 2;
    let mut blurred = box_sum(importance, half);
    if half > 0 {
        let area = (half * half) as f32;
        blurred.data.iter_mut().for_each(|v| *v /= area);
    }
    zero_border(&mut blurred, half);
    let total: f64 = blurred.data.iter().map(|&v| v as f64).sum();
    let n = blurred.data.len().max(1);
    if total > 0.0 && total.is_finite() {
        blurred.data.iter().map(|&v| v as f64 / total).collect()
    } else {
        vec![1.0 / n as f64; blurred.data.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn central_gradients_follow_ramp() {
        let img = ImageF32::from_fn(8, 6, |x, y| 2.0 * x as f32 + 0.5 * y as f32);
        let (gx, gy) = central_gradients(&img);
        for y in 0..6 {
            for x in 0..8 {
                assert!((gx.get(x, y) - 2.0).abs() < 1e-5);
                assert!((gy.get(x, y) - 0.5).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn clip_extreme_saturates_top_values() {
        let img = ImageF32::from_fn(10, 10, |x, y| (y * 10 + x) as f32);
        let clipped = clip_extreme(&img, 0.97);
        // v_min = 97, v_max = 98.
        assert_eq!(clipped.get(0, 0), 0.0);
        assert_eq!(clipped.get(9, 9), 1.0);
        assert_eq!(clipped.get(8, 9), 1.0);
        assert_eq!(clipped.get(7, 9), 0.0);
    }

    #[test]
    fn box_sum_uses_same_window() {
        let img = ImageF32::from_fn(6, 1, |_, _| 1.0);
        let even = box_sum(&img, 4);
        // Window [i-2, i+1].
        let expected = [2.0, 3.0, 4.0, 4.0, 4.0, 3.0];
        for (x, want) in expected.iter().enumerate() {
            // Single row, so only the horizontal window contributes rows [0].
            assert!((even.get(x, 0) - want).abs() < 1e-6, "x={x}");
        }
    }

    #[test]
    fn gradient_map_prefers_textured_half() {
        let img = ImageF32::from_fn(48, 48, |x, y| {
            if x < 24 {
                0.5
            } else {
                ((x * 7 + y * 13) % 5) as f32 / 5.0
            }
        });
        let map = gradient_map(&img);
        assert!((map.mean() - 1.0).abs() < 1e-4);
        let left: f32 = (8..40).map(|y| map.get(10, y)).sum();
        let right: f32 = (8..40).map(|y| map.get(36, y)).sum();
        assert!(right > left, "left={left} right={right}");
    }

    #[test]
    fn probability_map_ignores_border_centres() {
        let importance = ImageF32::from_fn(20, 20, |_, _| 1.0);
        let probs = probability_map(&importance, 8);
        let total: f64 = probs.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert_eq!(probs[0], 0.0);
        assert_eq!(probs[3 * 20 + 10], 0.0);
        assert!(probs[10 * 20 + 10] > 0.0);
    }

    #[test]
    fn flat_image_gives_uniform_map() {
        let img = ImageF32::from_fn(16, 16, |_, _| 0.3);
        let map = gradient_map(&img);
        assert!(map.data.iter().all(|&v| (v - 1.0).abs() < 1e-6));
    }
}
