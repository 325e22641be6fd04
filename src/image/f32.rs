//! Owned single-channel f32 image in row-major layout (stride == width).
//!
//! Suited for numeric processing in the estimator. Provides row access,
//! cropping helpers and explicit conversions to and from
//! `ndarray::Array2<f32>`, the array type used by the networks.
use super::traits::{ImageView, ImageViewMut};
use ndarray::Array2;

#[derive(Clone, Debug, PartialEq)]
pub struct ImageF32 {
    /// Image width in pixels
    pub w: usize,
    /// Image height in pixels
    pub h: usize,
    /// Number of f32 elements between consecutive rows (equals `w`)
    pub stride: usize,
    /// Backing storage in row-major order
    pub data: Vec<f32>,
}

impl ImageF32 {
    /// Construct a zero-initialized buffer of size `w × h`.
    pub fn new(w: usize, h: usize) -> Self {
        Self {
            w,
            h,
            stride: w,
            data: vec![0.0; w * h],
        }
    }

    /// Construct an image by evaluating `f(x, y)` at every pixel.
    pub fn from_fn(w: usize, h: usize, mut f: impl FnMut(usize, usize) -> f32) -> Self {
        let mut data = Vec::with_capacity(w * h);
        for y in 0..h {
            for x in 0..w {
                data.push(f(x, y));
            }
        }
        Self {
            w,
            h,
            stride: w,
            data,
        }
    }

    #[inline]
    /// Convert (x, y) to a linear index into `data`.
    pub fn idx(&self, x: usize, y: usize) -> usize {
        y * self.stride + x
    }
    #[inline]
    /// Get the pixel value at (x, y).
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[self.idx(x, y)]
    }
    #[inline]
    /// Set the pixel value at (x, y).
    pub fn set(&mut self, x: usize, y: usize, v: f32) {
        let i = self.idx(x, y);
        self.data[i] = v;
    }

    /// Copy the `w × h` window whose top-left corner is `(left, top)`.
    ///
    /// The window must lie inside the image.
    pub fn crop(&self, left: usize, top: usize, w: usize, h: usize) -> ImageF32 {
        debug_assert!(left + w <= self.w && top + h <= self.h);
        let mut out = ImageF32::new(w, h);
        for y in 0..h {
            let src = &self.data[self.idx(left, top + y)..self.idx(left, top + y) + w];
            out.data[y * w..(y + 1) * w].copy_from_slice(src);
        }
        out
    }

    /// Shave the image symmetrically down to `w × h`.
    ///
    /// When the excess is odd the extra row/column is removed from the
    /// bottom/right side.
    pub fn shave_to(&self, w: usize, h: usize) -> ImageF32 {
        let shave_x = self.w.saturating_sub(w);
        let shave_y = self.h.saturating_sub(h);
        self.crop(
            shave_x / 2,
            shave_y / 2,
            self.w - shave_x,
            self.h - shave_y,
        )
    }

    pub fn sum(&self) -> f32 {
        self.data.iter().sum()
    }

    pub fn mean(&self) -> f32 {
        self.sum() / (self.data.len().max(1) as f32)
    }
}

impl From<&ImageF32> for Array2<f32> {
    fn from(image: &ImageF32) -> Self {
        Array2::from_shape_fn((image.h, image.w), |(y, x)| image.get(x, y))
    }
}

impl From<Array2<f32>> for ImageF32 {
    fn from(array: Array2<f32>) -> Self {
        let (h, w) = array.dim();
        let data = array.iter().copied().collect();
        Self {
            w,
            h,
            stride: w,
            data,
        }
    }
}

impl ImageView for ImageF32 {
    type Pixel = f32;

    #[inline]
    fn width(&self) -> usize {
        self.w
    }
    #[inline]
    fn height(&self) -> usize {
        self.h
    }
    #[inline]
    fn row(&self, y: usize) -> &[f32] {
        let start = y * self.stride;
        &self.data[start..start + self.w]
    }
}

impl ImageViewMut for ImageF32 {
    #[inline]
    fn row_mut(&mut self, y: usize) -> &mut [f32] {
        let start = y * self.stride;
        &mut self.data[start..start + self.w]
    }
}
