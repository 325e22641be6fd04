//! Kernel files: `.npz` archives (array keyed `Kernel`) for the downstream
//! super-resolution stage and `.png` renderings for inspection.
use super::{EstimatedKernels, Kernel};
use crate::error::{EstimatorError, Result};
use crate::image::io::ensure_parent_dir;
use image::{GrayImage, Luma};
use ndarray::Array2;
use npyz::npz::{NpzArchive, NpzWriter};
use npyz::WriterBuilder;
use std::io;
use std::path::{Path, PathBuf};

/// Name of the array inside every kernel archive.
pub const KERNEL_KEY: &str = "Kernel";
/// Side in pixels of one kernel entry in the PNG rendering.
pub const PNG_CELL: u32 = 16;

/// `<name>_kernel_x<sf>`, the stem shared by every file of one kernel.
pub fn kernel_file_stem(name: &str, scale_factor: usize) -> String {
    format!("{name}_kernel_x{scale_factor}")
}

pub fn write_kernel_npz(kernel: &Kernel, path: &Path) -> Result<()> {
    ensure_parent_dir(path)?;
    let npz_err = |e: io::Error| EstimatorError::Npz(e, path.to_path_buf());
    let shape = [kernel.size() as u64, kernel.size() as u64];
    let mut npz = NpzWriter::create(path).map_err(npz_err)?;
    let mut writer: npyz::NpyWriter<f64, _> = npz
        .array(KERNEL_KEY, Default::default())
        .map_err(npz_err)?
        .default_dtype()
        .shape(&shape)
        .begin_nd()
        .map_err(npz_err)?;
    writer
        .extend(kernel.values().iter().copied())
        .map_err(npz_err)?;
    writer.finish().map_err(npz_err)
}

pub fn read_kernel_npz(path: &Path) -> Result<Kernel> {
    let npz_err = |e: io::Error| EstimatorError::Npz(e, path.to_path_buf());
    let mut archive = NpzArchive::open(path).map_err(npz_err)?;
    let npy = archive.by_name(KERNEL_KEY).map_err(npz_err)?.ok_or_else(|| {
        npz_err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("array {KERNEL_KEY:?} missing"),
        ))
    })?;
    let shape: Vec<usize> = npy.shape().iter().map(|&d| d as usize).collect();
    let data: Vec<f64> = npy.into_vec().map_err(npz_err)?;
    let &[rows, cols] = shape.as_slice() else {
        return Err(EstimatorError::ShapeMismatch(format!(
            "kernel array in {} has shape {shape:?}",
            path.display()
        )));
    };
    let values = Array2::from_shape_vec((rows, cols), data).map_err(|e| {
        EstimatorError::ShapeMismatch(format!("kernel array in {}: {e}", path.display()))
    })?;
    Ok(Kernel::new(values))
}

/// Grayscale rendering normalised by the kernel maximum.
pub fn write_kernel_png(kernel: &Kernel, path: &Path) -> Result<()> {
    ensure_parent_dir(path)?;
    let size = kernel.size() as u32;
    let peak = kernel.max();
    let scale = if peak > 0.0 { 255.0 / peak } else { 0.0 };
    let img = GrayImage::from_fn(size * PNG_CELL, size * PNG_CELL, |x, y| {
        let v = kernel.values()[[(y / PNG_CELL) as usize, (x / PNG_CELL) as usize]];
        Luma([(v * scale).clamp(0.0, 255.0).round() as u8])
    });
    img.save(path)
        .map_err(|e| EstimatorError::Image(e, path.to_path_buf()))
}

/// Write the final kernels into `output_dir`:
/// `<name>_kernel_x<sf>.{npz,png}` and, when present, the composed
/// `<name>_kernel_x<sf²>.{npz,png}`. Returns the written paths.
pub fn write_estimated_kernels(
    kernels: &EstimatedKernels,
    output_dir: &Path,
    name: &str,
    scale_factor: usize,
) -> Result<Vec<PathBuf>> {
    write_kernel_files(kernels, output_dir, name, scale_factor, "")
}

/// Same layout as [`write_estimated_kernels`] with `suffix` appended to every
/// file stem.
pub fn write_kernel_files(
    kernels: &EstimatedKernels,
    output_dir: &Path,
    name: &str,
    scale_factor: usize,
    suffix: &str,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(4);
    let mut write_pair = |kernel: &Kernel, factor: usize| -> Result<()> {
        let stem = format!("{}{suffix}", kernel_file_stem(name, factor));
        let npz = output_dir.join(format!("{stem}.npz"));
        let png = output_dir.join(format!("{stem}.png"));
        write_kernel_npz(kernel, &npz)?;
        write_kernel_png(kernel, &png)?;
        written.extend([npz, png]);
        Ok(())
    };
    write_pair(&kernels.base, scale_factor)?;
    if let Some(composed) = &kernels.composed {
        write_pair(composed, scale_factor * scale_factor)?;
    }
    Ok(written)
}
