//! Destinations for kernels emitted while training is still running.
use crate::error::Result;
use crate::kernel::io::write_kernel_files;
use crate::kernel::EstimatedKernels;
use std::path::{Path, PathBuf};

/// Receives the post-processed kernel of the current weights every
/// `checkpoint_every` iterations. Sinks never see the training state.
pub trait CheckpointSink {
    fn on_checkpoint(&mut self, iteration: usize, kernels: &EstimatedKernels) -> Result<()>;
}

/// Drops every checkpoint.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCheckpoints;

impl CheckpointSink for NoCheckpoints {
    fn on_checkpoint(&mut self, _iteration: usize, _kernels: &EstimatedKernels) -> Result<()> {
        Ok(())
    }
}

impl<F> CheckpointSink for F
where
    F: FnMut(usize, &EstimatedKernels) -> Result<()>,
{
    fn on_checkpoint(&mut self, iteration: usize, kernels: &EstimatedKernels) -> Result<()> {
        self(iteration, kernels)
    }
}

/// Writes `<name>_kernel_x<sf>_iteration_<i>.{npz,png}`, plus the composed
/// `x<sf²>` pair when present, overwriting files of the same iteration.
#[derive(Clone, Debug)]
pub struct FileCheckpointSink {
    output_dir: PathBuf,
    name: String,
    scale_factor: usize,
}

impl FileCheckpointSink {
    pub fn new(output_dir: impl Into<PathBuf>, name: impl Into<String>, scale_factor: usize) -> Self {
        Self {
            output_dir: output_dir.into(),
            name: name.into(),
            scale_factor,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write the checkpoint files of `iteration` and return their paths.
    pub fn write(&self, iteration: usize, kernels: &EstimatedKernels) -> Result<Vec<PathBuf>> {
        write_kernel_files(
            kernels,
            &self.output_dir,
            &self.name,
            self.scale_factor,
            &format!("_iteration_{iteration}"),
        )
    }
}

impl CheckpointSink for FileCheckpointSink {
    fn on_checkpoint(&mut self, iteration: usize, kernels: &EstimatedKernels) -> Result<()> {
        self.write(iteration, kernels).map(|_| ())
    }
}
