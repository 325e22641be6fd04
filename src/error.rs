//! Error type shared by every stage of the estimator.
use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum EstimatorError {
    /// Crop sizes, kernel size and network shaves do not fit together.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("non-finite {term} loss at iteration {iteration}")]
    NonFiniteLoss { iteration: usize, term: &'static str },
    /// Post-processing could not normalise the kernel.
    #[error("degenerate kernel: {0}")]
    DegenerateKernel(String),
    #[error("failed to access {1:?}")]
    Io(#[source] io::Error, PathBuf),
    #[error("failed to read or write image {1:?}")]
    Image(#[source] image::ImageError, PathBuf),
    #[error("failed to (de)serialize JSON {1:?}")]
    Json(#[source] serde_json::Error, PathBuf),
    #[error("failed to write array file {1:?}")]
    Npz(#[source] io::Error, PathBuf),
}

pub type Result<T> = std::result::Result<T, EstimatorError>;
