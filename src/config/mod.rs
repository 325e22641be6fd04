//! JSON configuration for the estimator and its command-line tool.
pub mod estimator;

pub use estimator::{
    DiscriminatorOptions, EstimatorConfig, GeneratorOptions, LossCoefficients, OptimOptions,
    ScheduleOptions,
};

use crate::error::{EstimatorError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration of one estimation run of the binary.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunConfig {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    /// Prefix of every output file; defaults to the input file stem.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub estimator: EstimatorConfig,
}

impl RunConfig {
    pub fn run_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            self.input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "image".to_string())
        })
    }
}

pub fn load_config(path: &Path) -> Result<RunConfig> {
    load_json(path)
}

/// Read and deserialise any JSON document, tagging errors with `path`.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents =
        fs::read_to_string(path).map_err(|e| EstimatorError::Io(e, path.to_path_buf()))?;
    serde_json::from_str(&contents).map_err(|e| EstimatorError::Json(e, path.to_path_buf()))
}
