//! Compute context threaded through every network constructor.
//!
//! The estimator never relies on an ambient device: networks, parameters and
//! optimisers are created against an explicit [`ComputeContext`], and every
//! parameter buffer records the [`Device`] that owns it.
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Cpu,
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ComputeContext {
    device: Device,
}

impl ComputeContext {
    pub fn new(device: Device) -> Self {
        Self { device }
    }

    pub fn cpu() -> Self {
        Self::new(Device::Cpu)
    }

    pub fn device(&self) -> Device {
        self.device
    }
}
