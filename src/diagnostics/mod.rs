//! Diagnostics produced alongside the estimated kernel.
//!
//! Nothing here feeds back into training: the [`TrainingRecord`] collects the
//! per-iteration losses and [`TimingBreakdown`] the wall-clock cost of each
//! phase. Both serialise to camelCase JSON.
pub mod record;
pub mod timing;

pub use record::{IterationLosses, TrainingRecord};
pub use timing::{elapsed_ms, StageTiming, TimingBreakdown};
