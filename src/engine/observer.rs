//! Progress reporting hooks.
//!
//! The engine never logs by itself; it reports to an [`Observer`] passed to
//! [`KernelEstimator::estimate`](super::KernelEstimator::estimate).
//! [`LogObserver`] forwards everything to the `log` facade.
use super::schedule::ScheduleEvent;
use super::EstimationReport;
use crate::config::EstimatorConfig;
use crate::diagnostics::IterationLosses;
use crate::kernel::EstimatedKernels;
use log::{debug, info, warn};
use std::ops::ControlFlow;

pub trait Observer {
    fn on_start(&mut self, _config: &EstimatorConfig) {}

    /// Called after every iteration. Returning `Break` stops training; the
    /// kernel of the current weights is still post-processed and returned.
    fn on_iteration(&mut self, _losses: &IterationLosses) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }

    fn on_schedule(&mut self, _iteration: usize, _event: &ScheduleEvent) {}

    fn on_checkpoint(&mut self, _iteration: usize, _kernels: &EstimatedKernels) {}

    fn on_finish(&mut self, _report: &EstimationReport) {}
}

/// Observer that ignores every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullObserver;

impl Observer for NullObserver {}

/// Observer writing through the `log` macros.
#[derive(Clone, Debug)]
pub struct LogObserver {
    log_every: usize,
}

impl LogObserver {
    /// Log the losses every `log_every` iterations (at least every one).
    pub fn new(log_every: usize) -> Self {
        Self {
            log_every: log_every.max(1),
        }
    }
}

impl Default for LogObserver {
    fn default() -> Self {
        Self::new(100)
    }
}

impl Observer for LogObserver {
    fn on_start(&mut self, config: &EstimatorConfig) {
        info!(
            "kernel estimation start: kernel={} sf={} crop={} iters={} device={}",
            config.kernel_size,
            config.scale_factor,
            config.input_crop_size,
            config.max_iters,
            config.device
        );
    }

    fn on_iteration(&mut self, losses: &IterationLosses) -> ControlFlow<()> {
        if let Some(term) = losses.non_finite_term() {
            warn!(
                "iteration {}: non-finite {term} loss, continuing",
                losses.iteration
            );
        }
        if losses.iteration % self.log_every == 0 {
            debug!(
                "iteration {} g_total={:.5} adv={:.4} d_real={:.4} d_fake={:.4} bicubic={:.5}",
                losses.iteration,
                losses.generator_total,
                losses.adversarial,
                losses.discriminator_real,
                losses.discriminator_fake,
                losses.bicubic()
            );
        }
        ControlFlow::Continue(())
    }

    fn on_schedule(&mut self, iteration: usize, event: &ScheduleEvent) {
        match event {
            ScheduleEvent::LearningRateDecayed {
                generator_lr,
                discriminator_lr,
            } => info!(
                "iteration {iteration}: learning rates -> g={generator_lr:.2e} d={discriminator_lr:.2e}"
            ),
            ScheduleEvent::BicubicReached => {
                info!("iteration {iteration}: generator is close to bicubic downscaling")
            }
            ScheduleEvent::BicubicDecayed { lambda } => {
                info!("iteration {iteration}: lambda_bicubic -> {lambda:.2e}")
            }
            ScheduleEvent::ConstraintsInserted {
                centralized,
                sparse,
            } => info!(
                "iteration {iteration}: lambda_centralized -> {centralized}, lambda_sparse -> {sparse}"
            ),
        }
    }

    fn on_checkpoint(&mut self, iteration: usize, kernels: &EstimatedKernels) {
        info!(
            "checkpoint at iteration {iteration}: kernel {}x{}",
            kernels.base.size(),
            kernels.base.size()
        );
    }

    fn on_finish(&mut self, report: &EstimationReport) {
        info!(
            "kernel estimation done: {} iterations in {:.1} ms",
            report.record.len(),
            report.timings.total_ms
        );
        for stage in &report.timings.stages {
            debug!("  {}: {:.1} ms", stage.label, stage.elapsed_ms);
        }
    }
}
