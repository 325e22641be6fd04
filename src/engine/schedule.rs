//! Deterministic learning-rate and coefficient schedule.
//!
//! Runs after every completed iteration (iteration 0 excluded):
//! - every `lr_update_every` iterations both learning rates are divided by
//!   `lr_decay`;
//! - every `lambda_update_every` iterations the bicubic loss is checked; the
//!   Generator counts as bicubic-like once it stayed under
//!   `bicubic_threshold` for more than `bicubic_patience` consecutive checks;
//! - from then on, on the same cadence, λ_bicubic is divided by
//!   `bicubic_decay` (floored at `bicubic_min`), and the first time it falls
//!   under `insert_constraints_below` the centralized and sparse terms are
//!   switched on.
use crate::config::{LossCoefficients, ScheduleOptions};
use crate::nn::Adam;

/// Something the schedule changed, reported to the observer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ScheduleEvent {
    LearningRateDecayed { generator_lr: f32, discriminator_lr: f32 },
    BicubicReached,
    BicubicDecayed { lambda: f32 },
    ConstraintsInserted { centralized: f32, sparse: f32 },
}

#[derive(Clone, Debug)]
pub struct Schedule {
    options: ScheduleOptions,
    similar_to_bicubic: bool,
    bicubic_checks: usize,
    constraints_pending: bool,
}

impl Schedule {
    pub fn new(options: ScheduleOptions) -> Self {
        Self {
            options,
            similar_to_bicubic: false,
            bicubic_checks: 0,
            constraints_pending: true,
        }
    }

    pub fn options(&self) -> &ScheduleOptions {
        &self.options
    }

    pub fn similar_to_bicubic(&self) -> bool {
        self.similar_to_bicubic
    }

    /// Apply the schedule after `iteration` finished with `bicubic_loss`.
    pub fn update(
        &mut self,
        iteration: usize,
        bicubic_loss: f32,
        coefficients: &mut LossCoefficients,
        g_optim: &mut Adam,
        d_optim: &mut Adam,
    ) -> Vec<ScheduleEvent> {
        let mut events = Vec::new();
        let o = &self.options;
        if !o.enabled || iteration == 0 {
            return events;
        }

        if o.lr_update_every > 0 && iteration % o.lr_update_every == 0 && o.lr_decay > 0.0 {
            g_optim.set_lr(g_optim.lr() / o.lr_decay);
            d_optim.set_lr(d_optim.lr() / o.lr_decay);
            events.push(ScheduleEvent::LearningRateDecayed {
                generator_lr: g_optim.lr(),
                discriminator_lr: d_optim.lr(),
            });
        }

        let on_lambda_cadence = o.lambda_update_every > 0 && iteration % o.lambda_update_every == 0;
        if !on_lambda_cadence {
            return events;
        }
        if !self.similar_to_bicubic {
            if bicubic_loss < o.bicubic_threshold {
                if self.bicubic_checks >= o.bicubic_patience {
                    self.similar_to_bicubic = true;
                    events.push(ScheduleEvent::BicubicReached);
                } else {
                    self.bicubic_checks += 1;
                }
            } else {
                self.bicubic_checks = 0;
            }
        } else if coefficients.bicubic > o.bicubic_min {
            coefficients.bicubic = (coefficients.bicubic / o.bicubic_decay).max(o.bicubic_min);
            events.push(ScheduleEvent::BicubicDecayed {
                lambda: coefficients.bicubic,
            });
            if self.constraints_pending && coefficients.bicubic < o.insert_constraints_below {
                coefficients.centralized = o.centralized_end;
                coefficients.sparse = o.sparse_end;
                self.constraints_pending = false;
                events.push(ScheduleEvent::ConstraintsInserted {
                    centralized: coefficients.centralized,
                    sparse: coefficients.sparse,
                });
            }
        }
        events
    }
}
