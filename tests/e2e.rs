mod common;

use common::init_logging;
use common::synthetic_image::{degraded_scene, gaussian_degraded, scene};
use kernel_estimator::config::{DiscriminatorOptions, GeneratorOptions, ScheduleOptions};
use kernel_estimator::diagnostics::IterationLosses;
use kernel_estimator::engine::{
    train_step, FileCheckpointSink, LogObserver, NoCheckpoints, NullObserver, Observer,
    ScheduleEvent,
};
use kernel_estimator::kernel::{recenter, EstimatedKernels};
use kernel_estimator::{ComputeContext, EstimatorConfig, EstimatorError, KernelEstimator};
use std::ops::ControlFlow;

/// Small networks so that a handful of iterations stay cheap.
fn small_config(max_iters: usize) -> EstimatorConfig {
    EstimatorConfig {
        max_iters,
        generator: GeneratorOptions {
            channels: 6,
            ..Default::default()
        },
        discriminator: DiscriminatorOptions {
            channels: 8,
            n_layers: 3,
            ..Default::default()
        },
        ..Default::default()
    }
}

#[test]
fn short_run_produces_clean_kernels_and_record() {
    init_logging();
    let config = EstimatorConfig {
        compose_larger: true,
        checkpoint_every: Some(2),
        ..small_config(5)
    };
    let estimator = KernelEstimator::new(config, ComputeContext::cpu()).expect("config");
    let image = degraded_scene();

    let mut checkpoints = Vec::new();
    let mut sink = |iteration: usize, kernels: &EstimatedKernels| -> kernel_estimator::Result<()> {
        checkpoints.push((iteration, kernels.base.sum()));
        Ok(())
    };
    let report = estimator
        .estimate(&image, &mut LogObserver::new(1), &mut sink)
        .expect("estimate");

    assert_eq!(report.record.len(), 5);
    let iterations: Vec<usize> = report.record.iterations.iter().map(|l| l.iteration).collect();
    assert_eq!(iterations, vec![0, 1, 2, 3, 4]);
    assert!(report
        .record
        .iterations
        .iter()
        .all(|l| l.non_finite_term().is_none()));

    approx::assert_abs_diff_eq!(report.kernels.base.sum(), 1.0, epsilon = 1e-5);
    assert!(report.kernels.composed.is_some());

    assert_eq!(checkpoints.len(), 2);
    assert_eq!(checkpoints[0].0, 2);
    assert_eq!(checkpoints[1].0, 4);
    for (_, sum) in &checkpoints {
        approx::assert_abs_diff_eq!(*sum, 1.0, epsilon = 1e-5);
    }
    assert!(report.timings.stage("training").is_some());
}

#[test]
fn runs_are_reproducible_for_a_seed() {
    let estimator = KernelEstimator::new(small_config(3), ComputeContext::cpu()).expect("config");
    let image = degraded_scene();
    let a = estimator
        .estimate(&image, &mut NullObserver, &mut NoCheckpoints)
        .expect("first run");
    let b = estimator
        .estimate(&image, &mut NullObserver, &mut NoCheckpoints)
        .expect("second run");
    assert_eq!(a.record, b.record);
    assert_eq!(a.kernels, b.kernels);
}

struct StopAfter(usize);

impl Observer for StopAfter {
    fn on_iteration(&mut self, losses: &IterationLosses) -> ControlFlow<()> {
        if losses.iteration + 1 >= self.0 {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }
}

#[test]
fn observer_can_stop_between_iterations() {
    let estimator = KernelEstimator::new(small_config(50), ComputeContext::cpu()).expect("config");
    let report = estimator
        .estimate(&degraded_scene(), &mut StopAfter(3), &mut NoCheckpoints)
        .expect("estimate");
    assert_eq!(report.record.len(), 3);
    approx::assert_abs_diff_eq!(report.kernels.base.sum(), 1.0, epsilon = 1e-5);
}

#[test]
fn checkpoints_land_in_output_dir() {
    let dir = tempfile::tempdir().expect("temp dir");
    let config = EstimatorConfig {
        checkpoint_every: Some(1),
        ..small_config(2)
    };
    let estimator = KernelEstimator::new(config, ComputeContext::cpu()).expect("config");
    let mut sink = FileCheckpointSink::new(dir.path(), "scene", 2);
    estimator
        .estimate(&degraded_scene(), &mut NullObserver, &mut sink)
        .expect("estimate");
    assert!(dir.path().join("scene_kernel_x2_iteration_1.npz").exists());
    assert!(dir.path().join("scene_kernel_x2_iteration_1.png").exists());
    assert!(!dir.path().join("scene_kernel_x4_iteration_1.npz").exists());
    // The last iteration is covered by the final result, not a checkpoint.
    assert!(!dir.path().join("scene_kernel_x2_iteration_2.npz").exists());
}

#[test]
fn too_small_image_is_a_shape_mismatch() {
    let estimator = KernelEstimator::new(small_config(1), ComputeContext::cpu()).expect("config");
    let tiny = scene(60, 1);
    let err = estimator
        .estimate(&tiny, &mut NullObserver, &mut NoCheckpoints)
        .expect_err("image smaller than the crop");
    assert!(matches!(err, EstimatorError::ShapeMismatch(_)));
}

#[test]
fn non_finite_loss_aborts_by_default() {
    let mut config = small_config(3);
    config.coefficients.bicubic = f32::INFINITY;
    let estimator = KernelEstimator::new(config, ComputeContext::cpu()).expect("config");
    let err = estimator
        .estimate(&degraded_scene(), &mut NullObserver, &mut NoCheckpoints)
        .expect_err("infinite coefficient");
    assert!(matches!(err, EstimatorError::NonFiniteLoss { .. }), "{err}");
}

#[test]
fn non_finite_loss_is_recorded_when_not_aborting() {
    let mut config = small_config(3);
    config.coefficients.bicubic = f32::INFINITY;
    config.abort_on_non_finite = false;
    let estimator = KernelEstimator::new(config, ComputeContext::cpu()).expect("config");
    let mut state = estimator.initial_state(&degraded_scene()).expect("state");
    for _ in 0..3 {
        train_step(&mut state).expect("training continues");
    }
    assert_eq!(state.record.len(), 3);
    assert!(state
        .record
        .last()
        .and_then(IterationLosses::non_finite_term)
        .is_some());
}

#[test]
fn aborted_iteration_is_recorded_without_touching_weights() {
    let mut config = small_config(3);
    config.coefficients.bicubic = f32::INFINITY;
    let estimator = KernelEstimator::new(config, ComputeContext::cpu()).expect("config");
    let mut state = estimator.initial_state(&degraded_scene()).expect("state");
    let before = state.raw_kernel();

    let err = train_step(&mut state).expect_err("infinite coefficient");
    assert!(
        matches!(err, EstimatorError::NonFiniteLoss { iteration: 0, term: "generator_total" }),
        "{err}"
    );
    assert_eq!(state.record.len(), 1);
    assert_eq!(state.iteration, 0);
    assert_eq!(state.raw_kernel(), before);
}

#[derive(Default)]
struct ScheduleLog(Vec<(usize, ScheduleEvent)>);

impl Observer for ScheduleLog {
    fn on_schedule(&mut self, iteration: usize, event: &ScheduleEvent) {
        self.0.push((iteration, *event));
    }
}

#[test]
fn bicubic_similarity_needs_three_low_checks_on_the_cadence() {
    let config = EstimatorConfig {
        schedule: ScheduleOptions {
            lambda_update_every: 10,
            ..Default::default()
        },
        ..small_config(45)
    };
    let threshold = config.schedule.bicubic_threshold;
    let estimator = KernelEstimator::new(config, ComputeContext::cpu()).expect("config");
    let mut log = ScheduleLog::default();
    let report = estimator
        .estimate(&degraded_scene(), &mut log, &mut NoCheckpoints)
        .expect("estimate");

    let bicubic = report.record.bicubic();
    for &(iteration, event) in &log.0 {
        if event == ScheduleEvent::BicubicReached {
            assert_eq!(iteration % 10, 0, "checked off the cadence at {iteration}");
            assert!(iteration >= 30, "reached after only {iteration} iterations");
            for checked in [iteration - 20, iteration - 10, iteration] {
                assert!(bicubic[checked] < threshold, "loss {} at {checked}", bicubic[checked]);
            }
        }
    }
}

/// Generator narrowed to 16 channels so the full schedule runs in test time.
#[test]
fn recovers_gaussian_kernel() {
    init_logging();
    let (lr, truth) = gaussian_degraded(&scene(512, 21), 13, 1.5, 2);
    let config = EstimatorConfig {
        generator: GeneratorOptions {
            channels: 16,
            ..Default::default()
        },
        ..Default::default()
    };
    assert_eq!(config.max_iters, 3000);
    let estimator = KernelEstimator::new(config, ComputeContext::cpu()).expect("config");
    let report = estimator
        .estimate(&lr, &mut LogObserver::default(), &mut NoCheckpoints)
        .expect("estimate");
    let truth = recenter(&truth, 2).expect("recenter truth");
    let cosine = report.kernels.base.cosine_similarity(&truth);
    assert!(cosine > 0.9, "cosine similarity {cosine:.4}");
}

#[test]
#[ignore = "full-width networks, minutes in release mode"]
fn recovers_gaussian_kernel_with_default_networks() {
    init_logging();
    let (lr, truth) = gaussian_degraded(&scene(512, 21), 13, 1.8, 2);
    let estimator =
        KernelEstimator::new(EstimatorConfig::default(), ComputeContext::cpu()).expect("config");
    let report = estimator
        .estimate(&lr, &mut LogObserver::default(), &mut NoCheckpoints)
        .expect("estimate");
    let truth = recenter(&truth, 2).expect("recenter truth");
    let cosine = report.kernels.base.cosine_similarity(&truth);
    assert!(cosine > 0.9, "cosine similarity {cosine:.4}");
}
