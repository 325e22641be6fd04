use indicatif::{ProgressBar, ProgressStyle};
use kernel_estimator::config::load_config;
use kernel_estimator::diagnostics::IterationLosses;
use kernel_estimator::engine::{
    EstimationReport, FileCheckpointSink, LogObserver, NoCheckpoints, Observer, ScheduleEvent,
};
use kernel_estimator::image::io::load_grayscale_image;
use kernel_estimator::kernel::io::write_estimated_kernels;
use kernel_estimator::kernel::EstimatedKernels;
use kernel_estimator::{ComputeContext, EstimatorConfig, KernelEstimator};
use std::env;
use std::error::Error;
use std::ops::ControlFlow;
use std::path::Path;

/// Progress bar on top of the `log` observer.
struct ProgressObserver {
    bar: ProgressBar,
    log: LogObserver,
}

impl Observer for ProgressObserver {
    fn on_start(&mut self, config: &EstimatorConfig) {
        self.bar.set_length(config.max_iters as u64);
        self.log.on_start(config);
    }

    fn on_iteration(&mut self, losses: &IterationLosses) -> ControlFlow<()> {
        self.bar.inc(1);
        if losses.iteration % 50 == 0 {
            self.bar.set_message(format!(
                "g={:.4} d_real={:.3} d_fake={:.3}",
                losses.generator_total, losses.discriminator_real, losses.discriminator_fake
            ));
        }
        self.log.on_iteration(losses)
    }

    fn on_schedule(&mut self, iteration: usize, event: &ScheduleEvent) {
        self.bar.suspend(|| self.log.on_schedule(iteration, event));
    }

    fn on_checkpoint(&mut self, iteration: usize, kernels: &EstimatedKernels) {
        self.bar.suspend(|| self.log.on_checkpoint(iteration, kernels));
    }

    fn on_finish(&mut self, report: &EstimationReport) {
        self.bar.finish_and_clear();
        self.log.on_finish(report);
    }
}

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        let mut source = err.source();
        while let Some(cause) = source {
            eprintln!("  caused by: {cause}");
            source = cause.source();
        }
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let config_path = env::args().nth(1).ok_or_else(usage)?;
    let config = load_config(Path::new(&config_path))?;
    let name = config.run_name();
    let sf = config.estimator.scale_factor;

    let image = load_grayscale_image(&config.input)?;
    let estimator = KernelEstimator::new(config.estimator.clone(), ComputeContext::cpu())?;

    let style = ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>5}/{len:5} {msg}")?
        .progress_chars("##-");
    let bar = ProgressBar::new(config.estimator.max_iters as u64);
    bar.set_style(style);
    let mut observer = ProgressObserver {
        bar,
        log: LogObserver::default(),
    };

    let report = if config.estimator.checkpoint_every.is_some() {
        let mut sink = FileCheckpointSink::new(&config.output_dir, name.as_str(), sf);
        estimator.estimate(&image, &mut observer, &mut sink)?
    } else {
        estimator.estimate(&image, &mut observer, &mut NoCheckpoints)?
    };

    let written = write_estimated_kernels(&report.kernels, &config.output_dir, &name, sf)?;
    let record_path = config
        .output_dir
        .join(format!("{name}_training_record.json"));
    report.record.save_json(&record_path)?;

    for path in &written {
        println!("Saved kernel to {}", path.display());
    }
    println!(
        "Saved training record ({} iterations) to {}",
        report.record.len(),
        record_path.display()
    );
    Ok(())
}

fn usage() -> String {
    "Usage: kernel-estimator <config.json>".to_string()
}
