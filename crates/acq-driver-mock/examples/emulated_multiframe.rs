//! Multiframe acquisition against emulated hardware
//!
//! Runs a full arm / trigger / poll / read cycle in real time against an
//! external-trigger-only camera clocked by an emulated pulse generator.
//!
//! Usage:
//! ```bash
//! cargo run -p acq-driver-mock --example emulated_multiframe
//! # or with a configuration file
//! RUST_LOG=debug cargo run -p acq-driver-mock --example emulated_multiframe -- acquisition.toml
//! ```

use acq_core::{AcquisitionConfig, AcquisitionController, SequenceSpec};
use acq_driver_mock::{
    decode_frame_number, EmulatedCamera, EmulatedPulser, MockMode, TimingConfig, TriggerLine,
};
use anyhow::Context;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let line = TriggerLine::new();
    let camera = EmulatedCamera::builder(640, 480)
        .bit_depth(12)
        .external_trigger_only()
        .native_status(true)
        .trigger_line(line.clone())
        .mode(MockMode::Realistic)
        .timing(TimingConfig::serial_detector())
        .build();
    let pulser = EmulatedPulser::new(line)
        .with_mode(MockMode::Realistic)
        .with_timing(TimingConfig::pulse_generator())
        .with_start_jitter(Duration::from_micros(200), 7);

    let (mut controller, sequence) = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => {
            let config = AcquisitionConfig::load(&path)?;
            let builder = config.controller_builder(Box::new(camera));
            (builder.pulser(Box::new(pulser)).build(), config.sequence)
        }
        None => {
            let controller = AcquisitionController::builder(Box::new(camera))
                .pulser(Box::new(pulser))
                .internal_trigger_threshold(Duration::from_millis(50))
                .pool_capacity(8)
                .build();
            (controller, SequenceSpec::multiframe(5, 0.02, 0.05))
        }
    };

    controller.arm(sequence)?;
    let plan = controller
        .session()
        .map(|s| s.trigger_plan)
        .context("Controller has no session after arm")?;
    println!(
        "Armed: pulser={} count={} period={:?}",
        plan.use_auxiliary_pulser, plan.pulse_count, plan.pulse_period
    );

    controller.trigger()?;
    let status = controller.wait_for_completion(Duration::from_millis(10), Duration::from_secs(30))?;
    println!(
        "Complete: last_frame_number={} total={}",
        status.last_frame_number, status.total_num_frames
    );

    let frames = u64::try_from(status.last_frame_number + 1).unwrap_or(0);
    for n in 0..frames {
        let acquired = controller.read_frame(n)?;
        println!(
            "  frame {:>3}: {}x{} marker={:?}",
            n,
            acquired.frame.width,
            acquired.frame.height,
            decode_frame_number(&acquired.frame)
        );
        controller.mark_frame_saved(n)?;
    }
    Ok(())
}
