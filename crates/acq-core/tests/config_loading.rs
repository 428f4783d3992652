//! Configuration files driving a controller end to end.
//!
//! Run with: cargo test -p acq-core --test config_loading

use acq_core::{
    AcquisitionConfig, ConfigLoadError, Frame, FrameDims, Hardware, HwError, ManualClock,
    NativeStatus, SequenceKind, TriggerMode, ValidatedSpec,
};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

/// Detector that accepts every command and reports no native progress.
struct NullDetector;

impl Hardware for NullDetector {
    fn name(&self) -> &str {
        "null"
    }

    fn prepare(&mut self, _spec: &ValidatedSpec, _mode: TriggerMode) -> Result<(), HwError> {
        Ok(())
    }

    fn native_trigger(&mut self) -> Result<(), HwError> {
        Ok(())
    }

    fn native_stop(&mut self) -> Result<(), HwError> {
        Ok(())
    }

    fn native_abort(&mut self) -> Result<(), HwError> {
        Ok(())
    }

    fn native_status(&mut self) -> Result<Option<NativeStatus>, HwError> {
        Ok(None)
    }

    fn read_raw_frame(&mut self, _absolute_index: u64) -> Result<Frame, HwError> {
        Ok(Frame::from_u16(8, 4, &[7; 32]))
    }

    fn supports_internal_trigger(&self, _kind: SequenceKind) -> bool {
        true
    }
}

const FILE: &str = r#"
trigger_mode = "internal"
internal_trigger_threshold = "50ms"
pool_capacity = 16
min_interframe_gap = "56ms"

[sequence]
kind = "multiframe"
parameters = [4, 0.1, 0.12]

[frame_transform]
rotation_degrees = 90

[canonical_dims]
width = 2
height = 6
"#;

#[test]
fn test_file_with_env_override_configures_controller() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(FILE.as_bytes()).unwrap();

    std::env::set_var("ACQ_POOL_CAPACITY", "8");
    let loaded = AcquisitionConfig::load(file.path());
    std::env::remove_var("ACQ_POOL_CAPACITY");
    let config = loaded.unwrap();

    assert_eq!(config.pool_capacity, 8);
    assert_eq!(config.internal_trigger_threshold, Duration::from_millis(50));
    assert_eq!(config.canonical_dims, Some(FrameDims::new(2, 6)));

    let clock = ManualClock::new();
    let mut controller = config
        .controller_builder(Box::new(NullDetector))
        .clock(Arc::new(clock.clone()))
        .build();
    assert_eq!(controller.pool().capacity(), 8);

    controller.arm(config.sequence.clone()).unwrap();
    let period = controller.session().unwrap().spec.frame_period().unwrap();
    assert_eq!(period, Duration::from_millis(156));

    controller.trigger().unwrap();
    clock.advance(Duration::from_secs(1));
    let status = controller.get_extended_status().unwrap();
    assert!(!status.busy);
    assert_eq!(status.total_num_frames, 4);

    // 8x4 raw, quarter turn, trimmed to 2x6.
    let frame = controller.read_frame(3).unwrap().frame;
    assert_eq!(frame.dims(), FrameDims::new(2, 6));
    assert_eq!(frame.get(1, 5), Some(7));
}

#[test]
fn test_every_problem_reported_at_once() {
    let err = AcquisitionConfig::from_toml_str(
        r#"
pool_capacity = 0
internal_trigger_threshold = "1s"

[sequence]
kind = "one_shot"
parameters = [-1.0]

[frame_transform]
rotation_degrees = 45
"#,
    )
    .unwrap_err();

    match err.downcast_ref::<ConfigLoadError>() {
        Some(ConfigLoadError::ValidationError(msg)) => {
            assert!(msg.contains("pool_capacity"), "{msg}");
            assert!(msg.contains("45"), "{msg}");
            assert_eq!(msg.lines().count(), 3, "{msg}");
        }
        other => panic!("expected a validation error, got {other:?}"),
    }
}

#[test]
fn test_missing_file_is_not_found() {
    let err = AcquisitionConfig::load(std::path::Path::new("/nonexistent/acq.toml")).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfigLoadError>(),
        Some(ConfigLoadError::NotFound(_))
    ));
}
