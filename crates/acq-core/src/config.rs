//! Acquisition configuration loading.
//!
//! A configuration file names the sequence to run plus the per-device
//! settings the controller needs. Values come from a TOML file, overridden by
//! `ACQ_`-prefixed environment variables:
//!
//! ```toml
//! trigger_mode = "internal"
//! internal_trigger_threshold = "50ms"
//! pool_capacity = 16
//! min_interframe_gap = "56ms"
//!
//! [sequence]
//! kind = "multiframe"
//! parameters = [4, 0.1, 0.2]
//!
//! [frame_transform]
//! rotation_degrees = 90
//! reflect_vertical = true
//!
//! [canonical_dims]
//! width = 2048
//! height = 1024
//! ```

use crate::controller::{AcquisitionController, AcquisitionControllerBuilder};
use crate::frame::FrameDims;
use crate::hardware::Hardware;
use crate::normalize::FrameTransform;
use crate::sequence::{SequenceSpec, ValidatedSpec};
use crate::trigger::TriggerMode;
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Prefix of environment variables that override file values.
pub const ENV_PREFIX: &str = "ACQ_";

/// Error types for config loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    /// File not found
    #[error("Config file not found: {0}")]
    NotFound(String),

    /// Parse error (invalid TOML or wrong types)
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// Semantic validation error
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Options recognised by the acquisition core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    pub sequence: SequenceSpec,

    #[serde(default)]
    pub trigger_mode: TriggerMode,

    /// Exposures at or above this are timed by the auxiliary pulser.
    #[serde(with = "humantime_serde")]
    pub internal_trigger_threshold: Duration,

    pub pool_capacity: usize,

    #[serde(default)]
    pub frame_transform: FrameTransform,

    /// Defaults to the raw frame size, rotated.
    #[serde(default)]
    pub canonical_dims: Option<FrameDims>,

    #[serde(default, with = "humantime_serde")]
    pub min_interframe_gap: Option<Duration>,
}

impl AcquisitionConfig {
    /// Parse and validate a configuration from TOML text.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        Self::from_figment(Figment::new().merge(Toml::string(toml)))
    }

    /// Load a configuration file, applying `ACQ_` environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigLoadError::NotFound(path.display().to_string()).into());
        }
        debug!("Loading acquisition config from: {}", path.display());

        let figment = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX));
        let config = Self::from_figment(figment)
            .with_context(|| format!("Failed to load config file: {}", path.display()))?;

        info!(
            sequence = %config.sequence.kind,
            pool_capacity = config.pool_capacity,
            "Loaded acquisition config"
        );
        Ok(config)
    }

    fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment
            .extract()
            .map_err(|e| ConfigLoadError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Cross-field checks that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        let mut errors = Vec::new();

        if let Err(e) = self.sequence.validate() {
            errors.push(e.to_string());
        }
        if self.pool_capacity == 0 {
            errors.push("pool_capacity must be at least 1".to_string());
        }
        if let Err(e) = self.frame_transform.validate() {
            errors.push(e.to_string());
        }
        if let Some(dims) = self.canonical_dims {
            if dims.width == 0 || dims.height == 0 {
                errors.push(format!(
                    "canonical_dims must be non-zero, got {}x{}",
                    dims.width, dims.height
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigLoadError::ValidationError(errors.join("\n")))
        }
    }

    /// The configured sequence, validated.
    pub fn validated_sequence(&self) -> Result<ValidatedSpec> {
        Ok(self.sequence.validate()?)
    }

    /// Controller builder preloaded with these settings.
    pub fn controller_builder(&self, hardware: Box<dyn Hardware>) -> AcquisitionControllerBuilder {
        let mut builder = AcquisitionController::builder(hardware)
            .trigger_mode(self.trigger_mode)
            .internal_trigger_threshold(self.internal_trigger_threshold)
            .pool_capacity(self.pool_capacity)
            .frame_transform(self.frame_transform);
        if let Some(dims) = self.canonical_dims {
            builder = builder.canonical_dims(dims);
        }
        if let Some(gap) = self.min_interframe_gap {
            builder = builder.min_interframe_gap(gap);
        }
        builder
    }
}
