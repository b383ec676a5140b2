//! Tunable startup configuration.
//!
//! Every field has a default, so a JSON file only needs to name the values it
//! changes.

use crate::core_modules::blob_extractor::ContourFinderConfig;
use crate::core_modules::synthetic::SceneConfig;
use crate::core_modules::threshold::ClippingRange;
use crate::error::{DepthError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Startup configuration for `DepthApp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Initial near threshold in millimeters.
    pub near_threshold_mm: u16,
    /// Initial far threshold in millimeters.
    pub far_threshold_mm: u16,
    /// Lowest value either threshold can be adjusted to.
    pub threshold_min_mm: u16,
    /// Highest value either threshold can be adjusted to.
    pub threshold_max_mm: u16,
    /// Millimeters added or removed per key press.
    pub threshold_step_mm: u16,
    /// The tilt angle is clamped to `[-tilt_limit_degrees, tilt_limit_degrees]`.
    pub tilt_limit_degrees: i32,
    /// Clipping planes pushed to the device at setup.
    pub clipping: ClippingRange,
    /// Distance of the initial ROI from each edge of the depth image.
    pub roi_inset: f32,
    /// Scale applied to the 2D view and to mouse coordinates.
    pub display_scale: f32,
    /// Register the color image onto the depth image.
    pub registration: bool,
    /// Where the point cloud is written when an export is requested.
    pub export_path: PathBuf,
    /// Drive a second device alongside the primary one.
    pub second_device: bool,
    pub contour: ContourFinderConfig,
    pub scene: SceneConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            near_threshold_mm: 500,
            far_threshold_mm: 1500,
            threshold_min_mm: 500,
            threshold_max_mm: 4000,
            threshold_step_mm: 5,
            tilt_limit_degrees: 30,
            clipping: ClippingRange::DEFAULT,
            roi_inset: 10.0,
            display_scale: 0.7,
            registration: true,
            export_path: PathBuf::from("pointCloud.ply"),
            second_device: false,
            contour: ContourFinderConfig::default(),
            scene: SceneConfig::default(),
        }
    }
}

/// Largest tilt limit accepted from a configuration file, in degrees.
pub const MAX_TILT_LIMIT_DEGREES: i32 = 90;

impl AppConfig {
    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Rejects bounds the session could not honour.
    pub fn validate(&self) -> Result<()> {
        if self.threshold_min_mm > self.threshold_max_mm {
            return Err(DepthError::InvalidConfig(format!(
                "threshold_min_mm ({}) is above threshold_max_mm ({})",
                self.threshold_min_mm, self.threshold_max_mm
            )));
        }
        if !(0..=MAX_TILT_LIMIT_DEGREES).contains(&self.tilt_limit_degrees) {
            return Err(DepthError::InvalidConfig(format!(
                "tilt_limit_degrees ({}) must be within 0..={MAX_TILT_LIMIT_DEGREES}",
                self.tilt_limit_degrees
            )));
        }
        if !(self.display_scale.is_finite() && self.display_scale > 0.0) {
            return Err(DepthError::InvalidConfig(format!(
                "display_scale ({}) must be positive",
                self.display_scale
            )));
        }
        Ok(())
    }
}
