// THEORY:
// `SessionState` is everything the user can change while the demo runs. It is
// passed explicitly to every stage (masker, classifier, point cloud builder,
// renderer) instead of living in free-floating application fields, which keeps
// each stage a pure function of its inputs.
//
// Invariants kept here:
// - Both millimeter thresholds stay inside the configured bounds after every
//   adjustment. Their relative order is deliberately not enforced.
// - The tilt angle stays inside `[-tilt_limit, tilt_limit]`.
// - The export request is one-shot: `take_cloud_export` returns true once per
//   request.

use crate::config::AppConfig;
use crate::core_modules::device::{DEPTH_HEIGHT, DEPTH_WIDTH};
use crate::core_modules::roi::RoiRect;
use crate::core_modules::threshold::{ClippingRange, DepthConvention, IntensityThresholds};
use crate::error::Result;
use crate::render::OrbitCamera;

/// What the draw pass shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    /// Depth, color and mask views side by side.
    TwoD,
    /// The colored point cloud of the selected band.
    PointCloud,
}

impl DisplayMode {
    pub fn toggled(self) -> Self {
        match self {
            DisplayMode::TwoD => DisplayMode::PointCloud,
            DisplayMode::PointCloud => DisplayMode::TwoD,
        }
    }
}

/// Bounds and step size for the millimeter thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdLimits {
    pub min_mm: u16,
    pub max_mm: u16,
    pub step_mm: u16,
}

impl ThresholdLimits {
    fn clamp(&self, value: i32) -> u16 {
        value.clamp(self.min_mm as i32, self.max_mm as i32) as u16
    }
}

#[derive(Debug, Clone)]
pub struct SessionState {
    pub near_threshold_mm: u16,
    pub far_threshold_mm: u16,
    /// The thresholds remapped against the device's clipping range on the
    /// latest frame. `None` until a frame arrives, or when the range is degenerate.
    pub intensity: Option<IntensityThresholds>,
    pub roi: RoiRect,
    pub display_scale: f32,
    pub mode: DisplayMode,
    pub tilt_degrees: i32,
    /// When off, the mask is left empty and no blobs are extracted.
    pub threshold_enabled: bool,
    pub orbit: OrbitCamera,
    limits: ThresholdLimits,
    tilt_limit: i32,
    save_cloud: bool,
}

impl SessionState {
    pub fn new(config: &AppConfig) -> Self {
        // Configs built in code skip validation, so order the bounds here.
        let limits = ThresholdLimits {
            min_mm: config.threshold_min_mm.min(config.threshold_max_mm),
            max_mm: config.threshold_min_mm.max(config.threshold_max_mm),
            step_mm: config.threshold_step_mm,
        };
        Self {
            near_threshold_mm: limits.clamp(config.near_threshold_mm as i32),
            far_threshold_mm: limits.clamp(config.far_threshold_mm as i32),
            intensity: None,
            roi: RoiRect::inset(DEPTH_WIDTH, DEPTH_HEIGHT, config.roi_inset),
            display_scale: config.display_scale,
            mode: DisplayMode::TwoD,
            tilt_degrees: 0,
            threshold_enabled: true,
            orbit: OrbitCamera::default(),
            limits,
            tilt_limit: config.tilt_limit_degrees.saturating_abs(),
            save_cloud: false,
        }
    }

    pub fn limits(&self) -> ThresholdLimits {
        self.limits
    }

    /// Moves the near threshold by `steps` key presses (negative is closer).
    pub fn adjust_near(&mut self, steps: i32) {
        let delta = steps * self.limits.step_mm as i32;
        self.near_threshold_mm = self.limits.clamp(self.near_threshold_mm as i32 + delta);
    }

    /// Moves the far threshold by `steps` key presses (negative is closer).
    pub fn adjust_far(&mut self, steps: i32) {
        let delta = steps * self.limits.step_mm as i32;
        self.far_threshold_mm = self.limits.clamp(self.far_threshold_mm as i32 + delta);
    }

    /// Nudges the tilt angle and returns the clamped result.
    pub fn adjust_tilt(&mut self, degrees: i32) -> i32 {
        self.tilt_degrees = (self.tilt_degrees + degrees).clamp(-self.tilt_limit, self.tilt_limit);
        self.tilt_degrees
    }

    pub fn toggle_mode(&mut self) {
        self.mode = self.mode.toggled();
    }

    pub fn request_cloud_export(&mut self) {
        self.save_cloud = true;
    }

    pub fn cloud_export_pending(&self) -> bool {
        self.save_cloud
    }

    /// Consumes a pending export request.
    pub fn take_cloud_export(&mut self) -> bool {
        std::mem::take(&mut self.save_cloud)
    }

    /// True when the near threshold lies beyond the far one, which selects nothing.
    pub fn thresholds_inverted(&self) -> bool {
        self.near_threshold_mm > self.far_threshold_mm
    }

    /// Recomputes the intensity thresholds for the device's current clipping
    /// range. On a degenerate range the stale pair is discarded.
    pub fn refresh_intensity(&mut self, clipping: ClippingRange, convention: DepthConvention) -> Result<IntensityThresholds> {
        let remapped = IntensityThresholds::from_millimeters(
            self.near_threshold_mm as f32,
            self.far_threshold_mm as f32,
            clipping,
            convention,
        );
        self.intensity = remapped.as_ref().ok().copied();
        remapped
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(&AppConfig::default())
    }
}
