// THEORY:
// The `device` module is the Frame Acquirer's contract. The demo needs very
// little from a depth camera: a polled "new frame" flag, the depth and color
// images, per-pixel distance, color and world position, and a handful of
// motor/LED controls. Everything about USB transfers, calibration tables and
// registration lives behind this trait.
//
// Key architectural principles:
// 1.  **Capabilities, not Models**: Older and newer sensor generations differ
//     in whether they have a tilt motor, a status LED or an accelerometer.
//     Callers ask `capabilities()` instead of inspecting device types.
// 2.  **Polled Frames**: `update` is cheap and never blocks. Frame I/O happens
//     underneath; a fresh frame is visible through `is_frame_new` until the
//     next `update`.
// 3.  **Depth Image Convention**: The 8-bit depth image is produced from raw
//     millimeters through the lookup table built by `depth_lookup_table`, so a
//     device implementation and the threshold classifier agree on the scale.

use crate::core_modules::threshold::ClippingRange;
use crate::error::Result;
use glam::Vec3;
use image::{GrayImage, RgbImage, Rgba};
use serde::{Deserialize, Serialize};

/// Width of the depth and color streams.
pub const DEPTH_WIDTH: u32 = 640;
/// Height of the depth and color streams.
pub const DEPTH_HEIGHT: u32 = 480;
/// Largest raw distance a device reports, in millimeters.
pub const MAX_DEPTH_MM: usize = 10_000;

/// The status LED states a device can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedMode {
    Off,
    Green,
    Yellow,
    Red,
    BlinkGreen,
    BlinkYellowRed,
}

/// Optional hardware controls. Newer sensors expose none of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    pub tilt: bool,
    pub led: bool,
    pub accelerometer: bool,
}

impl DeviceCapabilities {
    pub const FULL: DeviceCapabilities = DeviceCapabilities {
        tilt: true,
        led: true,
        accelerometer: true,
    };

    pub const NONE: DeviceCapabilities = DeviceCapabilities {
        tilt: false,
        led: false,
        accelerometer: false,
    };
}

/// Factory calibration of the IR sensor, used for depth-to-world projection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorIntrinsics {
    pub sensor_emitter_distance_cm: f32,
    pub sensor_camera_distance_cm: f32,
    pub zero_plane_pixel_size_mm: f32,
    pub zero_plane_distance_mm: f32,
}

impl SensorIntrinsics {
    /// Typical values reported by a first generation Kinect.
    pub const KINECT: SensorIntrinsics = SensorIntrinsics {
        sensor_emitter_distance_cm: 7.5,
        sensor_camera_distance_cm: 2.4,
        zero_plane_pixel_size_mm: 0.1042,
        zero_plane_distance_mm: 120.0,
    };

    /// Projects a depth pixel at `distance_mm` into camera space (millimeters).
    pub fn world_coordinate(&self, x: u32, y: u32, distance_mm: f32) -> Vec3 {
        let factor = 2.0 * self.zero_plane_pixel_size_mm * distance_mm / self.zero_plane_distance_mm;
        Vec3::new(
            (x as f32 - DEPTH_WIDTH as f32 / 2.0) * factor,
            (y as f32 - DEPTH_HEIGHT as f32 / 2.0) * factor,
            distance_mm,
        )
    }
}

/// Builds the millimeter to 8-bit lookup table for a clipping range.
///
/// Distance 0 (no reading) and anything outside the clipping range map to 0.
/// Inside the range the map is linear, with the near plane at 255 when
/// `near_white` is set and at 0 otherwise.
pub fn depth_lookup_table(clipping: ClippingRange, near_white: bool) -> Vec<u8> {
    let mut table = vec![0u8; MAX_DEPTH_MM + 1];
    let span = clipping.far_mm - clipping.near_mm;
    if span <= 0.0 {
        return table;
    }
    for (mm, entry) in table.iter_mut().enumerate().skip(1) {
        let mm = mm as f32;
        if mm < clipping.near_mm || mm > clipping.far_mm {
            continue;
        }
        let t = (mm - clipping.near_mm) / span;
        let value = if near_white { 255.0 * (1.0 - t) } else { 255.0 * t };
        *entry = value.round().clamp(0.0, 255.0) as u8;
    }
    table
}

/// Everything the demo consumes from a depth camera.
pub trait DepthDevice {
    /// Human readable name, used in logs.
    fn name(&self) -> &str;

    fn open(&mut self) -> Result<()>;
    fn close(&mut self);
    fn is_connected(&self) -> bool;

    /// Polls the device. Never blocks.
    fn update(&mut self);
    /// True when the last `update` delivered a frame.
    fn is_frame_new(&self) -> bool;

    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// The 8-bit depth image of the latest frame.
    fn depth_pixels(&self) -> &GrayImage;
    /// The color image of the latest frame.
    fn color_pixels(&self) -> &RgbImage;

    /// Raw distance in millimeters, 0 when there is no reading or `(x, y)` is
    /// outside the frame.
    fn distance_at(&self, x: u32, y: u32) -> f32;
    fn color_at(&self, x: u32, y: u32) -> Rgba<u8>;
    fn world_coordinate_at(&self, x: u32, y: u32) -> Vec3;

    fn capabilities(&self) -> DeviceCapabilities;
    fn intrinsics(&self) -> SensorIntrinsics;

    fn tilt_angle(&self) -> f32;
    fn set_tilt_angle(&mut self, degrees: f32);

    fn led_mode(&self) -> LedMode;
    fn set_led(&mut self, mode: LedMode);

    fn clipping_range(&self) -> ClippingRange;
    fn set_depth_clipping(&mut self, range: ClippingRange);

    fn is_depth_near_value_white(&self) -> bool;
    fn enable_depth_near_value_white(&mut self, enabled: bool);

    /// Enables depth to color registration, so `color_at` lines up with
    /// `distance_at`.
    fn set_registration(&mut self, enabled: bool);

    /// Acceleration in m/s^2, when the device has an accelerometer.
    fn accelerometer(&self) -> Option<Vec3>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_table_spans_the_clipping_range() {
        let table = depth_lookup_table(ClippingRange::DEFAULT, true);
        assert_eq!(table[0], 0);
        assert_eq!(table[499], 0);
        assert_eq!(table[500], 255);
        assert_eq!(table[4000], 0);
        assert_eq!(table[4001], 0);
        assert!(table[1000] > table[2000]);
    }

    #[test]
    fn lookup_table_near_black() {
        let table = depth_lookup_table(ClippingRange::DEFAULT, false);
        assert_eq!(table[500], 0);
        assert_eq!(table[4000], 255);
        assert!(table[1000] < table[2000]);
    }

    #[test]
    fn degenerate_lookup_table_is_blank() {
        let table = depth_lookup_table(ClippingRange::new(900.0, 900.0), true);
        assert!(table.iter().all(|&v| v == 0));
    }

    #[test]
    fn world_coordinate_is_centred_on_the_optical_axis() {
        let k = SensorIntrinsics::KINECT;
        let centre = k.world_coordinate(320, 240, 1000.0);
        assert_eq!(centre, Vec3::new(0.0, 0.0, 1000.0));

        let right = k.world_coordinate(420, 240, 1000.0);
        let further = k.world_coordinate(420, 240, 2000.0);
        assert!(right.x > 0.0);
        assert!((further.x - 2.0 * right.x).abs() < 1e-3);
    }
}
