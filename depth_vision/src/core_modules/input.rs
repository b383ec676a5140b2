// THEORY:
// The `InputHandler` is the demo's state machine. It translates host key and
// mouse events into changes of the `SessionState` and into `DeviceCommand`s.
//
// Key architectural principles:
// 1.  **Session First, Device Second**: Every event is first applied to the
//     session (clamped, never rejected). Anything the hardware has to do is
//     returned as a list of commands that the controller applies to the device,
//     so the handler can be exercised without a device attached.
// 2.  **Two Display Modes**: `p` flips between the 2D pipeline view and the
//     point cloud. Mouse input means "drag the ROI" in the 2D view and "orbit
//     the camera" in the point cloud view.
// 3.  **Window to Image Coordinates**: The 2D view is drawn scaled by the
//     session's display scale, so mouse positions are divided by it before
//     they touch the ROI.

use crate::core_modules::device::{DepthDevice, LedMode};
use crate::core_modules::session::{DisplayMode, SessionState};
use crate::error::Result;
use tracing::debug;

/// Keys the demo reacts to. Hosts map their own key codes onto this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Up,
    Down,
}

/// A side effect on the depth device requested by an input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    SetTilt(i32),
    Open,
    Close,
    SetLed(LedMode),
    ToggleNearValueWhite,
}

impl DeviceCommand {
    pub fn apply(self, device: &mut dyn DepthDevice) -> Result<()> {
        debug!(device = device.name(), command = ?self, "Applying device command");
        match self {
            DeviceCommand::SetTilt(degrees) => device.set_tilt_angle(degrees as f32),
            DeviceCommand::Open => device.open()?,
            DeviceCommand::Close => device.close(),
            DeviceCommand::SetLed(mode) => device.set_led(mode),
            DeviceCommand::ToggleNearValueWhite => {
                let near_white = device.is_depth_near_value_white();
                device.enable_depth_near_value_white(!near_white);
            }
        }
        Ok(())
    }
}

/// Maps the LED number keys onto LED modes.
fn led_for_key(c: char) -> Option<LedMode> {
    match c {
        '1' => Some(LedMode::Green),
        '2' => Some(LedMode::Yellow),
        '3' => Some(LedMode::Red),
        '4' => Some(LedMode::BlinkGreen),
        '5' => Some(LedMode::BlinkYellowRed),
        '0' => Some(LedMode::Off),
        _ => None,
    }
}

/// Degrees of orbit per window pixel of mouse drag.
const ORBIT_DEGREES_PER_PIXEL: f32 = 0.4;

#[derive(Debug, Default)]
pub struct InputHandler {
    last_drag: Option<(f32, f32)>,
}

impl InputHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a key press to the session and returns the device commands it implies.
    pub fn key_pressed(&mut self, session: &mut SessionState, key: Key) -> Vec<DeviceCommand> {
        match key {
            Key::Up => vec![DeviceCommand::SetTilt(session.adjust_tilt(1))],
            Key::Down => vec![DeviceCommand::SetTilt(session.adjust_tilt(-1))],
            Key::Char(c) => match c {
                's' => {
                    session.request_cloud_export();
                    Vec::new()
                }
                ' ' => {
                    session.threshold_enabled = !session.threshold_enabled;
                    Vec::new()
                }
                'p' => {
                    session.toggle_mode();
                    self.last_drag = None;
                    Vec::new()
                }
                '>' | '.' => {
                    session.adjust_far(1);
                    Vec::new()
                }
                '<' | ',' => {
                    session.adjust_far(-1);
                    Vec::new()
                }
                '+' | '=' => {
                    session.adjust_near(1);
                    Vec::new()
                }
                '-' => {
                    session.adjust_near(-1);
                    Vec::new()
                }
                'w' => vec![DeviceCommand::ToggleNearValueWhite],
                // Return to the previous tilt before reconnecting.
                'o' => vec![DeviceCommand::SetTilt(session.tilt_degrees), DeviceCommand::Open],
                'c' => vec![DeviceCommand::SetTilt(0), DeviceCommand::Close],
                other => led_for_key(other)
                    .map(|mode| vec![DeviceCommand::SetLed(mode)])
                    .unwrap_or_default(),
            },
        }
    }

    /// A button went down at window position `(x, y)`.
    pub fn mouse_pressed(&mut self, session: &mut SessionState, x: f32, y: f32) {
        match session.mode {
            DisplayMode::TwoD => {
                let scale = session.display_scale;
                session.roi.set_origin(x / scale, y / scale);
            }
            DisplayMode::PointCloud => self.last_drag = Some((x, y)),
        }
    }

    /// The mouse moved to `(x, y)` with a button held.
    pub fn mouse_dragged(&mut self, session: &mut SessionState, x: f32, y: f32) {
        match session.mode {
            DisplayMode::TwoD => {
                let scale = session.display_scale;
                session.roi.set_corner(x / scale, y / scale);
            }
            DisplayMode::PointCloud => {
                if let Some((last_x, last_y)) = self.last_drag {
                    session.orbit.orbit(
                        (x - last_x) * ORBIT_DEGREES_PER_PIXEL,
                        (y - last_y) * ORBIT_DEGREES_PER_PIXEL,
                    );
                }
                self.last_drag = Some((x, y));
            }
        }
    }

    pub fn mouse_released(&mut self) {
        self.last_drag = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::roi::RoiRect;
    use crate::core_modules::synthetic::{SceneConfig, SyntheticKinect};

    fn press(handler: &mut InputHandler, session: &mut SessionState, keys: &str) -> Vec<DeviceCommand> {
        keys.chars()
            .flat_map(|c| handler.key_pressed(session, Key::Char(c)))
            .collect()
    }

    #[test]
    fn threshold_keys_and_their_aliases() {
        let mut handler = InputHandler::new();
        let mut session = SessionState::default();
        let commands = press(&mut handler, &mut session, "++=>.<");
        assert!(commands.is_empty());
        assert_eq!(session.near_threshold_mm, 515);
        assert_eq!(session.far_threshold_mm, 1505);

        press(&mut handler, &mut session, "-,");
        assert_eq!(session.near_threshold_mm, 510);
        assert_eq!(session.far_threshold_mm, 1500);
    }

    #[test]
    fn tilt_keys_clamp_and_push_every_change() {
        let mut handler = InputHandler::new();
        let mut session = SessionState::default();
        let mut last = Vec::new();
        for _ in 0..40 {
            last = handler.key_pressed(&mut session, Key::Up);
        }
        assert_eq!(session.tilt_degrees, 30);
        assert_eq!(last, vec![DeviceCommand::SetTilt(30)]);
        assert_eq!(
            handler.key_pressed(&mut session, Key::Down),
            vec![DeviceCommand::SetTilt(29)]
        );
    }

    #[test]
    fn connection_keys_restore_and_zero_the_tilt() {
        let mut handler = InputHandler::new();
        let mut session = SessionState::default();
        session.adjust_tilt(12);
        assert_eq!(
            press(&mut handler, &mut session, "c"),
            vec![DeviceCommand::SetTilt(0), DeviceCommand::Close]
        );
        assert_eq!(
            press(&mut handler, &mut session, "o"),
            vec![DeviceCommand::SetTilt(12), DeviceCommand::Open]
        );
    }

    #[test]
    fn six_led_states() {
        let mut handler = InputHandler::new();
        let mut session = SessionState::default();
        let commands = press(&mut handler, &mut session, "123450");
        assert_eq!(
            commands,
            vec![
                DeviceCommand::SetLed(LedMode::Green),
                DeviceCommand::SetLed(LedMode::Yellow),
                DeviceCommand::SetLed(LedMode::Red),
                DeviceCommand::SetLed(LedMode::BlinkGreen),
                DeviceCommand::SetLed(LedMode::BlinkYellowRed),
                DeviceCommand::SetLed(LedMode::Off),
            ]
        );
        assert!(press(&mut handler, &mut session, "9x").is_empty());
    }

    #[test]
    fn flags_and_mode() {
        let mut handler = InputHandler::new();
        let mut session = SessionState::default();
        press(&mut handler, &mut session, "sp ");
        assert!(session.cloud_export_pending());
        assert_eq!(session.mode, DisplayMode::PointCloud);
        assert!(!session.threshold_enabled);
        press(&mut handler, &mut session, "p ");
        assert_eq!(session.mode, DisplayMode::TwoD);
        assert!(session.threshold_enabled);
    }

    #[test]
    fn dragging_sets_the_roi_in_image_coordinates() {
        let mut handler = InputHandler::new();
        let mut session = SessionState::default();
        session.display_scale = 0.5;
        handler.mouse_pressed(&mut session, 50.0, 40.0);
        handler.mouse_dragged(&mut session, 150.0, 140.0);
        assert_eq!(session.roi, RoiRect::new(100.0, 80.0, 200.0, 200.0));

        // Dragging up and left leaves a negative size.
        handler.mouse_dragged(&mut session, 25.0, 20.0);
        assert_eq!(session.roi.width, -50.0);
        assert_eq!(session.roi.height, -40.0);
    }

    #[test]
    fn dragging_in_point_cloud_mode_orbits_instead() {
        let mut handler = InputHandler::new();
        let mut session = SessionState::default();
        session.toggle_mode();
        let roi = session.roi;
        let yaw = session.orbit.yaw;
        handler.mouse_pressed(&mut session, 100.0, 100.0);
        handler.mouse_dragged(&mut session, 150.0, 100.0);
        assert_eq!(session.roi, roi);
        assert!((session.orbit.yaw - (yaw + 20.0)).abs() < 1e-4);
    }

    #[test]
    fn commands_reach_the_device() {
        let mut kinect = SyntheticKinect::inline("cmd", SceneConfig::default());
        DeviceCommand::Open.apply(&mut kinect).unwrap();
        assert!(kinect.is_connected());
        DeviceCommand::SetTilt(-7).apply(&mut kinect).unwrap();
        assert_eq!(kinect.tilt_angle(), -7.0);
        DeviceCommand::SetLed(LedMode::Red).apply(&mut kinect).unwrap();
        assert_eq!(kinect.led_mode(), LedMode::Red);
        DeviceCommand::ToggleNearValueWhite.apply(&mut kinect).unwrap();
        assert!(!kinect.is_depth_near_value_white());
        DeviceCommand::Close.apply(&mut kinect).unwrap();
        assert!(!kinect.is_connected());
    }
}
