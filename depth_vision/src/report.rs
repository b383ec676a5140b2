//! The status text shown under the rendered frame.

use crate::core_modules::device::DepthDevice;
use crate::core_modules::session::{DisplayMode, SessionState};

/// Builds the status report for the current frame, one line per entry.
pub fn status_lines(session: &SessionState, device: &dyn DepthDevice, blob_count: usize, fps: f32) -> Vec<String> {
    let capabilities = device.capabilities();
    let mut lines = Vec::new();

    match device.accelerometer() {
        Some(accel) if capabilities.accelerometer => {
            lines.push(format!("accel is: {:.2} / {:.2} / {:.2}", accel.x, accel.y, accel.z));
        }
        _ if !capabilities.accelerometer => {
            lines.push("Note: this is a newer depth device,".to_string());
            lines.push("motor / led / accel controls are not currently supported".to_string());
        }
        _ => lines.push("accel is: unavailable".to_string()),
    }

    let mode = match session.mode {
        DisplayMode::TwoD => "images",
        DisplayMode::PointCloud => "point cloud",
    };
    lines.push(format!(
        "press p to switch between images and point cloud ({mode}), drag to rotate the point cloud"
    ));
    lines.push(format!(
        "thresholding = {} (press spacebar), press s to save the point cloud",
        session.threshold_enabled
    ));
    lines.push(format!("set near threshold {} mm (press: + -)", session.near_threshold_mm));
    lines.push(format!(
        "set far threshold {} mm (press: < >) num blobs found {blob_count}, fps: {fps:.1}",
        session.far_threshold_mm
    ));
    if session.thresholds_inverted() {
        lines.push("warning: near threshold is beyond the far threshold, nothing is selected".to_string());
    }
    lines.push(format!(
        "press c to close the connection and o to open it again, connection is: {}",
        device.is_connected()
    ));
    if capabilities.tilt {
        lines.push(format!(
            "press UP and DOWN to change the tilt angle: {} degrees",
            session.tilt_degrees
        ));
    }
    if capabilities.led {
        lines.push("press 1-5 & 0 to change the led mode".to_string());
    }
    if session.mode == DisplayMode::TwoD {
        lines.push("click and drag over the depth image to set the region of interest".to_string());
    }
    lines
}
