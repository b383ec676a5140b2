// THEORY:
// This file is the main entry point for the `depth_vision` library crate.
// It exposes everything an interactive host (like `depth_tester`) needs to run
// the depth-threshold demo: the `DepthApp` controller, the device interface,
// and the rendered output of each frame.
//
// The crate is organised in three layers:
// 1.  **core_modules**: the individual stages (ROI masking, threshold
//     classification, contour extraction, point cloud capture), the session
//     state they share, the input handler that mutates it, and the device
//     interface that feeds them.
// 2.  **pipeline**: the per-frame sequencing of the 2D stages.
// 3.  **app**: the update/draw/exit loop body plus key and mouse entry points.
//     Hosts drive it; it never blocks and never owns a thread.

pub mod app;
pub mod config;
pub mod core_modules;
pub mod error;
pub mod pipeline;
pub mod render;
pub mod report;

pub use app::{DepthApp, DrawOutput};
pub use config::AppConfig;
pub use core_modules::device::{DepthDevice, DeviceCapabilities, LedMode};
pub use core_modules::input::Key;
pub use core_modules::session::{DisplayMode, SessionState};
pub use core_modules::synthetic::{SceneConfig, SyntheticKinect};
pub use error::{DepthError, Result};
