// THEORY:
// `DepthApp` is the application controller. It owns the devices, the session,
// the pipeline and the input handler, and exposes the loop body a host calls:
// `setup` once, then `update` and `draw` once per tick, key and mouse events in
// between, and `exit` at the end.
//
// Key architectural principles:
// 1.  **Host Agnostic**: The controller never blocks, never sleeps and never
//     owns a thread or a window. A terminal viewer, a headless runner and the
//     tests all drive the same methods.
// 2.  **Degrade, Don't Abort**: A device that fails to open, a degenerate
//     clipping range or a failed export is logged and reported in the status
//     text. The loop keeps running.
// 3.  **One-Shot Export**: The point cloud is written only on the first point
//     cloud draw after the user asked for it.

use crate::config::AppConfig;
use crate::core_modules::device::DepthDevice;
use crate::core_modules::input::{InputHandler, Key};
use crate::core_modules::point_cloud::PointCloud;
use crate::core_modules::session::{DisplayMode, SessionState};
use crate::core_modules::threshold::DepthConvention;
use crate::pipeline::{DepthPipeline, FrameAnalysis, PipelineConfig};
use crate::render::{self, TwoDView, VIEW_HEIGHT, VIEW_WIDTH};
use crate::report;
use image::RgbImage;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Frames per second over the last full second.
#[derive(Debug)]
struct FpsCounter {
    last_instant: Instant,
    frame_count: u32,
    fps: f32,
}

impl FpsCounter {
    fn new() -> Self {
        Self {
            last_instant: Instant::now(),
            frame_count: 0,
            fps: 0.0,
        }
    }

    fn tick(&mut self) {
        self.frame_count += 1;
        let elapsed = self.last_instant.elapsed();
        if elapsed >= Duration::from_secs(1) {
            self.fps = self.frame_count as f32 / elapsed.as_secs_f32();
            self.frame_count = 0;
            self.last_instant = Instant::now();
        }
    }

    fn fps(&self) -> f32 {
        self.fps
    }
}

/// What one `draw` call produced.
#[derive(Debug, Clone)]
pub struct DrawOutput {
    pub frame: RgbImage,
    pub status: Vec<String>,
}

pub struct DepthApp {
    config: AppConfig,
    device: Box<dyn DepthDevice>,
    secondary: Option<Box<dyn DepthDevice>>,
    session: SessionState,
    pipeline: DepthPipeline,
    input: InputHandler,
    fps: FpsCounter,
    last_analysis: Option<FrameAnalysis>,
    export_status: Option<String>,
}

impl DepthApp {
    pub fn new(config: AppConfig, device: Box<dyn DepthDevice>, secondary: Option<Box<dyn DepthDevice>>) -> Self {
        let pipeline = DepthPipeline::new(PipelineConfig {
            image_width: device.width(),
            image_height: device.height(),
            contour: config.contour.clone(),
        });
        Self {
            session: SessionState::new(&config),
            pipeline,
            input: InputHandler::new(),
            fps: FpsCounter::new(),
            last_analysis: None,
            export_status: None,
            config,
            device,
            secondary,
        }
    }

    /// Configures and opens the devices. A device that cannot be opened is
    /// logged and left closed; `o` retries.
    pub fn setup(&mut self) {
        // --- 1. Primary device ---
        self.device.set_registration(self.config.registration);
        self.device.set_depth_clipping(self.config.clipping);
        match self.device.open() {
            Ok(()) => {
                let intrinsics = self.device.intrinsics();
                info!(
                    device = self.device.name(),
                    sensor_emitter_distance_cm = intrinsics.sensor_emitter_distance_cm,
                    sensor_camera_distance_cm = intrinsics.sensor_camera_distance_cm,
                    zero_plane_pixel_size_mm = intrinsics.zero_plane_pixel_size_mm,
                    zero_plane_distance_mm = intrinsics.zero_plane_distance_mm,
                    "Depth device ready"
                );
            }
            Err(e) => warn!(device = self.device.name(), error = %e, "Could not open depth device"),
        }
        self.device.set_tilt_angle(self.session.tilt_degrees as f32);

        // --- 2. Second device ---
        if let Some(secondary) = self.secondary.as_mut() {
            secondary.set_registration(self.config.registration);
            if let Err(e) = secondary.open() {
                warn!(device = secondary.name(), error = %e, "Could not open second depth device");
            }
        }
    }

    /// Polls the devices and runs the pipeline on a new primary frame.
    pub fn update(&mut self) {
        self.fps.tick();
        self.device.update();
        if self.device.is_frame_new() {
            let convention = DepthConvention::from_near_white(self.device.is_depth_near_value_white());
            match self.pipeline.process(
                self.device.depth_pixels(),
                &mut self.session,
                self.device.clipping_range(),
                convention,
            ) {
                Ok(analysis) => self.last_analysis = Some(analysis),
                Err(e) => warn!(error = %e, "Depth frame rejected"),
            }
        }
        if let Some(secondary) = self.secondary.as_mut() {
            secondary.update();
        }
    }

    /// Renders the current display mode and the status text.
    pub fn draw(&mut self) -> DrawOutput {
        let frame = match self.session.mode {
            DisplayMode::TwoD => render::compose_two_d(&TwoDView {
                depth: self.device.depth_pixels(),
                color: self.device.color_pixels(),
                mask: self.pipeline.mask(),
                blobs: self.pipeline.blobs(),
                roi: self.session.roi,
                secondary_depth: self
                    .secondary
                    .as_deref()
                    .filter(|device| device.is_connected())
                    .map(|device| device.depth_pixels()),
                display_scale: self.session.display_scale,
            }),
            DisplayMode::PointCloud => self.draw_point_cloud(),
        };

        let mut status = report::status_lines(
            &self.session,
            self.device.as_ref(),
            self.pipeline.blobs().len(),
            self.fps.fps(),
        );
        if let Some(export) = &self.export_status {
            status.push(export.clone());
        }
        DrawOutput { frame, status }
    }

    fn draw_point_cloud(&mut self) -> RgbImage {
        let cloud = PointCloud::build(self.device.as_ref(), &self.session);
        debug!(points = cloud.len(), "Point cloud built");

        if self.session.take_cloud_export() {
            let path = &self.config.export_path;
            self.export_status = Some(match cloud.save_ply(path) {
                Ok(bytes) => {
                    info!(points = cloud.len(), bytes, path = %path.display(), "Point cloud saved");
                    format!("saved {} points to {}", cloud.len(), path.display())
                }
                Err(e) => {
                    warn!(error = %e, path = %path.display(), "Point cloud export failed");
                    format!("point cloud export failed: {e}")
                }
            });
        }

        let (width, height) = self.view_size();
        render::render_point_cloud(&cloud, &self.session.orbit, width, height)
    }

    /// Size of the rendered frame after the display scale.
    pub fn view_size(&self) -> (u32, u32) {
        let scale = self.session.display_scale;
        if scale <= 0.0 {
            return (VIEW_WIDTH, VIEW_HEIGHT);
        }
        (
            ((VIEW_WIDTH as f32 * scale).round() as u32).max(1),
            ((VIEW_HEIGHT as f32 * scale).round() as u32).max(1),
        )
    }

    /// Levels the motor and closes every device.
    pub fn exit(&mut self) {
        self.device.set_tilt_angle(0.0);
        self.device.close();
        if let Some(secondary) = self.secondary.as_mut() {
            secondary.close();
        }
        info!("Depth demo stopped");
    }

    pub fn key_pressed(&mut self, key: Key) {
        for command in self.input.key_pressed(&mut self.session, key) {
            if let Err(e) = command.apply(self.device.as_mut()) {
                warn!(device = self.device.name(), command = ?command, error = %e, "Device command failed");
            }
        }
    }

    /// Mouse coordinates are in window pixels of the rendered frame.
    pub fn mouse_pressed(&mut self, x: f32, y: f32) {
        self.input.mouse_pressed(&mut self.session, x, y);
    }

    pub fn mouse_dragged(&mut self, x: f32, y: f32) {
        self.input.mouse_dragged(&mut self.session, x, y);
    }

    pub fn mouse_released(&mut self) {
        self.input.mouse_released();
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionState {
        &mut self.session
    }

    pub fn device(&self) -> &dyn DepthDevice {
        self.device.as_ref()
    }

    pub fn secondary(&self) -> Option<&dyn DepthDevice> {
        self.secondary.as_deref()
    }

    pub fn pipeline(&self) -> &DepthPipeline {
        &self.pipeline
    }

    pub fn last_analysis(&self) -> Option<&FrameAnalysis> {
        self.last_analysis.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::synthetic::{SceneConfig, SyntheticKinect};
    use std::path::Path;

    fn inline_app(config: AppConfig) -> DepthApp {
        let device = SyntheticKinect::inline("primary", config.scene.clone());
        let secondary = config
            .second_device
            .then(|| Box::new(SyntheticKinect::inline("secondary", config.scene.clone())) as Box<dyn DepthDevice>);
        DepthApp::new(config, Box::new(device), secondary)
    }

    fn press(app: &mut DepthApp, keys: &str) {
        for c in keys.chars() {
            app.key_pressed(Key::Char(c));
        }
    }

    fn export_config(path: &Path) -> AppConfig {
        AppConfig {
            export_path: path.to_path_buf(),
            ..AppConfig::default()
        }
    }

    #[test]
    fn a_frame_flows_from_device_to_draw() {
        let mut app = inline_app(AppConfig::default());
        app.setup();
        assert!(app.device().is_connected());
        app.update();

        let analysis = app.last_analysis().unwrap();
        assert_eq!(analysis.blob_count, 2);
        assert!(analysis.pixels_selected > 0);

        let output = app.draw();
        assert_eq!(output.frame.dimensions(), (896, 672));
        assert!(output.status.iter().any(|line| line.contains("num blobs found 2")));
    }

    #[test]
    fn export_happens_once_on_the_next_point_cloud_draw() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloud.ply");
        let mut app = inline_app(export_config(&path));
        app.setup();
        app.update();

        press(&mut app, "s");
        app.draw();
        assert!(!path.exists(), "2D draws never export");

        press(&mut app, "p");
        let output = app.draw();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("element vertex"));
        assert!(!text.contains("element vertex 0\n"));
        assert!(output.status.iter().any(|line| line.starts_with("saved ")));

        std::fs::remove_file(&path).unwrap();
        app.update();
        app.draw();
        assert!(!path.exists());
        assert!(!app.session().cloud_export_pending());
    }

    #[test]
    fn failed_export_is_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("cloud.ply");
        let mut app = inline_app(export_config(&path));
        app.setup();
        app.update();
        press(&mut app, "ps");
        let output = app.draw();
        assert!(output.status.iter().any(|line| line.contains("export failed")));
    }

    #[test]
    fn an_unplugged_device_degrades_gracefully() {
        let mut device = SyntheticKinect::inline("primary", SceneConfig::default());
        device.set_unplugged(true);
        let mut app = DepthApp::new(AppConfig::default(), Box::new(device), None);
        app.setup();
        app.update();
        assert!(app.last_analysis().is_none());

        let output = app.draw();
        assert!(output.status.iter().any(|line| line.contains("connection is: false")));
        press(&mut app, "p");
        assert_eq!(app.draw().frame.dimensions(), app.view_size());
    }

    #[test]
    fn tilt_keys_reach_the_device_and_exit_levels_it() {
        let mut app = inline_app(AppConfig::default());
        app.setup();
        for _ in 0..5 {
            app.key_pressed(Key::Up);
        }
        assert_eq!(app.device().tilt_angle(), 5.0);
        press(&mut app, "c");
        assert!(!app.device().is_connected());
        assert_eq!(app.device().tilt_angle(), 0.0);
        press(&mut app, "o");
        assert!(app.device().is_connected());
        assert_eq!(app.device().tilt_angle(), 5.0);

        app.exit();
        assert!(!app.device().is_connected());
        assert_eq!(app.device().tilt_angle(), 0.0);
    }

    #[test]
    fn second_device_follows_the_primary_lifecycle() {
        let config = AppConfig {
            second_device: true,
            ..AppConfig::default()
        };
        let mut app = inline_app(config);
        app.setup();
        app.update();
        let secondary = app.secondary().unwrap();
        assert!(secondary.is_connected());
        assert!(secondary.is_frame_new());
        app.exit();
        assert!(!app.secondary().unwrap().is_connected());
    }

    #[test]
    fn dragging_the_roi_in_window_pixels() {
        let mut app = inline_app(AppConfig::default());
        app.setup();
        app.mouse_pressed(70.0, 70.0);
        app.mouse_dragged(140.0, 105.0);
        app.mouse_released();
        let roi = app.session().roi;
        assert!((roi.x - 100.0).abs() < 1e-3);
        assert!((roi.width - 100.0).abs() < 1e-3);
        assert!((roi.height - 50.0).abs() < 1e-3);
    }
}
