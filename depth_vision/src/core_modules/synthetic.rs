// THEORY:
// `SyntheticKinect` is a software depth camera. It renders a small procedural
// scene (a back wall with a few rounded objects drifting in front of it) and
// serves it through the `DepthDevice` trait, so the whole demo can run, and be
// tested, without hardware attached.
//
// Key architectural principles:
// 1.  **Same Contract as Hardware**: Frames arrive asynchronously from a
//     producer thread and are picked up by a non-blocking `update`, exactly
//     like a USB device streaming isochronous transfers. Inline and static
//     sources exist for deterministic tests.
// 2.  **Kinect Semantics**: Raw distances are millimeters with 0 meaning "no
//     reading" (the IR shadow band on the left edge), the 8-bit depth image is
//     built through the shared lookup table, and world coordinates follow the
//     zero-plane projection of the real sensor.
// 3.  **Capability Profiles**: The device can pretend to be an older model
//     (tilt, LED, accelerometer) or a newer one with none of them.

use crate::core_modules::device::{
    DEPTH_HEIGHT, DEPTH_WIDTH, DepthDevice, DeviceCapabilities, LedMode, SensorIntrinsics,
    depth_lookup_table,
};
use crate::core_modules::threshold::ClippingRange;
use crate::error::{DepthError, Result};
use glam::Vec3;
use image::{GrayImage, Luma, Rgb, RgbImage, Rgba};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TrySendError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

const STANDARD_GRAVITY: f32 = 9.81;
const MOTOR_LIMIT_DEGREES: f32 = 31.0;
/// Horizontal offset between the IR and RGB cameras when registration is off.
const UNREGISTERED_OFFSET_PX: i64 = 8;
const FRAME_QUEUE_DEPTH: usize = 2;

/// A rounded object floating in front of the back wall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    /// Resting position in depth-image pixels.
    pub center: [f32; 2],
    pub radius: f32,
    /// Distance of the object's silhouette from the sensor.
    pub distance_mm: u16,
    /// Peak displacement of the sway motion in pixels.
    pub sway: [f32; 2],
    /// Frames per sway cycle, 0 for a still object.
    pub period_frames: u32,
    pub color: [u8; 3],
}

/// Parameters of the procedural scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub background_mm: u16,
    /// Columns on the left edge that never return a reading.
    pub shadow_columns: u32,
    pub frame_interval_ms: u64,
    pub objects: Vec<SceneObject>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            background_mm: 3000,
            shadow_columns: 8,
            frame_interval_ms: 33,
            objects: vec![
                SceneObject {
                    center: [320.0, 240.0],
                    radius: 60.0,
                    distance_mm: 900,
                    sway: [120.0, 30.0],
                    period_frames: 180,
                    color: [230, 180, 140],
                },
                SceneObject {
                    center: [140.0, 360.0],
                    radius: 45.0,
                    distance_mm: 1200,
                    sway: [0.0, 0.0],
                    period_frames: 0,
                    color: [70, 130, 200],
                },
                SceneObject {
                    center: [520.0, 120.0],
                    radius: 70.0,
                    distance_mm: 2600,
                    sway: [0.0, 40.0],
                    period_frames: 240,
                    color: [120, 200, 90],
                },
            ],
        }
    }
}

/// One rendered frame: raw millimeters plus the registered color image.
#[derive(Debug, Clone)]
pub struct SceneFrame {
    pub width: u32,
    pub height: u32,
    pub distance_mm: Vec<u16>,
    pub color: RgbImage,
}

impl SceneFrame {
    pub fn new(width: u32, height: u32, distance_mm: Vec<u16>, color: RgbImage) -> Result<Self> {
        let expected = (width * height) as usize;
        if distance_mm.len() != expected {
            return Err(DepthError::SizeMismatch {
                expected,
                actual: distance_mm.len(),
            });
        }
        if color.dimensions() != (width, height) {
            return Err(DepthError::SizeMismatch {
                expected,
                actual: (color.width() * color.height()) as usize,
            });
        }
        Ok(Self {
            width,
            height,
            distance_mm,
            color,
        })
    }
}

/// Renders the scene as it looks at `frame_index`.
pub fn render_scene(scene: &SceneConfig, frame_index: u64, width: u32, height: u32) -> SceneFrame {
    let positions: Vec<(f32, f32)> = scene
        .objects
        .iter()
        .map(|object| {
            if object.period_frames == 0 {
                return (object.center[0], object.center[1]);
            }
            let phase = (frame_index % object.period_frames as u64) as f32 / object.period_frames as f32
                * std::f32::consts::TAU;
            (
                object.center[0] + object.sway[0] * phase.sin(),
                object.center[1] + object.sway[1] * phase.cos(),
            )
        })
        .collect();

    let mut distance_mm = vec![0u16; (width * height) as usize];
    let mut color = RgbImage::new(width, height);

    for y in 0..height {
        for x in 0..width {
            let background = Rgb([
                (60 + y * 60 / height.max(1)) as u8,
                (60 + x * 60 / width.max(1)) as u8,
                80,
            ]);
            let mut nearest = (scene.background_mm as f32, background);

            for (object, &(cx, cy)) in scene.objects.iter().zip(&positions) {
                let dx = x as f32 - cx;
                let dy = y as f32 - cy;
                let d2 = dx * dx + dy * dy;
                let r2 = object.radius * object.radius;
                if d2 >= r2 {
                    continue;
                }
                let bulge = (r2 - d2).sqrt();
                let surface = object.distance_mm as f32 - bulge * 0.5;
                if surface < nearest.0 {
                    let shade = 0.6 + 0.4 * bulge / object.radius;
                    nearest = (
                        surface,
                        Rgb([
                            (object.color[0] as f32 * shade) as u8,
                            (object.color[1] as f32 * shade) as u8,
                            (object.color[2] as f32 * shade) as u8,
                        ]),
                    );
                }
            }

            let index = (y * width + x) as usize;
            distance_mm[index] = if x < scene.shadow_columns {
                0
            } else {
                nearest.0.round().max(1.0) as u16
            };
            color.put_pixel(x, y, nearest.1);
        }
    }

    SceneFrame {
        width,
        height,
        distance_mm,
        color,
    }
}

struct Producer {
    frames: Receiver<SceneFrame>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Producer {
    fn spawn(name: &str, scene: SceneConfig, first_frame: u64, width: u32, height: u32) -> Result<Self> {
        let (tx, frames) = mpsc::sync_channel::<SceneFrame>(FRAME_QUEUE_DEPTH);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let interval = Duration::from_millis(scene.frame_interval_ms.max(1));

        let handle = thread::Builder::new()
            .name(format!("{name}-frames"))
            .spawn(move || {
                let mut frame_index = first_frame;
                while !stop_flag.load(Ordering::Relaxed) {
                    let frame = render_scene(&scene, frame_index, width, height);
                    match tx.try_send(frame) {
                        // A full queue means the host is slower than the sensor; drop the frame.
                        Ok(()) | Err(TrySendError::Full(_)) => {}
                        Err(TrySendError::Disconnected(_)) => break,
                    }
                    frame_index += 1;
                    thread::sleep(interval);
                }
            })?;

        Ok(Self {
            frames,
            stop,
            handle: Some(handle),
        })
    }

    fn latest(&self) -> Option<SceneFrame> {
        let mut latest = None;
        while let Ok(frame) = self.frames.try_recv() {
            latest = Some(frame);
        }
        latest
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Synthetic frame producer panicked");
            }
        }
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

enum FrameSource {
    /// A new frame is rendered on every `update`.
    Inline,
    /// Frames are rendered on a background thread while connected.
    Threaded(Option<Producer>),
    /// The same frame is served on every `update`.
    Static(SceneFrame),
}

/// A procedural depth camera implementing `DepthDevice`.
pub struct SyntheticKinect {
    name: String,
    scene: SceneConfig,
    source: FrameSource,
    capabilities: DeviceCapabilities,
    intrinsics: SensorIntrinsics,
    width: u32,
    height: u32,

    connected: bool,
    unplugged: bool,
    frame_new: bool,
    frames_received: u64,

    distance_mm: Vec<u16>,
    depth: GrayImage,
    color: RgbImage,
    lookup: Vec<u8>,

    clipping: ClippingRange,
    near_white: bool,
    registration: bool,
    tilt_degrees: f32,
    led: LedMode,
}

impl SyntheticKinect {
    fn with_source(name: impl Into<String>, scene: SceneConfig, source: FrameSource, width: u32, height: u32) -> Self {
        let clipping = ClippingRange::DEFAULT;
        Self {
            name: name.into(),
            scene,
            source,
            capabilities: DeviceCapabilities::FULL,
            intrinsics: SensorIntrinsics::KINECT,
            width,
            height,
            connected: false,
            unplugged: false,
            frame_new: false,
            frames_received: 0,
            distance_mm: vec![0; (width * height) as usize],
            depth: GrayImage::new(width, height),
            color: RgbImage::new(width, height),
            lookup: depth_lookup_table(clipping, true),
            clipping,
            near_white: true,
            registration: false,
            tilt_degrees: 0.0,
            led: LedMode::Green,
        }
    }

    /// A device whose frames are produced on a background thread.
    pub fn threaded(name: impl Into<String>, scene: SceneConfig) -> Self {
        Self::with_source(name, scene, FrameSource::Threaded(None), DEPTH_WIDTH, DEPTH_HEIGHT)
    }

    /// A device that renders a new frame synchronously on every `update`.
    pub fn inline(name: impl Into<String>, scene: SceneConfig) -> Self {
        Self::with_source(name, scene, FrameSource::Inline, DEPTH_WIDTH, DEPTH_HEIGHT)
    }

    /// A device that serves `frame` on every `update`.
    pub fn from_frame(name: impl Into<String>, frame: SceneFrame) -> Self {
        let (width, height) = (frame.width, frame.height);
        Self::with_source(name, SceneConfig::default(), FrameSource::Static(frame), width, height)
    }

    pub fn with_capabilities(mut self, capabilities: DeviceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Simulates a cable pull: the device refuses to open while unplugged.
    pub fn set_unplugged(&mut self, unplugged: bool) {
        self.unplugged = unplugged;
        if unplugged {
            self.close();
        }
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }

    pub fn is_registered(&self) -> bool {
        self.registration
    }

    fn rebuild_lookup(&mut self) {
        self.lookup = depth_lookup_table(self.clipping, self.near_white);
    }

    fn accept(&mut self, frame: SceneFrame) {
        self.distance_mm = frame.distance_mm;
        self.color = frame.color;
        let lookup = &self.lookup;
        let last = lookup.len() - 1;
        for (pixel, &mm) in self.depth.pixels_mut().zip(&self.distance_mm) {
            *pixel = Luma([lookup[(mm as usize).min(last)]]);
        }
        self.frames_received += 1;
        self.frame_new = true;
    }

    fn in_bounds(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height
    }
}

impl DepthDevice for SyntheticKinect {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self) -> Result<()> {
        if self.unplugged {
            return Err(DepthError::DeviceUnavailable(format!("{} is not plugged in", self.name)));
        }
        if self.connected {
            return Ok(());
        }
        if let FrameSource::Threaded(producer) = &mut self.source {
            *producer = Some(Producer::spawn(
                &self.name,
                self.scene.clone(),
                self.frames_received,
                self.width,
                self.height,
            )?);
        }
        self.connected = true;
        info!(device = %self.name, "Depth device opened");
        Ok(())
    }

    fn close(&mut self) {
        if let FrameSource::Threaded(producer) = &mut self.source {
            if let Some(mut p) = producer.take() {
                p.shutdown();
            }
        }
        if self.connected {
            info!(device = %self.name, "Depth device closed");
        }
        self.connected = false;
        self.frame_new = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn update(&mut self) {
        self.frame_new = false;
        if !self.connected {
            return;
        }
        let frame = match &self.source {
            FrameSource::Inline => Some(render_scene(
                &self.scene,
                self.frames_received,
                self.width,
                self.height,
            )),
            FrameSource::Threaded(Some(producer)) => producer.latest(),
            FrameSource::Threaded(None) => None,
            FrameSource::Static(frame) => Some(frame.clone()),
        };
        if let Some(frame) = frame {
            self.accept(frame);
        }
    }

    fn is_frame_new(&self) -> bool {
        self.frame_new
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn depth_pixels(&self) -> &GrayImage {
        &self.depth
    }

    fn color_pixels(&self) -> &RgbImage {
        &self.color
    }

    fn distance_at(&self, x: u32, y: u32) -> f32 {
        if !self.in_bounds(x, y) {
            return 0.0;
        }
        self.distance_mm[(y * self.width + x) as usize] as f32
    }

    fn color_at(&self, x: u32, y: u32) -> Rgba<u8> {
        if !self.in_bounds(x, y) {
            return Rgba([0, 0, 0, 255]);
        }
        let sx = if self.registration {
            x
        } else {
            (x as i64 + UNREGISTERED_OFFSET_PX).clamp(0, self.width as i64 - 1) as u32
        };
        let Rgb([r, g, b]) = *self.color.get_pixel(sx, y);
        Rgba([r, g, b, 255])
    }

    fn world_coordinate_at(&self, x: u32, y: u32) -> Vec3 {
        self.intrinsics.world_coordinate(x, y, self.distance_at(x, y))
    }

    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    fn intrinsics(&self) -> SensorIntrinsics {
        self.intrinsics
    }

    fn tilt_angle(&self) -> f32 {
        self.tilt_degrees
    }

    fn set_tilt_angle(&mut self, degrees: f32) {
        if !self.capabilities.tilt {
            debug!(device = %self.name, "Tilt motor not available");
            return;
        }
        self.tilt_degrees = degrees.clamp(-MOTOR_LIMIT_DEGREES, MOTOR_LIMIT_DEGREES);
    }

    fn led_mode(&self) -> LedMode {
        self.led
    }

    fn set_led(&mut self, mode: LedMode) {
        if !self.capabilities.led {
            debug!(device = %self.name, "LED not available");
            return;
        }
        self.led = mode;
    }

    fn clipping_range(&self) -> ClippingRange {
        self.clipping
    }

    fn set_depth_clipping(&mut self, range: ClippingRange) {
        self.clipping = range;
        self.rebuild_lookup();
    }

    fn is_depth_near_value_white(&self) -> bool {
        self.near_white
    }

    fn enable_depth_near_value_white(&mut self, enabled: bool) {
        self.near_white = enabled;
        self.rebuild_lookup();
    }

    fn set_registration(&mut self, enabled: bool) {
        self.registration = enabled;
    }

    fn accelerometer(&self) -> Option<Vec3> {
        if !self.capabilities.accelerometer || !self.connected {
            return None;
        }
        let radians = self.tilt_degrees.to_radians();
        Some(Vec3::new(
            0.0,
            STANDARD_GRAVITY * radians.cos(),
            STANDARD_GRAVITY * radians.sin(),
        ))
    }
}

impl Drop for SyntheticKinect {
    fn drop(&mut self) {
        self.close();
    }
}
