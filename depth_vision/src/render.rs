// THEORY:
// The `render` module is the software renderer. It never talks to a window or a
// terminal; it produces plain RGB images that a host can put anywhere (the
// terminal viewer, a PNG file, a test assertion).
//
// Key architectural principles:
// 1.  **2D Composition**: The 2D view is a fixed 2x2 grid of 640x480 panels:
//     the raw depth image with the ROI outline, the color image, the binary
//     mask with the blob outlines, and the second device's depth image. The
//     whole canvas is then scaled by the display scale, which is why mouse
//     positions are divided by the same scale before they reach the ROI.
// 2.  **Point Cloud Projection**: Vertices are taken from camera space through
//     a fixed model transform (flip Y and Z, push 1000 mm back) and an orbit
//     camera, then splatted as 3x3 squares with a depth buffer.

use crate::core_modules::blob_extractor::Blob;
use crate::core_modules::device::{DEPTH_HEIGHT, DEPTH_WIDTH};
use crate::core_modules::point_cloud::PointCloud;
use crate::core_modules::roi::RoiRect;
use glam::{Mat4, Vec3, Vec4};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

/// Width of the unscaled 2D canvas.
pub const VIEW_WIDTH: u32 = 2 * DEPTH_WIDTH;
/// Height of the unscaled 2D canvas.
pub const VIEW_HEIGHT: u32 = 2 * DEPTH_HEIGHT;

pub const BACKGROUND: Rgb<u8> = Rgb([100, 100, 100]);
const ROI_COLOR: Rgb<u8> = Rgb([255, 220, 0]);
const CONTOUR_COLOR: Rgb<u8> = Rgb([255, 40, 40]);
const CENTROID_COLOR: Rgb<u8> = Rgb([40, 220, 255]);

/// Side of the square drawn for each point cloud vertex, in pixels.
pub const POINT_SIZE: i32 = 3;
/// How far the point cloud is pushed back from the camera, in millimeters.
const CLOUD_OFFSET_MM: f32 = 1000.0;
const PITCH_LIMIT_DEGREES: f32 = 89.0;

/// A camera orbiting the origin of the point cloud view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitCamera {
    /// Rotation around the vertical axis, in degrees.
    pub yaw: f32,
    /// Elevation above the horizontal plane, in degrees.
    pub pitch: f32,
    /// Distance from the orbit target, in millimeters.
    pub distance: f32,
    /// Vertical field of view, in degrees.
    pub fov_y: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.0,
            distance: 1500.0,
            fov_y: 60.0,
        }
    }
}

impl OrbitCamera {
    pub fn orbit(&mut self, delta_yaw_degrees: f32, delta_pitch_degrees: f32) {
        self.yaw = (self.yaw + delta_yaw_degrees) % 360.0;
        self.pitch = (self.pitch + delta_pitch_degrees).clamp(-PITCH_LIMIT_DEGREES, PITCH_LIMIT_DEGREES);
    }

    pub fn eye(&self) -> Vec3 {
        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        Vec3::new(
            self.distance * pitch.cos() * yaw.sin(),
            self.distance * pitch.sin(),
            self.distance * pitch.cos() * yaw.cos(),
        )
    }

    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        let view = Mat4::look_at_rh(self.eye(), Vec3::ZERO, Vec3::Y);
        let projection = Mat4::perspective_rh(self.fov_y.to_radians(), aspect, 1.0, 20_000.0);
        projection * view
    }
}

/// The transform from sensor camera space into the point cloud view's world.
pub fn cloud_model_matrix() -> Mat4 {
    Mat4::from_scale(Vec3::new(1.0, -1.0, -1.0)) * Mat4::from_translation(Vec3::new(0.0, 0.0, -CLOUD_OFFSET_MM))
}

/// Everything the 2D view shows.
pub struct TwoDView<'a> {
    pub depth: &'a GrayImage,
    pub color: &'a RgbImage,
    pub mask: &'a GrayImage,
    pub blobs: &'a [Blob],
    pub roi: RoiRect,
    /// Depth image of the second device, if one is running.
    pub secondary_depth: Option<&'a GrayImage>,
    pub display_scale: f32,
}

fn gray_to_rgb(gray: &GrayImage) -> RgbImage {
    DynamicImage::ImageLuma8(gray.clone()).into_rgb8()
}

fn draw_roi(canvas: &mut RgbImage, roi: &RoiRect) {
    let width = (roi.max_x() - roi.min_x()).round() as u32;
    let height = (roi.max_y() - roi.min_y()).round() as u32;
    if width == 0 || height == 0 {
        return;
    }
    let rect = Rect::at(roi.min_x().round() as i32, roi.min_y().round() as i32).of_size(width, height);
    draw_hollow_rect_mut(canvas, rect, ROI_COLOR);
}

fn draw_blobs(canvas: &mut RgbImage, blobs: &[Blob], offset: (f32, f32)) {
    for blob in blobs {
        let n = blob.points.len();
        for i in 0..n {
            let a = blob.points[i];
            let b = blob.points[(i + 1) % n];
            draw_line_segment_mut(
                canvas,
                (a.x as f32 + offset.0, a.y as f32 + offset.1),
                (b.x as f32 + offset.0, b.y as f32 + offset.1),
                CONTOUR_COLOR,
            );
        }
        let (cx, cy) = (blob.centroid.0 as f32 + offset.0, blob.centroid.1 as f32 + offset.1);
        draw_line_segment_mut(canvas, (cx - 3.0, cy), (cx + 3.0, cy), CENTROID_COLOR);
        draw_line_segment_mut(canvas, (cx, cy - 3.0), (cx, cy + 3.0), CENTROID_COLOR);
    }
}

/// Scales a canvas by the display scale. A non-positive scale leaves it unchanged.
pub fn apply_display_scale(canvas: RgbImage, scale: f32) -> RgbImage {
    if scale <= 0.0 || scale == 1.0 {
        return canvas;
    }
    let width = ((canvas.width() as f32 * scale).round() as u32).max(1);
    let height = ((canvas.height() as f32 * scale).round() as u32).max(1);
    imageops::resize(&canvas, width, height, FilterType::Nearest)
}

/// Composes the four 2D panels and applies the display scale.
pub fn compose_two_d(view: &TwoDView) -> RgbImage {
    let mut canvas = RgbImage::from_pixel(VIEW_WIDTH, VIEW_HEIGHT, BACKGROUND);
    let (panel_w, panel_h) = (DEPTH_WIDTH as i64, DEPTH_HEIGHT as i64);

    // --- 1. Depth with the ROI ---
    imageops::replace(&mut canvas, &gray_to_rgb(view.depth), 0, 0);
    draw_roi(&mut canvas, &view.roi);

    // --- 2. Color ---
    imageops::replace(&mut canvas, view.color, panel_w, 0);

    // --- 3. Mask with contours ---
    imageops::replace(&mut canvas, &gray_to_rgb(view.mask), 0, panel_h);
    draw_blobs(&mut canvas, view.blobs, (0.0, panel_h as f32));

    // --- 4. Second device ---
    if let Some(depth) = view.secondary_depth {
        imageops::replace(&mut canvas, &gray_to_rgb(depth), panel_w, panel_h);
    }

    apply_display_scale(canvas, view.display_scale)
}

/// Projects the point cloud through the orbit camera.
pub fn render_point_cloud(cloud: &PointCloud, camera: &OrbitCamera, width: u32, height: u32) -> RgbImage {
    let mut image = RgbImage::from_pixel(width, height, BACKGROUND);
    if width == 0 || height == 0 {
        return image;
    }
    let transform = camera.view_projection(width as f32 / height as f32) * cloud_model_matrix();
    let mut depth_buffer = vec![f32::INFINITY; (width * height) as usize];
    let half = POINT_SIZE / 2;

    for (position, color) in cloud.iter() {
        let clip = transform * Vec4::new(position.x, position.y, position.z, 1.0);
        if clip.w <= 0.0 {
            continue;
        }
        let ndc = clip.truncate() / clip.w;
        if !(0.0..=1.0).contains(&ndc.z) {
            continue;
        }
        let sx = ((ndc.x + 1.0) * 0.5 * width as f32) as i32;
        let sy = ((1.0 - ndc.y) * 0.5 * height as f32) as i32;
        let rgb = Rgb([color[0], color[1], color[2]]);

        for py in sy - half..=sy + half {
            for px in sx - half..=sx + half {
                if px < 0 || py < 0 || px >= width as i32 || py >= height as i32 {
                    continue;
                }
                let index = (py as u32 * width + px as u32) as usize;
                if ndc.z < depth_buffer[index] {
                    depth_buffer[index] = ndc.z;
                    image.put_pixel(px as u32, py as u32, rgb);
                }
            }
        }
    }
    image
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn orbit_keeps_the_pitch_off_the_poles() {
        let mut camera = OrbitCamera::default();
        camera.orbit(30.0, 200.0);
        assert_eq!(camera.yaw, 30.0);
        assert_eq!(camera.pitch, PITCH_LIMIT_DEGREES);
        camera.orbit(0.0, -400.0);
        assert_eq!(camera.pitch, -PITCH_LIMIT_DEGREES);
    }

    #[test]
    fn default_eye_looks_down_the_z_axis() {
        let eye = OrbitCamera::default().eye();
        assert!((eye - Vec3::new(0.0, 0.0, 1500.0)).length() < 1e-3);
    }

    #[test]
    fn model_matrix_flips_and_pushes_back() {
        let p = cloud_model_matrix().transform_point3(Vec3::new(10.0, 20.0, 1500.0));
        assert!((p - Vec3::new(10.0, -20.0, -500.0)).length() < 1e-3);
    }

    #[test]
    fn a_point_on_the_axis_lands_in_the_centre() {
        let cloud = PointCloud {
            vertices: vec![Vec3::new(0.0, 0.0, 1000.0)],
            colors: vec![[255, 0, 0, 255]],
        };
        let image = render_point_cloud(&cloud, &OrbitCamera::default(), 101, 101);
        assert_eq!(*image.get_pixel(50, 50), Rgb([255, 0, 0]));
        assert_eq!(*image.get_pixel(51, 51), Rgb([255, 0, 0]));
        assert_eq!(*image.get_pixel(0, 0), BACKGROUND);
    }

    #[test]
    fn nearer_points_hide_farther_ones() {
        let cloud = PointCloud {
            vertices: vec![Vec3::new(0.0, 0.0, 1200.0), Vec3::new(0.0, 0.0, 900.0)],
            colors: vec![[0, 0, 255, 255], [0, 255, 0, 255]],
        };
        let image = render_point_cloud(&cloud, &OrbitCamera::default(), 101, 101);
        assert_eq!(*image.get_pixel(50, 50), Rgb([0, 255, 0]));

        let reversed = PointCloud {
            vertices: cloud.vertices.iter().rev().copied().collect(),
            colors: cloud.colors.iter().rev().copied().collect(),
        };
        let image = render_point_cloud(&reversed, &OrbitCamera::default(), 101, 101);
        assert_eq!(*image.get_pixel(50, 50), Rgb([0, 255, 0]));
    }

    #[test]
    fn two_d_panels_are_laid_out_in_a_grid() {
        let depth = GrayImage::from_pixel(DEPTH_WIDTH, DEPTH_HEIGHT, Luma([40]));
        let color = RgbImage::from_pixel(DEPTH_WIDTH, DEPTH_HEIGHT, Rgb([1, 2, 3]));
        let mut mask = GrayImage::new(DEPTH_WIDTH, DEPTH_HEIGHT);
        mask.put_pixel(300, 200, Luma([255]));

        let view = TwoDView {
            depth: &depth,
            color: &color,
            mask: &mask,
            blobs: &[],
            roi: RoiRect::new(10.0, 10.0, 620.0, 460.0),
            secondary_depth: None,
            display_scale: 1.0,
        };
        let canvas = compose_two_d(&view);
        assert_eq!(canvas.dimensions(), (VIEW_WIDTH, VIEW_HEIGHT));
        assert_eq!(*canvas.get_pixel(100, 100), Rgb([40, 40, 40]));
        assert_eq!(*canvas.get_pixel(10, 100), ROI_COLOR);
        assert_eq!(*canvas.get_pixel(700, 100), Rgb([1, 2, 3]));
        assert_eq!(*canvas.get_pixel(300, 680), Rgb([255, 255, 255]));
        assert_eq!(*canvas.get_pixel(1000, 700), BACKGROUND);
    }

    #[test]
    fn display_scale_shrinks_the_canvas() {
        let depth = GrayImage::new(DEPTH_WIDTH, DEPTH_HEIGHT);
        let color = RgbImage::new(DEPTH_WIDTH, DEPTH_HEIGHT);
        let view = TwoDView {
            depth: &depth,
            color: &color,
            mask: &depth,
            blobs: &[],
            roi: RoiRect::new(0.0, 0.0, 0.0, 0.0),
            secondary_depth: Some(&depth),
            display_scale: 0.5,
        };
        assert_eq!(compose_two_d(&view).dimensions(), (640, 480));
    }
}
