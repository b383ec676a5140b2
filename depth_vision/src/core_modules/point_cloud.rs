// THEORY:
// The `PointCloud` is the 3D counterpart of the threshold mask: every sampled
// depth pixel that falls inside the ROI and strictly between the two
// millimeter thresholds becomes a colored vertex at its world position.
//
// Key architectural principles:
// 1.  **Transient**: The cloud is rebuilt from scratch on every point cloud
//     draw. Nothing is cached between frames, so it always reflects the
//     latest frame and the latest session state.
// 2.  **Fixed Sampling Grid**: The 640x480 sensor grid is sampled at a stride
//     of 2 in both directions. Pixels the device cannot see report distance 0
//     and are never inside the band.
// 3.  **Strict Inclusion**: A sample is kept only if it is strictly inside the
//     ROI and its distance is strictly greater than the near threshold and
//     strictly less than the far threshold.
// 4.  **Interchange Export**: `save_ply` writes the cloud as an ASCII PLY mesh
//     of vertices with `x y z` float positions and RGBA byte colors.

use crate::core_modules::device::{DEPTH_HEIGHT, DEPTH_WIDTH, DepthDevice};
use crate::core_modules::roi::RoiRect;
use crate::core_modules::session::SessionState;
use crate::error::{DepthError, Result};
use glam::Vec3;
use ply_rs::ply::{
    Addable, DefaultElement, ElementDef, Encoding, Ply, Property, PropertyDef, PropertyType, ScalarType,
};
use ply_rs::writer::Writer;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Sampling stride over the sensor grid.
pub const CLOUD_STEP: usize = 2;

const VERTEX_ELEMENT: &str = "vertex";

/// The inclusion test for a single sample.
pub fn includes_sample(roi: &RoiRect, x: u32, y: u32, distance_mm: f32, near_mm: f32, far_mm: f32) -> bool {
    roi.contains(x as f32, y as f32) && distance_mm > near_mm && distance_mm < far_mm
}

/// A colored point mesh in camera space (millimeters).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    pub vertices: Vec<Vec3>,
    pub colors: Vec<[u8; 4]>,
}

impl PointCloud {
    /// Samples the device's latest frame using the session's ROI and thresholds.
    pub fn build(device: &dyn DepthDevice, session: &SessionState) -> Self {
        let near = session.near_threshold_mm as f32;
        let far = session.far_threshold_mm as f32;
        let mut cloud = PointCloud::default();

        for y in (0..DEPTH_HEIGHT).step_by(CLOUD_STEP) {
            for x in (0..DEPTH_WIDTH).step_by(CLOUD_STEP) {
                let distance = device.distance_at(x, y);
                if includes_sample(&session.roi, x, y, distance, near, far) {
                    cloud.colors.push(device.color_at(x, y).0);
                    cloud.vertices.push(device.world_coordinate_at(x, y));
                }
            }
        }
        cloud
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Vec3, &[u8; 4])> {
        self.vertices.iter().zip(&self.colors)
    }

    fn to_ply(&self) -> Ply<DefaultElement> {
        let mut ply = Ply::<DefaultElement>::new();
        ply.header.encoding = Encoding::Ascii;
        ply.header.comments.push("depth_vision point cloud".to_string());

        let mut vertex = ElementDef::new(VERTEX_ELEMENT.to_string());
        for axis in ["x", "y", "z"] {
            vertex
                .properties
                .add(PropertyDef::new(axis.to_string(), PropertyType::Scalar(ScalarType::Float)));
        }
        for channel in ["red", "green", "blue", "alpha"] {
            vertex
                .properties
                .add(PropertyDef::new(channel.to_string(), PropertyType::Scalar(ScalarType::UChar)));
        }
        ply.header.elements.add(vertex);

        let payload = self
            .iter()
            .map(|(position, color)| {
                let mut element = DefaultElement::new();
                element.insert("x".to_string(), Property::Float(position.x));
                element.insert("y".to_string(), Property::Float(position.y));
                element.insert("z".to_string(), Property::Float(position.z));
                element.insert("red".to_string(), Property::UChar(color[0]));
                element.insert("green".to_string(), Property::UChar(color[1]));
                element.insert("blue".to_string(), Property::UChar(color[2]));
                element.insert("alpha".to_string(), Property::UChar(color[3]));
                element
            })
            .collect();
        ply.payload.insert(VERTEX_ELEMENT.to_string(), payload);
        ply
    }

    /// Serialises the cloud as ASCII PLY. Returns the number of bytes written.
    pub fn write_ply<W: Write>(&self, out: &mut W) -> Result<usize> {
        let mut ply = self.to_ply();
        ply.make_consistent()
            .map_err(|e| DepthError::Ply(format!("{e:?}")))?;
        let written = Writer::new().write_ply(out, &mut ply)?;
        Ok(written)
    }

    /// Writes the cloud to `path`, replacing any existing file.
    pub fn save_ply(&self, path: &Path) -> Result<usize> {
        let mut out = BufWriter::new(File::create(path)?);
        let written = self.write_ply(&mut out)?;
        out.flush()?;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::synthetic::{SceneFrame, SyntheticKinect};
    use image::{Rgb, RgbImage};
    use ply_rs::parser::Parser;

    /// A 640x480 frame at a uniform distance, with a few probe pixels.
    fn probe_device(probes: &[(u32, u32, u16)]) -> SyntheticKinect {
        let mut distance = vec![1000u16; (DEPTH_WIDTH * DEPTH_HEIGHT) as usize];
        for &(x, y, mm) in probes {
            distance[(y * DEPTH_WIDTH + x) as usize] = mm;
        }
        let color = RgbImage::from_pixel(DEPTH_WIDTH, DEPTH_HEIGHT, Rgb([10, 20, 30]));
        let frame = SceneFrame::new(DEPTH_WIDTH, DEPTH_HEIGHT, distance, color).unwrap();
        let mut kinect = SyntheticKinect::from_frame("probe", frame);
        kinect.set_registration(true);
        kinect.open().unwrap();
        kinect.update();
        kinect
    }

    #[test]
    fn inclusion_is_strict_on_every_bound() {
        let roi = RoiRect::new(10.0, 10.0, 100.0, 100.0);
        assert!(includes_sample(&roi, 50, 50, 1000.0, 500.0, 1500.0));
        assert!(!includes_sample(&roi, 10, 50, 1000.0, 500.0, 1500.0));
        assert!(!includes_sample(&roi, 50, 110, 1000.0, 500.0, 1500.0));
        assert!(!includes_sample(&roi, 50, 50, 500.0, 500.0, 1500.0));
        assert!(!includes_sample(&roi, 50, 50, 1500.0, 500.0, 1500.0));
    }

    #[test]
    fn cloud_samples_every_other_pixel_inside_the_roi() {
        let kinect = probe_device(&[]);
        let mut session = SessionState::default();
        session.roi = RoiRect::new(0.0, 0.0, 21.0, 11.0);
        let cloud = PointCloud::build(&kinect, &session);
        // Even x in 2..=20 and even y in 2..=10.
        assert_eq!(cloud.len(), 10 * 5);
        assert!(cloud.colors.iter().all(|c| *c == [10, 20, 30, 255]));
        assert!(cloud.vertices.iter().all(|v| v.z == 1000.0));
    }

    #[test]
    fn threshold_distances_are_excluded() {
        let kinect = probe_device(&[(100, 100, 500), (102, 100, 1500), (104, 100, 0), (106, 100, 1499)]);
        let mut session = SessionState::default();
        session.roi = RoiRect::new(99.0, 99.0, 9.0, 2.0);
        let cloud = PointCloud::build(&kinect, &session);
        assert_eq!(cloud.len(), 1);
        assert_eq!(cloud.vertices[0].z, 1499.0);
    }

    #[test]
    fn ply_export_lists_every_vertex() {
        let cloud = PointCloud {
            vertices: vec![Vec3::new(1.0, -2.0, 900.0), Vec3::new(0.5, 0.25, 1200.0)],
            colors: vec![[255, 0, 0, 255], [0, 128, 255, 255]],
        };
        let mut bytes = Vec::new();
        let written = cloud.write_ply(&mut bytes).unwrap();
        assert_eq!(written, bytes.len());

        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.starts_with("ply\nformat ascii 1.0\n"));
        assert!(text.contains("element vertex 2\n"));
        assert!(text.contains("property uchar alpha\n"));

        let parsed = Parser::<DefaultElement>::new()
            .read_ply(&mut bytes.as_slice())
            .unwrap();
        let vertices = &parsed.payload[VERTEX_ELEMENT];
        assert_eq!(vertices.len(), 2);
        assert_eq!(vertices[1]["z"], Property::Float(1200.0));
        assert_eq!(vertices[1]["green"], Property::UChar(128));
    }

    #[test]
    fn empty_cloud_still_writes_a_valid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.ply");
        PointCloud::default().save_ply(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("element vertex 0\n"));
        assert!(text.trim_end().ends_with("end_header"));
    }
}
