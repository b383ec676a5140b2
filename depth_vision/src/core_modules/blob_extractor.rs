// THEORY:
// The `BlobExtractor` turns the binary threshold mask into a list of contours,
// one per connected region of "near" pixels. In this demo blobs are only a
// visual indicator (their count and outlines are drawn), so the extractor is a
// thin, stateless layer over `imageproc`'s border-following contour finder.
//
// Algorithm steps:
// 1.  **Border Following**: `imageproc` traces the border of every connected
//     foreground region (Suzuki-Abe), labelling each border as an outer
//     boundary or as the boundary of a hole inside a region.
// 2.  **Hole Policy**: Unless `find_holes` is set only outermost boundaries
//     (borders without a parent) are kept, so a ring-shaped region counts as
//     one blob even when another region sits inside its hole.
// 3.  **Data Aggregation**: For every kept border we compute the bounding box,
//     the enclosed polygon area (shoelace formula) and the polygon centroid.
// 4.  **Optional Filters**: Minimum and maximum area filters exist but are off
//     by default; every region is reported.

use imageproc::contours::{BorderType, Contour};
use imageproc::point::Point;
use serde::{Deserialize, Serialize};

/// Tuning for the contour finder. The defaults report every outer contour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContourFinderConfig {
    /// Mask values strictly above this are foreground.
    pub threshold: u8,
    /// Drop blobs whose area is below this many square pixels.
    pub min_area: Option<f64>,
    /// Drop blobs whose area is above this many square pixels.
    pub max_area: Option<f64>,
    /// Also report the boundaries of holes inside regions.
    pub find_holes: bool,
}

impl Default for ContourFinderConfig {
    fn default() -> Self {
        Self {
            threshold: 0,
            min_area: None,
            max_area: None,
            find_holes: false,
        }
    }
}

/// An axis-aligned box in mask pixel coordinates, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl BoundingBox {
    pub fn width(&self) -> u32 {
        (self.max_x - self.min_x + 1) as u32
    }

    pub fn height(&self) -> u32 {
        (self.max_y - self.min_y + 1) as u32
    }
}

/// A single contour found in the mask.
#[derive(Debug, Clone)]
pub struct Blob {
    /// Position in this frame's blob list. Not persistent across frames.
    pub id: usize,
    /// The traced border, in order.
    pub points: Vec<Point<i32>>,
    pub bounding_box: BoundingBox,
    /// Polygon centroid of the border.
    pub centroid: (f64, f64),
    /// Area enclosed by the border polygon, in square pixels.
    pub area: f64,
    /// True when this border encloses a hole rather than a region.
    pub is_hole: bool,
}

pub mod blob_extractor {
    use super::*;
    use image::GrayImage;
    use imageproc::contours::find_contours_with_threshold;

    /// Finds the blobs of a binary mask.
    pub fn find_blobs(mask: &GrayImage, config: &ContourFinderConfig) -> Vec<Blob> {
        let contours: Vec<Contour<i32>> = find_contours_with_threshold(mask, config.threshold);

        contours
            .into_iter()
            .filter(|contour| config.find_holes || contour.parent.is_none())
            .filter_map(summarize)
            .filter(|blob| config.min_area.is_none_or(|min| blob.area >= min))
            .filter(|blob| config.max_area.is_none_or(|max| blob.area <= max))
            .enumerate()
            .map(|(id, blob)| Blob { id, ..blob })
            .collect()
    }

    fn summarize(contour: Contour<i32>) -> Option<Blob> {
        let first = *contour.points.first()?;

        let mut bounding_box = BoundingBox {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        for p in &contour.points {
            bounding_box.min_x = bounding_box.min_x.min(p.x);
            bounding_box.min_y = bounding_box.min_y.min(p.y);
            bounding_box.max_x = bounding_box.max_x.max(p.x);
            bounding_box.max_y = bounding_box.max_y.max(p.y);
        }

        let (area, centroid) = polygon_area_and_centroid(&contour.points);

        Some(Blob {
            id: 0,
            is_hole: contour.border_type == BorderType::Hole,
            points: contour.points,
            bounding_box,
            centroid,
            area,
        })
    }

    /// Shoelace area and centroid. Degenerate polygons (lines, single points)
    /// have zero area and fall back to the mean of their points.
    pub(crate) fn polygon_area_and_centroid(points: &[Point<i32>]) -> (f64, (f64, f64)) {
        let n = points.len();
        let mut twice_area = 0.0;
        let mut cx = 0.0;
        let mut cy = 0.0;
        for i in 0..n {
            let a = points[i];
            let b = points[(i + 1) % n];
            let cross = a.x as f64 * b.y as f64 - b.x as f64 * a.y as f64;
            twice_area += cross;
            cx += (a.x + b.x) as f64 * cross;
            cy += (a.y + b.y) as f64 * cross;
        }

        if twice_area.abs() < f64::EPSILON {
            let mean_x = points.iter().map(|p| p.x as f64).sum::<f64>() / n.max(1) as f64;
            let mean_y = points.iter().map(|p| p.y as f64).sum::<f64>() / n.max(1) as f64;
            return (0.0, (mean_x, mean_y));
        }

        (
            (twice_area / 2.0).abs(),
            (cx / (3.0 * twice_area), cy / (3.0 * twice_area)),
        )
    }
}
