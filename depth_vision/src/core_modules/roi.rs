// THEORY:
// The `roi` module is the ROI Masker. The camera usually sees walls, the floor
// and furniture at the edges of its field of view; the user drags a rectangle
// over the depth view and everything outside it is ignored downstream.
//
// Key architectural principles:
// 1.  **One Predicate**: Inside-ness is decided by a single strict test,
//     `RoiRect::contains`, shared by the 2D masker and the point cloud builder.
//     A pixel exactly on the rectangle's edge is outside.
// 2.  **Permissive Storage, Normalised Use**: Dragging up or to the left leaves
//     the rectangle with a negative width or height. It is stored exactly as
//     dragged, but every query works on the normalised extents, so the mask is
//     always the region the user actually covered.
// 3.  **Idempotence**: Masking only ever writes zeros outside the rectangle, so
//     masking an already-masked buffer changes nothing.

use image::GrayImage;
use serde::{Deserialize, Serialize};

/// A user-adjustable rectangle in depth-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoiRect {
    pub x: f32,
    pub y: f32,
    /// May be negative after a drag towards the left.
    pub width: f32,
    /// May be negative after a drag upwards.
    pub height: f32,
}

impl RoiRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// A rectangle covering a `width` x `height` image minus `inset` pixels on
    /// every side.
    pub fn inset(width: u32, height: u32, inset: f32) -> Self {
        Self::new(
            inset,
            inset,
            width as f32 - 2.0 * inset,
            height as f32 - 2.0 * inset,
        )
    }

    pub fn min_x(&self) -> f32 {
        self.x.min(self.x + self.width)
    }

    pub fn max_x(&self) -> f32 {
        self.x.max(self.x + self.width)
    }

    pub fn min_y(&self) -> f32 {
        self.y.min(self.y + self.height)
    }

    pub fn max_y(&self) -> f32 {
        self.y.max(self.y + self.height)
    }

    /// Strict containment: points on the border are outside.
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x > self.min_x() && x < self.max_x() && y > self.min_y() && y < self.max_y()
    }

    /// Moves the anchor corner, keeping the current size.
    pub fn set_origin(&mut self, x: f32, y: f32) {
        self.x = x;
        self.y = y;
    }

    /// Stretches the rectangle so its opposite corner sits at `(x, y)`.
    pub fn set_corner(&mut self, x: f32, y: f32) {
        self.width = x - self.x;
        self.height = y - self.y;
    }

    /// A rectangle with zero width or height contains no pixel at all.
    pub fn is_empty(&self) -> bool {
        self.width == 0.0 || self.height == 0.0
    }
}

/// Zeroes every pixel of `image` that is not strictly inside `roi`.
/// Returns how many pixels were cleared.
pub fn mask_outside(image: &mut GrayImage, roi: &RoiRect) -> usize {
    let mut cleared = 0;
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        if !roi.contains(x as f32, y as f32) {
            if pixel.0[0] != 0 {
                cleared += 1;
            }
            pixel.0[0] = 0;
        }
    }
    cleared
}
