// THEORY:
// The `threshold` module is the Threshold Classifier. Users think in
// millimeters ("everything between 50 cm and 1.5 m"), but the depth image the
// device hands us is an 8-bit intensity map whose scale is defined by the
// device's clipping planes. This module bridges the two.
//
// Key architectural principles:
// 1.  **Linear Remap**: A millimeter value is mapped onto the intensity axis
//     with the same linear formula the device uses to build its depth image:
//     the far plane lands on 0 and the near plane on 255 (or the mirror image
//     when the device renders near values black).
// 2.  **No Silent Division by Zero**: A clipping range whose planes coincide has
//     no intensity axis at all. That is reported as an error instead of
//     producing NaN thresholds.
// 3.  **Inclusive Band**: The binary mask keeps every intensity inside the
//     closed band between the two remapped thresholds. If the user has placed
//     the near threshold beyond the far one the band is empty and nothing is
//     selected.

use crate::error::{DepthError, Result};
use image::GrayImage;
use serde::{Deserialize, Serialize};

/// Intensity written into the mask for selected pixels.
pub const MASK_ON: u8 = 255;
/// Intensity written into the mask for rejected pixels.
pub const MASK_OFF: u8 = 0;

/// The device's near/far clipping planes in millimeters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClippingRange {
    pub near_mm: f32,
    pub far_mm: f32,
}

/// Which end of the depth range the device renders bright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthConvention {
    /// Near values are white (255), far values black (0). The device default.
    NearWhite,
    /// Near values are black (0), far values white (255).
    NearBlack,
}

impl DepthConvention {
    pub fn from_near_white(near_white: bool) -> Self {
        if near_white {
            DepthConvention::NearWhite
        } else {
            DepthConvention::NearBlack
        }
    }
}

impl ClippingRange {
    /// The range a Kinect-class device is configured with at startup.
    pub const DEFAULT: ClippingRange = ClippingRange {
        near_mm: 500.0,
        far_mm: 4000.0,
    };

    pub fn new(near_mm: f32, far_mm: f32) -> Self {
        Self { near_mm, far_mm }
    }

    pub fn is_degenerate(&self) -> bool {
        self.near_mm == self.far_mm
    }

    /// Maps a millimeter distance onto the 8-bit intensity axis.
    ///
    /// The result is not clamped: distances outside the clipping range map
    /// outside [0, 255], exactly as the linear formula dictates.
    pub fn map_to_intensity(&self, distance_mm: f32, convention: DepthConvention) -> Result<f32> {
        if self.is_degenerate() {
            return Err(DepthError::DegenerateClipping(self.near_mm));
        }
        let (in_min, in_max) = match convention {
            DepthConvention::NearWhite => (self.far_mm, self.near_mm),
            DepthConvention::NearBlack => (self.near_mm, self.far_mm),
        };
        Ok((distance_mm - in_min) / (in_max - in_min) * 255.0)
    }
}

impl Default for ClippingRange {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// The near/far thresholds after remapping into the intensity domain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntensityThresholds {
    pub near: f32,
    pub far: f32,
    pub convention: DepthConvention,
}

impl IntensityThresholds {
    /// Remaps a pair of millimeter thresholds against the given clipping range.
    pub fn from_millimeters(
        near_mm: f32,
        far_mm: f32,
        clipping: ClippingRange,
        convention: DepthConvention,
    ) -> Result<Self> {
        Ok(Self {
            near: clipping.map_to_intensity(near_mm, convention)?,
            far: clipping.map_to_intensity(far_mm, convention)?,
            convention,
        })
    }

    /// The closed intensity band `(low, high)` that corresponds to "between
    /// the near and the far threshold". `low > high` means an empty band.
    pub fn band(&self) -> (f32, f32) {
        match self.convention {
            DepthConvention::NearWhite => (self.far, self.near),
            DepthConvention::NearBlack => (self.near, self.far),
        }
    }
}

/// Writes a binary mask of every pixel of `gray` whose intensity lies inside
/// the threshold band. Returns the number of selected pixels.
///
/// Under the near-black convention intensity 0 is both the near plane and
/// "no reading" (shadow, out of range, outside the ROI), so it is never selected.
pub fn binarize(gray: &GrayImage, thresholds: &IntensityThresholds, mask: &mut GrayImage) -> Result<usize> {
    if gray.dimensions() != mask.dimensions() {
        return Err(DepthError::SizeMismatch {
            expected: gray.len(),
            actual: mask.len(),
        });
    }

    let (mut low, high) = thresholds.band();
    if thresholds.convention == DepthConvention::NearBlack {
        low = low.max(1.0);
    }
    let mut selected = 0;
    for (src, dst) in gray.as_raw().iter().zip(mask.iter_mut()) {
        let value = *src as f32;
        if low <= value && value <= high {
            *dst = MASK_ON;
            selected += 1;
        } else {
            *dst = MASK_OFF;
        }
    }
    Ok(selected)
}
