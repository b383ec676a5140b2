// THEORY:
// The `pipeline` module sequences the 2D stages for one new depth frame. It
// owns the derived buffers (masked depth and binary mask) so they are
// allocated once and reused for the lifetime of the demo.
//
// Stages, in order:
// 1.  Copy the device's 8-bit depth image into the working buffer.
// 2.  Zero everything outside the ROI.
// 3.  Remap the millimeter thresholds against the device's clipping range.
// 4.  Binarize into the mask (skipped when thresholding is switched off).
// 5.  Extract blobs from the mask.

use crate::core_modules::blob_extractor::{Blob, ContourFinderConfig, blob_extractor};
use crate::core_modules::device::{DEPTH_HEIGHT, DEPTH_WIDTH};
use crate::core_modules::roi::mask_outside;
use crate::core_modules::session::SessionState;
use crate::core_modules::threshold::{ClippingRange, DepthConvention, IntensityThresholds, MASK_OFF, binarize};
use crate::error::{DepthError, Result};
use image::GrayImage;
use tracing::{debug, warn};

/// Configuration for the DepthPipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub image_width: u32,
    pub image_height: u32,
    pub contour: ContourFinderConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            image_width: DEPTH_WIDTH,
            image_height: DEPTH_HEIGHT,
            contour: ContourFinderConfig::default(),
        }
    }
}

/// The summary of one processed frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameAnalysis {
    /// Nonzero pixels zeroed by the ROI masker.
    pub pixels_masked: usize,
    /// Pixels selected by the threshold band.
    pub pixels_selected: usize,
    pub blob_count: usize,
    /// `None` when the clipping range is degenerate.
    pub thresholds: Option<IntensityThresholds>,
}

pub struct DepthPipeline {
    config: PipelineConfig,
    masked_depth: GrayImage,
    mask: GrayImage,
    blobs: Vec<Blob>,
}

impl DepthPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            masked_depth: GrayImage::new(config.image_width, config.image_height),
            mask: GrayImage::new(config.image_width, config.image_height),
            blobs: Vec::new(),
            config,
        }
    }

    /// Runs every stage on a new depth frame.
    pub fn process(
        &mut self,
        depth: &GrayImage,
        session: &mut SessionState,
        clipping: ClippingRange,
        convention: DepthConvention,
    ) -> Result<FrameAnalysis> {
        // Stage 1: Copy
        if depth.dimensions() != self.masked_depth.dimensions() {
            return Err(DepthError::SizeMismatch {
                expected: self.masked_depth.len(),
                actual: depth.len(),
            });
        }
        self.masked_depth.copy_from_slice(depth.as_raw());

        // Stage 2: ROI Mask
        let pixels_masked = mask_outside(&mut self.masked_depth, &session.roi);

        // Stage 3: Threshold Remap
        let thresholds = match session.refresh_intensity(clipping, convention) {
            Ok(thresholds) => Some(thresholds),
            Err(e) => {
                warn!(error = %e, "Cannot remap thresholds, the mask stays empty");
                None
            }
        };

        // Stage 4: Binarize
        let pixels_selected = match thresholds {
            Some(thresholds) if session.threshold_enabled => {
                binarize(&self.masked_depth, &thresholds, &mut self.mask)?
            }
            _ => {
                self.mask.fill(MASK_OFF);
                0
            }
        };

        // Stage 5: Blob Extraction
        self.blobs = if pixels_selected == 0 {
            Vec::new()
        } else {
            blob_extractor::find_blobs(&self.mask, &self.config.contour)
        };

        debug!(
            pixels_masked,
            pixels_selected,
            blobs = self.blobs.len(),
            "Depth frame processed"
        );

        Ok(FrameAnalysis {
            pixels_masked,
            pixels_selected,
            blob_count: self.blobs.len(),
            thresholds,
        })
    }

    pub fn masked_depth(&self) -> &GrayImage {
        &self.masked_depth
    }

    pub fn mask(&self) -> &GrayImage {
        &self.mask
    }

    pub fn blobs(&self) -> &[Blob] {
        &self.blobs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::device::{DepthDevice, depth_lookup_table};
    use crate::core_modules::roi::RoiRect;
    use crate::core_modules::synthetic::{SceneConfig, SyntheticKinect};
    use image::Luma;

    fn depth_from_mm(width: u32, height: u32, mm: impl Fn(u32, u32) -> u16) -> GrayImage {
        let table = depth_lookup_table(ClippingRange::DEFAULT, true);
        GrayImage::from_fn(width, height, |x, y| Luma([table[mm(x, y) as usize]]))
    }

    fn small_pipeline() -> DepthPipeline {
        DepthPipeline::new(PipelineConfig {
            image_width: 40,
            image_height: 30,
            ..PipelineConfig::default()
        })
    }

    #[test]
    fn a_near_square_becomes_one_blob() {
        let depth = depth_from_mm(40, 30, |x, y| {
            if (10..20).contains(&x) && (10..20).contains(&y) { 1000 } else { 3000 }
        });
        let mut pipeline = small_pipeline();
        let mut session = SessionState::default();
        session.roi = RoiRect::new(0.0, 0.0, 40.0, 30.0);

        let analysis = pipeline
            .process(&depth, &mut session, ClippingRange::DEFAULT, DepthConvention::NearWhite)
            .unwrap();
        assert_eq!(analysis.pixels_selected, 100);
        assert_eq!(analysis.blob_count, 1);
        assert_eq!(pipeline.blobs()[0].bounding_box.min_x, 10);
        assert_eq!(pipeline.mask().get_pixel(15, 15).0[0], 255);
        assert_eq!(pipeline.mask().get_pixel(25, 15).0[0], 0);
        assert!(session.intensity.is_some());
    }

    #[test]
    fn the_roi_cuts_objects_off() {
        let depth = depth_from_mm(40, 30, |x, _| if x < 20 { 1000 } else { 3000 });
        let mut pipeline = small_pipeline();
        let mut session = SessionState::default();
        session.roi = RoiRect::new(9.0, 4.0, 20.0, 20.0);

        let analysis = pipeline
            .process(&depth, &mut session, ClippingRange::DEFAULT, DepthConvention::NearWhite)
            .unwrap();
        // x in 10..=19, y in 5..=23
        assert_eq!(analysis.pixels_selected, 10 * 19);
        assert_eq!(pipeline.masked_depth().get_pixel(5, 5).0[0], 0);
        assert_eq!(analysis.blob_count, 1);
    }

    #[test]
    fn thresholding_can_be_switched_off() {
        let depth = depth_from_mm(40, 30, |_, _| 1000);
        let mut pipeline = small_pipeline();
        let mut session = SessionState::default();
        session.threshold_enabled = false;

        let analysis = pipeline
            .process(&depth, &mut session, ClippingRange::DEFAULT, DepthConvention::NearWhite)
            .unwrap();
        assert_eq!(analysis.pixels_selected, 0);
        assert!(pipeline.blobs().is_empty());
        assert!(pipeline.mask().pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn degenerate_clipping_empties_the_mask() {
        let depth = depth_from_mm(40, 30, |_, _| 1000);
        let mut pipeline = small_pipeline();
        let mut session = SessionState::default();
        session.roi = RoiRect::new(0.0, 0.0, 40.0, 30.0);
        pipeline
            .process(&depth, &mut session, ClippingRange::DEFAULT, DepthConvention::NearWhite)
            .unwrap();
        assert_eq!(pipeline.blobs().len(), 1);

        let analysis = pipeline
            .process(&depth, &mut session, ClippingRange::new(800.0, 800.0), DepthConvention::NearWhite)
            .unwrap();
        assert_eq!(analysis.thresholds, None);
        assert_eq!(analysis.blob_count, 0);
        assert!(pipeline.mask().pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn wrong_frame_size_is_rejected() {
        let mut pipeline = small_pipeline();
        let mut session = SessionState::default();
        let result = pipeline.process(
            &GrayImage::new(8, 8),
            &mut session,
            ClippingRange::DEFAULT,
            DepthConvention::NearWhite,
        );
        assert!(matches!(result, Err(DepthError::SizeMismatch { .. })));
    }

    #[test]
    fn near_black_devices_select_the_same_band() {
        let mut kinect = SyntheticKinect::inline("k", SceneConfig::default());
        kinect.open().unwrap();
        kinect.update();
        let mut pipeline = DepthPipeline::new(PipelineConfig::default());
        let mut session = SessionState::default();
        let white = pipeline
            .process(kinect.depth_pixels(), &mut session, kinect.clipping_range(), DepthConvention::NearWhite)
            .unwrap();

        let mut kinect = SyntheticKinect::inline("k", SceneConfig::default());
        kinect.enable_depth_near_value_white(false);
        kinect.open().unwrap();
        kinect.update();
        let black = pipeline
            .process(kinect.depth_pixels(), &mut session, kinect.clipping_range(), DepthConvention::NearBlack)
            .unwrap();

        assert!(white.pixels_selected > 0);
        assert_eq!(white.blob_count, black.blob_count);
        let diff = white.pixels_selected.abs_diff(black.pixels_selected);
        assert!(diff * 100 <= white.pixels_selected, "{white:?} vs {black:?}");
    }
}
