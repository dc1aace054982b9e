//! Box → physical dimensions reduction.
//!
//! A segment is modelled as a rectangular solid: its length follows the box
//! height, its width follows the box width and its depth is assumed equal to
//! the width (square cross-section).

use serde::{Deserialize, Serialize};

use crate::{
    classify::SizeRanges,
    types::{BoundingBox, Detection, Measurement},
};

/// Decimal places used for dimensions and volumes at the output boundary.
pub const DIMENSION_PRECISION: i32 = 2;
/// Decimal places used for confidences at the output boundary.
pub const CONFIDENCE_PRECISION: i32 = 3;

/// Fixed pixel-to-physical conversion factors.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scale {
    /// Millimetres per pixel, used for the diameter.
    pub mm_per_px: f64,
    /// Centimetres per pixel, used for width, length and height.
    pub cm_per_px: f64,
}

impl Default for Scale {
    fn default() -> Self {
        Self {
            mm_per_px: 0.1,
            cm_per_px: 0.1,
        }
    }
}

pub struct VolumeEstimator<'a> {
    scale: Scale,
    ranges: &'a SizeRanges,
}

impl<'a> VolumeEstimator<'a> {
    pub fn new(scale: Scale, ranges: &'a SizeRanges) -> Self {
        Self { scale, ranges }
    }

    /// Measure and classify one box.
    pub fn estimate(&self, bbox: &BoundingBox, confidence: f32) -> Measurement {
        let width_px = f64::from(bbox.width_px());
        let height_px = f64::from(bbox.height_px());

        let diameter_mm = width_px.min(height_px) * self.scale.mm_per_px;
        let length_cm = height_px * self.scale.cm_per_px;
        let width_cm = width_px * self.scale.cm_per_px;
        let height_cm = width_cm;
        let volume_cc = width_cm * length_cm * height_cm;

        Measurement {
            bbox: *bbox,
            confidence: confidence.clamp(0.0, 1.0),
            diameter_mm,
            size_category: self.ranges.classify(diameter_mm).to_string(),
            width_cm,
            length_cm,
            height_cm,
            volume_cc,
        }
    }

    pub fn estimate_detection(&self, detection: &Detection) -> Measurement {
        self.estimate(&detection.bbox, detection.confidence)
    }
}

/// Round `value` to `places` decimal places, half away from zero.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
