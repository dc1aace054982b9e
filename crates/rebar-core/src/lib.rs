//! Measurement core for rebar cross-sections: the detector contract, size
//! classification and the box → volume reduction.

pub mod classify;
pub mod detector;
pub mod types;
pub mod volume;

pub use classify::{MixRatio, RangeError, SizeRange, SizeRanges, UNCLASSIFIED, classify};
pub use detector::{
    ContractViolation, ImageView, SegmentDetector, SyntheticDetector, validate_detections,
};
pub use types::{BoundingBox, Detection, Measurement, Segment};
pub use volume::{CONFIDENCE_PRECISION, DIMENSION_PRECISION, Scale, VolumeEstimator, round_to};

/// Measure, classify and number a batch of detections in detection order.
///
/// Section ids start at 1 and follow the input order.
pub fn measure_segments(estimator: &VolumeEstimator<'_>, detections: &[Detection]) -> Vec<Segment> {
    detections
        .iter()
        .zip(1u32..)
        .map(|(detection, section_id)| {
            estimator
                .estimate_detection(detection)
                .into_segment(section_id)
        })
        .collect()
}

/// Exact sum of segment volumes at full precision, accumulated in segment
/// order starting from `+0.0`.
pub fn total_volume(segments: &[Segment]) -> f64 {
    segments
        .iter()
        .fold(0.0, |total, segment| total + segment.volume_cc)
}
