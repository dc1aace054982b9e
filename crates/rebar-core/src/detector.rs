use std::sync::Mutex;

use anyhow::Result;
use rand::{Rng, SeedableRng, rngs::StdRng};
use thiserror::Error;

use crate::types::{BoundingBox, Detection};

/// Borrowed view of a packed 3-channel frame.
#[derive(Clone, Copy, Debug)]
pub struct ImageView<'a> {
    pub width: u32,
    pub height: u32,
    pub data: &'a [u8],
}

/// Capability that locates rebar cross-sections in a frame.
///
/// Implementations must return boxes that are non-degenerate, lie fully inside
/// the frame and do not overlap each other, with confidences in `[0, 1]`.
/// Detections scoring below `min_confidence` are dropped by the detector.
pub trait SegmentDetector: Send + Sync {
    fn detect(&self, image: ImageView<'_>, min_confidence: f32) -> Result<Vec<Detection>>;

    fn name(&self) -> &str;
}

#[derive(Debug, Error, PartialEq)]
pub enum ContractViolation {
    #[error("detection #{index} box {bbox:?} lies outside the {width}x{height} frame")]
    OutOfBounds {
        index: usize,
        bbox: [u32; 4],
        width: u32,
        height: u32,
    },
    #[error("detection #{index} confidence {confidence} is outside [0, 1]")]
    Confidence { index: usize, confidence: f32 },
    #[error("detections #{first} and #{second} overlap")]
    Overlap { first: usize, second: usize },
}

/// Check detector output against the [`SegmentDetector`] contract.
pub fn validate_detections(
    detections: &[Detection],
    width: u32,
    height: u32,
) -> Result<(), ContractViolation> {
    for (index, detection) in detections.iter().enumerate() {
        if !detection.bbox.fits_within(width, height) {
            return Err(ContractViolation::OutOfBounds {
                index,
                bbox: detection.bbox.as_array(),
                width,
                height,
            });
        }
        if !(0.0..=1.0).contains(&detection.confidence) {
            return Err(ContractViolation::Confidence {
                index,
                confidence: detection.confidence,
            });
        }
        if let Some(first) = detections[..index]
            .iter()
            .position(|other| other.bbox.overlaps(&detection.bbox))
        {
            return Err(ContractViolation::Overlap {
                first,
                second: index,
            });
        }
    }
    Ok(())
}

/// Reference detector producing random, non-overlapping boxes.
///
/// The frame is split into as many vertical strips as there are boxes and each
/// box is placed inside its own strip, keeping a margin from the frame border.
pub struct SyntheticDetector {
    rng: Mutex<StdRng>,
    min_boxes: usize,
    max_boxes: usize,
    margin: u32,
}

impl SyntheticDetector {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            min_boxes: 2,
            max_boxes: 3,
            margin: 10,
        }
    }

    pub fn from_entropy() -> Self {
        Self::new(rand::thread_rng().r#gen())
    }

    /// Override how many boxes are generated per frame (inclusive bounds).
    pub fn with_box_count(mut self, min_boxes: usize, max_boxes: usize) -> Self {
        self.min_boxes = min_boxes.min(max_boxes);
        self.max_boxes = max_boxes.max(min_boxes);
        self
    }

    fn place_box(
        rng: &mut StdRng,
        strip_x: (u32, u32),
        height: u32,
        margin: u32,
    ) -> Option<BoundingBox> {
        let (left, right) = strip_x;
        let x_mid = left + (right - left) / 2;
        let y_lo = margin;
        let y_mid = height / 2;
        let y_hi = height.saturating_sub(margin);
        if left >= x_mid || x_mid >= right || y_lo >= y_mid || y_mid >= y_hi {
            return None;
        }
        let x1 = rng.gen_range(left..x_mid);
        let x2 = rng.gen_range(x_mid..right);
        let y1 = rng.gen_range(y_lo..y_mid);
        let y2 = rng.gen_range(y_mid..y_hi);
        BoundingBox::new(x1, y1, x2, y2)
    }
}

impl SegmentDetector for SyntheticDetector {
    fn detect(&self, image: ImageView<'_>, min_confidence: f32) -> Result<Vec<Detection>> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| anyhow::anyhow!("synthetic detector rng poisoned"))?;
        let count = rng.gen_range(self.min_boxes..=self.max_boxes);
        if count == 0 {
            return Ok(Vec::new());
        }

        let usable = image.width.saturating_sub(2 * self.margin);
        let strip = usable / count as u32;
        let mut detections = Vec::with_capacity(count);
        for idx in 0..count as u32 {
            let left = self.margin + idx * strip;
            let right = left + strip;
            let Some(bbox) = Self::place_box(&mut rng, (left, right), image.height, self.margin)
            else {
                continue;
            };
            let confidence = 0.7 + rng.r#gen::<f32>() * 0.3;
            if confidence < min_confidence {
                continue;
            }
            detections.push(Detection { bbox, confidence });
        }
        tracing::debug!(
            boxes = detections.len(),
            width = image.width,
            height = image.height,
            "synthetic detector output"
        );
        Ok(detections)
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(width: u32, height: u32, data: &[u8]) -> ImageView<'_> {
        ImageView {
            width,
            height,
            data,
        }
    }

    #[test]
    fn synthetic_boxes_satisfy_contract() {
        let data = vec![0u8; 300 * 400 * 3];
        let detector = SyntheticDetector::new(7);
        for _ in 0..200 {
            let detections = detector.detect(view(300, 400, &data), 0.0).unwrap();
            assert!((2..=3).contains(&detections.len()));
            validate_detections(&detections, 300, 400).unwrap();
            for d in &detections {
                assert!(d.confidence >= 0.7 && d.confidence <= 1.0);
            }
        }
    }

    #[test]
    fn box_count_override_is_honoured() {
        let data = vec![0u8; 300 * 400 * 3];
        let none = SyntheticDetector::new(5).with_box_count(0, 0);
        assert!(none.detect(view(300, 400, &data), 0.0).unwrap().is_empty());

        let single = SyntheticDetector::new(5).with_box_count(1, 1);
        for _ in 0..50 {
            let detections = single.detect(view(300, 400, &data), 0.0).unwrap();
            assert_eq!(detections.len(), 1);
            validate_detections(&detections, 300, 400).unwrap();
        }

        // Reversed bounds are swapped rather than rejected.
        let swapped = SyntheticDetector::new(5).with_box_count(4, 1);
        for _ in 0..100 {
            let detections = swapped.detect(view(300, 400, &data), 0.0).unwrap();
            assert!((1..=4).contains(&detections.len()));
            validate_detections(&detections, 300, 400).unwrap();
        }
    }

    #[test]
    fn seeded_detectors_are_reproducible() {
        let data = vec![0u8; 300 * 400 * 3];
        let a = SyntheticDetector::new(42);
        let b = SyntheticDetector::new(42);
        for _ in 0..10 {
            assert_eq!(
                a.detect(view(300, 400, &data), 0.0).unwrap(),
                b.detect(view(300, 400, &data), 0.0).unwrap()
            );
        }
    }

    #[test]
    fn threshold_above_range_drops_everything() {
        let data = vec![0u8; 300 * 400 * 3];
        let detector = SyntheticDetector::new(1);
        assert!(detector.detect(view(300, 400, &data), 1.01).unwrap().is_empty());
    }

    #[test]
    fn tiny_frames_yield_no_boxes() {
        let data = vec![0u8; 12 * 12 * 3];
        let detector = SyntheticDetector::new(3);
        assert!(detector.detect(view(12, 12, &data), 0.0).unwrap().is_empty());
    }

    #[test]
    fn validation_reports_contract_violations() {
        let inside = Detection {
            bbox: BoundingBox::new(0, 0, 10, 10).unwrap(),
            confidence: 0.5,
        };
        let outside = Detection {
            bbox: BoundingBox::new(0, 0, 30, 10).unwrap(),
            confidence: 0.5,
        };
        let overlapping = Detection {
            bbox: BoundingBox::new(5, 5, 15, 15).unwrap(),
            confidence: 0.5,
        };
        let bad_score = Detection {
            bbox: BoundingBox::new(12, 0, 16, 4).unwrap(),
            confidence: 1.5,
        };

        assert!(validate_detections(&[inside], 20, 20).is_ok());
        assert!(matches!(
            validate_detections(&[outside], 20, 20),
            Err(ContractViolation::OutOfBounds { index: 0, .. })
        ));
        assert_eq!(
            validate_detections(&[inside, overlapping], 20, 20),
            Err(ContractViolation::Overlap {
                first: 0,
                second: 1
            })
        );
        assert!(matches!(
            validate_detections(&[inside, bad_score], 20, 20),
            Err(ContractViolation::Confidence { index: 1, .. })
        ));
    }
}
