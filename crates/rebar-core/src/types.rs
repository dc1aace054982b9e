use serde::{Deserialize, Serialize};

/// Axis-aligned pixel box with `x1 < x2` and `y1 < y2`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl BoundingBox {
    /// Build a box, returning `None` for degenerate corners.
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Option<Self> {
        (x1 < x2 && y1 < y2).then_some(Self { x1, y1, x2, y2 })
    }

    pub fn width_px(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height_px(&self) -> u32 {
        self.y2 - self.y1
    }

    /// True when the box lies fully inside a `width` x `height` frame.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x1 < self.x2 && self.y1 < self.y2 && self.x2 <= width && self.y2 <= height
    }

    /// True when the two boxes share interior area. Touching edges do not count.
    pub fn overlaps(&self, other: &BoundingBox) -> bool {
        self.x1 < other.x2 && other.x1 < self.x2 && self.y1 < other.y2 && other.y1 < self.y2
    }

    pub fn as_array(&self) -> [u32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

/// Raw detector output for one candidate segment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
}

/// Physical measurement of one box, before it is numbered.
#[derive(Clone, Debug, PartialEq)]
pub struct Measurement {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub diameter_mm: f64,
    pub size_category: String,
    pub width_cm: f64,
    pub length_cm: f64,
    pub height_cm: f64,
    pub volume_cc: f64,
}

impl Measurement {
    pub fn into_segment(self, section_id: u32) -> Segment {
        Segment {
            section_id,
            bbox: self.bbox,
            confidence: self.confidence,
            diameter_mm: self.diameter_mm,
            size_category: self.size_category,
            width_cm: self.width_cm,
            length_cm: self.length_cm,
            height_cm: self.height_cm,
            volume_cc: self.volume_cc,
        }
    }
}

/// A measured, classified and numbered rebar cross-section.
///
/// All scalars are kept at full precision; rounding is applied only when the
/// segment is rendered for transport.
#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    pub section_id: u32,
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub diameter_mm: f64,
    pub size_category: String,
    pub width_cm: f64,
    pub length_cm: f64,
    pub height_cm: f64,
    pub volume_cc: f64,
}

impl Segment {
    /// Annotation label drawn above the box.
    pub fn label(&self) -> String {
        format!("S{} ({})", self.section_id, self.size_category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degenerate_boxes_are_rejected() {
        assert!(BoundingBox::new(10, 10, 10, 20).is_none());
        assert!(BoundingBox::new(10, 20, 15, 5).is_none());
        let bbox = BoundingBox::new(50, 100, 150, 250).unwrap();
        assert_eq!((bbox.width_px(), bbox.height_px()), (100, 150));
    }

    #[test]
    fn bounds_and_overlap_checks() {
        let a = BoundingBox::new(0, 0, 10, 10).unwrap();
        let b = BoundingBox::new(10, 0, 20, 10).unwrap();
        let c = BoundingBox::new(5, 5, 15, 15).unwrap();
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(a.fits_within(10, 10));
        assert!(!b.fits_within(19, 10));
    }

    #[test]
    fn label_uses_section_and_category() {
        let segment = Segment {
            section_id: 3,
            bbox: BoundingBox::new(0, 0, 1, 1).unwrap(),
            confidence: 0.9,
            diameter_mm: 0.1,
            size_category: "medium".into(),
            width_cm: 0.1,
            length_cm: 0.1,
            height_cm: 0.1,
            volume_cc: 0.001,
        };
        assert_eq!(segment.label(), "S3 (medium)");
    }
}
