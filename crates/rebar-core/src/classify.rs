//! Diameter → size category lookup.
//!
//! Categories are half-open `[min, max)` diameter intervals in millimetres.
//! A [`SizeRanges`] set is validated once at construction so lookups can stay
//! infallible: intervals are non-empty, finite and pairwise disjoint, and they
//! are stored in ascending order of their lower bound.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Category reported when no configured interval contains the diameter.
pub const UNCLASSIFIED: &str = "unclassified";

/// Concrete mix proportions attached to a category. Informational only.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MixRatio {
    pub cement: f64,
    pub sand: f64,
    pub aggregate: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SizeRange {
    pub name: String,
    pub diameter_min: f64,
    pub diameter_max: f64,
    pub mix: MixRatio,
}

impl SizeRange {
    pub fn new(name: impl Into<String>, diameter_min: f64, diameter_max: f64, mix: MixRatio) -> Self {
        Self {
            name: name.into(),
            diameter_min,
            diameter_max,
            mix,
        }
    }

    pub fn contains(&self, diameter_mm: f64) -> bool {
        self.diameter_min <= diameter_mm && diameter_mm < self.diameter_max
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum RangeError {
    #[error("size range {name:?} has non-finite bounds")]
    NonFinite { name: String },
    #[error("size range {name:?} is empty: min {min} must be below max {max}")]
    Empty { name: String, min: f64, max: f64 },
    #[error("size ranges {first:?} and {second:?} overlap")]
    Overlap { first: String, second: String },
    #[error("size range name {0:?} is reserved")]
    ReservedName(String),
    #[error("duplicate size range name {0:?}")]
    Duplicate(String),
}

/// Validated, ordered set of size categories.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SizeRanges {
    ranges: Vec<SizeRange>,
}

impl SizeRanges {
    pub fn new(mut ranges: Vec<SizeRange>) -> Result<Self, RangeError> {
        for range in &ranges {
            if range.name == UNCLASSIFIED {
                return Err(RangeError::ReservedName(range.name.clone()));
            }
            if !range.diameter_min.is_finite() || !range.diameter_max.is_finite() {
                return Err(RangeError::NonFinite {
                    name: range.name.clone(),
                });
            }
            if range.diameter_min >= range.diameter_max {
                return Err(RangeError::Empty {
                    name: range.name.clone(),
                    min: range.diameter_min,
                    max: range.diameter_max,
                });
            }
        }

        ranges.sort_by(|a, b| a.diameter_min.total_cmp(&b.diameter_min));
        for (idx, range) in ranges.iter().enumerate() {
            if ranges[..idx].iter().any(|other| other.name == range.name) {
                return Err(RangeError::Duplicate(range.name.clone()));
            }
        }
        for pair in ranges.windows(2) {
            if pair[0].diameter_max > pair[1].diameter_min {
                return Err(RangeError::Overlap {
                    first: pair[0].name.clone(),
                    second: pair[1].name.clone(),
                });
            }
        }
        Ok(Self { ranges })
    }

    pub fn iter(&self) -> impl Iterator<Item = &SizeRange> {
        self.ranges.iter()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&SizeRange> {
        self.ranges.iter().find(|range| range.name == name)
    }

    /// Return the first category whose interval contains `diameter_mm`, or
    /// [`UNCLASSIFIED`].
    pub fn classify(&self, diameter_mm: f64) -> &str {
        classify(diameter_mm, self)
    }
}

/// Free-function form of [`SizeRanges::classify`].
pub fn classify(diameter_mm: f64, ranges: &SizeRanges) -> &str {
    ranges
        .iter()
        .find(|range| range.contains(diameter_mm))
        .map(|range| range.name.as_str())
        .unwrap_or(UNCLASSIFIED)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mix() -> MixRatio {
        MixRatio {
            cement: 1.0,
            sand: 2.0,
            aggregate: 3.0,
        }
    }

    fn standard() -> SizeRanges {
        SizeRanges::new(vec![
            SizeRange::new("large", 20.0, 50.0, mix()),
            SizeRange::new("small", 6.0, 12.0, mix()),
            SizeRange::new("medium", 12.0, 20.0, mix()),
        ])
        .unwrap()
    }

    #[test]
    fn ranges_are_ordered_by_lower_bound() {
        let names: Vec<_> = standard().iter().map(|r| r.name.clone()).collect();
        assert_eq!(names, ["small", "medium", "large"]);
    }

    #[test]
    fn bounds_are_half_open() {
        let ranges = standard();
        assert_eq!(ranges.classify(6.0), "small");
        assert_eq!(ranges.classify(11.999), "small");
        assert_eq!(ranges.classify(12.0), "medium");
        assert_eq!(ranges.classify(20.0), "large");
        assert_eq!(ranges.classify(49.99), "large");
    }

    #[test]
    fn no_match_yields_unclassified() {
        let ranges = standard();
        assert_eq!(ranges.classify(0.0), UNCLASSIFIED);
        assert_eq!(ranges.classify(5.99), UNCLASSIFIED);
        assert_eq!(ranges.classify(50.0), UNCLASSIFIED);
        assert_eq!(ranges.classify(f64::NAN), UNCLASSIFIED);
    }

    #[test]
    fn overlapping_ranges_are_rejected() {
        let err = SizeRanges::new(vec![
            SizeRange::new("a", 0.0, 10.0, mix()),
            SizeRange::new("b", 9.0, 20.0, mix()),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            RangeError::Overlap {
                first: "a".into(),
                second: "b".into()
            }
        );
    }

    #[test]
    fn touching_ranges_are_accepted() {
        let ranges = SizeRanges::new(vec![
            SizeRange::new("a", 0.0, 10.0, mix()),
            SizeRange::new("b", 10.0, 20.0, mix()),
        ])
        .unwrap();
        assert_eq!(ranges.len(), 2);
    }

    #[test]
    fn malformed_ranges_are_rejected() {
        assert!(matches!(
            SizeRanges::new(vec![SizeRange::new("a", 5.0, 5.0, mix())]),
            Err(RangeError::Empty { .. })
        ));
        assert!(matches!(
            SizeRanges::new(vec![SizeRange::new("a", 0.0, f64::INFINITY, mix())]),
            Err(RangeError::NonFinite { .. })
        ));
        assert!(matches!(
            SizeRanges::new(vec![SizeRange::new(UNCLASSIFIED, 0.0, 1.0, mix())]),
            Err(RangeError::ReservedName(_))
        ));
        assert!(matches!(
            SizeRanges::new(vec![
                SizeRange::new("a", 0.0, 1.0, mix()),
                SizeRange::new("a", 2.0, 3.0, mix()),
            ]),
            Err(RangeError::Duplicate(_))
        ));
    }

    #[test]
    fn empty_set_classifies_everything_as_unclassified() {
        let ranges = SizeRanges::new(Vec::new()).unwrap();
        assert!(ranges.is_empty());
        assert_eq!(classify(10.0, &ranges), UNCLASSIFIED);
    }

    #[test]
    fn at_most_one_range_matches_any_diameter() {
        let ranges = standard();
        for step in 0..=600 {
            let diameter = step as f64 * 0.1;
            let hits = ranges.iter().filter(|r| r.contains(diameter)).count();
            assert!(hits <= 1, "diameter {diameter} matched {hits} ranges");
            let expected = if hits == 0 {
                UNCLASSIFIED
            } else {
                ranges.iter().find(|r| r.contains(diameter)).unwrap().name.as_str()
            };
            assert_eq!(ranges.classify(diameter), expected);
            assert_eq!(ranges.classify(diameter), ranges.classify(diameter));
        }
    }
}
