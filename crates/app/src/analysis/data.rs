use chrono::{DateTime, Local};
use rebar_core::{CONFIDENCE_PRECISION, DIMENSION_PRECISION, Segment, round_to};
use serde::{Deserialize, Serialize};

/// Timestamp layout shared by results, artifact folders and the API.
pub(crate) const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

pub(crate) fn format_timestamp(at: &DateTime<Local>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// One completed pipeline run. Built once by the pipeline and shared
/// read-only afterwards.
#[derive(Clone, Debug)]
pub(crate) struct AnalysisResult {
    pub(crate) timestamp: String,
    pub(crate) segments: Vec<Segment>,
    pub(crate) total_volume_cc: f64,
    pub(crate) annotated_jpeg: Option<Vec<u8>>,
    pub(crate) frame_size: (i32, i32),
    pub(crate) detector: String,
}

impl AnalysisResult {
    pub(crate) fn image_available(&self) -> bool {
        self.annotated_jpeg.is_some()
    }

    pub(crate) fn summaries(&self) -> Vec<SegmentSummary> {
        self.segments.iter().map(SegmentSummary::from).collect()
    }
}

/// Transport form of a segment, rounded for display.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct SegmentSummary {
    pub(crate) section_id: u32,
    pub(crate) size_category: String,
    pub(crate) diameter_mm: f64,
    pub(crate) confidence: f64,
    pub(crate) width_cm: f64,
    pub(crate) length_cm: f64,
    pub(crate) height_cm: f64,
    pub(crate) volume_cc: f64,
}

impl From<&Segment> for SegmentSummary {
    fn from(segment: &Segment) -> Self {
        Self {
            section_id: segment.section_id,
            size_category: segment.size_category.clone(),
            diameter_mm: round_to(segment.diameter_mm, DIMENSION_PRECISION),
            confidence: round_to(f64::from(segment.confidence), CONFIDENCE_PRECISION),
            width_cm: round_to(segment.width_cm, DIMENSION_PRECISION),
            length_cm: round_to(segment.length_cm, DIMENSION_PRECISION),
            height_cm: round_to(segment.height_cm, DIMENSION_PRECISION),
            volume_cc: round_to(segment.volume_cc, DIMENSION_PRECISION),
        }
    }
}

/// Body of `GET /api/latest`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct LatestResponse {
    pub(crate) timestamp: Option<String>,
    pub(crate) segments: Vec<SegmentSummary>,
    pub(crate) total_volume: f64,
    pub(crate) image_available: bool,
}

impl LatestResponse {
    pub(crate) fn empty() -> Self {
        Self {
            timestamp: None,
            segments: Vec::new(),
            total_volume: 0.0,
            image_available: false,
        }
    }

    pub(crate) fn from_result(result: Option<&AnalysisResult>) -> Self {
        match result {
            Some(result) => Self {
                timestamp: Some(result.timestamp.clone()),
                segments: result.summaries(),
                total_volume: round_to(result.total_volume_cc, DIMENSION_PRECISION),
                image_available: result.image_available(),
            },
            None => Self::empty(),
        }
    }
}

#[derive(Serialize)]
pub(crate) struct ImageResponse {
    pub(crate) image: String,
}

#[derive(Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
}

#[derive(Serialize)]
pub(crate) struct StatusResponse {
    pub(crate) status: &'static str,
    pub(crate) camera_available: bool,
    pub(crate) has_results: bool,
    pub(crate) capturing: bool,
}

#[derive(Serialize)]
pub(crate) struct CaptureResponse {
    pub(crate) message: &'static str,
    pub(crate) timestamp: String,
    pub(crate) segments_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) artifacts: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) persist_error: Option<String>,
}

/// Segment entry written to `analysis_results.json`; carries the box so the
/// record can be re-rendered offline.
#[derive(Serialize)]
pub(crate) struct ArtifactSegment {
    #[serde(flatten)]
    pub(crate) summary: SegmentSummary,
    pub(crate) bbox: [u32; 4],
}

#[derive(Serialize)]
pub(crate) struct ArtifactRecord {
    pub(crate) timestamp: String,
    pub(crate) segments: Vec<ArtifactSegment>,
    pub(crate) total_volume: f64,
}

impl From<&AnalysisResult> for ArtifactRecord {
    fn from(result: &AnalysisResult) -> Self {
        Self {
            timestamp: result.timestamp.clone(),
            segments: result
                .segments
                .iter()
                .map(|segment| ArtifactSegment {
                    summary: SegmentSummary::from(segment),
                    bbox: segment.bbox.as_array(),
                })
                .collect(),
            total_volume: round_to(result.total_volume_cc, DIMENSION_PRECISION),
        }
    }
}
