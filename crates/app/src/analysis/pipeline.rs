//! One-shot analysis of a captured frame: detect, measure, annotate, encode.
//!
//! A run never touches shared result state. It works from the settings
//! snapshot taken when it starts and hands back a finished
//! [`AnalysisResult`], so a failed run leaves nothing half-published.

use std::{sync::Arc, time::Instant};

use camera_ingest::Frame;
use chrono::{DateTime, Local};
use rebar_core::{
    ImageView, SegmentDetector, VolumeEstimator, measure_segments, total_volume,
    validate_detections,
};
use tracing::{debug, info_span};

use crate::analysis::{
    annotation::annotate_segments,
    config::SettingsStore,
    data::{AnalysisResult, format_timestamp},
    encoding::{encode_jpeg, frame_to_rgb},
    error::AnalysisError,
};

pub(crate) struct AnalysisPipeline {
    detector: Arc<dyn SegmentDetector>,
    settings: Arc<SettingsStore>,
    jpeg_quality: u8,
}

impl AnalysisPipeline {
    pub(crate) fn new(
        detector: Arc<dyn SegmentDetector>,
        settings: Arc<SettingsStore>,
        jpeg_quality: u8,
    ) -> Self {
        Self {
            detector,
            settings,
            jpeg_quality,
        }
    }

    pub(crate) fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    pub(crate) fn run(&self, frame: &Frame) -> Result<AnalysisResult, AnalysisError> {
        self.run_at(frame, Local::now())
    }

    /// Analyse `frame`, stamping the result with `at`.
    pub(crate) fn run_at(
        &self,
        frame: &Frame,
        at: DateTime<Local>,
    ) -> Result<AnalysisResult, AnalysisError> {
        check_frame(frame)?;
        let width = frame.width as u32;
        let height = frame.height as u32;
        let settings = self.settings.snapshot();

        let detect_start = Instant::now();
        let detections = info_span!("analysis.detect", detector = self.detector.name())
            .in_scope(|| {
                self.detector.detect(
                    ImageView {
                        width,
                        height,
                        data: &frame.data,
                    },
                    settings.raw.detection_threshold,
                )
            })
            .map_err(AnalysisError::Detection)?;
        validate_detections(&detections, width, height)?;
        metrics::histogram!("rebar_stage_latency_seconds", "stage" => "detect")
            .record(detect_start.elapsed().as_secs_f64());

        let estimator = VolumeEstimator::new(settings.raw.scale, &settings.ranges);
        let segments = measure_segments(&estimator, &detections);
        let total_volume_cc = total_volume(&segments);
        debug!(
            "Measured {} segments, total volume {:.2} cc",
            segments.len(),
            total_volume_cc
        );

        let annotate_start = Instant::now();
        let annotated = info_span!("analysis.annotate", segments = segments.len()).in_scope(
            || -> Result<_, AnalysisError> {
                let mut rgb = frame_to_rgb(frame).map_err(AnalysisError::Render)?;
                annotate_segments(&mut rgb, &segments);
                Ok(rgb)
            },
        )?;
        metrics::histogram!("rebar_stage_latency_seconds", "stage" => "annotate")
            .record(annotate_start.elapsed().as_secs_f64());

        let encode_start = Instant::now();
        let jpeg = info_span!("analysis.encode", quality = self.jpeg_quality)
            .in_scope(|| encode_jpeg(&annotated, self.jpeg_quality))
            .map_err(AnalysisError::Render)?;
        metrics::histogram!("rebar_stage_latency_seconds", "stage" => "encode")
            .record(encode_start.elapsed().as_secs_f64());

        metrics::gauge!("rebar_segments_detected").set(segments.len() as f64);
        metrics::gauge!("rebar_total_volume_cc").set(total_volume_cc);

        Ok(AnalysisResult {
            timestamp: format_timestamp(&at),
            segments,
            total_volume_cc,
            annotated_jpeg: Some(jpeg),
            frame_size: (frame.width, frame.height),
            detector: self.detector.name().to_string(),
        })
    }
}

fn check_frame(frame: &Frame) -> Result<(), AnalysisError> {
    if frame.width <= 0 || frame.height <= 0 {
        return Err(AnalysisError::InvalidFrame {
            reason: format!("non-positive size {}x{}", frame.width, frame.height),
        });
    }
    if !frame.is_well_formed() {
        return Err(AnalysisError::InvalidFrame {
            reason: format!(
                "buffer holds {} bytes, expected {}",
                frame.data.len(),
                frame.expected_len()
            ),
        });
    }
    Ok(())
}
