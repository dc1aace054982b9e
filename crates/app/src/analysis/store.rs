//! Artifact persistence for completed captures.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Instant,
};

use camera_ingest::Frame;
use tracing::{debug, info_span, warn};

use crate::analysis::{
    data::{AnalysisResult, ArtifactRecord},
    encoding::encode_frame_jpeg,
    error::PersistError,
};

pub(crate) const ORIGINAL_IMAGE: &str = "original_image.jpg";
pub(crate) const RESULT_IMAGE: &str = "result_image.jpg";
pub(crate) const RESULT_RECORD: &str = "analysis_results.json";

/// Destination for the artifacts of one capture.
pub(crate) trait ArtifactStore: Send + Sync {
    /// Write the raw frame and the analysis outputs, returning where they went.
    fn persist(&self, frame: &Frame, result: &AnalysisResult) -> Result<PathBuf, PersistError>;
}

/// Writes `analysis_<timestamp>/` folders under a results directory.
pub(crate) struct DirectoryStore {
    root: PathBuf,
    jpeg_quality: u8,
}

impl DirectoryStore {
    pub(crate) fn new(root: impl Into<PathBuf>, jpeg_quality: u8) -> Self {
        Self {
            root: root.into(),
            jpeg_quality,
        }
    }
}

impl ArtifactStore for DirectoryStore {
    fn persist(&self, frame: &Frame, result: &AnalysisResult) -> Result<PathBuf, PersistError> {
        let _span = info_span!("artifacts.persist", timestamp = %result.timestamp).entered();
        let start = Instant::now();

        let dir = self.root.join(format!("analysis_{}", result.timestamp));
        if dir.exists() {
            warn!("Overwriting existing artifacts in {}", dir.display());
        }
        fs::create_dir_all(&dir).map_err(|source| PersistError::Io {
            path: dir.clone(),
            source,
        })?;

        let original =
            encode_frame_jpeg(frame, self.jpeg_quality).map_err(|source| PersistError::Encode {
                what: "original frame",
                source,
            })?;
        write_file(&dir.join(ORIGINAL_IMAGE), &original)?;

        if let Some(annotated) = result.annotated_jpeg.as_deref() {
            write_file(&dir.join(RESULT_IMAGE), annotated)?;
        }

        let record = serde_json::to_vec_pretty(&ArtifactRecord::from(result))?;
        write_file(&dir.join(RESULT_RECORD), &record)?;

        metrics::histogram!("rebar_stage_latency_seconds", "stage" => "persist")
            .record(start.elapsed().as_secs_f64());
        debug!("Artifacts written to {}", dir.display());
        Ok(dir)
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), PersistError> {
    fs::write(path, bytes).map_err(|source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::pipeline::tests::{FixedDetector, detection, pipeline_with};

    #[test]
    fn writes_all_three_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path().join("results"), 80);
        let frame = Frame::blank(300, 400, 0);
        let pipeline = pipeline_with(FixedDetector(vec![detection(50, 100, 150, 250, 0.9)]));
        let result = pipeline.run(&frame).unwrap();

        let written = store.persist(&frame, &result).unwrap();
        assert_eq!(
            written,
            dir.path()
                .join("results")
                .join(format!("analysis_{}", result.timestamp))
        );
        for name in [ORIGINAL_IMAGE, RESULT_IMAGE, RESULT_RECORD] {
            assert!(written.join(name).is_file(), "{name} missing");
        }

        let record: serde_json::Value =
            serde_json::from_slice(&fs::read(written.join(RESULT_RECORD)).unwrap()).unwrap();
        assert_eq!(record["timestamp"], result.timestamp.as_str());
        assert_eq!(record["total_volume"], 1500.0);
        assert_eq!(record["segments"][0]["size_category"], "small");
        assert_eq!(record["segments"][0]["bbox"], serde_json::json!([50, 100, 150, 250]));
    }

    #[test]
    fn same_second_captures_share_a_folder() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path(), 80);
        let frame = Frame::blank(300, 400, 0);
        let pipeline = pipeline_with(FixedDetector(vec![detection(50, 100, 150, 250, 0.9)]));
        let first = pipeline.run(&frame).unwrap();
        let mut second = pipeline.run(&frame).unwrap();
        second.timestamp = first.timestamp.clone();
        second.total_volume_cc = 42.0;

        let a = store.persist(&frame, &first).unwrap();
        let b = store.persist(&frame, &second).unwrap();
        assert_eq!(a, b);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);

        let record: serde_json::Value =
            serde_json::from_slice(&fs::read(b.join(RESULT_RECORD)).unwrap()).unwrap();
        assert_eq!(record["total_volume"], 42.0);
    }

    #[test]
    fn unwritable_root_reports_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"file").unwrap();
        let store = DirectoryStore::new(blocker.clone(), 80);

        let frame = Frame::blank(10, 10, 0);
        let pipeline = pipeline_with(FixedDetector(Vec::new()));
        let result = pipeline.run(&frame).unwrap();
        assert!(matches!(
            store.persist(&frame, &result),
            Err(PersistError::Io { .. })
        ));
    }
}
