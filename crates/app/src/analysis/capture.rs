//! Capture sequencing: claim the slot, take a still, analyse, persist, publish.

use std::{
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

use camera_ingest::{CaptureError, Frame, StillCamera};
use tracing::{info, info_span, warn};

use crate::analysis::{
    data::AnalysisResult,
    error::{PersistError, TriggerError},
    pipeline::AnalysisPipeline,
    state::ResultState,
    store::ArtifactStore,
};

pub(crate) type CameraOpener =
    Box<dyn Fn() -> Result<Box<dyn StillCamera>, CaptureError> + Send + Sync>;

/// Lazily opened camera. The first acquisition opens it when startup did not.
pub(crate) struct CameraHandle {
    camera: Mutex<Option<Box<dyn StillCamera>>>,
    opened: AtomicBool,
    opener: CameraOpener,
}

impl CameraHandle {
    pub(crate) fn new(opener: CameraOpener) -> Self {
        Self {
            camera: Mutex::new(None),
            opened: AtomicBool::new(false),
            opener,
        }
    }

    /// Open the camera now instead of on first use.
    pub(crate) fn open_now(&self) -> Result<(), CaptureError> {
        let mut slot = self.lock();
        if slot.is_none() {
            *slot = Some((self.opener)()?);
            self.opened.store(true, Ordering::Release);
        }
        Ok(())
    }

    /// Whether a camera has been opened. Never blocks on a capture in flight.
    pub(crate) fn is_available(&self) -> bool {
        self.opened.load(Ordering::Acquire)
    }

    fn acquire(&self) -> Result<Frame, CaptureError> {
        let _span = info_span!("capture.acquire").entered();
        let start = Instant::now();
        let mut slot = self.lock();
        if slot.is_none() {
            info!("Camera not initialised; opening on demand");
            *slot = Some((self.opener)()?);
            self.opened.store(true, Ordering::Release);
        }
        let Some(camera) = slot.as_mut() else {
            return Err(CaptureError::Other(anyhow::anyhow!("camera slot empty after open")));
        };

        let frame = camera.acquire_still_frame();
        if let Err(err) = camera.resume_preview() {
            warn!("Failed to resume preview on {}: {err}", camera.describe());
        }
        metrics::histogram!("rebar_stage_latency_seconds", "stage" => "acquire")
            .record(start.elapsed().as_secs_f64());
        frame
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Box<dyn StillCamera>>> {
        match self.camera.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Successful trigger: the published result and what happened to its artifacts.
pub(crate) struct CaptureOutcome {
    pub(crate) result: Arc<AnalysisResult>,
    pub(crate) artifacts: Result<PathBuf, PersistError>,
}

pub(crate) struct CaptureOrchestrator {
    state: Arc<ResultState>,
    pipeline: AnalysisPipeline,
    store: Box<dyn ArtifactStore>,
    camera: CameraHandle,
}

impl CaptureOrchestrator {
    pub(crate) fn new(
        state: Arc<ResultState>,
        pipeline: AnalysisPipeline,
        store: Box<dyn ArtifactStore>,
        camera: CameraHandle,
    ) -> Self {
        Self {
            state,
            pipeline,
            store,
            camera,
        }
    }

    pub(crate) fn state(&self) -> &Arc<ResultState> {
        &self.state
    }

    pub(crate) fn pipeline(&self) -> &AnalysisPipeline {
        &self.pipeline
    }

    pub(crate) fn camera(&self) -> &CameraHandle {
        &self.camera
    }

    /// Run one capture cycle. A second call while one is in flight is refused
    /// immediately.
    pub(crate) fn trigger(&self) -> Result<CaptureOutcome, TriggerError> {
        let _span = info_span!("capture.trigger").entered();
        let outcome = self.capture_once();
        let label = match &outcome {
            Ok(_) => "success",
            Err(err) => err.kind(),
        };
        metrics::counter!("rebar_captures_total", "outcome" => label).increment(1);
        if let Err(err) = &outcome {
            warn!("Capture trigger failed: {err}");
        }
        outcome
    }

    fn capture_once(&self) -> Result<CaptureOutcome, TriggerError> {
        let Some(_ticket) = self.state.try_begin_capture() else {
            return Err(TriggerError::CaptureAlreadyInProgress);
        };

        let frame = self.camera.acquire().map_err(TriggerError::CaptureFailed)?;
        let result = self
            .pipeline
            .run(&frame)
            .map_err(TriggerError::AnalysisFailed)?;

        let artifacts = self.store.persist(&frame, &result);
        if let Err(err) = &artifacts {
            warn!("Keeping result {} despite persistence failure: {err}", result.timestamp);
        }

        let result = self.state.replace(result);
        info!(
            "Capture {} analysed: {} segments, total volume {:.2} cc",
            result.timestamp,
            result.segments.len(),
            result.total_volume_cc
        );
        Ok(CaptureOutcome { result, artifacts })
    }
}
