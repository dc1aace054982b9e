//! Process-level wiring for the `serve` and `analyze` commands.

use std::{path::Path, sync::Arc, sync::mpsc};

use anyhow::{Context, Result};
use camera_ingest::open_camera;
use rebar_core::{SegmentDetector, SyntheticDetector};
use tracing::{info, info_span, warn};

use crate::analysis::{
    PipelineConfig, ServiceConfig,
    capture::{CameraHandle, CaptureOrchestrator},
    config::SettingsStore,
    data::SegmentSummary,
    encoding::load_frame,
    pipeline::AnalysisPipeline,
    server::spawn_api_server,
    state::ResultState,
    store::{ArtifactStore, DirectoryStore},
    telemetry,
};

/// Run the HTTP service until Ctrl+C.
pub fn serve(config: ServiceConfig) -> Result<()> {
    let _telemetry_guard = telemetry::init_tracing(&config.pipeline.telemetry);
    let _ = telemetry::init_metrics_recorder();
    let service_span = info_span!(
        "rebar.service",
        bind = %config.bind,
        port = config.port,
        camera = config.camera_kind.label(),
        device = %config.camera.uri,
        width = config.camera.still_size.0,
        height = config.camera.still_size.1
    );
    let _service_span_guard = service_span.enter();

    let settings = Arc::new(SettingsStore::load(&config.pipeline.settings_path));
    let pipeline = AnalysisPipeline::new(
        build_detector(config.pipeline.seed),
        settings.clone(),
        config.pipeline.jpeg_quality,
    );
    let store = DirectoryStore::new(
        config.pipeline.results_dir.clone(),
        config.pipeline.jpeg_quality,
    );

    let camera_kind = config.camera_kind;
    let camera_settings = config.camera.clone();
    let camera = CameraHandle::new(Box::new(move || open_camera(camera_kind, &camera_settings)));
    if settings.snapshot().raw.camera_enabled {
        if let Err(err) = camera.open_now() {
            warn!("Camera unavailable at startup ({err}); retrying on first capture");
        }
    } else {
        info!("Camera disabled in settings; it will be opened on first capture");
    }

    let orchestrator = Arc::new(CaptureOrchestrator::new(
        Arc::new(ResultState::new()),
        pipeline,
        Box::new(store),
        camera,
    ));
    let server = spawn_api_server(orchestrator, config.bind.clone(), config.port)
        .context("Failed to start API server")?;

    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })
    .context("Failed to install Ctrl+C handler")?;

    info!("Starting RebarVista API server; press Ctrl+C to stop");
    let _ = stop_rx.recv();
    info!("Shutting down API server");
    server.stop();
    Ok(())
}

/// Analyse one image file offline and write its artifacts.
pub fn analyze(config: PipelineConfig, image: &Path) -> Result<()> {
    let _telemetry_guard = telemetry::init_tracing(&config.telemetry);

    let frame = load_frame(image)?;
    let settings = Arc::new(SettingsStore::load(&config.settings_path));
    let pipeline = AnalysisPipeline::new(build_detector(config.seed), settings, config.jpeg_quality);
    let result = pipeline
        .run(&frame)
        .with_context(|| format!("Failed to analyse {}", image.display()))?;

    let store = DirectoryStore::new(config.results_dir.clone(), config.jpeg_quality);
    let written = store
        .persist(&frame, &result)
        .context("Failed to write analysis artifacts")?;

    println!(
        "Analysed {} ({}x{}) with {} detector",
        image.display(),
        result.frame_size.0,
        result.frame_size.1,
        result.detector
    );
    for SegmentSummary {
        section_id,
        size_category,
        diameter_mm,
        confidence,
        volume_cc,
        ..
    } in result.summaries()
    {
        println!(
            "  S{section_id:<3} {size_category:<13} diameter {diameter_mm:>7.2} mm  volume {volume_cc:>9.2} cc  confidence {confidence:.3}"
        );
    }
    println!(
        "Total volume: {:.2} cc ({} segments)",
        result.total_volume_cc,
        result.segments.len()
    );
    println!("Artifacts written to {}", written.display());
    Ok(())
}

fn build_detector(seed: Option<u64>) -> Arc<dyn SegmentDetector> {
    match seed {
        Some(seed) => {
            info!("Synthetic detector seeded with {seed}");
            Arc::new(SyntheticDetector::new(seed))
        }
        None => Arc::new(SyntheticDetector::from_entropy()),
    }
}
