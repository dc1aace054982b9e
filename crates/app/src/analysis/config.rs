//! Service configuration.
//!
//! Two layers feed the service: CLI flags parsed once into a [`ServiceConfig`],
//! and the JSON runtime settings file (`api_config.json`) that can be read and
//! updated through the API while the service runs.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, RwLock},
    time::Duration,
};

use anyhow::{Context, Result, anyhow, bail};
use camera_ingest::{CameraKind, CameraSettings};
use clap::{Args, ValueEnum};
use rebar_core::{MixRatio, Scale, SizeRange, SizeRanges};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub(crate) const DEFAULT_SETTINGS_FILE: &str = "api_config.json";
pub(crate) const DEFAULT_RESULTS_DIR: &str = "analysis_results";

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum CameraChoice {
    /// Synthetic frames (and `test_image_<n>.jpg` files when present).
    Mock,
    /// OpenCV device capture; needs the `opencv` build feature.
    Device,
}

impl From<CameraChoice> for CameraKind {
    fn from(choice: CameraChoice) -> Self {
        match choice {
            CameraChoice::Mock => CameraKind::Mock,
            CameraChoice::Device => CameraKind::Device,
        }
    }
}

#[derive(Clone, Debug, Default)]
/// Optional telemetry knobs for tracing output.
pub struct TelemetryOptions {
    /// Write a Chrome trace JSON file capturing capture/analysis spans.
    pub chrome_trace_path: Option<PathBuf>,
}

/// Flags shared by every subcommand that runs the pipeline.
#[derive(Debug, Args)]
pub struct PipelineArgs {
    /// Runtime settings file (created on first update when missing).
    #[arg(long = "config", value_name = "PATH", default_value = DEFAULT_SETTINGS_FILE)]
    pub settings_path: PathBuf,
    /// Directory receiving one `analysis_<timestamp>` folder per capture.
    #[arg(long = "results-dir", value_name = "DIR", default_value = DEFAULT_RESULTS_DIR)]
    pub results_dir: PathBuf,
    /// JPEG quality used for annotated and archived frames (1-100).
    #[arg(long = "jpeg-quality", value_name = "QUALITY", default_value_t = 85)]
    pub jpeg_quality: i32,
    /// Seed for the synthetic detector; random when omitted.
    #[arg(long = "seed", value_name = "N")]
    pub seed: Option<u64>,
    /// Emit Chrome trace JSON for post-mortem analysis.
    #[arg(long = "chrome-trace", value_name = "PATH")]
    pub chrome_trace: Option<PathBuf>,
}

/// CLI arguments accepted by the `serve` subcommand.
#[derive(Debug, Args)]
pub struct ServeArgs {
    #[command(flatten)]
    pub pipeline: PipelineArgs,
    /// Address the HTTP API binds to.
    #[arg(long = "bind", value_name = "ADDR", default_value = "0.0.0.0")]
    pub bind: String,
    /// Port the HTTP API listens on.
    #[arg(long = "port", value_name = "PORT", default_value_t = 5000)]
    pub port: u16,
    /// Camera backend.
    #[arg(long = "camera", value_enum, default_value_t = CameraChoice::Mock)]
    pub camera: CameraChoice,
    /// Camera device index, `/dev/videoN` path or stream URI.
    #[arg(long = "device", value_name = "URI", default_value = "/dev/video0")]
    pub device: String,
    /// Capture width in pixels.
    #[arg(long = "width", value_name = "PX", default_value_t = 300)]
    pub width: i32,
    /// Capture height in pixels.
    #[arg(long = "height", value_name = "PX", default_value_t = 400)]
    pub height: i32,
    /// Sensor settle time after a mode switch, in milliseconds.
    #[arg(long = "settle-ms", value_name = "MS", default_value_t = 500)]
    pub settle_ms: u64,
    /// Directory searched for mock `test_image_<n>.jpg` files.
    #[arg(long = "test-images", value_name = "DIR", default_value = ".")]
    pub test_images: PathBuf,
}

/// CLI arguments accepted by the `analyze` subcommand.
#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// Image file to analyse.
    #[arg(value_name = "IMAGE")]
    pub image: PathBuf,
    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

/// Settings every pipeline-running command needs.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub settings_path: PathBuf,
    pub results_dir: PathBuf,
    pub jpeg_quality: u8,
    pub seed: Option<u64>,
    pub telemetry: TelemetryOptions,
}

impl TryFrom<PipelineArgs> for PipelineConfig {
    type Error = anyhow::Error;

    fn try_from(args: PipelineArgs) -> Result<Self> {
        if !(1..=100).contains(&args.jpeg_quality) {
            bail!("--jpeg-quality must be an integer between 1 and 100");
        }
        Ok(Self {
            settings_path: args.settings_path,
            results_dir: args.results_dir,
            jpeg_quality: args.jpeg_quality as u8,
            seed: args.seed,
            telemetry: TelemetryOptions {
                chrome_trace_path: args.chrome_trace,
            },
        })
    }
}

#[derive(Clone, Debug)]
/// Canonical configuration for the API service.
pub struct ServiceConfig {
    pub pipeline: PipelineConfig,
    pub bind: String,
    pub port: u16,
    pub camera_kind: CameraKind,
    pub camera: CameraSettings,
}

impl TryFrom<ServeArgs> for ServiceConfig {
    type Error = anyhow::Error;

    fn try_from(args: ServeArgs) -> Result<Self> {
        if args.width <= 0 || args.height <= 0 {
            bail!("Capture width and height must be positive integers");
        }
        if args.bind.trim().is_empty() {
            bail!("--bind must not be empty");
        }
        let size = (args.width, args.height);
        Ok(Self {
            pipeline: PipelineConfig::try_from(args.pipeline)?,
            bind: args.bind,
            port: args.port,
            camera_kind: args.camera.into(),
            camera: CameraSettings {
                uri: args.device,
                preview_size: size,
                still_size: size,
                settle: Duration::from_millis(args.settle_ms),
                test_image_dir: args.test_images,
            },
        })
    }
}

/// One `cement_ratios` entry of the settings file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct CementRatio {
    pub(crate) cement: f64,
    pub(crate) sand: f64,
    pub(crate) aggregate: f64,
    /// `[min, max)` diameter in millimetres. Entries without a range are kept
    /// in the file but never match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) diameter_range: Option<[f64; 2]>,
}

impl CementRatio {
    fn new(cement: f64, sand: f64, aggregate: f64, range: [f64; 2]) -> Self {
        Self {
            cement,
            sand,
            aggregate,
            diameter_range: Some(range),
        }
    }
}

/// Contents of the runtime settings file. Missing keys take their defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct RuntimeSettings {
    pub(crate) camera_enabled: bool,
    pub(crate) detection_threshold: f32,
    pub(crate) cement_ratios: BTreeMap<String, CementRatio>,
    pub(crate) scale: Scale,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        let mut cement_ratios = BTreeMap::new();
        cement_ratios.insert("small".into(), CementRatio::new(1.0, 2.0, 3.0, [6.0, 12.0]));
        cement_ratios.insert("medium".into(), CementRatio::new(1.0, 2.0, 4.0, [12.0, 20.0]));
        cement_ratios.insert("large".into(), CementRatio::new(1.0, 3.0, 5.0, [20.0, 50.0]));
        Self {
            camera_enabled: true,
            detection_threshold: 0.7,
            cement_ratios,
            scale: Scale::default(),
        }
    }
}

impl RuntimeSettings {
    /// Validate the settings and build the size range table.
    pub(crate) fn size_ranges(&self) -> Result<SizeRanges> {
        let ranges = self
            .cement_ratios
            .iter()
            .filter_map(|(name, ratio)| {
                ratio.diameter_range.map(|[min, max]| {
                    SizeRange::new(
                        name.clone(),
                        min,
                        max,
                        MixRatio {
                            cement: ratio.cement,
                            sand: ratio.sand,
                            aggregate: ratio.aggregate,
                        },
                    )
                })
            })
            .collect();
        SizeRanges::new(ranges).context("invalid cement_ratios")
    }

    fn validate(&self) -> Result<SizeRanges> {
        if !(0.0..=1.0).contains(&self.detection_threshold) {
            bail!(
                "detection_threshold must be within [0, 1], got {}",
                self.detection_threshold
            );
        }
        let scale_ok = |v: f64| v.is_finite() && v > 0.0;
        if !scale_ok(self.scale.mm_per_px) || !scale_ok(self.scale.cm_per_px) {
            bail!("scale factors must be positive and finite");
        }
        self.size_ranges()
    }

    /// Overlay the known top-level keys of `patch` onto these settings.
    /// Unknown keys are ignored.
    pub(crate) fn merged_with(&self, patch: &serde_json::Value) -> Result<Self> {
        let patch = patch
            .as_object()
            .ok_or_else(|| anyhow!("configuration update must be a JSON object"))?;
        let mut current = serde_json::to_value(self)?;
        let fields = current
            .as_object_mut()
            .ok_or_else(|| anyhow!("settings did not serialise to an object"))?;
        for (key, value) in patch {
            if fields.contains_key(key) {
                fields.insert(key.clone(), value.clone());
            }
        }
        serde_json::from_value(current).context("configuration update has invalid values")
    }
}

/// Settings plus the range table derived from them.
#[derive(Clone, Debug)]
pub(crate) struct ActiveSettings {
    pub(crate) raw: RuntimeSettings,
    pub(crate) ranges: SizeRanges,
}

impl ActiveSettings {
    pub(crate) fn new(raw: RuntimeSettings) -> Result<Self> {
        let ranges = raw.validate()?;
        Ok(Self { raw, ranges })
    }
}

/// Shared, hot-swappable runtime settings. Each pipeline run works from the
/// snapshot taken when it starts.
pub(crate) struct SettingsStore {
    path: Option<PathBuf>,
    current: RwLock<Arc<ActiveSettings>>,
    // Held across merge, save and install.
    update_lock: Mutex<()>,
}

impl SettingsStore {
    pub(crate) fn in_memory(settings: RuntimeSettings) -> Result<Self> {
        Ok(Self {
            path: None,
            current: RwLock::new(Arc::new(ActiveSettings::new(settings)?)),
            update_lock: Mutex::new(()),
        })
    }

    /// Load from `path`, falling back to defaults when the file is missing or
    /// unusable.
    pub(crate) fn load(path: &Path) -> Self {
        let settings = match read_settings(path) {
            Ok(Some(active)) => {
                info!("Configuration loaded from {}", path.display());
                active
            }
            Ok(None) => default_active(),
            Err(err) => {
                warn!("Error loading configuration from {}: {err:#}", path.display());
                default_active()
            }
        };
        Self {
            path: Some(path.to_path_buf()),
            current: RwLock::new(Arc::new(settings)),
            update_lock: Mutex::new(()),
        }
    }

    pub(crate) fn snapshot(&self) -> Arc<ActiveSettings> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Merge `patch`, validate, persist and install the result.
    pub(crate) fn update(&self, patch: &serde_json::Value) -> Result<Arc<ActiveSettings>> {
        let _guard = match self.update_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let merged = self.snapshot().raw.merged_with(patch)?;
        let active = Arc::new(ActiveSettings::new(merged)?);
        if let Some(path) = &self.path {
            save_settings(path, &active.raw)?;
        }
        match self.current.write() {
            Ok(mut guard) => *guard = active.clone(),
            Err(poisoned) => *poisoned.into_inner() = active.clone(),
        }
        Ok(active)
    }
}

fn default_active() -> ActiveSettings {
    let raw = RuntimeSettings::default();
    let ranges = raw.size_ranges().unwrap_or_default();
    ActiveSettings { raw, ranges }
}

fn read_settings(path: &Path) -> Result<Option<ActiveSettings>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let raw: RuntimeSettings = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    ActiveSettings::new(raw).map(Some)
}

pub(crate) fn save_settings(path: &Path, settings: &RuntimeSettings) -> Result<()> {
    let text = serde_json::to_string_pretty(settings)?;
    fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
    info!("Configuration saved to {}", path.display());
    Ok(())
}
