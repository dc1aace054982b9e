//! Still-capture rebar analysis service: takes a frame on demand, measures
//! the rebar cross-sections in it and serves the latest result over HTTP.
//!
//! The module is split into focused submodules:
//! - `config`: CLI flags and the hot-swappable runtime settings file.
//! - `capture`: Camera handle and the single-flight capture orchestrator.
//! - `pipeline`: Detect → measure → annotate → encode for one frame.
//! - `state`: The latest-result slot and the capture-in-progress flag.
//! - `store`: Artifact folders written after each capture.
//! - `server`: Actix Web API endpoints.
//! - `service`: Process wiring for the `serve` and `analyze` commands.
//! - `data`: Results and their transport shapes.
//! - `annotation`: Box and label drawing.
//! - `encoding`: Frame conversion and JPEG/base64 encoding.

/// Re-export configuration so callers can build runs without reaching into
/// submodules.
pub use config::{AnalyzeArgs, PipelineConfig, ServeArgs, ServiceConfig};
pub use service::{analyze, serve};

mod annotation;
mod capture;
mod config;
mod data;
mod encoding;
mod error;
mod pipeline;
mod server;
mod service;
mod state;
mod store;
mod telemetry;
