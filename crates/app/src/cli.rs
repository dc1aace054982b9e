use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::analysis::{self, AnalyzeArgs, PipelineConfig, ServeArgs, ServiceConfig};

#[derive(Parser)]
#[command(name = "rebarvista")]
#[command(about = "Capture rebar cross-sections and estimate their concrete volume")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API with an attached camera.
    Serve(ServeArgs),
    /// Analyse a single image file and write its artifacts.
    Analyze(AnalyzeArgs),
}

pub fn handle_command(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Serve(args) => analysis::serve(ServiceConfig::try_from(args)?),
        Command::Analyze(args) => {
            let image = args.image;
            analysis::analyze(PipelineConfig::try_from(args.pipeline)?, &image)
        }
    }
}
