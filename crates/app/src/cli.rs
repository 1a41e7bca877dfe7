//! Command-line interface for the watchpost binary.

use clap::{Parser, Subcommand};

use crate::pipeline::config::ServeArgs;
use crate::stills::DetectImageArgs;

#[derive(Parser)]
#[command(
    name = "watchpost",
    version,
    about = "Live object-detection monitoring pipeline"
)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the monitoring pipeline and dashboard server.
    Serve(ServeArgs),
    /// Detect objects in a single image and write an annotated copy.
    DetectImage(DetectImageArgs),
}
