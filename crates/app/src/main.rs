mod cli;
mod html;
mod pipeline;
mod stills;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use cli::{Cli, Command};
use pipeline::alerts::{LogNotifier, Notifier, WebhookNotifier};
use pipeline::config::PipelineConfig;
use pipeline::data::PipelineState;
use pipeline::{control, server, telemetry};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    telemetry::init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => serve(PipelineConfig::try_from(args)?),
        Command::DetectImage(args) => stills::run(&args),
    }
}

fn serve(config: PipelineConfig) -> Result<()> {
    telemetry::init_metrics_recorder();

    let notifier: Box<dyn Notifier> = match &config.webhook_url {
        Some(url) => Box::new(WebhookNotifier::new(url.clone())?),
        None => Box::new(LogNotifier),
    };
    let detector = Box::new(detect_core::SyntheticDetector::new());
    let port = config.port;
    let autostart = config.autostart;
    let state = PipelineState::new(config, detector, notifier);

    let server = server::spawn_server(state.clone())?;
    info!("dashboard at http://127.0.0.1:{port}/ (feed: /api/video_feed)");

    if autostart {
        if let Err(err) = control::start_stream(&state) {
            warn!("autostart failed: {err:#}");
        }
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_shutdown = shutdown.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        handler_shutdown.store(true, Ordering::SeqCst);
    }) {
        warn!("failed to install Ctrl+C handler: {err}");
    }

    while !shutdown.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(200));
    }

    info!("shutting down");
    // The pump must release the source before the process exits.
    if let Err(err) = control::stop_stream(&state) {
        warn!("stop during shutdown failed: {err:#}");
    }
    server.stop();
    Ok(())
}
