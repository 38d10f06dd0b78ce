//! voice-arbiterd: background daemon exposing the voice arbiter over IPC
//!
//! This daemon provides:
//! - The voice arbitration state machine
//! - Console-backed capture and logged narration for running without audio hardware
//! - An IPC server for UI control and event subscription
//! - Final transcripts forwarded to an HTTP backend, or echoed back

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use voice_arbiter::config::Config;
use voice_arbiter::ipc::Server;
use voice_arbiter::lifecycle::ShutdownSignal;
use voice_arbiter::ports::{CommandSink, ConsoleInput, EchoSink, HttpCommandSink, LoggingOutput};
use voice_arbiter::Arbiter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "voice-arbiterd starting");

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.socket_path, mode = %config.voice.mode, "configuration loaded");

    let mut shutdown = ShutdownSignal::new()?;

    let sink: Arc<dyn CommandSink> = match &config.sink.endpoint {
        Some(endpoint) => {
            let sink = HttpCommandSink::new(endpoint.as_str(), config.sink.timeout())
                .context("failed to build command sink client")?;
            info!(endpoint = sink.endpoint(), "forwarding transcripts");
            Arc::new(sink)
        }
        None => {
            info!("no command sink endpoint configured, echoing transcripts");
            Arc::new(EchoSink)
        }
    };

    let (arbiter, voice) = Arbiter::new(
        config.voice.clone(),
        ConsoleInput::new(config.capture.clone()),
        LoggingOutput::new(config.narration.clone()),
        sink,
    );

    let server = Server::new(&config.socket_path, voice.clone())?;
    let arbiter_task = tokio::spawn(arbiter.run());

    if let Err(e) = voice.init().await {
        warn!(error = %e, "speech capture unavailable");
    } else if config.auto_start {
        voice.start()?;
    }

    info!("daemon initialized, entering main loop");

    // Main event loop
    tokio::select! {
        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Log voice events as they happen
        _ = async {
            let mut events = voice.subscribe();
            while let Some(event) = events.recv().await {
                info!(%event, "voice event");
            }
        } => {
            warn!("voice event stream closed");
        }

        // Wait for shutdown signal
        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    server.shutdown().await;
    if voice.shutdown().is_ok() {
        if let Err(e) = arbiter_task.await {
            error!(?e, "voice arbiter task failed");
        }
    }

    info!("voice-arbiterd stopped");

    Ok(())
}
