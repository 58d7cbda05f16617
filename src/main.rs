//! voice-input-daemon: background service for push-to-talk voice input
//!
//! The daemon provides:
//! - A session state machine (idle, listening, processing, error)
//! - Backend selection between browser, native, and simulated recognition
//! - IPC server for UI clients to start/stop sessions and receive results
//!
//! Out of scope: rendering, animation, and the speech models themselves.

mod backend;
mod config;
mod events;
mod ipc;
mod lifecycle;
mod session;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::backend::{AdapterFactory, ProcessEngine};
use crate::config::Config;
use crate::events::VoiceEvent;
use crate::ipc::Server;
use crate::lifecycle::ShutdownSignal;
use crate::session::SessionController;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "voice-input-daemon starting"
    );

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(
        socket_path = ?config.socket_path,
        platform = ?config.platform,
        enabled = config.enabled,
        "configuration loaded"
    );

    let shutdown = ShutdownSignal::new();

    // IPC server -> session controller
    let (command_tx, command_rx) = mpsc::channel(32);
    // Session controller -> subscribers
    let (event_tx, _event_rx) = broadcast::channel::<VoiceEvent>(64);

    let mut factory = AdapterFactory::new(config.platform);
    if let Some(line) = &config.native_command {
        match ProcessEngine::from_command_line(line) {
            Some(engine) => {
                info!(program = engine.program(), "native recognizer configured");
                factory = factory.with_native_engine(Arc::new(engine));
            }
            None => warn!("native recognizer command is empty"),
        }
    }

    let mut controller = SessionController::new(factory, config.enabled, event_tx.clone());
    let server = Server::new(&config.socket_path, command_tx, event_tx.clone())?;
    let mut log_rx = event_tx.subscribe();

    info!("daemon initialized, entering main loop");

    tokio::select! {
        _ = controller.run(command_rx) => {
            info!("session controller exited");
        }

        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        _ = async {
            loop {
                match log_rx.recv().await {
                    Ok(event) => info!(%event, "voice event"),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "voice event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        } => {
            info!("voice event logger exited");
        }

        result = shutdown.wait() => {
            match result {
                Ok(()) => info!("shutdown signal received"),
                Err(e) => error!(?e, "signal handling unavailable"),
            }
        }
    }

    info!("shutting down...");

    controller.stop();
    info!(state = %controller.state(), "session controller halted");
    server.shutdown().await;

    info!("voice-input-daemon stopped");

    Ok(())
}
