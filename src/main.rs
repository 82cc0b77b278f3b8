//! quickquery-daemon: Background daemon for system-wide quick-query hotkeys
//!
//! This daemon runs in the user session and provides:
//! - Global hotkey detection (CGEventTap on macOS, rdev elsewhere)
//! - Accessibility permission negotiation on macOS
//! - A supervised listener that restarts a dead keyboard hook
//! - Quick query: copy the current selection and look it up
//!
//! Settings are re-read on SIGHUP; SIGINT/SIGTERM shut down cleanly.

mod config;
mod events;
mod hotkey;
mod lifecycle;
mod permission;
mod quick_query;
mod state;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, Settings};
use crate::hotkey::HotkeyService;
use crate::lifecycle::{ReloadSignal, ShutdownSignal};
use crate::quick_query::{LogLookup, QuickQuery};

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
        "quickquery-daemon starting"
    );

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(data_dir = %config.data_dir.display(), "configuration loaded");

    // First run: leave an editable settings file behind
    if !config.settings_path.exists() {
        match Settings::default().save(&config.settings_path) {
            Ok(()) => info!(path = %config.settings_path.display(), "wrote default settings"),
            Err(e) => warn!(error = %e, "unable to write default settings"),
        }
    }

    let settings = config.load_settings();
    info!(hotkey = %settings.quick_query_hotkey, "settings loaded");

    let mut shutdown = ShutdownSignal::new().context("registering shutdown handlers")?;
    let mut reload = ReloadSignal::new().context("registering reload handler")?;

    let service = Arc::new(HotkeyService::new(config.restart_policy));
    let mut events = service.subscribe();

    // Settings -> quick query (re-registration on change)
    let (settings_tx, settings_rx) = watch::channel(settings);
    let quick_query = QuickQuery::system(Arc::clone(&service), Arc::new(LogLookup));

    info!("daemon initialized, entering main loop");

    tokio::select! {
        _ = quick_query.run(settings_rx) => {
            info!("quick query exited");
        }

        // Log service events
        _ = async {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        info!(%event, "service event");
                        if let Ok(payload) = serde_json::to_string(&event) {
                            debug!(
                                %payload,
                                held = %service.held_modifiers(),
                                "service event payload"
                            );
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "service event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        } => {
            info!("service event handler exited");
        }

        // Reload settings on request
        _ = async {
            loop {
                reload.recv().await;
                let settings = config.load_settings();
                info!(hotkey = %settings.quick_query_hotkey, "settings reloaded");
                settings_tx.send_replace(settings);
            }
        } => {}

        // Wait for shutdown signal
        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    info!(
        hotkeys = ?service.registered_hotkeys(),
        listener = %service.listener_state(),
        "shutting down..."
    );

    service.dispose();

    info!("quickquery-daemon stopped");

    Ok(())
}
