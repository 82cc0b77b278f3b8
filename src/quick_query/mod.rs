//! Quick query: look up whatever text is selected when the hotkey fires
//!
//! The hotkey callback only signals the run loop; the capture itself
//! (copy shortcut, settle delay, clipboard read) happens on the async side.

mod system;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::hotkey::HotkeyService;

pub use system::{SystemClipboard, SystemCopy};

/// Permission re-checks after asking the user at startup
const PERMISSION_RECHECKS: u32 = 5;
const PERMISSION_RECHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Why a selection could not be captured
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The synthetic copy shortcut could not be sent
    #[error("copy shortcut failed: {0}")]
    Copy(String),

    /// The clipboard could not be opened or held no text
    #[error("clipboard unavailable: {0}")]
    Clipboard(String),
}

/// Synthesizes the OS copy shortcut so the selection lands on the clipboard
pub trait CopyShortcut: Send + Sync {
    fn press_copy(&self) -> Result<(), CaptureError>;
}

/// Source of the text to look up
pub trait ClipboardSource: Send + Sync {
    fn read_text(&self) -> Result<String, CaptureError>;
}

/// Receives captured queries
pub trait LookupSink: Send + Sync {
    fn lookup(&self, query: String);
}

/// Sink that only logs the query
#[derive(Debug, Default, Clone, Copy)]
pub struct LogLookup;

impl LookupSink for LogLookup {
    fn lookup(&self, query: String) {
        info!(%query, "quick query");
    }
}

/// Hotkey-driven lookup of the current selection
pub struct QuickQuery {
    service: Arc<HotkeyService>,
    copier: Arc<dyn CopyShortcut>,
    clipboard: Arc<dyn ClipboardSource>,
    sink: Arc<dyn LookupSink>,
    permission_wait: (u32, Duration),
}

impl QuickQuery {
    /// Quick query on explicit copy, clipboard and lookup seams
    pub fn new(
        service: Arc<HotkeyService>,
        copier: Arc<dyn CopyShortcut>,
        clipboard: Arc<dyn ClipboardSource>,
        sink: Arc<dyn LookupSink>,
    ) -> Self {
        Self {
            service,
            copier,
            clipboard,
            sink,
            permission_wait: (PERMISSION_RECHECKS, PERMISSION_RECHECK_INTERVAL),
        }
    }

    /// Quick query on the system copy shortcut and clipboard
    pub fn system(service: Arc<HotkeyService>, sink: Arc<dyn LookupSink>) -> Self {
        Self::new(service, Arc::new(SystemCopy), Arc::new(SystemClipboard), sink)
    }

    #[cfg(test)]
    pub fn with_permission_wait(mut self, attempts: u32, interval: Duration) -> Self {
        self.permission_wait = (attempts, interval);
        self
    }

    /// Register the configured hotkey, re-register on settings changes and
    /// serve triggers until the settings channel closes.
    pub async fn run(self, mut settings: watch::Receiver<Settings>) {
        let (trigger_tx, mut trigger_rx) = mpsc::channel::<()>(4);
        let mut current = settings.borrow_and_update().clone();

        self.register(&current, &trigger_tx);
        self.ensure_permission().await;

        loop {
            tokio::select! {
                Some(()) = trigger_rx.recv() => {
                    if let Some(query) = self.capture(&current).await {
                        self.sink.lookup(query);
                    }
                }
                changed = settings.changed() => {
                    if changed.is_err() {
                        debug!("settings channel closed");
                        break;
                    }
                    let next = settings.borrow_and_update().clone();
                    if next.quick_query_hotkey != current.quick_query_hotkey {
                        info!(
                            from = %current.quick_query_hotkey,
                            to = %next.quick_query_hotkey,
                            "quick query hotkey changed"
                        );
                        self.register(&next, &trigger_tx);
                    }
                    current = next;
                }
            }
        }
    }

    /// Replace every registration with the configured combo
    fn register(&self, settings: &Settings, triggers: &mpsc::Sender<()>) -> bool {
        self.service.unregister_all();

        let triggers = triggers.clone();
        let registered = self
            .service
            .register_hotkey(&settings.quick_query_hotkey, move || {
                if triggers.try_send(()).is_err() {
                    debug!("quick query already pending, trigger dropped");
                }
            });

        match registered {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    combo = %settings.quick_query_hotkey,
                    error = %e,
                    "quick query hotkey not registered"
                );
                false
            }
        }
    }

    async fn ensure_permission(&self) {
        if self.service.check_accessibility_permissions() {
            return;
        }
        if self.service.request_accessibility_permissions() {
            return;
        }
        let (attempts, interval) = self.permission_wait;
        self.service.wait_for_permission(attempts, interval).await;
    }

    /// Copy the selection and read it back, trimmed. `None` when there is
    /// nothing to look up.
    async fn capture(&self, settings: &Settings) -> Option<String> {
        if settings.simulate_copy {
            let copier = Arc::clone(&self.copier);
            match tokio::task::spawn_blocking(move || copier.press_copy()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "continuing with current clipboard"),
                Err(e) => warn!(?e, "copy shortcut task failed"),
            }
            tokio::time::sleep(settings.copy_settle()).await;
        }

        let clipboard = Arc::clone(&self.clipboard);
        let text = match tokio::task::spawn_blocking(move || clipboard.read_text()).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                debug!(error = %e, "nothing to look up");
                return None;
            }
            Err(e) => {
                warn!(?e, "clipboard task failed");
                return None;
            }
        };

        let query = text.trim();
        if query.is_empty() {
            debug!("clipboard text is empty");
            return None;
        }
        Some(query.to_string())
    }
}
