//! Hotkey service: the public face of the hotkey subsystem
//!
//! Ties the registry, the global listener and the permission gate together.
//! Every registration and permission check nudges the listener so it starts
//! as soon as it is allowed to.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::dispatch::Dispatcher;
use super::hook::{platform_hook, KeyboardHook};
use super::keys::ModifierMask;
use super::listener::{GlobalListener, RestartPolicy};
use super::parser::ParseError;
use super::registry::{HotkeyCallback, HotkeyRegistry};
use crate::events::ServiceEvent;
use crate::permission::{platform_gate, PermissionGate};
use crate::state::ListenerState;

/// System-wide hotkeys: registry, global listener and permission gate
pub struct HotkeyService {
    registry: Arc<HotkeyRegistry>,
    listener: GlobalListener,
    gate: Arc<dyn PermissionGate>,
    events: broadcast::Sender<ServiceEvent>,
}

impl HotkeyService {
    /// Service on the platform hook and permission gate
    pub fn new(policy: RestartPolicy) -> Self {
        Self::with_parts(platform_hook(), platform_gate(), Dispatcher::new(), policy)
    }

    /// Service on an explicit hook, gate and dispatcher
    pub fn with_parts(
        hook: Arc<dyn KeyboardHook>,
        gate: Arc<dyn PermissionGate>,
        dispatcher: Dispatcher,
        policy: RestartPolicy,
    ) -> Self {
        let registry = Arc::new(HotkeyRegistry::new());
        let (events, _) = broadcast::channel(64);
        let listener = GlobalListener::new(
            Arc::clone(&registry),
            hook,
            Arc::clone(&gate),
            dispatcher,
            events.clone(),
            policy,
        );
        Self {
            registry,
            listener,
            gate,
            events,
        }
    }

    /// Bind `callback` to a combo such as `"Command+Shift+D"`.
    ///
    /// A malformed combo is logged and reported; nothing is registered.
    pub fn register_hotkey<F>(&self, combo: &str, callback: F) -> Result<(), ParseError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let callback: HotkeyCallback = Arc::new(callback);
        let spec = match self.registry.register(combo, callback) {
            Ok(spec) => spec,
            Err(e) => {
                warn!(combo, error = %e, "failed to parse hotkey");
                return Err(e);
            }
        };

        info!(
            combo = spec.combo(),
            trigger = %spec.trigger(),
            modifiers = %spec.required(),
            "registered hotkey"
        );
        debug!(combo = spec.combo(), keys = ?spec.modifier_keys(), "modifier keys for hotkey");
        let _ = self.events.send(ServiceEvent::HotkeyRegistered {
            combo: spec.combo().to_string(),
        });
        self.listener.ensure_running();
        Ok(())
    }

    /// Remove a combo; unknown or blank combos are ignored
    pub fn unregister_hotkey(&self, combo: &str) {
        if combo.trim().is_empty() {
            return;
        }
        if self.registry.unregister(combo) {
            info!(combo, "unregistered hotkey");
            let _ = self.events.send(ServiceEvent::HotkeyUnregistered {
                combo: super::parser::canonical_combo(combo),
            });
        }
    }

    /// Drop every registration; the listener keeps running
    pub fn unregister_all(&self) {
        let cleared = self.registry.len();
        self.registry.unregister_all();
        info!(cleared, "cleared all registered hotkeys");
    }

    /// Non-interactive permission check; starts the listener when granted
    pub fn check_accessibility_permissions(&self) -> bool {
        let granted = self.gate.has_permission(false);
        if granted {
            info!("accessibility permissions granted");
            self.listener.ensure_running();
        } else {
            warn!("accessibility permissions missing");
        }
        granted
    }

    /// Ask the user for the permission; starts the listener when granted
    pub fn request_accessibility_permissions(&self) -> bool {
        if !self.gate.is_restricted() {
            info!("accessibility permissions not required on this platform");
            self.listener.ensure_running();
            return true;
        }

        info!("requesting accessibility permissions");
        let granted = self.gate.request_permission();
        if granted {
            info!("accessibility permissions granted after prompt");
            self.listener.ensure_running();
        } else {
            warn!("accessibility permissions still missing after prompt");
        }
        granted
    }

    /// Re-check permission up to `attempts` times, `interval` apart.
    ///
    /// Used after a user-facing request, since the grant happens out of band.
    pub async fn wait_for_permission(&self, attempts: u32, interval: Duration) -> bool {
        for attempt in 1..=attempts {
            if self.gate.has_permission(false) {
                info!(attempt, "accessibility permissions granted");
                self.listener.ensure_running();
                return true;
            }
            if attempt < attempts {
                tokio::time::sleep(interval).await;
            }
        }
        warn!(attempts, "gave up waiting for accessibility permissions");
        false
    }

    /// Receive listener and registration events
    pub fn subscribe(&self) -> broadcast::Receiver<ServiceEvent> {
        self.events.subscribe()
    }

    /// Current lifecycle state of the listener
    pub fn listener_state(&self) -> ListenerState {
        self.listener.state()
    }

    /// Modifiers held as of the latest key event the listener saw
    pub fn held_modifiers(&self) -> ModifierMask {
        self.listener.held_modifiers()
    }

    /// Canonical combos currently registered
    pub fn registered_hotkeys(&self) -> Vec<String> {
        self.registry.combos()
    }

    /// Stop the hook and forget every hotkey. Idempotent.
    pub fn dispose(&self) {
        if self.listener.is_disposed() {
            return;
        }
        self.listener.dispose();
        self.registry.unregister_all();
    }
}

impl Drop for HotkeyService {
    fn drop(&mut self) {
        self.dispose();
    }
}
