//! Events emitted by the hotkey service
//!
//! Broadcast to any subscriber (the daemon's log loop, tests).

use serde::{Deserialize, Serialize};

/// Notable things the hotkey service did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServiceEvent {
    /// Global hook installed and receiving key events
    ListenerStarted,

    /// Global hook stopped unexpectedly
    ListenerFaulted {
        reason: String,
        /// Delay before the automatic restart, absent if none is scheduled
        restart_in_ms: Option<u64>,
    },

    /// Global hook torn down on request
    ListenerStopped,

    /// Listener not started because the OS permission is missing
    PermissionMissing,

    HotkeyRegistered { combo: String },

    HotkeyUnregistered { combo: String },

    /// A hotkey callback was dispatched
    HotkeyFired { combo: String },
}

impl std::fmt::Display for ServiceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceEvent::ListenerStarted => write!(f, "LISTENER_STARTED"),
            ServiceEvent::ListenerFaulted {
                reason,
                restart_in_ms: Some(ms),
            } => write!(f, "LISTENER_FAULTED ({}, restart in {}ms)", reason, ms),
            ServiceEvent::ListenerFaulted { reason, .. } => {
                write!(f, "LISTENER_FAULTED ({})", reason)
            }
            ServiceEvent::ListenerStopped => write!(f, "LISTENER_STOPPED"),
            ServiceEvent::PermissionMissing => write!(f, "PERMISSION_MISSING"),
            ServiceEvent::HotkeyRegistered { combo } => write!(f, "HOTKEY_REGISTERED ({})", combo),
            ServiceEvent::HotkeyUnregistered { combo } => {
                write!(f, "HOTKEY_UNREGISTERED ({})", combo)
            }
            ServiceEvent::HotkeyFired { combo } => write!(f, "HOTKEY_FIRED ({})", combo),
        }
    }
}
