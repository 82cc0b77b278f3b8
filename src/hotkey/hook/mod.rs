//! OS-level keyboard hooks
//!
//! A hook is a blocking event pump. The listener runs it on a dedicated
//! thread and is the only caller of platform hook APIs.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use super::keys::{KeyCode, ModifierMask};

#[cfg(target_os = "macos")]
mod macos;
#[cfg(not(target_os = "macos"))]
mod rdev_hook;

/// Direction of a raw key event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEventKind {
    KeyDown,
    KeyUp,
}

/// A key event as reported by the OS hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawKeyEvent {
    pub kind: KeyEventKind,
    pub key: KeyCode,
    /// Modifier snapshot at the time of the event, physical side bits included
    pub modifiers: ModifierMask,
}

impl RawKeyEvent {
    pub fn down(key: KeyCode, modifiers: ModifierMask) -> Self {
        Self {
            kind: KeyEventKind::KeyDown,
            key,
            modifiers,
        }
    }

    pub fn up(key: KeyCode, modifiers: ModifierMask) -> Self {
        Self {
            kind: KeyEventKind::KeyUp,
            key,
            modifiers,
        }
    }
}

/// Receives every raw event, called on the hook thread
pub type EventSink = Arc<dyn Fn(RawKeyEvent) + Send + Sync>;

/// Errors raised while installing or running a hook
#[derive(Debug, Clone, thiserror::Error)]
pub enum HookError {
    #[error("failed to create event tap - check Accessibility permissions")]
    EventTapCreation,

    #[error("failed to attach event tap to run loop")]
    RunLoopSource,

    #[error("keyboard hook failed: {0}")]
    Listen(String),

    #[error("keyboard hook exited without a stop request")]
    UnexpectedExit,
}

/// Called once by a hook after it is installed and about to pump events
pub type ReadySignal = Box<dyn FnOnce() + Send>;

/// A global keyboard hook
pub trait KeyboardHook: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Install the hook, call `ready`, then pump events into `sink` until
    /// `stop` is set.
    ///
    /// Blocks the calling thread. Returns `Ok(())` once a stop request has
    /// been honoured; any other exit is an error. A hook that fails to
    /// install returns without calling `ready`.
    fn run(&self, stop: Arc<AtomicBool>, sink: EventSink, ready: ReadySignal)
        -> Result<(), HookError>;
}

/// The hook backend for the current platform
pub fn platform_hook() -> Arc<dyn KeyboardHook> {
    #[cfg(target_os = "macos")]
    {
        Arc::new(macos::EventTapHook::new())
    }
    #[cfg(not(target_os = "macos"))]
    {
        Arc::new(rdev_hook::RdevHook::new())
    }
}
