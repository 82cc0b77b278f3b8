//! Hotkey module for system-wide keyboard shortcuts
//!
//! Parses combo strings, keeps the registry of bound callbacks and runs the
//! global keyboard hook that fires them.

mod dispatch;
pub(crate) mod hook;
mod keys;
mod listener;
mod parser;
mod registry;
mod service;

pub use listener::RestartPolicy;
pub use service::HotkeyService;

#[cfg(test)]
pub use dispatch::Dispatcher;
#[cfg(test)]
pub use keys::{KeyCode, Modifier, ModifierMask};
