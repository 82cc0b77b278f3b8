//! State machine module for the listener lifecycle
//!
//! Provides an explicit state machine with five states:
//! - NotRunning: no hook installed
//! - Starting: hook thread spawned, hook being installed
//! - Running: hook pumping key events
//! - Faulted: hook died, awaiting restart
//! - Stopped: disposed, terminal

mod machine;

pub use machine::{ListenerLifecycle, ListenerState};
