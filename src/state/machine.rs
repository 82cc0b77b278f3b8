//! Listener lifecycle state machine
//!
//! NotRunning -> Starting -> Running -> (Faulted -> Starting | Stopped)
//!
//! Stopped is terminal and only reached through disposal.

use std::time::{Duration, Instant};

use tracing::{info, warn};

/// Lifecycle states of the global listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListenerState {
    /// No hook installed, the next `ensure_running` starts one
    #[default]
    NotRunning,
    /// Hook thread spawned, hook being installed
    Starting,
    /// Hook installed and pumping events
    Running,
    /// Hook died unexpectedly
    Faulted,
    /// Disposed, never restarts
    Stopped,
}

impl ListenerState {
    /// True while a hook thread exists for this listener
    pub fn is_active(self) -> bool {
        matches!(self, Self::Starting | Self::Running | Self::Faulted)
    }
}

impl std::fmt::Display for ListenerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerState::NotRunning => write!(f, "NotRunning"),
            ListenerState::Starting => write!(f, "Starting"),
            ListenerState::Running => write!(f, "Running"),
            ListenerState::Faulted => write!(f, "Faulted"),
            ListenerState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Rejected state change
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid listener transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: ListenerState,
    pub to: ListenerState,
}

/// Tracks the listener state plus restart bookkeeping
#[derive(Debug)]
pub struct ListenerLifecycle {
    state: ListenerState,
    entered_at: Instant,
    /// Consecutive restarts since the hook last ran stably
    restarts: u32,
}

impl Default for ListenerLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerLifecycle {
    pub fn new() -> Self {
        Self {
            state: ListenerState::NotRunning,
            entered_at: Instant::now(),
            restarts: 0,
        }
    }

    pub fn state(&self) -> ListenerState {
        self.state
    }

    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    /// How long the listener has been in its current state
    pub fn elapsed(&self) -> Duration {
        self.entered_at.elapsed()
    }

    /// NotRunning -> Starting. Returns false if a start is already underway
    /// or the listener has been disposed.
    pub fn begin_start(&mut self) -> bool {
        if self.state != ListenerState::NotRunning {
            return false;
        }
        self.restarts = 0;
        self.transition_to(ListenerState::Starting).is_ok()
    }

    /// Starting -> Running
    pub fn mark_running(&mut self) -> Result<(), InvalidTransition> {
        self.transition_to(ListenerState::Running)
    }

    /// Starting | Running -> Faulted. Resets the restart counter if the hook
    /// had been running longer than `stable_after`.
    pub fn mark_faulted(&mut self, stable_after: Duration) -> Result<(), InvalidTransition> {
        if self.state == ListenerState::Running && self.elapsed() >= stable_after {
            self.restarts = 0;
        }
        self.transition_to(ListenerState::Faulted)
    }

    /// Faulted -> Starting, counting the attempt
    pub fn restart(&mut self) -> Result<u32, InvalidTransition> {
        self.transition_to(ListenerState::Starting)?;
        self.restarts += 1;
        Ok(self.restarts)
    }

    /// Back to NotRunning, unless already Stopped
    pub fn reset(&mut self) {
        if self.state != ListenerState::Stopped {
            let _ = self.transition_to(ListenerState::NotRunning);
        }
    }

    /// Any state -> Stopped
    pub fn stop(&mut self) {
        let _ = self.transition_to(ListenerState::Stopped);
    }

    fn transition_to(&mut self, to: ListenerState) -> Result<(), InvalidTransition> {
        use ListenerState::*;

        let from = self.state;
        let allowed = matches!(
            (from, to),
            (NotRunning, Starting)
                | (Starting, Running)
                | (Starting, Faulted)
                | (Running, Faulted)
                | (Faulted, Starting)
                | (Starting, NotRunning)
                | (Running, NotRunning)
                | (Faulted, NotRunning)
                | (_, Stopped)
        ) && from != Stopped;

        if !allowed {
            let err = InvalidTransition { from, to };
            warn!(%from, %to, "rejected listener transition");
            return Err(err);
        }

        info!(
            from = %from,
            to = %to,
            duration_ms = self.entered_at.elapsed().as_millis() as u64,
            "listener transition"
        );
        self.state = to;
        self.entered_at = Instant::now();
        Ok(())
    }
}
