//! Off-thread callback dispatch
//!
//! Callbacks never run on the hook thread. A panicking callback is caught and
//! logged with its combo.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;

use tokio::runtime::Handle;
use tracing::{debug, error};

use super::registry::FiredHotkey;

#[derive(Clone, Debug, Default)]
pub struct Dispatcher {
    runtime: Option<Handle>,
}

impl Dispatcher {
    /// Use the current tokio runtime if there is one, plain threads otherwise
    pub fn new() -> Self {
        Self {
            runtime: Handle::try_current().ok(),
        }
    }

    /// Run the callback on its own execution unit, fire-and-forget
    pub fn dispatch(&self, fired: FiredHotkey) {
        let FiredHotkey { combo, callback } = fired;
        debug!(combo = %combo, "dispatching hotkey callback");

        let job = move || {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback())) {
                error!(
                    combo = %combo,
                    cause = panic_message(&panic),
                    "hotkey callback panicked"
                );
            }
        };

        match &self.runtime {
            Some(handle) => {
                handle.spawn_blocking(job);
            }
            None => {
                if let Err(e) = thread::Builder::new()
                    .name("hotkey-callback".to_string())
                    .spawn(job)
                {
                    error!(?e, "failed to spawn hotkey callback thread");
                }
            }
        }
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
