//! Signal handling for graceful shutdown and settings reload

use std::io;

use tracing::debug;

/// Handles shutdown signals (SIGTERM, SIGINT; Ctrl-C elsewhere)
pub struct ShutdownSignal {
    #[cfg(unix)]
    sigterm: tokio::signal::unix::Signal,
    #[cfg(unix)]
    sigint: tokio::signal::unix::Signal,
}

impl ShutdownSignal {
    /// Register the handlers. Must be called inside a tokio runtime.
    pub fn new() -> io::Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            Ok(Self {
                sigterm: signal(SignalKind::terminate())?,
                sigint: signal(SignalKind::interrupt())?,
            })
        }
        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Wait for a shutdown signal
    pub async fn wait(&mut self) {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = self.sigterm.recv() => {
                    debug!("received SIGTERM");
                }
                _ = self.sigint.recv() => {
                    debug!("received SIGINT");
                }
            }
        }
        #[cfg(not(unix))]
        {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!("received Ctrl-C");
            } else {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Settings reload requests (SIGHUP). Never fires off Unix.
pub struct ReloadSignal {
    #[cfg(unix)]
    sighup: tokio::signal::unix::Signal,
}

impl ReloadSignal {
    pub fn new() -> io::Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            Ok(Self {
                sighup: signal(SignalKind::hangup())?,
            })
        }
        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Wait for the next reload request
    pub async fn recv(&mut self) {
        #[cfg(unix)]
        {
            if self.sighup.recv().await.is_some() {
                debug!("received SIGHUP");
                return;
            }
        }
        std::future::pending::<()>().await;
    }
}
