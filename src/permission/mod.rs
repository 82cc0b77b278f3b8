//! Permission gate for installing a global keyboard hook
//!
//! Most platforms let any process observe global key events. macOS requires
//! the Accessibility permission; see [`AccessibilityGate`].

use std::sync::Arc;

#[cfg(target_os = "macos")]
mod macos;

#[cfg(target_os = "macos")]
pub use macos::AccessibilityGate;

/// Platform check for the privilege a global hook needs
pub trait PermissionGate: Send + Sync {
    /// Whether the hook may be installed. With `prompt_user` the OS may show
    /// a consent dialog.
    fn has_permission(&self, prompt_user: bool) -> bool;

    /// Point the user at the OS privacy settings, then check interactively.
    /// Never fails; problems are logged and reported as `false`.
    fn request_permission(&self) -> bool;

    /// Whether this platform restricts global hooks at all
    fn is_restricted(&self) -> bool;
}

/// Gate for platforms without a restriction on global input hooks
#[derive(Debug, Default, Clone, Copy)]
pub struct Unrestricted;

impl PermissionGate for Unrestricted {
    fn has_permission(&self, _prompt_user: bool) -> bool {
        true
    }

    fn request_permission(&self) -> bool {
        true
    }

    fn is_restricted(&self) -> bool {
        false
    }
}

/// The gate for the platform we are running on
pub fn platform_gate() -> Arc<dyn PermissionGate> {
    #[cfg(target_os = "macos")]
    {
        Arc::new(AccessibilityGate::new())
    }
    #[cfg(not(target_os = "macos"))]
    {
        Arc::new(Unrestricted)
    }
}
