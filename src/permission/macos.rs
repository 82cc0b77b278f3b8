//! Accessibility permission gate for macOS
//!
//! CGEventTap only sees key events from other applications once the process
//! is trusted for Accessibility.

use std::process::Command;

use core_foundation::base::TCFType;
use core_foundation::boolean::CFBoolean;
use core_foundation::dictionary::{CFDictionary, CFDictionaryRef};
use core_foundation::string::CFString;
use tracing::{info, warn};

use super::PermissionGate;

const ACCESSIBILITY_SETTINGS_URL: &str =
    "x-apple.systempreferences:com.apple.preference.security?Privacy_Accessibility";

#[link(name = "ApplicationServices", kind = "framework")]
extern "C" {
    fn AXIsProcessTrusted() -> bool;
    fn AXIsProcessTrustedWithOptions(options: CFDictionaryRef) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AccessibilityGate;

impl AccessibilityGate {
    pub fn new() -> Self {
        Self
    }

    fn check_with_prompt() -> bool {
        let options = CFDictionary::from_CFType_pairs(&[(
            CFString::new("AXTrustedCheckOptionPrompt"),
            CFBoolean::true_value(),
        )]);
        // SAFETY: the dictionary outlives the call
        unsafe { AXIsProcessTrustedWithOptions(options.as_concrete_TypeRef()) }
    }

    fn open_settings() {
        match Command::new("open").arg(ACCESSIBILITY_SETTINGS_URL).spawn() {
            Ok(_) => info!("System Settings opened to the Accessibility pane"),
            Err(e) => warn!(?e, "unable to open System Settings"),
        }
    }
}

impl PermissionGate for AccessibilityGate {
    fn has_permission(&self, prompt_user: bool) -> bool {
        if prompt_user {
            Self::check_with_prompt()
        } else {
            // SAFETY: plain query of the process trust state
            unsafe { AXIsProcessTrusted() }
        }
    }

    fn request_permission(&self) -> bool {
        Self::open_settings();
        info!("requesting accessibility permission via system prompt");
        let granted = Self::check_with_prompt();
        if !granted {
            warn!("accessibility permission still missing after prompt");
        }
        granted
    }

    fn is_restricted(&self) -> bool {
        true
    }
}
