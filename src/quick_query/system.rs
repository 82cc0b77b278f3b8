//! Desktop-backed copy shortcut and clipboard

use std::thread;
use std::time::Duration;

use super::{CaptureError, ClipboardSource, CopyShortcut};

/// Gap between the synthetic key events
const KEY_GAP: Duration = Duration::from_millis(50);

/// Presses the platform copy shortcut (Command+C on macOS, Control+C elsewhere)
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCopy;

#[cfg(target_os = "macos")]
impl CopyShortcut for SystemCopy {
    fn press_copy(&self) -> Result<(), CaptureError> {
        use core_graphics::event::{CGEvent, CGEventFlags, CGEventTapLocation, CGKeyCode};
        use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};

        // ANSI C
        const KEY_C: CGKeyCode = 8;

        let source = CGEventSource::new(CGEventSourceStateID::HIDSystemState)
            .map_err(|_| CaptureError::Copy("failed to create event source".to_string()))?;

        // Build both events first so a key-down is never posted without its key-up
        let down = CGEvent::new_keyboard_event(source.clone(), KEY_C, true)
            .map_err(|_| CaptureError::Copy("failed to create key down event".to_string()))?;
        let up = CGEvent::new_keyboard_event(source, KEY_C, false)
            .map_err(|_| CaptureError::Copy("failed to create key up event".to_string()))?;
        down.set_flags(CGEventFlags::CGEventFlagCommand);
        up.set_flags(CGEventFlags::CGEventFlagCommand);

        down.post(CGEventTapLocation::HID);
        thread::sleep(KEY_GAP);
        up.post(CGEventTapLocation::HID);
        thread::sleep(KEY_GAP);
        Ok(())
    }
}

#[cfg(not(target_os = "macos"))]
impl CopyShortcut for SystemCopy {
    fn press_copy(&self) -> Result<(), CaptureError> {
        use enigo::{Direction, Enigo, Key, Keyboard, Settings};

        let mut enigo = Enigo::new(&Settings::default())
            .map_err(|e| CaptureError::Copy(format!("failed to create keyboard simulator: {e}")))?;

        enigo
            .key(Key::Control, Direction::Press)
            .map_err(|e| CaptureError::Copy(e.to_string()))?;
        thread::sleep(KEY_GAP);
        let clicked = enigo.key(Key::Unicode('c'), Direction::Click);
        thread::sleep(KEY_GAP);
        // Always let go of Control, even if the C press failed
        let released = enigo.key(Key::Control, Direction::Release);

        clicked.map_err(|e| CaptureError::Copy(e.to_string()))?;
        released.map_err(|e| CaptureError::Copy(e.to_string()))?;
        Ok(())
    }
}

/// System clipboard through arboard. A handle is opened per read.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClipboard;

impl ClipboardSource for SystemClipboard {
    fn read_text(&self) -> Result<String, CaptureError> {
        let mut clipboard = arboard::Clipboard::new()?;
        Ok(clipboard.get_text()?)
    }
}

impl From<arboard::Error> for CaptureError {
    fn from(err: arboard::Error) -> Self {
        CaptureError::Clipboard(err.to_string())
    }
}
