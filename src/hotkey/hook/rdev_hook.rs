//! Global keyboard hook using `rdev::listen`
//!
//! `rdev::listen` cannot be interrupted. A stop request makes the callback
//! drop further events; the thread stays parked in rdev until the process
//! exits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rdev::{listen, EventType, Key};
use tracing::trace;

use super::{EventSink, HookError, KeyboardHook, RawKeyEvent, ReadySignal};
use crate::hotkey::keys::{KeyCode, ModifierTracker};

pub struct RdevHook;

impl RdevHook {
    pub fn new() -> Self {
        Self
    }
}

impl KeyboardHook for RdevHook {
    fn name(&self) -> &'static str {
        "rdev"
    }

    fn run(
        &self,
        stop: Arc<AtomicBool>,
        sink: EventSink,
        ready: ReadySignal,
    ) -> Result<(), HookError> {
        // rdev reports no modifier flags, so held modifiers are tracked here
        let mut tracker = ModifierTracker::new();
        let callback_stop = Arc::clone(&stop);

        // rdev has no install callback; listen either fails right away or
        // starts pumping
        ready();
        let result = listen(move |event| {
            if callback_stop.load(Ordering::Relaxed) {
                return;
            }

            let (key, down) = match event.event_type {
                EventType::KeyPress(key) => (key, true),
                EventType::KeyRelease(key) => (key, false),
                _ => return,
            };

            let Some(key) = key_from_rdev(key) else {
                trace!(?key, "ignoring unmapped key");
                return;
            };

            let event = if down {
                RawKeyEvent::down(key, tracker.press(key))
            } else {
                // Snapshot before the release so a released modifier still
                // shows in its own key-up
                let mask = tracker.mask();
                tracker.release(key);
                RawKeyEvent::up(key, mask)
            };
            sink(event);
        });

        match result {
            Err(e) => Err(HookError::Listen(format!("{:?}", e))),
            Ok(()) if stop.load(Ordering::SeqCst) => Ok(()),
            Ok(()) => Err(HookError::UnexpectedExit),
        }
    }
}

fn key_from_rdev(key: Key) -> Option<KeyCode> {
    let code = match key {
        Key::KeyA => KeyCode::A,
        Key::KeyB => KeyCode::B,
        Key::KeyC => KeyCode::C,
        Key::KeyD => KeyCode::D,
        Key::KeyE => KeyCode::E,
        Key::KeyF => KeyCode::F,
        Key::KeyG => KeyCode::G,
        Key::KeyH => KeyCode::H,
        Key::KeyI => KeyCode::I,
        Key::KeyJ => KeyCode::J,
        Key::KeyK => KeyCode::K,
        Key::KeyL => KeyCode::L,
        Key::KeyM => KeyCode::M,
        Key::KeyN => KeyCode::N,
        Key::KeyO => KeyCode::O,
        Key::KeyP => KeyCode::P,
        Key::KeyQ => KeyCode::Q,
        Key::KeyR => KeyCode::R,
        Key::KeyS => KeyCode::S,
        Key::KeyT => KeyCode::T,
        Key::KeyU => KeyCode::U,
        Key::KeyV => KeyCode::V,
        Key::KeyW => KeyCode::W,
        Key::KeyX => KeyCode::X,
        Key::KeyY => KeyCode::Y,
        Key::KeyZ => KeyCode::Z,
        Key::Num0 => KeyCode::Num0,
        Key::Num1 => KeyCode::Num1,
        Key::Num2 => KeyCode::Num2,
        Key::Num3 => KeyCode::Num3,
        Key::Num4 => KeyCode::Num4,
        Key::Num5 => KeyCode::Num5,
        Key::Num6 => KeyCode::Num6,
        Key::Num7 => KeyCode::Num7,
        Key::Num8 => KeyCode::Num8,
        Key::Num9 => KeyCode::Num9,
        Key::F1 => KeyCode::F1,
        Key::F2 => KeyCode::F2,
        Key::F3 => KeyCode::F3,
        Key::F4 => KeyCode::F4,
        Key::F5 => KeyCode::F5,
        Key::F6 => KeyCode::F6,
        Key::F7 => KeyCode::F7,
        Key::F8 => KeyCode::F8,
        Key::F9 => KeyCode::F9,
        Key::F10 => KeyCode::F10,
        Key::F11 => KeyCode::F11,
        Key::F12 => KeyCode::F12,
        Key::Space => KeyCode::Space,
        Key::Return | Key::KpReturn => KeyCode::Enter,
        Key::Tab => KeyCode::Tab,
        Key::Escape => KeyCode::Escape,
        Key::Backspace => KeyCode::Backspace,
        Key::Delete => KeyCode::Delete,
        Key::Home => KeyCode::Home,
        Key::End => KeyCode::End,
        Key::PageUp => KeyCode::PageUp,
        Key::PageDown => KeyCode::PageDown,
        Key::UpArrow => KeyCode::Up,
        Key::DownArrow => KeyCode::Down,
        Key::LeftArrow => KeyCode::Left,
        Key::RightArrow => KeyCode::Right,
        Key::Insert => KeyCode::Insert,
        Key::CapsLock => KeyCode::CapsLock,
        Key::PrintScreen => KeyCode::PrintScreen,
        Key::ScrollLock => KeyCode::ScrollLock,
        Key::Pause => KeyCode::Pause,
        Key::NumLock => KeyCode::NumLock,
        Key::Minus => KeyCode::Minus,
        Key::Equal => KeyCode::Equal,
        Key::Comma => KeyCode::Comma,
        Key::Dot => KeyCode::Period,
        Key::Slash => KeyCode::Slash,
        Key::SemiColon => KeyCode::Semicolon,
        Key::Quote => KeyCode::Quote,
        Key::BackSlash | Key::IntlBackslash => KeyCode::Backslash,
        Key::LeftBracket => KeyCode::OpenBracket,
        Key::RightBracket => KeyCode::CloseBracket,
        Key::BackQuote => KeyCode::Backquote,
        Key::ShiftLeft => KeyCode::LeftShift,
        Key::ShiftRight => KeyCode::RightShift,
        Key::ControlLeft => KeyCode::LeftControl,
        Key::ControlRight => KeyCode::RightControl,
        Key::Alt => KeyCode::LeftAlt,
        Key::AltGr => KeyCode::RightAlt,
        Key::MetaLeft => KeyCode::LeftMeta,
        Key::MetaRight => KeyCode::RightMeta,
        Key::Unknown(raw) => return function_key_from_raw(raw),
        _ => return None,
    };
    Some(code)
}

/// First raw code of the F13-F24 run: VK_F13 on Windows, the X11 keycode
/// elsewhere. rdev has no named variants past F12.
#[cfg(target_os = "windows")]
const RAW_F13: u32 = 0x7C;
#[cfg(not(target_os = "windows"))]
const RAW_F13: u32 = 191;

fn function_key_from_raw(raw: u32) -> Option<KeyCode> {
    let offset = raw.checked_sub(RAW_F13)?;
    if offset >= 12 {
        return None;
    }
    KeyCode::function(13 + offset as u8)
}
