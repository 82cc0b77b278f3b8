//! Global keyboard hook using macOS CGEventTap
//!
//! The tap runs listen-only on the hook thread's own CFRunLoop. The tap
//! callback only forwards raw data over a channel; translation to
//! `RawKeyEvent` happens between run loop slices.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use core_foundation::runloop::{kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop};
use core_graphics::event::{
    CGEvent, CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement,
    CGEventTapProxy, CGEventType, EventField,
};
use tracing::{info, trace, warn};

use super::{EventSink, HookError, KeyboardHook, RawKeyEvent, ReadySignal};
use crate::hotkey::keys::{KeyCode, Modifier, ModifierMask};

/// Modifier flag masks from CGEventFlags
mod flags {
    pub const SHIFT: u64 = 0x0002_0000;
    pub const CONTROL: u64 = 0x0004_0000;
    pub const ALTERNATE: u64 = 0x0008_0000;
    pub const COMMAND: u64 = 0x0010_0000;

    // Device-dependent left/right bits (NX_DEVICE*KEYMASK)
    pub const LEFT_CONTROL: u64 = 0x0000_0001;
    pub const LEFT_SHIFT: u64 = 0x0000_0002;
    pub const RIGHT_SHIFT: u64 = 0x0000_0004;
    pub const LEFT_COMMAND: u64 = 0x0000_0008;
    pub const RIGHT_COMMAND: u64 = 0x0000_0010;
    pub const LEFT_ALT: u64 = 0x0000_0020;
    pub const RIGHT_ALT: u64 = 0x0000_0040;
    pub const RIGHT_CONTROL: u64 = 0x0000_2000;
}

/// What the tap callback hands to the pump
enum TapMessage {
    Key { down: bool, code: i64, flags: u64 },
    FlagsChanged { code: i64, flags: u64 },
    Disabled,
}

pub struct EventTapHook;

impl EventTapHook {
    pub fn new() -> Self {
        Self
    }
}

impl KeyboardHook for EventTapHook {
    fn name(&self) -> &'static str {
        "cgeventtap"
    }

    fn run(
        &self,
        stop: Arc<AtomicBool>,
        sink: EventSink,
        ready: ReadySignal,
    ) -> Result<(), HookError> {
        let (tap_tx, tap_rx) = mpsc::channel::<TapMessage>();

        // CGEventTap callback - must be fast and non-blocking
        let callback = move |_proxy: CGEventTapProxy,
                             event_type: CGEventType,
                             event: &CGEvent|
              -> Option<CGEvent> {
            let code = event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE);
            let flags = event.get_flags().bits();
            let message = match event_type {
                CGEventType::KeyDown => Some(TapMessage::Key { down: true, code, flags }),
                CGEventType::KeyUp => Some(TapMessage::Key { down: false, code, flags }),
                CGEventType::FlagsChanged => Some(TapMessage::FlagsChanged { code, flags }),
                CGEventType::TapDisabledByTimeout | CGEventType::TapDisabledByUserInput => {
                    Some(TapMessage::Disabled)
                }
                _ => None,
            };
            if let Some(message) = message {
                let _ = tap_tx.send(message);
            }
            Some(event.clone())
        };

        let tap = CGEventTap::new(
            CGEventTapLocation::Session,
            CGEventTapPlacement::HeadInsertEventTap,
            CGEventTapOptions::ListenOnly,
            vec![
                CGEventType::KeyDown,
                CGEventType::KeyUp,
                CGEventType::FlagsChanged,
            ],
            callback,
        )
        .map_err(|_| HookError::EventTapCreation)?;

        tap.enable();

        let run_loop_source = tap
            .mach_port
            .create_runloop_source(0)
            .map_err(|_| HookError::RunLoopSource)?;
        let run_loop = CFRunLoop::get_current();

        unsafe {
            run_loop.add_source(&run_loop_source, kCFRunLoopCommonModes);
        }

        info!("event tap created and enabled");
        ready();

        while !stop.load(Ordering::SeqCst) {
            unsafe {
                CFRunLoop::run_in_mode(kCFRunLoopDefaultMode, Duration::from_millis(100), true);
            }

            while let Ok(message) = tap_rx.try_recv() {
                match message {
                    TapMessage::Disabled => {
                        warn!("event tap disabled by the system, re-enabling");
                        tap.enable();
                    }
                    other => {
                        if let Some(event) = translate(other) {
                            sink(event);
                        }
                    }
                }
            }
        }

        unsafe {
            run_loop.remove_source(&run_loop_source, kCFRunLoopCommonModes);
        }

        Ok(())
    }
}

fn translate(message: TapMessage) -> Option<RawKeyEvent> {
    match message {
        TapMessage::Key { down, code, flags } => {
            let Some(key) = key_from_code(code) else {
                trace!(code, "ignoring unmapped key code");
                return None;
            };
            let mask = mask_from_flags(flags);
            Some(if down {
                RawKeyEvent::down(key, mask)
            } else {
                RawKeyEvent::up(key, mask)
            })
        }
        TapMessage::FlagsChanged { code, flags } => {
            let key = key_from_code(code)?;
            let modifier = key.modifier()?;
            let side = key.side_mask()?;
            let mask = mask_from_flags(flags);
            // Fall back to the logical bit when the device bits are missing
            let pressed = if mask.intersects(modifier.left_mask() | modifier.right_mask()) {
                mask.contains(side)
            } else {
                mask.contains(modifier.mask())
            };
            Some(if pressed {
                RawKeyEvent::down(key, mask)
            } else {
                RawKeyEvent::up(key, mask)
            })
        }
        TapMessage::Disabled => None,
    }
}

fn mask_from_flags(raw: u64) -> ModifierMask {
    let table = [
        (flags::SHIFT, Modifier::Shift.mask()),
        (flags::LEFT_SHIFT, Modifier::Shift.left_mask()),
        (flags::RIGHT_SHIFT, Modifier::Shift.right_mask()),
        (flags::CONTROL, Modifier::Control.mask()),
        (flags::LEFT_CONTROL, Modifier::Control.left_mask()),
        (flags::RIGHT_CONTROL, Modifier::Control.right_mask()),
        (flags::ALTERNATE, Modifier::Alt.mask()),
        (flags::LEFT_ALT, Modifier::Alt.left_mask()),
        (flags::RIGHT_ALT, Modifier::Alt.right_mask()),
        (flags::COMMAND, Modifier::Meta.mask()),
        (flags::LEFT_COMMAND, Modifier::Meta.left_mask()),
        (flags::RIGHT_COMMAND, Modifier::Meta.right_mask()),
    ];
    table
        .iter()
        .filter(|(bit, _)| raw & bit != 0)
        .fold(ModifierMask::NONE, |acc, (_, mask)| acc | *mask)
}

/// ANSI virtual key codes
fn key_from_code(code: i64) -> Option<KeyCode> {
    use KeyCode::*;

    let key = match code {
        0 => A,
        1 => S,
        2 => D,
        3 => F,
        4 => H,
        5 => G,
        6 => Z,
        7 => X,
        8 => C,
        9 => V,
        11 => B,
        12 => Q,
        13 => W,
        14 => E,
        15 => R,
        16 => Y,
        17 => T,
        18 => Num1,
        19 => Num2,
        20 => Num3,
        21 => Num4,
        22 => Num6,
        23 => Num5,
        24 => Equal,
        25 => Num9,
        26 => Num7,
        27 => Minus,
        28 => Num8,
        29 => Num0,
        30 => CloseBracket,
        31 => O,
        32 => U,
        33 => OpenBracket,
        34 => I,
        35 => P,
        36 => Enter,
        37 => L,
        38 => J,
        39 => Quote,
        40 => K,
        41 => Semicolon,
        42 => Backslash,
        43 => Comma,
        44 => Slash,
        45 => N,
        46 => M,
        47 => Period,
        48 => Tab,
        49 => Space,
        50 => Backquote,
        51 => Backspace,
        53 => Escape,
        54 => RightMeta,
        55 => LeftMeta,
        56 => LeftShift,
        57 => CapsLock,
        58 => LeftAlt,
        59 => LeftControl,
        60 => RightShift,
        61 => RightAlt,
        62 => RightControl,
        64 => F17,
        79 => F18,
        80 => F19,
        90 => F20,
        96 => F5,
        97 => F6,
        98 => F7,
        99 => F3,
        100 => F8,
        101 => F9,
        103 => F11,
        105 => F13,
        106 => F16,
        107 => F14,
        109 => F10,
        110 => Menu,
        111 => F12,
        113 => F15,
        114 => Insert,
        115 => Home,
        116 => PageUp,
        117 => Delete,
        118 => F4,
        119 => End,
        120 => F2,
        121 => PageDown,
        122 => F1,
        123 => Left,
        124 => Right,
        125 => Down,
        126 => Up,
        _ => return None,
    };
    Some(key)
}
