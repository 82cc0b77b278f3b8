//! Hotkey combo string parsing
//!
//! Turns human-readable combos such as `"Command+Shift+D"` into a trigger key
//! plus the modifiers that must be held.

use std::collections::BTreeSet;

use super::keys::{KeyCode, Modifier, ModifierMask};

/// Why a combo string was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("hotkey is empty")]
    Empty,

    #[error("unknown hotkey segment '{0}'")]
    UnknownSegment(String),

    #[error("hotkey must include a non-modifier key")]
    MissingTrigger,

    #[error("hotkey has more than one non-modifier key ('{first}' and '{second}')")]
    MultipleTriggers { first: String, second: String },
}

/// A parsed hotkey: one trigger key plus required modifiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotkeySpec {
    combo: String,
    trigger: KeyCode,
    required: ModifierMask,
    modifier_keys: BTreeSet<KeyCode>,
}

impl HotkeySpec {
    /// Canonical registry key for this combo
    pub fn combo(&self) -> &str {
        &self.combo
    }

    /// The non-modifier key that completes the combo
    pub fn trigger(&self) -> KeyCode {
        self.trigger
    }

    /// Logical modifiers that must be held
    pub fn required(&self) -> ModifierMask {
        self.required
    }

    /// Every physical key that satisfies one of the required modifiers
    pub fn modifier_keys(&self) -> &BTreeSet<KeyCode> {
        &self.modifier_keys
    }

    /// Whether releasing `key` breaks this combo
    pub fn is_released_by(&self, key: KeyCode) -> bool {
        self.trigger == key || self.modifier_keys.contains(&key)
    }
}

/// Canonical form of a combo string: trimmed, lower-cased segments joined by `+`
pub fn canonical_combo(text: &str) -> String {
    segments(text)
        .map(|s| s.to_lowercase())
        .collect::<Vec<_>>()
        .join("+")
}

/// Parse a combo string such as `"Ctrl+Alt+F5"`
pub fn parse_combo(text: &str) -> Result<HotkeySpec, ParseError> {
    let mut required = ModifierMask::NONE;
    let mut modifier_keys = BTreeSet::new();
    let mut trigger: Option<(KeyCode, &str)> = None;
    let mut any = false;

    for segment in segments(text) {
        any = true;

        if let Some(modifier) = parse_modifier(segment) {
            required |= modifier.mask();
            modifier_keys.extend(modifier.key_codes());
            continue;
        }

        let key = parse_key(segment)
            .ok_or_else(|| ParseError::UnknownSegment(segment.to_string()))?;

        if let Some((_, first)) = trigger {
            return Err(ParseError::MultipleTriggers {
                first: first.to_string(),
                second: segment.to_string(),
            });
        }
        trigger = Some((key, segment));
    }

    if !any {
        return Err(ParseError::Empty);
    }

    let (trigger, _) = trigger.ok_or(ParseError::MissingTrigger)?;

    Ok(HotkeySpec {
        combo: canonical_combo(text),
        trigger,
        required,
        modifier_keys,
    })
}

fn segments(text: &str) -> impl Iterator<Item = &str> {
    text.split('+').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_modifier(segment: &str) -> Option<Modifier> {
    match segment.to_ascii_lowercase().as_str() {
        "shift" => Some(Modifier::Shift),
        "control" | "ctrl" => Some(Modifier::Control),
        "alt" | "option" => Some(Modifier::Alt),
        "command" | "cmd" | "meta" | "super" => Some(Modifier::Meta),
        _ => None,
    }
}

fn parse_key(segment: &str) -> Option<KeyCode> {
    let mut chars = segment.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if let Some(key) = KeyCode::letter(c).or_else(|| KeyCode::digit(c)) {
            return Some(key);
        }
    }

    if let Some(key) = parse_function_key(segment) {
        return Some(key);
    }

    if let Some(key) = special_key(segment) {
        return Some(key);
    }

    KeyCode::from_name(&normalize(segment))
}

fn parse_function_key(segment: &str) -> Option<KeyCode> {
    let rest = segment
        .strip_prefix('F')
        .or_else(|| segment.strip_prefix('f'))?;
    if rest.is_empty() || !rest.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let n: u8 = rest.parse().ok()?;
    KeyCode::function(n)
}

fn special_key(segment: &str) -> Option<KeyCode> {
    let key = match segment.to_ascii_lowercase().as_str() {
        "space" | "spacebar" => KeyCode::Space,
        "enter" | "return" => KeyCode::Enter,
        "tab" => KeyCode::Tab,
        "escape" | "esc" => KeyCode::Escape,
        "backspace" => KeyCode::Backspace,
        "delete" | "del" => KeyCode::Delete,
        "home" => KeyCode::Home,
        "end" => KeyCode::End,
        "pageup" => KeyCode::PageUp,
        "pagedown" => KeyCode::PageDown,
        "up" => KeyCode::Up,
        "down" => KeyCode::Down,
        "left" => KeyCode::Left,
        "right" => KeyCode::Right,
        _ => return None,
    };
    Some(key)
}

/// Title-case each word and drop the spaces: `"caps lock"` -> `"CapsLock"`
fn normalize(segment: &str) -> String {
    segment
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}
