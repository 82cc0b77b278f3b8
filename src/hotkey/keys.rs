//! Key codes, modifier masks and modifier tracking
//!
//! `KeyCode` identifies a physical key independent of the platform hook that
//! reported it. `ModifierMask` folds left/right modifier keys into logical
//! modifiers while still remembering which physical side was held.

use std::collections::HashSet;

macro_rules! key_codes {
    ($($variant:ident),+ $(,)?) => {
        /// Physical key identifier shared by every hook backend
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum KeyCode {
            $($variant),+
        }

        impl KeyCode {
            /// Every known key code
            pub const ALL: &'static [KeyCode] = &[$(KeyCode::$variant),+];

            /// Variant name, e.g. `"PageUp"`
            pub fn name(self) -> &'static str {
                match self {
                    $(KeyCode::$variant => stringify!($variant)),+
                }
            }

            /// Exact, case-sensitive lookup by variant name
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $(stringify!($variant) => Some(KeyCode::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

key_codes! {
    A, B, C, D, E, F, G, H, I, J, K, L, M,
    N, O, P, Q, R, S, T, U, V, W, X, Y, Z,
    Num0, Num1, Num2, Num3, Num4, Num5, Num6, Num7, Num8, Num9,
    F1, F2, F3, F4, F5, F6, F7, F8, F9, F10, F11, F12,
    F13, F14, F15, F16, F17, F18, F19, F20, F21, F22, F23, F24,
    Space, Enter, Tab, Escape, Backspace, Delete,
    Home, End, PageUp, PageDown, Up, Down, Left, Right,
    Insert, CapsLock, PrintScreen, ScrollLock, Pause, NumLock, Menu,
    Minus, Equal, Comma, Period, Slash, Semicolon, Quote, Backslash,
    OpenBracket, CloseBracket, Backquote,
    LeftShift, RightShift, LeftControl, RightControl,
    LeftAlt, RightAlt, LeftMeta, RightMeta,
}

impl KeyCode {
    /// Letter key for an ASCII letter, case-insensitive
    pub fn letter(c: char) -> Option<Self> {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        let index = (c.to_ascii_uppercase() as u8 - b'A') as usize;
        KeyCode::ALL.get(index).copied()
    }

    /// Top-row digit key for an ASCII digit
    pub fn digit(c: char) -> Option<Self> {
        let value = c.to_digit(10)?;
        KeyCode::ALL.get(26 + value as usize).copied()
    }

    /// Function key `F<n>` for `n` in 1..=24
    pub fn function(n: u8) -> Option<Self> {
        if !(1..=24).contains(&n) {
            return None;
        }
        KeyCode::ALL.get(36 + n as usize - 1).copied()
    }

    /// The logical modifier this physical key belongs to, if any
    pub fn modifier(self) -> Option<Modifier> {
        Modifier::ALL
            .iter()
            .copied()
            .find(|m| m.key_codes().contains(&self))
    }

    /// Left or right physical bit for a modifier key
    pub fn side_mask(self) -> Option<ModifierMask> {
        let modifier = self.modifier()?;
        if modifier.key_codes()[0] == self {
            Some(modifier.left_mask())
        } else {
            Some(modifier.right_mask())
        }
    }
}

impl std::fmt::Display for KeyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Logical modifier, either physical side satisfies it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    Shift,
    Control,
    Alt,
    Meta,
}

impl Modifier {
    pub const ALL: [Modifier; 4] = [
        Modifier::Shift,
        Modifier::Control,
        Modifier::Alt,
        Modifier::Meta,
    ];

    /// Logical bit for this modifier
    pub fn mask(self) -> ModifierMask {
        ModifierMask(1 << (self.index() * 3))
    }

    /// Bit for the left-hand physical key
    pub fn left_mask(self) -> ModifierMask {
        ModifierMask(1 << (self.index() * 3 + 1))
    }

    /// Bit for the right-hand physical key
    pub fn right_mask(self) -> ModifierMask {
        ModifierMask(1 << (self.index() * 3 + 2))
    }

    /// Logical, left and right bits together
    pub fn any_mask(self) -> ModifierMask {
        self.mask() | self.left_mask() | self.right_mask()
    }

    /// Left and right physical key codes
    pub fn key_codes(self) -> [KeyCode; 2] {
        match self {
            Modifier::Shift => [KeyCode::LeftShift, KeyCode::RightShift],
            Modifier::Control => [KeyCode::LeftControl, KeyCode::RightControl],
            Modifier::Alt => [KeyCode::LeftAlt, KeyCode::RightAlt],
            Modifier::Meta => [KeyCode::LeftMeta, KeyCode::RightMeta],
        }
    }

    fn index(self) -> u16 {
        match self {
            Modifier::Shift => 0,
            Modifier::Control => 1,
            Modifier::Alt => 2,
            Modifier::Meta => 3,
        }
    }
}

/// Bit set over logical and physical modifiers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ModifierMask(u16);

impl ModifierMask {
    pub const NONE: ModifierMask = ModifierMask(0);

    /// Raw bits, for storing in an atomic
    pub fn bits(self) -> u16 {
        self.0
    }

    /// Mask from raw bits, unknown bits dropped
    pub fn from_bits(bits: u16) -> Self {
        Self(bits & 0x0fff)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: ModifierMask) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: ModifierMask) -> bool {
        self.0 & other.0 != 0
    }

    /// True if the modifier is held on either side or as a logical flag
    pub fn has(self, modifier: Modifier) -> bool {
        self.intersects(modifier.any_mask())
    }

    /// Logical modifiers only, physical side bits folded away
    pub fn logical(self) -> ModifierMask {
        Modifier::ALL
            .iter()
            .filter(|m| self.has(**m))
            .fold(ModifierMask::NONE, |acc, m| acc | m.mask())
    }

    /// Whether this (actual) mask satisfies every modifier `required` asks for.
    /// Modifiers not requested are never checked, so extra held modifiers
    /// do not prevent a match.
    pub fn satisfies(self, required: ModifierMask) -> bool {
        Modifier::ALL
            .iter()
            .all(|m| !required.intersects(m.mask()) || self.has(*m))
    }

    /// Mask for a set of held physical keys, non-modifier keys are ignored
    pub fn from_held_keys<'a>(keys: impl IntoIterator<Item = &'a KeyCode>) -> Self {
        keys.into_iter().fold(ModifierMask::NONE, |acc, key| {
            match (key.modifier(), key.side_mask()) {
                (Some(m), Some(side)) => acc | m.mask() | side,
                _ => acc,
            }
        })
    }

    /// This mask once `key` is released. The logical bit goes away only
    /// when neither side is still held.
    pub fn without_key(self, key: KeyCode) -> ModifierMask {
        let (Some(m), Some(side)) = (key.modifier(), key.side_mask()) else {
            return self;
        };
        let mut bits = self.0 & !side.0;
        if bits & (m.left_mask().0 | m.right_mask().0) == 0 {
            bits &= !m.mask().0;
        }
        ModifierMask(bits)
    }
}

impl std::ops::BitOr for ModifierMask {
    type Output = ModifierMask;

    fn bitor(self, rhs: ModifierMask) -> ModifierMask {
        ModifierMask(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for ModifierMask {
    fn bitor_assign(&mut self, rhs: ModifierMask) {
        self.0 |= rhs.0;
    }
}

impl std::fmt::Display for ModifierMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.logical().is_empty() {
            return f.write_str("none");
        }
        let names: Vec<&str> = Modifier::ALL
            .iter()
            .filter(|m| self.has(**m))
            .map(|m| match m {
                Modifier::Shift => "Shift",
                Modifier::Control => "Control",
                Modifier::Alt => "Alt",
                Modifier::Meta => "Meta",
            })
            .collect();
        f.write_str(&names.join("+"))
    }
}

/// Tracks which physical modifier keys are currently held
///
/// Used by hook backends whose raw events carry no modifier flags. Each hook
/// instance owns its own tracker.
#[derive(Debug, Default, Clone)]
pub struct ModifierTracker {
    held: HashSet<KeyCode>,
}

impl ModifierTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a key press, returns the mask after the press
    pub fn press(&mut self, key: KeyCode) -> ModifierMask {
        if key.modifier().is_some() {
            self.held.insert(key);
        }
        self.mask()
    }

    /// Record a key release, returns the mask after the release
    pub fn release(&mut self, key: KeyCode) -> ModifierMask {
        self.held.remove(&key);
        self.mask()
    }

    pub fn mask(&self) -> ModifierMask {
        ModifierMask::from_held_keys(&self.held)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_round_trip() {
        for key in KeyCode::ALL {
            assert_eq!(KeyCode::from_name(key.name()), Some(*key));
        }
        assert_eq!(KeyCode::from_name("pageup"), None);
    }

    #[test]
    fn test_letter_digit_function_lookup() {
        assert_eq!(KeyCode::letter('a'), Some(KeyCode::A));
        assert_eq!(KeyCode::letter('Z'), Some(KeyCode::Z));
        assert_eq!(KeyCode::letter('é'), None);
        assert_eq!(KeyCode::digit('0'), Some(KeyCode::Num0));
        assert_eq!(KeyCode::digit('9'), Some(KeyCode::Num9));
        assert_eq!(KeyCode::function(1), Some(KeyCode::F1));
        assert_eq!(KeyCode::function(13), Some(KeyCode::F13));
        assert_eq!(KeyCode::function(24), Some(KeyCode::F24));
        assert_eq!(KeyCode::function(0), None);
        assert_eq!(KeyCode::function(25), None);
    }

    #[test]
    fn test_either_side_satisfies_modifier() {
        let required = Modifier::Control.mask() | Modifier::Shift.mask();
        let left = Modifier::Control.left_mask() | Modifier::Shift.right_mask();
        assert!(left.satisfies(required));
        assert!(!Modifier::Control.right_mask().satisfies(required));
    }

    #[test]
    fn test_extra_modifiers_do_not_block_match() {
        let required = Modifier::Meta.mask();
        let actual = Modifier::Meta.mask() | Modifier::Alt.left_mask();
        assert!(actual.satisfies(required));
        assert!(ModifierMask::NONE.satisfies(ModifierMask::NONE));
    }

    #[test]
    fn test_tracker_folds_sides() {
        let mut tracker = ModifierTracker::new();
        tracker.press(KeyCode::RightControl);
        let mask = tracker.press(KeyCode::K);
        assert!(mask.has(Modifier::Control));
        assert!(mask.contains(Modifier::Control.right_mask()));
        assert_eq!(mask.logical(), Modifier::Control.mask());

        let mask = tracker.release(KeyCode::RightControl);
        assert!(mask.is_empty());
    }

    #[test]
    fn test_without_key_keeps_other_side() {
        let both = Modifier::Shift.mask() | Modifier::Shift.left_mask() | Modifier::Shift.right_mask();
        let after = both.without_key(KeyCode::LeftShift);
        assert!(after.has(Modifier::Shift));
        assert!(after.contains(Modifier::Shift.mask()));

        let after = after.without_key(KeyCode::RightShift);
        assert!(after.is_empty());
        assert_eq!(after.without_key(KeyCode::K), after);
    }
}
