//! Thread-safe hotkey registry
//!
//! Maps canonical combo strings to their parsed spec and callback, and
//! remembers which combos have fired and are still held. One lock guards
//! both collections; callbacks are cloned out and never run under it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::keys::{KeyCode, ModifierMask};
use super::parser::{canonical_combo, parse_combo, HotkeySpec, ParseError};

/// Action bound to a hotkey
pub type HotkeyCallback = Arc<dyn Fn() + Send + Sync>;

struct Registration {
    spec: HotkeySpec,
    callback: HotkeyCallback,
}

/// A combo that just fired, returned by [`HotkeyRegistry::try_fire`]
#[derive(Clone)]
pub struct FiredHotkey {
    pub combo: String,
    pub callback: HotkeyCallback,
}

impl std::fmt::Debug for FiredHotkey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FiredHotkey")
            .field("combo", &self.combo)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct RegistryState {
    hotkeys: HashMap<String, Registration>,
    /// Combos that fired and have not been released yet
    active: HashSet<String>,
}

#[derive(Default)]
pub struct HotkeyRegistry {
    state: Mutex<RegistryState>,
}

impl HotkeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and register a combo, replacing any previous binding.
    ///
    /// Re-registering re-arms the combo. On a parse error nothing changes.
    pub fn register(&self, combo: &str, callback: HotkeyCallback) -> Result<HotkeySpec, ParseError> {
        let spec = parse_combo(combo)?;
        let key = spec.combo().to_string();

        let mut state = self.state.lock();
        state.active.remove(&key);
        state.hotkeys.insert(
            key,
            Registration {
                spec: spec.clone(),
                callback,
            },
        );
        Ok(spec)
    }

    /// Remove a combo, returns whether it was registered
    pub fn unregister(&self, combo: &str) -> bool {
        let key = canonical_combo(combo);
        let mut state = self.state.lock();
        state.active.remove(&key);
        state.hotkeys.remove(&key).is_some()
    }

    pub fn unregister_all(&self) {
        let mut state = self.state.lock();
        state.hotkeys.clear();
        state.active.clear();
    }

    /// Mark every combo satisfied by this key-down as active.
    ///
    /// Only combos that were not already active are returned, so OS
    /// auto-repeat of a held key fires at most once.
    pub fn try_fire(&self, actual: ModifierMask, pressed: KeyCode) -> Vec<FiredHotkey> {
        let mut state = self.state.lock();
        let RegistryState { hotkeys, active } = &mut *state;

        let mut fired = Vec::new();
        for (combo, registration) in hotkeys.iter() {
            if registration.spec.trigger() != pressed {
                continue;
            }
            if !actual.satisfies(registration.spec.required()) {
                continue;
            }
            if active.insert(combo.clone()) {
                fired.push(FiredHotkey {
                    combo: combo.clone(),
                    callback: Arc::clone(&registration.callback),
                });
            }
        }
        fired
    }

    /// Re-arm every combo that uses `released` as trigger or modifier
    pub fn release(&self, released: KeyCode) {
        let mut state = self.state.lock();
        let RegistryState { hotkeys, active } = &mut *state;

        for (combo, registration) in hotkeys.iter() {
            if registration.spec.is_released_by(released) && active.remove(combo) {
                debug!(combo = %combo, key = %released, "hotkey re-armed");
            }
        }
    }

    /// Forget every active combo, e.g. after the hook went away
    pub fn clear_active(&self) {
        self.state.lock().active.clear();
    }

    #[cfg(test)]
    pub fn is_active(&self, combo: &str) -> bool {
        self.state.lock().active.contains(&canonical_combo(combo))
    }

    pub fn len(&self) -> usize {
        self.state.lock().hotkeys.len()
    }

    /// Snapshot of the registered combos
    pub fn combos(&self) -> Vec<String> {
        self.state.lock().hotkeys.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::hotkey::keys::Modifier;

    fn noop() -> HotkeyCallback {
        Arc::new(|| {})
    }

    fn counting() -> (HotkeyCallback, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        let callback: HotkeyCallback = Arc::new(move || {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        (callback, count)
    }

    fn control() -> ModifierMask {
        Modifier::Control.mask() | Modifier::Control.left_mask()
    }

    #[test]
    fn test_auto_repeat_fires_once() {
        let registry = HotkeyRegistry::new();
        registry.register("Control+K", noop()).unwrap();

        assert_eq!(registry.try_fire(control(), KeyCode::K).len(), 1);
        assert!(registry.try_fire(control(), KeyCode::K).is_empty());
        assert!(registry.is_active("control+k"));
    }

    #[test]
    fn test_release_rearms() {
        let registry = HotkeyRegistry::new();
        registry.register("Control+K", noop()).unwrap();

        assert_eq!(registry.try_fire(control(), KeyCode::K).len(), 1);
        registry.release(KeyCode::K);
        assert!(!registry.is_active("Control+K"));
        assert_eq!(registry.try_fire(control(), KeyCode::K).len(), 1);
    }

    #[test]
    fn test_modifier_release_rearms_either_side() {
        let registry = HotkeyRegistry::new();
        registry.register("Ctrl+K", noop()).unwrap();

        registry.try_fire(control(), KeyCode::K);
        registry.release(KeyCode::RightControl);
        assert!(!registry.is_active("ctrl+k"));
    }

    #[test]
    fn test_unrelated_release_keeps_active() {
        let registry = HotkeyRegistry::new();
        registry.register("Ctrl+K", noop()).unwrap();

        registry.try_fire(control(), KeyCode::K);
        registry.release(KeyCode::LeftShift);
        registry.release(KeyCode::J);
        assert!(registry.is_active("ctrl+k"));
    }

    #[test]
    fn test_missing_modifier_never_fires() {
        let registry = HotkeyRegistry::new();
        registry.register("Command+Shift+D", noop()).unwrap();

        assert!(registry.try_fire(Modifier::Meta.mask(), KeyCode::D).is_empty());
        assert!(registry.try_fire(ModifierMask::NONE, KeyCode::D).is_empty());
        let both = Modifier::Meta.left_mask() | Modifier::Shift.right_mask();
        assert_eq!(registry.try_fire(both, KeyCode::D).len(), 1);
    }

    #[test]
    fn test_unregister_all_silences_everything() {
        let registry = HotkeyRegistry::new();
        registry.register("Ctrl+K", noop()).unwrap();
        registry.register("F13", noop()).unwrap();
        registry.try_fire(control(), KeyCode::K);

        registry.unregister_all();
        assert_eq!(registry.len(), 0);
        assert!(registry.try_fire(control(), KeyCode::K).is_empty());
        assert!(registry.try_fire(ModifierMask::NONE, KeyCode::F13).is_empty());
    }

    #[test]
    fn test_unregister_is_case_insensitive() {
        let registry = HotkeyRegistry::new();
        registry.register("Ctrl+K", noop()).unwrap();

        assert!(registry.unregister("CTRL + k"));
        assert!(!registry.unregister("Ctrl+K"));
        assert!(registry.try_fire(control(), KeyCode::K).is_empty());
    }

    #[test]
    fn test_reregister_replaces_callback_and_rearms() {
        let registry = HotkeyRegistry::new();
        let (first, first_count) = counting();
        let (second, second_count) = counting();

        registry.register("Ctrl+K", first).unwrap();
        for fired in registry.try_fire(control(), KeyCode::K) {
            (fired.callback)();
        }

        registry.register("ctrl+k", second).unwrap();
        assert_eq!(registry.len(), 1);
        for fired in registry.try_fire(control(), KeyCode::K) {
            (fired.callback)();
        }

        assert_eq!(first_count.load(Ordering::SeqCst), 1);
        assert_eq!(second_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_parse_failure_leaves_registry_untouched() {
        let registry = HotkeyRegistry::new();
        registry.register("Ctrl+K", noop()).unwrap();

        assert!(registry.register("Shift+A+B", noop()).is_err());
        assert!(registry.register("", noop()).is_err());
        assert_eq!(registry.combos(), vec!["ctrl+k".to_string()]);
    }

    #[test]
    fn test_overlapping_combos_all_fire_in_any_registration_order() {
        let orders: [[&str; 3]; 3] = [
            ["K", "Ctrl+K", "Ctrl+Shift+K"],
            ["Ctrl+Shift+K", "K", "Ctrl+K"],
            ["Ctrl+K", "Ctrl+Shift+K", "K"],
        ];
        let actual = control() | Modifier::Shift.mask();

        for order in orders {
            let registry = HotkeyRegistry::new();
            for combo in order {
                registry.register(combo, noop()).unwrap();
            }
            let mut fired: Vec<String> = registry
                .try_fire(actual, KeyCode::K)
                .into_iter()
                .map(|f| f.combo)
                .collect();
            fired.sort();
            assert_eq!(fired, vec!["ctrl+k", "ctrl+shift+k", "k"]);
        }
    }
}
