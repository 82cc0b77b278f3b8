//! Configuration loading and management

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::hotkey::RestartPolicy;

const DATA_DIR_ENV: &str = "QUICKQUERY_DATA_DIR";
const MAX_RESTARTS_ENV: &str = "QUICKQUERY_MAX_RESTARTS";
const RESTART_BACKOFF_ENV: &str = "QUICKQUERY_RESTART_BACKOFF_MS";
const HOTKEY_ENV: &str = "QUICKQUERY_HOTKEY";

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// User settings, JSON
    pub settings_path: PathBuf,

    /// How the hotkey listener recovers from a dead hook
    pub restart_policy: RestartPolicy,

    /// Hotkey forced from the environment, wins over the settings file
    pub hotkey_override: Option<String>,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let data_dir = match lookup(DATA_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => {
                let home = lookup("HOME")
                    .or_else(|| lookup("USERPROFILE"))
                    .context("neither HOME nor USERPROFILE is set")?;
                PathBuf::from(home)
                    .join(".local")
                    .join("share")
                    .join("quickquery")
            }
        };
        let settings_path = data_dir.join("settings.json");

        let mut restart_policy = RestartPolicy::default();
        if let Some(raw) = lookup(MAX_RESTARTS_ENV) {
            restart_policy.max_restarts = raw
                .trim()
                .parse()
                .with_context(|| format!("invalid {MAX_RESTARTS_ENV}: {raw}"))?;
        }
        if let Some(raw) = lookup(RESTART_BACKOFF_ENV) {
            let ms: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("invalid {RESTART_BACKOFF_ENV}: {raw}"))?;
            restart_policy.backoff = Duration::from_millis(ms);
        }

        let hotkey_override = lookup(HOTKEY_ENV).filter(|s| !s.trim().is_empty());

        Ok(Self {
            data_dir,
            settings_path,
            restart_policy,
            hotkey_override,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("creating {}", self.data_dir.display()))?;
        Ok(())
    }

    /// Current settings with the environment override applied
    pub fn load_settings(&self) -> Settings {
        let mut settings = Settings::load(&self.settings_path);
        if let Some(hotkey) = &self.hotkey_override {
            settings.quick_query_hotkey = hotkey.clone();
        }
        settings
    }
}

/// User-editable settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Combo that captures the selection and looks it up
    pub quick_query_hotkey: String,

    /// Press the copy shortcut before reading the clipboard
    pub simulate_copy: bool,

    /// Wait after the copy shortcut before reading the clipboard
    pub copy_settle_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            quick_query_hotkey: "Command+Shift+D".to_string(),
            simulate_copy: true,
            copy_settle_ms: 100,
        }
    }
}

impl Settings {
    /// Read settings from `path`. Never fails: a missing file gives the
    /// defaults, a broken one gives the defaults and a warning.
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no settings file, using defaults");
                return Self::default();
            }
            Err(e) => {
                warn!(path = %path.display(), ?e, "unable to read settings, using defaults");
                return Self::default();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "malformed settings, using defaults");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    pub fn copy_settle(&self) -> Duration {
        Duration::from_millis(self.copy_settle_ms)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_config_defaults_under_home() {
        let config = Config::from_lookup(lookup(&[("HOME", "/home/me")])).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/home/me/.local/share/quickquery"));
        assert!(config.settings_path.ends_with("settings.json"));
        assert_eq!(config.restart_policy, RestartPolicy::default());
        assert_eq!(config.hotkey_override, None);
    }

    #[test]
    fn test_config_falls_back_to_userprofile() {
        let config = Config::from_lookup(lookup(&[("USERPROFILE", "/users/me")])).unwrap();
        assert!(config.data_dir.starts_with("/users/me"));
        assert!(Config::from_lookup(lookup(&[])).is_err());
    }

    #[test]
    fn test_config_env_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("HOME", "/home/me"),
            (DATA_DIR_ENV, "/tmp/qq"),
            (MAX_RESTARTS_ENV, "9"),
            (RESTART_BACKOFF_ENV, "250"),
            (HOTKEY_ENV, "Ctrl+Alt+L"),
        ]))
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/qq"));
        assert_eq!(config.restart_policy.max_restarts, 9);
        assert_eq!(config.restart_policy.backoff, Duration::from_millis(250));
        assert_eq!(config.hotkey_override.as_deref(), Some("Ctrl+Alt+L"));

        let bad = Config::from_lookup(lookup(&[("HOME", "/h"), (MAX_RESTARTS_ENV, "many")]));
        assert!(bad.is_err());
    }

    #[test]
    fn test_settings_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("settings.json"));
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.quick_query_hotkey, "Command+Shift+D");
    }

    #[test]
    fn test_settings_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = Settings {
            quick_query_hotkey: "F13".to_string(),
            simulate_copy: false,
            copy_settle_ms: 40,
        };
        settings.save(&path).unwrap();
        assert_eq!(Settings::load(&path), settings);
    }

    #[test]
    fn test_settings_partial_and_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        std::fs::write(&path, r#"{"quick_query_hotkey": "Alt+Q"}"#).unwrap();
        let settings = Settings::load(&path);
        assert_eq!(settings.quick_query_hotkey, "Alt+Q");
        assert!(settings.simulate_copy);
        assert_eq!(settings.copy_settle(), Duration::from_millis(100));

        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(Settings::load(&path), Settings::default());
    }

    #[test]
    fn test_hotkey_override_applies_to_settings() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_lookup(lookup(&[
            (DATA_DIR_ENV, dir.path().to_str().unwrap()),
            (HOTKEY_ENV, "Shift+F2"),
        ]))
        .unwrap();
        assert_eq!(config.load_settings().quick_query_hotkey, "Shift+F2");
    }
}
