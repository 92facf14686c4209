//! Settings management

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Runtime settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub script: ScriptSettings,
    /// `tracing` filter directive, e.g. `info` or `tether_script=debug`.
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptSettings {
    /// Global object the host classes are published under.
    pub namespace: String,
    /// Raise a `TypeError` when a bound method rejects its arguments instead
    /// of returning `undefined`.
    pub strict_calls: bool,
    pub memory_limit: Option<usize>,
    pub gc_threshold: Option<usize>,
    pub max_stack_size: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            script: ScriptSettings::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for ScriptSettings {
    fn default() -> Self {
        Self {
            namespace: "godot".to_string(),
            strict_calls: cfg!(debug_assertions),
            memory_limit: None,
            gc_threshold: None,
            max_stack_size: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Settings {
    /// Loads settings from a JSON file. A missing file yields defaults;
    /// missing fields take their default values.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let shown = path.display().to_string();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %shown, "settings file not found, using defaults");
                return Ok(Self::default());
            }
            Err(source) => return Err(SettingsError::Io { path: shown, source }),
        };
        Self::from_json(&text).map_err(|source| SettingsError::Parse { path: shown, source })
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let settings = Settings::from_json(r#"{ "script": { "namespace": "engine" } }"#).unwrap();
        assert_eq!(settings.script.namespace, "engine");
        assert_eq!(settings.script.strict_calls, cfg!(debug_assertions));
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.script.memory_limit, None);
    }

    #[test]
    fn json_round_trip() {
        let mut settings = Settings::default();
        settings.script.memory_limit = Some(64 * 1024 * 1024);
        settings.log_level = "debug".to_string();

        let text = settings.to_json().unwrap();
        assert_eq!(Settings::from_json(&text).unwrap(), settings);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let path = std::env::temp_dir().join("tether-settings-that-does-not-exist.json");
        assert_eq!(Settings::load(&path).unwrap(), Settings::default());
    }

    #[test]
    fn malformed_file_is_reported() {
        let path = std::env::temp_dir().join(format!("tether-settings-bad-{}.json", std::process::id()));
        std::fs::write(&path, "{ not json").unwrap();
        let result = Settings::load(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(SettingsError::Parse { .. })));
    }
}
