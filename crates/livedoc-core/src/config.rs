use crate::error::{Error, Result};
use crate::paths::normalize_slash_path;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

/// Folder used when nothing usable is configured.
pub const DEFAULT_COMPONENTS_FOLDER: &str = "Components";

/// Default auto-refresh debounce.
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// Runtime configuration for the livedoc CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Vault root; every document path is relative to it.
    pub vault: PathBuf,

    /// Whether to emit JSON logs.
    pub json_logs: bool,

    /// Verbosity level (0 = INFO, 1 = DEBUG, 2+ = TRACE).
    pub verbosity: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vault: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            json_logs: false,
            verbosity: 0,
        }
    }
}

impl Config {
    /// Create a new config rooted at the given vault.
    #[must_use]
    pub fn new(vault: PathBuf) -> Self {
        Self {
            vault,
            ..Default::default()
        }
    }

    /// Set verbosity level.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set JSON log output.
    #[must_use]
    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }

    /// Absolute path of the settings file.
    #[must_use]
    pub fn settings_path(&self) -> PathBuf {
        self.vault.join(crate::paths::SETTINGS_PATH)
    }
}

/// Persisted user settings.
///
/// Deserialization is lenient: unknown keys are ignored, missing keys take
/// defaults, and malformed folder lists or debounce values fall back instead
/// of failing the whole file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Legacy single-folder setting, mirrored from `components_folders[0]`.
    pub components_folder: String,

    /// Folders probed in order for a components index file. Absent in the
    /// file means empty, so `normalized` can fall back to the legacy field.
    #[serde(default, deserialize_with = "lenient_folders")]
    pub components_folders: Vec<String>,

    pub auto_refresh_enabled: bool,

    #[serde(deserialize_with = "lenient_debounce")]
    pub auto_refresh_debounce_ms: u64,

    pub debug_logging_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            components_folder: DEFAULT_COMPONENTS_FOLDER.to_string(),
            components_folders: vec![DEFAULT_COMPONENTS_FOLDER.to_string()],
            auto_refresh_enabled: true,
            auto_refresh_debounce_ms: DEFAULT_DEBOUNCE_MS,
            debug_logging_enabled: false,
        }
    }
}

impl Settings {
    /// Load settings from a JSON file, normalized. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse and normalize settings from JSON text.
    pub fn from_json(text: &str) -> std::result::Result<Self, serde_json::Error> {
        let parsed: Settings = serde_json::from_str(text)?;
        Ok(parsed.normalized())
    }

    /// Apply folder and debounce normalization.
    ///
    /// An empty folder list falls back to the legacy single folder, then to
    /// the default folder; the legacy field always mirrors the first entry.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        let candidates = if self.components_folders.is_empty() {
            vec![self.components_folder.clone()]
        } else {
            std::mem::take(&mut self.components_folders)
        };
        let mut folders = normalize_components_folders(&candidates);
        if folders.is_empty() {
            folders = normalize_components_folders(&[DEFAULT_COMPONENTS_FOLDER.to_string()]);
        }
        self.components_folder = folders[0].clone();
        self.components_folders = folders;
        self
    }

    #[must_use]
    pub fn with_components_folders(mut self, folders: Vec<String>) -> Self {
        self.components_folders = folders;
        self.normalized()
    }

    #[must_use]
    pub fn with_auto_refresh(mut self, enabled: bool) -> Self {
        self.auto_refresh_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.auto_refresh_debounce_ms = ms;
        self
    }

    #[must_use]
    pub fn with_debug_logging(mut self, enabled: bool) -> Self {
        self.debug_logging_enabled = enabled;
        self
    }
}

/// Normalize a debounce value: non-finite input yields `fallback`, anything
/// else is rounded and floored at zero.
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub fn normalize_debounce_ms(value: f64, fallback: u64) -> u64 {
    if !value.is_finite() {
        return fallback;
    }
    value.round().max(0.0) as u64
}

/// Normalize one components-folder entry (trim, then slash normalization).
#[must_use]
pub fn normalize_components_folder_value(value: &str) -> String {
    normalize_slash_path(value.trim())
}

/// Normalize a folder list: entries are normalized, empties dropped and
/// duplicates removed keeping first-seen order.
#[must_use]
pub fn normalize_components_folders(values: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        let folder = normalize_components_folder_value(value);
        if folder.is_empty() || out.contains(&folder) {
            continue;
        }
        out.push(folder);
    }
    out
}

fn lenient_folders<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    })
}

fn lenient_debounce<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let raw = match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        serde_json::Value::String(s) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
        _ => f64::NAN,
    };
    Ok(normalize_debounce_ms(raw, DEFAULT_DEBOUNCE_MS))
}
