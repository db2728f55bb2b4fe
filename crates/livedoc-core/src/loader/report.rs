//! Diagnostic report persisted after every user-module load.

use super::timeline::{to_serializable, TimelineEvent};
use crate::error::Error;
use crate::paths::DIAGNOSTIC_REPORT_PATH;
use crate::store::DocumentStore;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Characters of the report shown by [`show_last_report`].
pub const REPORT_PREVIEW_CHARS: usize = 1800;

/// Message returned when no report was written yet.
pub const NO_REPORT_MESSAGE: &str =
    "No diagnostic report found yet. Refresh components to generate one.";

/// What started a load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadTrigger {
    Startup,
    Refresh,
    AutoRefresh,
}

impl LoadTrigger {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Refresh => "refresh",
            Self::AutoRefresh => "auto-refresh",
        }
    }
}

impl fmt::Display for LoadTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage a load finished in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadPhase {
    Bundle,
    Import,
    Success,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticReport {
    pub phase: LoadPhase,
    pub trigger: LoadTrigger,
    pub ok: bool,
    pub occurred_at: String,
    pub error_text: Option<String>,
    pub error_stack: Option<String>,
    pub error: Option<Value>,
    pub context: Value,
    pub timeline: Vec<TimelineEvent>,
}

impl DiagnosticReport {
    #[must_use]
    pub fn new(phase: LoadPhase, trigger: LoadTrigger, context: Value, timeline: Vec<TimelineEvent>) -> Self {
        Self {
            phase,
            trigger,
            ok: phase == LoadPhase::Success,
            occurred_at: chrono::Utc::now().to_rfc3339(),
            error_text: None,
            error_stack: None,
            error: None,
            context: to_serializable(&context),
            timeline,
        }
    }

    /// Attach a failure; the report becomes `ok: false`.
    #[must_use]
    pub fn with_error(mut self, error: &Error) -> Self {
        self.ok = false;
        self.error_text = Some(error.to_string());
        self.error_stack = error.stack().map(str::to_string);
        self.error = Some(to_serializable(&error_value(error)));
        self
    }

    /// Write the report to [`DIAGNOSTIC_REPORT_PATH`], returning the path.
    ///
    /// A failed write is logged and yields `None`.
    pub fn write(&self, store: &dyn DocumentStore) -> Option<String> {
        let text = match serde_json::to_string_pretty(self) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(target: "livedoc::loader", error = %e, "failed to serialize diagnostic report");
                return None;
            }
        };
        match store.write(DIAGNOSTIC_REPORT_PATH, &text) {
            Ok(()) => Some(DIAGNOSTIC_REPORT_PATH.to_string()),
            Err(e) => {
                tracing::warn!(
                    target: "livedoc::loader",
                    path = DIAGNOSTIC_REPORT_PATH,
                    error = %e,
                    "failed to write diagnostic report"
                );
                None
            }
        }
    }
}

/// Structured form of an error for the report.
fn error_value(error: &Error) -> Value {
    let mut value = json!({
        "code": error.code(),
        "message": error.to_string(),
    });
    match error {
        Error::IndexNotFound { folders, tried } => {
            value["folders"] = json!(folders);
            value["tried"] = json!(tried);
        }
        Error::Resolution(e) => {
            value["specifier"] = json!(e.specifier);
            value["importer"] = json!(e.importer);
            value["tried"] = json!(e.tried);
        }
        Error::UnresolvedImport { imports } => value["imports"] = json!(imports),
        Error::Transpile(e) => value["diagnostics"] = json!(e.diagnostics),
        Error::Bundle(e) => value["path"] = json!(e.path),
        _ => {}
    }
    if let Some(stack) = error.stack() {
        value["stack"] = json!(stack);
    }
    value
}

/// Preview of the last written report, or a hint when there is none.
#[must_use]
pub fn show_last_report(store: &dyn DocumentStore) -> String {
    if !store.exists(DIAGNOSTIC_REPORT_PATH) {
        return NO_REPORT_MESSAGE.to_string();
    }
    match store.read(DIAGNOSTIC_REPORT_PATH) {
        Ok(text) => preview(&text, REPORT_PREVIEW_CHARS),
        Err(e) => format!("Failed to read {DIAGNOSTIC_REPORT_PATH}: {e}"),
    }
}

fn preview(text: &str, max: usize) -> String {
    let total = text.chars().count();
    if total <= max {
        return text.to_string();
    }
    let head: String = text.chars().take(max).collect();
    format!("{head}\n... [truncated {} chars]", total - max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_trigger_serialization() {
        assert_eq!(serde_json::to_value(LoadTrigger::AutoRefresh).unwrap(), json!("auto-refresh"));
        assert_eq!(LoadTrigger::Startup.to_string(), "startup");
        assert_eq!(serde_json::to_value(LoadPhase::Import).unwrap(), json!("import"));
    }

    #[test]
    fn test_report_shape() {
        let error = Error::IndexNotFound {
            folders: vec!["Components".to_string()],
            tried: vec!["Components/index.js".to_string()],
        };
        let report = DiagnosticReport::new(LoadPhase::Bundle, LoadTrigger::Refresh, json!({"entry": null}), Vec::new())
            .with_error(&error);
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value["phase"], "bundle");
        assert_eq!(value["trigger"], "refresh");
        assert_eq!(value["ok"], false);
        assert_eq!(value["error"]["code"], "INDEX_NOT_FOUND");
        assert_eq!(value["error"]["tried"][0], "Components/index.js");
        assert!(value["errorText"].as_str().unwrap().contains("Index file not found"));
        assert!(value.get("occurredAt").is_some());
        assert!(value["timeline"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_write_and_show() {
        let store = MemoryStore::new();
        assert_eq!(show_last_report(&store), NO_REPORT_MESSAGE);

        let report = DiagnosticReport::new(LoadPhase::Success, LoadTrigger::Startup, json!({}), Vec::new());
        assert!(report.ok);
        assert_eq!(report.write(&store).as_deref(), Some(DIAGNOSTIC_REPORT_PATH));

        let shown = show_last_report(&store);
        assert!(shown.contains("\"phase\": \"success\""));
    }

    #[test]
    fn test_preview_truncation() {
        let text = "x".repeat(REPORT_PREVIEW_CHARS + 25);
        let shown = preview(&text, REPORT_PREVIEW_CHARS);
        assert!(shown.ends_with("\n... [truncated 25 chars]"));
        assert_eq!(preview("short", REPORT_PREVIEW_CHARS), "short");
    }
}
