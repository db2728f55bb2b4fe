//! Bounded event timeline recorded during a user-module load.

use serde::Serialize;
use serde_json::{Map, Value};

/// Events past this count are dropped.
pub const MAX_TIMELINE_EVENTS: usize = 5000;

/// Strings longer than this are truncated when serialized.
pub const MAX_STRING_CHARS: usize = 2000;

/// Arrays and objects keep at most this many entries.
pub const MAX_COLLECTION_ENTRIES: usize = 200;

/// Nesting below this depth is replaced with a marker.
pub const MAX_DEPTH: usize = 5;

const MAX_DEPTH_MARKER: &str = "[MaxDepth]";

/// One recorded stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineEvent {
    /// RFC 3339 timestamp.
    pub at: String,
    pub stage: String,
    pub data: Value,
}

#[derive(Debug, Clone, Default)]
pub struct Timeline {
    events: Vec<TimelineEvent>,
    dropped: usize,
}

impl Timeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event; `data` is made serializable within the size caps.
    pub fn record(&mut self, stage: &str, data: Value) {
        if self.events.len() >= MAX_TIMELINE_EVENTS {
            self.dropped += 1;
            return;
        }
        self.events.push(TimelineEvent {
            at: chrono::Utc::now().to_rfc3339(),
            stage: stage.to_string(),
            data: to_serializable(&data),
        });
    }

    #[must_use]
    pub fn events(&self) -> &[TimelineEvent] {
        &self.events
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events discarded after the cap was reached.
    #[must_use]
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    #[must_use]
    pub fn into_events(self) -> Vec<TimelineEvent> {
        self.events
    }
}

/// Truncate `value` to `max` characters, appending how many were cut.
#[must_use]
pub fn truncate_string(value: &str, max: usize) -> String {
    let total = value.chars().count();
    if total <= max {
        return value.to_string();
    }
    let kept: String = value.chars().take(max).collect();
    format!("{kept}… [truncated {} chars]", total - max)
}

/// Copy `value` with strings, collections and nesting capped.
#[must_use]
pub fn to_serializable(value: &Value) -> Value {
    bounded(value, 0)
}

fn bounded(value: &Value, depth: usize) -> Value {
    if depth > MAX_DEPTH {
        return Value::String(MAX_DEPTH_MARKER.to_string());
    }
    match value {
        Value::String(s) => Value::String(truncate_string(s, MAX_STRING_CHARS)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .take(MAX_COLLECTION_ENTRIES)
                .map(|item| bounded(item, depth + 1))
                .collect(),
        ),
        Value::Object(entries) => {
            let mut out = Map::new();
            for (key, item) in entries.iter().take(MAX_COLLECTION_ENTRIES) {
                out.insert(key.clone(), bounded(item, depth + 1));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}
