use crate::bundler::{BundleError, ResolutionError};
use crate::transpile::TranspileError;
use std::path::PathBuf;
use thiserror::Error;

/// Core error type for livedoc operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Index file not found in {} (tried: {})", .folders.join(", "), .tried.join(", "))]
    IndexNotFound {
        folders: Vec<String>,
        tried: Vec<String>,
    },

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("Expected a single bundled chunk, got {count}")]
    BundleChunkCount { count: usize },

    #[error("Bundle has unresolved imports: {}", .imports.join(", "))]
    UnresolvedImport { imports: Vec<String> },

    #[error(transparent)]
    Transpile(#[from] TranspileError),

    #[error("Module evaluation failed: {message}")]
    ImportEvaluation {
        message: String,
        stack: Option<String>,
    },

    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error("Document store error at {path}: {message}")]
    Store { path: String, message: String },

    #[error("Failed to read config at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    #[must_use]
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    #[must_use]
    pub fn evaluation(message: impl Into<String>, stack: Option<String>) -> Self {
        Self::ImportEvaluation {
            message: message.into(),
            stack,
        }
    }

    #[must_use]
    pub fn store(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Stable machine-readable code for reports and JSON output.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::IndexNotFound { .. } => "INDEX_NOT_FOUND",
            Self::Resolution(_) => "RESOLUTION_ERROR",
            Self::BundleChunkCount { .. } => "BUNDLE_CHUNK_COUNT",
            Self::UnresolvedImport { .. } => "UNRESOLVED_IMPORT",
            Self::Transpile(e) => e.code,
            Self::ImportEvaluation { .. } => "IMPORT_EVALUATION_ERROR",
            Self::Bundle(e) => e.code,
            Self::Store { .. } => "STORE_ERROR",
            Self::ConfigRead { .. } => "CONFIG_READ_ERROR",
            Self::ConfigParse { .. } => "CONFIG_PARSE_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Other(_) => "ERROR",
        }
    }

    /// Stack or frame text attached to the error, if any.
    #[must_use]
    pub fn stack(&self) -> Option<&str> {
        match self {
            Self::ImportEvaluation { stack, .. } => stack.as_deref(),
            Self::Transpile(e) => e.diagnostics.first().map(String::as_str),
            _ => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_not_found_message() {
        let err = Error::IndexNotFound {
            folders: vec!["Components".to_string(), "Widgets".to_string()],
            tried: vec![
                "Components/index.js".to_string(),
                "Widgets/index.tsx".to_string(),
            ],
        };
        assert_eq!(err.code(), "INDEX_NOT_FOUND");
        assert_eq!(
            err.to_string(),
            "Index file not found in Components, Widgets (tried: Components/index.js, Widgets/index.tsx)"
        );
    }

    #[test]
    fn test_transpile_code_passes_through() {
        let err: Error = TranspileError::empty_output("x.tsx").into();
        assert_eq!(err.code(), "TRANSPILE_EMPTY_OUTPUT");
    }

    #[test]
    fn test_evaluation_stack() {
        let err = Error::evaluation("boom", Some("at <anonymous>:1".to_string()));
        assert_eq!(err.stack(), Some("at <anonymous>:1"));
        assert_eq!(err.to_string(), "Module evaluation failed: boom");
    }
}
