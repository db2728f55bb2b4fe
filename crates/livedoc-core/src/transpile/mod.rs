//! Source-to-source transpilation for code fragments and component files.
//!
//! A [`Transpiler`] turns TypeScript/JSX into plain ES module code in three
//! ordered steps:
//!
//! 1. **Strip and lower** - type annotations are removed and markup is lowered
//!    to automatic-runtime calls.
//! 2. **Import rewrite** - bare imports become destructuring reads from the
//!    runtime module registry (`window._livedocModules["react"]`).
//! 3. **Scope rewrite** - free identifiers become scope-conditional reads so a
//!    fragment sees bindings published by earlier fragments.
//!
//! ## Usage
//!
//! ```ignore
//! use livedoc_core::transpile::{OxcTranspiler, Transpiler, TranspileOptions};
//!
//! let options = TranspileOptions::new()
//!     .with_rewrite_imports(true)
//!     .with_scope("page/Notes.md/0");
//! let code = OxcTranspiler::new().transpile("export const y = x + 1;", &options)?;
//! ```

mod oxc;
mod rewrite;

pub use oxc::OxcTranspiler;

use oxc_syntax::identifier::is_identifier_name;
use std::fmt;

/// Default global holding the runtime module registry.
pub const DEFAULT_MODULE_REGISTRY: &str = "window._livedocModules";

/// Default global function returning a scope node by id.
pub const DEFAULT_SCOPE_LOOKUP: &str = "window._livedocGetScope";

/// Default JSX import source for the automatic runtime.
pub const DEFAULT_JSX_IMPORT_SOURCE: &str = "react";

/// Identifiers that always resolve to the host page and are never rewritten.
pub const DEFAULT_HOST_GLOBALS: [&str; 9] = [
    "window",
    "self",
    "globalThis",
    "document",
    "console",
    "app",
    "_jsx",
    "_jsxs",
    "_Fragment",
];

/// Names of the runtime globals baked into generated code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeGlobals {
    /// Expression evaluating to the module registry object.
    pub module_registry: String,
    /// Expression evaluating to the scope lookup function.
    pub scope_lookup: String,
    /// Package the automatic JSX runtime is imported from.
    pub jsx_import_source: String,
    /// Identifiers left untouched by the scope rewrite.
    pub host_globals: Vec<String>,
}

impl Default for RuntimeGlobals {
    fn default() -> Self {
        Self {
            module_registry: DEFAULT_MODULE_REGISTRY.to_string(),
            scope_lookup: DEFAULT_SCOPE_LOOKUP.to_string(),
            jsx_import_source: DEFAULT_JSX_IMPORT_SOURCE.to_string(),
            host_globals: DEFAULT_HOST_GLOBALS.iter().map(|g| (*g).to_string()).collect(),
        }
    }
}

impl RuntimeGlobals {
    /// Whether `name` is a recognized host global.
    #[must_use]
    pub fn is_host_global(&self, name: &str) -> bool {
        self.host_globals.iter().any(|g| g == name)
    }

    /// Whether `source` is the automatic JSX runtime module.
    #[must_use]
    pub fn is_jsx_runtime(&self, source: &str) -> bool {
        source
            .strip_prefix(self.jsx_import_source.as_str())
            .is_some_and(|rest| rest == "/jsx-runtime" || rest == "/jsx-dev-runtime")
    }
}

/// Options for one transpile call.
#[derive(Debug, Clone)]
pub struct TranspileOptions {
    /// Virtual file name; its extension picks the source dialect.
    pub filename: String,
    /// Rewrite bare imports into registry reads.
    pub rewrite_imports: bool,
    /// Active scope id; when set, free identifiers are rewritten against it.
    pub scope: Option<String>,
    pub globals: RuntimeGlobals,
}

impl Default for TranspileOptions {
    fn default() -> Self {
        Self {
            filename: "fragment.tsx".to_string(),
            rewrite_imports: false,
            scope: None,
            globals: RuntimeGlobals::default(),
        }
    }
}

impl TranspileOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    #[must_use]
    pub fn with_rewrite_imports(mut self, rewrite: bool) -> Self {
        self.rewrite_imports = rewrite;
        self
    }

    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    #[must_use]
    pub fn with_globals(mut self, globals: RuntimeGlobals) -> Self {
        self.globals = globals;
        self
    }
}

/// Error during transpilation.
#[derive(Debug, Clone)]
pub struct TranspileError {
    /// Error code.
    pub code: &'static str,
    /// Human-readable error message.
    pub message: String,
    /// Parser or transformer diagnostics, one per line.
    pub diagnostics: Vec<String>,
}

impl TranspileError {
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            diagnostics: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: Vec<String>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    #[must_use]
    pub fn parse_error(filename: &str, diagnostics: Vec<String>) -> Self {
        Self::new(
            "TRANSPILE_PARSE_ERROR",
            format!("Failed to parse {filename}"),
        )
        .with_diagnostics(diagnostics)
    }

    #[must_use]
    pub fn transform_error(filename: &str, diagnostics: Vec<String>) -> Self {
        Self::new(
            "TRANSPILE_TRANSFORM_ERROR",
            format!("Failed to transform {filename}"),
        )
        .with_diagnostics(diagnostics)
    }

    #[must_use]
    pub fn empty_output(filename: &str) -> Self {
        Self::new(
            "TRANSPILE_EMPTY_OUTPUT",
            format!("Transpiled output of {filename} is empty"),
        )
    }
}

impl fmt::Display for TranspileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        for diag in &self.diagnostics {
            write!(f, "\n  - {diag}")?;
        }
        Ok(())
    }
}

impl std::error::Error for TranspileError {}

/// Source-to-source transpiler.
///
/// Implementations are `Send + Sync` so one instance can serve the bundler and
/// every fragment evaluation.
pub trait Transpiler: Send + Sync {
    /// Backend name (e.g. "oxc").
    fn name(&self) -> &'static str;

    /// Transform `source` according to `options`.
    fn transpile(&self, source: &str, options: &TranspileOptions) -> Result<String, TranspileError>;
}

/// Wrap an inline expression fragment as a module whose default export
/// evaluates it.
#[must_use]
pub fn wrap_inline_expression(code: &str) -> String {
    format!("export default () => {code}")
}

/// Wrap markup as a module whose default export is a component factory.
#[must_use]
pub fn wrap_markup_factory(markup: &str) -> String {
    format!("export default () => {{ return (<>{markup}</>); }};")
}

/// JSON-quote a string for use as a JS string literal.
pub(crate) fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{value}\""))
}

/// One property of a destructuring read: `a`, `a: b` or `"a-b": b`.
pub(crate) fn destructure_property(imported: &str, local: &str) -> String {
    if !is_identifier_name(imported) {
        format!("{}: {local}", js_string(imported))
    } else if imported == local {
        local.to_string()
    } else {
        format!("{imported}: {local}")
    }
}
