//! Plugin system for the bundler.
//!
//! Rollup-style resolve, load and transform hooks. The virtual file system
//! that feeds the bundler from a document store is itself a plugin
//! ([`super::VirtualFsPlugin`]), as is stylesheet injection ([`super::StylePlugin`]).
//!
//! ## Example
//!
//! ```ignore
//! use livedoc_core::bundler::{HookResult, Plugin, TransformResult};
//!
//! struct Upper;
//!
//! impl Plugin for Upper {
//!     fn name(&self) -> &str { "upper" }
//!
//!     fn transform(&self, code: &str, id: &str) -> HookResult<Option<TransformResult>> {
//!         if id.ends_with(".txt") {
//!             return Ok(Some(TransformResult::code(format!("export default {:?};", code.to_uppercase()))));
//!         }
//!         Ok(None)
//!     }
//! }
//! ```

#![allow(clippy::unnecessary_literal_bound)]

use super::ResolutionError;
use crate::error::Error;
use crate::transpile::TranspileError;

/// Result type for plugin hooks.
pub type HookResult<T> = Result<T, PluginError>;

/// Error from a plugin.
#[derive(Debug)]
pub struct PluginError {
    /// Plugin name that caused the error.
    pub plugin: String,
    /// Hook that failed.
    pub hook: &'static str,
    /// Error message.
    pub message: String,
    /// Typed cause, kept so the bundler can surface it unchanged.
    pub cause: Option<PluginCause>,
}

/// Typed failure carried by a [`PluginError`].
#[derive(Debug)]
pub enum PluginCause {
    Resolution(ResolutionError),
    Transpile(TranspileError),
}

impl PluginError {
    pub fn new(plugin: impl Into<String>, hook: &'static str, message: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            hook,
            message: message.into(),
            cause: None,
        }
    }

    pub fn resolution(plugin: impl Into<String>, err: ResolutionError) -> Self {
        Self {
            plugin: plugin.into(),
            hook: "resolveId",
            message: err.to_string(),
            cause: Some(PluginCause::Resolution(err)),
        }
    }

    pub fn transpile(plugin: impl Into<String>, err: TranspileError) -> Self {
        Self {
            plugin: plugin.into(),
            hook: "transform",
            message: err.to_string(),
            cause: Some(PluginCause::Transpile(err)),
        }
    }
}

impl std::fmt::Display for PluginError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.plugin, self.hook, self.message)
    }
}

impl std::error::Error for PluginError {}

impl From<PluginError> for Error {
    fn from(err: PluginError) -> Self {
        match err.cause {
            Some(PluginCause::Resolution(e)) => Error::Resolution(e),
            Some(PluginCause::Transpile(e)) => Error::Transpile(e),
            None => Error::Bundle(super::BundleError {
                code: "PLUGIN_ERROR",
                message: format!("[{}] {}: {}", err.plugin, err.hook, err.message),
                path: None,
            }),
        }
    }
}

/// Result of resolving a module ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveIdResult {
    /// The resolved module ID.
    pub id: String,
    /// Left out of the bundle and imported by the host at run time.
    pub external: bool,
}

impl ResolveIdResult {
    pub fn resolved(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            external: false,
        }
    }

    pub fn external(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            external: true,
        }
    }
}

/// Result of loading a module.
#[derive(Debug, Clone)]
pub struct LoadResult {
    pub code: String,
}

impl LoadResult {
    pub fn code(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}

/// Result of transforming a module.
#[derive(Debug, Clone)]
pub struct TransformResult {
    pub code: String,
}

impl TransformResult {
    pub fn code(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}

/// The main plugin trait.
///
/// Every hook has a default that does nothing, so a plugin implements only
/// the hooks it cares about.
pub trait Plugin: Send + Sync {
    /// Plugin name for debugging and error messages.
    fn name(&self) -> &str;

    /// Resolve a module specifier to an ID.
    ///
    /// Return `Some(result)` to handle this resolution, or `None` to let
    /// the next plugin handle it. A specifier no plugin resolves is reported
    /// as unresolved.
    fn resolve_id(&self, _specifier: &str, _importer: Option<&str>) -> HookResult<Option<ResolveIdResult>> {
        Ok(None)
    }

    /// Load a module by ID.
    fn load(&self, _id: &str) -> HookResult<Option<LoadResult>> {
        Ok(None)
    }

    /// Transform module source code.
    ///
    /// Multiple plugins can transform the same module in sequence.
    fn transform(&self, _code: &str, _id: &str) -> HookResult<Option<TransformResult>> {
        Ok(None)
    }
}

/// Plugins in registration order.
#[derive(Default)]
pub struct PluginContainer {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginContainer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    /// First plugin returning `Some` wins.
    pub fn resolve_id(&self, specifier: &str, importer: Option<&str>) -> HookResult<Option<ResolveIdResult>> {
        for plugin in &self.plugins {
            if let Some(result) = plugin.resolve_id(specifier, importer)? {
                return Ok(Some(result));
            }
        }
        Ok(None)
    }

    /// First plugin returning `Some` wins.
    pub fn load(&self, id: &str) -> HookResult<Option<LoadResult>> {
        for plugin in &self.plugins {
            if let Some(result) = plugin.load(id)? {
                return Ok(Some(result));
            }
        }
        Ok(None)
    }

    /// Each plugin's output is passed to the next plugin.
    pub fn transform(&self, code: &str, id: &str) -> HookResult<String> {
        let mut current = code.to_string();
        for plugin in &self.plugins {
            if let Some(result) = plugin.transform(&current, id)? {
                tracing::trace!(target: "livedoc::bundler", plugin = plugin.name(), id, "transformed");
                current = result.code;
            }
        }
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Suffix(&'static str);

    impl Plugin for Suffix {
        fn name(&self) -> &str {
            self.0
        }

        fn resolve_id(&self, specifier: &str, _importer: Option<&str>) -> HookResult<Option<ResolveIdResult>> {
            if specifier.starts_with(self.0) {
                return Ok(Some(ResolveIdResult::resolved(format!("{specifier}#{}", self.0))));
            }
            Ok(None)
        }

        fn transform(&self, code: &str, _id: &str) -> HookResult<Option<TransformResult>> {
            Ok(Some(TransformResult::code(format!("{code}{}", self.0))))
        }
    }

    struct Failing;

    impl Plugin for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn load(&self, id: &str) -> HookResult<Option<LoadResult>> {
            Err(PluginError::new("failing", "load", format!("cannot load {id}")))
        }
    }

    #[test]
    fn test_container_chains_transforms_in_order() {
        let mut container = PluginContainer::new();
        container.add(Box::new(Suffix("a")));
        container.add(Box::new(Suffix("b")));
        assert_eq!(container.transform("x", "id").unwrap(), "xab");
    }

    #[test]
    fn test_container_resolve_first_wins() {
        let mut container = PluginContainer::new();
        container.add(Box::new(Suffix("lib")));
        container.add(Box::new(Suffix("li")));

        let resolved = container.resolve_id("lib/x", None).unwrap().unwrap();
        assert_eq!(resolved, ResolveIdResult::resolved("lib/x#lib"));
        assert!(container.resolve_id("other", None).unwrap().is_none());
    }

    #[test]
    fn test_plugin_error_into_crate_error() {
        let mut container = PluginContainer::new();
        container.add(Box::new(Failing));
        let err = container.load("a.js").unwrap_err();
        assert_eq!(err.to_string(), "[failing] load: cannot load a.js");

        let err: Error = err.into();
        assert_eq!(err.code(), "PLUGIN_ERROR");

        let err: Error = PluginError::resolution(
            "vfs",
            ResolutionError::new("./x", "a.js", vec!["x".to_string()]),
        )
        .into();
        assert_eq!(err.code(), "RESOLUTION_ERROR");
    }
}
