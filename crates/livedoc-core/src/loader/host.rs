//! Collaborators the loader runs against: the module host that turns code
//! into an export map, and the sink for user-visible notices.

use crate::bundler::analyze;
use crate::error::{Error, Result};
use crate::registry::{Exports, ModuleRegistry};
use futures::future::BoxFuture;
use regex_lite::Regex;
use rustc_hash::FxHashMap as HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// Runtime able to evaluate an ES module given as source text.
pub trait ModuleHost: Send + Sync {
    /// Runtime value of an exported binding.
    type Value: Clone + Send + Sync + 'static;

    /// Register `code` as a loadable resource and return its URL.
    fn create_object_url(&self, code: &str) -> String;

    /// Import the module at `url` and return its exports.
    fn import<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Exports<Self::Value>>>;

    /// Release a URL returned by [`ModuleHost::create_object_url`].
    fn revoke_object_url(&self, url: &str);

    /// Call a function value without arguments.
    fn call<'a>(&'a self, function: &'a Self::Value) -> BoxFuture<'a, Result<Self::Value>>;

    /// Text shown for a value.
    fn display(&self, value: &Self::Value) -> String;
}

/// Destination for short user-visible messages.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, message: &str);
}

/// Notices written to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&self, message: &str) {
        tracing::info!(target: "livedoc::notice", "{message}");
    }
}

/// Host that links modules without executing them.
///
/// Each export maps to the expression the module binds it to, which is
/// enough to inspect what a bundle provides.
#[derive(Debug, Default)]
pub struct StaticHost {
    next_url: AtomicU64,
    objects: Mutex<HashMap<String, String>>,
    registry: Option<(ModuleRegistry<String>, Regex)>,
}

impl StaticHost {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject modules reading sources that `registry` does not hold.
    /// `global` is the expression generated code reads the registry from.
    #[must_use]
    pub fn with_registry(mut self, registry: ModuleRegistry<String>, global: &str) -> Self {
        let pattern = format!(r#"{}\["((?:[^"\\]|\\.)*)"\]"#, regex_lite::escape(global));
        match Regex::new(&pattern) {
            Ok(reads) => self.registry = Some((registry, reads)),
            Err(e) => tracing::warn!(target: "livedoc::loader", error = %e, "registry pattern rejected"),
        }
        self
    }

    /// URLs created and not yet revoked.
    #[must_use]
    pub fn live_urls(&self) -> usize {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl ModuleHost for StaticHost {
    type Value = String;

    fn create_object_url(&self, code: &str) -> String {
        let n = self.next_url.fetch_add(1, Ordering::Relaxed);
        let url = format!("blob:livedoc/{n}");
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.clone(), code.to_string());
        url
    }

    fn import<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Exports<String>>> {
        Box::pin(async move {
            let code = self
                .objects
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(url)
                .cloned()
                .ok_or_else(|| Error::evaluation(format!("Failed to fetch dynamically imported module: {url}"), None))?;
            if let Some((registry, reads)) = &self.registry {
                for read in reads.captures_iter(&code) {
                    let source = &read[1];
                    if !registry.contains(source) {
                        return Err(Error::evaluation(format!("Module \"{source}\" is not registered"), None));
                    }
                }
            }
            let analysis = analyze(&code, url).map_err(|e| Error::evaluation(e.message, None))?;
            Ok(analysis.exports.into_iter().collect())
        })
    }

    fn revoke_object_url(&self, url: &str) {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(url);
    }

    /// Nothing is executed: the call is rendered as an expression.
    fn call<'a>(&'a self, function: &'a String) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move { Ok(format!("{function}()")) })
    }

    fn display(&self, value: &String) -> String {
        value.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_host_exports() {
        let host = StaticHost::new();
        let url = host.create_object_url("const a = 1;\nexport { a as Answer };\nexport default 2;");
        assert!(url.starts_with("blob:livedoc/"));

        let exports = host.import(&url).await.unwrap();
        assert_eq!(exports.get("Answer").map(String::as_str), Some("a"));
        assert!(exports.contains_key("default"));

        host.revoke_object_url(&url);
        assert_eq!(host.live_urls(), 0);
        let err = host.import(&url).await.unwrap_err();
        assert_eq!(err.code(), "IMPORT_EVALUATION_ERROR");
    }

    #[tokio::test]
    async fn test_static_host_checks_registry() {
        let registry = ModuleRegistry::new();
        registry.insert("react", "React".to_string());
        let host = StaticHost::new().with_registry(registry.clone(), "window._livedocModules");

        let url = host.create_object_url("const { useState } = window._livedocModules[\"react\"];\nexport default useState;");
        assert!(host.import(&url).await.is_ok());

        let url = host.create_object_url("const { jsx } = window._livedocModules[\"react/jsx-runtime\"];\nexport default jsx;");
        let err = host.import(&url).await.unwrap_err();
        assert!(err.to_string().contains("react/jsx-runtime"));

        registry.insert("react/jsx-runtime", "jsx".to_string());
        assert!(host.import(&url).await.is_ok());
    }

    #[tokio::test]
    async fn test_static_host_parse_failure() {
        let host = StaticHost::new();
        let url = host.create_object_url("export const = ;");
        assert!(matches!(host.import(&url).await, Err(Error::ImportEvaluation { .. })));
    }
}
