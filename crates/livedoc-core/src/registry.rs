//! Runtime module registry.
//!
//! Transpiled code reads bare imports from one registry keyed by the literal
//! import source (`window._livedocModules["react"]`). The registry is created
//! once by the host and shared by reference with the loader and the runtime.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Import sources a host page provides to every fragment and component.
pub const HOST_RUNTIME_MODULES: [&str; 6] = [
    "react",
    "react/jsx-runtime",
    "react-dom",
    "react-dom/client",
    "obsidian",
    "livedoc",
];

/// Export map of one loaded module, keyed by export name.
pub type Exports<V> = BTreeMap<String, V>;

/// Shared mapping from import source to its export object.
pub struct ModuleRegistry<V> {
    modules: Arc<RwLock<BTreeMap<String, V>>>,
}

impl<V> Clone for ModuleRegistry<V> {
    fn clone(&self) -> Self {
        Self {
            modules: Arc::clone(&self.modules),
        }
    }
}

impl<V> Default for ModuleRegistry<V> {
    fn default() -> Self {
        Self {
            modules: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }
}

impl<V> std::fmt::Debug for ModuleRegistry<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.sources()).finish()
    }
}

impl<V> ModuleRegistry<V> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the export object for an import source.
    pub fn insert(&self, source: impl Into<String>, module: V) {
        self.modules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(source.into(), module);
    }

    pub fn remove(&self, source: &str) -> Option<V> {
        self.modules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(source)
    }

    #[must_use]
    pub fn contains(&self, source: &str) -> bool {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(source)
    }

    /// Registered import sources, sorted.
    #[must_use]
    pub fn sources(&self) -> Vec<String> {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone> ModuleRegistry<V> {
    #[must_use]
    pub fn get(&self, source: &str) -> Option<V> {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(source)
            .cloned()
    }
}
