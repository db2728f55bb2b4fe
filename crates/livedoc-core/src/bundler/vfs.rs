//! Virtual file system plugin: serves modules from a document store.

use super::{HookResult, LoadResult, Plugin, PluginError, ResolutionError, ResolveIdResult, TransformResult};
use crate::paths::{
    extension, from_module_id, is_relative, is_runtime_external, resolve_relative, to_module_id,
    SOURCE_EXTENSIONS, VAULT_MODULE_PREFIX,
};
use crate::scope::ROOT_SCOPE_ID;
use crate::store::DocumentStore;
use crate::transpile::{RuntimeGlobals, TranspileOptions, Transpiler};
use std::sync::Arc;

const NAME: &str = "virtual-fs";

/// Resolves, loads and transforms vault modules for the bundler.
pub struct VirtualFsPlugin {
    store: Arc<dyn DocumentStore>,
    transpiler: Arc<dyn Transpiler>,
    globals: RuntimeGlobals,
}

impl VirtualFsPlugin {
    pub fn new(store: Arc<dyn DocumentStore>, transpiler: Arc<dyn Transpiler>) -> Self {
        Self {
            store,
            transpiler,
            globals: RuntimeGlobals::default(),
        }
    }

    #[must_use]
    pub fn with_globals(mut self, globals: RuntimeGlobals) -> Self {
        self.globals = globals;
        self
    }

    /// Probe the exact path, then each source extension appended, in order.
    fn probe(&self, specifier: &str, importer_path: &str) -> HookResult<String> {
        let resolved = resolve_relative(importer_path, specifier);
        let candidates: Vec<String> = std::iter::once(resolved.clone())
            .chain(SOURCE_EXTENSIONS.iter().map(|ext| format!("{resolved}{ext}")))
            .collect();

        for candidate in &candidates {
            let exists = self.store.exists(candidate);
            tracing::trace!(target: "livedoc::bundler", candidate = %candidate, exists, "resolve candidate");
            if exists {
                return Ok(candidate.clone());
            }
        }

        tracing::debug!(
            target: "livedoc::bundler",
            specifier,
            importer = importer_path,
            "relative import not found"
        );
        Err(PluginError::resolution(
            NAME,
            ResolutionError::new(specifier, importer_path, candidates),
        ))
    }
}

impl Plugin for VirtualFsPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn resolve_id(&self, specifier: &str, importer: Option<&str>) -> HookResult<Option<ResolveIdResult>> {
        if specifier.starts_with(VAULT_MODULE_PREFIX) {
            return Ok(Some(ResolveIdResult::resolved(specifier)));
        }
        let Some(importer) = importer else {
            return Ok(Some(ResolveIdResult::resolved(to_module_id(specifier))));
        };
        if is_runtime_external(specifier) {
            return Ok(Some(ResolveIdResult::external(specifier)));
        }
        if is_relative(specifier) {
            if let Some(importer_path) = from_module_id(importer) {
                let path = self.probe(specifier, importer_path)?;
                return Ok(Some(ResolveIdResult::resolved(to_module_id(&path))));
            }
        }
        Ok(None)
    }

    fn load(&self, id: &str) -> HookResult<Option<LoadResult>> {
        let Some(path) = from_module_id(id) else {
            return Ok(None);
        };
        if !self.store.exists(path) {
            return Ok(None);
        }
        let content = self
            .store
            .read(path)
            .map_err(|e| PluginError::new(NAME, "load", e.to_string()))?;
        Ok(Some(LoadResult::code(content)))
    }

    /// Stylesheets are left to [`super::StylePlugin`].
    fn transform(&self, code: &str, id: &str) -> HookResult<Option<TransformResult>> {
        let Some(path) = from_module_id(id) else {
            return Ok(None);
        };
        if extension(path).as_deref() == Some("css") {
            return Ok(None);
        }

        // Free identifiers in component files resolve through the root scope.
        let options = TranspileOptions::new()
            .with_filename(path)
            .with_rewrite_imports(true)
            .with_scope(ROOT_SCOPE_ID)
            .with_globals(self.globals.clone());
        let code = self
            .transpiler
            .transpile(code, &options)
            .map_err(|e| PluginError::transpile(NAME, e))?;
        Ok(Some(TransformResult::code(code)))
    }
}
