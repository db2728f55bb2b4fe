//! Virtual-module bundler.
//!
//! Bundles a components folder, read through a document store, into one
//! loadable ES module chunk.
//!
//! ## Usage
//!
//! ```ignore
//! use livedoc_core::bundler::{Bundler, StylePlugin, VirtualFsPlugin};
//!
//! let bundler = Bundler::new()
//!     .plugin(Box::new(VirtualFsPlugin::new(store, transpiler)))
//!     .plugin(Box::new(StylePlugin));
//! let result = bundler.bundle("Components/index.tsx")?;
//! ```
//!
//! ## Architecture
//!
//! 1. **Resolution** - plugins map specifiers to module ids or mark them external
//! 2. **Graph** - breadth-first walk from the entry: load, transform, analyze
//! 3. **Chunks** - dynamic imports are inlined, so one chunk is expected
//! 4. **Emit** - each module becomes a `__modules` wrapper; the entry's
//!    exports are re-exported from the chunk

mod chunks;
mod emit;
mod graph;
mod link;
mod plugin;
mod style;
mod vfs;

pub use chunks::{Chunk, ChunkGraph, ChunkId};
pub use emit::emit_chunk;
pub use graph::{Module, ModuleGraph, ModuleId, ResolvedEdge};
pub use link::{analyze, LinkItem, ModuleAnalysis};
pub use plugin::{
    HookResult, LoadResult, Plugin, PluginCause, PluginContainer, PluginError, ResolveIdResult,
    TransformResult,
};
pub use style::{style_injection, StylePlugin};
pub use vfs::VirtualFsPlugin;

use crate::error::{Error, Result};
use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
use std::collections::VecDeque;

/// Bundle options.
#[derive(Debug, Clone)]
pub struct BundleOptions {
    /// Inline internal dynamic imports into the entry chunk.
    pub inline_dynamic_imports: bool,
}

impl Default for BundleOptions {
    fn default() -> Self {
        Self {
            inline_dynamic_imports: true,
        }
    }
}

/// Bundle result.
#[derive(Debug, Clone)]
pub struct BundleResult {
    /// The single chunk, as ES module code.
    pub code: String,
    /// Module ids included in the chunk.
    pub modules: Vec<String>,
    /// Specifiers left to the host's own module loader.
    pub externals: Vec<String>,
    /// BLAKE3 hash of `code`.
    pub hash: String,
}

/// Bundler error.
#[derive(Debug, Clone)]
pub struct BundleError {
    pub code: &'static str,
    pub message: String,
    pub path: Option<String>,
}

impl std::fmt::Display for BundleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(path) = &self.path {
            write!(f, "{}: {} ({})", self.code, self.message, path)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

impl std::error::Error for BundleError {}

/// A relative import with no existing candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionError {
    pub code: &'static str,
    pub specifier: String,
    /// Vault path of the importing module.
    pub importer: String,
    /// Every candidate path probed, in probe order.
    pub tried: Vec<String>,
}

impl ResolutionError {
    pub fn new(specifier: impl Into<String>, importer: impl Into<String>, tried: Vec<String>) -> Self {
        Self {
            code: "RESOLUTION_ERROR",
            specifier: specifier.into(),
            importer: importer.into(),
            tried,
        }
    }
}

impl std::fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tried: Vec<String> = self.tried.iter().map(|t| format!("\"{t}\"")).collect();
        write!(
            f,
            "Unable to resolve import \"{}\" from \"{}\". Tried {}.",
            self.specifier,
            self.importer,
            tried.join(", ")
        )
    }
}

impl std::error::Error for ResolutionError {}

/// The main bundler.
#[derive(Default)]
pub struct Bundler {
    plugins: PluginContainer,
    options: BundleOptions,
}

impl Bundler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_options(mut self, options: BundleOptions) -> Self {
        self.options = options;
        self
    }

    /// Add a plugin to the bundler.
    #[must_use]
    pub fn plugin(mut self, plugin: Box<dyn Plugin>) -> Self {
        self.plugins.add(plugin);
        self
    }

    /// Bundle from an entry specifier.
    ///
    /// Fails unless the build yields exactly one chunk with no unresolved
    /// imports.
    pub fn bundle(&self, entry: &str) -> Result<BundleResult> {
        let build = self.build_graph(entry)?;
        let graph = &build.graph;

        let chunk_graph = ChunkGraph::from_module_graph(graph, build.entry, self.options.inline_dynamic_imports);
        if chunk_graph.len() != 1 {
            return Err(Error::BundleChunkCount {
                count: chunk_graph.len(),
            });
        }
        if !build.unresolved.is_empty() {
            return Err(Error::UnresolvedImport {
                imports: build.unresolved,
            });
        }
        let Some(main) = chunk_graph.main_chunk() else {
            return Err(Error::BundleChunkCount { count: 0 });
        };

        let modules: Vec<String> = main
            .modules
            .iter()
            .filter_map(|&index| graph.get(index).map(|m| m.id.clone()))
            .collect();

        let code = emit_chunk(graph, &main.modules, build.entry);

        let hash = livedoc_util::hash::content_hash(code.as_bytes());
        tracing::debug!(
            target: "livedoc::bundler",
            entry,
            modules = modules.len(),
            externals = build.externals.len(),
            bytes = code.len(),
            "bundled"
        );

        Ok(BundleResult {
            code,
            modules,
            externals: build.externals,
            hash,
        })
    }

    /// Walk the module graph breadth-first from the entry.
    fn build_graph(&self, entry: &str) -> Result<GraphBuild> {
        let entry_id = match self.plugins.resolve_id(entry, None)? {
            Some(resolved) if !resolved.external => resolved.id,
            _ => {
                return Err(Error::Bundle(BundleError {
                    code: "BUNDLE_ENTRY_NOT_FOUND",
                    message: "No plugin resolved the entry".to_string(),
                    path: Some(entry.to_string()),
                }))
            }
        };

        let mut graph = ModuleGraph::new();
        let mut edges: HashMap<String, Vec<ResolvedEdge>> = HashMap::default();
        let mut externals: Vec<String> = Vec::new();
        let mut unresolved: Vec<String> = Vec::new();

        let mut queued: HashSet<String> = HashSet::default();
        let mut queue: VecDeque<String> = VecDeque::new();
        queued.insert(entry_id.clone());
        queue.push_back(entry_id.clone());

        while let Some(id) = queue.pop_front() {
            let Some(loaded) = self.plugins.load(&id)? else {
                return Err(Error::Bundle(BundleError {
                    code: "BUNDLE_LOAD_ERROR",
                    message: "No plugin could load the module".to_string(),
                    path: Some(id),
                }));
            };
            let code = self.plugins.transform(&loaded.code, &id)?;
            let analysis = link::analyze(&code, &id)?;

            let mut module_edges = Vec::new();
            for import in &analysis.imports {
                match self.plugins.resolve_id(&import.specifier, Some(&id))? {
                    Some(resolved) if resolved.external => {
                        if !externals.contains(&resolved.id) {
                            externals.push(resolved.id);
                        }
                    }
                    Some(resolved) => {
                        if queued.insert(resolved.id.clone()) {
                            queue.push_back(resolved.id.clone());
                        }
                        module_edges.push((import.specifier.clone(), resolved.id, import.dynamic));
                    }
                    None => {
                        let importer = crate::paths::from_module_id(&id).unwrap_or(&id);
                        unresolved.push(format!("{} (imported by {importer})", import.specifier));
                    }
                }
            }

            tracing::trace!(
                target: "livedoc::bundler",
                module = %id,
                imports = analysis.imports.len(),
                "module analyzed"
            );
            edges.insert(id.clone(), module_edges);
            graph.add(Module::new(id, code, analysis));
        }

        graph.set_dependencies(&edges);
        let entry = graph.index_of(&entry_id).unwrap_or_default();

        Ok(GraphBuild {
            graph,
            entry,
            externals,
            unresolved,
        })
    }
}

struct GraphBuild {
    graph: ModuleGraph,
    entry: ModuleId,
    externals: Vec<String>,
    unresolved: Vec<String>,
}

/// An import statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    /// The import specifier (e.g. "./Chart", "https://esm.sh/x").
    pub specifier: String,
    /// Whether this is a dynamic `import()`.
    pub dynamic: bool,
    pub names: Vec<ImportedName>,
}

impl Import {
    #[must_use]
    pub fn new(specifier: &str, dynamic: bool, names: Vec<ImportedName>) -> Self {
        Self {
            specifier: specifier.to_string(),
            dynamic,
            names,
        }
    }
}

/// An imported name. `*` as `imported` stands for the whole namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedName {
    /// The exported name from the module.
    pub imported: String,
    /// The local binding name.
    pub local: String,
}

impl ImportedName {
    #[must_use]
    pub fn new(imported: &str, local: &str) -> Self {
        Self {
            imported: imported.to_string(),
            local: local.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::transpile::OxcTranspiler;
    use std::sync::Arc;

    fn bundler(store: MemoryStore) -> Bundler {
        Bundler::new()
            .plugin(Box::new(VirtualFsPlugin::new(
                Arc::new(store),
                Arc::new(OxcTranspiler::new()),
            )))
            .plugin(Box::new(StylePlugin))
    }

    #[test]
    fn test_bundle_components_folder() {
        let store = MemoryStore::new()
            .with_file(
                "Components/index.tsx",
                "import { Chart } from './Chart';\nimport './theme.css';\nimport confetti from 'https://esm.sh/canvas-confetti';\nimport { useState } from 'react';\nexport { Chart };\nexport const party = () => confetti();\nexport default function Hello() { const [n] = useState(1); return <b>{n}</b>; }",
            )
            .with_file("Components/Chart.tsx", "export const Chart = (props: { data: number[] }) => <svg />;")
            .with_file("Components/theme.css", ".chart { color: red; }");

        let result = bundler(store).bundle("Components/index.tsx").unwrap();

        assert_eq!(
            result.modules,
            vec![
                "livedoc://vault/Components/index.tsx",
                "livedoc://vault/Components/Chart.tsx",
                "livedoc://vault/Components/theme.css",
            ]
        );
        assert_eq!(result.externals, vec!["https://esm.sh/canvas-confetti"]);
        assert_eq!(result.hash.len(), 64);

        let code = &result.code;
        assert!(code.starts_with("import * as __ext0 from \"https://esm.sh/canvas-confetti\";"));
        assert!(code.contains("window._livedocModules[\"react\"]"));
        assert!(code.contains("document.head.appendChild"));
        assert!(code.contains("export { __x0 as Chart, __x1 as party, __x2 as default };"));
        assert!(!code.contains("data: number"));
    }

    #[test]
    fn test_missing_relative_import_names_candidates() {
        let store = MemoryStore::new().with_file("Components/index.js", "import { x } from './missing';\nexport { x };");
        let err = bundler(store).bundle("Components/index.js").unwrap_err();

        let Error::Resolution(resolution) = &err else {
            panic!("expected resolution error, got {err:?}");
        };
        assert_eq!(resolution.importer, "Components/index.js");
        assert_eq!(
            resolution.tried,
            vec![
                "Components/missing",
                "Components/missing.js",
                "Components/missing.jsx",
                "Components/missing.ts",
                "Components/missing.tsx",
                "Components/missing.css",
            ]
        );
        assert!(err.to_string().contains("\"Components/missing.tsx\""));
    }

    #[test]
    fn test_bare_reexport_is_unresolved() {
        let store = MemoryStore::new().with_file("Components/index.js", "export * from 'lodash';");
        let err = bundler(store).bundle("Components/index.js").unwrap_err();
        match err {
            Error::UnresolvedImport { imports } => {
                assert_eq!(imports, vec!["lodash (imported by Components/index.js)"]);
            }
            other => panic!("expected unresolved import, got {other:?}"),
        }
    }

    #[test]
    fn test_dynamic_import_inlined_or_rejected() {
        let files = || {
            MemoryStore::new()
                .with_file("C/index.js", "export const later = () => import('./lazy');")
                .with_file("C/lazy.js", "export const value = 1;")
        };

        let result = bundler(files()).bundle("C/index.js").unwrap();
        assert!(result.code.contains("Promise.resolve().then(() => __require(1))"));
        assert_eq!(result.modules.len(), 2);

        let err = bundler(files())
            .with_options(BundleOptions {
                inline_dynamic_imports: false,
            })
            .bundle("C/index.js")
            .unwrap_err();
        assert!(matches!(err, Error::BundleChunkCount { count: 2 }));
    }

    #[test]
    fn test_transpile_failure_surfaces_as_transpile_error() {
        let store = MemoryStore::new().with_file("C/index.ts", "export const = ;");
        let err = bundler(store).bundle("C/index.ts").unwrap_err();
        assert_eq!(err.code(), "TRANSPILE_PARSE_ERROR");
    }

    #[test]
    fn test_bundle_is_deterministic() {
        let files = || MemoryStore::new().with_file("C/index.js", "export const a = 1;");
        let first = bundler(files()).bundle("C/index.js").unwrap();
        let second = bundler(files()).bundle("C/index.js").unwrap();
        assert_eq!(first.hash, second.hash);
    }
}
