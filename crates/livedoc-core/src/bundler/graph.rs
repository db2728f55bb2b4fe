//! Module dependency graph.
//!
//! Tracks bundled modules by their resolved id and the edges between them.

use super::link::ModuleAnalysis;
use rustc_hash::FxHashMap as HashMap;
use std::collections::VecDeque;

/// Index of a module in the graph.
pub type ModuleId = usize;

/// A module in the dependency graph.
#[derive(Debug, Clone)]
pub struct Module {
    /// Resolved module id (e.g. `livedoc://vault/Components/index.tsx`).
    pub id: String,
    /// Transformed source code.
    pub source: String,
    /// Imports, exports and the statements the linker rewrites.
    pub analysis: ModuleAnalysis,
    /// Modules this module depends on (static imports and re-exports).
    pub dependencies: Vec<ModuleId>,
    /// Modules this module dynamically imports.
    pub dynamic_dependencies: Vec<ModuleId>,
}

impl Module {
    #[must_use]
    pub fn new(id: impl Into<String>, source: impl Into<String>, analysis: ModuleAnalysis) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            analysis,
            dependencies: Vec::new(),
            dynamic_dependencies: Vec::new(),
        }
    }
}

/// One resolved edge: `(specifier, target module id, is_dynamic)`.
pub type ResolvedEdge = (String, String, bool);

/// The module dependency graph.
#[derive(Debug, Default)]
pub struct ModuleGraph {
    modules: Vec<Module>,
    id_to_index: HashMap<String, ModuleId>,
    /// (importer id, specifier) -> target.
    specifier_map: HashMap<(String, String), ModuleId>,
}

impl ModuleGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module, returning its index.
    pub fn add(&mut self, module: Module) -> ModuleId {
        let index = self.modules.len();
        self.id_to_index.insert(module.id.clone(), index);
        self.modules.push(module);
        index
    }

    #[must_use]
    pub fn get(&self, index: ModuleId) -> Option<&Module> {
        self.modules.get(index)
    }

    #[must_use]
    pub fn index_of(&self, id: &str) -> Option<ModuleId> {
        self.id_to_index.get(id).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Wire edges from a map of importer id to its resolved edges.
    pub fn set_dependencies(&mut self, edges: &HashMap<String, Vec<ResolvedEdge>>) {
        for module in &mut self.modules {
            let Some(deps) = edges.get(&module.id) else {
                continue;
            };

            module.dependencies = deps
                .iter()
                .filter(|(_, _, is_dynamic)| !is_dynamic)
                .filter_map(|(_, target, _)| self.id_to_index.get(target).copied())
                .collect();
            module.dependencies.dedup();

            module.dynamic_dependencies = deps
                .iter()
                .filter(|(_, _, is_dynamic)| *is_dynamic)
                .filter_map(|(_, target, _)| self.id_to_index.get(target).copied())
                .collect();
            module.dynamic_dependencies.dedup();

            for (specifier, target, _) in deps {
                if let Some(&index) = self.id_to_index.get(target) {
                    self.specifier_map
                        .insert((module.id.clone(), specifier.clone()), index);
                }
            }
        }
    }

    /// Module a specifier resolves to from a given importer, if bundled.
    #[must_use]
    pub fn resolve_specifier(&self, importer: &str, specifier: &str) -> Option<ModuleId> {
        self.specifier_map
            .get(&(importer.to_string(), specifier.to_string()))
            .copied()
    }

    /// Modules in topological order (dependencies before dependents).
    ///
    /// Modules on a cycle are appended after the acyclic part.
    #[must_use]
    pub fn toposort(&self) -> Vec<ModuleId> {
        let n = self.modules.len();
        let mut in_degree = vec![0usize; n];
        let mut adj: Vec<Vec<ModuleId>> = vec![Vec::new(); n];

        for (index, module) in self.modules.iter().enumerate() {
            for &dep in &module.dependencies {
                adj[dep].push(index);
                in_degree[index] += 1;
            }
        }

        let mut queue: VecDeque<ModuleId> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &deg)| deg == 0)
            .map(|(index, _)| index)
            .collect();

        let mut order = Vec::with_capacity(n);
        while let Some(index) = queue.pop_front() {
            order.push(index);
            for &next in &adj[index] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }

        if order.len() < n {
            for index in 0..n {
                if !order.contains(&index) {
                    order.push(index);
                }
            }
        }

        order
    }

    pub fn iter(&self) -> impl Iterator<Item = (ModuleId, &Module)> {
        self.modules.iter().enumerate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(id: &str) -> Module {
        Module::new(id, "", ModuleAnalysis::default())
    }

    #[test]
    fn test_empty_graph() {
        let graph = ModuleGraph::new();
        assert!(graph.is_empty());
        assert_eq!(graph.len(), 0);
        assert!(graph.toposort().is_empty());
    }

    #[test]
    fn test_set_dependencies_and_resolve() {
        let mut graph = ModuleGraph::new();
        graph.add(module("a"));
        graph.add(module("b"));
        graph.add(module("c"));

        let mut edges = HashMap::default();
        edges.insert(
            "a".to_string(),
            vec![
                ("./b".to_string(), "b".to_string(), false),
                ("./c".to_string(), "c".to_string(), true),
                ("https://x".to_string(), "https://x".to_string(), false),
            ],
        );
        graph.set_dependencies(&edges);

        let a = graph.get(0).unwrap();
        assert_eq!(a.dependencies, vec![1]);
        assert_eq!(a.dynamic_dependencies, vec![2]);
        assert_eq!(graph.resolve_specifier("a", "./b"), Some(1));
        assert_eq!(graph.resolve_specifier("a", "https://x"), None);
        assert_eq!(graph.index_of("c"), Some(2));
    }

    #[test]
    fn test_toposort_linear_and_cycle() {
        let mut graph = ModuleGraph::new();
        graph.add(module("c"));
        graph.add(module("b"));
        graph.add(module("a"));

        let mut edges = HashMap::default();
        edges.insert("b".to_string(), vec![("./c".to_string(), "c".to_string(), false)]);
        edges.insert("a".to_string(), vec![("./b".to_string(), "b".to_string(), false)]);
        graph.set_dependencies(&edges);
        assert_eq!(graph.toposort(), vec![0, 1, 2]);

        edges.insert("c".to_string(), vec![("./a".to_string(), "a".to_string(), false)]);
        graph.set_dependencies(&edges);
        let order = graph.toposort();
        assert_eq!(order.len(), 3);
    }
}
