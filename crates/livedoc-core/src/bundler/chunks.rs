//! Chunk planning.
//!
//! With dynamic-import inlining every reachable module lands in the entry
//! chunk. Without it, dynamic-import targets start chunks of their own.

use super::graph::{ModuleGraph, ModuleId};
use rustc_hash::FxHashSet as HashSet;

/// Index of a chunk in the chunk graph.
pub type ChunkId = usize;

/// A group of modules loaded together.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: ChunkId,
    pub name: String,
    /// Modules in this chunk, in discovery order.
    pub modules: Vec<ModuleId>,
    /// Module the chunk starts from.
    pub entry: ModuleId,
    pub is_entry: bool,
    /// Chunks this chunk loads lazily.
    pub dependencies: Vec<ChunkId>,
}

/// Result of chunk planning.
#[derive(Debug)]
pub struct ChunkGraph {
    chunks: Vec<Chunk>,
}

impl ChunkGraph {
    /// Split the module graph, starting from `entry`.
    #[must_use]
    pub fn from_module_graph(graph: &ModuleGraph, entry: ModuleId, inline_dynamic_imports: bool) -> Self {
        let mut chunk_graph = ChunkGraph { chunks: Vec::new() };

        let split_points = if inline_dynamic_imports {
            HashSet::default()
        } else {
            find_split_points(graph)
        };

        let main = chunk_graph.create_chunk("main".to_string(), entry, true);
        chunk_graph.assign_modules_to_chunk(graph, entry, main, &split_points, inline_dynamic_imports);

        let mut split_points: Vec<ModuleId> = split_points.into_iter().filter(|&id| id != entry).collect();
        split_points.sort_unstable();
        let split_set: HashSet<ModuleId> = split_points.iter().copied().collect();
        for split in split_points {
            if let Some(module) = graph.get(split) {
                let chunk = chunk_graph.create_chunk(generate_chunk_name(&module.id), split, false);
                chunk_graph.assign_modules_to_chunk(graph, split, chunk, &split_set, false);
                chunk_graph.chunks[main].dependencies.push(chunk);
            }
        }

        chunk_graph
    }

    fn create_chunk(&mut self, name: String, entry: ModuleId, is_entry: bool) -> ChunkId {
        let id = self.chunks.len();
        self.chunks.push(Chunk {
            id,
            name,
            modules: Vec::new(),
            entry,
            is_entry,
            dependencies: Vec::new(),
        });
        id
    }

    /// Collect modules reachable from `start` without crossing split points.
    fn assign_modules_to_chunk(
        &mut self,
        graph: &ModuleGraph,
        start: ModuleId,
        chunk: ChunkId,
        split_points: &HashSet<ModuleId>,
        follow_dynamic: bool,
    ) {
        let mut visited = HashSet::default();
        let mut stack = vec![start];

        while let Some(module_id) = stack.pop() {
            if !visited.insert(module_id) {
                continue;
            }
            if module_id != start && split_points.contains(&module_id) {
                continue;
            }

            self.chunks[chunk].modules.push(module_id);

            if let Some(module) = graph.get(module_id) {
                let dynamic = if follow_dynamic {
                    module.dynamic_dependencies.as_slice()
                } else {
                    &[]
                };
                for &dep in module.dependencies.iter().chain(dynamic).rev() {
                    if !visited.contains(&dep) {
                        stack.push(dep);
                    }
                }
            }
        }
    }

    #[must_use]
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    #[must_use]
    pub fn main_chunk(&self) -> Option<&Chunk> {
        self.chunks.iter().find(|c| c.is_entry)
    }

    #[must_use]
    pub fn async_chunks(&self) -> Vec<&Chunk> {
        self.chunks.iter().filter(|c| !c.is_entry).collect()
    }

    #[must_use]
    pub fn has_splits(&self) -> bool {
        self.chunks.len() > 1
    }
}

/// Targets of dynamic imports.
fn find_split_points(graph: &ModuleGraph) -> HashSet<ModuleId> {
    graph
        .iter()
        .flat_map(|(_, module)| module.dynamic_dependencies.iter().copied())
        .collect()
}

/// Chunk name from a module id: the file stem of its last path segment.
fn generate_chunk_name(id: &str) -> String {
    let file = id.rsplit('/').next().unwrap_or(id);
    let stem = file.split('.').next().unwrap_or(file);
    if stem.is_empty() {
        "chunk".to_string()
    } else {
        stem.to_string()
    }
}
