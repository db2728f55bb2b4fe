//! Incremental editor passes.

use super::diff::{plan_pass, CacheEntry, KeyDecision};
use super::evaluate::FragmentContext;
use super::scan::{scan, Fragment, FragmentKind};
use super::{fragment_scope_id, page_scope_id};
use crate::scope::ScopeGraph;
use serde::Serialize;
use tracing::debug;

/// Editor state one pass runs against.
#[derive(Debug, Clone, Copy)]
pub struct EditorView<'a> {
    /// Vault path of the open document, if it has one.
    pub file: Option<&'a str>,
    /// Whether the editor renders fragments in place.
    pub live_preview: bool,
    pub text: &'a str,
    /// Byte offset of the selection head.
    pub cursor: Option<usize>,
}

/// Place a rendered fragment over `[from, to)`, identified by `key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderInstruction {
    pub index: usize,
    pub kind: FragmentKind,
    pub key: String,
    /// False when `key` is new and any widget under the old key is replaced.
    pub reused: bool,
    pub from: usize,
    pub to: usize,
    pub content: String,
    pub shortcut_component: Option<String>,
    pub read_scope: String,
    pub write_scope: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EditorPass {
    pub fragments: Vec<Fragment>,
    pub decisions: Vec<KeyDecision>,
    pub instructions: Vec<RenderInstruction>,
}

/// Opaque render keys, unique per processor.
#[derive(Debug)]
struct KeySource {
    seed: [u8; 8],
    next: u64,
}

impl KeySource {
    fn new() -> Self {
        let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        Self {
            seed: nanos.to_le_bytes(),
            next: 0,
        }
    }

    fn next_key(&mut self) -> String {
        self.next += 1;
        livedoc_util::hash::short_token(&[&self.seed, &self.next.to_le_bytes()])
    }
}

/// Keeps the previous pass's cache and turns edits into render instructions.
#[derive(Debug)]
pub struct EditorProcessor<V> {
    graph: ScopeGraph<V>,
    cache: Vec<CacheEntry>,
    keys: KeySource,
}

impl<V: Clone + Send + Sync + 'static> EditorProcessor<V> {
    #[must_use]
    pub fn new(graph: ScopeGraph<V>) -> Self {
        Self {
            graph,
            cache: Vec::new(),
            keys: KeySource::new(),
        }
    }

    #[must_use]
    pub fn cache(&self) -> &[CacheEntry] {
        &self.cache
    }

    /// Run a pass for a transaction; `None` when neither the document nor
    /// the selection changed.
    pub fn update(&mut self, view: &EditorView<'_>, doc_changed: bool, selection_changed: bool) -> Option<EditorPass> {
        if !doc_changed && !selection_changed {
            return None;
        }
        Some(self.process(view))
    }

    /// Scan, plan keys, wire scopes and emit instructions.
    pub fn process(&mut self, view: &EditorView<'_>) -> EditorPass {
        let Some(path) = view.file.filter(|_| view.live_preview) else {
            debug!(target: "livedoc::editor", "not in live preview or no file, skipping");
            self.cache.clear();
            return EditorPass::default();
        };

        let fragments = scan(view.text, view.cursor);
        let page_id = page_scope_id(path);
        if fragments.is_empty() {
            self.dispose_from(&page_id, 0);
            self.cache.clear();
            return EditorPass::default();
        }

        let plan = plan_pass(&self.cache, &fragments, || self.keys.next_key());
        debug!(
            target: "livedoc::editor",
            path,
            fragments = fragments.len(),
            previous = self.cache.len(),
            "editor pass"
        );

        let mut read = self.graph.root().child(&page_id);
        let mut instructions = Vec::new();

        for (index, (fragment, decision)) in fragments.iter().zip(&plan.decisions).enumerate() {
            let write = read.child(&fragment_scope_id(&page_id, index));
            if decision.reset_scope {
                write.reset();
            }
            if !decision.skip {
                let (from, to) = fragment.decoration_range(view.text.len());
                instructions.push(RenderInstruction {
                    index,
                    kind: fragment.kind,
                    key: decision.key.clone(),
                    reused: !decision.fresh,
                    from,
                    to,
                    content: fragment.content.clone(),
                    shortcut_component: fragment.shortcut_component.clone(),
                    read_scope: read.id().to_string(),
                    write_scope: write.id().to_string(),
                });
            }
            read = write;
        }

        self.dispose_from(&page_id, fragments.len());

        self.cache = plan.cache;
        EditorPass {
            fragments,
            decisions: plan.decisions,
            instructions,
        }
    }

    /// Scopes of fragments that no longer exist hang off the one at `index`.
    fn dispose_from(&self, page_id: &str, index: usize) {
        if let Some(stale) = self.graph.scope(&fragment_scope_id(page_id, index)) {
            stale.dispose();
        }
    }

    /// Scopes for evaluating the fragment behind `instruction`.
    #[must_use]
    pub fn context(&self, instruction: &RenderInstruction) -> Option<FragmentContext<V>> {
        Some(FragmentContext {
            read: self.graph.scope(&instruction.read_scope)?,
            write: self.graph.scope(&instruction.write_scope)?,
            shortcut_component: instruction.shortcut_component.clone(),
        })
    }
}
