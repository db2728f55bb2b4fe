//! Reading-mode processing of whole documents.

use super::evaluate::{FragmentContext, FragmentEvaluator, FragmentOutput};
use super::scan::{scan, FragmentKind};
use super::{anonymous_scope_id, fragment_scope_id, page_scope_id};
use crate::loader::ModuleHost;
use crate::scope::ScopeGraph;
use futures::future::join_all;
use std::sync::Arc;
use tracing::debug;

/// Document a preview pass renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentKey {
    /// A vault file, by path.
    File(String),
    /// Content without a file, by host-assigned id.
    Anonymous(String),
}

impl DocumentKey {
    #[must_use]
    pub fn scope_id(&self) -> String {
        match self {
            Self::File(path) => page_scope_id(path),
            Self::Anonymous(key) => anonymous_scope_id(key),
        }
    }
}

/// Output for one fragment of a previewed document.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewResult<V> {
    pub index: usize,
    pub kind: FragmentKind,
    pub output: FragmentOutput<V>,
}

pub struct PreviewProcessor<H: ModuleHost> {
    graph: ScopeGraph<H::Value>,
    evaluator: Arc<FragmentEvaluator<H>>,
}

impl<H: ModuleHost> PreviewProcessor<H> {
    pub fn new(graph: ScopeGraph<H::Value>, evaluator: Arc<FragmentEvaluator<H>>) -> Self {
        Self { graph, evaluator }
    }

    /// Rebuild the document's scope chain and evaluate every fragment.
    ///
    /// Fragments run concurrently; the scope chain keeps them in order.
    pub async fn process_document(&self, document: &DocumentKey, text: &str) -> Vec<PreviewResult<H::Value>> {
        let fragments = scan(text, None);
        let page_id = document.scope_id();
        let page = self.graph.root().child(&page_id);

        page.wait_for_unblock().await;
        page.dispose_descendants();
        debug!(target: "livedoc::editor", page = %page_id, fragments = fragments.len(), "preview pass");

        let mut read = page;
        let mut jobs = Vec::with_capacity(fragments.len());
        for (index, fragment) in fragments.iter().enumerate() {
            let write_id = fragment_scope_id(&page_id, index);
            if let Some(stale) = self.graph.scope(&write_id) {
                stale.dispose();
            }
            let write = read.child(&write_id);
            let ctx = FragmentContext {
                read,
                write: write.clone(),
                shortcut_component: fragment.shortcut_component.clone(),
            };
            let evaluator = Arc::clone(&self.evaluator);
            jobs.push(async move {
                let output = evaluator.evaluate(fragment.kind, &fragment.content, &ctx).await;
                PreviewResult {
                    index,
                    kind: fragment.kind,
                    output,
                }
            });
            read = write;
        }
        join_all(jobs).await
    }
}
