//! Live fragments inside documents.
//!
//! `scan` finds fragments, `diff` decides which rendered outputs survive an
//! edit, `processor` wires the incremental editor pass onto the scope graph,
//! `preview` does the same for a whole document in reading mode, and
//! `evaluate` runs a single fragment against its scopes.
//!
//! Scope ids form a chain per document: the page scope hangs off the root
//! and fragment `i` writes to `{page}/{i}`, a child of fragment `i - 1`'s
//! write scope.

pub mod diff;
pub mod evaluate;
pub mod preview;
pub mod processor;
pub mod scan;

pub use diff::{plan_pass, CacheEntry, KeyDecision, PassPlan};
pub use evaluate::{wait_for_chain, FragmentContext, FragmentEvaluator, FragmentOutput, INLINE_ERROR_MARK};
pub use preview::{DocumentKey, PreviewProcessor, PreviewResult};
pub use processor::{EditorPass, EditorProcessor, EditorView, RenderInstruction};
pub use scan::{scan, Fragment, FragmentKind};

/// Scope id of a vault file.
#[must_use]
pub fn page_scope_id(path: &str) -> String {
    format!("page/{path}")
}

/// Scope id of content rendered without a file.
#[must_use]
pub fn anonymous_scope_id(key: &str) -> String {
    format!("anon-doc/{key}")
}

/// Write scope id of the fragment at `index` within a page.
#[must_use]
pub fn fragment_scope_id(page_id: &str, index: usize) -> String {
    format!("{page_id}/{index}")
}
