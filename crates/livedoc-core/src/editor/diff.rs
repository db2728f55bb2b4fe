//! Render-key planning for one editor pass.
//!
//! A pure function from the previous pass's cache, the freshly scanned
//! fragments and a key source to the new cache and per-fragment decisions.

use super::scan::{Fragment, FragmentKind};
use serde::Serialize;

/// Per-index record carried between passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub kind: FragmentKind,
    pub content: String,
    pub key: String,
    pub cursor_inside: bool,
}

/// Decision for one fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyDecision {
    pub key: String,
    /// A new key was generated; the previous output is replaced.
    pub fresh: bool,
    /// Clear the fragment's write scope before wiring it.
    pub reset_scope: bool,
    /// Cursor is inside: wire scopes but issue no render.
    pub skip: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassPlan {
    pub cache: Vec<CacheEntry>,
    pub decisions: Vec<KeyDecision>,
}

/// Pick a render key for every fragment.
///
/// Once the cursor is inside a fragment, it and everything after it keep
/// their previous keys. A statement block the cursor just left, or a changed
/// statement block, forces fresh keys from there to the end of the pass.
pub fn plan_pass<K>(previous: &[CacheEntry], fragments: &[Fragment], mut new_key: K) -> PassPlan
where
    K: FnMut() -> String,
{
    let mut plan = PassPlan::default();
    let mut force_cached = false;
    let mut reevaluate = false;

    for (index, fragment) in fragments.iter().enumerate() {
        let cached = previous.get(index);
        if fragment.cursor_inside {
            force_cached = true;
        }

        let reused = match cached {
            Some(entry) if entry.cursor_inside && !fragment.cursor_inside => {
                if touches_statement_block(entry.kind, fragment.kind) {
                    reevaluate = true;
                }
                None
            }
            _ if force_cached => cached.map(|entry| entry.key.clone()),
            None => None,
            Some(_) if reevaluate => None,
            Some(entry) if entry.kind == fragment.kind && entry.content == fragment.content => {
                Some(entry.key.clone())
            }
            Some(entry) => {
                if touches_statement_block(entry.kind, fragment.kind) {
                    reevaluate = true;
                }
                None
            }
        };

        let fresh = reused.is_none();
        let key = reused.unwrap_or_else(&mut new_key);
        plan.cache.push(CacheEntry {
            kind: fragment.kind,
            content: fragment.content.clone(),
            key: key.clone(),
            cursor_inside: fragment.cursor_inside,
        });
        plan.decisions.push(KeyDecision {
            key,
            fresh,
            reset_scope: fresh,
            skip: fragment.cursor_inside,
        });
    }
    plan
}

fn touches_statement_block(before: FragmentKind, after: FragmentKind) -> bool {
    before == FragmentKind::BlockStatement || after == FragmentKind::BlockStatement
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(kind: FragmentKind, content: &str, cursor_inside: bool) -> Fragment {
        Fragment {
            kind,
            from: 0,
            to: 0,
            content: content.to_string(),
            shortcut_component: None,
            cursor_inside,
        }
    }

    fn keys() -> impl FnMut() -> String {
        let mut n = 0;
        move || {
            n += 1;
            format!("k{n}")
        }
    }

    fn plan(previous: &[CacheEntry], fragments: &[Fragment]) -> PassPlan {
        plan_pass(previous, fragments, keys())
    }

    fn key_list(plan: &PassPlan) -> Vec<&str> {
        plan.decisions.iter().map(|d| d.key.as_str()).collect()
    }

    fn doc(cursor: Option<usize>) -> Vec<Fragment> {
        let parts = [
            (FragmentKind::InlineExpression, "1"),
            (FragmentKind::BlockStatement, "export const a = 1;"),
            (FragmentKind::BlockMarkup, "<A />"),
        ];
        parts
            .iter()
            .enumerate()
            .map(|(i, (kind, content))| fragment(*kind, content, cursor == Some(i)))
            .collect()
    }

    #[test]
    fn test_first_pass_generates_fresh_keys() {
        let first = plan(&[], &doc(None));
        assert_eq!(key_list(&first), vec!["k1", "k2", "k3"]);
        assert!(first.decisions.iter().all(|d| d.fresh && d.reset_scope && !d.skip));
    }

    #[test]
    fn test_unchanged_fragments_reuse_keys() {
        let first = plan(&[], &doc(None));
        let second = plan_pass(&first.cache, &doc(None), || "new".to_string());
        assert_eq!(key_list(&second), vec!["k1", "k2", "k3"]);
        assert!(second.decisions.iter().all(|d| !d.fresh && !d.reset_scope));
    }

    #[test]
    fn test_changed_inline_only_rekeys_itself() {
        let first = plan(&[], &doc(None));
        let mut fragments = doc(None);
        fragments[0].content = "2".to_string();
        let second = plan_pass(&first.cache, &fragments, || "new".to_string());
        assert_eq!(key_list(&second), vec!["new", "k2", "k3"]);
    }

    #[test]
    fn test_changed_statement_block_rekeys_downstream() {
        let first = plan(&[], &doc(None));
        let mut fragments = doc(None);
        fragments[1].content = "export const a = 2;".to_string();
        let second = plan_pass(&first.cache, &fragments, || "new".to_string());
        assert_eq!(key_list(&second), vec!["k1", "new", "new"]);
        assert!(second.decisions[2].reset_scope);
    }

    #[test]
    fn test_cursor_freezes_from_its_fragment_on() {
        let first = plan(&[], &doc(None));
        let mut fragments = doc(Some(1));
        fragments[1].content = "export const a = 3;".to_string();
        fragments[2].content = "<B />".to_string();
        let second = plan_pass(&first.cache, &fragments, || "new".to_string());

        assert_eq!(key_list(&second), vec!["k1", "k2", "k3"]);
        assert!(second.decisions[1].skip);
        assert!(!second.decisions[2].skip);
        assert!(second.decisions.iter().all(|d| !d.fresh));
    }

    #[test]
    fn test_leaving_statement_block_rekeys_it_and_downstream() {
        let first = plan(&[], &doc(None));
        let editing = plan_pass(&first.cache, &doc(Some(1)), || "unused".to_string());
        let left = plan_pass(&editing.cache, &doc(None), || "new".to_string());
        assert_eq!(key_list(&left), vec!["k1", "new", "new"]);
    }

    #[test]
    fn test_leaving_inline_rekeys_only_it() {
        let first = plan(&[], &doc(None));
        let editing = plan_pass(&first.cache, &doc(Some(0)), || "unused".to_string());
        let left = plan_pass(&editing.cache, &doc(None), || "new".to_string());
        assert_eq!(key_list(&left), vec!["new", "k2", "k3"]);
    }

    #[test]
    fn test_cursor_in_new_fragment_without_cache() {
        let first = plan(&[], &doc(None)[..1]);
        let second = plan_pass(&first.cache, &doc(Some(1)), || "new".to_string());
        assert_eq!(key_list(&second), vec!["k1", "new", "new"]);
        assert!(second.decisions[1].skip);
    }
}
