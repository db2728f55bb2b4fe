//! Hierarchical scope graph.
//!
//! Every document and every code fragment owns a scope node. Lookups resolve
//! locally first and then walk the parent chain, so a fragment whose read
//! scope is the previous fragment's write scope sees everything published
//! before it in source order.
//!
//! Nodes live in one arena keyed by id; children are owned through their
//! parent's child list, and the id index gives reuse across editor passes.
//! A node can be *blocked* while its fragment evaluates; readers suspend in
//! [`Scope::wait_for_unblock`] until it is released.

use rustc_hash::FxHashMap as HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::debug;

/// Id of the root scope created with every graph.
pub const ROOT_SCOPE_ID: &str = "root";

/// What changed on a scope node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeEvent {
    /// Local bindings were set, replaced or cleared.
    BindingsChanged,
    /// A child with this id was attached.
    ChildAttached(String),
    /// A child with this id was detached or disposed.
    ChildDetached(String),
}

/// Handle returned by [`Scope::on_change`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&ScopeEvent) + Send + Sync>;

struct Node<V> {
    parent: Option<String>,
    children: Vec<String>,
    bindings: HashMap<String, V>,
    blocked: watch::Sender<bool>,
    listeners: Vec<(ListenerId, Listener)>,
}

impl<V> Node<V> {
    fn new(parent: Option<String>) -> Self {
        Self {
            parent,
            children: Vec::new(),
            bindings: HashMap::default(),
            blocked: watch::channel(false).0,
            listeners: Vec::new(),
        }
    }
}

struct Arena<V> {
    nodes: HashMap<String, Node<V>>,
    next_listener: u64,
}

impl<V> Arena<V> {
    /// Remove `id` and every descendant, returning the removed ids.
    fn remove_subtree(&mut self, id: &str) -> Vec<String> {
        let mut removed = Vec::new();
        let mut stack = vec![id.to_string()];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(&current) {
                stack.extend(node.children);
                removed.push(current);
            }
        }
        removed
    }

    fn listeners(&self, id: &str) -> Vec<Listener> {
        self.nodes
            .get(id)
            .map(|node| node.listeners.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default()
    }
}

/// Shared, cloneable handle to a scope tree.
pub struct ScopeGraph<V> {
    inner: Arc<Mutex<Arena<V>>>,
}

impl<V> Clone for ScopeGraph<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> fmt::Debug for ScopeGraph<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeGraph")
            .field("nodes", &self.lock().nodes.len())
            .finish()
    }
}

impl<V: Clone + Send + Sync + 'static> Default for ScopeGraph<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> ScopeGraph<V> {
    fn lock(&self) -> MutexGuard<'_, Arena<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<V: Clone + Send + Sync + 'static> ScopeGraph<V> {
    /// Create a graph holding only the root scope.
    #[must_use]
    pub fn new() -> Self {
        let mut nodes = HashMap::default();
        nodes.insert(ROOT_SCOPE_ID.to_string(), Node::new(None));
        Self {
            inner: Arc::new(Mutex::new(Arena {
                nodes,
                next_listener: 0,
            })),
        }
    }

    /// The root scope.
    #[must_use]
    pub fn root(&self) -> Scope<V> {
        self.handle(ROOT_SCOPE_ID)
    }

    /// Look up a live scope by id.
    #[must_use]
    pub fn scope(&self, id: &str) -> Option<Scope<V>> {
        self.lock().nodes.contains_key(id).then(|| self.handle(id))
    }

    /// Number of live scopes, root included; never zero.
    #[must_use]
    pub fn scope_count(&self) -> usize {
        self.lock().nodes.len()
    }

    fn handle(&self, id: &str) -> Scope<V> {
        Scope {
            graph: self.clone(),
            id: Arc::from(id),
        }
    }

    fn notify(&self, id: &str, event: &ScopeEvent) {
        let listeners = self.lock().listeners(id);
        for listener in listeners {
            listener(event);
        }
    }

    /// Fetch the child `id` of `parent`, creating it if absent.
    ///
    /// An existing node with the same id is returned as-is; if it currently
    /// hangs under another parent it is moved under `parent`.
    fn get_or_create_child(&self, parent: &str, id: &str) -> Scope<V> {
        let mut detached_from = None;
        let attached = {
            let mut arena = self.lock();
            if id == parent || !arena.nodes.contains_key(parent) {
                return self.handle(id);
            }
            match arena.nodes.get(id).map(|n| n.parent.clone()) {
                Some(Some(current)) if current == parent => false,
                Some(previous) => {
                    if let Some(old) = previous {
                        if let Some(old_parent) = arena.nodes.get_mut(&old) {
                            old_parent.children.retain(|c| c != id);
                        }
                        detached_from = Some(old);
                    }
                    if let Some(node) = arena.nodes.get_mut(id) {
                        node.parent = Some(parent.to_string());
                    }
                    if let Some(p) = arena.nodes.get_mut(parent) {
                        p.children.push(id.to_string());
                    }
                    true
                }
                None => {
                    arena
                        .nodes
                        .insert(id.to_string(), Node::new(Some(parent.to_string())));
                    if let Some(p) = arena.nodes.get_mut(parent) {
                        p.children.push(id.to_string());
                    }
                    debug!(target: "livedoc::scope", id, parent, "scope created");
                    true
                }
            }
        };

        if let Some(old) = detached_from {
            self.notify(&old, &ScopeEvent::ChildDetached(id.to_string()));
        }
        if attached {
            self.notify(parent, &ScopeEvent::ChildAttached(id.to_string()));
        }
        self.handle(id)
    }
}

/// Handle to one scope node.
///
/// Handles are cheap to clone. Once the node is disposed, reads return
/// nothing, writes are ignored and waits return immediately.
pub struct Scope<V> {
    graph: ScopeGraph<V>,
    id: Arc<str>,
}

impl<V> Clone for Scope<V> {
    fn clone(&self) -> Self {
        Self {
            graph: self.graph.clone(),
            id: Arc::clone(&self.id),
        }
    }
}

impl<V> fmt::Debug for Scope<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Scope").field(&self.id).finish()
    }
}

impl<V> PartialEq for Scope<V> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.graph.inner, &other.graph.inner) && self.id == other.id
    }
}

impl<V: Clone + Send + Sync + 'static> Scope<V> {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The graph this scope belongs to.
    #[must_use]
    pub fn graph(&self) -> &ScopeGraph<V> {
        &self.graph
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        !self.graph.lock().nodes.contains_key(&*self.id)
    }

    /// Resolve `name` locally, then through the parent chain.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<V> {
        let arena = self.graph.lock();
        let mut current = arena.nodes.get(&*self.id);
        while let Some(node) = current {
            if let Some(value) = node.bindings.get(name) {
                return Some(value.clone());
            }
            current = node.parent.as_ref().and_then(|p| arena.nodes.get(p));
        }
        None
    }

    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        let arena = self.graph.lock();
        let mut current = arena.nodes.get(&*self.id);
        while let Some(node) = current {
            if node.bindings.contains_key(name) {
                return true;
            }
            current = node.parent.as_ref().and_then(|p| arena.nodes.get(p));
        }
        false
    }

    /// Local binding names, sorted.
    #[must_use]
    pub fn local_names(&self) -> Vec<String> {
        let arena = self.graph.lock();
        let mut names: Vec<String> = arena
            .nodes
            .get(&*self.id)
            .map(|n| n.bindings.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    pub fn set(&self, name: impl Into<String>, value: V) {
        self.set_many([(name.into(), value)]);
    }

    /// Insert or replace local bindings. Existing bindings not named are kept.
    pub fn set_many<I>(&self, bindings: I)
    where
        I: IntoIterator<Item = (String, V)>,
    {
        let changed = {
            let mut arena = self.graph.lock();
            match arena.nodes.get_mut(&*self.id) {
                Some(node) => {
                    node.bindings.extend(bindings);
                    true
                }
                None => false,
            }
        };
        if changed {
            self.graph.notify(&self.id, &ScopeEvent::BindingsChanged);
        }
    }

    /// Clear local bindings. Parent and children are unaffected.
    pub fn reset(&self) {
        let changed = {
            let mut arena = self.graph.lock();
            match arena.nodes.get_mut(&*self.id) {
                Some(node) => {
                    node.bindings.clear();
                    true
                }
                None => false,
            }
        };
        if changed {
            self.graph.notify(&self.id, &ScopeEvent::BindingsChanged);
        }
    }

    /// Mark the scope as still being computed.
    pub fn block(&self) {
        if let Some(node) = self.graph.lock().nodes.get(&*self.id) {
            node.blocked.send_replace(true);
        }
    }

    /// Release the scope; every pending [`Scope::wait_for_unblock`] resumes.
    pub fn unblock(&self) {
        if let Some(node) = self.graph.lock().nodes.get(&*self.id) {
            node.blocked.send_replace(false);
        }
    }

    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.graph
            .lock()
            .nodes
            .get(&*self.id)
            .is_some_and(|node| *node.blocked.borrow())
    }

    /// Suspend until the scope is unblocked (or disposed).
    pub async fn wait_for_unblock(&self) {
        let receiver = self
            .graph
            .lock()
            .nodes
            .get(&*self.id)
            .map(|node| node.blocked.subscribe());
        if let Some(mut receiver) = receiver {
            // A dropped sender means the node was disposed.
            let _ = receiver.wait_for(|blocked| !*blocked).await;
        }
    }

    /// Subscribe to changes of this node.
    pub fn on_change<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ScopeEvent) + Send + Sync + 'static,
    {
        let mut arena = self.graph.lock();
        arena.next_listener += 1;
        let id = ListenerId(arena.next_listener);
        if let Some(node) = arena.nodes.get_mut(&*self.id) {
            node.listeners.push((id, Arc::new(listener)));
        }
        id
    }

    pub fn off(&self, listener: ListenerId) {
        if let Some(node) = self.graph.lock().nodes.get_mut(&*self.id) {
            node.listeners.retain(|(id, _)| *id != listener);
        }
    }

    /// Child scope with the given id, created if absent.
    #[must_use]
    pub fn child(&self, id: &str) -> Scope<V> {
        self.graph.get_or_create_child(&self.id, id)
    }

    #[must_use]
    pub fn parent(&self) -> Option<Scope<V>> {
        let parent = self.graph.lock().nodes.get(&*self.id)?.parent.clone()?;
        Some(self.graph.handle(&parent))
    }

    #[must_use]
    pub fn children(&self) -> Vec<Scope<V>> {
        let ids = self
            .graph
            .lock()
            .nodes
            .get(&*self.id)
            .map(|n| n.children.clone())
            .unwrap_or_default();
        ids.iter().map(|id| self.graph.handle(id)).collect()
    }

    /// Dispose every descendant; this node stays addressable.
    pub fn dispose_descendants(&self) {
        let detached = {
            let mut arena = self.graph.lock();
            let children = match arena.nodes.get_mut(&*self.id) {
                Some(node) => std::mem::take(&mut node.children),
                None => return,
            };
            for child in &children {
                arena.remove_subtree(child);
            }
            children
        };
        if !detached.is_empty() {
            debug!(target: "livedoc::scope", id = %self.id, count = detached.len(), "descendants disposed");
        }
        for child in detached {
            self.graph.notify(&self.id, &ScopeEvent::ChildDetached(child));
        }
    }

    /// Detach from the parent and dispose this node with all descendants.
    pub fn dispose(&self) {
        let parent = {
            let mut arena = self.graph.lock();
            let Some(parent) = arena.nodes.get(&*self.id).map(|n| n.parent.clone()) else {
                return;
            };
            if let Some(p) = parent.as_ref().and_then(|p| arena.nodes.get_mut(p)) {
                p.children.retain(|c| c.as_str() != &*self.id);
            }
            arena.remove_subtree(&self.id);
            parent
        };
        debug!(target: "livedoc::scope", id = %self.id, "scope disposed");
        if let Some(parent) = parent {
            self.graph
                .notify(&parent, &ScopeEvent::ChildDetached(self.id.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn graph() -> ScopeGraph<i64> {
        ScopeGraph::new()
    }

    #[test]
    fn test_lookup_walks_parent_chain() {
        let graph = graph();
        let root = graph.root();
        root.set("a", 1);
        let doc = root.child("page/a.md");
        let f0 = doc.child("page/a.md/0");
        f0.set("b", 2);
        let f1 = f0.child("page/a.md/1");

        assert_eq!(f1.get("a"), Some(1));
        assert_eq!(f1.get("b"), Some(2));
        assert!(f1.has("b"));
        assert!(!doc.has("b"));
        assert_eq!(doc.get("missing"), None);
    }

    #[test]
    fn test_local_shadows_parent() {
        let graph = graph();
        let root = graph.root();
        root.set("x", 1);
        let child = root.child("c");
        child.set("x", 2);
        assert_eq!(child.get("x"), Some(2));
        child.reset();
        assert_eq!(child.get("x"), Some(1));
    }

    #[test]
    fn test_set_many_extends_without_clearing() {
        let graph = graph();
        let root = graph.root();
        root.set("a", 1);
        root.set_many([("b".to_string(), 2), ("a".to_string(), 3)]);
        assert_eq!(root.local_names(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(root.get("a"), Some(3));
    }

    #[test]
    fn test_same_id_returns_same_node() {
        let graph = graph();
        let root = graph.root();
        let first = root.child("page/a.md");
        first.set("k", 7);
        let again = root.child("page/a.md");
        assert_eq!(first, again);
        assert_eq!(again.get("k"), Some(7));
        assert_eq!(root.children().len(), 1);
        assert_eq!(graph.scope_count(), 2);
    }

    #[test]
    fn test_reparent_existing_id() {
        let graph = graph();
        let root = graph.root();
        let a = root.child("a");
        let b = root.child("b");
        let x = a.child("x");
        let moved = b.child("x");
        assert_eq!(x, moved);
        assert_eq!(moved.parent(), Some(b.clone()));
        assert!(a.children().is_empty());
        assert_eq!(b.children(), vec![moved]);
    }

    #[test]
    fn test_dispose_descendants_keeps_node() {
        let graph = graph();
        let doc = graph.root().child("page/a.md");
        let f0 = doc.child("page/a.md/0");
        let f1 = f0.child("page/a.md/1");

        doc.dispose_descendants();
        assert!(!doc.is_disposed());
        assert!(f0.is_disposed());
        assert!(f1.is_disposed());
        assert!(doc.children().is_empty());
        assert!(graph.scope("page/a.md/1").is_none());

        // Disposed handles ignore writes.
        f1.set("z", 1);
        assert_eq!(f1.get("z"), None);
    }

    #[test]
    fn test_dispose_detaches_from_parent() {
        let graph = graph();
        let root = graph.root();
        let doc = root.child("doc");
        doc.child("doc/0");
        doc.dispose();
        assert!(doc.is_disposed());
        assert!(root.children().is_empty());
        assert_eq!(graph.scope_count(), 1);
    }

    #[test]
    fn test_listeners_fire_on_mutation_and_children() {
        let graph = graph();
        let root = graph.root();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let id = root.on_change(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        root.set("a", 1);
        root.reset();
        let child = root.child("c");
        child.dispose();
        assert_eq!(count.load(Ordering::SeqCst), 4);

        // Re-fetching an attached child is not a change.
        let _ = root.child("d");
        let _ = root.child("d");
        assert_eq!(count.load(Ordering::SeqCst), 5);

        root.off(id);
        root.set("b", 2);
        assert_eq!(count.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_listener_may_read_scope() {
        let graph = graph();
        let root = graph.root();
        let reader = root.clone();
        let observed = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&observed);
        root.on_change(move |_| {
            *sink.lock().unwrap() = reader.get("v");
        });
        root.set("v", 42);
        assert_eq!(*observed.lock().unwrap(), Some(42));
    }

    #[tokio::test]
    async fn test_wait_for_unblock() {
        let graph = graph();
        let scope = graph.root().child("f0");
        scope.block();
        assert!(scope.is_blocked());

        let waiter = scope.clone();
        let handle = tokio::spawn(async move {
            waiter.wait_for_unblock().await;
            waiter.get("done")
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!handle.is_finished());

        scope.set("done", 1);
        scope.unblock();
        assert_eq!(handle.await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_wait_returns_when_not_blocked_or_disposed() {
        let graph = graph();
        let scope = graph.root().child("f0");
        scope.wait_for_unblock().await;

        scope.block();
        let waiter = scope.clone();
        let handle = tokio::spawn(async move { waiter.wait_for_unblock().await });
        tokio::task::yield_now().await;
        scope.dispose();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_fragment_chain_ordering() {
        // F0 publishes after an async delay; F1 must observe it, F0's read scope must not.
        let graph = graph();
        let doc = graph.root().child("page/n.md");
        let w0 = doc.child("page/n.md/0");
        let w1 = w0.child("page/n.md/1");

        w0.block();
        let producer = w0.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            producer.set("total", 10);
            producer.unblock();
        });

        w0.wait_for_unblock().await;
        assert_eq!(w1.get("total"), Some(10));
        assert_eq!(doc.get("total"), None);
    }
}
