//! Per-fragment evaluation.
//!
//! Statement blocks hold their write scope blocked from the first poll until
//! their exports are published, and every fragment waits for its whole read
//! chain before evaluating. Fragments of one document can therefore run
//! concurrently and still observe each other in source order.

use super::scan::FragmentKind;
use crate::error::{Error, Result};
use crate::loader::{ModuleHost, ModuleLoader};
use crate::registry::Exports;
use crate::scope::Scope;
use crate::transpile::{wrap_inline_expression, wrap_markup_factory, RuntimeGlobals, TranspileOptions, Transpiler};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error};

/// Prefix of inline error text.
pub const INLINE_ERROR_MARK: &str = "❗️";

/// Scopes one fragment reads from and publishes to.
#[derive(Debug, Clone)]
pub struct FragmentContext<V> {
    pub read: Scope<V>,
    pub write: Scope<V>,
    pub shortcut_component: Option<String>,
}

/// What a renderer shows for a fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum FragmentOutput<V> {
    /// Inline text: an expression value or a `❗️` error.
    Text(String),
    /// Component factory built from markup.
    Markup(V),
    /// Shorthand component with the raw block content as children.
    Component { component: V, children: String },
    /// Names a statement block published to its write scope.
    Published(Vec<String>),
    /// Placeholder for an empty markup block.
    Empty,
    /// Error alert in place of a block.
    Error(String),
}

/// Evaluates fragments against a module host.
pub struct FragmentEvaluator<H: ModuleHost> {
    loader: Arc<ModuleLoader<H>>,
    transpiler: Arc<dyn Transpiler>,
    globals: RuntimeGlobals,
    ready: Option<watch::Receiver<u64>>,
}

impl<H: ModuleHost> FragmentEvaluator<H> {
    pub fn new(loader: Arc<ModuleLoader<H>>, transpiler: Arc<dyn Transpiler>) -> Self {
        Self {
            loader,
            transpiler,
            globals: RuntimeGlobals::default(),
            ready: None,
        }
    }

    #[must_use]
    pub fn with_globals(mut self, globals: RuntimeGlobals) -> Self {
        self.globals = globals;
        self
    }

    /// Gate markup on the first completed user-module load; takes the
    /// coordinator's render generation.
    #[must_use]
    pub fn with_ready_signal(mut self, renders: watch::Receiver<u64>) -> Self {
        self.ready = Some(renders);
        self
    }

    pub async fn evaluate(
        &self,
        kind: FragmentKind,
        content: &str,
        ctx: &FragmentContext<H::Value>,
    ) -> FragmentOutput<H::Value> {
        debug!(target: "livedoc::editor", kind = %kind, read = ctx.read.id(), write = ctx.write.id(), "evaluating fragment");
        match kind {
            FragmentKind::InlineExpression => match self.inline_expression(content, ctx).await {
                Ok(text) => FragmentOutput::Text(text),
                Err(e) => {
                    error!(target: "livedoc::editor", error = %e, "inline expression evaluation failed");
                    FragmentOutput::Text(format!("{INLINE_ERROR_MARK}{e}"))
                }
            },
            FragmentKind::InlineMarkup => match self.inline_markup(content, ctx).await {
                Ok(factory) => FragmentOutput::Markup(factory),
                Err(e) => {
                    error!(target: "livedoc::editor", error = %e, "inline markup rendering failed");
                    FragmentOutput::Text(format!("{INLINE_ERROR_MARK}{e}"))
                }
            },
            FragmentKind::BlockStatement => {
                ctx.write.block();
                wait_for_chain(&ctx.read).await;
                let published = self.statement_block(content, ctx).await;
                ctx.write.unblock();
                match published {
                    Ok(names) => FragmentOutput::Published(names),
                    Err(e) => {
                        error!(target: "livedoc::editor", error = %e, write = ctx.write.id(), "statement block evaluation failed");
                        FragmentOutput::Error(e.to_string())
                    }
                }
            }
            FragmentKind::BlockMarkup => {
                if content.is_empty() {
                    return FragmentOutput::Empty;
                }
                match self.block_markup(content, ctx).await {
                    Ok(output) => output,
                    Err(e) => {
                        error!(target: "livedoc::editor", error = %e, "markup block rendering failed");
                        FragmentOutput::Error(e.to_string())
                    }
                }
            }
        }
    }

    async fn inline_expression(&self, content: &str, ctx: &FragmentContext<H::Value>) -> Result<String> {
        let code = self.transpile(&wrap_inline_expression(content), ctx, false)?;
        wait_for_chain(&ctx.read).await;
        let exports = self.loader.load_module(&code).await?;
        let host = self.loader.host();
        let value = host.call(default_export(&exports)?).await?;
        Ok(host.display(&value))
    }

    async fn inline_markup(&self, content: &str, ctx: &FragmentContext<H::Value>) -> Result<H::Value> {
        self.components_ready().await;
        let factory = self.compile_factory(content, ctx).await?;
        wait_for_chain(&ctx.read).await;
        Ok(factory)
    }

    async fn statement_block(&self, content: &str, ctx: &FragmentContext<H::Value>) -> Result<Vec<String>> {
        let code = self.transpile(content, ctx, true)?;
        let exports = self.loader.load_module(&code).await?;
        let names = exports.keys().cloned().collect();
        ctx.write.reset();
        ctx.write.set_many(exports);
        Ok(names)
    }

    async fn block_markup(&self, content: &str, ctx: &FragmentContext<H::Value>) -> Result<FragmentOutput<H::Value>> {
        self.components_ready().await;
        wait_for_chain(&ctx.read).await;
        if let Some(name) = &ctx.shortcut_component {
            let component = ctx
                .read
                .get(name)
                .ok_or_else(|| Error::evaluation(format!("{name} is not defined"), None))?;
            return Ok(FragmentOutput::Component {
                component,
                children: content.to_string(),
            });
        }
        Ok(FragmentOutput::Markup(self.compile_factory(content, ctx).await?))
    }

    async fn compile_factory(&self, markup: &str, ctx: &FragmentContext<H::Value>) -> Result<H::Value> {
        let code = self.transpile(&wrap_markup_factory(markup), ctx, true)?;
        let exports = self.loader.load_module(&code).await?;
        default_export(&exports).cloned()
    }

    fn transpile(&self, source: &str, ctx: &FragmentContext<H::Value>, rewrite_imports: bool) -> Result<String> {
        let options = TranspileOptions::new()
            .with_rewrite_imports(rewrite_imports)
            .with_scope(ctx.read.id())
            .with_globals(self.globals.clone());
        Ok(self.transpiler.transpile(source, &options)?)
    }

    async fn components_ready(&self) {
        if let Some(ready) = &self.ready {
            let mut ready = ready.clone();
            // A closed channel means no load will ever complete; render anyway.
            let _ = ready.wait_for(|generation| *generation > 0).await;
        }
    }
}

fn default_export<V>(exports: &Exports<V>) -> Result<&V> {
    exports
        .get("default")
        .ok_or_else(|| Error::evaluation("Module has no default export", None))
}

/// Wait until `scope` and each of its ancestors is unblocked.
pub async fn wait_for_chain<V: Clone + Send + Sync + 'static>(scope: &Scope<V>) {
    let mut current = Some(scope.clone());
    while let Some(node) = current {
        node.wait_for_unblock().await;
        current = node.parent();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::ScopeGraph;
    use crate::store::{DocumentStore, MemoryStore};
    use crate::transpile::OxcTranspiler;
    use crate::loader::StaticHost;
    use std::time::Duration;

    fn evaluator() -> FragmentEvaluator<StaticHost> {
        let transpiler: Arc<dyn Transpiler> = Arc::new(OxcTranspiler::new());
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let loader = Arc::new(ModuleLoader::new(store, Arc::clone(&transpiler), Arc::new(StaticHost::new())));
        FragmentEvaluator::new(loader, transpiler)
    }

    fn chain(graph: &ScopeGraph<String>) -> (Scope<String>, FragmentContext<String>) {
        let page = graph.root().child("page/a.md");
        let write = page.child("page/a.md/0");
        (
            page.clone(),
            FragmentContext {
                read: page,
                write,
                shortcut_component: None,
            },
        )
    }

    #[tokio::test]
    async fn test_statement_block_publishes_and_unblocks() {
        let graph = ScopeGraph::new();
        let (_, ctx) = chain(&graph);
        ctx.write.set("stale", "old".to_string());

        let out = evaluator()
            .evaluate(FragmentKind::BlockStatement, "export const total = 4;\nexport function f() {}", &ctx)
            .await;
        assert_eq!(out, FragmentOutput::Published(vec!["f".to_string(), "total".to_string()]));
        assert!(!ctx.write.is_blocked());
        assert!(!ctx.write.has("stale"));
        assert_eq!(ctx.write.get("total").as_deref(), Some("total"));
    }

    #[tokio::test]
    async fn test_statement_block_error_still_unblocks() {
        let graph = ScopeGraph::new();
        let (_, ctx) = chain(&graph);

        let out = evaluator().evaluate(FragmentKind::BlockStatement, "export const = ;", &ctx).await;
        assert!(matches!(out, FragmentOutput::Error(message) if message.contains("Failed to parse")));
        assert!(!ctx.write.is_blocked());
    }

    #[tokio::test]
    async fn test_inline_expression_and_error() {
        let graph = ScopeGraph::new();
        let (_, ctx) = chain(&graph);
        let evaluator = evaluator();

        let out = evaluator.evaluate(FragmentKind::InlineExpression, " 1 + 2", &ctx).await;
        assert!(matches!(out, FragmentOutput::Text(text) if text.ends_with("()")));

        let out = evaluator.evaluate(FragmentKind::InlineExpression, " )(", &ctx).await;
        assert!(matches!(out, FragmentOutput::Text(text) if text.starts_with(INLINE_ERROR_MARK)));
    }

    #[tokio::test]
    async fn test_block_markup_variants() {
        let graph = ScopeGraph::new();
        let (page, mut ctx) = chain(&graph);
        let evaluator = evaluator();

        assert_eq!(evaluator.evaluate(FragmentKind::BlockMarkup, "", &ctx).await, FragmentOutput::Empty);

        ctx.shortcut_component = Some("Callout".to_string());
        let out = evaluator.evaluate(FragmentKind::BlockMarkup, "hi", &ctx).await;
        assert!(matches!(out, FragmentOutput::Error(message) if message.contains("Callout is not defined")));

        page.set("Callout", "CalloutComponent".to_string());
        let out = evaluator.evaluate(FragmentKind::BlockMarkup, "hi", &ctx).await;
        assert_eq!(
            out,
            FragmentOutput::Component {
                component: "CalloutComponent".to_string(),
                children: "hi".to_string()
            }
        );

        ctx.shortcut_component = None;
        let out = evaluator.evaluate(FragmentKind::BlockMarkup, "<b>x</b>", &ctx).await;
        assert!(matches!(out, FragmentOutput::Markup(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_blocked_ancestor() {
        let graph: ScopeGraph<String> = ScopeGraph::new();
        let page = graph.root().child("page/a.md");
        let first = page.child("page/a.md/0");
        let second = first.child("page/a.md/1");
        first.block();

        let waiter = tokio::spawn({
            let second = second.clone();
            async move { wait_for_chain(&second).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        first.unblock();
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_markup_waits_for_ready_signal() {
        let graph = ScopeGraph::new();
        let (_, ctx) = chain(&graph);
        let (tx, rx) = watch::channel(0u64);
        let evaluator = Arc::new(evaluator().with_ready_signal(rx));

        let task = tokio::spawn({
            let evaluator = Arc::clone(&evaluator);
            let ctx = ctx.clone();
            async move { evaluator.evaluate(FragmentKind::InlineMarkup, "<i>x</i>", &ctx).await }
        });
        tokio::task::yield_now().await;
        assert!(!task.is_finished());

        tx.send_replace(1);
        assert!(matches!(task.await.unwrap(), FragmentOutput::Markup(_)));
    }
}
