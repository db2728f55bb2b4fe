//! End-to-end: components load into the root scope, an editor pass wires a
//! document's fragments, and each fragment evaluates against its scopes.

use livedoc_core::editor::{EditorProcessor, EditorView, FragmentEvaluator, FragmentOutput};
use livedoc_core::loader::{ModuleLoader, StaticHost};
use livedoc_core::{DocumentStore, LoadTrigger, MemoryStore, OxcTranspiler, RefreshCoordinator, ScopeGraph, Transpiler};
use std::sync::Arc;

const DOC: &str = "```ldjs\nexport const total = 3;\n```\n\n```ldsh:Callout\nTotal is big\n```\n\nTwice: `ldjs: total * 2`\n";

fn view(text: &str) -> EditorView<'_> {
    EditorView {
        file: Some("Notes/a.md"),
        live_preview: true,
        text,
        cursor: None,
    }
}

#[tokio::test]
async fn test_fragments_render_against_published_components() {
    let store = Arc::new(MemoryStore::new().with_file("Components/index.tsx", "export const Callout = () => <aside />;"));
    let documents: Arc<dyn DocumentStore> = store.clone();
    let transpiler: Arc<dyn Transpiler> = Arc::new(OxcTranspiler::new());
    let loader = Arc::new(ModuleLoader::new(documents, Arc::clone(&transpiler), Arc::new(StaticHost::new())));

    let graph: ScopeGraph<String> = ScopeGraph::new();
    let coordinator = RefreshCoordinator::new(Arc::clone(&loader), graph.root());
    assert!(coordinator.refresh(LoadTrigger::Startup).await);
    assert!(graph.root().has("Callout"));

    let evaluator = FragmentEvaluator::new(loader, transpiler).with_ready_signal(coordinator.subscribe_renders());
    let mut processor = EditorProcessor::new(graph.clone());
    let pass = processor.process(&view(DOC));
    assert_eq!(pass.instructions.len(), 3);

    let mut outputs = Vec::new();
    for instruction in &pass.instructions {
        let ctx = processor.context(instruction).unwrap();
        outputs.push(evaluator.evaluate(instruction.kind, &instruction.content, &ctx).await);
    }
    assert_eq!(outputs[0], FragmentOutput::Published(vec!["total".to_string()]));
    assert!(matches!(&outputs[1], FragmentOutput::Component { children, .. } if children == "Total is big"));
    assert!(matches!(&outputs[2], FragmentOutput::Text(text) if text.ends_with("()")));

    // Editing the statement block re-keys it and everything after it.
    let edited = DOC.replace("total = 3", "total = 4");
    let pass = processor.process(&view(&edited));
    assert!(pass.decisions.iter().all(|d| d.fresh));
    assert!(!graph.scope("page/Notes/a.md/0").unwrap().has("total"));

    // A reload publishes new components to every fragment downstream of the root.
    store.insert(
        "Components/index.tsx",
        "export const Callout = () => <aside />;\nexport const Badge = () => <i />;",
    );
    assert!(coordinator.refresh(LoadTrigger::Refresh).await);
    assert!(graph.scope("page/Notes/a.md/2").unwrap().has("Badge"));
    assert_eq!(coordinator.completed_runs(), 2);
}
