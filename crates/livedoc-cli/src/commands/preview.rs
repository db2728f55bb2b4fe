//! `livedoc preview` command implementation.
//!
//! Loads the components module, then evaluates every fragment of a document
//! the way reading mode does. Values are linked, not executed.

use super::{print_json, VaultRuntime};
use livedoc_core::editor::{DocumentKey, FragmentEvaluator, FragmentOutput, PreviewProcessor, PreviewResult};
use livedoc_core::paths::normalize_slash_path;
use livedoc_core::{Config, LoadTrigger, RefreshCoordinator, ScopeGraph, Settings};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PreviewJson {
    ok: bool,
    document: String,
    components_loaded: bool,
    fragments: Vec<FragmentJson>,
}

#[derive(Serialize)]
struct FragmentJson {
    index: usize,
    kind: String,
    output: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    names: Vec<String>,
}

impl From<PreviewResult<String>> for FragmentJson {
    fn from(result: PreviewResult<String>) -> Self {
        let (output, value, names) = match result.output {
            FragmentOutput::Text(text) => ("text", Some(text), Vec::new()),
            FragmentOutput::Markup(factory) => ("markup", Some(factory), Vec::new()),
            FragmentOutput::Component { component, children } => {
                ("component", Some(format!("{component}({children:?})")), Vec::new())
            }
            FragmentOutput::Published(names) => ("published", None, names),
            FragmentOutput::Empty => ("empty", None, Vec::new()),
            FragmentOutput::Error(message) => ("error", Some(message), Vec::new()),
        };
        Self {
            index: result.index,
            kind: result.kind.to_string(),
            output,
            value,
            names,
        }
    }
}

pub fn run(config: &Config, settings: &Settings, document: &str, json: bool) -> Result<()> {
    let path = normalize_slash_path(document);
    let vault = VaultRuntime::new(config, settings);
    let text = vault.store.read(&path).into_diagnostic()?;

    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    let (loaded, results) = runtime.block_on(async {
        let graph: ScopeGraph<String> = ScopeGraph::new();
        let coordinator = RefreshCoordinator::new(Arc::clone(&vault.loader), graph.root());
        let loaded = coordinator.refresh(LoadTrigger::Startup).await;

        let evaluator = FragmentEvaluator::new(Arc::clone(&vault.loader), Arc::clone(&vault.transpiler))
            .with_ready_signal(coordinator.subscribe_renders());
        let processor = PreviewProcessor::new(graph, Arc::new(evaluator));
        let results = processor
            .process_document(&DocumentKey::File(path.clone()), &text)
            .await;
        (loaded, results)
    });

    let fragments: Vec<FragmentJson> = results.into_iter().map(FragmentJson::from).collect();
    if json {
        print_json(&PreviewJson {
            ok: fragments.iter().all(|f| f.output != "error"),
            document: path,
            components_loaded: loaded,
            fragments,
        });
        return Ok(());
    }

    if !loaded {
        println!("components not loaded; run `livedoc report` for details");
    }
    for fragment in &fragments {
        let detail = match (&fragment.value, fragment.names.is_empty()) {
            (Some(value), _) => value.clone(),
            (None, false) => fragment.names.join(", "),
            (None, true) => String::new(),
        };
        println!("#{} {} {}: {detail}", fragment.index, fragment.kind, fragment.output);
    }
    Ok(())
}
