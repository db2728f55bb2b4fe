//! `livedoc refresh` command implementation.

use super::{print_json, VaultRuntime};
use livedoc_core::{Config, LoadTrigger, RefreshCoordinator, ScopeGraph, Settings};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::sync::Arc;

/// Notice posted after a successful manual refresh.
const RELOADED_MESSAGE: &str = "User module was reloaded.";

#[derive(Serialize)]
struct RefreshJson {
    ok: bool,
    exports: Vec<String>,
}

/// Load the components module once, as a manual refresh would.
pub fn run(config: &Config, settings: &Settings, json: bool) -> Result<()> {
    let vault = VaultRuntime::new(config, settings);
    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;

    let (ok, exports) = runtime.block_on(async {
        let graph: ScopeGraph<String> = ScopeGraph::new();
        let coordinator = RefreshCoordinator::new(Arc::clone(&vault.loader), graph.root());
        let ok = coordinator.refresh(LoadTrigger::Refresh).await;
        (ok, coordinator.root().local_names())
    });

    if json {
        print_json(&RefreshJson { ok, exports });
    } else if ok {
        println!("{RELOADED_MESSAGE}");
        if !exports.is_empty() {
            println!("exports: {}", exports.join(", "));
        }
    }
    if !ok {
        std::process::exit(1);
    }
    Ok(())
}
