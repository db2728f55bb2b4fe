//! `livedoc watch` command implementation.
//!
//! Watches the vault and reloads the components module when one of its
//! sources changes. Settings edits are picked up without a restart.

use super::VaultRuntime;
use livedoc_core::loader::StaticHost;
use livedoc_core::paths::SETTINGS_PATH;
use livedoc_core::refresh::{should_auto_refresh_for_path, StorageEvent};
use livedoc_core::{AutoRefresh, Config, ModuleLoader, RefreshCoordinator, ScopeGraph, Settings};
use livedoc_util::fs::{relative_slash_path, vault_files};
use miette::{IntoDiagnostic, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub fn run(config: &Config, settings: Settings) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    runtime.block_on(watch(config, settings))
}

async fn watch(config: &Config, settings: Settings) -> Result<()> {
    let root = std::fs::canonicalize(&config.vault).unwrap_or_else(|_| config.vault.clone());
    let vault = VaultRuntime::new(config, &settings);
    let graph: ScopeGraph<String> = ScopeGraph::new();
    let coordinator = RefreshCoordinator::new(Arc::clone(&vault.loader), graph.root());
    let auto = AutoRefresh::new(coordinator.clone(), settings.clone());

    let mut renders = coordinator.subscribe_renders();
    let published = coordinator.clone();
    tokio::spawn(async move {
        while renders.changed().await.is_ok() {
            let generation = *renders.borrow_and_update();
            info!(
                generation,
                ok = published.last_ok(),
                exports = ?published.root().local_names(),
                "components published"
            );
        }
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if let Err(e) = tx.send(event) {
                    warn!(error = %e, "failed to forward watch event");
                }
            }
            Err(e) => error!(error = %e, "watch error"),
        },
        notify::Config::default(),
    )
    .into_diagnostic()?;
    watcher.watch(&root, RecursiveMode::Recursive).into_diagnostic()?;

    let sources = vault_files(&root)
        .iter()
        .filter(|path| should_auto_refresh_for_path(path, &settings.components_folders, true, true))
        .count();
    info!(vault = %root.display(), folders = ?settings.components_folders, sources, "watching vault");

    auto.startup().await;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                for change in storage_events(&root, &event) {
                    if change.paths().contains(&SETTINGS_PATH) {
                        reload_settings(config, &vault, &auto);
                    }
                    auto.handle(&change);
                }
            }
            _ = &mut shutdown => {
                info!("stopping watcher");
                break;
            }
        }
    }
    Ok(())
}

fn reload_settings(config: &Config, vault: &VaultRuntime, auto: &AutoRefresh<ModuleLoader<StaticHost>>) {
    match Settings::load(&config.settings_path()) {
        Ok(settings) => {
            debug!(folders = ?settings.components_folders, enabled = settings.auto_refresh_enabled, "settings reloaded");
            vault.loader.set_components_folders(&settings.components_folders);
            auto.update_settings(settings);
        }
        Err(e) => warn!(error = %e, "keeping previous settings"),
    }
}

/// Translate a filesystem event into vault-relative storage events.
fn storage_events(root: &Path, event: &Event) -> Vec<StorageEvent> {
    let relative = |paths: &[PathBuf]| -> Vec<String> {
        paths
            .iter()
            .filter_map(|path| relative_slash_path(root, path))
            .collect()
    };

    match &event.kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match event.paths.as_slice() {
            [from, to] => match (relative_slash_path(root, from), relative_slash_path(root, to)) {
                (Some(old_path), Some(path)) => vec![StorageEvent::Rename { path, old_path }],
                (Some(old_path), None) => vec![StorageEvent::Delete(old_path)],
                (None, Some(path)) => vec![StorageEvent::Create(path)],
                (None, None) => Vec::new(),
            },
            _ => Vec::new(),
        },
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) | EventKind::Remove(_) => {
            relative(&event.paths).into_iter().map(StorageEvent::Delete).collect()
        }
        EventKind::Modify(ModifyKind::Name(_)) | EventKind::Create(_) => {
            relative(&event.paths).into_iter().map(StorageEvent::Create).collect()
        }
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) => relative(&event.paths).into_iter().map(StorageEvent::Modify).collect(),
        _ => Vec::new(),
    }
}
