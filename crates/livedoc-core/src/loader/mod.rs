//! User-module loading.
//!
//! Finds the components index file, bundles it into one chunk, imports the
//! chunk through a [`ModuleHost`] and returns its exports. Every run records
//! a bounded timeline and leaves a diagnostic report behind; failures are
//! downgraded to `ok: false` plus a notice and never reach the caller.

mod host;
mod report;
mod timeline;

pub use host::{LogNotifier, ModuleHost, NotificationSink, StaticHost};
pub use report::{
    show_last_report, DiagnosticReport, LoadPhase, LoadTrigger, NO_REPORT_MESSAGE,
    REPORT_PREVIEW_CHARS,
};
pub use timeline::{
    to_serializable, truncate_string, Timeline, TimelineEvent, MAX_COLLECTION_ENTRIES, MAX_DEPTH,
    MAX_STRING_CHARS, MAX_TIMELINE_EVENTS,
};

use crate::bundler::{BundleResult, Bundler, StylePlugin, VirtualFsPlugin};
use crate::config::{normalize_components_folders, DEFAULT_COMPONENTS_FOLDER};
use crate::error::{Error, Result};
use crate::paths::{normalize_slash_path, INDEX_EXTENSIONS};
use crate::registry::Exports;
use crate::store::DocumentStore;
use crate::transpile::{RuntimeGlobals, Transpiler};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error, info};

/// Characters of bundled code kept in an import failure report.
const BUNDLED_CODE_PREVIEW_CHARS: usize = 1200;

/// Result of [`ModuleLoader::load_user_module`].
#[derive(Debug, Clone)]
pub struct LoadOutcome<V> {
    pub registry: Exports<V>,
    pub ok: bool,
}

impl<V> LoadOutcome<V> {
    fn failed() -> Self {
        Self {
            registry: Exports::new(),
            ok: false,
        }
    }
}

/// Loads the user's components module.
pub struct ModuleLoader<H: ModuleHost> {
    store: Arc<dyn DocumentStore>,
    transpiler: Arc<dyn Transpiler>,
    host: Arc<H>,
    notifier: Arc<dyn NotificationSink>,
    globals: RuntimeGlobals,
    folders: RwLock<Vec<String>>,
    loads: AtomicU64,
}

impl<H: ModuleHost> ModuleLoader<H> {
    pub fn new(store: Arc<dyn DocumentStore>, transpiler: Arc<dyn Transpiler>, host: Arc<H>) -> Self {
        Self {
            store,
            transpiler,
            host,
            notifier: Arc::new(LogNotifier),
            globals: RuntimeGlobals::default(),
            folders: RwLock::new(vec![DEFAULT_COMPONENTS_FOLDER.to_string()]),
            loads: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    #[must_use]
    pub fn with_globals(mut self, globals: RuntimeGlobals) -> Self {
        self.globals = globals;
        self
    }

    #[must_use]
    pub fn with_components_folders(self, folders: &[String]) -> Self {
        self.set_components_folders(folders);
        self
    }

    /// Replace the probed folders; an empty normalized list falls back to the default.
    pub fn set_components_folders(&self, folders: &[String]) {
        let mut normalized = normalize_components_folders(folders);
        if normalized.is_empty() {
            normalized.push(DEFAULT_COMPONENTS_FOLDER.to_string());
        }
        *self.folders.write().unwrap_or_else(PoisonError::into_inner) = normalized;
    }

    #[must_use]
    pub fn components_folders(&self) -> Vec<String> {
        self.folders.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    #[must_use]
    pub fn host(&self) -> &Arc<H> {
        &self.host
    }

    /// Bundle the module graph rooted at `entry` into a single chunk.
    pub fn bundle_file(&self, entry: &str) -> Result<BundleResult> {
        let plugin = VirtualFsPlugin::new(Arc::clone(&self.store), Arc::clone(&self.transpiler))
            .with_globals(self.globals.clone());
        Bundler::new()
            .plugin(Box::new(plugin))
            .plugin(Box::new(StylePlugin))
            .bundle(entry)
    }

    /// Import `code` as a fresh module instance and return its exports.
    ///
    /// The object URL is revoked whether or not the import succeeds.
    pub async fn load_module(&self, code: &str) -> Result<Exports<H::Value>> {
        let marked = format!("// Cache buster: {}\n\n{code}", self.cache_buster());
        let url = self.host.create_object_url(&marked);
        debug!(target: "livedoc::loader", url = %url, bytes = marked.len(), "importing module");
        let result = self.host.import(&url).await;
        self.host.revoke_object_url(&url);
        result
    }

    fn cache_buster(&self) -> String {
        let n = self.loads.fetch_add(1, Ordering::Relaxed);
        let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        livedoc_util::hash::short_token(&[&n.to_le_bytes(), &nanos.to_le_bytes()])
    }

    /// First `<folder>/index.<ext>` that exists, folders and extensions in order.
    pub fn find_index(&self, folders: &[String], timeline: &mut Timeline) -> Result<String> {
        let mut tried = Vec::new();
        for folder in folders {
            for ext in INDEX_EXTENSIONS {
                let candidate = normalize_slash_path(&format!("{folder}/index.{ext}"));
                let exists = self.store.exists(&candidate);
                timeline.record("index.probe", json!({ "path": candidate, "exists": exists }));
                if exists {
                    return Ok(candidate);
                }
                tried.push(candidate);
            }
        }
        Err(Error::IndexNotFound {
            folders: folders.to_vec(),
            tried,
        })
    }

    /// Locate, bundle and import the user module. Never fails: errors are
    /// reported and yield an empty registry with `ok: false`.
    pub async fn load_user_module(&self, trigger: LoadTrigger) -> LoadOutcome<H::Value> {
        let folders = self.components_folders();
        let mut timeline = Timeline::new();
        timeline.record("load.start", json!({ "trigger": trigger, "folders": folders }));
        info!(target: "livedoc::loader", %trigger, folders = ?folders, "loading user module");

        let entry = match self.find_index(&folders, &mut timeline) {
            Ok(entry) => entry,
            Err(e) => {
                let context = json!({ "folders": folders });
                return self.fail(LoadPhase::Bundle, trigger, context, timeline, &e);
            }
        };

        timeline.record("bundle.start", json!({ "entry": entry }));
        let bundle = match self.bundle_file(&entry) {
            Ok(bundle) => bundle,
            Err(e) => {
                timeline.record("bundle.error", json!({ "code": e.code(), "message": e.to_string() }));
                let context = json!({ "folders": folders, "entry": entry });
                return self.fail(LoadPhase::Bundle, trigger, context, timeline, &e);
            }
        };
        timeline.record(
            "bundle.done",
            json!({
                "modules": bundle.modules,
                "externals": bundle.externals,
                "hash": bundle.hash,
                "bytes": bundle.code.len(),
            }),
        );

        timeline.record("import.start", json!({ "bytes": bundle.code.len() }));
        match self.load_module(&bundle.code).await {
            Ok(registry) => {
                let names: Vec<&String> = registry.keys().collect();
                timeline.record("import.done", json!({ "exports": names }));
                let context = json!({ "folders": folders, "entry": entry, "exports": names });
                let report = DiagnosticReport::new(LoadPhase::Success, trigger, context, timeline.into_events());
                report.write(self.store.as_ref());
                info!(target: "livedoc::loader", %trigger, entry = %entry, exports = registry.len(), "user module loaded");
                LoadOutcome { registry, ok: true }
            }
            Err(e) => {
                timeline.record("import.error", json!({ "code": e.code(), "message": e.to_string() }));
                let context = json!({
                    "folders": folders,
                    "entry": entry,
                    "bundledCodePreview": bundle.code.chars().take(BUNDLED_CODE_PREVIEW_CHARS).collect::<String>(),
                });
                self.fail(LoadPhase::Import, trigger, context, timeline, &e)
            }
        }
    }

    fn fail(
        &self,
        phase: LoadPhase,
        trigger: LoadTrigger,
        context: Value,
        timeline: Timeline,
        err: &Error,
    ) -> LoadOutcome<H::Value> {
        error!(target: "livedoc::loader", %trigger, phase = ?phase, code = err.code(), error = %err, "user module load failed");
        let report = DiagnosticReport::new(phase, trigger, context, timeline.into_events()).with_error(err);
        let written = report.write(self.store.as_ref());

        let stage = if phase == LoadPhase::Import { "loading" } else { "bundling" };
        self.notifier
            .notify(&format!("Error happened while {stage} components: {err}"));
        if let Some(path) = written {
            self.notifier.notify(&format!("Debug details written to {path}"));
        }
        LoadOutcome::failed()
    }
}
