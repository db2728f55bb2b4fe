pub mod bundle;
pub mod plan;
pub mod preview;
pub mod refresh;
pub mod report;
pub mod transpile;
pub mod watch;

use livedoc_core::loader::{ModuleLoader, StaticHost};
use livedoc_core::registry::{ModuleRegistry, HOST_RUNTIME_MODULES};
use livedoc_core::transpile::DEFAULT_MODULE_REGISTRY;
use livedoc_core::{Config, DocumentStore, Error, FsStore, OxcTranspiler, Settings, Transpiler};
use serde::Serialize;
use std::sync::Arc;

/// Error object embedded in every JSON result.
#[derive(Debug, Serialize)]
pub struct ErrorJson {
    pub code: String,
    pub message: String,
}

impl From<&Error> for ErrorJson {
    fn from(error: &Error) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

/// Collaborators shared by the commands that load modules.
pub struct VaultRuntime {
    pub store: Arc<dyn DocumentStore>,
    pub transpiler: Arc<dyn Transpiler>,
    pub loader: Arc<ModuleLoader<StaticHost>>,
}

impl VaultRuntime {
    pub fn new(config: &Config, settings: &Settings) -> Self {
        let store: Arc<dyn DocumentStore> = Arc::new(FsStore::new(config.vault.clone()));
        let transpiler: Arc<dyn Transpiler> = Arc::new(OxcTranspiler::new());

        let registry = ModuleRegistry::new();
        for source in HOST_RUNTIME_MODULES {
            registry.insert(source, source.to_string());
        }
        let host = StaticHost::new().with_registry(registry, DEFAULT_MODULE_REGISTRY);

        let loader = ModuleLoader::new(Arc::clone(&store), Arc::clone(&transpiler), Arc::new(host))
            .with_components_folders(&settings.components_folders);
        Self {
            store,
            transpiler,
            loader: Arc::new(loader),
        }
    }
}

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => tracing::error!(error = %e, "failed to serialize output"),
    }
}
