#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

pub mod bundler;
pub mod config;
mod edits;
pub mod editor;
pub mod error;
pub mod loader;
pub mod paths;
pub mod refresh;
pub mod registry;
pub mod scope;
pub mod store;
pub mod transpile;

pub use config::{Config, Settings};
pub use error::{Error, Result};
pub use loader::{LoadTrigger, ModuleHost, ModuleLoader};
pub use refresh::{AutoRefresh, RefreshCoordinator};
pub use scope::{Scope, ScopeGraph};
pub use store::{DocumentStore, FsStore, MemoryStore};
pub use transpile::{OxcTranspiler, TranspileOptions, Transpiler};

/// Crate version, from Cargo.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
