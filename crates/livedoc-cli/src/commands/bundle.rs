//! `livedoc bundle` command implementation.
//!
//! Bundles the components folder (or an explicit entry) into the single chunk
//! the loader would import.

use super::{print_json, ErrorJson, VaultRuntime};
use livedoc_core::bundler::BundleResult;
use livedoc_core::loader::Timeline;
use livedoc_core::paths::normalize_slash_path;
use livedoc_core::{Config, Settings};
use miette::{miette, Result};
use serde::Serialize;
use std::time::Instant;

#[derive(Serialize)]
struct BundleResultJson {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    entry: Option<String>,
    modules: Vec<String>,
    externals: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hash: Option<String>,
    size_bytes: usize,
    duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorJson>,
}

pub fn run(config: &Config, settings: &Settings, entry: Option<String>, json: bool) -> Result<()> {
    let start = Instant::now();
    let runtime = VaultRuntime::new(config, settings);
    let loader = &runtime.loader;

    let entry = match entry {
        Some(entry) => Ok(normalize_slash_path(&entry)),
        None => loader.find_index(&loader.components_folders(), &mut Timeline::new()),
    };
    let result = entry.and_then(|entry| loader.bundle_file(&entry).map(|bundle| (entry, bundle)));
    let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

    match result {
        Ok((entry, bundle)) => {
            tracing::info!(entry = %entry, modules = bundle.modules.len(), duration_ms, "bundled");
            if json {
                print_json(&success_json(entry, bundle, duration_ms));
            } else {
                print!("{}", bundle.code);
            }
            Ok(())
        }
        Err(e) if json => {
            print_json(&BundleResultJson {
                ok: false,
                entry: None,
                modules: Vec::new(),
                externals: Vec::new(),
                hash: None,
                size_bytes: 0,
                duration_ms,
                error: Some(ErrorJson::from(&e)),
            });
            std::process::exit(1);
        }
        Err(e) => Err(miette!("{}: {e}", e.code())),
    }
}

fn success_json(entry: String, bundle: BundleResult, duration_ms: u64) -> BundleResultJson {
    BundleResultJson {
        ok: true,
        entry: Some(entry),
        size_bytes: bundle.code.len(),
        modules: bundle.modules,
        externals: bundle.externals,
        hash: Some(bundle.hash),
        duration_ms,
        error: None,
    }
}
