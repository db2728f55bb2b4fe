//! `livedoc report` command implementation.

use super::print_json;
use livedoc_core::loader::show_last_report;
use livedoc_core::paths::DIAGNOSTIC_REPORT_PATH;
use livedoc_core::{Config, DocumentStore, FsStore};
use miette::Result;
use serde::Serialize;

#[derive(Serialize)]
struct ReportJson {
    ok: bool,
    path: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<serde_json::Value>,
}

pub fn run(config: &Config, json: bool) -> Result<()> {
    let store = FsStore::new(config.vault.clone());
    if !json {
        println!("{}", show_last_report(&store));
        return Ok(());
    }

    let report = store
        .read(DIAGNOSTIC_REPORT_PATH)
        .ok()
        .and_then(|text| serde_json::from_str(&text).ok());
    print_json(&ReportJson {
        ok: report.is_some(),
        path: DIAGNOSTIC_REPORT_PATH,
        report,
    });
    Ok(())
}
