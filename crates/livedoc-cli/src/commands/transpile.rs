//! `livedoc transpile` command implementation.

use super::{print_json, ErrorJson};
use livedoc_core::{Error, OxcTranspiler, TranspileOptions, Transpiler};
use miette::{miette, IntoDiagnostic, Result};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct TranspileAction {
    pub file: PathBuf,
    /// Scope the free identifiers are rewritten against.
    pub scope: Option<String>,
    pub rewrite_imports: bool,
}

#[derive(Serialize)]
struct TranspileResultJson {
    ok: bool,
    filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorJson>,
}

pub fn run(action: TranspileAction, json: bool) -> Result<()> {
    let source = livedoc_util::fs::read_text_lossy(&action.file).into_diagnostic()?;
    let filename = action
        .file
        .file_name()
        .map_or_else(|| "fragment.tsx".to_string(), |n| n.to_string_lossy().into_owned());

    let mut options = TranspileOptions::new()
        .with_filename(filename.clone())
        .with_rewrite_imports(action.rewrite_imports);
    if let Some(scope) = &action.scope {
        options = options.with_scope(scope.clone());
    }

    let result = OxcTranspiler::new().transpile(&source, &options).map_err(Error::from);
    match (result, json) {
        (Ok(code), false) => {
            print!("{code}");
            Ok(())
        }
        (Ok(code), true) => {
            print_json(&TranspileResultJson {
                ok: true,
                filename,
                code: Some(code),
                error: None,
            });
            Ok(())
        }
        (Err(e), false) => Err(miette!("{e}")),
        (Err(e), true) => {
            print_json(&TranspileResultJson {
                ok: false,
                filename,
                code: None,
                error: Some(ErrorJson::from(&e)),
            });
            std::process::exit(1);
        }
    }
}
