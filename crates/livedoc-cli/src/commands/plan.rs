//! `livedoc plan` command implementation.
//!
//! Runs one live-preview editor pass over a document and prints what the
//! editor would render: fragments, render keys and scope wiring.

use super::print_json;
use livedoc_core::editor::{EditorProcessor, EditorView};
use livedoc_core::paths::normalize_slash_path;
use livedoc_core::{Config, DocumentStore, FsStore, ScopeGraph};
use miette::{miette, IntoDiagnostic, Result};

pub fn run(config: &Config, document: &str, cursor: Option<&str>, json: bool) -> Result<()> {
    let path = normalize_slash_path(document);
    let text = FsStore::new(config.vault.clone()).read(&path).into_diagnostic()?;
    let cursor = cursor.map(|c| parse_cursor(&text, c)).transpose()?;

    let graph: ScopeGraph<String> = ScopeGraph::new();
    let mut processor = EditorProcessor::new(graph);
    let pass = processor.process(&EditorView {
        file: Some(&path),
        live_preview: true,
        text: &text,
        cursor,
    });

    if json {
        print_json(&pass);
        return Ok(());
    }

    println!("{path}: {} fragment(s)", pass.fragments.len());
    for (fragment, decision) in pass.fragments.iter().zip(&pass.decisions) {
        let state = if decision.skip {
            "editing"
        } else if decision.fresh {
            "render"
        } else {
            "reuse"
        };
        println!(
            "  [{}..{}] {:<17} key={} {state}",
            fragment.from,
            fragment.to,
            fragment.kind.as_str(),
            decision.key
        );
    }
    for instruction in &pass.instructions {
        println!(
            "  #{} reads {} writes {}",
            instruction.index, instruction.read_scope, instruction.write_scope
        );
    }
    Ok(())
}

/// Byte offset of a 1-based `LINE:COL` position, clamped to the line.
fn parse_cursor(text: &str, position: &str) -> Result<usize> {
    let (line, col) = position
        .split_once(':')
        .ok_or_else(|| miette!("invalid cursor '{position}', expected LINE:COL"))?;
    let line: usize = line.trim().parse().into_diagnostic()?;
    let col: usize = col.trim().parse().into_diagnostic()?;
    if line == 0 || col == 0 {
        return Err(miette!("cursor positions are 1-based"));
    }

    let mut offset = 0;
    for (index, raw) in text.split_inclusive('\n').enumerate() {
        if index + 1 == line {
            let body = raw.trim_end_matches(['\n', '\r']);
            let column = body
                .char_indices()
                .nth(col - 1)
                .map_or(body.len(), |(byte, _)| byte);
            return Ok(offset + column);
        }
        offset += raw.len();
    }
    Ok(text.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cursor() {
        let text = "first\nsécond line\nlast";
        assert_eq!(parse_cursor(text, "1:1").unwrap(), 0);
        assert_eq!(parse_cursor(text, "2:3").unwrap(), 9);
        assert_eq!(parse_cursor(text, "2:99").unwrap(), 6 + "sécond line".len());
        assert_eq!(parse_cursor(text, "9:1").unwrap(), text.len());
        assert!(parse_cursor(text, "0:1").is_err());
        assert!(parse_cursor(text, "12").is_err());
    }
}
