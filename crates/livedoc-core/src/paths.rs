//! Vault path helpers and well-known locations.
//!
//! Every path handled by the core is vault-relative and slash-separated,
//! regardless of the host platform.

use std::path::{Path, PathBuf};

/// Prefix of synthetic module ids handed to the bundler.
pub const VAULT_MODULE_PREFIX: &str = "livedoc://vault/";

/// Directory (vault-relative) holding livedoc's own files.
pub const STATE_DIR: &str = ".livedoc";

/// Fixed location of the diagnostic report written after every load.
pub const DIAGNOSTIC_REPORT_PATH: &str = ".livedoc/last-load.json";

/// Settings file location (vault-relative).
pub const SETTINGS_PATH: &str = ".livedoc/settings.json";

/// Reserved per-folder storage file that never triggers a refresh.
pub const STORAGE_FILE_NAME: &str = "storage.json";

/// Extensions appended, in order, when probing a relative import. Also the
/// extensions that make a changed file eligible for auto-refresh.
pub const SOURCE_EXTENSIONS: [&str; 5] = [".js", ".jsx", ".ts", ".tsx", ".css"];

/// Extensions probed, in order, for a components folder's `index` file.
pub const INDEX_EXTENSIONS: [&str; 4] = ["js", "jsx", "ts", "tsx"];

/// Specifier prefixes left to the host's own dynamic import at run time.
pub const RUNTIME_EXTERNAL_PREFIXES: [&str; 2] = ["http://", "https://"];

/// Find the vault root by walking up from `cwd` looking for `.livedoc` or `.obsidian`.
#[must_use]
pub fn vault_root(cwd: &Path) -> Option<PathBuf> {
    let mut current = cwd.to_path_buf();

    loop {
        if current.join(STATE_DIR).is_dir() || current.join(".obsidian").is_dir() {
            return Some(current);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Normalize a user-supplied path: `\` becomes `/`, repeated slashes collapse,
/// a leading `./` and any trailing slashes are removed.
#[must_use]
pub fn normalize_slash_path(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_slash = false;
    for c in value.chars() {
        let c = if c == '\\' { '/' } else { c };
        if c == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        out.push(c);
    }

    let trimmed = out.strip_prefix("./").unwrap_or(&out);
    trimmed.trim_end_matches('/').to_string()
}

/// Resolve `relative` against the directory of `base_file`.
///
/// `.` segments are skipped and `..` pops one directory; popping above the
/// vault root is a no-op.
#[must_use]
pub fn resolve_relative(base_file: &str, relative: &str) -> String {
    let mut parts: Vec<&str> = base_file.split('/').filter(|p| !p.is_empty()).collect();
    parts.pop();

    for segment in relative.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }

    parts.join("/")
}

/// Map a vault path to the bundler's module id.
#[must_use]
pub fn to_module_id(path: &str) -> String {
    format!("{VAULT_MODULE_PREFIX}{}", normalize_slash_path(path))
}

/// Recover the vault path from a module id, if it carries the vault prefix.
#[must_use]
pub fn from_module_id(id: &str) -> Option<&str> {
    id.strip_prefix(VAULT_MODULE_PREFIX)
}

/// Whether a specifier is resolved by the host at run time instead of bundled.
#[must_use]
pub fn is_runtime_external(specifier: &str) -> bool {
    RUNTIME_EXTERNAL_PREFIXES
        .iter()
        .any(|prefix| specifier.starts_with(prefix))
}

/// Whether a specifier is relative (`./x`, `../x`).
#[must_use]
pub fn is_relative(specifier: &str) -> bool {
    specifier.starts_with("./") || specifier.starts_with("../")
}

/// Lowercased extension of the last path segment, without the dot.
#[must_use]
pub fn extension(path: &str) -> Option<String> {
    let name = path.rsplit('/').next()?;
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_normalize_slash_path() {
        assert_eq!(normalize_slash_path("Components"), "Components");
        assert_eq!(normalize_slash_path("./Components/"), "Components");
        assert_eq!(normalize_slash_path("a\\\\b//c///"), "a/b/c");
        assert_eq!(normalize_slash_path("././x"), "./x");
        assert_eq!(normalize_slash_path(""), "");
        assert_eq!(normalize_slash_path("/"), "");
    }

    #[test]
    fn test_resolve_relative() {
        assert_eq!(
            resolve_relative("Components/index.tsx", "./ui/Card"),
            "Components/ui/Card"
        );
        assert_eq!(
            resolve_relative("Components/ui/Card.tsx", "../theme.css"),
            "Components/theme.css"
        );
        assert_eq!(resolve_relative("index.ts", "../../x"), "x");
    }

    #[test]
    fn test_module_id_round_trip() {
        let id = to_module_id("./Components/index.tsx");
        assert_eq!(id, "livedoc://vault/Components/index.tsx");
        assert_eq!(from_module_id(&id), Some("Components/index.tsx"));
        assert_eq!(from_module_id("https://esm.sh/x"), None);
    }

    #[test]
    fn test_specifier_kinds() {
        assert!(is_runtime_external("https://esm.sh/react"));
        assert!(is_runtime_external("http://localhost/x.js"));
        assert!(!is_runtime_external("react"));
        assert!(is_relative("./a"));
        assert!(is_relative("../a"));
        assert!(!is_relative(".hidden"));
    }

    #[test]
    fn test_extension() {
        assert_eq!(extension("a/b/Card.TSX").as_deref(), Some("tsx"));
        assert_eq!(extension("a/b/Card"), None);
        assert_eq!(extension("a/.env"), None);
    }

    #[test]
    fn test_vault_root() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".obsidian")).unwrap();
        std::fs::create_dir_all(dir.path().join("notes/daily")).unwrap();

        let found = vault_root(&dir.path().join("notes/daily")).unwrap();
        assert_eq!(found, dir.path());
    }
}
