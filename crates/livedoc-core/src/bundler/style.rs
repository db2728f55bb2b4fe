//! Stylesheet plugin: turns imported `.css` files into modules that inject
//! a `<style>` element when evaluated.

use super::{HookResult, Plugin, TransformResult};
use crate::paths::{extension, from_module_id};
use crate::transpile::js_string;

const NAME: &str = "livedoc-styles";

pub struct StylePlugin;

impl Plugin for StylePlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn transform(&self, code: &str, id: &str) -> HookResult<Option<TransformResult>> {
        let is_css = from_module_id(id).and_then(extension).as_deref() == Some("css");
        if !is_css {
            return Ok(None);
        }
        tracing::trace!(target: "livedoc::bundler", id, bytes = code.len(), "stylesheet injected");
        Ok(Some(TransformResult::code(style_injection(code))))
    }
}

/// Self-executing snippet appending the stylesheet to `document.head`.
#[must_use]
pub fn style_injection(css: &str) -> String {
    format!(
        "(() => {{\n  const style = document.createElement(\"style\");\n  style.textContent = {};\n  document.head.appendChild(style);\n}})();\n",
        js_string(css)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_css_becomes_style_injection() {
        let out = StylePlugin
            .transform("b { color: \"red\" }", "livedoc://vault/C/a.css")
            .unwrap()
            .unwrap();
        assert!(out.code.contains("document.createElement(\"style\")"));
        assert!(out.code.contains("style.textContent = \"b { color: \\\"red\\\" }\";"));
    }

    #[test]
    fn test_non_css_untouched() {
        assert!(StylePlugin.transform("export {}", "livedoc://vault/C/a.js").unwrap().is_none());
        assert!(StylePlugin.transform("b {}", "other:a.css").unwrap().is_none());
    }
}
