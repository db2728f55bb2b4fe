//! Bundle emission.
//!
//! Every module becomes a function registered in `__modules`, called at most
//! once through `__require`. Exported bindings are exposed as getters so
//! importers always read the current value. The entry module's exports are
//! re-exported from the chunk as ES exports.

use super::graph::{ModuleGraph, ModuleId};
use super::link::LinkItem;
use crate::edits::{self, Edit};
use crate::transpile::{destructure_property, js_string};
use oxc_syntax::identifier::is_identifier_name;
use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};

/// Runtime shared by every module in the chunk.
const RUNTIME: &str = r#"const __modules = {};
const __cache = {};
function __require(id) {
  const cached = __cache[id];
  if (cached !== undefined) return cached.exports;
  const module = { exports: {} };
  __cache[id] = module;
  __modules[id](module, module.exports, __require);
  return module.exports;
}
function __export(target, getters) {
  for (const name in getters) {
    Object.defineProperty(target, name, { enumerable: true, get: getters[name] });
  }
}
function __exportStar(target, source) {
  for (const name in source) {
    if (name !== "default" && !Object.prototype.hasOwnProperty.call(target, name)) {
      Object.defineProperty(target, name, { enumerable: true, get: () => source[name] });
    }
  }
}
"#;

/// Emit one chunk holding `modules`, with `entry` as the module whose
/// exports the chunk re-exports.
#[must_use]
pub fn emit_chunk(graph: &ModuleGraph, modules: &[ModuleId], entry: ModuleId) -> String {
    let mut emitter = Emitter {
        graph,
        externals: Vec::new(),
        external_vars: HashMap::default(),
    };

    let mut body = String::new();
    for &index in modules {
        body.push_str(&emitter.module(index));
    }

    let mut output = String::new();
    for (specifier, var) in &emitter.externals {
        output.push_str(&format!("import * as {var} from {};\n", js_string(specifier)));
    }
    output.push_str(RUNTIME);
    output.push_str(&body);
    output.push_str(&emitter.entry_exports(entry));
    output
}

struct Emitter<'g> {
    graph: &'g ModuleGraph,
    /// Hoisted external imports in first-seen order: (specifier, binding).
    externals: Vec<(String, String)>,
    external_vars: HashMap<String, String>,
}

impl Emitter<'_> {
    /// Expression evaluating to the exports of `specifier` as seen from `importer`.
    fn target(&mut self, importer: &str, specifier: &str) -> String {
        if let Some(index) = self.graph.resolve_specifier(importer, specifier) {
            return format!("__require({index})");
        }
        if let Some(var) = self.external_vars.get(specifier) {
            return var.clone();
        }
        let var = format!("__ext{}", self.externals.len());
        self.externals.push((specifier.to_string(), var.clone()));
        self.external_vars.insert(specifier.to_string(), var.clone());
        var
    }

    fn module(&mut self, index: ModuleId) -> String {
        let graph = self.graph;
        let Some(module) = graph.get(index) else {
            return String::new();
        };

        let mut getters: Vec<(String, String)> = module.analysis.exports.clone();
        let mut edits = Vec::new();
        let mut reexports = 0usize;

        for item in &module.analysis.items {
            match item {
                LinkItem::Import {
                    start,
                    end,
                    specifier,
                    names,
                } => {
                    let target = self.target(&module.id, specifier);
                    let props: Vec<String> = names
                        .iter()
                        .filter(|n| n.imported != "*")
                        .map(|n| destructure_property(&n.imported, &n.local))
                        .collect();
                    let mut parts = Vec::new();
                    if !props.is_empty() {
                        parts.push(format!("const {{ {} }} = {target};", props.join(", ")));
                    }
                    for ns in names.iter().filter(|n| n.imported == "*") {
                        parts.push(format!("const {} = {target};", ns.local));
                    }
                    if parts.is_empty() {
                        parts.push(format!("{target};"));
                    }
                    edits.push(Edit::replace(*start, *end, parts.join(" ")));
                }
                LinkItem::ReExport {
                    start,
                    end,
                    specifier,
                    names,
                } => {
                    let binding = format!("__re{reexports}");
                    reexports += 1;
                    let target = self.target(&module.id, specifier);
                    edits.push(Edit::replace(*start, *end, format!("const {binding} = {target};")));
                    for name in names {
                        getters.push((name.local.clone(), format!("{binding}[{}]", js_string(&name.imported))));
                    }
                }
                LinkItem::ExportStar {
                    start,
                    end,
                    specifier,
                    alias,
                } => {
                    let target = self.target(&module.id, specifier);
                    if let Some(alias) = alias {
                        let binding = format!("__re{reexports}");
                        reexports += 1;
                        edits.push(Edit::replace(*start, *end, format!("const {binding} = {target};")));
                        getters.push((alias.clone(), binding));
                    } else {
                        edits.push(Edit::replace(*start, *end, format!("__exportStar(exports, {target});")));
                    }
                }
                LinkItem::DefaultExpr {
                    start,
                    end,
                    semicolon_at,
                } => {
                    edits.push(Edit::replace(*start, *end, format!("const {} = ", super::link::DEFAULT_BINDING)));
                    if let Some(at) = semicolon_at {
                        edits.push(Edit::replace(*at, *at, ";"));
                    }
                }
                LinkItem::Remove { start, end } => {
                    edits.push(Edit::replace(*start, *end, ""));
                }
                LinkItem::DynamicImport {
                    start,
                    end,
                    specifier,
                } => {
                    if let Some(target) = graph.resolve_specifier(&module.id, specifier) {
                        let text = format!("Promise.resolve().then(() => __require({target}))");
                        edits.push(Edit::replace(*start, *end, text));
                    }
                }
            }
        }

        let mut out = format!(
            "// {}\n__modules[{index}] = function (module, exports, __require) {{\n",
            display_id(&module.id)
        );
        if !getters.is_empty() {
            let list: Vec<String> = getters
                .iter()
                .map(|(name, expr)| format!("{}: () => {expr}", js_string(name)))
                .collect();
            out.push_str(&format!("__export(exports, {{ {} }});\n", list.join(", ")));
        }
        out.push_str(edits::apply(&module.source, edits).trim_end());
        out.push_str("\n};\n");
        out
    }

    /// ES exports re-exposing the entry module's exports.
    fn entry_exports(&mut self, entry: ModuleId) -> String {
        let mut names = Vec::new();
        let mut visited = HashSet::default();
        let mut star_sources = Vec::new();
        self.collect_export_names(entry, true, &mut visited, &mut names, &mut star_sources);

        let mut out = format!("const __entry = __require({entry});\n");
        let mut specifiers = Vec::new();
        for (i, name) in names.iter().enumerate() {
            out.push_str(&format!("const __x{i} = __entry[{}];\n", js_string(name)));
            let exported = if is_identifier_name(name) {
                name.clone()
            } else {
                js_string(name)
            };
            specifiers.push(format!("__x{i} as {exported}"));
        }
        if !specifiers.is_empty() {
            out.push_str(&format!("export {{ {} }};\n", specifiers.join(", ")));
        }
        for specifier in star_sources {
            out.push_str(&format!("export * from {};\n", js_string(&specifier)));
        }
        out
    }

    /// Statically known export names of a module, following internal stars.
    fn collect_export_names(
        &self,
        index: ModuleId,
        is_entry: bool,
        visited: &mut HashSet<ModuleId>,
        names: &mut Vec<String>,
        external_stars: &mut Vec<String>,
    ) {
        if !visited.insert(index) {
            return;
        }
        let Some(module) = self.graph.get(index) else {
            return;
        };

        let push = |name: &str, names: &mut Vec<String>| {
            if (is_entry || name != "default") && !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        };

        for (name, _) in &module.analysis.exports {
            push(name, names);
        }
        for item in &module.analysis.items {
            match item {
                LinkItem::ReExport { names: re, .. } => {
                    for name in re {
                        push(&name.local, names);
                    }
                }
                LinkItem::ExportStar {
                    alias: Some(alias), ..
                } => push(alias, names),
                LinkItem::ExportStar {
                    specifier, alias: None, ..
                } => match self.graph.resolve_specifier(&module.id, specifier) {
                    Some(target) => {
                        self.collect_export_names(target, false, visited, names, external_stars);
                    }
                    None if is_entry => external_stars.push(specifier.clone()),
                    None => {}
                },
                _ => {}
            }
        }
    }
}

/// Module id shown in the chunk comment: the vault path when available.
fn display_id(id: &str) -> &str {
    crate::paths::from_module_id(id).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::graph::{Module, ResolvedEdge};
    use crate::bundler::link::analyze;

    fn graph_of(modules: &[(&str, &str)], edges: &[(&str, &str, &str, bool)]) -> ModuleGraph {
        let mut graph = ModuleGraph::new();
        for (id, code) in modules {
            graph.add(Module::new(*id, *code, analyze(code, id).unwrap()));
        }
        let mut map: HashMap<String, Vec<ResolvedEdge>> = HashMap::default();
        for (from, spec, to, dynamic) in edges {
            map.entry((*from).to_string())
                .or_default()
                .push(((*spec).to_string(), (*to).to_string(), *dynamic));
        }
        graph.set_dependencies(&map);
        graph
    }

    #[test]
    fn test_emit_single_module() {
        let graph = graph_of(&[("livedoc://vault/C/index.js", "export const answer = 42;\nexport default answer;")], &[]);
        let code = emit_chunk(&graph, &[0], 0);

        assert!(code.starts_with("const __modules = {};"));
        assert!(code.contains("// C/index.js\n__modules[0] = function (module, exports, __require) {"));
        assert!(code.contains("__export(exports, { \"answer\": () => answer, \"default\": () => __default });"));
        assert!(code.contains("const answer = 42;"));
        assert!(code.contains("const __default = answer;"));
        assert!(!code.contains("export const"));
        assert!(code.contains("const __entry = __require(0);"));
        assert!(code.contains("export { __x0 as answer, __x1 as default };"));
    }

    #[test]
    fn test_emit_links_imports_and_reexports() {
        let graph = graph_of(
            &[
                ("index.js", "import Card, { size as s } from './card.js';\nexport { Card };\nexport * from './util.js';\nexport { t as title } from './card.js';\nexport const big = s * 2;"),
                ("card.js", "export default function Card() {}\nexport const size = 2;\nexport const t = 'T';"),
                ("util.js", "export const helper = 1;\nexport default 'hidden';"),
            ],
            &[
                ("index.js", "./card.js", "card.js", false),
                ("index.js", "./util.js", "util.js", false),
            ],
        );
        let code = emit_chunk(&graph, &[0, 1, 2], 0);

        assert!(code.contains("const { default: Card, size: s } = __require(1);"));
        assert!(code.contains("__exportStar(exports, __require(2));"));
        assert!(code.contains("const __re0 = __require(1);"));
        assert!(code.contains("\"title\": () => __re0[\"t\"]"));
        assert!(code.contains("function Card() {}"));
        // Star re-exports never forward `default`.
        assert!(code.contains("export { __x0 as Card, __x1 as big, __x2 as helper, __x3 as title };"));
    }

    #[test]
    fn test_emit_hoists_externals_and_inlines_dynamic_imports() {
        let graph = graph_of(
            &[
                ("index.js", "import confetti from 'https://cdn.example/confetti.js';\nexport const party = () => import('./lazy.js').then(m => m.go(confetti));"),
                ("lazy.js", "export const go = (f) => f();"),
            ],
            &[
                ("index.js", "https://cdn.example/confetti.js", "https://cdn.example/confetti.js", false),
                ("index.js", "./lazy.js", "lazy.js", true),
            ],
        );
        let code = emit_chunk(&graph, &[0, 1], 0);

        assert!(code.starts_with("import * as __ext0 from \"https://cdn.example/confetti.js\";\n"));
        assert!(code.contains("const { default: confetti } = __ext0;"));
        assert!(code.contains("Promise.resolve().then(() => __require(1))"));
        assert!(!code.contains("import('./lazy.js')"));
    }

    #[test]
    fn test_emit_side_effect_import_and_namespace() {
        let graph = graph_of(
            &[
                ("index.js", "import './style.css';\nimport * as math from './math.js';\nexport default math.add(1, 2);"),
                ("style.css", "(() => {})();"),
                ("math.js", "export const add = (a, b) => a + b;"),
            ],
            &[
                ("index.js", "./style.css", "style.css", false),
                ("index.js", "./math.js", "math.js", false),
            ],
        );
        let code = emit_chunk(&graph, &[0, 1, 2], 0);
        assert!(code.contains("__require(1);\n"));
        assert!(code.contains("const math = __require(2);"));
        assert!(code.contains("const __default = math.add(1, 2);"));
    }
}
