//! Module analysis for the linker.
//!
//! Parses a transformed module once and records everything the emitter needs
//! to turn ES module syntax into a `__modules` wrapper: static imports,
//! exported bindings, re-exports and dynamic imports, each with the span the
//! emitter rewrites.

use super::{BundleError, Import, ImportedName};
use oxc_allocator::Allocator;
use oxc_ast::ast::{
    Declaration, ExportDefaultDeclarationKind, Expression, ImportDeclarationSpecifier,
    ImportExpression, Program, Statement,
};
use oxc_ast_visit::{walk, Visit};
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType};

/// A span of module source the emitter replaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkItem {
    /// `import ... from "x"`; an imported name of `*` is a namespace.
    Import {
        start: u32,
        end: u32,
        specifier: String,
        names: Vec<ImportedName>,
    },
    /// `export { a as b } from "x"`; `imported` is the source name, `local` the exported one.
    ReExport {
        start: u32,
        end: u32,
        specifier: String,
        names: Vec<ImportedName>,
    },
    /// `export * from "x"` or `export * as ns from "x"`.
    ExportStar {
        start: u32,
        end: u32,
        specifier: String,
        alias: Option<String>,
    },
    /// `export default <expr>`; the prefix becomes a `__default` binding.
    DefaultExpr {
        start: u32,
        end: u32,
        /// Statement end, when a terminating `;` has to be added.
        semicolon_at: Option<u32>,
    },
    /// Text dropped outright (an `export` keyword or a local `export { .. }`).
    Remove { start: u32, end: u32 },
    /// `import("x")` with a literal source.
    DynamicImport {
        start: u32,
        end: u32,
        specifier: String,
    },
}

/// Everything the linker knows about one module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleAnalysis {
    /// Static imports, re-export sources and dynamic imports, in source order.
    pub imports: Vec<Import>,
    pub items: Vec<LinkItem>,
    /// Local exports: exported name to the expression reading it.
    pub exports: Vec<(String, String)>,
}

/// Binding holding an anonymous default export.
pub const DEFAULT_BINDING: &str = "__default";

/// Analyze a transformed module.
pub fn analyze(code: &str, id: &str) -> Result<ModuleAnalysis, BundleError> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, code, SourceType::mjs()).parse();
    if ret.panicked || !ret.errors.is_empty() {
        let details: Vec<String> = ret.errors.iter().map(ToString::to_string).collect();
        return Err(BundleError {
            code: "BUNDLE_PARSE_ERROR",
            message: format!("Failed to parse module: {}", details.join("; ")),
            path: Some(id.to_string()),
        });
    }

    let mut analyzer = Analyzer {
        source: code,
        analysis: ModuleAnalysis::default(),
    };
    analyzer.visit_program(&ret.program);
    Ok(analyzer.analysis)
}

struct Analyzer<'s> {
    source: &'s str,
    analysis: ModuleAnalysis,
}

impl Analyzer<'_> {
    fn statement(&mut self, stmt: &Statement<'_>) {
        match stmt {
            Statement::ImportDeclaration(decl) => {
                if decl.import_kind.is_type() {
                    return;
                }
                let names = decl
                    .specifiers
                    .iter()
                    .flatten()
                    .map(|specifier| match specifier {
                        ImportDeclarationSpecifier::ImportSpecifier(s) => {
                            ImportedName::new(s.imported.name().as_str(), s.local.name.as_str())
                        }
                        ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                            ImportedName::new("default", s.local.name.as_str())
                        }
                        ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                            ImportedName::new("*", s.local.name.as_str())
                        }
                    })
                    .collect::<Vec<_>>();
                let specifier = decl.source.value.to_string();
                self.analysis.imports.push(Import::new(&specifier, false, names.clone()));
                self.analysis.items.push(LinkItem::Import {
                    start: decl.span.start,
                    end: decl.span.end,
                    specifier,
                    names,
                });
            }
            Statement::ExportNamedDeclaration(decl) => {
                if decl.export_kind.is_type() {
                    self.remove(decl.span.start, decl.span.end);
                    return;
                }
                if let Some(source) = &decl.source {
                    let names = decl
                        .specifiers
                        .iter()
                        .map(|s| ImportedName::new(s.local.name().as_str(), s.exported.name().as_str()))
                        .collect::<Vec<_>>();
                    let specifier = source.value.to_string();
                    self.analysis.imports.push(Import::new(&specifier, false, names.clone()));
                    self.analysis.items.push(LinkItem::ReExport {
                        start: decl.span.start,
                        end: decl.span.end,
                        specifier,
                        names,
                    });
                } else if let Some(declaration) = &decl.declaration {
                    self.remove(decl.span.start, declaration.span().start);
                    for name in declared_names(declaration) {
                        self.analysis.exports.push((name.clone(), name));
                    }
                } else {
                    self.remove(decl.span.start, decl.span.end);
                    for s in &decl.specifiers {
                        self.analysis
                            .exports
                            .push((s.exported.name().to_string(), s.local.name().to_string()));
                    }
                }
            }
            Statement::ExportDefaultDeclaration(decl) => {
                let kind = &decl.declaration;
                let named = match kind {
                    ExportDefaultDeclarationKind::FunctionDeclaration(f) => f.id.as_ref().map(|id| id.name.to_string()),
                    ExportDefaultDeclarationKind::ClassDeclaration(c) => c.id.as_ref().map(|id| id.name.to_string()),
                    ExportDefaultDeclarationKind::TSInterfaceDeclaration(_) => {
                        self.remove(decl.span.start, decl.span.end);
                        return;
                    }
                    _ => None,
                };
                if let Some(name) = named {
                    self.remove(decl.span.start, kind.span().start);
                    self.analysis.exports.push(("default".to_string(), name));
                } else {
                    let terminated = self
                        .source
                        .get(..decl.span.end as usize)
                        .is_some_and(|text| text.trim_end().ends_with(';'));
                    self.analysis.items.push(LinkItem::DefaultExpr {
                        start: decl.span.start,
                        end: kind.span().start,
                        semicolon_at: (!terminated).then_some(decl.span.end),
                    });
                    self.analysis
                        .exports
                        .push(("default".to_string(), DEFAULT_BINDING.to_string()));
                }
            }
            Statement::ExportAllDeclaration(decl) => {
                if decl.export_kind.is_type() {
                    self.remove(decl.span.start, decl.span.end);
                    return;
                }
                let alias = decl.exported.as_ref().map(|name| name.name().to_string());
                let specifier = decl.source.value.to_string();
                let local = alias.clone().unwrap_or_else(|| "*".to_string());
                self.analysis
                    .imports
                    .push(Import::new(&specifier, false, vec![ImportedName::new("*", &local)]));
                self.analysis.items.push(LinkItem::ExportStar {
                    start: decl.span.start,
                    end: decl.span.end,
                    specifier,
                    alias,
                });
            }
            _ => {}
        }
    }

    fn remove(&mut self, start: u32, end: u32) {
        self.analysis.items.push(LinkItem::Remove { start, end });
    }
}

impl<'a> Visit<'a> for Analyzer<'_> {
    fn visit_program(&mut self, it: &Program<'a>) {
        for stmt in &it.body {
            self.statement(stmt);
        }
        walk::walk_program(self, it);
    }

    fn visit_import_expression(&mut self, it: &ImportExpression<'a>) {
        if let Expression::StringLiteral(source) = &it.source {
            let specifier = source.value.to_string();
            self.analysis.imports.push(Import::new(&specifier, true, Vec::new()));
            self.analysis.items.push(LinkItem::DynamicImport {
                start: it.span.start,
                end: it.span.end,
                specifier,
            });
        }
        walk::walk_import_expression(self, it);
    }
}

/// Names bound by an exported declaration.
fn declared_names(declaration: &Declaration<'_>) -> Vec<String> {
    match declaration {
        Declaration::VariableDeclaration(var) => var
            .declarations
            .iter()
            .flat_map(|d| d.id.get_binding_identifiers())
            .map(|id| id.name.to_string())
            .collect(),
        Declaration::FunctionDeclaration(f) => f.id.iter().map(|id| id.name.to_string()).collect(),
        Declaration::ClassDeclaration(c) => c.id.iter().map(|id| id.name.to_string()).collect(),
        _ => Vec::new(),
    }
}
