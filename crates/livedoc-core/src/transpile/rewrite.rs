//! Import and free-variable rewriting over lowered ES module code.

use super::{destructure_property, js_string, TranspileError, TranspileOptions};
use crate::edits::{self, Edit};
use crate::paths::is_runtime_external;
use oxc_allocator::Allocator;
use oxc_ast::ast::{
    BindingPattern, BlockStatement, ConditionalExpression, Expression, FunctionBody,
    IdentifierReference, ImportDeclaration, ImportDeclarationSpecifier, ObjectProperty, Program,
    Statement, UnaryExpression,
};
use oxc_ast_visit::{walk, Visit};
use oxc_parser::Parser;
use oxc_semantic::{Scoping, SemanticBuilder};
use oxc_span::{GetSpan, SourceType};
use oxc_syntax::operator::{BinaryOperator, UnaryOperator};
use rustc_hash::FxHashSet as HashSet;

/// Apply the import rewrite and, with an active scope, the scope rewrite.
pub(crate) fn rewrite(code: &str, options: &TranspileOptions) -> Result<String, TranspileError> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, code, SourceType::mjs()).parse();
    if ret.panicked || !ret.errors.is_empty() {
        let diagnostics = ret.errors.iter().map(ToString::to_string).collect();
        return Err(TranspileError::parse_error(&options.filename, diagnostics));
    }
    let program = ret.program;
    let semantic = SemanticBuilder::new().build(&program).semantic;

    let mut rewriter = Rewriter {
        source: code,
        options,
        scoping: semantic.scoping(),
        edits: Vec::new(),
        reexported: HashSet::default(),
        alias_frames: Vec::new(),
    };
    rewriter.visit_program(&program);

    Ok(edits::apply(code, rewriter.edits))
}

struct Rewriter<'s> {
    source: &'s str,
    options: &'s TranspileOptions,
    scoping: &'s Scoping,
    edits: Vec<Edit>,
    /// Names appearing in `export { .. } from` clauses.
    reexported: HashSet<String>,
    /// Per statement list: keys destructured under a different local name.
    alias_frames: Vec<HashSet<String>>,
}

impl Rewriter<'_> {
    fn should_rewrite_import(&self, source: &str) -> bool {
        if self.options.globals.is_jsx_runtime(source) {
            return true;
        }
        self.options.rewrite_imports && !source.starts_with('.') && !is_runtime_external(source)
    }

    fn registry_read(&self, decl: &ImportDeclaration<'_>) -> String {
        let module = format!(
            "{}[{}]",
            self.options.globals.module_registry,
            js_string(decl.source.value.as_str())
        );
        let specifiers = match &decl.specifiers {
            Some(specifiers) if !specifiers.is_empty() => specifiers,
            _ => return format!("{module};"),
        };

        let mut props = Vec::new();
        let mut namespaces = Vec::new();
        for specifier in specifiers {
            match specifier {
                ImportDeclarationSpecifier::ImportSpecifier(s) => {
                    props.push(destructure_property(s.imported.name().as_str(), s.local.name.as_str()));
                }
                ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                    props.push(format!("default: {}", s.local.name));
                }
                ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                    namespaces.push(s.local.name.as_str());
                }
            }
        }

        let mut out = Vec::new();
        if !props.is_empty() {
            out.push(format!("const {{ {} }} = {module};", props.join(", ")));
        }
        for ns in namespaces {
            out.push(format!("const {ns} = {module};"));
        }
        out.join(" ")
    }

    /// Scope-conditional replacement for `ident`, if it qualifies.
    fn lookup_for(&self, ident: &IdentifierReference<'_>) -> Option<String> {
        let scope = self.options.scope.as_deref()?;
        let name = ident.name.as_str();

        let unbound = ident
            .reference_id
            .get()
            .map_or(true, |id| self.scoping.get_reference(id).symbol_id().is_none());
        if !unbound
            || self.options.globals.is_host_global(name)
            || self.reexported.contains(name)
            || self.alias_frames.last().is_some_and(|frame| frame.contains(name))
        {
            return None;
        }

        let lookup = &self.options.globals.scope_lookup;
        let id = js_string(scope);
        let key = js_string(name);
        Some(format!(
            "({lookup}({id}).has({key}) ? {lookup}({id}).get({key}) : {name})"
        ))
    }

    fn is_generated_lookup(&self, it: &ConditionalExpression<'_>) -> bool {
        let span = it.test.span();
        self.source
            .get(span.start as usize..span.end as usize)
            .is_some_and(|text| {
                text.strip_prefix(self.options.globals.scope_lookup.as_str())
                    .is_some_and(|rest| rest.starts_with('('))
            })
    }

    fn with_frame(&mut self, statements: &[Statement<'_>], f: impl FnOnce(&mut Self)) {
        self.alias_frames.push(alias_keys(statements));
        f(self);
        self.alias_frames.pop();
    }
}

impl<'a> Visit<'a> for Rewriter<'_> {
    fn visit_program(&mut self, it: &Program<'a>) {
        for stmt in &it.body {
            if let Statement::ExportNamedDeclaration(decl) = stmt {
                if decl.source.is_some() {
                    for specifier in &decl.specifiers {
                        self.reexported.insert(specifier.local.name().to_string());
                        self.reexported.insert(specifier.exported.name().to_string());
                    }
                }
            }
        }
        self.with_frame(&it.body, |this| walk::walk_program(this, it));
    }

    fn visit_block_statement(&mut self, it: &BlockStatement<'a>) {
        self.with_frame(&it.body, |this| walk::walk_block_statement(this, it));
    }

    fn visit_function_body(&mut self, it: &FunctionBody<'a>) {
        self.with_frame(&it.statements, |this| walk::walk_function_body(this, it));
    }

    fn visit_import_declaration(&mut self, it: &ImportDeclaration<'a>) {
        if self.should_rewrite_import(it.source.value.as_str()) {
            let text = self.registry_read(it);
            self.edits.push(Edit::replace(it.span.start, it.span.end, text));
        }
    }

    fn visit_expression(&mut self, it: &Expression<'a>) {
        if let Expression::Identifier(ident) = it {
            if let Some(text) = self.lookup_for(ident) {
                self.edits.push(Edit::replace(ident.span.start, ident.span.end, text));
            }
            return;
        }
        walk::walk_expression(self, it);
    }

    fn visit_object_property(&mut self, it: &ObjectProperty<'a>) {
        if it.shorthand {
            if let Expression::Identifier(ident) = &it.value {
                if let Some(lookup) = self.lookup_for(ident) {
                    let text = format!("{}: {lookup}", ident.name);
                    self.edits.push(Edit::replace(it.span.start, it.span.end, text));
                }
                return;
            }
        }
        walk::walk_object_property(self, it);
    }

    fn visit_unary_expression(&mut self, it: &UnaryExpression<'a>) {
        if it.operator == UnaryOperator::Typeof && matches!(it.argument, Expression::Identifier(_)) {
            return;
        }
        walk::walk_unary_expression(self, it);
    }

    fn visit_conditional_expression(&mut self, it: &ConditionalExpression<'a>) {
        if self.is_generated_lookup(it) {
            return;
        }
        let guarded = typeof_undefined_guard(&it.test);
        self.visit_expression(&it.test);
        for branch in [&it.consequent, &it.alternate] {
            match (branch, guarded) {
                (Expression::Identifier(ident), Some(name)) if ident.name.as_str() == name => {}
                _ => self.visit_expression(branch),
            }
        }
    }
}

/// Keys of top-level `const { key: alias } = ..` declarations where the alias differs.
fn alias_keys(statements: &[Statement<'_>]) -> HashSet<String> {
    let mut keys = HashSet::default();
    for stmt in statements {
        let Statement::VariableDeclaration(decl) = stmt else {
            continue;
        };
        for declarator in &decl.declarations {
            let BindingPattern::ObjectPattern(pattern) = &declarator.id else {
                continue;
            };
            for property in &pattern.properties {
                if property.computed {
                    continue;
                }
                let (Some(key), BindingPattern::BindingIdentifier(value)) =
                    (property.key.static_name(), &property.value)
                else {
                    continue;
                };
                if value.name.as_str() != key.as_ref() {
                    keys.insert(key.to_string());
                }
            }
        }
    }
    keys
}

/// `typeof x === 'undefined'` (any equality operator, either operand order) yields `x`.
fn typeof_undefined_guard<'e>(test: &'e Expression<'_>) -> Option<&'e str> {
    let Expression::BinaryExpression(binary) = test else {
        return None;
    };
    if !matches!(
        binary.operator,
        BinaryOperator::Equality
            | BinaryOperator::Inequality
            | BinaryOperator::StrictEquality
            | BinaryOperator::StrictInequality
    ) {
        return None;
    }

    if is_undefined_literal(&binary.right) {
        typeof_operand(&binary.left)
    } else if is_undefined_literal(&binary.left) {
        typeof_operand(&binary.right)
    } else {
        None
    }
}

fn typeof_operand<'e>(expr: &'e Expression<'_>) -> Option<&'e str> {
    match expr {
        Expression::UnaryExpression(unary) if unary.operator == UnaryOperator::Typeof => {
            match &unary.argument {
                Expression::Identifier(ident) => Some(ident.name.as_str()),
                _ => None,
            }
        }
        _ => None,
    }
}

fn is_undefined_literal(expr: &Expression<'_>) -> bool {
    matches!(expr, Expression::StringLiteral(s) if s.value.as_str() == "undefined")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scoped(code: &str) -> String {
        let options = TranspileOptions::new().with_scope("s1");
        rewrite(code, &options).unwrap()
    }

    fn lookup(name: &str) -> String {
        format!(
            "(window._livedocGetScope(\"s1\").has(\"{name}\") ? window._livedocGetScope(\"s1\").get(\"{name}\") : {name})"
        )
    }

    #[test]
    fn test_free_identifier_rewritten() {
        let out = scoped("export const y = x + 1;\n");
        assert_eq!(out, format!("export const y = {} + 1;\n", lookup("x")));
    }

    #[test]
    fn test_bound_and_host_globals_untouched() {
        let out = scoped("const a = 1; console.log(a, window.b);\n");
        assert_eq!(out, "const a = 1; console.log(a, window.b);\n");
    }

    #[test]
    fn test_no_scope_means_no_rewrite() {
        let options = TranspileOptions::new();
        let out = rewrite("export const y = x;\n", &options).unwrap();
        assert_eq!(out, "export const y = x;\n");
    }

    #[test]
    fn test_member_object_and_call_rewritten() {
        let out = scoped("data.items.map(fmt);\n");
        assert_eq!(out, format!("{}.items.map({});\n", lookup("data"), lookup("fmt")));
    }

    #[test]
    fn test_object_keys_and_shorthand() {
        let out = scoped("const o = { key: 1, value };\n");
        assert_eq!(out, format!("const o = {{ key: 1, value: {} }};\n", lookup("value")));
    }

    #[test]
    fn test_typeof_guard_untouched() {
        let src = "const v = typeof maybe === \"undefined\" ? 0 : maybe;\n";
        assert_eq!(scoped(src), src);

        let src = "const v = \"undefined\" !== typeof maybe ? maybe : 0;\n";
        assert_eq!(scoped(src), src);
    }

    #[test]
    fn test_reexported_names_untouched() {
        let src = "export { thing } from \"./other.js\";\nconsole.log(thing);\n";
        assert_eq!(scoped(src), src);
    }

    #[test]
    fn test_destructured_alias_key_untouched() {
        let src = "const { width: w } = props;\nconsole.log(width);\n";
        let out = scoped(src);
        assert!(out.contains("console.log(width)"));
        assert!(out.contains(&lookup("props")));
    }

    #[test]
    fn test_generated_lookup_not_rewritten_twice() {
        let once = scoped("f(x);\n");
        let twice = scoped(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_assignment_target_untouched() {
        let out = scoped("total = 1;\n");
        assert_eq!(out, "total = 1;\n");
    }

    #[test]
    fn test_import_rewrite_forms() {
        let options = TranspileOptions::new().with_rewrite_imports(true);
        let src = "import React, { useState as us, \"a-b\" as ab, memo } from \"react\";\n\
                   import * as d3 from \"d3\";\n\
                   import \"side-effect\";\n\
                   import { local } from \"./local.js\";\n\
                   import remote from \"https://esm.sh/x\";\n";
        let out = rewrite(src, &options).unwrap();
        assert!(out.contains(
            "const { default: React, useState: us, \"a-b\": ab, memo } = window._livedocModules[\"react\"];"
        ));
        assert!(out.contains("const d3 = window._livedocModules[\"d3\"];"));
        assert!(out.contains("window._livedocModules[\"side-effect\"];"));
        assert!(out.contains("import { local } from \"./local.js\";"));
        assert!(out.contains("import remote from \"https://esm.sh/x\";"));
    }

    #[test]
    fn test_jsx_runtime_import_always_redirected() {
        let options = TranspileOptions::new();
        let src = "import { jsx as _jsx } from \"react/jsx-runtime\";\nimport x from \"lodash\";\n";
        let out = rewrite(src, &options).unwrap();
        assert!(out.contains("const { jsx: _jsx } = window._livedocModules[\"react/jsx-runtime\"];"));
        assert!(out.contains("import x from \"lodash\";"));
    }

    #[test]
    fn test_imported_bindings_are_bound() {
        let options = TranspileOptions::new()
            .with_rewrite_imports(true)
            .with_scope("s1");
        let out = rewrite("import { a } from \"lib\";\nexport const b = a;\n", &options).unwrap();
        assert!(out.contains("export const b = a;"));
    }
}
