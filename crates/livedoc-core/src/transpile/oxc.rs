//! oxc transpiler backend.

use super::{rewrite, TranspileError, TranspileOptions, Transpiler};
use oxc_allocator::Allocator;
use oxc_codegen::Codegen;
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_span::SourceType;
use oxc_transformer::{JsxOptions, JsxRuntime, TransformOptions, Transformer, TypeScriptOptions};
use std::path::Path;

/// oxc-based transpiler.
///
/// `OxcTranspiler` is `Send + Sync`; every call allocates its own arena.
#[derive(Debug, Clone, Default)]
pub struct OxcTranspiler {
    _private: (),
}

impl OxcTranspiler {
    #[must_use]
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// Strip types and lower markup to automatic-runtime calls.
    fn lower(source: &str, options: &TranspileOptions) -> Result<String, TranspileError> {
        let filename = options.filename.as_str();
        let source_type = SourceType::from_path(filename).unwrap_or_else(|_| SourceType::tsx());

        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, source, source_type).parse();
        if ret.panicked || !ret.errors.is_empty() {
            let diagnostics = ret.errors.iter().map(ToString::to_string).collect();
            return Err(TranspileError::parse_error(filename, diagnostics));
        }
        let mut program = ret.program;

        let scoping = SemanticBuilder::new().build(&program).semantic.into_scoping();

        let transform_options = TransformOptions {
            typescript: TypeScriptOptions {
                only_remove_type_imports: true,
                ..TypeScriptOptions::default()
            },
            jsx: JsxOptions {
                runtime: JsxRuntime::Automatic,
                import_source: Some(options.globals.jsx_import_source.clone()),
                ..JsxOptions::default()
            },
            ..TransformOptions::default()
        };
        let ret = Transformer::new(&allocator, Path::new(filename), &transform_options)
            .build_with_scoping(scoping, &mut program);
        if !ret.errors.is_empty() {
            let diagnostics = ret.errors.iter().map(ToString::to_string).collect();
            return Err(TranspileError::transform_error(filename, diagnostics));
        }

        Ok(Codegen::new().build(&program).code)
    }
}

impl Transpiler for OxcTranspiler {
    fn name(&self) -> &'static str {
        "oxc"
    }

    fn transpile(&self, source: &str, options: &TranspileOptions) -> Result<String, TranspileError> {
        let lowered = Self::lower(source, options)?;
        if lowered.trim().is_empty() {
            return Err(TranspileError::empty_output(&options.filename));
        }

        let code = rewrite::rewrite(&lowered, options)?;
        tracing::trace!(
            target: "livedoc::transpile",
            filename = %options.filename,
            scope = ?options.scope,
            bytes = code.len(),
            "transpiled"
        );
        Ok(code)
    }
}
