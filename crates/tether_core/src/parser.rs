//! Static dependency extraction from module source text.

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    Argument, CallExpression, ExportAllDeclaration, ExportNamedDeclaration, Expression,
    ImportDeclaration,
};
use oxc_ast::visit::walk;
use oxc_ast::Visit;
use oxc_parser::Parser;
use oxc_span::SourceType;

/// Turns source text into the identifiers it depends on, in source order.
pub trait DependencyExtractor {
    fn extract(&self, source: &str) -> Vec<String>;
}

impl<F> DependencyExtractor for F
where
    F: Fn(&str) -> Vec<String>,
{
    fn extract(&self, source: &str) -> Vec<String> {
        self(source)
    }
}

/// The default extractor, backed by [`extract_dependencies`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SourceScanner;

impl DependencyExtractor for SourceScanner {
    fn extract(&self, source: &str) -> Vec<String> {
        extract_dependencies(source)
    }
}

/// Collect `require("x")` arguments and `import`/`export ... from` sources.
///
/// Only a bare `require` call with a string literal counts; `require.async`
/// and computed ids are runtime lookups. Duplicates are dropped, first
/// occurrence wins.
pub fn extract_dependencies(source: &str) -> Vec<String> {
    let allocator = Allocator::default();
    let source_type = SourceType::default().with_module(true);

    let ret = Parser::new(&allocator, source, source_type).parse();

    // Log parsing errors but keep whatever the parser recovered
    if !ret.errors.is_empty() {
        tracing::warn!("{} parse errors while scanning dependencies", ret.errors.len());
    }

    let mut collector = Collector::default();
    collector.visit_program(&ret.program);
    collector.deps
}

#[derive(Default)]
struct Collector {
    deps: Vec<String>,
}

impl Collector {
    fn push(&mut self, id: &str) {
        if !self.deps.iter().any(|d| d == id) {
            self.deps.push(id.to_string());
        }
    }
}

impl<'a> Visit<'a> for Collector {
    fn visit_call_expression(&mut self, call: &CallExpression<'a>) {
        if let Expression::Identifier(ident) = &call.callee {
            if ident.name.as_str() == "require" {
                if let Some(Argument::StringLiteral(lit)) = call.arguments.first() {
                    self.push(lit.value.as_str());
                }
            }
        }
        walk::walk_call_expression(self, call);
    }

    fn visit_import_declaration(&mut self, decl: &ImportDeclaration<'a>) {
        self.push(decl.source.value.as_str());
    }

    fn visit_export_all_declaration(&mut self, decl: &ExportAllDeclaration<'a>) {
        self.push(decl.source.value.as_str());
    }

    fn visit_export_named_declaration(&mut self, decl: &ExportNamedDeclaration<'a>) {
        if let Some(source) = &decl.source {
            self.push(source.value.as_str());
        }
        walk::walk_export_named_declaration(self, decl);
    }
}
