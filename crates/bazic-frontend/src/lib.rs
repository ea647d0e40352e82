//! Shared frontend facade for BaZic: re-exports lexer/parser/AST and wires
//! the optional markup collaborator and optimizer behind one call. This
//! crate is intentionally thin so embedders and tools share the same
//! pipeline without duplicating code.

pub use bazic_ast as ast;
pub use bazic_lexer as lexer;
pub use bazic_optimizer as optimizer;
pub use bazic_parser as parser;

pub use bazic_common::{BazicError, Diagnostic, Result, Severity};
pub use bazic_parser::{MarkupProvider, StaticMarkup};

#[derive(Debug)]
pub struct ParseOutput {
    pub program: Option<ast::Program>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ParseOutput {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }
}

/// Parse (and optionally lower) a plain BaZic program. Markup text is only
/// meaningful together with a provider; see [`parse_with_provider`].
pub fn parse(source: &str, markup: Option<&str>, optimize: bool) -> ParseOutput {
    parse_with_provider(source, markup, None, optimize)
}

/// Full pipeline: tokenize, parse, validate UI bindings against `provider`,
/// then lower control flow when `optimize` is set. Lowering is skipped when
/// any error diagnostic was produced.
pub fn parse_with_provider(
    source: &str,
    markup: Option<&str>,
    provider: Option<&dyn MarkupProvider>,
    optimize: bool,
) -> ParseOutput {
    let result = parser::parse_with_markup(source, markup, provider);
    let mut out = ParseOutput { program: result.program, diagnostics: result.diagnostics };
    if optimize && !out.has_errors() {
        if let Some(program) = out.program.take() {
            match optimizer::optimize(&program) {
                Ok(lowered) => out.program = Some(lowered),
                Err(e) => {
                    out.program = Some(program);
                    out.diagnostics.push(Diagnostic::error(1, 1, 0, 0, e.to_string()));
                }
            }
        }
    }
    out
}
