//! Rule compiler - transforms rule declarations into compiled rules.
//!
//! Each pattern's constraints are compiled against the pattern's type and the
//! bindings made by earlier patterns. Constraints that read earlier bindings
//! become join tests; the rest become alpha tests and can be shared between
//! rules.

use std::sync::Arc;

use brindle_language::ast::{ConditionElement, Constraint, PatternDecl, RuleDecl};
use brindle_language::{CompileError, ExprCompiler, SymbolTable};
use tracing::debug;

use super::{CompiledCondition, CompiledPattern, CompiledRule};

/// Compiles the rules of one package.
pub struct RuleCompiler<'s> {
    symbols: &'s SymbolTable,
}

impl<'s> RuleCompiler<'s> {
    /// Creates a compiler over a package's symbol table.
    ///
    /// Local function bodies must already be installed in the table.
    #[must_use]
    pub fn new(symbols: &'s SymbolTable) -> Self {
        Self { symbols }
    }

    /// Compiles one rule.
    ///
    /// # Errors
    ///
    /// Every problem found in the rule, each tagged with the package and rule
    /// name.
    pub fn compile(&self, decl: &RuleDecl) -> Result<CompiledRule, Vec<CompileError>> {
        let mut compiler = ExprCompiler::new(self.symbols);
        let mut errors = Vec::new();
        let mut conditions = Vec::with_capacity(decl.conditions.len());
        let mut arity = 0;

        for condition in &decl.conditions {
            match condition {
                ConditionElement::Pattern(pattern) => {
                    if let Some(compiled) =
                        self.compile_pattern(&mut compiler, pattern, false, arity, &mut errors)
                    {
                        arity += 1;
                        conditions.push(CompiledCondition::Pattern(compiled));
                    }
                }
                ConditionElement::Not(pattern) => {
                    if let Some(compiled) =
                        self.compile_pattern(&mut compiler, pattern, true, arity, &mut errors)
                    {
                        conditions.push(CompiledCondition::Pattern(compiled));
                    }
                }
                ConditionElement::Eval(expr) => match compiler.compile_condition(expr) {
                    Ok(test) => conditions.push(CompiledCondition::Eval(test)),
                    Err(err) => errors.push(err),
                },
            }
        }

        let consequence = match compiler.compile_consequence(&decl.consequence) {
            Ok(consequence) => Some(consequence),
            Err(errs) => {
                errors.extend(errs);
                None
            }
        };

        let package = self.symbols.package().full_name();
        if !errors.is_empty() {
            return Err(errors
                .into_iter()
                .map(|err| {
                    err.with_package(package.as_str())
                        .with_rule(decl.name.as_str())
                        .with_span(decl.span)
                })
                .collect());
        }
        let Some(consequence) = consequence else {
            return Err(vec![CompileError::invalid("consequence did not compile")
                .with_package(package)
                .with_rule(decl.name.as_str())]);
        };

        debug!(package = %package, rule = %decl.name, arity, "compiled rule");
        Ok(CompiledRule {
            package: Arc::from(package.as_str()),
            name: Arc::from(decl.name.as_str()),
            salience: decl.salience,
            no_loop: decl.no_loop,
            enabled: decl.enabled,
            conditions,
            consequence: Arc::new(consequence),
            functions: Arc::clone(self.symbols.functions()),
            arity,
            span: decl.span,
        })
    }

    /// Compiles one pattern. On failure the errors are recorded and `None`
    /// is returned. If only a constraint failed, the pattern's binding is
    /// still declared so later conditions do not report it as unresolved.
    fn compile_pattern(
        &self,
        compiler: &mut ExprCompiler<'s>,
        pattern: &PatternDecl,
        negated: bool,
        arity: usize,
        errors: &mut Vec<CompileError>,
    ) -> Option<CompiledPattern> {
        let def = match self.symbols.resolve_type(&pattern.type_name) {
            Ok(type_ref) => Arc::clone(type_ref.def()),
            Err(err) => {
                errors.push(err.with_span(pattern.span));
                return None;
            }
        };

        compiler.set_current(Some(Arc::clone(&def)));
        let mut alpha = Vec::new();
        let mut beta = Vec::new();
        let before = errors.len();
        for constraint in &pattern.constraints {
            match constraint {
                Constraint::Binding { var, field } => {
                    if let Err(err) = compiler.bind_current_field(var, field) {
                        errors.push(err.with_span(pattern.span));
                    }
                }
                Constraint::Test(expr) => match compiler.compile_condition(expr) {
                    Ok(test) if test.references_tuple() => beta.push(test),
                    Ok(test) => alpha.push(test),
                    Err(err) => errors.push(err.with_span(pattern.span)),
                },
            }
        }

        let index = (!negated).then_some(arity);
        compiler.finish_pattern(index);
        match (&pattern.binding, index) {
            (Some(var), Some(index)) => compiler.bind_fact(var, index, Arc::clone(&def)),
            (Some(var), None) => errors.push(
                CompileError::invalid(format!(
                    "'{var}' cannot be bound inside a negated pattern"
                ))
                .with_symbol(var.as_str())
                .with_span(pattern.span),
            ),
            (None, _) => {}
        }

        if errors.len() > before {
            return None;
        }
        Some(CompiledPattern {
            def,
            alpha,
            beta,
            negated,
            index,
            span: pattern.span,
        })
    }
}
