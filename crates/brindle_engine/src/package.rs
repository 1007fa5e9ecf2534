//! Package compilation.
//!
//! A package is compiled in dependency order: imports first, then globals and
//! function signatures (so rules and function bodies can refer to any of
//! them), then function bodies, then rules. Problems are collected; a bad
//! import or rule does not stop the rest of the package from compiling.

use std::sync::Arc;

use brindle_foundation::Type;
use brindle_language::ast::{ImportDecl, PackageDecl};
use brindle_language::{
    Catalog, CompileError, CompileErrorKind, Diagnostics, FunctionTable, Signature, SymbolTable,
    compile_function,
};
use tracing::{debug, warn};

use crate::rule::{CompiledRule, RuleCompiler};

/// The compiled form of one package.
#[derive(Clone, Debug)]
pub struct CompiledPackage {
    /// Package name.
    pub name: Arc<str>,
    /// The package's resolved names, used to compile rules added later.
    pub symbols: Arc<SymbolTable>,
    /// Rules that compiled cleanly, in declaration order.
    pub rules: Vec<Arc<CompiledRule>>,
}

impl CompiledPackage {
    /// Returns the declared globals and their types.
    pub fn globals(&self) -> impl Iterator<Item = (&str, &Type)> {
        self.symbols
            .globals()
            .iter()
            .map(|(name, ty)| (name.as_str(), ty))
    }
}

/// Compiles a package against a catalog.
///
/// The returned package holds every rule that compiled; the diagnostics hold
/// every problem found. Callers decide whether a package with errors is
/// usable.
#[must_use]
pub fn compile_package(decl: &PackageDecl, catalog: &Arc<Catalog>) -> (CompiledPackage, Diagnostics) {
    let mut diags = Diagnostics::new();
    let mut symbols = SymbolTable::new(&decl.name, Arc::clone(catalog));
    let tag = |err: CompileError| err.with_package(decl.name.as_str());

    for import in &decl.imports {
        let result = match import {
            ImportDecl::Type { name, .. } => symbols.register_import(name),
            ImportDecl::Wildcard { package, .. } => symbols.register_type_wildcard(package),
        };
        if let Err(err) = result {
            warn!(package = %decl.name, error = %err, "import failed");
            diags.push(tag(err.with_span(import.span())));
        }
    }

    for import in &decl.function_imports {
        if let Err(err) = symbols.register_function_import(&import.holder, &import.policy) {
            warn!(package = %decl.name, error = %err, "function import failed");
            diags.push(tag(err.with_span(import.span)));
        }
    }

    for global in &decl.globals {
        let declared = symbols
            .resolve_value_type(&global.type_name)
            .and_then(|ty| symbols.declare_global(&global.name, ty));
        if let Err(err) = declared {
            diags.push(tag(err.with_span(global.span)));
        }
    }

    // Signatures first so bodies can call each other in any order.
    let mut signatures = Vec::with_capacity(decl.functions.len());
    for function in &decl.functions {
        match function_signature(&symbols, function) {
            Ok(signature) => match symbols.declare_function(&function.name, signature.clone()) {
                Ok(_) => signatures.push(Some(signature)),
                Err(err) => {
                    diags.push(tag(err.with_span(function.span)));
                    signatures.push(None);
                }
            },
            Err(err) => {
                diags.push(tag(err.with_rule(function.name.as_str()).with_span(function.span)));
                signatures.push(None);
            }
        }
    }

    let mut compiled = Vec::with_capacity(decl.functions.len());
    for (function, signature) in decl.functions.iter().zip(&signatures) {
        let Some(signature) = signature else {
            continue;
        };
        match compile_function(&symbols, function, signature) {
            Ok(body) => compiled.push(body),
            Err(err) => diags.push(tag(err.with_rule(function.name.as_str()).with_span(function.span))),
        }
    }
    symbols.install_functions(Arc::new(FunctionTable::new(&decl.name, compiled)));

    let mut rules: Vec<Arc<CompiledRule>> = Vec::with_capacity(decl.rules.len());
    let compiler = RuleCompiler::new(&symbols);
    for rule in &decl.rules {
        if rules.iter().any(|r| *r.name == *rule.name) {
            diags.push(tag(CompileError::new(
                CompileErrorKind::BuildError,
                format!("rule '{}' is declared more than once", rule.name),
            )
            .with_rule(rule.name.as_str())
            .with_span(rule.span)));
            continue;
        }
        match compiler.compile(rule) {
            Ok(compiled) => rules.push(Arc::new(compiled)),
            Err(errors) => diags.extend(errors),
        }
    }

    debug!(
        package = %decl.name,
        rules = rules.len(),
        errors = diags.errors().len(),
        "compiled package"
    );
    let package = CompiledPackage {
        name: Arc::from(decl.name.as_str()),
        symbols: Arc::new(symbols),
        rules,
    };
    (package, diags)
}

fn function_signature(
    symbols: &SymbolTable,
    function: &brindle_language::ast::FunctionDecl,
) -> Result<Signature, CompileError> {
    let params = function
        .params
        .iter()
        .map(|param| symbols.resolve_value_type(&param.type_name))
        .collect::<Result<Vec<_>, _>>()?;
    let ret = symbols.resolve_value_type(&function.return_type)?;
    Ok(Signature { params, ret })
}
