//! Name resolution across imports, nested types, and local functions.

use std::sync::Arc;

use brindle_foundation::{Type, Value};
use brindle_language::ast::{AliasPolicy, Expr};
use brindle_language::{
    BindingOrigin, Catalog, CompileErrorKind, CompiledExpr, ExprCompiler, NativeFunction,
    Signature, SymbolTable, TypeDef,
};

fn echo(name: &str) -> NativeFunction {
    NativeFunction::new(name, vec![Type::String], Type::String, |args| Ok(args[0].clone()))
}

fn catalog() -> Arc<Catalog> {
    let mut catalog = Catalog::new();
    for def in [
        TypeDef::new("org.example.StaticMethods")
            .function(echo("getString1"))
            .function(echo("getString2")),
        TypeDef::new("org.example.OtherMethods").function(echo("getString1")),
        TypeDef::new("org.example.Cheesery")
            .field("status", Type::Int)
            .constant("SELLING_CHEESE", 1),
        TypeDef::new("org.example.Cheesery.Maturity").constant("YOUNG", "YOUNG"),
        TypeDef::new("org.example.FirstClass.AlternativeKey").field("key", Type::String),
        TypeDef::new("org.example.SecondClass.AlternativeKey").field("key", Type::String),
    ] {
        catalog.register(def).unwrap();
    }
    Arc::new(catalog)
}

fn table() -> SymbolTable {
    SymbolTable::new("org.example.rules", catalog())
}

// =============================================================================
// Functions
// =============================================================================

#[test]
fn wildcard_and_explicit_imports_of_one_holder() {
    let mut symbols = table();
    symbols
        .register_function_import("org.example.StaticMethods", &AliasPolicy::Wildcard)
        .unwrap();
    symbols
        .register_function_import(
            "org.example.StaticMethods",
            &AliasPolicy::Named("getString1".to_string()),
        )
        .unwrap();

    let one = symbols.resolve_callable("getString1", &[Type::String]).unwrap();
    assert_eq!(one.origin, BindingOrigin::StaticImport);
    let two = symbols.resolve_callable("getString2", &[Type::String]).unwrap();
    assert_eq!(two.origin, BindingOrigin::WildcardImport);
    assert_eq!(
        two.holder().map(ToString::to_string).as_deref(),
        Some("org.example.StaticMethods")
    );
}

#[test]
fn explicit_import_shadows_another_holders_wildcard() {
    let mut symbols = table();
    symbols
        .register_function_import("org.example.OtherMethods", &AliasPolicy::Wildcard)
        .unwrap();
    symbols
        .register_function_import(
            "org.example.StaticMethods",
            &AliasPolicy::Named("getString1".to_string()),
        )
        .unwrap();
    let callable = symbols.resolve_callable("getString1", &[Type::String]).unwrap();
    assert_eq!(
        callable.holder().map(ToString::to_string).as_deref(),
        Some("org.example.StaticMethods")
    );
}

#[test]
fn local_function_shadows_every_import() {
    let mut symbols = table();
    symbols
        .register_function_import(
            "org.example.StaticMethods",
            &AliasPolicy::Named("getString1".to_string()),
        )
        .unwrap();
    symbols
        .declare_function(
            "getString1",
            Signature {
                params: vec![Type::String],
                ret: Type::String,
            },
        )
        .unwrap();
    let callable = symbols.resolve_callable("getString1", &[Type::String]).unwrap();
    assert_eq!(callable.origin, BindingOrigin::Local);
    assert!(callable.holder().is_none());
}

#[test]
fn unknown_function_name_is_unresolved() {
    let symbols = table();
    let err = symbols.resolve_callable("getString9", &[]).unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::UnresolvedSymbol);
    assert_eq!(err.symbol.as_deref(), Some("getString9"));
}

// =============================================================================
// Types and constants
// =============================================================================

#[test]
fn nested_types_resolve_through_their_outer_import() {
    let mut symbols = table();
    symbols.register_import("org.example.Cheesery").unwrap();
    let maturity = symbols.resolve_type("Cheesery.Maturity").unwrap();
    assert_eq!(maturity.full_name(), "org.example.Cheesery.Maturity");
}

#[test]
fn same_simple_name_from_two_outers_collides_on_import() {
    let mut symbols = table();
    symbols
        .register_import("org.example.FirstClass.AlternativeKey")
        .unwrap();
    let err = symbols
        .register_import("org.example.SecondClass.AlternativeKey")
        .unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::DuplicateImport);

    let err = symbols.resolve_type("AlternativeKey").unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::AmbiguousSymbol);
    // Fully-qualified names still work.
    assert!(symbols
        .resolve_type("org.example.SecondClass.AlternativeKey")
        .is_ok());
}

#[test]
fn static_constants_compile_to_values() {
    let mut symbols = table();
    symbols.register_import("org.example.Cheesery").unwrap();
    let compiler = ExprCompiler::new(&symbols);

    let selling = compiler.compile(&Expr::path("Cheesery.SELLING_CHEESE")).unwrap();
    assert_eq!(selling.expr, CompiledExpr::Const(Value::Int(1)));
    assert_eq!(selling.ty, Type::Int);

    let young = compiler.compile(&Expr::path("Cheesery.Maturity.YOUNG")).unwrap();
    assert_eq!(young.expr, CompiledExpr::Const(Value::from("YOUNG")));

    let err = compiler.compile(&Expr::path("Cheesery.Maturity")).unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::InvalidExpression);
}

#[test]
fn constants_need_their_type_in_scope() {
    let symbols = table();
    let compiler = ExprCompiler::new(&symbols);
    let err = compiler.compile(&Expr::path("Cheesery.SELLING_CHEESE")).unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::UnresolvedSymbol);
}
