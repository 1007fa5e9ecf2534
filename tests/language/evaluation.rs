//! Compiled expressions evaluated outside a session.

use std::collections::BTreeMap;
use std::sync::Arc;

use brindle_foundation::{ErrorKind, FactHandle, Object, Result, Type, Value};
use brindle_language::ast::{AliasPolicy, BinaryOp, Expr, FunctionDecl};
use brindle_language::{
    Catalog, CompileErrorKind, Evaluator, ExprCompiler, FactView, FunctionTable, NativeFunction,
    NoContext, RuntimeContext, Scope, Signature, SymbolTable, TypeDef, compile_function,
};

/// Globals only; no facts.
#[derive(Default)]
struct Globals(BTreeMap<String, Value>);

impl FactView for Globals {
    fn fact(&self, _handle: FactHandle) -> Option<&Object> {
        None
    }

    fn global(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }
}

impl RuntimeContext for Globals {
    fn set_global(&mut self, name: &str, value: Value) -> Result<()> {
        self.0.insert(name.to_string(), value);
        Ok(())
    }
}

fn symbols() -> SymbolTable {
    let mut catalog = Catalog::new();
    catalog
        .register(TypeDef::new("org.example.StaticMethods").function(NativeFunction::new(
            "getString3",
            vec![Type::String, Type::Int],
            Type::String,
            |args| Ok(Value::from(format!("{}{}", args[0], args[1]))),
        )))
        .unwrap();
    let mut symbols = SymbolTable::new("org.example.rules", Arc::new(catalog));
    symbols
        .register_function_import("org.example.StaticMethods", &AliasPolicy::Wildcard)
        .unwrap();
    symbols
}

fn eval_const(symbols: &SymbolTable, expr: &Expr) -> Result<Value> {
    let compiled = ExprCompiler::new(symbols).compile(expr).unwrap();
    Evaluator::new(symbols.functions()).eval(&compiled.expr, Scope::empty(), &mut [], &mut NoContext)
}

#[test]
fn imported_host_functions_and_builtin_methods() {
    let symbols = symbols();
    let expr = Expr::method(
        Expr::call("getString3", vec![Expr::str("rule"), Expr::int(2)]),
        "toUpperCase",
        vec![],
    );
    assert_eq!(eval_const(&symbols, &expr).unwrap(), Value::from("RULE2"));
}

#[test]
fn local_functions_compile_and_run() {
    let mut symbols = symbols();
    let decl = FunctionDecl::new(
        "twice",
        "int",
        Expr::binary(BinaryOp::Add, Expr::name("n"), Expr::name("n")),
    )
    .param("n", "int");
    let signature = Signature {
        params: vec![Type::Int],
        ret: Type::Int,
    };
    symbols.declare_function("twice", signature.clone()).unwrap();
    let body = compile_function(&symbols, &decl, &signature).unwrap();
    symbols.install_functions(Arc::new(FunctionTable::new("org.example.rules", vec![body])));

    let call = Expr::call("twice", vec![Expr::int(21)]);
    assert_eq!(eval_const(&symbols, &call).unwrap(), Value::Int(42));
}

#[test]
fn function_body_must_fit_its_return_type() {
    let mut symbols = symbols();
    let decl = FunctionDecl::new("bad", "int", Expr::str("x"));
    let signature = Signature {
        params: Vec::new(),
        ret: Type::Int,
    };
    symbols.declare_function("bad", signature.clone()).unwrap();
    let err = compile_function(&symbols, &decl, &signature).unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::TypeMismatch);
}

#[test]
fn list_globals_are_mutated_in_place() {
    let mut symbols = symbols();
    symbols.declare_global("list", Type::list(Type::Any)).unwrap();
    let mut compiler = ExprCompiler::new(&symbols);
    compiler.allow_mutation(true);
    let add = compiler
        .compile(&Expr::method(Expr::name("list"), "add", vec![Expr::str("x")]))
        .unwrap();

    let mut ctx = Globals::default();
    ctx.0.insert("list".to_string(), Value::empty_list());
    let mut evaluator = Evaluator::new(symbols.functions());
    evaluator
        .eval(&add.expr, Scope::empty(), &mut [], &mut ctx)
        .unwrap();
    evaluator
        .eval(&add.expr, Scope::empty(), &mut [], &mut ctx)
        .unwrap();

    let list = ctx.0["list"].as_list().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list.get(1), Some(&Value::from("x")));
}

#[test]
fn integer_division_by_zero_is_a_runtime_error() {
    let symbols = symbols();
    let expr = Expr::binary(BinaryOp::Div, Expr::int(1), Expr::int(0));
    let err = eval_const(&symbols, &expr).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::DivisionByZero));

    let expr = Expr::binary(BinaryOp::Div, Expr::int(7), Expr::int(2));
    assert_eq!(eval_const(&symbols, &expr).unwrap(), Value::Int(3));
}
