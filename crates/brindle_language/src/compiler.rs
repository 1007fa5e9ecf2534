//! Expression and statement compiler.
//!
//! Turns unresolved [`Expr`]s and [`Statement`]s into [`CompiledExpr`]s and
//! [`CompiledAction`]s, resolving every name exactly once. A bare identifier
//! is looked up in this order:
//!
//! 1. rule-local variables (fact bindings, field bindings, `let`s, parameters)
//! 2. fields of the pattern under test (inside constraints only)
//! 3. globals
//!
//! Dotted paths whose head is none of these are treated as type paths and
//! resolved through the [`SymbolTable`] (static constants, static calls,
//! nested types).

use std::collections::BTreeMap;
use std::sync::Arc;

use brindle_foundation::Type;

use crate::ast::{BinaryOp, Expr, FunctionDecl, Statement, UnaryOp};
use crate::catalog::TypeDef;
use crate::diagnostics::CompileError;
use crate::expr::{CompiledAction, CompiledExpr, CompiledFunction, Consequence};
use crate::methods::{BuiltinMethod, ListMutator};
use crate::symbols::{Signature, SymbolTable, resolve_static_call};

/// A compiled expression with its static type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Typed {
    /// The compiled expression.
    pub expr: CompiledExpr,
    /// Its static type; `Any` when it cannot be known at compile time.
    pub ty: Type,
}

impl Typed {
    fn new(expr: CompiledExpr, ty: Type) -> Self {
        Self { expr, ty }
    }
}

#[derive(Clone, Debug)]
enum Var {
    Fact { index: usize, def: Arc<TypeDef> },
    FactField { index: usize, field: Arc<str>, ty: Type },
    CurrentField { field: Arc<str>, ty: Type },
    Local { slot: usize, ty: Type },
}

/// Compiles expressions for one rule or function.
pub struct ExprCompiler<'s> {
    symbols: &'s SymbolTable,
    vars: BTreeMap<String, Var>,
    current: Option<Arc<TypeDef>>,
    allow_mutation: bool,
    next_slot: usize,
}

impl<'s> ExprCompiler<'s> {
    /// Creates a compiler with no variables in scope.
    #[must_use]
    pub fn new(symbols: &'s SymbolTable) -> Self {
        Self {
            symbols,
            vars: BTreeMap::new(),
            current: None,
            allow_mutation: false,
            next_slot: 0,
        }
    }

    /// Returns the symbol table.
    #[must_use]
    pub fn symbols(&self) -> &'s SymbolTable {
        self.symbols
    }

    /// Binds a variable to the whole fact at a tuple index.
    pub fn bind_fact(&mut self, name: &str, index: usize, def: Arc<TypeDef>) {
        self.vars.insert(name.to_string(), Var::Fact { index, def });
    }

    /// Binds a variable to a field of the fact under test.
    ///
    /// # Errors
    ///
    /// `UnknownField` if the pattern's type has no such field, or
    /// `InvalidExpression` outside a pattern.
    pub fn bind_current_field(&mut self, name: &str, field: &str) -> Result<(), CompileError> {
        let Some(def) = &self.current else {
            return Err(CompileError::invalid(format!(
                "field binding '{name}' outside a pattern"
            )));
        };
        let Some(field_def) = def.field_def(field) else {
            return Err(CompileError::unknown_field(def.full_name(), field));
        };
        let var = Var::CurrentField {
            field: Arc::clone(&field_def.name),
            ty: field_def.ty.clone(),
        };
        self.vars.insert(name.to_string(), var);
        Ok(())
    }

    /// Sets (or clears) the pattern whose fields constraints can name.
    pub fn set_current(&mut self, def: Option<Arc<TypeDef>>) {
        self.current = def;
    }

    /// Ends the current pattern.
    ///
    /// Field bindings made inside it become bindings to the matched fact at
    /// `index`; when the pattern binds no fact (a negated pattern), they go
    /// out of scope.
    pub fn finish_pattern(&mut self, index: Option<usize>) {
        self.current = None;
        let pending: Vec<String> = self
            .vars
            .iter()
            .filter(|(_, var)| matches!(var, Var::CurrentField { .. }))
            .map(|(name, _)| name.clone())
            .collect();
        for name in pending {
            let Some(Var::CurrentField { field, ty }) = self.vars.remove(&name) else {
                continue;
            };
            if let Some(index) = index {
                self.vars.insert(name, Var::FactField { index, field, ty });
            }
        }
    }

    /// Allows or forbids statements and calls that change globals.
    pub fn allow_mutation(&mut self, allow: bool) {
        self.allow_mutation = allow;
    }

    /// Binds a frame-local variable and returns its slot.
    pub fn bind_local(&mut self, name: &str, ty: Type) -> usize {
        let slot = self.next_slot;
        self.next_slot += 1;
        self.vars.insert(name.to_string(), Var::Local { slot, ty });
        slot
    }

    /// Returns the number of frame slots allocated so far.
    #[must_use]
    pub fn frame_size(&self) -> usize {
        self.next_slot
    }

    /// Returns true if `name` is a variable in scope.
    #[must_use]
    pub fn is_bound(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    // -------------------------------------------------------------------------
    // Expressions
    // -------------------------------------------------------------------------

    /// Compiles an expression.
    ///
    /// # Errors
    ///
    /// The first resolution or type error found.
    pub fn compile(&self, expr: &Expr) -> Result<Typed, CompileError> {
        match expr {
            Expr::Literal(value) => Ok(Typed::new(
                CompiledExpr::Const(value.clone()),
                value.value_type(),
            )),
            Expr::Name(name) => self.compile_name(name),
            Expr::Field { target, field } => self.compile_field(target, field),
            Expr::Call { name, args } => {
                let args = self.compile_args(args)?;
                let types: Vec<Type> = args.iter().map(|a| a.ty.clone()).collect();
                let callable = self.symbols.resolve_callable(name, &types)?;
                Ok(Typed::new(
                    CompiledExpr::Call {
                        name: Arc::clone(&callable.name),
                        target: callable.target,
                        args: args.into_iter().map(|a| a.expr).collect(),
                    },
                    callable.signature.ret,
                ))
            }
            Expr::MethodCall {
                target,
                method,
                args,
            } => self.compile_method(target, method, args),
            Expr::New { type_name, args } => self.compile_new(type_name, args),
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.compile(lhs)?;
                let rhs = self.compile(rhs)?;
                let ty = binary_type(*op, &lhs.ty, &rhs.ty)?;
                Ok(Typed::new(
                    CompiledExpr::Binary {
                        op: *op,
                        lhs: Box::new(lhs.expr),
                        rhs: Box::new(rhs.expr),
                    },
                    ty,
                ))
            }
            Expr::Unary { op, operand } => {
                let operand = self.compile(operand)?;
                let ty = match (op, &operand.ty) {
                    (UnaryOp::Not, Type::Bool | Type::Any) => Type::Bool,
                    (UnaryOp::Neg, ty @ (Type::Int | Type::Float | Type::Any)) => ty.clone(),
                    (_, ty) => {
                        return Err(CompileError::type_mismatch(format!(
                            "operator {op:?} cannot be applied to {ty}"
                        )));
                    }
                };
                Ok(Typed::new(
                    CompiledExpr::Unary {
                        op: *op,
                        operand: Box::new(operand.expr),
                    },
                    ty,
                ))
            }
        }
    }

    /// Compiles a constraint or `eval` test, which must be boolean.
    ///
    /// # Errors
    ///
    /// As [`ExprCompiler::compile`], plus `TypeMismatch` for non-boolean tests.
    pub fn compile_condition(&self, expr: &Expr) -> Result<CompiledExpr, CompileError> {
        let typed = self.compile(expr)?;
        match typed.ty {
            Type::Bool | Type::Any => Ok(typed.expr),
            other => Err(CompileError::type_mismatch(format!(
                "condition must be a boolean, found {other}"
            ))),
        }
    }

    fn compile_args(&self, args: &[Expr]) -> Result<Vec<Typed>, CompileError> {
        args.iter().map(|arg| self.compile(arg)).collect()
    }

    fn compile_name(&self, name: &str) -> Result<Typed, CompileError> {
        if let Some(var) = self.vars.get(name) {
            return Ok(match var {
                Var::Fact { index, def } => Typed::new(CompiledExpr::Fact(*index), def.as_type()),
                Var::FactField { index, field, ty } => Typed::new(
                    CompiledExpr::FactField {
                        index: *index,
                        field: Arc::clone(field),
                    },
                    ty.clone(),
                ),
                Var::CurrentField { field, ty } => {
                    Typed::new(CompiledExpr::CurrentField(Arc::clone(field)), ty.clone())
                }
                Var::Local { slot, ty } => Typed::new(CompiledExpr::Local(*slot), ty.clone()),
            });
        }
        if let Some(field) = self.current.as_ref().and_then(|def| def.field_def(name)) {
            return Ok(Typed::new(
                CompiledExpr::CurrentField(Arc::clone(&field.name)),
                field.ty.clone(),
            ));
        }
        if let Some(ty) = self.symbols.global_type(name) {
            return Ok(Typed::new(CompiledExpr::Global(Arc::from(name)), ty.clone()));
        }
        Err(CompileError::unresolved("variable", name))
    }

    /// Returns true if `name` is a variable, a field under test, or a global.
    fn is_value_name(&self, name: &str) -> bool {
        self.vars.contains_key(name)
            || self
                .current
                .as_ref()
                .is_some_and(|def| def.field_def(name).is_some())
            || self.symbols.global_type(name).is_some()
    }

    /// Returns the dotted text of `expr` if it is a chain of names whose head
    /// is not a value.
    fn type_path(&self, expr: &Expr) -> Option<String> {
        match expr {
            Expr::Name(name) if !self.is_value_name(name) => Some(name.clone()),
            Expr::Field { target, field } => {
                self.type_path(target).map(|path| format!("{path}.{field}"))
            }
            _ => None,
        }
    }

    fn compile_field(&self, target: &Expr, field: &str) -> Result<Typed, CompileError> {
        if let Some(path) = self.type_path(target) {
            let owner = self.symbols.resolve_type(&path)?;
            if let Some(value) = owner.def().constant_value(field) {
                return Ok(Typed::new(CompiledExpr::Const(value.clone()), value.value_type()));
            }
            let nested = format!("{}.{field}", owner.full_name());
            if self.symbols.catalog().contains(&nested) {
                return Err(CompileError::invalid(format!(
                    "type '{nested}' cannot be used as a value"
                ))
                .with_symbol(nested));
            }
            return Err(CompileError::unknown_field(owner.full_name(), field));
        }

        let target = self.compile(target)?;
        let ty = self.field_type(&target.ty, field)?;
        let expr = match target.expr {
            CompiledExpr::Fact(index) => CompiledExpr::FactField {
                index,
                field: Arc::from(field),
            },
            other => CompiledExpr::Field {
                target: Box::new(other),
                field: Arc::from(field),
            },
        };
        Ok(Typed::new(expr, ty))
    }

    fn field_type(&self, owner: &Type, field: &str) -> Result<Type, CompileError> {
        match owner {
            Type::Any => Ok(Type::Any),
            Type::Object(name) => {
                let def = self
                    .symbols
                    .catalog()
                    .get(name)
                    .ok_or_else(|| CompileError::unresolved("type", name))?;
                def.field_def(field)
                    .map(|f| f.ty.clone())
                    .ok_or_else(|| CompileError::unknown_field(name, field))
            }
            other => Err(CompileError::type_mismatch(format!(
                "cannot read field '{field}' of {other}"
            ))
            .with_symbol(field)),
        }
    }

    fn compile_method(&self, target: &Expr, method: &str, args: &[Expr]) -> Result<Typed, CompileError> {
        if let Some(path) = self.type_path(target) {
            let owner = self.symbols.resolve_type(&path)?;
            let args = self.compile_args(args)?;
            let types: Vec<Type> = args.iter().map(|a| a.ty.clone()).collect();
            let callable = resolve_static_call(owner.def(), method, &types)?;
            return Ok(Typed::new(
                CompiledExpr::Call {
                    name: Arc::clone(&callable.name),
                    target: callable.target,
                    args: args.into_iter().map(|a| a.expr).collect(),
                },
                callable.signature.ret,
            ));
        }

        if let (Expr::Name(global), Some(mutator)) = (target, ListMutator::lookup(method)) {
            if !self.vars.contains_key(global) {
                if let Some(ty) = self.symbols.global_type(global) {
                    return self.compile_global_mutation(global, ty, mutator, args);
                }
            }
        }

        let receiver = self.compile(target)?;
        let args = self.compile_args(args)?;

        if let Some(field) = self.getter_field(&receiver.ty, method, args.len()) {
            let ty = self.field_type(&receiver.ty, &field)?;
            return Ok(Typed::new(
                CompiledExpr::Field {
                    target: Box::new(receiver.expr),
                    field: Arc::from(field.as_str()),
                },
                ty,
            ));
        }

        let Some(builtin) = BuiltinMethod::lookup(method, &receiver.ty) else {
            return Err(CompileError::unresolved(
                "method",
                &format!("{}.{method}", receiver.ty),
            ));
        };
        let params = builtin.params();
        if params.len() != args.len() {
            return Err(CompileError::type_mismatch(format!(
                "method '{method}' takes {} argument(s), found {}",
                params.len(),
                args.len()
            ))
            .with_symbol(method));
        }
        for (param, arg) in params.iter().zip(&args) {
            if !param.accepts(&arg.ty) {
                return Err(CompileError::type_mismatch(format!(
                    "method '{method}' expects {param}, found {}",
                    arg.ty
                ))
                .with_symbol(method));
            }
        }
        Ok(Typed::new(
            CompiledExpr::Method {
                receiver: Box::new(receiver.expr),
                method: builtin,
                args: args.into_iter().map(|a| a.expr).collect(),
            },
            builtin.return_type(&receiver.ty),
        ))
    }

    /// Maps bean-style accessors (`getType()`, `isRipe()`) onto fields.
    fn getter_field(&self, receiver: &Type, method: &str, arity: usize) -> Option<String> {
        let Type::Object(name) = receiver else {
            return None;
        };
        if arity != 0 {
            return None;
        }
        let rest = method
            .strip_prefix("get")
            .or_else(|| method.strip_prefix("is"))?;
        let mut chars = rest.chars();
        let first = chars.next()?;
        let field = format!("{}{}", first.to_lowercase(), chars.as_str());
        let def = self.symbols.catalog().get(name)?;
        def.field_def(&field).map(|_| field)
    }

    fn compile_global_mutation(
        &self,
        global: &str,
        ty: &Type,
        mutator: ListMutator,
        args: &[Expr],
    ) -> Result<Typed, CompileError> {
        if !self.allow_mutation {
            return Err(CompileError::invalid(format!(
                "'{global}.{}' changes a global and is only allowed in a consequence",
                mutator.name()
            ))
            .with_symbol(global));
        }
        if !Type::list(Type::Any).accepts(ty) {
            return Err(CompileError::type_mismatch(format!(
                "'{}' needs a list receiver, but global '{global}' is {ty}",
                mutator.name()
            ))
            .with_symbol(global));
        }
        if args.len() != mutator.arity() {
            return Err(CompileError::type_mismatch(format!(
                "method '{}' takes {} argument(s), found {}",
                mutator.name(),
                mutator.arity(),
                args.len()
            )));
        }
        let args = self.compile_args(args)?;
        Ok(Typed::new(
            CompiledExpr::GlobalMutate {
                global: Arc::from(global),
                mutator,
                args: args.into_iter().map(|a| a.expr).collect(),
            },
            mutator.return_type(),
        ))
    }

    fn compile_new(&self, type_name: &str, args: &[Expr]) -> Result<Typed, CompileError> {
        let type_ref = self.symbols.resolve_type(type_name)?;
        let def = type_ref.def();
        if def.fields().len() != args.len() {
            return Err(CompileError::type_mismatch(format!(
                "new {} takes {} argument(s), found {}",
                def.full_name(),
                def.fields().len(),
                args.len()
            ))
            .with_symbol(type_name));
        }
        let args = self.compile_args(args)?;
        for (field, arg) in def.fields().iter().zip(&args) {
            if !field.ty.accepts(&arg.ty) {
                return Err(CompileError::type_mismatch(format!(
                    "field '{}' of {} is {}, found {}",
                    field.name,
                    def.full_name(),
                    field.ty,
                    arg.ty
                ))
                .with_symbol(&*field.name));
            }
        }
        Ok(Typed::new(
            CompiledExpr::New {
                def: Arc::clone(def),
                args: args.into_iter().map(|a| a.expr).collect(),
            },
            def.as_type(),
        ))
    }

    // -------------------------------------------------------------------------
    // Statements
    // -------------------------------------------------------------------------

    fn fact_var(&self, var: &str) -> Result<(usize, Arc<TypeDef>), CompileError> {
        match self.vars.get(var) {
            Some(Var::Fact { index, def }) => Ok((*index, Arc::clone(def))),
            Some(_) => Err(CompileError::invalid(format!(
                "'{var}' is not bound to a fact"
            ))
            .with_symbol(var)),
            None => Err(CompileError::unresolved("variable", var)),
        }
    }

    /// Compiles one consequence statement.
    ///
    /// # Errors
    ///
    /// The first resolution or type error found.
    pub fn compile_statement(&mut self, statement: &Statement) -> Result<CompiledAction, CompileError> {
        match statement {
            Statement::Expr(expr) => Ok(CompiledAction::Eval(self.compile(expr)?.expr)),
            Statement::Let { name, value } => {
                let compiled = self.compile(value);
                // Bind even on failure so later statements do not cascade.
                let ty = compiled.as_ref().map_or(Type::Any, |t| t.ty.clone());
                let slot = self.bind_local(name, ty);
                Ok(CompiledAction::Let {
                    slot,
                    value: compiled?.expr,
                })
            }
            Statement::Insert(expr) => {
                let typed = self.compile(expr)?;
                match typed.ty {
                    Type::Object(_) | Type::Any => Ok(CompiledAction::Insert(typed.expr)),
                    other => Err(CompileError::type_mismatch(format!(
                        "insert needs an object, found {other}"
                    ))),
                }
            }
            Statement::Modify { var, assignments } => {
                let (index, def) = self.fact_var(var)?;
                let mut compiled = Vec::with_capacity(assignments.len());
                for (field, value) in assignments {
                    let Some(field_def) = def.field_def(field) else {
                        return Err(CompileError::unknown_field(def.full_name(), field));
                    };
                    let value = self.compile(value)?;
                    if !field_def.ty.accepts(&value.ty) {
                        return Err(CompileError::type_mismatch(format!(
                            "field '{field}' of {} is {}, found {}",
                            def.full_name(),
                            field_def.ty,
                            value.ty
                        ))
                        .with_symbol(field));
                    }
                    compiled.push((Arc::clone(&field_def.name), value.expr));
                }
                Ok(CompiledAction::Modify {
                    index,
                    var: Arc::from(var.as_str()),
                    assignments: compiled,
                })
            }
            Statement::Retract(var) => {
                let (index, _) = self.fact_var(var)?;
                Ok(CompiledAction::Retract {
                    index,
                    var: Arc::from(var.as_str()),
                })
            }
            Statement::SetGlobal { name, value } => {
                let Some(ty) = self.symbols.global_type(name) else {
                    return Err(CompileError::unresolved("global", name));
                };
                let value = self.compile(value)?;
                if !ty.accepts(&value.ty) {
                    return Err(CompileError::type_mismatch(format!(
                        "global '{name}' is {ty}, found {}",
                        value.ty
                    ))
                    .with_symbol(name));
                }
                Ok(CompiledAction::SetGlobal {
                    name: Arc::from(name.as_str()),
                    value: value.expr,
                })
            }
            Statement::Halt => Ok(CompiledAction::Halt),
        }
    }

    /// Compiles a whole consequence, collecting every error.
    ///
    /// # Errors
    ///
    /// Every statement that failed to compile.
    pub fn compile_consequence(
        &mut self,
        statements: &[Statement],
    ) -> Result<Consequence, Vec<CompileError>> {
        let previous = self.allow_mutation;
        self.allow_mutation = true;
        let mut actions = Vec::with_capacity(statements.len());
        let mut errors = Vec::new();
        for statement in statements {
            match self.compile_statement(statement) {
                Ok(action) => actions.push(action),
                Err(err) => errors.push(err),
            }
        }
        self.allow_mutation = previous;
        if errors.is_empty() {
            Ok(Consequence {
                actions,
                frame_size: self.frame_size(),
            })
        } else {
            Err(errors)
        }
    }
}

/// Compiles a package-local function body.
///
/// # Errors
///
/// The first error in the body, or `TypeMismatch` if the body's type does not
/// fit the declared return type.
pub fn compile_function(
    symbols: &SymbolTable,
    decl: &FunctionDecl,
    signature: &Signature,
) -> Result<CompiledFunction, CompileError> {
    let mut compiler = ExprCompiler::new(symbols);
    for (param, ty) in decl.params.iter().zip(&signature.params) {
        compiler.bind_local(&param.name, ty.clone());
    }
    let body = compiler.compile(&decl.body)?;
    if signature.ret != Type::Nil && !signature.ret.accepts(&body.ty) {
        return Err(CompileError::type_mismatch(format!(
            "function '{}' returns {}, but its body is {}",
            decl.name, signature.ret, body.ty
        ))
        .with_symbol(&decl.name));
    }
    Ok(CompiledFunction {
        name: Arc::from(decl.name.as_str()),
        signature: signature.clone(),
        body: body.expr,
        frame_size: compiler.frame_size(),
    })
}

fn binary_type(op: BinaryOp, lhs: &Type, rhs: &Type) -> Result<Type, CompileError> {
    let mismatch = || {
        CompileError::type_mismatch(format!(
            "operator '{}' cannot be applied to {lhs} and {rhs}",
            op.symbol()
        ))
    };
    let numeric = |ty: &Type| ty.is_numeric() || *ty == Type::Any;
    match op {
        BinaryOp::Add if *lhs == Type::String || *rhs == Type::String => Ok(Type::String),
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            match (lhs, rhs) {
                (Type::Int, Type::Int) => Ok(Type::Int),
                (Type::Any, _) | (_, Type::Any) if numeric(lhs) && numeric(rhs) => Ok(Type::Any),
                _ if lhs.is_numeric() && rhs.is_numeric() => Ok(Type::Float),
                _ => Err(mismatch()),
            }
        }
        BinaryOp::Eq | BinaryOp::Ne => Ok(Type::Bool),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let comparable = (numeric(lhs) && numeric(rhs))
                || matches!(
                    (lhs, rhs),
                    (Type::String, Type::String) | (Type::String, Type::Any) | (Type::Any, Type::String)
                );
            if comparable { Ok(Type::Bool) } else { Err(mismatch()) }
        }
        BinaryOp::And | BinaryOp::Or => {
            if matches!(lhs, Type::Bool | Type::Any) && matches!(rhs, Type::Bool | Type::Any) {
                Ok(Type::Bool)
            } else {
                Err(mismatch())
            }
        }
    }
}
