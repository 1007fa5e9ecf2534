//! Tree-walking evaluator for compiled expressions.
//!
//! The evaluator reads facts and globals through the [`FactView`] trait and
//! writes globals through [`RuntimeContext`]. Constraint tests get a read-only
//! view; only consequences run with a context that can change globals.

#![allow(clippy::cast_precision_loss)]

use std::cmp::Ordering;

use brindle_foundation::{
    Error, ErrorContext, ErrorKind, FactHandle, Object, Result, SemanticLimit, Type, Value,
};

use crate::ast::{BinaryOp, UnaryOp};
use crate::expr::{CompiledExpr, FunctionTable};
use crate::symbols::CallableTarget;

/// Nesting limit for local function calls.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 64;

// =============================================================================
// Context traits
// =============================================================================

/// Read access to the facts and globals of a session.
pub trait FactView {
    /// Returns the fact with the given handle.
    fn fact(&self, handle: FactHandle) -> Option<&Object>;

    /// Returns the current value of a global, if it has been set.
    fn global(&self, name: &str) -> Option<&Value>;
}

/// A [`FactView`] that can also change globals.
pub trait RuntimeContext: FactView {
    /// Replaces the value of a global.
    ///
    /// # Errors
    ///
    /// Returns an error if the context does not allow writes.
    fn set_global(&mut self, name: &str, value: Value) -> Result<()>;
}

/// A context with no facts and no globals, for constant evaluation.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoContext;

impl FactView for NoContext {
    fn fact(&self, _handle: FactHandle) -> Option<&Object> {
        None
    }

    fn global(&self, _name: &str) -> Option<&Value> {
        None
    }
}

impl RuntimeContext for NoContext {
    fn set_global(&mut self, name: &str, _value: Value) -> Result<()> {
        Err(Error::unknown_global(name))
    }
}

struct ReadOnly<'a>(&'a dyn FactView);

impl FactView for ReadOnly<'_> {
    fn fact(&self, handle: FactHandle) -> Option<&Object> {
        self.0.fact(handle)
    }

    fn global(&self, name: &str) -> Option<&Value> {
        self.0.global(name)
    }
}

impl RuntimeContext for ReadOnly<'_> {
    fn set_global(&mut self, name: &str, _value: Value) -> Result<()> {
        Err(Error::internal(format!(
            "global '{name}' cannot be changed while matching"
        )))
    }
}

// =============================================================================
// Scope
// =============================================================================

/// The facts an expression can see.
#[derive(Clone, Copy, Debug, Default)]
pub struct Scope<'a> {
    /// Facts matched by earlier patterns, in pattern order.
    pub tuple: &'a [FactHandle],
    /// The fact under test, when evaluating a pattern constraint.
    pub current: Option<&'a Object>,
}

impl<'a> Scope<'a> {
    /// A scope with no facts.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A scope over a matched tuple.
    #[must_use]
    pub fn tuple(tuple: &'a [FactHandle]) -> Self {
        Self {
            tuple,
            current: None,
        }
    }

    /// Builder method to set the fact under test.
    #[must_use]
    pub fn with_current(mut self, current: &'a Object) -> Self {
        self.current = Some(current);
        self
    }
}

// =============================================================================
// Evaluator
// =============================================================================

/// Evaluates compiled expressions against a package's local functions.
pub struct Evaluator<'f> {
    functions: &'f FunctionTable,
    max_depth: usize,
    depth: usize,
}

impl<'f> Evaluator<'f> {
    /// Creates an evaluator.
    #[must_use]
    pub fn new(functions: &'f FunctionTable) -> Self {
        Self {
            functions,
            max_depth: DEFAULT_MAX_CALL_DEPTH,
            depth: 0,
        }
    }

    /// Builder method to set the call depth limit.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Evaluates a boolean test without write access.
    ///
    /// # Errors
    ///
    /// Returns an error if evaluation fails or the result is not a boolean.
    pub fn test(&mut self, expr: &CompiledExpr, scope: Scope<'_>, view: &dyn FactView) -> Result<bool> {
        let mut ctx = ReadOnly(view);
        let value = self.eval(expr, scope, &mut [], &mut ctx)?;
        value
            .as_bool()
            .ok_or_else(|| Error::type_mismatch(Type::Bool, value.value_type()))
    }

    /// Evaluates an expression.
    ///
    /// `frame` holds consequence locals; it must be at least as long as the
    /// frame size the expression was compiled with.
    ///
    /// # Errors
    ///
    /// Returns an error on runtime type errors, division by zero, failing host
    /// functions, or when the call depth limit is exceeded.
    pub fn eval(
        &mut self,
        expr: &CompiledExpr,
        scope: Scope<'_>,
        frame: &mut [Value],
        ctx: &mut dyn RuntimeContext,
    ) -> Result<Value> {
        match expr {
            CompiledExpr::Const(value) => Ok(value.clone()),
            CompiledExpr::Local(slot) => frame
                .get(*slot)
                .cloned()
                .ok_or_else(|| Error::internal(format!("frame slot {slot} out of range"))),
            CompiledExpr::Fact(index) => {
                let obj = tuple_fact(scope, *index, ctx)?;
                Ok(Value::Object(obj.clone()))
            }
            CompiledExpr::FactField { index, field } => {
                let obj = tuple_fact(scope, *index, ctx)?;
                Ok(obj.get(field).cloned().unwrap_or(Value::Nil))
            }
            CompiledExpr::CurrentField(field) => scope
                .current
                .map(|obj| obj.get(field).cloned().unwrap_or(Value::Nil))
                .ok_or_else(|| Error::internal(format!("no fact under test for field '{field}'"))),
            CompiledExpr::Global(name) => Ok(ctx.global(name).cloned().unwrap_or(Value::Nil)),
            CompiledExpr::Field { target, field } => {
                let value = self.eval(target, scope, frame, ctx)?;
                match value {
                    Value::Object(obj) => Ok(obj.get(field).cloned().unwrap_or(Value::Nil)),
                    other => Err(Error::unknown_field(other.value_type().to_string(), &**field)),
                }
            }
            CompiledExpr::Call { name, target, args } => {
                let args = self.eval_all(args, scope, frame, ctx)?;
                match target {
                    CallableTarget::Native(function) => function.invoke(&args),
                    CallableTarget::Local(index) => self.call_local(name, *index, args, ctx),
                }
            }
            CompiledExpr::Method {
                receiver,
                method,
                args,
            } => {
                let receiver = self.eval(receiver, scope, frame, ctx)?;
                let args = self.eval_all(args, scope, frame, ctx)?;
                method.invoke(&receiver, &args)
            }
            CompiledExpr::GlobalMutate {
                global,
                mutator,
                args,
            } => {
                let args = self.eval_all(args, scope, frame, ctx)?;
                let current = ctx.global(global).cloned().unwrap_or(Value::Nil);
                let (updated, result) = mutator.apply(&current, &args).map_err(|err| {
                    err.with_context(ErrorContext::new().with_frame(format!("global {global}")))
                })?;
                ctx.set_global(global, updated)?;
                Ok(result)
            }
            CompiledExpr::New { def, args } => {
                let args = self.eval_all(args, scope, frame, ctx)?;
                def.instantiate(args).map(Value::Object)
            }
            CompiledExpr::Binary { op, lhs, rhs } => match op {
                BinaryOp::And => {
                    if !truthy(&self.eval(lhs, scope, frame, ctx)?)? {
                        return Ok(Value::Bool(false));
                    }
                    Ok(Value::Bool(truthy(&self.eval(rhs, scope, frame, ctx)?)?))
                }
                BinaryOp::Or => {
                    if truthy(&self.eval(lhs, scope, frame, ctx)?)? {
                        return Ok(Value::Bool(true));
                    }
                    Ok(Value::Bool(truthy(&self.eval(rhs, scope, frame, ctx)?)?))
                }
                _ => {
                    let lhs = self.eval(lhs, scope, frame, ctx)?;
                    let rhs = self.eval(rhs, scope, frame, ctx)?;
                    apply_binary(*op, &lhs, &rhs)
                }
            },
            CompiledExpr::Unary { op, operand } => {
                let value = self.eval(operand, scope, frame, ctx)?;
                apply_unary(*op, &value)
            }
        }
    }

    fn eval_all(
        &mut self,
        exprs: &[CompiledExpr],
        scope: Scope<'_>,
        frame: &mut [Value],
        ctx: &mut dyn RuntimeContext,
    ) -> Result<Vec<Value>> {
        exprs
            .iter()
            .map(|expr| self.eval(expr, scope, frame, ctx))
            .collect()
    }

    fn call_local(
        &mut self,
        name: &str,
        index: usize,
        args: Vec<Value>,
        ctx: &mut dyn RuntimeContext,
    ) -> Result<Value> {
        let functions = self.functions;
        let function = functions.get(index).ok_or_else(|| {
            Error::internal(format!(
                "function '{name}' is not defined in package {}",
                functions.package()
            ))
        })?;
        if self.depth >= self.max_depth {
            return Err(Error::limit_exceeded(SemanticLimit::MaxCallDepth {
                limit: self.max_depth,
                function: Some(name.to_string()),
            }));
        }
        let mut frame = args;
        frame.resize(function.frame_size.max(frame.len()), Value::Nil);

        self.depth += 1;
        let result = self.eval(&function.body, Scope::empty(), &mut frame, ctx);
        self.depth -= 1;
        result
    }
}

fn tuple_fact<'c>(scope: Scope<'_>, index: usize, ctx: &'c dyn RuntimeContext) -> Result<&'c Object> {
    let handle = scope
        .tuple
        .get(index)
        .copied()
        .ok_or_else(|| Error::internal(format!("tuple has no fact at index {index}")))?;
    ctx.fact(handle).ok_or_else(|| Error::unknown_fact(handle))
}

fn truthy(value: &Value) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| Error::type_mismatch(Type::Bool, value.value_type()))
}

// =============================================================================
// Operators
// =============================================================================

/// Applies a non-short-circuiting binary operator.
///
/// Integer arithmetic wraps on overflow and fails on division by zero; float
/// arithmetic follows IEEE rules. `+` concatenates when either side is a
/// string. Equality compares integers and floats numerically.
///
/// # Errors
///
/// Returns a type mismatch for unsupported operand types and
/// `DivisionByZero` for integer division or remainder by zero.
pub fn apply_binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value> {
    match op {
        BinaryOp::Add => match (lhs, rhs) {
            (Value::String(a), b) => Ok(Value::from(format!("{a}{b}"))),
            (a, Value::String(b)) => Ok(Value::from(format!("{a}{b}"))),
            _ => arithmetic(lhs, rhs, i64::wrapping_add, |a, b| a + b),
        },
        BinaryOp::Sub => arithmetic(lhs, rhs, i64::wrapping_sub, |a, b| a - b),
        BinaryOp::Mul => arithmetic(lhs, rhs, i64::wrapping_mul, |a, b| a * b),
        BinaryOp::Div => {
            if matches!(rhs, Value::Int(0)) && matches!(lhs, Value::Int(_)) {
                return Err(Error::new(ErrorKind::DivisionByZero));
            }
            arithmetic(lhs, rhs, i64::wrapping_div, |a, b| a / b)
        }
        BinaryOp::Rem => {
            if matches!(rhs, Value::Int(0)) && matches!(lhs, Value::Int(_)) {
                return Err(Error::new(ErrorKind::DivisionByZero));
            }
            arithmetic(lhs, rhs, i64::wrapping_rem, |a, b| a % b)
        }
        BinaryOp::Eq => Ok(Value::Bool(values_equal(lhs, rhs))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(lhs, rhs))),
        BinaryOp::Lt => compare(lhs, rhs, Ordering::is_lt),
        BinaryOp::Le => compare(lhs, rhs, Ordering::is_le),
        BinaryOp::Gt => compare(lhs, rhs, Ordering::is_gt),
        BinaryOp::Ge => compare(lhs, rhs, Ordering::is_ge),
        BinaryOp::And => Ok(Value::Bool(truthy(lhs)? && truthy(rhs)?)),
        BinaryOp::Or => Ok(Value::Bool(truthy(lhs)? || truthy(rhs)?)),
    }
}

/// Applies a unary operator.
///
/// # Errors
///
/// Returns a type mismatch if the operand has the wrong type.
pub fn apply_unary(op: UnaryOp, value: &Value) -> Result<Value> {
    match (op, value) {
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::Neg, Value::Int(n)) => Ok(Value::Int(n.wrapping_neg())),
        (UnaryOp::Neg, Value::Float(n)) => Ok(Value::Float(-n)),
        (UnaryOp::Not, other) => Err(Error::type_mismatch(Type::Bool, other.value_type())),
        (UnaryOp::Neg, other) => Err(Error::type_mismatch(Type::Float, other.value_type())),
    }
}

fn arithmetic(
    lhs: &Value,
    rhs: &Value,
    int_op: fn(i64, i64) -> i64,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(int_op(*a, *b))),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(float_op(*a, *b))),
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float(float_op(*a as f64, *b))),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(float_op(*a, *b as f64))),
        (Value::Int(_) | Value::Float(_), other) | (other, _) => {
            Err(Error::type_mismatch(Type::Float, other.value_type()))
        }
    }
}

fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
        _ => lhs == rhs,
    }
}

fn compare(lhs: &Value, rhs: &Value, pred: fn(Ordering) -> bool) -> Result<Value> {
    let ordering = match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let (Some(a), Some(b)) = (lhs.as_f64(), rhs.as_f64()) else {
                return Err(Error::internal("numeric widening failed"));
            };
            a.partial_cmp(&b)
        }
        (Value::String(_), other) => {
            return Err(Error::type_mismatch(Type::String, other.value_type()));
        }
        (Value::Int(_) | Value::Float(_), other) | (other, _) => {
            return Err(Error::type_mismatch(Type::Float, other.value_type()));
        }
    };
    // NaN compares false with everything.
    Ok(Value::Bool(ordering.is_some_and(pred)))
}
