//! Rule package AST.
//!
//! This is the interface between a rule-language parser and the compiler.
//! Every identifier in here is unresolved: type names may be short, dotted, or
//! fully qualified, and calls name functions as they appear in source. The
//! [`SymbolTable`](crate::symbols::SymbolTable) resolves them.
//!
//! A package in rule source such as
//!
//! ```text
//! package org.example
//! import org.example.Cheese
//! import function org.example.StaticMethods.*
//! global java.util.List list
//!
//! rule "rule1" salience 30
//! when
//!     Cheese( $type : type, type == getString1("stilton") )
//! then
//!     list.add("rule1");
//! end
//! ```
//!
//! corresponds to the builder chain
//!
//! ```
//! use brindle_language::ast::*;
//!
//! let pkg = PackageDecl::new("org.example")
//!     .import("org.example.Cheese")
//!     .import_functions("org.example.StaticMethods")
//!     .global("list", "java.util.List")
//!     .rule(
//!         RuleDecl::new("rule1")
//!             .salience(30)
//!             .when(PatternDecl::new("Cheese").bind_field("$type", "type").test(
//!                 Expr::equals(Expr::name("type"), Expr::call("getString1", vec![Expr::str("stilton")])),
//!             ))
//!             .then(Statement::Expr(Expr::method(Expr::name("list"), "add", vec![Expr::str("rule1")]))),
//!     );
//! assert_eq!(pkg.rules.len(), 1);
//! ```

use brindle_foundation::Value;

use crate::span::Span;

// =============================================================================
// Package
// =============================================================================

/// A compilation unit: one package of imports, globals, functions and rules.
#[derive(Clone, Debug, PartialEq)]
pub struct PackageDecl {
    /// Dotted package name.
    pub name: String,
    /// Type imports.
    pub imports: Vec<ImportDecl>,
    /// Static function imports.
    pub function_imports: Vec<FunctionImportDecl>,
    /// Global declarations.
    pub globals: Vec<GlobalDecl>,
    /// Locally declared functions.
    pub functions: Vec<FunctionDecl>,
    /// Rules.
    pub rules: Vec<RuleDecl>,
}

impl PackageDecl {
    /// Creates an empty package.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            imports: Vec::new(),
            function_imports: Vec::new(),
            globals: Vec::new(),
            functions: Vec::new(),
            rules: Vec::new(),
        }
    }

    /// Adds `import a.b.C` (or `import a.b.*` when the name ends in `.*`).
    #[must_use]
    pub fn import(mut self, name: &str) -> Self {
        self.imports.push(ImportDecl::parse(name));
        self
    }

    /// Adds `import function holder.*`.
    #[must_use]
    pub fn import_functions(mut self, holder: impl Into<String>) -> Self {
        self.function_imports.push(FunctionImportDecl {
            holder: holder.into(),
            policy: AliasPolicy::Wildcard,
            span: Span::default(),
        });
        self
    }

    /// Adds `import function holder.name`.
    #[must_use]
    pub fn import_function(mut self, holder: impl Into<String>, name: impl Into<String>) -> Self {
        self.function_imports.push(FunctionImportDecl {
            holder: holder.into(),
            policy: AliasPolicy::Named(name.into()),
            span: Span::default(),
        });
        self
    }

    /// Adds `global type_name name`.
    #[must_use]
    pub fn global(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.globals.push(GlobalDecl {
            name: name.into(),
            type_name: type_name.into(),
            span: Span::default(),
        });
        self
    }

    /// Adds a local function.
    #[must_use]
    pub fn function(mut self, function: FunctionDecl) -> Self {
        self.functions.push(function);
        self
    }

    /// Adds a rule.
    #[must_use]
    pub fn rule(mut self, rule: RuleDecl) -> Self {
        self.rules.push(rule);
        self
    }
}

/// A type import directive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImportDecl {
    /// `import a.b.C` - one type under its simple name.
    Type {
        /// Fully-qualified type name.
        name: String,
        /// Source span.
        span: Span,
    },
    /// `import a.b.*` - every type directly inside a package (or type).
    Wildcard {
        /// Package or enclosing type name, without the trailing `.*`.
        package: String,
        /// Source span.
        span: Span,
    },
}

impl ImportDecl {
    /// Parses an import target as written after the `import` keyword.
    #[must_use]
    pub fn parse(target: &str) -> Self {
        match target.strip_suffix(".*") {
            Some(package) => Self::Wildcard {
                package: package.to_string(),
                span: Span::default(),
            },
            None => Self::Type {
                name: target.to_string(),
                span: Span::default(),
            },
        }
    }

    /// Returns the span of this directive.
    #[must_use]
    pub fn span(&self) -> Span {
        match self {
            Self::Type { span, .. } | Self::Wildcard { span, .. } => *span,
        }
    }
}

/// How a function import brings names into scope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AliasPolicy {
    /// Import the one named callable.
    Named(String),
    /// Import every public static callable of the holder.
    Wildcard,
}

/// `import function holder.name` or `import function holder.*`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionImportDecl {
    /// Type that holds the static callables.
    pub holder: String,
    /// Which callables to import.
    pub policy: AliasPolicy,
    /// Source span.
    pub span: Span,
}

/// `global type_name name`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GlobalDecl {
    /// Global name.
    pub name: String,
    /// Declared type name (built-in or catalog type).
    pub type_name: String,
    /// Source span.
    pub span: Span,
}

/// A function parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParamDecl {
    /// Parameter name.
    pub name: String,
    /// Declared type name.
    pub type_name: String,
}

/// `function Ret name(T a, U b) { body }`.
///
/// The body is a single expression; the value of the function is its value.
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionDecl {
    /// Function name.
    pub name: String,
    /// Parameters in order.
    pub params: Vec<ParamDecl>,
    /// Declared return type name.
    pub return_type: String,
    /// Body expression.
    pub body: Expr,
    /// Source span.
    pub span: Span,
}

impl FunctionDecl {
    /// Creates a function with no parameters.
    #[must_use]
    pub fn new(name: impl Into<String>, return_type: impl Into<String>, body: Expr) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            return_type: return_type.into(),
            body,
            span: Span::default(),
        }
    }

    /// Builder method to add a parameter.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.params.push(ParamDecl {
            name: name.into(),
            type_name: type_name.into(),
        });
        self
    }
}

// =============================================================================
// Rules
// =============================================================================

/// A rule declaration.
#[derive(Clone, Debug, PartialEq)]
pub struct RuleDecl {
    /// Rule name, unique within its package.
    pub name: String,
    /// Priority (higher fires first), default 0.
    pub salience: i32,
    /// Suppress re-activation caused by the rule's own consequence.
    pub no_loop: bool,
    /// Disabled rules are compiled but never added to the network.
    pub enabled: bool,
    /// Conditions, matched in order.
    pub conditions: Vec<ConditionElement>,
    /// Consequence statements.
    pub consequence: Vec<Statement>,
    /// Source span.
    pub span: Span,
}

impl RuleDecl {
    /// Creates a new rule with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            salience: 0,
            no_loop: false,
            enabled: true,
            conditions: Vec::new(),
            consequence: Vec::new(),
            span: Span::default(),
        }
    }

    /// Builder method to set salience.
    #[must_use]
    pub fn salience(mut self, salience: i32) -> Self {
        self.salience = salience;
        self
    }

    /// Builder method to set the no-loop flag.
    #[must_use]
    pub fn no_loop(mut self, no_loop: bool) -> Self {
        self.no_loop = no_loop;
        self
    }

    /// Builder method to enable or disable the rule.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Builder method to set the source span.
    #[must_use]
    pub fn span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Builder method to add a condition.
    #[must_use]
    pub fn when(mut self, condition: impl Into<ConditionElement>) -> Self {
        self.conditions.push(condition.into());
        self
    }

    /// Builder method to add a consequence statement.
    #[must_use]
    pub fn then(mut self, statement: Statement) -> Self {
        self.consequence.push(statement);
        self
    }
}

/// One element of a rule's left-hand side.
#[derive(Clone, Debug, PartialEq)]
pub enum ConditionElement {
    /// Match a fact of a type.
    Pattern(PatternDecl),
    /// Require that no fact matches the pattern.
    Not(PatternDecl),
    /// `eval(expr)` - a test over the bindings so far.
    Eval(Expr),
}

impl From<PatternDecl> for ConditionElement {
    fn from(pattern: PatternDecl) -> Self {
        Self::Pattern(pattern)
    }
}

/// `$binding : Type( constraints )`.
#[derive(Clone, Debug, PartialEq)]
pub struct PatternDecl {
    /// Variable bound to the matched fact.
    pub binding: Option<String>,
    /// Type name as written.
    pub type_name: String,
    /// Constraints in order.
    pub constraints: Vec<Constraint>,
    /// Source span.
    pub span: Span,
}

impl PatternDecl {
    /// Creates an unconstrained pattern.
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            binding: None,
            type_name: type_name.into(),
            constraints: Vec::new(),
            span: Span::default(),
        }
    }

    /// Builder method to bind the matched fact to a variable.
    #[must_use]
    pub fn bind(mut self, var: impl Into<String>) -> Self {
        self.binding = Some(var.into());
        self
    }

    /// Builder method to bind a field to a variable (`$v : field`).
    #[must_use]
    pub fn bind_field(mut self, var: impl Into<String>, field: impl Into<String>) -> Self {
        self.constraints.push(Constraint::Binding {
            var: var.into(),
            field: field.into(),
        });
        self
    }

    /// Builder method to add a boolean constraint.
    #[must_use]
    pub fn test(mut self, expr: Expr) -> Self {
        self.constraints.push(Constraint::Test(expr));
        self
    }

    /// Builder method to set the source span.
    #[must_use]
    pub fn span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }
}

/// A constraint inside a pattern.
#[derive(Clone, Debug, PartialEq)]
pub enum Constraint {
    /// `$var : field`.
    Binding {
        /// Variable name.
        var: String,
        /// Field of the pattern's type.
        field: String,
    },
    /// A boolean expression over the pattern's fields and earlier bindings.
    Test(Expr),
}

// =============================================================================
// Consequence
// =============================================================================

/// A consequence statement.
#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    /// Evaluate for side effects.
    Expr(Expr),
    /// `let name = expr` (a local variable).
    Let {
        /// Variable name.
        name: String,
        /// Initial value.
        value: Expr,
    },
    /// `insert(expr)`.
    Insert(Expr),
    /// `modify($var) { field = expr, ... }`.
    Modify {
        /// Fact variable.
        var: String,
        /// Field assignments, applied together.
        assignments: Vec<(String, Expr)>,
    },
    /// `retract($var)`.
    Retract(String),
    /// `setGlobal(name, expr)`.
    SetGlobal {
        /// Global name.
        name: String,
        /// New value.
        value: Expr,
    },
    /// `halt()` - stop the firing loop after this consequence.
    Halt,
}

impl Statement {
    /// Creates a modify statement.
    #[must_use]
    pub fn modify(var: impl Into<String>, assignments: Vec<(&str, Expr)>) -> Self {
        Self::Modify {
            var: var.into(),
            assignments: assignments
                .into_iter()
                .map(|(field, expr)| (field.to_string(), expr))
                .collect(),
        }
    }
}

// =============================================================================
// Expressions
// =============================================================================

/// Binary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `+` (numeric addition or string concatenation).
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `&&`
    And,
    /// `||`
    Or,
}

impl BinaryOp {
    /// Returns the operator as written in source.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => "&&",
            Self::Or => "||",
        }
    }
}

/// Unary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// `!`
    Not,
    /// `-`
    Neg,
}

/// An unresolved expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// A literal value.
    Literal(Value),
    /// A bare identifier: variable, field of the pattern under test, global,
    /// or the first segment of a type path.
    Name(String),
    /// `target.field` - object field, or static constant when `target` names a type.
    Field {
        /// Receiver.
        target: Box<Expr>,
        /// Field name.
        field: String,
    },
    /// `name(args)` - local or imported function.
    Call {
        /// Function name as written.
        name: String,
        /// Arguments.
        args: Vec<Expr>,
    },
    /// `target.method(args)` - static call when `target` names a type,
    /// otherwise a built-in method on the receiver value.
    MethodCall {
        /// Receiver.
        target: Box<Expr>,
        /// Method name.
        method: String,
        /// Arguments.
        args: Vec<Expr>,
    },
    /// `new Type(args)` - positional construction in field declaration order.
    New {
        /// Type name as written.
        type_name: String,
        /// Field values in declaration order.
        args: Vec<Expr>,
    },
    /// A binary operation.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand.
        rhs: Box<Expr>,
    },
    /// A unary operation.
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        operand: Box<Expr>,
    },
}

impl Expr {
    /// A string literal.
    #[must_use]
    pub fn str(s: &str) -> Self {
        Self::Literal(Value::from(s))
    }

    /// An integer literal.
    #[must_use]
    pub fn int(n: i64) -> Self {
        Self::Literal(Value::Int(n))
    }

    /// A boolean literal.
    #[must_use]
    pub fn bool(b: bool) -> Self {
        Self::Literal(Value::Bool(b))
    }

    /// An identifier.
    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// A dotted path such as `Cheesery.Maturity.OLD`.
    ///
    /// The first segment becomes a [`Expr::Name`], the rest field accesses.
    #[must_use]
    pub fn path(dotted: &str) -> Self {
        let mut segments = dotted.split('.');
        let head = Self::name(segments.next().unwrap_or_default());
        segments.fold(head, |target, field| Self::field(target, field))
    }

    /// Field access.
    #[must_use]
    pub fn field(target: Expr, field: impl Into<String>) -> Self {
        Self::Field {
            target: Box::new(target),
            field: field.into(),
        }
    }

    /// Function call.
    #[must_use]
    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::Call {
            name: name.into(),
            args,
        }
    }

    /// Method call.
    #[must_use]
    pub fn method(target: Expr, method: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::MethodCall {
            target: Box::new(target),
            method: method.into(),
            args,
        }
    }

    /// Object construction.
    #[must_use]
    pub fn new_object(type_name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::New {
            type_name: type_name.into(),
            args,
        }
    }

    /// Binary operation.
    #[must_use]
    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Self::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// `lhs == rhs`.
    #[must_use]
    pub fn equals(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Eq, lhs, rhs)
    }

    /// Unary operation.
    #[must_use]
    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Self::Unary {
            op,
            operand: Box::new(operand),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_parse_detects_wildcards() {
        assert_eq!(
            ImportDecl::parse("org.example.*"),
            ImportDecl::Wildcard {
                package: "org.example".to_string(),
                span: Span::default()
            }
        );
        assert!(matches!(
            ImportDecl::parse("org.example.Cheese"),
            ImportDecl::Type { .. }
        ));
    }

    #[test]
    fn path_builds_nested_field_access() {
        let expr = Expr::path("Cheesery.Maturity.OLD");
        assert_eq!(
            expr,
            Expr::field(
                Expr::field(Expr::name("Cheesery"), "Maturity"),
                "OLD"
            )
        );
    }

    #[test]
    fn rule_builder_defaults() {
        let rule = RuleDecl::new("r");
        assert_eq!(rule.salience, 0);
        assert!(!rule.no_loop);
        assert!(rule.enabled);
        assert!(rule.conditions.is_empty());
    }
}
