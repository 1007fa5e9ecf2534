//! Static type descriptors.
//!
//! The rule compiler infers a [`Type`] for every expression so that obviously
//! ill-typed conditions and consequences are rejected before a rule is built,
//! and so that overloaded callables can be selected by argument type.

use std::fmt;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Type descriptor.
#[derive(Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Type {
    /// The nil type (only value: nil).
    Nil,
    /// Boolean type.
    Bool,
    /// 64-bit signed integer.
    Int,
    /// 64-bit floating point.
    Float,
    /// String type.
    String,
    /// List type with an element type.
    List(Box<Type>),
    /// Instance of a catalog type, by fully-qualified name.
    Object(Arc<str>),
    /// Any type (accepts any value; used where nothing is known statically).
    Any,
}

impl Type {
    /// Creates a list type with the given element type.
    #[must_use]
    pub fn list(element: Type) -> Self {
        Self::List(Box::new(element))
    }

    /// Creates an object type for the given fully-qualified type name.
    #[must_use]
    pub fn object(name: impl Into<Arc<str>>) -> Self {
        Self::Object(name.into())
    }

    /// Returns true if a value of type `other` can be stored where `self` is
    /// expected.
    ///
    /// `Any` on either side is accepted, integers widen to floats, nil is
    /// accepted by reference-like types (strings, lists, objects), and list
    /// element types are checked recursively.
    #[must_use]
    pub fn accepts(&self, other: &Type) -> bool {
        match (self, other) {
            (Self::Any, _) | (_, Self::Any) => true,
            (Self::Float, Self::Int) => true,
            (Self::String | Self::List(_) | Self::Object(_), Self::Nil) => true,
            (Self::List(a), Self::List(b)) => a.accepts(b),
            _ => self == other,
        }
    }

    /// Returns true if this is a numeric type.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int | Self::Float)
    }

    /// Parses the name of a built-in type as it appears in rule source.
    ///
    /// Both the short and the `java.lang`/`java.util` style qualified spellings
    /// are recognised, since rule files written for other engines use them.
    #[must_use]
    pub fn from_builtin_name(name: &str) -> Option<Self> {
        let short = name
            .strip_prefix("java.lang.")
            .or_else(|| name.strip_prefix("java.util."))
            .unwrap_or(name);
        match short {
            "boolean" | "Boolean" | "bool" => Some(Self::Bool),
            "int" | "Integer" | "long" | "Long" | "short" | "Short" | "Int" => Some(Self::Int),
            "double" | "Double" | "float" | "Float" | "Number" => Some(Self::Float),
            "String" | "CharSequence" => Some(Self::String),
            "List" | "ArrayList" | "LinkedList" | "Collection" => Some(Self::list(Self::Any)),
            "Object" | "Any" => Some(Self::Any),
            "void" | "Void" | "Nil" => Some(Self::Nil),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => write!(f, "nil"),
            Self::Bool => write!(f, "bool"),
            Self::Int => write!(f, "int"),
            Self::Float => write!(f, "float"),
            Self::String => write!(f, "string"),
            Self::List(elem) => write!(f, "list<{elem}>"),
            Self::Object(name) => write!(f, "{name}"),
            Self::Any => write!(f, "any"),
        }
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}
