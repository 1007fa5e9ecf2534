//! Built-in methods on strings and lists.

use brindle_foundation::{Error, ErrorKind, Result, Type, Value};

/// A read-only method callable on a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BuiltinMethod {
    /// `x.equals(y)`
    Equals,
    /// `x.toString()`
    ToText,
    /// `s.length()`
    Length,
    /// `list.size()`
    Size,
    /// `s.isEmpty()` / `list.isEmpty()`
    IsEmpty,
    /// `s.contains(sub)` / `list.contains(x)`
    Contains,
    /// `list.get(i)`
    Get,
    /// `s.toUpperCase()`
    ToUpperCase,
    /// `s.toLowerCase()`
    ToLowerCase,
    /// `s.startsWith(prefix)`
    StartsWith,
    /// `s.endsWith(suffix)`
    EndsWith,
    /// `s.concat(other)`
    Concat,
}

impl BuiltinMethod {
    /// Finds the method `name` for a receiver of the given static type.
    #[must_use]
    pub fn lookup(name: &str, receiver: &Type) -> Option<Self> {
        let stringy = matches!(receiver, Type::String | Type::Any);
        let listy = matches!(receiver, Type::List(_) | Type::Any);
        match name {
            "equals" => Some(Self::Equals),
            "toString" => Some(Self::ToText),
            "length" if stringy => Some(Self::Length),
            "size" if listy => Some(Self::Size),
            "isEmpty" if stringy || listy => Some(Self::IsEmpty),
            "contains" if stringy || listy => Some(Self::Contains),
            "get" if listy => Some(Self::Get),
            "toUpperCase" if stringy => Some(Self::ToUpperCase),
            "toLowerCase" if stringy => Some(Self::ToLowerCase),
            "startsWith" if stringy => Some(Self::StartsWith),
            "endsWith" if stringy => Some(Self::EndsWith),
            "concat" if stringy => Some(Self::Concat),
            _ => None,
        }
    }

    /// Returns the method name as written in source.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::ToText => "toString",
            Self::Length => "length",
            Self::Size => "size",
            Self::IsEmpty => "isEmpty",
            Self::Contains => "contains",
            Self::Get => "get",
            Self::ToUpperCase => "toUpperCase",
            Self::ToLowerCase => "toLowerCase",
            Self::StartsWith => "startsWith",
            Self::EndsWith => "endsWith",
            Self::Concat => "concat",
        }
    }

    /// Returns the parameter types.
    #[must_use]
    pub fn params(self) -> Vec<Type> {
        match self {
            Self::Equals | Self::Contains => vec![Type::Any],
            Self::Get => vec![Type::Int],
            Self::StartsWith | Self::EndsWith | Self::Concat => vec![Type::String],
            _ => Vec::new(),
        }
    }

    /// Returns the static result type for a receiver type.
    #[must_use]
    pub fn return_type(self, receiver: &Type) -> Type {
        match self {
            Self::Equals | Self::IsEmpty | Self::Contains | Self::StartsWith | Self::EndsWith => {
                Type::Bool
            }
            Self::Length | Self::Size => Type::Int,
            Self::ToText | Self::ToUpperCase | Self::ToLowerCase | Self::Concat => Type::String,
            Self::Get => match receiver {
                Type::List(elem) => (**elem).clone(),
                _ => Type::Any,
            },
        }
    }

    /// Invokes the method.
    ///
    /// # Errors
    ///
    /// Returns an error if the receiver or arguments have the wrong runtime
    /// type, or if `get` is out of bounds.
    pub fn invoke(self, receiver: &Value, args: &[Value]) -> Result<Value> {
        let expected = self.params().len();
        if args.len() != expected {
            return Err(Error::arity_mismatch(self.name(), expected, args.len()));
        }
        match (self, receiver) {
            (Self::Equals, _) => Ok(Value::Bool(receiver == &args[0])),
            (Self::ToText, _) => Ok(Value::from(receiver.to_string())),
            (Self::Length, Value::String(s)) => Ok(Value::Int(count(s.chars().count()))),
            (Self::Size, Value::List(items)) => Ok(Value::Int(count(items.len()))),
            (Self::IsEmpty, Value::String(s)) => Ok(Value::Bool(s.is_empty())),
            (Self::IsEmpty, Value::List(items)) => Ok(Value::Bool(items.is_empty())),
            (Self::Contains, Value::String(s)) => {
                let needle = string_arg(self, &args[0])?;
                Ok(Value::Bool(s.contains(needle)))
            }
            (Self::Contains, Value::List(items)) => Ok(Value::Bool(items.contains(&args[0]))),
            (Self::Get, Value::List(items)) => {
                let index = args[0]
                    .as_int()
                    .ok_or_else(|| Error::type_mismatch(Type::Int, args[0].value_type()))?;
                usize::try_from(index)
                    .ok()
                    .and_then(|i| items.get(i))
                    .cloned()
                    .ok_or_else(|| {
                        Error::new(ErrorKind::IndexOutOfBounds {
                            index,
                            length: items.len(),
                        })
                    })
            }
            (Self::ToUpperCase, Value::String(s)) => Ok(Value::from(s.to_uppercase())),
            (Self::ToLowerCase, Value::String(s)) => Ok(Value::from(s.to_lowercase())),
            (Self::StartsWith, Value::String(s)) => {
                Ok(Value::Bool(s.starts_with(string_arg(self, &args[0])?)))
            }
            (Self::EndsWith, Value::String(s)) => {
                Ok(Value::Bool(s.ends_with(string_arg(self, &args[0])?)))
            }
            (Self::Concat, Value::String(s)) => {
                Ok(Value::from(format!("{s}{}", string_arg(self, &args[0])?)))
            }
            _ => Err(Error::new(ErrorKind::UndefinedMethod {
                method: self.name().to_string(),
                receiver: receiver.value_type(),
            })),
        }
    }
}

fn string_arg(method: BuiltinMethod, value: &Value) -> Result<&str> {
    value.as_str().ok_or_else(|| {
        Error::type_mismatch(Type::String, value.value_type())
            .with_context(brindle_foundation::ErrorContext::new().with_frame(method.name()))
    })
}

fn count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// A method that changes a list held in a global.
///
/// Globals are the only mutable state a consequence can reach besides facts,
/// so `list.add(x)` on a global compiles to a read of the global, a new list,
/// and a write back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ListMutator {
    /// `list.add(x)`
    Add,
    /// `list.clear()`
    Clear,
}

impl ListMutator {
    /// Finds a mutator by name.
    #[must_use]
    pub fn lookup(name: &str) -> Option<Self> {
        match name {
            "add" => Some(Self::Add),
            "clear" => Some(Self::Clear),
            _ => None,
        }
    }

    /// Returns the method name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Clear => "clear",
        }
    }

    /// Returns the number of arguments.
    #[must_use]
    pub fn arity(self) -> usize {
        match self {
            Self::Add => 1,
            Self::Clear => 0,
        }
    }

    /// Returns the static result type.
    #[must_use]
    pub fn return_type(self) -> Type {
        match self {
            Self::Add => Type::Bool,
            Self::Clear => Type::Nil,
        }
    }

    /// Applies the mutation, returning the new list and the call's result.
    ///
    /// # Errors
    ///
    /// Returns a type mismatch if `current` is not a list.
    pub fn apply(self, current: &Value, args: &[Value]) -> Result<(Value, Value)> {
        if args.len() != self.arity() {
            return Err(Error::arity_mismatch(self.name(), self.arity(), args.len()));
        }
        let Value::List(items) = current else {
            return Err(Error::type_mismatch(
                Type::list(Type::Any),
                current.value_type(),
            ));
        };
        match self {
            Self::Add => Ok((Value::List(items.push_back(args[0].clone())), Value::Bool(true))),
            Self::Clear => Ok((Value::empty_list(), Value::Nil)),
        }
    }
}
