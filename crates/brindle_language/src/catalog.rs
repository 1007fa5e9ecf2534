//! The type universe rules are compiled against.
//!
//! A [`Catalog`] lists every fact type the host application exposes to rules:
//! its fields, its static constants, and its static callables. Nested types
//! are registered under dotted names below their enclosing type, e.g.
//! `org.example.FirstClass.AlternativeKey`.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use brindle_foundation::{Error, ErrorKind, Object, Result, Type, Value};

// =============================================================================
// QualifiedName
// =============================================================================

/// A dotted name like `org.example.Cheese`.
///
/// Stored as path segments for easy manipulation and comparison.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedName {
    /// Path segments (e.g., `["org", "example", "Cheese"]`).
    pub segments: Vec<String>,
}

impl QualifiedName {
    /// Creates a name from a dotted string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        Self {
            segments: s
                .split('.')
                .filter(|segment| !segment.is_empty())
                .map(String::from)
                .collect(),
        }
    }

    /// Returns the full dotted name.
    #[must_use]
    pub fn full_name(&self) -> String {
        self.segments.join(".")
    }

    /// Returns the simple name (last segment).
    #[must_use]
    pub fn simple_name(&self) -> &str {
        self.segments.last().map_or("", String::as_str)
    }

    /// Returns the enclosing package or type, if any.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() < 2 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Returns this name with `segment` appended.
    #[must_use]
    pub fn child(&self, segment: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Self { segments }
    }

    /// Returns true if the name has more than one segment.
    #[must_use]
    pub fn is_qualified(&self) -> bool {
        self.segments.len() > 1
    }

    /// Returns true if the name has no segments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_name())
    }
}

// =============================================================================
// Native functions
// =============================================================================

/// Host implementation of a static callable.
pub type NativeFn = dyn Fn(&[Value]) -> Result<Value> + Send + Sync;

/// A static callable exposed by a catalog type.
///
/// Equality and hashing use the holder, name, and signature; the host closure
/// itself is opaque.
#[derive(Clone)]
pub struct NativeFunction {
    holder: QualifiedName,
    name: Arc<str>,
    params: Vec<Type>,
    ret: Type,
    func: Arc<NativeFn>,
}

impl NativeFunction {
    /// Creates a callable. The holder is filled in when it is added to a
    /// [`TypeDef`].
    pub fn new<F>(name: impl Into<Arc<str>>, params: Vec<Type>, ret: Type, func: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            holder: QualifiedName { segments: Vec::new() },
            name: name.into(),
            params,
            ret,
            func: Arc::new(func),
        }
    }

    /// Returns the simple name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the type that declares this callable.
    #[must_use]
    pub fn holder(&self) -> &QualifiedName {
        &self.holder
    }

    /// Returns the parameter types.
    #[must_use]
    pub fn params(&self) -> &[Type] {
        &self.params
    }

    /// Returns the return type.
    #[must_use]
    pub fn ret(&self) -> &Type {
        &self.ret
    }

    /// Returns `holder.name`.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.holder, self.name)
    }

    /// Invokes the host closure.
    ///
    /// # Errors
    ///
    /// Returns an arity error if the argument count does not match, or
    /// whatever the host closure returns.
    pub fn invoke(&self, args: &[Value]) -> Result<Value> {
        if args.len() != self.params.len() {
            return Err(Error::arity_mismatch(
                self.qualified_name(),
                self.params.len(),
                args.len(),
            ));
        }
        (self.func)(args)
    }
}

impl PartialEq for NativeFunction {
    fn eq(&self, other: &Self) -> bool {
        self.holder == other.holder
            && self.name == other.name
            && self.params == other.params
            && self.ret == other.ret
    }
}

impl Eq for NativeFunction {}

impl Hash for NativeFunction {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.holder.hash(state);
        self.name.hash(state);
        self.params.hash(state);
        self.ret.hash(state);
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.qualified_name())?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{param}")?;
        }
        write!(f, ") -> {}", self.ret)
    }
}

// =============================================================================
// TypeDef
// =============================================================================

/// A field declared on a type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDef {
    /// Field name.
    pub name: Arc<str>,
    /// Declared type.
    pub ty: Type,
    /// Value used when an instance is created without one.
    pub default: Value,
}

/// A fact type: fields, static constants, and static callables.
#[derive(Clone, Debug)]
pub struct TypeDef {
    name: QualifiedName,
    full_name: Arc<str>,
    fields: Vec<FieldDef>,
    constants: BTreeMap<String, Value>,
    functions: Vec<NativeFunction>,
}

impl TypeDef {
    /// Creates a type with the given fully-qualified name.
    #[must_use]
    pub fn new(name: &str) -> Self {
        let name = QualifiedName::parse(name);
        Self {
            full_name: Arc::from(name.full_name()),
            name,
            fields: Vec::new(),
            constants: BTreeMap::new(),
            functions: Vec::new(),
        }
    }

    /// Builder method to declare a field with its type's zero value as default.
    #[must_use]
    pub fn field(self, name: &str, ty: Type) -> Self {
        let default = match ty {
            Type::Bool => Value::Bool(false),
            Type::Int => Value::Int(0),
            Type::Float => Value::Float(0.0),
            _ => Value::Nil,
        };
        self.field_with_default(name, ty, default)
    }

    /// Builder method to declare a field with an explicit default.
    #[must_use]
    pub fn field_with_default(mut self, name: &str, ty: Type, default: Value) -> Self {
        self.fields.push(FieldDef {
            name: Arc::from(name),
            ty,
            default,
        });
        self
    }

    /// Builder method to declare a static constant.
    #[must_use]
    pub fn constant(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.constants.insert(name.to_string(), value.into());
        self
    }

    /// Builder method to declare a static callable.
    #[must_use]
    pub fn function(mut self, mut function: NativeFunction) -> Self {
        function.holder = self.name.clone();
        self.functions.push(function);
        self
    }

    /// Returns the qualified name.
    #[must_use]
    pub fn name(&self) -> &QualifiedName {
        &self.name
    }

    /// Returns the fully-qualified name as a shared string.
    #[must_use]
    pub fn full_name(&self) -> &Arc<str> {
        &self.full_name
    }

    /// Returns the static type of instances.
    #[must_use]
    pub fn as_type(&self) -> Type {
        Type::Object(Arc::clone(&self.full_name))
    }

    /// Returns the declared fields in order.
    #[must_use]
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Looks up a field.
    #[must_use]
    pub fn field_def(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| &*f.name == name)
    }

    /// Looks up a static constant.
    #[must_use]
    pub fn constant_value(&self, name: &str) -> Option<&Value> {
        self.constants.get(name)
    }

    /// Returns all static callables.
    #[must_use]
    pub fn functions(&self) -> &[NativeFunction] {
        &self.functions
    }

    /// Returns the static callables with the given name (all overloads).
    pub fn functions_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a NativeFunction> {
        self.functions.iter().filter(move |f| f.name() == name)
    }

    /// Creates an instance with every field at its default.
    #[must_use]
    pub fn default_object(&self) -> Object {
        self.fields
            .iter()
            .fold(Object::new(Arc::clone(&self.full_name)), |obj, field| {
                obj.with(Arc::clone(&field.name), field.default.clone())
            })
    }

    /// Creates an instance from positional field values.
    ///
    /// # Errors
    ///
    /// Returns an arity error if the number of values does not match the
    /// number of declared fields, or a type mismatch if a value does not fit
    /// its field.
    pub fn instantiate(&self, args: Vec<Value>) -> Result<Object> {
        if args.len() != self.fields.len() {
            return Err(Error::arity_mismatch(
                format!("new {}", self.full_name),
                self.fields.len(),
                args.len(),
            ));
        }
        let mut obj = Object::new(Arc::clone(&self.full_name));
        for (field, value) in self.fields.iter().zip(args) {
            let actual = value.value_type();
            if !field.ty.accepts(&actual) {
                return Err(Error::type_mismatch(field.ty.clone(), actual));
            }
            obj = obj.with(Arc::clone(&field.name), value);
        }
        Ok(obj)
    }
}

impl PartialEq for TypeDef {
    fn eq(&self, other: &Self) -> bool {
        self.full_name == other.full_name
    }
}

impl Eq for TypeDef {}

impl Hash for TypeDef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.full_name.hash(state);
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// The set of types visible to rule compilation.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    types: BTreeMap<String, Arc<TypeDef>>,
}

impl Catalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a type.
    ///
    /// # Errors
    ///
    /// Returns an error if a type with the same fully-qualified name exists.
    pub fn register(&mut self, def: TypeDef) -> Result<()> {
        let key = def.full_name().to_string();
        if self.types.contains_key(&key) {
            return Err(Error::new(ErrorKind::DuplicateDefinition(key)));
        }
        self.types.insert(key, Arc::new(def));
        Ok(())
    }

    /// Looks up a type by fully-qualified name.
    #[must_use]
    pub fn get(&self, full_name: &str) -> Option<&Arc<TypeDef>> {
        self.types.get(full_name)
    }

    /// Returns true if the type exists.
    #[must_use]
    pub fn contains(&self, full_name: &str) -> bool {
        self.types.contains_key(full_name)
    }

    /// Returns the types declared directly inside a package or enclosing type.
    pub fn types_in_package<'a>(&'a self, package: &str) -> impl Iterator<Item = &'a Arc<TypeDef>> {
        let prefix = format!("{package}.");
        let depth = QualifiedName::parse(package).segments.len() + 1;
        self.types
            .range(prefix.clone()..)
            .take_while(move |(name, _)| name.starts_with(prefix.as_str()))
            .map(|(_, def)| def)
            .filter(move |def| def.name().segments.len() == depth)
    }

    /// Returns the number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns true if no types are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Returns all types in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<TypeDef>> {
        self.types.values()
    }
}
