//! Typed records.
//!
//! An [`Object`] is an instance of a catalog type: a fully-qualified type name
//! plus an ordered map of field values. Objects are immutable; "setting" a
//! field returns a new object that shares structure with the old one.

use std::fmt;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::collections::LtMap;
use crate::value::Value;

/// An instance of a named type.
#[derive(Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Object {
    type_name: Arc<str>,
    fields: LtMap<Arc<str>, Value>,
}

impl Object {
    /// Creates an object of the given type with no fields set.
    #[must_use]
    pub fn new(type_name: impl Into<Arc<str>>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: LtMap::new(),
        }
    }

    /// Builder method to set a field.
    #[must_use]
    pub fn with(self, field: impl Into<Arc<str>>, value: impl Into<Value>) -> Self {
        Self {
            fields: self.fields.insert(field.into(), value.into()),
            type_name: self.type_name,
        }
    }

    /// Returns a copy of this object with `field` set to `value`.
    #[must_use]
    pub fn set(&self, field: impl Into<Arc<str>>, value: Value) -> Self {
        Self {
            type_name: Arc::clone(&self.type_name),
            fields: self.fields.insert(field.into(), value),
        }
    }

    /// Returns the fully-qualified type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Returns the type name as a shared string.
    #[must_use]
    pub fn type_name_arc(&self) -> &Arc<str> {
        &self.type_name
    }

    /// Gets a field value.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Returns true if the field is set.
    #[must_use]
    pub fn has(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Returns an iterator over fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&Arc<str>, &Value)> {
        self.fields.iter()
    }

    /// Returns the number of fields set.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let simple = self
            .type_name
            .rsplit('.')
            .next()
            .unwrap_or(&self.type_name);
        write!(f, "{simple}(")?;
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match value {
                Value::String(s) => write!(f, "{name}: {s:?}")?,
                other => write!(f, "{name}: {other}")?,
            }
        }
        write!(f, ")")
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("type", &self.type_name)
            .field("fields", &self.fields)
            .finish()
    }
}
