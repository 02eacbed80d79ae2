//! Validated schema descriptors.
//!
//! These are the immutable forms produced by the loader. Message shapes are
//! shared between methods through `Arc`, so cloning a [`MethodDescriptor`]
//! is cheap.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Semantic type of a message field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Boolean,
    /// Carried on the wire as one of the listed variant names.
    Enum(Vec<String>),
}

impl FieldType {
    /// Name used in schema sources and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
            FieldType::Enum(_) => "enum",
        }
    }

    /// Value used when neither the wire nor the schema provides one.
    pub fn zero_value(&self) -> FieldValue {
        match self {
            FieldType::String => FieldValue::String(String::new()),
            FieldType::Integer => FieldValue::Integer(0),
            FieldType::Boolean => FieldValue::Boolean(false),
            FieldType::Enum(variants) => {
                FieldValue::Enum(variants.first().cloned().unwrap_or_default())
            }
        }
    }

    /// Coerce a value into this type.
    ///
    /// Strings are accepted for enum fields when they name a declared
    /// variant. Returns `None` when the value does not fit.
    pub fn coerce(&self, value: &FieldValue) -> Option<FieldValue> {
        match (self, value) {
            (FieldType::String, FieldValue::String(_))
            | (FieldType::Integer, FieldValue::Integer(_))
            | (FieldType::Boolean, FieldValue::Boolean(_)) => Some(value.clone()),
            (FieldType::Enum(variants), FieldValue::Enum(s) | FieldValue::String(s)) => variants
                .iter()
                .any(|v| v == s)
                .then(|| FieldValue::Enum(s.clone())),
            _ => None,
        }
    }

    /// Read a JSON value as this type.
    ///
    /// Integers may also arrive as decimal strings.
    pub fn from_json(&self, value: &Value) -> Option<FieldValue> {
        let raw = match (self, value) {
            (FieldType::String, Value::String(s)) => FieldValue::String(s.clone()),
            (FieldType::Integer, Value::Number(n)) => FieldValue::Integer(n.as_i64()?),
            (FieldType::Integer, Value::String(s)) => FieldValue::Integer(s.parse().ok()?),
            (FieldType::Boolean, Value::Bool(b)) => FieldValue::Boolean(*b),
            (FieldType::Enum(_), Value::String(s)) => FieldValue::Enum(s.clone()),
            _ => return None,
        };
        self.coerce(&raw)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Enum(variants) => write!(f, "enum({})", variants.join("|")),
            other => f.write_str(other.as_str()),
        }
    }
}

/// A populated field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    String(String),
    Integer(i64),
    Boolean(bool),
    Enum(String),
}

impl FieldValue {
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::String(s) | FieldValue::Enum(s) => Value::String(s.clone()),
            FieldValue::Integer(i) => Value::Number((*i).into()),
            FieldValue::Boolean(b) => Value::Bool(*b),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) | FieldValue::Enum(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

/// One field of a message shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
    /// Substituted when the field is absent on the wire.
    pub default: FieldValue,
}

/// Ordered set of uniquely named fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageShape {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
}

impl MessageShape {
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Identifies a method across the whole schema set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodKey {
    pub service: String,
    pub method: String,
}

impl MethodKey {
    pub fn new(service: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
        }
    }
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service, self.method)
    }
}

/// A callable method: its name and request/response shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub service: String,
    pub name: String,
    pub request: Arc<MessageShape>,
    pub response: Arc<MessageShape>,
}

impl MethodDescriptor {
    pub fn key(&self) -> MethodKey {
        MethodKey::new(&self.service, &self.name)
    }
}

/// A named service and its methods, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub name: String,
    pub methods: Vec<MethodDescriptor>,
}

impl ServiceDescriptor {
    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.name == name)
    }
}
