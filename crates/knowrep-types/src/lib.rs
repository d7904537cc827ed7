//! `knowrep-types` – value types shared by the knowledge store and its tools.
//!
//! Everything the store persists is an [`EntityId`] plus typed
//! [`EntityAttribute`] facts. The closed set of value kinds is modelled by
//! [`AttributeValue`]; the registry binds each attribute name to exactly one
//! [`AttributeValueType`].

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Opaque identifier of an entity in the long-term memory.
///
/// Identifiers are allocated by the store and never reused after deletion.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct EntityId(pub i64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        EntityId(id)
    }
}

/// The value type an attribute name is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AttributeValueType {
    Int,
    Float,
    Bool,
    Str,
    /// Reference to another entity.
    Id,
}

impl AttributeValueType {
    /// All value types, in registry order.
    pub const ALL: [AttributeValueType; 5] = [
        AttributeValueType::Int,
        AttributeValueType::Float,
        AttributeValueType::Bool,
        AttributeValueType::Str,
        AttributeValueType::Id,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeValueType::Int => "int",
            AttributeValueType::Float => "float",
            AttributeValueType::Bool => "bool",
            AttributeValueType::Str => "str",
            AttributeValueType::Id => "id",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "int" => Some(AttributeValueType::Int),
            "float" => Some(AttributeValueType::Float),
            "bool" => Some(AttributeValueType::Bool),
            "str" => Some(AttributeValueType::Str),
            "id" => Some(AttributeValueType::Id),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum AttributeValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Id(EntityId),
}

impl AttributeValue {
    /// The [`AttributeValueType`] this value must be registered under.
    pub fn value_type(&self) -> AttributeValueType {
        match self {
            AttributeValue::Int(_) => AttributeValueType::Int,
            AttributeValue::Float(_) => AttributeValueType::Float,
            AttributeValue::Bool(_) => AttributeValueType::Bool,
            AttributeValue::Str(_) => AttributeValueType::Str,
            AttributeValue::Id(_) => AttributeValueType::Id,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            AttributeValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_entity_id(&self) -> Option<EntityId> {
        match self {
            AttributeValue::Id(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Int(v) => write!(f, "{v}"),
            AttributeValue::Float(v) => write!(f, "{v}"),
            AttributeValue::Bool(v) => write!(f, "{v}"),
            AttributeValue::Str(v) => write!(f, "{v:?}"),
            AttributeValue::Id(v) => write!(f, "#{v}"),
        }
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<i32> for AttributeValue {
    fn from(v: i32) -> Self {
        AttributeValue::Int(i64::from(v))
    }
}

impl From<u32> for AttributeValue {
    fn from(v: u32) -> Self {
        AttributeValue::Int(i64::from(v))
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(v)
    }
}

impl From<f32> for AttributeValue {
    fn from(v: f32) -> Self {
        AttributeValue::Float(f64::from(v))
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::Str(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::Str(v)
    }
}

impl From<EntityId> for AttributeValue {
    fn from(v: EntityId) -> Self {
        AttributeValue::Id(v)
    }
}

/// One `(subject, name, value)` fact as stored in the long-term memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EntityAttribute {
    /// The subject entity.
    pub entity_id: EntityId,
    pub attribute_name: String,
    pub value: AttributeValue,
}

impl EntityAttribute {
    pub fn new(entity_id: EntityId, attribute_name: impl Into<String>, value: AttributeValue) -> Self {
        Self {
            entity_id,
            attribute_name: attribute_name.into(),
            value,
        }
    }

    pub fn get_int_value(&self) -> Option<i64> {
        self.value.as_int()
    }

    pub fn get_float_value(&self) -> Option<f64> {
        self.value.as_float()
    }

    pub fn get_bool_value(&self) -> Option<bool> {
        self.value.as_bool()
    }

    pub fn get_string_value(&self) -> Option<&str> {
        self.value.as_str()
    }

    pub fn get_entity_value(&self) -> Option<EntityId> {
        self.value.as_entity_id()
    }
}

/// Errors surfaced by the typed knowledge-store API.
///
/// Backend failures are flattened into [`KnowledgeError::Storage`] so callers
/// never depend on the storage engine's error type.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KnowledgeError {
    #[error("Invalid entity: {0} does not exist")]
    InvalidEntity(EntityId),

    #[error("Type mismatch on attribute '{attribute}': registered as {expected}, got {found}")]
    TypeMismatch {
        attribute: String,
        expected: AttributeValueType,
        found: AttributeValueType,
    },

    #[error("Attribute '{attribute}' is already registered as {registered}, cannot redeclare as {requested}")]
    DuplicateTypeConflict {
        attribute: String,
        registered: AttributeValueType,
        requested: AttributeValueType,
    },

    #[error("Attribute '{0}' is reserved for internal use")]
    ReservedAttribute(String),

    #[error("Entity {entity} has no '{attribute}' attribute")]
    MissingAttribute { entity: EntityId, attribute: String },

    #[error("Invalid value for attribute '{attribute}': {reason}")]
    InvalidValue { attribute: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(String),
}
