//! Attribute schemas attached to server types and launch modes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Attribute values of a managed server, keyed by attribute name.
pub type ServerAttributeMap = BTreeMap<String, Value>;

/// Value type expected for an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    /// Free text.
    String,
    /// Whole number.
    Integer,
    /// `true` or `false`.
    Boolean,
    /// Ordered list of values.
    List,
    /// Nested key to value mapping.
    Map,
}

impl AttributeKind {
    /// Returns the canonical wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::List => "list",
            Self::Map => "map",
        }
    }

    /// Returns whether `value` has this kind.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (Self::String, Value::String(_))
            | (Self::Boolean, Value::Bool(_))
            | (Self::List, Value::Array(_))
            | (Self::Map, Value::Object(_)) => true,
            (Self::Integer, Value::Number(number)) => number.is_i64() || number.is_u64(),
            _ => false,
        }
    }
}

/// Description of a single attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeDescriptor {
    #[serde(rename = "type")]
    kind: AttributeKind,
    description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_val: Option<Value>,
    #[serde(default)]
    secret: bool,
}

impl AttributeDescriptor {
    /// Creates an attribute descriptor without a default value.
    #[must_use]
    pub fn new(kind: AttributeKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            default_val: None,
            secret: false,
        }
    }

    /// Sets the value used when the caller supplies none.
    #[must_use]
    pub fn with_default(mut self, value: Value) -> Self {
        self.default_val = Some(value);
        self
    }

    /// Marks the attribute as secret, such as a password.
    #[must_use]
    pub const fn secret(mut self) -> Self {
        self.secret = true;
        self
    }

    /// Returns the expected value kind.
    #[must_use]
    pub const fn kind(&self) -> AttributeKind {
        self.kind
    }

    /// Returns the description shown to callers.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the default value, if any.
    #[must_use]
    pub const fn default_value(&self) -> Option<&Value> {
        self.default_val.as_ref()
    }

    /// Returns whether values must be masked when prompted or logged.
    #[must_use]
    pub const fn is_secret(&self) -> bool {
        self.secret
    }
}

/// Named set of attribute descriptors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSchema {
    attributes: BTreeMap<String, AttributeDescriptor>,
}

impl AttributeSchema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an attribute.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, descriptor: AttributeDescriptor) -> Self {
        self.attributes.insert(key.into(), descriptor);
        self
    }

    /// Returns the descriptor for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&AttributeDescriptor> {
        self.attributes.get(key)
    }

    /// Iterates over attribute names and descriptors in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeDescriptor)> {
        self.attributes
            .iter()
            .map(|(key, descriptor)| (key.as_str(), descriptor))
    }

    /// Returns the number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Returns whether the schema declares no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Returns the attributes that have neither a value in `values` nor a
    /// default.
    #[must_use]
    pub fn missing_from(&self, values: &ServerAttributeMap) -> Vec<String> {
        self.attributes
            .iter()
            .filter(|(key, descriptor)| {
                !values.contains_key(key.as_str()) && descriptor.default_value().is_none()
            })
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Inserts defaults for attributes absent from `values`.
    pub fn apply_defaults(&self, values: &mut ServerAttributeMap) {
        for (key, descriptor) in &self.attributes {
            if let Some(default) = descriptor.default_value() {
                values
                    .entry(key.clone())
                    .or_insert_with(|| default.clone());
            }
        }
    }
}
