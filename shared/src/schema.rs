//! Flat JSON schema checks for request payloads.

use serde::Deserialize;
use serde_json::Value;

/// JSON type a property must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl PropertyType {
    fn matches(self, value: &Value) -> bool {
        match self {
            PropertyType::String => value.is_string(),
            PropertyType::Number => value.is_number(),
            PropertyType::Boolean => value.is_boolean(),
            PropertyType::Object => value.is_object(),
            PropertyType::Array => value.is_array(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyConfig {
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    #[serde(default)]
    pub enum_values: Option<Vec<Value>>,
    #[serde(default)]
    pub is_optional: bool,
}

impl PropertyConfig {
    pub fn required(property_type: PropertyType) -> Self {
        Self {
            property_type,
            enum_values: None,
            is_optional: false,
        }
    }

    pub fn optional(property_type: PropertyType) -> Self {
        Self {
            is_optional: true,
            ..Self::required(property_type)
        }
    }

    pub fn one_of(mut self, values: Vec<Value>) -> Self {
        self.enum_values = Some(values);
        self
    }

    fn allows(&self, value: &Value) -> bool {
        let Some(allowed) = &self.enum_values else {
            return true;
        };
        match value {
            Value::Array(items) => items.iter().all(|item| allowed.contains(item)),
            _ => allowed.contains(value),
        }
    }
}

/// Property name to its expected shape, checked in order.
pub type SchemaConfig = Vec<(String, PropertyConfig)>;

/// Check `value` against `schema`.
///
/// Keys the schema does not mention are ignored. For arrays with
/// `enum_values`, every element must be one of the allowed values.
pub fn validate_json_schema(value: &Value, schema: &[(String, PropertyConfig)]) -> bool {
    schema.iter().all(|(key, config)| match value.get(key) {
        None => config.is_optional,
        Some(property) => config.property_type.matches(property) && config.allows(property),
    })
}
