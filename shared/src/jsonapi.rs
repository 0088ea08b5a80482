//! JSON:API response documents.
//!
//! [`ResponseDocumentBuilder`] turns raw records, typically the result of a
//! data-store read, into documents shaped per
//! <https://jsonapi.org/format/#fetching-resources-responses>.
//!
//! Relationships are expanded inline: a record may carry a reserved
//! `relationships` key holding one typed object or a list of them. Entries
//! sharing a `type` are grouped under that type; the first occurrence is
//! stored as a single resource and the second one promotes it to a list
//! with a `meta.count`.
//!
//! ```ignore
//! let document = ResponseDocumentBuilder::new("user", json!({"id": "1", "name": "Jo"}), None)?
//!     .into_document();
//! ```

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

/// Deepest relationship nesting accepted before a transformation is aborted.
pub const MAX_RELATIONSHIP_DEPTH: usize = 32;

/// Reserved key carrying inline relationships on a raw record.
const RELATIONSHIPS_KEY: &str = "relationships";

/// Result type alias for document building.
pub type Result<T> = std::result::Result<T, JsonApiError>;

/// Free-form `meta` member.
pub type Meta = Map<String, Value>;

/// Errors raised while building a document.
///
/// All of them abort the whole transformation, including failures found
/// deep inside nested relationships.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JsonApiError {
    #[error("Invalid type provided: type must be a non-empty string")]
    InvalidType,

    #[error("Invalid obj: object must have an id property in order to be transformed into a JSONAPIResponse")]
    MissingId,

    #[error("Each relationship object must have a 'type' attribute")]
    MissingRelationshipType,

    #[error("Each relationship object in the array of 'relationships' must have a 'type' attribute")]
    MissingRelationshipTypeInArray,

    #[error("Relationships are nested deeper than {limit} levels")]
    RelationshipDepthExceeded { limit: usize },
}

/// A single resource object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub id: String,
    pub attributes: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationships: Option<Relationships>,
}

/// Primary data of a document: one resource or an ordered list of them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PrimaryData {
    Single(Resource),
    Collection(Vec<Resource>),
}

impl PrimaryData {
    pub fn as_single(&self) -> Option<&Resource> {
        match self {
            PrimaryData::Single(resource) => Some(resource),
            PrimaryData::Collection(_) => None,
        }
    }

    pub fn as_collection(&self) -> Option<&[Resource]> {
        match self {
            PrimaryData::Single(_) => None,
            PrimaryData::Collection(resources) => Some(resources),
        }
    }

    /// Append a resource, promoting single data to a list first.
    ///
    /// Returns the length of the list afterwards.
    fn push(&mut self, resource: Resource) -> usize {
        let current = std::mem::replace(self, PrimaryData::Collection(Vec::new()));
        let mut resources = match current {
            PrimaryData::Single(existing) => vec![existing],
            PrimaryData::Collection(existing) => existing,
        };
        resources.push(resource);
        let count = resources.len();
        *self = PrimaryData::Collection(resources);
        count
    }
}

/// A top-level (or relationship) document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub data: PrimaryData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

/// Relationships of a resource keyed by relationship type.
///
/// Keys keep the order in which each type was first seen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Relationships {
    entries: Vec<(String, Document)>,
}

impl Relationships {
    pub fn get(&self, relationship_type: &str) -> Option<&Document> {
        self.entries
            .iter()
            .find(|(key, _)| key == relationship_type)
            .map(|(_, document)| document)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Document)> {
        self.entries.iter().map(|(key, document)| (key.as_str(), document))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn get_mut(&mut self, relationship_type: &str) -> Option<&mut Document> {
        self.entries
            .iter_mut()
            .find(|(key, _)| key == relationship_type)
            .map(|(_, document)| document)
    }

    fn insert_single(&mut self, relationship_type: String, resource: Resource) {
        self.entries.push((
            relationship_type,
            Document {
                data: PrimaryData::Single(resource),
                meta: None,
            },
        ));
    }
}

impl Serialize for Relationships {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, document) in &self.entries {
            map.serialize_entry(key, document)?;
        }
        map.end()
    }
}

/// Builds a JSON:API document from raw records.
///
/// The input is transformed eagerly in [`ResponseDocumentBuilder::new`];
/// [`ResponseDocumentBuilder::format`] only projects the result.
#[derive(Debug, Clone)]
pub struct ResponseDocumentBuilder {
    resource_type: String,
    data: PrimaryData,
    meta: Option<Meta>,
}

impl ResponseDocumentBuilder {
    /// Transform `input` (one record or an array of records) into resources
    /// of `resource_type`.
    ///
    /// Arrays get `meta.count` set to their length, merged over `meta`.
    /// A single record keeps `meta` as given.
    pub fn new(
        resource_type: impl Into<String>,
        input: Value,
        meta: Option<Meta>,
    ) -> Result<Self> {
        let resource_type = resource_type.into();
        if resource_type.is_empty() {
            return Err(JsonApiError::InvalidType);
        }

        let (data, meta) = match input {
            Value::Array(records) => {
                let resources = records
                    .into_iter()
                    .map(|record| transform_object(&resource_type, record, 0))
                    .collect::<Result<Vec<_>>>()?;
                let mut meta = meta.unwrap_or_default();
                meta.insert("count".to_string(), Value::from(resources.len()));
                (PrimaryData::Collection(resources), Some(meta))
            }
            record => (
                PrimaryData::Single(transform_object(&resource_type, record, 0)?),
                meta,
            ),
        };

        Ok(Self {
            resource_type,
            data,
            meta,
        })
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// The document as `{ data, meta }`.
    pub fn format(&self) -> Document {
        Document {
            data: self.data.clone(),
            meta: self.meta.clone(),
        }
    }

    pub fn into_document(self) -> Document {
        Document {
            data: self.data,
            meta: self.meta,
        }
    }
}

impl From<ResponseDocumentBuilder> for Document {
    fn from(builder: ResponseDocumentBuilder) -> Self {
        builder.into_document()
    }
}

fn count_meta(count: usize) -> Meta {
    let mut meta = Meta::new();
    meta.insert("count".to_string(), Value::from(count));
    meta
}

/// Accepts string ids as is and renders numeric ids as strings.
fn resource_id(value: Value) -> Option<String> {
    match value {
        Value::String(id) if !id.is_empty() => Some(id),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

/// `null`, `false`, zero and `""` never carry relationships and stay
/// ordinary attributes.
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_f64() == Some(0.0),
        Value::String(text) => text.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

/// Turn one raw record into a resource. `depth` is the relationship
/// nesting level of the record, zero for primary data.
fn transform_object(resource_type: &str, record: Value, depth: usize) -> Result<Resource> {
    let Value::Object(fields) = record else {
        return Err(JsonApiError::MissingId);
    };

    let mut id = None;
    let mut relationships = None;
    let mut attributes = Map::new();
    for (key, value) in fields {
        if key == "id" {
            id = Some(value);
        } else if key == RELATIONSHIPS_KEY && !is_blank(&value) {
            relationships = Some(value);
        } else {
            attributes.insert(key, value);
        }
    }

    let id = id.and_then(resource_id).ok_or(JsonApiError::MissingId)?;
    let relationships = relationships
        .map(|value| build_relationships(value, depth + 1))
        .transpose()?;

    Ok(Resource {
        resource_type: resource_type.to_string(),
        id,
        attributes,
        relationships,
    })
}

fn build_relationships(value: Value, depth: usize) -> Result<Relationships> {
    if depth > MAX_RELATIONSHIP_DEPTH {
        return Err(JsonApiError::RelationshipDepthExceeded {
            limit: MAX_RELATIONSHIP_DEPTH,
        });
    }

    let mut relationships = Relationships::default();
    match value {
        Value::Array(items) => {
            for item in items {
                let (relationship_type, resource) =
                    relationship_resource(item, JsonApiError::MissingRelationshipTypeInArray, depth)?;
                match relationships.get_mut(&relationship_type) {
                    Some(existing) => {
                        let count = existing.data.push(resource);
                        existing.meta = Some(count_meta(count));
                    }
                    None => relationships.insert_single(relationship_type, resource),
                }
            }
        }
        item => {
            let (relationship_type, resource) =
                relationship_resource(item, JsonApiError::MissingRelationshipType, depth)?;
            relationships.insert_single(relationship_type, resource);
        }
    }
    Ok(relationships)
}

/// Split `type` off a raw relationship and transform the remaining fields
/// into a resource of that type.
fn relationship_resource(
    item: Value,
    missing_type: JsonApiError,
    depth: usize,
) -> Result<(String, Resource)> {
    let Value::Object(fields) = item else {
        return Err(missing_type);
    };

    let mut relationship_type = None;
    let mut remaining = Map::new();
    for (key, value) in fields {
        if key == "type" {
            relationship_type = Some(value);
        } else {
            remaining.insert(key, value);
        }
    }

    let relationship_type = match relationship_type {
        None => return Err(missing_type),
        Some(Value::String(name)) if !name.is_empty() => name,
        Some(_) => return Err(JsonApiError::InvalidType),
    };

    let resource = transform_object(&relationship_type, Value::Object(remaining), depth)?;
    Ok((relationship_type, resource))
}
