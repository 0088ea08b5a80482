//! DynamoDB document client.
//!
//! Items cross the [`ItemStore`] seam as JSON objects, so a table read can
//! be handed straight to [`ResponseDocumentBuilder`](crate::ResponseDocumentBuilder).

use async_trait::async_trait;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use aws_sdk_dynamodb::Client as DynamoClient;
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use tracing::debug;

use crate::{Error, Result};

/// One item as a JSON object.
pub type Item = Map<String, Value>;

/// Attribute name the sort key is stored under unless configured.
pub const DEFAULT_SORT_KEY: &str = "sortKey";

/// Update of a single item.
#[derive(Debug, Clone, Default)]
pub struct UpdateRequest {
    pub key: Item,
    pub update_expression: String,
    pub condition_expression: Option<String>,
    pub expression_attribute_names: HashMap<String, String>,
    pub expression_attribute_values: Item,
}

/// Key condition query against a table or one of its indexes.
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub index_name: Option<String>,
    pub key_condition_expression: String,
    pub filter_expression: Option<String>,
    pub expression_attribute_names: HashMap<String, String>,
    pub expression_attribute_values: Item,
    pub limit: Option<i32>,
}

/// Raw table operations.
#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn scan(&self, table: &str) -> Result<Vec<Item>>;
    async fn get_item(&self, table: &str, key: Item) -> Result<Option<Item>>;
    async fn put_item(&self, table: &str, item: Item) -> Result<()>;
    async fn update_item(&self, table: &str, request: UpdateRequest) -> Result<Option<Item>>;
    async fn query(&self, table: &str, request: QueryRequest) -> Result<Vec<Item>>;
}

pub type AttributeMap = HashMap<String, AttributeValue>;

#[async_trait]
impl ItemStore for DynamoClient {
    async fn scan(&self, table: &str) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        let mut start_key: Option<AttributeMap> = None;

        loop {
            let output = self
                .scan()
                .table_name(table)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| Error::Aws(format!("Failed to scan {}: {}", table, e)))?;

            for item in output.items.unwrap_or_default() {
                items.push(from_attribute_map(item)?);
            }

            match output.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }

        Ok(items)
    }

    async fn get_item(&self, table: &str, key: Item) -> Result<Option<Item>> {
        let output = self
            .get_item()
            .table_name(table)
            .set_key(Some(to_attribute_map(key)))
            .send()
            .await
            .map_err(|e| Error::Aws(format!("Failed to get item from {}: {}", table, e)))?;

        output.item.map(from_attribute_map).transpose()
    }

    async fn put_item(&self, table: &str, item: Item) -> Result<()> {
        self.put_item()
            .table_name(table)
            .set_item(Some(to_attribute_map(item)))
            .send()
            .await
            .map_err(|e| Error::Aws(format!("Failed to put item into {}: {}", table, e)))?;
        Ok(())
    }

    async fn update_item(&self, table: &str, request: UpdateRequest) -> Result<Option<Item>> {
        let output = self
            .update_item()
            .table_name(table)
            .set_key(Some(to_attribute_map(request.key)))
            .update_expression(request.update_expression)
            .set_condition_expression(request.condition_expression)
            .set_expression_attribute_names(non_empty_names(request.expression_attribute_names))
            .set_expression_attribute_values(non_empty_values(request.expression_attribute_values))
            .return_values(ReturnValue::AllNew)
            .send()
            .await
            .map_err(|e| Error::Aws(format!("Failed to update item in {}: {}", table, e)))?;

        output.attributes.map(from_attribute_map).transpose()
    }

    async fn query(&self, table: &str, request: QueryRequest) -> Result<Vec<Item>> {
        let names = non_empty_names(request.expression_attribute_names);
        let values = non_empty_values(request.expression_attribute_values);
        let mut items = Vec::new();
        let mut start_key: Option<AttributeMap> = None;

        loop {
            let output = self
                .query()
                .table_name(table)
                .set_index_name(request.index_name.clone())
                .key_condition_expression(request.key_condition_expression.clone())
                .set_filter_expression(request.filter_expression.clone())
                .set_expression_attribute_names(names.clone())
                .set_expression_attribute_values(values.clone())
                .set_limit(request.limit)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| Error::Aws(format!("Failed to query {}: {}", table, e)))?;

            for item in output.items.unwrap_or_default() {
                items.push(from_attribute_map(item)?);
            }

            if let Some(limit) = request.limit {
                if items.len() >= limit as usize {
                    items.truncate(limit as usize);
                    break;
                }
            }

            match output.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }

        Ok(items)
    }
}

fn non_empty_names(names: HashMap<String, String>) -> Option<HashMap<String, String>> {
    (!names.is_empty()).then_some(names)
}

fn non_empty_values(values: Item) -> Option<AttributeMap> {
    (!values.is_empty()).then(|| to_attribute_map(values))
}

/// Convert a JSON value into a DynamoDB attribute.
pub fn to_attribute_value(value: Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(flag) => AttributeValue::Bool(flag),
        Value::Number(number) => AttributeValue::N(number.to_string()),
        Value::String(text) => AttributeValue::S(text),
        Value::Array(items) => AttributeValue::L(items.into_iter().map(to_attribute_value).collect()),
        Value::Object(fields) => AttributeValue::M(to_attribute_map(fields)),
    }
}

pub fn to_attribute_map(item: Item) -> AttributeMap {
    item.into_iter()
        .map(|(name, value)| (name, to_attribute_value(value)))
        .collect()
}

/// Convert a DynamoDB attribute into a JSON value.
///
/// String and number sets become arrays. Binary attributes have no JSON
/// form and are rejected.
pub fn from_attribute_value(value: AttributeValue) -> Result<Value> {
    Ok(match value {
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::Bool(flag) => Value::Bool(flag),
        AttributeValue::N(number) => Value::Number(parse_number(&number)?),
        AttributeValue::S(text) => Value::String(text),
        AttributeValue::L(items) => Value::Array(
            items
                .into_iter()
                .map(from_attribute_value)
                .collect::<Result<_>>()?,
        ),
        AttributeValue::M(fields) => Value::Object(from_attribute_map(fields)?),
        AttributeValue::Ss(set) => Value::Array(set.into_iter().map(Value::String).collect()),
        AttributeValue::Ns(set) => Value::Array(
            set.iter()
                .map(|number| parse_number(number).map(Value::Number))
                .collect::<Result<_>>()?,
        ),
        AttributeValue::B(_) | AttributeValue::Bs(_) => {
            return Err(Error::Validation("Binary attributes are not supported".to_string()))
        }
        other => {
            return Err(Error::Validation(format!("Unsupported attribute: {:?}", other)))
        }
    })
}

/// Item attributes come back in name order since DynamoDB keeps none.
pub fn from_attribute_map(item: AttributeMap) -> Result<Item> {
    let mut fields: Vec<_> = item.into_iter().collect();
    fields.sort_by(|(a, _), (b, _)| a.cmp(b));

    fields
        .into_iter()
        .map(|(name, value)| Ok::<_, Error>((name, from_attribute_value(value)?)))
        .collect()
}

fn parse_number(number: &str) -> Result<Number> {
    serde_json::from_str(number)
        .map_err(|_| Error::Validation(format!("Invalid number attribute: {}", number)))
}

/// Document client bound to one table.
pub struct DynamoDbClient<S = DynamoClient> {
    store: S,
    table: String,
    partition_key: Option<String>,
    sort_key: String,
}

impl<S: ItemStore> DynamoDbClient<S> {
    pub fn new(store: S, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
            partition_key: None,
            sort_key: DEFAULT_SORT_KEY.to_string(),
        }
    }

    pub fn with_partition_key(mut self, partition_key: impl Into<String>) -> Self {
        self.partition_key = Some(partition_key.into());
        self
    }

    pub fn with_sort_key(mut self, sort_key: impl Into<String>) -> Self {
        self.sort_key = sort_key.into();
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Every item in the table.
    pub async fn read_all(&self) -> Result<Vec<Value>> {
        debug!(table = %self.table, "Scanning table");
        let items = self.store.scan(&self.table).await?;
        Ok(items.into_iter().map(Value::Object).collect())
    }

    /// One item by partition and sort key.
    pub async fn read(&self, partition_id: &str, sort_key: &str) -> Result<Option<Value>> {
        let partition_key = self.partition_key.as_deref().ok_or_else(|| {
            Error::Config(format!(
                "Partition key not set for table {}, configure one with with_partition_key",
                self.table
            ))
        })?;

        let mut key = Item::new();
        key.insert(partition_key.to_string(), Value::from(partition_id));
        key.insert(self.sort_key.clone(), Value::from(sort_key));

        let item = self.store.get_item(&self.table, key).await?;
        Ok(item.map(Value::Object))
    }

    pub async fn write(&self, item: Value) -> Result<()> {
        let Value::Object(item) = item else {
            return Err(Error::Validation("Items must be JSON objects".to_string()));
        };
        self.store.put_item(&self.table, item).await
    }

    /// Apply `request` and return the item as it is afterwards.
    pub async fn update(&self, request: UpdateRequest) -> Result<Option<Value>> {
        let item = self.store.update_item(&self.table, request).await?;
        Ok(item.map(Value::Object))
    }

    pub async fn query(&self, request: QueryRequest) -> Result<Vec<Value>> {
        let items = self.store.query(&self.table, request).await?;
        Ok(items.into_iter().map(Value::Object).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jsonapi::ResponseDocumentBuilder;
    use serde_json::json;
    use std::sync::Mutex;

    /// Table kept in memory, keyed by the serialized key attributes.
    #[derive(Default)]
    struct MemoryTable {
        items: Mutex<Vec<Item>>,
        key_names: Vec<&'static str>,
    }

    impl MemoryTable {
        fn keyed_by(key_names: &[&'static str]) -> Self {
            Self {
                items: Mutex::new(Vec::new()),
                key_names: key_names.to_vec(),
            }
        }

        fn matches(&self, item: &Item, key: &Item) -> bool {
            self.key_names.iter().all(|name| item.get(*name) == key.get(*name))
        }
    }

    #[async_trait]
    impl ItemStore for MemoryTable {
        async fn scan(&self, table: &str) -> Result<Vec<Item>> {
            assert_eq!(table, "students");
            Ok(self.items.lock().unwrap().clone())
        }

        async fn get_item(&self, _table: &str, key: Item) -> Result<Option<Item>> {
            let items = self.items.lock().unwrap();
            Ok(items.iter().find(|item| self.matches(item, &key)).cloned())
        }

        async fn put_item(&self, _table: &str, item: Item) -> Result<()> {
            let mut items = self.items.lock().unwrap();
            items.retain(|existing| !self.matches(existing, &item));
            items.push(item);
            Ok(())
        }

        async fn update_item(&self, _table: &str, request: UpdateRequest) -> Result<Option<Item>> {
            let mut items = self.items.lock().unwrap();
            let Some(item) = items.iter_mut().find(|item| self.matches(item, &request.key)) else {
                return Err(Error::NotFound("item".to_string()));
            };
            for (placeholder, value) in request.expression_attribute_values {
                item.insert(placeholder.trim_start_matches(':').to_string(), value);
            }
            Ok(Some(item.clone()))
        }

        async fn query(&self, _table: &str, request: QueryRequest) -> Result<Vec<Item>> {
            let items = self.items.lock().unwrap();
            let matching = items
                .iter()
                .filter(|item| {
                    request
                        .expression_attribute_values
                        .iter()
                        .all(|(placeholder, value)| item.get(placeholder.trim_start_matches(':')) == Some(value))
                })
                .take(request.limit.map_or(usize::MAX, |limit| limit as usize))
                .cloned()
                .collect();
            Ok(matching)
        }
    }

    fn object(value: Value) -> Item {
        match value {
            Value::Object(fields) => fields,
            other => panic!("expected object, got {other}"),
        }
    }

    fn students() -> DynamoDbClient<MemoryTable> {
        DynamoDbClient::new(MemoryTable::keyed_by(&["studentId", "sortKey"]), "students")
            .with_partition_key("studentId")
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let table = students();
        table
            .write(json!({"studentId": "s1", "sortKey": "profile", "name": "Ana"}))
            .await
            .unwrap();

        let item = table.read("s1", "profile").await.unwrap().unwrap();
        assert_eq!(item["name"], "Ana");
        assert!(table.read("s1", "lessons").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_requires_partition_key() {
        let table = DynamoDbClient::new(MemoryTable::default(), "students");
        let err = table.read("s1", "profile").await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("students"));
    }

    #[tokio::test]
    async fn test_write_rejects_non_objects() {
        let err = students().write(json!(["s1"])).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_update_returns_new_item() {
        let table = students();
        table
            .write(json!({"studentId": "s1", "sortKey": "profile", "name": "Ana"}))
            .await
            .unwrap();

        let updated = table
            .update(UpdateRequest {
                key: object(json!({"studentId": "s1", "sortKey": "profile"})),
                update_expression: "SET instrument = :instrument".to_string(),
                expression_attribute_values: object(json!({":instrument": "cello"})),
                ..Default::default()
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated["instrument"], "cello");
        assert_eq!(updated["name"], "Ana");
    }

    #[tokio::test]
    async fn test_query_with_limit() {
        let table = students();
        for (id, brand) in [("s1", "gc"), ("s2", "ma"), ("s3", "gc")] {
            table
                .write(json!({"studentId": id, "sortKey": "profile", "brand": brand}))
                .await
                .unwrap();
        }

        let request = QueryRequest {
            key_condition_expression: "brand = :brand".to_string(),
            expression_attribute_values: object(json!({":brand": "gc"})),
            ..Default::default()
        };
        let found = table.query(request.clone()).await.unwrap();
        assert_eq!(found.len(), 2);

        let limited = table
            .query(QueryRequest {
                limit: Some(1),
                ..request
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0]["studentId"], "s1");
    }

    #[tokio::test]
    async fn test_scanned_items_feed_the_document_builder() {
        let table = students();
        table
            .write(json!({
                "studentId": "s1",
                "sortKey": "profile",
                "id": "s1",
                "name": "Ana",
                "relationships": [
                    {"type": "instrument", "id": "i1", "name": "Cello"},
                    {"type": "instrument", "id": "i2", "name": "Viola"}
                ]
            }))
            .await
            .unwrap();

        let items = table.read_all().await.unwrap();
        let document = ResponseDocumentBuilder::new("students", Value::Array(items), None)
            .unwrap()
            .into_document();
        let value = serde_json::to_value(&document).unwrap();

        assert_eq!(value["meta"]["count"], 1);
        assert_eq!(value["data"][0]["attributes"]["name"], "Ana");
        assert_eq!(value["data"][0]["relationships"]["instrument"]["meta"]["count"], 2);
    }

    #[test]
    fn test_attribute_conversion() {
        let item = object(json!({
            "name": "Ana",
            "age": 12,
            "rate": 42.5,
            "active": true,
            "notes": null,
            "tags": ["a", 1],
            "address": {"city": "Austin"}
        }));

        let attributes = to_attribute_map(item.clone());
        assert_eq!(attributes["age"], AttributeValue::N("12".to_string()));
        assert_eq!(attributes["notes"], AttributeValue::Null(true));

        let back = from_attribute_map(attributes).unwrap();
        assert_eq!(Value::Object(back), Value::Object(item));
    }

    #[test]
    fn test_sets_become_arrays() {
        let value = from_attribute_value(AttributeValue::Ss(vec!["a".to_string(), "b".to_string()])).unwrap();
        assert_eq!(value, json!(["a", "b"]));

        let value = from_attribute_value(AttributeValue::Ns(vec!["1".to_string(), "2.5".to_string()])).unwrap();
        assert_eq!(value, json!([1, 2.5]));
    }

    #[test]
    fn test_unconvertible_attributes() {
        let err = from_attribute_value(AttributeValue::B(aws_sdk_dynamodb::primitives::Blob::new(vec![1u8])))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = from_attribute_value(AttributeValue::N("not-a-number".to_string())).unwrap_err();
        assert!(err.to_string().contains("not-a-number"));
    }

    #[test]
    fn test_items_come_back_in_name_order() {
        let attributes: AttributeMap = [
            ("zeta".to_string(), AttributeValue::S("z".to_string())),
            ("alpha".to_string(), AttributeValue::S("a".to_string())),
        ]
        .into_iter()
        .collect();
        let item = from_attribute_map(attributes).unwrap();
        assert_eq!(item.keys().collect::<Vec<_>>(), vec!["alpha", "zeta"]);
    }
}
