use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

pub type Fields = Map<String, Value>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Document encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Store unavailable")]
    Unavailable,

    #[error("Invalid document: {0}")]
    Invalid(String),
}

impl StoreError {
    pub fn not_found(collection: &str, id: &str) -> Self {
        StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

impl Document {
    /// Deserializes the document body, exposing the store id as an `id`
    /// field for models that carry one.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, StoreError> {
        let mut data = self.data;
        match data.as_object_mut() {
            Some(map) => {
                map.insert("id".to_string(), Value::String(self.id));
            }
            None => {
                return Err(StoreError::Invalid(format!(
                    "document {} is not an object",
                    self.id
                )))
            }
        }
        Ok(serde_json::from_value(data)?)
    }
}

/// Serializes a model into document fields. The `id` field belongs to the
/// store and is never written into the body.
pub fn encode<T: Serialize>(model: &T) -> Result<Fields, StoreError> {
    match serde_json::to_value(model)? {
        Value::Object(mut map) => {
            map.remove("id");
            Ok(map)
        }
        other => Err(StoreError::Invalid(format!(
            "expected an object, got {other}"
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Gte,
    Lt,
    Lte,
}

impl FilterOp {
    pub fn sql(self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Gte => ">=",
            FilterOp::Lt => "<",
            FilterOp::Lte => "<=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, Direction)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, field: &str, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.to_string(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Eq, value)
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some((field.to_string(), direction));
        self
    }

    pub fn matches(&self, data: &Fields) -> bool {
        self.filters.iter().all(|filter| {
            let Some(actual) = data.get(&filter.field) else {
                return false;
            };
            match compare_values(actual, &filter.value) {
                Some(ordering) => match filter.op {
                    FilterOp::Eq => ordering == Ordering::Equal,
                    FilterOp::Gte => ordering != Ordering::Less,
                    FilterOp::Lt => ordering == Ordering::Less,
                    FilterOp::Lte => ordering != Ordering::Greater,
                },
                None => false,
            }
        })
    }
}

pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert(&self, collection: &str, data: Fields) -> Result<String, StoreError>;

    async fn put(&self, collection: &str, id: &str, data: Fields) -> Result<(), StoreError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Shallow-merges `patch` into an existing document.
    async fn update(&self, collection: &str, id: &str, patch: Fields) -> Result<(), StoreError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError>;
}

/// In-process store. Also used as the test double for the core, with a
/// switch that makes every call fail like an unreachable backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Fields>>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, AtomicOrdering::SeqCst);
    }

    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|docs| docs.len())
            .unwrap_or(0)
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(AtomicOrdering::SeqCst) {
            Err(StoreError::Unavailable)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, collection: &str, data: Fields) -> Result<String, StoreError> {
        self.ensure_available()?;
        let id = Uuid::new_v4().to_string();
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), data);
        Ok(id)
    }

    async fn put(&self, collection: &str, id: &str, data: Fields) -> Result<(), StoreError> {
        self.ensure_available()?;
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), data);
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        self.ensure_available()?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|data| Document {
                id: id.to_string(),
                data: Value::Object(data.clone()),
            }))
    }

    async fn update(&self, collection: &str, id: &str, patch: Fields) -> Result<(), StoreError> {
        self.ensure_available()?;
        let mut collections = self.collections.write().await;
        let data = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StoreError::not_found(collection, id))?;
        data.extend(patch);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.ensure_available()?;
        self.collections
            .write()
            .await
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(collection, id))
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
        self.ensure_available()?;
        let collections = self.collections.read().await;
        let mut matches: Vec<Document> = collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, data)| query.matches(data))
                    .map(|(id, data)| Document {
                        id: id.clone(),
                        data: Value::Object(data.clone()),
                    })
                    .collect()
            })
            .unwrap_or_default();

        if let Some((field, direction)) = &query.order_by {
            matches.sort_by(|a, b| {
                let ordering = match (a.data.get(field), b.data.get(field)) {
                    (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
                    (Some(_), None) => Ordering::Greater,
                    (None, Some(_)) => Ordering::Less,
                    (None, None) => Ordering::Equal,
                };
                match direction {
                    Direction::Asc => ordering,
                    Direction::Desc => ordering.reverse(),
                }
            });
        }

        Ok(matches)
    }
}
