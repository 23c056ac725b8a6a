//! SurrealDB session wrapper
//!
//! Thin wrapper around `surrealdb::Surreal<Db>` that binds named
//! parameters, checks responses, and flattens SurrealDB's typed value
//! encoding (`Strand`, `Number`, `Thing`, ...) into plain JSON rows.
//!
//! Uses an `Arc` internally so cloning is cheap and never opens a second
//! connection; RocksDB file databases hold a process-wide lock.

use alcove_core::types::FieldMap;
use alcove_core::{StoreError, StoreResult};
use serde_json::Value;
use std::sync::Arc;
use surrealdb::engine::local::Db;
use surrealdb::Surreal;

/// Connection settings for the document-graph backend
#[derive(Debug, Clone)]
pub struct SurrealConfig {
    /// Namespace (group identifier) to address
    pub namespace: String,
    /// Database name; created on first use if absent
    pub database: String,
    /// Storage path, or `:memory:` for the in-memory engine
    pub path: String,
}

impl SurrealConfig {
    /// In-memory configuration for development and testing
    pub fn memory() -> Self {
        Self {
            namespace: "alcove".to_string(),
            database: "vault".to_string(),
            path: ":memory:".to_string(),
        }
    }

    /// File-backed configuration persisting under `path`
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::memory()
        }
    }
}

/// Session on the document-graph backend
#[derive(Clone)]
pub struct SurrealSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    db: Surreal<Db>,
    config: SurrealConfig,
}

impl std::fmt::Debug for SurrealSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurrealSession")
            .field("config", &self.inner.config)
            .finish()
    }
}

impl SurrealSession {
    /// Open a session, creating the namespace/database if absent
    pub async fn connect(config: SurrealConfig) -> StoreResult<Self> {
        use surrealdb::engine::local::{Mem, RocksDb};

        let db = if config.path.is_empty() || config.path == ":memory:" {
            Surreal::new::<Mem>(())
                .await
                .map_err(|e| StoreError::Backend(format!("failed to open in-memory database: {}", e)))?
        } else {
            Surreal::new::<RocksDb>(config.path.as_str())
                .await
                .map_err(|e| {
                    StoreError::Backend(format!(
                        "failed to open database at {}: {}",
                        config.path, e
                    ))
                })?
        };

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .map_err(|e| {
                StoreError::Backend(format!(
                    "failed to select namespace '{}' / database '{}': {}",
                    config.namespace, config.database, e
                ))
            })?;

        Ok(Self {
            inner: Arc::new(SessionInner { db, config }),
        })
    }

    /// The configuration this session was opened with
    pub fn config(&self) -> &SurrealConfig {
        &self.inner.config
    }

    /// Execute a single-statement query, returning flattened rows
    pub async fn query(
        &self,
        sql: &str,
        bindings: Vec<(String, Value)>,
    ) -> StoreResult<Vec<FieldMap>> {
        let values = self.query_multi(sql, bindings, 1).await?;
        Ok(rows_from(values.into_iter().next().unwrap_or(Value::Null)))
    }

    /// Execute a multi-statement query, returning one flattened value per
    /// statement. `statements` must match the statement count in `sql`.
    pub async fn query_multi(
        &self,
        sql: &str,
        bindings: Vec<(String, Value)>,
        statements: usize,
    ) -> StoreResult<Vec<Value>> {
        let mut query = self.inner.db.query(sql);
        for (key, value) in bindings {
            query = query.bind((key, value));
        }

        let response = query.await.map_err(classify_error)?;
        let mut response = response.check().map_err(classify_error)?;

        let mut results = Vec::with_capacity(statements);
        for index in 0..statements {
            let value: surrealdb::Value = response.take(index).map_err(classify_error)?;
            let json = serde_json::to_value(&value)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            results.push(flatten_statement(json));
        }
        Ok(results)
    }
}

/// Classify a backend error so traversal can tell "this primitive does not
/// exist here" apart from a genuine runtime failure.
pub fn classify_error(err: surrealdb::Error) -> StoreError {
    classify_message(err.to_string())
}

fn classify_message(message: String) -> StoreError {
    let lower = message.to_lowercase();
    if lower.contains("parse") || lower.contains("unsupported") || lower.contains("not implemented")
    {
        StoreError::Unsupported(message)
    } else {
        StoreError::Backend(message)
    }
}

/// Flatten one statement result.
///
/// A statement yielding NONE serializes as the bare string `"None"`; that
/// sentinel only exists at the top level of a statement result, so the
/// translation to `Null` happens here and nowhere deeper — a user string
/// that happens to equal `"None"` inside a row must survive.
fn flatten_statement(value: Value) -> Value {
    match value {
        Value::String(s) if s == "None" || s == "Null" => Value::Null,
        other => flatten_value(other),
    }
}

/// Unwrap SurrealDB's typed JSON encoding into plain JSON.
///
/// `{"Strand": "x"}` → `"x"`, `{"Number": {"Int": 3}}` → `3`,
/// `{"Thing": {"tb": "Person", "id": ...}}` → `"Person:<id>"`, and so on,
/// recursing through arrays and objects. Already-plain values pass through.
pub fn flatten_value(value: Value) -> Value {
    match value {
        Value::Object(mut obj) if obj.len() == 1 => {
            if let Some(inner) = obj.remove("Strand").or_else(|| obj.remove("String")) {
                return inner;
            }
            if let Some(inner) = obj.remove("Number") {
                return match inner {
                    Value::Object(mut num) => num
                        .remove("Int")
                        .or_else(|| num.remove("Float"))
                        .unwrap_or(Value::Object(num)),
                    other => other,
                };
            }
            if let Some(Value::Bool(b)) = obj.remove("Bool") {
                return Value::Bool(b);
            }
            if let Some(inner) = obj.remove("Datetime") {
                return flatten_value(inner);
            }
            if let Some(inner) = obj.remove("Uuid") {
                return flatten_value(inner);
            }
            if let Some(thing) = obj.remove("Thing") {
                return flatten_thing(thing);
            }
            if let Some(Value::Array(items)) = obj.remove("Array") {
                return Value::Array(items.into_iter().map(flatten_value).collect());
            }
            if let Some(inner) = obj.remove("Object") {
                return flatten_value(inner);
            }
            if obj.remove("None").is_some() || obj.remove("Null").is_some() {
                return Value::Null;
            }
            // Not a wrapper after all: restore and recurse field-wise
            flatten_plain_object(obj)
        }
        Value::Object(obj) => flatten_plain_object(obj),
        Value::Array(items) => Value::Array(items.into_iter().map(flatten_value).collect()),
        other => other,
    }
}

fn flatten_plain_object(obj: serde_json::Map<String, Value>) -> Value {
    Value::Object(
        obj.into_iter()
            .map(|(k, v)| (k, flatten_value(v)))
            .collect(),
    )
}

/// Render a record pointer as `"table:id"`
fn flatten_thing(thing: Value) -> Value {
    let Value::Object(mut obj) = thing else {
        return thing;
    };
    let table = obj.remove("tb").and_then(|v| match v {
        Value::String(s) => Some(s),
        _ => None,
    });
    let id = obj.remove("id").map(flatten_value);
    match (table, id) {
        (Some(table), Some(id)) => {
            let key = match id {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                other => other.to_string(),
            };
            Value::String(format!("{}:{}", table, key))
        }
        _ => Value::Object(obj),
    }
}

/// Interpret a flattened statement result as a list of row maps
pub fn rows_from(value: Value) -> Vec<FieldMap> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(map) => Some(map),
                Value::Null => None,
                other => {
                    let mut map = FieldMap::new();
                    map.insert("value".to_string(), other);
                    Some(map)
                }
            })
            .collect(),
        Value::Object(map) => vec![map],
        other => {
            let mut map = FieldMap::new();
            map.insert("value".to_string(), other);
            vec![map]
        }
    }
}
