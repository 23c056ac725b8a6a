//! Embedded single-writer store adapter
//!
//! Implements [`GraphStore`] over per-type node tables rendered from the
//! compiled schemas, plus the embedded extension contract: episode
//! ingestion, fact search, the raw query escape hatch, and the idempotent
//! DDL primitives.
//!
//! Lifecycle: the store is constructed disconnected; `connect` opens (or
//! creates) the database and registers the schema. Repeat connects are
//! no-ops. Every other call before a successful connect fails fast with
//! [`StoreError::NotConnected`].

use crate::connection::EmbeddedConnection;
use crate::error::{EmbeddedError, EmbeddedResult};
use crate::ingest::{persist_extraction, search_facts};
use crate::schema::{
    entity_type_columns, facts_ddl, kg_nodes_ddl, node_table_ddl, rel_table_ddl, Column, LINKS_DDL,
};
use alcove_core::extraction::ExtractionProvider;
use alcove_core::schema::compiler::is_identifier;
use alcove_core::store::{clamp_limit, GraphStore};
use alcove_core::traversal::{bounded_bfs, validate_depth, NeighborSource};
use alcove_core::types::{
    Entity, EntityType, Episode, EpisodeOutcome, Fact, FieldMap, FieldSpec, FieldType,
    PagedEntities,
};
use alcove_core::{RetryPolicy, StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::RwLock;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Default page size for fact search
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

#[derive(Clone)]
struct ConnectedState {
    conn: EmbeddedConnection,
    schemas: Arc<Vec<EntityType>>,
}

/// Embedded single-writer graph store with language-model ingestion
pub struct EmbeddedVaultStore {
    path: PathBuf,
    provider: Arc<dyn ExtractionProvider>,
    state: RwLock<Option<ConnectedState>>,
}

impl EmbeddedVaultStore {
    /// Create a disconnected store for the database at `path`
    pub fn new(path: impl Into<PathBuf>, provider: Arc<dyn ExtractionProvider>) -> Self {
        Self {
            path: path.into(),
            provider,
            state: RwLock::new(None),
        }
    }

    /// Create a disconnected in-memory store for testing
    pub fn memory(provider: Arc<dyn ExtractionProvider>) -> Self {
        Self::new(":memory:", provider)
    }

    /// Whether `connect` has succeeded.
    ///
    /// Best-effort only: another task may connect between this check and
    /// the next call.
    pub fn is_connected(&self) -> bool {
        self.state.read().is_some()
    }

    fn connected(&self) -> StoreResult<ConnectedState> {
        self.state.read().clone().ok_or(StoreError::NotConnected)
    }

    fn schema_for(state: &ConnectedState, entity_type: &str) -> StoreResult<EntityType> {
        state
            .schemas
            .iter()
            .find(|s| s.name == entity_type)
            .cloned()
            .ok_or_else(|| {
                StoreError::Validation(format!("unknown entity type '{}'", entity_type))
            })
    }

    /// Register a node table on the shared connection (idempotent DDL).
    ///
    /// The embedded backend has exactly one writer and one schema
    /// namespace, so any module may use this to add its own node types.
    pub async fn ensure_node_table(
        &self,
        name: &str,
        columns: &[Column],
        primary_key: &str,
    ) -> StoreResult<()> {
        let state = self.connected()?;
        let ddl = node_table_ddl(name, columns, primary_key).map_err(StoreError::from)?;
        state
            .conn
            .write(move |c| {
                c.execute_batch(&ddl)?;
                Ok(())
            })
            .await
            .map_err(StoreError::from)
    }

    /// Register a relationship table on the shared connection
    pub async fn ensure_rel_table(
        &self,
        name: &str,
        from_table: &str,
        to_table: &str,
        columns: &[Column],
    ) -> StoreResult<()> {
        let state = self.connected()?;
        let ddl = rel_table_ddl(name, from_table, to_table, columns).map_err(StoreError::from)?;
        state
            .conn
            .write(move |c| {
                c.execute_batch(&ddl)?;
                Ok(())
            })
            .await
            .map_err(StoreError::from)
    }

    /// Execute a backend-native parameterized query.
    ///
    /// Returns the rows as an ordered sequence of column-name → value maps.
    /// A single-column result whose value is a structured node has
    /// backend-internal bookkeeping fields (underscore-prefixed) stripped.
    ///
    /// Read statements share the connection; anything else is a mutation
    /// and serializes on the write gate like every other write, so a raw
    /// INSERT can never interleave into an in-flight ingestion.
    pub async fn execute(
        &self,
        query: &str,
        params: Vec<Value>,
    ) -> StoreResult<Vec<serde_json::Map<String, Value>>> {
        let state = self.connected()?;
        let query = query.to_string();
        if is_read_only_sql(&query) {
            state
                .conn
                .run(move |c| run_raw_query(c, &query, &params))
                .await
                .map_err(StoreError::from)
        } else {
            state
                .conn
                .write(move |c| run_raw_query(c, &query, &params))
                .await
                .map_err(StoreError::from)
        }
    }

    /// Ingest a free-text episode.
    ///
    /// The extraction call runs under the write serialization gate through
    /// the fixed retry schedule (attempts at +0s, +5s, +15s, +45s). If all
    /// four attempts fail, the last error propagates as
    /// [`StoreError::Ingestion`]. Only the extracted entities and edges are
    /// persisted; the episode text itself is not.
    pub async fn add_episode(
        &self,
        name: &str,
        body: &str,
        source_description: &str,
        reference_time: Option<DateTime<Utc>>,
        entity_types: Option<Vec<EntityType>>,
    ) -> StoreResult<EpisodeOutcome> {
        let state = self.connected()?;
        let episode = Arc::new(Episode {
            name: name.to_string(),
            body: body.to_string(),
            source_description: source_description.to_string(),
            reference_time: reference_time.unwrap_or_else(Utc::now),
        });
        let guidance: Arc<Vec<EntityType>> = match entity_types {
            Some(types) => Arc::new(types),
            None => state.schemas.clone(),
        };

        // The gate covers extraction and persistence: two concurrent
        // ingestions never have overlapping backend spans.
        let _gate = state.conn.acquire_write().await;

        let provider = self.provider.clone();
        let extraction = RetryPolicy::ingestion()
            .run(move |_attempt| {
                let provider = provider.clone();
                let episode = episode.clone();
                let guidance = guidance.clone();
                async move { provider.extract(&episode, &guidance).await }
            })
            .await
            .map_err(StoreError::from)?;

        let episode_uuid = uuid::Uuid::new_v4().to_string();
        let uuid_for_insert = episode_uuid.clone();
        let now = Utc::now();
        let (nodes_created, edges_created) = state
            .conn
            .run(move |c| persist_extraction(c, &extraction, &uuid_for_insert, now))
            .await
            .map_err(StoreError::from)?;

        info!(episode = name, episode_uuid, nodes_created, edges_created, "Episode ingested");
        Ok(EpisodeOutcome {
            episode_uuid,
            nodes_created,
            edges_created,
        })
    }

    /// Hybrid search over previously ingested facts (read path, no gate).
    ///
    /// `limit` defaults to [`DEFAULT_SEARCH_LIMIT`].
    pub async fn search(&self, query: &str, limit: Option<usize>) -> StoreResult<Vec<Fact>> {
        let state = self.connected()?;
        let query = query.to_string();
        let limit = clamp_limit(limit.unwrap_or(DEFAULT_SEARCH_LIMIT));
        state
            .conn
            .run(move |c| search_facts(c, &query, limit))
            .await
            .map_err(StoreError::from)
    }

    async fn fetch_entity(
        &self,
        state: &ConnectedState,
        id: &str,
    ) -> StoreResult<Option<Entity>> {
        let Some((type_name, _key)) = id.split_once(':') else {
            return Ok(None);
        };
        let Some(schema) = state.schemas.iter().find(|s| s.name == type_name).cloned() else {
            return Ok(None);
        };
        let id = id.to_string();
        state
            .conn
            .run(move |c| read_entity(c, &schema, &id))
            .await
            .map_err(StoreError::from)
    }
}

#[async_trait]
impl NeighborSource for EmbeddedVaultStore {
    async fn fetch(&self, id: &str) -> StoreResult<Option<Entity>> {
        self.get_entity(id).await
    }
}

#[async_trait]
impl GraphStore for EmbeddedVaultStore {
    async fn connect(&self, schemas: &[EntityType]) -> StoreResult<()> {
        if self.is_connected() {
            debug!("Embedded store already connected, connect is a no-op");
            return Ok(());
        }

        let conn = EmbeddedConnection::open(&self.path).map_err(StoreError::from)?;

        // Base tables first, then one node table per compiled type
        let mut ddl = vec![
            kg_nodes_ddl().map_err(StoreError::from)?,
            facts_ddl().map_err(StoreError::from)?,
            LINKS_DDL.to_string(),
        ];
        for schema in schemas {
            ddl.push(
                node_table_ddl(&schema.name, &entity_type_columns(schema), "id")
                    .map_err(StoreError::from)?,
            );
        }

        conn.write(move |c| {
            for statement in &ddl {
                c.execute_batch(statement)?;
            }
            Ok(())
        })
        .await
        .map_err(StoreError::from)?;

        info!(path = ?self.path, types = schemas.len(), "Embedded store connected");
        *self.state.write() = Some(ConnectedState {
            conn,
            schemas: Arc::new(schemas.to_vec()),
        });
        Ok(())
    }

    async fn create_entity(
        &self,
        entity_type: &str,
        data: FieldMap,
        commit_msg: Option<&str>,
    ) -> StoreResult<String> {
        let state = self.connected()?;
        let schema = Self::schema_for(&state, entity_type)?;
        validate_payload(&schema, &data, true)?;

        let key = schema.key_strategy.derive(&data)?;
        let id = format!("{}:{}", schema.name, key);
        let msg = commit_msg
            .map(str::to_string)
            .unwrap_or_else(|| format!("create {}", schema.name));

        let now = rfc3339(Utc::now());
        let mut columns = vec!["id".to_string(), "created_at".to_string(), "updated_at".to_string()];
        let mut values = vec![
            SqlValue::Text(id.clone()),
            SqlValue::Text(now.clone()),
            SqlValue::Text(now),
        ];
        for (name, spec) in &schema.fields {
            columns.push(name.clone());
            values.push(encode_field(name, spec, data.get(name))?);
        }

        let sql = insert_sql(&schema.name, &columns);
        state
            .conn
            .write(move |c| {
                c.execute(&sql, params_from_iter(values))?;
                Ok(())
            })
            .await
            .map_err(StoreError::from)?;

        debug!(id, commit = msg, "Created entity");
        Ok(id)
    }

    async fn get_entity(&self, id: &str) -> StoreResult<Option<Entity>> {
        let state = self.connected()?;
        self.fetch_entity(&state, id).await
    }

    async fn query_entities(
        &self,
        entity_type: &str,
        filters: Option<&FieldMap>,
        limit: usize,
        offset: usize,
    ) -> StoreResult<PagedEntities> {
        let state = self.connected()?;
        let schema = Self::schema_for(&state, entity_type)?;
        let limit = clamp_limit(limit);

        let mut clauses = Vec::new();
        let mut bound = Vec::new();
        if let Some(filters) = filters {
            for (name, value) in filters {
                let spec = schema.fields.get(name).ok_or_else(|| {
                    StoreError::Validation(format!(
                        "unknown filter field '{}' for type '{}'",
                        name, schema.name
                    ))
                })?;
                clauses.push(format!("\"{}\" = ?{}", name, bound.len() + 1));
                bound.push(encode_field(name, spec, Some(value))?);
            }
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        let table = schema.name.clone();
        let count_sql = format!("SELECT COUNT(*) FROM \"{}\"{}", table, where_sql);
        let page_sql = format!(
            "SELECT id FROM \"{}\"{} ORDER BY rowid LIMIT {} OFFSET {}",
            table, where_sql, limit, offset
        );

        let count_params = bound.clone();
        let count: i64 = state
            .conn
            .run(move |c| {
                Ok(c.query_row(&count_sql, params_from_iter(count_params), |row| row.get(0))?)
            })
            .await
            .map_err(StoreError::from)?;

        let ids: Vec<String> = state
            .conn
            .run(move |c| {
                let mut stmt = c.prepare(&page_sql)?;
                let rows = stmt.query_map(params_from_iter(bound), |row| row.get(0))?;
                let mut ids = Vec::new();
                for row in rows {
                    ids.push(row?);
                }
                Ok(ids)
            })
            .await
            .map_err(StoreError::from)?;

        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entity) = self.fetch_entity(&state, &id).await? {
                results.push(entity);
            }
        }

        Ok(PagedEntities {
            results,
            count: count as u64,
            offset,
            limit,
        })
    }

    async fn update_entity(
        &self,
        id: &str,
        data: FieldMap,
        commit_msg: Option<&str>,
    ) -> StoreResult<()> {
        let state = self.connected()?;
        let Some((type_name, _)) = id.split_once(':') else {
            return Err(StoreError::Validation(format!("malformed entity id '{}'", id)));
        };
        let schema = Self::schema_for(&state, type_name)?;
        validate_payload(&schema, &data, false)?;

        // Read-modify-write under the gate so the merge cannot race another
        // writer
        let _gate = state.conn.acquire_write().await;

        let current = {
            let schema = schema.clone();
            let id = id.to_string();
            state
                .conn
                .run(move |c| read_entity(c, &schema, &id))
                .await
                .map_err(StoreError::from)?
        };
        let Some(current) = current else {
            return Err(StoreError::Backend(format!("entity '{}' not found", id)));
        };

        let mut merged = current.fields;
        for (name, value) in data {
            merged.insert(name, value);
        }

        let msg = commit_msg
            .map(str::to_string)
            .unwrap_or_else(|| format!("update {}", schema.name));

        let mut sets = vec!["updated_at = ?1".to_string()];
        let mut values = vec![SqlValue::Text(rfc3339(Utc::now()))];
        for (name, spec) in &schema.fields {
            sets.push(format!("\"{}\" = ?{}", name, values.len() + 1));
            values.push(encode_field(name, spec, merged.get(name))?);
        }
        let sql = format!(
            "UPDATE \"{}\" SET {} WHERE id = ?{}",
            schema.name,
            sets.join(", "),
            values.len() + 1
        );
        values.push(SqlValue::Text(id.to_string()));

        state
            .conn
            .run(move |c| {
                c.execute(&sql, params_from_iter(values))?;
                Ok(())
            })
            .await
            .map_err(StoreError::from)?;

        debug!(id, commit = msg, "Updated entity");
        Ok(())
    }

    async fn delete_entity(&self, id: &str, commit_msg: Option<&str>) -> StoreResult<()> {
        let state = self.connected()?;
        let Some((type_name, _)) = id.split_once(':') else {
            return Err(StoreError::Validation(format!("malformed entity id '{}'", id)));
        };
        let schema = Self::schema_for(&state, type_name)?;
        let msg = commit_msg
            .map(str::to_string)
            .unwrap_or_else(|| format!("delete {}", schema.name));

        let table = schema.name.clone();
        let id = id.to_string();
        let deleted_id = id.clone();
        state
            .conn
            .write(move |c| {
                c.execute(&format!("DELETE FROM \"{}\" WHERE id = ?1", table), [&id])?;
                // Drop edges on either side so traversal never dangles
                c.execute(
                    "DELETE FROM links WHERE from_id = ?1 OR to_id = ?1",
                    [&id],
                )?;
                Ok(())
            })
            .await
            .map_err(StoreError::from)?;

        debug!(id = deleted_id, commit = msg, "Deleted entity");
        Ok(())
    }

    async fn create_relationship(
        &self,
        from_id: &str,
        relation: &str,
        to_id: &str,
    ) -> StoreResult<()> {
        let state = self.connected()?;
        if !is_identifier(relation) {
            return Err(StoreError::Validation(format!(
                "invalid relation name '{}'",
                relation
            )));
        }

        let from = from_id.to_string();
        let rel = relation.to_string();
        let to = to_id.to_string();
        // UNIQUE (from, relation, to) makes the duplicate triple collapse
        state
            .conn
            .write(move |c| {
                c.execute(
                    "INSERT OR IGNORE INTO links (from_id, relation, to_id, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![from, rel, to, rfc3339(Utc::now())],
                )?;
                Ok(())
            })
            .await
            .map_err(StoreError::from)
    }

    async fn traverse_graph(
        &self,
        start_id: &str,
        relation: &str,
        max_depth: u32,
    ) -> StoreResult<Vec<Entity>> {
        validate_depth(max_depth)?;
        self.connected()?;
        // No server-side recursive primitive on this backend; the bounded
        // BFS is the native strategy
        bounded_bfs(self, start_id, relation, max_depth).await
    }

    fn list_schemas(&self) -> Vec<EntityType> {
        self.state
            .read()
            .as_ref()
            .map(|s| (*s.schemas).clone())
            .unwrap_or_default()
    }
}

fn rfc3339(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn insert_sql(table: &str, columns: &[String]) -> String {
    let cols: Vec<String> = columns.iter().map(|c| format!("\"{}\"", c)).collect();
    let slots: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
    format!(
        "INSERT INTO \"{}\" ({}) VALUES ({})",
        table,
        cols.join(", "),
        slots.join(", ")
    )
}

/// Reject unknown fields always, and missing required fields on create
fn validate_payload(schema: &EntityType, data: &FieldMap, require_all: bool) -> StoreResult<()> {
    for name in data.keys() {
        if !schema.fields.contains_key(name) {
            return Err(StoreError::Validation(format!(
                "unknown field '{}' for type '{}'",
                name, schema.name
            )));
        }
    }
    if require_all {
        for (name, spec) in &schema.fields {
            if spec.required && !data.contains_key(name) {
                return Err(StoreError::Validation(format!(
                    "missing required field '{}' for type '{}'",
                    name, schema.name
                )));
            }
        }
    }
    Ok(())
}

fn encode_field(name: &str, spec: &FieldSpec, value: Option<&Value>) -> StoreResult<SqlValue> {
    let value = match value {
        None | Some(Value::Null) => {
            if spec.required {
                return Err(StoreError::Validation(format!(
                    "required field '{}' must not be null",
                    name
                )));
            }
            return Ok(SqlValue::Null);
        }
        Some(value) => value,
    };

    let mismatch = || {
        StoreError::Validation(format!(
            "field '{}' has the wrong type for {:?}",
            name, spec.field_type
        ))
    };

    match &spec.field_type {
        FieldType::String | FieldType::Reference(_) => match value {
            Value::String(s) => Ok(SqlValue::Text(s.clone())),
            _ => Err(mismatch()),
        },
        FieldType::DateTime => match value {
            Value::String(s) => {
                DateTime::parse_from_rfc3339(s).map_err(|e| {
                    StoreError::Validation(format!("field '{}': bad datetime: {}", name, e))
                })?;
                Ok(SqlValue::Text(s.clone()))
            }
            _ => Err(mismatch()),
        },
        FieldType::Enum(values) => match value {
            Value::String(s) if values.contains(s) => Ok(SqlValue::Text(s.clone())),
            Value::String(s) => Err(StoreError::Validation(format!(
                "field '{}': '{}' is not one of {:?}",
                name, s, values
            ))),
            _ => Err(mismatch()),
        },
        FieldType::Integer => value
            .as_i64()
            .map(SqlValue::Integer)
            .ok_or_else(mismatch),
        FieldType::Boolean => match value {
            Value::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
            _ => Err(mismatch()),
        },
        FieldType::Array(_) | FieldType::ReferenceUnion(_) => match value {
            Value::Array(_) => Ok(SqlValue::Text(serde_json::to_string(value)?)),
            _ => Err(mismatch()),
        },
    }
}

fn decode_field(spec: &FieldSpec, value: SqlValue) -> EmbeddedResult<Option<Value>> {
    let decoded = match (&spec.field_type, value) {
        (_, SqlValue::Null) => return Ok(None),
        (FieldType::Integer, SqlValue::Integer(i)) => Value::from(i),
        (FieldType::Boolean, SqlValue::Integer(i)) => Value::Bool(i != 0),
        (FieldType::Array(_) | FieldType::ReferenceUnion(_), SqlValue::Text(s)) => {
            serde_json::from_str(&s)?
        }
        (_, SqlValue::Text(s)) => Value::String(s),
        (field_type, other) => {
            return Err(EmbeddedError::Serialization(format!(
                "unexpected column value {:?} for {:?}",
                other, field_type
            )))
        }
    };
    Ok(Some(decoded))
}

fn read_entity(conn: &Connection, schema: &EntityType, id: &str) -> EmbeddedResult<Option<Entity>> {
    let field_names: Vec<&String> = schema.fields.keys().collect();
    let select_cols: Vec<String> = field_names.iter().map(|n| format!("\"{}\"", n)).collect();
    let sql = format!(
        "SELECT {} FROM \"{}\" WHERE id = ?1",
        if select_cols.is_empty() {
            "id".to_string()
        } else {
            select_cols.join(", ")
        },
        schema.name
    );

    let row: Option<Vec<SqlValue>> = conn
        .query_row(&sql, [id], |row| {
            let mut values = Vec::new();
            for i in 0..row.as_ref().column_count() {
                values.push(row.get::<_, SqlValue>(i)?);
            }
            Ok(values)
        })
        .optional()?;

    let Some(row) = row else {
        return Ok(None);
    };

    let mut fields = FieldMap::new();
    if !schema.fields.is_empty() {
        for (spec_entry, value) in schema.fields.iter().zip(row) {
            let (name, spec) = spec_entry;
            if let Some(decoded) = decode_field(spec, value)? {
                fields.insert(name.clone(), decoded);
            }
        }
    }

    let mut relationships: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut stmt =
        conn.prepare("SELECT relation, to_id FROM links WHERE from_id = ?1 ORDER BY rowid")?;
    let rows = stmt.query_map([id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (relation, to_id) = row?;
        relationships.entry(relation).or_default().push(to_id);
    }

    Ok(Some(Entity {
        id: id.to_string(),
        entity_type: schema.name.clone(),
        fields,
        relationships,
    }))
}

/// First keyword decides the path. `WITH` can prefix DML in this engine,
/// so it counts as a mutation; gating a read is harmless, the reverse is
/// not.
fn is_read_only_sql(query: &str) -> bool {
    let first = query.trim_start().split_whitespace().next().unwrap_or("");
    matches!(
        first.to_ascii_uppercase().as_str(),
        "SELECT" | "PRAGMA" | "EXPLAIN" | "VALUES"
    )
}

fn run_raw_query(
    conn: &Connection,
    query: &str,
    params: &[Value],
) -> EmbeddedResult<Vec<serde_json::Map<String, Value>>> {
    let mut stmt = conn.prepare(query)?;
    let column_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
    let bound: Vec<SqlValue> = params.iter().map(json_to_sql).collect();

    let mut rows = stmt.query(params_from_iter(bound))?;
    let mut results = Vec::new();
    while let Some(row) = rows.next()? {
        let mut map = serde_json::Map::new();
        for (i, name) in column_names.iter().enumerate() {
            let value = sql_to_json(row.get::<_, SqlValue>(i)?);
            map.insert(name.clone(), value);
        }
        results.push(strip_bookkeeping(map, column_names.len()));
    }
    Ok(results)
}

fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Integer(i)
            } else {
                SqlValue::Real(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn sql_to_json(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::from(i),
        SqlValue::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        SqlValue::Text(s) => Value::String(s),
        SqlValue::Blob(b) => Value::String(hex::encode(b)),
    }
}

/// A single-column row whose value is a structured node (a JSON object
/// stored as text) is expanded, with internal bookkeeping fields stripped.
fn strip_bookkeeping(
    map: serde_json::Map<String, Value>,
    column_count: usize,
) -> serde_json::Map<String, Value> {
    if column_count != 1 {
        return map;
    }
    let Some((_, Value::String(text))) = map.iter().next().map(|(k, v)| (k.clone(), v.clone()))
    else {
        return map;
    };
    let trimmed = text.trim_start();
    if !trimmed.starts_with('{') {
        return map;
    }
    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(inner)) => inner
            .into_iter()
            .filter(|(key, _)| !key.starts_with('_'))
            .collect(),
        _ => map,
    }
}
