//! Versioned document-graph adapter
//!
//! Maps the [`GraphStore`] contract onto SurrealDB documents. Each entity
//! type becomes a schemaless table with typed field definitions layered on
//! top, so declared fields are checked while undeclared fields written by
//! newer schema revisions still read back. Relationships live in two
//! places: a `_rel` membership object on the source document (the
//! authoritative copy) and mirrored graph edges for server-side traversal.
//!
//! Every mutation records a `_commit` audit message on the document,
//! derived from the operation when the caller does not supply one.

use crate::client::{SurrealConfig, SurrealSession};
use alcove_core::schema::is_identifier;
use alcove_core::types::{Entity, EntityType, FieldMap, FieldType, PagedEntities};
use alcove_core::{
    bounded_bfs, clamp_limit, validate_depth, GraphStore, NeighborSource, StoreError, StoreResult,
    MAX_QUERY_LIMIT,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Document fields maintained by the adapter, not by callers
const RESERVED_FIELDS: [&str; 3] = ["id", "_rel", "_commit"];

/// Versioned document-graph store
pub struct SurrealVaultStore {
    config: SurrealConfig,
    session: RwLock<Option<SurrealSession>>,
    schemas: RwLock<Vec<EntityType>>,
}

impl SurrealVaultStore {
    /// Build an unconnected store; call [`GraphStore::connect`] before use
    pub fn new(config: SurrealConfig) -> Self {
        Self {
            config,
            session: RwLock::new(None),
            schemas: RwLock::new(Vec::new()),
        }
    }

    /// In-memory store for development and testing
    pub fn memory() -> Self {
        Self::new(SurrealConfig::memory())
    }

    /// Whether `connect` has completed successfully
    pub fn is_connected(&self) -> bool {
        self.session.read().is_some()
    }

    fn session(&self) -> StoreResult<SurrealSession> {
        self.session.read().clone().ok_or(StoreError::NotConnected)
    }

    fn schema_for(&self, entity_type: &str) -> StoreResult<EntityType> {
        self.schemas
            .read()
            .iter()
            .find(|s| s.name == entity_type)
            .cloned()
            .ok_or_else(|| {
                StoreError::Validation(format!("unknown entity type '{}'", entity_type))
            })
    }

    /// Render and apply the table/field definitions for one entity type.
    ///
    /// `OVERWRITE` makes re-registration a refresh rather than an error, and
    /// the table stays schemaless so fields dropped from a newer revision
    /// still read back.
    async fn define_entity_type(
        &self,
        session: &SurrealSession,
        schema: &EntityType,
    ) -> StoreResult<()> {
        let mut statements = vec![format!(
            "DEFINE TABLE OVERWRITE {} SCHEMALESS;",
            schema.name
        )];
        for (field, spec) in &schema.fields {
            statements.push(format!(
                "DEFINE FIELD OVERWRITE {} ON TABLE {} TYPE {};",
                field,
                schema.name,
                render_field_type(&spec.field_type, spec.required)
            ));
        }
        let count = statements.len();
        let sql = statements.join("\n");
        session.query_multi(&sql, vec![], count).await?;
        debug!(entity_type = %schema.name, fields = schema.fields.len(), "registered schema");
        Ok(())
    }

    async fn fetch_document(&self, id: &str) -> StoreResult<Option<FieldMap>> {
        let session = self.session()?;
        let Some((table, key)) = split_entity_id(id) else {
            return Ok(None);
        };
        if !is_identifier(table) {
            return Ok(None);
        }
        let rows = session
            .query(
                "SELECT * FROM type::thing($tb, $key)",
                vec![
                    ("tb".to_string(), json!(table)),
                    ("key".to_string(), json!(key)),
                ],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    /// Server-side traversal: one arrow-chain statement per depth level.
    ///
    /// Falls back to client-side breadth-first search when the backend
    /// rejects the traversal primitive itself; any other backend failure
    /// degrades to an empty result with a warning.
    async fn traverse_server_side(
        &self,
        start_id: &str,
        relation: &str,
        max_depth: u32,
    ) -> StoreResult<Vec<String>> {
        let session = self.session()?;
        let (table, key) = split_entity_id(start_id).ok_or_else(|| {
            StoreError::Validation(format!("malformed entity id '{}'", start_id))
        })?;

        let mut statements = Vec::with_capacity(max_depth as usize);
        for depth in 1..=max_depth {
            let chain: String = (0..depth).map(|_| format!("->{}->?", relation)).collect();
            statements.push(format!(
                "SELECT VALUE {} FROM type::thing($tb, $key);",
                chain
            ));
        }
        let sql = statements.join("\n");
        let values = session
            .query_multi(
                &sql,
                vec![
                    ("tb".to_string(), json!(table)),
                    ("key".to_string(), json!(key)),
                ],
                max_depth as usize,
            )
            .await?;

        let mut ids = vec![start_id.to_string()];
        for value in values {
            collect_id_strings(&value, &mut ids);
        }
        dedup_preserving_order(&mut ids);
        ids.truncate(MAX_QUERY_LIMIT);
        Ok(ids)
    }

    /// Apply the recovery policy to a server-side traversal outcome and
    /// hydrate the surviving ids.
    ///
    /// `Unsupported` means the traversal primitive itself is unavailable on
    /// this backend, so the client-side breadth-first search takes over.
    /// Any other backend failure degrades to an empty result with a
    /// warning, and an id that cannot be hydrated is skipped rather than
    /// sinking the rest of the result.
    async fn resolve_traversal(
        &self,
        start_id: &str,
        relation: &str,
        max_depth: u32,
        server: StoreResult<Vec<String>>,
    ) -> StoreResult<Vec<Entity>> {
        let ids = match server {
            Ok(ids) => ids,
            Err(StoreError::Unsupported(reason)) => {
                debug!(%relation, %reason, "server-side traversal unavailable, using breadth-first search");
                return bounded_bfs(self, start_id, relation, max_depth).await;
            }
            Err(err) => {
                warn!(%start_id, %relation, error = %err, "traversal failed, returning empty result");
                return Ok(Vec::new());
            }
        };

        let mut entities = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get_entity(&id).await {
                Ok(Some(entity)) => entities.push(entity),
                Ok(None) => {}
                Err(err) => {
                    warn!(%id, error = %err, "skipping unresolvable node in traversal result");
                }
            }
        }
        Ok(entities)
    }
}

#[async_trait]
impl GraphStore for SurrealVaultStore {
    async fn connect(&self, schemas: &[EntityType]) -> StoreResult<()> {
        if self.session.read().is_none() {
            let session = SurrealSession::connect(self.config.clone()).await?;
            *self.session.write() = Some(session);
            info!(
                namespace = %self.config.namespace,
                database = %self.config.database,
                "connected to document store"
            );
        }

        let session = self.session()?;
        for schema in schemas {
            self.define_entity_type(&session, schema).await?;
        }
        *self.schemas.write() = schemas.to_vec();
        Ok(())
    }

    async fn create_entity(
        &self,
        entity_type: &str,
        data: FieldMap,
        commit_msg: Option<&str>,
    ) -> StoreResult<String> {
        let session = self.session()?;
        let schema = self.schema_for(entity_type)?;
        reject_reserved_fields(&data)?;

        let key = schema.key_strategy.derive(&data)?;
        let id = format!("{}:{}", entity_type, key);
        let commit = commit_msg
            .map(str::to_string)
            .unwrap_or_else(|| format!("create {}", entity_type));

        let mut content = data;
        content.insert("_rel".to_string(), json!({}));
        content.insert("_commit".to_string(), json!(commit));

        session
            .query(
                "CREATE type::thing($tb, $key) CONTENT $data",
                vec![
                    ("tb".to_string(), json!(entity_type)),
                    ("key".to_string(), json!(key)),
                    ("data".to_string(), Value::Object(content)),
                ],
            )
            .await?;
        debug!(%id, commit = %commit, "created entity");
        Ok(id)
    }

    async fn get_entity(&self, id: &str) -> StoreResult<Option<Entity>> {
        let Some(doc) = self.fetch_document(id).await? else {
            return Ok(None);
        };
        Ok(Some(entity_from_document(id, doc)))
    }

    async fn query_entities(
        &self,
        entity_type: &str,
        filters: Option<&FieldMap>,
        limit: usize,
        offset: usize,
    ) -> StoreResult<PagedEntities> {
        let session = self.session()?;
        let schema = self.schema_for(entity_type)?;
        let limit = clamp_limit(limit);

        let mut clauses = Vec::new();
        let mut bindings = vec![("tb".to_string(), json!(entity_type))];
        if let Some(filters) = filters {
            for (index, (field, value)) in filters.iter().enumerate() {
                if !schema.fields.contains_key(field) {
                    return Err(StoreError::Validation(format!(
                        "unknown filter field '{}' for entity type '{}'",
                        field, entity_type
                    )));
                }
                let param = format!("f{}", index);
                clauses.push(format!("{} = ${}", field, param));
                bindings.push((param, value.clone()));
            }
        }
        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        // LIMIT/START take literal integers, not bindings
        let sql = format!(
            "SELECT * FROM type::table($tb){where_clause} LIMIT {limit} START {offset};\n\
             SELECT count() AS total FROM type::table($tb){where_clause} GROUP ALL;"
        );

        let values = match session.query_multi(&sql, bindings, 2).await {
            Ok(values) => values,
            Err(err) => return Ok(degraded_page(entity_type, offset, limit, &err)),
        };
        let mut values = values.into_iter();
        let rows = crate::client::rows_from(values.next().unwrap_or(Value::Null));
        let count_rows = crate::client::rows_from(values.next().unwrap_or(Value::Null));
        let count = count_rows
            .first()
            .and_then(|row| row.get("total"))
            .and_then(Value::as_u64)
            .unwrap_or(rows.len() as u64);

        let results = rows
            .into_iter()
            .filter_map(|doc| {
                let id = doc.get("id").and_then(Value::as_str)?.to_string();
                Some(entity_from_document(&id, doc))
            })
            .collect();
        Ok(PagedEntities {
            results,
            count,
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
        let session = self.session()?;
        reject_reserved_fields(&data)?;
        let (table, key) = split_entity_id(id).ok_or_else(|| {
            StoreError::Validation(format!("malformed entity id '{}'", id))
        })?;
        let mut doc = self
            .fetch_document(id)
            .await?
            .ok_or_else(|| StoreError::Backend(format!("entity '{}' does not exist", id)))?;

        // Merge on top of the stored document so omitted fields survive
        doc.remove("id");
        for (field, value) in data {
            doc.insert(field, value);
        }
        let commit = commit_msg
            .map(str::to_string)
            .unwrap_or_else(|| format!("update {}", table));
        doc.insert("_commit".to_string(), json!(commit));

        session
            .query(
                "UPDATE type::thing($tb, $key) CONTENT $data",
                vec![
                    ("tb".to_string(), json!(table)),
                    ("key".to_string(), json!(key)),
                    ("data".to_string(), Value::Object(doc)),
                ],
            )
            .await?;
        debug!(%id, commit = %commit, "updated entity");
        Ok(())
    }

    async fn delete_entity(&self, id: &str, commit_msg: Option<&str>) -> StoreResult<()> {
        let session = self.session()?;
        let (table, key) = split_entity_id(id).ok_or_else(|| {
            StoreError::Validation(format!("malformed entity id '{}'", id))
        })?;
        session
            .query(
                "DELETE type::thing($tb, $key)",
                vec![
                    ("tb".to_string(), json!(table)),
                    ("key".to_string(), json!(key)),
                ],
            )
            .await?;
        let commit = commit_msg
            .map(str::to_string)
            .unwrap_or_else(|| format!("delete {}", table));
        debug!(%id, commit = %commit, "deleted entity");
        Ok(())
    }

    async fn create_relationship(
        &self,
        from_id: &str,
        relation: &str,
        to_id: &str,
    ) -> StoreResult<()> {
        if !is_identifier(relation) {
            return Err(StoreError::Validation(format!(
                "invalid relation name '{}'",
                relation
            )));
        }
        let session = self.session()?;
        let (from_table, from_key) = split_entity_id(from_id).ok_or_else(|| {
            StoreError::Validation(format!("malformed entity id '{}'", from_id))
        })?;
        let (to_table, to_key) = split_entity_id(to_id).ok_or_else(|| {
            StoreError::Validation(format!("malformed entity id '{}'", to_id))
        })?;

        let entity = self
            .get_entity(from_id)
            .await?
            .ok_or_else(|| StoreError::Backend(format!("entity '{}' does not exist", from_id)))?;
        if entity
            .related(relation)
            .is_some_and(|targets| targets.iter().any(|t| t == to_id))
        {
            return Ok(());
        }

        // Membership object first, then the mirrored edge the arrow
        // traversal reads
        let sql = format!(
            "UPDATE type::thing($ftb, $fkey) SET _rel.{relation} = \
             array::union(_rel.{relation} ?? [], [$to]);\n\
             RELATE (type::thing($ftb, $fkey))->{relation}->(type::thing($ttb, $tkey));"
        );
        session
            .query_multi(
                &sql,
                vec![
                    ("ftb".to_string(), json!(from_table)),
                    ("fkey".to_string(), json!(from_key)),
                    ("ttb".to_string(), json!(to_table)),
                    ("tkey".to_string(), json!(to_key)),
                    ("to".to_string(), json!(to_id)),
                ],
                2,
            )
            .await?;
        debug!(%from_id, %relation, %to_id, "created relationship");
        Ok(())
    }

    async fn traverse_graph(
        &self,
        start_id: &str,
        relation: &str,
        max_depth: u32,
    ) -> StoreResult<Vec<Entity>> {
        validate_depth(max_depth)?;
        if !is_identifier(relation) {
            return Err(StoreError::Validation(format!(
                "invalid relation name '{}'",
                relation
            )));
        }
        self.session()?;
        if self.get_entity(start_id).await?.is_none() {
            return Ok(Vec::new());
        }

        let server = self.traverse_server_side(start_id, relation, max_depth).await;
        self.resolve_traversal(start_id, relation, max_depth, server).await
    }

    fn list_schemas(&self) -> Vec<EntityType> {
        self.schemas.read().clone()
    }
}

#[async_trait]
impl NeighborSource for SurrealVaultStore {
    async fn fetch(&self, id: &str) -> StoreResult<Option<Entity>> {
        self.get_entity(id).await
    }
}

/// Split `"Type:key"` into its table and key parts
fn split_entity_id(id: &str) -> Option<(&str, &str)> {
    let (table, key) = id.split_once(':')?;
    if table.is_empty() || key.is_empty() {
        return None;
    }
    Some((table, key))
}

fn reject_reserved_fields(data: &FieldMap) -> StoreResult<()> {
    for reserved in RESERVED_FIELDS {
        if data.contains_key(reserved) {
            return Err(StoreError::Validation(format!(
                "field '{}' is reserved",
                reserved
            )));
        }
    }
    Ok(())
}

/// Render a compiled field type in the backend's type language.
///
/// References are stored as plain id strings (`"Person:ada"`), so they
/// render as `string` rather than record links; the `_rel` membership
/// object and mirrored edges carry the graph structure.
fn render_field_type(field_type: &FieldType, required: bool) -> String {
    if let FieldType::Enum(values) = field_type {
        let quoted: Vec<String> = values
            .iter()
            .map(|v| format!("'{}'", v.replace('\'', "\\'")))
            .collect();
        let assertion = if required {
            format!("ASSERT $value INSIDE [{}]", quoted.join(", "))
        } else {
            format!("ASSERT $value = NONE OR $value INSIDE [{}]", quoted.join(", "))
        };
        let wrapper = if required { "string" } else { "option<string>" };
        return format!("{} {}", wrapper, assertion);
    }
    let base = render_base_type(field_type);
    if required {
        base
    } else {
        format!("option<{}>", base)
    }
}

/// Bare type expression with no assertion clause. An enum nested inside an
/// array loses its value check and renders as a plain string: ASSERT is a
/// field-level clause and cannot appear inside `array<...>`.
fn render_base_type(field_type: &FieldType) -> String {
    match field_type {
        FieldType::String
        | FieldType::Reference(_)
        | FieldType::ReferenceUnion(_)
        | FieldType::Enum(_) => "string".to_string(),
        FieldType::Integer => "int".to_string(),
        FieldType::Boolean => "bool".to_string(),
        FieldType::DateTime => "datetime".to_string(),
        FieldType::Array(item) => format!("array<{}>", render_base_type(item)),
    }
}

/// Build an [`Entity`] from a flattened document row
fn entity_from_document(id: &str, mut doc: FieldMap) -> Entity {
    doc.remove("id");
    doc.remove("_commit");
    let relationships = doc
        .remove("_rel")
        .map(relationships_from_value)
        .unwrap_or_default();
    let entity_type = id.split_once(':').map(|(t, _)| t).unwrap_or(id).to_string();
    Entity {
        id: id.to_string(),
        entity_type,
        fields: doc,
        relationships,
    }
}

fn relationships_from_value(value: Value) -> BTreeMap<String, Vec<String>> {
    let Value::Object(map) = value else {
        return BTreeMap::new();
    };
    map.into_iter()
        .filter_map(|(relation, targets)| {
            let Value::Array(items) = targets else {
                return None;
            };
            let ids: Vec<String> = items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect();
            if ids.is_empty() {
                None
            } else {
                Some((relation, ids))
            }
        })
        .collect()
}

/// Collect record-id strings out of an arbitrarily nested traversal result
fn collect_id_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) if s.contains(':') => out.push(s.clone()),
        Value::Array(items) => {
            for item in items {
                collect_id_strings(item, out);
            }
        }
        Value::Object(map) => {
            if let Some(Value::String(s)) = map.get("id") {
                if s.contains(':') {
                    out.push(s.clone());
                }
            }
        }
        _ => {}
    }
}

fn dedup_preserving_order(ids: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    ids.retain(|id| seen.insert(id.clone()));
}

/// Multi-row reads prefer availability: log the failure, echo the window
fn degraded_page(entity_type: &str, offset: usize, limit: usize, err: &StoreError) -> PagedEntities {
    warn!(%entity_type, error = %err, "entity query failed, returning empty page");
    PagedEntities::empty(offset, limit)
}
