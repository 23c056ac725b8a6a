//! Core data model: entity types, field specs, entities, episodes, facts
//!
//! These types are backend-agnostic. The schema compiler produces
//! [`EntityType`] values from declarative definition files, and both store
//! adapters render them into their native schema form at `connect` time.

use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Field data map used for entity payloads and query filters
pub type FieldMap = serde_json::Map<String, Value>;

/// Identity derivation rule for an entity type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyStrategy {
    /// Backend-assigned random identifier (UUID v4)
    Random,
    /// Deterministic concatenation of the named field values
    Lexical(Vec<String>),
    /// Hex SHA-256 of the named field values
    Hash(Vec<String>),
    /// Hex SHA-256 of the full field payload
    ValueHash,
}

impl KeyStrategy {
    /// Derive an entity key from its field payload.
    ///
    /// Lexical and Hash strategies fail with [`StoreError::Validation`] when
    /// a named key field is absent from the payload; identity must never be
    /// derived from a partial key.
    pub fn derive(&self, data: &FieldMap) -> StoreResult<String> {
        match self {
            KeyStrategy::Random => Ok(uuid::Uuid::new_v4().simple().to_string()),
            KeyStrategy::Lexical(fields) => {
                let parts = key_parts(fields, data)?;
                Ok(parts.join("_"))
            }
            KeyStrategy::Hash(fields) => {
                let parts = key_parts(fields, data)?;
                Ok(hex_sha256(parts.join("\u{1f}").as_bytes()))
            }
            KeyStrategy::ValueHash => {
                // Sort keys so the hash is independent of insertion order
                let sorted: BTreeMap<&String, &Value> = data.iter().collect();
                let canonical = serde_json::to_string(&sorted)?;
                Ok(hex_sha256(canonical.as_bytes()))
            }
        }
    }
}

fn key_parts(fields: &[String], data: &FieldMap) -> StoreResult<Vec<String>> {
    fields
        .iter()
        .map(|name| {
            let value = data.get(name).ok_or_else(|| {
                StoreError::Validation(format!("key field '{}' missing from entity data", name))
            })?;
            Ok(sanitize_key_part(value))
        })
        .collect()
}

/// Render a field value as a key segment containing only `[a-z0-9_-]`
fn sanitize_key_part(value: &Value) -> String {
    let raw = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    raw.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Field value type in a compiled entity schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    /// UTF-8 text
    String,
    /// 64-bit integer
    Integer,
    /// Boolean flag
    Boolean,
    /// RFC 3339 timestamp
    DateTime,
    /// Inline enumeration with an explicit value list
    Enum(Vec<String>),
    /// Homogeneous list of the wrapped type
    Array(Box<FieldType>),
    /// Reference to another entity type by name
    Reference(String),
    /// Tagged union of references to several entity types
    ReferenceUnion(Vec<String>),
}

/// One compiled field of an entity type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Compiled value type
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Required fields are emitted unwrapped; others get the backend's
    /// optional wrapper at schema-rendering time
    #[serde(default)]
    pub required: bool,
}

/// A compiled entity type: name, identity rule, and typed fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityType {
    /// Identifier matching `^[A-Za-z][A-Za-z0-9_]*$`
    pub name: String,
    /// Human-readable description carried through to extraction guidance
    #[serde(default)]
    pub description: String,
    /// Identity derivation rule (defaults to [`KeyStrategy::Random`])
    pub key_strategy: KeyStrategy,
    /// Field name → compiled spec, ordered for stable schema rendering
    pub fields: BTreeMap<String, FieldSpec>,
}

/// A typed, uniquely identified record persisted in the graph store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Backend-assigned identifier, stable once created
    pub id: String,
    /// Entity type name
    pub entity_type: String,
    /// Field values
    pub fields: FieldMap,
    /// Relation name → ordered, duplicate-free target ids
    #[serde(default)]
    pub relationships: BTreeMap<String, Vec<String>>,
}

impl Entity {
    /// Target ids of a named relation, if the entity carries it
    pub fn related(&self, relation: &str) -> Option<&[String]> {
        self.relationships.get(relation).map(|v| v.as_slice())
    }
}

/// One page of a bounded entity query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagedEntities {
    /// Entities on this page
    pub results: Vec<Entity>,
    /// Total number of matching entities, when the backend reports it
    pub count: u64,
    /// Requested offset
    pub offset: usize,
    /// Effective (clamped) limit
    pub limit: usize,
}

impl PagedEntities {
    /// An empty page echoing the requested window
    pub fn empty(offset: usize, limit: usize) -> Self {
        Self {
            results: Vec::new(),
            count: 0,
            offset,
            limit,
        }
    }
}

/// Free-text input submitted to the extraction pipeline.
///
/// Episodes are transient: only the entities and edges extracted from them
/// are persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    /// Short label for the episode
    pub name: String,
    /// Free-text body handed to the extractor
    pub body: String,
    /// Where the text came from (chat, journal, import, ...)
    pub source_description: String,
    /// When the described events happened
    pub reference_time: DateTime<Utc>,
}

/// An extracted relationship with provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    /// The extracted statement
    pub fact: String,
    /// Source entity name
    pub source_entity: String,
    /// Target entity name
    pub target_entity: String,
    /// Relation name
    pub relation: String,
    /// When the fact was recorded
    pub created_at: DateTime<Utc>,
    /// Start of the validity interval, if known
    pub valid_at: Option<DateTime<Utc>>,
    /// End of the validity interval, if known
    pub invalid_at: Option<DateTime<Utc>>,
}

/// Result of ingesting one episode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeOutcome {
    /// Identifier assigned to the episode submission
    pub episode_uuid: String,
    /// Entities newly created by extraction
    pub nodes_created: usize,
    /// Facts recorded by extraction
    pub edges_created: usize,
}
