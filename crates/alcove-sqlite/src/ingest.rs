//! Persistence half of the ingestion pipeline
//!
//! Extraction happens upstream (under the write gate, through the retry
//! policy); this module writes the extracted nodes and edges into the
//! knowledge-graph tables. Nodes deduplicate on a deterministic id derived
//! from `(entity_type, name)`, so re-ingesting the same entity is a no-op
//! while its facts still accumulate.

use crate::error::EmbeddedResult;
use alcove_core::extraction::Extraction;
use alcove_core::types::Fact;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};
use tracing::debug;

/// Deterministic knowledge-graph node id for `(entity_type, name)`
pub fn kg_node_id(entity_type: &str, name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(entity_type.to_lowercase().as_bytes());
    hasher.update([0x1f]);
    hasher.update(name.to_lowercase().as_bytes());
    hex::encode(hasher.finalize())
}

/// Fallback type for entities that appear only as edge endpoints
const DEFAULT_NODE_TYPE: &str = "Entity";

fn rfc3339(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn upsert_node(
    conn: &Connection,
    name: &str,
    entity_type: &str,
    summary: Option<&str>,
    now: DateTime<Utc>,
) -> EmbeddedResult<usize> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO kg_nodes (id, name, entity_type, summary, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            kg_node_id(entity_type, name),
            name,
            entity_type,
            summary,
            rfc3339(now)
        ],
    )?;
    Ok(inserted)
}

/// Write one extraction into `kg_nodes` and `facts`.
///
/// Returns `(nodes_created, edges_created)`. Edge endpoints missing from the
/// node list are created with the default node type so a fact never dangles.
pub fn persist_extraction(
    conn: &Connection,
    extraction: &Extraction,
    episode_uuid: &str,
    now: DateTime<Utc>,
) -> EmbeddedResult<(usize, usize)> {
    let mut nodes_created = 0;
    let mut edges_created = 0;

    for node in &extraction.nodes {
        nodes_created += upsert_node(
            conn,
            &node.name,
            &node.entity_type,
            node.summary.as_deref(),
            now,
        )?;
    }

    for edge in &extraction.edges {
        for endpoint in [&edge.source, &edge.target] {
            let declared = extraction.nodes.iter().find(|n| &n.name == endpoint);
            if declared.is_none() {
                nodes_created += upsert_node(conn, endpoint, DEFAULT_NODE_TYPE, None, now)?;
            }
        }
        let source_type = extraction
            .nodes
            .iter()
            .find(|n| n.name == edge.source)
            .map(|n| n.entity_type.as_str())
            .unwrap_or(DEFAULT_NODE_TYPE);
        let target_type = extraction
            .nodes
            .iter()
            .find(|n| n.name == edge.target)
            .map(|n| n.entity_type.as_str())
            .unwrap_or(DEFAULT_NODE_TYPE);

        conn.execute(
            "INSERT INTO facts
             (from_id, to_id, relation, fact, episode_uuid, created_at, valid_at, invalid_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                kg_node_id(source_type, &edge.source),
                kg_node_id(target_type, &edge.target),
                edge.relation,
                edge.fact,
                episode_uuid,
                rfc3339(now),
                edge.valid_at.map(rfc3339),
                edge.invalid_at.map(rfc3339),
            ],
        )?;
        edges_created += 1;
    }

    debug!(episode_uuid, nodes_created, edges_created, "Persisted extraction");
    Ok((nodes_created, edges_created))
}

/// Keyword search over the fact table, newest first.
///
/// Matches the fact text and both endpoint names. This is the read path: no
/// write gate involved.
pub fn search_facts(conn: &Connection, query: &str, limit: usize) -> EmbeddedResult<Vec<Fact>> {
    let pattern = format!("%{}%", query);
    let mut stmt = conn.prepare(
        "SELECT f.fact, s.name, t.name, f.relation, f.created_at, f.valid_at, f.invalid_at
         FROM facts f
         JOIN kg_nodes s ON f.from_id = s.id
         JOIN kg_nodes t ON f.to_id = t.id
         WHERE f.fact LIKE ?1 OR s.name LIKE ?1 OR t.name LIKE ?1
         ORDER BY f.created_at DESC, f.rowid DESC
         LIMIT ?2",
    )?;

    let rows = stmt.query_map(params![pattern, limit as i64], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, Option<String>>(5)?,
            row.get::<_, Option<String>>(6)?,
        ))
    })?;

    let mut facts = Vec::new();
    for row in rows {
        let (fact, source, target, relation, created_at, valid_at, invalid_at) = row?;
        facts.push(Fact {
            fact,
            source_entity: source,
            target_entity: target,
            relation,
            created_at: parse_ts(&created_at)?,
            valid_at: valid_at.as_deref().map(parse_ts).transpose()?,
            invalid_at: invalid_at.as_deref().map(parse_ts).transpose()?,
        });
    }
    Ok(facts)
}

fn parse_ts(raw: &str) -> EmbeddedResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| crate::error::EmbeddedError::Serialization(format!("bad timestamp '{}': {}", raw, e)))
}
