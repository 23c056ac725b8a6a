//! Backend-native schema rendering and idempotent DDL
//!
//! Compiled entity types become one node table each; the knowledge graph
//! produced by ingestion lives in the shared `kg_nodes`/`facts` tables; and
//! typed-entity relationships live in the `links` edge table. All DDL is
//! `CREATE ... IF NOT EXISTS`, so registration is safe to repeat and the
//! single schema namespace can be shared by every module on the connection.

use crate::error::{EmbeddedError, EmbeddedResult};
use alcove_core::schema::compiler::is_identifier;
use alcove_core::types::{EntityType, FieldSpec, FieldType};

/// One column of a node or relationship table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name (plain identifier)
    pub name: String,
    /// SQLite type affinity (`TEXT`, `INTEGER`, ...)
    pub sql_type: String,
    /// Adds `NOT NULL` when set
    pub not_null: bool,
}

impl Column {
    /// A nullable column
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            not_null: false,
        }
    }

    /// A `NOT NULL` column
    pub fn required(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            not_null: true,
            ..Self::new(name, sql_type)
        }
    }
}

fn check_identifier(kind: &str, name: &str) -> EmbeddedResult<()> {
    if !is_identifier(name) {
        return Err(EmbeddedError::Schema(format!(
            "invalid {} name '{}'",
            kind, name
        )));
    }
    Ok(())
}

fn render_columns(columns: &[Column]) -> EmbeddedResult<Vec<String>> {
    columns
        .iter()
        .map(|col| {
            check_identifier("column", &col.name)?;
            let null = if col.not_null { " NOT NULL" } else { "" };
            Ok(format!("\"{}\" {}{}", col.name, col.sql_type, null))
        })
        .collect()
}

/// Render `CREATE TABLE IF NOT EXISTS` DDL for a node table.
///
/// `primary_key` must name one of `columns`.
pub fn node_table_ddl(
    name: &str,
    columns: &[Column],
    primary_key: &str,
) -> EmbeddedResult<String> {
    check_identifier("table", name)?;
    if !columns.iter().any(|c| c.name == primary_key) {
        return Err(EmbeddedError::Schema(format!(
            "primary key '{}' is not a column of '{}'",
            primary_key, name
        )));
    }
    let mut parts = render_columns(columns)?;
    parts.push(format!("PRIMARY KEY (\"{}\")", primary_key));
    Ok(format!(
        "CREATE TABLE IF NOT EXISTS \"{}\" (\n    {}\n);",
        name,
        parts.join(",\n    ")
    ))
}

/// Render DDL for a relationship table between two node tables.
///
/// The table gets `from_id`/`to_id` columns referencing the endpoints'
/// `id` columns, plus the supplied payload columns and endpoint indexes.
pub fn rel_table_ddl(
    name: &str,
    from_table: &str,
    to_table: &str,
    columns: &[Column],
) -> EmbeddedResult<String> {
    check_identifier("table", name)?;
    check_identifier("table", from_table)?;
    check_identifier("table", to_table)?;

    let mut parts = vec![
        format!("from_id TEXT NOT NULL REFERENCES \"{}\"(id)", from_table),
        format!("to_id TEXT NOT NULL REFERENCES \"{}\"(id)", to_table),
    ];
    parts.extend(render_columns(columns)?);

    Ok(format!(
        "CREATE TABLE IF NOT EXISTS \"{}\" (\n    {}\n);\n\
         CREATE INDEX IF NOT EXISTS \"idx_{name}_from\" ON \"{name}\"(from_id);\n\
         CREATE INDEX IF NOT EXISTS \"idx_{name}_to\" ON \"{name}\"(to_id);",
        name,
        parts.join(",\n    "),
        name = name,
    ))
}

/// SQLite type affinity for a compiled field
pub fn sql_type_for(field_type: &FieldType) -> &'static str {
    match field_type {
        FieldType::Integer | FieldType::Boolean => "INTEGER",
        // datetimes as RFC 3339 text; arrays/references as TEXT (JSON or id)
        _ => "TEXT",
    }
}

/// Columns of the node table for a compiled entity type.
///
/// `id` plus one column per declared field; non-required fields are
/// nullable, which is this backend's optional wrapper.
pub fn entity_type_columns(entity: &EntityType) -> Vec<Column> {
    let mut columns = vec![
        Column::required("id", "TEXT"),
        Column::required("created_at", "TEXT"),
        Column::required("updated_at", "TEXT"),
    ];
    for (name, spec) in &entity.fields {
        let FieldSpec {
            field_type,
            required,
        } = spec;
        let mut col = Column::new(name.clone(), sql_type_for(field_type));
        col.not_null = *required;
        columns.push(col);
    }
    columns
}

/// DDL for the shared knowledge-graph node catalog filled by ingestion
pub fn kg_nodes_ddl() -> EmbeddedResult<String> {
    node_table_ddl(
        "kg_nodes",
        &[
            Column::required("id", "TEXT"),
            Column::required("name", "TEXT"),
            Column::required("entity_type", "TEXT"),
            Column::new("summary", "TEXT"),
            Column::required("created_at", "TEXT"),
        ],
        "id",
    )
}

/// DDL for the extracted-fact edge table
pub fn facts_ddl() -> EmbeddedResult<String> {
    rel_table_ddl(
        "facts",
        "kg_nodes",
        "kg_nodes",
        &[
            Column::required("relation", "TEXT"),
            Column::required("fact", "TEXT"),
            Column::required("episode_uuid", "TEXT"),
            Column::required("created_at", "TEXT"),
            Column::new("valid_at", "TEXT"),
            Column::new("invalid_at", "TEXT"),
        ],
    )
}

/// DDL for typed-entity relationships.
///
/// Endpoints live in per-type node tables, so this edge table carries bare
/// ids instead of foreign keys.
pub const LINKS_DDL: &str = "\
CREATE TABLE IF NOT EXISTS links (
    from_id TEXT NOT NULL,
    relation TEXT NOT NULL,
    to_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (from_id, relation, to_id)
);
CREATE INDEX IF NOT EXISTS idx_links_from ON links(from_id);
CREATE INDEX IF NOT EXISTS idx_links_to ON links(to_id);";

#[cfg(test)]
mod tests {
    use super::*;
    use alcove_core::types::KeyStrategy;
    use std::collections::BTreeMap;

    #[test]
    fn node_ddl_renders_primary_key() {
        let ddl = node_table_ddl(
            "Person",
            &[Column::required("id", "TEXT"), Column::new("age", "INTEGER")],
            "id",
        )
        .unwrap();
        assert!(ddl.contains("CREATE TABLE IF NOT EXISTS \"Person\""));
        assert!(ddl.contains("\"id\" TEXT NOT NULL"));
        assert!(ddl.contains("\"age\" INTEGER,"));
        assert!(ddl.contains("PRIMARY KEY (\"id\")"));
    }

    #[test]
    fn node_ddl_rejects_bad_identifiers() {
        assert!(node_table_ddl("bad name", &[Column::required("id", "TEXT")], "id").is_err());
        assert!(node_table_ddl(
            "Person",
            &[Column::required("id; DROP TABLE", "TEXT")],
            "id"
        )
        .is_err());
        assert!(node_table_ddl("Person", &[Column::required("id", "TEXT")], "uuid").is_err());
    }

    #[test]
    fn rel_ddl_references_endpoints() {
        let ddl = rel_table_ddl("facts", "kg_nodes", "kg_nodes", &[]).unwrap();
        assert!(ddl.contains("from_id TEXT NOT NULL REFERENCES \"kg_nodes\"(id)"));
        assert!(ddl.contains("idx_facts_from"));
    }

    #[test]
    fn entity_type_columns_follow_requiredness() {
        let mut fields = BTreeMap::new();
        fields.insert(
            "email".to_string(),
            FieldSpec {
                field_type: FieldType::String,
                required: true,
            },
        );
        fields.insert(
            "age".to_string(),
            FieldSpec {
                field_type: FieldType::Integer,
                required: false,
            },
        );
        let entity = EntityType {
            name: "Person".to_string(),
            description: String::new(),
            key_strategy: KeyStrategy::Random,
            fields,
        };

        let columns = entity_type_columns(&entity);
        let email = columns.iter().find(|c| c.name == "email").unwrap();
        assert!(email.not_null);
        assert_eq!(email.sql_type, "TEXT");
        let age = columns.iter().find(|c| c.name == "age").unwrap();
        assert!(!age.not_null);
        assert_eq!(age.sql_type, "INTEGER");
    }
}
