//! Compiler from declarative definition documents to [`EntityType`] values
//!
//! Single-file compilation fails closed: any malformed piece of a definition
//! raises [`StoreError::Validation`] naming the offending file and field.
//! Directory compilation is best-effort: every file compiles independently
//! and concurrently, and one malformed file never sinks the batch.

use crate::error::{StoreError, StoreResult};
use crate::types::{EntityType, FieldSpec, FieldType, KeyStrategy};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

/// Entity type and field names must be plain identifiers
static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Returns true when `name` is a legal entity-type or field identifier
pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER_RE.is_match(name)
}

/// One file that failed to compile during a batch run
#[derive(Debug, Clone)]
pub struct CompileFailure {
    /// File (or logical source) the failure came from
    pub source: String,
    /// The validation or parse error
    pub error: StoreError,
}

/// Result of compiling a directory of definition files
#[derive(Debug, Clone, Default)]
pub struct CompiledBatch {
    /// Successfully compiled types, sorted by name
    pub schemas: Vec<EntityType>,
    /// Per-file failures; the batch as a whole never fails
    pub failures: Vec<CompileFailure>,
}

/// Compile a single declarative type definition.
///
/// `source` names the definition (usually the file name) and is included in
/// every validation error.
pub fn compile_definition(source: &str, doc: &Value) -> StoreResult<EntityType> {
    let map = doc
        .as_mapping()
        .ok_or_else(|| validation(source, "definition must be a mapping"))?;

    let name = get_str(map, "name")
        .ok_or_else(|| validation(source, "missing required field 'name'"))?;
    if !is_identifier(name) {
        return Err(validation(
            source,
            &format!("invalid type name '{}': must match ^[A-Za-z][A-Za-z0-9_]*$", name),
        ));
    }

    let description = get_str(map, "description").unwrap_or_default().to_string();
    let key_strategy = compile_key_strategy(source, map)?;

    let fields_value = map
        .get(Value::from("fields"))
        .ok_or_else(|| validation(source, "missing required field 'fields'"))?;
    let fields_map = fields_value
        .as_mapping()
        .ok_or_else(|| validation(source, "'fields' must be a mapping"))?;

    let mut fields = BTreeMap::new();
    for (key, spec) in fields_map {
        let field_name = key
            .as_str()
            .ok_or_else(|| validation(source, "field names must be strings"))?;
        if !is_identifier(field_name) {
            return Err(validation(
                source,
                &format!("invalid field name '{}'", field_name),
            ));
        }
        fields.insert(
            field_name.to_string(),
            compile_field(source, field_name, spec)?,
        );
    }

    debug!(source, type_name = name, field_count = fields.len(), "Compiled entity type");

    Ok(EntityType {
        name: name.to_string(),
        description,
        key_strategy,
        fields,
    })
}

/// Compile every definition file in a directory, concurrently.
///
/// Recognized extensions are `.yaml`, `.yml`, and `.json` (YAML is a JSON
/// superset, so one parser covers both). A malformed file is logged and
/// collected as a [`CompileFailure`]; the remaining files still compile.
pub async fn compile_directory(dir: &Path) -> StoreResult<CompiledBatch> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| StoreError::Validation(format!("cannot read schema dir {:?}: {}", dir, e)))?;

    let mut paths = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| StoreError::Validation(format!("cannot read schema dir {:?}: {}", dir, e)))?
    {
        let path = entry.path();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if matches!(ext.as_str(), "yaml" | "yml" | "json") {
            paths.push(path);
        }
    }

    // No cross-file ordering guarantee: each file compiles independently
    let compiled = futures::future::join_all(paths.into_iter().map(|path| async move {
        let source = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("<unnamed>")
            .to_string();
        let result = compile_file(&source, &path).await;
        (source, result)
    }))
    .await;

    let mut batch = CompiledBatch::default();
    for (source, result) in compiled {
        match result {
            Ok(schema) => batch.schemas.push(schema),
            Err(error) => {
                warn!(source, %error, "Skipping malformed schema file");
                batch.failures.push(CompileFailure { source, error });
            }
        }
    }
    batch.schemas.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(batch)
}

async fn compile_file(source: &str, path: &Path) -> StoreResult<EntityType> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| validation(source, &format!("cannot read file: {}", e)))?;
    let doc: Value = serde_yaml::from_str(&text)
        .map_err(|e| validation(source, &format!("parse error: {}", e)))?;
    compile_definition(source, &doc)
}

fn compile_key_strategy(source: &str, map: &serde_yaml::Mapping) -> StoreResult<KeyStrategy> {
    let key_fields: Vec<String> = match map.get(Value::from("keyFields")) {
        None => Vec::new(),
        Some(value) => value
            .as_sequence()
            .ok_or_else(|| validation(source, "'keyFields' must be a list"))?
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| validation(source, "'keyFields' entries must be strings"))
            })
            .collect::<StoreResult<_>>()?,
    };

    let Some(strategy) = get_str(map, "keyStrategy") else {
        return Ok(KeyStrategy::Random);
    };

    match strategy {
        "Random" => Ok(KeyStrategy::Random),
        "ValueHash" => Ok(KeyStrategy::ValueHash),
        "Lexical" | "Hash" => {
            if key_fields.is_empty() {
                return Err(validation(
                    source,
                    &format!("keyStrategy '{}' requires a non-empty 'keyFields' list", strategy),
                ));
            }
            if strategy == "Lexical" {
                Ok(KeyStrategy::Lexical(key_fields))
            } else {
                Ok(KeyStrategy::Hash(key_fields))
            }
        }
        other => Err(validation(
            source,
            &format!(
                "unknown keyStrategy '{}': expected Random, Lexical, Hash, or ValueHash",
                other
            ),
        )),
    }
}

fn compile_field(source: &str, field_name: &str, spec: &Value) -> StoreResult<FieldSpec> {
    let map = spec.as_mapping().ok_or_else(|| {
        validation(source, &format!("field '{}' must be a mapping", field_name))
    })?;

    let type_name = get_str(map, "type").ok_or_else(|| {
        validation(source, &format!("field '{}' is missing 'type'", field_name))
    })?;

    let required = match map.get(Value::from("required")) {
        None => false,
        Some(v) => v.as_bool().ok_or_else(|| {
            validation(source, &format!("field '{}': 'required' must be a boolean", field_name))
        })?,
    };

    let field_type = match type_name {
        "enum" => {
            let values = map
                .get(Value::from("values"))
                .and_then(Value::as_sequence)
                .ok_or_else(|| {
                    validation(
                        source,
                        &format!("enum field '{}' requires a 'values' list", field_name),
                    )
                })?;
            let values: Vec<String> = values
                .iter()
                .map(|v| {
                    v.as_str().map(str::to_string).ok_or_else(|| {
                        validation(
                            source,
                            &format!("enum field '{}': values must be strings", field_name),
                        )
                    })
                })
                .collect::<StoreResult<_>>()?;
            if values.is_empty() {
                return Err(validation(
                    source,
                    &format!("enum field '{}' has an empty 'values' list", field_name),
                ));
            }
            FieldType::Enum(values)
        }
        "array" => {
            let items = map.get(Value::from("items")).ok_or_else(|| {
                validation(
                    source,
                    &format!("array field '{}' requires 'items'", field_name),
                )
            })?;
            FieldType::Array(Box::new(compile_item_type(source, field_name, items)?))
        }
        scalar => compile_scalar_type(source, field_name, scalar)?,
    };

    Ok(FieldSpec {
        field_type,
        required,
    })
}

/// Array item types: a single type name, or a list of entity type names
/// which compiles to a tagged union of references.
fn compile_item_type(source: &str, field_name: &str, items: &Value) -> StoreResult<FieldType> {
    match items {
        Value::String(name) => compile_scalar_type(source, field_name, name),
        Value::Sequence(names) => {
            let refs: Vec<String> = names
                .iter()
                .map(|v| {
                    let name = v.as_str().ok_or_else(|| {
                        validation(
                            source,
                            &format!("array field '{}': item type names must be strings", field_name),
                        )
                    })?;
                    if !is_identifier(name) {
                        return Err(validation(
                            source,
                            &format!("array field '{}': invalid item type name '{}'", field_name, name),
                        ));
                    }
                    Ok(name.to_string())
                })
                .collect::<StoreResult<_>>()?;
            if refs.is_empty() {
                return Err(validation(
                    source,
                    &format!("array field '{}' has an empty item type list", field_name),
                ));
            }
            Ok(FieldType::ReferenceUnion(refs))
        }
        _ => Err(validation(
            source,
            &format!("array field '{}': 'items' must be a type name or a list of type names", field_name),
        )),
    }
}

/// Primitive type names map directly; anything else that looks like an
/// identifier is treated as a reference to another entity type. This is the
/// documented "maybe a reference" fallback: a typo in a primitive name
/// compiles to a dangling reference rather than an error.
fn compile_scalar_type(source: &str, field_name: &str, name: &str) -> StoreResult<FieldType> {
    match name {
        "string" => Ok(FieldType::String),
        "integer" => Ok(FieldType::Integer),
        "boolean" => Ok(FieldType::Boolean),
        "datetime" => Ok(FieldType::DateTime),
        other if is_identifier(other) => Ok(FieldType::Reference(other.to_string())),
        other => Err(validation(
            source,
            &format!("field '{}': invalid type name '{}'", field_name, other),
        )),
    }
}

fn get_str<'a>(map: &'a serde_yaml::Mapping, key: &str) -> Option<&'a str> {
    map.get(Value::from(key)).and_then(Value::as_str)
}

fn validation(source: &str, message: &str) -> StoreError {
    StoreError::Validation(format!("{}: {}", source, message))
}
