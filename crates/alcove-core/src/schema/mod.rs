//! Schema compilation: declarative type definitions → compiled entity types
//!
//! Definition files are YAML (or JSON) documents, one entity type per file:
//!
//! ```yaml
//! name: Person
//! description: A person in the vault
//! keyStrategy: Hash
//! keyFields: [email]
//! fields:
//!   email: { type: string, required: true }
//!   employer: { type: Company }
//!   tags: { type: array, items: string }
//! ```
//!
//! Compilation is pure and backend-agnostic; each adapter renders the
//! compiled [`EntityType`](crate::types::EntityType) into its native schema
//! form at connect time.

pub mod compiler;

pub use compiler::{
    compile_definition, compile_directory, is_identifier, CompileFailure, CompiledBatch,
};
