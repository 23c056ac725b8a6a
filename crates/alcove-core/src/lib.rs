//! # Alcove Core
//!
//! Backend-agnostic foundation of the Alcove knowledge-graph storage layer:
//!
//! - [`schema`]: declarative type definitions → compiled entity types
//! - [`store`]: the [`GraphStore`] contract both backends implement
//! - [`traversal`]: bounded, cycle-safe breadth-first graph search
//! - [`retry`]: reusable fixed-schedule retry policy
//! - [`extraction`]: the language-model extraction seam and its mock
//!
//! Concrete adapters live in `alcove-surrealdb` (versioned document store)
//! and `alcove-sqlite` (embedded single-writer engine); callers pick one at
//! construction time and depend only on the trait.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod extraction;
pub mod retry;
pub mod schema;
pub mod store;
pub mod traversal;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use extraction::{
    Extraction, ExtractionError, ExtractionProvider, ExtractedEdge, ExtractedNode,
    MockExtractionProvider,
};
pub use retry::RetryPolicy;
pub use schema::{compile_definition, compile_directory, CompileFailure, CompiledBatch};
pub use store::{clamp_limit, GraphStore, MAX_QUERY_LIMIT};
pub use traversal::{bounded_bfs, validate_depth, NeighborSource, MAX_DEPTH};
pub use types::{
    Entity, EntityType, Episode, EpisodeOutcome, Fact, FieldMap, FieldSpec, FieldType,
    KeyStrategy, PagedEntities,
};
