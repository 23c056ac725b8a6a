//! Embedded single-writer storage backend for Alcove
//!
//! Stores typed entities in per-type node tables rendered from the compiled
//! schemas, extracted knowledge in shared `kg_nodes`/`facts` tables, and
//! serializes every mutation on one async write gate — the embedded engine
//! supports exactly one writer per database.
//!
//! The adapter implements the [`GraphStore`](alcove_core::GraphStore)
//! contract plus the embedded extension surface: episode ingestion through
//! a language-model extractor, fact search, a raw query escape hatch, and
//! idempotent DDL primitives for registering additional node/edge tables.

#![warn(clippy::all)]

pub mod adapter;
pub mod connection;
pub mod error;
pub mod ingest;
pub mod schema;

pub use adapter::{EmbeddedVaultStore, DEFAULT_SEARCH_LIMIT};
pub use connection::EmbeddedConnection;
pub use error::{EmbeddedError, EmbeddedResult};
pub use schema::Column;
