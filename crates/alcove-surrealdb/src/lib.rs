//! Versioned document-graph backend for Alcove
//!
//! Persists typed entities as SurrealDB documents with per-mutation commit
//! messages, typed field definitions over schemaless tables, and graph
//! edges mirrored from each document's relationship membership. Traversal
//! runs server-side where the backend supports it and falls back to the
//! shared breadth-first search when it does not.

#![warn(clippy::all)]

pub mod adapter;
pub mod client;

pub use adapter::SurrealVaultStore;
pub use client::{SurrealConfig, SurrealSession};
