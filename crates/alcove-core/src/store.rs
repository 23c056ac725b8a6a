//! Storage abstraction trait
//!
//! Both backends (the versioned document store and the embedded
//! single-writer engine) implement [`GraphStore`]; callers depend only on
//! this trait and choose a concrete adapter at construction time.

use crate::error::StoreResult;
use crate::types::{Entity, EntityType, FieldMap, PagedEntities};
use async_trait::async_trait;

/// Hard ceiling on the number of rows any entity query may return
pub const MAX_QUERY_LIMIT: usize = 1000;

/// Clamp a requested page size to [`MAX_QUERY_LIMIT`].
///
/// Every implementation clamps server-side; a caller asking for 5000 rows
/// silently gets at most 1000.
pub fn clamp_limit(limit: usize) -> usize {
    limit.min(MAX_QUERY_LIMIT)
}

/// Unified graph-store contract
///
/// ## Commit messages
///
/// Every mutating call accepts an optional human-readable commit message.
/// When `None`, adapters derive one from the operation (e.g. `"create
/// Person"`). Retaining history per mutation is the backend's concern.
///
/// ## Thread safety
///
/// Implementations must be `Send + Sync`; adapters own their connection and
/// any required serialization internally.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Establish the backend connection and register the compiled schemas.
    ///
    /// Idempotent: safe to call repeatedly, re-registration is a
    /// backward-compatible schema refresh.
    async fn connect(&self, schemas: &[EntityType]) -> StoreResult<()>;

    /// Create an entity of the given type, returning its identifier.
    ///
    /// The identifier is derived from the type's key strategy and is stable
    /// for the lifetime of the entity.
    async fn create_entity(
        &self,
        entity_type: &str,
        data: FieldMap,
        commit_msg: Option<&str>,
    ) -> StoreResult<String>;

    /// Fetch an entity by id; `None` when it does not exist
    async fn get_entity(&self, id: &str) -> StoreResult<Option<Entity>>;

    /// Query entities of a type with optional equality filters and paging.
    ///
    /// `limit` is clamped to [`MAX_QUERY_LIMIT`].
    async fn query_entities(
        &self,
        entity_type: &str,
        filters: Option<&FieldMap>,
        limit: usize,
        offset: usize,
    ) -> StoreResult<PagedEntities>;

    /// Merge `data` into an existing entity (read-modify-write)
    async fn update_entity(
        &self,
        id: &str,
        data: FieldMap,
        commit_msg: Option<&str>,
    ) -> StoreResult<()>;

    /// Delete an entity by id
    async fn delete_entity(&self, id: &str, commit_msg: Option<&str>) -> StoreResult<()>;

    /// Add `to_id` to `from_id`'s named relation.
    ///
    /// Idempotent: a duplicate `(from, relation, to)` triple collapses to
    /// one membership.
    async fn create_relationship(
        &self,
        from_id: &str,
        relation: &str,
        to_id: &str,
    ) -> StoreResult<()>;

    /// Bounded traversal from `start_id` along `relation`.
    ///
    /// `max_depth` must be in `[1, 5]`; out-of-range depth is rejected with
    /// a validation error before any backend call. Results are capped at
    /// 1000 entities.
    async fn traverse_graph(
        &self,
        start_id: &str,
        relation: &str,
        max_depth: u32,
    ) -> StoreResult<Vec<Entity>>;

    /// The compiled entity types registered at `connect`
    fn list_schemas(&self) -> Vec<EntityType>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_limit_caps_at_1000() {
        assert_eq!(clamp_limit(10), 10);
        assert_eq!(clamp_limit(1000), 1000);
        assert_eq!(clamp_limit(5000), 1000);
    }
}
