//! Bounded breadth-first traversal
//!
//! This is the client-side fallback used when a backend has no server-side
//! recursive path primitive (or reports it as unsupported). It is
//! deterministic, cycle-safe, and resource-bounded regardless of graph
//! shape: a cyclic graph terminates because of the visited set, and a
//! wide or deep graph terminates because of the queue and result ceilings.

use crate::error::{StoreError, StoreResult};
use crate::types::Entity;
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use tracing::warn;

/// Hard ceiling on pending queue entries per traversal call
pub const MAX_QUEUE: usize = 10_000;

/// Hard ceiling on entities returned per traversal call
pub const MAX_RESULTS: usize = 1_000;

/// Maximum permitted traversal depth
pub const MAX_DEPTH: u32 = 5;

/// Node access seam the traversal engine runs against.
///
/// Adapters implement this with their `get_entity`; tests implement it with
/// an in-memory map.
#[async_trait]
pub trait NeighborSource: Send + Sync {
    /// Fetch a node by id; `None` when it does not exist
    async fn fetch(&self, id: &str) -> StoreResult<Option<Entity>>;
}

/// Reject traversal depths outside `[1, MAX_DEPTH]` before any backend call
pub fn validate_depth(max_depth: u32) -> StoreResult<()> {
    if max_depth < 1 || max_depth > MAX_DEPTH {
        return Err(StoreError::Validation(format!(
            "max_depth must be between 1 and {}, got {}",
            MAX_DEPTH, max_depth
        )));
    }
    Ok(())
}

/// Breadth-first traversal from `start` along `relation`, visiting each node
/// at most once and honoring the queue/result ceilings.
///
/// Truncation at a ceiling is not an error: the partial result is returned
/// and a warning is logged.
pub async fn bounded_bfs<S: NeighborSource + ?Sized>(
    source: &S,
    start: &str,
    relation: &str,
    max_depth: u32,
) -> StoreResult<Vec<Entity>> {
    validate_depth(max_depth)?;

    let mut queue: VecDeque<(String, u32)> = VecDeque::new();
    queue.push_back((start.to_string(), 0));
    let mut visited: HashSet<String> = HashSet::new();
    let mut results: Vec<Entity> = Vec::new();

    loop {
        if queue.len() > MAX_QUEUE {
            warn!(
                start,
                relation,
                queued = queue.len(),
                "Traversal queue ceiling hit, returning partial result"
            );
            break;
        }
        if results.len() >= MAX_RESULTS {
            warn!(
                start,
                relation,
                results = results.len(),
                "Traversal result ceiling hit, returning partial result"
            );
            break;
        }
        let Some((id, depth)) = queue.pop_front() else {
            break;
        };
        if depth > max_depth {
            continue;
        }
        if !visited.insert(id.clone()) {
            continue;
        }
        let Some(entity) = source.fetch(&id).await? else {
            continue;
        };
        if depth < max_depth {
            if let Some(targets) = entity.related(relation) {
                for target in targets {
                    if !visited.contains(target) {
                        queue.push_back((target.clone(), depth + 1));
                    }
                }
            }
        }
        results.push(entity);
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap};

    /// In-memory graph for exercising the engine without a backend
    struct MapSource {
        nodes: HashMap<String, Entity>,
        fetches: std::sync::Mutex<Vec<String>>,
    }

    impl MapSource {
        fn new() -> Self {
            Self {
                nodes: HashMap::new(),
                fetches: std::sync::Mutex::new(Vec::new()),
            }
        }

        fn add(&mut self, id: &str, edges: &[(&str, &[&str])]) {
            let mut relationships = BTreeMap::new();
            for (rel, targets) in edges {
                relationships.insert(
                    rel.to_string(),
                    targets.iter().map(|t| t.to_string()).collect(),
                );
            }
            self.nodes.insert(
                id.to_string(),
                Entity {
                    id: id.to_string(),
                    entity_type: "Node".to_string(),
                    fields: serde_json::Map::new(),
                    relationships,
                },
            );
        }

        fn fetch_count(&self, id: &str) -> usize {
            self.fetches.lock().unwrap().iter().filter(|f| *f == id).count()
        }
    }

    #[async_trait]
    impl NeighborSource for MapSource {
        async fn fetch(&self, id: &str) -> StoreResult<Option<Entity>> {
            self.fetches.lock().unwrap().push(id.to_string());
            Ok(self.nodes.get(id).cloned())
        }
    }

    fn ids(entities: &[Entity]) -> Vec<&str> {
        entities.iter().map(|e| e.id.as_str()).collect()
    }

    #[tokio::test]
    async fn depth_bounds_are_enforced() {
        let source = MapSource::new();
        assert!(bounded_bfs(&source, "a", "knows", 0).await.is_err());
        assert!(bounded_bfs(&source, "a", "knows", 6).await.is_err());
        assert!(bounded_bfs(&source, "a", "knows", 1).await.is_ok());
        assert!(bounded_bfs(&source, "a", "knows", 5).await.is_ok());
    }

    #[tokio::test]
    async fn chain_respects_depth() {
        let mut source = MapSource::new();
        source.add("p1", &[("knows", &["p2"])]);
        source.add("p2", &[("knows", &["p3"])]);
        source.add("p3", &[]);

        let one = bounded_bfs(&source, "p1", "knows", 1).await.unwrap();
        assert_eq!(ids(&one), vec!["p1", "p2"]);

        let two = bounded_bfs(&source, "p1", "knows", 2).await.unwrap();
        assert_eq!(ids(&two), vec!["p1", "p2", "p3"]);
    }

    #[tokio::test]
    async fn cycle_terminates_with_single_visits() {
        let mut source = MapSource::new();
        source.add("a", &[("knows", &["b"])]);
        source.add("b", &[("knows", &["a"])]);

        let result = bounded_bfs(&source, "a", "knows", 5).await.unwrap();
        assert_eq!(ids(&result), vec!["a", "b"]);
        assert_eq!(source.fetch_count("a"), 1);
        assert_eq!(source.fetch_count("b"), 1);
    }

    #[tokio::test]
    async fn missing_nodes_are_skipped() {
        let mut source = MapSource::new();
        source.add("a", &[("knows", &["ghost", "b"])]);
        source.add("b", &[]);

        let result = bounded_bfs(&source, "a", "knows", 2).await.unwrap();
        assert_eq!(ids(&result), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn unrelated_relation_stays_at_start() {
        let mut source = MapSource::new();
        source.add("a", &[("knows", &["b"])]);
        source.add("b", &[]);

        let result = bounded_bfs(&source, "a", "likes", 3).await.unwrap();
        assert_eq!(ids(&result), vec!["a"]);
    }

    #[tokio::test]
    async fn result_ceiling_caps_wide_graph() {
        let mut source = MapSource::new();
        let children: Vec<String> = (0..1500).map(|i| format!("c{}", i)).collect();
        let child_refs: Vec<&str> = children.iter().map(String::as_str).collect();
        source.add("root", &[("knows", &child_refs)]);
        for child in &children {
            let id = child.clone();
            source.add(&id, &[]);
        }

        let result = bounded_bfs(&source, "root", "knows", 1).await.unwrap();
        assert_eq!(result.len(), MAX_RESULTS);
    }

    #[tokio::test]
    async fn queue_ceiling_stops_explosion() {
        let mut source = MapSource::new();
        let children: Vec<String> = (0..20_000).map(|i| format!("c{}", i)).collect();
        let child_refs: Vec<&str> = children.iter().map(String::as_str).collect();
        source.add("root", &[("knows", &child_refs)]);

        // After expanding the root the queue holds 20k entries, which trips
        // the ceiling before any child is visited.
        let result = bounded_bfs(&source, "root", "knows", 3).await.unwrap();
        assert_eq!(ids(&result), vec!["root"]);
    }
}
