//! Entity/relationship extraction seam
//!
//! The language-model client is an external collaborator; this module
//! defines only the trait the ingestion pipeline calls, the extracted
//! payload types, and a mock provider for tests. The mock records call
//! entry/exit timestamps so tests can assert that concurrent ingestions
//! never overlap on the backend.

use crate::error::StoreError;
use crate::types::{EntityType, Episode};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

/// Extraction failure from the language-model provider
#[derive(Debug, Clone, thiserror::Error)]
#[error("extraction failed: {0}")]
pub struct ExtractionError(pub String);

impl From<ExtractionError> for StoreError {
    fn from(err: ExtractionError) -> Self {
        StoreError::Ingestion(err.0)
    }
}

/// An entity proposed by the extractor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedNode {
    /// Entity name as it appeared in the text
    pub name: String,
    /// Entity type name, ideally one of the compiled types passed as guidance
    pub entity_type: String,
    /// Short summary of what the text says about the entity
    pub summary: Option<String>,
}

/// A relationship proposed by the extractor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedEdge {
    /// Source entity name
    pub source: String,
    /// Target entity name
    pub target: String,
    /// Relation name
    pub relation: String,
    /// The statement supporting this edge
    pub fact: String,
    /// Start of the validity interval, if stated
    pub valid_at: Option<DateTime<Utc>>,
    /// End of the validity interval, if stated
    pub invalid_at: Option<DateTime<Utc>>,
}

/// Everything extracted from one episode
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Proposed entities
    pub nodes: Vec<ExtractedNode>,
    /// Proposed relationships
    pub edges: Vec<ExtractedEdge>,
}

/// Opaque extraction provider (the language-model client boundary)
#[async_trait]
pub trait ExtractionProvider: Send + Sync {
    /// Extract entities and edges from an episode, guided by the compiled
    /// entity types of the vault.
    async fn extract(
        &self,
        episode: &Episode,
        entity_types: &[EntityType],
    ) -> Result<Extraction, ExtractionError>;
}

/// Record of one mock extraction call
#[derive(Debug, Clone)]
pub struct ExtractionCall {
    /// Episode name the call was made for
    pub episode: String,
    /// When the provider was entered
    pub started: Instant,
    /// When the provider returned
    pub finished: Instant,
}

/// Deterministic extraction provider for tests.
///
/// Responses are keyed by episode name; unscripted episodes get an empty
/// extraction. Failures can be scripted as a queue consumed before any
/// success, and an artificial latency can be configured so overlap tests
/// have a measurable backend span.
#[derive(Default)]
pub struct MockExtractionProvider {
    responses: Mutex<HashMap<String, Extraction>>,
    scripted_failures: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<ExtractionCall>>,
    latency: Option<Duration>,
}

impl MockExtractionProvider {
    /// Create a mock with no scripted responses
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock that holds each call open for `latency`
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Script the extraction returned for an episode name
    pub fn set_response(&self, episode_name: &str, extraction: Extraction) {
        self.responses
            .lock()
            .insert(episode_name.to_string(), extraction);
    }

    /// Script failures; each queued message fails one call before any
    /// success is considered
    pub fn push_failure(&self, message: &str) {
        self.scripted_failures
            .lock()
            .push_back(message.to_string());
    }

    /// Script `count` consecutive failures with the same message
    pub fn push_failures(&self, message: &str, count: usize) {
        let mut failures = self.scripted_failures.lock();
        for _ in 0..count {
            failures.push_back(message.to_string());
        }
    }

    /// All recorded calls, in completion order
    pub fn calls(&self) -> Vec<ExtractionCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ExtractionProvider for MockExtractionProvider {
    async fn extract(
        &self,
        episode: &Episode,
        _entity_types: &[EntityType],
    ) -> Result<Extraction, ExtractionError> {
        let started = Instant::now();
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let scripted_failure = self.scripted_failures.lock().pop_front();
        let result = match scripted_failure {
            Some(message) => Err(ExtractionError(message)),
            None => Ok(self
                .responses
                .lock()
                .get(&episode.name)
                .cloned()
                .unwrap_or_default()),
        };

        self.calls.lock().push(ExtractionCall {
            episode: episode.name.clone(),
            started,
            finished: Instant::now(),
        });
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn episode(name: &str) -> Episode {
        Episode {
            name: name.to_string(),
            body: "body".to_string(),
            source_description: "test".to_string(),
            reference_time: Utc::now(),
        }
    }

    #[tokio::test]
    async fn unscripted_episode_extracts_nothing() {
        let mock = MockExtractionProvider::new();
        let result = mock.extract(&episode("e1"), &[]).await.unwrap();
        assert!(result.nodes.is_empty());
        assert!(result.edges.is_empty());
        assert_eq!(mock.calls().len(), 1);
    }

    #[tokio::test]
    async fn scripted_failures_run_out_before_success() {
        let mock = MockExtractionProvider::new();
        mock.push_failures("rate limited", 2);
        mock.set_response(
            "e1",
            Extraction {
                nodes: vec![ExtractedNode {
                    name: "Ada".to_string(),
                    entity_type: "Person".to_string(),
                    summary: None,
                }],
                edges: vec![],
            },
        );

        assert!(mock.extract(&episode("e1"), &[]).await.is_err());
        assert!(mock.extract(&episode("e1"), &[]).await.is_err());
        let ok = mock.extract(&episode("e1"), &[]).await.unwrap();
        assert_eq!(ok.nodes[0].name, "Ada");
    }
}
