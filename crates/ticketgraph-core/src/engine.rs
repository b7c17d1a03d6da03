//! # Knowledge Engine
//!
//! The engine facade: owns the graph and wires the learning processor, the
//! insight engine and the layout engine around it.
//!
//! ## Concurrency
//!
//! The graph sits behind a fair `parking_lot::RwLock`. Learning and snapshot
//! import take the write lock; everything else takes the read lock, so
//! insight and layout generation run in parallel with each other. Writers
//! are serialized.
//!
//! Every time-dependent operation has an `_at` variant taking the clock
//! value explicitly.

use crate::confidence::DecayPolicy;
use crate::config::EngineConfig;
use crate::formats::{snapshot_checksum, snapshot_from_bytes, snapshot_to_bytes};
use crate::graph::{Graph, GraphStore, GraphView};
use crate::insight::{Insight, InsightEngine};
use crate::layout::{LayoutEngine, LayoutKind, VisualizationGraph};
use crate::learning::{LearnOutcome, LearningProcessor};
use crate::storage::SnapshotStore;
use crate::types::{EngineError, GraphMetadata, LearningData};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// The knowledge graph engine.
///
/// Construct one per tenant graph and share it behind an `Arc`.
#[derive(Debug)]
pub struct KnowledgeEngine {
    graph: RwLock<Graph>,
    config: EngineConfig,
    insights: InsightEngine,
    layouts: LayoutEngine,
}

impl KnowledgeEngine {
    /// Create an engine over an empty graph.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        Self::with_graph(config, Graph::new())
    }

    /// Create an engine over an existing graph.
    pub fn with_graph(config: EngineConfig, graph: Graph) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self::assemble(config, graph))
    }

    fn assemble(config: EngineConfig, graph: Graph) -> Self {
        let decay = DecayPolicy::from(&config.decay);
        Self {
            graph: RwLock::new(graph),
            insights: InsightEngine::new(config.insights.clone(), decay),
            layouts: LayoutEngine::new(config.layout.clone(), decay),
            config,
        }
    }

    /// Create an engine from snapshot bytes.
    pub fn from_snapshot(config: EngineConfig, bytes: &[u8]) -> Result<Self, EngineError> {
        Self::with_graph(config, snapshot_from_bytes(bytes)?)
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // =========================================================================
    // LEARNING
    // =========================================================================

    /// Learn one resolved ticket, stamped with the current time.
    pub fn learn_from_ticket(&self, data: &LearningData) -> Result<LearnOutcome, EngineError> {
        self.learn_from_ticket_at(data, Utc::now())
    }

    pub fn learn_from_ticket_at(
        &self,
        data: &LearningData,
        now: DateTime<Utc>,
    ) -> Result<LearnOutcome, EngineError> {
        let mut graph = self.graph.write();
        LearningProcessor::learn(&mut graph, data, now)
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// Mine the current graph for insights, ranked.
    #[must_use]
    pub fn generate_insights(&self) -> Vec<Insight> {
        self.generate_insights_at(Utc::now())
    }

    #[must_use]
    pub fn generate_insights_at(&self, now: DateTime<Utc>) -> Vec<Insight> {
        let graph = self.graph.read();
        self.insights.generate(&graph, now)
    }

    /// Lay out the current graph with the named strategy
    /// (case-insensitive).
    pub fn generate_visualization(&self, layout: &str) -> Result<VisualizationGraph, EngineError> {
        let kind: LayoutKind = layout.parse()?;
        Ok(self.generate_visualization_at(kind, Utc::now()))
    }

    #[must_use]
    pub fn generate_visualization_at(
        &self,
        kind: LayoutKind,
        now: DateTime<Utc>,
    ) -> VisualizationGraph {
        let graph = self.graph.read();
        self.layouts.generate(&graph, kind, now)
    }

    /// Owned copy of the graph.
    #[must_use]
    pub fn get_graph(&self) -> GraphView {
        self.graph.read().view()
    }

    #[must_use]
    pub fn snapshot_metadata(&self) -> GraphMetadata {
        self.graph.read().metadata()
    }

    // =========================================================================
    // SNAPSHOTS
    // =========================================================================

    /// Encode the whole graph.
    pub fn export_snapshot(&self) -> Result<Vec<u8>, EngineError> {
        let bytes = snapshot_to_bytes(&self.graph.read())?;
        tracing::info!(size = bytes.len(), "snapshot exported");
        Ok(bytes)
    }

    /// Replace the graph with a decoded snapshot.
    ///
    /// Decoding and verification happen before the write lock is taken; on
    /// any error the current graph is left untouched.
    pub fn import_snapshot(&self, bytes: &[u8]) -> Result<GraphMetadata, EngineError> {
        let restored = match snapshot_from_bytes(bytes) {
            Ok(graph) => graph,
            Err(err) => {
                tracing::warn!(error = %err, "snapshot rejected");
                return Err(err);
            }
        };
        let metadata = restored.metadata();
        *self.graph.write() = restored;
        tracing::info!(
            nodes = metadata.node_count,
            edges = metadata.edge_count,
            "snapshot imported"
        );
        Ok(metadata)
    }

    /// BLAKE3 checksum (hex) of the canonical snapshot payload.
    pub fn snapshot_checksum(&self) -> Result<String, EngineError> {
        snapshot_checksum(&self.graph.read())
    }

    /// Export into `store` under `key`. Returns the snapshot size in bytes.
    pub fn save_snapshot(
        &self,
        store: &(impl SnapshotStore + ?Sized),
        key: &str,
    ) -> Result<usize, EngineError> {
        let bytes = self.export_snapshot()?;
        store.save(key, &bytes)?;
        Ok(bytes.len())
    }

    /// Import the snapshot stored under `key`, if there is one.
    pub fn restore_snapshot(
        &self,
        store: &(impl SnapshotStore + ?Sized),
        key: &str,
    ) -> Result<Option<GraphMetadata>, EngineError> {
        match store.load(key)? {
            Some(bytes) => self.import_snapshot(&bytes).map(Some),
            None => {
                tracing::debug!(key, "no stored snapshot");
                Ok(None)
            }
        }
    }
}

impl Default for KnowledgeEngine {
    fn default() -> Self {
        Self::assemble(EngineConfig::default(), Graph::new())
    }
}

// =============================================================================
// TESTS
// =============================================================================
