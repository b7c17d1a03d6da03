//! # ticketgraph-core
//!
//! The Knowledge Graph Engine for ticketgraph - THE LOGIC.
//!
//! An in-memory graph built incrementally from resolved support tickets,
//! used to accumulate entities and relations with confidence over time, mine
//! the accumulated graph for insights, and lay it out for visualization.
//!
//! ## Components (leaves first)
//!
//! - `graph`: the Graph Store (identity, merge rules, counters, transactions)
//! - `learning`: the Learning Processor (validation, dedupe, atomic apply)
//! - `insight`: the Insight Engine (co-occurrence, trend, resolution path, anomaly)
//! - `layout`: the Layout Engine (force, hierarchical, circular, grid)
//! - `engine`: the `KnowledgeEngine` facade sharing one graph between them
//!
//! ## Architectural Constraints
//!
//! - Tenant-agnostic: operates on whatever graph instance it is given
//! - Deterministic: `BTreeMap` ordering, content-derived ids, seeded layout
//! - Has NO async, NO network dependencies (pure Rust)

// =============================================================================
// MODULES
// =============================================================================

pub mod confidence;
pub mod config;
pub mod engine;
pub mod formats;
pub mod graph;
pub mod insight;
pub mod layout;
pub mod learning;
pub mod primitives;
pub mod storage;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    Edge, EdgeId, EngineError, EntityKind, ExtractedEntity, ExtractedRelation, GraphMetadata,
    LearningData, Node, NodeId, RelationKind, canonical_label, normalize_label,
};

// =============================================================================
// RE-EXPORTS: Engine Components
// =============================================================================

pub use confidence::{DecayPolicy, Weighted, clamp_confidence, decay_factor, effective_weight};
pub use config::{DecayConfig, EngineConfig, InsightConfig, LayoutConfig};
pub use engine::KnowledgeEngine;
pub use graph::{Graph, GraphStore, GraphTransaction, GraphView};
pub use insight::{Insight, InsightEngine, InsightKind, rank_insights};
pub use layout::{LayoutEngine, LayoutKind, VisualEdge, VisualNode, VisualizationGraph};
pub use learning::{LearnOutcome, LearnStatus, LearningPlan, LearningProcessor};

// =============================================================================
// RE-EXPORTS: Formats & Storage
// =============================================================================

pub use formats::{
    CanonicalSnapshot, MAX_SNAPSHOT_SIZE, SnapshotHeader, snapshot_checksum, snapshot_from_bytes,
    snapshot_to_bytes,
};
pub use storage::{MemorySnapshotStore, RedbSnapshotStore, SnapshotStore};
