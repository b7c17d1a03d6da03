//! # Snapshot Format
//!
//! Canonical, versioned binary encoding of a whole graph.
//!
//! File I/O and the redb-backed store live elsewhere; this module only turns
//! a [`Graph`] into bytes and back.
//!
//! Format: Header (5 bytes) + postcard-serialized [`CanonicalSnapshot`].
//! - 4 bytes: Magic ("TKGS")
//! - 1 byte: Version
//!
//! The canonical form sorts nodes, edges and processed tickets by key and
//! stores timestamps as Unix milliseconds, so `export -> import -> export`
//! is byte-identical.
//!
//! ## Limits
//!
//! The payload size is checked before decoding. After decoding, the embedded
//! counters, every identifier and every edge endpoint are verified before a
//! graph is handed back.

use crate::graph::{Graph, GraphStore};
use crate::primitives::{self, MAX_OBSERVATIONS};
use crate::types::{
    Edge, EdgeId, EngineError, EntityKind, GraphMetadata, Node, NodeId, RelationKind,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Maximum accepted snapshot size, checked before decoding.
pub const MAX_SNAPSHOT_SIZE: usize = 500 * 1024 * 1024; // 500 MB

const HEADER_SIZE: usize = 5;

// =============================================================================
// HEADER
// =============================================================================

/// The header preceding every snapshot payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl SnapshotHeader {
    /// Header for the current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(EngineError::Serialization("invalid magic bytes".to_string()));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(EngineError::Serialization(format!(
                "unsupported version: {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EngineError> {
        if bytes.len() < HEADER_SIZE {
            return Err(EngineError::Serialization("header too short".to_string()));
        }
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        Ok(Self {
            magic,
            version: bytes[4],
        })
    }
}

impl Default for SnapshotHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// CANONICAL FORM
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalNode {
    pub id: u64,
    pub kind: EntityKind,
    pub label: String,
    pub normalized_label: String,
    pub weight: f64,
    pub occurrences: u64,
    pub first_seen: i64,
    pub last_seen: i64,
    pub observations: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEdge {
    pub id: u64,
    pub source: u64,
    pub target: u64,
    pub relation: RelationKind,
    pub weight: f64,
    pub occurrences: u64,
    pub first_seen: i64,
    pub last_seen: i64,
}

/// A graph in canonical, sorted form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalSnapshot {
    /// Sorted by id.
    pub nodes: Vec<CanonicalNode>,
    /// Sorted by id.
    pub edges: Vec<CanonicalEdge>,
    /// Sorted lexicographically.
    pub processed_tickets: Vec<String>,
    pub node_count: u64,
    pub edge_count: u64,
    pub total_learning_events: u64,
    pub last_updated: Option<i64>,
}

fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, EngineError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| EngineError::Serialization(format!("timestamp {} out of range", ms)))
}

fn finite_weight(weight: f64, what: &str) -> Result<f64, EngineError> {
    if weight.is_finite() && weight >= 0.0 {
        Ok(weight)
    } else {
        Err(EngineError::Serialization(format!(
            "{} has an invalid weight",
            what
        )))
    }
}

impl CanonicalSnapshot {
    /// Capture `graph` in canonical order.
    #[must_use]
    pub fn from_graph(graph: &Graph) -> Self {
        let metadata = graph.metadata();
        Self {
            nodes: graph
                .nodes()
                .map(|node| CanonicalNode {
                    id: node.id.0,
                    kind: node.kind,
                    label: node.label.clone(),
                    normalized_label: node.normalized_label.clone(),
                    weight: node.weight,
                    occurrences: node.occurrences,
                    first_seen: millis(node.first_seen),
                    last_seen: millis(node.last_seen),
                    observations: node.observations.iter().copied().map(millis).collect(),
                })
                .collect(),
            edges: graph
                .edges()
                .map(|edge| CanonicalEdge {
                    id: edge.id.0,
                    source: edge.source.0,
                    target: edge.target.0,
                    relation: edge.relation,
                    weight: edge.weight,
                    occurrences: edge.occurrences,
                    first_seen: millis(edge.first_seen),
                    last_seen: millis(edge.last_seen),
                })
                .collect(),
            processed_tickets: graph.processed_tickets().map(str::to_string).collect(),
            node_count: metadata.node_count as u64,
            edge_count: metadata.edge_count as u64,
            total_learning_events: metadata.total_learning_events,
            last_updated: metadata.last_updated.map(millis),
        }
    }

    /// Rebuild and verify the graph.
    pub fn into_graph(self) -> Result<Graph, EngineError> {
        if self.node_count != self.nodes.len() as u64 || self.edge_count != self.edges.len() as u64
        {
            return Err(EngineError::Serialization(format!(
                "snapshot counts ({} nodes, {} edges) do not match its contents ({} nodes, {} edges)",
                self.node_count,
                self.edge_count,
                self.nodes.len(),
                self.edges.len()
            )));
        }

        let nodes = self
            .nodes
            .into_iter()
            .map(|cn| {
                let id = NodeId(cn.id);
                if cn.observations.len() > MAX_OBSERVATIONS {
                    return Err(EngineError::Serialization(format!(
                        "node {} has too many observations",
                        id
                    )));
                }
                Ok(Node {
                    id,
                    kind: cn.kind,
                    label: cn.label,
                    normalized_label: cn.normalized_label,
                    weight: finite_weight(cn.weight, "node")?,
                    occurrences: cn.occurrences,
                    first_seen: from_millis(cn.first_seen)?,
                    last_seen: from_millis(cn.last_seen)?,
                    observations: cn
                        .observations
                        .into_iter()
                        .map(from_millis)
                        .collect::<Result<_, _>>()?,
                })
            })
            .collect::<Result<Vec<_>, EngineError>>()?;

        let edges = self
            .edges
            .into_iter()
            .map(|ce| {
                Ok(Edge {
                    id: EdgeId(ce.id),
                    source: NodeId(ce.source),
                    target: NodeId(ce.target),
                    relation: ce.relation,
                    weight: finite_weight(ce.weight, "edge")?,
                    occurrences: ce.occurrences,
                    first_seen: from_millis(ce.first_seen)?,
                    last_seen: from_millis(ce.last_seen)?,
                })
            })
            .collect::<Result<Vec<_>, EngineError>>()?;

        let processed: BTreeSet<String> = self.processed_tickets.into_iter().collect();
        let metadata = GraphMetadata {
            node_count: nodes.len(),
            edge_count: edges.len(),
            last_updated: self.last_updated.map(from_millis).transpose()?,
            total_learning_events: self.total_learning_events,
        };
        Graph::from_parts(nodes, edges, processed, metadata)
    }

    fn to_payload(&self) -> Result<Vec<u8>, EngineError> {
        postcard::to_stdvec(self).map_err(|e| EngineError::Serialization(e.to_string()))
    }
}

// =============================================================================
// SERIALIZATION FUNCTIONS
// =============================================================================

/// Serialize a graph to snapshot bytes (header + payload).
pub fn snapshot_to_bytes(graph: &Graph) -> Result<Vec<u8>, EngineError> {
    let payload = CanonicalSnapshot::from_graph(graph).to_payload()?;
    let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
    bytes.extend_from_slice(&SnapshotHeader::new().to_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Deserialize a graph from snapshot bytes.
///
/// Size and header are validated before the payload is decoded.
pub fn snapshot_from_bytes(bytes: &[u8]) -> Result<Graph, EngineError> {
    if bytes.len() < HEADER_SIZE {
        return Err(EngineError::Serialization(format!(
            "data too short: minimum {} bytes required",
            HEADER_SIZE
        )));
    }
    if bytes.len() > MAX_SNAPSHOT_SIZE {
        return Err(EngineError::Serialization(format!(
            "data size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_SNAPSHOT_SIZE
        )));
    }

    SnapshotHeader::from_bytes(bytes)?.validate()?;

    let snapshot: CanonicalSnapshot = postcard::from_bytes(&bytes[HEADER_SIZE..])
        .map_err(|e| EngineError::Serialization(format!("failed to decode snapshot: {}", e)))?;
    snapshot.into_graph()
}

/// BLAKE3 digest (hex) of the canonical payload.
pub fn snapshot_checksum(graph: &Graph) -> Result<String, EngineError> {
    let payload = CanonicalSnapshot::from_graph(graph).to_payload()?;
    Ok(blake3::hash(&payload).to_hex().to_string())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learning::LearningProcessor;
    use crate::types::LearningData;
    use chrono::TimeZone;

    fn sample_graph() -> Graph {
        let at = Utc
            .with_ymd_and_hms(2026, 7, 4, 16, 30, 0)
            .single()
            .expect("valid timestamp");
        let mut graph = Graph::new();
        let data = LearningData::new("T1")
            .with_entity(EntityKind::Symptom, "disk full", 0.9)
            .with_entity(EntityKind::Resolution, "clear temp files", 0.9)
            .with_relation(
                (EntityKind::Symptom, "disk full"),
                RelationKind::ResolvedBy,
                (EntityKind::Resolution, "clear temp files"),
                0.8,
            );
        LearningProcessor::learn(&mut graph, &data, at).expect("learn");
        graph
    }

    #[test]
    fn header_roundtrip() {
        let bytes = SnapshotHeader::new().to_bytes();
        let restored = SnapshotHeader::from_bytes(&bytes).expect("parse header");
        assert_eq!(&restored.magic, primitives::MAGIC_BYTES);
        assert_eq!(restored.version, primitives::FORMAT_VERSION);
    }

    #[test]
    fn bytes_roundtrip_bit_exact() {
        let graph = sample_graph();
        let first = snapshot_to_bytes(&graph).expect("serialize");
        let restored = snapshot_from_bytes(&first).expect("deserialize");
        let second = snapshot_to_bytes(&restored).expect("reserialize");

        assert_eq!(first, second, "save -> load -> save must produce identical bytes");
        assert_eq!(restored, graph);
        assert!(restored.is_processed("T1"));
    }

    #[test]
    fn invalid_magic_rejected() {
        let mut bytes = snapshot_to_bytes(&sample_graph()).expect("serialize");
        bytes[0..4].copy_from_slice(b"XXXX");
        assert!(matches!(
            snapshot_from_bytes(&bytes),
            Err(EngineError::Serialization(_))
        ));
    }

    #[test]
    fn future_version_rejected() {
        let mut bytes = snapshot_to_bytes(&sample_graph()).expect("serialize");
        bytes[4] = primitives::FORMAT_VERSION + 1;
        let err = snapshot_from_bytes(&bytes).expect_err("must reject");
        assert!(err.to_string().contains("unsupported version"));
    }

    #[test]
    fn truncated_payload_rejected() {
        let bytes = snapshot_to_bytes(&sample_graph()).expect("serialize");
        assert!(snapshot_from_bytes(&bytes[..bytes.len() / 2]).is_err());
        assert!(snapshot_from_bytes(&bytes[..3]).is_err());
    }

    #[test]
    fn mismatched_counts_rejected() {
        let mut snapshot = CanonicalSnapshot::from_graph(&sample_graph());
        snapshot.edge_count += 1;
        assert!(matches!(
            snapshot.into_graph(),
            Err(EngineError::Serialization(_))
        ));
    }

    #[test]
    fn dangling_endpoint_rejected() {
        let mut snapshot = CanonicalSnapshot::from_graph(&sample_graph());
        snapshot.nodes.retain(|node| node.kind != EntityKind::Resolution);
        snapshot.node_count -= 1;
        assert!(snapshot.into_graph().is_err());
    }

    #[test]
    fn label_must_normalize_to_stored_identity() {
        let mut snapshot = CanonicalSnapshot::from_graph(&sample_graph());
        let node = snapshot
            .nodes
            .iter_mut()
            .find(|node| node.kind == EntityKind::Symptom)
            .expect("symptom");
        node.label = "Disk  FULL".to_string();
        assert!(snapshot.clone().into_graph().is_ok());

        let node = snapshot
            .nodes
            .iter_mut()
            .find(|node| node.kind == EntityKind::Symptom)
            .expect("symptom");
        node.label = "printer jam".to_string();
        let err = snapshot.into_graph().expect_err("must reject");
        assert!(matches!(err, EngineError::Serialization(_)));
        assert!(err.to_string().contains("normalized label"));
    }

    #[test]
    fn unordered_observations_rejected() {
        let mut snapshot = CanonicalSnapshot::from_graph(&sample_graph());
        let node = snapshot.nodes.first_mut().expect("node");
        let latest = node.observations[0];
        node.observations.push(latest - 60_000);

        let err = snapshot.into_graph().expect_err("must reject");
        assert!(err.to_string().contains("unordered observations"));
    }

    #[test]
    fn checksum_tracks_content() {
        let graph = sample_graph();
        let a = snapshot_checksum(&graph).expect("checksum");
        let b = snapshot_checksum(&graph).expect("checksum");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, snapshot_checksum(&Graph::new()).expect("checksum"));
    }
}
