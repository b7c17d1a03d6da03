//! # Core Type Definitions
//!
//! This module contains the core types of the knowledge graph:
//! - Identifiers (`NodeId`, `EdgeId`) derived deterministically from content
//! - The fixed vocabularies (`EntityKind`, `RelationKind`)
//! - Stored records (`Node`, `Edge`) and the `GraphMetadata` counters
//! - The error taxonomy (`EngineError`)
//!
//! ## Identity
//!
//! Identifiers are the first 8 bytes of a BLAKE3 digest, so the same
//! `(type, normalized label)` always maps to the same node across processes
//! and snapshot restores.

pub mod learning;

pub use learning::{ExtractedEntity, ExtractedRelation, LearningData};

use crate::primitives::MAX_OBSERVATIONS;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Hash the given parts (NUL separated) and keep the first 8 bytes.
pub(crate) fn digest_prefix(parts: &[&[u8]]) -> u64 {
    let mut hasher = blake3::Hasher::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(&[0]);
        }
        hasher.update(part);
    }
    let hash = hasher.finalize();
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(prefix)
}

/// Display, parsing and serde for the 64-bit identifiers.
///
/// Human-readable formats (JSON) carry ids as 16 hex digits so they survive
/// JavaScript number precision; binary formats carry the raw `u64`.
macro_rules! hex_identifier {
    ($ty:ident) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:016x}", self.0)
            }
        }

        impl std::str::FromStr for $ty {
            type Err = EngineError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                u64::from_str_radix(s.trim(), 16)
                    .map(Self)
                    .map_err(|_| EngineError::InvalidArgument(format!("invalid identifier '{}'", s)))
            }
        }

        impl Serialize for $ty {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                if serializer.is_human_readable() {
                    serializer.collect_str(self)
                } else {
                    serializer.serialize_u64(self.0)
                }
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                if deserializer.is_human_readable() {
                    let text = String::deserialize(deserializer)?;
                    text.parse().map_err(serde::de::Error::custom)
                } else {
                    u64::deserialize(deserializer).map(Self)
                }
            }
        }
    };
}

/// Identifier of a node, derived from `(kind, normalized label)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u64);

hex_identifier!(NodeId);

impl NodeId {
    /// Derive the identifier for an entity.
    ///
    /// `normalized_label` must already be normalized with [`normalize_label`].
    #[must_use]
    pub fn derive(kind: EntityKind, normalized_label: &str) -> Self {
        Self(digest_prefix(&[
            b"node",
            kind.as_str().as_bytes(),
            normalized_label.as_bytes(),
        ]))
    }
}

/// Identifier of an edge, derived from `(source, target, relation)`.
///
/// Symmetric relations are keyed on the ordered endpoint pair, so both
/// orientations of the same relation resolve to one edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeId(pub u64);

hex_identifier!(EdgeId);

impl EdgeId {
    /// Derive the identifier for a relation between two nodes.
    #[must_use]
    pub fn derive(source: NodeId, target: NodeId, relation: RelationKind) -> Self {
        let (source, target) = relation.canonical_endpoints(source, target);
        Self(digest_prefix(&[
            b"edge",
            &source.0.to_le_bytes(),
            &target.0.to_le_bytes(),
            relation.as_str().as_bytes(),
        ]))
    }
}

// =============================================================================
// LABELS
// =============================================================================

/// Canonical display form of a label: trimmed, inner whitespace collapsed.
#[must_use]
pub fn canonical_label(label: &str) -> String {
    label.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Identity form of a label: canonical form, case-folded.
#[must_use]
pub fn normalize_label(label: &str) -> String {
    canonical_label(label).to_lowercase()
}

// =============================================================================
// VOCABULARIES
// =============================================================================

/// The fixed vocabulary of entity types.
///
/// Variants are declared alphabetically so the derived `Ord` matches the
/// type-name order used by the circular and grid layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EntityKind {
    Cause,
    Component,
    Product,
    Resolution,
    Symptom,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Cause,
        EntityKind::Component,
        EntityKind::Product,
        EntityKind::Resolution,
        EntityKind::Symptom,
    ];

    /// Wire name of the entity type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Cause => "Cause",
            EntityKind::Component => "Component",
            EntityKind::Product => "Product",
            EntityKind::Resolution => "Resolution",
            EntityKind::Symptom => "Symptom",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| EngineError::Validation(format!("unknown entity type '{}'", s)))
    }
}

impl TryFrom<String> for EntityKind {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EntityKind> for String {
    fn from(kind: EntityKind) -> Self {
        kind.as_str().to_string()
    }
}

/// The fixed vocabulary of relation types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RelationKind {
    Causes,
    ResolvedBy,
    RelatedTo,
    PartOf,
}

impl RelationKind {
    pub const ALL: [RelationKind; 4] = [
        RelationKind::Causes,
        RelationKind::ResolvedBy,
        RelationKind::RelatedTo,
        RelationKind::PartOf,
    ];

    /// Wire name of the relation type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::Causes => "causes",
            RelationKind::ResolvedBy => "resolvedBy",
            RelationKind::RelatedTo => "relatedTo",
            RelationKind::PartOf => "partOf",
        }
    }

    /// Whether `(a, b)` and `(b, a)` denote the same relation.
    #[must_use]
    pub fn is_symmetric(&self) -> bool {
        matches!(self, RelationKind::RelatedTo)
    }

    /// Whether the relation points from a parent to a child in the
    /// hierarchical layout.
    #[must_use]
    pub fn is_hierarchical(&self) -> bool {
        matches!(self, RelationKind::Causes | RelationKind::PartOf)
    }

    /// Endpoint order used for storage and identity.
    #[must_use]
    pub fn canonical_endpoints(&self, source: NodeId, target: NodeId) -> (NodeId, NodeId) {
        if self.is_symmetric() && target < source {
            (target, source)
        } else {
            (source, target)
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RelationKind {
    type Err = EngineError;

    /// Accepts `resolvedBy`, `resolved_by`, `resolved-by` and `Resolved By`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_lowercase();
        RelationKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().to_lowercase() == folded)
            .ok_or_else(|| EngineError::Validation(format!("unknown relation type '{}'", s)))
    }
}

impl TryFrom<String> for RelationKind {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RelationKind> for String {
    fn from(kind: RelationKind) -> Self {
        kind.as_str().to_string()
    }
}

// =============================================================================
// NODE
// =============================================================================

/// An extracted entity.
///
/// All mutations are additive: `weight` grows, `occurrences` increments,
/// `last_seen` only moves forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub kind: EntityKind,
    /// Canonical spelling from the first observation.
    pub label: String,
    pub normalized_label: String,
    /// Accumulated confidence. Never decayed in storage.
    pub weight: f64,
    /// Number of distinct tickets that produced this node.
    pub occurrences: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Ticket timestamps, ascending, capped at `MAX_OBSERVATIONS`.
    pub observations: Vec<DateTime<Utc>>,
}

impl Node {
    /// Create a node from its first observation.
    #[must_use]
    pub fn new(kind: EntityKind, label: &str, confidence: f64, at: DateTime<Utc>) -> Self {
        let normalized_label = normalize_label(label);
        Self {
            id: NodeId::derive(kind, &normalized_label),
            kind,
            label: canonical_label(label),
            normalized_label,
            weight: confidence,
            occurrences: 1,
            first_seen: at,
            last_seen: at,
            observations: vec![at],
        }
    }

    /// Fold another observation into the node.
    pub fn reinforce(&mut self, confidence: f64, at: DateTime<Utc>) {
        self.weight += confidence;
        self.occurrences = self.occurrences.saturating_add(1);
        self.first_seen = self.first_seen.min(at);
        self.last_seen = self.last_seen.max(at);
        let slot = self.observations.partition_point(|seen| *seen <= at);
        self.observations.insert(slot, at);
        if self.observations.len() > MAX_OBSERVATIONS {
            let excess = self.observations.len() - MAX_OBSERVATIONS;
            self.observations.drain(..excess);
        }
    }
}

// =============================================================================
// EDGE
// =============================================================================

/// A relation between two stored nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(rename = "relationType")]
    pub relation: RelationKind,
    pub weight: f64,
    pub occurrences: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Edge {
    /// Create an edge from its first observation. Endpoints are stored in
    /// canonical order.
    #[must_use]
    pub fn new(
        source: NodeId,
        target: NodeId,
        relation: RelationKind,
        confidence: f64,
        at: DateTime<Utc>,
    ) -> Self {
        let (source, target) = relation.canonical_endpoints(source, target);
        Self {
            id: EdgeId::derive(source, target, relation),
            source,
            target,
            relation,
            weight: confidence,
            occurrences: 1,
            first_seen: at,
            last_seen: at,
        }
    }

    /// Fold another observation into the edge.
    pub fn reinforce(&mut self, confidence: f64, at: DateTime<Utc>) {
        self.weight += confidence;
        self.occurrences = self.occurrences.saturating_add(1);
        self.first_seen = self.first_seen.min(at);
        self.last_seen = self.last_seen.max(at);
    }

    /// The endpoint opposite to `node`, if `node` is an endpoint.
    #[must_use]
    pub fn other(&self, node: NodeId) -> Option<NodeId> {
        if self.source == node {
            Some(self.target)
        } else if self.target == node {
            Some(self.source)
        } else {
            None
        }
    }
}

// =============================================================================
// METADATA
// =============================================================================

/// Graph counters, maintained incrementally by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphMetadata {
    pub node_count: usize,
    pub edge_count: usize,
    pub last_updated: Option<DateTime<Utc>>,
    pub total_learning_events: u64,
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors surfaced by the engine.
///
/// - No silent failures
/// - All errors are recoverable; the engine never panics on input
/// - A rejected call leaves the graph unchanged
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Malformed input, rejected before any mutation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An edge referenced a node that is not in the store.
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),

    /// Unsupported argument, such as an unknown layout name.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Snapshot encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The snapshot store failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    #[test]
    fn normalize_label_folds_case_and_whitespace() {
        assert_eq!(normalize_label("  Blue   Screen "), "blue screen");
        assert_eq!(canonical_label("  Blue   Screen "), "Blue Screen");
    }

    #[test]
    fn node_id_depends_on_kind_and_label() {
        let a = NodeId::derive(EntityKind::Symptom, "blue screen");
        let b = NodeId::derive(EntityKind::Symptom, "blue screen");
        let c = NodeId::derive(EntityKind::Cause, "blue screen");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn symmetric_edge_ids_collide() {
        let a = NodeId(1);
        let b = NodeId(2);
        assert_eq!(
            EdgeId::derive(a, b, RelationKind::RelatedTo),
            EdgeId::derive(b, a, RelationKind::RelatedTo)
        );
        assert_ne!(
            EdgeId::derive(a, b, RelationKind::Causes),
            EdgeId::derive(b, a, RelationKind::Causes)
        );
    }

    #[test]
    fn ids_render_as_hex_in_json() {
        let id = NodeId(0x00ab_cdef_0123_4567);
        let json = serde_json::to_string(&id).expect("encode");
        assert_eq!(json, "\"00abcdef01234567\"");
        let back: NodeId = serde_json::from_str(&json).expect("decode");
        assert_eq!(back, id);
        assert!("not-hex".parse::<EdgeId>().is_err());
    }

    #[test]
    fn kinds_parse_leniently_and_reject_unknown() {
        assert_eq!("symptom".parse::<EntityKind>(), Ok(EntityKind::Symptom));
        assert_eq!("resolved_by".parse::<RelationKind>(), Ok(RelationKind::ResolvedBy));
        assert_eq!("Part Of".parse::<RelationKind>(), Ok(RelationKind::PartOf));
        assert!(matches!(
            "Widget".parse::<EntityKind>(),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            "fixes".parse::<RelationKind>(),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn entity_kind_order_is_alphabetical() {
        let mut kinds = EntityKind::ALL.to_vec();
        kinds.sort();
        let names: Vec<_> = kinds.iter().map(|k| k.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }

    #[test]
    fn node_reinforce_is_additive() {
        let mut node = Node::new(EntityKind::Symptom, "Disk Full", 0.5, t0());
        node.reinforce(0.25, t0() + Duration::days(2));
        node.reinforce(0.25, t0() - Duration::days(1));

        assert!((node.weight - 1.0).abs() < 1e-12);
        assert_eq!(node.occurrences, 3);
        assert_eq!(node.last_seen, t0() + Duration::days(2));
        assert_eq!(node.first_seen, t0() - Duration::days(1));
        assert!(node.observations.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn observations_are_capped() {
        let mut node = Node::new(EntityKind::Symptom, "x", 0.1, t0());
        for i in 0..(MAX_OBSERVATIONS + 10) {
            node.reinforce(0.1, t0() + Duration::minutes(i as i64 + 1));
        }
        assert_eq!(node.observations.len(), MAX_OBSERVATIONS);
        assert_eq!(node.observations.last(), Some(&node.last_seen));
    }

    #[test]
    fn edge_other_endpoint() {
        let edge = Edge::new(NodeId(5), NodeId(3), RelationKind::RelatedTo, 0.5, t0());
        assert_eq!(edge.source, NodeId(3));
        assert_eq!(edge.other(NodeId(3)), Some(NodeId(5)));
        assert_eq!(edge.other(NodeId(9)), None);
    }
}
