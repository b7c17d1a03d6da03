//! # Graph Store
//!
//! The deterministic graph storage of the engine.
//!
//! This module implements the `GraphStore` trait for the in-memory [`Graph`]
//! and for [`GraphTransaction`], the journaled write handle the learning
//! processor mutates through. All data structures use `BTreeMap` so
//! iteration order is stable across runs.

use crate::confidence::clamp_confidence;
use crate::types::{
    Edge, EdgeId, EngineError, EntityKind, GraphMetadata, Node, NodeId, RelationKind,
    normalize_label,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// GRAPHSTORE TRAIT
// =============================================================================

/// Core mutation and lookup operations.
///
/// Upserts are additive: an existing element is reinforced, never replaced.
pub trait GraphStore {
    /// Create or reinforce the node for `(kind, label)`. Returns its id.
    ///
    /// The confidence is clamped into `[0, 1]`.
    fn upsert_node(
        &mut self,
        kind: EntityKind,
        label: &str,
        confidence: f64,
        at: DateTime<Utc>,
    ) -> Result<NodeId, EngineError>;

    /// Create or reinforce the edge between two stored nodes.
    ///
    /// Fails with [`EngineError::UnknownNode`] if either endpoint is missing.
    fn upsert_edge(
        &mut self,
        source: NodeId,
        target: NodeId,
        relation: RelationKind,
        confidence: f64,
        at: DateTime<Utc>,
    ) -> Result<EdgeId, EngineError>;

    fn node(&self, id: NodeId) -> Option<&Node>;

    fn edge(&self, id: EdgeId) -> Option<&Edge>;

    /// O(1) read of the incrementally maintained counters.
    fn metadata(&self) -> GraphMetadata;
}

// =============================================================================
// GRAPH IMPLEMENTATION
// =============================================================================

/// The in-memory knowledge graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    nodes: BTreeMap<NodeId, Node>,
    edges: BTreeMap<EdgeId, Edge>,
    /// source -> edges stored with that source
    outgoing: BTreeMap<NodeId, BTreeSet<EdgeId>>,
    /// target -> edges stored with that target
    incoming: BTreeMap<NodeId, BTreeSet<EdgeId>>,
    processed_tickets: BTreeSet<String>,
    metadata: GraphMetadata,
}

impl Graph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a graph from decoded snapshot parts.
    ///
    /// Counters are recomputed from the parts; `total_learning_events` and
    /// `last_updated` are taken from `metadata`. Any inconsistency (an id
    /// or normalized label that does not match its content, unordered
    /// observations, a duplicate, a dangling endpoint) is reported as [`EngineError::Serialization`].
    pub fn from_parts(
        nodes: Vec<Node>,
        edges: Vec<Edge>,
        processed_tickets: BTreeSet<String>,
        metadata: GraphMetadata,
    ) -> Result<Self, EngineError> {
        let mut graph = Self {
            processed_tickets,
            ..Self::default()
        };

        for node in nodes {
            if node.normalized_label != normalize_label(&node.label) {
                return Err(EngineError::Serialization(format!(
                    "node {} has a normalized label that does not match its label",
                    node.id
                )));
            }
            if !node.observations.is_sorted() {
                return Err(EngineError::Serialization(format!(
                    "node {} has unordered observations",
                    node.id
                )));
            }
            if node.id != NodeId::derive(node.kind, &node.normalized_label) {
                return Err(EngineError::Serialization(format!(
                    "node {} does not match its type and label",
                    node.id
                )));
            }
            if let Some(previous) = graph.nodes.insert(node.id, node) {
                return Err(EngineError::Serialization(format!(
                    "duplicate node {}",
                    previous.id
                )));
            }
        }

        for edge in edges {
            for endpoint in [edge.source, edge.target] {
                if !graph.nodes.contains_key(&endpoint) {
                    return Err(EngineError::Serialization(format!(
                        "edge {} references unknown node {}",
                        edge.id, endpoint
                    )));
                }
            }
            let canonical = edge.relation.canonical_endpoints(edge.source, edge.target);
            if canonical != (edge.source, edge.target)
                || edge.id != EdgeId::derive(edge.source, edge.target, edge.relation)
            {
                return Err(EngineError::Serialization(format!(
                    "edge {} does not match its endpoints and relation",
                    edge.id
                )));
            }
            if graph.edges.contains_key(&edge.id) {
                return Err(EngineError::Serialization(format!(
                    "duplicate edge {}",
                    edge.id
                )));
            }
            graph.link(&edge);
            graph.edges.insert(edge.id, edge);
        }

        graph.metadata = GraphMetadata {
            node_count: graph.nodes.len(),
            edge_count: graph.edges.len(),
            ..metadata
        };
        Ok(graph)
    }

    /// Start a journaled write. Dropping the transaction without
    /// [`GraphTransaction::commit`] undoes every change made through it.
    pub fn begin(&mut self) -> GraphTransaction<'_> {
        GraphTransaction::new(self)
    }

    /// All nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// All edges in id order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    /// Edges stored with `id` as their source.
    pub fn edges_from(&self, id: NodeId) -> impl Iterator<Item = &Edge> {
        self.adjacent(&self.outgoing, id)
    }

    /// Edges stored with `id` as their target.
    pub fn edges_to(&self, id: NodeId) -> impl Iterator<Item = &Edge> {
        self.adjacent(&self.incoming, id)
    }

    /// Every edge touching `id`, outgoing first.
    pub fn incident_edges(&self, id: NodeId) -> impl Iterator<Item = &Edge> {
        self.edges_from(id).chain(self.edges_to(id))
    }

    fn adjacent<'a>(
        &'a self,
        index: &'a BTreeMap<NodeId, BTreeSet<EdgeId>>,
        id: NodeId,
    ) -> impl Iterator<Item = &'a Edge> + 'a {
        index
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|edge_id| self.edges.get(edge_id))
    }

    /// Look a node up by its type and any spelling of its label.
    #[must_use]
    pub fn find_node(&self, kind: EntityKind, label: &str) -> Option<&Node> {
        self.nodes
            .get(&NodeId::derive(kind, &normalize_label(label)))
    }

    /// Look an edge up by its endpoints, in either order for symmetric
    /// relations.
    #[must_use]
    pub fn find_edge(
        &self,
        source: NodeId,
        target: NodeId,
        relation: RelationKind,
    ) -> Option<&Edge> {
        self.edges.get(&EdgeId::derive(source, target, relation))
    }

    #[must_use]
    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    #[must_use]
    pub fn is_processed(&self, ticket_id: &str) -> bool {
        self.processed_tickets.contains(ticket_id)
    }

    /// Ticket ids already learned, sorted.
    pub fn processed_tickets(&self) -> impl Iterator<Item = &str> {
        self.processed_tickets.iter().map(String::as_str)
    }

    /// Owned copy of the graph contents.
    #[must_use]
    pub fn view(&self) -> GraphView {
        GraphView {
            nodes: self.nodes.values().cloned().collect(),
            edges: self.edges.values().cloned().collect(),
            metadata: self.metadata,
        }
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.metadata.last_updated = Some(match self.metadata.last_updated {
            Some(previous) => previous.max(at),
            None => at,
        });
    }

    fn link(&mut self, edge: &Edge) {
        self.outgoing.entry(edge.source).or_default().insert(edge.id);
        self.incoming.entry(edge.target).or_default().insert(edge.id);
    }

    fn unlink(&mut self, edge: &Edge) {
        for (index, key) in [
            (&mut self.outgoing, edge.source),
            (&mut self.incoming, edge.target),
        ] {
            if let Some(ids) = index.get_mut(&key) {
                ids.remove(&edge.id);
                if ids.is_empty() {
                    index.remove(&key);
                }
            }
        }
    }
}

impl GraphStore for Graph {
    fn upsert_node(
        &mut self,
        kind: EntityKind,
        label: &str,
        confidence: f64,
        at: DateTime<Utc>,
    ) -> Result<NodeId, EngineError> {
        let normalized = normalize_label(label);
        if normalized.is_empty() {
            return Err(EngineError::Validation("label must not be empty".into()));
        }
        let confidence = clamp_confidence(confidence);
        let id = NodeId::derive(kind, &normalized);

        match self.nodes.get_mut(&id) {
            Some(node) => node.reinforce(confidence, at),
            None => {
                self.nodes.insert(id, Node::new(kind, label, confidence, at));
                self.metadata.node_count = self.nodes.len();
            }
        }
        self.touch(at);
        Ok(id)
    }

    fn upsert_edge(
        &mut self,
        source: NodeId,
        target: NodeId,
        relation: RelationKind,
        confidence: f64,
        at: DateTime<Utc>,
    ) -> Result<EdgeId, EngineError> {
        for endpoint in [source, target] {
            if !self.nodes.contains_key(&endpoint) {
                return Err(EngineError::UnknownNode(endpoint));
            }
        }
        if source == target {
            return Err(EngineError::Validation(format!(
                "node {} cannot relate to itself",
                source
            )));
        }
        let confidence = clamp_confidence(confidence);
        let id = EdgeId::derive(source, target, relation);

        match self.edges.get_mut(&id) {
            Some(edge) => edge.reinforce(confidence, at),
            None => {
                let edge = Edge::new(source, target, relation, confidence, at);
                self.link(&edge);
                self.edges.insert(id, edge);
                self.metadata.edge_count = self.edges.len();
            }
        }
        self.touch(at);
        Ok(id)
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(&id)
    }

    fn metadata(&self) -> GraphMetadata {
        self.metadata
    }
}

// =============================================================================
// TRANSACTIONS
// =============================================================================

/// A journaled write against a [`Graph`].
///
/// The first time an element is touched its prior value (or its absence) is
/// recorded. Dropping an uncommitted transaction restores every journaled
/// element, the counters and the processed-ticket set.
pub struct GraphTransaction<'a> {
    graph: &'a mut Graph,
    nodes: BTreeMap<NodeId, Option<Node>>,
    edges: BTreeMap<EdgeId, Option<Edge>>,
    metadata: GraphMetadata,
    processed: Option<String>,
    committed: bool,
}

impl<'a> GraphTransaction<'a> {
    fn new(graph: &'a mut Graph) -> Self {
        let metadata = graph.metadata;
        Self {
            graph,
            nodes: BTreeMap::new(),
            edges: BTreeMap::new(),
            metadata,
            processed: None,
            committed: false,
        }
    }

    /// Read access to the graph as modified so far.
    #[must_use]
    pub fn graph(&self) -> &Graph {
        self.graph
    }

    /// Record `ticket_id` as learned and count one learning event.
    pub fn mark_processed(&mut self, ticket_id: &str, at: DateTime<Utc>) {
        if self.graph.processed_tickets.insert(ticket_id.to_string()) {
            self.processed = Some(ticket_id.to_string());
        }
        self.graph.metadata.total_learning_events =
            self.graph.metadata.total_learning_events.saturating_add(1);
        self.graph.touch(at);
    }

    /// Distinct nodes touched so far.
    #[must_use]
    pub fn nodes_touched(&self) -> usize {
        self.nodes.len()
    }

    /// Distinct edges touched so far.
    #[must_use]
    pub fn edges_touched(&self) -> usize {
        self.edges.len()
    }

    /// Keep every change.
    pub fn commit(mut self) -> GraphMetadata {
        self.committed = true;
        self.graph.metadata
    }

    fn rollback(&mut self) {
        for (id, prior) in std::mem::take(&mut self.edges) {
            match prior {
                Some(edge) => {
                    self.graph.edges.insert(id, edge);
                }
                None => {
                    if let Some(edge) = self.graph.edges.remove(&id) {
                        self.graph.unlink(&edge);
                    }
                }
            }
        }
        for (id, prior) in std::mem::take(&mut self.nodes) {
            match prior {
                Some(node) => {
                    self.graph.nodes.insert(id, node);
                }
                None => {
                    self.graph.nodes.remove(&id);
                }
            }
        }
        if let Some(ticket_id) = self.processed.take() {
            self.graph.processed_tickets.remove(&ticket_id);
        }
        self.graph.metadata = self.metadata;
    }
}

impl GraphStore for GraphTransaction<'_> {
    fn upsert_node(
        &mut self,
        kind: EntityKind,
        label: &str,
        confidence: f64,
        at: DateTime<Utc>,
    ) -> Result<NodeId, EngineError> {
        let id = NodeId::derive(kind, &normalize_label(label));
        if !self.nodes.contains_key(&id) {
            let prior = self.graph.nodes.get(&id).cloned();
            self.nodes.insert(id, prior);
        }
        self.graph.upsert_node(kind, label, confidence, at)
    }

    fn upsert_edge(
        &mut self,
        source: NodeId,
        target: NodeId,
        relation: RelationKind,
        confidence: f64,
        at: DateTime<Utc>,
    ) -> Result<EdgeId, EngineError> {
        let id = EdgeId::derive(source, target, relation);
        if !self.edges.contains_key(&id) {
            let prior = self.graph.edges.get(&id).cloned();
            self.edges.insert(id, prior);
        }
        self.graph.upsert_edge(source, target, relation, confidence, at)
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.graph.node(id)
    }

    fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.graph.edge(id)
    }

    fn metadata(&self) -> GraphMetadata {
        self.graph.metadata
    }
}

impl Drop for GraphTransaction<'_> {
    fn drop(&mut self) {
        if !self.committed {
            tracing::debug!(
                nodes = self.nodes.len(),
                edges = self.edges.len(),
                "rolling back graph transaction"
            );
            self.rollback();
        }
    }
}

// =============================================================================
// GRAPH VIEW
// =============================================================================

/// Owned, read-only copy of the graph handed to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphView {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub metadata: GraphMetadata,
}

// =============================================================================
// TESTS
// =============================================================================
