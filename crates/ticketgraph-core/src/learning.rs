//! # Learning Processor
//!
//! Validation and ingestion of `LearningData` for the knowledge graph.
//!
//! - Validate the whole payload before any graph mutation
//! - Reject malformed input with an explicit message
//! - Deduplicate entities and relations within one ticket
//! - Apply a ticket atomically: all of it or none of it
//! - Learn each ticket id at most once

use crate::graph::{Graph, GraphStore};
use crate::primitives::{
    MAX_ENTITIES_PER_TICKET, MAX_LABEL_LENGTH, MAX_RELATIONS_PER_TICKET, MAX_TICKET_ID_LENGTH,
};
use crate::types::{
    EdgeId, EngineError, EntityKind, GraphMetadata, LearningData, NodeId, RelationKind,
    canonical_label, normalize_label,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// OUTCOME
// =============================================================================

/// How a ticket was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LearnStatus {
    /// The ticket was new and its extractions were merged into the graph.
    Applied,
    /// The ticket had already been learned; nothing changed.
    Duplicate,
}

/// Acknowledgement returned by [`LearningProcessor::learn`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnOutcome {
    pub ticket_id: String,
    pub status: LearnStatus,
    pub nodes_touched: usize,
    pub edges_touched: usize,
    pub metadata: GraphMetadata,
}

// =============================================================================
// PLAN
// =============================================================================

/// A node to upsert, after per-ticket deduplication.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedNode {
    pub kind: EntityKind,
    pub label: String,
    pub confidence: f64,
}

/// An edge to upsert, after per-ticket deduplication.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedEdge {
    pub source: NodeId,
    pub target: NodeId,
    pub relation: RelationKind,
    pub confidence: f64,
}

/// A validated ticket, reduced to one operation per distinct element.
#[derive(Debug, Clone, PartialEq)]
pub struct LearningPlan {
    pub ticket_id: String,
    pub nodes: BTreeMap<NodeId, PlannedNode>,
    pub edges: BTreeMap<EdgeId, PlannedEdge>,
}

struct NodeSlot {
    node: PlannedNode,
    listed: bool,
}

// =============================================================================
// PROCESSOR
// =============================================================================

/// The Learning Processor turns `LearningData` into graph mutations.
pub struct LearningProcessor;

impl LearningProcessor {
    /// Validate a payload and reduce it to a [`LearningPlan`].
    ///
    /// A payload is rejected if:
    /// - The ticket id is blank or longer than `MAX_TICKET_ID_LENGTH`
    /// - Either extraction list is absent or over its limit
    /// - Any label is blank or longer than `MAX_LABEL_LENGTH`
    /// - Any confidence is NaN
    /// - A relation connects an entity to itself
    pub fn plan(data: &LearningData) -> Result<LearningPlan, EngineError> {
        let ticket_id = data.ticket_id.trim();
        if ticket_id.is_empty() {
            return Err(EngineError::Validation("ticketId must not be empty".into()));
        }
        if ticket_id.len() > MAX_TICKET_ID_LENGTH {
            return Err(EngineError::Validation(format!(
                "ticketId exceeds {} bytes",
                MAX_TICKET_ID_LENGTH
            )));
        }

        let entities = data
            .entities_extracted
            .as_deref()
            .ok_or_else(|| EngineError::Validation("entitiesExtracted is required".into()))?;
        let relations = data
            .relations_extracted
            .as_deref()
            .ok_or_else(|| EngineError::Validation("relationsExtracted is required".into()))?;
        if entities.len() > MAX_ENTITIES_PER_TICKET {
            return Err(EngineError::Validation(format!(
                "more than {} entities in one ticket",
                MAX_ENTITIES_PER_TICKET
            )));
        }
        if relations.len() > MAX_RELATIONS_PER_TICKET {
            return Err(EngineError::Validation(format!(
                "more than {} relations in one ticket",
                MAX_RELATIONS_PER_TICKET
            )));
        }

        let mut slots: BTreeMap<NodeId, NodeSlot> = BTreeMap::new();

        for (index, entity) in entities.iter().enumerate() {
            let context = format!("entitiesExtracted[{}]", index);
            let label = checked_label(&entity.label, &context)?;
            let confidence = checked_confidence(entity.confidence, &context)?;
            let id = NodeId::derive(entity.kind, &normalize_label(&label));
            match slots.get_mut(&id) {
                Some(slot) if slot.listed => {
                    slot.node.confidence = slot.node.confidence.max(confidence);
                }
                Some(slot) => {
                    slot.node.confidence = confidence;
                    slot.listed = true;
                }
                None => {
                    slots.insert(
                        id,
                        NodeSlot {
                            node: PlannedNode {
                                kind: entity.kind,
                                label,
                                confidence,
                            },
                            listed: true,
                        },
                    );
                }
            }
        }

        let mut edges: BTreeMap<EdgeId, PlannedEdge> = BTreeMap::new();

        for (index, relation) in relations.iter().enumerate() {
            let context = format!("relationsExtracted[{}]", index);
            let confidence = checked_confidence(relation.confidence, &context)?;

            let mut endpoint = |kind: EntityKind, raw: &str| -> Result<NodeId, EngineError> {
                let label = checked_label(raw, &context)?;
                let id = NodeId::derive(kind, &normalize_label(&label));
                let slot = slots.entry(id).or_insert_with(|| NodeSlot {
                    node: PlannedNode {
                        kind,
                        label,
                        confidence,
                    },
                    listed: false,
                });
                if !slot.listed {
                    slot.node.confidence = slot.node.confidence.max(confidence);
                }
                Ok(id)
            };
            let source = endpoint(relation.source_type, &relation.source_label)?;
            let target = endpoint(relation.target_type, &relation.target_label)?;

            if source == target {
                return Err(EngineError::Validation(format!(
                    "{}: an entity cannot relate to itself",
                    context
                )));
            }

            let id = EdgeId::derive(source, target, relation.relation_type);
            edges
                .entry(id)
                .and_modify(|edge| edge.confidence = edge.confidence.max(confidence))
                .or_insert(PlannedEdge {
                    source,
                    target,
                    relation: relation.relation_type,
                    confidence,
                });
        }

        Ok(LearningPlan {
            ticket_id: ticket_id.to_string(),
            nodes: slots
                .into_iter()
                .map(|(id, slot)| (id, slot.node))
                .collect(),
            edges,
        })
    }

    /// Apply a plan to any graph store: nodes first, then edges.
    ///
    /// Returns the number of distinct nodes and edges upserted. The caller
    /// is responsible for atomicity; [`LearningProcessor::learn`] runs this
    /// inside a [`crate::graph::GraphTransaction`].
    pub fn apply<G: GraphStore>(
        store: &mut G,
        plan: &LearningPlan,
        at: DateTime<Utc>,
    ) -> Result<(usize, usize), EngineError> {
        for node in plan.nodes.values() {
            store.upsert_node(node.kind, &node.label, node.confidence, at)?;
        }
        for edge in plan.edges.values() {
            store.upsert_edge(edge.source, edge.target, edge.relation, edge.confidence, at)?;
        }
        Ok((plan.nodes.len(), plan.edges.len()))
    }

    /// Learn one ticket into `graph`.
    ///
    /// A ticket id seen before is acknowledged as [`LearnStatus::Duplicate`]
    /// without touching the graph. Any failure leaves the graph unchanged.
    pub fn learn(
        graph: &mut Graph,
        data: &LearningData,
        now: DateTime<Utc>,
    ) -> Result<LearnOutcome, EngineError> {
        let plan = Self::plan(data)?;

        if graph.is_processed(&plan.ticket_id) {
            tracing::debug!(ticket_id = %plan.ticket_id, "ticket already learned");
            return Ok(LearnOutcome {
                ticket_id: plan.ticket_id,
                status: LearnStatus::Duplicate,
                nodes_touched: 0,
                edges_touched: 0,
                metadata: graph.metadata(),
            });
        }

        let mut txn = graph.begin();
        let (nodes_touched, edges_touched) = match Self::apply(&mut txn, &plan, now) {
            Ok(counts) => counts,
            Err(err) => {
                tracing::warn!(ticket_id = %plan.ticket_id, error = %err, "ticket rolled back");
                return Err(err);
            }
        };
        txn.mark_processed(&plan.ticket_id, now);
        let metadata = txn.commit();

        tracing::info!(
            ticket_id = %plan.ticket_id,
            nodes = nodes_touched,
            edges = edges_touched,
            node_count = metadata.node_count,
            edge_count = metadata.edge_count,
            "ticket learned"
        );

        Ok(LearnOutcome {
            ticket_id: plan.ticket_id,
            status: LearnStatus::Applied,
            nodes_touched,
            edges_touched,
            metadata,
        })
    }
}

fn checked_label(raw: &str, context: &str) -> Result<String, EngineError> {
    let label = canonical_label(raw);
    if label.is_empty() {
        return Err(EngineError::Validation(format!(
            "{}: label must not be empty",
            context
        )));
    }
    if label.len() > MAX_LABEL_LENGTH {
        return Err(EngineError::Validation(format!(
            "{}: label exceeds {} bytes",
            context, MAX_LABEL_LENGTH
        )));
    }
    Ok(label)
}

fn checked_confidence(confidence: f64, context: &str) -> Result<f64, EngineError> {
    if confidence.is_nan() {
        return Err(EngineError::Validation(format!(
            "{}: confidence is not a number",
            context
        )));
    }
    Ok(confidence.clamp(0.0, 1.0))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphTransaction;
    use crate::types::{Edge, Node};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 10, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    fn disk_ticket(id: &str) -> LearningData {
        LearningData::new(id)
            .with_entity(EntityKind::Symptom, "disk full", 0.9)
            .with_entity(EntityKind::Resolution, "clear temp files", 0.9)
            .with_relation(
                (EntityKind::Symptom, "disk full"),
                RelationKind::ResolvedBy,
                (EntityKind::Resolution, "clear temp files"),
                0.8,
            )
    }

    #[test]
    fn learn_applies_new_ticket() {
        let mut graph = Graph::new();
        let outcome = LearningProcessor::learn(&mut graph, &disk_ticket("T1"), t0())
            .expect("learn");

        assert_eq!(outcome.status, LearnStatus::Applied);
        assert_eq!(outcome.nodes_touched, 2);
        assert_eq!(outcome.edges_touched, 1);
        assert_eq!(outcome.metadata.node_count, 2);
        assert_eq!(outcome.metadata.edge_count, 1);
        assert_eq!(outcome.metadata.total_learning_events, 1);
    }

    #[test]
    fn repeated_ticket_is_a_duplicate() {
        let mut graph = Graph::new();
        LearningProcessor::learn(&mut graph, &disk_ticket("T1"), t0()).expect("learn");
        let before = graph.clone();

        let outcome = LearningProcessor::learn(&mut graph, &disk_ticket(" T1 "), t0())
            .expect("learn");
        assert_eq!(outcome.status, LearnStatus::Duplicate);
        assert_eq!(graph, before);
    }

    #[test]
    fn rejects_blank_ticket_id() {
        let mut graph = Graph::new();
        let result = LearningProcessor::learn(&mut graph, &disk_ticket("   "), t0());
        assert!(matches!(result, Err(EngineError::Validation(_))));
    }

    #[test]
    fn rejects_missing_lists() {
        let data = LearningData {
            ticket_id: "T1".into(),
            entities_extracted: Some(Vec::new()),
            relations_extracted: None,
        };
        let err = LearningProcessor::plan(&data).expect_err("must reject");
        assert!(err.to_string().contains("relationsExtracted"));
    }

    #[test]
    fn rejects_nan_confidence_and_blank_labels() {
        let nan = LearningData::new("T1").with_entity(EntityKind::Symptom, "x", f64::NAN);
        assert!(LearningProcessor::plan(&nan).is_err());

        let blank = LearningData::new("T1").with_relation(
            (EntityKind::Symptom, "x"),
            RelationKind::Causes,
            (EntityKind::Cause, "  "),
            0.5,
        );
        assert!(LearningProcessor::plan(&blank).is_err());
    }

    #[test]
    fn rejects_self_relation() {
        let data = LearningData::new("T1").with_relation(
            (EntityKind::Component, "disk"),
            RelationKind::RelatedTo,
            (EntityKind::Component, "Disk"),
            0.5,
        );
        assert!(matches!(
            LearningProcessor::plan(&data),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn empty_lists_only_count_the_event() {
        let mut graph = Graph::new();
        let outcome =
            LearningProcessor::learn(&mut graph, &LearningData::new("T0"), t0()).expect("learn");
        assert_eq!(outcome.metadata.node_count, 0);
        assert_eq!(outcome.metadata.total_learning_events, 1);
    }

    #[test]
    fn plan_dedupes_within_ticket() {
        let data = LearningData::new("T1")
            .with_entity(EntityKind::Symptom, "Blue Screen", 0.4)
            .with_entity(EntityKind::Symptom, "blue  screen", 0.7)
            .with_relation(
                (EntityKind::Symptom, "BLUE SCREEN"),
                RelationKind::Causes,
                (EntityKind::Cause, "bad driver"),
                0.3,
            )
            .with_relation(
                (EntityKind::Symptom, "blue screen"),
                RelationKind::Causes,
                (EntityKind::Cause, "Bad Driver"),
                0.6,
            );
        let plan = LearningProcessor::plan(&data).expect("plan");

        assert_eq!(plan.nodes.len(), 2);
        assert_eq!(plan.edges.len(), 1);

        let symptom = plan
            .nodes
            .values()
            .find(|n| n.kind == EntityKind::Symptom)
            .expect("symptom");
        assert_eq!(symptom.label, "Blue Screen");
        assert!((symptom.confidence - 0.7).abs() < f64::EPSILON);

        let cause = plan
            .nodes
            .values()
            .find(|n| n.kind == EntityKind::Cause)
            .expect("cause");
        assert!((cause.confidence - 0.6).abs() < f64::EPSILON);

        let edge = plan.edges.values().next().expect("edge");
        assert!((edge.confidence - 0.6).abs() < f64::EPSILON);
    }

    #[test]
    fn listed_confidence_beats_relation_confidence() {
        let data = LearningData::new("T1")
            .with_relation(
                (EntityKind::Symptom, "a"),
                RelationKind::Causes,
                (EntityKind::Cause, "b"),
                0.9,
            )
            .with_entity(EntityKind::Symptom, "a", 0.2);
        let plan = LearningProcessor::plan(&data).expect("plan");
        let a = plan
            .nodes
            .get(&NodeId::derive(EntityKind::Symptom, "a"))
            .expect("a");
        assert!((a.confidence - 0.2).abs() < f64::EPSILON);
    }

    /// Store that fails after a fixed number of edge upserts.
    struct FlakyStore<'t, 'g> {
        inner: &'t mut GraphTransaction<'g>,
        edges_left: usize,
    }

    impl GraphStore for FlakyStore<'_, '_> {
        fn upsert_node(
            &mut self,
            kind: EntityKind,
            label: &str,
            confidence: f64,
            at: DateTime<Utc>,
        ) -> Result<NodeId, EngineError> {
            self.inner.upsert_node(kind, label, confidence, at)
        }

        fn upsert_edge(
            &mut self,
            source: NodeId,
            target: NodeId,
            relation: RelationKind,
            confidence: f64,
            at: DateTime<Utc>,
        ) -> Result<EdgeId, EngineError> {
            if self.edges_left == 0 {
                return Err(EngineError::UnknownNode(target));
            }
            self.edges_left -= 1;
            self.inner.upsert_edge(source, target, relation, confidence, at)
        }

        fn node(&self, id: NodeId) -> Option<&Node> {
            self.inner.node(id)
        }

        fn edge(&self, id: EdgeId) -> Option<&Edge> {
            self.inner.edge(id)
        }

        fn metadata(&self) -> GraphMetadata {
            self.inner.metadata()
        }
    }

    #[test]
    fn failure_mid_apply_rolls_back_whole_ticket() {
        let mut graph = Graph::new();
        LearningProcessor::learn(&mut graph, &disk_ticket("T1"), t0()).expect("learn");
        let before = graph.clone();

        let data = disk_ticket("T2").with_relation(
            (EntityKind::Cause, "log rotation off"),
            RelationKind::Causes,
            (EntityKind::Symptom, "disk full"),
            0.7,
        );
        let plan = LearningProcessor::plan(&data).expect("plan");
        {
            let mut txn = graph.begin();
            let mut flaky = FlakyStore {
                inner: &mut txn,
                edges_left: 1,
            };
            let result = LearningProcessor::apply(&mut flaky, &plan, t0());
            assert!(result.is_err());
        }

        assert_eq!(graph, before);
        assert_eq!(graph.metadata().node_count, 2);
        assert_eq!(graph.metadata().edge_count, 1);
    }

    fn seeded_graph() -> Graph {
        let mut graph = Graph::new();
        LearningProcessor::learn(&mut graph, &disk_ticket("T0"), t0()).expect("learn");
        graph
    }

    fn assert_rejected(data: &LearningData) {
        let mut graph = seeded_graph();
        let before = graph.clone();
        let result = LearningProcessor::learn(&mut graph, data, t0());
        assert!(
            matches!(result, Err(EngineError::Validation(_))),
            "expected a validation error, got {:?}",
            result.map(|outcome| outcome.status)
        );
        assert_eq!(graph, before);
    }

    fn assert_applied(data: &LearningData) {
        let mut graph = seeded_graph();
        let outcome = LearningProcessor::learn(&mut graph, data, t0()).expect("learn");
        assert_eq!(outcome.status, LearnStatus::Applied);
    }

    #[test]
    fn ticket_id_length_limit() {
        assert_applied(&disk_ticket(&"t".repeat(MAX_TICKET_ID_LENGTH)));
        assert_rejected(&disk_ticket(&"t".repeat(MAX_TICKET_ID_LENGTH + 1)));
    }

    #[test]
    fn label_length_limit() {
        let at_limit = "a".repeat(MAX_LABEL_LENGTH);
        assert_applied(&LearningData::new("T1").with_entity(EntityKind::Symptom, &at_limit, 0.5));

        let over = "a".repeat(MAX_LABEL_LENGTH + 1);
        assert_rejected(&LearningData::new("T1").with_entity(EntityKind::Symptom, &over, 0.5));
        assert_rejected(&LearningData::new("T1").with_relation(
            (EntityKind::Cause, "bad driver"),
            RelationKind::Causes,
            (EntityKind::Symptom, &over),
            0.5,
        ));
    }

    fn many_entities(count: usize) -> LearningData {
        (0..count).fold(LearningData::new("T1"), |data, i| {
            data.with_entity(EntityKind::Symptom, &format!("symptom {}", i), 0.5)
        })
    }

    fn many_relations(count: usize) -> LearningData {
        (0..count).fold(LearningData::new("T1"), |data, i| {
            data.with_relation(
                (EntityKind::Cause, &format!("cause {}", i)),
                RelationKind::Causes,
                (EntityKind::Symptom, &format!("symptom {}", i)),
                0.5,
            )
        })
    }

    #[test]
    fn entity_count_limit() {
        assert_applied(&many_entities(MAX_ENTITIES_PER_TICKET));
        assert_rejected(&many_entities(MAX_ENTITIES_PER_TICKET + 1));
    }

    #[test]
    fn relation_count_limit() {
        assert_applied(&many_relations(MAX_RELATIONS_PER_TICKET));
        assert_rejected(&many_relations(MAX_RELATIONS_PER_TICKET + 1));
    }
}
