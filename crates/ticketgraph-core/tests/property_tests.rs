//! # Property-Based Tests
//!
//! Determinism and merge invariants checked with proptest.

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::collection::vec;
use proptest::prelude::*;
use ticketgraph_core::{
    EdgeId, EntityKind, Graph, GraphStore, KnowledgeEngine, LayoutKind, LearningData, NodeId,
    RelationKind, decay_factor, normalize_label, snapshot_from_bytes, snapshot_to_bytes,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0)
        .single()
        .expect("valid timestamp")
}

fn entity_kind() -> impl Strategy<Value = EntityKind> {
    prop::sample::select(EntityKind::ALL.to_vec())
}

fn relation_kind() -> impl Strategy<Value = RelationKind> {
    prop::sample::select(RelationKind::ALL.to_vec())
}

/// Labels built from a small vocabulary so tickets overlap.
fn label() -> impl Strategy<Value = String> {
    vec(prop::sample::select(vec!["disk", "full", "vpn", "Login", "error"]), 1..3)
        .prop_map(|words| words.join(" "))
}

/// Re-spell a label: random case per character, padded whitespace.
fn respell(label: &str, mask: &[bool]) -> String {
    let body: String = label
        .chars()
        .zip(mask.iter().cycle())
        .map(|(c, upper)| {
            if *upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            }
        })
        .collect::<String>()
        .replace(' ', "   ");
    format!("  {}\t", body)
}

fn ticket() -> impl Strategy<Value = LearningData> {
    (
        "[A-Z]{1,3}-[0-9]{1,4}",
        vec((entity_kind(), label(), 0.0f64..=1.0), 0..6),
        vec(
            (
                (entity_kind(), label()),
                relation_kind(),
                (entity_kind(), label()),
                0.0f64..=1.0,
            ),
            0..6,
        ),
    )
        .prop_map(|(id, entities, relations)| {
            let mut data = LearningData::new(id);
            for (kind, label, confidence) in entities {
                data = data.with_entity(kind, &label, confidence);
            }
            for ((sk, sl), relation, (tk, tl), confidence) in relations {
                if NodeId::derive(sk, &normalize_label(&sl)) != NodeId::derive(tk, &normalize_label(&tl)) {
                    data = data.with_relation((sk, &sl), relation, (tk, &tl), confidence);
                }
            }
            data
        })
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Any case or whitespace variant of a label merges into one node.
    #[test]
    fn label_variants_merge(
        kind in entity_kind(),
        label in label(),
        mask in vec(any::<bool>(), 1..8),
    ) {
        let mut graph = Graph::new();
        let a = graph.upsert_node(kind, &label, 0.5, t0()).expect("upsert");
        let b = graph.upsert_node(kind, &respell(&label, &mask), 0.5, t0()).expect("upsert");

        prop_assert_eq!(a, b);
        prop_assert_eq!(graph.node_count(), 1);
        prop_assert_eq!(graph.node(a).expect("node").occurrences, 2);
    }

    /// Only symmetric relations ignore endpoint order.
    #[test]
    fn edge_identity_respects_symmetry(a in any::<u64>(), b in any::<u64>(), relation in relation_kind()) {
        prop_assume!(a != b);
        let forward = EdgeId::derive(NodeId(a), NodeId(b), relation);
        let backward = EdgeId::derive(NodeId(b), NodeId(a), relation);
        prop_assert_eq!(forward == backward, relation.is_symmetric());
    }

    /// Learning the same ticket twice changes nothing the second time.
    #[test]
    fn learning_is_idempotent(data in ticket()) {
        let engine = KnowledgeEngine::default();
        let first = engine.learn_from_ticket_at(&data, t0()).expect("learn");
        let view = engine.get_graph();
        let second = engine.learn_from_ticket_at(&data, t0() + Duration::hours(1)).expect("learn");

        prop_assert_eq!(first.metadata, second.metadata);
        prop_assert_eq!(engine.get_graph(), view);
    }

    /// Counters always match the stored contents.
    #[test]
    fn metadata_matches_contents(tickets in vec(ticket(), 1..8)) {
        let engine = KnowledgeEngine::default();
        for data in &tickets {
            engine.learn_from_ticket_at(data, t0()).expect("learn");
        }
        let view = engine.get_graph();
        prop_assert_eq!(view.metadata.node_count, view.nodes.len());
        prop_assert_eq!(view.metadata.edge_count, view.edges.len());
        for edge in &view.edges {
            prop_assert!(view.nodes.iter().any(|n| n.id == edge.source));
            prop_assert!(view.nodes.iter().any(|n| n.id == edge.target));
        }
    }

    /// Snapshot export is canonical: export -> import -> export is identical.
    #[test]
    fn snapshot_roundtrip_bit_exact(tickets in vec(ticket(), 0..6)) {
        let mut graph = Graph::new();
        for data in &tickets {
            ticketgraph_core::LearningProcessor::learn(&mut graph, data, t0()).expect("learn");
        }
        let first = snapshot_to_bytes(&graph).expect("serialize");
        let restored = snapshot_from_bytes(&first).expect("deserialize");
        prop_assert_eq!(snapshot_to_bytes(&restored).expect("serialize"), first);
        prop_assert_eq!(restored, graph);
    }

    /// Decay never amplifies and is monotonic in elapsed time.
    #[test]
    fn decay_is_bounded_and_monotonic(a in 0i64..10_000, b in 0i64..10_000, half_life in 1i64..365) {
        let (short, long) = (a.min(b), a.max(b));
        let half_life = Duration::days(half_life);
        let near = decay_factor(Duration::hours(short), half_life);
        let far = decay_factor(Duration::hours(long), half_life);
        prop_assert!(far <= near);
        prop_assert!((0.0..=1.0).contains(&near));
    }

    /// Force and circular layouts stay on the canvas and are reproducible.
    #[test]
    fn layouts_are_bounded_and_deterministic(tickets in vec(ticket(), 1..5)) {
        let engine = KnowledgeEngine::default();
        for data in &tickets {
            engine.learn_from_ticket_at(data, t0()).expect("learn");
        }
        for kind in [LayoutKind::Force, LayoutKind::Circular] {
            let first = engine.generate_visualization_at(kind, t0());
            let second = engine.generate_visualization_at(kind, t0());
            prop_assert_eq!(&first, &second);
            for node in &first.nodes {
                prop_assert!((0.0..=1000.0).contains(&node.x));
                prop_assert!((0.0..=1000.0).contains(&node.y));
                prop_assert!(node.size >= 4.0);
            }
        }
    }
}
