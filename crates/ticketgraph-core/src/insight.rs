//! # Insight Engine
//!
//! Mines the current graph for findings worth surfacing to support staff.
//!
//! Every call works from the graph as it is now and produces a fresh list;
//! insights are never stored. Four detectors run in a fixed order:
//!
//! 1. Co-occurrence: strong, well-supported edges
//! 2. Trend: nodes whose recent observation rate jumped
//! 3. Resolution path: `Symptom -causes- Cause -resolvedBy-> Resolution`
//! 4. Anomaly: recurring symptoms with no known resolution

use crate::confidence::{DecayPolicy, clamp_confidence};
use crate::config::InsightConfig;
use crate::graph::{Graph, GraphStore};
use crate::types::{Edge, EdgeId, EntityKind, Node, NodeId, RelationKind, digest_prefix};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of pattern an insight reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InsightKind {
    CoOccurrence,
    Trend,
    ResolutionPath,
    Anomaly,
}

impl InsightKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            InsightKind::CoOccurrence => "coOccurrence",
            InsightKind::Trend => "trend",
            InsightKind::ResolutionPath => "resolutionPath",
            InsightKind::Anomaly => "anomaly",
        }
    }
}

/// A derived finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    /// Hash of the kind and the supporting ids, stable across calls.
    pub id: String,
    pub kind: InsightKind,
    pub description: String,
    pub confidence_score: f64,
    pub supporting_node_ids: Vec<NodeId>,
    pub supporting_edge_ids: Vec<EdgeId>,
    pub generated_at: DateTime<Utc>,
}

impl Insight {
    #[must_use]
    pub fn new(
        kind: InsightKind,
        description: String,
        confidence_score: f64,
        supporting_node_ids: Vec<NodeId>,
        supporting_edge_ids: Vec<EdgeId>,
        generated_at: DateTime<Utc>,
    ) -> Self {
        let mut parts: Vec<Vec<u8>> = vec![b"insight".to_vec(), kind.as_str().as_bytes().to_vec()];
        parts.extend(supporting_node_ids.iter().map(|id| id.0.to_le_bytes().to_vec()));
        parts.extend(supporting_edge_ids.iter().map(|id| id.0.to_le_bytes().to_vec()));
        let slices: Vec<&[u8]> = parts.iter().map(Vec::as_slice).collect();

        Self {
            id: format!("{:016x}", digest_prefix(&slices)),
            kind,
            description,
            confidence_score: clamp_confidence(confidence_score),
            supporting_node_ids,
            supporting_edge_ids,
            generated_at,
        }
    }
}

/// Order insights by descending confidence, then by ascending generation
/// time. The sort is stable, so equal keys keep their emission order.
pub fn rank_insights(insights: &mut [Insight]) {
    insights.sort_by(|a, b| {
        b.confidence_score
            .total_cmp(&a.confidence_score)
            .then_with(|| a.generated_at.cmp(&b.generated_at))
    });
}

/// Pattern miner over a read-only graph.
#[derive(Debug, Clone)]
pub struct InsightEngine {
    config: InsightConfig,
    decay: DecayPolicy,
}

impl InsightEngine {
    #[must_use]
    pub fn new(config: InsightConfig, decay: DecayPolicy) -> Self {
        Self { config, decay }
    }

    #[must_use]
    pub fn config(&self) -> &InsightConfig {
        &self.config
    }

    /// Run every detector against `graph` as seen at `now`, ranked.
    #[must_use]
    pub fn generate(&self, graph: &Graph, now: DateTime<Utc>) -> Vec<Insight> {
        let mut insights = self.co_occurrences(graph, now);
        insights.extend(self.trends(graph, now));
        insights.extend(self.resolution_paths(graph, now));
        insights.extend(self.anomalies(graph, now));
        rank_insights(&mut insights);

        tracing::debug!(count = insights.len(), "insights generated");
        insights
    }

    /// Edges whose normalized strength and support both clear the
    /// configured thresholds.
    #[must_use]
    pub fn co_occurrences(&self, graph: &Graph, now: DateTime<Utc>) -> Vec<Insight> {
        graph
            .edges()
            .filter(|edge| edge.occurrences > self.config.min_support)
            .filter_map(|edge| {
                let strength = self.decay.strength(edge, now);
                if strength <= self.config.co_occurrence_threshold {
                    return None;
                }
                let (source, target) = (label_of(graph, edge.source), label_of(graph, edge.target));
                Some(Insight::new(
                    InsightKind::CoOccurrence,
                    format!(
                        "'{}' {} '{}' in {} tickets",
                        source, edge.relation, target, edge.occurrences
                    ),
                    strength,
                    vec![edge.source, edge.target],
                    vec![edge.id],
                    now,
                ))
            })
            .collect()
    }

    /// Nodes observed markedly more often in the recent window than in the
    /// window before it.
    #[must_use]
    pub fn trends(&self, graph: &Graph, now: DateTime<Utc>) -> Vec<Insight> {
        let window = self.config.trend_window();
        let Some((recent_start, prior_start)) = now
            .checked_sub_signed(window)
            .and_then(|recent| Some((recent, recent.checked_sub_signed(window)?)))
        else {
            tracing::warn!(
                days = self.config.trend_window_days,
                "trend window exceeds the representable time range; skipping trends"
            );
            return Vec::new();
        };

        graph
            .nodes()
            .filter_map(|node| {
                let (prior, recent) = node
                    .observations
                    .iter()
                    .filter(|seen| **seen <= now && **seen > prior_start)
                    .fold((0u64, 0u64), |(prior, recent), seen| {
                        if *seen > recent_start {
                            (prior, recent + 1)
                        } else {
                            (prior + 1, recent)
                        }
                    });

                if recent < self.config.trend_min_recent.max(1)
                    || recent as f64 <= self.config.trend_multiplier * prior as f64
                {
                    return None;
                }
                let confidence = 1.0 - (prior as f64).max(0.5) / recent as f64;
                Some(Insight::new(
                    InsightKind::Trend,
                    format!(
                        "{} '{}' seen {} times in the last {} days, {} in the days before",
                        node.kind, node.label, recent, self.config.trend_window_days, prior
                    ),
                    confidence,
                    vec![node.id],
                    Vec::new(),
                    now,
                ))
            })
            .collect()
    }

    /// Complete `Symptom -> Cause -> Resolution` chains.
    #[must_use]
    pub fn resolution_paths(&self, graph: &Graph, now: DateTime<Utc>) -> Vec<Insight> {
        graph
            .nodes()
            .filter(|node| node.kind == EntityKind::Symptom)
            .flat_map(|symptom| self.paths_from(graph, symptom, now))
            .collect()
    }

    fn paths_from(&self, graph: &Graph, symptom: &Node, now: DateTime<Utc>) -> Vec<Insight> {
        let mut insights = Vec::new();
        for (cause, causes) in causes_of(graph, symptom) {
            for (resolution, resolved_by) in resolutions_of(graph, cause) {
                let confidence = self
                    .decay
                    .strength(causes, now)
                    .min(self.decay.strength(resolved_by, now));
                insights.push(Insight::new(
                    InsightKind::ResolutionPath,
                    format!(
                        "'{}' is caused by '{}', which is resolved by '{}'",
                        symptom.label, cause.label, resolution.label
                    ),
                    confidence,
                    vec![symptom.id, cause.id, resolution.id],
                    vec![causes.id, resolved_by.id],
                    now,
                ));
            }
        }
        insights
    }

    /// Recurring symptoms with neither a direct `resolvedBy` edge nor a
    /// resolution path.
    #[must_use]
    pub fn anomalies(&self, graph: &Graph, now: DateTime<Utc>) -> Vec<Insight> {
        graph
            .nodes()
            .filter(|node| node.kind == EntityKind::Symptom)
            .filter(|node| node.occurrences > self.config.min_support)
            .filter(|node| {
                !graph
                    .incident_edges(node.id)
                    .any(|edge| edge.relation == RelationKind::ResolvedBy)
            })
            .filter(|node| {
                causes_of(graph, node)
                    .into_iter()
                    .all(|(cause, _)| resolutions_of(graph, cause).is_empty())
            })
            .map(|node| {
                Insight::new(
                    InsightKind::Anomaly,
                    format!(
                        "'{}' recurred in {} tickets with no known resolution",
                        node.label, node.occurrences
                    ),
                    self.decay.strength(node, now),
                    vec![node.id],
                    Vec::new(),
                    now,
                )
            })
            .collect()
    }
}

fn label_of(graph: &Graph, id: NodeId) -> &str {
    graph.node(id).map_or("?", |node| node.label.as_str())
}

/// Cause nodes linked to `symptom` by a `causes` edge in either orientation.
fn causes_of<'g>(graph: &'g Graph, symptom: &Node) -> Vec<(&'g Node, &'g Edge)> {
    graph
        .incident_edges(symptom.id)
        .filter(|edge| edge.relation == RelationKind::Causes)
        .filter_map(|edge| {
            let other = graph.node(edge.other(symptom.id)?)?;
            (other.kind == EntityKind::Cause).then_some((other, edge))
        })
        .collect()
}

/// Resolution nodes reached from `cause` by an outgoing `resolvedBy` edge.
fn resolutions_of<'g>(graph: &'g Graph, cause: &Node) -> Vec<(&'g Node, &'g Edge)> {
    graph
        .edges_from(cause.id)
        .filter(|edge| edge.relation == RelationKind::ResolvedBy)
        .filter_map(|edge| {
            let other = graph.node(edge.target)?;
            (other.kind == EntityKind::Resolution).then_some((other, edge))
        })
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 20, 12, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    fn engine() -> InsightEngine {
        InsightEngine::new(InsightConfig::default(), DecayPolicy::new(Duration::days(30)))
    }

    fn insight(confidence: f64, at: DateTime<Utc>, tag: u64) -> Insight {
        Insight::new(
            InsightKind::Trend,
            format!("insight {}", tag),
            confidence,
            vec![NodeId(tag)],
            Vec::new(),
            at,
        )
    }

    #[test]
    fn ranking_orders_by_confidence_then_time() {
        let mut insights = vec![
            insight(0.9, t0() + Duration::seconds(1), 1),
            insight(0.4, t0(), 2),
            insight(0.9, t0(), 3),
        ];
        rank_insights(&mut insights);

        let order: Vec<_> = insights.iter().map(|i| i.supporting_node_ids[0].0).collect();
        assert_eq!(order, vec![3, 1, 2]);
    }

    #[test]
    fn ranking_is_stable_for_identical_keys() {
        let mut insights = vec![insight(0.9, t0(), 1), insight(0.4, t0(), 2), insight(0.9, t0(), 3)];
        rank_insights(&mut insights);

        let order: Vec<_> = insights.iter().map(|i| i.supporting_node_ids[0].0).collect();
        assert_eq!(order, vec![1, 3, 2]);
    }

    #[test]
    fn insight_ids_are_deterministic() {
        let a = insight(0.5, t0(), 7);
        let b = insight(0.9, t0() + Duration::days(1), 7);
        let c = insight(0.5, t0(), 8);
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
    }

    fn reinforced_edge(graph: &mut Graph, times: usize, confidence: f64) -> EdgeId {
        let mut edge = EdgeId(0);
        for _ in 0..times {
            let s = graph
                .upsert_node(EntityKind::Symptom, "vpn drops", confidence, t0())
                .expect("node");
            let c = graph
                .upsert_node(EntityKind::Component, "vpn client", confidence, t0())
                .expect("node");
            edge = graph
                .upsert_edge(s, c, RelationKind::RelatedTo, confidence, t0())
                .expect("edge");
        }
        edge
    }

    #[test]
    fn co_occurrence_needs_strength_and_support() {
        let mut strong = Graph::new();
        let id = reinforced_edge(&mut strong, 4, 0.9);
        let found = engine().co_occurrences(&strong, t0());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].supporting_edge_ids, vec![id]);
        assert!((found[0].confidence_score - 0.9).abs() < 1e-9);

        let mut rare = Graph::new();
        reinforced_edge(&mut rare, 3, 0.9);
        assert!(engine().co_occurrences(&rare, t0()).is_empty());

        let mut weak = Graph::new();
        reinforced_edge(&mut weak, 5, 0.5);
        assert!(engine().co_occurrences(&weak, t0()).is_empty());
    }

    #[test]
    fn co_occurrence_fades_with_age() {
        let mut graph = Graph::new();
        reinforced_edge(&mut graph, 5, 0.9);
        assert!(engine().co_occurrences(&graph, t0() + Duration::days(30)).is_empty());
    }

    #[test]
    fn trend_fires_on_burst() {
        let mut graph = Graph::new();
        graph
            .upsert_node(EntityKind::Symptom, "login loop", 0.5, t0() - Duration::days(10))
            .expect("node");
        for hours in [1, 5, 20, 40] {
            graph
                .upsert_node(EntityKind::Symptom, "login loop", 0.5, t0() - Duration::hours(hours))
                .expect("node");
        }

        let trends = engine().trends(&graph, t0());
        assert_eq!(trends.len(), 1);
        assert!((trends[0].confidence_score - 0.75).abs() < 1e-9);
    }

    #[test]
    fn trend_ignores_steady_nodes() {
        let mut graph = Graph::new();
        for days in [1, 2, 8, 9] {
            graph
                .upsert_node(EntityKind::Symptom, "steady", 0.5, t0() - Duration::days(days))
                .expect("node");
        }
        assert!(engine().trends(&graph, t0()).is_empty());
    }

    #[test]
    fn trend_window_beyond_calendar_yields_nothing() {
        let mut graph = Graph::new();
        for hours in [1, 5, 20] {
            graph
                .upsert_node(EntityKind::Symptom, "login loop", 0.5, t0() - Duration::hours(hours))
                .expect("node");
        }
        let huge = InsightEngine::new(
            InsightConfig {
                trend_window_days: 1e12,
                ..InsightConfig::default()
            },
            DecayPolicy::new(Duration::days(30)),
        );

        assert!(huge.trends(&graph, t0()).is_empty());
        assert!(
            huge.generate(&graph, t0())
                .iter()
                .all(|i| i.kind != InsightKind::Trend)
        );
    }

    fn chain(graph: &mut Graph, causes_from_cause: bool) -> (NodeId, NodeId, NodeId) {
        let s = graph
            .upsert_node(EntityKind::Symptom, "blue screen", 0.9, t0())
            .expect("node");
        let c = graph
            .upsert_node(EntityKind::Cause, "bad driver", 0.9, t0())
            .expect("node");
        let r = graph
            .upsert_node(EntityKind::Resolution, "roll back driver", 0.9, t0())
            .expect("node");
        if causes_from_cause {
            graph
                .upsert_edge(c, s, RelationKind::Causes, 0.8, t0())
                .expect("edge");
        } else {
            graph
                .upsert_edge(s, c, RelationKind::Causes, 0.8, t0())
                .expect("edge");
        }
        graph
            .upsert_edge(c, r, RelationKind::ResolvedBy, 0.6, t0())
            .expect("edge");
        (s, c, r)
    }

    #[test]
    fn resolution_path_accepts_either_causes_orientation() {
        for orientation in [true, false] {
            let mut graph = Graph::new();
            let (s, c, r) = chain(&mut graph, orientation);
            let paths = engine().resolution_paths(&graph, t0());
            assert_eq!(paths.len(), 1);
            assert_eq!(paths[0].supporting_node_ids, vec![s, c, r]);
            assert!((paths[0].confidence_score - 0.6).abs() < 1e-9);
        }
    }

    #[test]
    fn anomaly_flags_unresolved_recurring_symptom() {
        let mut graph = Graph::new();
        for _ in 0..4 {
            graph
                .upsert_node(EntityKind::Symptom, "printer jam", 0.8, t0())
                .expect("node");
        }
        let anomalies = engine().anomalies(&graph, t0());
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].kind, InsightKind::Anomaly);
    }

    #[test]
    fn anomaly_skips_resolved_symptom() {
        let mut graph = Graph::new();
        chain(&mut graph, true);
        for _ in 0..4 {
            graph
                .upsert_node(EntityKind::Symptom, "blue screen", 0.8, t0())
                .expect("node");
        }
        assert!(engine().anomalies(&graph, t0()).is_empty());
    }
}
