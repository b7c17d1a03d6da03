//! # Layout Engine
//!
//! Projects the graph into 2D coordinates for visualization.
//!
//! Four strategies are available:
//! - `force`: seeded force-directed placement, bounded iterations
//! - `hierarchical`: BFS levels from root nodes along directed relations
//! - `circular`: evenly spaced on a circle, ordered by `(type, label)`
//! - `grid`: row-major on a square grid, same order
//!
//! Every strategy is deterministic for a given graph, clock and config.

use crate::confidence::DecayPolicy;
use crate::config::LayoutConfig;
use crate::graph::Graph;
use crate::primitives::MIN_DISTANCE_SQUARED;
use crate::types::{Edge, EngineError, EntityKind, Node, NodeId};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::f64::consts::TAU;
use std::fmt;

// =============================================================================
// LAYOUT KIND
// =============================================================================

/// The supported layout strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutKind {
    Force,
    Hierarchical,
    Circular,
    Grid,
}

impl LayoutKind {
    pub const ALL: [LayoutKind; 4] = [
        LayoutKind::Force,
        LayoutKind::Hierarchical,
        LayoutKind::Circular,
        LayoutKind::Grid,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LayoutKind::Force => "force",
            LayoutKind::Hierarchical => "hierarchical",
            LayoutKind::Circular => "circular",
            LayoutKind::Grid => "grid",
        }
    }
}

impl fmt::Display for LayoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LayoutKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        LayoutKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| EngineError::InvalidArgument(format!("unknown layout '{}'", s)))
    }
}

// =============================================================================
// OUTPUT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualNode {
    pub id: NodeId,
    pub x: f64,
    pub y: f64,
    pub size: f64,
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualEdge {
    pub source_id: NodeId,
    pub target_id: NodeId,
    /// Effective (decayed) weight.
    pub weight: f64,
}

/// A laid-out graph, ready for rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationGraph {
    pub layout: LayoutKind,
    pub nodes: Vec<VisualNode>,
    pub edges: Vec<VisualEdge>,
}

// =============================================================================
// ENGINE
// =============================================================================

/// Nodes and edges selected for one layout run, indexed densely.
struct Scene<'g> {
    nodes: Vec<&'g Node>,
    weights: Vec<f64>,
    links: Vec<Link<'g>>,
}

struct Link<'g> {
    source: usize,
    target: usize,
    strength: f64,
    weight: f64,
    edge: &'g Edge,
}

type Point = (f64, f64);

/// Layout generator over a read-only graph.
#[derive(Debug, Clone)]
pub struct LayoutEngine {
    config: LayoutConfig,
    decay: DecayPolicy,
}

impl LayoutEngine {
    #[must_use]
    pub fn new(config: LayoutConfig, decay: DecayPolicy) -> Self {
        Self { config, decay }
    }

    #[must_use]
    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Lay out `graph` as seen at `now`.
    #[must_use]
    pub fn generate(
        &self,
        graph: &Graph,
        kind: LayoutKind,
        now: DateTime<Utc>,
    ) -> VisualizationGraph {
        let scene = self.scene(graph, now);
        let positions = match kind {
            LayoutKind::Force => self.force(&scene),
            LayoutKind::Hierarchical => self.hierarchical(&scene),
            LayoutKind::Circular => self.circular(&scene),
            LayoutKind::Grid => self.grid(&scene),
        };

        let nodes = scene
            .nodes
            .iter()
            .zip(&scene.weights)
            .zip(positions)
            .map(|((node, weight), (x, y))| VisualNode {
                id: node.id,
                x,
                y,
                size: self.config.min_size + self.config.size_scale * weight.ln_1p(),
                kind: node.kind,
                label: node.label.clone(),
            })
            .collect();
        let edges = scene
            .links
            .iter()
            .map(|link| VisualEdge {
                source_id: link.edge.source,
                target_id: link.edge.target,
                weight: link.weight,
            })
            .collect();

        tracing::debug!(layout = %kind, nodes = scene.nodes.len(), "layout generated");
        VisualizationGraph {
            layout: kind,
            nodes,
            edges,
        }
    }

    /// Select the nodes to draw, heaviest first when the graph is too big,
    /// and keep the edges between them.
    fn scene<'g>(&self, graph: &'g Graph, now: DateTime<Utc>) -> Scene<'g> {
        let mut selected: Vec<(&Node, f64)> = graph
            .nodes()
            .map(|node| (node, self.decay.effective_weight(node, now)))
            .collect();

        if selected.len() > self.config.max_nodes {
            tracing::debug!(
                total = selected.len(),
                kept = self.config.max_nodes,
                "truncating graph for layout"
            );
            selected.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.id.cmp(&b.0.id)));
            selected.truncate(self.config.max_nodes);
            selected.sort_by_key(|(node, _)| node.id);
        }

        let index: BTreeMap<NodeId, usize> = selected
            .iter()
            .enumerate()
            .map(|(i, (node, _))| (node.id, i))
            .collect();
        let links = graph
            .edges()
            .filter_map(|edge| {
                Some(Link {
                    source: *index.get(&edge.source)?,
                    target: *index.get(&edge.target)?,
                    strength: self.decay.strength(edge, now),
                    weight: self.decay.effective_weight(edge, now),
                    edge,
                })
            })
            .collect();

        let (nodes, weights) = selected.into_iter().unzip();
        Scene {
            nodes,
            weights,
            links,
        }
    }

    /// Seeded force-directed layout.
    ///
    /// Repulsion `k^2 / d^2` between every pair, attraction along edges of
    /// `strength * d`, displacement capped by a linearly cooling
    /// temperature. Stops early once no node moves more than `epsilon`.
    fn force(&self, scene: &Scene<'_>) -> Vec<Point> {
        let n = scene.nodes.len();
        let (width, height) = (self.config.width, self.config.height);
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut positions: Vec<Point> = (0..n)
            .map(|_| (rng.gen_range(0.0..width), rng.gen_range(0.0..height)))
            .collect();
        if n < 2 {
            return positions;
        }

        let k = (width * height / n as f64).sqrt();
        let k2 = k * k;
        let start_temperature = width.max(height) / 10.0;

        for iteration in 0..self.config.iterations {
            let mut displacement = vec![(0.0_f64, 0.0_f64); n];

            for i in 0..n {
                for j in (i + 1)..n {
                    let dx = positions[i].0 - positions[j].0;
                    let dy = positions[i].1 - positions[j].1;
                    let d2 = (dx * dx + dy * dy).max(MIN_DISTANCE_SQUARED);
                    let d = d2.sqrt();
                    let push = k2 / d2 / d;
                    displacement[i].0 += dx * push;
                    displacement[i].1 += dy * push;
                    displacement[j].0 -= dx * push;
                    displacement[j].1 -= dy * push;
                }
            }

            for link in &scene.links {
                let (a, b) = (link.source, link.target);
                let dx = positions[a].0 - positions[b].0;
                let dy = positions[a].1 - positions[b].1;
                displacement[a].0 -= dx * link.strength;
                displacement[a].1 -= dy * link.strength;
                displacement[b].0 += dx * link.strength;
                displacement[b].1 += dy * link.strength;
            }

            let temperature =
                start_temperature * (1.0 - iteration as f64 / self.config.iterations as f64);
            let mut largest_step = 0.0_f64;
            for (position, (dx, dy)) in positions.iter_mut().zip(displacement) {
                let length = (dx * dx + dy * dy).sqrt();
                if length <= 0.0 {
                    continue;
                }
                let step = length.min(temperature);
                position.0 = (position.0 + dx / length * step).clamp(0.0, width);
                position.1 = (position.1 + dy / length * step).clamp(0.0, height);
                largest_step = largest_step.max(step);
            }

            if largest_step < self.config.epsilon {
                tracing::trace!(iteration, "force layout converged");
                break;
            }
        }
        positions
    }

    /// BFS levels from the roots of the `causes`/`partOf` hierarchy.
    fn hierarchical(&self, scene: &Scene<'_>) -> Vec<Point> {
        let n = scene.nodes.len();
        let mut has_parent = vec![false; n];
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
        for link in &scene.links {
            children[link.source].push(link.target);
            if link.edge.relation.is_symmetric() {
                children[link.target].push(link.source);
            }
            if link.edge.relation.is_hierarchical() {
                has_parent[link.target] = true;
            }
        }

        let by_weight = |indices: &mut Vec<usize>| {
            indices.sort_by(|&a, &b| {
                scene.weights[b]
                    .total_cmp(&scene.weights[a])
                    .then_with(|| scene.nodes[a].id.cmp(&scene.nodes[b].id))
            });
        };
        let mut roots: Vec<usize> = (0..n).filter(|&i| !has_parent[i]).collect();
        by_weight(&mut roots);
        let mut rest: Vec<usize> = (0..n).filter(|&i| has_parent[i]).collect();
        by_weight(&mut rest);

        let mut level: Vec<Option<usize>> = vec![None; n];
        let mut slots_per_level: Vec<usize> = Vec::new();
        let mut positions = vec![(0.0, 0.0); n];
        let spacing = self.config.spacing;

        for seed in roots.into_iter().chain(rest) {
            if level[seed].is_some() {
                continue;
            }
            level[seed] = Some(0);
            let mut queue = VecDeque::from([seed]);
            while let Some(current) = queue.pop_front() {
                let depth = level[current].unwrap_or(0);
                if slots_per_level.len() <= depth {
                    slots_per_level.resize(depth + 1, 0);
                }
                let slot = slots_per_level[depth];
                slots_per_level[depth] += 1;
                positions[current] = (slot as f64 * spacing, depth as f64 * spacing);

                for &child in &children[current] {
                    if level[child].is_none() {
                        level[child] = Some(depth + 1);
                        queue.push_back(child);
                    }
                }
            }
        }
        positions
    }

    /// Evenly spaced on a circle around the canvas center.
    fn circular(&self, scene: &Scene<'_>) -> Vec<Point> {
        let n = scene.nodes.len();
        let (cx, cy) = (self.config.width / 2.0, self.config.height / 2.0);
        let radius = self.config.radius;
        let mut positions = vec![(0.0, 0.0); n];
        for (rank, index) in display_order(scene).into_iter().enumerate() {
            let angle = TAU * rank as f64 / n as f64;
            positions[index] = (cx + radius * angle.cos(), cy + radius * angle.sin());
        }
        positions
    }

    /// Row-major on `ceil(sqrt(n))` columns.
    fn grid(&self, scene: &Scene<'_>) -> Vec<Point> {
        let n = scene.nodes.len();
        let columns = ((n as f64).sqrt().ceil() as usize).max(1);
        let spacing = self.config.spacing;
        let mut positions = vec![(0.0, 0.0); n];
        for (rank, index) in display_order(scene).into_iter().enumerate() {
            let (row, column) = (rank / columns, rank % columns);
            positions[index] = (column as f64 * spacing, row as f64 * spacing);
        }
        positions
    }
}

/// Scene indices ordered by `(type, normalized label)`, ties by id.
fn display_order(scene: &Scene<'_>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scene.nodes.len()).collect();
    order.sort_by(|&a, &b| {
        let (x, y) = (scene.nodes[a], scene.nodes[b]);
        x.kind
            .cmp(&y.kind)
            .then_with(|| x.normalized_label.cmp(&y.normalized_label))
            .then_with(|| x.id.cmp(&y.id))
    });
    order
}

// =============================================================================
// TESTS
// =============================================================================
