//! Node/edge graph: neurons, pathways, and how they are wired.
//!
//! The graph is created wholesale from a target density and recreated on
//! resize or optimization-level change. Ids are indices into the node and edge
//! vectors, so a rebuild can never leave an edge pointing at a removed node.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::prng::Prng;
use crate::spatial::{SpatialGrid, Vec2};

pub type NodeId = usize;
pub type EdgeId = usize;

/// Extra connection slots granted to connector nodes.
pub const CONNECTOR_EXTRA_SLOTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum NodeKind {
    Standard,
    Processor,
    Memory,
    Connector,
    Input,
    Output,
}

impl NodeKind {
    pub const ALL: [NodeKind; 6] = [
        NodeKind::Standard,
        NodeKind::Processor,
        NodeKind::Memory,
        NodeKind::Connector,
        NodeKind::Input,
        NodeKind::Output,
    ];

    pub fn max_connections(self) -> usize {
        match self {
            NodeKind::Standard => 3,
            NodeKind::Processor => 5,
            NodeKind::Memory => 4,
            NodeKind::Connector => 3 + CONNECTOR_EXTRA_SLOTS,
            NodeKind::Input => 2,
            NodeKind::Output => 2,
        }
    }

    /// Added to the configured base threshold.
    pub fn threshold_offset(self) -> f32 {
        match self {
            NodeKind::Standard => 0.0,
            NodeKind::Processor => 0.05,
            NodeKind::Memory => 0.0,
            NodeKind::Connector => -0.05,
            NodeKind::Input => -0.1,
            NodeKind::Output => 0.1,
        }
    }

    pub fn radius_range(self) -> (f32, f32) {
        match self {
            NodeKind::Standard => (1.5, 2.5),
            NodeKind::Processor => (2.5, 3.5),
            NodeKind::Memory => (2.0, 3.0),
            NodeKind::Connector => (1.2, 2.0),
            NodeKind::Input => (2.0, 2.8),
            NodeKind::Output => (2.0, 2.8),
        }
    }

    /// Relative visual weight (glow size and alpha boost).
    pub fn render_weight(self) -> f32 {
        match self {
            NodeKind::Standard => 1.0,
            NodeKind::Processor => 1.4,
            NodeKind::Memory => 1.2,
            NodeKind::Connector => 0.8,
            NodeKind::Input => 1.1,
            NodeKind::Output => 1.1,
        }
    }

    fn pick(rng: &mut Prng) -> Self {
        // Weighted: mostly standard neurons with a sprinkling of specialists.
        let r = rng.next_f32_01();
        match r {
            r if r < 0.50 => NodeKind::Standard,
            r if r < 0.62 => NodeKind::Processor,
            r if r < 0.74 => NodeKind::Memory,
            r if r < 0.84 => NodeKind::Connector,
            r if r < 0.92 => NodeKind::Input,
            _ => NodeKind::Output,
        }
    }
}

/// Classification of a pathway from its endpoint kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PathwayKind {
    Local,
    Relay,
    Associative,
    Afferent,
    Efferent,
}

impl PathwayKind {
    pub fn classify(a: NodeKind, b: NodeKind) -> Self {
        use NodeKind::*;
        match (a, b) {
            (Input, _) | (_, Input) => PathwayKind::Afferent,
            (Output, _) | (_, Output) => PathwayKind::Efferent,
            (Memory, _) | (_, Memory) => PathwayKind::Associative,
            (Processor | Connector, _) | (_, Processor | Connector) => PathwayKind::Relay,
            (Standard, Standard) => PathwayKind::Local,
        }
    }

    /// Whether packets travel this pathway unconditionally.
    pub fn always_carries_data(self) -> bool {
        match self {
            PathwayKind::Relay | PathwayKind::Afferent | PathwayKind::Efferent => true,
            PathwayKind::Local | PathwayKind::Associative => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Idle,
    Firing,
    Refractory,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub pos: Vec2,
    pub vel: Vec2,
    pub radius: f32,
    pub layer: u8,

    // Always within [0,1].
    pub activity: f32,
    pub last_activated_at: Option<f64>,
    pub refractory_ms: f64,
    pub firing_threshold: f32,

    pub kind: NodeKind,
    pub edges: Vec<EdgeId>,
}

impl Node {
    pub fn new(id: NodeId, pos: Vec2, kind: NodeKind) -> Self {
        Self {
            id,
            pos,
            vel: Vec2::default(),
            radius: 2.0,
            layer: 0,
            activity: 0.0,
            last_activated_at: None,
            refractory_ms: 500.0,
            firing_threshold: 0.35,
            kind,
            edges: Vec::new(),
        }
    }

    #[inline]
    pub fn is_refractory(&self, now: f64) -> bool {
        match self.last_activated_at {
            Some(t) => now - t < self.refractory_ms,
            None => false,
        }
    }

    /// `dwell_ms` is how long a node counts as firing after activation.
    pub fn state(&self, now: f64, dwell_ms: f64) -> NodeState {
        match self.last_activated_at {
            Some(t) if now - t < dwell_ms.min(self.refractory_ms) => NodeState::Firing,
            Some(t) if now - t < self.refractory_ms => NodeState::Refractory,
            _ => NodeState::Idle,
        }
    }

    #[inline]
    pub fn max_connections(&self) -> usize {
        self.kind.max_connections()
    }
}

#[derive(Debug, Clone)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,

    // Always within [0,1].
    pub activity: f32,
    pub last_activated_at: Option<f64>,
    pub activation_window_ms: f64,

    /// Quadratic curve control point used when drawing.
    pub control: Vec2,
    pub data_flow_enabled: bool,
    pub kind: PathwayKind,
}

impl Edge {
    /// The endpoint opposite `node`, if `node` is an endpoint.
    #[inline]
    pub fn other(&self, node: NodeId) -> Option<NodeId> {
        if node == self.source {
            Some(self.target)
        } else if node == self.target {
            Some(self.source)
        } else {
            None
        }
    }

    /// Within the activation window since last activation.
    #[inline]
    pub fn is_live(&self, now: f64) -> bool {
        matches!(self.last_activated_at, Some(t) if now - t < self.activation_window_ms)
    }
}

/// Surface size in px; both sides at least 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub width: f32,
    pub height: f32,
}

impl Bounds {
    pub fn new(width: f32, height: f32) -> Self {
        let clamp = |v: f32| if v.is_finite() && v >= 1.0 { v } else { 1.0 };
        Self {
            width: clamp(width),
            height: clamp(height),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl Graph {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of nodes a surface of `bounds` gets at `density`, capped at `max_nodes`.
    pub fn target_node_count(bounds: Bounds, density: f32, max_nodes: usize) -> usize {
        let area = (bounds.width as f64) * (bounds.height as f64);
        let want = (area / 10_000.0 * density as f64).round();
        let want = if want.is_finite() { want.max(1.0) as usize } else { 1 };
        want.min(max_nodes)
    }

    /// Generate a fresh graph. Uses `grid` for candidate discovery and leaves it
    /// populated with the new node positions.
    pub fn generate(
        cfg: &EngineConfig,
        bounds: Bounds,
        max_nodes: usize,
        rng: &mut Prng,
        grid: &mut SpatialGrid,
    ) -> Self {
        let count = Self::target_node_count(bounds, cfg.density, max_nodes);
        let margin = (bounds.width.min(bounds.height) * 0.02).min(20.0);

        let mut nodes = Vec::with_capacity(count);
        for id in 0..count {
            let kind = NodeKind::pick(rng);
            let (rmin, rmax) = kind.radius_range();
            let angle = rng.gen_range_f32(0.0, core::f32::consts::TAU);
            let speed = cfg.drift_speed * rng.gen_range_f32(0.3, 1.0);

            let mut n = Node::new(
                id,
                Vec2::new(
                    rng.gen_range_f32(margin, (bounds.width - margin).max(margin)),
                    rng.gen_range_f32(margin, (bounds.height - margin).max(margin)),
                ),
                kind,
            );
            n.vel = Vec2::new(angle.cos() * speed, angle.sin() * speed);
            n.radius = rng.gen_range_f32(rmin, rmax);
            n.layer = rng.gen_range_usize(0, cfg.layers as usize) as u8;
            n.refractory_ms = rng.gen_range_f64(cfg.refractory_min_ms, cfg.refractory_max_ms);
            n.firing_threshold = (cfg.base_threshold + kind.threshold_offset()).clamp(0.05, 1.0);
            n.activity = cfg.propagation.activity_floor;
            nodes.push(n);
        }

        Self::wire(
            nodes,
            cfg.connection_radius,
            cfg.propagation.activation_window_ms,
            rng,
            grid,
        )
    }

    /// Wire pre-placed nodes. Node ids are reassigned to their index.
    ///
    /// Each node connects to its closest candidates within `radius` whose layer
    /// differs by at most one, up to both endpoints' connection caps. Edges only
    /// go from the lower id to the higher id, so no pair is wired twice.
    pub fn wire(
        mut nodes: Vec<Node>,
        radius: f32,
        activation_window_ms: f64,
        rng: &mut Prng,
        grid: &mut SpatialGrid,
    ) -> Self {
        for (i, n) in nodes.iter_mut().enumerate() {
            n.id = i;
            n.edges.clear();
        }
        grid.rebuild(nodes.iter().map(|n| (n.id, n.pos)));

        let mut edges: Vec<Edge> = Vec::new();
        let mut candidates = Vec::new();

        for i in 0..nodes.len() {
            let cap_i = nodes[i].max_connections();
            if nodes[i].edges.len() >= cap_i {
                continue;
            }

            candidates.clear();
            let (pos_i, layer_i) = (nodes[i].pos, nodes[i].layer);
            grid.for_each_near(pos_i, radius, |nb| {
                if nb.id > i && nodes[nb.id].layer.abs_diff(layer_i) <= 1 {
                    candidates.push(nb);
                }
            });
            candidates.sort_by(|a, b| a.dist.total_cmp(&b.dist).then(a.id.cmp(&b.id)));

            for nb in candidates.iter() {
                if nodes[i].edges.len() >= cap_i {
                    break;
                }
                let j = nb.id;
                if nodes[j].edges.len() >= nodes[j].max_connections() {
                    continue;
                }

                let id = edges.len();
                let (a, b) = (nodes[i].pos, nodes[j].pos);
                let mid = a.lerp(b, 0.5);
                // Bow the curve sideways by up to a fifth of its length.
                let bow = rng.gen_range_f32(-0.2, 0.2);
                let control = Vec2::new(mid.x - (b.y - a.y) * bow, mid.y + (b.x - a.x) * bow);
                let kind = PathwayKind::classify(nodes[i].kind, nodes[j].kind);

                edges.push(Edge {
                    id,
                    source: i,
                    target: j,
                    activity: 0.0,
                    last_activated_at: None,
                    activation_window_ms,
                    control,
                    data_flow_enabled: kind.always_carries_data() || rng.chance(0.5),
                    kind,
                });
                nodes[i].edges.push(id);
                nodes[j].edges.push(id);
            }
        }

        Self { nodes, edges }
    }

    #[inline]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    #[inline]
    pub fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    #[inline]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    #[inline]
    pub fn edges_mut(&mut self) -> &mut [Edge] {
        &mut self.edges
    }

    /// Nodes and edges borrowed mutably at the same time.
    #[inline]
    pub fn split_mut(&mut self) -> (&mut [Node], &mut [Edge]) {
        (&mut self.nodes, &mut self.edges)
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    #[inline]
    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id)
    }

    pub fn has_edge_between(&self, a: NodeId, b: NodeId) -> bool {
        self.nodes.get(a).is_some_and(|n| {
            n.edges
                .iter()
                .any(|&e| self.edges[e].other(a) == Some(b))
        })
    }

    /// Move nodes by their velocity and bounce off the bounds.
    pub fn drift(&mut self, dt: f32, bounds: Bounds) {
        for n in &mut self.nodes {
            n.pos.x += n.vel.x * dt;
            n.pos.y += n.vel.y * dt;
            if n.pos.x < 0.0 || n.pos.x > bounds.width {
                n.vel.x = -n.vel.x;
                n.pos.x = n.pos.x.clamp(0.0, bounds.width);
            }
            if n.pos.y < 0.0 || n.pos.y > bounds.height {
                n.vel.y = -n.vel.y;
                n.pos.y = n.pos.y.clamp(0.0, bounds.height);
            }
        }
    }

    /// Structural invariants: ids match indices, edges join two distinct
    /// existing nodes, incidence lists agree, activity stays in [0,1].
    pub fn check_invariants(&self) -> Result<(), String> {
        for (i, n) in self.nodes.iter().enumerate() {
            if n.id != i {
                return Err(format!("node {i} has id {}", n.id));
            }
            if !(0.0..=1.0).contains(&n.activity) {
                return Err(format!("node {i} activity {}", n.activity));
            }
            for &e in &n.edges {
                let edge = self.edges.get(e).ok_or(format!("node {i} lists missing edge {e}"))?;
                if edge.other(i).is_none() {
                    return Err(format!("node {i} lists foreign edge {e}"));
                }
            }
        }
        for (i, e) in self.edges.iter().enumerate() {
            if e.id != i {
                return Err(format!("edge {i} has id {}", e.id));
            }
            if e.source == e.target {
                return Err(format!("edge {i} is a self loop"));
            }
            if e.source >= self.nodes.len() || e.target >= self.nodes.len() {
                return Err(format!("edge {i} references a missing node"));
            }
            if !(0.0..=1.0).contains(&e.activity) {
                return Err(format!("edge {i} activity {}", e.activity));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire_points(points: &[(f32, f32)], radius: f32) -> Graph {
        let nodes = points
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| Node::new(i, Vec2::new(x, y), NodeKind::Standard))
            .collect();
        let mut grid = SpatialGrid::new(radius);
        Graph::wire(nodes, radius, 600.0, &mut Prng::new(1), &mut grid)
    }

    #[test]
    fn wires_only_pairs_within_radius() {
        // (40,0)-(0,40) is ~56.6 apart, so only the two legs through the
        // origin fall inside a radius of 50; the far node stays isolated.
        let g = wire_points(&[(0.0, 0.0), (40.0, 0.0), (0.0, 40.0), (100.0, 100.0)], 50.0);
        assert!(g.has_edge_between(0, 1));
        assert!(g.has_edge_between(0, 2));
        assert!(!g.has_edge_between(1, 2));
        assert!(g.nodes()[3].edges.is_empty());
        assert_eq!(g.edges().len(), 2);
        g.check_invariants().unwrap();
    }

    #[test]
    fn close_triangle_is_fully_connected() {
        let g = wire_points(&[(0.0, 0.0), (40.0, 0.0), (20.0, 30.0), (100.0, 100.0)], 50.0);
        assert!(g.has_edge_between(0, 1));
        assert!(g.has_edge_between(0, 2));
        assert!(g.has_edge_between(1, 2));
        assert!(g.nodes()[3].edges.is_empty());
        assert_eq!(g.edges().len(), 3);
        for e in g.edges() {
            assert!(e.source < e.target);
        }
    }

    #[test]
    fn connection_caps_are_respected() {
        // Tight cluster: everyone is in range of everyone.
        let points: Vec<(f32, f32)> = (0..20).map(|i| ((i % 5) as f32, (i / 5) as f32)).collect();
        let g = wire_points(&points, 50.0);
        for n in g.nodes() {
            assert!(n.edges.len() <= NodeKind::Standard.max_connections());
        }
        g.check_invariants().unwrap();
    }

    #[test]
    fn layers_more_than_one_apart_are_not_wired() {
        let mut nodes = vec![
            Node::new(0, Vec2::new(0.0, 0.0), NodeKind::Standard),
            Node::new(1, Vec2::new(10.0, 0.0), NodeKind::Standard),
        ];
        nodes[1].layer = 2;
        let mut grid = SpatialGrid::new(50.0);
        let g = Graph::wire(nodes, 50.0, 600.0, &mut Prng::new(1), &mut grid);
        assert!(g.edges().is_empty());
    }

    #[test]
    fn connector_gets_extra_slots() {
        assert_eq!(
            NodeKind::Connector.max_connections(),
            NodeKind::Standard.max_connections() + CONNECTOR_EXTRA_SLOTS
        );
    }

    #[test]
    fn pathway_classification_is_symmetric() {
        for &a in NodeKind::ALL.iter() {
            for &b in NodeKind::ALL.iter() {
                assert_eq!(PathwayKind::classify(a, b), PathwayKind::classify(b, a));
            }
        }
        assert_eq!(
            PathwayKind::classify(NodeKind::Standard, NodeKind::Standard),
            PathwayKind::Local
        );
        assert_eq!(
            PathwayKind::classify(NodeKind::Memory, NodeKind::Input),
            PathwayKind::Afferent
        );
    }

    #[test]
    fn generate_respects_density_and_cap() {
        let cfg = EngineConfig::default();
        let bounds = Bounds::new(800.0, 600.0);
        let mut grid = SpatialGrid::new(cfg.connection_radius);
        let g = Graph::generate(&cfg, bounds, 1000, &mut Prng::new(5), &mut grid);
        assert_eq!(g.nodes().len(), Graph::target_node_count(bounds, cfg.density, 1000));
        assert!(!g.edges().is_empty());
        g.check_invariants().unwrap();

        let capped = Graph::generate(&cfg, bounds, 10, &mut Prng::new(5), &mut grid);
        assert_eq!(capped.nodes().len(), 10);
    }

    #[test]
    fn node_state_walks_firing_refractory_idle() {
        let mut n = Node::new(0, Vec2::default(), NodeKind::Standard);
        n.refractory_ms = 500.0;
        assert_eq!(n.state(0.0, 100.0), NodeState::Idle);
        n.last_activated_at = Some(1000.0);
        assert_eq!(n.state(1050.0, 100.0), NodeState::Firing);
        assert_eq!(n.state(1300.0, 100.0), NodeState::Refractory);
        assert_eq!(n.state(1500.0, 100.0), NodeState::Idle);
    }

    #[test]
    fn drift_keeps_nodes_in_bounds() {
        let mut nodes = vec![Node::new(0, Vec2::new(799.0, 1.0), NodeKind::Standard)];
        nodes[0].vel = Vec2::new(100.0, -100.0);
        let mut grid = SpatialGrid::new(50.0);
        let mut g = Graph::wire(nodes, 50.0, 600.0, &mut Prng::new(1), &mut grid);
        let bounds = Bounds::new(800.0, 600.0);
        g.drift(0.1, bounds);
        let n = &g.nodes()[0];
        assert!(n.pos.x <= 800.0 && n.pos.y >= 0.0);
        assert!(n.vel.x < 0.0 && n.vel.y > 0.0);
    }
}
