//! Activation propagation: the per-node firing state machine, the decaying
//! wavefront, and activity decay.
//!
//! Multi-hop spread is event driven. Firing a node schedules activations for
//! its neighbours into a min-heap keyed by due time; the engine drains due
//! events once per tick. Every event carries the graph generation it was
//! scheduled against, and a rebuild bumps the generation, so events that
//! outlive their graph are dropped instead of touching the new one.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use hashbrown::HashSet;

use crate::config::PropagationConfig;
use crate::effects::{PulseKind, SpawnRequest};
use crate::graph::{EdgeId, Graph, NodeId};
use crate::prng::Prng;
use crate::spatial::Vec2;

/// Upper bound on events processed per tick; the rest wait for the next tick.
pub const MAX_EVENTS_PER_TICK: usize = 4096;

// Sub-threshold requests still brighten a node a little.
const SUBTHRESHOLD_GAIN: f32 = 0.5;

// Origin fires at or above this intensity leave a pulse ring behind.
const FIRE_PULSE_MIN_INTENSITY: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    Fired,
    /// Still inside the refractory window; nothing changed.
    Refractory,
    BelowThreshold,
    /// Node id does not exist in the current graph.
    Missing,
}

/// A pending activation waiting for its due time.
#[derive(Debug, Clone, Copy)]
struct ScheduledActivation {
    due: f64,
    seq: u64,
    generation: u32,
    node: NodeId,
    intensity: f32,
    hop: u8,
}

impl PartialEq for ScheduledActivation {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScheduledActivation {}

impl PartialOrd for ScheduledActivation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledActivation {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (earliest first, FIFO on ties).
        other
            .due
            .total_cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Raises the decay floor around the active section's center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivityBias {
    pub center: Vec2,
    pub radius: f32,
    pub bias: f32,
}

impl ActivityBias {
    #[inline]
    fn at(&self, p: Vec2) -> f32 {
        let d = p.dist(self.center);
        if d >= self.radius {
            0.0
        } else {
            self.bias * (1.0 - d / self.radius)
        }
    }
}

pub struct PropagationEngine {
    cfg: PropagationConfig,
    queue: BinaryHeap<ScheduledActivation>,
    generation: u32,
    seq: u64,
    active_edges: HashSet<EdgeId>,
    outbox: Vec<SpawnRequest>,

    total_fired: u64,
    dropped_stale: u64,
}

impl PropagationEngine {
    pub fn new(cfg: PropagationConfig) -> Self {
        Self {
            cfg: cfg.sanitized(),
            queue: BinaryHeap::new(),
            generation: 0,
            seq: 0,
            active_edges: HashSet::new(),
            outbox: Vec::new(),
            total_fired: 0,
            dropped_stale: 0,
        }
    }

    #[inline]
    pub fn config(&self) -> &PropagationConfig {
        &self.cfg
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Events still queued, including stale ones not yet discarded.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub fn active_edge_count(&self) -> usize {
        self.active_edges.len()
    }

    #[inline]
    pub fn is_edge_active(&self, edge: EdgeId) -> bool {
        self.active_edges.contains(&edge)
    }

    #[inline]
    pub fn total_fired(&self) -> u64 {
        self.total_fired
    }

    #[inline]
    pub fn dropped_stale(&self) -> u64 {
        self.dropped_stale
    }

    /// Start a new graph generation.
    ///
    /// Queued events are not purged; they are discarded when they come due.
    pub fn reset(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.active_edges.clear();
        self.outbox.clear();
    }

    /// Effects requested since the last call.
    pub fn take_spawns(&mut self) -> Vec<SpawnRequest> {
        std::mem::take(&mut self.outbox)
    }

    /// Queue an activation of `node` at time `due`.
    pub fn schedule(&mut self, node: NodeId, intensity: f32, due: f64, hop: u8) {
        self.seq = self.seq.wrapping_add(1);
        self.queue.push(ScheduledActivation {
            due,
            seq: self.seq,
            generation: self.generation,
            node,
            intensity,
            hop,
        });
    }

    /// Ask `node` to fire with `intensity` at `now`.
    ///
    /// `hop` is the wavefront depth of this request (0 for direct input).
    pub fn request(
        &mut self,
        graph: &mut Graph,
        node: NodeId,
        intensity: f32,
        now: f64,
        hop: u8,
        rng: &mut Prng,
    ) -> FireOutcome {
        let (nodes, edges) = graph.split_mut();
        let Some(n) = nodes.get_mut(node) else {
            return FireOutcome::Missing;
        };
        let intensity = if intensity.is_finite() {
            intensity.clamp(0.0, 1.0)
        } else {
            0.0
        };

        if n.is_refractory(now) {
            return FireOutcome::Refractory;
        }
        if intensity < n.firing_threshold {
            n.activity = n.activity.max(intensity * SUBTHRESHOLD_GAIN).min(1.0);
            return FireOutcome::BelowThreshold;
        }

        n.activity = n.activity.max(intensity).min(1.0);
        n.last_activated_at = Some(now);
        self.total_fired += 1;

        let next = intensity * self.cfg.decay_factor;
        let spread = hop < self.cfg.max_hops;
        let propagate = spread && next >= self.cfg.epsilon;

        for &eid in &n.edges {
            let edge = &mut edges[eid];
            edge.activity = edge.activity.max(intensity).min(1.0);
            edge.last_activated_at = Some(now);
            self.active_edges.insert(eid);

            let Some(neighbor) = edge.other(node) else {
                continue;
            };
            if propagate {
                let delay = rng.gen_range_f64(self.cfg.min_delay_ms, self.cfg.max_delay_ms);
                self.seq = self.seq.wrapping_add(1);
                self.queue.push(ScheduledActivation {
                    due: now + delay,
                    seq: self.seq,
                    generation: self.generation,
                    node: neighbor,
                    intensity: next,
                    hop: hop + 1,
                });
            }
            if spread && edge.data_flow_enabled && rng.chance(self.cfg.packet_chance) {
                self.outbox.push(SpawnRequest::Packet {
                    edge: eid,
                    from: node,
                    to: neighbor,
                    hop,
                });
            }
        }

        if hop == 0 && intensity >= FIRE_PULSE_MIN_INTENSITY {
            self.outbox.push(SpawnRequest::Pulse {
                at: n.pos,
                kind: PulseKind::Fire,
                strength: intensity,
            });
        }

        FireOutcome::Fired
    }

    /// Fire every queued activation due at or before `now`. Returns how many
    /// events were consumed (stale ones included).
    pub fn process_due(&mut self, graph: &mut Graph, now: f64, rng: &mut Prng) -> usize {
        let mut processed = 0;
        while processed < MAX_EVENTS_PER_TICK {
            match self.queue.peek() {
                Some(ev) if ev.due <= now => {}
                _ => break,
            }
            let Some(ev) = self.queue.pop() else {
                break;
            };
            processed += 1;

            if ev.generation != self.generation {
                self.dropped_stale += 1;
                tracing::debug!(node = ev.node, "dropping activation from a previous graph");
                continue;
            }
            // Fire at the scheduled time so refractory windows stay exact even
            // when a tick runs late.
            self.request(graph, ev.node, ev.intensity, ev.due, ev.hop, rng);
        }
        processed
    }

    /// Decay node and edge activity and retire quiet edges from the active set.
    pub fn update(&mut self, graph: &mut Graph, now: f64, dt_secs: f32, bias: Option<ActivityBias>) {
        let dt = if dt_secs.is_finite() { dt_secs.max(0.0) } else { 0.0 };
        let node_keep = (-self.cfg.node_decay_per_sec * dt).exp();
        let edge_keep = (-self.cfg.edge_decay_per_sec * dt).exp();
        let dwell = self.cfg.dwell_ms;
        let base_floor = self.cfg.activity_floor;

        let (nodes, edges) = graph.split_mut();
        for n in nodes.iter_mut() {
            let dwelling = matches!(n.last_activated_at, Some(t) if now - t < dwell);
            if !dwelling {
                let floor = (base_floor + bias.map_or(0.0, |b| b.at(n.pos))).min(1.0);
                n.activity = floor + (n.activity - floor) * node_keep;
            }
            n.activity = if n.activity.is_finite() {
                n.activity.clamp(0.0, 1.0)
            } else {
                base_floor
            };
        }

        let threshold = self.cfg.edge_active_threshold;
        self.active_edges.retain(|&eid| {
            let Some(e) = edges.get_mut(eid) else {
                return false;
            };
            let dwelling = matches!(e.last_activated_at, Some(t) if now - t < dwell);
            if !dwelling {
                e.activity = (e.activity * edge_keep).clamp(0.0, 1.0);
            }
            let keep = e.activity >= threshold || e.is_live(now);
            if !keep {
                e.activity = 0.0;
            }
            keep
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Node, NodeKind};
    use crate::spatial::SpatialGrid;

    /// Nodes 30px apart on a line, each wired to its neighbours.
    fn chain(n: usize, threshold: f32) -> Graph {
        let nodes = (0..n)
            .map(|i| {
                let mut node = Node::new(i, Vec2::new(i as f32 * 30.0, 0.0), NodeKind::Standard);
                node.firing_threshold = threshold;
                node
            })
            .collect();
        let mut grid = SpatialGrid::new(40.0);
        Graph::wire(nodes, 40.0, 600.0, &mut Prng::new(1), &mut grid)
    }

    fn quiet_cfg() -> PropagationConfig {
        PropagationConfig {
            packet_chance: 0.0,
            ..PropagationConfig::default()
        }
    }

    fn drain(p: &mut PropagationEngine, g: &mut Graph, rng: &mut Prng, mut now: f64) -> f64 {
        while p.pending_count() > 0 {
            now += 16.0;
            p.process_due(g, now, rng);
            assert!(now < 60_000.0, "wavefront did not terminate");
        }
        now
    }

    #[test]
    fn refractory_window_blocks_refire() {
        let mut g = chain(2, 0.6);
        g.nodes_mut()[0].refractory_ms = 500.0;
        let mut p = PropagationEngine::new(quiet_cfg());
        let mut rng = Prng::new(1);

        assert_eq!(p.request(&mut g, 0, 0.8, 0.0, 0, &mut rng), FireOutcome::Fired);
        assert_eq!(g.nodes()[0].last_activated_at, Some(0.0));
        let queued = p.pending_count();
        assert_eq!(queued, 1);

        assert_eq!(
            p.request(&mut g, 0, 0.8, 300.0, 0, &mut rng),
            FireOutcome::Refractory
        );
        assert_eq!(g.nodes()[0].last_activated_at, Some(0.0));
        assert_eq!(p.pending_count(), queued);

        assert_eq!(p.request(&mut g, 0, 0.8, 600.0, 0, &mut rng), FireOutcome::Fired);
        assert_eq!(g.nodes()[0].last_activated_at, Some(600.0));
        assert_eq!(p.pending_count(), queued + 1);
    }

    #[test]
    fn below_threshold_does_not_fire() {
        let mut g = chain(2, 0.6);
        let mut p = PropagationEngine::new(quiet_cfg());
        let mut rng = Prng::new(1);
        assert_eq!(
            p.request(&mut g, 0, 0.4, 0.0, 0, &mut rng),
            FireOutcome::BelowThreshold
        );
        assert_eq!(g.nodes()[0].last_activated_at, None);
        assert!(g.nodes()[0].activity > 0.0);
        assert_eq!(p.pending_count(), 0);
        assert_eq!(p.request(&mut g, 99, 1.0, 0.0, 0, &mut rng), FireOutcome::Missing);
    }

    #[test]
    fn wavefront_stops_at_hop_bound() {
        let mut g = chain(12, 0.05);
        let mut p = PropagationEngine::new(quiet_cfg());
        let mut rng = Prng::new(2);

        p.request(&mut g, 0, 1.0, 0.0, 0, &mut rng);
        drain(&mut p, &mut g, &mut rng, 0.0);

        let max_hops = p.config().max_hops as usize;
        for n in g.nodes() {
            let fired = n.last_activated_at.is_some();
            assert_eq!(fired, n.id <= max_hops, "node {}", n.id);
        }
    }

    #[test]
    fn wavefront_stops_below_epsilon() {
        let cfg = PropagationConfig {
            decay_factor: 0.3,
            epsilon: 0.05,
            max_hops: 32,
            ..quiet_cfg()
        };
        let mut g = chain(12, 0.01);
        let mut p = PropagationEngine::new(cfg);
        let mut rng = Prng::new(2);

        p.request(&mut g, 0, 1.0, 0.0, 0, &mut rng);
        drain(&mut p, &mut g, &mut rng, 0.0);

        // 1.0, 0.3, 0.09, then 0.027 < epsilon is never scheduled.
        let fired: Vec<usize> = g
            .nodes()
            .iter()
            .filter(|n| n.last_activated_at.is_some())
            .map(|n| n.id)
            .collect();
        assert_eq!(fired, vec![0, 1, 2]);
    }

    #[test]
    fn stale_generation_events_are_dropped() {
        let mut g = chain(4, 0.05);
        let mut p = PropagationEngine::new(quiet_cfg());
        let mut rng = Prng::new(3);

        p.request(&mut g, 0, 1.0, 0.0, 0, &mut rng);
        assert!(p.pending_count() > 0);
        p.reset();

        let mut fresh = chain(4, 0.05);
        let processed = p.process_due(&mut fresh, 10_000.0, &mut rng);
        assert!(processed > 0);
        assert_eq!(p.dropped_stale(), processed as u64);
        assert!(fresh.nodes().iter().all(|n| n.last_activated_at.is_none()));
    }

    #[test]
    fn events_fire_in_due_order() {
        let mut g = chain(3, 0.05);
        let mut p = PropagationEngine::new(quiet_cfg());
        let mut rng = Prng::new(4);
        p.schedule(2, 0.9, 50.0, 6);
        p.schedule(0, 0.9, 10.0, 6);

        assert_eq!(p.process_due(&mut g, 20.0, &mut rng), 1);
        assert_eq!(g.nodes()[0].last_activated_at, Some(10.0));
        assert!(g.nodes()[2].last_activated_at.is_none());
        assert_eq!(p.process_due(&mut g, 60.0, &mut rng), 1);
        assert_eq!(g.nodes()[2].last_activated_at, Some(50.0));
    }

    #[test]
    fn activity_stays_in_unit_range_and_edges_retire() {
        let mut g = chain(8, 0.1);
        let mut p = PropagationEngine::new(PropagationConfig::default());
        let mut rng = Prng::new(5);
        let bias = ActivityBias {
            center: Vec2::new(60.0, 0.0),
            radius: 100.0,
            bias: 0.9,
        };

        let mut now = 0.0;
        for step in 0..400 {
            now += 16.0;
            if step % 25 == 0 {
                let target = rng.gen_range_usize(0, 8);
                p.request(&mut g, target, 2.0, now, 0, &mut rng);
            }
            p.process_due(&mut g, now, &mut rng);
            p.update(&mut g, now, 0.016, Some(bias));
            g.check_invariants().unwrap();
        }
        assert!(!p.take_spawns().is_empty());

        for _ in 0..400 {
            now += 16.0;
            p.process_due(&mut g, now, &mut rng);
            p.update(&mut g, now, 0.016, None);
        }
        assert_eq!(p.active_edge_count(), 0);
        let floor = p.config().activity_floor;
        for n in g.nodes() {
            assert!((n.activity - floor).abs() < 0.01, "node {} at {}", n.id, n.activity);
        }
    }

    #[test]
    fn section_bias_raises_nearby_floor() {
        let mut g = chain(2, 0.5);
        let mut p = PropagationEngine::new(quiet_cfg());
        let bias = ActivityBias {
            center: Vec2::new(0.0, 0.0),
            radius: 25.0,
            bias: 0.5,
        };
        for i in 0..200 {
            p.update(&mut g, i as f64 * 16.0, 0.016, Some(bias));
        }
        assert!(g.nodes()[0].activity > 0.4);
        assert!(g.nodes()[1].activity < 0.1);
    }
}
