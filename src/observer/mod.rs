use crate::engine::{Diagnostics, Engine};
use crate::governor::{DeviceTier, QualityProfile};
use crate::graph::NodeKind;

#[cfg(feature = "serde")]
use serde::Serialize;

/// A read-only snapshot of what the engine is doing.
///
/// Design intent:
/// - Observers cannot mutate or steer the engine.
/// - Snapshotting is *on-demand* and can allocate; the tick loop stays unchanged.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct EngineSnapshot {
    pub ticks: u64,
    pub rebuilds: u64,
    pub width: f32,
    pub height: f32,
    pub running: bool,

    pub tier: DeviceTier,
    pub reduced_motion: bool,
    pub profile: QualityProfile,
    pub average_fps: Option<f32>,

    pub generation: u32,
    pub total_fired: u64,
    pub dropped_stale: u64,
    pub dropped_packets: u64,
    pub dropped_pulses: u64,
    pub active_section: Option<String>,

    pub node_count: usize,
    pub edge_count: usize,
    pub active_edges: usize,
    pub packets: usize,
    pub pulses: usize,
    pub pending_events: usize,
    pub avg_activity: f32,
}

pub struct EngineAdapter<'a> {
    engine: &'a Engine,
}

impl<'a> EngineAdapter<'a> {
    pub fn new(engine: &'a Engine) -> Self {
        Self { engine }
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let e = self.engine;
        let Diagnostics {
            node_count,
            edge_count,
            active_edges,
            packets,
            pulses,
            pending_events,
            avg_activity,
        } = e.diagnostics();
        let bounds = e.bounds();

        EngineSnapshot {
            ticks: e.ticks(),
            rebuilds: e.rebuilds(),
            width: bounds.width,
            height: bounds.height,
            running: e.is_running(),

            tier: e.governor().tier(),
            reduced_motion: e.governor().reduced_motion(),
            profile: e.profile(),
            average_fps: e.governor().average_fps(),

            generation: e.propagation().generation(),
            total_fired: e.propagation().total_fired(),
            dropped_stale: e.propagation().dropped_stale(),
            dropped_packets: e.effects().dropped_packets(),
            dropped_pulses: e.effects().dropped_pulses(),
            active_section: e.active_section().map(str::to_string),

            node_count,
            edge_count,
            active_edges,
            packets,
            pulses,
            pending_events,
            avg_activity,
        }
    }
}

/// Per-node view for debugging overlays.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct NodeView {
    pub id: usize,
    pub x: f32,
    pub y: f32,
    pub kind: NodeKind,
    pub activity: f32,
    pub degree: usize,
}

impl EngineAdapter<'_> {
    pub fn nodes(&self) -> Vec<NodeView> {
        self.engine
            .graph()
            .nodes()
            .iter()
            .map(|n| NodeView {
                id: n.id,
                x: n.pos.x,
                y: n.pos.y,
                kind: n.kind,
                activity: n.activity,
                degree: n.edges.len(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::HostContext;
    use crate::render::RecordingSurface;

    #[test]
    fn snapshot_tracks_engine() {
        let mut surface = RecordingSurface::new(640.0, 480.0);
        let cfg = EngineConfig {
            seed: Some(7),
            ..EngineConfig::default()
        };
        let mut engine = Engine::initialize(cfg, HostContext::default(), Some(&surface)).unwrap();
        engine.on_click(320.0, 240.0);
        engine.tick(0.0, &mut surface);

        let adapter = EngineAdapter::new(&engine);
        let snap = adapter.snapshot();
        assert_eq!(snap.ticks, 1);
        assert_eq!(snap.rebuilds, 1);
        assert_eq!(snap.width, 640.0);
        assert_eq!(snap.node_count, engine.graph().nodes().len());
        assert!(snap.running);

        let nodes = adapter.nodes();
        assert_eq!(nodes.len(), snap.node_count);
        let degree_sum: usize = nodes.iter().map(|n| n.degree).sum();
        assert_eq!(degree_sum, snap.edge_count * 2);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn snapshot_serializes() {
        let surface = RecordingSurface::new(320.0, 240.0);
        let engine =
            Engine::initialize(EngineConfig::default(), HostContext::default(), Some(&surface)).unwrap();
        let json = serde_json::to_string(&EngineAdapter::new(&engine).snapshot()).unwrap();
        assert!(json.contains("\"node_count\""));
        assert!(json.contains("\"profile\""));
    }
}
