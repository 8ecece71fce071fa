//! Immediate-mode drawing of one engine frame.
//!
//! The engine never touches a concrete canvas. Hosts implement [`Surface`] for
//! whatever 2D context they have; [`RecordingSurface`] keeps the calls in memory
//! for headless runs and tests.

use crate::config::{Palette, Rgb};
use crate::effects::EffectsManager;
use crate::governor::QualityProfile;
use crate::graph::{Graph, NodeKind, PathwayKind};
use crate::propagation::PropagationEngine;
use crate::spatial::{quad_point, Vec2};

/// A 2D immediate-mode rasterization target sized to the viewport.
pub trait Surface {
    fn size(&self) -> (f32, f32);
    fn clear(&mut self, color: Rgb);
    fn fill_circle(&mut self, center: Vec2, radius: f32, color: Rgb, alpha: f32);
    fn stroke_circle(&mut self, center: Vec2, radius: f32, color: Rgb, alpha: f32, width: f32);
    fn stroke_line(&mut self, from: Vec2, to: Vec2, color: Rgb, alpha: f32, width: f32);
    fn stroke_quad(&mut self, from: Vec2, ctrl: Vec2, to: Vec2, color: Rgb, alpha: f32, width: f32);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrawCall {
    Clear(Rgb),
    FillCircle { center: Vec2, radius: f32, color: Rgb, alpha: f32 },
    StrokeCircle { center: Vec2, radius: f32, color: Rgb, alpha: f32 },
    Line { from: Vec2, to: Vec2, color: Rgb, alpha: f32 },
    Quad { from: Vec2, ctrl: Vec2, to: Vec2, color: Rgb, alpha: f32 },
}

/// Surface that stores every call of the most recent frame.
#[derive(Debug, Clone)]
pub struct RecordingSurface {
    width: f32,
    height: f32,
    calls: Vec<DrawCall>,
    frames: u64,
}

impl RecordingSurface {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            calls: Vec::new(),
            frames: 0,
        }
    }

    pub fn resize(&mut self, width: f32, height: f32) {
        self.width = width;
        self.height = height;
    }

    #[inline]
    pub fn calls(&self) -> &[DrawCall] {
        &self.calls
    }

    /// Number of frames started (clears issued).
    #[inline]
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Surface for RecordingSurface {
    fn size(&self) -> (f32, f32) {
        (self.width, self.height)
    }

    fn clear(&mut self, color: Rgb) {
        self.calls.clear();
        self.frames += 1;
        self.calls.push(DrawCall::Clear(color));
    }

    fn fill_circle(&mut self, center: Vec2, radius: f32, color: Rgb, alpha: f32) {
        self.calls.push(DrawCall::FillCircle {
            center,
            radius,
            color,
            alpha,
        });
    }

    fn stroke_circle(&mut self, center: Vec2, radius: f32, color: Rgb, alpha: f32, _width: f32) {
        self.calls.push(DrawCall::StrokeCircle {
            center,
            radius,
            color,
            alpha,
        });
    }

    fn stroke_line(&mut self, from: Vec2, to: Vec2, color: Rgb, alpha: f32, _width: f32) {
        self.calls.push(DrawCall::Line {
            from,
            to,
            color,
            alpha,
        });
    }

    fn stroke_quad(&mut self, from: Vec2, ctrl: Vec2, to: Vec2, color: Rgb, alpha: f32, _width: f32) {
        self.calls.push(DrawCall::Quad {
            from,
            ctrl,
            to,
            color,
            alpha,
        });
    }
}

pub fn node_color(palette: &Palette, kind: NodeKind) -> Rgb {
    match kind {
        NodeKind::Standard => palette.standard,
        NodeKind::Processor => palette.processor,
        NodeKind::Memory => palette.memory,
        NodeKind::Connector => palette.connector,
        NodeKind::Input => palette.input,
        NodeKind::Output => palette.output,
    }
}

fn pathway_width(kind: PathwayKind) -> f32 {
    match kind {
        PathwayKind::Local => 0.6,
        PathwayKind::Relay => 1.0,
        PathwayKind::Associative => 0.8,
        PathwayKind::Afferent | PathwayKind::Efferent => 1.2,
    }
}

/// Resting pathways use the base colour; sensory/motor ones borrow their
/// endpoint colour so the flow direction reads at a glance.
fn pathway_color(palette: &Palette, kind: PathwayKind, active: bool) -> Rgb {
    if active {
        return palette.pathway_active;
    }
    match kind {
        PathwayKind::Local | PathwayKind::Relay | PathwayKind::Associative => palette.pathway,
        PathwayKind::Afferent => palette.input,
        PathwayKind::Efferent => palette.output,
    }
}

/// Everything one frame reads. Built after the tick's updates have run.
pub struct Scene<'a> {
    pub graph: &'a Graph,
    pub propagation: &'a PropagationEngine,
    pub effects: &'a EffectsManager,
    pub palette: &'a Palette,
    pub profile: QualityProfile,
}

pub fn draw<S: Surface + ?Sized>(surface: &mut S, scene: &Scene<'_>) {
    let Scene {
        graph,
        propagation,
        effects,
        palette,
        profile,
    } = *scene;
    let nodes = graph.nodes();

    surface.clear(palette.background);

    for e in graph.edges() {
        let active = propagation.is_edge_active(e.id);
        let alpha = 0.08 + 0.6 * e.activity;
        let color = pathway_color(palette, e.kind, active);
        let width = pathway_width(e.kind) * (1.0 + e.activity);
        let (a, b) = (nodes[e.source].pos, nodes[e.target].pos);
        if profile.curved_edges {
            surface.stroke_quad(a, e.control, b, color, alpha, width);
        } else {
            surface.stroke_line(a, b, color, alpha, width);
        }
    }

    for p in effects.pulses() {
        surface.stroke_circle(p.pos, p.radius, palette.pulse, p.opacity.clamp(0.0, 1.0), 1.5);
    }

    for p in effects.packets() {
        let Some(e) = graph.edge(p.edge) else {
            continue;
        };
        // Packets may travel against the stored edge direction.
        let t = if p.from == e.source {
            p.progress
        } else {
            1.0 - p.progress
        };
        let (a, b) = (nodes[e.source].pos, nodes[e.target].pos);
        let at = if profile.curved_edges {
            quad_point(a, e.control, b, t)
        } else {
            a.lerp(b, t)
        };
        if profile.glow {
            surface.fill_circle(at, 5.0, palette.packet, 0.2);
        }
        surface.fill_circle(at, 1.8, palette.packet, 0.9);
    }

    for n in nodes {
        let color = node_color(palette, n.kind);
        let weight = n.kind.render_weight();
        if profile.glow && n.activity > 0.3 {
            surface.fill_circle(n.pos, n.radius * 3.0 * weight, color, n.activity * 0.25);
        }
        let radius = n.radius * (1.0 + n.activity * weight * 0.6);
        let alpha = (0.35 + 0.65 * n.activity).min(1.0);
        surface.fill_circle(n.pos, radius, color, alpha);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PropagationConfig;
    use crate::effects::{EffectCaps, PulseKind};
    use crate::graph::Node;
    use crate::prng::Prng;
    use crate::spatial::SpatialGrid;

    fn scene_parts() -> (Graph, PropagationEngine, EffectsManager) {
        let nodes = vec![
            Node::new(0, Vec2::new(0.0, 0.0), NodeKind::Standard),
            Node::new(1, Vec2::new(30.0, 0.0), NodeKind::Memory),
        ];
        let mut grid = SpatialGrid::new(50.0);
        let graph = Graph::wire(nodes, 50.0, 600.0, &mut Prng::new(1), &mut grid);
        let prop = PropagationEngine::new(PropagationConfig::default());
        let mut fx = EffectsManager::new(
            EffectCaps {
                max_packets: 4,
                max_pulses: 4,
            },
            1.0,
            1000.0,
        );
        fx.spawn_packet(0, 1, 0, 0, 0.0);
        fx.spawn_pulse(Vec2::new(5.0, 5.0), PulseKind::Click, 1.0);
        (graph, prop, fx)
    }

    #[test]
    fn frame_draws_every_entity() {
        let (graph, prop, fx) = scene_parts();
        let palette = Palette::default();
        let mut surface = RecordingSurface::new(100.0, 100.0);
        draw(
            &mut surface,
            &Scene {
                graph: &graph,
                propagation: &prop,
                effects: &fx,
                palette: &palette,
                profile: QualityProfile::for_level(0),
            },
        );

        let calls = surface.calls();
        assert_eq!(calls[0], DrawCall::Clear(palette.background));
        let quads = calls.iter().filter(|c| matches!(c, DrawCall::Quad { .. })).count();
        let rings = calls.iter().filter(|c| matches!(c, DrawCall::StrokeCircle { .. })).count();
        let dots = calls.iter().filter(|c| matches!(c, DrawCall::FillCircle { .. })).count();
        assert_eq!(quads, 1);
        assert_eq!(rings, 1);
        // Packet glow + packet + two nodes.
        assert_eq!(dots, 4);
    }

    #[test]
    fn reverse_packet_starts_at_target() {
        let (graph, prop, fx) = scene_parts();
        let palette = Palette::default();
        let mut surface = RecordingSurface::new(100.0, 100.0);
        draw(
            &mut surface,
            &Scene {
                graph: &graph,
                propagation: &prop,
                effects: &fx,
                palette: &palette,
                profile: QualityProfile::for_level(3),
            },
        );
        // Level 3: straight lines, no glow. First dot is the packet at node 1.
        assert!(surface.calls().iter().any(|c| matches!(c, DrawCall::Line { .. })));
        let first_dot = surface
            .calls()
            .iter()
            .find_map(|c| match c {
                DrawCall::FillCircle { center, .. } => Some(*center),
                _ => None,
            })
            .unwrap();
        assert_eq!(first_dot, Vec2::new(30.0, 0.0));
    }
}
