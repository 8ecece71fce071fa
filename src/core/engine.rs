//! The host-facing engine: one explicit instance per surface, no globals.
//!
//! A tick always runs its stages in the same order:
//!
//! 1. spatial grid rebuild
//! 2. queued host input (pointer, click, section change)
//! 3. due propagation events
//! 4. node then edge decay
//! 5. node drift
//! 6. effects (packet arrivals re-fire their destination node)
//! 7. render
//!
//! Host callbacks only enqueue input; nothing mutates the graph between ticks
//! except `resize` and optimization-level changes, which rebuild everything.

use crate::config::{ActivityCenterSpec, EngineConfig};
use crate::effects::{EffectsManager, PacketArrival, PulseKind};
use crate::governor::{DeviceProfile, GovernorConfig, PerformanceGovernor, QualityProfile};
use crate::graph::{Bounds, Graph};
use crate::prng::Prng;
use crate::propagation::{ActivityBias, PropagationEngine};
use crate::render::{self, Scene, Surface};
use crate::spatial::{SpatialGrid, Vec2};

// Seed used when the config does not pin one.
const DEFAULT_SEED: u64 = 0x5EED_CAFE_F00D;

// rAF timestamps jitter; accept ticks slightly early.
const TICK_SLACK_MS: f64 = 1.0;

// Longest step any single tick integrates.
const MAX_DT_SECS: f32 = 0.1;

/// Signals the host knows about its environment at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostContext {
    pub device: DeviceProfile,
    pub reduced_motion: bool,
    pub visible: bool,
}

impl Default for HostContext {
    fn default() -> Self {
        Self {
            device: DeviceProfile::default(),
            reduced_motion: false,
            visible: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum HostInput {
    PointerMove(Vec2),
    Click(Vec2),
    Section(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Diagnostics {
    pub node_count: usize,
    pub edge_count: usize,
    pub active_edges: usize,
    pub packets: usize,
    pub pulses: usize,
    pub pending_events: usize,
    pub avg_activity: f32,
}

pub struct Engine {
    cfg: EngineConfig,
    seed: u64,
    bounds: Bounds,
    rng: Prng,

    graph: Graph,
    grid: SpatialGrid,
    propagation: PropagationEngine,
    effects: EffectsManager,
    governor: PerformanceGovernor,
    profile: QualityProfile,

    active_center: Option<usize>,
    inputs: Vec<HostInput>,
    arrivals: Vec<PacketArrival>,

    running: bool,
    external_timing: bool,
    last_frame_at: Option<f64>,
    last_tick_at: Option<f64>,
    ticks: u64,
    rebuilds: u64,
}

impl Engine {
    /// Set up an engine for `surface`.
    ///
    /// Returns `None` when the host has no surface to draw on; the host simply
    /// runs without the background.
    pub fn initialize<S: Surface + ?Sized>(
        config: EngineConfig,
        host: HostContext,
        surface: Option<&S>,
    ) -> Option<Self> {
        let Some(surface) = surface else {
            tracing::debug!("no drawing surface; engine not started");
            return None;
        };
        let (width, height) = surface.size();
        let cfg = config.sanitized();
        let seed = cfg.seed.unwrap_or(DEFAULT_SEED);

        let mut governor = PerformanceGovernor::new(host.device, cfg.initial_level, GovernorConfig::default());
        governor.set_reduced_motion(host.reduced_motion);
        let profile = governor.profile();

        let mut engine = Self {
            propagation: PropagationEngine::new(cfg.propagation.clone()),
            effects: EffectsManager::new(
                profile.effect_caps(),
                cfg.propagation.packet_speed,
                cfg.propagation.packet_lifetime_ms,
            ),
            grid: SpatialGrid::new(cfg.connection_radius),
            graph: Graph::empty(),
            rng: Prng::new(seed),
            bounds: Bounds::new(width, height),
            seed,
            cfg,
            governor,
            profile,
            active_center: None,
            inputs: Vec::new(),
            arrivals: Vec::new(),
            running: host.visible,
            external_timing: false,
            last_frame_at: None,
            last_tick_at: None,
            ticks: 0,
            rebuilds: 0,
        };
        engine.rebuild("initialize");
        tracing::info!(
            width = engine.bounds.width,
            height = engine.bounds.height,
            tier = ?engine.governor.tier(),
            level = engine.profile.level,
            nodes = engine.graph.nodes().len(),
            "engine initialized"
        );
        Some(engine)
    }

    /// Throw away the graph and every transient, then regenerate for the
    /// current bounds and profile. The same inputs always produce the same graph.
    fn rebuild(&mut self, reason: &str) {
        let salts = [
            self.bounds.width.to_bits() as u64,
            self.bounds.height.to_bits() as u64,
            self.profile.level as u64,
        ];
        let mut rng = Prng::derived(self.seed, &salts);
        self.graph = Graph::generate(
            &self.cfg,
            self.bounds,
            self.profile.max_nodes,
            &mut rng,
            &mut self.grid,
        );
        self.rng = rng;
        self.propagation.reset();
        self.effects.set_caps(self.profile.effect_caps());
        self.arrivals.clear();
        self.rebuilds += 1;
        tracing::info!(
            reason,
            nodes = self.graph.nodes().len(),
            edges = self.graph.edges().len(),
            generation = self.propagation.generation(),
            "graph rebuilt"
        );
    }

    fn apply_profile(&mut self, profile: QualityProfile) {
        if profile == self.profile {
            return;
        }
        self.profile = profile;
        self.rebuild("optimization level");
    }

    pub fn resize(&mut self, width: f32, height: f32) {
        self.bounds = Bounds::new(width, height);
        self.rebuild("resize");
    }

    pub fn on_pointer_move(&mut self, x: f32, y: f32) {
        // Only the latest position matters.
        if let Some(HostInput::PointerMove(p)) = self.inputs.last_mut() {
            *p = Vec2::new(x, y);
            return;
        }
        self.inputs.push(HostInput::PointerMove(Vec2::new(x, y)));
    }

    pub fn on_click(&mut self, x: f32, y: f32) {
        self.inputs.push(HostInput::Click(Vec2::new(x, y)));
    }

    pub fn on_section_change(&mut self, section: &str) {
        self.inputs.push(HostInput::Section(section.to_string()));
    }

    pub fn pause(&mut self) {
        if self.running {
            tracing::debug!("engine paused");
        }
        self.running = false;
    }

    pub fn resume(&mut self) {
        if !self.running {
            tracing::debug!("engine resumed");
        }
        self.running = true;
        // Don't integrate or sample across the gap.
        self.last_frame_at = None;
        self.last_tick_at = None;
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Page visibility. Hidden pages stop ticking and discard frame samples.
    pub fn set_visible(&mut self, visible: bool) {
        tracing::debug!(visible, "visibility changed");
        self.governor.reset_sampling();
        if visible {
            self.resume();
        } else {
            self.pause();
        }
    }

    pub fn set_reduced_motion(&mut self, on: bool) {
        if let Some(profile) = self.governor.set_reduced_motion(on) {
            self.apply_profile(profile);
        }
    }

    /// Host-measured frame time. Once called, the engine stops sampling its
    /// own frame intervals.
    pub fn report_frame_time(&mut self, frame_ms: f64) {
        self.external_timing = true;
        if let Some(profile) = self.governor.record_frame(frame_ms) {
            self.apply_profile(profile);
        }
    }

    /// Call once per display refresh. Runs a tick when the target tick
    /// interval has elapsed; returns whether one ran.
    pub fn frame<S: Surface + ?Sized>(&mut self, now: f64, surface: &mut S) -> bool {
        if !self.running {
            return false;
        }

        if !self.external_timing {
            if let Some(prev) = self.last_frame_at {
                if let Some(profile) = self.governor.record_frame(now - prev) {
                    self.apply_profile(profile);
                }
            }
        }
        self.last_frame_at = Some(now);

        if let Some(last) = self.last_tick_at {
            if now - last < self.profile.tick_interval_ms() - TICK_SLACK_MS {
                return false;
            }
        }
        self.tick(now, surface);
        true
    }

    /// One full update and render pass at `now` (ms), regardless of pacing.
    pub fn tick<S: Surface + ?Sized>(&mut self, now: f64, surface: &mut S) {
        let dt = match self.last_tick_at {
            Some(last) => (((now - last) / 1000.0) as f32).clamp(0.0, MAX_DT_SECS),
            None => (self.profile.tick_interval_ms() / 1000.0) as f32,
        };
        self.last_tick_at = Some(now);

        self.grid
            .rebuild(self.graph.nodes().iter().map(|n| (n.id, n.pos)));

        self.consume_inputs(now);

        self.propagation.process_due(&mut self.graph, now, &mut self.rng);
        let bias = self.active_bias();
        self.propagation.update(&mut self.graph, now, dt, bias);
        if !self.governor.reduced_motion() {
            self.graph.drift(dt, self.bounds);
        }

        self.flush_spawns(now);
        self.effects.advance(dt, now, &mut self.arrivals);
        let max_hops = self.propagation.config().max_hops;
        let intensity = self.propagation.config().reactivation_intensity;
        for arrival in std::mem::take(&mut self.arrivals) {
            if arrival.hop < max_hops {
                self.propagation.request(
                    &mut self.graph,
                    arrival.node,
                    intensity,
                    now,
                    arrival.hop + 1,
                    &mut self.rng,
                );
            }
        }
        self.flush_spawns(now);

        render::draw(
            surface,
            &Scene {
                graph: &self.graph,
                propagation: &self.propagation,
                effects: &self.effects,
                palette: &self.cfg.palette,
                profile: self.profile,
            },
        );
        self.ticks += 1;
    }

    fn flush_spawns(&mut self, now: f64) {
        for req in self.propagation.take_spawns() {
            self.effects.apply(req, now);
        }
    }

    fn consume_inputs(&mut self, now: f64) {
        for input in std::mem::take(&mut self.inputs) {
            match input {
                HostInput::PointerMove(p) => {
                    let pc = self.propagation.config();
                    let (radius, intensity) = (pc.pointer_radius, pc.pointer_intensity);
                    self.excite_near(p, radius, intensity, 1.0, now);
                }
                HostInput::Click(p) => {
                    let pc = self.propagation.config();
                    let (radius, intensity) = (pc.click_radius, pc.click_intensity);
                    self.excite_near(p, radius, intensity, 0.5, now);
                    self.effects.spawn_pulse(p, PulseKind::Click, 1.0);
                }
                HostInput::Section(name) => self.enter_section(&name, now),
            }
        }
    }

    /// Fire nodes around `p`; intensity falls off by up to `falloff` at the edge.
    fn excite_near(&mut self, p: Vec2, radius: f32, intensity: f32, falloff: f32, now: f64) {
        let hits = self.grid.query_near(p, radius);
        for nb in hits {
            let level = intensity * (1.0 - falloff * nb.dist / radius);
            self.propagation
                .request(&mut self.graph, nb.id, level, now, 0, &mut self.rng);
        }
    }

    fn enter_section(&mut self, name: &str, now: f64) {
        let Some(idx) = self.cfg.activity_centers.iter().position(|c| c.section == name) else {
            tracing::debug!(section = name, "no activity center for section");
            return;
        };
        self.active_center = Some(idx);

        let center = self.center_pos(&self.cfg.activity_centers[idx]);
        let pc = self.propagation.config();
        let (radius, intensity) = (pc.section_radius, pc.section_intensity);
        self.excite_near(center, radius, intensity, 0.5, now);
        self.effects.spawn_pulse(center, PulseKind::Section, 1.0);
    }

    fn center_pos(&self, spec: &ActivityCenterSpec) -> Vec2 {
        Vec2::new(spec.x * self.bounds.width, spec.y * self.bounds.height)
    }

    fn active_bias(&self) -> Option<ActivityBias> {
        let spec = self.cfg.activity_centers.get(self.active_center?)?;
        Some(ActivityBias {
            center: self.center_pos(spec),
            radius: spec.radius,
            bias: spec.bias,
        })
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    #[inline]
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    #[inline]
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    #[inline]
    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    #[inline]
    pub fn propagation(&self) -> &PropagationEngine {
        &self.propagation
    }

    #[inline]
    pub fn effects(&self) -> &EffectsManager {
        &self.effects
    }

    #[inline]
    pub fn governor(&self) -> &PerformanceGovernor {
        &self.governor
    }

    #[inline]
    pub fn profile(&self) -> QualityProfile {
        self.profile
    }

    #[inline]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    #[inline]
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    pub fn active_section(&self) -> Option<&str> {
        self.active_center
            .and_then(|i| self.cfg.activity_centers.get(i))
            .map(|c| c.section.as_str())
    }

    pub fn diagnostics(&self) -> Diagnostics {
        let nodes = self.graph.nodes();
        let avg_activity = if nodes.is_empty() {
            0.0
        } else {
            nodes.iter().map(|n| n.activity).sum::<f32>() / nodes.len() as f32
        };
        Diagnostics {
            node_count: nodes.len(),
            edge_count: self.graph.edges().len(),
            active_edges: self.propagation.active_edge_count(),
            packets: self.effects.packets().len(),
            pulses: self.effects.pulses().len(),
            pending_events: self.propagation.pending_count(),
            avg_activity,
        }
    }
}
