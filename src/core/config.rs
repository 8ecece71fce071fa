//! Engine configuration.
//!
//! One configuration object parameterizes every visual variant (density,
//! palette, propagation constants). Values coming from hosts are never trusted:
//! [`EngineConfig::sanitized`] clamps everything into safe ranges and the engine
//! only stores sanitized copies.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config io: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "serde")]
    #[error("config parse: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Colours per node kind plus the pathway/effect colours.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Palette {
    pub background: Rgb,
    pub standard: Rgb,
    pub processor: Rgb,
    pub memory: Rgb,
    pub connector: Rgb,
    pub input: Rgb,
    pub output: Rgb,
    pub pathway: Rgb,
    pub pathway_active: Rgb,
    pub packet: Rgb,
    pub pulse: Rgb,
}

impl Default for Palette {
    fn default() -> Self {
        // Dark scientific background with cool accents.
        Self {
            background: Rgb::new(10, 15, 26),
            standard: Rgb::new(122, 162, 255),
            processor: Rgb::new(167, 139, 250),
            memory: Rgb::new(45, 212, 191),
            connector: Rgb::new(148, 163, 184),
            input: Rgb::new(34, 197, 94),
            output: Rgb::new(251, 191, 36),
            pathway: Rgb::new(71, 85, 105),
            pathway_active: Rgb::new(125, 211, 252),
            packet: Rgb::new(224, 242, 254),
            pulse: Rgb::new(122, 162, 255),
        }
    }
}

/// Constants of the activation wavefront and the decay state machine.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PropagationConfig {
    /// Intensity multiplier per hop. Must stay below 1 so wavefronts die out.
    pub decay_factor: f32,
    /// Branches below this intensity are not scheduled.
    pub epsilon: f32,
    /// Hard bound on wavefront depth.
    pub max_hops: u8,
    pub min_delay_ms: f64,
    pub max_delay_ms: f64,

    /// Time after activation before decay starts.
    pub dwell_ms: f64,
    pub node_decay_per_sec: f32,
    pub edge_decay_per_sec: f32,
    /// Resting activity nodes decay toward (before section bias).
    pub activity_floor: f32,
    /// Edges below this activity leave the active set.
    pub edge_active_threshold: f32,
    pub activation_window_ms: f64,

    /// Intensity a finished data packet delivers to its destination node.
    pub reactivation_intensity: f32,

    pub pointer_radius: f32,
    pub pointer_intensity: f32,
    pub click_radius: f32,
    pub click_intensity: f32,
    pub section_radius: f32,
    pub section_intensity: f32,

    /// Probability that a firing node sends a packet down a data-flow edge.
    pub packet_chance: f32,
    /// Progress per second (1.0 crosses an edge in one second).
    pub packet_speed: f32,
    pub packet_lifetime_ms: f64,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            decay_factor: 0.75,
            epsilon: 0.05,
            max_hops: 6,
            min_delay_ms: 40.0,
            max_delay_ms: 220.0,
            dwell_ms: 120.0,
            node_decay_per_sec: 1.6,
            edge_decay_per_sec: 2.2,
            activity_floor: 0.04,
            edge_active_threshold: 0.03,
            activation_window_ms: 600.0,
            reactivation_intensity: 0.7,
            pointer_radius: 120.0,
            pointer_intensity: 0.8,
            click_radius: 160.0,
            click_intensity: 1.0,
            section_radius: 220.0,
            section_intensity: 0.95,
            packet_chance: 0.35,
            packet_speed: 0.9,
            packet_lifetime_ms: 3000.0,
        }
    }
}

/// A named point tied to a section of the host page.
///
/// `x`/`y` are fractions of the surface so centers survive resizes.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ActivityCenterSpec {
    pub section: String,
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub bias: f32,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EngineConfig {
    /// Nodes per 10 000 px² of surface.
    pub density: f32,
    pub connection_radius: f32,
    pub layers: u8,

    pub base_threshold: f32,
    pub refractory_min_ms: f64,
    pub refractory_max_ms: f64,
    /// Maximum drift speed in px/s.
    pub drift_speed: f32,

    /// Overrides the device-derived starting level (never below the device floor).
    pub initial_level: Option<u8>,
    // If set, makes runs reproducible.
    pub seed: Option<u64>,

    pub propagation: PropagationConfig,
    pub palette: Palette,
    pub activity_centers: Vec<ActivityCenterSpec>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            density: 0.9,
            connection_radius: 140.0,
            layers: 3,
            base_threshold: 0.35,
            refractory_min_ms: 400.0,
            refractory_max_ms: 800.0,
            drift_speed: 12.0,
            initial_level: None,
            seed: None,
            propagation: PropagationConfig::default(),
            palette: Palette::default(),
            activity_centers: Vec::new(),
        }
    }
}

#[inline]
fn sane32(v: f32, lo: f32, hi: f32) -> f32 {
    if v.is_finite() {
        v.clamp(lo, hi)
    } else {
        lo
    }
}

#[inline]
fn sane64(v: f64, lo: f64, hi: f64) -> f64 {
    if v.is_finite() {
        v.clamp(lo, hi)
    } else {
        lo
    }
}

impl PropagationConfig {
    pub fn sanitized(&self) -> Self {
        let min_delay_ms = sane64(self.min_delay_ms, 0.0, 10_000.0);
        let max_delay_ms = sane64(self.max_delay_ms, min_delay_ms, 10_000.0);
        Self {
            decay_factor: sane32(self.decay_factor, 0.05, 0.95),
            epsilon: sane32(self.epsilon, 0.001, 1.0),
            max_hops: self.max_hops.clamp(1, 32),
            min_delay_ms,
            max_delay_ms,
            dwell_ms: sane64(self.dwell_ms, 0.0, 60_000.0),
            node_decay_per_sec: sane32(self.node_decay_per_sec, 0.0, 100.0),
            edge_decay_per_sec: sane32(self.edge_decay_per_sec, 0.0, 100.0),
            activity_floor: sane32(self.activity_floor, 0.0, 1.0),
            edge_active_threshold: sane32(self.edge_active_threshold, 0.001, 1.0),
            activation_window_ms: sane64(self.activation_window_ms, 0.0, 60_000.0),
            reactivation_intensity: sane32(self.reactivation_intensity, 0.0, 1.0),
            pointer_radius: sane32(self.pointer_radius, 1.0, 10_000.0),
            pointer_intensity: sane32(self.pointer_intensity, 0.0, 1.0),
            click_radius: sane32(self.click_radius, 1.0, 10_000.0),
            click_intensity: sane32(self.click_intensity, 0.0, 1.0),
            section_radius: sane32(self.section_radius, 1.0, 10_000.0),
            section_intensity: sane32(self.section_intensity, 0.0, 1.0),
            packet_chance: sane32(self.packet_chance, 0.0, 1.0),
            packet_speed: sane32(self.packet_speed, 0.01, 100.0),
            packet_lifetime_ms: sane64(self.packet_lifetime_ms, 16.0, 600_000.0),
        }
    }
}

impl ActivityCenterSpec {
    pub fn sanitized(&self) -> Self {
        Self {
            section: self.section.clone(),
            x: sane32(self.x, 0.0, 1.0),
            y: sane32(self.y, 0.0, 1.0),
            radius: sane32(self.radius, 1.0, 10_000.0),
            bias: sane32(self.bias, 0.0, 1.0),
        }
    }
}

impl EngineConfig {
    /// Copy with every value clamped into a safe range. Never fails.
    pub fn sanitized(&self) -> Self {
        let refractory_min_ms = sane64(self.refractory_min_ms, 16.0, 60_000.0);
        let refractory_max_ms = sane64(self.refractory_max_ms, refractory_min_ms, 60_000.0);
        Self {
            density: sane32(self.density, 0.01, 10.0),
            connection_radius: sane32(self.connection_radius, 8.0, 4096.0),
            layers: self.layers.clamp(1, 8),
            base_threshold: sane32(self.base_threshold, 0.05, 1.0),
            refractory_min_ms,
            refractory_max_ms,
            drift_speed: sane32(self.drift_speed, 0.0, 1000.0),
            initial_level: self.initial_level,
            seed: self.seed,
            propagation: self.propagation.sanitized(),
            palette: self.palette.clone(),
            activity_centers: self
                .activity_centers
                .iter()
                .map(ActivityCenterSpec::sanitized)
                .collect(),
        }
    }

    #[cfg(feature = "serde")]
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: EngineConfig = serde_json::from_str(s)?;
        Ok(cfg.sanitized())
    }

    #[cfg(all(feature = "serde", feature = "std"))]
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}
