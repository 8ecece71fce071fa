//! Frame-rate driven quality control.
//!
//! The governor folds frame times into fixed-length sampling windows, keeps a
//! rolling average of the last few window rates, and nudges a discrete
//! optimization level up (cheaper) when the average is low and down (richer)
//! when it is high. Device capability sets the starting level and the floor;
//! reduced motion pins the level at maximum and freezes adjustment.

use std::collections::VecDeque;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::effects::EffectCaps;

pub const MAX_LEVEL: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DeviceTier {
    Low,
    Medium,
    High,
}

/// Coarse guess at GPU capability from the renderer string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum GpuClass {
    Weak,
    Unknown,
    Strong,
}

impl GpuClass {
    pub fn from_renderer(renderer: &str) -> Self {
        let r = renderer.to_ascii_lowercase();
        const WEAK: [&str; 6] = ["swiftshader", "llvmpipe", "mali", "adreno", "powervr", "intel"];
        const STRONG: [&str; 4] = ["nvidia", "geforce", "radeon", "apple m"];
        if WEAK.iter().any(|w| r.contains(w)) {
            GpuClass::Weak
        } else if STRONG.iter().any(|s| r.contains(s)) {
            GpuClass::Strong
        } else {
            GpuClass::Unknown
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceProfile {
    pub cores: u32,
    pub gpu: GpuClass,
    pub mobile: bool,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            cores: 4,
            gpu: GpuClass::Unknown,
            mobile: false,
        }
    }
}

impl DeviceProfile {
    /// Build from what a browser exposes: user agent, logical core count
    /// (0 when unknown) and an optional GPU renderer string.
    pub fn detect(user_agent: &str, cores: u32, renderer: Option<&str>) -> Self {
        const MOBILE: [&str; 5] = ["Mobi", "Android", "iPhone", "iPad", "iPod"];
        Self {
            cores: if cores == 0 { 2 } else { cores },
            gpu: renderer.map_or(GpuClass::Unknown, GpuClass::from_renderer),
            mobile: MOBILE.iter().any(|m| user_agent.contains(m)),
        }
    }

    pub fn tier(&self) -> DeviceTier {
        if self.mobile || self.cores <= 2 || self.gpu == GpuClass::Weak {
            DeviceTier::Low
        } else if self.cores <= 4 && self.gpu != GpuClass::Strong {
            DeviceTier::Medium
        } else {
            DeviceTier::High
        }
    }
}

impl DeviceTier {
    pub fn initial_level(self) -> u8 {
        match self {
            DeviceTier::High => 0,
            DeviceTier::Medium => 1,
            DeviceTier::Low => 2,
        }
    }

    /// Lowest level the governor may relax to.
    pub fn floor_level(self) -> u8 {
        match self {
            DeviceTier::High | DeviceTier::Medium => 0,
            DeviceTier::Low => 1,
        }
    }
}

/// Population and rate limits for one optimization level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct QualityProfile {
    pub level: u8,
    pub max_nodes: usize,
    pub max_packets: usize,
    pub max_pulses: usize,
    pub target_fps: u32,
    pub curved_edges: bool,
    pub glow: bool,
}

impl QualityProfile {
    pub fn for_level(level: u8) -> Self {
        match level.min(MAX_LEVEL) {
            0 => Self {
                level: 0,
                max_nodes: 220,
                max_packets: 60,
                max_pulses: 24,
                target_fps: 60,
                curved_edges: true,
                glow: true,
            },
            1 => Self {
                level: 1,
                max_nodes: 150,
                max_packets: 36,
                max_pulses: 14,
                target_fps: 60,
                curved_edges: true,
                glow: false,
            },
            2 => Self {
                level: 2,
                max_nodes: 90,
                max_packets: 18,
                max_pulses: 8,
                target_fps: 45,
                curved_edges: false,
                glow: false,
            },
            _ => Self {
                level: MAX_LEVEL,
                max_nodes: 45,
                max_packets: 6,
                max_pulses: 3,
                target_fps: 30,
                curved_edges: false,
                glow: false,
            },
        }
    }

    #[inline]
    pub fn tick_interval_ms(&self) -> f64 {
        1000.0 / self.target_fps.max(1) as f64
    }

    #[inline]
    pub fn effect_caps(&self) -> EffectCaps {
        EffectCaps {
            max_packets: self.max_packets,
            max_pulses: self.max_pulses,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GovernorConfig {
    pub sample_window_ms: f64,
    pub sample_count: usize,
    pub low_fps: f32,
    pub high_fps: f32,
    /// Frame gaps longer than this are stalls (tab switch, debugger) and
    /// restart the current window instead of counting.
    pub stall_ms: f64,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            sample_window_ms: 2000.0,
            sample_count: 5,
            low_fps: 30.0,
            high_fps: 55.0,
            stall_ms: 1000.0,
        }
    }
}

pub struct PerformanceGovernor {
    cfg: GovernorConfig,
    samples: VecDeque<f32>,
    window_frames: u32,
    window_ms: f64,

    tier: DeviceTier,
    level: u8,
    floor: u8,

    reduced_motion: bool,
    level_before_pin: u8,
}

impl PerformanceGovernor {
    pub fn new(device: DeviceProfile, initial_override: Option<u8>, cfg: GovernorConfig) -> Self {
        let tier = device.tier();
        let floor = tier.floor_level();
        let level = initial_override
            .unwrap_or_else(|| tier.initial_level())
            .clamp(floor, MAX_LEVEL);
        let sample_count = cfg.sample_count.max(1);
        Self {
            cfg: GovernorConfig { sample_count, ..cfg },
            samples: VecDeque::with_capacity(sample_count),
            window_frames: 0,
            window_ms: 0.0,
            tier,
            level,
            floor,
            reduced_motion: false,
            level_before_pin: level,
        }
    }

    #[inline]
    pub fn level(&self) -> u8 {
        self.level
    }

    #[inline]
    pub fn floor(&self) -> u8 {
        self.floor
    }

    #[inline]
    pub fn tier(&self) -> DeviceTier {
        self.tier
    }

    #[inline]
    pub fn reduced_motion(&self) -> bool {
        self.reduced_motion
    }

    #[inline]
    pub fn profile(&self) -> QualityProfile {
        QualityProfile::for_level(self.level)
    }

    pub fn average_fps(&self) -> Option<f32> {
        if self.samples.is_empty() {
            None
        } else {
            Some(self.samples.iter().sum::<f32>() / self.samples.len() as f32)
        }
    }

    /// Drop partial and completed windows, e.g. after the page was hidden.
    pub fn reset_sampling(&mut self) {
        self.samples.clear();
        self.window_frames = 0;
        self.window_ms = 0.0;
    }

    /// Feed one frame time. Returns the new profile when the level changed.
    pub fn record_frame(&mut self, frame_ms: f64) -> Option<QualityProfile> {
        if self.reduced_motion || !frame_ms.is_finite() || frame_ms <= 0.0 {
            return None;
        }
        if frame_ms > self.cfg.stall_ms {
            self.window_frames = 0;
            self.window_ms = 0.0;
            return None;
        }

        self.window_frames += 1;
        self.window_ms += frame_ms;
        if self.window_ms < self.cfg.sample_window_ms {
            return None;
        }

        let fps = (self.window_frames as f64 * 1000.0 / self.window_ms) as f32;
        self.window_frames = 0;
        self.window_ms = 0.0;
        if self.samples.len() == self.cfg.sample_count {
            self.samples.pop_front();
        }
        self.samples.push_back(fps);
        if self.samples.len() < self.cfg.sample_count {
            return None;
        }

        let avg = self.average_fps()?;
        let next = if avg < self.cfg.low_fps && self.level < MAX_LEVEL {
            self.level + 1
        } else if avg > self.cfg.high_fps && self.level > self.floor {
            self.level - 1
        } else {
            return None;
        };

        tracing::info!(from = self.level, to = next, avg_fps = avg, "optimization level changed");
        self.level = next;
        // Judge the new level on fresh samples only.
        self.samples.clear();
        Some(self.profile())
    }

    /// Returns the new profile when the level changed.
    pub fn set_reduced_motion(&mut self, on: bool) -> Option<QualityProfile> {
        if on == self.reduced_motion {
            return None;
        }
        self.reduced_motion = on;
        self.reset_sampling();

        let next = if on {
            self.level_before_pin = self.level;
            MAX_LEVEL
        } else {
            self.level_before_pin
        };
        if next == self.level {
            return None;
        }
        tracing::info!(from = self.level, to = next, reduced_motion = on, "optimization level changed");
        self.level = next;
        Some(self.profile())
    }
}
