//! Bounded pools of short-lived visuals: data packets travelling along edges
//! and expanding pulse rings.
//!
//! Spawns beyond a pool's cap are dropped, never queued. A packet that reaches
//! the end of its edge reports a [`PacketArrival`] so the engine can re-fire the
//! destination node.

use crate::graph::{EdgeId, NodeId};
use crate::spatial::Vec2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseKind {
    /// Left behind by a node firing from direct input.
    Fire,
    Click,
    Section,
}

impl PulseKind {
    pub fn max_radius(self) -> f32 {
        match self {
            PulseKind::Fire => 28.0,
            PulseKind::Click => 90.0,
            PulseKind::Section => 160.0,
        }
    }

    /// Radius growth in px/s.
    pub fn growth(self) -> f32 {
        match self {
            PulseKind::Fire => 60.0,
            PulseKind::Click => 140.0,
            PulseKind::Section => 180.0,
        }
    }

    /// Opacity lost per second.
    pub fn fade(self) -> f32 {
        match self {
            PulseKind::Fire => 1.6,
            PulseKind::Click => 1.0,
            PulseKind::Section => 0.8,
        }
    }
}

/// Effect requested by propagation or input handling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpawnRequest {
    Packet {
        edge: EdgeId,
        from: NodeId,
        to: NodeId,
        hop: u8,
    },
    Pulse {
        at: Vec2,
        kind: PulseKind,
        strength: f32,
    },
}

#[derive(Debug, Clone)]
pub struct DataPacket {
    pub edge: EdgeId,
    pub from: NodeId,
    pub to: NodeId,
    /// Wavefront depth of the firing that launched this packet.
    pub hop: u8,
    pub progress: f32,
    /// Progress per second.
    pub speed: f32,
    pub created_at: f64,
    pub lifetime_ms: f64,
}

#[derive(Debug, Clone)]
pub struct PulseEffect {
    pub pos: Vec2,
    pub radius: f32,
    pub max_radius: f32,
    pub opacity: f32,
    pub kind: PulseKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectCaps {
    pub max_packets: usize,
    pub max_pulses: usize,
}

/// A packet finished its edge; `node` should be re-activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketArrival {
    pub node: NodeId,
    pub hop: u8,
}

pub struct EffectsManager {
    packets: Vec<DataPacket>,
    pulses: Vec<PulseEffect>,
    caps: EffectCaps,
    packet_speed: f32,
    packet_lifetime_ms: f64,

    dropped_packets: u64,
    dropped_pulses: u64,
}

impl EffectsManager {
    pub fn new(caps: EffectCaps, packet_speed: f32, packet_lifetime_ms: f64) -> Self {
        Self {
            packets: Vec::with_capacity(caps.max_packets),
            pulses: Vec::with_capacity(caps.max_pulses),
            caps,
            packet_speed: packet_speed.max(0.01),
            packet_lifetime_ms,
            dropped_packets: 0,
            dropped_pulses: 0,
        }
    }

    #[inline]
    pub fn caps(&self) -> EffectCaps {
        self.caps
    }

    /// New caps empty both pools; they refill from scratch.
    pub fn set_caps(&mut self, caps: EffectCaps) {
        self.caps = caps;
        self.packets = Vec::with_capacity(caps.max_packets);
        self.pulses = Vec::with_capacity(caps.max_pulses);
    }

    pub fn clear(&mut self) {
        self.packets.clear();
        self.pulses.clear();
    }

    #[inline]
    pub fn packets(&self) -> &[DataPacket] {
        &self.packets
    }

    #[inline]
    pub fn pulses(&self) -> &[PulseEffect] {
        &self.pulses
    }

    #[inline]
    pub fn dropped_packets(&self) -> u64 {
        self.dropped_packets
    }

    #[inline]
    pub fn dropped_pulses(&self) -> u64 {
        self.dropped_pulses
    }

    /// Returns false when the pool is full.
    pub fn spawn_packet(&mut self, edge: EdgeId, from: NodeId, to: NodeId, hop: u8, now: f64) -> bool {
        if self.packets.len() >= self.caps.max_packets {
            self.dropped_packets += 1;
            return false;
        }
        self.packets.push(DataPacket {
            edge,
            from,
            to,
            hop,
            progress: 0.0,
            speed: self.packet_speed,
            created_at: now,
            lifetime_ms: self.packet_lifetime_ms,
        });
        true
    }

    /// Returns false when the pool is full.
    pub fn spawn_pulse(&mut self, at: Vec2, kind: PulseKind, strength: f32) -> bool {
        if self.pulses.len() >= self.caps.max_pulses {
            self.dropped_pulses += 1;
            return false;
        }
        let strength = if strength.is_finite() {
            strength.clamp(0.1, 1.0)
        } else {
            0.1
        };
        self.pulses.push(PulseEffect {
            pos: at,
            radius: 0.0,
            max_radius: kind.max_radius() * strength,
            opacity: strength,
            kind,
        });
        true
    }

    pub fn apply(&mut self, req: SpawnRequest, now: f64) -> bool {
        match req {
            SpawnRequest::Packet { edge, from, to, hop } => self.spawn_packet(edge, from, to, hop, now),
            SpawnRequest::Pulse { at, kind, strength } => self.spawn_pulse(at, kind, strength),
        }
    }

    /// Move every effect forward by `dt_secs`, removing finished ones.
    ///
    /// Packets that reach the end of their edge push an arrival; packets that
    /// run out of lifetime first vanish silently.
    pub fn advance(&mut self, dt_secs: f32, now: f64, arrivals: &mut Vec<PacketArrival>) {
        let dt = if dt_secs.is_finite() { dt_secs.max(0.0) } else { 0.0 };

        self.packets.retain_mut(|p| {
            p.progress = (p.progress + p.speed * dt).min(1.0);
            if p.progress >= 1.0 {
                arrivals.push(PacketArrival {
                    node: p.to,
                    hop: p.hop,
                });
                return false;
            }
            now - p.created_at < p.lifetime_ms
        });

        self.pulses.retain_mut(|p| {
            p.radius += p.kind.growth() * dt;
            p.opacity -= p.kind.fade() * dt;
            p.radius < p.max_radius && p.opacity > 0.0
        });
    }
}
