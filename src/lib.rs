//! Decorative neural-network background engine.
//!
//! A procedurally generated graph of drifting nodes reacts to pointer, click
//! and section input with delayed multi-hop activation waves, travelling data
//! packets and pulse rings. A frame-rate governor trades visual richness for
//! speed on the fly. Drawing goes through the [`render::Surface`] trait, so the
//! engine runs the same headless, in tests and on a browser canvas.

#[path = "core/config.rs"]
pub mod config;

#[path = "core/prng.rs"]
pub mod prng;

#[path = "core/spatial.rs"]
pub mod spatial;

#[path = "core/graph.rs"]
pub mod graph;

#[path = "core/effects.rs"]
pub mod effects;

#[path = "core/propagation.rs"]
pub mod propagation;

#[path = "core/governor.rs"]
pub mod governor;

#[path = "core/render.rs"]
pub mod render;

#[path = "core/engine.rs"]
pub mod engine;

pub mod observer;

pub use config::{ConfigError, EngineConfig};
pub use engine::{Engine, HostContext};
pub use governor::{DeviceProfile, QualityProfile};
pub use render::{RecordingSurface, Surface};
