//! Resonance engine orchestration.

pub mod core;
mod guard;

pub use self::core::{EngineBackends, ResonanceEngine};
