//! Observation damping modules.

pub mod observation;

pub use observation::{ObservationDamping, UserState};
