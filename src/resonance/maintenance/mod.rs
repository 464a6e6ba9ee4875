//! Background maintenance of the session table.

pub mod session_sweeper;

pub use session_sweeper::{SessionSweeper, SweepStats};
