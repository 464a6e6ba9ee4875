//! Resonance server binary.
//! Run with: cargo run --bin resonance-server

use std::process::ExitCode;

use resonance_engine::start_resonance;

fn main() -> ExitCode {
    start_resonance::run()
}
