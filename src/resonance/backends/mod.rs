//! Search backend modules.

pub mod fixed;
pub mod search;

pub use fixed::FixedResults;
pub use search::{BackendError, SearchBackend, SearchFuture};
