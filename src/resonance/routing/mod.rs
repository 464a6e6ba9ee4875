//! Intent routing modules.

pub mod intent_router;

pub use intent_router::IntentRouter;
