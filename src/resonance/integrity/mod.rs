//! Transactional session modules.

pub mod manager;
pub mod operation_store;
pub mod session;

pub use manager::{IntegrityManager, SessionStats};
pub use operation_store::{
    DurableStore, NoopStore, SqliteOperationStore, StoreFuture, build_store,
};
pub use session::{Operation, SessionSnapshot, SessionState};
