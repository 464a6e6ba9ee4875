//! Memory buffer modules.

pub mod buffer;

pub use buffer::MemoryBuffer;
