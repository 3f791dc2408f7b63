//! Concrete [`MessageConsumer`](crate::MessageConsumer) implementations.
//!
//! Contains [`FileStorageConsumer`] for filesystem persistence and
//! [`MemoryConsumer`] keeping delivered messages in memory.

pub mod file_storage;
pub mod memory;

pub use file_storage::*;
pub use memory::*;
