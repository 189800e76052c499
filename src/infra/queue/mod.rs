//! Host queue implementations.

pub mod memory;

pub use memory::MessageQueue;
