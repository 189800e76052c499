//! Infrastructure: the in-process message queue and the threads that drain it.

pub mod looper;
pub mod queue;

pub use looper::{Looper, LooperThread};
pub use queue::MessageQueue;
