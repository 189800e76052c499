//! Weak-reference task scheduling: tasks, the pending registry, wrappers, the
//! host-queue seam, and the handler facade.

pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod queue;
pub mod registry;
pub mod task;
pub mod wrapper;

pub use dispatcher::{CallbackDispatcher, MessageHandler};
pub use error::{AppResult, SchedulerError};
pub use handler::WeakHandler;
pub use queue::{Envelope, HandlerId, HostQueue, WrapperId};
pub use registry::{NodeHandle, PendingRegistry};
pub use task::{Message, Task, Token};
pub use wrapper::TaskWrapper;
