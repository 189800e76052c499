//! # Prometheus Weak Handler
//!
//! A scheduler facade that posts work onto a thread-affine, time-ordered queue
//! without keeping the work's owner alive.
//!
//! Posting normally hands the queue a strong reference to the closure, and the
//! closure's captures in turn. A long delay then pins whatever the closure
//! touches. [`WeakHandler`](crate::core::WeakHandler) posts a weak wrapper
//! instead: the caller keeps the [`Task`](crate::core::Task) alive for as long
//! as the post should stay meaningful, and when the last handle is dropped the
//! queued entry becomes a no-op.
//!
//! ## Pieces
//!
//! - [`core::PendingRegistry`] tracks every post that has neither fired nor been
//!   cancelled, so it can be cancelled by task identity.
//! - [`core::TaskWrapper`] is what actually sits on the queue. It unlinks its
//!   registry node before running and when discarded.
//! - [`core::HostQueue`] is the seam to the queue. [`infra::MessageQueue`] and
//!   [`infra::Looper`] are the in-process implementation; [`infra::LooperThread`]
//!   runs one on a dedicated thread.
//! - [`runtime::post`] and [`runtime::post_delayed`] use a process-wide handler
//!   created on first use.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use prometheus_weak_handler::core::{Task, WeakHandler};
//! use prometheus_weak_handler::infra::{Looper, MessageQueue};
//!
//! let queue = Arc::new(MessageQueue::with_monotonic_clock(1024));
//! let looper = Looper::new(Arc::clone(&queue));
//! let handler = WeakHandler::new(queue);
//!
//! let hits = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&hits);
//! let task = Task::new(move || {
//!     counter.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! handler.post(&task);
//! handler.post(&task);
//! handler.remove_callbacks(&task);
//! looper.drain();
//! assert_eq!(hits.load(Ordering::SeqCst), 1);
//!
//! // Once the task is dropped, queued posts become no-ops.
//! handler.post(&task);
//! drop(task);
//! looper.drain();
//! assert_eq!(hits.load(Ordering::SeqCst), 1);
//! assert_eq!(handler.pending_callbacks(), 0);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Tasks, the pending registry, wrappers, and the handler facade.
pub mod core;
/// Looper configuration.
pub mod config;
/// Builders assembling handlers and looper threads.
pub mod builders;
/// The in-process message queue and looper threads.
pub mod infra;
/// The process-wide default handler.
pub mod runtime;
/// Clocks and telemetry.
pub mod util;

pub use crate::core::{AppResult, Message, SchedulerError, Task, Token, WeakHandler};
pub use crate::runtime::{post, post_delayed};
