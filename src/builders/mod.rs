//! Builders that assemble handlers and looper threads from configuration.

pub mod handler_builder;

pub use handler_builder::{build_default_handler, spawn_looper, HandlerBuilder};
