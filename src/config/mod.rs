//! Configuration models for looper threads.

pub mod looper;

pub use looper::{LooperConfig, ENV_PREFIX};
