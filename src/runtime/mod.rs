//! Process-wide default handler and the free posting functions built on it.

pub mod default;

pub use default::{default_handler, post, post_delayed};
