//! Looper thread configuration.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::AppResult;

/// Environment variable prefix read by [`LooperConfig::from_env`].
pub const ENV_PREFIX: &str = "WEAK_HANDLER_";

/// Configuration for a [`LooperThread`](crate::infra::LooperThread).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LooperConfig {
    /// Thread name, also used in log fields.
    pub name: String,
    /// Maximum queued entries before enqueue is refused.
    pub max_queue_depth: usize,
    /// Stack size of the looper thread in bytes.
    pub thread_stack_size: usize,
    /// How long `shutdown` waits for the thread before detaching it.
    pub join_timeout_ms: u64,
}

impl Default for LooperConfig {
    fn default() -> Self {
        Self {
            name: "weak-handler-looper".into(),
            max_queue_depth: 10_000,
            thread_stack_size: 256 * 1024,
            join_timeout_ms: 2_000,
        }
    }
}

impl LooperConfig {
    /// Set the thread name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the queue depth limit.
    #[must_use]
    pub const fn with_max_queue_depth(mut self, depth: usize) -> Self {
        self.max_queue_depth = depth;
        self
    }

    /// Set the thread stack size.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = bytes;
        self
    }

    /// Set the shutdown join timeout.
    #[must_use]
    pub const fn with_join_timeout_ms(mut self, ms: u64) -> Self {
        self.join_timeout_ms = ms;
        self
    }

    /// Shutdown join timeout as a [`Duration`].
    #[must_use]
    pub const fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".into());
        }
        if self.name.contains('\0') {
            return Err("name must not contain NUL".into());
        }
        if self.max_queue_depth == 0 {
            return Err("max_queue_depth must be greater than 0".into());
        }
        if self.thread_stack_size < 16 * 1024 {
            return Err("thread_stack_size must be at least 16384".into());
        }
        if self.join_timeout_ms == 0 {
            return Err("join_timeout_ms must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load and validate configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read, parsed, or validated.
    pub fn from_json_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading looper config {}", path.display()))?;
        Self::from_json_str(&raw)
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("loading looper config {}", path.display()))
    }

    /// Build from `WEAK_HANDLER_*` environment variables, falling back to a
    /// `.env` file found from the working directory upward.
    ///
    /// The `.env` file is read, never applied: the process environment is left
    /// untouched. Unset or unparsable variables keep their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let dotenv = dotenvy::dotenv_iter()
            .map(collect_vars)
            .unwrap_or_default();
        Self::from_env_and(&dotenv)
    }

    /// Like [`from_env`](Self::from_env), with `.env` read from `path`.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be opened.
    pub fn from_env_and_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let vars = dotenvy::from_path_iter(path)
            .with_context(|| format!("reading env file {}", path.display()))?;
        Ok(Self::from_env_and(&collect_vars(vars)))
    }

    fn from_env_and(dotenv: &HashMap<String, String>) -> Self {
        Self::from_lookup(|key| std::env::var(key).ok().or_else(|| dotenv.get(key).cloned()))
    }

    /// Build from an arbitrary variable source, keyed like the environment.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |suffix: &str| lookup(&format!("{ENV_PREFIX}{suffix}"));
        let mut cfg = Self::default();
        if let Some(name) = var("LOOPER_NAME") {
            cfg.name = name;
        }
        if let Some(depth) = var("MAX_QUEUE_DEPTH").and_then(|v| v.parse().ok()) {
            cfg.max_queue_depth = depth;
        }
        if let Some(size) = var("THREAD_STACK_SIZE").and_then(|v| v.parse().ok()) {
            cfg.thread_stack_size = size;
        }
        if let Some(ms) = var("JOIN_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            cfg.join_timeout_ms = ms;
        }
        cfg
    }
}

/// Unparsable lines are skipped.
fn collect_vars<R: std::io::Read>(vars: dotenvy::Iter<R>) -> HashMap<String, String> {
    vars.filter_map(Result::ok).collect()
}
