//! The process-wide default handler.
//!
//! Constructed on first use from [`LooperConfig::from_env`] and never torn
//! down: its looper thread lives for the rest of the process. There is no reset.
//! If the first construction fails, every later call sees no default handler
//! and the free functions return `false`.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tracing::{error, info};

use crate::builders::build_default_handler;
use crate::config::LooperConfig;
use crate::core::{Task, WeakHandler};
use crate::infra::LooperThread;

struct DefaultScheduler {
    // Owned for the life of the process.
    _looper: LooperThread,
    handler: WeakHandler,
}

static DEFAULT: OnceLock<Option<DefaultScheduler>> = OnceLock::new();

fn init() -> Option<DefaultScheduler> {
    let config = LooperConfig::from_env();
    match build_default_handler(&config) {
        Ok((looper, handler)) => {
            info!(looper = %config.name, "default handler initialized");
            Some(DefaultScheduler {
                _looper: looper,
                handler,
            })
        }
        Err(error) => {
            error!(%error, "default handler unavailable");
            None
        }
    }
}

/// The process-wide handler, created on first call.
pub fn default_handler() -> Option<&'static WeakHandler> {
    DEFAULT.get_or_init(init).as_ref().map(|d| &d.handler)
}

/// Run `f(&owner)` on the default looper thread, unless `owner` has been
/// dropped by then.
pub fn post<T, F>(owner: &Arc<T>, f: F) -> bool
where
    T: Send + Sync + 'static,
    F: Fn(&T) + Send + Sync + 'static,
{
    default_handler().is_some_and(|handler| handler.post_detached(Task::bound(owner, f)))
}

/// Like [`post`], after `delay`.
pub fn post_delayed<T, F>(owner: &Arc<T>, delay: Duration, f: F) -> bool
where
    T: Send + Sync + 'static,
    F: Fn(&T) + Send + Sync + 'static,
{
    default_handler()
        .is_some_and(|handler| handler.post_detached_delayed(Task::bound(owner, f), delay))
}
