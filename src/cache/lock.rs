use std::sync::{Mutex, MutexGuard};

use tracing::warn;

/// Lock a cache mutex, continuing with the inner state if a holder panicked.
pub(crate) fn lock_or_recover<'a, T>(lock: &'a Mutex<T>, component: &'static str) -> MutexGuard<'a, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        warn!(
            target = "icelog::cache",
            component,
            result = "poisoned_recovered",
            "cache mutex poisoned; continuing with recovered state"
        );
        poisoned.into_inner()
    })
}
