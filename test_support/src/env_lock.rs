//! Serialise environment mutations across tests.
//!
//! `PATH` is process-global, so every write to it goes through [`EnvLock`].
//! The lock is not reentrant: do not hold it while creating a
//! [`PathGuard`](crate::PathGuard).

use std::sync::{Mutex, MutexGuard, PoisonError};

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// RAII guard that holds the global environment lock.
#[derive(Debug)]
pub struct EnvLock {
    _guard: MutexGuard<'static, ()>,
}

impl EnvLock {
    /// Block until the environment lock is free. A poisoned lock is
    /// recovered, since a panicking test has already restored its state.
    #[must_use]
    pub fn acquire() -> Self {
        Self {
            _guard: ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }
}
