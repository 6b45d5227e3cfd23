use std::sync::{LockResult, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

/// `RwLock` for in-process store state that keeps serving after a writer
/// panicked.
#[derive(Debug, Default)]
pub(crate) struct StoreLock<T> {
    inner: RwLock<T>,
}

impl<T> StoreLock<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            inner: RwLock::new(value),
        }
    }

    pub(crate) fn read(&self, op: &'static str) -> RwLockReadGuard<'_, T> {
        recover(self.inner.read(), "read", op)
    }

    pub(crate) fn write(&self, op: &'static str) -> RwLockWriteGuard<'_, T> {
        recover(self.inner.write(), "write", op)
    }
}

fn recover<G>(result: LockResult<G>, access: &'static str, op: &'static str) -> G {
    result.unwrap_or_else(|poisoned| {
        warn!(op, access, "Store lock poisoned by a panicked writer; serving its last contents");
        poisoned.into_inner()
    })
}
