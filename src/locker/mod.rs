// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Lockers: non-blocking mutex factories keyed by strings.
//!
//! A locker hands out scope-wide locks: no two clients within the locker's
//! scope (process, host, cluster) can hold a lock for the same key at the
//! same time. Acquisition is non-blocking — a taken lock means an excusable
//! [`Error::LockAcquisition`](crate::errors::Error::LockAcquisition), and
//! the caller comes back later. The daemon locks target names around task
//! execution, which is what deduplicates work between replicated executors.
//!
//! Locks release when the returned guard drops. A locker that can detect
//! losing a lock mid-flight (a cluster coordinator losing its session)
//! raises the loss flag the caller provided.

mod directory;
mod process;

pub use directory::DirectoryLocker;
pub use process::ProcessLocker;

use crate::errors::Result;
use crate::helpers::Flag;

/// A scoped lock. Dropping it releases the lock.
pub struct LockGuard {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard").finish_non_exhaustive()
    }
}

impl LockGuard {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

/// A non-blocking mutex factory.
pub trait Locker: Send + Sync {
    /// Acquire a lock for the key.
    ///
    /// `loss_flag`, when provided, is raised if the locker detects that the
    /// lock was lost while held; not every implementation can notice.
    fn lock(&self, key: &str, loss_flag: Option<&Flag>) -> Result<LockGuard>;
}
