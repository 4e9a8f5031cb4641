// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Versioned key-value storage.
//!
//! A storage keeps `(key, version, value)` records with strictly increasing
//! per-key versions. That is all the engine needs for caching, locking
//! bookkeeping, test registries, and the whole monitoring pipeline: an
//! append-only log per key with range reads and prefix deletion.
//!
//! Implementations must be safe for concurrent readers and writers — the
//! daemon hands the same storage to every builder and executor worker.

mod embedded;
mod memory;

pub use embedded::SledStorage;
pub use memory::InMemoryStorage;

use crate::errors::Result;

/// A versioned key-value store.
pub trait Storage: Send + Sync {
    /// Store a value under the key. Returns the assigned version; versions
    /// for a given key increase monotonically over time.
    fn put(&self, key: &str, value: &str) -> Result<u64>;

    /// Select the latest records for the key, newest first.
    ///
    /// `since` bounds the versions from below (inclusive); `limit` caps the
    /// number of records returned.
    fn get(&self, key: &str, since: Option<u64>, limit: Option<usize>)
        -> Result<Vec<(u64, String)>>;

    /// Delete records for the key with versions below `till` (all of them
    /// when `till` is `None`).
    fn delete(&self, key: &str, till: Option<u64>) -> Result<()>;

    /// Fetch everything. For diagnostics.
    fn gather(&self) -> Result<Vec<(String, u64, String)>>;

    /// Wipe the storage.
    fn clear(&self) -> Result<()>;
}
