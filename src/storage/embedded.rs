// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::path::Path;

use crate::errors::{Error, Result};
use crate::storage::Storage;

/// An embedded storage backed by a sled database.
///
/// Records live under composite keys `key \0 version` with the version in
/// big-endian, so a prefix scan yields one key's records in version order.
/// Versions come from the database's monotonic ID generator: globally
/// increasing, hence strictly increasing per key. Safe for concurrent use
/// within a process; sled holds an exclusive file lock across processes.
#[derive(Debug, Clone)]
pub struct SledStorage {
    tree: sled::Db,
}

impl SledStorage {
    /// Open (or create) a database at the path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let tree = sled::open(path).map_err(weep)?;
        Ok(Self { tree })
    }

    /// An anonymous in-memory database, for tests and demos.
    pub fn temporary() -> Result<Self> {
        let tree = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(weep)?;
        Ok(Self { tree })
    }

    fn composite(key: &str, version: u64) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(key.len() + 9);
        buffer.extend_from_slice(key.as_bytes());
        buffer.push(0);
        buffer.extend_from_slice(&version.to_be_bytes());
        buffer
    }

    fn prefix(key: &str) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(key.len() + 1);
        buffer.extend_from_slice(key.as_bytes());
        buffer.push(0);
        buffer
    }

    fn split(composite: &[u8]) -> Result<(String, u64)> {
        if composite.len() < 9 {
            return Err(Error::StorageOperation("malformed record key".into()));
        }
        let (key, version) = composite.split_at(composite.len() - 9);
        let key = String::from_utf8(key.to_vec())
            .map_err(|_| Error::StorageOperation("malformed record key".into()))?;
        let version = u64::from_be_bytes(version[1..].try_into().unwrap());
        Ok((key, version))
    }
}

fn weep(error: sled::Error) -> Error {
    Error::StorageOperation(error.to_string())
}

impl Storage for SledStorage {
    fn put(&self, key: &str, value: &str) -> Result<u64> {
        let version = self.tree.generate_id().map_err(weep)?;
        self.tree
            .insert(Self::composite(key, version), value.as_bytes())
            .map_err(weep)?;
        Ok(version)
    }

    fn get(
        &self,
        key: &str,
        since: Option<u64>,
        limit: Option<usize>,
    ) -> Result<Vec<(u64, String)>> {
        let mut result = Vec::new();
        for record in self.tree.scan_prefix(Self::prefix(key)).rev() {
            if let Some(cap) = limit {
                if result.len() >= cap {
                    break;
                }
            }
            let (composite, value) = record.map_err(weep)?;
            let (_, version) = Self::split(&composite)?;
            if since.is_some_and(|floor| version < floor) {
                break;
            }
            let value = String::from_utf8(value.to_vec())
                .map_err(|_| Error::StorageOperation("malformed record value".into()))?;
            result.push((version, value));
        }
        Ok(result)
    }

    fn delete(&self, key: &str, till: Option<u64>) -> Result<()> {
        for record in self.tree.scan_prefix(Self::prefix(key)) {
            let (composite, _) = record.map_err(weep)?;
            let (_, version) = Self::split(&composite)?;
            if till.is_some_and(|ceiling| version >= ceiling) {
                break;
            }
            self.tree.remove(composite).map_err(weep)?;
        }
        Ok(())
    }

    fn gather(&self) -> Result<Vec<(String, u64, String)>> {
        let mut result = Vec::new();
        for record in self.tree.iter() {
            let (composite, value) = record.map_err(weep)?;
            let (key, version) = Self::split(&composite)?;
            let value = String::from_utf8(value.to_vec())
                .map_err(|_| Error::StorageOperation("malformed record value".into()))?;
            result.push((key, version, value));
        }
        Ok(result)
    }

    fn clear(&self) -> Result<()> {
        self.tree.clear().map_err(weep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::contract;

    #[test]
    fn test_versions_increase() {
        contract::versions_increase(&SledStorage::temporary().unwrap());
    }

    #[test]
    fn test_since_and_limit() {
        contract::since_and_limit(&SledStorage::temporary().unwrap());
    }

    #[test]
    fn test_deletion() {
        contract::deletion(&SledStorage::temporary().unwrap());
    }

    #[test]
    fn test_gather_and_clear() {
        contract::gather_and_clear(&SledStorage::temporary().unwrap());
    }

    #[test]
    fn test_reopening_keeps_records() {
        let home = tempfile::tempdir().unwrap();
        let path = home.path().join("records");
        {
            let storage = SledStorage::open(&path).unwrap();
            storage.put("key", "kept").unwrap();
        }
        let storage = SledStorage::open(&path).unwrap();
        let records = storage.get("key", None, None).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].1, "kept");
    }
}
