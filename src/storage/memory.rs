// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::HashMap;
use std::sync::Mutex;

use crate::errors::Result;
use crate::storage::Storage;

/// A simple in-memory storage.
///
/// Records for a key live in a vector whose index (plus a deletion offset)
/// is the version. Thread-safe; all operations take one short-lived lock.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    shelves: Mutex<HashMap<String, Shelf>>,
}

#[derive(Debug, Default)]
struct Shelf {
    offset: u64,
    values: Vec<String>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for InMemoryStorage {
    fn put(&self, key: &str, value: &str) -> Result<u64> {
        let mut shelves = self.shelves.lock().unwrap();
        let shelf = shelves.entry(key.to_string()).or_default();
        shelf.values.push(value.to_string());
        Ok(shelf.offset + shelf.values.len() as u64 - 1)
    }

    fn get(
        &self,
        key: &str,
        since: Option<u64>,
        limit: Option<usize>,
    ) -> Result<Vec<(u64, String)>> {
        let shelves = self.shelves.lock().unwrap();
        let Some(shelf) = shelves.get(key) else {
            return Ok(Vec::new());
        };
        let floor = since
            .map(|version| version.saturating_sub(shelf.offset) as usize)
            .unwrap_or(0);
        let count = shelf.values.len();
        let cap = limit.unwrap_or(count);
        let stop = floor.max(count.saturating_sub(cap));
        Ok((stop..count)
            .rev()
            .map(|index| (shelf.offset + index as u64, shelf.values[index].clone()))
            .collect())
    }

    fn delete(&self, key: &str, till: Option<u64>) -> Result<()> {
        let mut shelves = self.shelves.lock().unwrap();
        let Some(shelf) = shelves.get_mut(key) else {
            return Ok(());
        };
        let count = match till {
            None => shelf.values.len(),
            Some(till) => (till.saturating_sub(shelf.offset) as usize).min(shelf.values.len()),
        };
        shelf.values.drain(..count);
        shelf.offset += count as u64;
        Ok(())
    }

    fn gather(&self) -> Result<Vec<(String, u64, String)>> {
        let shelves = self.shelves.lock().unwrap();
        Ok(shelves
            .iter()
            .flat_map(|(key, shelf)| {
                shelf.values.iter().enumerate().map(move |(index, value)| {
                    (key.clone(), shelf.offset + index as u64, value.clone())
                })
            })
            .collect())
    }

    fn clear(&self) -> Result<()> {
        self.shelves.lock().unwrap().clear();
        Ok(())
    }
}
