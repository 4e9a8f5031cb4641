// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::errors::{Error, Result};
use crate::helpers::Flag;
use crate::locker::{LockGuard, Locker};

/// A process-level locker: an in-process mutex per key.
///
/// Share the same instance between workers for it to mean anything.
#[derive(Debug, Default, Clone)]
pub struct ProcessLocker {
    held: Arc<Mutex<HashSet<String>>>,
}

impl ProcessLocker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Locker for ProcessLocker {
    fn lock(&self, key: &str, _loss_flag: Option<&Flag>) -> Result<LockGuard> {
        {
            let mut held = self.held.lock().unwrap();
            if !held.insert(key.to_string()) {
                return Err(Error::LockAcquisition(key.to_string()));
            }
        }
        let held = self.held.clone();
        let key = key.to_string();
        Ok(LockGuard::new(move || {
            held.lock().unwrap().remove(&key);
        }))
    }
}
