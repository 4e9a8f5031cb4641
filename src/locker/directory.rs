// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use crate::errors::{Error, Result};
use crate::helpers::{sha1_hex, Flag};
use crate::locker::{LockGuard, Locker};

/// A directory-level locker: an inter-process mutex via exclusive lock-file
/// creation.
///
/// Lock files land under the base path, named by the SHA-1 of the key. Use a
/// temporary directory for them, and clean it from time to time: a process
/// that dies without dropping its guards leaves its lock files behind.
#[derive(Debug, Clone)]
pub struct DirectoryLocker {
    path: PathBuf,
}

impl DirectoryLocker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Locker for DirectoryLocker {
    fn lock(&self, key: &str, _loss_flag: Option<&Flag>) -> Result<LockGuard> {
        fs::create_dir_all(&self.path)
            .map_err(|error| Error::Other(anyhow::anyhow!("cannot prepare lock files: {error}")))?;
        let lock_file = self.path.join(sha1_hex(key));
        tracing::debug!("lock file: {}", lock_file.display());
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_file)
        {
            Ok(_) => Ok(LockGuard::new(move || {
                let _ = fs::remove_file(&lock_file);
            })),
            Err(error) if error.kind() == ErrorKind::AlreadyExists => {
                Err(Error::LockAcquisition(key.to_string()))
            }
            Err(error) => Err(Error::Other(anyhow::anyhow!(
                "cannot create a lock file: {error}"
            ))),
        }
    }
}
