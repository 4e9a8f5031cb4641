// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Managers: scoped resources around building and execution.
//!
//! A manager owns something that must be alive while workflows are built or
//! executed — a connection pool, a coordinator session. The managed
//! executor acquires before running and releases afterwards, errors or not.

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::Result;

/// A scoped resource.
#[async_trait]
pub trait Manager: Send + Sync {
    async fn acquire(&self) -> Result<()>;
    async fn release(&self) -> Result<()>;
}

/// A manager that cascades several managers.
///
/// Acquires in order, releases in reverse; a failed acquisition releases
/// whatever was already acquired.
#[derive(Default)]
pub struct CascadeManager {
    managers: Vec<Arc<dyn Manager>>,
}

impl CascadeManager {
    pub fn new(managers: Vec<Arc<dyn Manager>>) -> Self {
        Self { managers }
    }
}

#[async_trait]
impl Manager for CascadeManager {
    async fn acquire(&self) -> Result<()> {
        for (index, manager) in self.managers.iter().enumerate() {
            if let Err(error) = manager.acquire().await {
                for acquired in self.managers[..index].iter().rev() {
                    if let Err(release_error) = acquired.release().await {
                        tracing::warn!("failed to release a manager: {release_error}");
                    }
                }
                return Err(error);
            }
        }
        Ok(())
    }

    async fn release(&self) -> Result<()> {
        let mut outcome = Ok(());
        for manager in self.managers.iter().rev() {
            if let Err(error) = manager.release().await {
                tracing::warn!("failed to release a manager: {error}");
                if outcome.is_ok() {
                    outcome = Err(error);
                }
            }
        }
        outcome
    }
}
