// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use crate::condition::{Condition, ConditionRef, Expr};
use crate::errors::{Error, Result};
use crate::helpers::sha1_hex;
use crate::runtime::Context;
use crate::storage::Storage;
use crate::task::TaskRef;
use crate::workflow::processors::TargetOverridingTaskWrapper;
use crate::workflow::{Workflow, WorkflowProcessor};

/// A processor that makes tasks cache their targets.
///
/// Each target checks the cache before its own logic — a hit short-circuits
/// to true — and registers itself in the cache once it becomes true. Cache
/// backend errors are treated as "not sure": they neither count as a hit nor
/// block the real check, so they cannot inflate false positives.
///
/// Cachers stack: apply the remote one first, then the local one.
///
/// This optimization assumes a normalized workflow; apply
/// [`super::WorkflowNormalizer`] first.
pub struct TargetCacher {
    cache: Arc<dyn Storage>,
}

impl TargetCacher {
    pub fn new(cache: Arc<dyn Storage>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl WorkflowProcessor for TargetCacher {
    async fn process(&self, workflow: &mut Workflow, _context: &Context) -> Result<()> {
        let tasks: Vec<TaskRef> = workflow.items().cloned().collect();
        for task in tasks {
            let Some(target) = task.target() else {
                continue;
            };
            let target = ConditionRef::new(CachingConditionWrapper {
                base: target,
                cache: self.cache.clone(),
            });
            workflow.replace(TaskRef::new(TargetOverridingTaskWrapper::new(
                task,
                Some(target),
            )));
        }
        Ok(())
    }
}

/// A condition wrapper that caches itself in a storage.
pub struct CachingConditionWrapper {
    base: ConditionRef,
    cache: Arc<dyn Storage>,
}

#[async_trait]
impl Condition for CachingConditionWrapper {
    fn name(&self) -> String {
        self.base.name()
    }

    async fn check(&self, context: &Context) -> Result<bool> {
        let key = sha1_hex(&self.name());
        let mut cached = true;
        tracing::debug!("looking up `{}` in the cache", self.name());
        match self.cache.get(&key, None, Some(1)) {
            Ok(records) if !records.is_empty() => {
                tracing::debug!("found in the cache");
                return Ok(true);
            }
            Ok(_) => cached = false,
            Err(Error::StorageOperation(_)) => {} // not sure if really not cached
            Err(error) => return Err(error),
        }
        let result = self.base.check(context).await?;
        if result && !cached {
            tracing::debug!("caching `{}`", self.name());
            if let Err(error) = self.cache.put(&key, "!") {
                tracing::debug!("failed to cache: {error}");
            }
        }
        Ok(result)
    }

    fn expression(&self) -> Option<Expr> {
        self.base.expression()
    }

    fn invariants(&self) -> Vec<ConditionRef> {
        self.base.invariants()
    }

    fn unwrap(&self) -> Option<ConditionRef> {
        Some(self.base.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
