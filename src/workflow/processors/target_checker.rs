// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::any::Any;

use async_trait::async_trait;

use crate::condition::ConditionRef;
use crate::errors::{Error, Result};
use crate::runtime::Context;
use crate::task::{Requisite, Task, TaskRef};
use crate::workflow::{Workflow, WorkflowProcessor};

/// A processor that makes tasks pre-check their targets: an already-true
/// target skips the execution entirely.
#[derive(Debug, Default)]
pub struct TargetPreChecker;

#[async_trait]
impl WorkflowProcessor for TargetPreChecker {
    async fn process(&self, workflow: &mut Workflow, _context: &Context) -> Result<()> {
        let tasks: Vec<TaskRef> = workflow.items().cloned().collect();
        for task in tasks {
            if task.phony() {
                continue;
            }
            workflow.replace(TaskRef::new(PreCheckingTaskWrapper { base: task }));
        }
        Ok(())
    }
}

/// A processor that makes tasks post-check their targets: a target that
/// stays false after execution is a verification error.
#[derive(Debug, Default)]
pub struct TargetPostChecker;

#[async_trait]
impl WorkflowProcessor for TargetPostChecker {
    async fn process(&self, workflow: &mut Workflow, _context: &Context) -> Result<()> {
        let tasks: Vec<TaskRef> = workflow.items().cloned().collect();
        for task in tasks {
            if task.phony() {
                continue;
            }
            workflow.replace(TaskRef::new(PostCheckingTaskWrapper { base: task }));
        }
        Ok(())
    }
}

/// Pre- and post-checks combined.
#[derive(Debug, Default)]
pub struct TargetChecker;

#[async_trait]
impl WorkflowProcessor for TargetChecker {
    async fn process(&self, workflow: &mut Workflow, context: &Context) -> Result<()> {
        TargetPostChecker.process(workflow, context).await?;
        TargetPreChecker.process(workflow, context).await
    }
}

pub(crate) struct PreCheckingTaskWrapper {
    pub(crate) base: TaskRef,
}

#[async_trait]
impl Task for PreCheckingTaskWrapper {
    fn name(&self) -> String {
        self.base.name()
    }

    fn requisite(&self) -> Requisite {
        self.base.requisite()
    }

    fn target(&self) -> Option<ConditionRef> {
        self.base.target()
    }

    fn phony(&self) -> bool {
        self.base.phony()
    }

    async fn execute(&self, context: &Context) -> Result<()> {
        if let Some(target) = self.target() {
            tracing::debug!("pre-checking `{target}`");
            if target.check(context).await? {
                tracing::debug!("task `{}` already completed (skipping)", self.name());
                return Ok(());
            }
        }
        self.base.execute(context).await
    }

    fn unwrap(&self) -> Option<TaskRef> {
        Some(self.base.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct PostCheckingTaskWrapper {
    base: TaskRef,
}

#[async_trait]
impl Task for PostCheckingTaskWrapper {
    fn name(&self) -> String {
        self.base.name()
    }

    fn requisite(&self) -> Requisite {
        self.base.requisite()
    }

    fn target(&self) -> Option<ConditionRef> {
        self.base.target()
    }

    fn phony(&self) -> bool {
        self.base.phony()
    }

    async fn execute(&self, context: &Context) -> Result<()> {
        self.base.execute(context).await?;
        if let Some(target) = self.target() {
            tracing::debug!("post-checking `{target}`");
            if !target.check(context).await? {
                return Err(Error::TargetVerification {
                    task: self.name(),
                    target: target.name(),
                });
            }
        }
        Ok(())
    }

    fn unwrap(&self) -> Option<TaskRef> {
        Some(self.base.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
