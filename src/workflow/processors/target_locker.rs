// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use crate::condition::ConditionRef;
use crate::errors::{Error, Result};
use crate::helpers::Flag;
use crate::locker::Locker;
use crate::runtime::Context;
use crate::task::{Requisite, Task, TaskRef};
use crate::workflow::processors::target_checker::PreCheckingTaskWrapper;
use crate::workflow::{Workflow, WorkflowProcessor};

/// A processor that makes tasks retain a lock during execution.
///
/// Each task with a target acquires a lock for the target name before
/// running, so only one executor instance works on a task at a time. The
/// target gets pre-checked after acquisition — the race favorite may have
/// already finished the job.
pub struct TargetLocker {
    locker: Arc<dyn Locker>,
}

impl TargetLocker {
    pub fn new(locker: Arc<dyn Locker>) -> Self {
        Self { locker }
    }
}

#[async_trait]
impl WorkflowProcessor for TargetLocker {
    async fn process(&self, workflow: &mut Workflow, _context: &Context) -> Result<()> {
        let tasks: Vec<TaskRef> = workflow.items().cloned().collect();
        for task in tasks {
            if task.target().is_none() {
                continue;
            }
            let checked = TaskRef::new(PreCheckingTaskWrapper { base: task });
            workflow.replace(TaskRef::new(LockingTaskWrapper {
                base: checked,
                locker: self.locker.clone(),
            }));
        }
        Ok(())
    }
}

/// A task wrapper that holds a lock for its target while executing.
///
/// A lock lost during execution surfaces as a retention error even when the
/// execution itself succeeded.
struct LockingTaskWrapper {
    base: TaskRef,
    locker: Arc<dyn Locker>,
}

#[async_trait]
impl Task for LockingTaskWrapper {
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
        let target = self
            .target()
            .expect("the locker only wraps tasks with targets");
        let loss_flag = Flag::new();
        tracing::debug!("locking `{target}`");
        let guard = self.locker.lock(&target.name(), Some(&loss_flag))?;
        let result = self.base.execute(context).await;
        tracing::debug!("unlocking `{target}`");
        drop(guard);
        result?;
        if loss_flag.raised() {
            return Err(Error::LockRetention(target.name()));
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::testkit::Constant;
    use crate::locker::ProcessLocker;
    use crate::task::testkit::{journal, Probe};
    use crate::workflow::WorkflowBuilder;

    #[tokio::test]
    async fn test_execution_respects_held_locks() {
        let locker = Arc::new(ProcessLocker::new());
        let pending = Constant::of("locker/Pending", false);
        let log = journal();
        let task = Probe::active("Guarded", &log).aiming(&pending).build();
        let mut workflow = WorkflowBuilder::new().build(task.clone()).unwrap();
        TargetLocker::new(locker.clone())
            .process(&mut workflow, &Context::root())
            .await
            .unwrap();
        let wrapped = workflow.node(&task).item.clone();
        // someone else holds the lock
        let guard = locker.lock("locker/Pending", None).unwrap();
        let error = wrapped.execute(&Context::root()).await.unwrap_err();
        assert!(error.is_excusable());
        assert!(log.lock().unwrap().is_empty());
        drop(guard);
        wrapped.execute(&Context::root()).await.unwrap();
        assert_eq!(log.lock().unwrap().len(), 1);
        // the lock is released afterwards
        assert!(locker.lock("locker/Pending", None).is_ok());
    }

    #[tokio::test]
    async fn test_completed_tasks_are_skipped_after_locking() {
        let locker = Arc::new(ProcessLocker::new());
        let done = Constant::of("locker/Done", true);
        let log = journal();
        let task = Probe::active("Redundant", &log).aiming(&done).build();
        let mut workflow = WorkflowBuilder::new().build(task.clone()).unwrap();
        TargetLocker::new(locker)
            .process(&mut workflow, &Context::root())
            .await
            .unwrap();
        let wrapped = workflow.node(&task).item.clone();
        wrapped.execute(&Context::root()).await.unwrap();
        assert!(log.lock().unwrap().is_empty());
    }
}
