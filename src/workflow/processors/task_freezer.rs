// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::any::Any;

use async_trait::async_trait;

use crate::condition::ConditionRef;
use crate::errors::Result;
use crate::runtime::Context;
use crate::task::{Requisite, Task, TaskRef};
use crate::workflow::{Workflow, WorkflowProcessor};

/// A processor that pre-computes the properties of all tasks.
///
/// After freezing, `name`, `requisite`, and `target` stay immutable for the
/// rest of the pipeline no matter what the underlying task computes.
#[derive(Debug, Default)]
pub struct TaskFreezer;

#[async_trait]
impl WorkflowProcessor for TaskFreezer {
    async fn process(&self, workflow: &mut Workflow, _context: &Context) -> Result<()> {
        let tasks: Vec<TaskRef> = workflow.items().cloned().collect();
        for task in tasks {
            workflow.replace(TaskRef::new(FreezingTaskWrapper::new(task)));
        }
        Ok(())
    }
}

/// A task wrapper with pre-computed properties.
pub struct FreezingTaskWrapper {
    base: TaskRef,
    name: String,
    requisite: Requisite,
    target: Option<ConditionRef>,
}

impl FreezingTaskWrapper {
    pub fn new(base: TaskRef) -> Self {
        Self {
            name: base.name(),
            requisite: base.requisite(),
            target: base.target(),
            base,
        }
    }
}

#[async_trait]
impl Task for FreezingTaskWrapper {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn requisite(&self) -> Requisite {
        self.requisite.clone()
    }

    fn target(&self) -> Option<ConditionRef> {
        self.target.clone()
    }

    fn phony(&self) -> bool {
        self.base.phony()
    }

    async fn execute(&self, context: &Context) -> Result<()> {
        self.base.execute(context).await
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
    use crate::task::testkit::Probe;

    #[tokio::test]
    async fn test_freezing_preserves_properties_and_edges() {
        let head = Probe::phony("Head").build();
        let tail = Probe::phony("Tail").after(&head).build();
        let mut workflow = crate::workflow::WorkflowBuilder::new()
            .build(tail.clone())
            .unwrap();
        TaskFreezer.process(&mut workflow, &Context::root()).await.unwrap();
        let frozen = workflow.node(&tail).item.clone();
        assert_eq!(frozen.name(), "Tail");
        assert!(frozen
            .as_any()
            .downcast_ref::<FreezingTaskWrapper>()
            .is_some());
        assert_eq!(frozen.unwrap_fully().name(), "Tail");
        assert!(workflow.node(&tail).parents.contains(&head));
    }
}
