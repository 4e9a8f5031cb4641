// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::any::Any;

use async_trait::async_trait;

use crate::condition::{Condition, ConditionRef, Expr};
use crate::errors::Result;
use crate::helpers::colorbox;
use crate::runtime::Context;
use crate::task::{Requisite, Task, TaskRef};
use crate::workflow::{Workflow, WorkflowProcessor};

/// A processor that uses `color` annotations to separate environments.
///
/// Around each task execution and target check, the node's color is stored
/// in the task-scoped color slot (see [`colorbox`]); environment-dependent
/// resources read it back to pick a per-color sandbox. Tasks without a color
/// store nothing.
///
/// Task parameters must not depend on the environment — only execution and
/// target checking may. Apply this processor before anything that performs
/// target checks (like the trimmer).
#[derive(Debug, Default)]
pub struct TaskSegregator;

#[async_trait]
impl WorkflowProcessor for TaskSegregator {
    async fn process(&self, workflow: &mut Workflow, _context: &Context) -> Result<()> {
        let tasks: Vec<TaskRef> = workflow.items().cloned().collect();
        for task in tasks {
            let color = workflow.node(&task).annotation.color.clone();
            workflow.replace(TaskRef::new(SegregatingTaskWrapper { base: task, color }));
        }
        Ok(())
    }
}

/// A task wrapper that colors the environment around execution.
struct SegregatingTaskWrapper {
    base: TaskRef,
    color: Option<String>,
}

#[async_trait]
impl Task for SegregatingTaskWrapper {
    fn name(&self) -> String {
        self.base.name()
    }

    fn requisite(&self) -> Requisite {
        self.base.requisite()
    }

    fn target(&self) -> Option<ConditionRef> {
        self.base.target().map(|target| {
            ConditionRef::new(SegregatingConditionWrapper {
                base: target,
                color: self.color.clone(),
            })
        })
    }

    fn phony(&self) -> bool {
        self.base.phony()
    }

    async fn execute(&self, context: &Context) -> Result<()> {
        let base = self.base.clone();
        let context = context.clone();
        colorbox::scope(self.color.clone(), async move { base.execute(&context).await })
            .await
    }

    fn unwrap(&self) -> Option<TaskRef> {
        Some(self.base.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A condition wrapper that colors the environment around checking.
struct SegregatingConditionWrapper {
    base: ConditionRef,
    color: Option<String>,
}

#[async_trait]
impl Condition for SegregatingConditionWrapper {
    fn name(&self) -> String {
        self.base.name()
    }

    async fn check(&self, context: &Context) -> Result<bool> {
        let base = self.base.clone();
        let context = context.clone();
        colorbox::scope(self.color.clone(), async move { base.check(&context).await }).await
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct ColorProbe {
        seen: Arc<Mutex<Vec<Option<String>>>>,
    }

    #[async_trait]
    impl Task for ColorProbe {
        fn name(&self) -> String {
            "ColorProbe".into()
        }

        fn phony(&self) -> bool {
            false
        }

        async fn execute(&self, _context: &Context) -> Result<()> {
            self.seen.lock().unwrap().push(colorbox::current());
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[tokio::test]
    async fn test_colors_surround_execution() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let task = TaskRef::new(ColorProbe { seen: seen.clone() });
        let mut workflow = Workflow::new();
        workflow.add(task.clone());
        workflow.node_mut(&task).annotation.color = Some("2b6a4f31".into());
        TaskSegregator
            .process(&mut workflow, &Context::root())
            .await
            .unwrap();
        let wrapped = workflow.node(&task).item.clone();
        wrapped.execute(&Context::root()).await.unwrap();
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            [Some("2b6a4f31".to_string())]
        );
        // outside of the execution the slot is empty again
        assert_eq!(colorbox::current(), None);
    }
}
