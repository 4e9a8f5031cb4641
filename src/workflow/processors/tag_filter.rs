// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::HashSet;

use async_trait::async_trait;

use crate::errors::Result;
use crate::graph::{DfsLinearizer, Linearizer};
use crate::runtime::Context;
use crate::task::TaskRef;
use crate::workflow::{Workflow, WorkflowProcessor};

/// A processor that filters out tasks that do not affect tasks with the
/// given tag.
///
/// A task gets removed iff its tag differs from the given one and it has no
/// followers with the given tag. The default tag of a task is `None`.
#[derive(Debug, Default)]
pub struct TagFilter {
    tag: Option<String>,
}

impl TagFilter {
    pub fn new(tag: Option<String>) -> Self {
        Self { tag }
    }
}

#[async_trait]
impl WorkflowProcessor for TagFilter {
    async fn process(&self, workflow: &mut Workflow, _context: &Context) -> Result<()> {
        let order = DfsLinearizer.linearize(workflow)?;
        let mut foreigners: HashSet<TaskRef> = HashSet::new();
        for task in order.iter().rev() {
            let node = workflow.node(task);
            if node.annotation.tag != self.tag && node.children.is_subset(&foreigners) {
                foreigners.insert(task.clone());
            }
        }
        workflow.remove(foreigners);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::testkit::Probe;
    use crate::workflow::WorkflowBuilder;

    fn tagged(workflow: &mut Workflow, task: &TaskRef, tag: &str) {
        workflow.node_mut(task).annotation.tag = Some(tag.to_string());
    }

    #[tokio::test]
    async fn test_keeps_tagged_tasks_and_their_ancestors() {
        let base = Probe::phony("Base").build();
        let focus = Probe::phony("Focus").after(&base).build();
        let other = Probe::phony("Other").after(&base).build();
        let root = Probe::phony("Root").after(&focus).after(&other).build();
        let mut workflow = WorkflowBuilder::new().build(root.clone()).unwrap();
        tagged(&mut workflow, &focus, "focus");
        TagFilter::new(Some("focus".into()))
            .process(&mut workflow, &Context::root())
            .await
            .unwrap();
        assert!(workflow.contains(&focus));
        assert!(workflow.contains(&base));
        assert!(!workflow.contains(&other));
        assert!(!workflow.contains(&root));
    }

    #[tokio::test]
    async fn test_default_filter_drops_foreign_subgraphs() {
        let base = Probe::phony("Base").build();
        let focus = Probe::phony("Focus").after(&base).build();
        let root = Probe::phony("Root").after(&focus).build();
        let mut workflow = WorkflowBuilder::new().build(root.clone()).unwrap();
        tagged(&mut workflow, &focus, "focus");
        TagFilter::new(None)
            .process(&mut workflow, &Context::root())
            .await
            .unwrap();
        // the untagged root keeps its whole ancestry, tagged or not
        assert_eq!(workflow.len(), 3);
        let mut lonely = WorkflowBuilder::new().build(focus.clone()).unwrap();
        tagged(&mut lonely, &focus, "focus");
        TagFilter::new(None)
            .process(&mut lonely, &Context::root())
            .await
            .unwrap();
        assert_eq!(lonely.len(), 1);
        assert!(lonely.contains(&base));
    }
}
