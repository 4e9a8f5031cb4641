// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;

use crate::errors::Result;
use crate::graph::{DfsLinearizer, Linearizer};
use crate::runtime::Context;
use crate::workflow::{Workflow, WorkflowProcessor};

/// A processor that annotates each task with its rank in a topological
/// linearization of the workflow: for every edge u → v, rank(u) < rank(v).
#[derive(Debug, Default)]
pub struct TaskRanker;

#[async_trait]
impl WorkflowProcessor for TaskRanker {
    async fn process(&self, workflow: &mut Workflow, _context: &Context) -> Result<()> {
        let order = DfsLinearizer.linearize(workflow)?;
        for (rank, task) in order.into_iter().enumerate() {
            workflow.node_mut(&task).annotation.rank = Some(rank as u64);
        }
        Ok(())
    }
}
