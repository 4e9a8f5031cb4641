// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;

use crate::errors::Result;
use crate::runtime::Context;
use crate::workflow::Workflow;

/// A strategy for running all tasks of a workflow.
#[async_trait]
pub trait WorkflowExecutor: Send + Sync {
    /// Run the tasks of the graph.
    ///
    /// Fails with an excusable error if some tasks stopped, and with a fatal
    /// one if some tasks failed.
    async fn execute(&self, workflow: &Workflow, context: &Context) -> Result<()>;
}
