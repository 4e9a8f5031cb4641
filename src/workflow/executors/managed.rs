// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::Result;
use crate::managers::Manager;
use crate::runtime::Context;
use crate::workflow::{Workflow, WorkflowExecutor};

/// A workflow executor that encloses the execution in a manager scope.
pub struct ManagedExecutor {
    base: Arc<dyn WorkflowExecutor>,
    manager: Arc<dyn Manager>,
}

impl ManagedExecutor {
    pub fn new(base: Arc<dyn WorkflowExecutor>, manager: Arc<dyn Manager>) -> Self {
        Self { base, manager }
    }
}

#[async_trait]
impl WorkflowExecutor for ManagedExecutor {
    async fn execute(&self, workflow: &Workflow, context: &Context) -> Result<()> {
        self.manager.acquire().await?;
        let outcome = self.base.execute(workflow, context).await;
        let parting = self.manager.release().await;
        outcome.and(parting)
    }
}
