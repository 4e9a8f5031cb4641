// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use crate::errors::Result;
use crate::runtime::Context;
use crate::storage::Storage;
use crate::testing::{AllTestSelector, TestSelector};
use crate::workflow::processors::{TaskSegregator, WorkflowTestifier};
use crate::workflow::{Workflow, WorkflowProcessor};

/// The daemon auto-tester: everything needed to turn the main module's
/// workflow into a self-testing one.
pub struct DaemonAutoTester {
    /// Where passed tests are recorded. Can safely share a storage with the
    /// target cache.
    pub registry: Arc<dyn Storage>,
    pub selector: Arc<dyn TestSelector>,
}

impl DaemonAutoTester {
    pub fn new(registry: Arc<dyn Storage>) -> Self {
        Self {
            registry,
            selector: Arc::new(AllTestSelector),
        }
    }

    pub fn with_selector(mut self, selector: Arc<dyn TestSelector>) -> Self {
        self.selector = selector;
        self
    }

    /// Make the workflow test itself: project the tests, then segregate the
    /// color groups.
    pub async fn testify(&self, workflow: &mut Workflow, context: &Context) -> Result<()> {
        WorkflowTestifier::new(self.registry.clone())
            .with_selector(self.selector.clone())
            .process(workflow, context)
            .await?;
        TaskSegregator.process(workflow, context).await
    }
}
