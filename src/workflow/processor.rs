// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;

use crate::errors::Result;
use crate::runtime::Context;
use crate::workflow::Workflow;

/// A transformation of a workflow, applied in place.
///
/// Preprocessors run before tag filtering, postprocessors after; the daemon
/// composes them into a pipeline. Some processors check targets along the
/// way (the trimmer does), which is why processing is asynchronous and
/// context-aware.
#[async_trait]
pub trait WorkflowProcessor: Send + Sync {
    async fn process(&self, workflow: &mut Workflow, context: &Context) -> Result<()>;
}
