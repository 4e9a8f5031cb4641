// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;

use crate::errors::{Error, Result};
use crate::runtime::Context;
use crate::workflow::{ranked_queue, Workflow, WorkflowExecutor};

/// The basic workflow executor.
///
/// Walks the ranked workflow one task at a time: phony tasks pass through,
/// tasks whose targets already check true are accepted as complete, the
/// rest get executed. A task that stops or fails takes its descendants out
/// of the round; at the end the executor aggregates what happened —
/// failures dominate stops.
///
/// Expects tasks to be ranked in advance (see
/// [`crate::workflow::processors::TaskRanker`]).
#[derive(Debug, Default)]
pub struct BasicExecutor;

#[async_trait]
impl WorkflowExecutor for BasicExecutor {
    async fn execute(&self, workflow: &Workflow, context: &Context) -> Result<()> {
        let mut queue = ranked_queue(workflow)?;
        let mut stopped_tasks: Vec<String> = Vec::new();
        let mut failed_tasks: Vec<String> = Vec::new();
        while let Some(task) = queue.pick().cloned() {
            context.checkpoint()?;
            if task.phony() {
                queue.accept();
                continue;
            }
            tracing::debug!("picked task `{task}`");
            let attempt: Result<bool> = async {
                if let Some(target) = task.target() {
                    if target.check(context).await? {
                        return Ok(false);
                    }
                }
                tracing::info!("running task `{task}`");
                task.execute(context).await?;
                Ok(true)
            }
            .await;
            match attempt {
                Ok(ran) => {
                    if ran {
                        tracing::info!("task `{task}` completed");
                    }
                    queue.accept();
                }
                Err(error) if error.is_interruption() => return Err(error),
                Err(error) if error.is_excusable() => {
                    tracing::info!("task `{task}` stopped: {error}");
                    stopped_tasks.push(task.name());
                    queue.discard();
                }
                Err(error) => {
                    tracing::warn!("task `{task}` failed: {error}");
                    failed_tasks.push(task.name());
                    queue.discard();
                }
            }
        }
        if !failed_tasks.is_empty() {
            return Err(Error::ExecutionFailed(failed_tasks));
        }
        if !stopped_tasks.is_empty() {
            return Err(Error::ExecutionStopped(stopped_tasks));
        }
        Ok(())
    }
}
