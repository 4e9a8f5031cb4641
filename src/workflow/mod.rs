// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Workflows: graphs of tasks, and the machinery that builds, optimizes,
//! and executes them.
//!
//! A [`Workflow`] is a [`Graph`] of [`TaskRef`]s with a [`TaskAnnotation`]
//! per node. The [`WorkflowBuilder`] expands a root task into a workflow by
//! satisfying requisites; [`WorkflowProcessor`]s transform the workflow in
//! place (normalization, trimming, caching, locking, ranking, test
//! projection); [`WorkflowExecutor`]s run what is left.

mod builder;
mod executor;
#[cfg(test)]
mod integration_tests;
mod processor;

pub mod executors;
pub mod processors;

pub use builder::WorkflowBuilder;
pub use executor::WorkflowExecutor;
pub use processor::WorkflowProcessor;

use std::collections::{HashMap, HashSet};

use crate::errors::Result;
use crate::graph::{Graph, Queue};
use crate::task::TaskRef;
use crate::testing::ScenarioRef;

/// The per-node annotations a workflow carries.
#[derive(Clone, Debug, Default)]
pub struct TaskAnnotation {
    /// The task partition; tag branches of the daemon filter by it.
    pub tag: Option<String>,
    /// The environment-isolation group assigned by the testifier.
    pub color: Option<String>,
    /// The execution priority assigned by the ranker: a topological order.
    pub rank: Option<u64>,
    /// Testing scenarios available for the task.
    pub tests: Vec<ScenarioRef>,
    /// Free-form metadata exported to monitoring.
    pub baggage: HashMap<String, String>,
}

/// A directed acyclic graph of tasks.
pub type Workflow = Graph<TaskRef, TaskAnnotation>;

/// Build a rank-ordered traversal queue over the workflow.
///
/// Every task must have been ranked (see
/// [`processors::TaskRanker`]) beforehand.
pub fn ranked_queue(workflow: &Workflow) -> Result<Queue<TaskRef>> {
    let mut ranked = Vec::with_capacity(workflow.len());
    let mut children: HashMap<TaskRef, HashSet<TaskRef>> = HashMap::new();
    for task in workflow.items() {
        let node = workflow.node(task);
        let rank = node.annotation.rank.ok_or_else(|| {
            crate::errors::Error::Other(anyhow::anyhow!("task `{task}` has not been ranked"))
        })?;
        ranked.push((task.clone(), rank));
        children.insert(task.clone(), node.children.clone());
    }
    Ok(Queue::new(ranked, children))
}
