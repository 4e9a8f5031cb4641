// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Priority-driven expansion of a root task into a workflow.

use crate::errors::Result;
use crate::graph::Heap;
use crate::task::{Requisite, TaskRef};
use crate::workflow::Workflow;

type Request = (Option<TaskRef>, Requisite);

/// The workflow builder: transforms a task into a workflow by satisfying its
/// requisite.
///
/// The builder keeps a max-heap of pending requests and a stack of
/// in-progress request batches. While the top of the heap outranks the batch
/// currently being drained, pending requests are satisfied immediately —
/// this is what lets an `Include` finish expanding a task's whole subtree
/// before a lower-priority `Follow` links an edge to it. Requisitor handles
/// are re-read from the graph at every transfer, because a task may have
/// been replaced by a wrapper in the interim.
#[derive(Debug, Default)]
pub struct WorkflowBuilder;

impl WorkflowBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Expand the task into a workflow.
    ///
    /// Cycles among `Follow`s are not detected here; they surface from the
    /// first linearization down the pipeline.
    pub fn build(&self, task: TaskRef) -> Result<Workflow> {
        let mut result = Workflow::new();
        // pending requests, best first
        let mut heap: Heap<Request> = Heap::new();
        // in-progress batches with their priorities
        let mut stack: Vec<(std::vec::IntoIter<Request>, i64)> = Vec::new();
        let seed = Requisite::Include(task);
        let priority = seed.priority();
        heap.push((None, seed), priority);
        while !heap.is_empty() || !stack.is_empty() {
            let heap_wins = match (heap.peek_priority(), stack.last()) {
                (Some(pending), Some((_, draining))) => pending > *draining,
                (Some(_), None) => true,
                (None, _) => false,
            };
            if heap_wins {
                let (requisitor, requisite) = heap.pop().unwrap();
                let priority = requisite.priority();
                let subrequests = requisite.satisfy(requisitor.as_ref(), &mut result)?;
                if !subrequests.is_empty() {
                    stack.push((subrequests.into_iter(), priority));
                }
                continue;
            }
            let (batch, _) = stack.last_mut().unwrap();
            match batch.next() {
                None => {
                    stack.pop();
                }
                Some((requisitor, requisite)) => {
                    let requisitor =
                        requisitor.map(|handle| result.node(&handle).item.clone());
                    let priority = requisite.priority();
                    heap.push((requisitor, requisite), priority);
                }
            }
        }
        Ok(result)
    }
}
