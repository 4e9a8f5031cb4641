// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Requisites: the instructions tasks give to the workflow builder.
//!
//! A requisite is a requirement a task imposes onto the workflow — include
//! another task, depend on it, annotate my node, delegate a requirement to
//! someone else. Requisites carry priorities that steer the order in which
//! the builder satisfies them; see [`crate::workflow::WorkflowBuilder`].

use std::collections::HashMap;

use crate::errors::Result;
use crate::task::TaskRef;
use crate::testing::ScenarioRef;
use crate::workflow::Workflow;

/// A typed node annotation carried by an [`Requisite::Annotate`] requisite.
///
/// Colors and ranks are assigned by processors, never by requisites.
#[derive(Clone, Debug)]
pub enum Annotation {
    /// The partition the task belongs to; tag branches of the daemon filter
    /// the workflow down to their own tag.
    Tag(String),
    /// Testing scenarios available for the task.
    Tests(Vec<ScenarioRef>),
    /// Free-form metadata exported to monitoring.
    Baggage(HashMap<String, String>),
}

/// An instruction applied to the (partial) workflow during build.
#[derive(Clone, Debug, Default)]
pub enum Requisite {
    /// Nothing to ask for.
    #[default]
    Null,
    /// Add the task to the workflow and recursively satisfy its requisite.
    /// Idempotent: an already-present task is left alone.
    Include(TaskRef),
    /// Add an edge task → requisitor (including the task first if needed).
    /// This is the most convenient way to declare dependencies.
    Follow(TaskRef),
    /// Delegate a requisite to another task (including it first if needed).
    Assign(TaskRef, Box<Requisite>),
    /// Annotate the requisitor's node.
    Annotate(Annotation),
    /// Satisfy all of the nested requisites on behalf of the requisitor.
    SatisfyAll(Vec<Requisite>),
    /// Link an already-included task to the requisitor. Emitted by
    /// [`Requisite::Follow`] while being satisfied; not meant to be used
    /// directly.
    Link(TaskRef),
}

impl Requisite {
    /// Follow every task in the collection.
    pub fn follow_all<I: IntoIterator<Item = TaskRef>>(tasks: I) -> Self {
        Requisite::SatisfyAll(tasks.into_iter().map(Requisite::Follow).collect())
    }

    /// Delegate requisites to other tasks, pair by pair.
    pub fn assign_all<I: IntoIterator<Item = (TaskRef, Requisite)>>(assignments: I) -> Self {
        Requisite::SatisfyAll(
            assignments
                .into_iter()
                .map(|(task, requisite)| Requisite::Assign(task, Box::new(requisite)))
                .collect(),
        )
    }

    /// The satisfaction priority. Higher priorities are satisfied first.
    pub fn priority(&self) -> i64 {
        match self {
            Requisite::Null | Requisite::Include(_) | Requisite::SatisfyAll(_) => 0,
            Requisite::Annotate(_) | Requisite::Assign(..) => -1,
            Requisite::Follow(_) | Requisite::Link(_) => -2,
        }
    }

    /// Satisfy the requisite within the workflow on behalf of the requisitor.
    ///
    /// Adjusts the workflow incrementally and returns follow-up requests for
    /// the builder to schedule.
    pub(crate) fn satisfy(
        self,
        requisitor: Option<&TaskRef>,
        workflow: &mut Workflow,
    ) -> Result<Vec<(Option<TaskRef>, Requisite)>> {
        match self {
            Requisite::Null => Ok(Vec::new()),
            Requisite::Include(task) => {
                if workflow.contains(&task) {
                    return Ok(Vec::new());
                }
                workflow.add(task.clone());
                let requisite = task.requisite();
                Ok(vec![(Some(task), requisite)])
            }
            Requisite::Follow(task) => {
                let requisitor = expect_requisitor(requisitor, "Follow")?;
                Ok(vec![
                    (None, Requisite::Include(task.clone())),
                    (Some(requisitor.clone()), Requisite::Link(task)),
                ])
            }
            Requisite::Link(task) => {
                let requisitor = expect_requisitor(requisitor, "Link")?;
                workflow.link(&task, requisitor);
                Ok(Vec::new())
            }
            Requisite::Assign(task, requisite) => Ok(vec![
                (None, Requisite::Include(task.clone())),
                (Some(task), *requisite),
            ]),
            Requisite::Annotate(annotation) => {
                let requisitor = expect_requisitor(requisitor, "Annotate")?;
                let node = &mut workflow.node_mut(requisitor).annotation;
                match annotation {
                    Annotation::Tag(tag) => {
                        if node.tag.is_some() {
                            return Err(occupied(requisitor, "tag"));
                        }
                        node.tag = Some(tag);
                    }
                    Annotation::Tests(tests) => {
                        if !node.tests.is_empty() {
                            return Err(occupied(requisitor, "tests"));
                        }
                        node.tests = tests;
                    }
                    Annotation::Baggage(baggage) => {
                        if !node.baggage.is_empty() {
                            return Err(occupied(requisitor, "baggage"));
                        }
                        node.baggage = baggage;
                    }
                }
                Ok(Vec::new())
            }
            Requisite::SatisfyAll(requisites) => Ok(requisites
                .into_iter()
                .map(|requisite| (requisitor.cloned(), requisite))
                .collect()),
        }
    }
}

impl From<TaskRef> for Requisite {
    fn from(task: TaskRef) -> Self {
        Requisite::Follow(task)
    }
}

impl From<Option<Requisite>> for Requisite {
    fn from(requisite: Option<Requisite>) -> Self {
        requisite.unwrap_or(Requisite::Null)
    }
}

impl From<Vec<Requisite>> for Requisite {
    fn from(requisites: Vec<Requisite>) -> Self {
        Requisite::SatisfyAll(requisites)
    }
}

fn expect_requisitor<'a>(
    requisitor: Option<&'a TaskRef>,
    kind: &str,
) -> Result<&'a TaskRef> {
    requisitor.ok_or_else(|| {
        crate::errors::Error::Other(anyhow::anyhow!(
            "a `{kind}` requisite requires a requisitor"
        ))
    })
}

fn occupied(task: &TaskRef, what: &str) -> crate::errors::Error {
    crate::errors::Error::Other(anyhow::anyhow!(
        "task `{task}` already carries a `{what}` annotation"
    ))
}
