// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Tasks: the units of work that workflows are made of.
//!
//! A task has a stable *name* (its identity — two tasks with equal names are
//! the same task), an optional *requisite* (an instruction for the workflow
//! builder), an optional *target* (a condition whose truth means "this work
//! is complete"), and an `execute` operation. A task whose only job is to
//! aggregate dependencies overrides none of the defaults — it stays *phony*
//! and the executor never runs it.
//!
//! Tasks that do real work override [`Task::execute`] and report
//! `phony() == false`; the two go together, since monitoring and the
//! executor treat phony tasks specially.
//!
//! Processors never touch tasks directly: they *wrap* them. A wrapper
//! delegates the whole capability set `{name, requisite, target, phony,
//! execute, unwrap}` to its base and overrides the part it cares about, so
//! the cache, lock, check, and reporting layers stack in any order. Use
//! [`TaskRef::unwrap_fully`] to get back to the original task.

mod requisite;

pub use requisite::{Annotation, Requisite};

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::condition::ConditionRef;
use crate::errors::Result;
use crate::runtime::Context;

/// A unit of work with a stable name.
#[async_trait]
pub trait Task: Send + Sync {
    /// The unique name. Tasks are fully represented by their names.
    fn name(&self) -> String;

    /// The instruction for the workflow builder.
    fn requisite(&self) -> Requisite {
        Requisite::Null
    }

    /// The completeness condition. `None` means the developer is responsible
    /// for the consequences of repeated `execute` calls.
    fn target(&self) -> Option<ConditionRef> {
        None
    }

    /// Whether the task carries no work of its own.
    ///
    /// The default `execute` does nothing and the default `phony` is true.
    /// Override both together.
    fn phony(&self) -> bool {
        true
    }

    /// Do the work.
    ///
    /// Return [`crate::errors::Error::Stopped`] (or any other excusable
    /// error) to stop the task intentionally; the executor will abandon its
    /// descendants for the round without failing the workflow.
    async fn execute(&self, context: &Context) -> Result<()> {
        let _ = context;
        Ok(())
    }

    /// The wrapped task, if this one is a wrapper.
    fn unwrap(&self) -> Option<TaskRef> {
        None
    }

    fn as_any(&self) -> &dyn Any;
}

/// A shared, by-name-comparable handle to a task.
#[derive(Clone)]
pub struct TaskRef(Arc<dyn Task>);

impl TaskRef {
    pub fn new(task: impl Task + 'static) -> Self {
        Self(Arc::new(task))
    }

    pub fn name(&self) -> String {
        self.0.name()
    }

    pub fn requisite(&self) -> Requisite {
        self.0.requisite()
    }

    pub fn target(&self) -> Option<ConditionRef> {
        self.0.target()
    }

    pub fn phony(&self) -> bool {
        self.0.phony()
    }

    pub async fn execute(&self, context: &Context) -> Result<()> {
        self.0.execute(context).await
    }

    pub fn unwrap(&self) -> Option<TaskRef> {
        self.0.unwrap()
    }

    pub fn as_any(&self) -> &dyn Any {
        self.0.as_any()
    }

    /// Strip all wrappers.
    pub fn unwrap_fully(&self) -> TaskRef {
        let mut current = self.clone();
        while let Some(inner) = current.0.unwrap() {
            current = inner;
        }
        current
    }
}

impl PartialEq for TaskRef {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Eq for TaskRef {}

impl std::hash::Hash for TaskRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name().hash(state);
    }
}

impl PartialOrd for TaskRef {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TaskRef {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name().cmp(&other.name())
    }
}

impl fmt::Debug for TaskRef {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.name())
    }
}

impl fmt::Display for TaskRef {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.name())
    }
}

#[cfg(test)]
pub(crate) mod testkit {
    use super::*;
    use std::sync::Mutex;

    /// A journal shared by probe tasks: records execution order.
    pub type Journal = Arc<Mutex<Vec<String>>>;

    pub fn journal() -> Journal {
        Arc::new(Mutex::new(Vec::new()))
    }

    /// A configurable task for tests.
    pub struct Probe {
        pub label: String,
        pub dependencies: Vec<TaskRef>,
        pub target: Option<ConditionRef>,
        pub journal: Option<Journal>,
        pub outcome: Option<fn() -> Result<()>>,
    }

    impl Probe {
        pub fn phony(label: &str) -> Self {
            Self {
                label: label.to_string(),
                dependencies: Vec::new(),
                target: None,
                journal: None,
                outcome: None,
            }
        }

        pub fn active(label: &str, journal: &Journal) -> Self {
            Self {
                label: label.to_string(),
                dependencies: Vec::new(),
                target: None,
                journal: Some(journal.clone()),
                outcome: None,
            }
        }

        pub fn after(mut self, dependency: &TaskRef) -> Self {
            self.dependencies.push(dependency.clone());
            self
        }

        pub fn aiming(mut self, target: &ConditionRef) -> Self {
            self.target = Some(target.clone());
            self
        }

        pub fn ending(mut self, outcome: fn() -> Result<()>) -> Self {
            self.outcome = Some(outcome);
            self
        }

        pub fn build(self) -> TaskRef {
            TaskRef::new(self)
        }
    }

    #[async_trait]
    impl Task for Probe {
        fn name(&self) -> String {
            self.label.clone()
        }

        fn requisite(&self) -> Requisite {
            Requisite::SatisfyAll(
                self.dependencies
                    .iter()
                    .map(|dependency| Requisite::Follow(dependency.clone()))
                    .collect(),
            )
        }

        fn target(&self) -> Option<ConditionRef> {
            self.target.clone()
        }

        fn phony(&self) -> bool {
            self.journal.is_none() && self.outcome.is_none()
        }

        async fn execute(&self, _context: &Context) -> Result<()> {
            if let Some(journal) = &self.journal {
                journal.lock().unwrap().push(self.label.clone());
            }
            match self.outcome {
                Some(outcome) => outcome(),
                None => Ok(()),
            }
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }
}
