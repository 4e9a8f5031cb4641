// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Error handling for the workflow engine.
//!
//! Errors are classified by *behavior*, not by identity:
//!
//! * **Excusable** — expected transient conditions (lock contention, a lost
//!   lock, an executor stopped on purpose). Logged and retried; a persistent
//!   invoker never lets them bubble out.
//! * **Interruption** — an externally requested termination. Propagates
//!   through every layer and unwinds workers silently.
//! * Everything else is **fatal**: programmer or data errors such as target
//!   verification failures, dependency cycles, or an unnormalizable workflow.
//!
//! Use [`Error::is_excusable`] and [`Error::is_interruption`] to branch on
//! behavior instead of matching individual variants.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// An externally requested termination (signal, parent invoker, timeout).
    #[error("interrupted: {0}")]
    Interrupted(String),

    /// A task stopped itself intentionally.
    #[error("stopped: {0}")]
    Stopped(String),

    /// The lock for the key is already held by someone else.
    #[error("lock for key `{0}` has been already acquired")]
    LockAcquisition(String),

    /// The lock for the key was lost while the task was running.
    #[error("lock for key `{0}` was lost")]
    LockRetention(String),

    /// A storage backend failed to carry out an operation.
    #[error("storage operation failed: {0}")]
    StorageOperation(String),

    /// A consumer refused to accept a record.
    #[error("consumption failed: {0}")]
    Consumption(String),

    /// A graph that was supposed to be acyclic contains a cycle.
    #[error("circular dependency detected:{}", crate::helpers::render(.0))]
    CircularDependency(Vec<String>),

    /// The task finished, but its target still checks false.
    #[error("target `{target}` of task `{task}` is false after execution")]
    TargetVerification { task: String, target: String },

    /// Task targets contradict each other and no correction exists.
    #[error("workflow cannot be normalized: {0}")]
    WorkflowNormalization(String),

    /// Test projection failed (conflicting or extraneous stubs).
    #[error("workflow cannot be testified: {0}")]
    WorkflowTestification(String),

    /// A value did not pass a qualifier.
    #[error("value `{value}` was not qualified: {reason}")]
    ValueQualification { value: String, reason: String },

    /// The monitor storage references versions that are not there.
    #[error("monitor state is inconsistent: {0}")]
    MonitorInconsistency(String),

    /// Some tasks of a workflow failed.
    #[error("workflow execution failed; failed tasks:{}", crate::helpers::render(.0))]
    ExecutionFailed(Vec<String>),

    /// Some tasks of a workflow stopped (and none failed).
    #[error("workflow execution stopped; stopped tasks:{}", crate::helpers::render(.0))]
    ExecutionStopped(Vec<String>),

    /// Some slave workers failed.
    #[error("invocation failed; failed workers:{}", crate::helpers::render(.0))]
    MasterSlaveInvocation(Vec<String>),

    /// Some slave workers stopped (and none failed).
    #[error("invocation stopped; stopped workers:{}", crate::helpers::render(.0))]
    ExcusableMasterSlaveInvocation(Vec<String>),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Whether the error is an expected transient condition.
    pub fn is_excusable(&self) -> bool {
        matches!(
            self,
            Error::Stopped(_)
                | Error::LockAcquisition(_)
                | Error::LockRetention(_)
                | Error::ExecutionStopped(_)
                | Error::ExcusableMasterSlaveInvocation(_)
        )
    }

    /// Whether the error represents an externally requested termination.
    pub fn is_interruption(&self) -> bool {
        matches!(self, Error::Interrupted(_))
    }
}
