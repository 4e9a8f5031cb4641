// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::runtime::ActionFuture;

/// How a worker ended up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// Normal completion.
    Finished,
    /// Terminated on request (interruption).
    Terminated,
    /// Stopped with an excusable error.
    Stopped,
    /// Failed with anything else.
    Failed,
}

/// A named unit of background work.
///
/// The action's error behavior decides the outcome: excusable errors mark
/// the worker *stopped*, interruptions terminate it silently, anything else
/// marks it *failed*. A worker that had to be killed records no outcome at
/// all.
#[derive(Debug)]
pub struct Worker {
    name: String,
    handle: JoinHandle<()>,
    outcome: Arc<Mutex<Option<WorkerOutcome>>>,
    joined: bool,
    killed: bool,
}

impl Worker {
    /// Start the action in a background task.
    pub fn spawn(name: &str, action: ActionFuture) -> Self {
        let outcome = Arc::new(Mutex::new(None));
        let slot = outcome.clone();
        let label = name.to_string();
        let handle = tokio::spawn(async move {
            let verdict = match action.await {
                Ok(()) => WorkerOutcome::Finished,
                Err(error) if error.is_interruption() => {
                    tracing::debug!("worker `{label}` was terminated: {error}");
                    WorkerOutcome::Terminated
                }
                Err(error) if error.is_excusable() => {
                    tracing::debug!("worker `{label}` stopped: {error}");
                    WorkerOutcome::Stopped
                }
                Err(error) => {
                    tracing::debug!("worker `{label}` failed: {error}");
                    WorkerOutcome::Failed
                }
            };
            *slot.lock().unwrap() = Some(verdict);
        });
        Self {
            name: name.to_string(),
            handle,
            outcome,
            joined: false,
            killed: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the worker is still working.
    pub fn alive(&self) -> bool {
        !self.killed && !self.handle.is_finished()
    }

    /// Whether the worker failed.
    pub fn failed(&self) -> bool {
        *self.outcome.lock().unwrap() == Some(WorkerOutcome::Failed)
    }

    /// Whether the worker stopped with an excusable error.
    pub fn stopped(&self) -> bool {
        *self.outcome.lock().unwrap() == Some(WorkerOutcome::Stopped)
    }

    /// Wait for the worker to finish, up to the timeout.
    pub async fn join(&mut self, timeout: Duration) {
        if self.joined {
            return;
        }
        if tokio::time::timeout(timeout, &mut self.handle).await.is_ok() {
            self.joined = true;
        }
    }

    /// Kill the worker. It will not record an outcome.
    pub fn kill(&mut self) {
        self.handle.abort();
        self.killed = true;
    }
}
