// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Cooperative execution primitives.
//!
//! The original design goal carries over unchanged: cancellation is observed
//! at well-defined suspension points, never in the middle of a step. A
//! [`Context`] travels through every `execute`/`check`/`process` call;
//! implementations call [`Context::checkpoint`] between steps (and
//! [`Context::sleep`] instead of a bare timer) so that an external
//! interruption — a signal, a parent invoker giving up — takes effect at the
//! next such point.
//!
//! Invokers build trees of contexts: cancelling a parent cancels all its
//! children, while a child can be cancelled on its own (say, when its branch
//! of the daemon completes).

mod invokers;
mod worker;

pub use invokers::{MasterSlaveInvoker, PersistentInvoker};
pub use worker::{Worker, WorkerOutcome};

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::errors::{Error, Result};

/// A boxed future of an action, as stored by invokers and workers.
pub type ActionFuture = Pin<Box<dyn Future<Output = Result<()>> + Send + 'static>>;

/// A reusable action: every call produces a fresh future.
pub type Action = Arc<dyn Fn(Context) -> ActionFuture + Send + Sync>;

/// Wrap an async closure into an [`Action`].
pub fn action<F, Fut>(function: F) -> Action
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |context| Box::pin(function(context)))
}

/// The cooperative execution context: a handle to the cancellation scope the
/// current work runs under.
#[derive(Clone, Debug)]
pub struct Context {
    token: CancellationToken,
}

impl Context {
    /// A fresh root context, not tied to any parent.
    pub fn root() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// A child context: cancelled when its parent is cancelled, or on its own.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }

    /// Request cancellation of this context and all its children.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The audit point. Call between steps of long-running work.
    pub fn checkpoint(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Interrupted("cancellation requested".into()));
        }
        Ok(())
    }

    /// Sleep for the duration, waking up immediately on cancellation.
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        tokio::select! {
            _ = self.token.cancelled() => {
                Err(Error::Interrupted("cancellation requested".into()))
            }
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Wait until the context gets cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::root()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_checkpoint_passes_until_cancelled() {
        let context = Context::root();
        assert!(context.checkpoint().is_ok());
        context.cancel();
        let error = context.checkpoint().unwrap_err();
        assert!(error.is_interruption());
    }

    #[tokio::test]
    async fn test_child_contexts_follow_the_parent() {
        let parent = Context::root();
        let child = parent.child();
        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn test_child_cancellation_stays_local() {
        let parent = Context::root();
        let child = parent.child();
        child.cancel();
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn test_sleep_interrupts_promptly() {
        let context = Context::root();
        let sleeper = context.clone();
        let handle = tokio::spawn(async move {
            sleeper.sleep(Duration::from_secs(3600)).await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        context.cancel();
        let result = handle.await.unwrap();
        assert!(result.unwrap_err().is_interruption());
    }
}
