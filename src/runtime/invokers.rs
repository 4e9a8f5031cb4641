// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Invokers: supervisors that call things in a special manner.
//!
//! A [`MasterSlaveInvoker`] runs a named set of actions in parallel workers
//! and supervises them: on external cancellation it raises its own child
//! cancellation scope, gives the workers an interruption timeout to wind
//! down, then kills the survivors. A [`PersistentInvoker`] calls one action
//! forever with a minimum delay between attempts, swallowing everything but
//! interruptions. The daemon nests these two shapes all the way down.

use std::time::{Duration, Instant};

use crate::errors::{Error, Result};
use crate::runtime::{Action, Context, Worker};

// how long a full round of join attempts may take
const JOIN_ROUND: Duration = Duration::from_millis(250);

/// A generic master-slave invoker.
pub struct MasterSlaveInvoker {
    actions: Vec<(String, Action)>,
    interruption_timeout: Duration,
}

impl MasterSlaveInvoker {
    /// Supervise the given named actions.
    ///
    /// The default interruption timeout is one minute.
    pub fn new(actions: Vec<(String, Action)>) -> Self {
        Self {
            actions,
            interruption_timeout: Duration::from_secs(60),
        }
    }

    /// Give the workers this long to finish after an interruption before
    /// killing them. Make sure nested invokers get *less* time than their
    /// parents, so inner layers wind down first.
    pub fn with_interruption_timeout(mut self, timeout: Duration) -> Self {
        self.interruption_timeout = timeout;
        self
    }

    /// Replicate the same action into `count` workers named
    /// `{prefix}1 … {prefix}count`.
    pub fn replicate(action: Action, count: usize, prefix: &str) -> Self {
        let actions = (0..count)
            .map(|index| (format!("{}{}", prefix, index + 1), action.clone()))
            .collect();
        Self::new(actions)
    }

    /// Run the workers and wait for all of them.
    ///
    /// Fails with [`Error::MasterSlaveInvocation`] if some workers failed,
    /// or [`Error::ExcusableMasterSlaveInvocation`] if some merely stopped.
    pub async fn invoke(&self, context: &Context) -> Result<()> {
        let scope = context.child();
        tracing::debug!("starting slaves");
        let mut slaves: Vec<Worker> = self
            .actions
            .iter()
            .map(|(name, action)| Worker::spawn(name, action(scope.clone())))
            .collect();
        let slice = JOIN_ROUND / slaves.len().max(1) as u32;
        let mut interruption_time: Option<Instant> = None;
        loop {
            if interruption_time.is_none() && context.is_cancelled() {
                tracing::debug!("interrupted");
                scope.cancel();
                interruption_time = Some(Instant::now());
            }
            for slave in &mut slaves {
                slave.join(slice).await;
            }
            if !slaves.iter().any(Worker::alive) {
                break;
            }
            if let Some(time) = interruption_time {
                if time.elapsed() > self.interruption_timeout {
                    tracing::debug!("killing slaves");
                    for slave in &mut slaves {
                        slave.kill();
                    }
                    break;
                }
            }
        }
        if interruption_time.is_some() {
            return Err(Error::Interrupted("interrupted by the master".into()));
        }
        let failed: Vec<String> = slaves
            .iter()
            .filter(|slave| slave.failed())
            .map(|slave| slave.name().to_string())
            .collect();
        if !failed.is_empty() {
            return Err(Error::MasterSlaveInvocation(failed));
        }
        let stopped: Vec<String> = slaves
            .iter()
            .filter(|slave| slave.stopped())
            .map(|slave| slave.name().to_string())
            .collect();
        if !stopped.is_empty() {
            return Err(Error::ExcusableMasterSlaveInvocation(stopped));
        }
        Ok(())
    }
}

/// An invoker that calls its action in an infinite loop.
///
/// Excusable errors are logged at the info level, other errors at the warn
/// level; neither escapes the loop. Interruption does.
pub struct PersistentInvoker {
    action: Action,
    delay: Duration,
}

impl PersistentInvoker {
    /// Call the action persistently with at least `delay` between the starts
    /// of consecutive attempts.
    pub fn new(action: Action, delay: Duration) -> Self {
        Self { action, delay }
    }

    pub async fn invoke(&self, context: &Context) -> Result<()> {
        loop {
            context.checkpoint()?;
            let start = Instant::now();
            match (self.action)(context.clone()).await {
                Ok(()) => {}
                Err(error) if error.is_interruption() => {
                    tracing::debug!("interrupted: {error}");
                    return Err(error);
                }
                Err(error) if error.is_excusable() => {
                    tracing::info!("attempt stopped: {error}");
                }
                Err(error) => {
                    tracing::warn!("attempt failed: {error}");
                }
            }
            let pause = self.delay.saturating_sub(start.elapsed());
            tracing::debug!("next attempt in {pause:?}");
            context.sleep(pause).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::action;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_master_slave_reports_failures() {
        let invoker = MasterSlaveInvoker::new(vec![
            ("fine".into(), action(|_| async { Ok(()) })),
            (
                "broken".into(),
                action(|_| async { Err(Error::StorageOperation("boom".into())) }),
            ),
        ]);
        let error = invoker.invoke(&Context::root()).await.unwrap_err();
        assert!(matches!(error, Error::MasterSlaveInvocation(failed) if failed == ["broken"]));
    }

    #[tokio::test]
    async fn test_master_slave_reports_stops_as_excusable() {
        let invoker = MasterSlaveInvoker::new(vec![
            ("fine".into(), action(|_| async { Ok(()) })),
            (
                "sulky".into(),
                action(|_| async { Err(Error::Stopped("not today".into())) }),
            ),
        ]);
        let error = invoker.invoke(&Context::root()).await.unwrap_err();
        assert!(error.is_excusable());
    }

    #[tokio::test]
    async fn test_master_slave_interruption() {
        let invoker = MasterSlaveInvoker::new(vec![(
            "obedient".into(),
            action(|context: Context| async move {
                context.cancelled().await;
                Err(Error::Interrupted("told to stop".into()))
            }),
        )])
        .with_interruption_timeout(Duration::from_secs(5));
        let context = Context::root();
        let trigger = context.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });
        let error = invoker.invoke(&context).await.unwrap_err();
        assert!(error.is_interruption());
    }

    #[tokio::test]
    async fn test_master_slave_kills_stragglers() {
        let invoker = MasterSlaveInvoker::new(vec![(
            "deaf".into(),
            action(|_| async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }),
        )])
        .with_interruption_timeout(Duration::from_millis(100));
        let context = Context::root();
        context.cancel();
        let started = Instant::now();
        let error = invoker.invoke(&context).await.unwrap_err();
        assert!(error.is_interruption());
        assert!(started.elapsed() < Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_replicate_names_workers() {
        let counter = Arc::new(AtomicUsize::new(0));
        let tally = counter.clone();
        let invoker = MasterSlaveInvoker::replicate(
            action(move |_| {
                let tally = tally.clone();
                async move {
                    tally.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
            3,
            "W-",
        );
        invoker.invoke(&Context::root()).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_persistent_invoker_swallows_failures() {
        let counter = Arc::new(AtomicUsize::new(0));
        let tally = counter.clone();
        let invoker = PersistentInvoker::new(
            action(move |_| {
                let tally = tally.clone();
                async move {
                    tally.fetch_add(1, Ordering::SeqCst);
                    Err(Error::StorageOperation("boom".into()))
                }
            }),
            Duration::from_millis(1),
        );
        let context = Context::root();
        let trigger = context.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });
        let error = invoker.invoke(&context).await.unwrap_err();
        assert!(error.is_interruption());
        assert!(counter.load(Ordering::SeqCst) >= 2);
    }
}
