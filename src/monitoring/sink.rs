// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The task log sink.
//!
//! Tasks that want their messages to show up in the monitoring snapshot
//! write to this sink explicitly. The capture scope is task-local: messages
//! emitted while a wrapped task executes are forwarded to that task's agent
//! as log updates, concurrent tasks never cross wires, and outside of any
//! capture the sink is a cheap no-op.

use std::future::Future;

use crate::helpers::now;
use crate::monitoring::agent::MonitoringAgent;
use crate::monitoring::snapshot::MonitoringSnapshotUpdate;

#[derive(Clone)]
struct Capture {
    task: String,
    agent: MonitoringAgent,
}

tokio::task_local! {
    static CAPTURE: Option<Capture>;
}

/// Run the future with sink messages forwarded to the agent on behalf of
/// the task.
pub(crate) async fn capture<F: Future>(
    task: String,
    agent: MonitoringAgent,
    future: F,
) -> F::Output {
    CAPTURE.scope(Some(Capture { task, agent }), future).await
}

/// Send a message to the sink of the currently executing task, if any.
pub fn log(message: &str) {
    let capture = CAPTURE
        .try_with(|capture| capture.clone())
        .unwrap_or(None);
    if let Some(capture) = capture {
        capture.agent.push(&MonitoringSnapshotUpdate::TaskLogUpdate {
            task: capture.task,
            message: message.to_string(),
            timestamp: now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::BasicConsumer;
    use crate::storage::{InMemoryStorage, Storage};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_messages_inside_a_capture_reach_the_agent() {
        let monitor: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let relay = monitor.clone();
        let consumer = Arc::new(BasicConsumer::new(move |(key, value): (String, String)| {
            relay.put(&key, &value)?;
            Ok(())
        }));
        let agent = MonitoringAgent::new("agent-sink", monitor.clone()).with_consumer(consumer);
        capture("Task".into(), agent.clone(), async {
            log("inside the scope");
        })
        .await;
        let updates = agent.pull(None).unwrap();
        assert_eq!(updates.len(), 1);
        assert!(matches!(
            &updates[0].1,
            MonitoringSnapshotUpdate::TaskLogUpdate { task, message, .. }
                if task == "Task" && message == "inside the scope"
        ));
    }

    #[tokio::test]
    async fn test_messages_outside_a_capture_vanish() {
        // must not panic, must not push anywhere
        log("to whom it may concern");
    }
}
