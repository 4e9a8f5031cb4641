// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::Result;
use crate::monitoring::MonitoringAgent;
use crate::runtime::Context;
use crate::workflow::{Workflow, WorkflowExecutor};

/// A workflow executor that monitors the state of the workflow via an
/// agent: the workflow is embraced (wrapped for status reporting and log
/// capture) before the base executor sees it.
pub struct MonitoringExecutor {
    base: Arc<dyn WorkflowExecutor>,
    agent: MonitoringAgent,
}

impl MonitoringExecutor {
    pub fn new(base: Arc<dyn WorkflowExecutor>, agent: MonitoringAgent) -> Self {
        Self { base, agent }
    }
}

#[async_trait]
impl WorkflowExecutor for MonitoringExecutor {
    async fn execute(&self, workflow: &Workflow, context: &Context) -> Result<()> {
        let embraced = self.agent.embrace(workflow);
        self.base.execute(&embraced, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::BasicConsumer;
    use crate::monitoring::snapshot::{alias_of, MonitoringSnapshot};
    use crate::storage::{InMemoryStorage, Storage};
    use crate::task::testkit::{journal, Probe};
    use crate::workflow::executors::BasicExecutor;
    use crate::workflow::processors::TaskRanker;
    use crate::workflow::{WorkflowBuilder, WorkflowProcessor};

    #[tokio::test]
    async fn test_execution_leaves_a_monitoring_trail() {
        let monitor: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let relay = monitor.clone();
        let consumer = Arc::new(BasicConsumer::new(move |(key, value): (String, String)| {
            relay.put(&key, &value)?;
            Ok(())
        }));
        let agent = MonitoringAgent::new("agent-x", monitor.clone()).with_consumer(consumer);
        let log = journal();
        let task = Probe::active("Watched", &log).build();
        let mut workflow = WorkflowBuilder::new().build(task.clone()).unwrap();
        TaskRanker
            .process(&mut workflow, &Context::root())
            .await
            .unwrap();
        let executor = MonitoringExecutor::new(Arc::new(BasicExecutor), agent.clone());
        executor.execute(&workflow, &Context::root()).await.unwrap();
        assert_eq!(log.lock().unwrap().as_slice(), ["Watched"]);
        let mut snapshot = MonitoringSnapshot::void();
        for (_, update) in agent.pull(None).unwrap() {
            update.apply(&mut snapshot, agent.name());
        }
        assert!(snapshot.core.states[&alias_of("Watched")].completed);
    }
}
