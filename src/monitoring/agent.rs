// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;

use crate::condition::{Condition, ConditionRef, Expr};
use crate::consumer::Consumer;
use crate::errors::{Error, Result};
use crate::helpers::now;
use crate::monitoring::sink;
use crate::monitoring::snapshot::{MonitoringSnapshotUpdate, TaskStatus};
use crate::runtime::Context;
use crate::storage::Storage;
use crate::task::{Requisite, Task, TaskRef};
use crate::workflow::Workflow;

/// A monitoring agent: the identity under which an executor pushes updates.
///
/// Agents push updates through a consumer (so that slow storage never blocks
/// execution) and pull them back from the storage when aggregating. An agent
/// without a consumer is read-only — the watcher uses those.
#[derive(Clone)]
pub struct MonitoringAgent {
    name: String,
    monitor: Arc<dyn Storage>,
    consumer: Option<Arc<dyn Consumer>>,
}

impl MonitoringAgent {
    /// A read-only agent.
    pub fn new(name: &str, monitor: Arc<dyn Storage>) -> Self {
        Self {
            name: name.to_string(),
            monitor,
            consumer: None,
        }
    }

    /// An agent that pushes through the consumer. The consumer is presumed
    /// to deliver records into the same monitor storage.
    pub fn with_consumer(mut self, consumer: Arc<dyn Consumer>) -> Self {
        self.consumer = Some(consumer);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn readonly(&self) -> bool {
        self.consumer.is_none()
    }

    fn update_key(&self) -> String {
        format!("update/{}", self.name)
    }

    /// Register the agent in the monitor.
    pub fn register(&self) {
        self.push_record("agent", &self.name);
    }

    /// Push an update on behalf of this agent.
    ///
    /// Serialization failures and consumer rejections are logged and
    /// dropped — monitoring never takes a workflow down.
    pub fn push(&self, update: &MonitoringSnapshotUpdate) {
        match update.serialize() {
            Ok(serialized) => self.push_record(&self.update_key(), &serialized),
            Err(error) => tracing::warn!("cannot serialize a monitoring update: {error}"),
        }
    }

    fn push_record(&self, key: &str, value: &str) {
        let consumer = self
            .consumer
            .as_ref()
            .expect("a read-only agent cannot push");
        if consumer.push((key.to_string(), value.to_string())).is_err() {
            tracing::warn!("consumer rejected a monitoring record");
        }
    }

    /// Get this agent's updates from the monitor, oldest first, starting
    /// with the given version.
    pub fn pull(&self, since: Option<u64>) -> Result<Vec<(u64, MonitoringSnapshotUpdate)>> {
        let mut records = self.monitor.get(&self.update_key(), since, None)?;
        records.reverse();
        records
            .into_iter()
            .map(|(version, serialized)| {
                Ok((version, MonitoringSnapshotUpdate::deserialize(&serialized)?))
            })
            .collect()
    }

    /// Delete this agent's updates below the given version.
    pub fn drop_updates(&self, till: Option<u64>) -> Result<()> {
        self.monitor.delete(&self.update_key(), till)
    }

    /// Discover all agents registered in the monitor.
    ///
    /// Re-publishes the discovered names so the record index keeps
    /// advancing, which is what lets stale agent entries age out.
    pub fn discover(monitor: &Arc<dyn Storage>) -> Result<Vec<MonitoringAgent>> {
        let records = monitor.get("agent", None, None)?;
        let names: BTreeSet<String> = records
            .iter()
            .map(|(_, name)| name.clone())
            .collect();
        if names.is_empty() {
            return Ok(Vec::new());
        }
        for name in &names {
            monitor.put("agent", name)?;
        }
        monitor.delete("agent", Some(records[0].0 + 1))?;
        Ok(names
            .into_iter()
            .map(|name| MonitoringAgent::new(&name, monitor.clone()))
            .collect())
    }

    /// Take control over the workflow execution.
    ///
    /// Pushes the workflow topology and returns a clone of the graph with
    /// every non-phony task wrapped to report statuses and capture logs.
    pub fn embrace(&self, workflow: &Workflow) -> Workflow {
        self.register();
        let mut dependencies: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut phonies: BTreeSet<String> = BTreeSet::new();
        let mut baggages: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        for task in workflow.items() {
            let node = workflow.node(task);
            dependencies.insert(
                task.name(),
                node.parents.iter().map(TaskRef::name).collect(),
            );
            if task.phony() {
                phonies.insert(task.name());
            }
            baggages.insert(
                task.name(),
                node.annotation.baggage.clone().into_iter().collect(),
            );
        }
        self.push(&MonitoringSnapshotUpdate::WorkflowUpdate {
            dependencies,
            phonies,
            baggages,
        });
        let mut result = workflow.duplicate();
        let tasks: Vec<TaskRef> = result.items().cloned().collect();
        for task in tasks {
            if task.phony() {
                continue;
            }
            let reporting = TaskRef::new(StatusReportingTaskWrapper {
                base: task,
                agent: self.clone(),
            });
            let capturing = TaskRef::new(LogCapturingTaskWrapper {
                base: reporting,
                agent: self.clone(),
            });
            result.replace(capturing);
        }
        result
    }

    fn report_status(&self, task: &str, status: TaskStatus) {
        self.push(&MonitoringSnapshotUpdate::TaskStatusUpdate {
            task: task.to_string(),
            status,
            timestamp: now(),
        });
    }

    fn save_failure(&self, task: &str, error: &Error) {
        self.push(&MonitoringSnapshotUpdate::TaskLogUpdate {
            task: task.to_string(),
            message: format!("failure: {error}"),
            timestamp: now(),
        });
    }
}

/// A task wrapper that reports its status to the agent.
///
/// Emits `running` at the start, then `completed`, `stopped`, or `failed`
/// depending on the outcome; failures also leave a log message. A target
/// check that comes back true reports `completed` as well — that is how
/// skipped-but-done tasks show up in the snapshot.
struct StatusReportingTaskWrapper {
    base: TaskRef,
    agent: MonitoringAgent,
}

#[async_trait]
impl Task for StatusReportingTaskWrapper {
    fn name(&self) -> String {
        self.base.name()
    }

    fn requisite(&self) -> Requisite {
        self.base.requisite()
    }

    fn target(&self) -> Option<ConditionRef> {
        self.base.target().map(|target| {
            ConditionRef::new(StatusReportingConditionWrapper {
                base: target,
                task: self.base.name(),
                agent: self.agent.clone(),
            })
        })
    }

    fn phony(&self) -> bool {
        self.base.phony()
    }

    async fn execute(&self, context: &Context) -> Result<()> {
        self.agent.report_status(&self.name(), TaskStatus::Running);
        match self.base.execute(context).await {
            Ok(()) => {
                self.agent.report_status(&self.name(), TaskStatus::Completed);
                Ok(())
            }
            Err(error) if error.is_excusable() || error.is_interruption() => {
                self.agent.report_status(&self.name(), TaskStatus::Stopped);
                Err(error)
            }
            Err(error) => {
                self.agent.save_failure(&self.name(), &error);
                self.agent.report_status(&self.name(), TaskStatus::Failed);
                Err(error)
            }
        }
    }

    fn unwrap(&self) -> Option<TaskRef> {
        Some(self.base.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct StatusReportingConditionWrapper {
    base: ConditionRef,
    task: String,
    agent: MonitoringAgent,
}

#[async_trait]
impl Condition for StatusReportingConditionWrapper {
    fn name(&self) -> String {
        self.base.name()
    }

    async fn check(&self, context: &Context) -> Result<bool> {
        let result = match self.base.check(context).await {
            Ok(result) => result,
            Err(error) if error.is_excusable() || error.is_interruption() => return Err(error),
            Err(error) => {
                self.agent.save_failure(&self.task, &error);
                self.agent.report_status(&self.task, TaskStatus::Failed);
                return Err(error);
            }
        };
        if result {
            self.agent.report_status(&self.task, TaskStatus::Completed);
        }
        Ok(result)
    }

    fn expression(&self) -> Option<Expr> {
        self.base.expression()
    }

    fn invariants(&self) -> Vec<ConditionRef> {
        self.base.invariants()
    }

    fn unwrap(&self) -> Option<ConditionRef> {
        Some(self.base.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A task wrapper that captures sink messages emitted during execution and
/// forwards them as task log updates.
struct LogCapturingTaskWrapper {
    base: TaskRef,
    agent: MonitoringAgent,
}

#[async_trait]
impl Task for LogCapturingTaskWrapper {
    fn name(&self) -> String {
        self.base.name()
    }

    fn requisite(&self) -> Requisite {
        self.base.requisite()
    }

    fn target(&self) -> Option<ConditionRef> {
        self.base.target()
    }

    fn phony(&self) -> bool {
        self.base.phony()
    }

    async fn execute(&self, context: &Context) -> Result<()> {
        let base = self.base.clone();
        let context = context.clone();
        sink::capture(self.name(), self.agent.clone(), async move {
            base.execute(&context).await
        })
        .await
    }

    fn unwrap(&self) -> Option<TaskRef> {
        Some(self.base.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::BasicConsumer;
    use crate::monitoring::snapshot::MonitoringSnapshot;
    use crate::storage::InMemoryStorage;
    use crate::task::testkit::{journal, Probe};

    fn wired_agent(name: &str) -> (MonitoringAgent, Arc<dyn Storage>) {
        let monitor: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let sink_storage = monitor.clone();
        let consumer = Arc::new(BasicConsumer::new(move |(key, value): (String, String)| {
            sink_storage.put(&key, &value)?;
            Ok(())
        }));
        let agent = MonitoringAgent::new(name, monitor.clone()).with_consumer(consumer);
        (agent, monitor)
    }

    #[tokio::test]
    async fn test_embrace_publishes_topology_and_wraps_tasks() {
        let (agent, monitor) = wired_agent("agent-1");
        let log = journal();
        let head = Probe::phony("Head").build();
        let tail = Probe::active("Tail", &log).after(&head).build();
        let workflow = crate::workflow::WorkflowBuilder::new()
            .build(tail.clone())
            .unwrap();
        let embraced = agent.embrace(&workflow);
        // the agent registered itself and described the workflow
        assert_eq!(monitor.get("agent", None, None).unwrap().len(), 1);
        let updates = agent.pull(None).unwrap();
        assert_eq!(updates.len(), 1);
        // executing the embraced task reports running + completed
        let wrapped = embraced.node(&tail).item.clone();
        wrapped.execute(&Context::root()).await.unwrap();
        let updates = agent.pull(None).unwrap();
        assert_eq!(updates.len(), 3);
        let mut snapshot = MonitoringSnapshot::void();
        for (_, update) in &updates {
            update.apply(&mut snapshot, agent.name());
        }
        let state = &snapshot.core.states[&crate::monitoring::snapshot::alias_of("Tail")];
        assert!(state.completed);
        assert!(state.span.is_some());
        // phony tasks stay unwrapped
        assert!(embraced.node(&head).item.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failures_leave_a_trace() {
        let (agent, _) = wired_agent("agent-2");
        let broken = Probe::phony("Broken")
            .ending(|| Err(Error::StorageOperation("boom".into())))
            .build();
        let workflow = crate::workflow::WorkflowBuilder::new()
            .build(broken.clone())
            .unwrap();
        let embraced = agent.embrace(&workflow);
        let wrapped = embraced.node(&broken).item.clone();
        assert!(wrapped.execute(&Context::root()).await.is_err());
        let mut snapshot = MonitoringSnapshot::void();
        for (_, update) in agent.pull(None).unwrap() {
            update.apply(&mut snapshot, agent.name());
        }
        let alias = crate::monitoring::snapshot::alias_of("Broken");
        assert!(snapshot.core.states[&alias].failures.contains_key("agent-2"));
        let logged = &snapshot.payloads[&alias].logs["agent-2"];
        assert!(logged[0].1.contains("boom"));
    }

    #[tokio::test]
    async fn test_discover_republishes_agents() {
        let (agent, monitor) = wired_agent("agent-3");
        agent.register();
        let found = MonitoringAgent::discover(&monitor).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name(), "agent-3");
        assert!(found[0].readonly());
        // the registration record index advanced
        let records = monitor.get("agent", None, None).unwrap();
        assert_eq!(records.len(), 1);
        let version_after_first = records[0].0;
        let found = MonitoringAgent::discover(&monitor).unwrap();
        assert_eq!(found.len(), 1);
        let records = monitor.get("agent", None, None).unwrap();
        assert!(records[0].0 > version_after_first);
    }
}
