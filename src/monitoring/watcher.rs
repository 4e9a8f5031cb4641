// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The monitor watcher: aggregation of agent updates into one snapshot.
//!
//! The watcher pulls updates agent by agent in version order, applies them
//! to the in-memory snapshot, augments it, and persists the result: first
//! the core, then every touched payload, and finally the checkpoint — the
//! checkpoint write is the commit point. Recovery starts from the last
//! checkpoint and loads exactly the versions it references; anything
//! missing means the storage is inconsistent and recovery fails loudly.
//! After a successful cycle the watcher garbage-collects superseded
//! versions and the consumed agent updates.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::{Error, Result};
use crate::graph::{DfsLinearizer, Graph, Linearizer};
use crate::helpers::now;
use crate::monitoring::agent::MonitoringAgent;
use crate::monitoring::snapshot::{
    decode, encode, MonitorCheckpoint, MonitoringSnapshot, MonitoringSnapshotCore, TaskPayload,
};
use crate::runtime::Context;
use crate::storage::Storage;

/// The watcher. Also serves as the data-access object for snapshot readers
/// (the UI and friends).
pub struct MonitorWatcher {
    monitor: Arc<dyn Storage>,
}

impl MonitorWatcher {
    pub fn new(monitor: Arc<dyn Storage>) -> Self {
        Self { monitor }
    }

    /// Load the last (or an exact) version of the snapshot core.
    pub fn load_core(&self, version: Option<u64>) -> Result<Option<MonitoringSnapshotCore>> {
        let records = match version {
            None => self.monitor.get("core", None, Some(1))?,
            Some(version) => self.monitor.get("core", Some(version), None)?,
        };
        let Some((last_version, serialized)) = records.last() else {
            if version.is_some() {
                return Err(Error::MonitorInconsistency(format!(
                    "missing core version {}",
                    version.unwrap()
                )));
            }
            return Ok(None);
        };
        if version.is_some_and(|wanted| *last_version != wanted) {
            return Err(Error::MonitorInconsistency(format!(
                "invalid core version: wanted {}, found {last_version}",
                version.unwrap()
            )));
        }
        Ok(Some(decode(serialized)?))
    }

    /// Load the last (or an exact) version of a task payload.
    pub fn load_payload(
        &self,
        alias: &str,
        version: Option<u64>,
    ) -> Result<Option<TaskPayload>> {
        let key = format!("payload/{alias}");
        let records = match version {
            None => self.monitor.get(&key, None, Some(1))?,
            Some(version) => self.monitor.get(&key, Some(version), None)?,
        };
        let Some((last_version, serialized)) = records.last() else {
            if version.is_some() {
                return Err(Error::MonitorInconsistency(format!(
                    "missing payload version {} for {alias}",
                    version.unwrap()
                )));
            }
            return Ok(None);
        };
        if version.is_some_and(|wanted| *last_version != wanted) {
            return Err(Error::MonitorInconsistency(format!(
                "invalid payload version for {alias}: wanted {}, found {last_version}",
                version.unwrap()
            )));
        }
        Ok(Some(decode(serialized)?))
    }

    /// Load the last checkpoint, if any.
    pub fn load_checkpoint(&self) -> Result<Option<MonitorCheckpoint>> {
        let records = self.monitor.get("checkpoint", None, Some(1))?;
        match records.first() {
            None => Ok(None),
            Some((_, serialized)) => Ok(Some(decode(serialized)?)),
        }
    }

    /// Assemble the full snapshot from the last checkpoint.
    pub fn recover(&self) -> Result<(MonitorCheckpoint, MonitoringSnapshot)> {
        let Some(checkpoint) = self.load_checkpoint()? else {
            return Ok((MonitorCheckpoint::default(), MonitoringSnapshot::void()));
        };
        let core = match checkpoint.core_version {
            None => MonitoringSnapshotCore::void(),
            Some(version) => self
                .load_core(Some(version))?
                .expect("an exact load either succeeds or fails"),
        };
        let mut snapshot = MonitoringSnapshot {
            core,
            payloads: Default::default(),
        };
        for (alias, version) in &checkpoint.payload_versions {
            let payload = self
                .load_payload(alias, Some(*version))?
                .expect("an exact load either succeeds or fails");
            snapshot.payloads.insert(alias.clone(), payload);
        }
        Ok((checkpoint, snapshot))
    }

    /// Run one aggregation cycle against the given state.
    pub fn aggregate(
        &self,
        checkpoint: &mut MonitorCheckpoint,
        snapshot: &mut MonitoringSnapshot,
        context: &Context,
    ) -> Result<()> {
        let agents = MonitoringAgent::discover(&self.monitor)?;
        let mut affected: HashSet<String> = HashSet::new();
        for agent in &agents {
            context.checkpoint()?;
            let cursor = checkpoint.cursors.get(agent.name()).copied();
            for (version, update) in agent.pull(cursor)? {
                affected.extend(update.apply(snapshot, agent.name()));
                checkpoint.cursors.insert(agent.name().to_string(), version + 1);
            }
        }
        augment(snapshot)?;
        context.checkpoint()?;
        let core_version = self.monitor.put("core", &encode(&snapshot.core)?)?;
        checkpoint.core_version = Some(core_version);
        for alias in &affected {
            let payload = snapshot.payloads.entry(alias.clone()).or_default();
            let version = self
                .monitor
                .put(&format!("payload/{alias}"), &encode(payload)?)?;
            checkpoint.payload_versions.insert(alias.clone(), version);
        }
        // the commit point
        let checkpoint_version = self.monitor.put("checkpoint", &encode(checkpoint)?)?;
        self.monitor.delete("checkpoint", Some(checkpoint_version))?;
        self.monitor.delete("core", Some(core_version))?;
        for alias in &affected {
            self.monitor.delete(
                &format!("payload/{alias}"),
                Some(checkpoint.payload_versions[alias]),
            )?;
        }
        for agent in &agents {
            if let Some(cursor) = checkpoint.cursors.get(agent.name()) {
                agent.drop_updates(Some(*cursor))?;
            }
        }
        Ok(())
    }

    /// Run the aggregation cycle forever with at least `delay` between
    /// iterations. Non-interruption errors are logged and retried.
    pub async fn run(&self, context: &Context, delay: Duration) -> Result<()> {
        let (mut checkpoint, mut snapshot) = self.recover()?;
        loop {
            context.checkpoint()?;
            match self.aggregate(&mut checkpoint, &mut snapshot, context) {
                Ok(()) => {}
                Err(error) if error.is_interruption() => return Err(error),
                Err(error) => tracing::warn!("aggregation failed: {error}"),
            }
            context.sleep(delay).await?;
        }
    }
}

// Re-derive the completion of phony tasks: a phony task is complete iff
// none of its dependencies are pending. Non-phony completion stays
// authoritative. Refreshes the snapshot timestamp.
fn augment(snapshot: &mut MonitoringSnapshot) -> Result<()> {
    let mut graph: Graph<String, ()> = Graph::new();
    for alias in snapshot.core.states.keys() {
        graph.add(alias.clone());
    }
    for (alias, payload) in &snapshot.payloads {
        let Some(dependencies) = &payload.dependencies else {
            continue;
        };
        for dependency in dependencies {
            if graph.contains(dependency) && graph.contains(alias) {
                graph.link(dependency, alias);
            }
        }
    }
    let mut pending: HashSet<String> = HashSet::new();
    for alias in DfsLinearizer.linearize(&graph)? {
        let state = snapshot
            .core
            .states
            .get_mut(&alias)
            .expect("the graph mirrors the states");
        if state.completed {
            continue;
        }
        let dependencies = snapshot
            .payloads
            .get(&alias)
            .and_then(|payload| payload.dependencies.clone())
            .unwrap_or_default();
        if !state.phony || dependencies.iter().any(|dependency| pending.contains(dependency))
        {
            pending.insert(alias);
            continue;
        }
        state.completed = true;
    }
    snapshot.core.timestamp = now();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::BasicConsumer;
    use crate::monitoring::snapshot::{alias_of, MonitoringSnapshotUpdate, TaskStatus};
    use crate::storage::InMemoryStorage;
    use std::collections::{BTreeMap, BTreeSet};

    fn monitor() -> Arc<dyn Storage> {
        Arc::new(InMemoryStorage::new())
    }

    fn pushing_agent(name: &str, monitor: &Arc<dyn Storage>) -> MonitoringAgent {
        let relay = monitor.clone();
        let consumer = Arc::new(BasicConsumer::new(move |(key, value): (String, String)| {
            relay.put(&key, &value)?;
            Ok(())
        }));
        MonitoringAgent::new(name, monitor.clone()).with_consumer(consumer)
    }

    fn describe(agent: &MonitoringAgent, tasks: &[(&str, &[&str], bool)]) {
        agent.register();
        agent.push(&MonitoringSnapshotUpdate::WorkflowUpdate {
            dependencies: tasks
                .iter()
                .map(|(name, parents, _)| {
                    (
                        name.to_string(),
                        parents.iter().map(|parent| parent.to_string()).collect(),
                    )
                })
                .collect::<BTreeMap<String, BTreeSet<String>>>(),
            phonies: tasks
                .iter()
                .filter(|(_, _, phony)| *phony)
                .map(|(name, _, _)| name.to_string())
                .collect(),
            baggages: BTreeMap::new(),
        });
    }

    #[test]
    fn test_aggregation_advances_cursors_and_commits() {
        let monitor = monitor();
        let agent = pushing_agent("agent-w", &monitor);
        describe(&agent, &[("A", &[], false), ("B", &["A"], false)]);
        agent.push(&MonitoringSnapshotUpdate::TaskStatusUpdate {
            task: "A".into(),
            status: TaskStatus::Running,
            timestamp: now(),
        });
        let watcher = MonitorWatcher::new(monitor.clone());
        let (mut checkpoint, mut snapshot) = watcher.recover().unwrap();
        watcher
            .aggregate(&mut checkpoint, &mut snapshot, &Context::root())
            .unwrap();
        // both updates consumed, the cursor points past them
        assert_eq!(checkpoint.cursors["agent-w"], 2);
        assert!(checkpoint.core_version.is_some());
        assert!(checkpoint
            .payload_versions
            .contains_key(&alias_of("A")));
        assert!(watcher.load_checkpoint().unwrap().is_some());
        // the consumed updates are gone from the storage
        assert!(agent.pull(None).unwrap().is_empty());
        assert!(snapshot.core.states[&alias_of("A")]
            .runs
            .contains_key("agent-w"));
    }

    #[test]
    fn test_recovery_reproduces_the_snapshot() {
        let monitor = monitor();
        let agent = pushing_agent("agent-r", &monitor);
        describe(&agent, &[("A", &[], false), ("B", &["A"], true)]);
        agent.push(&MonitoringSnapshotUpdate::TaskLogUpdate {
            task: "A".into(),
            message: "hello".into(),
            timestamp: now(),
        });
        let watcher = MonitorWatcher::new(monitor.clone());
        let (mut checkpoint, mut snapshot) = watcher.recover().unwrap();
        watcher
            .aggregate(&mut checkpoint, &mut snapshot, &Context::root())
            .unwrap();
        // a fresh watcher (think: restarted process) sees the same state
        let reborn = MonitorWatcher::new(monitor.clone());
        let (recovered_checkpoint, recovered_snapshot) = reborn.recover().unwrap();
        assert_eq!(recovered_checkpoint, checkpoint);
        assert_eq!(recovered_snapshot.core, snapshot.core);
        for (alias, version) in &checkpoint.payload_versions {
            assert_eq!(
                recovered_snapshot.payloads[alias],
                watcher.load_payload(alias, Some(*version)).unwrap().unwrap()
            );
        }
    }

    #[test]
    fn test_new_updates_are_applied_on_the_next_cycle() {
        let monitor = monitor();
        let agent = pushing_agent("agent-n", &monitor);
        describe(&agent, &[("A", &[], false)]);
        let watcher = MonitorWatcher::new(monitor.clone());
        let (mut checkpoint, mut snapshot) = watcher.recover().unwrap();
        watcher
            .aggregate(&mut checkpoint, &mut snapshot, &Context::root())
            .unwrap();
        let first_core_version = checkpoint.core_version.unwrap();
        agent.push(&MonitoringSnapshotUpdate::TaskStatusUpdate {
            task: "A".into(),
            status: TaskStatus::Completed,
            timestamp: now(),
        });
        watcher
            .aggregate(&mut checkpoint, &mut snapshot, &Context::root())
            .unwrap();
        assert!(checkpoint.core_version.unwrap() > first_core_version);
        assert!(snapshot.core.states[&alias_of("A")].completed);
    }

    #[test]
    fn test_phony_completion_is_rederived() {
        let monitor = monitor();
        let agent = pushing_agent("agent-p", &monitor);
        // B is phony and depends on A; C is phony with a pending dependency
        describe(
            &agent,
            &[("A", &[], false), ("B", &["A"], true), ("C", &["B", "D"], true), ("D", &[], false)],
        );
        agent.push(&MonitoringSnapshotUpdate::TaskStatusUpdate {
            task: "A".into(),
            status: TaskStatus::Completed,
            timestamp: now(),
        });
        let watcher = MonitorWatcher::new(monitor.clone());
        let (mut checkpoint, mut snapshot) = watcher.recover().unwrap();
        watcher
            .aggregate(&mut checkpoint, &mut snapshot, &Context::root())
            .unwrap();
        let state_of = |name: &str| &snapshot.core.states[&alias_of(name)];
        assert!(state_of("A").completed);
        // B's only dependency is complete
        assert!(state_of("B").completed);
        // C waits for D
        assert!(!state_of("C").completed);
        assert!(!state_of("D").completed);
    }

    #[test]
    fn test_missing_referenced_versions_fail_recovery() {
        let monitor = monitor();
        let agent = pushing_agent("agent-m", &monitor);
        describe(&agent, &[("A", &[], false)]);
        agent.push(&MonitoringSnapshotUpdate::TaskLogUpdate {
            task: "A".into(),
            message: "doomed".into(),
            timestamp: now(),
        });
        let watcher = MonitorWatcher::new(monitor.clone());
        let (mut checkpoint, mut snapshot) = watcher.recover().unwrap();
        watcher
            .aggregate(&mut checkpoint, &mut snapshot, &Context::root())
            .unwrap();
        // simulate a corrupted storage: drop the referenced payload
        let alias = alias_of("A");
        monitor.delete(&format!("payload/{alias}"), None).unwrap();
        let error = MonitorWatcher::new(monitor.clone()).recover().unwrap_err();
        assert!(matches!(error, Error::MonitorInconsistency(_)));
    }
}
