// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The monitoring data model.
//!
//! The aggregated view of the world splits in two: the *core* (aliases,
//! per-task states, a timestamp — serialized as one record on every cycle)
//! and per-task *payloads* (dependencies and captured logs — serialized
//! independently, only when touched). Tasks are keyed by *alias*: the first
//! ten hex characters of the SHA-1 of the task name, which keeps storage
//! keys short and ASCII-safe regardless of how wild task names get.
//!
//! Everything that hits the storage is JSON. Updates travel in a
//! discriminated envelope `{"?": kind, "!": payload}` so that new update
//! kinds can ride alongside old ones.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::errors::{Error, Result};
use crate::helpers::{now, sha1_hex};

/// The maximum number of log messages kept per task per agent.
pub const LOG_LIMIT: usize = 10;

/// The alias of a task name.
pub fn alias_of(name: &str) -> String {
    sha1_hex(name)[..10].to_string()
}

/// Serialize a record for the monitor storage.
pub fn encode<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|error| Error::Other(anyhow::anyhow!("cannot encode a record: {error}")))
}

/// Deserialize a record from the monitor storage.
pub fn decode<T: DeserializeOwned>(text: &str) -> Result<T> {
    serde_json::from_str(text)
        .map_err(|error| Error::MonitorInconsistency(format!("cannot decode a record: {error}")))
}

/// The essential state of a task, as seen by the watcher.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskState {
    pub name: String,
    pub phony: bool,
    pub completed: bool,
    /// The task disappeared from the world: no agent reports it anymore and
    /// nothing downstream of it is active either.
    pub stale: bool,
    /// Agents currently reporting the task.
    pub agents: BTreeSet<String>,
    /// Start timestamps of executions in progress, by agent.
    pub runs: BTreeMap<String, DateTime<Utc>>,
    /// Latest failure timestamps, by agent.
    pub failures: BTreeMap<String, DateTime<Utc>>,
    /// The first observed successful execution: start and finish.
    pub span: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub baggage: BTreeMap<String, String>,
}

impl TaskState {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            phony: false,
            completed: false,
            stale: false,
            agents: BTreeSet::new(),
            runs: BTreeMap::new(),
            failures: BTreeMap::new(),
            span: None,
            baggage: BTreeMap::new(),
        }
    }
}

/// The serialized-per-cycle part of the snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MonitoringSnapshotCore {
    /// Task name → alias.
    pub aliases: BTreeMap<String, String>,
    /// Alias → state.
    pub states: BTreeMap<String, TaskState>,
    pub timestamp: DateTime<Utc>,
}

impl MonitoringSnapshotCore {
    pub fn void() -> Self {
        Self {
            aliases: BTreeMap::new(),
            states: BTreeMap::new(),
            timestamp: now(),
        }
    }

    /// Add new tasks with fresh states.
    pub fn add<I: IntoIterator<Item = String>>(&mut self, names: I) {
        for name in names {
            let alias = alias_of(&name);
            self.states.insert(alias.clone(), TaskState::new(&name));
            self.aliases.insert(name, alias);
        }
    }
}

/// The independently-serialized part of the snapshot, per task.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPayload {
    /// Aliases of the tasks this task depends on. Unset until the first
    /// workflow update mentions the task.
    pub dependencies: Option<BTreeSet<String>>,
    /// Captured log messages by agent, newest first, capped at
    /// [`LOG_LIMIT`].
    pub logs: BTreeMap<String, Vec<(DateTime<Utc>, String)>>,
}

/// The committed recovery anchor of the watcher.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorCheckpoint {
    /// The next update version to consume, by agent.
    pub cursors: BTreeMap<String, u64>,
    pub core_version: Option<u64>,
    /// The last persisted payload version, by alias.
    pub payload_versions: BTreeMap<String, u64>,
}

/// The full in-memory snapshot: the core plus the payloads.
#[derive(Clone, Debug, PartialEq)]
pub struct MonitoringSnapshot {
    pub core: MonitoringSnapshotCore,
    pub payloads: HashMap<String, TaskPayload>,
}

impl MonitoringSnapshot {
    pub fn void() -> Self {
        Self {
            core: MonitoringSnapshotCore::void(),
            payloads: HashMap::new(),
        }
    }
}

/// A task status as reported by agents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Completed,
    Stopped,
    Failed,
}

/// An update that enriches the snapshot with additional information.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "?", content = "!")]
pub enum MonitoringSnapshotUpdate {
    /// The topology of a workflow an agent is about to execute.
    WorkflowUpdate {
        /// Task name → names of the tasks it depends on.
        dependencies: BTreeMap<String, BTreeSet<String>>,
        phonies: BTreeSet<String>,
        baggages: BTreeMap<String, BTreeMap<String, String>>,
    },
    /// A change in the status of a task.
    TaskStatusUpdate {
        task: String,
        status: TaskStatus,
        timestamp: DateTime<Utc>,
    },
    /// A log message captured during task execution.
    TaskLogUpdate {
        task: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl MonitoringSnapshotUpdate {
    pub fn serialize(&self) -> Result<String> {
        encode(self)
    }

    pub fn deserialize(text: &str) -> Result<Self> {
        decode(text)
    }

    /// Apply the update to the snapshot on behalf of the agent.
    ///
    /// Returns the aliases of tasks whose payload was affected.
    pub fn apply(&self, snapshot: &mut MonitoringSnapshot, agent: &str) -> Vec<String> {
        match self {
            MonitoringSnapshotUpdate::WorkflowUpdate {
                dependencies,
                phonies,
                baggages,
            } => apply_workflow_update(snapshot, agent, dependencies, phonies, baggages),
            MonitoringSnapshotUpdate::TaskStatusUpdate {
                task,
                status,
                timestamp,
            } => {
                apply_status_update(snapshot, agent, task, *status, *timestamp);
                Vec::new()
            }
            MonitoringSnapshotUpdate::TaskLogUpdate {
                task,
                message,
                timestamp,
            } => apply_log_update(snapshot, agent, task, message, *timestamp),
        }
    }
}

fn apply_workflow_update(
    snapshot: &mut MonitoringSnapshot,
    agent: &str,
    dependencies: &BTreeMap<String, BTreeSet<String>>,
    phonies: &BTreeSet<String>,
    baggages: &BTreeMap<String, BTreeMap<String, String>>,
) -> Vec<String> {
    let mut affected = Vec::new();
    let unseen: Vec<String> = dependencies
        .keys()
        .filter(|name| !snapshot.core.aliases.contains_key(*name))
        .cloned()
        .collect();
    snapshot.core.add(unseen);
    // membership: reported tasks gain this agent, the rest lose it
    for (name, alias) in &snapshot.core.aliases {
        let state = snapshot
            .core
            .states
            .get_mut(alias)
            .expect("aliases and states stay in sync");
        if dependencies.contains_key(name) {
            state.agents.insert(agent.to_string());
            state.stale = false;
        } else {
            state.agents.remove(agent);
        }
    }
    for (name, parents) in dependencies {
        let alias = snapshot.core.aliases[name].clone();
        let state = snapshot
            .core
            .states
            .get_mut(&alias)
            .expect("just added above");
        state.phony = phonies.contains(name);
        state.baggage = baggages.get(name).cloned().unwrap_or_default();
        let payload = snapshot.payloads.entry(alias.clone()).or_default();
        if payload.dependencies.is_none() {
            payload.dependencies = Some(parents.iter().map(|parent| alias_of(parent)).collect());
            affected.push(alias);
        }
    }
    settle_abandoned_tasks(snapshot);
    affected
}

// A task nobody reports anymore is either implicitly complete (something
// downstream of it is still active, so its work must have been consumed) or
// stale (it simply disappeared from the world).
fn settle_abandoned_tasks(snapshot: &mut MonitoringSnapshot) {
    let mut children: HashMap<&String, Vec<&String>> = HashMap::new();
    for (alias, payload) in &snapshot.payloads {
        if let Some(dependencies) = &payload.dependencies {
            for dependency in dependencies {
                children.entry(dependency).or_default().push(alias);
            }
        }
    }
    let active: HashSet<&String> = snapshot
        .core
        .states
        .iter()
        .filter(|(_, state)| !state.agents.is_empty())
        .map(|(alias, _)| alias)
        .collect();
    let mut verdicts: Vec<(String, bool)> = Vec::new();
    for (alias, state) in &snapshot.core.states {
        if !state.agents.is_empty() {
            continue;
        }
        let mut survived = false;
        let mut stack: Vec<&String> = children.get(alias).cloned().unwrap_or_default();
        let mut seen: HashSet<&String> = stack.iter().copied().collect();
        while let Some(descendant) = stack.pop() {
            if active.contains(descendant) {
                survived = true;
                break;
            }
            for child in children.get(descendant).cloned().unwrap_or_default() {
                if seen.insert(child) {
                    stack.push(child);
                }
            }
        }
        verdicts.push((alias.clone(), survived));
    }
    for (alias, survived) in verdicts {
        let state = snapshot.core.states.get_mut(&alias).unwrap();
        if survived {
            state.completed = true;
            state.stale = false;
        } else {
            state.stale = true;
        }
    }
}

fn apply_status_update(
    snapshot: &mut MonitoringSnapshot,
    agent: &str,
    task: &str,
    status: TaskStatus,
    timestamp: DateTime<Utc>,
) {
    let alias = alias_of(task);
    let Some(state) = snapshot.core.states.get_mut(&alias) else {
        tracing::debug!("status update for an unknown task `{task}`");
        return;
    };
    match status {
        TaskStatus::Completed => {
            state.completed = true;
            if let Some(&started) = state.runs.get(agent) {
                let earlier = state.span.map_or(true, |(start, _)| start > started);
                if earlier {
                    state.span = Some((started, timestamp));
                }
            }
        }
        TaskStatus::Failed => {
            state.failures.insert(agent.to_string(), timestamp);
        }
        _ => {}
    }
    if status == TaskStatus::Running {
        state.runs.insert(agent.to_string(), timestamp);
    } else {
        state.runs.remove(agent);
    }
}

fn apply_log_update(
    snapshot: &mut MonitoringSnapshot,
    agent: &str,
    task: &str,
    message: &str,
    timestamp: DateTime<Utc>,
) -> Vec<String> {
    let alias = alias_of(task);
    let payload = snapshot.payloads.entry(alias.clone()).or_default();
    let log = payload.logs.entry(agent.to_string()).or_default();
    log.insert(0, (timestamp, message.to_string()));
    log.truncate(LOG_LIMIT);
    vec![alias]
}
