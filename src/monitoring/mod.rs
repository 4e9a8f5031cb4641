// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Monitoring: agents push, the watcher aggregates.
//!
//! Executor workers wrap their workflows through a [`MonitoringAgent`],
//! which streams topology, status, and log updates into the monitor
//! storage (through a consumer, so pushes never block on storage). A single
//! [`MonitorWatcher`] — possibly in another process entirely — folds those
//! streams into one queryable [`snapshot::MonitoringSnapshot`] with
//! checkpointed, crash-consistent recovery.

pub mod sink;
pub mod snapshot;

mod agent;
mod watcher;

pub use agent::MonitoringAgent;
pub use watcher::MonitorWatcher;
