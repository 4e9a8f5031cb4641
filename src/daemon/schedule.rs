// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::time::Duration;

use crate::errors::Result;
use crate::qualifiers::TimeDelta;

/// How often to rebuild and re-execute a module's workflow, and with how
/// many executor workers.
#[derive(Clone, Debug)]
pub struct DaemonSchedule {
    /// The minimum delay between workflow rebuilds.
    pub building_delay: Duration,
    /// The minimum delay between execution attempts.
    pub execution_delay: Duration,
    /// How many executor workers run the workflow in parallel.
    pub executor_count: usize,
}

impl Default for DaemonSchedule {
    fn default() -> Self {
        Self {
            building_delay: Duration::from_secs(60),
            execution_delay: Duration::from_secs(5),
            executor_count: 1,
        }
    }
}

impl DaemonSchedule {
    /// Parse a schedule from ISO 8601 durations.
    pub fn parse(
        building_delay: &str,
        execution_delay: &str,
        executor_count: usize,
    ) -> Result<Self> {
        Ok(Self {
            building_delay: TimeDelta::parse(building_delay)?,
            execution_delay: TimeDelta::parse(execution_delay)?,
            executor_count,
        })
    }
}
