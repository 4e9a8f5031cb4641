// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::path::Path;

use serde::Deserialize;

use crate::daemon::DaemonSchedule;
use crate::errors::{Error, Result};

/// Tunables of the demo daemon, loadable from a YAML file.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// A salt mixed into the hashed lines.
    pub salt: String,
    /// ISO 8601 delay between workflow rebuilds.
    pub building_delay: String,
    /// ISO 8601 delay between execution attempts.
    pub execution_delay: String,
    /// Executor workers per tag branch.
    pub executor_count: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            salt: "demo".into(),
            building_delay: "PT10S".into(),
            execution_delay: "PT2S".into(),
            executor_count: 2,
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|error| Error::Other(anyhow::anyhow!("cannot read settings: {error}")))?;
        serde_yaml::from_str(&text)
            .map_err(|error| Error::Other(anyhow::anyhow!("cannot parse settings: {error}")))
    }

    pub fn schedule(&self) -> Result<DaemonSchedule> {
        DaemonSchedule::parse(
            &self.building_delay,
            &self.execution_delay,
            self.executor_count,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_make_a_valid_schedule() {
        let schedule = Settings::default().schedule().unwrap();
        assert_eq!(schedule.executor_count, 2);
    }

    #[test]
    fn test_loading_overrides_defaults() {
        let home = tempfile::tempdir().unwrap();
        let path = home.path().join("settings.yaml");
        std::fs::write(&path, "salt: pepper\nexecutor_count: 5\n").unwrap();
        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.salt, "pepper");
        assert_eq!(settings.executor_count, 5);
        assert_eq!(settings.building_delay, "PT10S");
    }
}
