// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::daemon::DaemonSchedule;
use crate::task::TaskRef;

/// A daemon module: what to execute and how to schedule it.
///
/// The scheduling maps tags to schedules. The `None` entry covers the
/// untagged subgraph of the workflow; every other tag gets its own branch
/// running the subgraph filtered down to that tag.
pub trait DaemonModule: Send + Sync {
    /// Schedules by tag. The default is a single untagged branch with the
    /// default schedule.
    fn scheduling(&self) -> HashMap<Option<String>, DaemonSchedule> {
        HashMap::from([(None, DaemonSchedule::default())])
    }

    /// Generate the root task of the workflow for the given moment.
    fn seed(&self, now: DateTime<Utc>) -> TaskRef;
}

/// A daemon module with a static seed: the same root task at all times.
pub struct StaticDaemonModule {
    root: TaskRef,
    scheduling: HashMap<Option<String>, DaemonSchedule>,
}

impl StaticDaemonModule {
    pub fn new(root: TaskRef) -> Self {
        Self {
            root,
            scheduling: HashMap::from([(None, DaemonSchedule::default())]),
        }
    }

    pub fn with_scheduling(
        mut self,
        scheduling: HashMap<Option<String>, DaemonSchedule>,
    ) -> Self {
        self.scheduling = scheduling;
        self
    }
}

impl DaemonModule for StaticDaemonModule {
    fn scheduling(&self) -> HashMap<Option<String>, DaemonSchedule> {
        self.scheduling.clone()
    }

    fn seed(&self, _now: DateTime<Utc>) -> TaskRef {
        self.root.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::testkit::Probe;

    #[test]
    fn test_static_module_always_seeds_the_same_root() {
        let root = Probe::phony("Root").build();
        let module = StaticDaemonModule::new(root.clone());
        assert_eq!(module.seed(crate::helpers::now()), root);
        assert_eq!(module.seed(crate::helpers::now()), root);
        assert!(module.scheduling().contains_key(&None));
    }
}
