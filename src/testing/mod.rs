// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Workflow auto-testing support.
//!
//! A [`Scenario`] describes how to exercise a *subject* task: run it for
//! real, feed it fixture data, check something afterwards. The testifier
//! turns scenarios into [`Test`] tasks (run the scenario, record the pass in
//! a registry) and [`Stub`] tasks (mimic an upstream dependency so the
//! subject has something to consume). A scenario decides how its subject's
//! dependencies are stubbed via [`Scenario::stub`].

mod scenarios;
mod selectors;
mod tasks;

pub use scenarios::{DefaultScenario, Scenario};
pub use selectors::{AllTestSelector, RegexTestSelector, TestSelector};
pub use tasks::{Stub, Test, TestPassed};

use std::fmt;
use std::sync::Arc;

/// A shared, by-name-comparable handle to a scenario.
#[derive(Clone)]
pub struct ScenarioRef(Arc<dyn Scenario>);

impl ScenarioRef {
    pub fn new(scenario: impl Scenario + 'static) -> Self {
        Self(Arc::new(scenario))
    }

    pub fn name(&self) -> String {
        self.0.name()
    }

    pub fn idle(&self) -> bool {
        self.0.idle()
    }

    pub async fn run(
        &self,
        subject: &crate::task::TaskRef,
        context: &crate::runtime::Context,
    ) -> crate::errors::Result<()> {
        self.0.run(subject, context).await
    }

    pub fn stub(
        &self,
        subject: &crate::task::TaskRef,
        dependencies: &std::collections::HashSet<crate::task::TaskRef>,
    ) -> std::collections::HashMap<crate::task::TaskRef, ScenarioRef> {
        self.0.stub(subject, dependencies)
    }
}

impl PartialEq for ScenarioRef {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Eq for ScenarioRef {}

impl std::hash::Hash for ScenarioRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name().hash(state);
    }
}

impl fmt::Debug for ScenarioRef {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.name())
    }
}

impl fmt::Display for ScenarioRef {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.name())
    }
}
