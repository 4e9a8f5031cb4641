// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use crate::condition::{Condition, ConditionRef};
use crate::errors::Result;
use crate::qualifiers::format_name;
use crate::runtime::Context;
use crate::storage::Storage;
use crate::task::{Task, TaskRef};
use crate::testing::ScenarioRef;

/// A testing task that checks the correctness of a subject.
///
/// Runs the scenario for the subject and registers itself in the registry
/// if no errors occurred — meaning the test has passed. The target,
/// [`TestPassed`], makes passed tests skippable on re-runs.
pub struct Test {
    pub scenario: ScenarioRef,
    pub subject: TaskRef,
    pub registry: Arc<dyn Storage>,
}

impl Test {
    pub fn new(scenario: ScenarioRef, subject: TaskRef, registry: Arc<dyn Storage>) -> Self {
        Self {
            scenario,
            subject,
            registry,
        }
    }
}

#[async_trait]
impl Task for Test {
    fn name(&self) -> String {
        format_name(
            "Test",
            &[
                ("scenario", self.scenario.name()),
                ("subject", self.subject.name()),
            ],
        )
    }

    fn phony(&self) -> bool {
        false
    }

    async fn execute(&self, context: &Context) -> Result<()> {
        self.scenario.run(&self.subject, context).await?;
        self.registry.put(&self.name(), "!")?;
        Ok(())
    }

    fn target(&self) -> Option<ConditionRef> {
        Some(ConditionRef::new(TestPassed {
            test_name: self.name(),
            registry: self.registry.clone(),
            implication: if self.scenario.idle() {
                None
            } else {
                self.subject.target()
            },
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The completeness condition of a [`Test`]: the registry remembers a pass.
pub struct TestPassed {
    test_name: String,
    registry: Arc<dyn Storage>,
    implication: Option<ConditionRef>,
}

#[async_trait]
impl Condition for TestPassed {
    fn name(&self) -> String {
        format_name("TestPassed", &[("test", self.test_name.clone())])
    }

    async fn check(&self, _context: &Context) -> Result<bool> {
        Ok(!self
            .registry
            .get(&self.test_name, None, Some(1))?
            .is_empty())
    }

    fn invariants(&self) -> Vec<ConditionRef> {
        // a non-idle passed test leaves the subject's target true
        match &self.implication {
            Some(target) => {
                let this = ConditionRef::new(TestPassed {
                    test_name: self.test_name.clone(),
                    registry: self.registry.clone(),
                    implication: self.implication.clone(),
                });
                vec![this.implies(target)]
            }
            None => Vec::new(),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A stubbing task that mimics the behavior of a subject.
///
/// Runs the scenario for the subject and shares the subject's target.
pub struct Stub {
    pub scenario: ScenarioRef,
    pub subject: TaskRef,
}

impl Stub {
    pub fn new(scenario: ScenarioRef, subject: TaskRef) -> Self {
        Self { scenario, subject }
    }
}

#[async_trait]
impl Task for Stub {
    fn name(&self) -> String {
        format_name(
            "Stub",
            &[
                ("scenario", self.scenario.name()),
                ("subject", self.subject.name()),
            ],
        )
    }

    fn phony(&self) -> bool {
        false
    }

    async fn execute(&self, context: &Context) -> Result<()> {
        self.scenario.run(&self.subject, context).await
    }

    fn target(&self) -> Option<ConditionRef> {
        self.subject.target()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
