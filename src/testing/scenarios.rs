// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use crate::errors::{Error, Result};
use crate::runtime::Context;
use crate::task::TaskRef;
use crate::testing::ScenarioRef;

/// A set of instructions used to test a subject task.
///
/// A scenario may or may not interfere with the environment. When a
/// scenario deliberately ignores the subject's target (say, it checks that
/// the subject fails on invalid input), it must say so via [`Scenario::idle`]
/// — idle scenarios do not imply the subject's target afterwards.
#[async_trait]
pub trait Scenario: Send + Sync {
    /// The unique name. Scenarios are fully represented by their names.
    fn name(&self) -> String;

    /// Whether the subject's target should be ignored.
    fn idle(&self) -> bool {
        false
    }

    /// Run the scenario for the subject.
    async fn run(&self, subject: &TaskRef, context: &Context) -> Result<()>;

    /// Pick stubbing scenarios for the subject's dependencies. Omitted
    /// dependencies are ignored (not stubbed at all).
    fn stub(
        &self,
        subject: &TaskRef,
        dependencies: &HashSet<TaskRef>,
    ) -> HashMap<TaskRef, ScenarioRef>;
}

/// The simplest scenario: execute the subject itself, expect the same
/// scenario from every dependency, and verify the target afterwards.
#[derive(Debug, Default)]
pub struct DefaultScenario;

#[async_trait]
impl Scenario for DefaultScenario {
    fn name(&self) -> String {
        "DefaultScenario".into()
    }

    async fn run(&self, subject: &TaskRef, context: &Context) -> Result<()> {
        subject.execute(context).await?;
        if let Some(target) = subject.target() {
            if !target.check(context).await? {
                return Err(Error::TargetVerification {
                    task: subject.name(),
                    target: target.name(),
                });
            }
        }
        Ok(())
    }

    fn stub(
        &self,
        _subject: &TaskRef,
        dependencies: &HashSet<TaskRef>,
    ) -> HashMap<TaskRef, ScenarioRef> {
        dependencies
            .iter()
            .map(|dependency| (dependency.clone(), ScenarioRef::new(DefaultScenario)))
            .collect()
    }
}
