// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! End-to-end scenarios across the build → process → execute pipeline.

#[cfg(test)]
mod tests {
    use std::any::Any;
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::condition::ConditionRef;
    use crate::demo::{PathExists, Sandbox};
    use crate::errors::{Error, Result};
    use crate::monitoring::snapshot::{alias_of, MonitoringSnapshot};
    use crate::monitoring::MonitoringAgent;
    use crate::runtime::Context;
    use crate::storage::{InMemoryStorage, Storage};
    use crate::task::testkit::{journal, Journal, Probe};
    use crate::task::{Annotation, Requisite, Task, TaskRef};
    use crate::testing::{Scenario, ScenarioRef};
    use crate::workflow::executors::{BasicExecutor, MonitoringExecutor};
    use crate::workflow::processors::{
        TargetPostChecker, TaskRanker, TaskSegregator, WorkflowTestifier, WorkflowTrimmer,
    };
    use crate::workflow::{WorkflowBuilder, WorkflowExecutor, WorkflowProcessor};

    // a task that leaves a mark in the sandbox
    struct Touch {
        sandbox: Sandbox,
        index: usize,
        journal: Journal,
        previous: Option<TaskRef>,
    }

    #[async_trait]
    impl Task for Touch {
        fn name(&self) -> String {
            format!("Touch({})", self.index)
        }

        fn requisite(&self) -> Requisite {
            match &self.previous {
                Some(previous) => Requisite::Follow(previous.clone()),
                None => Requisite::Null,
            }
        }

        fn target(&self) -> Option<ConditionRef> {
            Some(ConditionRef::new(PathExists {
                sandbox: self.sandbox.clone(),
                path: format!("m{}", self.index),
            }))
        }

        fn phony(&self) -> bool {
            false
        }

        async fn execute(&self, _context: &Context) -> Result<()> {
            self.journal.lock().unwrap().push(self.name());
            self.sandbox.create(&format!("m{}", self.index), "!");
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[tokio::test]
    async fn test_empty_workflow_executes_immediately() {
        // S1: a root with no execute and no requisite
        let idle = Probe::phony("Idle").build();
        let mut workflow = WorkflowBuilder::new().build(idle).unwrap();
        assert_eq!(workflow.len(), 1);
        TaskRanker
            .process(&mut workflow, &Context::root())
            .await
            .unwrap();
        BasicExecutor
            .execute(&workflow, &Context::root())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_linear_chain_skips_the_completed_prefix() {
        // S2: T0..T4, the first three targets already hold
        let sandbox = Sandbox::new();
        let log = journal();
        let mut chain: Option<TaskRef> = None;
        for index in 0..5 {
            chain = Some(TaskRef::new(Touch {
                sandbox: sandbox.clone(),
                index,
                journal: log.clone(),
                previous: chain,
            }));
        }
        for index in 0..3 {
            sandbox.create(&format!("m{index}"), "!");
        }
        let mut workflow = WorkflowBuilder::new().build(chain.unwrap()).unwrap();
        let context = Context::root();
        WorkflowTrimmer.process(&mut workflow, &context).await.unwrap();
        // the pending suffix survives the trim, the deep prefix does not
        let names: HashSet<String> =
            workflow.items().map(|task| task.name()).collect();
        assert!(names.contains("Touch(3)"));
        assert!(names.contains("Touch(4)"));
        assert!(!names.contains("Touch(0)"));
        assert!(!names.contains("Touch(1)"));
        TaskRanker.process(&mut workflow, &context).await.unwrap();
        BasicExecutor.execute(&workflow, &context).await.unwrap();
        assert_eq!(log.lock().unwrap().as_slice(), ["Touch(3)", "Touch(4)"]);
        assert!(sandbox.check("m3"));
        assert!(sandbox.check("m4"));
    }

    #[tokio::test]
    async fn test_excusable_stop_reports_and_abandons_descendants() {
        // S3: A -> B -> C, B stops; the agent hears about all of it
        let monitor: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let relay = monitor.clone();
        let consumer = Arc::new(crate::consumer::BasicConsumer::new(
            move |(key, value): (String, String)| {
                relay.put(&key, &value)?;
                Ok(())
            },
        ));
        let agent = MonitoringAgent::new("agent-s3", monitor.clone()).with_consumer(consumer);
        let log = journal();
        let first = Probe::active("A", &log).build();
        let second = Probe::active("B", &log)
            .after(&first)
            .ending(|| Err(Error::Stopped("not today".into())))
            .build();
        let third = Probe::active("C", &log).after(&second).build();
        let mut workflow = WorkflowBuilder::new().build(third).unwrap();
        let context = Context::root();
        TaskRanker.process(&mut workflow, &context).await.unwrap();
        let executor = MonitoringExecutor::new(Arc::new(BasicExecutor), agent.clone());
        let error = executor.execute(&workflow, &context).await.unwrap_err();
        assert!(matches!(&error, Error::ExecutionStopped(stopped) if stopped == &["B"]));
        assert_eq!(log.lock().unwrap().as_slice(), ["A", "B"]);
        let mut snapshot = MonitoringSnapshot::void();
        for (_, update) in agent.pull(None).unwrap() {
            update.apply(&mut snapshot, agent.name());
        }
        let state_of = |name: &str| &snapshot.core.states[&alias_of(name)];
        assert!(state_of("A").completed);
        assert!(!state_of("B").completed);
        assert!(state_of("B").runs.is_empty());
        assert!(state_of("B").failures.is_empty());
        assert!(!state_of("C").completed);
        assert!(state_of("C").runs.is_empty());
    }

    #[tokio::test]
    async fn test_target_verification_failures_are_fatal() {
        // S4: the execute succeeds, the target stays false
        let pending = crate::condition::testkit::Constant::of("e2e/Unreachable", false);
        let log = journal();
        let hollow = Probe::active("Hollow", &log).aiming(&pending).build();
        let mut workflow = WorkflowBuilder::new().build(hollow).unwrap();
        let context = Context::root();
        TargetPostChecker.process(&mut workflow, &context).await.unwrap();
        TaskRanker.process(&mut workflow, &context).await.unwrap();
        let error = BasicExecutor.execute(&workflow, &context).await.unwrap_err();
        assert!(matches!(&error, Error::ExecutionFailed(failed) if failed == &["Hollow"]));
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    // --- S6: testify + segregate -----------------------------------------

    struct Produce {
        sandbox: Sandbox,
    }

    #[async_trait]
    impl Task for Produce {
        fn name(&self) -> String {
            "Produce".into()
        }

        fn target(&self) -> Option<ConditionRef> {
            Some(ConditionRef::new(PathExists {
                sandbox: self.sandbox.clone(),
                path: "in".into(),
            }))
        }

        fn phony(&self) -> bool {
            false
        }

        async fn execute(&self, _context: &Context) -> Result<()> {
            self.sandbox.create("in", "live\n");
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct Consume {
        sandbox: Sandbox,
        tests: Vec<ScenarioRef>,
    }

    #[async_trait]
    impl Task for Consume {
        fn name(&self) -> String {
            "Consume".into()
        }

        fn requisite(&self) -> Requisite {
            Requisite::SatisfyAll(vec![
                Requisite::Follow(TaskRef::new(Produce {
                    sandbox: self.sandbox.clone(),
                })),
                Requisite::Annotate(Annotation::Tests(self.tests.clone())),
            ])
        }

        fn target(&self) -> Option<ConditionRef> {
            Some(ConditionRef::new(PathExists {
                sandbox: self.sandbox.clone(),
                path: "out".into(),
            }))
        }

        fn phony(&self) -> bool {
            false
        }

        async fn execute(&self, _context: &Context) -> Result<()> {
            let input = self
                .sandbox
                .read("in")
                .ok_or_else(|| Error::Other(anyhow::anyhow!("nothing to consume")))?;
            self.sandbox.create("out", &input);
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct PlantInput {
        sandbox: Sandbox,
        data: String,
    }

    #[async_trait]
    impl Scenario for PlantInput {
        fn name(&self) -> String {
            format!("PlantInput(data={:?})", self.data)
        }

        async fn run(&self, _subject: &TaskRef, _context: &Context) -> Result<()> {
            self.sandbox.create("in", &self.data);
            Ok(())
        }

        fn stub(
            &self,
            _subject: &TaskRef,
            _dependencies: &HashSet<TaskRef>,
        ) -> HashMap<TaskRef, ScenarioRef> {
            HashMap::new()
        }
    }

    struct CheckConsume {
        sandbox: Sandbox,
        data: String,
    }

    #[async_trait]
    impl Scenario for CheckConsume {
        fn name(&self) -> String {
            format!("CheckConsume(data={:?})", self.data)
        }

        async fn run(&self, subject: &TaskRef, context: &Context) -> Result<()> {
            crate::testing::DefaultScenario.run(subject, context).await?;
            let output = self
                .sandbox
                .read("out")
                .ok_or_else(|| Error::Other(anyhow::anyhow!("no output")))?;
            if output != self.data {
                return Err(Error::Other(anyhow::anyhow!("consumed the wrong input")));
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
                .map(|dependency| {
                    (
                        dependency.clone(),
                        ScenarioRef::new(PlantInput {
                            sandbox: self.sandbox.clone(),
                            data: self.data.clone(),
                        }),
                    )
                })
                .collect()
        }
    }

    #[tokio::test]
    async fn test_conflicting_tests_run_in_separate_environments() {
        // S6: two tests for the same subject with conflicting stubs
        let sandbox = Sandbox::new();
        let registry: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let subject = TaskRef::new(Consume {
            sandbox: sandbox.clone(),
            tests: vec![
                ScenarioRef::new(CheckConsume {
                    sandbox: sandbox.clone(),
                    data: "aa\n".into(),
                }),
                ScenarioRef::new(CheckConsume {
                    sandbox: sandbox.clone(),
                    data: "bb\n".into(),
                }),
            ],
        });
        let mut workflow = WorkflowBuilder::new().build(subject).unwrap();
        let context = Context::root();
        WorkflowTestifier::new(registry.clone())
            .process(&mut workflow, &context)
            .await
            .unwrap();
        TaskSegregator.process(&mut workflow, &context).await.unwrap();
        let colors: HashSet<String> = workflow
            .items()
            .filter_map(|task| workflow.node(task).annotation.color.clone())
            .collect();
        assert_eq!(colors.len(), 2);
        TaskRanker.process(&mut workflow, &context).await.unwrap();
        BasicExecutor.execute(&workflow, &context).await.unwrap();
        // both tests passed and registered themselves
        let passed = registry.gather().unwrap();
        assert_eq!(passed.len(), 2);
        // nothing leaked into the uncolored environment
        assert!(!sandbox.check("in"));
        assert!(!sandbox.check("out"));
    }
}
