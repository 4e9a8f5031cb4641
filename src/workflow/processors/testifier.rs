// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Test projection.
//!
//! The testifier replaces the workflow with a workflow that *tests* the
//! original one. Every scenario found in a node's `tests` annotation
//! becomes a [`Test`] task; the scenario's stubbing choices are walked
//! transitively to produce [`Stub`] tasks for upstream dependencies. Tests
//! whose stubbing choices conflict (the same dependency stubbed two
//! different ways) cannot share an environment, so the tests are
//! partitioned into conflict-free groups; each group gets a color, and all
//! task and target names in the group get a color-derived suffix, giving
//! every group its own name-space. Apply [`super::TaskSegregator`]
//! afterwards to isolate the environments at run time.
//!
//! Annotations are not preserved — testify before annotating processors run.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;

use crate::condition::{Condition, ConditionRef, Expr, Symbol};
use crate::errors::{Error, Result};
use crate::graph::{GreedyPartitioner, Partition, Partitioner};
use crate::helpers::sha1_hex;
use crate::runtime::Context;
use crate::storage::Storage;
use crate::task::{Requisite, Task, TaskRef};
use crate::testing::{AllTestSelector, ScenarioRef, Stub, Test, TestSelector};
use crate::workflow::{Workflow, WorkflowProcessor};

/// A processor that transforms the workflow into its auto-testing
/// projection.
pub struct WorkflowTestifier {
    registry: Arc<dyn Storage>,
    selector: Arc<dyn TestSelector>,
}

impl WorkflowTestifier {
    /// Testify with the given registry (where passed tests are recorded; it
    /// can safely share a storage with the target cache) and the default
    /// "all available" selector.
    pub fn new(registry: Arc<dyn Storage>) -> Self {
        Self {
            registry,
            selector: Arc::new(AllTestSelector),
        }
    }

    pub fn with_selector(mut self, selector: Arc<dyn TestSelector>) -> Self {
        self.selector = selector;
        self
    }
}

#[async_trait]
impl WorkflowProcessor for WorkflowTestifier {
    async fn process(&self, workflow: &mut Workflow, _context: &Context) -> Result<()> {
        let mut subjects: Vec<TaskRef> = workflow.items().cloned().collect();
        subjects.sort();
        let mut tests: Vec<(TaskRef, ScenarioRef, TaskRef)> = Vec::new();
        for subject in &subjects {
            for scenario in self.selector.select(workflow, subject) {
                let test = TaskRef::new(Test::new(
                    scenario.clone(),
                    subject.clone(),
                    self.registry.clone(),
                ));
                tests.push((test, scenario, subject.clone()));
            }
        }
        tracing::debug!("collected {} tests", tests.len());
        let mut items: Vec<(TaskRef, HashMap<TaskRef, Substitute>)> = Vec::new();
        for (test, scenario, subject) in tests {
            let substitution = find_substitution(&test, &scenario, &subject, workflow)?;
            items.push((test, substitution));
        }
        let partitions = GreedyPartitioner.partition(items);
        tracing::debug!("split tests into {} groups", partitions.len());
        let origin = workflow.duplicate();
        let residents: Vec<TaskRef> = workflow.items().cloned().collect();
        workflow.remove(residents);
        for partition in partitions {
            project(&origin, partition, workflow);
        }
        Ok(())
    }
}

// What a subject is replaced with inside one test's closure: its test, or a
// stub of it. Equality is by the replacement task, which is what makes two
// tests conflict iff they disagree on a stub.
#[derive(Clone)]
struct Substitute {
    task: TaskRef,
    scenario: ScenarioRef,
    test: bool,
}

impl PartialEq for Substitute {
    fn eq(&self, other: &Self) -> bool {
        self.task == other.task
    }
}

fn find_substitution(
    test: &TaskRef,
    scenario: &ScenarioRef,
    subject: &TaskRef,
    workflow: &Workflow,
) -> Result<HashMap<TaskRef, Substitute>> {
    let mut result = HashMap::from([(
        subject.clone(),
        Substitute {
            task: test.clone(),
            scenario: scenario.clone(),
            test: true,
        },
    )]);
    let mut stack: Vec<(ScenarioRef, TaskRef)> = Vec::new();
    handle(scenario, subject, workflow, &mut stack)?;
    while let Some((scenario, subject)) = stack.pop() {
        if let Some(existing) = result.get(&subject) {
            if existing.scenario == scenario {
                continue;
            }
            return Err(Error::WorkflowTestification(format!(
                "test `{test}` requires two different stubs for `{subject}`: \
                 `{}` and `{scenario}`",
                existing.scenario
            )));
        }
        let stub = TaskRef::new(Stub::new(scenario.clone(), subject.clone()));
        result.insert(
            subject.clone(),
            Substitute {
                task: stub,
                scenario: scenario.clone(),
                test: false,
            },
        );
        handle(&scenario, &subject, workflow, &mut stack)?;
    }
    Ok(result)
}

fn handle(
    scenario: &ScenarioRef,
    subject: &TaskRef,
    workflow: &Workflow,
    stack: &mut Vec<(ScenarioRef, TaskRef)>,
) -> Result<()> {
    let dependencies: HashSet<TaskRef> = workflow
        .node(subject)
        .parents
        .iter()
        .map(|parent| workflow.node(parent).item.clone())
        .collect();
    let stubs = scenario.stub(subject, &dependencies);
    let extra: Vec<&TaskRef> = stubs
        .keys()
        .filter(|dependency| !dependencies.contains(*dependency))
        .collect();
    if !extra.is_empty() {
        return Err(Error::WorkflowTestification(format!(
            "scenario `{scenario}` for subject `{subject}` stubs extra dependencies:{}",
            crate::helpers::render(extra)
        )));
    }
    for (dependency, stub_scenario) in stubs {
        stack.push((stub_scenario, dependency));
    }
    Ok(())
}

fn project(
    origin: &Workflow,
    partition: Partition<TaskRef, TaskRef, Substitute>,
    result: &mut Workflow,
) {
    let mut names: Vec<String> = partition
        .items
        .iter()
        .map(|test| test.name())
        .collect();
    names.sort();
    let color = sha1_hex(&names.join("\n"))[..8].to_string();
    let suffix = format!(" #{color}");
    let mut substitution: HashMap<TaskRef, (TaskRef, bool)> = HashMap::new();
    for (subject, substitute) in &partition.mapping {
        let suffixed = TaskRef::new(SuffixingTaskWrapper {
            base: substitute.task.clone(),
            suffix: suffix.clone(),
        });
        result.add(suffixed.clone());
        result.node_mut(&suffixed).annotation.color = Some(color.clone());
        substitution.insert(subject.clone(), (suffixed, substitute.test));
    }
    for subject in partition.mapping.keys() {
        let (replacement, _) = &substitution[subject];
        for parent in &origin.node(subject).parents {
            let Some((parent_replacement, parent_is_test)) = substitution.get(parent) else {
                continue;
            };
            if *parent_is_test {
                continue;
            }
            result.link(parent_replacement, replacement);
        }
    }
}

/// A task wrapper that appends a suffix to the names of the base task and
/// its target.
pub struct SuffixingTaskWrapper {
    base: TaskRef,
    suffix: String,
}

#[async_trait]
impl Task for SuffixingTaskWrapper {
    fn name(&self) -> String {
        format!("{}{}", self.base.name(), self.suffix)
    }

    fn requisite(&self) -> Requisite {
        self.base.requisite()
    }

    fn target(&self) -> Option<ConditionRef> {
        self.base.target().map(|target| {
            ConditionRef::new(SuffixingConditionWrapper {
                base: target,
                suffix: self.suffix.clone(),
            })
        })
    }

    fn phony(&self) -> bool {
        self.base.phony()
    }

    async fn execute(&self, context: &Context) -> Result<()> {
        self.base.execute(context).await
    }

    fn unwrap(&self) -> Option<TaskRef> {
        Some(self.base.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A condition wrapper that appends a suffix to the name of the base
/// condition — and, transitively, to its expression and invariants, so that
/// differently-colored projections never share a symbol.
pub struct SuffixingConditionWrapper {
    base: ConditionRef,
    suffix: String,
}

#[async_trait]
impl Condition for SuffixingConditionWrapper {
    fn name(&self) -> String {
        format!("{}{}", self.base.name(), self.suffix)
    }

    async fn check(&self, context: &Context) -> Result<bool> {
        self.base.check(context).await
    }

    fn expression(&self) -> Option<Expr> {
        let base = self.base.expression()?;
        let substitution: HashMap<Symbol, Expr> = base
            .atoms()
            .into_iter()
            .filter_map(|atom| {
                let condition = ConditionRef::from_symbol(&atom).ok()?;
                let suffixed = ConditionRef::new(SuffixingConditionWrapper {
                    base: condition,
                    suffix: self.suffix.clone(),
                });
                Some((atom, Expr::atom(suffixed.symbol())))
            })
            .collect();
        Some(base.substitute(&substitution))
    }

    fn invariants(&self) -> Vec<ConditionRef> {
        self.base
            .invariants()
            .into_iter()
            .map(|invariant| {
                ConditionRef::new(SuffixingConditionWrapper {
                    base: invariant,
                    suffix: self.suffix.clone(),
                })
            })
            .collect()
    }

    fn unwrap(&self) -> Option<ConditionRef> {
        Some(self.base.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;
    use crate::task::testkit::Probe;
    use crate::testing::DefaultScenario;
    use crate::workflow::WorkflowBuilder;

    // runs the subject as-is, but insists on a particular stub for "B"
    struct Picky {
        label: String,
        wants: String,
    }

    #[async_trait]
    impl crate::testing::Scenario for Picky {
        fn name(&self) -> String {
            self.label.clone()
        }

        async fn run(&self, subject: &TaskRef, context: &Context) -> Result<()> {
            subject.execute(context).await
        }

        fn stub(
            &self,
            _subject: &TaskRef,
            dependencies: &HashSet<TaskRef>,
        ) -> HashMap<TaskRef, ScenarioRef> {
            dependencies
                .iter()
                .map(|dependency| {
                    let scenario = if dependency.name() == "B" {
                        ScenarioRef::new(Mock {
                            label: self.wants.clone(),
                        })
                    } else {
                        ScenarioRef::new(DefaultScenario)
                    };
                    (dependency.clone(), scenario)
                })
                .collect()
        }
    }

    // replaces the subject's work with nothing at all
    struct Mock {
        label: String,
    }

    #[async_trait]
    impl crate::testing::Scenario for Mock {
        fn name(&self) -> String {
            format!("Mock({})", self.label)
        }

        async fn run(&self, _subject: &TaskRef, _context: &Context) -> Result<()> {
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

    fn registry() -> Arc<dyn Storage> {
        Arc::new(InMemoryStorage::new())
    }

    #[tokio::test]
    async fn test_conflicting_tests_split_into_colors() {
        let left = Probe::phony("A").build();
        let right = Probe::phony("B").build();
        let subject = Probe::phony("C").after(&left).after(&right).build();
        let mut workflow = WorkflowBuilder::new().build(subject.clone()).unwrap();
        workflow.node_mut(&subject).annotation.tests = vec![
            ScenarioRef::new(Picky {
                label: "First".into(),
                wants: "x".into(),
            }),
            ScenarioRef::new(Picky {
                label: "Second".into(),
                wants: "y".into(),
            }),
        ];
        WorkflowTestifier::new(registry())
            .process(&mut workflow, &Context::root())
            .await
            .unwrap();
        // two groups of three (test + two stubs), each in its own name-space
        assert_eq!(workflow.len(), 6);
        let colors: HashSet<String> = workflow
            .items()
            .map(|task| {
                workflow
                    .node(task)
                    .annotation
                    .color
                    .clone()
                    .expect("every projected task is colored")
            })
            .collect();
        assert_eq!(colors.len(), 2);
        for task in workflow.items() {
            let color = workflow.node(task).annotation.color.clone().unwrap();
            assert!(task.name().ends_with(&format!(" #{color}")));
        }
        // stubs feed the test, tests feed nobody
        for task in workflow.items() {
            let node = workflow.node(task);
            if task.name().starts_with("Test(") {
                assert!(node.children.is_empty());
                assert_eq!(node.parents.len(), 2);
            }
        }
    }

    #[tokio::test]
    async fn test_disjoint_tests_share_a_color() {
        // two independent subjects: their test closures cannot conflict
        let left = Probe::phony("A").build();
        let right = Probe::phony("X").build();
        let root = Probe::phony("R").after(&left).after(&right).build();
        let mut workflow = WorkflowBuilder::new().build(root.clone()).unwrap();
        workflow.node_mut(&left).annotation.tests =
            vec![ScenarioRef::new(DefaultScenario)];
        workflow.node_mut(&right).annotation.tests =
            vec![ScenarioRef::new(DefaultScenario)];
        WorkflowTestifier::new(registry())
            .process(&mut workflow, &Context::root())
            .await
            .unwrap();
        assert_eq!(workflow.len(), 2);
        let colors: HashSet<Option<String>> = workflow
            .items()
            .map(|task| workflow.node(task).annotation.color.clone())
            .collect();
        assert_eq!(colors.len(), 1);
    }

    #[tokio::test]
    async fn test_transitive_stub_conflicts_are_errors() {
        // C depends on both B and D; B depends on D as well. The scenario
        // stubs D one way directly and another way through B.
        struct Inconsistent;

        #[async_trait]
        impl crate::testing::Scenario for Inconsistent {
            fn name(&self) -> String {
                "Inconsistent".into()
            }

            async fn run(&self, _subject: &TaskRef, _context: &Context) -> Result<()> {
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
                        let label = if dependency.name() == "D" { "direct" } else { "nested" };
                        (
                            dependency.clone(),
                            ScenarioRef::new(Weird {
                                label: label.into(),
                            }),
                        )
                    })
                    .collect()
            }
        }

        struct Weird {
            label: String,
        }

        #[async_trait]
        impl crate::testing::Scenario for Weird {
            fn name(&self) -> String {
                format!("Weird({})", self.label)
            }

            async fn run(&self, _subject: &TaskRef, _context: &Context) -> Result<()> {
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
                            ScenarioRef::new(Weird {
                                label: "nested-deeper".into(),
                            }),
                        )
                    })
                    .collect()
            }
        }

        let deep = Probe::phony("D").build();
        let middle = Probe::phony("B").after(&deep).build();
        let subject = Probe::phony("C").after(&middle).after(&deep).build();
        let mut workflow = WorkflowBuilder::new().build(subject.clone()).unwrap();
        workflow.node_mut(&subject).annotation.tests = vec![ScenarioRef::new(Inconsistent)];
        let error = WorkflowTestifier::new(registry())
            .process(&mut workflow, &Context::root())
            .await
            .unwrap_err();
        assert!(matches!(error, Error::WorkflowTestification(_)));
    }

    #[tokio::test]
    async fn test_extraneous_stubs_are_errors() {
        struct Overreaching;

        #[async_trait]
        impl crate::testing::Scenario for Overreaching {
            fn name(&self) -> String {
                "Overreaching".into()
            }

            async fn run(&self, _subject: &TaskRef, _context: &Context) -> Result<()> {
                Ok(())
            }

            fn stub(
                &self,
                _subject: &TaskRef,
                _dependencies: &HashSet<TaskRef>,
            ) -> HashMap<TaskRef, ScenarioRef> {
                HashMap::from([(
                    Probe::phony("Stranger").build(),
                    ScenarioRef::new(DefaultScenario),
                )])
            }
        }

        let subject = Probe::phony("C").build();
        let mut workflow = WorkflowBuilder::new().build(subject.clone()).unwrap();
        workflow.node_mut(&subject).annotation.tests = vec![ScenarioRef::new(Overreaching)];
        let error = WorkflowTestifier::new(registry())
            .process(&mut workflow, &Context::root())
            .await
            .unwrap_err();
        assert!(matches!(error, Error::WorkflowTestification(_)));
    }
}
