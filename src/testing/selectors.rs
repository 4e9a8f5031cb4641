// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::task::TaskRef;
use crate::testing::ScenarioRef;
use crate::workflow::Workflow;

/// A strategy for picking which scenarios of a subject to turn into tests.
pub trait TestSelector: Send + Sync {
    /// Select the scenarios associated with the subject in the workflow.
    fn select(&self, workflow: &Workflow, subject: &TaskRef) -> Vec<ScenarioRef>;
}

/// Selects every scenario from the subject's `tests` annotation.
#[derive(Debug, Default)]
pub struct AllTestSelector;

impl TestSelector for AllTestSelector {
    fn select(&self, workflow: &Workflow, subject: &TaskRef) -> Vec<ScenarioRef> {
        workflow.node(subject).annotation.tests.clone()
    }
}

/// Selects annotated scenarios whose subject and scenario names match one of
/// the given regular-expression pairs.
///
/// Patterns anchor at the start of the name, nothing more: `Download` matches
/// `DownloadFile(path="...")`. The supported syntax is deliberately small —
/// literal text, `.` (any character), and a trailing `.*`.
pub struct RegexTestSelector {
    patterns: Vec<(String, String)>,
}

impl RegexTestSelector {
    pub fn new(patterns: Vec<(String, String)>) -> Self {
        Self { patterns }
    }

    fn matches(pattern: &str, name: &str) -> bool {
        let pattern = pattern.strip_suffix(".*").unwrap_or(pattern);
        if pattern.len() > name.len() {
            return false;
        }
        pattern
            .chars()
            .zip(name.chars())
            .all(|(expected, actual)| expected == '.' || expected == actual)
    }
}

impl TestSelector for RegexTestSelector {
    fn select(&self, workflow: &Workflow, subject: &TaskRef) -> Vec<ScenarioRef> {
        AllTestSelector
            .select(workflow, subject)
            .into_iter()
            .filter(|scenario| {
                self.patterns.iter().any(|(subject_pattern, scenario_pattern)| {
                    Self::matches(subject_pattern, &subject.name())
                        && Self::matches(scenario_pattern, &scenario.name())
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::testkit::Probe;
    use crate::testing::DefaultScenario;

    fn annotated() -> (Workflow, TaskRef) {
        let subject = Probe::phony("Annotated").build();
        let mut workflow = Workflow::new();
        workflow.add(subject.clone());
        workflow.node_mut(&subject).annotation.tests =
            vec![ScenarioRef::new(DefaultScenario)];
        (workflow, subject)
    }

    #[test]
    fn test_all_selector_reads_the_annotation() {
        let (workflow, subject) = annotated();
        let selected = AllTestSelector.select(&workflow, &subject);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].name(), "DefaultScenario");
    }

    #[test]
    fn test_regex_selector_filters_by_both_names() {
        let (workflow, subject) = annotated();
        let hit = RegexTestSelector::new(vec![("Annot.*".into(), "Default.*".into())]);
        assert_eq!(hit.select(&workflow, &subject).len(), 1);
        let miss = RegexTestSelector::new(vec![("Annot.*".into(), "Custom.*".into())]);
        assert!(miss.select(&workflow, &subject).is_empty());
        let off = RegexTestSelector::new(vec![("Other.*".into(), "Default.*".into())]);
        assert!(off.select(&workflow, &subject).is_empty());
    }
}
