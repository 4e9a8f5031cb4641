// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Speculative workflow trimming.
//!
//! The trimmer removes completed prefixes (and skips known-infeasible
//! suffixes) by checking a few well-chosen targets instead of all of them.
//! It relies on the normalized-workflow property: a complete task implies
//! complete ancestors, an incomplete task implies incomplete descendants.
//!
//! Candidates are examined in descending *volume* — ancestors × descendants
//! plus the larger of the two — so one check cuts as much of the graph as
//! possible. Ancestor/descendant *signatures* (representative node indices
//! propagated along the graph) suppress checks that a previous black- or
//! white-listing already made redundant. The loop repeats until a round
//! produces no new information.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use crate::errors::Result;
use crate::graph::{DfsLinearizer, Direction, Graph, Linearizer};
use crate::helpers::sha1_hex;
use crate::runtime::Context;
use crate::task::TaskRef;
use crate::workflow::{Workflow, WorkflowProcessor};

/// A workflow optimizer that trims the graph using task targets.
///
/// Apply [`super::WorkflowNormalizer`] first: the trick only works for
/// normalized workflows.
#[derive(Debug, Default)]
pub struct WorkflowTrimmer;

#[derive(Clone, Debug, Default)]
struct Mark {
    ancestor_signature: Option<usize>,
    ancestor_count: u64,
    descendant_signature: Option<usize>,
    descendant_count: u64,
    volume: u64,
}

#[async_trait]
impl WorkflowProcessor for WorkflowTrimmer {
    async fn process(&self, workflow: &mut Workflow, context: &Context) -> Result<()> {
        tracing::debug!("tasks before trimming: {}", workflow.len());
        let tasks = DfsLinearizer.linearize(workflow)?;
        let hashes: Vec<String> = tasks
            .iter()
            .map(|task| sha1_hex(&task.name()))
            .collect();
        let indices: HashMap<TaskRef, usize> = tasks
            .iter()
            .enumerate()
            .map(|(index, task)| (task.clone(), index))
            .collect();
        let mut linearization: Vec<usize> = (0..tasks.len()).collect();
        let mut candidates: Graph<usize, Mark> = Graph::new();
        for &index in &linearization {
            candidates.add(index);
            for parent in &workflow.node(&tasks[index]).parents {
                candidates.link(&indices[parent], &index);
            }
        }
        loop {
            context.checkpoint()?;
            for &index in &linearization {
                let parents = candidates.node(&index).parents.clone();
                if parents.is_empty() {
                    let mark = &mut candidates.node_mut(&index).annotation;
                    mark.ancestor_signature = None;
                    mark.ancestor_count = 0;
                    continue;
                }
                let mut counters: HashMap<usize, u64> = HashMap::new();
                for &parent in &parents {
                    let mark = &candidates.node(&parent).annotation;
                    if let Some(signature) = mark.ancestor_signature {
                        let count = counters.entry(signature).or_insert(0);
                        *count = (*count).max(mark.ancestor_count);
                    }
                }
                let signature = counters
                    .keys()
                    .copied()
                    .chain(parents.iter().copied())
                    .min_by_key(|&signature| &hashes[signature])
                    .unwrap();
                let count = parents.len() as u64 + counters.values().sum::<u64>();
                let mark = &mut candidates.node_mut(&index).annotation;
                mark.ancestor_signature = Some(signature);
                mark.ancestor_count = count;
            }
            for &index in linearization.iter().rev() {
                let children = candidates.node(&index).children.clone();
                if children.is_empty() {
                    let mark = &mut candidates.node_mut(&index).annotation;
                    mark.descendant_signature = None;
                    mark.descendant_count = 0;
                    continue;
                }
                let mut counters: HashMap<usize, u64> = HashMap::new();
                for &child in &children {
                    let mark = &candidates.node(&child).annotation;
                    if let Some(signature) = mark.descendant_signature {
                        let count = counters.entry(signature).or_insert(0);
                        *count = (*count).max(mark.descendant_count);
                    }
                }
                let signature = counters
                    .keys()
                    .copied()
                    .chain(children.iter().copied())
                    .min_by_key(|&signature| &hashes[signature])
                    .unwrap();
                let count = children.len() as u64 + counters.values().sum::<u64>();
                let mark = &mut candidates.node_mut(&index).annotation;
                mark.descendant_signature = Some(signature);
                mark.descendant_count = count;
            }
            for &index in &linearization {
                let mark = &mut candidates.node_mut(&index).annotation;
                let (ancestors, descendants) = (mark.ancestor_count, mark.descendant_count);
                mark.volume = ancestors * descendants + ancestors.max(descendants);
            }
            let mut victims = linearization.clone();
            victims.sort_by_key(|&index| {
                std::cmp::Reverse(candidates.node(&index).annotation.volume)
            });
            let mut black: HashSet<usize> = HashSet::new();
            let mut white: HashSet<usize> = HashSet::new();
            for victim in victims {
                let mark = candidates.node(&victim).annotation.clone();
                if mark.volume < 3 {
                    break;
                }
                let Some(target) = tasks[victim].target() else {
                    continue;
                };
                let dead = black.contains(&victim)
                    || white.contains(&victim)
                    || mark
                        .ancestor_signature
                        .is_some_and(|signature| black.contains(&signature))
                    || mark
                        .descendant_signature
                        .is_some_and(|signature| white.contains(&signature));
                if dead {
                    continue;
                }
                tracing::debug!("cutting at `{target}` of volume {}", mark.volume);
                match target.check(context).await {
                    Err(error) if error.is_interruption() => return Err(error),
                    Err(error) => {
                        tracing::warn!("failed to check `{target}`: {error}");
                    }
                    Ok(true) => {
                        tracing::debug!("blacklisting ancestors");
                        black.insert(victim);
                        black.extend(candidates.trace(&victim, Direction::Ancestors));
                    }
                    Ok(false) => {
                        tracing::debug!("whitelisting descendants");
                        white.insert(victim);
                        white.extend(candidates.trace(&victim, Direction::Descendants));
                    }
                }
            }
            if black.is_empty() && white.is_empty() {
                break;
            }
            candidates.remove(black.union(&white).copied());
            linearization.retain(|index| candidates.contains(index));
            workflow.remove(black.iter().map(|&index| tasks[index].clone()));
            tracing::debug!("tasks left: {}", workflow.len());
        }
        tracing::debug!("tasks after trimming: {}", workflow.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::testkit::Constant;
    use crate::task::testkit::Probe;
    use crate::workflow::WorkflowBuilder;

    fn chain(prefix: &str, count: usize, completed: usize) -> (Vec<TaskRef>, Workflow) {
        let mut tasks: Vec<TaskRef> = Vec::new();
        for index in 0..count {
            let target = Constant::of(
                &format!("{prefix}/Exists({index})"),
                index < completed,
            );
            let mut probe = Probe::phony(&format!("{prefix}/Link({index})")).aiming(&target);
            if let Some(previous) = tasks.last() {
                probe = probe.after(previous);
            }
            tasks.push(probe.build());
        }
        let workflow = WorkflowBuilder::new()
            .build(tasks.last().unwrap().clone())
            .unwrap();
        (tasks, workflow)
    }

    #[tokio::test]
    async fn test_completed_prefix_gets_trimmed() {
        let (tasks, mut workflow) = chain("trim", 5, 3);
        WorkflowTrimmer
            .process(&mut workflow, &Context::root())
            .await
            .unwrap();
        // the incomplete suffix always survives
        assert!(workflow.contains(&tasks[3]));
        assert!(workflow.contains(&tasks[4]));
        // at least the deep prefix is gone
        assert!(!workflow.contains(&tasks[0]));
        assert!(!workflow.contains(&tasks[1]));
    }

    #[tokio::test]
    async fn test_fully_pending_chain_survives() {
        let (tasks, mut workflow) = chain("trim-pending", 5, 0);
        WorkflowTrimmer
            .process(&mut workflow, &Context::root())
            .await
            .unwrap();
        assert_eq!(workflow.len(), tasks.len());
    }

    #[tokio::test]
    async fn test_small_workflows_are_left_alone() {
        let (tasks, mut workflow) = chain("trim-small", 2, 2);
        WorkflowTrimmer
            .process(&mut workflow, &Context::root())
            .await
            .unwrap();
        // volumes never reach the cutting threshold
        assert_eq!(workflow.len(), tasks.len());
    }
}
