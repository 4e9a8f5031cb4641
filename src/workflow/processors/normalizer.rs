// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Target normalization.
//!
//! The easiest example of an unnormalized workflow is the pipeline
//! `GenerateFile` (file exists) → `UploadFile` (URL exists) → `RemoveFile`
//! (file does not exist). The first and the last targets contradict, so the
//! workflow can never be "all complete" — and the trimmer's reasoning (a
//! complete task implies complete ancestors) falls apart. The normalizer
//! detects this and corrects the targets:
//!
//! * `GenerateFile` ⇒ file exists **or** URL exists
//! * `RemoveFile` ⇒ file does not exist **and** URL exists
//!
//! The general mechanism solves a SAT instance over auxiliary variables
//! (two feasible joint assignments plus edge selectors) to decide which
//! targets to correct conjunctively and which disjunctively, then chains
//! the corrections outwards from the untouched pivot targets.
//!
//! Normalization needs enough information about the targets — provide it
//! through condition expressions and invariants. Workflows that cannot be
//! normalized deserve better target design; the processor fails on them.

use std::any::Any;
use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;

use crate::condition::expr::{Expr, Symbol};
use crate::condition::{derive_constraint, sat, ConditionRef};
use crate::errors::{Error, Result};
use crate::graph::{DfsLinearizer, Graph, Linearizer};
use crate::runtime::Context;
use crate::task::{Requisite, Task, TaskRef};
use crate::workflow::{Workflow, WorkflowProcessor};

/// A processor that attempts to "normalize" task targets, so that the set
/// of targets can be simultaneously all-true and all-false.
#[derive(Debug, Default)]
pub struct WorkflowNormalizer;

impl WorkflowNormalizer {
    /// Whether the workflow is already normalized.
    pub fn is_normal(workflow: &Workflow) -> bool {
        match graph_of_targets(workflow) {
            Err(_) => false,
            Ok(targets) => matches!(check_targets(&targets), Ok((_, true))),
        }
    }
}

#[async_trait]
impl WorkflowProcessor for WorkflowNormalizer {
    async fn process(&self, workflow: &mut Workflow, _context: &Context) -> Result<()> {
        let targets = graph_of_targets(workflow)
            .map_err(|error| Error::WorkflowNormalization(error.to_string()))?;
        let (constraint, normalized) = check_targets(&targets)?;
        if normalized {
            return Ok(());
        }
        tracing::debug!("trying to normalize the workflow");
        let corrections = correct_targets(&targets, &constraint)?;
        tracing::debug!("correcting {} targets", corrections.len());
        let tasks: Vec<TaskRef> = workflow.items().cloned().collect();
        for task in tasks {
            let Some(target) = task.target() else {
                continue;
            };
            let Some(correction) = corrections.get(&target) else {
                continue;
            };
            workflow.replace(TaskRef::new(TargetOverridingTaskWrapper::new(
                task,
                Some(correction.clone()),
            )));
        }
        Ok(())
    }
}

/// A task wrapper that overrides its target.
pub struct TargetOverridingTaskWrapper {
    base: TaskRef,
    target: Option<ConditionRef>,
}

impl TargetOverridingTaskWrapper {
    pub fn new(base: TaskRef, target: Option<ConditionRef>) -> Self {
        Self { base, target }
    }
}

#[async_trait]
impl Task for TargetOverridingTaskWrapper {
    fn name(&self) -> String {
        self.base.name()
    }

    fn requisite(&self) -> Requisite {
        self.base.requisite()
    }

    fn target(&self) -> Option<ConditionRef> {
        self.target.clone()
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

// Build the graph of unique targets: an edge u → v when a task with target
// v depends (possibly through phony tasks, whose targets pass through
// transparently) on a task with target u.
fn graph_of_targets(workflow: &Workflow) -> Result<Graph<ConditionRef, ()>> {
    let mut result: Graph<ConditionRef, ()> = Graph::new();
    let mut inherited: HashMap<TaskRef, HashSet<ConditionRef>> = HashMap::new();
    for task in DfsLinearizer.linearize(workflow)? {
        let mut parent_targets: HashSet<ConditionRef> = HashSet::new();
        for parent in &workflow.node(&task).parents {
            let parent = workflow.node(parent).item.clone();
            match parent.target() {
                Some(target) => {
                    parent_targets.insert(target);
                }
                None => {
                    if let Some(passed) = inherited.get(&parent) {
                        parent_targets.extend(passed.iter().cloned());
                    }
                }
            }
        }
        match task.target() {
            None => {
                inherited.insert(task.clone(), parent_targets);
            }
            Some(target) => {
                if !result.contains(&target) {
                    result.add(target.clone());
                }
                for parent_target in parent_targets {
                    result.link(&parent_target, &target);
                }
            }
        }
    }
    DfsLinearizer.linearize(&result)?; // no cycles among targets allowed
    Ok(result)
}

// Derive the joint constraint and see whether both extremes satisfy it.
fn check_targets(targets: &Graph<ConditionRef, ()>) -> Result<(Expr, bool)> {
    let conditions: HashSet<ConditionRef> = targets.items().cloned().collect();
    let constraint = derive_constraint(&conditions)?;
    let atoms = constraint.atoms();
    let extreme = |value: bool| {
        let mut cursor = constraint.clone();
        for atom in &atoms {
            cursor = cursor.assign(atom, value);
        }
        cursor.simplified().is_true()
    };
    let normalized = extreme(true) && extreme(false);
    Ok((constraint, normalized))
}

// Decide which targets to correct, and how, by solving the auxiliary SAT.
fn correct_targets(
    targets: &Graph<ConditionRef, ()>,
    constraint: &Expr,
) -> Result<HashMap<ConditionRef, ConditionRef>> {
    let order = DfsLinearizer.linearize(targets)?;
    let indices: HashMap<ConditionRef, usize> = order
        .iter()
        .enumerate()
        .map(|(index, target)| (target.clone(), index))
        .collect();
    let constraint_atoms = constraint.atoms();
    let pivot: HashSet<ConditionRef> = order
        .iter()
        .filter(|target| !constraint_atoms.contains(&target.symbol()))
        .cloned()
        .collect();
    let roots: HashSet<ConditionRef> = order
        .iter()
        .filter(|target| targets.node(target).parents.is_empty())
        .cloned()
        .collect();
    let leafs: HashSet<ConditionRef> = order
        .iter()
        .filter(|target| targets.node(target).children.is_empty())
        .cloned()
        .collect();
    let alpha: HashMap<ConditionRef, [Symbol; 2]> = order
        .iter()
        .filter(|target| !pivot.contains(target))
        .map(|target| {
            let index = indices[target];
            (
                target.clone(),
                [
                    Symbol::new(&format!("alpha/{index}/0")),
                    Symbol::new(&format!("alpha/{index}/1")),
                ],
            )
        })
        .collect();
    let gamma = |from: &ConditionRef, to: &ConditionRef| {
        Symbol::new(&format!("gamma/{}-{}", indices[from], indices[to]))
    };
    // two joint assignments satisfying the constraints
    let project = |slot: usize| {
        let substitution: HashMap<Symbol, Expr> = alpha
            .iter()
            .map(|(target, symbols)| (target.symbol(), Expr::atom(symbols[slot].clone())))
            .collect();
        constraint.substitute(&substitution)
    };
    let mut conjuncts = vec![project(0), project(1)];
    for (target, symbols) in &alpha {
        // if incomplete, some parent is incomplete too
        let parents = targets
            .node(target)
            .parents
            .iter()
            .map(|parent| Expr::not(Expr::atom(gamma(parent, target))))
            .collect();
        conjuncts.push(Expr::or(vec![
            Expr::not(Expr::atom(symbols[0].clone())),
            Expr::or(parents),
        ]));
        // if complete, some child is complete too
        let children = targets
            .node(target)
            .children
            .iter()
            .map(|child| Expr::atom(gamma(target, child)))
            .collect();
        conjuncts.push(Expr::or(vec![
            Expr::atom(symbols[1].clone()),
            Expr::or(children),
        ]));
        // the incomplete projection implies the complete one
        conjuncts.push(Expr::or(vec![
            Expr::not(Expr::atom(symbols[0].clone())),
            Expr::atom(symbols[1].clone()),
        ]));
    }
    let mut pinning: HashMap<Symbol, Expr> = HashMap::new();
    for (target, symbols) in &alpha {
        if roots.contains(target) {
            pinning.insert(symbols[0].clone(), Expr::False);
        }
        if leafs.contains(target) {
            pinning.insert(symbols[1].clone(), Expr::True);
        }
    }
    let objective = Expr::and(conjuncts).substitute(&pinning);
    tracing::debug!(
        "solving SAT with {} variables",
        objective.atoms().len()
    );
    let Some(solution) = sat::satisfiable(&objective) else {
        return Err(Error::WorkflowNormalization(format!(
            "SAT has no solutions: {objective}"
        )));
    };
    let valued = |symbol: &Symbol| solution.get(symbol).copied().unwrap_or(false);
    // conjunctively correctable targets
    let mut ccts: HashSet<ConditionRef> = alpha
        .iter()
        .filter(|(target, symbols)| !roots.contains(*target) && valued(&symbols[0]))
        .map(|(target, _)| target.clone())
        .collect();
    // disjunctively correctable targets
    let mut dcts: HashSet<ConditionRef> = alpha
        .iter()
        .filter(|(target, symbols)| !leafs.contains(*target) && !valued(&symbols[1]))
        .map(|(target, _)| target.clone())
        .collect();
    let corrections = chain_corrections(targets, &mut ccts, &mut dcts);
    if !ccts.is_empty() || !dcts.is_empty() {
        let leftovers: Vec<ConditionRef> = ccts.union(&dcts).cloned().collect();
        return Err(Error::WorkflowNormalization(format!(
            "some target corrections are not feasible:{}",
            crate::helpers::render(&leftovers)
        )));
    }
    Ok(corrections)
}

// Propagate corrections outwards from the pivot: a conjunctively
// correctable child picks up its parent's correction, a disjunctively
// correctable parent picks up its child's.
fn chain_corrections(
    targets: &Graph<ConditionRef, ()>,
    ccts: &mut HashSet<ConditionRef>,
    dcts: &mut HashSet<ConditionRef>,
) -> HashMap<ConditionRef, ConditionRef> {
    let pivot: Vec<ConditionRef> = targets
        .items()
        .filter(|target| !ccts.contains(target) && !dcts.contains(target))
        .cloned()
        .collect();
    let mut result: HashMap<ConditionRef, ConditionRef> = pivot
        .iter()
        .map(|target| (target.clone(), target.clone()))
        .collect();
    let mut queue: VecDeque<ConditionRef> = pivot.iter().cloned().collect();
    while let Some(target) = queue.pop_front() {
        let correction = result[&target].clone();
        for child in &targets.node(&target).children {
            if ccts.remove(child) {
                result.insert(child.clone(), child.and(&correction));
                queue.push_back(child.clone());
            }
        }
        for parent in &targets.node(&target).parents {
            if dcts.remove(parent) {
                result.insert(parent.clone(), parent.or(&correction));
                queue.push_back(parent.clone());
            }
        }
    }
    result
        .into_iter()
        .filter(|(target, correction)| target != correction)
        .collect()
}
