// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Derivation of the joint constraint over a set of conditions.
//!
//! The workflow optimizers need to know *which combinations of targets are
//! simultaneously feasible*. This module assembles that knowledge from the
//! declared invariants and symbol/expression equivalences, then shrinks it
//! down to a formula over the symbols the caller actually cares about, so
//! that the SAT work stays small.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::condition::expr::{Expr, Symbol};
use crate::condition::ConditionRef;
use crate::errors::Result;
use crate::graph::DisjointSet;

/// Derive a symbolic expression that binds the given conditions.
///
/// The result is a constraint over the *active* symbols (the symbols of the
/// input conditions): any assignment of truth values violating it is known
/// to be infeasible.
pub fn derive_constraint(conditions: &HashSet<ConditionRef>) -> Result<Expr> {
    tracing::debug!(
        "deriving a constraint for {} conditions",
        conditions.len()
    );
    if conditions.is_empty() {
        return Ok(Expr::True);
    }
    let global_constraints = derive_global_constraints(conditions)?;
    let constraint_groups = group_by_atoms(global_constraints);
    tracing::debug!("derived {} constraint groups", constraint_groups.len());
    let active_atoms: BTreeSet<Symbol> = conditions
        .iter()
        .map(|condition| condition.symbol())
        .collect();
    let mut reduced = Vec::new();
    for group in constraint_groups {
        reduced.extend(reduce_expressions(group, &active_atoms));
    }
    Ok(Expr::and(reduced).simplified())
}

// Collect constraints reachable from the conditions via invariants and
// symbol/expression equivalences, expanding over unknown atoms to a fixed
// point.
fn derive_global_constraints(conditions: &HashSet<ConditionRef>) -> Result<Vec<Expr>> {
    let mut stack: Vec<ConditionRef> = conditions.iter().cloned().collect();
    let mut collector: BTreeSet<Symbol> = conditions
        .iter()
        .map(|condition| condition.symbol())
        .collect();
    let mut result = Vec::new();
    while let Some(condition) = stack.pop() {
        for constraint in derive_local_constraints(&condition) {
            let unknowns: Vec<Symbol> = constraint
                .atoms()
                .into_iter()
                .filter(|atom| !collector.contains(atom))
                .collect();
            for unknown in unknowns {
                stack.push(ConditionRef::from_symbol(&unknown)?);
                collector.insert(unknown);
            }
            result.push(constraint);
        }
    }
    Ok(result)
}

fn derive_local_constraints(condition: &ConditionRef) -> Vec<Expr> {
    let mut result = Vec::new();
    if let Some(expression) = condition.expression() {
        result.push(Expr::equivalent(Expr::atom(condition.symbol()), expression));
    }
    for invariant in condition.invariants() {
        result.push(Expr::atom(invariant.symbol()));
    }
    result
}

// Group the constraints so that two constraints sharing an atom land in the
// same group.
fn group_by_atoms(expressions: Vec<Expr>) -> Vec<Vec<Expr>> {
    let mut groups = DisjointSet::new(expressions.len());
    let mut atom_owners: BTreeMap<Symbol, usize> = BTreeMap::new();
    for (index, expression) in expressions.iter().enumerate() {
        for atom in expression.atoms() {
            match atom_owners.get(&atom) {
                Some(owner) => groups.merge(index, *owner),
                None => {
                    atom_owners.insert(atom, index);
                }
            }
        }
    }
    let mut grouped: BTreeMap<usize, Vec<Expr>> = BTreeMap::new();
    for (index, expression) in expressions.into_iter().enumerate() {
        grouped.entry(groups.find(index)).or_default().push(expression);
    }
    grouped.into_values().collect()
}

// Reduce a constraint group to a formula over the active atoms by
// eliminating inactive atoms one by one: substitute both truth values and
// OR the results. Cheapest atoms (by the total size of the formulas they
// occur in) go first.
fn reduce_expressions(group: Vec<Expr>, active_atoms: &BTreeSet<Symbol>) -> Vec<Expr> {
    let mut expressions: Vec<Expr> = group
        .iter()
        .map(|expression| expression.to_cnf())
        .collect();
    let mut counters: BTreeMap<Symbol, usize> = BTreeMap::new();
    for expression in &expressions {
        let atoms = expression.atoms();
        for atom in &atoms {
            if active_atoms.contains(atom) {
                continue;
            }
            *counters.entry(atom.clone()).or_default() += atoms.len();
        }
    }
    let mut elimination_order: Vec<(usize, Symbol)> = counters
        .into_iter()
        .map(|(atom, count)| (count, atom))
        .collect();
    elimination_order.sort();
    for (_, atom) in elimination_order {
        let (focused, rest): (Vec<Expr>, Vec<Expr>) = expressions
            .into_iter()
            .partition(|expression| expression.atoms().contains(&atom));
        expressions = rest;
        let focus = Expr::and(focused);
        let eliminated = Expr::or(vec![
            focus.assign(&atom, false),
            focus.assign(&atom, true),
        ])
        .to_cnf();
        expressions.push(eliminated);
    }
    expressions
}
