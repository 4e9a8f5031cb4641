// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! A small DPLL satisfiability solver.
//!
//! The normalizer only ever feeds it the compact formulas produced by atom
//! partitioning, so plain unit propagation + pure-literal elimination +
//! chronological backtracking is enough.

use std::collections::HashMap;

use crate::condition::expr::{Clause, Expr, Literal, Symbol};

/// Find a model of the formula, if one exists.
///
/// The returned assignment covers every atom of the formula (atoms the
/// search never constrained default to false).
pub fn satisfiable(formula: &Expr) -> Option<HashMap<Symbol, bool>> {
    let clauses = formula.to_clauses();
    let mut assignment = dpll(clauses)?;
    for atom in formula.atoms() {
        assignment.entry(atom).or_insert(false);
    }
    Some(assignment)
}

fn dpll(mut clauses: Vec<Clause>) -> Option<HashMap<Symbol, bool>> {
    let mut assignment: HashMap<Symbol, bool> = HashMap::new();
    loop {
        if clauses.is_empty() {
            return Some(assignment);
        }
        if clauses.iter().any(|clause| clause.is_empty()) {
            return None;
        }
        // unit propagation
        if let Some(unit) = clauses
            .iter()
            .find(|clause| clause.len() == 1)
            .and_then(|clause| clause.iter().next().cloned())
        {
            assignment.insert(unit.symbol.clone(), !unit.negated);
            clauses = reduce(clauses, &unit);
            continue;
        }
        // pure literal elimination
        if let Some(pure) = find_pure_literal(&clauses) {
            assignment.insert(pure.symbol.clone(), !pure.negated);
            clauses = reduce(clauses, &pure);
            continue;
        }
        break;
    }
    // branch on the first literal of the first clause; a failed branch
    // leaves no trace in the assignment
    let pivot = clauses[0].iter().next().cloned().unwrap();
    for negated in [pivot.negated, !pivot.negated] {
        let guess = Literal {
            symbol: pivot.symbol.clone(),
            negated,
        };
        if let Some(branch) = dpll(reduce(clauses.clone(), &guess)) {
            assignment.extend(branch);
            assignment.insert(guess.symbol.clone(), !guess.negated);
            return Some(assignment);
        }
    }
    None
}

// Apply a decided literal: drop satisfied clauses, strip the complement.
fn reduce(clauses: Vec<Clause>, decided: &Literal) -> Vec<Clause> {
    let complement = Literal {
        symbol: decided.symbol.clone(),
        negated: !decided.negated,
    };
    clauses
        .into_iter()
        .filter(|clause| !clause.contains(decided))
        .map(|mut clause| {
            clause.remove(&complement);
            clause
        })
        .collect()
}

fn find_pure_literal(clauses: &[Clause]) -> Option<Literal> {
    let mut polarity: HashMap<Symbol, (bool, bool)> = HashMap::new();
    for clause in clauses {
        for literal in clause {
            let entry = polarity.entry(literal.symbol.clone()).or_insert((false, false));
            if literal.negated {
                entry.1 = true;
            } else {
                entry.0 = true;
            }
        }
    }
    polarity
        .into_iter()
        .find(|(_, (positive, negative))| positive != negative)
        .map(|(symbol, (positive, _))| Literal {
            symbol,
            negated: !positive,
        })
}
