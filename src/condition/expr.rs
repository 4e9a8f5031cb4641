// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Symbolic boolean formulas over condition symbols.
//!
//! This is the little algebra the normalizer and the trimmer reason with:
//! formulas support substitution, constant folding, and conversion to CNF
//! (as clause sets for the SAT solver). Formulas stay small in practice —
//! the constraint deriver partitions them by shared atoms before anything
//! expensive happens.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// An interned-by-name propositional symbol.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(Arc<str>);

impl Symbol {
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// A literal: a symbol or its negation.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Literal {
    pub symbol: Symbol,
    pub negated: bool,
}

/// A disjunction of literals.
pub type Clause = BTreeSet<Literal>;

/// A symbolic boolean formula.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Expr {
    True,
    False,
    Atom(Symbol),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Xor(Vec<Expr>),
    Implies(Box<Expr>, Box<Expr>),
    Equivalent(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn atom(symbol: Symbol) -> Self {
        Expr::Atom(symbol)
    }

    pub fn not(operand: Expr) -> Self {
        Expr::Not(Box::new(operand))
    }

    pub fn and(operands: Vec<Expr>) -> Self {
        Expr::And(operands)
    }

    pub fn or(operands: Vec<Expr>) -> Self {
        Expr::Or(operands)
    }

    pub fn implies(cause: Expr, effect: Expr) -> Self {
        Expr::Implies(Box::new(cause), Box::new(effect))
    }

    pub fn equivalent(left: Expr, right: Expr) -> Self {
        Expr::Equivalent(Box::new(left), Box::new(right))
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Expr::True)
    }

    pub fn is_false(&self) -> bool {
        matches!(self, Expr::False)
    }

    /// All symbols occurring in the formula.
    pub fn atoms(&self) -> BTreeSet<Symbol> {
        let mut result = BTreeSet::new();
        self.collect_atoms(&mut result);
        result
    }

    fn collect_atoms(&self, into: &mut BTreeSet<Symbol>) {
        match self {
            Expr::True | Expr::False => {}
            Expr::Atom(symbol) => {
                into.insert(symbol.clone());
            }
            Expr::Not(operand) => operand.collect_atoms(into),
            Expr::And(operands) | Expr::Or(operands) | Expr::Xor(operands) => {
                for operand in operands {
                    operand.collect_atoms(into);
                }
            }
            Expr::Implies(left, right) | Expr::Equivalent(left, right) => {
                left.collect_atoms(into);
                right.collect_atoms(into);
            }
        }
    }

    /// Replace atoms according to the substitution map.
    pub fn substitute(&self, substitution: &HashMap<Symbol, Expr>) -> Expr {
        match self {
            Expr::True | Expr::False => self.clone(),
            Expr::Atom(symbol) => substitution
                .get(symbol)
                .cloned()
                .unwrap_or_else(|| self.clone()),
            Expr::Not(operand) => Expr::not(operand.substitute(substitution)),
            Expr::And(operands) => Expr::And(
                operands
                    .iter()
                    .map(|operand| operand.substitute(substitution))
                    .collect(),
            ),
            Expr::Or(operands) => Expr::Or(
                operands
                    .iter()
                    .map(|operand| operand.substitute(substitution))
                    .collect(),
            ),
            Expr::Xor(operands) => Expr::Xor(
                operands
                    .iter()
                    .map(|operand| operand.substitute(substitution))
                    .collect(),
            ),
            Expr::Implies(left, right) => Expr::implies(
                left.substitute(substitution),
                right.substitute(substitution),
            ),
            Expr::Equivalent(left, right) => Expr::equivalent(
                left.substitute(substitution),
                right.substitute(substitution),
            ),
        }
    }

    /// Replace a single atom with a constant.
    pub fn assign(&self, symbol: &Symbol, value: bool) -> Expr {
        let constant = if value { Expr::True } else { Expr::False };
        self.substitute(&HashMap::from([(symbol.clone(), constant)]))
    }

    /// Fold constants without otherwise changing the structure.
    pub fn simplified(&self) -> Expr {
        match self {
            Expr::True | Expr::False | Expr::Atom(_) => self.clone(),
            Expr::Not(operand) => match operand.simplified() {
                Expr::True => Expr::False,
                Expr::False => Expr::True,
                Expr::Not(inner) => *inner,
                other => Expr::not(other),
            },
            Expr::And(operands) => {
                let mut folded = Vec::new();
                for operand in operands {
                    match operand.simplified() {
                        Expr::True => {}
                        Expr::False => return Expr::False,
                        Expr::And(inner) => folded.extend(inner),
                        other => folded.push(other),
                    }
                }
                match folded.len() {
                    0 => Expr::True,
                    1 => folded.pop().unwrap(),
                    _ => Expr::And(folded),
                }
            }
            Expr::Or(operands) => {
                let mut folded = Vec::new();
                for operand in operands {
                    match operand.simplified() {
                        Expr::False => {}
                        Expr::True => return Expr::True,
                        Expr::Or(inner) => folded.extend(inner),
                        other => folded.push(other),
                    }
                }
                match folded.len() {
                    0 => Expr::False,
                    1 => folded.pop().unwrap(),
                    _ => Expr::Or(folded),
                }
            }
            Expr::Xor(operands) => {
                let mut parity = false;
                let mut folded = Vec::new();
                for operand in operands {
                    match operand.simplified() {
                        Expr::True => parity = !parity,
                        Expr::False => {}
                        other => folded.push(other),
                    }
                }
                let body = match folded.len() {
                    0 => Expr::False,
                    1 => folded.pop().unwrap(),
                    _ => Expr::Xor(folded),
                };
                if parity {
                    Expr::not(body).simplified()
                } else {
                    body
                }
            }
            Expr::Implies(left, right) => {
                match (left.simplified(), right.simplified()) {
                    (Expr::False, _) | (_, Expr::True) => Expr::True,
                    (Expr::True, effect) => effect,
                    (cause, Expr::False) => Expr::not(cause).simplified(),
                    (cause, effect) => Expr::implies(cause, effect),
                }
            }
            Expr::Equivalent(left, right) => {
                match (left.simplified(), right.simplified()) {
                    (Expr::True, other) | (other, Expr::True) => other,
                    (Expr::False, other) | (other, Expr::False) => Expr::not(other).simplified(),
                    (left, right) if left == right => Expr::True,
                    (left, right) => Expr::equivalent(left, right),
                }
            }
        }
    }

    /// Convert to a clause set (CNF). The empty set means "true"; an empty
    /// clause inside the set means "false".
    pub fn to_clauses(&self) -> Vec<Clause> {
        let clauses = self.simplified().nnf(false).distribute();
        tidy_clauses(clauses)
    }

    /// Convert to CNF shape: a conjunction of disjunctions of literals.
    pub fn to_cnf(&self) -> Expr {
        clauses_to_expr(&self.to_clauses())
    }

    // Negation normal form: push negations down to atoms and expand the
    // derived connectives.
    fn nnf(&self, negated: bool) -> Expr {
        match self {
            Expr::True => {
                if negated {
                    Expr::False
                } else {
                    Expr::True
                }
            }
            Expr::False => {
                if negated {
                    Expr::True
                } else {
                    Expr::False
                }
            }
            Expr::Atom(symbol) => {
                if negated {
                    Expr::not(Expr::Atom(symbol.clone()))
                } else {
                    Expr::Atom(symbol.clone())
                }
            }
            Expr::Not(operand) => operand.nnf(!negated),
            Expr::And(operands) => {
                let converted = operands.iter().map(|operand| operand.nnf(negated));
                if negated {
                    Expr::Or(converted.collect())
                } else {
                    Expr::And(converted.collect())
                }
            }
            Expr::Or(operands) => {
                let converted = operands.iter().map(|operand| operand.nnf(negated));
                if negated {
                    Expr::And(converted.collect())
                } else {
                    Expr::Or(converted.collect())
                }
            }
            Expr::Xor(operands) => {
                // fold pairwise: a ^ b = (a | b) & (~a | ~b)
                let mut result = Expr::False;
                for operand in operands {
                    result = Expr::And(vec![
                        Expr::Or(vec![result.clone(), operand.clone()]),
                        Expr::Or(vec![Expr::not(result), Expr::not(operand.clone())]),
                    ]);
                }
                result.simplified().nnf(negated)
            }
            Expr::Implies(left, right) => {
                Expr::Or(vec![Expr::not((**left).clone()), (**right).clone()]).nnf(negated)
            }
            Expr::Equivalent(left, right) => Expr::And(vec![
                Expr::Or(vec![Expr::not((**left).clone()), (**right).clone()]),
                Expr::Or(vec![Expr::not((**right).clone()), (**left).clone()]),
            ])
            .nnf(negated),
        }
    }

    // Distribute an NNF formula into clauses.
    fn distribute(&self) -> Vec<Clause> {
        match self {
            Expr::True => vec![],
            Expr::False => vec![Clause::new()],
            Expr::Atom(symbol) => vec![Clause::from([Literal {
                symbol: symbol.clone(),
                negated: false,
            }])],
            Expr::Not(operand) => match operand.as_ref() {
                Expr::Atom(symbol) => vec![Clause::from([Literal {
                    symbol: symbol.clone(),
                    negated: true,
                }])],
                _ => unreachable!("negation of a non-atom in NNF"),
            },
            Expr::And(operands) => operands
                .iter()
                .flat_map(|operand| operand.distribute())
                .collect(),
            Expr::Or(operands) => {
                let mut result: Vec<Clause> = vec![Clause::new()];
                for operand in operands {
                    let clauses = operand.distribute();
                    let mut expanded = Vec::new();
                    for prefix in &result {
                        for clause in &clauses {
                            let mut merged = prefix.clone();
                            merged.extend(clause.iter().cloned());
                            expanded.push(merged);
                        }
                    }
                    result = expanded;
                }
                result
            }
            _ => unreachable!("derived connective in NNF"),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::True => write!(formatter, "1"),
            Expr::False => write!(formatter, "0"),
            Expr::Atom(symbol) => write!(formatter, "{symbol}"),
            Expr::Not(operand) => write!(formatter, "~{operand}"),
            Expr::And(operands) => write_joined(formatter, operands, " & "),
            Expr::Or(operands) => write_joined(formatter, operands, " | "),
            Expr::Xor(operands) => write_joined(formatter, operands, " ^ "),
            Expr::Implies(left, right) => write!(formatter, "({left} >> {right})"),
            Expr::Equivalent(left, right) => write!(formatter, "({left} == {right})"),
        }
    }
}

fn write_joined(
    formatter: &mut fmt::Formatter<'_>,
    operands: &[Expr],
    separator: &str,
) -> fmt::Result {
    write!(formatter, "(")?;
    for (index, operand) in operands.iter().enumerate() {
        if index > 0 {
            write!(formatter, "{separator}")?;
        }
        write!(formatter, "{operand}")?;
    }
    write!(formatter, ")")
}

/// Drop tautological clauses, deduplicate, remove subsumed clauses, and
/// propagate unit clauses to a fixed point. An unsatisfiable set collapses
/// to a single empty clause.
fn tidy_clauses(clauses: Vec<Clause>) -> Vec<Clause> {
    let mut kept: Vec<Clause> = Vec::new();
    'next: for clause in clauses {
        let tautology = clause.iter().any(|literal| {
            clause.contains(&Literal {
                symbol: literal.symbol.clone(),
                negated: !literal.negated,
            })
        });
        if tautology {
            continue;
        }
        for other in &kept {
            if other.is_subset(&clause) {
                continue 'next;
            }
        }
        kept.retain(|other| !clause.is_subset(other));
        kept.push(clause);
    }
    propagate_units(kept)
}

fn propagate_units(mut clauses: Vec<Clause>) -> Vec<Clause> {
    let mut propagated: BTreeSet<Literal> = BTreeSet::new();
    loop {
        let Some(unit) = clauses
            .iter()
            .filter(|clause| clause.len() == 1)
            .map(|clause| clause.iter().next().unwrap().clone())
            .find(|literal| !propagated.contains(literal))
        else {
            return clauses;
        };
        let complement = Literal {
            symbol: unit.symbol.clone(),
            negated: !unit.negated,
        };
        if propagated.contains(&complement) {
            return vec![Clause::new()];
        }
        propagated.insert(unit.clone());
        let mut next: Vec<Clause> = vec![Clause::from([unit.clone()])];
        for clause in clauses {
            if clause.contains(&unit) {
                continue;
            }
            let mut reduced = clause;
            reduced.remove(&complement);
            if reduced.is_empty() {
                return vec![Clause::new()];
            }
            next.push(reduced);
        }
        clauses = next;
    }
}

/// Rebuild an expression from a clause set.
pub fn clauses_to_expr(clauses: &[Clause]) -> Expr {
    let conjuncts: Vec<Expr> = clauses
        .iter()
        .map(|clause| {
            let literals: Vec<Expr> = clause
                .iter()
                .map(|literal| {
                    let atom = Expr::Atom(literal.symbol.clone());
                    if literal.negated {
                        Expr::not(atom)
                    } else {
                        atom
                    }
                })
                .collect();
            Expr::Or(literals)
        })
        .collect();
    Expr::And(conjuncts).simplified()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbols() -> (Symbol, Symbol, Symbol) {
        (Symbol::new("a"), Symbol::new("b"), Symbol::new("c"))
    }

    #[test]
    fn test_constant_folding() {
        let (a, _, _) = symbols();
        let atom = Expr::Atom(a.clone());
        assert!(Expr::and(vec![Expr::True, Expr::True]).simplified().is_true());
        assert!(Expr::and(vec![atom.clone(), Expr::False]).simplified().is_false());
        assert!(Expr::or(vec![atom.clone(), Expr::True]).simplified().is_true());
        assert_eq!(Expr::not(Expr::not(atom.clone())).simplified(), atom);
    }

    #[test]
    fn test_substitution_and_assignment() {
        let (a, b, _) = symbols();
        let formula = Expr::implies(Expr::Atom(a.clone()), Expr::Atom(b.clone()));
        assert!(formula.assign(&a, false).simplified().is_true());
        assert_eq!(
            formula.assign(&b, false).simplified(),
            Expr::not(Expr::Atom(a.clone()))
        );
    }

    #[test]
    fn test_atoms() {
        let (a, b, c) = symbols();
        let formula = Expr::and(vec![
            Expr::Atom(a.clone()),
            Expr::or(vec![Expr::Atom(b.clone()), Expr::not(Expr::Atom(c.clone()))]),
        ]);
        assert_eq!(formula.atoms(), BTreeSet::from([a, b, c]));
    }

    #[test]
    fn test_cnf_of_implication() {
        let (a, b, _) = symbols();
        let formula = Expr::implies(Expr::Atom(a.clone()), Expr::Atom(b.clone()));
        let clauses = formula.to_clauses();
        assert_eq!(clauses.len(), 1);
        assert_eq!(
            clauses[0],
            Clause::from([
                Literal { symbol: a, negated: true },
                Literal { symbol: b, negated: false },
            ])
        );
    }

    #[test]
    fn test_cnf_drops_tautologies() {
        let (a, _, _) = symbols();
        let formula = Expr::or(vec![Expr::Atom(a.clone()), Expr::not(Expr::Atom(a))]);
        assert!(formula.to_clauses().is_empty());
        assert!(formula.to_cnf().is_true());
    }

    #[test]
    fn test_cnf_distributes() {
        let (a, b, c) = symbols();
        // a | (b & c) -> (a | b) & (a | c)
        let formula = Expr::or(vec![
            Expr::Atom(a.clone()),
            Expr::and(vec![Expr::Atom(b.clone()), Expr::Atom(c.clone())]),
        ]);
        let clauses = formula.to_clauses();
        assert_eq!(clauses.len(), 2);
    }

    #[test]
    fn test_xor_expansion() {
        let (a, b, _) = symbols();
        let formula = Expr::Xor(vec![Expr::Atom(a.clone()), Expr::Atom(b.clone())]);
        // a ^ a is always false, a ^ b is satisfiable but not valid
        let same = Expr::Xor(vec![Expr::Atom(a.clone()), Expr::Atom(a.clone())]);
        assert!(same.to_cnf().is_false());
        let clauses = formula.to_clauses();
        assert_eq!(clauses.len(), 2);
    }

    #[test]
    fn test_equivalence_cnf() {
        let (a, b, _) = symbols();
        let formula = Expr::equivalent(Expr::Atom(a.clone()), Expr::Atom(b.clone()));
        assert_eq!(formula.to_clauses().len(), 2);
        assert!(formula
            .assign(&a, true)
            .assign(&b, true)
            .simplified()
            .is_true());
        assert!(formula
            .assign(&a, true)
            .assign(&b, false)
            .simplified()
            .is_false());
    }
}
