// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Conditions: computable booleans with an algebra on top.
//!
//! A [`Condition`] represents a boolean value that can be (re)computed at any
//! time — "this file exists", "this test passed". Conditions are named, and a
//! condition is fully represented by its name: two conditions with equal
//! names are the same condition. Tasks declare their *targets* as conditions.
//!
//! Conditions combine with [`ConditionRef::and`], [`ConditionRef::or`],
//! [`ConditionRef::xor`], [`ConditionRef::negate`], and
//! [`ConditionRef::implies`]. Chained conjunctions and disjunctions of the
//! same kind fold into a single flat operand list, and composite names sort
//! their operands, so structurally equal combinations always get equal names.
//!
//! Every condition has a [`Symbol`] — a propositional variable usable in
//! symbolic formulas. Symbols are interned process-wide (written once, never
//! dropped), so a symbol uniquely identifies one condition instance and
//! [`ConditionRef::from_symbol`] can always find its way back. A condition
//! may also expose an [`Condition::expression`] (a formula its symbol is
//! equivalent to) and [`Condition::invariants`] (conditions that always hold)
//! — that is the raw material [`derive_constraint`] works with.

pub mod expr;
pub mod sat;

mod constraint;

pub use constraint::derive_constraint;
pub use expr::{Expr, Symbol};

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;

use crate::errors::{Error, Result};
use crate::runtime::Context;

/// A computable boolean value with a stable name.
#[async_trait]
pub trait Condition: Send + Sync {
    /// The unique name. Conditions are fully represented by their names.
    fn name(&self) -> String;

    /// Compute the value. Failing means "uncertain", not "false".
    async fn check(&self, context: &Context) -> Result<bool>;

    /// A symbolic formula this condition's symbol is equivalent to.
    fn expression(&self) -> Option<Expr> {
        None
    }

    /// Conditions that always hold true alongside this one.
    fn invariants(&self) -> Vec<ConditionRef> {
        Vec::new()
    }

    /// The wrapped condition, if this one is a wrapper.
    fn unwrap(&self) -> Option<ConditionRef> {
        None
    }

    fn as_any(&self) -> &dyn Any;
}

/// A shared, by-name-comparable handle to a condition.
#[derive(Clone)]
pub struct ConditionRef(Arc<dyn Condition>);

impl ConditionRef {
    pub fn new(condition: impl Condition + 'static) -> Self {
        Self(Arc::new(condition))
    }

    pub fn name(&self) -> String {
        self.0.name()
    }

    pub async fn check(&self, context: &Context) -> Result<bool> {
        self.0.check(context).await
    }

    pub fn expression(&self) -> Option<Expr> {
        self.0.expression()
    }

    pub fn invariants(&self) -> Vec<ConditionRef> {
        self.0.invariants()
    }

    pub fn as_any(&self) -> &dyn Any {
        self.0.as_any()
    }

    /// Strip all wrappers.
    pub fn unwrap_fully(&self) -> ConditionRef {
        let mut current = self.clone();
        while let Some(inner) = current.0.unwrap() {
            current = inner;
        }
        current
    }

    /// The propositional symbol of this condition. Interns the condition in
    /// the process-wide registry as a side effect.
    pub fn symbol(&self) -> Symbol {
        let symbol = Symbol::new(&format!("${{{}}}", self.name()));
        instances()
            .lock()
            .unwrap()
            .entry(symbol.clone())
            .or_insert_with(|| self.clone());
        symbol
    }

    /// Recover a condition from its symbol.
    ///
    /// The symbol must have been obtained via [`ConditionRef::symbol`].
    pub fn from_symbol(symbol: &Symbol) -> Result<ConditionRef> {
        instances()
            .lock()
            .unwrap()
            .get(symbol)
            .cloned()
            .ok_or_else(|| {
                Error::Other(anyhow::anyhow!(
                    "symbol `{symbol}` does not represent a condition"
                ))
            })
    }

    /// The negation of this condition.
    pub fn negate(&self) -> ConditionRef {
        ConditionRef::new(Negation { base: self.clone() })
    }

    /// The conjunction of two conditions. Conjunctions fold.
    pub fn and(&self, other: &ConditionRef) -> ConditionRef {
        let mut operands = match self.as_any().downcast_ref::<Conjunction>() {
            Some(conjunction) => conjunction.operands.clone(),
            None => vec![self.clone()],
        };
        match other.as_any().downcast_ref::<Conjunction>() {
            Some(conjunction) => operands.extend(conjunction.operands.iter().cloned()),
            None => operands.push(other.clone()),
        }
        ConditionRef::new(Conjunction { operands })
    }

    /// The disjunction of two conditions. Disjunctions fold.
    pub fn or(&self, other: &ConditionRef) -> ConditionRef {
        let mut operands = match self.as_any().downcast_ref::<Disjunction>() {
            Some(disjunction) => disjunction.operands.clone(),
            None => vec![self.clone()],
        };
        match other.as_any().downcast_ref::<Disjunction>() {
            Some(disjunction) => operands.extend(disjunction.operands.iter().cloned()),
            None => operands.push(other.clone()),
        }
        ConditionRef::new(Disjunction { operands })
    }

    /// The exclusive disjunction of two conditions. Folds as well.
    pub fn xor(&self, other: &ConditionRef) -> ConditionRef {
        let mut operands = match self.as_any().downcast_ref::<ExclusiveDisjunction>() {
            Some(xor) => xor.operands.clone(),
            None => vec![self.clone()],
        };
        match other.as_any().downcast_ref::<ExclusiveDisjunction>() {
            Some(xor) => operands.extend(xor.operands.iter().cloned()),
            None => operands.push(other.clone()),
        }
        ConditionRef::new(ExclusiveDisjunction { operands })
    }

    /// The implication "self ⇒ effect".
    pub fn implies(&self, effect: &ConditionRef) -> ConditionRef {
        ConditionRef::new(Implication {
            cause: self.clone(),
            effect: effect.clone(),
        })
    }
}

impl PartialEq for ConditionRef {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Eq for ConditionRef {}

impl std::hash::Hash for ConditionRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name().hash(state);
    }
}

impl PartialOrd for ConditionRef {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ConditionRef {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name().cmp(&other.name())
    }
}

impl fmt::Debug for ConditionRef {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.name())
    }
}

impl fmt::Display for ConditionRef {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.name())
    }
}

fn instances() -> &'static Mutex<HashMap<Symbol, ConditionRef>> {
    static INSTANCES: OnceLock<Mutex<HashMap<Symbol, ConditionRef>>> = OnceLock::new();
    INSTANCES.get_or_init(|| Mutex::new(HashMap::new()))
}

/// The negation of a condition.
pub struct Negation {
    base: ConditionRef,
}

#[async_trait]
impl Condition for Negation {
    fn name(&self) -> String {
        format!("~{}", self.base.name())
    }

    async fn check(&self, context: &Context) -> Result<bool> {
        Ok(!self.base.check(context).await?)
    }

    fn expression(&self) -> Option<Expr> {
        Some(Expr::not(Expr::atom(self.base.symbol())))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The conjunction of conditions.
pub struct Conjunction {
    operands: Vec<ConditionRef>,
}

#[async_trait]
impl Condition for Conjunction {
    fn name(&self) -> String {
        let mut names: Vec<String> = self.operands.iter().map(ConditionRef::name).collect();
        names.sort();
        format!("({})", names.join(" & "))
    }

    async fn check(&self, context: &Context) -> Result<bool> {
        for operand in &self.operands {
            if !operand.check(context).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn expression(&self) -> Option<Expr> {
        Some(Expr::and(
            self.operands
                .iter()
                .map(|operand| Expr::atom(operand.symbol()))
                .collect(),
        ))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The disjunction of conditions.
pub struct Disjunction {
    operands: Vec<ConditionRef>,
}

#[async_trait]
impl Condition for Disjunction {
    fn name(&self) -> String {
        let mut names: Vec<String> = self.operands.iter().map(ConditionRef::name).collect();
        names.sort();
        format!("({})", names.join(" | "))
    }

    async fn check(&self, context: &Context) -> Result<bool> {
        for operand in &self.operands {
            if operand.check(context).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn expression(&self) -> Option<Expr> {
        Some(Expr::or(
            self.operands
                .iter()
                .map(|operand| Expr::atom(operand.symbol()))
                .collect(),
        ))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The exclusive disjunction of conditions. Checks every operand.
pub struct ExclusiveDisjunction {
    operands: Vec<ConditionRef>,
}

#[async_trait]
impl Condition for ExclusiveDisjunction {
    fn name(&self) -> String {
        let mut names: Vec<String> = self.operands.iter().map(ConditionRef::name).collect();
        names.sort();
        format!("({})", names.join(" ^ "))
    }

    async fn check(&self, context: &Context) -> Result<bool> {
        let mut result = false;
        for operand in &self.operands {
            result ^= operand.check(context).await?;
        }
        Ok(result)
    }

    fn expression(&self) -> Option<Expr> {
        Some(Expr::Xor(
            self.operands
                .iter()
                .map(|operand| Expr::atom(operand.symbol()))
                .collect(),
        ))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The implication between two conditions.
pub struct Implication {
    cause: ConditionRef,
    effect: ConditionRef,
}

#[async_trait]
impl Condition for Implication {
    fn name(&self) -> String {
        format!("({} >> {})", self.cause.name(), self.effect.name())
    }

    async fn check(&self, context: &Context) -> Result<bool> {
        if self.effect.check(context).await? {
            return Ok(true);
        }
        Ok(!self.cause.check(context).await?)
    }

    fn expression(&self) -> Option<Expr> {
        Some(Expr::implies(
            Expr::atom(self.cause.symbol()),
            Expr::atom(self.effect.symbol()),
        ))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
