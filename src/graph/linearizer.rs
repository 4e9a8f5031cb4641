// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::HashSet;
use std::fmt::Display;
use std::hash::Hash;

use crate::errors::{Error, Result};
use crate::graph::Graph;

/// A topological ordering of a graph.
///
/// Linearizers order graph items so that every parent precedes its children,
/// or report the offending cycle.
pub trait Linearizer {
    fn linearize<I, A>(&self, graph: &Graph<I, A>) -> Result<Vec<I>>
    where
        I: Clone + Eq + Hash + Display,
        A: Default + Clone;
}

/// A depth-first linearizer.
///
/// Non-recursive, so it handles really deep graphs.
#[derive(Debug, Default)]
pub struct DfsLinearizer;

impl Linearizer for DfsLinearizer {
    fn linearize<I, A>(&self, graph: &Graph<I, A>) -> Result<Vec<I>>
    where
        I: Clone + Eq + Hash + Display,
        A: Default + Clone,
    {
        let mut unexplored: HashSet<I> = graph.items().cloned().collect();
        let mut passing: HashSet<I> = HashSet::new();
        let mut path: Vec<I> = Vec::new();
        let mut stack: Vec<I> = Vec::new();
        while let Some(start) = unexplored.iter().next().cloned() {
            let mut exploring: Vec<(bool, I)> = vec![(false, start)];
            while let Some((explored, item)) = exploring.pop() {
                if !unexplored.contains(&item) {
                    continue;
                }
                if explored {
                    unexplored.remove(&item);
                    passing.remove(&item);
                    path.pop();
                    stack.push(item);
                    continue;
                }
                if passing.contains(&item) {
                    let position = path
                        .iter()
                        .position(|entry| *entry == item)
                        .unwrap_or_default();
                    let cycle = path[position..]
                        .iter()
                        .map(|entry| entry.to_string())
                        .collect();
                    return Err(Error::CircularDependency(cycle));
                }
                exploring.push((true, item.clone()));
                passing.insert(item.clone());
                path.push(item.clone());
                for child in &graph.node(&item).children {
                    if unexplored.contains(child) {
                        exploring.push((false, graph.node(child).item.clone()));
                    }
                }
            }
        }
        stack.reverse();
        Ok(stack)
    }
}
