// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Partitioning of items into non-conflicting subsets.
//!
//! Each item carries a mapping; two mappings conflict iff they disagree on a
//! shared key. The testifier uses this to split test projections into groups
//! that can share an environment: think of it as graph coloring, where an
//! item maps itself to its own value and each conflicting neighbor to `None`.

use std::collections::HashMap;
use std::hash::Hash;

/// A partition: its items plus the joint mapping they all agree on.
#[derive(Debug, Clone)]
pub struct Partition<I, K, V> {
    pub items: Vec<I>,
    pub mapping: HashMap<K, V>,
}

/// Check whether two mappings agree on every shared key.
///
/// Iterates over the smaller of the two.
pub fn mergeable<K, V>(left: &HashMap<K, V>, right: &HashMap<K, V>) -> bool
where
    K: Eq + Hash,
    V: PartialEq,
{
    let (small, large) = if left.len() < right.len() {
        (left, right)
    } else {
        (right, left)
    };
    small
        .iter()
        .all(|(key, value)| large.get(key).map_or(true, |other| other == value))
}

/// A strategy for splitting items into non-conflicting partitions.
pub trait Partitioner {
    fn partition<I, K, V>(&self, items: Vec<(I, HashMap<K, V>)>) -> Vec<Partition<I, K, V>>
    where
        I: Ord,
        K: Eq + Hash + Clone,
        V: PartialEq + Clone;
}

/// A greedy partitioner with Welsh-Powell-style ordering: items with larger
/// mappings (more constraints) go first, ties broken by the item itself for
/// determinism.
#[derive(Debug, Default)]
pub struct GreedyPartitioner;

impl Partitioner for GreedyPartitioner {
    fn partition<I, K, V>(&self, items: Vec<(I, HashMap<K, V>)>) -> Vec<Partition<I, K, V>>
    where
        I: Ord,
        K: Eq + Hash + Clone,
        V: PartialEq + Clone,
    {
        let mut items = items;
        items.sort_by(|(left_item, left_mapping), (right_item, right_mapping)| {
            right_mapping
                .len()
                .cmp(&left_mapping.len())
                .then(left_item.cmp(right_item))
        });
        let mut partitions: Vec<Partition<I, K, V>> = Vec::new();
        for (item, mapping) in items {
            match partitions
                .iter_mut()
                .find(|partition| mergeable(&mapping, &partition.mapping))
            {
                Some(partition) => {
                    partition.items.push(item);
                    partition.mapping.extend(mapping);
                }
                None => partitions.push(Partition {
                    items: vec![item],
                    mapping,
                }),
            }
        }
        partitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mergeable() {
        let left = HashMap::from([(1, Some(1)), (2, None)]);
        let right = HashMap::from([(2, None), (3, Some(3))]);
        let wrong = HashMap::from([(1, None), (2, Some(2))]);
        assert!(mergeable(&left, &right));
        assert!(!mergeable(&left, &wrong));
    }

    #[test]
    fn test_colors_a_path_graph() {
        // the graph "1 -- 2 -- 3": adjacent items must not share a partition
        let items = vec![
            (1, HashMap::from([(1, Some(1)), (2, None)])),
            (2, HashMap::from([(2, Some(2)), (1, None), (3, None)])),
            (3, HashMap::from([(3, Some(3)), (2, None)])),
        ];
        let partitions = GreedyPartitioner.partition(items);
        assert_eq!(partitions.len(), 2);
        // the most constrained item goes alone
        assert_eq!(partitions[0].items, vec![2]);
        let mut rest = partitions[1].items.clone();
        rest.sort();
        assert_eq!(rest, vec![1, 3]);
    }

    #[test]
    fn test_compatible_items_share_a_partition() {
        let items = vec![
            (1, HashMap::from([("a", 1)])),
            (2, HashMap::from([("a", 1), ("b", 2)])),
        ];
        let partitions = GreedyPartitioner.partition(items);
        assert_eq!(partitions.len(), 1);
        assert_eq!(partitions[0].mapping.len(), 2);
    }
}
