// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Breadth-first path search shared by the committed store and transactions
//!
//! The algorithms only need a way to expand a node into its incident
//! relationships, so they run unchanged over committed state and over a
//! transaction's read-your-writes view.

use crate::storage::types::Direction;
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;

/// Graph that can enumerate the relationships incident to a node
pub trait Traversable {
    type Node: Copy + Eq + Hash;
    type Edge: Copy + Eq + Hash;
    type Error;

    /// Incident relationships of `node` as `(edge, other endpoint)` pairs,
    /// filtered by direction and, when `types` is non-empty, by type.
    fn expand(
        &self,
        node: Self::Node,
        direction: Direction,
        types: &[String],
    ) -> Result<Vec<(Self::Edge, Self::Node)>, Self::Error>;
}

/// Path expressed as identities; `nodes.len() == edges.len() + 1`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPath<N, E> {
    pub nodes: Vec<N>,
    pub edges: Vec<E>,
}

impl<N: Copy, E: Copy> RawPath<N, E> {
    fn single(node: N) -> Self {
        Self {
            nodes: vec![node],
            edges: Vec::new(),
        }
    }

    fn extended(&self, edge: E, node: N) -> Self {
        let mut next = self.clone_path();
        next.edges.push(edge);
        next.nodes.push(node);
        next
    }

    fn clone_path(&self) -> Self {
        Self {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
        }
    }

    pub fn end(&self) -> N {
        self.nodes[self.nodes.len() - 1]
    }
}

/// Shortest path from `start` to `end` of at most `max_hops` relationships
pub fn shortest_path<G: Traversable>(
    graph: &G,
    start: G::Node,
    end: G::Node,
    direction: Direction,
    types: &[String],
    max_hops: usize,
) -> Result<Option<RawPath<G::Node, G::Edge>>, G::Error> {
    if start == end {
        return Ok(Some(RawPath::single(start)));
    }

    let mut parents: HashMap<G::Node, (G::Node, G::Edge)> = HashMap::new();
    let mut visited: HashSet<G::Node> = HashSet::from([start]);
    let mut frontier = vec![start];

    for _ in 0..max_hops {
        let mut next = Vec::new();
        for node in frontier {
            for (edge, other) in graph.expand(node, direction, types)? {
                if !visited.insert(other) {
                    continue;
                }
                parents.insert(other, (node, edge));
                if other == end {
                    return Ok(Some(rebuild(&parents, start, end)));
                }
                next.push(other);
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }
    Ok(None)
}

fn rebuild<N: Copy + Eq + Hash, E: Copy>(
    parents: &HashMap<N, (N, E)>,
    start: N,
    end: N,
) -> RawPath<N, E> {
    let mut nodes = vec![end];
    let mut edges = Vec::new();
    let mut current = end;
    while current != start {
        match parents.get(&current) {
            Some((parent, edge)) => {
                edges.push(*edge);
                nodes.push(*parent);
                current = *parent;
            }
            None => break,
        }
    }
    nodes.reverse();
    edges.reverse();
    RawPath { nodes, edges }
}

/// Every shortest path from `start` to `end` within `max_hops`
pub fn all_shortest_paths<G: Traversable>(
    graph: &G,
    start: G::Node,
    end: G::Node,
    direction: Direction,
    types: &[String],
    max_hops: usize,
) -> Result<Vec<RawPath<G::Node, G::Edge>>, G::Error> {
    if start == end {
        return Ok(vec![RawPath::single(start)]);
    }

    let mut depth: HashMap<G::Node, usize> = HashMap::from([(start, 0)]);
    let mut preds: HashMap<G::Node, Vec<(G::Node, G::Edge)>> = HashMap::new();
    let mut queue = VecDeque::from([start]);
    let mut found_at: Option<usize> = None;

    while let Some(node) = queue.pop_front() {
        let d = depth[&node];
        if d >= max_hops || found_at.map_or(false, |f| d >= f) {
            continue;
        }
        for (edge, other) in graph.expand(node, direction, types)? {
            match depth.get(&other) {
                Some(&od) if od == d + 1 => {
                    preds.entry(other).or_default().push((node, edge));
                }
                Some(_) => {}
                None => {
                    depth.insert(other, d + 1);
                    preds.entry(other).or_default().push((node, edge));
                    if other == end {
                        found_at = Some(d + 1);
                    } else {
                        queue.push_back(other);
                    }
                }
            }
        }
    }

    if found_at.is_none() {
        return Ok(Vec::new());
    }

    // Unwind the predecessor DAG from the target back to the start
    let mut results = Vec::new();
    let mut stack: Vec<(G::Node, Vec<G::Node>, Vec<G::Edge>)> = vec![(end, vec![end], vec![])];
    while let Some((node, nodes, edges)) = stack.pop() {
        if node == start {
            let mut nodes = nodes;
            let mut edges = edges;
            nodes.reverse();
            edges.reverse();
            results.push(RawPath { nodes, edges });
            continue;
        }
        if let Some(list) = preds.get(&node) {
            for (parent, edge) in list {
                let mut n = nodes.clone();
                let mut e = edges.clone();
                n.push(*parent);
                e.push(*edge);
                stack.push((*parent, n, e));
            }
        }
    }
    Ok(results)
}

/// Every simple path (no repeated node) from `start` to `end` within `max_hops`,
/// in breadth-first order
pub fn all_paths<G: Traversable>(
    graph: &G,
    start: G::Node,
    end: G::Node,
    direction: Direction,
    types: &[String],
    max_hops: usize,
) -> Result<Vec<RawPath<G::Node, G::Edge>>, G::Error> {
    let mut results = Vec::new();
    let mut queue = VecDeque::from([RawPath::single(start)]);

    while let Some(path) = queue.pop_front() {
        let tail = path.end();
        if tail == end && !path.edges.is_empty() {
            results.push(path);
            continue;
        }
        if path.edges.len() >= max_hops {
            continue;
        }
        for (edge, other) in graph.expand(tail, direction, types)? {
            if path.nodes.contains(&other) && !(other == end && start == end) {
                continue;
            }
            queue.push_back(path.extended(edge, other));
        }
    }
    if start == end && results.is_empty() {
        results.push(RawPath::single(start));
    }
    Ok(results)
}

/// Paths leaving `start` whose length lies in `min_hops..=max_hops`, never
/// traversing the same relationship twice. Used for variable-length patterns.
pub fn expand_variable_length<G: Traversable>(
    graph: &G,
    start: G::Node,
    direction: Direction,
    types: &[String],
    min_hops: usize,
    max_hops: usize,
) -> Result<Vec<RawPath<G::Node, G::Edge>>, G::Error> {
    let mut results = Vec::new();
    let mut queue = VecDeque::from([RawPath::single(start)]);

    while let Some(path) = queue.pop_front() {
        if path.edges.len() >= min_hops {
            results.push(path.clone_path());
        }
        if path.edges.len() >= max_hops {
            continue;
        }
        for (edge, other) in graph.expand(path.end(), direction, types)? {
            if path.edges.contains(&edge) {
                continue;
            }
            queue.push_back(path.extended(edge, other));
        }
    }
    Ok(results)
}
