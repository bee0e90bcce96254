// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Pattern matching over a transaction view
//!
//! Patterns are matched left to right by expanding from candidate start
//! nodes. Within one MATCH a relationship is bound at most once per row.

use super::error::{ExecutionError, ExecutionResult};
use super::eval::{EvalContext, Row};
use crate::cypher::{NodePattern, PathKind, PatternPath, RelationshipPattern};
use crate::storage::{EntityRef, NodeValue, PathValue, PropertyMap, RelationshipValue, Value};
use std::collections::HashSet;

/// Upper bound for `*` and `*n..` when the pattern leaves it open
pub const MAX_VARIABLE_LENGTH: usize = 15;

/// A row being extended, with the relationships it has bound so far
#[derive(Debug, Clone)]
struct Partial {
    row: Row,
    used: HashSet<EntityRef>,
}

/// Path under construction for one pattern
#[derive(Debug, Clone)]
struct Walk {
    partial: Partial,
    nodes: Vec<NodeValue>,
    relationships: Vec<RelationshipValue>,
}

pub struct PatternMatcher<'c, 'a> {
    ctx: &'c EvalContext<'a>,
}

impl<'c, 'a> PatternMatcher<'c, 'a> {
    pub fn new(ctx: &'c EvalContext<'a>) -> Self {
        Self { ctx }
    }

    /// Every extension of `row` that matches all `patterns`
    pub fn match_patterns(&self, patterns: &[PatternPath], row: &Row) -> ExecutionResult<Vec<Row>> {
        let mut partials = vec![Partial {
            row: row.clone(),
            used: HashSet::new(),
        }];
        for pattern in patterns {
            let mut next = Vec::new();
            for partial in &partials {
                next.extend(self.match_path(pattern, partial)?);
            }
            partials = next;
            if partials.is_empty() {
                break;
            }
        }
        Ok(partials.into_iter().map(|p| p.row).collect())
    }

    fn match_path(&self, pattern: &PatternPath, partial: &Partial) -> ExecutionResult<Vec<Partial>> {
        if pattern.kind != PathKind::Pattern {
            return self.match_shortest(pattern, partial);
        }

        let mut walks = Vec::new();
        for start in self.node_candidates(&pattern.start, &partial.row)? {
            let mut row = partial.row.clone();
            bind(&mut row, &pattern.start.variable, Value::Node(start.clone()));
            walks.push(Walk {
                partial: Partial {
                    row,
                    used: partial.used.clone(),
                },
                nodes: vec![start],
                relationships: Vec::new(),
            });
        }

        for (rel_pattern, node_pattern) in &pattern.steps {
            let mut next = Vec::new();
            for walk in &walks {
                if rel_pattern.length.is_some() {
                    next.extend(self.expand_variable(walk, rel_pattern, node_pattern)?);
                } else {
                    next.extend(self.expand_single(walk, rel_pattern, node_pattern)?);
                }
            }
            walks = next;
        }

        Ok(walks
            .into_iter()
            .map(|walk| {
                let mut partial = walk.partial;
                if let Some(name) = &pattern.variable {
                    partial.row.insert(
                        name.clone(),
                        Value::Path(PathValue {
                            nodes: walk.nodes,
                            relationships: walk.relationships,
                        }),
                    );
                }
                partial
            })
            .collect())
    }

    fn expand_single(
        &self,
        walk: &Walk,
        rel_pattern: &RelationshipPattern,
        node_pattern: &NodePattern,
    ) -> ExecutionResult<Vec<Walk>> {
        let Some(current) = walk.nodes.last() else {
            return Ok(Vec::new());
        };
        let row = &walk.partial.row;
        let rel_props = self.pattern_properties(&rel_pattern.properties, row)?;
        let mut out = Vec::new();

        for rel in self.ctx.txn.node_relationships(
            current.id,
            rel_pattern.direction,
            &rel_pattern.types,
        )? {
            if walk.partial.used.contains(&rel.id)
                || !bound_matches(row, &rel_pattern.variable, &Value::Relationship(rel.clone()))
                || !properties_match(&rel.properties, &rel_props)
            {
                continue;
            }
            let other_id = if rel.start == current.id { rel.end } else { rel.start };
            let Some(other) = self.ctx.txn.get_node(other_id)? else {
                continue;
            };
            if !self.node_matches(node_pattern, &other, row)? {
                continue;
            }

            let mut next = walk.clone();
            next.partial.used.insert(rel.id);
            bind(
                &mut next.partial.row,
                &rel_pattern.variable,
                Value::Relationship(rel.clone()),
            );
            bind(&mut next.partial.row, &node_pattern.variable, Value::Node(other.clone()));
            next.relationships.push(rel);
            next.nodes.push(other);
            out.push(next);
        }
        Ok(out)
    }

    fn expand_variable(
        &self,
        walk: &Walk,
        rel_pattern: &RelationshipPattern,
        node_pattern: &NodePattern,
    ) -> ExecutionResult<Vec<Walk>> {
        let Some(current) = walk.nodes.last() else {
            return Ok(Vec::new());
        };
        let (min, max) = bounds(rel_pattern);
        let row = &walk.partial.row;
        let rel_props = self.pattern_properties(&rel_pattern.properties, row)?;
        let mut out = Vec::new();

        let paths = self.ctx.txn.expand_paths(
            current.id,
            &rel_pattern.types,
            rel_pattern.direction,
            min,
            max,
        )?;
        for path in paths {
            if path
                .relationships
                .iter()
                .any(|r| walk.partial.used.contains(&r.id) || !properties_match(&r.properties, &rel_props))
            {
                continue;
            }
            let rel_list = Value::List(
                path.relationships
                    .iter()
                    .cloned()
                    .map(Value::Relationship)
                    .collect(),
            );
            if !bound_matches(row, &rel_pattern.variable, &rel_list) {
                continue;
            }
            let Some(end) = path.nodes.last() else {
                continue;
            };
            if !self.node_matches(node_pattern, end, row)? {
                continue;
            }

            let mut next = walk.clone();
            next.partial.used.extend(path.relationships.iter().map(|r| r.id));
            bind(&mut next.partial.row, &rel_pattern.variable, rel_list);
            bind(&mut next.partial.row, &node_pattern.variable, Value::Node(end.clone()));
            next.nodes.extend(path.nodes.iter().skip(1).cloned());
            next.relationships.extend(path.relationships);
            out.push(next);
        }
        Ok(out)
    }

    fn match_shortest(&self, pattern: &PatternPath, partial: &Partial) -> ExecutionResult<Vec<Partial>> {
        let [(rel_pattern, end_pattern)] = pattern.steps.as_slice() else {
            return Err(ExecutionError::InvalidQuery(
                "shortestPath requires a pattern with a single relationship".to_string(),
            ));
        };
        let row = &partial.row;
        let (_, max) = bounds(rel_pattern);
        let rel_props = self.pattern_properties(&rel_pattern.properties, row)?;
        let starts = self.node_candidates(&pattern.start, row)?;
        let ends = self.node_candidates(end_pattern, row)?;
        let mut out = Vec::new();

        for start in &starts {
            for end in &ends {
                if start.id == end.id {
                    continue;
                }
                let paths = match pattern.kind {
                    PathKind::AllShortest => self.ctx.txn.find_all_shortest_paths(
                        start.id,
                        end.id,
                        &rel_pattern.types,
                        rel_pattern.direction,
                        max,
                    )?,
                    _ => self
                        .ctx
                        .txn
                        .find_shortest_path(
                            start.id,
                            end.id,
                            &rel_pattern.types,
                            rel_pattern.direction,
                            max,
                        )?
                        .into_iter()
                        .collect(),
                };
                for path in paths {
                    if path
                        .relationships
                        .iter()
                        .any(|r| !properties_match(&r.properties, &rel_props))
                    {
                        continue;
                    }
                    let mut next = partial.clone();
                    bind(&mut next.row, &pattern.start.variable, Value::Node(start.clone()));
                    bind(&mut next.row, &end_pattern.variable, Value::Node(end.clone()));
                    bind(
                        &mut next.row,
                        &rel_pattern.variable,
                        Value::List(
                            path.relationships
                                .iter()
                                .cloned()
                                .map(Value::Relationship)
                                .collect(),
                        ),
                    );
                    next.used.extend(path.relationships.iter().map(|r| r.id));
                    bind(&mut next.row, &pattern.variable, Value::Path(path));
                    out.push(next);
                }
            }
        }
        Ok(out)
    }

    /// Nodes that may stand at `pattern`, honouring an existing binding
    pub fn node_candidates(&self, pattern: &NodePattern, row: &Row) -> ExecutionResult<Vec<NodeValue>> {
        if let Some(bound) = pattern.variable.as_ref().and_then(|v| row.get(v)) {
            return match bound {
                Value::Node(node) => {
                    let Some(current) = self.ctx.txn.get_node(node.id)? else {
                        return Ok(Vec::new());
                    };
                    if self.node_matches(pattern, &current, row)? {
                        Ok(vec![current])
                    } else {
                        Ok(Vec::new())
                    }
                }
                Value::Null => Ok(Vec::new()),
                other => Err(ExecutionError::TypeError(format!(
                    "variable `{}` is bound to {}, not a Node",
                    pattern.variable.as_deref().unwrap_or_default(),
                    other.type_name()
                ))),
            };
        }

        let scanned = match pattern.labels.first() {
            Some(label) => self.ctx.txn.nodes_by_label(label)?,
            None => self.ctx.txn.all_nodes()?,
        };
        let props = self.pattern_properties(&pattern.properties, row)?;
        Ok(scanned
            .into_iter()
            .filter(|n| has_labels(n, &pattern.labels) && properties_match(&n.properties, &props))
            .collect())
    }

    fn node_matches(&self, pattern: &NodePattern, node: &NodeValue, row: &Row) -> ExecutionResult<bool> {
        if !bound_matches(row, &pattern.variable, &Value::Node(node.clone())) {
            return Ok(false);
        }
        if !has_labels(node, &pattern.labels) {
            return Ok(false);
        }
        let props = self.pattern_properties(&pattern.properties, row)?;
        Ok(properties_match(&node.properties, &props))
    }

    /// Evaluate an inline property map or parameter
    pub fn pattern_properties(
        &self,
        properties: &Option<crate::cypher::Expression>,
        row: &Row,
    ) -> ExecutionResult<PropertyMap> {
        let Some(expr) = properties else {
            return Ok(PropertyMap::new());
        };
        match self.ctx.evaluate(expr, row)? {
            Value::Map(map) => Ok(map),
            Value::Null => Ok(PropertyMap::new()),
            other => Err(ExecutionError::TypeError(format!(
                "expected a property map but was {}",
                other.type_name()
            ))),
        }
    }
}

fn bounds(pattern: &RelationshipPattern) -> (usize, usize) {
    match pattern.length {
        Some(length) => {
            let min = length.min.map_or(1, |m| m as usize);
            let max = length.max.map_or(MAX_VARIABLE_LENGTH.max(min), |m| m as usize);
            (min, max)
        }
        None => (1, 1),
    }
}

fn bind(row: &mut Row, variable: &Option<String>, value: Value) {
    if let Some(name) = variable {
        row.insert(name.clone(), value);
    }
}

/// An already bound variable must hold the same entity or list of entities
fn bound_matches(row: &Row, variable: &Option<String>, candidate: &Value) -> bool {
    let Some(existing) = variable.as_ref().and_then(|v| row.get(v)) else {
        return true;
    };
    match (existing, candidate) {
        (Value::Node(a), Value::Node(b)) => a.id == b.id,
        (Value::Relationship(a), Value::Relationship(b)) => a.id == b.id,
        (Value::List(a), Value::List(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_as(y))
        }
        _ => false,
    }
}

fn has_labels(node: &NodeValue, labels: &[String]) -> bool {
    labels.iter().all(|l| node.labels.contains(l))
}

/// Every required property equals the stored one; a null requirement never matches
fn properties_match(properties: &PropertyMap, required: &PropertyMap) -> bool {
    required.iter().all(|(key, expected)| {
        properties
            .get(key)
            .map_or(false, |actual| actual.cypher_eq(expected) == Some(true))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::ConstraintRegistry;
    use crate::cypher::{parse_statement, Clause, Statement};
    use crate::storage::{Direction, GraphStore};
    use crate::txn::{Transaction, TransactionManager, TransactionMetadata};
    use std::sync::Arc;

    fn props(pairs: &[(&str, Value)]) -> PropertyMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    /// a -KNOWS-> b -KNOWS-> c, a -LIKES-> c
    fn seed(txn: &Transaction) {
        let person = vec!["Person".to_string()];
        let a = txn
            .create_node(person.clone(), props(&[("name", Value::from("a"))]))
            .unwrap();
        let b = txn
            .create_node(person.clone(), props(&[("name", Value::from("b"))]))
            .unwrap();
        let c = txn
            .create_node(person, props(&[("name", Value::from("c"))]))
            .unwrap();
        txn.create_edge(a.id, b.id, "KNOWS", PropertyMap::new()).unwrap();
        txn.create_edge(b.id, c.id, "KNOWS", props(&[("since", Value::Integer(2020))]))
            .unwrap();
        txn.create_edge(a.id, c.id, "LIKES", PropertyMap::new()).unwrap();
    }

    fn patterns(query: &str) -> Vec<PatternPath> {
        match parse_statement(query).unwrap() {
            Statement::Query(q) => match &q.clauses[0] {
                Clause::Match(m) => m.patterns.clone(),
                other => panic!("unexpected clause {:?}", other),
            },
            other => panic!("unexpected statement {:?}", other),
        }
    }

    fn run(query: &str) -> Vec<Row> {
        let store = Arc::new(GraphStore::memory().unwrap());
        let manager = TransactionManager::new(store, Arc::new(ConstraintRegistry::new()));
        let txn = manager.begin(TransactionMetadata::new());
        seed(&txn);
        let params = PropertyMap::new();
        let ctx = EvalContext::new(&params, &txn);
        PatternMatcher::new(&ctx)
            .match_patterns(&patterns(query), &Row::new())
            .unwrap()
    }

    fn names(rows: &[Row], var: &str) -> Vec<String> {
        let mut names: Vec<String> = rows
            .iter()
            .map(|r| match r.get(var) {
                Some(Value::Node(n)) => n.properties["name"].as_str().unwrap().to_string(),
                other => panic!("unexpected binding {:?}", other),
            })
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_label_and_property_filter() {
        let rows = run("MATCH (n:Person {name: 'b'}) RETURN n");
        assert_eq!(names(&rows, "n"), vec!["b"]);
    }

    #[test]
    fn test_directed_and_undirected_expansion() {
        let rows = run("MATCH (a {name: 'b'})-[:KNOWS]->(x) RETURN x");
        assert_eq!(names(&rows, "x"), vec!["c"]);
        let rows = run("MATCH (a {name: 'b'})<-[:KNOWS]-(x) RETURN x");
        assert_eq!(names(&rows, "x"), vec!["a"]);
        let rows = run("MATCH (a {name: 'b'})-[:KNOWS]-(x) RETURN x");
        assert_eq!(names(&rows, "x"), vec!["a", "c"]);
    }

    #[test]
    fn test_relationship_properties() {
        let rows = run("MATCH (a)-[r:KNOWS {since: 2020}]->(b) RETURN a");
        assert_eq!(names(&rows, "a"), vec!["b"]);
    }

    #[test]
    fn test_variable_length() {
        let rows = run("MATCH (a {name: 'a'})-[:KNOWS*1..2]->(x) RETURN x");
        assert_eq!(names(&rows, "x"), vec!["b", "c"]);
        let rows = run("MATCH (a {name: 'a'})-[r*2]->(x) RETURN x");
        assert_eq!(names(&rows, "x"), vec!["c"]);
        match rows[0].get("r") {
            Some(Value::List(rels)) => assert_eq!(rels.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_relationship_bound_once_per_match() {
        let rows = run("MATCH (a)-[r1]->(b), (c)-[r2]->(d) RETURN a");
        // 3 relationships, ordered pairs of distinct ones
        assert_eq!(rows.len(), 6);
    }

    #[test]
    fn test_path_variable_and_shortest_path() {
        let rows = run("MATCH p = (a {name: 'a'})-[:KNOWS]->(b)-[:KNOWS]->(c) RETURN p");
        assert_eq!(rows.len(), 1);
        match rows[0].get("p") {
            Some(Value::Path(p)) => {
                assert_eq!(p.nodes.len(), 3);
                assert_eq!(p.length(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }

        let rows = run("MATCH p = shortestPath((a {name: 'a'})-[*]-(c {name: 'c'})) RETURN p");
        assert_eq!(rows.len(), 1);
        match rows[0].get("p") {
            Some(Value::Path(p)) => assert_eq!(p.length(), 1),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_bounds_defaults() {
        let pattern = RelationshipPattern {
            variable: None,
            types: vec![],
            direction: Direction::Outgoing,
            properties: None,
            length: Some(crate::cypher::VarLength {
                min: None,
                max: None,
            }),
        };
        assert_eq!(bounds(&pattern), (1, MAX_VARIABLE_LENGTH));
    }
}
