// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Statement executor
//!
//! Runs a parsed statement clause by clause over a list of intermediate
//! rows. Data statements run inside a transaction: either one supplied by
//! the caller, or an implicit one that is committed on success and rolled
//! back on the first error. Schema statements go to the constraint registry.

use super::aggregate::{extract_aggregates, Accumulator, AGGREGATE_SLOT};
use super::error::{ExecutionError, ExecutionResult};
use super::eval::{EvalContext, Row};
use super::matcher::PatternMatcher;
use super::procedures::{call_procedure, show_constraints, SHOW_CONSTRAINT_COLUMNS};
use super::result::{QueryResult, QueryStatistics, QueryType};
use crate::constraints::{Constraint, ConstraintRegistry};
use crate::cypher::{
    parse_statement, CallClause, Clause, CreateConstraint, Expression, MatchClause, MergeClause,
    NodePattern, PathKind, PatternPath, Projection, Query, RemoveItem, SetItem, Statement,
};
use crate::storage::{
    Direction, EntityRef, GraphStore, NodeValue, PathValue, PropertyMap, RelationshipValue, Value,
};
use crate::txn::{
    Transaction, TransactionError, TransactionHandle, TransactionId, TransactionManager,
    TransactionMetadata,
};
use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

/// Executes statements against the shared graph
pub struct StatementExecutor {
    store: Arc<GraphStore>,
    registry: Arc<ConstraintRegistry>,
    manager: Arc<TransactionManager>,
}

impl StatementExecutor {
    pub fn new(
        store: Arc<GraphStore>,
        registry: Arc<ConstraintRegistry>,
        manager: Arc<TransactionManager>,
    ) -> Self {
        Self {
            store,
            registry,
            manager,
        }
    }

    pub fn manager(&self) -> &Arc<TransactionManager> {
        &self.manager
    }

    pub fn registry(&self) -> &Arc<ConstraintRegistry> {
        &self.registry
    }

    /// Parse and run one statement. Without a transaction the statement
    /// runs in its own implicit one.
    pub fn execute(
        &self,
        query: &str,
        params: &PropertyMap,
        txn: Option<&TransactionHandle>,
    ) -> ExecutionResult<QueryResult> {
        let statement = parse_statement(query)?;
        match txn {
            Some(handle) => self.execute_in(&statement, params, handle),
            None => self.execute_implicit(&statement, params, TransactionMetadata::new(), |_| {}),
        }
    }

    /// Run a statement inside an open transaction, leaving its lifecycle alone
    pub fn execute_in(
        &self,
        statement: &Statement,
        params: &PropertyMap,
        txn: &Transaction,
    ) -> ExecutionResult<QueryResult> {
        match statement {
            Statement::Query(query) => self.run_query(query, params, txn),
            Statement::ShowConstraints => Ok(self.show_constraints()),
            Statement::CreateConstraint(_) | Statement::DropConstraint { .. } => {
                if txn.operation_count() > 0 {
                    return Err(ExecutionError::InvalidQuery(
                        "Tried to execute Schema modification after executing Write query"
                            .to_string(),
                    ));
                }
                self.run_schema(statement)
            }
            Statement::Begin | Statement::Commit | Statement::Rollback => Err(
                ExecutionError::TransactionState(
                    "transaction control statements need a session".to_string(),
                ),
            ),
        }
    }

    /// Run a statement in a fresh transaction. `on_begin` sees the handle
    /// before any work starts so the caller can cancel it.
    pub fn execute_implicit<F>(
        &self,
        statement: &Statement,
        params: &PropertyMap,
        metadata: TransactionMetadata,
        on_begin: F,
    ) -> ExecutionResult<QueryResult>
    where
        F: FnOnce(&TransactionHandle),
    {
        let query = match statement {
            Statement::Query(query) => query,
            Statement::ShowConstraints => return Ok(self.show_constraints()),
            Statement::CreateConstraint(_) | Statement::DropConstraint { .. } => {
                return self.run_schema(statement)
            }
            Statement::Begin | Statement::Commit | Statement::Rollback => {
                return Err(ExecutionError::TransactionState(
                    "transaction control statements need a session".to_string(),
                ))
            }
        };

        let started = Instant::now();
        let handle = self.manager.begin(metadata);
        on_begin(&handle);

        // Clauses after the last update only read, so they run once the
        // commit has assigned permanent identities
        let split = match query.clauses.iter().rposition(Clause::is_update) {
            Some(last) if last + 1 < query.clauses.len() => last + 1,
            _ => query.clauses.len(),
        };
        let (writes, reads) = query.clauses.split_at(split);

        let mut staged = match self.run_clauses(writes, vec![Row::new()], params, &handle) {
            Ok(staged) => staged,
            Err(e) => {
                if let Err(rollback) = self.manager.rollback(handle.id()) {
                    debug!("Implicit {} already closed: {}", handle.id(), rollback);
                }
                return Err(e);
            }
        };
        let summary = self.manager.commit(handle.id())?;

        if !reads.is_empty() {
            for row in &mut staged.rows {
                row.values_mut().for_each(|value| summary.id_map.rewrite(value));
            }
            let reader = self.manager.begin(TransactionMetadata::new());
            let tail = self.run_clauses(reads, staged.rows, params, &reader);
            if let Err(e) = self.manager.commit(reader.id()) {
                debug!("Read {} already closed: {}", reader.id(), e);
            }
            let tail = tail?;
            staged.rows = tail.rows;
            staged.output = tail.output;
        }

        let mut result = self.finish_query(query, staged, started, handle.id());
        result.rewrite_ids(&summary.id_map);
        result.bookmark = Some(summary.bookmark);
        Ok(result)
    }

    fn show_constraints(&self) -> QueryResult {
        QueryResult::new(
            SHOW_CONSTRAINT_COLUMNS.iter().map(|c| c.to_string()).collect(),
            show_constraints(&self.registry),
        )
    }

    fn run_schema(&self, statement: &Statement) -> ExecutionResult<QueryResult> {
        let mut result = QueryResult {
            query_type: QueryType::Schema,
            ..Default::default()
        };
        match statement {
            Statement::CreateConstraint(CreateConstraint {
                name,
                if_not_exists,
                kind,
                label,
                properties,
                ..
            }) => {
                let constraint =
                    Constraint::new(name.clone(), *kind, label.clone(), properties.clone())?;
                if self.registry.create(&self.store, constraint, *if_not_exists)? {
                    result.stats.constraints_added = 1;
                }
            }
            Statement::DropConstraint { name, if_exists } => {
                if self.registry.drop_constraint(&self.store, name, *if_exists)? {
                    result.stats.constraints_removed = 1;
                }
            }
            _ => {}
        }
        Ok(result)
    }

    fn run_query(
        &self,
        query: &Query,
        params: &PropertyMap,
        txn: &Transaction,
    ) -> ExecutionResult<QueryResult> {
        let started = Instant::now();
        let staged = self.run_clauses(&query.clauses, vec![Row::new()], params, txn)?;
        Ok(self.finish_query(query, staged, started, txn.id()))
    }

    /// Run a run of clauses over `rows`. A trailing RETURN, or a trailing
    /// CALL with outputs, produces the statement's columns.
    fn run_clauses(
        &self,
        clauses: &[Clause],
        mut rows: Vec<Row>,
        params: &PropertyMap,
        txn: &Transaction,
    ) -> ExecutionResult<Staged> {
        let ctx = EvalContext::new(params, txn);
        let mut run = QueryRun {
            ctx: &ctx,
            registry: self.registry.as_ref(),
            stats: QueryStatistics::default(),
        };

        let mut output: Option<(Vec<String>, Vec<Vec<Value>>)> = None;
        for (position, clause) in clauses.iter().enumerate() {
            if txn.cancellation_token().is_cancelled() {
                return Err(TransactionError::Terminated(txn.id()).into());
            }
            rows = match clause {
                Clause::Match(m) => run.match_clause(m, rows)?,
                Clause::Create(patterns) => run.create(patterns, rows)?,
                Clause::Merge(merge) => run.merge(merge, rows)?,
                Clause::Set(items) => run.set(items, rows)?,
                Clause::Remove(items) => run.remove(items, rows)?,
                Clause::Delete {
                    detach,
                    expressions,
                } => run.delete(*detach, expressions, rows)?,
                Clause::Unwind { expression, alias } => run.unwind(expression, alias, rows)?,
                Clause::With(projection) => run.with(projection, rows)?,
                Clause::Return(projection) => {
                    output = Some(run.return_clause(projection, rows)?);
                    Vec::new()
                }
                Clause::Call(call) => {
                    let (columns, next) = run.call(call, rows)?;
                    if position + 1 == clauses.len() && !columns.is_empty() {
                        let values = next
                            .iter()
                            .map(|r| {
                                columns
                                    .iter()
                                    .map(|c| r.get(c).cloned().unwrap_or(Value::Null))
                                    .collect()
                            })
                            .collect();
                        output = Some((columns, values));
                    }
                    next
                }
            };
        }
        Ok(Staged {
            rows,
            output,
            stats: run.stats,
        })
    }

    fn finish_query(
        &self,
        query: &Query,
        staged: Staged,
        started: Instant,
        txn: TransactionId,
    ) -> QueryResult {
        let (columns, rows) = staged.output.unwrap_or_default();
        let query_type = if query.has_updates() {
            let returns = matches!(query.clauses.last(), Some(Clause::Return(_)));
            if query.has_reads() || returns {
                QueryType::ReadWrite
            } else {
                QueryType::Write
            }
        } else {
            QueryType::Read
        };
        let elapsed = started.elapsed();
        debug!(
            "{}: {} clauses, {} rows in {:?}",
            txn,
            query.clauses.len(),
            rows.len(),
            elapsed
        );
        QueryResult {
            columns,
            rows,
            stats: staged.stats,
            query_type,
            execution_time_ms: elapsed.as_millis() as u64,
            bookmark: None,
        }
    }
}

/// Rows and output of a run of clauses
struct Staged {
    rows: Vec<Row>,
    output: Option<(Vec<String>, Vec<Vec<Value>>)>,
    stats: QueryStatistics,
}

/// Per-statement execution state
struct QueryRun<'c, 'a> {
    ctx: &'c EvalContext<'a>,
    registry: &'c ConstraintRegistry,
    stats: QueryStatistics,
}

/// Projected row, kept next to the row it came from for ORDER BY
struct Projected {
    source: Row,
    values: Row,
}

impl<'c, 'a> QueryRun<'c, 'a> {
    fn txn(&self) -> &'a Transaction {
        self.ctx.txn
    }

    fn matcher(&self) -> PatternMatcher<'c, 'a> {
        PatternMatcher::new(self.ctx)
    }

    // ----- reading -----

    fn match_clause(&mut self, clause: &MatchClause, rows: Vec<Row>) -> ExecutionResult<Vec<Row>> {
        let mut out = Vec::new();
        for row in rows {
            let mut matched = Vec::new();
            for candidate in self.matcher().match_patterns(&clause.patterns, &row)? {
                let keep = match &clause.where_clause {
                    Some(predicate) => self.ctx.predicate(predicate, &candidate)?,
                    None => true,
                };
                if keep {
                    matched.push(candidate);
                }
            }
            if matched.is_empty() && clause.optional {
                let mut row = row;
                for name in pattern_variables(&clause.patterns) {
                    row.entry(name).or_insert(Value::Null);
                }
                out.push(row);
            } else {
                out.extend(matched);
            }
        }
        Ok(out)
    }

    fn unwind(&mut self, expression: &Expression, alias: &str, rows: Vec<Row>) -> ExecutionResult<Vec<Row>> {
        let mut out = Vec::new();
        for row in rows {
            let items = match self.ctx.evaluate(expression, &row)? {
                Value::List(items) => items,
                Value::Null => Vec::new(),
                single => vec![single],
            };
            for item in items {
                let mut next = row.clone();
                next.insert(alias.to_string(), item);
                out.push(next);
            }
        }
        Ok(out)
    }

    fn call(&mut self, call: &CallClause, rows: Vec<Row>) -> ExecutionResult<(Vec<String>, Vec<Row>)> {
        let mut columns = Vec::new();
        let mut out = Vec::new();
        for row in rows {
            let args = call
                .arguments
                .iter()
                .map(|a| self.ctx.evaluate(a, &row))
                .collect::<ExecutionResult<Vec<_>>>()?;
            let output = call_procedure(&call.procedure, args, self.txn(), self.registry)?;

            let mut bindings = Vec::new();
            if call.yields.is_empty() {
                for (index, field) in output.fields.iter().enumerate() {
                    bindings.push((index, field.to_string()));
                }
            } else {
                for (field, alias) in &call.yields {
                    let index = output
                        .fields
                        .iter()
                        .position(|f| f == field)
                        .ok_or_else(|| {
                            ExecutionError::InvalidQuery(format!(
                                "Unknown procedure output: `{}`",
                                field
                            ))
                        })?;
                    bindings.push((index, alias.clone().unwrap_or_else(|| field.clone())));
                }
            }
            columns = bindings.iter().map(|(_, name)| name.clone()).collect();

            if output.fields.is_empty() {
                out.push(row);
                continue;
            }
            for values in output.rows {
                let mut next = row.clone();
                for (index, name) in &bindings {
                    next.insert(
                        name.clone(),
                        values.get(*index).cloned().unwrap_or(Value::Null),
                    );
                }
                out.push(next);
            }
        }
        debug!("CALL {} produced {} rows", call.procedure, out.len());
        Ok((columns, out))
    }

    // ----- writing -----

    fn create(&mut self, patterns: &[PatternPath], rows: Vec<Row>) -> ExecutionResult<Vec<Row>> {
        let mut out = Vec::with_capacity(rows.len());
        for mut row in rows {
            for pattern in patterns {
                self.create_path(pattern, &mut row, false)?;
            }
            out.push(row);
        }
        Ok(out)
    }

    fn create_path(&mut self, pattern: &PatternPath, row: &mut Row, merging: bool) -> ExecutionResult<()> {
        if pattern.kind != PathKind::Pattern {
            return Err(ExecutionError::InvalidQuery(
                "shortestPath cannot be used to create data".to_string(),
            ));
        }
        let mut previous = self.create_node(&pattern.start, row, merging)?;
        let mut nodes = vec![previous.clone()];
        let mut relationships = Vec::new();

        for (rel_pattern, node_pattern) in &pattern.steps {
            if rel_pattern.length.is_some() {
                return Err(ExecutionError::InvalidQuery(
                    "Variable length relationships cannot be used in CREATE".to_string(),
                ));
            }
            let [rel_type] = rel_pattern.types.as_slice() else {
                return Err(ExecutionError::InvalidQuery(
                    "Exactly one relationship type must be specified for CREATE".to_string(),
                ));
            };
            if let Some(name) = &rel_pattern.variable {
                if row.contains_key(name) && !merging {
                    return Err(ExecutionError::InvalidQuery(format!(
                        "Can't create relationship `{}`: variable already declared",
                        name
                    )));
                }
            }
            let next = self.create_node(node_pattern, row, merging)?;
            let (from, to) = match rel_pattern.direction {
                Direction::Outgoing => (previous.id, next.id),
                Direction::Incoming => (next.id, previous.id),
                Direction::Both if merging => (previous.id, next.id),
                Direction::Both => {
                    return Err(ExecutionError::InvalidQuery(
                        "Only directed relationships are supported in CREATE".to_string(),
                    ))
                }
            };
            let properties = self.write_properties(&rel_pattern.properties, row, merging)?;
            let count = properties.len();
            let rel = self.txn().create_edge(from, to, rel_type, properties)?;
            self.stats.relationships_created += 1;
            self.stats.properties_set += count;
            if let Some(name) = &rel_pattern.variable {
                row.insert(name.clone(), Value::Relationship(rel.clone()));
            }
            relationships.push(rel);
            nodes.push(next.clone());
            previous = next;
        }

        if let Some(name) = &pattern.variable {
            row.insert(
                name.clone(),
                Value::Path(PathValue {
                    nodes,
                    relationships,
                }),
            );
        }
        Ok(())
    }

    /// Create the node a pattern describes, or reuse the one its variable holds
    fn create_node(&mut self, pattern: &NodePattern, row: &mut Row, merging: bool) -> ExecutionResult<NodeValue> {
        if let Some(name) = &pattern.variable {
            if let Some(bound) = row.get(name) {
                if !merging && (!pattern.labels.is_empty() || pattern.properties.is_some()) {
                    return Err(ExecutionError::InvalidQuery(format!(
                        "Can't create node `{}` with labels or properties here. The variable is already declared in this context",
                        name
                    )));
                }
                return match bound {
                    Value::Node(node) => Ok(self.ctx.current_node(node)?),
                    other => Err(ExecutionError::InvalidQuery(format!(
                        "Failed to create relationship, node `{}` is {}",
                        name,
                        other.type_name()
                    ))),
                };
            }
        }

        let properties = self.write_properties(&pattern.properties, row, merging)?;
        let count = properties.len();
        let node = self
            .txn()
            .create_node(pattern.labels.clone(), properties)?;
        self.stats.nodes_created += 1;
        self.stats.labels_added += node.labels.len();
        self.stats.properties_set += count;
        if let Some(name) = &pattern.variable {
            row.insert(name.clone(), Value::Node(node.clone()));
        }
        Ok(node)
    }

    /// Inline properties to write. Nulls are dropped on CREATE and rejected on MERGE.
    fn write_properties(
        &self,
        properties: &Option<Expression>,
        row: &Row,
        merging: bool,
    ) -> ExecutionResult<PropertyMap> {
        let mut map = self.matcher().pattern_properties(properties, row)?;
        if merging {
            if let Some((key, _)) = map.iter().find(|(_, v)| v.is_null()) {
                return Err(ExecutionError::InvalidQuery(format!(
                    "Cannot merge the following node because of null property value for '{}'",
                    key
                )));
            }
        }
        map.retain(|_, v| !v.is_null());
        Ok(map)
    }

    fn merge(&mut self, clause: &MergeClause, rows: Vec<Row>) -> ExecutionResult<Vec<Row>> {
        let mut out = Vec::new();
        for row in rows {
            let matches = self
                .matcher()
                .match_patterns(std::slice::from_ref(&clause.pattern), &row)?;
            if matches.is_empty() {
                let mut created = row;
                self.create_path(&clause.pattern, &mut created, true)?;
                for item in &clause.on_create {
                    self.set_item(item, &mut created)?;
                }
                out.push(created);
            } else {
                for mut matched in matches {
                    for item in &clause.on_match {
                        self.set_item(item, &mut matched)?;
                    }
                    out.push(matched);
                }
            }
        }
        Ok(out)
    }

    fn set(&mut self, items: &[SetItem], rows: Vec<Row>) -> ExecutionResult<Vec<Row>> {
        let mut out = Vec::with_capacity(rows.len());
        for mut row in rows {
            for item in items {
                self.set_item(item, &mut row)?;
            }
            out.push(row);
        }
        Ok(out)
    }

    fn set_item(&mut self, item: &SetItem, row: &mut Row) -> ExecutionResult<()> {
        let variable = match item {
            SetItem::Property { variable, .. }
            | SetItem::Merge { variable, .. }
            | SetItem::Replace { variable, .. }
            | SetItem::Labels { variable, .. } => variable,
        };
        let target = row
            .get(variable)
            .cloned()
            .ok_or_else(|| ExecutionError::UndefinedVariable(variable.clone()))?;
        let entity = match &target {
            Value::Null => return Ok(()),
            Value::Node(node) => Entity::Node(node.id),
            Value::Relationship(rel) => Entity::Relationship(rel.id),
            other => {
                return Err(ExecutionError::TypeError(format!(
                    "SET expected a Node or Relationship but `{}` is {}",
                    variable,
                    other.type_name()
                )))
            }
        };
        let txn = self.txn();

        let updated = match item {
            SetItem::Property { key, value, .. } => {
                let value = self.ctx.evaluate(value, row)?;
                let changes = PropertyMap::from([(key.clone(), value)]);
                self.stats.properties_set += 1;
                match entity {
                    Entity::Node(id) => Value::Node(txn.update_node(id, &changes)?),
                    Entity::Relationship(id) => Value::Relationship(txn.update_edge(id, &changes)?),
                }
            }
            SetItem::Merge { value, .. } => {
                let changes = self.property_source(value, row)?;
                self.stats.properties_set += changes.len();
                match entity {
                    Entity::Node(id) => Value::Node(txn.update_node(id, &changes)?),
                    Entity::Relationship(id) => Value::Relationship(txn.update_edge(id, &changes)?),
                }
            }
            SetItem::Replace { value, .. } => {
                let mut replacement = self.property_source(value, row)?;
                replacement.retain(|_, v| !v.is_null());
                let previous = match &entity {
                    Entity::Node(id) => txn.get_node(*id)?.map(|n| n.properties),
                    Entity::Relationship(id) => txn.get_edge(*id)?.map(|r| r.properties),
                }
                .unwrap_or_default();
                let removed = previous
                    .keys()
                    .filter(|k| !replacement.contains_key(*k))
                    .count();
                self.stats.properties_set += replacement.len() + removed;
                match entity {
                    Entity::Node(id) => Value::Node(txn.replace_node_properties(id, &replacement)?),
                    Entity::Relationship(id) => {
                        Value::Relationship(txn.replace_edge_properties(id, &replacement)?)
                    }
                }
            }
            SetItem::Labels { labels, .. } => {
                let Entity::Node(id) = entity else {
                    return Err(ExecutionError::TypeError(format!(
                        "cannot set labels on relationship `{}`",
                        variable
                    )));
                };
                let before = txn.get_node(id)?.map_or(0, |n| n.labels.len());
                let node = txn.add_labels(id, labels)?;
                self.stats.labels_added += node.labels.len().saturating_sub(before);
                Value::Node(node)
            }
        };
        row.insert(variable.clone(), updated);
        Ok(())
    }

    /// Properties to copy from a map, node or relationship
    fn property_source(&self, expr: &Expression, row: &Row) -> ExecutionResult<PropertyMap> {
        match self.ctx.evaluate(expr, row)? {
            Value::Map(map) => Ok(map),
            Value::Node(node) => Ok(self.ctx.current_node(&node)?.properties),
            Value::Relationship(rel) => Ok(self.ctx.current_relationship(&rel)?.properties),
            Value::Null => Ok(PropertyMap::new()),
            other => Err(ExecutionError::TypeError(format!(
                "expected a map but was {}",
                other.type_name()
            ))),
        }
    }

    fn remove(&mut self, items: &[RemoveItem], rows: Vec<Row>) -> ExecutionResult<Vec<Row>> {
        let txn = self.txn();
        let mut out = Vec::with_capacity(rows.len());
        for mut row in rows {
            for item in items {
                let variable = match item {
                    RemoveItem::Property { variable, .. } | RemoveItem::Labels { variable, .. } => {
                        variable
                    }
                };
                let target = row
                    .get(variable)
                    .cloned()
                    .ok_or_else(|| ExecutionError::UndefinedVariable(variable.clone()))?;
                let updated = match (item, target) {
                    (_, Value::Null) => continue,
                    (RemoveItem::Property { key, .. }, Value::Node(node)) => {
                        let current = self.ctx.current_node(&node)?;
                        if current.properties.contains_key(key) {
                            self.stats.properties_set += 1;
                        }
                        Value::Node(txn.remove_node_properties(node.id, std::slice::from_ref(key))?)
                    }
                    (RemoveItem::Property { key, .. }, Value::Relationship(rel)) => {
                        let current = self.ctx.current_relationship(&rel)?;
                        if current.properties.contains_key(key) {
                            self.stats.properties_set += 1;
                        }
                        Value::Relationship(
                            txn.remove_edge_properties(rel.id, std::slice::from_ref(key))?,
                        )
                    }
                    (RemoveItem::Labels { labels, .. }, Value::Node(node)) => {
                        let before = self.ctx.current_node(&node)?.labels.len();
                        let updated = txn.remove_labels(node.id, labels)?;
                        self.stats.labels_removed += before.saturating_sub(updated.labels.len());
                        Value::Node(updated)
                    }
                    (_, other) => {
                        return Err(ExecutionError::TypeError(format!(
                            "REMOVE expected a Node or Relationship but `{}` is {}",
                            variable,
                            other.type_name()
                        )))
                    }
                };
                row.insert(variable.clone(), updated);
            }
            out.push(row);
        }
        Ok(out)
    }

    /// Delete every entity the expressions name across all rows.
    /// Relationships go first so a node deleted with its relationships in
    /// the same clause does not trip the attached-relationship check.
    fn delete(&mut self, detach: bool, expressions: &[Expression], rows: Vec<Row>) -> ExecutionResult<Vec<Row>> {
        let mut nodes: Vec<EntityRef> = Vec::new();
        let mut relationships: Vec<EntityRef> = Vec::new();
        let mut seen = HashSet::new();
        for row in &rows {
            for expr in expressions {
                let value = self.ctx.evaluate(expr, row)?;
                collect_deletions(value, &mut nodes, &mut relationships, &mut seen)?;
            }
        }

        let txn = self.txn();
        for rel in relationships {
            if txn.get_edge(rel)?.is_some() {
                txn.delete_edge(rel)?;
                self.stats.relationships_deleted += 1;
            }
        }
        for node in nodes {
            if txn.get_node(node)?.is_none() {
                continue;
            }
            if detach {
                self.stats.relationships_deleted += txn.detach_delete_node(node)?;
            } else {
                txn.delete_node(node)?;
            }
            self.stats.nodes_deleted += 1;
        }
        Ok(rows)
    }

    // ----- projection -----

    fn with(&mut self, projection: &Projection, rows: Vec<Row>) -> ExecutionResult<Vec<Row>> {
        for item in &projection.items {
            if item.alias.is_none() && !matches!(item.expression, Expression::Variable(_)) {
                return Err(ExecutionError::InvalidQuery(format!(
                    "Expression in WITH must be aliased (use AS): {}",
                    item.expression
                )));
            }
        }
        let (_, projected) = self.project(projection, rows)?;
        let mut out = Vec::with_capacity(projected.len());
        for row in projected {
            let keep = match &projection.where_clause {
                Some(predicate) => self.ctx.predicate(predicate, &row)?,
                None => true,
            };
            if keep {
                out.push(row);
            }
        }
        Ok(out)
    }

    fn return_clause(
        &mut self,
        projection: &Projection,
        rows: Vec<Row>,
    ) -> ExecutionResult<(Vec<String>, Vec<Vec<Value>>)> {
        let (columns, projected) = self.project(projection, rows)?;
        let mut out = Vec::with_capacity(projected.len());
        for mut row in projected {
            let mut values = Vec::with_capacity(columns.len());
            for column in &columns {
                let value = row.remove(column).unwrap_or(Value::Null);
                values.push(self.ctx.refresh(value)?);
            }
            out.push(values);
        }
        Ok((columns, out))
    }

    /// Evaluate projection items with grouping, DISTINCT, ORDER BY, SKIP and LIMIT
    fn project(&mut self, projection: &Projection, rows: Vec<Row>) -> ExecutionResult<(Vec<String>, Vec<Row>)> {
        let mut items: Vec<(String, Expression)> = Vec::new();
        if projection.star {
            let mut names: Vec<String> = rows
                .first()
                .map(|r| r.keys().filter(|k| !is_hidden(k)).cloned().collect())
                .unwrap_or_default();
            if names.is_empty() && !rows.is_empty() && projection.items.is_empty() {
                return Err(ExecutionError::InvalidQuery(
                    "RETURN * is not allowed when there are no variables in scope".to_string(),
                ));
            }
            names.sort();
            items.extend(names.into_iter().map(|n| (n.clone(), Expression::Variable(n))));
        }
        for item in &projection.items {
            items.push((item.column_name(), item.expression.clone()));
        }
        let mut columns: Vec<String> = Vec::with_capacity(items.len());
        for (name, _) in &items {
            if columns.contains(name) {
                return Err(ExecutionError::InvalidQuery(format!(
                    "Multiple result columns with the same name are not supported: {}",
                    name
                )));
            }
            columns.push(name.clone());
        }

        let mut projected = if items.iter().any(|(_, e)| e.contains_aggregate()) {
            self.aggregate(&items, rows)?
        } else {
            let mut out = Vec::with_capacity(rows.len());
            for row in rows {
                let mut values = Row::new();
                for (name, expr) in &items {
                    values.insert(name.clone(), self.ctx.evaluate(expr, &row)?);
                }
                out.push(Projected { source: row, values });
            }
            out
        };

        if projection.distinct {
            let mut seen = HashSet::new();
            projected.retain(|p| {
                let key: Vec<String> = columns
                    .iter()
                    .map(|c| p.values.get(c).map_or_else(|| "z".to_string(), Value::canonical_key))
                    .collect();
                seen.insert(key)
            });
        }

        if !projection.order_by.is_empty() {
            let mut keyed = Vec::with_capacity(projected.len());
            for p in projected {
                let mut scope = p.source.clone();
                scope.extend(p.values.iter().map(|(k, v)| (k.clone(), v.clone())));
                let mut keys = Vec::with_capacity(projection.order_by.len());
                for sort in &projection.order_by {
                    let value = match items.iter().find(|(_, e)| *e == sort.expression) {
                        Some((name, _)) => p.values.get(name).cloned().unwrap_or(Value::Null),
                        None => self.ctx.evaluate(&sort.expression, &scope)?,
                    };
                    keys.push(value);
                }
                keyed.push((keys, p));
            }
            keyed.sort_by(|(a, _), (b, _)| {
                for ((x, y), sort) in a.iter().zip(b.iter()).zip(&projection.order_by) {
                    let ord = x.order_cmp(y);
                    let ord = if sort.descending { ord.reverse() } else { ord };
                    if ord != std::cmp::Ordering::Equal {
                        return ord;
                    }
                }
                std::cmp::Ordering::Equal
            });
            projected = keyed.into_iter().map(|(_, p)| p).collect();
        }

        let skip = self.row_count(&projection.skip, "SKIP")?.unwrap_or(0);
        let limit = self.row_count(&projection.limit, "LIMIT")?;
        let rows = projected
            .into_iter()
            .skip(skip)
            .take(limit.unwrap_or(usize::MAX))
            .map(|p| p.values)
            .collect();
        Ok((columns, rows))
    }

    fn aggregate(&mut self, items: &[(String, Expression)], rows: Vec<Row>) -> ExecutionResult<Vec<Projected>> {
        struct Group {
            source: Row,
            keys: Vec<Value>,
            accumulators: Vec<Accumulator>,
        }

        let mut calls = Vec::new();
        let mut plan = Vec::with_capacity(items.len());
        for (name, expr) in items {
            if expr.contains_aggregate() {
                plan.push((name, Some(extract_aggregates(expr, &mut calls))));
            } else {
                plan.push((name, None));
            }
        }
        let grouping: Vec<&Expression> = items
            .iter()
            .filter(|(_, e)| !e.contains_aggregate())
            .map(|(_, e)| e)
            .collect();
        let mut arguments = Vec::with_capacity(calls.len());
        let fresh = |arguments: &mut Vec<Option<Expression>>| -> ExecutionResult<Vec<Accumulator>> {
            arguments.clear();
            let mut accumulators = Vec::with_capacity(calls.len());
            for call in &calls {
                let (acc, arg) = Accumulator::for_call(call)?;
                accumulators.push(acc);
                arguments.push(arg);
            }
            Ok(accumulators)
        };

        let mut groups: Vec<Group> = Vec::new();
        let mut index: HashMap<Vec<String>, usize> = HashMap::new();
        for row in rows {
            let keys = grouping
                .iter()
                .map(|e| self.ctx.evaluate(e, &row))
                .collect::<ExecutionResult<Vec<_>>>()?;
            let canonical: Vec<String> = keys.iter().map(Value::canonical_key).collect();
            let slot = match index.get(&canonical) {
                Some(slot) => *slot,
                None => {
                    let accumulators = fresh(&mut arguments)?;
                    groups.push(Group {
                        source: row.clone(),
                        keys,
                        accumulators,
                    });
                    index.insert(canonical, groups.len() - 1);
                    groups.len() - 1
                }
            };
            let group = &mut groups[slot];
            for (acc, arg) in group.accumulators.iter_mut().zip(&arguments) {
                let value = match arg {
                    Some(expr) => self.ctx.evaluate(expr, &row)?,
                    None => Value::Boolean(true),
                };
                acc.update(value)?;
            }
        }
        if groups.is_empty() && grouping.is_empty() {
            let accumulators = fresh(&mut arguments)?;
            groups.push(Group {
                source: Row::new(),
                keys: Vec::new(),
                accumulators,
            });
        }

        let mut out = Vec::with_capacity(groups.len());
        for group in groups {
            let mut scope = group.source.clone();
            for (i, acc) in group.accumulators.into_iter().enumerate() {
                scope.insert(format!("{}{}", AGGREGATE_SLOT, i), acc.finish());
            }
            let mut keys = group.keys.into_iter();
            let mut values = Row::new();
            for (name, rewritten) in &plan {
                let value = match rewritten {
                    Some(expr) => self.ctx.evaluate(expr, &scope)?,
                    None => keys.next().unwrap_or(Value::Null),
                };
                values.insert((*name).clone(), value);
            }
            scope.retain(|k, _| !is_hidden(k));
            out.push(Projected {
                source: scope,
                values,
            });
        }
        Ok(out)
    }

    fn row_count(&self, expr: &Option<Expression>, clause: &str) -> ExecutionResult<Option<usize>> {
        let Some(expr) = expr else {
            return Ok(None);
        };
        match self.ctx.evaluate(expr, &Row::new())? {
            Value::Integer(n) if n >= 0 => Ok(Some(n as usize)),
            other => Err(ExecutionError::InvalidArgument(format!(
                "Invalid input. '{}' is not a valid value. Must be a non-negative integer for {}",
                other, clause
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Entity {
    Node(EntityRef),
    Relationship(EntityRef),
}

fn is_hidden(name: &str) -> bool {
    name.starts_with(AGGREGATE_SLOT)
}

/// Every variable a list of patterns introduces
fn pattern_variables(patterns: &[PatternPath]) -> Vec<String> {
    let mut names = Vec::new();
    for pattern in patterns {
        names.extend(pattern.variable.clone());
        names.extend(pattern.nodes().filter_map(|n| n.variable.clone()));
        names.extend(pattern.relationships().filter_map(|r| r.variable.clone()));
    }
    names
}

fn collect_deletions(
    value: Value,
    nodes: &mut Vec<EntityRef>,
    relationships: &mut Vec<EntityRef>,
    seen: &mut HashSet<(bool, EntityRef)>,
) -> ExecutionResult<()> {
    match value {
        Value::Null => {}
        Value::Node(NodeValue { id, .. }) => {
            if seen.insert((true, id)) {
                nodes.push(id);
            }
        }
        Value::Relationship(RelationshipValue { id, .. }) => {
            if seen.insert((false, id)) {
                relationships.push(id);
            }
        }
        Value::Path(path) => {
            for rel in path.relationships {
                collect_deletions(Value::Relationship(rel), nodes, relationships, seen)?;
            }
            for node in path.nodes {
                collect_deletions(Value::Node(node), nodes, relationships, seen)?;
            }
        }
        Value::List(items) => {
            for item in items {
                collect_deletions(item, nodes, relationships, seen)?;
            }
        }
        other => {
            warn!("DELETE of a {} value rejected", other.type_name());
            return Err(ExecutionError::TypeError(format!(
                "DELETE expected a Node, Relationship or Path but was {}",
                other.type_name()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::ConstraintKind;

    fn executor() -> StatementExecutor {
        let store = Arc::new(GraphStore::memory().unwrap());
        let registry = Arc::new(ConstraintRegistry::new());
        let manager = Arc::new(TransactionManager::new(store.clone(), registry.clone()));
        StatementExecutor::new(store, registry, manager)
    }

    fn run(executor: &StatementExecutor, query: &str) -> QueryResult {
        executor
            .execute(query, &PropertyMap::new(), None)
            .unwrap_or_else(|e| panic!("{} failed: {}", query, e))
    }

    fn seed(executor: &StatementExecutor) {
        run(
            executor,
            "CREATE (a:Person {name: 'Ann', age: 31})-[:KNOWS {since: 2019}]->(b:Person {name: 'Bob', age: 25}), \
             (b)-[:KNOWS]->(c:Person {name: 'Cid', age: 40}), (a)-[:WORKS_AT]->(:Company {name: 'Acme'})",
        );
    }

    #[test]
    fn test_create_reports_statistics_and_permanent_ids() {
        let executor = executor();
        let result = run(&executor, "CREATE (n:Person {name: 'Ann', nick: null}) RETURN n, id(n) AS id");
        assert_eq!(result.stats.nodes_created, 1);
        assert_eq!(result.stats.labels_added, 1);
        assert_eq!(result.stats.properties_set, 1);
        assert_eq!(result.query_type, QueryType::ReadWrite);
        assert!(result.bookmark.is_some());
        match &result.rows[0][0] {
            Value::Node(node) => assert!(!node.id.is_temporary()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_boolean_and_null_map_values() {
        let executor = executor();
        let created = run(
            &executor,
            "CREATE (n:P {active: true, retired: false, nick: null}) RETURN n.active, n.retired",
        );
        assert_eq!(created.rows[0], vec![Value::Boolean(true), Value::Boolean(false)]);
        assert_eq!(created.stats.properties_set, 2);

        let matched = run(&executor, "MATCH (n:P {retired: false}) RETURN count(n)");
        assert_eq!(matched.rows[0][0], Value::Integer(1));

        let literal = run(&executor, "RETURN {a: null, b: NOT true} AS m");
        assert_eq!(
            literal.rows[0][0],
            Value::Map(PropertyMap::from([
                ("a".to_string(), Value::Null),
                ("b".to_string(), Value::Boolean(false)),
            ]))
        );
    }

    #[test]
    fn test_match_where_order_skip_limit() {
        let executor = executor();
        seed(&executor);
        let result = run(
            &executor,
            "MATCH (p:Person) WHERE p.age > 20 RETURN p.name AS name ORDER BY p.age DESC SKIP 1 LIMIT 1",
        );
        assert_eq!(result.columns, vec!["name"]);
        assert_eq!(result.rows, vec![vec![Value::from("Ann")]]);
        assert_eq!(result.query_type, QueryType::Read);
    }

    #[test]
    fn test_aggregation_groups_and_empty_input() {
        let executor = executor();
        seed(&executor);
        let result = run(
            &executor,
            "MATCH (a:Person)-[:KNOWS]->(b) RETURN a.name AS name, count(*) AS friends ORDER BY name",
        );
        assert_eq!(
            result.rows,
            vec![
                vec![Value::from("Ann"), Value::Integer(1)],
                vec![Value::from("Bob"), Value::Integer(1)],
            ]
        );

        let result = run(&executor, "MATCH (n:Missing) RETURN count(n) AS c, collect(n) AS items");
        assert_eq!(result.rows, vec![vec![Value::Integer(0), Value::List(vec![])]]);

        let result = run(&executor, "MATCH (p:Person) RETURN sum(p.age) + 1 AS total, avg(p.age) AS mean");
        assert_eq!(result.rows[0][0], Value::Integer(97));
        assert_eq!(result.rows[0][1], Value::Float(32.0));
    }

    #[test]
    fn test_optional_match_binds_null() {
        let executor = executor();
        seed(&executor);
        let result = run(
            &executor,
            "MATCH (c:Company) OPTIONAL MATCH (c)-[:OWNS]->(x) RETURN c.name, x",
        );
        assert_eq!(result.rows, vec![vec![Value::from("Acme"), Value::Null]]);
    }

    #[test]
    fn test_with_distinct_and_where() {
        let executor = executor();
        seed(&executor);
        let result = run(
            &executor,
            "MATCH (p:Person)-[:KNOWS]-(q) WITH DISTINCT p WHERE p.age < 35 RETURN p.name ORDER BY p.name",
        );
        assert_eq!(result.columns, vec!["p.name"]);
        assert_eq!(
            result.rows,
            vec![vec![Value::from("Ann")], vec![Value::from("Bob")]]
        );
        let err = executor
            .execute("MATCH (p) WITH p.name RETURN 1", &PropertyMap::new(), None)
            .unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidQuery(_)));
    }

    #[test]
    fn test_unwind_and_merge() {
        let executor = executor();
        let result = run(
            &executor,
            "UNWIND ['a', 'b', 'a'] AS name MERGE (t:Tag {name: name}) ON CREATE SET t.created = true RETURN count(t)",
        );
        assert_eq!(result.stats.nodes_created, 2);
        assert_eq!(result.rows[0][0], Value::Integer(3));

        let result = run(
            &executor,
            "MERGE (t:Tag {name: 'a'}) ON MATCH SET t.seen = 1 RETURN t.seen, t.created",
        );
        assert_eq!(result.stats.nodes_created, 0);
        assert_eq!(result.rows[0], vec![Value::Integer(1), Value::Boolean(true)]);
    }

    #[test]
    fn test_set_and_remove() {
        let executor = executor();
        seed(&executor);
        let result = run(
            &executor,
            "MATCH (p:Person {name: 'Ann'}) SET p.age = 32, p:Admin, p += {city: 'Oslo'} RETURN p.age, labels(p)",
        );
        assert_eq!(result.stats.properties_set, 2);
        assert_eq!(result.stats.labels_added, 1);
        assert_eq!(result.rows[0][0], Value::Integer(32));
        assert_eq!(
            result.rows[0][1],
            Value::List(vec![Value::from("Person"), Value::from("Admin")])
        );

        let result = run(&executor, "MATCH (p:Admin) REMOVE p:Admin, p.city RETURN p");
        assert_eq!(result.stats.labels_removed, 1);
        assert_eq!(result.stats.properties_set, 1);

        let result = run(&executor, "MATCH (p:Person {name: 'Bob'}) SET p = {name: 'Rob'} RETURN p");
        match &result.rows[0][0] {
            Value::Node(n) => {
                assert_eq!(n.properties.len(), 1);
                assert_eq!(n.properties["name"], Value::from("Rob"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_delete_node_with_relationships_fails() {
        let executor = executor();
        seed(&executor);
        let err = executor
            .execute("MATCH (p:Person {name: 'Bob'}) DELETE p", &PropertyMap::new(), None)
            .unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::Transaction(TransactionError::Storage(
                crate::storage::StorageError::NodeHasRelationships(_)
            ))
        ));
        // nothing applied
        let result = run(&executor, "MATCH (p:Person) RETURN count(p)");
        assert_eq!(result.rows[0][0], Value::Integer(3));

        let result = run(&executor, "MATCH (p:Person {name: 'Bob'}) DETACH DELETE p");
        assert_eq!(result.stats.nodes_deleted, 1);
        assert_eq!(result.stats.relationships_deleted, 2);
        assert_eq!(result.query_type, QueryType::ReadWrite);

        let result = run(&executor, "MATCH (a)-[r]-(b) DELETE r, a, b");
        assert_eq!(result.stats.relationships_deleted, 1);
        assert_eq!(result.stats.nodes_deleted, 2);
    }

    #[test]
    fn test_failed_implicit_statement_leaves_no_trace() {
        let executor = executor();
        let err = executor.execute(
            "CREATE (a:Thing {n: 1}) WITH a MATCH (x:Thing) RETURN x.n / 0",
            &PropertyMap::new(),
            None,
        );
        assert!(err.is_err());
        let result = run(&executor, "MATCH (x:Thing) RETURN count(x)");
        assert_eq!(result.rows[0][0], Value::Integer(0));
    }

    #[test]
    fn test_implicit_identity_functions_report_permanent_ids() {
        let executor = executor();
        let created = run(
            &executor,
            "CREATE (a:Person)-[r:KNOWS]->(b:Person) \
             WITH a, r, b, id(a) AS first \
             RETURN first, id(r) AS rel, elementId(b) AS element, [id(a), id(b)] AS both",
        );
        let first = created.rows[0][0].as_integer().unwrap();
        let rel = created.rows[0][1].as_integer().unwrap();
        assert!(first >= 0 && rel >= 0, "{:?}", created.rows[0]);
        let both = created.rows[0][3].as_list().unwrap().to_vec();
        assert_eq!(both[0], Value::Integer(first));

        let matched = run(
            &executor,
            "MATCH (a:Person)-[r:KNOWS]->(b:Person) RETURN id(a), id(r), elementId(b), id(b)",
        );
        assert_eq!(matched.rows[0][0], Value::Integer(first));
        assert_eq!(matched.rows[0][1], Value::Integer(rel));
        assert_eq!(matched.rows[0][2], created.rows[0][2]);
        assert_eq!(matched.rows[0][3], both[1]);
        assert_eq!(created.stats.nodes_created, 2);
        assert_eq!(executor.manager().statistics().active_transactions, 0);
    }

    #[test]
    fn test_explicit_transaction_keeps_temporary_ids_until_commit() {
        let executor = executor();
        let txn = executor.manager().begin(TransactionMetadata::new());
        let result = executor
            .execute("CREATE (n:Person) RETURN id(n) AS id", &PropertyMap::new(), Some(&txn))
            .unwrap();
        assert_eq!(result.rows[0][0], Value::Integer(-1));
        assert!(result.bookmark.is_none());

        let other = run(&executor, "MATCH (n:Person) RETURN count(n)");
        assert_eq!(other.rows[0][0], Value::Integer(0));

        executor.manager().commit(txn.id()).unwrap();
        let after = run(&executor, "MATCH (n:Person) RETURN count(n)");
        assert_eq!(after.rows[0][0], Value::Integer(1));
    }

    #[test]
    fn test_constraint_statements() {
        let executor = executor();
        let result = run(
            &executor,
            "CREATE CONSTRAINT user_email FOR (u:User) REQUIRE u.email IS UNIQUE",
        );
        assert_eq!(result.query_type, QueryType::Schema);
        assert_eq!(result.stats.constraints_added, 1);
        assert_eq!(executor.registry().list()[0].kind, ConstraintKind::Unique);

        let shown = run(&executor, "SHOW CONSTRAINTS");
        assert_eq!(shown.get(0, "name"), Some(&Value::from("user_email")));

        let err = executor
            .execute(
                "CREATE (:User {email: 'a@x.com'}), (:User {email: 'a@x.com'})",
                &PropertyMap::new(),
                None,
            )
            .unwrap_err();
        assert!(err.violation().is_some());

        let result = run(&executor, "DROP CONSTRAINT user_email");
        assert_eq!(result.stats.constraints_removed, 1);
        let result = run(&executor, "DROP CONSTRAINT user_email IF EXISTS");
        assert_eq!(result.stats.constraints_removed, 0);
    }

    #[test]
    fn test_procedures() {
        let executor = executor();
        seed(&executor);
        let result = run(&executor, "CALL db.labels() YIELD label RETURN label ORDER BY label");
        assert_eq!(
            result.rows,
            vec![vec![Value::from("Company")], vec![Value::from("Person")]]
        );
        let result = run(&executor, "CALL db.relationshipTypes()");
        assert_eq!(result.columns, vec!["relationshipType"]);
        assert_eq!(result.rows.len(), 2);

        let txn = executor.manager().begin(TransactionMetadata::new());
        executor
            .execute("CALL tx.setMetaData({app: 'x'})", &PropertyMap::new(), Some(&txn))
            .unwrap();
        assert_eq!(
            txn.get_metadata().entries().get("app"),
            Some(&Value::from("x"))
        );
    }

    #[test]
    fn test_shortest_path_query() {
        let executor = executor();
        seed(&executor);
        let result = run(
            &executor,
            "MATCH p = shortestPath((a:Person {name: 'Ann'})-[:KNOWS*]->(c:Person {name: 'Cid'})) \
             RETURN length(p) AS hops, size(nodes(p)) AS visited",
        );
        assert_eq!(result.rows[0], vec![Value::Integer(2), Value::Integer(3)]);
    }

    #[test]
    fn test_parameters() {
        let executor = executor();
        let mut params = PropertyMap::new();
        params.insert("name".to_string(), Value::from("Zed"));
        params.insert(
            "props".to_string(),
            Value::Map(PropertyMap::from([("age".to_string(), Value::Integer(3))])),
        );
        let result = executor
            .execute(
                "CREATE (n:Person $props) SET n.name = $name RETURN n.name, n.age",
                &params,
                None,
            )
            .unwrap();
        assert_eq!(result.rows[0], vec![Value::from("Zed"), Value::Integer(3)]);
        let err = executor
            .execute("RETURN $missing", &PropertyMap::new(), None)
            .unwrap_err();
        assert!(matches!(err, ExecutionError::MissingParameter(_)));
    }
}
