// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Expression evaluation
//!
//! Expressions are evaluated against a row of variable bindings. Entity
//! properties and labels are re-read through the transaction so that a
//! `SET` earlier in the statement is visible to later expressions.
//! Null propagates through operators following Cypher's ternary logic.

use super::error::{ExecutionError, ExecutionResult};
use crate::cypher::{BinaryOperator, Expression, Literal, UnaryOperator};
use crate::storage::{NodeValue, PropertyMap, RelationshipValue, Value};
use crate::txn::Transaction;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Variable bindings of one intermediate row
pub type Row = BTreeMap<String, Value>;

/// Parameters and transaction shared by every evaluation in a statement
pub struct EvalContext<'a> {
    pub params: &'a PropertyMap,
    pub txn: &'a Transaction,
}

impl<'a> EvalContext<'a> {
    pub fn new(params: &'a PropertyMap, txn: &'a Transaction) -> Self {
        Self { params, txn }
    }

    /// Evaluate a WHERE-style predicate; null and false both reject the row
    pub fn predicate(&self, expr: &Expression, row: &Row) -> ExecutionResult<bool> {
        match self.evaluate(expr, row)? {
            Value::Boolean(b) => Ok(b),
            Value::Null => Ok(false),
            other => Err(ExecutionError::TypeError(format!(
                "expected Boolean but was {}",
                other.type_name()
            ))),
        }
    }

    pub fn evaluate(&self, expr: &Expression, row: &Row) -> ExecutionResult<Value> {
        match expr {
            Expression::Literal(literal) => Ok(literal_value(literal)),
            Expression::Parameter(name) => self
                .params
                .get(name)
                .cloned()
                .ok_or_else(|| ExecutionError::MissingParameter(name.clone())),
            Expression::Variable(name) => row
                .get(name)
                .cloned()
                .ok_or_else(|| ExecutionError::UndefinedVariable(name.clone())),
            Expression::Property(target, key) => {
                let target = self.evaluate(target, row)?;
                self.property(&target, key)
            }
            Expression::Index(target, index) => {
                let target = self.evaluate(target, row)?;
                let index = self.evaluate(index, row)?;
                self.index(&target, &index)
            }
            Expression::List(items) => Ok(Value::List(
                items
                    .iter()
                    .map(|item| self.evaluate(item, row))
                    .collect::<ExecutionResult<Vec<_>>>()?,
            )),
            Expression::Map(entries) => {
                let mut map = BTreeMap::new();
                for (key, value) in entries {
                    map.insert(key.clone(), self.evaluate(value, row)?);
                }
                Ok(Value::Map(map))
            }
            Expression::Unary { operator, operand } => {
                let value = self.evaluate(operand, row)?;
                unary(*operator, value)
            }
            Expression::Binary {
                operator,
                left,
                right,
            } => self.binary(*operator, left, right, row),
            Expression::IsNull { operand, negated } => {
                let is_null = self.evaluate(operand, row)?.is_null();
                Ok(Value::Boolean(is_null != *negated))
            }
            Expression::HasLabels { operand, labels } => match self.evaluate(operand, row)? {
                Value::Null => Ok(Value::Null),
                Value::Node(node) => {
                    let current = self.current_node(&node)?;
                    Ok(Value::Boolean(
                        labels.iter().all(|l| current.labels.contains(l)),
                    ))
                }
                other => Err(ExecutionError::TypeError(format!(
                    "expected Node but was {}",
                    other.type_name()
                ))),
            },
            Expression::Function { .. } | Expression::CountStar if expr.is_aggregate_call() => {
                Err(ExecutionError::InvalidQuery(format!(
                    "Invalid use of aggregating function {} in this context",
                    expr
                )))
            }
            Expression::Function {
                name, arguments, ..
            } => {
                let args = arguments
                    .iter()
                    .map(|a| self.evaluate(a, row))
                    .collect::<ExecutionResult<Vec<_>>>()?;
                self.call_function(name, args)
            }
            Expression::CountStar => Err(ExecutionError::InvalidQuery(
                "count(*) is only allowed in a projection".to_string(),
            )),
        }
    }

    /// Latest state of a node inside this transaction, or the bound snapshot
    /// when the node has since been deleted
    pub fn current_node(&self, node: &NodeValue) -> ExecutionResult<NodeValue> {
        Ok(self.txn.get_node(node.id)?.unwrap_or_else(|| node.clone()))
    }

    pub fn current_relationship(&self, rel: &RelationshipValue) -> ExecutionResult<RelationshipValue> {
        Ok(self.txn.get_edge(rel.id)?.unwrap_or_else(|| rel.clone()))
    }

    /// Refresh every entity inside a value to its current state
    pub fn refresh(&self, value: Value) -> ExecutionResult<Value> {
        Ok(match value {
            Value::Node(node) => Value::Node(self.current_node(&node)?),
            Value::Relationship(rel) => Value::Relationship(self.current_relationship(&rel)?),
            Value::Path(mut path) => {
                for node in path.nodes.iter_mut() {
                    *node = self.current_node(node)?;
                }
                for rel in path.relationships.iter_mut() {
                    *rel = self.current_relationship(rel)?;
                }
                Value::Path(path)
            }
            Value::List(items) => Value::List(
                items
                    .into_iter()
                    .map(|v| self.refresh(v))
                    .collect::<ExecutionResult<Vec<_>>>()?,
            ),
            Value::Map(map) => {
                let mut refreshed = BTreeMap::new();
                for (k, v) in map {
                    refreshed.insert(k, self.refresh(v)?);
                }
                Value::Map(refreshed)
            }
            other => other,
        })
    }

    fn property(&self, target: &Value, key: &str) -> ExecutionResult<Value> {
        match target {
            Value::Null => Ok(Value::Null),
            Value::Node(node) => {
                let current = self.current_node(node)?;
                Ok(current.properties.get(key).cloned().unwrap_or(Value::Null))
            }
            Value::Relationship(rel) => {
                let current = self.current_relationship(rel)?;
                Ok(current.properties.get(key).cloned().unwrap_or(Value::Null))
            }
            Value::Map(map) => Ok(map.get(key).cloned().unwrap_or(Value::Null)),
            other => Err(ExecutionError::TypeError(format!(
                "expected a map but was {} accessing `{}`",
                other.type_name(),
                key
            ))),
        }
    }

    fn index(&self, target: &Value, index: &Value) -> ExecutionResult<Value> {
        match (target, index) {
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            (Value::List(items), Value::Integer(i)) => {
                let len = items.len() as i64;
                let position = if *i < 0 { len + i } else { *i };
                if position < 0 || position >= len {
                    return Ok(Value::Null);
                }
                Ok(items[position as usize].clone())
            }
            (Value::Map(_) | Value::Node(_) | Value::Relationship(_), Value::String(key)) => {
                self.property(target, key)
            }
            (target, index) => Err(ExecutionError::TypeError(format!(
                "cannot index {} with {}",
                target.type_name(),
                index.type_name()
            ))),
        }
    }

    fn binary(
        &self,
        operator: BinaryOperator,
        left: &Expression,
        right: &Expression,
        row: &Row,
    ) -> ExecutionResult<Value> {
        match operator {
            BinaryOperator::And => {
                let l = self.logical_operand(left, row)?;
                if l == Some(false) {
                    return Ok(Value::Boolean(false));
                }
                let r = self.logical_operand(right, row)?;
                Ok(match (l, r) {
                    (_, Some(false)) => Value::Boolean(false),
                    (Some(true), Some(true)) => Value::Boolean(true),
                    _ => Value::Null,
                })
            }
            BinaryOperator::Or => {
                let l = self.logical_operand(left, row)?;
                if l == Some(true) {
                    return Ok(Value::Boolean(true));
                }
                let r = self.logical_operand(right, row)?;
                Ok(match (l, r) {
                    (_, Some(true)) => Value::Boolean(true),
                    (Some(false), Some(false)) => Value::Boolean(false),
                    _ => Value::Null,
                })
            }
            BinaryOperator::Xor => {
                let l = self.logical_operand(left, row)?;
                let r = self.logical_operand(right, row)?;
                Ok(match (l, r) {
                    (Some(a), Some(b)) => Value::Boolean(a != b),
                    _ => Value::Null,
                })
            }
            _ => {
                let l = self.evaluate(left, row)?;
                let r = self.evaluate(right, row)?;
                apply_binary(operator, l, r)
            }
        }
    }

    fn logical_operand(&self, expr: &Expression, row: &Row) -> ExecutionResult<Option<bool>> {
        match self.evaluate(expr, row)? {
            Value::Boolean(b) => Ok(Some(b)),
            Value::Null => Ok(None),
            other => Err(ExecutionError::TypeError(format!(
                "expected Boolean but was {}",
                other.type_name()
            ))),
        }
    }

    /// Scalar function dispatch; names are case-insensitive
    pub fn call_function(&self, name: &str, args: Vec<Value>) -> ExecutionResult<Value> {
        let lowered = name.to_lowercase();
        let arity = |expected: usize| -> ExecutionResult<()> {
            if args.len() == expected {
                Ok(())
            } else {
                Err(ExecutionError::InvalidArgument(format!(
                    "{}() takes {} argument(s), got {}",
                    name,
                    expected,
                    args.len()
                )))
            }
        };

        match lowered.as_str() {
            "coalesce" => Ok(args.into_iter().find(|v| !v.is_null()).unwrap_or(Value::Null)),
            "timestamp" => {
                arity(0)?;
                Ok(Value::Integer(chrono::Utc::now().timestamp_millis()))
            }
            "range" => range(name, &args),
            _ => {
                arity(1)?;
                let arg = args.into_iter().next().unwrap_or(Value::Null);
                self.unary_function(name, &lowered, arg)
            }
        }
    }

    fn unary_function(&self, name: &str, lowered: &str, arg: Value) -> ExecutionResult<Value> {
        if arg.is_null() {
            return match lowered {
                "exists" => Ok(Value::Boolean(false)),
                _ if is_known_unary(lowered) => Ok(Value::Null),
                _ => Err(ExecutionError::UnknownFunction(name.to_string())),
            };
        }
        let mismatch = |expected: &str, got: &Value| {
            ExecutionError::TypeError(format!(
                "{}() expected {} but was {}",
                name,
                expected,
                got.type_name()
            ))
        };

        match (lowered, &arg) {
            ("id", Value::Node(n)) => Ok(Value::Integer(n.id.wire_id())),
            ("id", Value::Relationship(r)) => Ok(Value::Integer(r.id.wire_id())),
            ("elementid", Value::Node(n)) => Ok(Value::String(n.id.element_id())),
            ("elementid", Value::Relationship(r)) => Ok(Value::String(r.id.element_id())),
            ("id" | "elementid", other) => Err(mismatch("Node or Relationship", other)),

            ("labels", Value::Node(n)) => Ok(Value::List(
                self.current_node(n)?
                    .labels
                    .into_iter()
                    .map(Value::String)
                    .collect(),
            )),
            ("labels", other) => Err(mismatch("Node", other)),
            ("type", Value::Relationship(r)) => Ok(Value::String(r.rel_type.clone())),
            ("type", other) => Err(mismatch("Relationship", other)),

            ("properties", Value::Node(n)) => Ok(Value::Map(self.current_node(n)?.properties)),
            ("properties", Value::Relationship(r)) => {
                Ok(Value::Map(self.current_relationship(r)?.properties))
            }
            ("properties", Value::Map(m)) => Ok(Value::Map(m.clone())),
            ("properties", other) => Err(mismatch("Node, Relationship or Map", other)),
            ("keys", _) => {
                let map = match self.unary_function(name, "properties", arg.clone())? {
                    Value::Map(map) => map,
                    _ => BTreeMap::new(),
                };
                Ok(Value::List(map.into_keys().map(Value::String).collect()))
            }

            ("size", Value::List(items)) => Ok(Value::Integer(items.len() as i64)),
            ("size", Value::String(s)) => Ok(Value::Integer(s.chars().count() as i64)),
            ("size", other) => Err(mismatch("List or String", other)),
            ("length", Value::Path(p)) => Ok(Value::Integer(p.length() as i64)),
            ("length", Value::String(s)) => Ok(Value::Integer(s.chars().count() as i64)),
            ("length", other) => Err(mismatch("Path", other)),

            ("toupper", Value::String(s)) => Ok(Value::String(s.to_uppercase())),
            ("tolower", Value::String(s)) => Ok(Value::String(s.to_lowercase())),
            ("toupper" | "tolower", other) => Err(mismatch("String", other)),
            ("tostring", Value::String(s)) => Ok(Value::String(s.clone())),
            ("tostring", Value::Integer(_) | Value::Float(_) | Value::Boolean(_)) => {
                Ok(Value::String(arg.to_string()))
            }
            ("tostring", other) => Err(mismatch("a scalar", other)),
            ("tointeger", _) => to_integer(&arg).map_err(|_| mismatch("a number or String", &arg)),
            ("tofloat", _) => to_float(&arg).map_err(|_| mismatch("a number or String", &arg)),

            ("nodes", Value::Path(p)) => Ok(Value::List(
                p.nodes.iter().cloned().map(Value::Node).collect(),
            )),
            ("relationships", Value::Path(p)) => Ok(Value::List(
                p.relationships
                    .iter()
                    .cloned()
                    .map(Value::Relationship)
                    .collect(),
            )),
            ("nodes" | "relationships", other) => Err(mismatch("Path", other)),
            ("startnode", Value::Relationship(r)) => {
                Ok(self.txn.get_node(r.start)?.map_or(Value::Null, Value::Node))
            }
            ("endnode", Value::Relationship(r)) => {
                Ok(self.txn.get_node(r.end)?.map_or(Value::Null, Value::Node))
            }
            ("startnode" | "endnode", other) => Err(mismatch("Relationship", other)),

            ("head", Value::List(items)) => Ok(items.first().cloned().unwrap_or(Value::Null)),
            ("last", Value::List(items)) => Ok(items.last().cloned().unwrap_or(Value::Null)),
            ("head" | "last", other) => Err(mismatch("List", other)),
            ("abs", Value::Integer(i)) => i
                .checked_abs()
                .map(Value::Integer)
                .ok_or_else(|| ExecutionError::Arithmetic("integer overflow".to_string())),
            ("abs", Value::Float(f)) => Ok(Value::Float(f.abs())),
            ("abs", other) => Err(mismatch("a number", other)),
            ("exists", _) => Ok(Value::Boolean(true)),

            _ => Err(ExecutionError::UnknownFunction(name.to_string())),
        }
    }
}

fn is_known_unary(name: &str) -> bool {
    matches!(
        name,
        "id" | "elementid"
            | "labels"
            | "type"
            | "properties"
            | "keys"
            | "size"
            | "length"
            | "toupper"
            | "tolower"
            | "tostring"
            | "tointeger"
            | "tofloat"
            | "nodes"
            | "relationships"
            | "startnode"
            | "endnode"
            | "head"
            | "last"
            | "abs"
    )
}

pub fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Null => Value::Null,
        Literal::Boolean(b) => Value::Boolean(*b),
        Literal::Integer(i) => Value::Integer(*i),
        Literal::Float(f) => Value::Float(*f),
        Literal::String(s) => Value::String(s.clone()),
    }
}

fn unary(operator: UnaryOperator, value: Value) -> ExecutionResult<Value> {
    match (operator, value) {
        (_, Value::Null) => Ok(Value::Null),
        (UnaryOperator::Not, Value::Boolean(b)) => Ok(Value::Boolean(!b)),
        (UnaryOperator::Negate, Value::Integer(i)) => i
            .checked_neg()
            .map(Value::Integer)
            .ok_or_else(|| ExecutionError::Arithmetic("integer overflow".to_string())),
        (UnaryOperator::Negate, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOperator::Not, other) => Err(ExecutionError::TypeError(format!(
            "NOT expected Boolean but was {}",
            other.type_name()
        ))),
        (UnaryOperator::Negate, other) => Err(ExecutionError::TypeError(format!(
            "cannot negate {}",
            other.type_name()
        ))),
    }
}

/// Non-logical binary operators over already evaluated operands
pub fn apply_binary(operator: BinaryOperator, left: Value, right: Value) -> ExecutionResult<Value> {
    use BinaryOperator::*;

    match operator {
        Equal => Ok(left.cypher_eq(&right).map_or(Value::Null, Value::Boolean)),
        NotEqual => Ok(left
            .cypher_eq(&right)
            .map_or(Value::Null, |eq| Value::Boolean(!eq))),
        LessThan | LessEqual | GreaterThan | GreaterEqual => {
            if left.is_null() || right.is_null() {
                return Ok(Value::Null);
            }
            Ok(match left.compare(&right) {
                Some(ord) => Value::Boolean(match operator {
                    LessThan => ord == Ordering::Less,
                    LessEqual => ord != Ordering::Greater,
                    GreaterThan => ord == Ordering::Greater,
                    _ => ord != Ordering::Less,
                }),
                None => Value::Null,
            })
        }
        In => match right {
            Value::Null => Ok(Value::Null),
            Value::List(items) => {
                let mut saw_null = false;
                for item in &items {
                    match left.cypher_eq(item) {
                        Some(true) => return Ok(Value::Boolean(true)),
                        Some(false) => {}
                        None => saw_null = true,
                    }
                }
                Ok(if saw_null {
                    Value::Null
                } else {
                    Value::Boolean(false)
                })
            }
            other => Err(ExecutionError::TypeError(format!(
                "IN expected a List but was {}",
                other.type_name()
            ))),
        },
        StartsWith | EndsWith | Contains => match (&left, &right) {
            (Value::String(l), Value::String(r)) => Ok(Value::Boolean(match operator {
                StartsWith => l.starts_with(r.as_str()),
                EndsWith => l.ends_with(r.as_str()),
                _ => l.contains(r.as_str()),
            })),
            _ => Ok(Value::Null),
        },
        Add => add(left, right),
        Subtract | Multiply | Divide | Modulo | Power => arithmetic(operator, left, right),
        And | Or | Xor => Err(ExecutionError::InvalidQuery(
            "logical operators are evaluated lazily".to_string(),
        )),
    }
}

fn add(left: Value, right: Value) -> ExecutionResult<Value> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::List(mut a), Value::List(b)) => {
            a.extend(b);
            Ok(Value::List(a))
        }
        (Value::List(mut a), item) => {
            a.push(item);
            Ok(Value::List(a))
        }
        (item, Value::List(b)) => {
            let mut list = vec![item];
            list.extend(b);
            Ok(Value::List(list))
        }
        (Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),
        (Value::String(a), b @ (Value::Integer(_) | Value::Float(_) | Value::Boolean(_))) => {
            Ok(Value::String(format!("{}{}", a, b)))
        }
        (a @ (Value::Integer(_) | Value::Float(_) | Value::Boolean(_)), Value::String(b)) => {
            Ok(Value::String(format!("{}{}", a, b)))
        }
        (l, r) => arithmetic(BinaryOperator::Add, l, r),
    }
}

fn arithmetic(operator: BinaryOperator, left: Value, right: Value) -> ExecutionResult<Value> {
    use BinaryOperator::*;

    let overflow = || ExecutionError::Arithmetic("integer overflow".to_string());
    match (&left, &right) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Integer(a), Value::Integer(b)) if operator != Power => {
            let (a, b) = (*a, *b);
            let result = match operator {
                Add => a.checked_add(b).ok_or_else(overflow)?,
                Subtract => a.checked_sub(b).ok_or_else(overflow)?,
                Multiply => a.checked_mul(b).ok_or_else(overflow)?,
                Divide | Modulo if b == 0 => {
                    return Err(ExecutionError::Arithmetic("/ by zero".to_string()))
                }
                Divide => a.checked_div(b).ok_or_else(overflow)?,
                _ => a.checked_rem(b).ok_or_else(overflow)?,
            };
            Ok(Value::Integer(result))
        }
        (l, r) if l.is_number() && r.is_number() => {
            let (a, b) = (l.as_float().unwrap_or(0.0), r.as_float().unwrap_or(0.0));
            Ok(Value::Float(match operator {
                Add => a + b,
                Subtract => a - b,
                Multiply => a * b,
                Divide => a / b,
                Modulo => a % b,
                _ => a.powf(b),
            }))
        }
        (l, r) => Err(ExecutionError::TypeError(format!(
            "cannot apply {:?} to {} and {}",
            operator,
            l.type_name(),
            r.type_name()
        ))),
    }
}

fn to_integer(value: &Value) -> Result<Value, ()> {
    match value {
        Value::Integer(_) => Ok(value.clone()),
        Value::Float(f) => Ok(Value::Integer(f.trunc() as i64)),
        Value::Boolean(b) => Ok(Value::Integer(*b as i64)),
        Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(i) = trimmed.parse::<i64>() {
                return Ok(Value::Integer(i));
            }
            Ok(trimmed
                .parse::<f64>()
                .map_or(Value::Null, |f| Value::Integer(f.trunc() as i64)))
        }
        _ => Err(()),
    }
}

fn to_float(value: &Value) -> Result<Value, ()> {
    match value {
        Value::Float(_) => Ok(value.clone()),
        Value::Integer(i) => Ok(Value::Float(*i as f64)),
        Value::String(s) => Ok(s.trim().parse::<f64>().map_or(Value::Null, Value::Float)),
        _ => Err(()),
    }
}

fn range(name: &str, args: &[Value]) -> ExecutionResult<Value> {
    let ints: Vec<i64> = args
        .iter()
        .map(|a| {
            a.as_integer().filter(|_| matches!(a, Value::Integer(_))).ok_or_else(|| {
                ExecutionError::InvalidArgument(format!("{}() expects Integer arguments", name))
            })
        })
        .collect::<ExecutionResult<_>>()?;
    let (start, end, step) = match ints.as_slice() {
        [start, end] => (*start, *end, 1),
        [start, end, step] => (*start, *end, *step),
        _ => {
            return Err(ExecutionError::InvalidArgument(format!(
                "{}() takes 2 or 3 arguments",
                name
            )))
        }
    };
    if step == 0 {
        return Err(ExecutionError::InvalidArgument(
            "step argument to range() can't be 0".to_string(),
        ));
    }
    let mut items = Vec::new();
    let mut current = start;
    while (step > 0 && current <= end) || (step < 0 && current >= end) {
        items.push(Value::Integer(current));
        current = match current.checked_add(step) {
            Some(next) => next,
            None => break,
        };
    }
    Ok(Value::List(items))
}
