// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Aggregating functions for grouped projections

use super::error::{ExecutionError, ExecutionResult};
use crate::cypher::Expression;
use crate::storage::Value;
use std::cmp::Ordering;
use std::collections::HashSet;

/// Prefix of the hidden row variables that carry aggregate results
pub(crate) const AGGREGATE_SLOT: &str = " agg";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AggregateKind {
    Count,
    Collect,
    Sum,
    Avg,
    Min,
    Max,
}

#[derive(Debug)]
enum State {
    Count(i64),
    Collect(Vec<Value>),
    Sum { int: i64, float: f64, is_float: bool },
    Avg { total: f64, count: usize },
    Extreme(Option<Value>),
}

/// Running state of one aggregate call within one group
#[derive(Debug)]
pub struct Accumulator {
    kind: AggregateKind,
    distinct: bool,
    seen: HashSet<String>,
    state: State,
}

impl Accumulator {
    /// Accumulator for an aggregate call, plus the argument to feed it.
    /// `count(*)` has no argument.
    pub fn for_call(expr: &Expression) -> ExecutionResult<(Self, Option<Expression>)> {
        let (name, distinct, argument) = match expr {
            Expression::CountStar => ("count".to_string(), false, None),
            Expression::Function {
                name,
                distinct,
                arguments,
            } => {
                if arguments.len() != 1 {
                    return Err(ExecutionError::InvalidArgument(format!(
                        "{}() takes exactly one argument",
                        name
                    )));
                }
                (name.to_lowercase(), *distinct, arguments.first().cloned())
            }
            other => {
                return Err(ExecutionError::InvalidQuery(format!(
                    "{} is not an aggregate",
                    other
                )))
            }
        };
        let kind = match name.as_str() {
            "count" => AggregateKind::Count,
            "collect" => AggregateKind::Collect,
            "sum" => AggregateKind::Sum,
            "avg" => AggregateKind::Avg,
            "min" => AggregateKind::Min,
            "max" => AggregateKind::Max,
            _ => return Err(ExecutionError::UnknownFunction(name)),
        };
        let state = match kind {
            AggregateKind::Count => State::Count(0),
            AggregateKind::Collect => State::Collect(Vec::new()),
            AggregateKind::Sum => State::Sum {
                int: 0,
                float: 0.0,
                is_float: false,
            },
            AggregateKind::Avg => State::Avg {
                total: 0.0,
                count: 0,
            },
            AggregateKind::Min | AggregateKind::Max => State::Extreme(None),
        };
        Ok((
            Self {
                kind,
                distinct,
                seen: HashSet::new(),
                state,
            },
            argument,
        ))
    }

    /// Feed one value; nulls are ignored by every aggregate
    pub fn update(&mut self, value: Value) -> ExecutionResult<()> {
        if value.is_null() {
            return Ok(());
        }
        if self.distinct && !self.seen.insert(value.canonical_key()) {
            return Ok(());
        }
        let kind = self.kind;
        match &mut self.state {
            State::Count(count) => *count += 1,
            State::Collect(items) => items.push(value),
            State::Sum {
                int,
                float,
                is_float,
            } => match value {
                Value::Integer(i) if !*is_float => {
                    *int = int.checked_add(i).ok_or_else(|| {
                        ExecutionError::Arithmetic("integer overflow in sum()".to_string())
                    })?;
                }
                Value::Integer(i) => *float += i as f64,
                Value::Float(f) => {
                    if !*is_float {
                        *is_float = true;
                        *float = *int as f64;
                    }
                    *float += f;
                }
                other => {
                    return Err(ExecutionError::TypeError(format!(
                        "sum() expected a number but was {}",
                        other.type_name()
                    )))
                }
            },
            State::Avg { total, count } => match value.as_float() {
                Some(f) if value.is_number() => {
                    *total += f;
                    *count += 1;
                }
                _ => {
                    return Err(ExecutionError::TypeError(format!(
                        "avg() expected a number but was {}",
                        value.type_name()
                    )))
                }
            },
            State::Extreme(current) => {
                let replace = match current {
                    None => true,
                    Some(existing) => {
                        let ord = value.order_cmp(existing);
                        match kind {
                            AggregateKind::Min => ord == Ordering::Less,
                            _ => ord == Ordering::Greater,
                        }
                    }
                };
                if replace {
                    *current = Some(value);
                }
            }
        }
        Ok(())
    }

    pub fn finish(self) -> Value {
        match self.state {
            State::Count(count) => Value::Integer(count),
            State::Collect(items) => Value::List(items),
            State::Sum {
                int,
                float,
                is_float,
            } => {
                if is_float {
                    Value::Float(float)
                } else {
                    Value::Integer(int)
                }
            }
            State::Avg { total, count } => {
                if count == 0 {
                    Value::Null
                } else {
                    Value::Float(total / count as f64)
                }
            }
            State::Extreme(value) => value.unwrap_or(Value::Null),
        }
    }
}

/// Replace every aggregate call in `expr` with a hidden slot variable,
/// collecting the calls in slot order
pub fn extract_aggregates(expr: &Expression, calls: &mut Vec<Expression>) -> Expression {
    if expr.is_aggregate_call() {
        let slot = format!("{}{}", AGGREGATE_SLOT, calls.len());
        calls.push(expr.clone());
        return Expression::Variable(slot);
    }
    let mut recurse = |e: &Expression| Box::new(extract_aggregates(e, calls));
    match expr {
        Expression::Property(target, key) => Expression::Property(recurse(target), key.clone()),
        Expression::Index(target, index) => {
            let target = recurse(target);
            Expression::Index(target, recurse(index))
        }
        Expression::Unary { operator, operand } => Expression::Unary {
            operator: *operator,
            operand: recurse(operand),
        },
        Expression::Binary {
            operator,
            left,
            right,
        } => {
            let left = recurse(left);
            Expression::Binary {
                operator: *operator,
                left,
                right: recurse(right),
            }
        }
        Expression::IsNull { operand, negated } => Expression::IsNull {
            operand: recurse(operand),
            negated: *negated,
        },
        Expression::HasLabels { operand, labels } => Expression::HasLabels {
            operand: recurse(operand),
            labels: labels.clone(),
        },
        Expression::List(items) => {
            Expression::List(items.iter().map(|e| *recurse(e)).collect())
        }
        Expression::Map(entries) => Expression::Map(
            entries
                .iter()
                .map(|(k, e)| (k.clone(), *recurse(e)))
                .collect(),
        ),
        Expression::Function {
            name,
            distinct,
            arguments,
        } => Expression::Function {
            name: name.clone(),
            distinct: *distinct,
            arguments: arguments.iter().map(|e| *recurse(e)).collect(),
        },
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, distinct: bool) -> Expression {
        Expression::Function {
            name: name.to_string(),
            distinct,
            arguments: vec![Expression::variable("x")],
        }
    }

    fn run(expr: &Expression, values: Vec<Value>) -> Value {
        let (mut acc, _) = Accumulator::for_call(expr).unwrap();
        for v in values {
            acc.update(v).unwrap();
        }
        acc.finish()
    }

    #[test]
    fn test_count_skips_nulls_and_honours_distinct() {
        let values = vec![Value::Integer(1), Value::Null, Value::Integer(1), Value::Float(1.0)];
        assert_eq!(run(&call("count", false), values.clone()), Value::Integer(3));
        assert_eq!(run(&call("count", true), values), Value::Integer(1));
    }

    #[test]
    fn test_sum_and_avg() {
        assert_eq!(
            run(&call("sum", false), vec![Value::Integer(1), Value::Integer(2)]),
            Value::Integer(3)
        );
        assert_eq!(
            run(&call("sum", false), vec![Value::Integer(1), Value::Float(0.5)]),
            Value::Float(1.5)
        );
        assert_eq!(run(&call("sum", false), vec![]), Value::Integer(0));
        assert_eq!(
            run(&call("avg", false), vec![Value::Integer(1), Value::Integer(2)]),
            Value::Float(1.5)
        );
        assert_eq!(run(&call("avg", false), vec![]), Value::Null);
    }

    #[test]
    fn test_min_max_collect() {
        let values = vec![Value::Integer(3), Value::Integer(1), Value::Integer(2)];
        assert_eq!(run(&call("min", false), values.clone()), Value::Integer(1));
        assert_eq!(run(&call("max", false), values.clone()), Value::Integer(3));
        assert_eq!(run(&call("collect", false), values.clone()), Value::List(values));
    }

    #[test]
    fn test_sum_rejects_strings() {
        let (mut acc, _) = Accumulator::for_call(&call("sum", false)).unwrap();
        assert!(acc.update(Value::from("a")).is_err());
    }

    #[test]
    fn test_extract_aggregates() {
        let expr = Expression::Binary {
            operator: crate::cypher::BinaryOperator::Add,
            left: Box::new(Expression::CountStar),
            right: Box::new(Expression::Literal(crate::cypher::Literal::Integer(1))),
        };
        let mut calls = Vec::new();
        let rewritten = extract_aggregates(&expr, &mut calls);
        assert_eq!(calls, vec![Expression::CountStar]);
        match rewritten {
            Expression::Binary { left, .. } => {
                assert_eq!(*left, Expression::variable(format!("{}0", AGGREGATE_SLOT)))
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
