// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Abstract syntax tree for the Cypher subset

use crate::constraints::ConstraintKind;
use crate::storage::Direction;
use std::fmt;

/// A single parsed statement
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Query(Query),
    CreateConstraint(CreateConstraint),
    DropConstraint { name: String, if_exists: bool },
    ShowConstraints,
    Begin,
    Commit,
    Rollback,
}

impl Statement {
    /// Whether the statement changes schema rather than data
    pub fn is_schema(&self) -> bool {
        matches!(
            self,
            Statement::CreateConstraint(_) | Statement::DropConstraint { .. }
        )
    }

    pub fn is_transaction_control(&self) -> bool {
        matches!(
            self,
            Statement::Begin | Statement::Commit | Statement::Rollback
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateConstraint {
    pub name: Option<String>,
    pub if_not_exists: bool,
    pub kind: ConstraintKind,
    pub variable: String,
    pub label: String,
    pub properties: Vec<String>,
}

/// A linear sequence of clauses
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub clauses: Vec<Clause>,
}

impl Query {
    /// True when any clause writes to the graph
    pub fn has_updates(&self) -> bool {
        self.clauses.iter().any(Clause::is_update)
    }

    /// True when any clause reads from the graph
    pub fn has_reads(&self) -> bool {
        self.clauses.iter().any(|c| {
            matches!(c, Clause::Match(_) | Clause::Merge(_))
                || matches!(c, Clause::Call(call) if !call.procedure.starts_with("tx."))
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Match(MatchClause),
    Create(Vec<PatternPath>),
    Merge(MergeClause),
    Set(Vec<SetItem>),
    Remove(Vec<RemoveItem>),
    Delete { detach: bool, expressions: Vec<Expression> },
    Unwind { expression: Expression, alias: String },
    With(Projection),
    Return(Projection),
    Call(CallClause),
}

impl Clause {
    pub fn is_update(&self) -> bool {
        matches!(
            self,
            Clause::Create(_)
                | Clause::Merge(_)
                | Clause::Set(_)
                | Clause::Remove(_)
                | Clause::Delete { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchClause {
    pub optional: bool,
    pub patterns: Vec<PatternPath>,
    pub where_clause: Option<Expression>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    Pattern,
    Shortest,
    AllShortest,
}

/// `[p =] (a)-[r]->(b)...`, optionally wrapped in a shortest path function
#[derive(Debug, Clone, PartialEq)]
pub struct PatternPath {
    pub variable: Option<String>,
    pub kind: PathKind,
    pub start: NodePattern,
    pub steps: Vec<(RelationshipPattern, NodePattern)>,
}

impl PatternPath {
    pub fn nodes(&self) -> impl Iterator<Item = &NodePattern> {
        std::iter::once(&self.start).chain(self.steps.iter().map(|(_, n)| n))
    }

    pub fn relationships(&self) -> impl Iterator<Item = &RelationshipPattern> {
        self.steps.iter().map(|(r, _)| r)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodePattern {
    pub variable: Option<String>,
    pub labels: Vec<String>,
    /// Map literal or parameter
    pub properties: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipPattern {
    pub variable: Option<String>,
    pub types: Vec<String>,
    pub direction: Direction,
    pub properties: Option<Expression>,
    pub length: Option<VarLength>,
}

/// `*min..max`; an absent bound falls back to the matcher's defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarLength {
    pub min: Option<u32>,
    pub max: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeClause {
    pub pattern: PatternPath,
    pub on_create: Vec<SetItem>,
    pub on_match: Vec<SetItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SetItem {
    /// `n.p = expr`
    Property {
        variable: String,
        key: String,
        value: Expression,
    },
    /// `n += map`
    Merge { variable: String, value: Expression },
    /// `n = map`
    Replace { variable: String, value: Expression },
    /// `n:Label`
    Labels { variable: String, labels: Vec<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemoveItem {
    Property { variable: String, key: String },
    Labels { variable: String, labels: Vec<String> },
}

/// Body shared by WITH and RETURN
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Projection {
    pub distinct: bool,
    /// `RETURN *`
    pub star: bool,
    pub items: Vec<ProjectionItem>,
    pub order_by: Vec<SortItem>,
    pub skip: Option<Expression>,
    pub limit: Option<Expression>,
    /// Only WITH carries a WHERE
    pub where_clause: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionItem {
    pub expression: Expression,
    pub alias: Option<String>,
}

impl ProjectionItem {
    /// Column name: the alias, or the expression as written
    pub fn column_name(&self) -> String {
        match &self.alias {
            Some(alias) => alias.clone(),
            None => self.expression.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortItem {
    pub expression: Expression,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallClause {
    /// Dotted name such as `db.labels`
    pub procedure: String,
    pub arguments: Vec<Expression>,
    /// `YIELD field [AS alias]`; empty yields every output column
    pub yields: Vec<(String, Option<String>)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Or,
    Xor,
    And,
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    In,
    StartsWith,
    EndsWith,
    Contains,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
}

impl BinaryOperator {
    fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Or => "OR",
            BinaryOperator::Xor => "XOR",
            BinaryOperator::And => "AND",
            BinaryOperator::Equal => "=",
            BinaryOperator::NotEqual => "<>",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterEqual => ">=",
            BinaryOperator::In => "IN",
            BinaryOperator::StartsWith => "STARTS WITH",
            BinaryOperator::EndsWith => "ENDS WITH",
            BinaryOperator::Contains => "CONTAINS",
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Power => "^",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Literal),
    Parameter(String),
    Variable(String),
    Property(Box<Expression>, String),
    Index(Box<Expression>, Box<Expression>),
    List(Vec<Expression>),
    Map(Vec<(String, Expression)>),
    Unary {
        operator: UnaryOperator,
        operand: Box<Expression>,
    },
    Binary {
        operator: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    IsNull {
        operand: Box<Expression>,
        negated: bool,
    },
    HasLabels {
        operand: Box<Expression>,
        labels: Vec<String>,
    },
    Function {
        name: String,
        distinct: bool,
        arguments: Vec<Expression>,
    },
    CountStar,
}

const AGGREGATES: &[&str] = &["count", "collect", "sum", "avg", "min", "max"];

impl Expression {
    pub fn variable(name: impl Into<String>) -> Self {
        Expression::Variable(name.into())
    }

    pub fn is_aggregate_call(&self) -> bool {
        match self {
            Expression::CountStar => true,
            Expression::Function { name, .. } => {
                AGGREGATES.contains(&name.to_ascii_lowercase().as_str())
            }
            _ => false,
        }
    }

    /// True when an aggregate appears anywhere in the expression
    pub fn contains_aggregate(&self) -> bool {
        if self.is_aggregate_call() {
            return true;
        }
        match self {
            Expression::Property(inner, _) => inner.contains_aggregate(),
            Expression::Index(a, b) => a.contains_aggregate() || b.contains_aggregate(),
            Expression::List(items) => items.iter().any(Expression::contains_aggregate),
            Expression::Map(entries) => entries.iter().any(|(_, e)| e.contains_aggregate()),
            Expression::Unary { operand, .. } => operand.contains_aggregate(),
            Expression::Binary { left, right, .. } => {
                left.contains_aggregate() || right.contains_aggregate()
            }
            Expression::IsNull { operand, .. } | Expression::HasLabels { operand, .. } => {
                operand.contains_aggregate()
            }
            Expression::Function { arguments, .. } => {
                arguments.iter().any(Expression::contains_aggregate)
            }
            _ => false,
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expression]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "null"),
            Literal::Boolean(b) => write!(f, "{}", b),
            Literal::Integer(i) => write!(f, "{}", i),
            Literal::Float(x) => write!(f, "{:?}", x),
            Literal::String(s) => write!(f, "'{}'", s.replace('\'', "\\'")),
        }
    }
}

/// Renders the expression the way it is written in a query; used for
/// column names of unaliased projections
impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal(lit) => write!(f, "{}", lit),
            Expression::Parameter(name) => write!(f, "${}", name),
            Expression::Variable(name) => write!(f, "{}", name),
            Expression::Property(inner, key) => write!(f, "{}.{}", inner, key),
            Expression::Index(inner, index) => write!(f, "{}[{}]", inner, index),
            Expression::List(items) => {
                write!(f, "[")?;
                write_list(f, items)?;
                write!(f, "]")
            }
            Expression::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Expression::Unary {
                operator: UnaryOperator::Not,
                operand,
            } => write!(f, "NOT {}", operand),
            Expression::Unary {
                operator: UnaryOperator::Negate,
                operand,
            } => write!(f, "-{}", operand),
            Expression::Binary {
                operator,
                left,
                right,
            } => write!(f, "{} {} {}", left, operator.symbol(), right),
            Expression::IsNull { operand, negated } => {
                if *negated {
                    write!(f, "{} IS NOT NULL", operand)
                } else {
                    write!(f, "{} IS NULL", operand)
                }
            }
            Expression::HasLabels { operand, labels } => {
                write!(f, "{}", operand)?;
                for label in labels {
                    write!(f, ":{}", label)?;
                }
                Ok(())
            }
            Expression::Function {
                name,
                distinct,
                arguments,
            } => {
                write!(f, "{}(", name)?;
                if *distinct {
                    write!(f, "DISTINCT ")?;
                }
                write_list(f, arguments)?;
                write!(f, ")")
            }
            Expression::CountStar => write!(f, "count(*)"),
        }
    }
}
