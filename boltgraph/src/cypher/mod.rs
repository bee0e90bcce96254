// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Cypher subset: lexer, AST and parser
//!
//! Covers pattern matching, the write clauses, projections, constraint DDL,
//! transaction control statements and a handful of procedures.

pub mod ast;
pub mod lexer;
pub mod parser;

pub use ast::{
    BinaryOperator, CallClause, Clause, CreateConstraint, Expression, Literal, MatchClause,
    MergeClause, NodePattern, PathKind, PatternPath, Projection, ProjectionItem, Query,
    RelationshipPattern, RemoveItem, SetItem, SortItem, Statement, UnaryOperator, VarLength,
};
pub use parser::parse_statement;

/// Syntax errors raised while reading a statement
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid input: {0}")]
    Lexer(String),

    #[error("Invalid input '{found}' (token {position})")]
    UnexpectedToken { found: String, position: usize },

    #[error("Unexpected end of input")]
    UnexpectedEnd,

    #[error("{0}")]
    Invalid(String),
}
