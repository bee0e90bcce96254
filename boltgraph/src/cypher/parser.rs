// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Parser for the Cypher subset using nom parsers over the token stream

use log::debug;
use nom::{
    branch::alt,
    combinator::{map, opt, value},
    multi::{many0, many1, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use super::ast::*;
use super::lexer::{tokenize, Token};
use super::ParseError;
use crate::constraints::ConstraintKind;
use crate::storage::Direction;

type ParseResult<'a, T> = IResult<&'a [Token], T>;

/// Parse one statement; a trailing semicolon is allowed
pub fn parse_statement(input: &str) -> Result<Statement, ParseError> {
    let tokens = tokenize(input).map_err(ParseError::Lexer)?;
    check_nesting(&tokens)?;

    let result = terminated(
        statement,
        pair(opt(expect_token(Token::Semicolon)), expect_token(Token::EOF)),
    )(&tokens[..]);

    match result {
        Ok((_, statement)) => {
            if let Statement::Query(query) = &statement {
                check_clause_order(query)?;
            }
            debug!("parsed statement: {:?}", statement);
            Ok(statement)
        }
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            Err(unexpected(&tokens, e.input))
        }
        Err(nom::Err::Incomplete(_)) => Err(ParseError::UnexpectedEnd),
    }
}

/// Deepest nesting of brackets and prefix operators a statement may use
pub const MAX_NESTING: usize = 32;

/// The parser recurses once per bracket and prefix operator, so bound both
/// before parsing
fn check_nesting(tokens: &[Token]) -> Result<(), ParseError> {
    let mut depth = 0usize;
    let mut prefixes = 0usize;
    let mut outer = Vec::new();
    for token in tokens {
        match token {
            Token::Not | Token::Dash => prefixes += 1,
            Token::LeftParen | Token::LeftBracket | Token::LeftBrace => {
                outer.push(depth);
                depth += prefixes + 1;
                prefixes = 0;
            }
            Token::RightParen | Token::RightBracket | Token::RightBrace => {
                depth = outer.pop().unwrap_or(0);
                prefixes = 0;
            }
            _ => prefixes = 0,
        }
        if depth + prefixes > MAX_NESTING {
            return Err(ParseError::Invalid(format!(
                "Query nested deeper than {} levels",
                MAX_NESTING
            )));
        }
    }
    Ok(())
}

fn unexpected(all: &[Token], rest: &[Token]) -> ParseError {
    match rest.first() {
        None | Some(Token::EOF) => ParseError::UnexpectedEnd,
        Some(token) => ParseError::UnexpectedToken {
            found: describe(token),
            position: all.len() - rest.len(),
        },
    }
}

fn describe(token: &Token) -> String {
    if let Some(text) = token.keyword_text() {
        return text.to_string();
    }
    match token {
        Token::Identifier(s) | Token::BacktickString(s) => s.clone(),
        Token::String(s) => format!("'{}'", s),
        Token::Integer(i) => i.to_string(),
        Token::Float(f) => f.to_string(),
        Token::Parameter(p) => format!("${}", p),
        other => format!("{:?}", other),
    }
}

/// RETURN must come last, and a query must end in RETURN, an update or CALL
fn check_clause_order(query: &Query) -> Result<(), ParseError> {
    let last = query.clauses.len().saturating_sub(1);
    for (i, clause) in query.clauses.iter().enumerate() {
        if matches!(clause, Clause::Return(_)) && i != last {
            return Err(ParseError::Invalid(
                "RETURN can only be used at the end of the query".to_string(),
            ));
        }
    }
    match query.clauses.last() {
        Some(Clause::Return(_)) | Some(Clause::Call(_)) => Ok(()),
        Some(clause) if clause.is_update() => Ok(()),
        Some(Clause::Match(_)) => Err(ParseError::Invalid(
            "Query cannot conclude with MATCH (must be a RETURN clause, an update clause or a procedure call)"
                .to_string(),
        )),
        Some(Clause::With(_)) => Err(ParseError::Invalid(
            "Query cannot conclude with WITH (must be a RETURN clause, an update clause or a procedure call)"
                .to_string(),
        )),
        Some(Clause::Unwind { .. }) => Err(ParseError::Invalid(
            "Query cannot conclude with UNWIND (must be a RETURN clause, an update clause or a procedure call)"
                .to_string(),
        )),
        _ => Err(ParseError::UnexpectedEnd),
    }
}

fn statement(tokens: &[Token]) -> ParseResult<Statement> {
    alt((
        create_constraint,
        drop_constraint,
        show_constraints,
        transaction_control,
        map(query, Statement::Query),
    ))(tokens)
}

fn transaction_control(tokens: &[Token]) -> ParseResult<Statement> {
    terminated(
        alt((
            value(Statement::Begin, expect_token(Token::Begin)),
            value(Statement::Commit, expect_token(Token::Commit)),
            value(Statement::Rollback, expect_token(Token::Rollback)),
        )),
        opt(expect_token(Token::Transaction)),
    )(tokens)
}

// ==============================================================================
// Schema statements
// ==============================================================================

/// CREATE CONSTRAINT [name] [IF NOT EXISTS] FOR|ON (n:Label) REQUIRE|ASSERT body
fn create_constraint(tokens: &[Token]) -> ParseResult<Statement> {
    let (tokens, _) = pair(
        expect_token(Token::Create),
        expect_token(Token::Constraint),
    )(tokens)?;
    let (tokens, name) = opt(constraint_name)(tokens)?;
    let (tokens, if_not_exists) = opt(tuple((
        expect_token(Token::If),
        expect_token(Token::Not),
        expect_token(Token::Exists),
    )))(tokens)?;
    let (tokens, (_, _, variable, _, label, _)) = tuple((
        alt((expect_token(Token::For), expect_token(Token::On))),
        expect_token(Token::LeftParen),
        variable_name,
        expect_token(Token::Colon),
        symbolic_name,
        expect_token(Token::RightParen),
    ))(tokens)?;
    let (body_start, _) = alt((expect_token(Token::Require), expect_token(Token::Assert)))(tokens)?;
    let (rest, (references, kind)) = constraint_body(body_start)?;

    // Every property must hang off the pattern variable
    if references.iter().any(|(v, _)| *v != variable) {
        return Err(nom::Err::Failure(nom::error::Error::new(
            body_start,
            nom::error::ErrorKind::Verify,
        )));
    }

    Ok((
        rest,
        Statement::CreateConstraint(CreateConstraint {
            name,
            if_not_exists: if_not_exists.is_some(),
            kind,
            variable,
            label,
            properties: references.into_iter().map(|(_, key)| key).collect(),
        }),
    ))
}

fn constraint_body(tokens: &[Token]) -> ParseResult<(Vec<(String, String)>, ConstraintKind)> {
    alt((
        map(
            tuple((
                constraint_properties,
                expect_token(Token::Is),
                expect_token(Token::Unique),
            )),
            |(props, _, _)| (props, ConstraintKind::Unique),
        ),
        map(
            tuple((
                constraint_properties,
                expect_token(Token::Is),
                expect_token(Token::Not),
                expect_token(Token::Null),
            )),
            |(props, _, _, _)| (props, ConstraintKind::Exists),
        ),
        map(
            tuple((
                constraint_properties,
                expect_token(Token::Is),
                expect_token(Token::Node),
                expect_token(Token::Key),
            )),
            |(props, _, _, _)| (props, ConstraintKind::NodeKey),
        ),
        // Legacy form: ASSERT exists(n.p)
        map(
            delimited(
                pair(expect_token(Token::Exists), expect_token(Token::LeftParen)),
                property_reference,
                expect_token(Token::RightParen),
            ),
            |reference| (vec![reference], ConstraintKind::Exists),
        ),
    ))(tokens)
}

fn constraint_properties(tokens: &[Token]) -> ParseResult<Vec<(String, String)>> {
    alt((
        map(property_reference, |r| vec![r]),
        delimited(
            expect_token(Token::LeftParen),
            separated_list1(expect_token(Token::Comma), property_reference),
            expect_token(Token::RightParen),
        ),
    ))(tokens)
}

/// `n.prop` as (variable, key)
fn property_reference(tokens: &[Token]) -> ParseResult<(String, String)> {
    map(
        tuple((variable_name, expect_token(Token::Dot), symbolic_name)),
        |(variable, _, key)| (variable, key),
    )(tokens)
}

fn constraint_name(tokens: &[Token]) -> ParseResult<String> {
    match tokens.first() {
        Some(Token::Identifier(s)) | Some(Token::BacktickString(s)) => {
            Ok((&tokens[1..], s.clone()))
        }
        _ => Err(error(tokens)),
    }
}

fn drop_constraint(tokens: &[Token]) -> ParseResult<Statement> {
    map(
        tuple((
            expect_token(Token::Drop),
            expect_token(Token::Constraint),
            constraint_name,
            opt(pair(expect_token(Token::If), expect_token(Token::Exists))),
        )),
        |(_, _, name, if_exists)| Statement::DropConstraint {
            name,
            if_exists: if_exists.is_some(),
        },
    )(tokens)
}

fn show_constraints(tokens: &[Token]) -> ParseResult<Statement> {
    value(
        Statement::ShowConstraints,
        tuple((
            expect_token(Token::Show),
            opt(expect_token(Token::All)),
            alt((
                expect_token(Token::Constraints),
                expect_token(Token::Constraint),
            )),
        )),
    )(tokens)
}

// ==============================================================================
// Clauses
// ==============================================================================

fn query(tokens: &[Token]) -> ParseResult<Query> {
    map(many1(clause), |clauses| Query { clauses })(tokens)
}

fn clause(tokens: &[Token]) -> ParseResult<Clause> {
    alt((
        map(match_clause, Clause::Match),
        create_clause,
        map(merge_clause, Clause::Merge),
        set_clause,
        remove_clause,
        delete_clause,
        unwind_clause,
        with_clause,
        return_clause,
        map(call_clause, Clause::Call),
    ))(tokens)
}

/// [OPTIONAL] MATCH pattern, ... [WHERE condition]
fn match_clause(tokens: &[Token]) -> ParseResult<MatchClause> {
    map(
        tuple((
            opt(expect_token(Token::Optional)),
            expect_token(Token::Match),
            separated_list1(expect_token(Token::Comma), pattern_path),
            opt(preceded(expect_token(Token::Where), expression)),
        )),
        |(optional, _, patterns, where_clause)| MatchClause {
            optional: optional.is_some(),
            patterns,
            where_clause,
        },
    )(tokens)
}

fn create_clause(tokens: &[Token]) -> ParseResult<Clause> {
    map(
        preceded(
            expect_token(Token::Create),
            separated_list1(expect_token(Token::Comma), pattern_path),
        ),
        Clause::Create,
    )(tokens)
}

/// MERGE pattern [ON CREATE SET ...] [ON MATCH SET ...]
fn merge_clause(tokens: &[Token]) -> ParseResult<MergeClause> {
    map(
        tuple((
            expect_token(Token::Merge),
            pattern_path,
            many0(merge_action),
        )),
        |(_, pattern, actions)| {
            let mut on_create = Vec::new();
            let mut on_match = Vec::new();
            for (is_create, items) in actions {
                if is_create {
                    on_create.extend(items);
                } else {
                    on_match.extend(items);
                }
            }
            MergeClause {
                pattern,
                on_create,
                on_match,
            }
        },
    )(tokens)
}

fn merge_action(tokens: &[Token]) -> ParseResult<(bool, Vec<SetItem>)> {
    map(
        tuple((
            expect_token(Token::On),
            alt((
                value(true, expect_token(Token::Create)),
                value(false, expect_token(Token::Match)),
            )),
            expect_token(Token::Set),
            separated_list1(expect_token(Token::Comma), set_item),
        )),
        |(_, is_create, _, items)| (is_create, items),
    )(tokens)
}

fn set_clause(tokens: &[Token]) -> ParseResult<Clause> {
    map(
        preceded(
            expect_token(Token::Set),
            separated_list1(expect_token(Token::Comma), set_item),
        ),
        Clause::Set,
    )(tokens)
}

fn set_item(tokens: &[Token]) -> ParseResult<SetItem> {
    alt((
        map(
            tuple((
                variable_name,
                expect_token(Token::Dot),
                symbolic_name,
                expect_token(Token::Equal),
                expression,
            )),
            |(variable, _, key, _, value)| SetItem::Property {
                variable,
                key,
                value,
            },
        ),
        map(
            tuple((variable_name, expect_token(Token::PlusEqual), expression)),
            |(variable, _, value)| SetItem::Merge { variable, value },
        ),
        map(
            tuple((variable_name, expect_token(Token::Equal), expression)),
            |(variable, _, value)| SetItem::Replace { variable, value },
        ),
        map(pair(variable_name, label_list), |(variable, labels)| {
            SetItem::Labels { variable, labels }
        }),
    ))(tokens)
}

fn remove_clause(tokens: &[Token]) -> ParseResult<Clause> {
    map(
        preceded(
            expect_token(Token::Remove),
            separated_list1(
                expect_token(Token::Comma),
                alt((
                    map(property_reference, |(variable, key)| RemoveItem::Property {
                        variable,
                        key,
                    }),
                    map(pair(variable_name, label_list), |(variable, labels)| {
                        RemoveItem::Labels { variable, labels }
                    }),
                )),
            ),
        ),
        Clause::Remove,
    )(tokens)
}

/// [DETACH] DELETE expr, ...
fn delete_clause(tokens: &[Token]) -> ParseResult<Clause> {
    map(
        tuple((
            opt(expect_token(Token::Detach)),
            expect_token(Token::Delete),
            separated_list1(expect_token(Token::Comma), expression),
        )),
        |(detach, _, expressions)| Clause::Delete {
            detach: detach.is_some(),
            expressions,
        },
    )(tokens)
}

fn unwind_clause(tokens: &[Token]) -> ParseResult<Clause> {
    map(
        tuple((
            expect_token(Token::Unwind),
            expression,
            expect_token(Token::As),
            variable_name,
        )),
        |(_, expression, _, alias)| Clause::Unwind { expression, alias },
    )(tokens)
}

fn with_clause(tokens: &[Token]) -> ParseResult<Clause> {
    map(
        tuple((
            expect_token(Token::With),
            projection_body,
            opt(preceded(expect_token(Token::Where), expression)),
        )),
        |(_, mut projection, where_clause)| {
            projection.where_clause = where_clause;
            Clause::With(projection)
        },
    )(tokens)
}

fn return_clause(tokens: &[Token]) -> ParseResult<Clause> {
    map(
        preceded(expect_token(Token::Return), projection_body),
        Clause::Return,
    )(tokens)
}

/// [DISTINCT] (* | item, ...) [ORDER BY ...] [SKIP n] [LIMIT n]
fn projection_body(tokens: &[Token]) -> ParseResult<Projection> {
    map(
        tuple((
            opt(expect_token(Token::Distinct)),
            alt((
                map(
                    pair(
                        expect_token(Token::Star),
                        opt(preceded(expect_token(Token::Comma), projection_items)),
                    ),
                    |(_, items)| (true, items.unwrap_or_default()),
                ),
                map(projection_items, |items| (false, items)),
            )),
            opt(order_by),
            opt(preceded(expect_token(Token::Skip), expression)),
            opt(preceded(expect_token(Token::Limit), expression)),
        )),
        |(distinct, (star, items), order_by, skip, limit)| Projection {
            distinct: distinct.is_some(),
            star,
            items,
            order_by: order_by.unwrap_or_default(),
            skip,
            limit,
            where_clause: None,
        },
    )(tokens)
}

fn projection_items(tokens: &[Token]) -> ParseResult<Vec<ProjectionItem>> {
    separated_list1(
        expect_token(Token::Comma),
        map(
            pair(expression, opt(preceded(expect_token(Token::As), variable_name))),
            |(expression, alias)| ProjectionItem { expression, alias },
        ),
    )(tokens)
}

fn order_by(tokens: &[Token]) -> ParseResult<Vec<SortItem>> {
    preceded(
        pair(expect_token(Token::Order), expect_token(Token::By)),
        separated_list1(
            expect_token(Token::Comma),
            map(
                pair(
                    expression,
                    opt(alt((
                        value(false, expect_token(Token::Asc)),
                        value(true, expect_token(Token::Desc)),
                    ))),
                ),
                |(expression, descending)| SortItem {
                    expression,
                    descending: descending.unwrap_or(false),
                },
            ),
        ),
    )(tokens)
}

/// CALL ns.proc(args) [YIELD field [AS alias], ...]
fn call_clause(tokens: &[Token]) -> ParseResult<CallClause> {
    map(
        tuple((
            expect_token(Token::Call),
            procedure_name,
            opt(delimited(
                expect_token(Token::LeftParen),
                separated_list0(expect_token(Token::Comma), expression),
                expect_token(Token::RightParen),
            )),
            opt(preceded(
                expect_token(Token::Yield),
                alt((
                    value(Vec::new(), expect_token(Token::Star)),
                    separated_list1(
                        expect_token(Token::Comma),
                        pair(
                            symbolic_name,
                            opt(preceded(expect_token(Token::As), variable_name)),
                        ),
                    ),
                )),
            )),
        )),
        |(_, procedure, arguments, yields)| CallClause {
            procedure,
            arguments: arguments.unwrap_or_default(),
            yields: yields.unwrap_or_default(),
        },
    )(tokens)
}

fn procedure_name(tokens: &[Token]) -> ParseResult<String> {
    map(
        pair(
            symbolic_name,
            many0(preceded(expect_token(Token::Dot), symbolic_name)),
        ),
        |(first, rest)| {
            let mut parts = vec![first];
            parts.extend(rest);
            parts.join(".")
        },
    )(tokens)
}

// ==============================================================================
// Patterns
// ==============================================================================

/// [p =] chain | [p =] shortestPath(chain) | [p =] allShortestPaths(chain)
fn pattern_path(tokens: &[Token]) -> ParseResult<PatternPath> {
    alt((
        map(
            tuple((variable_name, expect_token(Token::Equal), path_body)),
            |(variable, _, mut path)| {
                path.variable = Some(variable);
                path
            },
        ),
        path_body,
    ))(tokens)
}

fn path_body(tokens: &[Token]) -> ParseResult<PatternPath> {
    alt((
        map(
            tuple((
                path_function,
                expect_token(Token::LeftParen),
                pattern_chain,
                expect_token(Token::RightParen),
            )),
            |(kind, _, (start, steps), _)| PatternPath {
                variable: None,
                kind,
                start,
                steps,
            },
        ),
        map(pattern_chain, |(start, steps)| PatternPath {
            variable: None,
            kind: PathKind::Pattern,
            start,
            steps,
        }),
    ))(tokens)
}

fn path_function(tokens: &[Token]) -> ParseResult<PathKind> {
    match tokens.first() {
        Some(Token::Identifier(name)) if name.eq_ignore_ascii_case("shortestPath") => {
            Ok((&tokens[1..], PathKind::Shortest))
        }
        Some(Token::Identifier(name)) if name.eq_ignore_ascii_case("allShortestPaths") => {
            Ok((&tokens[1..], PathKind::AllShortest))
        }
        _ => Err(error(tokens)),
    }
}

type Chain = (NodePattern, Vec<(RelationshipPattern, NodePattern)>);

fn pattern_chain(tokens: &[Token]) -> ParseResult<Chain> {
    pair(node_pattern, many0(pair(relationship_pattern, node_pattern)))(tokens)
}

/// (variable? :Label* properties?)
fn node_pattern(tokens: &[Token]) -> ParseResult<NodePattern> {
    map(
        delimited(
            expect_token(Token::LeftParen),
            tuple((opt(variable_name), opt(label_list), opt(pattern_properties))),
            expect_token(Token::RightParen),
        ),
        |(variable, labels, properties)| NodePattern {
            variable,
            labels: labels.unwrap_or_default(),
            properties,
        },
    )(tokens)
}

/// -[detail]-> | <-[detail]- | -[detail]- with the detail optional
fn relationship_pattern(tokens: &[Token]) -> ParseResult<RelationshipPattern> {
    map(
        tuple((
            alt((
                value(true, expect_token(Token::ArrowLeft)),
                value(false, expect_token(Token::Dash)),
            )),
            opt(relationship_detail),
            alt((
                value(true, expect_token(Token::Arrow)),
                value(false, expect_token(Token::Dash)),
            )),
        )),
        |(left, detail, right)| {
            let direction = match (left, right) {
                (true, false) => Direction::Incoming,
                (false, true) => Direction::Outgoing,
                _ => Direction::Both,
            };
            let (variable, types, length, properties) = detail.unwrap_or_default();
            RelationshipPattern {
                variable,
                types,
                direction,
                properties,
                length,
            }
        },
    )(tokens)
}

type RelationshipDetail = (
    Option<String>,
    Vec<String>,
    Option<VarLength>,
    Option<Expression>,
);

fn relationship_detail(tokens: &[Token]) -> ParseResult<RelationshipDetail> {
    map(
        delimited(
            expect_token(Token::LeftBracket),
            tuple((
                opt(variable_name),
                opt(relationship_types),
                opt(variable_length),
                opt(pattern_properties),
            )),
            expect_token(Token::RightBracket),
        ),
        |(variable, types, length, properties)| {
            (variable, types.unwrap_or_default(), length, properties)
        },
    )(tokens)
}

/// :TYPE | :A|B | :A|:B
fn relationship_types(tokens: &[Token]) -> ParseResult<Vec<String>> {
    map(
        preceded(
            expect_token(Token::Colon),
            pair(
                symbolic_name,
                many0(preceded(
                    pair(expect_token(Token::Pipe), opt(expect_token(Token::Colon))),
                    symbolic_name,
                )),
            ),
        ),
        |(first, rest)| {
            let mut types = vec![first];
            types.extend(rest);
            types
        },
    )(tokens)
}

/// `*`, `*n`, `*min..`, `*..max`, `*min..max`
fn variable_length(tokens: &[Token]) -> ParseResult<VarLength> {
    map(
        preceded(
            expect_token(Token::Star),
            opt(alt((
                map(
                    tuple((opt(unsigned), expect_token(Token::DotDot), opt(unsigned))),
                    |(min, _, max)| VarLength { min, max },
                ),
                map(unsigned, |n| VarLength {
                    min: Some(n),
                    max: Some(n),
                }),
            ))),
        ),
        |length| length.unwrap_or(VarLength { min: None, max: None }),
    )(tokens)
}

fn label_list(tokens: &[Token]) -> ParseResult<Vec<String>> {
    many1(preceded(expect_token(Token::Colon), symbolic_name))(tokens)
}

fn pattern_properties(tokens: &[Token]) -> ParseResult<Expression> {
    alt((map_literal, parameter))(tokens)
}

// ==============================================================================
// Expressions
// ==============================================================================

pub(crate) fn expression(tokens: &[Token]) -> ParseResult<Expression> {
    or_expression(tokens)
}

fn binary(operator: BinaryOperator, left: Expression, right: Expression) -> Expression {
    Expression::Binary {
        operator,
        left: Box::new(left),
        right: Box::new(right),
    }
}

/// One left-associative precedence level
fn left_assoc<'a>(
    tokens: &'a [Token],
    operand: fn(&[Token]) -> ParseResult<Expression>,
    operator: fn(&[Token]) -> ParseResult<BinaryOperator>,
) -> ParseResult<'a, Expression> {
    map(
        pair(operand, many0(pair(operator, operand))),
        |(first, rest)| {
            rest.into_iter()
                .fold(first, |left, (op, right)| binary(op, left, right))
        },
    )(tokens)
}

fn or_expression(tokens: &[Token]) -> ParseResult<Expression> {
    left_assoc(tokens, xor_expression, or_operator)
}

fn xor_expression(tokens: &[Token]) -> ParseResult<Expression> {
    left_assoc(tokens, and_expression, xor_operator)
}

fn and_expression(tokens: &[Token]) -> ParseResult<Expression> {
    left_assoc(tokens, not_expression, and_operator)
}

fn not_expression(tokens: &[Token]) -> ParseResult<Expression> {
    alt((
        map(
            preceded(expect_token(Token::Not), not_expression),
            |operand| Expression::Unary {
                operator: UnaryOperator::Not,
                operand: Box::new(operand),
            },
        ),
        comparison,
    ))(tokens)
}

fn comparison(tokens: &[Token]) -> ParseResult<Expression> {
    left_assoc(tokens, predicate_expression, comparison_operator)
}

fn or_operator(tokens: &[Token]) -> ParseResult<BinaryOperator> {
    value(BinaryOperator::Or, expect_token(Token::Or))(tokens)
}

fn xor_operator(tokens: &[Token]) -> ParseResult<BinaryOperator> {
    value(BinaryOperator::Xor, expect_token(Token::Xor))(tokens)
}

fn and_operator(tokens: &[Token]) -> ParseResult<BinaryOperator> {
    value(BinaryOperator::And, expect_token(Token::And))(tokens)
}

fn additive_operator(tokens: &[Token]) -> ParseResult<BinaryOperator> {
    alt((
        value(BinaryOperator::Add, expect_token(Token::Plus)),
        value(BinaryOperator::Subtract, expect_token(Token::Dash)),
    ))(tokens)
}

fn multiplicative_operator(tokens: &[Token]) -> ParseResult<BinaryOperator> {
    alt((
        value(BinaryOperator::Multiply, expect_token(Token::Star)),
        value(BinaryOperator::Divide, expect_token(Token::Slash)),
        value(BinaryOperator::Modulo, expect_token(Token::Percent)),
    ))(tokens)
}

fn power_operator(tokens: &[Token]) -> ParseResult<BinaryOperator> {
    value(BinaryOperator::Power, expect_token(Token::Caret))(tokens)
}

fn comparison_operator(tokens: &[Token]) -> ParseResult<BinaryOperator> {
    alt((
        value(BinaryOperator::Equal, expect_token(Token::Equal)),
        value(BinaryOperator::NotEqual, expect_token(Token::NotEqual)),
        value(BinaryOperator::LessEqual, expect_token(Token::LessEqual)),
        value(BinaryOperator::GreaterEqual, expect_token(Token::GreaterEqual)),
        value(BinaryOperator::LessThan, expect_token(Token::LessThan)),
        value(BinaryOperator::GreaterThan, expect_token(Token::GreaterThan)),
    ))(tokens)
}

#[derive(Clone)]
enum Predicate {
    Binary(BinaryOperator, Expression),
    IsNull { negated: bool },
}

/// additive (IN x | STARTS WITH x | ENDS WITH x | CONTAINS x | IS [NOT] NULL)*
fn predicate_expression(tokens: &[Token]) -> ParseResult<Expression> {
    map(
        pair(additive_expression, many0(predicate_suffix)),
        |(first, suffixes)| {
            suffixes.into_iter().fold(first, |operand, suffix| match suffix {
                Predicate::Binary(op, right) => binary(op, operand, right),
                Predicate::IsNull { negated } => Expression::IsNull {
                    operand: Box::new(operand),
                    negated,
                },
            })
        },
    )(tokens)
}

fn predicate_suffix(tokens: &[Token]) -> ParseResult<Predicate> {
    alt((
        map(
            preceded(expect_token(Token::In), additive_expression),
            |e| Predicate::Binary(BinaryOperator::In, e),
        ),
        map(
            preceded(
                pair(expect_token(Token::Starts), expect_token(Token::With)),
                additive_expression,
            ),
            |e| Predicate::Binary(BinaryOperator::StartsWith, e),
        ),
        map(
            preceded(
                pair(expect_token(Token::Ends), expect_token(Token::With)),
                additive_expression,
            ),
            |e| Predicate::Binary(BinaryOperator::EndsWith, e),
        ),
        map(
            preceded(expect_token(Token::Contains), additive_expression),
            |e| Predicate::Binary(BinaryOperator::Contains, e),
        ),
        value(
            Predicate::IsNull { negated: true },
            tuple((
                expect_token(Token::Is),
                expect_token(Token::Not),
                expect_token(Token::Null),
            )),
        ),
        value(
            Predicate::IsNull { negated: false },
            pair(expect_token(Token::Is), expect_token(Token::Null)),
        ),
    ))(tokens)
}

fn additive_expression(tokens: &[Token]) -> ParseResult<Expression> {
    left_assoc(tokens, multiplicative_expression, additive_operator)
}

fn multiplicative_expression(tokens: &[Token]) -> ParseResult<Expression> {
    left_assoc(tokens, power_expression, multiplicative_operator)
}

fn power_expression(tokens: &[Token]) -> ParseResult<Expression> {
    left_assoc(tokens, unary_expression, power_operator)
}

fn unary_expression(tokens: &[Token]) -> ParseResult<Expression> {
    alt((
        map(
            preceded(expect_token(Token::Dash), unary_expression),
            |operand| match operand {
                Expression::Literal(Literal::Integer(i)) => {
                    Expression::Literal(Literal::Integer(-i))
                }
                Expression::Literal(Literal::Float(f)) => Expression::Literal(Literal::Float(-f)),
                other => Expression::Unary {
                    operator: UnaryOperator::Negate,
                    operand: Box::new(other),
                },
            },
        ),
        preceded(expect_token(Token::Plus), unary_expression),
        postfix_expression,
    ))(tokens)
}

#[derive(Clone)]
enum Postfix {
    Property(String),
    Index(Expression),
    Labels(Vec<String>),
}

/// atom followed by `.key`, `[index]` or `:Label` suffixes
fn postfix_expression(tokens: &[Token]) -> ParseResult<Expression> {
    map(
        pair(
            atom,
            many0(alt((
                map(
                    preceded(expect_token(Token::Dot), symbolic_name),
                    Postfix::Property,
                ),
                map(
                    delimited(
                        expect_token(Token::LeftBracket),
                        expression,
                        expect_token(Token::RightBracket),
                    ),
                    Postfix::Index,
                ),
                map(label_list, Postfix::Labels),
            ))),
        ),
        |(base, suffixes)| {
            suffixes.into_iter().fold(base, |inner, suffix| match suffix {
                Postfix::Property(key) => Expression::Property(Box::new(inner), key),
                Postfix::Index(index) => Expression::Index(Box::new(inner), Box::new(index)),
                Postfix::Labels(labels) => Expression::HasLabels {
                    operand: Box::new(inner),
                    labels,
                },
            })
        },
    )(tokens)
}

fn atom(tokens: &[Token]) -> ParseResult<Expression> {
    alt((
        map(literal, Expression::Literal),
        parameter,
        count_star,
        function_call,
        map(
            delimited(
                expect_token(Token::LeftBracket),
                separated_list0(expect_token(Token::Comma), expression),
                expect_token(Token::RightBracket),
            ),
            Expression::List,
        ),
        map_literal,
        delimited(
            expect_token(Token::LeftParen),
            expression,
            expect_token(Token::RightParen),
        ),
        map(variable_name, Expression::Variable),
    ))(tokens)
}

fn literal(tokens: &[Token]) -> ParseResult<Literal> {
    let literal = match tokens.first() {
        Some(Token::Integer(i)) => Literal::Integer(*i),
        Some(Token::Float(f)) => Literal::Float(*f),
        Some(Token::String(s)) => Literal::String(s.clone()),
        Some(Token::True) => Literal::Boolean(true),
        Some(Token::False) => Literal::Boolean(false),
        Some(Token::Null) => Literal::Null,
        _ => return Err(error(tokens)),
    };
    Ok((&tokens[1..], literal))
}

fn parameter(tokens: &[Token]) -> ParseResult<Expression> {
    match tokens.first() {
        Some(Token::Parameter(name)) => Ok((&tokens[1..], Expression::Parameter(name.clone()))),
        _ => Err(error(tokens)),
    }
}

fn count_star(tokens: &[Token]) -> ParseResult<Expression> {
    match tokens {
        [Token::Identifier(name), Token::LeftParen, Token::Star, Token::RightParen, rest @ ..]
            if name.eq_ignore_ascii_case("count") =>
        {
            Ok((rest, Expression::CountStar))
        }
        _ => Err(error(tokens)),
    }
}

/// name([DISTINCT] args)
fn function_call(tokens: &[Token]) -> ParseResult<Expression> {
    map(
        tuple((
            function_name,
            expect_token(Token::LeftParen),
            opt(expect_token(Token::Distinct)),
            separated_list0(expect_token(Token::Comma), expression),
            expect_token(Token::RightParen),
        )),
        |(name, _, distinct, arguments, _)| Expression::Function {
            name,
            distinct: distinct.is_some(),
            arguments,
        },
    )(tokens)
}

fn function_name(tokens: &[Token]) -> ParseResult<String> {
    match tokens.first() {
        Some(Token::Identifier(name)) => Ok((&tokens[1..], name.clone())),
        Some(Token::Exists) => Ok((&tokens[1..], "exists".to_string())),
        _ => Err(error(tokens)),
    }
}

fn map_literal(tokens: &[Token]) -> ParseResult<Expression> {
    map(
        delimited(
            expect_token(Token::LeftBrace),
            separated_list0(
                expect_token(Token::Comma),
                map(
                    tuple((map_key, expect_token(Token::Colon), expression)),
                    |(key, _, value)| (key, value),
                ),
            ),
            expect_token(Token::RightBrace),
        ),
        Expression::Map,
    )(tokens)
}

fn map_key(tokens: &[Token]) -> ParseResult<String> {
    match tokens.first() {
        Some(Token::String(s)) => Ok((&tokens[1..], s.clone())),
        _ => symbolic_name(tokens),
    }
}

// ==============================================================================
// Token helpers
// ==============================================================================

fn error(tokens: &[Token]) -> nom::Err<nom::error::Error<&[Token]>> {
    nom::Err::Error(nom::error::Error::new(tokens, nom::error::ErrorKind::Tag))
}

/// Expect a specific token
fn expect_token(expected: Token) -> impl Fn(&[Token]) -> IResult<&[Token], Token> {
    move |tokens: &[Token]| match tokens.first() {
        Some(token) if std::mem::discriminant(token) == std::mem::discriminant(&expected) => {
            Ok((&tokens[1..], token.clone()))
        }
        _ => Err(error(tokens)),
    }
}

/// Label, relationship type or property key
fn symbolic_name(tokens: &[Token]) -> ParseResult<String> {
    match tokens.first() {
        Some(Token::Identifier(s)) | Some(Token::BacktickString(s)) if !s.is_empty() => {
            Ok((&tokens[1..], s.clone()))
        }
        _ => Err(error(tokens)),
    }
}

/// Variable or alias; a few schema keywords double as names
fn variable_name(tokens: &[Token]) -> ParseResult<String> {
    match tokens.first() {
        Some(Token::Identifier(s)) | Some(Token::BacktickString(s)) if !s.is_empty() => {
            Ok((&tokens[1..], s.clone()))
        }
        Some(
            token @ (Token::Node
            | Token::Key
            | Token::Unique
            | Token::Constraints
            | Token::Transaction
            | Token::Require
            | Token::Assert),
        ) => {
            let name = token.keyword_text().unwrap_or_default().to_ascii_lowercase();
            Ok((&tokens[1..], name))
        }
        _ => Err(error(tokens)),
    }
}

fn unsigned(tokens: &[Token]) -> ParseResult<u32> {
    match tokens.first() {
        Some(Token::Integer(i)) => match u32::try_from(*i) {
            Ok(n) => Ok((&tokens[1..], n)),
            Err(_) => Err(error(tokens)),
        },
        _ => Err(error(tokens)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_query(input: &str) -> Query {
        match parse_statement(input) {
            Ok(Statement::Query(q)) => q,
            other => panic!("expected query for {:?}, got {:?}", input, other),
        }
    }

    #[test]
    fn test_match_with_labels_properties_and_where() {
        let q = parse_query("MATCH (u:User:Admin {email: $email}) WHERE u.age >= 18 RETURN u.name AS name");
        assert_eq!(q.clauses.len(), 2);
        let Clause::Match(m) = &q.clauses[0] else {
            panic!("expected MATCH");
        };
        assert!(!m.optional);
        let node = &m.patterns[0].start;
        assert_eq!(node.variable.as_deref(), Some("u"));
        assert_eq!(node.labels, vec!["User", "Admin"]);
        assert!(matches!(node.properties, Some(Expression::Map(_))));
        assert!(matches!(
            m.where_clause,
            Some(Expression::Binary {
                operator: BinaryOperator::GreaterEqual,
                ..
            })
        ));
        let Clause::Return(r) = &q.clauses[1] else {
            panic!("expected RETURN");
        };
        assert_eq!(r.items[0].column_name(), "name");
    }

    #[test]
    fn test_relationship_directions_and_lengths() {
        let q = parse_query("MATCH (a)-[r:KNOWS|FOLLOWS]->(b)<-[:R*1..3]-(c)-[*]-(d) RETURN a");
        let Clause::Match(m) = &q.clauses[0] else {
            panic!("expected MATCH");
        };
        let rels: Vec<_> = m.patterns[0].relationships().collect();
        assert_eq!(rels[0].direction, Direction::Outgoing);
        assert_eq!(rels[0].types, vec!["KNOWS", "FOLLOWS"]);
        assert_eq!(rels[0].length, None);
        assert_eq!(rels[1].direction, Direction::Incoming);
        assert_eq!(
            rels[1].length,
            Some(VarLength {
                min: Some(1),
                max: Some(3)
            })
        );
        assert_eq!(rels[2].direction, Direction::Both);
        assert_eq!(
            rels[2].length,
            Some(VarLength {
                min: None,
                max: None
            })
        );
    }

    #[test]
    fn test_shortest_path_assignment() {
        let q = parse_query(
            "MATCH (a {name:'A'}), (b {name:'B'}), p = shortestPath((a)-[*..5]-(b)) RETURN length(p)",
        );
        let Clause::Match(m) = &q.clauses[0] else {
            panic!("expected MATCH");
        };
        assert_eq!(m.patterns.len(), 3);
        assert_eq!(m.patterns[2].variable.as_deref(), Some("p"));
        assert_eq!(m.patterns[2].kind, PathKind::Shortest);
    }

    #[test]
    fn test_merge_with_actions() {
        let q = parse_query(
            "MERGE (n:Person {name: 'Ann'}) ON CREATE SET n.created = 1 ON MATCH SET n.seen = n.seen + 1, n:Known",
        );
        let Clause::Merge(m) = &q.clauses[0] else {
            panic!("expected MERGE");
        };
        assert_eq!(m.on_create.len(), 1);
        assert_eq!(m.on_match.len(), 2);
        assert!(matches!(m.on_match[1], SetItem::Labels { .. }));
    }

    #[test]
    fn test_set_remove_delete_forms() {
        let q = parse_query(
            "MATCH (n) SET n += {a: 1}, n.b = null REMOVE n.c, n:Old DETACH DELETE n",
        );
        assert!(matches!(&q.clauses[1], Clause::Set(items) if matches!(items[0], SetItem::Merge { .. })));
        assert!(matches!(&q.clauses[2], Clause::Remove(items) if items.len() == 2));
        assert!(matches!(&q.clauses[3], Clause::Delete { detach: true, .. }));
        assert!(q.has_updates());
    }

    #[test]
    fn test_projection_modifiers() {
        let q = parse_query(
            "UNWIND [3, 1, 2] AS x WITH x WHERE x > 1 RETURN DISTINCT x ORDER BY x DESC SKIP 1 LIMIT $n",
        );
        let Clause::With(w) = &q.clauses[1] else {
            panic!("expected WITH");
        };
        assert!(w.where_clause.is_some());
        let Clause::Return(r) = &q.clauses[2] else {
            panic!("expected RETURN");
        };
        assert!(r.distinct);
        assert!(r.order_by[0].descending);
        assert_eq!(r.skip, Some(Expression::Literal(Literal::Integer(1))));
        assert_eq!(r.limit, Some(Expression::Parameter("n".into())));
    }

    #[test]
    fn test_expression_precedence() {
        let q = parse_query("RETURN 1 + 2 * 3 = 7 AND NOT false AS ok, -2 AS neg");
        let Clause::Return(r) = &q.clauses[0] else {
            panic!("expected RETURN");
        };
        let Expression::Binary { operator, left, .. } = &r.items[0].expression else {
            panic!("expected binary");
        };
        assert_eq!(*operator, BinaryOperator::And);
        assert!(matches!(
            **left,
            Expression::Binary {
                operator: BinaryOperator::Equal,
                ..
            }
        ));
        assert_eq!(
            r.items[1].expression,
            Expression::Literal(Literal::Integer(-2))
        );
    }

    #[test]
    fn test_string_predicates_and_null_checks() {
        let q = parse_query(
            "MATCH (n) WHERE n.name STARTS WITH 'A' AND n.x IS NOT NULL AND n:Person AND n.k IN [1,2] RETURN count(*)",
        );
        let Clause::Return(r) = &q.clauses[1] else {
            panic!("expected RETURN");
        };
        assert_eq!(r.items[0].expression, Expression::CountStar);
        assert_eq!(r.items[0].column_name(), "count(*)");
    }

    #[test]
    fn test_constraint_statements() {
        let stmt = parse_statement(
            "CREATE CONSTRAINT user_email IF NOT EXISTS FOR (u:User) REQUIRE u.email IS UNIQUE",
        )
        .unwrap();
        assert_eq!(
            stmt,
            Statement::CreateConstraint(CreateConstraint {
                name: Some("user_email".into()),
                if_not_exists: true,
                kind: ConstraintKind::Unique,
                variable: "u".into(),
                label: "User".into(),
                properties: vec!["email".into()],
            })
        );

        let Statement::CreateConstraint(key) =
            parse_statement("CREATE CONSTRAINT FOR (p:Person) REQUIRE (p.first, p.last) IS NODE KEY")
                .unwrap()
        else {
            panic!("expected constraint");
        };
        assert_eq!(key.kind, ConstraintKind::NodeKey);
        assert_eq!(key.properties.len(), 2);

        let Statement::CreateConstraint(exists) =
            parse_statement("CREATE CONSTRAINT ON (p:Person) ASSERT p.name IS NOT NULL").unwrap()
        else {
            panic!("expected constraint");
        };
        assert_eq!(exists.kind, ConstraintKind::Exists);

        assert!(parse_statement("CREATE CONSTRAINT FOR (p:Person) REQUIRE q.name IS UNIQUE").is_err());

        assert_eq!(
            parse_statement("DROP CONSTRAINT user_email IF EXISTS").unwrap(),
            Statement::DropConstraint {
                name: "user_email".into(),
                if_exists: true
            }
        );
        assert_eq!(
            parse_statement("SHOW CONSTRAINTS;").unwrap(),
            Statement::ShowConstraints
        );
    }

    #[test]
    fn test_transaction_control_and_procedures() {
        assert_eq!(parse_statement("BEGIN").unwrap(), Statement::Begin);
        assert_eq!(parse_statement("commit").unwrap(), Statement::Commit);
        assert_eq!(
            parse_statement("ROLLBACK TRANSACTION").unwrap(),
            Statement::Rollback
        );

        let q = parse_query("CALL db.labels() YIELD label AS l RETURN l");
        let Clause::Call(call) = &q.clauses[0] else {
            panic!("expected CALL");
        };
        assert_eq!(call.procedure, "db.labels");
        assert_eq!(call.yields, vec![("label".to_string(), Some("l".to_string()))]);

        let q = parse_query("CALL tx.setMetaData({app: 'x'})");
        let Clause::Call(call) = &q.clauses[0] else {
            panic!("expected CALL");
        };
        assert_eq!(call.arguments.len(), 1);

        let q = parse_query("CALL db.constraints");
        assert!(matches!(&q.clauses[0], Clause::Call(c) if c.procedure == "db.constraints"));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(matches!(
            parse_statement("MATCH (n RETURN n"),
            Err(ParseError::UnexpectedToken { .. })
        ));
        assert!(matches!(
            parse_statement("MATCH (n)"),
            Err(ParseError::Invalid(_))
        ));
        assert!(matches!(
            parse_statement("RETURN 1 MATCH (n) RETURN n"),
            Err(ParseError::Invalid(_))
        ));
        assert!(matches!(parse_statement(""), Err(ParseError::UnexpectedEnd)));
        assert!(matches!(
            parse_statement("RETURN 'open"),
            Err(ParseError::Lexer(_))
        ));
    }

    #[test]
    fn test_nesting_is_bounded() {
        let parens = format!("RETURN {}1{}", "(".repeat(20_000), ")".repeat(20_000));
        assert!(matches!(parse_statement(&parens), Err(ParseError::Invalid(_))));
        let lists = format!("RETURN {}1{}", "[".repeat(MAX_NESTING + 1), "]".repeat(MAX_NESTING + 1));
        assert!(matches!(parse_statement(&lists), Err(ParseError::Invalid(_))));
        let negations = format!("RETURN {}true", "NOT ".repeat(10_000));
        assert!(matches!(parse_statement(&negations), Err(ParseError::Invalid(_))));
        let minus = format!("RETURN {}1", "- ".repeat(10_000));
        assert!(matches!(parse_statement(&minus), Err(ParseError::Invalid(_))));

        // Long flat expressions are fine
        let conjuncts = vec!["NOT n.a = 1"; 200].join(" AND ");
        assert!(parse_statement(&format!("MATCH (n) WHERE {} RETURN n", conjuncts)).is_ok());
        let nested = format!("RETURN {}1{} AS x", "[".repeat(8), "]".repeat(8));
        assert!(parse_statement(&nested).is_ok());
    }
}
