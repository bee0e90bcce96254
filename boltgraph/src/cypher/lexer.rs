// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Lexer for the Cypher subset
//!
//! Every token parser either consumes input or fails, so the tokenize loop
//! always advances. Keywords are recognised after an identifier has been
//! read, which gives them a word boundary for free and keeps them
//! case-insensitive.
//!
//! Numbers are lexed unsigned. A leading minus is a separate token and the
//! parser turns it into negation, so `a-1` and `-[r]->` both lex the same way.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_while},
    character::complete::{alpha1, alphanumeric1, char, digit1},
    combinator::{map, map_res, opt, recognize},
    multi::many0,
    sequence::{pair, tuple},
    IResult,
};

/// Token types for the Cypher subset
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Clause keywords
    Match,
    Optional,
    Where,
    Return,
    Create,
    Merge,
    On,
    Set,
    Remove,
    Delete,
    Detach,
    Unwind,
    With,
    Call,
    Yield,
    As,
    Distinct,
    Order,
    By,
    Asc,
    Desc,
    Skip,
    Limit,

    // Expression keywords
    And,
    Or,
    Xor,
    Not,
    Is,
    In,
    Starts,
    Ends,
    Contains,
    Null,
    True,
    False,

    // Schema and transaction keywords
    Constraint,
    Constraints,
    If,
    Exists,
    For,
    Require,
    Assert,
    Unique,
    Node,
    Key,
    Drop,
    Show,
    All,
    Begin,
    Commit,
    Rollback,
    Transaction,

    // Literals and names
    Integer(i64),
    Float(f64),
    String(String),
    Identifier(String),
    BacktickString(String),
    Parameter(String),

    // Punctuation
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,
    Comma,
    Colon,
    Semicolon,
    Dot,
    DotDot,
    Pipe,

    // Operators
    Plus,
    PlusEqual,
    Dash,
    Star,
    Slash,
    Percent,
    Caret,
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    Arrow,
    ArrowLeft,

    // Skipped by tokenize
    Whitespace,
    Comment(String),

    EOF,
}

impl Token {
    /// Source spelling of a keyword token, so keywords can still be used as
    /// labels, relationship types and property keys
    pub fn keyword_text(&self) -> Option<&'static str> {
        let text = match self {
            Token::Match => "MATCH",
            Token::Optional => "OPTIONAL",
            Token::Where => "WHERE",
            Token::Return => "RETURN",
            Token::Create => "CREATE",
            Token::Merge => "MERGE",
            Token::On => "ON",
            Token::Set => "SET",
            Token::Remove => "REMOVE",
            Token::Delete => "DELETE",
            Token::Detach => "DETACH",
            Token::Unwind => "UNWIND",
            Token::With => "WITH",
            Token::Call => "CALL",
            Token::Yield => "YIELD",
            Token::As => "AS",
            Token::Distinct => "DISTINCT",
            Token::Order => "ORDER",
            Token::By => "BY",
            Token::Asc => "ASC",
            Token::Desc => "DESC",
            Token::Skip => "SKIP",
            Token::Limit => "LIMIT",
            Token::And => "AND",
            Token::Or => "OR",
            Token::Xor => "XOR",
            Token::Not => "NOT",
            Token::Is => "IS",
            Token::In => "IN",
            Token::Starts => "STARTS",
            Token::Ends => "ENDS",
            Token::Contains => "CONTAINS",
            Token::Null => "NULL",
            Token::True => "TRUE",
            Token::False => "FALSE",
            Token::Constraint => "CONSTRAINT",
            Token::Constraints => "CONSTRAINTS",
            Token::If => "IF",
            Token::Exists => "EXISTS",
            Token::For => "FOR",
            Token::Require => "REQUIRE",
            Token::Assert => "ASSERT",
            Token::Unique => "UNIQUE",
            Token::Node => "NODE",
            Token::Key => "KEY",
            Token::Drop => "DROP",
            Token::Show => "SHOW",
            Token::All => "ALL",
            Token::Begin => "BEGIN",
            Token::Commit => "COMMIT",
            Token::Rollback => "ROLLBACK",
            Token::Transaction => "TRANSACTION",
            _ => return None,
        };
        Some(text)
    }
}

/// Map a bare word to its keyword token, if it is one
fn keyword(word: &str) -> Option<Token> {
    let token = match word.to_ascii_uppercase().as_str() {
        "MATCH" => Token::Match,
        "OPTIONAL" => Token::Optional,
        "WHERE" => Token::Where,
        "RETURN" => Token::Return,
        "CREATE" => Token::Create,
        "MERGE" => Token::Merge,
        "ON" => Token::On,
        "SET" => Token::Set,
        "REMOVE" => Token::Remove,
        "DELETE" => Token::Delete,
        "DETACH" => Token::Detach,
        "UNWIND" => Token::Unwind,
        "WITH" => Token::With,
        "CALL" => Token::Call,
        "YIELD" => Token::Yield,
        "AS" => Token::As,
        "DISTINCT" => Token::Distinct,
        "ORDER" => Token::Order,
        "BY" => Token::By,
        "ASC" | "ASCENDING" => Token::Asc,
        "DESC" | "DESCENDING" => Token::Desc,
        "SKIP" => Token::Skip,
        "LIMIT" => Token::Limit,
        "AND" => Token::And,
        "OR" => Token::Or,
        "XOR" => Token::Xor,
        "NOT" => Token::Not,
        "IS" => Token::Is,
        "IN" => Token::In,
        "STARTS" => Token::Starts,
        "ENDS" => Token::Ends,
        "CONTAINS" => Token::Contains,
        "NULL" => Token::Null,
        "TRUE" => Token::True,
        "FALSE" => Token::False,
        "CONSTRAINT" => Token::Constraint,
        "CONSTRAINTS" => Token::Constraints,
        "IF" => Token::If,
        "EXISTS" => Token::Exists,
        "FOR" => Token::For,
        "REQUIRE" => Token::Require,
        "ASSERT" => Token::Assert,
        "UNIQUE" => Token::Unique,
        "NODE" => Token::Node,
        "KEY" => Token::Key,
        "DROP" => Token::Drop,
        "SHOW" => Token::Show,
        "ALL" => Token::All,
        "BEGIN" => Token::Begin,
        "COMMIT" => Token::Commit,
        "ROLLBACK" => Token::Rollback,
        "TRANSACTION" => Token::Transaction,
        _ => return None,
    };
    Some(token)
}

/// Parse a single token. More specific patterns come first: comments before
/// `/`, floats before integers, multi-character operators before their
/// single-character prefixes.
fn token(input: &str) -> IResult<&str, Token> {
    alt((
        whitespace,
        map(comment, |s| Token::Comment(s.to_string())),
        map(parameter, |s| Token::Parameter(s.to_string())),
        map(float_literal, Token::Float),
        map(integer_literal, Token::Integer),
        map(backtick_identifier, |s| Token::BacktickString(s.replace("``", "`"))),
        map(string_literal, Token::String),
        operator,
        punctuation,
        word,
    ))(input)
}

fn whitespace(input: &str) -> IResult<&str, Token> {
    let (remaining, chars) = take_while(|c: char| c.is_whitespace())(input)?;
    if chars.is_empty() {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Tag,
        )));
    }
    Ok((remaining, Token::Whitespace))
}

fn comment(input: &str) -> IResult<&str, &str> {
    alt((
        recognize(pair(tag("//"), take_while(|c| c != '\n'))),
        recognize(tuple((tag("/*"), take_until("*/"), tag("*/")))),
    ))(input)
}

fn operator(input: &str) -> IResult<&str, Token> {
    alt((
        map(tag("<>"), |_| Token::NotEqual),
        map(tag("!="), |_| Token::NotEqual),
        map(tag("<="), |_| Token::LessEqual),
        map(tag(">="), |_| Token::GreaterEqual),
        map(tag("->"), |_| Token::Arrow),
        map(tag("<-"), |_| Token::ArrowLeft),
        map(tag("+="), |_| Token::PlusEqual),
        map(tag(".."), |_| Token::DotDot),
        map(char('<'), |_| Token::LessThan),
        map(char('>'), |_| Token::GreaterThan),
        map(char('='), |_| Token::Equal),
        map(char('+'), |_| Token::Plus),
        map(char('-'), |_| Token::Dash),
        map(char('*'), |_| Token::Star),
        map(char('/'), |_| Token::Slash),
        map(char('%'), |_| Token::Percent),
        map(char('^'), |_| Token::Caret),
    ))(input)
}

fn punctuation(input: &str) -> IResult<&str, Token> {
    alt((
        map(char('('), |_| Token::LeftParen),
        map(char(')'), |_| Token::RightParen),
        map(char('['), |_| Token::LeftBracket),
        map(char(']'), |_| Token::RightBracket),
        map(char('{'), |_| Token::LeftBrace),
        map(char('}'), |_| Token::RightBrace),
        map(char(','), |_| Token::Comma),
        map(char(':'), |_| Token::Colon),
        map(char(';'), |_| Token::Semicolon),
        map(char('.'), |_| Token::Dot),
        map(char('|'), |_| Token::Pipe),
    ))(input)
}

/// Keyword or identifier
fn word(input: &str) -> IResult<&str, Token> {
    map(identifier, |s: &str| {
        keyword(s).unwrap_or_else(|| Token::Identifier(s.to_string()))
    })(input)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))(input)
}

/// `$name` or positional `$0`
fn parameter(input: &str) -> IResult<&str, &str> {
    map(
        recognize(pair(char('$'), alt((identifier, digit1)))),
        |s: &str| &s[1..],
    )(input)
}

fn integer_literal(input: &str) -> IResult<&str, i64> {
    map_res(digit1, |s: &str| s.parse::<i64>())(input)
}

fn float_literal(input: &str) -> IResult<&str, f64> {
    map_res(
        alt((
            recognize(tuple((
                digit1,
                char('.'),
                digit1,
                opt(tuple((
                    alt((char('e'), char('E'))),
                    opt(alt((char('+'), char('-')))),
                    digit1,
                ))),
            ))),
            recognize(tuple((
                digit1,
                alt((char('e'), char('E'))),
                opt(alt((char('+'), char('-')))),
                digit1,
            ))),
        )),
        |s: &str| s.parse::<f64>(),
    )(input)
}

fn backtick_identifier(input: &str) -> IResult<&str, &str> {
    let (rest, _) = char('`')(input)?;
    let bytes = rest.as_bytes();
    let mut pos = 0;
    while pos < bytes.len() {
        if bytes[pos] == b'`' {
            if bytes.get(pos + 1) == Some(&b'`') {
                pos += 2;
                continue;
            }
            return Ok((&rest[pos + 1..], &rest[..pos]));
        }
        pos += 1;
    }
    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Char,
    )))
}

/// Single- or double-quoted string with backslash escapes resolved
fn string_literal(input: &str) -> IResult<&str, String> {
    let quote = match input.chars().next() {
        Some(c @ ('\'' | '"')) => c,
        _ => {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Char,
            )))
        }
    };

    let mut out = String::new();
    let mut chars = input[1..].char_indices();
    while let Some((i, c)) = chars.next() {
        if c == quote {
            return Ok((&input[1 + i + c.len_utf8()..], out));
        }
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some((_, 'n')) => out.push('\n'),
            Some((_, 't')) => out.push('\t'),
            Some((_, 'r')) => out.push('\r'),
            Some((_, 'b')) => out.push('\u{8}'),
            Some((_, 'f')) => out.push('\u{c}'),
            Some((_, 'u')) => {
                let hex: String = chars.by_ref().take(4).map(|(_, h)| h).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) if hex.len() == 4 => out.push(decoded),
                    _ => {
                        return Err(nom::Err::Failure(nom::error::Error::new(
                            input,
                            nom::error::ErrorKind::Escaped,
                        )))
                    }
                }
            }
            Some((_, other)) => out.push(other),
            None => break,
        }
    }
    // Unterminated string
    Err(nom::Err::Failure(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Char,
    )))
}

/// Tokenize a query string; whitespace and comments are dropped and the
/// stream always ends with [`Token::EOF`]
pub fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut remaining = input;
    let mut tokens = Vec::new();

    while !remaining.is_empty() {
        match token(remaining) {
            Ok((next_remaining, token)) => {
                if next_remaining.len() >= remaining.len() {
                    return Err(format!("lexer made no progress at '{}'", preview(remaining)));
                }
                if !matches!(token, Token::Whitespace | Token::Comment(_)) {
                    let consumed = &remaining[..remaining.len() - next_remaining.len()];
                    let token = demote_keyword(token, consumed, tokens.last(), next_remaining);
                    tokens.push(token);
                }
                remaining = next_remaining;
            }
            Err(_) => {
                let offset = input.len() - remaining.len();
                return Err(format!(
                    "Invalid input '{}' at offset {}",
                    preview(remaining),
                    offset
                ));
            }
        }
    }
    tokens.push(Token::EOF);
    Ok(tokens)
}

/// A keyword directly after `.`, `:` or `|`, or directly before `:`, is a
/// property key, label, relationship type or map key and keeps its spelling.
/// Literals and `NOT` after `:` start a map value instead; a label spelled
/// like one needs backticks.
fn demote_keyword(token: Token, text: &str, previous: Option<&Token>, rest: &str) -> Token {
    if token.keyword_text().is_none() {
        return token;
    }
    let starts_value = matches!(token, Token::True | Token::False | Token::Null | Token::Not);
    let names_something = match previous {
        Some(Token::Dot | Token::Pipe) => true,
        Some(Token::Colon) => !starts_value,
        _ => false,
    } || rest.trim_start().starts_with(':');
    if names_something {
        Token::Identifier(text.to_string())
    } else {
        token
    }
}

fn preview(input: &str) -> String {
    input.chars().take(16).collect()
}
