// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Bolt request and response messages

use super::error::BoltError;
use super::handshake::BoltVersion;
use super::packstream::{PackResult, Packer, Unpacker};
use crate::error::Failure;
use crate::storage::Value;
use std::collections::BTreeMap;

pub type Extra = BTreeMap<String, Value>;

pub const HELLO: u8 = 0x01;
pub const GOODBYE: u8 = 0x02;
pub const RESET: u8 = 0x0F;
pub const RUN: u8 = 0x10;
pub const BEGIN: u8 = 0x11;
pub const COMMIT: u8 = 0x12;
pub const ROLLBACK: u8 = 0x13;
pub const DISCARD: u8 = 0x2F;
pub const PULL: u8 = 0x3F;
pub const ROUTE: u8 = 0x66;
pub const LOGON: u8 = 0x6A;
pub const LOGOFF: u8 = 0x6B;

pub const SUCCESS: u8 = 0x70;
pub const RECORD: u8 = 0x71;
pub const IGNORED: u8 = 0x7E;
pub const FAILURE: u8 = 0x7F;

/// Message kinds, used as the column of the session transition table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Hello,
    Goodbye,
    Reset,
    Run,
    Begin,
    Commit,
    Rollback,
    Discard,
    Pull,
    Route,
    Logon,
    Logoff,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Hello { extra: Extra },
    Goodbye,
    Reset,
    Run { query: String, parameters: Extra, extra: Extra },
    Begin { extra: Extra },
    Commit,
    Rollback,
    Discard { extra: Extra },
    Pull { extra: Extra },
    Route { routing: Extra, bookmarks: Vec<String>, extra: Extra },
    Logon { auth: Extra },
    Logoff,
}

impl Request {
    pub fn kind(&self) -> MessageKind {
        match self {
            Request::Hello { .. } => MessageKind::Hello,
            Request::Goodbye => MessageKind::Goodbye,
            Request::Reset => MessageKind::Reset,
            Request::Run { .. } => MessageKind::Run,
            Request::Begin { .. } => MessageKind::Begin,
            Request::Commit => MessageKind::Commit,
            Request::Rollback => MessageKind::Rollback,
            Request::Discard { .. } => MessageKind::Discard,
            Request::Pull { .. } => MessageKind::Pull,
            Request::Route { .. } => MessageKind::Route,
            Request::Logon { .. } => MessageKind::Logon,
            Request::Logoff => MessageKind::Logoff,
        }
    }

    /// Decode one message body
    pub fn decode(body: &[u8]) -> Result<Request, BoltError> {
        let mut unpacker = Unpacker::new(body);
        let (fields, signature) = unpacker.read_struct_header()?;
        let expect = |count: u8| -> Result<(), BoltError> {
            if fields == count {
                Ok(())
            } else {
                Err(BoltError::Protocol(format!(
                    "message 0x{:02X} expects {} fields, got {}",
                    signature, count, fields
                )))
            }
        };
        let request = match signature {
            HELLO => {
                expect(1)?;
                Request::Hello {
                    extra: unpacker.read_map()?,
                }
            }
            GOODBYE => {
                expect(0)?;
                Request::Goodbye
            }
            RESET => {
                expect(0)?;
                Request::Reset
            }
            RUN => {
                // 3.0+ sends query, parameters and extra
                expect(3)?;
                Request::Run {
                    query: unpacker.read_string()?,
                    parameters: unpacker.read_map()?,
                    extra: unpacker.read_map()?,
                }
            }
            BEGIN => {
                expect(1)?;
                Request::Begin {
                    extra: unpacker.read_map()?,
                }
            }
            COMMIT => {
                expect(0)?;
                Request::Commit
            }
            ROLLBACK => {
                expect(0)?;
                Request::Rollback
            }
            DISCARD => {
                expect(1)?;
                Request::Discard {
                    extra: unpacker.read_map()?,
                }
            }
            PULL => {
                expect(1)?;
                Request::Pull {
                    extra: unpacker.read_map()?,
                }
            }
            ROUTE => {
                expect(3)?;
                let routing = unpacker.read_map()?;
                let bookmarks = match unpacker.read_value()? {
                    Value::List(items) => items
                        .into_iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect(),
                    _ => Vec::new(),
                };
                // 4.4+ sends an extra map, earlier versions a db name or null
                let extra = match unpacker.read_value()? {
                    Value::Map(map) => map,
                    Value::String(db) => {
                        let mut map = Extra::new();
                        map.insert("db".to_string(), Value::String(db));
                        map
                    }
                    _ => Extra::new(),
                };
                Request::Route {
                    routing,
                    bookmarks,
                    extra,
                }
            }
            LOGON => {
                expect(1)?;
                Request::Logon {
                    auth: unpacker.read_map()?,
                }
            }
            LOGOFF => {
                expect(0)?;
                Request::Logoff
            }
            other => {
                return Err(BoltError::Protocol(format!(
                    "unknown message signature 0x{:02X}",
                    other
                )))
            }
        };
        if !unpacker.is_exhausted() {
            return Err(BoltError::Protocol("trailing bytes after message".to_string()));
        }
        Ok(request)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Success(Extra),
    Record(Vec<Value>),
    Ignored,
    Failure(Failure),
}

impl Response {
    pub fn success() -> Self {
        Response::Success(Extra::new())
    }

    pub fn signature(&self) -> u8 {
        match self {
            Response::Success(_) => SUCCESS,
            Response::Record(_) => RECORD,
            Response::Ignored => IGNORED,
            Response::Failure(_) => FAILURE,
        }
    }

    pub fn encode(&self, version: BoltVersion) -> PackResult<Vec<u8>> {
        let mut packer = Packer::new(version);
        match self {
            Response::Success(metadata) => {
                packer.pack_struct_header(1, SUCCESS);
                packer.pack_map(metadata)?;
            }
            Response::Record(fields) => {
                packer.pack_struct_header(1, RECORD);
                packer.pack_list_header(fields.len())?;
                for field in fields {
                    packer.pack(field)?;
                }
            }
            Response::Ignored => packer.pack_struct_header(0, IGNORED),
            Response::Failure(failure) => {
                packer.pack_struct_header(1, FAILURE);
                packer.pack_map_header(2)?;
                packer.pack_string("code")?;
                packer.pack_string(&failure.code)?;
                packer.pack_string("message")?;
                packer.pack_string(&failure.message)?;
            }
        }
        Ok(packer.into_bytes())
    }
}
