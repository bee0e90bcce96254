// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! PackStream v1 serialization
//!
//! Big-endian marker-prefixed encoding shared by every Bolt message. Graph
//! values are packed as structures whose field layout depends on the
//! negotiated protocol version: 5.x appends element ids.

use super::handshake::BoltVersion;
use crate::storage::{NodeValue, PathValue, RelationshipValue, Value};
use bytes::{BufMut, BytesMut};
use std::collections::BTreeMap;
use thiserror::Error;

pub const NODE: u8 = 0x4E;
pub const RELATIONSHIP: u8 = 0x52;
pub const UNBOUND_RELATIONSHIP: u8 = 0x72;
pub const PATH: u8 = 0x50;

const NULL: u8 = 0xC0;
const FLOAT_64: u8 = 0xC1;
const FALSE: u8 = 0xC2;
const TRUE: u8 = 0xC3;
const INT_8: u8 = 0xC8;
const INT_16: u8 = 0xC9;
const INT_32: u8 = 0xCA;
const INT_64: u8 = 0xCB;
const BYTES_8: u8 = 0xCC;
const BYTES_16: u8 = 0xCD;
const BYTES_32: u8 = 0xCE;
const STRING_8: u8 = 0xD0;
const STRING_16: u8 = 0xD1;
const STRING_32: u8 = 0xD2;
const LIST_8: u8 = 0xD4;
const LIST_16: u8 = 0xD5;
const LIST_32: u8 = 0xD6;
const MAP_8: u8 = 0xD8;
const MAP_16: u8 = 0xD9;
const MAP_32: u8 = 0xDA;

/// Deepest list/map nesting accepted from a client
pub const MAX_NESTING: usize = 64;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PackStreamError {
    #[error("Unexpected end of PackStream data")]
    UnexpectedEnd,

    #[error("Unknown PackStream marker 0x{0:02X}")]
    UnknownMarker(u8),

    #[error("Map keys must be strings")]
    NonStringKey,

    #[error("Invalid UTF-8 in string")]
    InvalidUtf8,

    #[error("Unsupported structure 0x{0:02X} in a request")]
    UnsupportedStructure(u8),

    #[error("Expected {expected} but found {found}")]
    UnexpectedType {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Value too large to pack: {0}")]
    TooLarge(&'static str),

    #[error("Values nested deeper than {0} levels")]
    TooDeep(usize),
}

pub type PackResult<T> = Result<T, PackStreamError>;

/// Writes PackStream values into a growing buffer
pub struct Packer {
    buf: BytesMut,
    version: BoltVersion,
}

impl Packer {
    pub fn new(version: BoltVersion) -> Self {
        Self {
            buf: BytesMut::with_capacity(128),
            version,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf.to_vec()
    }

    pub fn pack_null(&mut self) {
        self.buf.put_u8(NULL);
    }

    pub fn pack_bool(&mut self, value: bool) {
        self.buf.put_u8(if value { TRUE } else { FALSE });
    }

    pub fn pack_int(&mut self, value: i64) {
        if (-16..=127).contains(&value) {
            self.buf.put_i8(value as i8);
        } else if (i8::MIN as i64..=i8::MAX as i64).contains(&value) {
            self.buf.put_u8(INT_8);
            self.buf.put_i8(value as i8);
        } else if (i16::MIN as i64..=i16::MAX as i64).contains(&value) {
            self.buf.put_u8(INT_16);
            self.buf.put_i16(value as i16);
        } else if (i32::MIN as i64..=i32::MAX as i64).contains(&value) {
            self.buf.put_u8(INT_32);
            self.buf.put_i32(value as i32);
        } else {
            self.buf.put_u8(INT_64);
            self.buf.put_i64(value);
        }
    }

    pub fn pack_float(&mut self, value: f64) {
        self.buf.put_u8(FLOAT_64);
        self.buf.put_f64(value);
    }

    pub fn pack_string(&mut self, value: &str) -> PackResult<()> {
        self.sized_header(value.len(), 0x80, [STRING_8, STRING_16, STRING_32], "string")?;
        self.buf.put_slice(value.as_bytes());
        Ok(())
    }

    pub fn pack_list_header(&mut self, len: usize) -> PackResult<()> {
        self.sized_header(len, 0x90, [LIST_8, LIST_16, LIST_32], "list")
    }

    pub fn pack_map_header(&mut self, len: usize) -> PackResult<()> {
        self.sized_header(len, 0xA0, [MAP_8, MAP_16, MAP_32], "map")
    }

    pub fn pack_struct_header(&mut self, fields: u8, signature: u8) {
        self.buf.put_u8(0xB0 | (fields & 0x0F));
        self.buf.put_u8(signature);
    }

    fn sized_header(
        &mut self,
        len: usize,
        tiny: u8,
        markers: [u8; 3],
        what: &'static str,
    ) -> PackResult<()> {
        if len < 16 {
            self.buf.put_u8(tiny | len as u8);
        } else if len <= u8::MAX as usize {
            self.buf.put_u8(markers[0]);
            self.buf.put_u8(len as u8);
        } else if len <= u16::MAX as usize {
            self.buf.put_u8(markers[1]);
            self.buf.put_u16(len as u16);
        } else if len <= u32::MAX as usize {
            self.buf.put_u8(markers[2]);
            self.buf.put_u32(len as u32);
        } else {
            return Err(PackStreamError::TooLarge(what));
        }
        Ok(())
    }

    pub fn pack_map(&mut self, map: &BTreeMap<String, Value>) -> PackResult<()> {
        self.pack_map_header(map.len())?;
        for (key, value) in map {
            self.pack_string(key)?;
            self.pack(value)?;
        }
        Ok(())
    }

    pub fn pack_strings<'s, I>(&mut self, items: I) -> PackResult<()>
    where
        I: ExactSizeIterator<Item = &'s String>,
    {
        self.pack_list_header(items.len())?;
        for item in items {
            self.pack_string(item)?;
        }
        Ok(())
    }

    pub fn pack(&mut self, value: &Value) -> PackResult<()> {
        match value {
            Value::Null => self.pack_null(),
            Value::Boolean(b) => self.pack_bool(*b),
            Value::Integer(i) => self.pack_int(*i),
            Value::Float(f) => self.pack_float(*f),
            Value::String(s) => self.pack_string(s)?,
            Value::List(items) => {
                self.pack_list_header(items.len())?;
                for item in items {
                    self.pack(item)?;
                }
            }
            Value::Map(map) => self.pack_map(map)?,
            Value::Node(node) => self.pack_node(node)?,
            Value::Relationship(rel) => self.pack_relationship(rel)?,
            Value::Path(path) => self.pack_path(path)?,
        }
        Ok(())
    }

    fn pack_node(&mut self, node: &NodeValue) -> PackResult<()> {
        let with_element_id = self.version.has_element_ids();
        self.pack_struct_header(if with_element_id { 4 } else { 3 }, NODE);
        self.pack_int(node.id.wire_id());
        self.pack_strings(node.labels.iter())?;
        self.pack_map(&node.properties)?;
        if with_element_id {
            self.pack_string(&node.id.element_id())?;
        }
        Ok(())
    }

    fn pack_relationship(&mut self, rel: &RelationshipValue) -> PackResult<()> {
        let with_element_id = self.version.has_element_ids();
        self.pack_struct_header(if with_element_id { 8 } else { 5 }, RELATIONSHIP);
        self.pack_int(rel.id.wire_id());
        self.pack_int(rel.start.wire_id());
        self.pack_int(rel.end.wire_id());
        self.pack_string(&rel.rel_type)?;
        self.pack_map(&rel.properties)?;
        if with_element_id {
            self.pack_string(&rel.id.element_id())?;
            self.pack_string(&rel.start.element_id())?;
            self.pack_string(&rel.end.element_id())?;
        }
        Ok(())
    }

    fn pack_unbound_relationship(&mut self, rel: &RelationshipValue) -> PackResult<()> {
        let with_element_id = self.version.has_element_ids();
        self.pack_struct_header(if with_element_id { 4 } else { 3 }, UNBOUND_RELATIONSHIP);
        self.pack_int(rel.id.wire_id());
        self.pack_string(&rel.rel_type)?;
        self.pack_map(&rel.properties)?;
        if with_element_id {
            self.pack_string(&rel.id.element_id())?;
        }
        Ok(())
    }

    /// Path as distinct nodes, distinct unbound relationships and the index
    /// sequence walking them; negative relationship indexes run backwards
    fn pack_path(&mut self, path: &PathValue) -> PackResult<()> {
        let mut nodes: Vec<&NodeValue> = Vec::new();
        let mut rels: Vec<&RelationshipValue> = Vec::new();
        let mut indices = Vec::with_capacity(path.relationships.len() * 2);

        if let Some(first) = path.nodes.first() {
            intern(&mut nodes, first, |a, b| a.id == b.id);
        }
        for (step, rel) in path.relationships.iter().enumerate() {
            let (Some(prev), Some(next)) = (path.nodes.get(step), path.nodes.get(step + 1)) else {
                break;
            };
            let rel_index = intern(&mut rels, rel, |a, b| a.id == b.id) as i64 + 1;
            indices.push(if rel.start == prev.id { rel_index } else { -rel_index });
            indices.push(intern(&mut nodes, next, |a, b| a.id == b.id) as i64);
        }

        self.pack_struct_header(3, PATH);
        self.pack_list_header(nodes.len())?;
        for node in nodes {
            self.pack_node(node)?;
        }
        self.pack_list_header(rels.len())?;
        for rel in rels {
            self.pack_unbound_relationship(rel)?;
        }
        self.pack_list_header(indices.len())?;
        for index in indices {
            self.pack_int(index);
        }
        Ok(())
    }
}

/// Reads PackStream values from a message body
pub struct Unpacker<'a> {
    data: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Unpacker<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            depth: 0,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn take(&mut self, n: usize) -> PackResult<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or(PackStreamError::UnexpectedEnd)?;
        let slice = self
            .data
            .get(self.pos..end)
            .ok_or(PackStreamError::UnexpectedEnd)?;
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> PackResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_array<const N: usize>(&mut self) -> PackResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn read_len(&mut self, width: usize) -> PackResult<usize> {
        Ok(match width {
            1 => self.read_u8()? as usize,
            2 => u16::from_be_bytes(self.read_array()?) as usize,
            _ => u32::from_be_bytes(self.read_array()?) as usize,
        })
    }

    /// Structure header: field count and signature
    pub fn read_struct_header(&mut self) -> PackResult<(u8, u8)> {
        let marker = self.read_u8()?;
        if marker & 0xF0 != 0xB0 {
            return Err(PackStreamError::UnexpectedType {
                expected: "structure",
                found: marker_name(marker),
            });
        }
        Ok((marker & 0x0F, self.read_u8()?))
    }

    pub fn read_value(&mut self) -> PackResult<Value> {
        let marker = self.read_u8()?;
        let value = match marker {
            0x00..=0x7F => Value::Integer(marker as i64),
            0xF0..=0xFF => Value::Integer(marker as i8 as i64),
            NULL => Value::Null,
            FALSE => Value::Boolean(false),
            TRUE => Value::Boolean(true),
            FLOAT_64 => Value::Float(f64::from_be_bytes(self.read_array()?)),
            INT_8 => Value::Integer(self.read_u8()? as i8 as i64),
            INT_16 => Value::Integer(i16::from_be_bytes(self.read_array()?) as i64),
            INT_32 => Value::Integer(i32::from_be_bytes(self.read_array()?) as i64),
            INT_64 => Value::Integer(i64::from_be_bytes(self.read_array()?)),
            BYTES_8 | BYTES_16 | BYTES_32 => {
                let len = self.read_len(1 << (marker - BYTES_8))?;
                let bytes = self.take(len)?;
                Value::List(bytes.iter().map(|b| Value::Integer(*b as i64)).collect())
            }
            0x80..=0x8F => Value::String(self.read_string_body((marker & 0x0F) as usize)?),
            STRING_8 | STRING_16 | STRING_32 => {
                let len = self.read_len(1 << (marker - STRING_8))?;
                Value::String(self.read_string_body(len)?)
            }
            0x90..=0x9F => self.read_list_body((marker & 0x0F) as usize)?,
            LIST_8 | LIST_16 | LIST_32 => {
                let len = self.read_len(1 << (marker - LIST_8))?;
                self.read_list_body(len)?
            }
            0xA0..=0xAF => Value::Map(self.read_map_body((marker & 0x0F) as usize)?),
            MAP_8 | MAP_16 | MAP_32 => {
                let len = self.read_len(1 << (marker - MAP_8))?;
                Value::Map(self.read_map_body(len)?)
            }
            0xB0..=0xBF => {
                let signature = self.read_u8()?;
                return Err(PackStreamError::UnsupportedStructure(signature));
            }
            other => return Err(PackStreamError::UnknownMarker(other)),
        };
        Ok(value)
    }

    fn read_string_body(&mut self, len: usize) -> PackResult<String> {
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| PackStreamError::InvalidUtf8)
    }

    fn nested<T>(&mut self, read: impl FnOnce(&mut Self) -> PackResult<T>) -> PackResult<T> {
        if self.depth >= MAX_NESTING {
            return Err(PackStreamError::TooDeep(MAX_NESTING));
        }
        self.depth += 1;
        let result = read(self);
        self.depth -= 1;
        result
    }

    fn read_list_body(&mut self, len: usize) -> PackResult<Value> {
        self.nested(|this| {
            // Declared lengths are untrusted, cap the preallocation
            let mut items = Vec::with_capacity(len.min(1024));
            for _ in 0..len {
                items.push(this.read_value()?);
            }
            Ok(Value::List(items))
        })
    }

    fn read_map_body(&mut self, len: usize) -> PackResult<BTreeMap<String, Value>> {
        self.nested(|this| {
            let mut map = BTreeMap::new();
            for _ in 0..len {
                let key = match this.read_value()? {
                    Value::String(key) => key,
                    _ => return Err(PackStreamError::NonStringKey),
                };
                let value = this.read_value()?;
                map.insert(key, value);
            }
            Ok(map)
        })
    }

    pub fn read_map(&mut self) -> PackResult<BTreeMap<String, Value>> {
        match self.read_value()? {
            Value::Map(map) => Ok(map),
            other => Err(PackStreamError::UnexpectedType {
                expected: "map",
                found: other.type_name(),
            }),
        }
    }

    pub fn read_string(&mut self) -> PackResult<String> {
        match self.read_value()? {
            Value::String(s) => Ok(s),
            other => Err(PackStreamError::UnexpectedType {
                expected: "string",
                found: other.type_name(),
            }),
        }
    }
}

fn intern<'v, T>(items: &mut Vec<&'v T>, item: &'v T, same: impl Fn(&T, &T) -> bool) -> usize {
    match items.iter().position(|existing| same(existing, item)) {
        Some(i) => i,
        None => {
            items.push(item);
            items.len() - 1
        }
    }
}

fn marker_name(marker: u8) -> &'static str {
    match marker {
        0x80..=0x8F | STRING_8 | STRING_16 | STRING_32 => "string",
        0x90..=0x9F | LIST_8 | LIST_16 | LIST_32 => "list",
        0xA0..=0xAF | MAP_8 | MAP_16 | MAP_32 => "map",
        NULL => "null",
        TRUE | FALSE => "boolean",
        FLOAT_64 => "float",
        _ => "integer",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::EntityRef;

    const V44: BoltVersion = BoltVersion::new(4, 4);
    const V54: BoltVersion = BoltVersion::new(5, 4);

    fn packed(value: &Value, version: BoltVersion) -> Vec<u8> {
        let mut packer = Packer::new(version);
        packer.pack(value).unwrap();
        packer.into_bytes()
    }

    fn unpack(bytes: &[u8]) -> Value {
        Unpacker::new(bytes).read_value().unwrap()
    }

    #[test]
    fn test_integer_markers() {
        assert_eq!(packed(&Value::Integer(1), V44), vec![0x01]);
        assert_eq!(packed(&Value::Integer(-16), V44), vec![0xF0]);
        assert_eq!(packed(&Value::Integer(-17), V44), vec![INT_8, 0xEF]);
        assert_eq!(packed(&Value::Integer(200), V44), vec![INT_16, 0x00, 0xC8]);
        assert_eq!(
            packed(&Value::Integer(100_000), V44),
            vec![INT_32, 0x00, 0x01, 0x86, 0xA0]
        );
        assert_eq!(packed(&Value::Integer(i64::MAX), V44)[0], INT_64);
        for i in [-1_i64, -128, 127, 32_767, -2_147_483_648, i64::MIN] {
            assert_eq!(unpack(&packed(&Value::Integer(i), V44)), Value::Integer(i));
        }
    }

    #[test]
    fn test_strings_lists_maps() {
        assert_eq!(packed(&Value::from("A"), V44), vec![0x81, 0x41]);
        let long = "x".repeat(300);
        assert_eq!(&packed(&Value::from(long.as_str()), V44)[..3], &[STRING_16, 0x01, 0x2C]);

        let mut map = BTreeMap::new();
        map.insert("a".to_string(), Value::List(vec![Value::Null, Value::Boolean(true)]));
        map.insert("b".to_string(), Value::Float(1.5));
        let value = Value::Map(map);
        assert_eq!(unpack(&packed(&value, V44)), value);
    }

    #[test]
    fn test_node_layout_depends_on_version() {
        let node = Value::Node(NodeValue {
            id: EntityRef::Permanent(7),
            labels: vec!["Person".to_string()],
            properties: BTreeMap::new(),
        });
        let v4 = packed(&node, V44);
        assert_eq!(&v4[..3], &[0xB3, NODE, 0x07]);
        let v5 = packed(&node, V54);
        assert_eq!(&v5[..3], &[0xB4, NODE, 0x07]);
        assert_eq!(&v5[v5.len() - 2..], &[0x81, b'7']);
    }

    #[test]
    fn test_temporary_ids_are_negative() {
        let rel = Value::Relationship(RelationshipValue {
            id: EntityRef::Temporary(0),
            rel_type: "KNOWS".to_string(),
            start: EntityRef::Permanent(1),
            end: EntityRef::Temporary(1),
            properties: BTreeMap::new(),
        });
        let bytes = packed(&rel, V44);
        assert_eq!(&bytes[..5], &[0xB5, RELATIONSHIP, 0xFF, 0x01, 0xFE]);
    }

    #[test]
    fn test_path_indices() {
        let node = |id| NodeValue {
            id: EntityRef::Permanent(id),
            labels: vec![],
            properties: BTreeMap::new(),
        };
        let rel = |id, start, end| RelationshipValue {
            id: EntityRef::Permanent(id),
            rel_type: "R".to_string(),
            start: EntityRef::Permanent(start),
            end: EntityRef::Permanent(end),
            properties: BTreeMap::new(),
        };
        // 1 -[10]-> 2 <-[11]- 3
        let path = Value::Path(PathValue {
            nodes: vec![node(1), node(2), node(3)],
            relationships: vec![rel(10, 1, 2), rel(11, 3, 2)],
        });
        let bytes = packed(&path, V44);
        assert_eq!(&bytes[..2], &[0xB3, PATH]);
        assert_eq!(&bytes[bytes.len() - 5..], &[0x94, 0x01, 0x01, 0xFE, 0x02]);
    }

    #[test]
    fn test_truncated_and_unknown_input() {
        assert_eq!(
            Unpacker::new(&[STRING_8, 0x05, b'a']).read_value(),
            Err(PackStreamError::UnexpectedEnd)
        );
        assert_eq!(
            Unpacker::new(&[0xE0]).read_value(),
            Err(PackStreamError::UnknownMarker(0xE0))
        );
        assert_eq!(
            Unpacker::new(&[0xA1, 0x01, 0x01]).read_value(),
            Err(PackStreamError::NonStringKey)
        );
    }

    #[test]
    fn test_nesting_limit() {
        let mut deep = vec![0x91; 200];
        deep.push(0x01);
        assert_eq!(
            Unpacker::new(&deep).read_value(),
            Err(PackStreamError::TooDeep(MAX_NESTING))
        );

        let mut ok = vec![0x91; MAX_NESTING];
        ok.push(0x01);
        let mut value = Unpacker::new(&ok).read_value().unwrap();
        for _ in 0..MAX_NESTING {
            value = value.as_list().unwrap()[0].clone();
        }
        assert_eq!(value, Value::Integer(1));

        // Siblings do not add up
        let wide = [0x92, 0x91, 0x91, 0x01, 0xA1, 0x81, b'k', 0x91, 0x02];
        assert!(Unpacker::new(&wide).read_value().is_ok());
    }
}
