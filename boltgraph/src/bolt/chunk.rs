// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Message framing
//!
//! A message is split into chunks of at most 65535 bytes, each prefixed
//! with its big-endian u16 length, and terminated by an empty chunk. An
//! empty chunk between messages is a keep-alive and is skipped.

use super::error::BoltError;
use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const MAX_CHUNK_SIZE: usize = u16::MAX as usize;

/// Largest message body accepted from a client
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Frame one message body
pub fn encode(message: &[u8]) -> BytesMut {
    let chunks = message.len() / MAX_CHUNK_SIZE + 1;
    let mut out = BytesMut::with_capacity(message.len() + chunks * 2 + 2);
    for chunk in message.chunks(MAX_CHUNK_SIZE) {
        out.put_u16(chunk.len() as u16);
        out.put_slice(chunk);
    }
    out.put_u16(0);
    out
}

/// Read the next message body. `Ok(None)` means the peer closed the
/// connection between messages.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<Vec<u8>>, BoltError>
where
    R: AsyncRead + Unpin,
{
    let mut message = Vec::new();
    loop {
        let mut header = [0u8; 2];
        match reader.read_exact(&mut header).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof && message.is_empty() => {
                return Ok(None)
            }
            Err(e) => return Err(e.into()),
        }
        let len = u16::from_be_bytes(header) as usize;
        if len == 0 {
            if message.is_empty() {
                continue;
            }
            return Ok(Some(message));
        }
        if message.len() + len > MAX_MESSAGE_SIZE {
            return Err(BoltError::Protocol(format!(
                "message exceeds {} bytes",
                MAX_MESSAGE_SIZE
            )));
        }
        let start = message.len();
        message.resize(start + len, 0);
        reader.read_exact(&mut message[start..]).await?;
    }
}

pub async fn write_message<W>(writer: &mut W, message: &[u8]) -> Result<(), BoltError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&encode(message)).await?;
    Ok(())
}
