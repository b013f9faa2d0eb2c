//! Incremental RESP Parser
//!
//! Decodes client input into [`Frame`]s. Two dialects are accepted on the
//! same connection:
//!
//! - **RESP arrays** — what real clients send: `*2\r\n$3\r\nGET\r\n...`
//! - **Inline commands** — bare CRLF-terminated lines split on
//!   whitespace, e.g. `SET key value\r\n`, handy over netcat/telnet.
//!   Any line that does not start with a known type marker is treated as
//!   inline and decodes to an array of bulk strings, so the dispatcher
//!   sees one shape regardless of dialect.
//!
//! TCP gives no message boundaries, so the parser is incremental: it
//! reports how many bytes a complete frame consumed, or that the buffer
//! ends mid-frame and more data is needed:
//!
//! - `Ok(Some((frame, consumed)))` — a full frame; drop `consumed` bytes.
//! - `Ok(None)` — incomplete; read more and retry with the same buffer.
//! - `Err(_)` — the bytes cannot be valid RESP; the connection layer
//!   reports the error and closes.

use crate::protocol::types::{marker, Frame, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Largest accepted bulk string (512 MB, matching Redis).
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Largest accepted array header, guarding against absurd allocations.
pub const MAX_ARRAY_LEN: usize = 1024 * 1024;

/// Deepest accepted array nesting.
pub const MAX_DEPTH: usize = 32;

/// Ways the input can fail to be RESP.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid integer in frame header: {0}")]
    BadHeaderInteger(String),

    #[error("invalid UTF-8 in frame: {0}")]
    BadUtf8(String),

    #[error("invalid bulk string length {0}")]
    BadBulkLen(i64),

    #[error("invalid array length {0}")]
    BadArrayLen(i64),

    #[error("bulk string of {0} bytes exceeds the {MAX_BULK_LEN} byte limit")]
    BulkTooLarge(usize),

    #[error("array nesting deeper than {MAX_DEPTH}")]
    TooDeep,

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Result of a parse attempt: the frame and the bytes it consumed, or
/// `None` when the buffer holds only a prefix of a frame.
pub type Parsed = Option<(Frame, usize)>;

/// Attempts to decode one frame from the front of `buf`.
pub fn parse_frame(buf: &[u8]) -> Result<Parsed, ParseError> {
    parse_value(buf, 0)
}

fn parse_value(buf: &[u8], depth: usize) -> Result<Parsed, ParseError> {
    if depth > MAX_DEPTH {
        return Err(ParseError::TooDeep);
    }
    let Some(&first) = buf.first() else {
        return Ok(None);
    };
    match first {
        marker::SIMPLE => parse_line(buf, Frame::Simple),
        marker::ERROR => parse_line(buf, Frame::Error),
        marker::INTEGER => parse_integer(buf),
        marker::BULK => parse_bulk(buf),
        marker::ARRAY => parse_array(buf, depth),
        _ => parse_inline(buf),
    }
}

/// Decodes `+text\r\n` or `-text\r\n` into the frame built by `make`.
fn parse_line(buf: &[u8], make: fn(String) -> Frame) -> Result<Parsed, ParseError> {
    let Some(end) = find_crlf(&buf[1..]) else {
        return Ok(None);
    };
    let text = std::str::from_utf8(&buf[1..1 + end])
        .map_err(|e| ParseError::BadUtf8(e.to_string()))?;
    Ok(Some((make(text.to_string()), 1 + end + CRLF.len())))
}

fn parse_integer(buf: &[u8]) -> Result<Parsed, ParseError> {
    let Some(end) = find_crlf(&buf[1..]) else {
        return Ok(None);
    };
    let n = header_int(&buf[1..1 + end])?;
    Ok(Some((Frame::Integer(n), 1 + end + CRLF.len())))
}

fn parse_bulk(buf: &[u8]) -> Result<Parsed, ParseError> {
    let Some(header_end) = find_crlf(&buf[1..]) else {
        return Ok(None);
    };
    let len = header_int(&buf[1..1 + header_end])?;
    let data_start = 1 + header_end + CRLF.len();

    if len == -1 {
        return Ok(Some((Frame::Null, data_start)));
    }
    if len < 0 {
        return Err(ParseError::BadBulkLen(len));
    }
    let len = len as usize;
    if len > MAX_BULK_LEN {
        return Err(ParseError::BulkTooLarge(len));
    }

    let total = data_start + len + CRLF.len();
    if buf.len() < total {
        return Ok(None);
    }
    if &buf[data_start + len..total] != CRLF {
        return Err(ParseError::Protocol(
            "bulk string payload not terminated by CRLF".to_string(),
        ));
    }
    let data = Bytes::copy_from_slice(&buf[data_start..data_start + len]);
    Ok(Some((Frame::Bulk(data), total)))
}

fn parse_array(buf: &[u8], depth: usize) -> Result<Parsed, ParseError> {
    let Some(header_end) = find_crlf(&buf[1..]) else {
        return Ok(None);
    };
    let len = header_int(&buf[1..1 + header_end])?;
    let mut consumed = 1 + header_end + CRLF.len();

    if len == -1 {
        return Ok(Some((Frame::Null, consumed)));
    }
    if len < 0 {
        return Err(ParseError::BadArrayLen(len));
    }
    let len = len as usize;
    if len > MAX_ARRAY_LEN {
        return Err(ParseError::BadArrayLen(len as i64));
    }

    let mut items = Vec::with_capacity(len.min(64));
    for _ in 0..len {
        match parse_value(&buf[consumed..], depth + 1)? {
            Some((item, used)) => {
                items.push(item);
                consumed += used;
            }
            None => return Ok(None),
        }
    }
    Ok(Some((Frame::Array(items), consumed)))
}

/// Decodes a bare command line into an array of bulk strings.
fn parse_inline(buf: &[u8]) -> Result<Parsed, ParseError> {
    let Some(end) = find_crlf(buf) else {
        return Ok(None);
    };
    let line = std::str::from_utf8(&buf[..end])
        .map_err(|e| ParseError::BadUtf8(e.to_string()))?;
    // A blank line decodes to an empty array; the dispatcher answers it
    // with an error and the connection stays usable.
    let tokens: Vec<Frame> = line
        .split_whitespace()
        .map(|token| Frame::Bulk(Bytes::copy_from_slice(token.as_bytes())))
        .collect();
    Ok(Some((Frame::Array(tokens), end + CRLF.len())))
}

fn header_int(raw: &[u8]) -> Result<i64, ParseError> {
    let text =
        std::str::from_utf8(raw).map_err(|e| ParseError::BadUtf8(e.to_string()))?;
    text.parse()
        .map_err(|_| ParseError::BadHeaderInteger(text.to_string()))
}

/// Position of the first CRLF pair, pointing at the `\r`.
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|pair| pair == CRLF)
}
