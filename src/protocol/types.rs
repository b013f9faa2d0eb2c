//! RESP Reply Frames
//!
//! The wire vocabulary of the Redis Serialization Protocol. Every reply
//! the server sends is one of these frames; incoming commands decode to
//! them as well (an array of bulk strings, usually).
//!
//! Each frame starts with a one-byte type marker and ends with CRLF:
//!
//! | Frame        | Encoding                                |
//! |--------------|-----------------------------------------|
//! | simple str   | `+<text>\r\n`                           |
//! | error        | `-<text>\r\n`                           |
//! | integer      | `:<decimal>\r\n`                        |
//! | bulk string  | `$<len>\r\n<data>\r\n`                  |
//! | nil          | `$-1\r\n`                               |
//! | array        | `*<n>\r\n` followed by n sub-frames     |

use bytes::Bytes;
use std::fmt;

/// The CRLF line terminator.
pub const CRLF: &[u8] = b"\r\n";

/// Frame type markers.
pub mod marker {
    pub const SIMPLE: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// One RESP frame, for both requests and replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A short non-binary string; must not contain CRLF.
    Simple(String),
    /// An error reply; rendered with a leading `-`.
    Error(String),
    /// A 64-bit signed integer.
    Integer(i64),
    /// A binary-safe string.
    Bulk(Bytes),
    /// The nil reply (`$-1\r\n`).
    Null,
    /// A sequence of frames, possibly nested.
    Array(Vec<Frame>),
}

impl Frame {
    pub fn simple(text: impl Into<String>) -> Self {
        Frame::Simple(text.into())
    }

    pub fn error(text: impl Into<String>) -> Self {
        Frame::Error(text.into())
    }

    pub fn integer(n: i64) -> Self {
        Frame::Integer(n)
    }

    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Frame::Bulk(data.into())
    }

    pub fn array(items: Vec<Frame>) -> Self {
        Frame::Array(items)
    }

    /// The canonical `+OK` reply.
    pub fn ok() -> Self {
        Frame::Simple("OK".to_string())
    }

    /// The canonical `+PONG` reply.
    pub fn pong() -> Self {
        Frame::Simple("PONG".to_string())
    }

    /// Encodes this frame to a fresh buffer.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Encodes this frame into `buf`; reuse the buffer to avoid
    /// per-reply allocations.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            Frame::Simple(text) => {
                buf.push(marker::SIMPLE);
                buf.extend_from_slice(text.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Frame::Error(text) => {
                buf.push(marker::ERROR);
                buf.extend_from_slice(text.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Frame::Integer(n) => {
                buf.push(marker::INTEGER);
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Frame::Bulk(data) => {
                buf.push(marker::BULK);
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
            Frame::Null => {
                buf.extend_from_slice(b"$-1\r\n");
            }
            Frame::Array(items) => {
                buf.push(marker::ARRAY);
                buf.extend_from_slice(items.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                for item in items {
                    item.serialize_into(buf);
                }
            }
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Frame::Error(_))
    }

    /// The payload bytes of a bulk or simple string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Frame::Bulk(data) => Some(data),
            Frame::Simple(text) => Some(text.as_bytes()),
            _ => None,
        }
    }

    /// The payload of a bulk or simple string, when it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Frame::Simple(text) => Some(text),
            Frame::Bulk(data) => std::str::from_utf8(data).ok(),
            _ => None,
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Simple(text) => write!(f, "{text}"),
            Frame::Error(text) => write!(f, "(error) {text}"),
            Frame::Integer(n) => write!(f, "(integer) {n}"),
            Frame::Bulk(data) => match std::str::from_utf8(data) {
                Ok(text) => write!(f, "\"{text}\""),
                Err(_) => write!(f, "(binary, {} bytes)", data.len()),
            },
            Frame::Null => write!(f, "(nil)"),
            Frame::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}) {item}", i + 1)?;
                }
                Ok(())
            }
        }
    }
}
