//! Incremental RESP Request Parser
//!
//! Requests are always an array of bulk strings. The parser reads from a
//! buffer and returns either:
//! - `Ok(Some((args, consumed)))` - a complete command, `consumed` bytes were used
//! - `Ok(None)` - Need more data, the frame is incomplete
//! - `Err(ParseError)` - Malformed frame
//!
//! After `Ok(None)` the same [`RespParser`] must be handed the same buffer
//! again, only longer; it picks up at the first element it has not decoded.
//!
//! The same parser reads client sockets and the append-only log, so a log
//! file is nothing more than a sequence of request frames.
//!
//! There is no error recovery: after a `ParseError` the stream position is
//! unknown and the caller must stop reading from it.

use crate::protocol::types::{prefix, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur while parsing a request frame.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A frame or element started with the wrong type byte
    #[error("expected {expected:?} but found {found:#04x}")]
    UnexpectedPrefix { expected: char, found: u8 },

    /// A count or length line is not a decimal integer
    #[error("invalid integer: {0:?}")]
    InvalidInteger(String),

    /// Bulk string length is negative
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// Array length is negative
    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    /// Bulk payload not followed by CRLF
    #[error("bulk string missing trailing CRLF")]
    MissingCrlf,

    /// The frame exceeds maximum allowed size
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum number of elements accepted in one command.
pub const MAX_ARRAY_LEN: usize = 1024 * 1024;

/// A parsed command: the command name followed by its arguments.
pub type Command = Vec<Bytes>;

/// Upper bound on the argument vector reserved from a frame header alone.
const PREALLOC_ARGS: usize = 1024;

/// Parser for request frames.
///
/// The parser is resumable: when a frame is incomplete it keeps the elements
/// it already decoded and the offset where the next one starts. The caller
/// must pass the same buffer again, extended with new data and not advanced,
/// until a command is returned. Each element is therefore decoded once, no
/// matter how many reads a large frame arrives in.
///
/// # Example
///
/// ```
/// use shardkv::protocol::RespParser;
/// use bytes::Bytes;
///
/// let mut parser = RespParser::new();
/// let buf = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
///
/// assert_eq!(parser.parse(&buf[..12]).unwrap(), None);
/// let (args, consumed) = parser.parse(buf).unwrap().unwrap();
/// assert_eq!(args, vec![Bytes::from("GET"), Bytes::from("name")]);
/// assert_eq!(consumed, buf.len());
/// ```
#[derive(Debug, Default)]
pub struct RespParser {
    /// Commands parsed so far by this instance
    parsed: u64,

    /// Frame whose header has been read but whose elements are still arriving
    partial: Option<PartialFrame>,
}

#[derive(Debug)]
struct PartialFrame {
    /// Elements announced by the header
    count: usize,
    args: Command,
    /// Start of the next undecoded element, relative to the frame start
    offset: usize,
}

impl RespParser {
    /// Creates a new parser instance.
    pub fn new() -> Self {
        Self {
            parsed: 0,
            partial: None,
        }
    }

    /// Number of complete commands this parser has produced.
    pub fn parsed(&self) -> u64 {
        self.parsed
    }

    /// Attempts to parse one command from the front of `buf`.
    ///
    /// On error the partial frame is discarded.
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(Command, usize)>> {
        let mut frame = match self.partial.take() {
            Some(frame) => frame,
            None => match parse_header(buf)? {
                Some(frame) => frame,
                None => return Ok(None),
            },
        };

        while frame.args.len() < frame.count {
            let rest = buf.get(frame.offset..).unwrap_or_default();
            match parse_bulk_string(rest)? {
                Some((arg, used)) => {
                    frame.args.push(arg);
                    frame.offset += used;
                }
                None => {
                    self.partial = Some(frame);
                    return Ok(None);
                }
            }
        }

        self.parsed += 1;
        Ok(Some((frame.args, frame.offset)))
    }
}

/// Parses the array header: `*<count>\r\n`
fn parse_header(buf: &[u8]) -> ParseResult<Option<PartialFrame>> {
    let Some(&first) = buf.first() else {
        return Ok(None);
    };
    expect_prefix(prefix::ARRAY, first)?;

    let (count, offset) = match parse_length_line(&buf[1..])? {
        Some((count, used)) => (count, 1 + used),
        None => return Ok(None),
    };

    if count < 0 {
        return Err(ParseError::InvalidArrayLength(count));
    }
    let count = count as usize;
    if count > MAX_ARRAY_LEN {
        return Err(ParseError::MessageTooLarge {
            size: count,
            max: MAX_ARRAY_LEN,
        });
    }

    Ok(Some(PartialFrame {
        count,
        args: Vec::with_capacity(count.min(PREALLOC_ARGS)),
        offset,
    }))
}

/// Parses one bulk string element: `$<length>\r\n<data>\r\n`
fn parse_bulk_string(buf: &[u8]) -> ParseResult<Option<(Bytes, usize)>> {
    let Some(&first) = buf.first() else {
        return Ok(None);
    };
    expect_prefix(prefix::BULK_STRING, first)?;

    let (length, header) = match parse_length_line(&buf[1..])? {
        Some((length, used)) => (length, 1 + used),
        None => return Ok(None),
    };

    if length < 0 {
        return Err(ParseError::InvalidBulkLength(length));
    }
    let length = length as usize;
    if length > MAX_BULK_SIZE {
        return Err(ParseError::MessageTooLarge {
            size: length,
            max: MAX_BULK_SIZE,
        });
    }

    let total = header + length + CRLF.len();
    if buf.len() < total {
        return Ok(None);
    }
    if &buf[header + length..total] != CRLF {
        return Err(ParseError::MissingCrlf);
    }

    let data = Bytes::copy_from_slice(&buf[header..header + length]);
    Ok(Some((data, total)))
}

/// Parses a decimal line terminated by CRLF; returns the value and the bytes
/// used including the CRLF.
fn parse_length_line(buf: &[u8]) -> ParseResult<Option<(i64, usize)>> {
    let Some(pos) = find_crlf(buf) else {
        // A line longer than any valid length is not going to become valid.
        if buf.len() > 32 {
            return Err(ParseError::InvalidInteger(
                String::from_utf8_lossy(&buf[..32]).into_owned(),
            ));
        }
        return Ok(None);
    };

    let line = &buf[..pos];
    let value = std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| ParseError::InvalidInteger(String::from_utf8_lossy(line).into_owned()))?;

    Ok(Some((value, pos + CRLF.len())))
}

#[inline]
fn expect_prefix(expected: u8, found: u8) -> ParseResult<()> {
    if found == expected {
        Ok(())
    } else {
        Err(ParseError::UnexpectedPrefix {
            expected: char::from(expected),
            found,
        })
    }
}

/// Finds the position of CRLF in the buffer.
///
/// Returns the position of `\r` if found, or None if CRLF is not present.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

/// Helper function to parse a single command from bytes.
pub fn parse_message(buf: &[u8]) -> ParseResult<Option<(Command, usize)>> {
    RespParser::new().parse(buf)
}
