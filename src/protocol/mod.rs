//! RESP Protocol Implementation
//!
//! This module implements the subset of the Redis Serialization Protocol
//! (RESP) that shardkv speaks.
//!
//! ## Overview
//!
//! Requests are arrays of bulk strings. Replies are one of status, error,
//! integer, bulk string or null bulk string. The append-only log stores
//! commands in request framing, so the request parser doubles as the log reader.
//!
//! ## Modules
//!
//! - `types`: Defines the `RespValue` reply enum, its serialization, and
//!   `serialize_command` for re-encoding requests
//! - `parser`: Incremental parser for request frames
//!
//! ## Example
//!
//! ```
//! use shardkv::protocol::{parse_message, serialize_command, RespValue};
//! use bytes::Bytes;
//!
//! // Parsing incoming data
//! let data = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
//! let (args, consumed) = parse_message(data).unwrap().unwrap();
//! assert_eq!(consumed, data.len());
//! assert_eq!(serialize_command(&args), data.to_vec());
//!
//! // Creating responses
//! let response = RespValue::bulk_string(Bytes::from("alice"));
//! assert_eq!(response.serialize(), b"$5\r\nalice\r\n");
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{parse_message, Command, ParseError, ParseResult, RespParser};
pub use types::{serialize_command, RespValue};
