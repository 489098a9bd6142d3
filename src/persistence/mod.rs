//! Append-Only Persistence
//!
//! Durability for shardkv is a plain append-only file of commands in
//! request framing:
//!
//! ```text
//! *3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n*3\r\n$6\r\nEXPIRE\r\n$1\r\na\r\n$3\r\n100\r\n...
//! └──────────── record 1 ───────────────┘└──────────────── record 2 ──────────────────┘
//! ```
//!
//! - [`AppendOnlyLog`] appends one record per successfully applied mutation.
//!   Append failures are reported to the caller and never roll back the store.
//! - [`replay_file`] / [`replay_from`] rebuild a store at startup.
//!
//! Replay re-executes `EXPIRE key seconds` relative to the time of replay,
//! so expiry instants are only faithful when replay follows shortly after
//! the original commands.

pub mod log;
pub mod replay;

pub use log::{AppendOnlyLog, LogSink};
pub use replay::{replay_file, replay_from, ReplayStats};

use crate::protocol::ParseError;
use thiserror::Error;

/// Errors raised while writing or replaying the log.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// I/O error on the log file
    #[error("append-only log I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be parsed
    #[error("malformed log record at byte {offset}: {source}")]
    Malformed {
        offset: u64,
        #[source]
        source: ParseError,
    },

    /// The log ends in the middle of a record
    #[error("log truncated at byte {offset} ({trailing} bytes of partial record)")]
    Truncated { offset: u64, trailing: usize },
}
