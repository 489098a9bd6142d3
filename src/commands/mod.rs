//! Command Executor
//!
//! Receives parsed commands, applies them to the storage engine, picks the
//! reply, and appends successful mutations to the append-only log.
//!
//! ```text
//!  socket ──> RespParser ──┐
//!                          ├──> CommandHandler ──> StorageEngine
//!  log file ─> replay ─────┘          │
//!                                     └──> AppendOnlyLog (live path only)
//! ```
//!
//! Store failures never reach the client as errors: a missing or expired key
//! becomes a null bulk string, `:0` or `:-2` depending on the command.

pub mod handler;

pub use handler::{CommandError, CommandHandler};
