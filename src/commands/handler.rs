//! Command Handler
//!
//! Maps a parsed command to store operations, decides the reply, and
//! appends successful mutations to the append-only log.
//!
//! ## Supported Commands
//!
//! | Command            | Reply on success     | Reply on failure | Logged          |
//! |--------------------|----------------------|------------------|-----------------|
//! | `PING [message]`   | `+PONG` / bulk echo  | -                | no              |
//! | `SET key value`    | `+OK`                | -                | yes             |
//! | `GET key`          | bulk string          | null bulk string | no              |
//! | `EXPIRE key secs`  | `:1`                 | `:0`             | only on success |
//! | `TTL key`          | `:<secs>` / `:-1`    | `:-2`            | no              |
//! | `DEL key [key ..]` | `:<deleted>`         | -                | yes             |
//!
//! Command names are matched exactly; `set` is an unknown command.

use crate::persistence::AppendOnlyLog;
use crate::protocol::RespValue;
use crate::storage::StorageEngine;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use tracing::{trace, warn};

/// Errors reported to the client as `-ERR` replies.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty command")]
    EmptyCommand,

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("wrong number of arguments for '{0}' command")]
    WrongArity(&'static str),

    /// Only raised by replay: the command does not change state
    #[error("command '{0}' is not replayable")]
    NotReplayable(&'static str),
}

impl From<CommandError> for RespValue {
    fn from(err: CommandError) -> Self {
        RespValue::error(err.to_string())
    }
}

/// Number of arguments a command takes, not counting its name.
#[derive(Debug, Clone, Copy)]
enum Arity {
    Exact(usize),
    Range(usize, usize),
    AtLeast(usize),
}

impl Arity {
    fn accepts(self, n: usize) -> bool {
        match self {
            Arity::Exact(want) => n == want,
            Arity::Range(min, max) => (min..=max).contains(&n),
            Arity::AtLeast(min) => n >= min,
        }
    }
}

/// Result of running one command against the store.
struct Outcome {
    reply: RespValue,
    /// The store was mutated and the command must be logged
    applied: bool,
}

impl Outcome {
    fn read(reply: RespValue) -> Self {
        Self {
            reply,
            applied: false,
        }
    }

    fn write(reply: RespValue, applied: bool) -> Self {
        Self { reply, applied }
    }
}

type Run = fn(&StorageEngine, &[Bytes]) -> Outcome;

/// One row of the dispatch table.
struct CommandSpec {
    name: &'static str,
    arity: Arity,
    mutates: bool,
    run: Run,
}

const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "PING",
        arity: Arity::Range(0, 1),
        mutates: false,
        run: cmd_ping,
    },
    CommandSpec {
        name: "SET",
        arity: Arity::Exact(2),
        mutates: true,
        run: cmd_set,
    },
    CommandSpec {
        name: "GET",
        arity: Arity::Exact(1),
        mutates: false,
        run: cmd_get,
    },
    CommandSpec {
        name: "EXPIRE",
        arity: Arity::Exact(2),
        mutates: true,
        run: cmd_expire,
    },
    CommandSpec {
        name: "TTL",
        arity: Arity::Exact(1),
        mutates: false,
        run: cmd_ttl,
    },
    CommandSpec {
        name: "DEL",
        arity: Arity::AtLeast(1),
        mutates: true,
        run: cmd_del,
    },
];

/// Executes commands against the storage engine.
///
/// Cheap to clone: each connection task gets its own copy sharing the same
/// engine and log.
#[derive(Clone)]
pub struct CommandHandler {
    storage: Arc<StorageEngine>,
    aof: Option<Arc<AppendOnlyLog>>,
}

impl CommandHandler {
    /// Creates a handler that does not log.
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self { storage, aof: None }
    }

    /// Creates a handler that appends successful mutations to `aof`.
    pub fn with_log(storage: Arc<StorageEngine>, aof: Arc<AppendOnlyLog>) -> Self {
        Self {
            storage,
            aof: Some(aof),
        }
    }

    /// The storage engine commands run against.
    pub fn storage(&self) -> &Arc<StorageEngine> {
        &self.storage
    }

    /// Executes a client command and returns the reply.
    ///
    /// A mutation is applied before it is logged; a failed append is only
    /// reported through tracing and never changes the reply.
    pub fn execute(&self, args: Vec<Bytes>) -> RespValue {
        let (spec, outcome) = match self.dispatch(&args) {
            Ok(result) => result,
            Err(e) => return e.into(),
        };

        if spec.mutates && outcome.applied {
            if let Some(aof) = &self.aof {
                if let Err(e) = aof.append(&args) {
                    warn!(command = spec.name, error = %e, "Failed to append command to log");
                }
            }
        }

        outcome.reply
    }

    /// Re-applies a logged command during startup replay.
    ///
    /// Never appends to the log. Returns whether the store was changed.
    pub fn replay(&self, args: &[Bytes]) -> Result<bool, CommandError> {
        let spec = lookup(args)?;
        if !spec.mutates {
            return Err(CommandError::NotReplayable(spec.name));
        }
        check_arity(spec, args)?;

        Ok((spec.run)(&self.storage, &args[1..]).applied)
    }

    fn dispatch(&self, args: &[Bytes]) -> Result<(&'static CommandSpec, Outcome), CommandError> {
        let spec = lookup(args)?;
        check_arity(spec, args)?;

        trace!(command = spec.name, argc = args.len() - 1, "Executing command");
        Ok((spec, (spec.run)(&self.storage, &args[1..])))
    }
}

fn lookup(args: &[Bytes]) -> Result<&'static CommandSpec, CommandError> {
    let name = args.first().ok_or(CommandError::EmptyCommand)?;

    COMMANDS
        .iter()
        .find(|spec| spec.name.as_bytes() == name.as_ref())
        .ok_or_else(|| CommandError::UnknownCommand(String::from_utf8_lossy(name).into_owned()))
}

fn check_arity(spec: &'static CommandSpec, args: &[Bytes]) -> Result<(), CommandError> {
    if spec.arity.accepts(args.len() - 1) {
        Ok(())
    } else {
        Err(CommandError::WrongArity(spec.name))
    }
}

// ============================================================================
// Commands
// ============================================================================

/// PING [message]
fn cmd_ping(_: &StorageEngine, args: &[Bytes]) -> Outcome {
    match args.first() {
        Some(msg) => Outcome::read(RespValue::bulk_string(msg.clone())),
        None => Outcome::read(RespValue::pong()),
    }
}

/// SET key value
fn cmd_set(storage: &StorageEngine, args: &[Bytes]) -> Outcome {
    storage.set(args[0].clone(), args[1].clone());
    Outcome::write(RespValue::ok(), true)
}

/// GET key
fn cmd_get(storage: &StorageEngine, args: &[Bytes]) -> Outcome {
    match storage.get(&args[0]) {
        Ok(value) => Outcome::read(RespValue::bulk_string(value)),
        Err(_) => Outcome::read(RespValue::null()),
    }
}

/// EXPIRE key seconds
fn cmd_expire(storage: &StorageEngine, args: &[Bytes]) -> Outcome {
    match storage.expire(&args[0], &args[1]) {
        Ok(()) => Outcome::write(RespValue::integer(1), true),
        Err(e) => {
            trace!(error = %e, "EXPIRE not applied");
            Outcome::write(RespValue::integer(0), false)
        }
    }
}

/// TTL key
fn cmd_ttl(storage: &StorageEngine, args: &[Bytes]) -> Outcome {
    match storage.ttl(&args[0]) {
        Ok(ttl) => Outcome::read(RespValue::integer(ttl)),
        Err(_) => Outcome::read(RespValue::integer(-2)),
    }
}

/// DEL key [key ...]
fn cmd_del(storage: &StorageEngine, args: &[Bytes]) -> Outcome {
    let deleted = storage.delete(args);
    Outcome::write(RespValue::integer(deleted as i64), true)
}
