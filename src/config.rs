//! Configuration for shardkv
//!
//! Every option can be given on the command line or through a `SHARDKV_*`
//! environment variable, with the command line taking precedence.

use crate::storage::DEFAULT_SHARDS;
use crate::{DEFAULT_HOST, DEFAULT_PORT};
use clap::builder::TypedValueParser;
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};

/// Default location of the append-only log.
pub const DEFAULT_AOF_PATH: &str = "appendonly.aof";

/// When the append-only log is forced to stable storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum SyncPolicy {
    /// fsync after every appended command (safest, slowest)
    Always,

    /// Never fsync explicitly; the OS decides when data reaches disk
    #[default]
    #[value(name = "no")]
    Never,
}

/// Server configuration
#[derive(Parser, Debug, Clone)]
#[command(name = "shardkv")]
#[command(about = "Sharded in-memory key-value cache with an append-only log")]
#[command(version)]
pub struct Config {
    /// Host to bind to
    #[arg(short = 'H', long, env = "SHARDKV_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "SHARDKV_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Number of storage shards
    #[arg(short, long, env = "SHARDKV_SHARDS", default_value_t = DEFAULT_SHARDS,
          value_parser = clap::value_parser!(u16).range(1..).map(usize::from))]
    pub shards: usize,

    /// Path of the append-only log
    #[arg(long, env = "SHARDKV_AOF_PATH", default_value = DEFAULT_AOF_PATH)]
    pub aof_path: PathBuf,

    /// Disable the append-only log (no replay, no logging)
    #[arg(long, env = "SHARDKV_NO_AOF")]
    pub no_aof: bool,

    /// When to fsync the append-only log
    #[arg(long, env = "SHARDKV_FSYNC", value_enum, default_value_t = SyncPolicy::Never)]
    pub fsync: SyncPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            shards: DEFAULT_SHARDS,
            aof_path: PathBuf::from(DEFAULT_AOF_PATH),
            no_aof: false,
            fsync: SyncPolicy::Never,
        }
    }
}

impl Config {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Path of the append-only log, or None when persistence is disabled.
    pub fn aof(&self) -> Option<&Path> {
        (!self.no_aof).then_some(self.aof_path.as_path())
    }
}
