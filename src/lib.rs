//! # shardkv - A Sharded In-Memory Key-Value Cache
//!
//! shardkv speaks a subset of the Redis protocol, keeps keys in a fixed
//! number of independently locked shards, expires keys lazily, and makes
//! writes durable through an append-only command log replayed at startup.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                             shardkv                              │
//! │                                                                  │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐             │
//! │  │ TCP Server  │──>│ Connection  │──>│  Command    │──┐          │
//! │  │ (Listener)  │   │  Handler    │   │  Handler    │  │          │
//! │  └─────────────┘   └─────────────┘   └──────┬──────┘  │          │
//! │                                             │         ▼          │
//! │                                             │  ┌──────────────┐  │
//! │                                             │  │ AppendOnlyLog│  │
//! │                                             ▼  └──────┬───────┘  │
//! │  ┌────────────────────────────────────────────────┐   │ replay   │
//! │  │                 StorageEngine                  │<──┘ at start │
//! │  │  ┌────────┐ ┌────────┐ ┌────────┐ ┌────────┐   │              │
//! │  │  │Shard 0 │ │Shard 1 │ │Shard 2 │ │...N    │   │              │
//! │  │  │RwLock  │ │RwLock  │ │RwLock  │ │shards  │   │              │
//! │  │  └────────┘ └────────┘ └────────┘ └────────┘   │              │
//! │  └────────────────────────────────────────────────┘              │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use shardkv::commands::CommandHandler;
//! use shardkv::config::SyncPolicy;
//! use shardkv::connection::{handle_connection, ConnectionStats};
//! use shardkv::persistence::{replay_file, AppendOnlyLog};
//! use shardkv::storage::StorageEngine;
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let storage = Arc::new(StorageEngine::new());
//!
//!     // Rebuild state before accepting clients
//!     replay_file("appendonly.aof".as_ref(), &CommandHandler::new(Arc::clone(&storage)))?;
//!
//!     let aof = Arc::new(AppendOnlyLog::open("appendonly.aof", SyncPolicy::Never)?);
//!     let handler = CommandHandler::with_log(storage, aof);
//!     let stats = Arc::new(ConnectionStats::new());
//!
//!     let listener = TcpListener::bind("127.0.0.1:6379").await?;
//!     loop {
//!         let (stream, addr) = listener.accept().await?;
//!         tokio::spawn(handle_connection(stream, addr, handler.clone(), Arc::clone(&stats)));
//!     }
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `PING [message]`
//! - `SET key value`
//! - `GET key`
//! - `EXPIRE key seconds`
//! - `TTL key`
//! - `DEL key [key ...]`
//!
//! ## Module Overview
//!
//! - [`storage`]: Sharded, thread-safe map with lazy expiry
//! - [`protocol`]: Request parser and reply serialization
//! - [`persistence`]: Append-only log writer and startup replay
//! - [`commands`]: Dispatch, argument checks and reply selection
//! - [`connection`]: Per-client read / execute / reply loop
//! - [`config`]: Command-line and environment configuration
//!
//! ## Expiry
//!
//! There is no background sweep. An expired key stays in memory until a
//! `GET` observes it, at which point it is removed. `TTL` reports such a key
//! as missing without removing it.

pub mod commands;
pub mod config;
pub mod connection;
pub mod persistence;
pub mod protocol;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::{CommandError, CommandHandler};
pub use config::{Config, SyncPolicy};
pub use connection::{handle_connection, ConnectionStats};
pub use persistence::{replay_file, AppendOnlyLog, PersistenceError, ReplayStats};
pub use protocol::{ParseError, RespParser, RespValue};
pub use storage::{StorageEngine, StoreError, DEFAULT_SHARDS};

/// The default port shardkv listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host shardkv binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of shardkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
