//! Client Connections
//!
//! Every accepted socket is served by its own tokio task running a
//! [`ConnectionHandler`]. Connections share nothing but the command handler's
//! storage engine and append-only log, plus the [`ConnectionStats`] counters.
//!
//! ```text
//!  TcpListener (main.rs)
//!        │ accept()
//!        ▼
//!  tokio::spawn ──> ConnectionHandler
//!                     read ─> parse ─> execute ─> reply
//!                       ▲                           │
//!                       └───────────────────────────┘
//! ```
//!
//! The handler is generic over the byte stream so it can be driven by mock
//! I/O in tests.
//!
//! ## Example
//!
//! ```ignore
//! use shardkv::commands::CommandHandler;
//! use shardkv::connection::{handle_connection, ConnectionStats};
//! use shardkv::storage::StorageEngine;
//! use std::sync::Arc;
//!
//! let handler = CommandHandler::new(Arc::new(StorageEngine::new()));
//! let stats = Arc::new(ConnectionStats::new());
//!
//! let (stream, addr) = listener.accept().await?;
//! tokio::spawn(handle_connection(stream, addr, handler.clone(), stats));
//! ```

pub mod handler;

pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionStats};
