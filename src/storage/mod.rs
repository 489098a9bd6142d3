//! Storage Engine Module
//!
//! This module provides the core storage functionality for shardkv:
//! a fixed number of independently locked shards, each mapping keys to
//! values with an optional expiry instant.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │...N     │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ shards  │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//!            shard = fnv1a_32(key) % N
//! ```
//!
//! ## Features
//!
//! - **Sharded Storage**: independent shards reduce lock contention
//! - **RwLock**: Multiple concurrent readers, exclusive writers
//! - **TTL Support**: Keys can be given a time-to-live with `expire`
//! - **Lazy Expiry**: Expired keys are removed when `get` observes them
//!
//! ## Example
//!
//! ```
//! use shardkv::storage::StorageEngine;
//! use bytes::Bytes;
//!
//! let engine = StorageEngine::with_shards(8);
//!
//! engine.set(Bytes::from("session"), Bytes::from("token123"));
//! engine.expire(&Bytes::from("session"), b"3600").unwrap();
//!
//! assert_eq!(engine.get(&Bytes::from("session")), Ok(Bytes::from("token123")));
//! ```

pub mod engine;

pub use engine::{fnv1a_32, Entry, StorageEngine, StorageStats, StoreError, DEFAULT_SHARDS};
