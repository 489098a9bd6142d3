//! Thread-Safe Sharded Storage Engine
//!
//! This module implements the core storage engine for shardkv.
//! It provides a fixed set of independently locked partitions ("shards"),
//! each holding a `key -> Entry` map with optional expiry.
//!
//! ## Design Decisions
//!
//! 1. **Fixed Sharding**: The shard count is chosen at construction and never changes.
//! 2. **Deterministic Placement**: A key lives in shard `fnv1a_32(key) % N`, with no
//!    per-process salt, so the same key always lands in the same shard for a given N.
//! 3. **Lazy Expiry**: Stale entries are only removed when `get` observes them.
//!    There is no background sweep.
//! 4. **RwLock per Shard**: Many concurrent readers, exclusive writers, and no lock
//!    is ever held while another shard's lock is acquired.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌───────────────────────────────────────────────────┐
//! │                  StorageEngine                    │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐  │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │  │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │  │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │  │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘  │
//! └───────────────────────────────────────────────────┘
//! ```
//!
//! Operations on keys in the same shard are serialized by that shard's lock;
//! operations on different shards run fully in parallel.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Default number of shards.
pub const DEFAULT_SHARDS: usize = 5;

const FNV_OFFSET_BASIS: u32 = 2_166_136_261;
const FNV_PRIME: u32 = 16_777_619;

/// Errors returned by store operations.
///
/// None of these ever reach the client as-is: the command layer turns them
/// into ordinary replies (null bulk strings or integer sentinels).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The key is not present in its shard
    #[error("key does not exist")]
    KeyNotFound,

    /// The key is present but its expiry instant has passed
    #[error("key is expired")]
    KeyExpired,

    /// The seconds argument of EXPIRE is not a usable integer
    #[error("invalid expire time: {0}")]
    InvalidTtl(String),
}

/// Represents a stored value with optional expiry time.
///
/// Entries are replaced wholesale on every mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The actual value stored
    pub value: Bytes,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<Instant>,
}

impl Entry {
    /// Creates a new entry without expiry.
    pub fn new(value: Bytes) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    /// Creates a copy of an entry that expires at `at`.
    pub fn expiring(value: Bytes, at: Instant) -> Self {
        Self {
            value,
            expires_at: Some(at),
        }
    }

    /// Checks if this entry has expired as of `now`.
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.map(|exp| now >= exp).unwrap_or(false)
    }
}

/// A single shard containing a portion of the key space.
#[derive(Debug, Default)]
struct Shard {
    data: RwLock<HashMap<Bytes, Entry>>,
}

impl Shard {
    // A panicking writer never leaves a map half-updated (every mutation is a
    // single insert or remove), so a poisoned lock is still safe to use.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<Bytes, Entry>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Bytes, Entry>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Point-in-time copy of the engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub keys: u64,
    pub gets: u64,
    pub sets: u64,
    pub deletes: u64,
    pub expired: u64,
}

/// The sharded storage engine.
///
/// Designed to be wrapped in an `Arc` and shared by every connection task
/// and by the startup replayer. All operations are thread-safe.
///
/// # Example
///
/// ```
/// use shardkv::storage::{StorageEngine, StoreError};
/// use bytes::Bytes;
///
/// let engine = StorageEngine::new();
/// let key = Bytes::from("name");
///
/// engine.set(key.clone(), Bytes::from("alice"));
/// assert_eq!(engine.get(&key), Ok(Bytes::from("alice")));
/// assert_eq!(engine.ttl(&key), Ok(-1));
///
/// engine.expire(&key, b"60").unwrap();
/// assert!(engine.ttl(&key).unwrap() <= 60);
///
/// assert_eq!(engine.delete(&[key.clone()]), 1);
/// assert_eq!(engine.get(&key), Err(StoreError::KeyNotFound));
/// ```
pub struct StorageEngine {
    shards: Vec<Shard>,

    get_count: AtomicU64,
    set_count: AtomicU64,
    del_count: AtomicU64,
    expired_count: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("shards", &self.shards.len())
            .field("keys", &self.len())
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// 32-bit FNV-1a over the raw key bytes.
#[inline]
pub fn fnv1a_32(data: &[u8]) -> u32 {
    data.iter().fold(FNV_OFFSET_BASIS, |hash, &byte| {
        (hash ^ u32::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

impl StorageEngine {
    /// Creates a new storage engine with [`DEFAULT_SHARDS`] shards.
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    /// Creates a storage engine with `num_shards` shards (at least one).
    pub fn with_shards(num_shards: usize) -> Self {
        let shards = (0..num_shards.max(1)).map(|_| Shard::default()).collect();

        Self {
            shards,
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            del_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        }
    }

    /// Number of shards, fixed for the lifetime of the engine.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Determines which shard a key belongs to.
    #[inline]
    pub fn shard_index(&self, key: &[u8]) -> usize {
        fnv1a_32(key) as usize % self.shards.len()
    }

    #[inline]
    fn get_shard(&self, key: &[u8]) -> &Shard {
        &self.shards[self.shard_index(key)]
    }

    /// Sets a key-value pair, clearing any previous expiry.
    pub fn set(&self, key: Bytes, value: Bytes) {
        self.set_count.fetch_add(1, Ordering::Relaxed);

        let shard = self.get_shard(&key);
        shard.write().insert(key, Entry::new(value));
    }

    /// Gets the value for a key.
    ///
    /// An entry found to be stale is removed before `KeyExpired` is returned.
    /// The read lock is released before the write lock is taken, so two readers
    /// may both find the same stale entry; the removal is re-checked under the
    /// write lock and removing an absent key is a no-op.
    pub fn get(&self, key: &Bytes) -> Result<Bytes, StoreError> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        let shard = self.get_shard(key);

        {
            let data = shard.read();
            match data.get(key) {
                None => return Err(StoreError::KeyNotFound),
                Some(entry) if !entry.is_expired_at(Instant::now()) => {
                    return Ok(entry.value.clone());
                }
                Some(_) => {}
            }
        }

        let mut data = shard.write();
        match data.get(key) {
            Some(entry) if entry.is_expired_at(Instant::now()) => {
                data.remove(key);
                self.expired_count.fetch_add(1, Ordering::Relaxed);
                Err(StoreError::KeyExpired)
            }
            // Another writer replaced the entry between the two locks.
            Some(entry) => Ok(entry.value.clone()),
            None => Err(StoreError::KeyExpired),
        }
    }

    /// Sets an expiry on an existing key, `seconds` from now.
    ///
    /// `seconds` is the raw command argument. A missing key is reported before
    /// the argument is parsed. Negative values produce an entry that is already
    /// stale.
    pub fn expire(&self, key: &Bytes, seconds: &[u8]) -> Result<(), StoreError> {
        let shard = self.get_shard(key);
        let mut data = shard.write();

        let entry = data.get_mut(key).ok_or(StoreError::KeyNotFound)?;
        let seconds = parse_seconds(seconds)?;
        let at = deadline_from_now(seconds)
            .ok_or_else(|| StoreError::InvalidTtl(seconds.to_string()))?;

        *entry = Entry::expiring(entry.value.clone(), at);
        Ok(())
    }

    /// Gets the remaining time to live of a key in whole seconds.
    ///
    /// Returns `-1` for a key without expiry. The fractional part of the
    /// remaining time is truncated, so a key expiring in 9.7s reports `9`.
    /// Stale entries are reported as `KeyExpired` but left in place.
    pub fn ttl(&self, key: &Bytes) -> Result<i64, StoreError> {
        let shard = self.get_shard(key);
        let data = shard.read();

        let entry = data.get(key).ok_or(StoreError::KeyNotFound)?;
        let Some(expires_at) = entry.expires_at else {
            return Ok(-1);
        };

        let now = Instant::now();
        if now >= expires_at {
            return Err(StoreError::KeyExpired);
        }
        Ok((expires_at - now).as_secs() as i64)
    }

    /// Deletes keys and returns how many were present.
    ///
    /// Keys are first bucketed by shard without holding any lock, then each
    /// shard is locked at most once for all of its keys. Only one shard lock
    /// is held at a time. The batch is not atomic across shards.
    pub fn delete(&self, keys: &[Bytes]) -> u64 {
        let mut buckets: Vec<Vec<&Bytes>> = vec![Vec::new(); self.shards.len()];
        for key in keys {
            buckets[self.shard_index(key)].push(key);
        }

        let mut deleted = 0;
        for (shard, bucket) in self.shards.iter().zip(buckets) {
            if bucket.is_empty() {
                continue;
            }

            let mut data = shard.write();
            for key in bucket {
                if data.remove(key).is_some() {
                    deleted += 1;
                }
            }
        }

        self.del_count.fetch_add(deleted, Ordering::Relaxed);
        deleted
    }

    /// Returns the number of stored entries, including stale ones not yet observed.
    pub fn len(&self) -> u64 {
        self.shards.iter().map(|s| s.read().len() as u64).sum()
    }

    /// Returns true if no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.read().is_empty())
    }

    /// Returns a snapshot of the engine counters.
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.len(),
            gets: self.get_count.load(Ordering::Relaxed),
            sets: self.set_count.load(Ordering::Relaxed),
            deletes: self.del_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }
}

fn parse_seconds(raw: &[u8]) -> Result<i64, StoreError> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| StoreError::InvalidTtl(String::from_utf8_lossy(raw).into_owned()))
}

fn deadline_from_now(seconds: i64) -> Option<Instant> {
    let now = Instant::now();
    let offset = Duration::from_secs(seconds.unsigned_abs());
    if seconds >= 0 {
        now.checked_add(offset)
    } else {
        // Far-past deadlines clamp to now: the entry is stale either way.
        Some(now.checked_sub(offset).unwrap_or(now))
    }
}
