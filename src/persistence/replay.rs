//! Startup Replay
//!
//! Rebuilds the store by feeding every logged command back through the
//! command handler, in file order, with logging disabled.
//!
//! The log has no header, index or checksum. A file that ends exactly on a
//! record boundary replays cleanly; anything else is a fatal error.

use crate::commands::CommandHandler;
use crate::persistence::PersistenceError;
use crate::protocol::RespParser;
use bytes::{Buf, BytesMut};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use tracing::{debug, warn};

/// Size of each read from the log.
const READ_CHUNK: usize = 64 * 1024;

/// Summary of a completed replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Commands handed to the store
    pub commands: u64,
    /// Records that could not be replayed (unknown or read-only commands)
    pub skipped: u64,
    /// Bytes consumed from the log
    pub bytes: u64,
}

/// Replays the log at `path`. A missing file is treated as an empty log.
pub fn replay_file(path: &Path, handler: &CommandHandler) -> Result<ReplayStats, PersistenceError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No append-only log to replay");
            return Ok(ReplayStats::default());
        }
        Err(e) => return Err(e.into()),
    };

    replay_from(file, handler)
}

/// Replays every record from `reader`, which must be positioned at the start
/// of the log.
///
/// Reads are already chunked, so `reader` does not need its own buffering.
pub fn replay_from<R: Read>(
    mut reader: R,
    handler: &CommandHandler,
) -> Result<ReplayStats, PersistenceError> {
    let mut parser = RespParser::new();
    let mut buffer = BytesMut::with_capacity(READ_CHUNK);
    let mut chunk = vec![0u8; READ_CHUNK];
    let mut stats = ReplayStats::default();

    loop {
        while let Some((args, consumed)) = parser
            .parse(&buffer)
            .map_err(|source| PersistenceError::Malformed {
                offset: stats.bytes,
                source,
            })?
        {
            buffer.advance(consumed);
            stats.bytes += consumed as u64;

            match handler.replay(&args) {
                Ok(_) => stats.commands += 1,
                Err(e) => {
                    warn!(offset = stats.bytes, error = %e, "Skipping log record");
                    stats.skipped += 1;
                }
            }
        }

        let n = match reader.read(&mut chunk) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };

        if n == 0 {
            if buffer.is_empty() {
                return Ok(stats);
            }
            return Err(PersistenceError::Truncated {
                offset: stats.bytes,
                trailing: buffer.len(),
            });
        }

        buffer.extend_from_slice(&chunk[..n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::serialize_command;
    use crate::storage::{StorageEngine, StoreError};
    use bytes::Bytes;
    use std::sync::Arc;

    fn args(items: &[&str]) -> Vec<Bytes> {
        items.iter().map(|s| Bytes::from(s.to_string())).collect()
    }

    fn encode(commands: &[&[&str]]) -> Vec<u8> {
        commands
            .iter()
            .flat_map(|c| serialize_command(&args(c)))
            .collect()
    }

    fn handler() -> CommandHandler {
        CommandHandler::new(Arc::new(StorageEngine::new()))
    }

    /// Hands out one byte per read to exercise records split across reads.
    struct Trickle<'a>(&'a [u8]);

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.0.is_empty() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.0[0];
            self.0 = &self.0[1..];
            Ok(1)
        }
    }

    #[test]
    fn test_replay_empty_log() {
        let handler = handler();
        let stats = replay_from(&b""[..], &handler).unwrap();
        assert_eq!(stats, ReplayStats::default());
        assert!(handler.storage().is_empty());
    }

    #[test]
    fn test_replay_set_expire_del_leaves_empty_store() {
        let log = encode(&[&["SET", "a", "1"], &["EXPIRE", "a", "100"], &["DEL", "a"]]);
        let handler = handler();

        let stats = replay_from(&log[..], &handler).unwrap();

        assert_eq!(stats.commands, 3);
        assert_eq!(stats.bytes, log.len() as u64);
        assert!(handler.storage().is_empty());
    }

    #[test]
    fn test_replay_rebuilds_values_and_expiry() {
        let log = encode(&[
            &["SET", "a", "1"],
            &["SET", "b", "2"],
            &["EXPIRE", "b", "100"],
            &["SET", "a", "3"],
        ]);
        let handler = handler();
        replay_from(Trickle(&log), &handler).unwrap();

        let storage = handler.storage();
        assert_eq!(storage.get(&Bytes::from("a")), Ok(Bytes::from("3")));
        assert_eq!(storage.ttl(&Bytes::from("a")), Ok(-1));
        let ttl = storage.ttl(&Bytes::from("b")).unwrap();
        assert!((99..=100).contains(&ttl));
    }

    #[test]
    fn test_replay_does_not_relog() {
        let buffer: Vec<u8> = Vec::new();
        let aof = Arc::new(crate::persistence::AppendOnlyLog::from_sink(
            buffer,
            crate::config::SyncPolicy::Never,
        ));
        let handler = CommandHandler::with_log(Arc::new(StorageEngine::new()), Arc::clone(&aof));

        let log = encode(&[&["SET", "a", "1"], &["DEL", "a", "b"]]);
        replay_from(&log[..], &handler).unwrap();

        assert_eq!(aof.appended(), 0);
    }

    #[test]
    fn test_replay_skips_unknown_and_read_only_records() {
        let log = encode(&[&["SET", "a", "1"], &["GET", "a"], &["FLUSHALL"], &["PING"]]);
        let handler = handler();

        let stats = replay_from(&log[..], &handler).unwrap();

        assert_eq!(stats.commands, 1);
        assert_eq!(stats.skipped, 3);
        assert_eq!(handler.storage().get(&Bytes::from("a")), Ok(Bytes::from("1")));
    }

    #[test]
    fn test_replay_truncated_record_is_fatal() {
        let mut log = encode(&[&["SET", "a", "1"]]);
        let complete = log.len() as u64;
        log.extend_from_slice(b"*2\r\n$3\r\nDEL\r\n$1\r");

        let handler = handler();
        let err = replay_from(&log[..], &handler).unwrap_err();

        assert!(matches!(
            err,
            PersistenceError::Truncated { offset, trailing: 16 } if offset == complete
        ));
        // Records before the damage were applied
        assert_eq!(handler.storage().get(&Bytes::from("a")), Ok(Bytes::from("1")));
    }

    #[test]
    fn test_replay_garbage_is_fatal() {
        let mut log = encode(&[&["SET", "a", "1"]]);
        log.extend_from_slice(b"hello\r\n");

        let err = replay_from(&log[..], &handler()).unwrap_err();
        assert!(matches!(err, PersistenceError::Malformed { .. }));
    }

    #[test]
    fn test_replay_expired_entries_stay_stale() {
        let log = encode(&[&["SET", "a", "1"], &["EXPIRE", "a", "-1"]]);
        let handler = handler();
        replay_from(&log[..], &handler).unwrap();

        assert_eq!(
            handler.storage().get(&Bytes::from("a")),
            Err(StoreError::KeyExpired)
        );
    }

    #[test]
    fn test_replay_large_record() {
        let mut del = vec![Bytes::from("DEL")];
        del.extend((0..200_000).map(|i| Bytes::from(format!("key:{}", i))));
        let mut log = serialize_command(&args(&["SET", "key:7", "v"]));
        log.extend_from_slice(&serialize_command(&del));

        let handler = handler();
        let started = std::time::Instant::now();
        let stats = replay_from(&log[..], &handler).unwrap();

        assert!(
            started.elapsed() < std::time::Duration::from_secs(10),
            "took {:?}",
            started.elapsed()
        );
        assert_eq!(stats.commands, 2);
        assert_eq!(stats.bytes, log.len() as u64);
        assert!(handler.storage().is_empty());
    }

    #[test]
    fn test_replay_file_reads_log_from_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("appendonly.aof");
        std::fs::write(&path, encode(&[&["SET", "a", "1"], &["SET", "b", "2"]])).unwrap();

        let handler = handler();
        let stats = replay_file(&path, &handler).unwrap();

        assert_eq!(stats.commands, 2);
        assert_eq!(handler.storage().len(), 2);
    }

    #[test]
    fn test_replay_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let stats = replay_file(&dir.path().join("absent.aof"), &handler()).unwrap();
        assert_eq!(stats, ReplayStats::default());
    }
}
