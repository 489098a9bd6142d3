//! End-to-end tests: real sockets, a real log file, and restarts.

use bytes::Bytes;
use shardkv::commands::CommandHandler;
use shardkv::config::SyncPolicy;
use shardkv::connection::{handle_connection, ConnectionStats};
use shardkv::persistence::{replay_file, AppendOnlyLog, PersistenceError};
use shardkv::protocol::serialize_command;
use shardkv::storage::StorageEngine;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

struct TestServer {
    addr: SocketAddr,
    storage: Arc<StorageEngine>,
    aof: Arc<AppendOnlyLog>,
    task: JoinHandle<()>,
}

impl TestServer {
    /// Replays `path`, then serves clients with logging to the same file.
    async fn start(path: &Path, shards: usize) -> Self {
        let storage = Arc::new(StorageEngine::with_shards(shards));
        replay_file(path, &CommandHandler::new(Arc::clone(&storage))).unwrap();

        let aof = Arc::new(AppendOnlyLog::open(path, SyncPolicy::Always).unwrap());
        let handler = CommandHandler::with_log(Arc::clone(&storage), Arc::clone(&aof));
        let stats = Arc::new(ConnectionStats::new());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            while let Ok((stream, client)) = listener.accept().await {
                tokio::spawn(handle_connection(
                    stream,
                    client,
                    handler.clone(),
                    Arc::clone(&stats),
                ));
            }
        });

        Self {
            addr,
            storage,
            aof,
            task,
        }
    }

    async fn client(&self) -> Client {
        Client(TcpStream::connect(self.addr).await.unwrap())
    }

    fn stop(self) {
        self.aof.sync().unwrap();
        self.task.abort();
    }
}

struct Client(TcpStream);

impl Client {
    async fn send(&mut self, args: &[&str]) {
        let args: Vec<Bytes> = args.iter().map(|s| Bytes::from(s.to_string())).collect();
        self.0.write_all(&serialize_command(&args)).await.unwrap();
    }

    /// Reads one reply line, including the CRLF.
    async fn read_line(&mut self) -> Vec<u8> {
        let mut line = Vec::new();
        let read = async {
            while !line.ends_with(b"\r\n") {
                line.push(self.0.read_u8().await.unwrap());
            }
        };
        tokio::time::timeout(Duration::from_secs(2), read)
            .await
            .unwrap();
        line
    }

    /// Reads one reply; bulk strings are returned with their payload.
    async fn read_reply(&mut self) -> Vec<u8> {
        let mut reply = self.read_line().await;
        if reply[0] == b'$' && reply != b"$-1\r\n" {
            let len: usize = std::str::from_utf8(&reply[1..reply.len() - 2])
                .unwrap()
                .parse()
                .unwrap();
            let mut payload = vec![0u8; len + 2];
            self.0.read_exact(&mut payload).await.unwrap();
            reply.extend_from_slice(&payload);
        }
        reply
    }

    async fn call(&mut self, args: &[&str]) -> Vec<u8> {
        self.send(args).await;
        self.read_reply().await
    }
}

#[tokio::test]
async fn test_wire_scenarios() {
    let dir = TempDir::new().unwrap();
    let server = TestServer::start(&dir.path().join("appendonly.aof"), 5).await;
    let mut client = server.client().await;

    assert_eq!(client.call(&["PING"]).await, b"+PONG\r\n");
    assert_eq!(client.call(&["SET", "foo", "bar"]).await, b"+OK\r\n");
    assert_eq!(client.call(&["GET", "foo"]).await, b"$3\r\nbar\r\n");
    assert_eq!(client.call(&["TTL", "foo"]).await, b":-1\r\n");

    assert_eq!(client.call(&["EXPIRE", "foo", "10"]).await, b":1\r\n");
    let ttl = client.call(&["TTL", "foo"]).await;
    assert!(ttl == b":10\r\n" || ttl == b":9\r\n", "{:?}", ttl);

    assert_eq!(client.call(&["GET", "missingkey"]).await, b"$-1\r\n");
    assert_eq!(client.call(&["TTL", "missingkey"]).await, b":-2\r\n");

    assert_eq!(client.call(&["DEL", "foo", "bar"]).await, b":1\r\n");
    assert_eq!(client.call(&["EXPIRE", "missingkey", "5"]).await, b":0\r\n");

    assert_eq!(
        client.call(&["GETSET", "foo", "x"]).await,
        b"-ERR unknown command 'GETSET'\r\n"
    );
    assert_eq!(
        client.call(&["GET"]).await,
        b"-ERR wrong number of arguments for 'GET' command\r\n"
    );
    // The connection survives error replies
    assert_eq!(client.call(&["PING", "still here"]).await, b"$10\r\nstill here\r\n");

    server.stop();
}

#[tokio::test]
async fn test_restart_restores_state() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("appendonly.aof");

    let server = TestServer::start(&path, 5).await;
    let mut client = server.client().await;
    client.call(&["SET", "user:1", "alice"]).await;
    client.call(&["SET", "user:2", "bob"]).await;
    client.call(&["SET", "session", "abc"]).await;
    client.call(&["EXPIRE", "session", "3600"]).await;
    client.call(&["SET", "user:1", "carol"]).await;
    client.call(&["DEL", "user:2", "nobody"]).await;
    client.call(&["GET", "user:1"]).await;
    server.stop();

    // A different shard count must not matter: the log holds commands, not shards
    let server = TestServer::start(&path, 16).await;
    let mut client = server.client().await;

    assert_eq!(client.call(&["GET", "user:1"]).await, b"$5\r\ncarol\r\n");
    assert_eq!(client.call(&["GET", "user:2"]).await, b"$-1\r\n");
    let ttl = client.call(&["TTL", "session"]).await;
    assert!(ttl == b":3600\r\n" || ttl == b":3599\r\n", "{:?}", ttl);
    assert_eq!(server.storage.len(), 2);

    server.stop();
}

#[tokio::test]
async fn test_restart_does_not_duplicate_log() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("appendonly.aof");

    let server = TestServer::start(&path, 5).await;
    let mut client = server.client().await;
    client.call(&["SET", "a", "1"]).await;
    client.call(&["EXPIRE", "a", "100"]).await;
    client.call(&["DEL", "a"]).await;
    server.stop();

    let before = std::fs::read(&path).unwrap();
    let server = TestServer::start(&path, 5).await;
    assert!(server.storage.is_empty());
    server.stop();

    assert_eq!(std::fs::read(&path).unwrap(), before);
}

#[tokio::test]
async fn test_concurrent_clients_log_every_write() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("appendonly.aof");

    let server = TestServer::start(&path, 5).await;
    let mut tasks = Vec::new();
    for t in 0..8 {
        let mut client = server.client().await;
        tasks.push(tokio::spawn(async move {
            for i in 0..25 {
                let key = format!("key:{}:{}", t, i);
                assert_eq!(client.call(&["SET", &key, "v"]).await, b"+OK\r\n");
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(server.aof.appended(), 200);
    server.stop();

    let restored = Arc::new(StorageEngine::new());
    let stats = replay_file(&path, &CommandHandler::new(Arc::clone(&restored))).unwrap();
    assert_eq!(stats.commands, 200);
    assert_eq!(restored.len(), 200);
}

#[test]
fn test_corrupt_log_aborts_replay() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("appendonly.aof");
    std::fs::write(&path, b"*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n*2\r\n$3\r\nDEL").unwrap();

    let storage = Arc::new(StorageEngine::new());
    let err = replay_file(&path, &CommandHandler::new(storage)).unwrap_err();

    assert!(matches!(err, PersistenceError::Truncated { .. }));
}
