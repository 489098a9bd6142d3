//! Per-connection read / execute / reply loop.
//!
//! Incoming bytes accumulate in a `BytesMut` buffer because the transport is
//! a stream: one read may carry half a command or several pipelined ones.
//! Every complete frame in the buffer is executed and answered, replies are
//! flushed, and only then is the socket read again.
//!
//! A frame that cannot be parsed ends the connection without a reply, since
//! the position of the next frame is unknown.

use crate::commands::CommandHandler;
use crate::protocol::parser::MAX_BULK_SIZE;
use crate::protocol::{Command, ParseError, RespParser, RespValue};
use bytes::{Buf, BytesMut};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, info, trace, warn};

/// Largest amount of unparsed data held for one client.
const MAX_BUFFER_SIZE: usize = MAX_BULK_SIZE + 64 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Counters shared by every connection task.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands executed
    pub commands_processed: AtomicU64,
    /// Connections closed because of a malformed frame
    pub protocol_errors: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    fn record_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    fn record_written(&self, count: usize) {
        self.bytes_written.fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed frame: {0}")]
    Protocol(#[from] ParseError),

    /// Peer closed the stream in the middle of a frame
    #[error("connection closed with {0} unparsed bytes")]
    UnexpectedEof(usize),

    #[error("read buffer limit exceeded ({0} bytes)")]
    BufferFull(usize),
}

/// Serves one client over any byte stream.
pub struct ConnectionHandler<S> {
    stream: BufWriter<S>,

    /// Peer address, used in log fields only
    addr: SocketAddr,

    buffer: BytesMut,
    parser: RespParser,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        stream: S,
        addr: SocketAddr,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            parser: RespParser::new(),
            command_handler,
            stats,
        }
    }

    /// Runs until the peer disconnects or the connection fails.
    ///
    /// A clean disconnect on a frame boundary returns `Ok(())`.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        debug!(client = %self.addr, "Client connected");

        let result = self.serve().await;

        match &result {
            Ok(()) => debug!(client = %self.addr, "Client disconnected"),
            Err(ConnectionError::Protocol(e)) => {
                self.stats.protocol_errors.fetch_add(1, Ordering::Relaxed);
                warn!(client = %self.addr, error = %e, "Closing connection on malformed frame");
            }
            Err(ConnectionError::Io(e)) if e.kind() == io::ErrorKind::ConnectionReset => {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => info!(client = %self.addr, error = %e, "Connection closed"),
        }

        self.stats.connection_closed();
        result
    }

    async fn serve(&mut self) -> Result<(), ConnectionError> {
        loop {
            // Replies to commands that parsed before a bad frame still go out.
            let drained = self.execute_buffered().await;
            self.stream.flush().await?;
            drained?;

            if !self.fill_buffer().await? {
                return Ok(());
            }
        }
    }

    /// Executes every complete command currently buffered.
    async fn execute_buffered(&mut self) -> Result<(), ConnectionError> {
        while let Some(command) = self.next_command()? {
            let response = self.command_handler.execute(command);
            self.stats.commands_processed.fetch_add(1, Ordering::Relaxed);
            self.write_response(&response).await?;
        }
        Ok(())
    }

    /// Takes the next complete command off the front of the buffer.
    fn next_command(&mut self) -> Result<Option<Command>, ConnectionError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        match self.parser.parse(&self.buffer)? {
            Some((command, consumed)) => {
                self.buffer.advance(consumed);
                trace!(
                    client = %self.addr,
                    consumed,
                    remaining = self.buffer.len(),
                    "Parsed command"
                );
                Ok(Some(command))
            }
            None => Ok(None),
        }
    }

    /// Reads more bytes. Returns `false` on a clean end of stream.
    async fn fill_buffer(&mut self) -> Result<bool, ConnectionError> {
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            return Err(ConnectionError::BufferFull(self.buffer.len()));
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;
        if n == 0 {
            if self.buffer.is_empty() {
                return Ok(false);
            }
            return Err(ConnectionError::UnexpectedEof(self.buffer.len()));
        }

        self.stats.record_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");
        Ok(true)
    }

    async fn write_response(&mut self, response: &RespValue) -> Result<(), ConnectionError> {
        let bytes = response.serialize();
        self.stream.write_all(&bytes).await?;
        self.stats.record_written(bytes.len());
        Ok(())
    }
}

/// Serves one accepted connection to completion.
///
/// Errors are already logged by the handler, so they are dropped here.
pub async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let _ = ConnectionHandler::new(stream, addr, command_handler, stats)
        .run()
        .await;
}
