//! Client Connection Handling
//!
//! One task per connected client, each running the same loop: accumulate
//! bytes, decode a frame, execute it, write the reply. TCP is a byte
//! stream with no message boundaries, so the read buffer may hold half a
//! command or several at once; the incremental parser deals with both,
//! which also gives pipelining for free.
//!
//! A malformed protocol stream is answered with an error frame and the
//! connection is closed — there is no way to know where the next command
//! would start. Command-level mistakes (bad arity, unparsable numbers)
//! never reach this layer as errors; the dispatcher answers them inline
//! and the connection stays open.

use crate::commands::CommandHandler;
use crate::protocol::{parse_frame, Frame, ParseError};
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

/// Hard cap on buffered input per connection (64 KB).
const MAX_BUFFER_SIZE: usize = 64 * 1024;

/// Initial read buffer capacity.
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Server-wide connection counters, shared across all handler tasks.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    pub connections_accepted: AtomicU64,
    pub active_connections: AtomicU64,
    pub commands_processed: AtomicU64,
    pub bytes_read: AtomicU64,
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn add_bytes_written(&self, count: usize) {
        self.bytes_written.fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Parse(#[from] ParseError),

    #[error("client disconnected")]
    Disconnected,

    /// The stream ended in the middle of a command.
    #[error("unexpected end of stream")]
    UnexpectedEof,

    /// A single command overflowed the input buffer cap.
    #[error("input buffer limit exceeded")]
    BufferFull,
}

/// State for one connected client.
pub struct ConnectionHandler {
    stream: BufWriter<TcpStream>,
    addr: SocketAddr,
    buffer: BytesMut,
    commands: CommandHandler,
    stats: Arc<ConnectionStats>,
    /// Reply encoding buffer, reused between commands.
    reply_buf: Vec<u8>,
}

impl ConnectionHandler {
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        commands: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();
        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            commands,
            stats,
            reply_buf: Vec::new(),
        }
    }

    /// Serves this client until it disconnects or errors out.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "client connected");

        let result = self.serve().await;

        match &result {
            Ok(()) | Err(ConnectionError::Disconnected) => {
                debug!(client = %self.addr, "client disconnected");
            }
            Err(ConnectionError::Io(err))
                if err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "connection reset by client");
            }
            Err(err) => warn!(client = %self.addr, error = %err, "connection error"),
        }

        self.stats.connection_closed();
        result
    }

    async fn serve(&mut self) -> Result<(), ConnectionError> {
        loop {
            loop {
                let request = match self.next_request() {
                    Ok(Some(request)) => request,
                    Ok(None) => break,
                    Err(parse_err) => {
                        // The stream position is unrecoverable after a
                        // protocol error; tell the client, then close.
                        let reply = Frame::error(format!("ERR {parse_err}"));
                        self.send_reply(&reply).await?;
                        return Err(parse_err.into());
                    }
                };

                let reply = self.commands.execute(request);
                self.stats.command_processed();
                self.send_reply(&reply).await?;
            }

            self.fill_buffer().await?;
        }
    }

    /// Decodes the next complete request out of the buffer, if any.
    fn next_request(&mut self) -> Result<Option<Frame>, ParseError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        match parse_frame(&self.buffer)? {
            Some((frame, consumed)) => {
                let _ = self.buffer.split_to(consumed);
                trace!(
                    client = %self.addr,
                    consumed = consumed,
                    buffered = self.buffer.len(),
                    "decoded request"
                );
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }

    async fn fill_buffer(&mut self) -> Result<(), ConnectionError> {
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            warn!(
                client = %self.addr,
                buffered = self.buffer.len(),
                "input buffer limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }
        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(4096);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;
        if n == 0 {
            return if self.buffer.is_empty() {
                Err(ConnectionError::Disconnected)
            } else {
                Err(ConnectionError::UnexpectedEof)
            };
        }

        self.stats.add_bytes_read(n);
        trace!(client = %self.addr, bytes = n, "read");
        Ok(())
    }

    async fn send_reply(&mut self, reply: &Frame) -> Result<(), ConnectionError> {
        self.reply_buf.clear();
        reply.serialize_into(&mut self.reply_buf);
        self.stream.write_all(&self.reply_buf).await?;
        self.stream.flush().await?;
        self.stats.add_bytes_written(self.reply_buf.len());
        Ok(())
    }
}

/// Serves one accepted client to completion. Spawn this per connection.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    commands: CommandHandler,
    stats: Arc<ConnectionStats>,
) {
    let handler = ConnectionHandler::new(stream, addr, commands, stats);
    if let Err(err) = handler.run().await {
        match err {
            ConnectionError::Disconnected => {}
            ConnectionError::Io(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %addr, error = %err, "connection ended with error");
            }
        }
    }
}
