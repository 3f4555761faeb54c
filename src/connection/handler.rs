//! Connection Handler
//!
//! One task per client. The session is line oriented: the server greets the
//! client, shows a prompt, and answers each newline-terminated line with one
//! rendered reply followed by a fresh prompt.
//!
//! ## Session
//!
//! ```text
//! JsonDB 0.1.0
//! Type 'help' for available commands or 'quit' to exit
//! jsondb[0]> SET foo 123
//! OK
//! jsondb[0]> SELECT 2
//! OK
//! jsondb[2]> quit
//! Bye
//! ```
//!
//! ## Buffer Management
//!
//! Incoming bytes accumulate in a `BytesMut` buffer. TCP is a stream, so a
//! read may hold half a line or several lines; every complete line in the
//! buffer is handled before reading again. A line longer than
//! [`MAX_LINE_SIZE`] ends the session. A line that is not valid UTF-8 gets
//! an error reply. An unterminated final line is still run when the client
//! closes its side.

use crate::commands::CommandHandler;
use crate::protocol::Reply;
use crate::VERSION;
use bytes::{Buf, BytesMut};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, error, info, trace, warn};

/// Longest accepted input line (64 KB)
pub const MAX_LINE_SIZE: usize = 64 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Commands answered with an error reply
    pub command_errors: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
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

    pub fn command_processed(&self, reply: &Reply) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
        if reply.is_error() {
            self.command_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written.fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Returns true for the words that end a session.
fn is_quit(line: &str) -> bool {
    ["quit", "bye", "exit"]
        .iter()
        .any(|word| line.eq_ignore_ascii_case(word))
}

/// Handles a single client connection.
pub struct ConnectionHandler {
    stream: BufWriter<TcpStream>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// This session's command handler (owns the selected database)
    command_handler: CommandHandler,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl ConnectionHandler {
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            command_handler,
            stats,
        }
    }

    fn prompt(&self) -> String {
        format!("jsondb[{}]> ", self.command_handler.selected_db())
    }

    /// Runs the session until the client quits, disconnects or errors.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected gracefully"),
            Err(ConnectionError::ClientDisconnected) => {
                debug!(client = %self.addr, "Client disconnected")
            }
            Err(ConnectionError::IoError(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection error"),
        }

        self.stats.connection_closed();
        result
    }

    /// The read-execute-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        let greeting = format!(
            "JsonDB {}\nType 'help' for available commands or 'quit' to exit\n{}",
            VERSION,
            self.prompt()
        );
        self.send(&greeting).await?;

        loop {
            while let Some(raw) = self.try_take_line()? {
                let Ok(line) = std::str::from_utf8(&raw) else {
                    debug!(client = %self.addr, bytes = raw.len(), "Rejected non-UTF-8 line");
                    let reply = Reply::error("invalid UTF-8 in command");
                    self.stats.command_processed(&reply);
                    let response = format!("{}\n{}", reply, self.prompt());
                    self.send(&response).await?;
                    continue;
                };
                let line = line.trim();

                if line.is_empty() {
                    let prompt = self.prompt();
                    self.send(&prompt).await?;
                    continue;
                }

                if is_quit(line) {
                    self.send("Bye\n").await?;
                    return Ok(());
                }

                let reply = self.command_handler.execute_line(line);
                self.stats.command_processed(&reply);
                trace!(client = %self.addr, db = self.command_handler.selected_db(), "Executed command");

                let response = format!("{}\n{}", reply, self.prompt());
                self.send(&response).await?;
            }

            self.read_more_data().await?;
        }
    }

    /// Removes one complete line from the buffer, without its terminator.
    fn try_take_line(&mut self) -> Result<Option<BytesMut>, ConnectionError> {
        let Some(end) = self.buffer.iter().position(|&b| b == b'\n') else {
            if self.buffer.len() > MAX_LINE_SIZE {
                error!(client = %self.addr, size = self.buffer.len(), "Line length limit exceeded");
                return Err(ConnectionError::LineTooLong);
            }
            return Ok(None);
        };

        let raw = self.buffer.split_to(end);
        self.buffer.advance(1);

        trace!(client = %self.addr, bytes = raw.len(), remaining = self.buffer.len(), "Read line");
        Ok(Some(raw))
    }

    /// Reads more data from the socket into the buffer.
    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(4096);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;

        if n == 0 {
            if self.buffer.is_empty() {
                return Err(ConnectionError::ClientDisconnected);
            }
            // last line had no terminator; run it before the next read reports EOF
            trace!(client = %self.addr, bytes = self.buffer.len(), "Unterminated final line");
            self.buffer.extend_from_slice(b"\n");
            return Ok(());
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");
        Ok(())
    }

    async fn send(&mut self, text: &str) -> Result<(), ConnectionError> {
        self.stream.write_all(text.as_bytes()).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(text.len());
        Ok(())
    }
}

/// Errors that can occur while handling a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Client disconnected between lines
    #[error("Client disconnected")]
    ClientDisconnected,

    /// No newline within MAX_LINE_SIZE bytes
    #[error("Line length limit exceeded")]
    LineTooLong,
}

/// Creates a [`ConnectionHandler`] and runs it to completion.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
) {
    let handler = ConnectionHandler::new(stream, addr, command_handler, stats);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected => {}
            ConnectionError::IoError(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %addr, error = %e, "Connection ended with error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::storage::StorageEngine;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
    use tokio::net::TcpListener;

    async fn create_test_server() -> (TempDir, SocketAddr, Arc<ConnectionStats>) {
        let dir = TempDir::new().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let storage = Arc::new(StorageEngine::open(Config::new(dir.path())).unwrap());
        let stats = Arc::new(ConnectionStats::new());

        let stats_clone = Arc::clone(&stats);
        tokio::spawn(async move {
            while let Ok((stream, client_addr)) = listener.accept().await {
                let handler = CommandHandler::new(Arc::clone(&storage));
                let stats = Arc::clone(&stats_clone);
                tokio::spawn(handle_connection(stream, client_addr, handler, stats));
            }
        });

        (dir, addr, stats)
    }

    struct Client {
        reader: BufReader<OwnedReadHalf>,
        writer: OwnedWriteHalf,
    }

    impl Client {
        /// Connects and consumes the banner and first prompt.
        async fn connect(addr: SocketAddr) -> Self {
            let (read, writer) = TcpStream::connect(addr).await.unwrap().into_split();
            let mut client = Self {
                reader: BufReader::new(read),
                writer,
            };
            assert!(client.line().await.starts_with("JsonDB "));
            assert_eq!(
                client.line().await,
                "Type 'help' for available commands or 'quit' to exit"
            );
            assert_eq!(client.prompt().await, "jsondb[0]> ");
            client
        }

        async fn line(&mut self) -> String {
            let mut line = String::new();
            tokio::time::timeout(Duration::from_secs(2), self.reader.read_line(&mut line))
                .await
                .unwrap()
                .unwrap();
            line.trim_end_matches('\n').to_string()
        }

        async fn prompt(&mut self) -> String {
            let mut buf = vec![0u8; "jsondb[0]> ".len()];
            tokio::time::timeout(Duration::from_secs(2), self.reader.read_exact(&mut buf))
                .await
                .unwrap()
                .unwrap();
            String::from_utf8(buf).unwrap()
        }

        /// Sends a line, returns the reply and checks the prompt after it.
        async fn send(&mut self, line: &str, db: usize) -> String {
            self.writer
                .write_all(format!("{}\n", line).as_bytes())
                .await
                .unwrap();
            let reply = self.line().await;
            assert_eq!(self.prompt().await, format!("jsondb[{}]> ", db));
            reply
        }
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let (_dir, addr, _) = create_test_server().await;
        let mut client = Client::connect(addr).await;

        assert_eq!(client.send("PING", 0).await, "PONG");
    }

    #[tokio::test]
    async fn test_set_get() {
        let (_dir, addr, _) = create_test_server().await;
        let mut client = Client::connect(addr).await;

        assert_eq!(client.send("SET name jsondb", 0).await, "OK");
        assert_eq!(client.send("GET name", 0).await, "jsondb");
        assert_eq!(client.send("GET other", 0).await, "(nil)");
        assert_eq!(client.send("get", 0).await, "Error: usage: GET <key>");
    }

    #[tokio::test]
    async fn test_select_changes_prompt() {
        let (_dir, addr, _) = create_test_server().await;
        let mut client = Client::connect(addr).await;

        assert_eq!(client.send("SELECT 7", 7).await, "OK");
        assert_eq!(client.send("SET x 1", 7).await, "OK");
        assert_eq!(
            client.send("SELECT 99", 7).await,
            "Error: database must be between 0 and 15"
        );

        // a second session starts in database 0
        let mut other = Client::connect(addr).await;
        assert_eq!(other.send("GET x", 0).await, "(nil)");
    }

    #[tokio::test]
    async fn test_empty_line_reprompts() {
        let (_dir, addr, stats) = create_test_server().await;
        let mut client = Client::connect(addr).await;

        client.writer.write_all(b"\r\n").await.unwrap();
        assert_eq!(client.prompt().await, "jsondb[0]> ");
        assert_eq!(client.send("PING", 0).await, "PONG");
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_multiple_lines_in_one_write() {
        let (_dir, addr, _) = create_test_server().await;
        let mut client = Client::connect(addr).await;

        client
            .writer
            .write_all(b"SET k1 v1\r\nSET k2 v2\nKEYS k*\n")
            .await
            .unwrap();

        assert_eq!(client.line().await, "OK");
        client.prompt().await;
        assert_eq!(client.line().await, "OK");
        client.prompt().await;
        assert_eq!(client.line().await, "[k1 k2]");
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_rejected() {
        let (_dir, addr, stats) = create_test_server().await;
        let mut client = Client::connect(addr).await;

        client.writer.write_all(b"SET k \xff\xfe\n").await.unwrap();
        assert_eq!(client.line().await, "Error: invalid UTF-8 in command");
        assert_eq!(client.prompt().await, "jsondb[0]> ");

        assert_eq!(client.send("EXISTS k", 0).await, "(integer) 0");
        assert_eq!(stats.command_errors.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_final_line_without_newline_runs() {
        let (_dir, addr, _) = create_test_server().await;
        let mut client = Client::connect(addr).await;

        client.writer.write_all(b"SET last 1").await.unwrap();
        client.writer.shutdown().await.unwrap();

        assert_eq!(client.line().await, "OK");
        assert_eq!(client.prompt().await, "jsondb[0]> ");

        let mut other = Client::connect(addr).await;
        assert_eq!(other.send("GET last", 0).await, "1");
    }

    #[tokio::test]
    async fn test_quit() {
        let (_dir, addr, _) = create_test_server().await;

        for word in ["quit", "BYE", "Exit"] {
            let mut client = Client::connect(addr).await;
            client
                .writer
                .write_all(format!("{}\n", word).as_bytes())
                .await
                .unwrap();
            assert_eq!(client.line().await, "Bye");

            // server closed the connection
            let mut rest = String::new();
            let n = client.reader.read_line(&mut rest).await.unwrap();
            assert_eq!(n, 0);
        }
    }

    #[tokio::test]
    async fn test_connection_stats() {
        let (_dir, addr, stats) = create_test_server().await;

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);

        let mut client = Client::connect(addr).await;

        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 1);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 1);

        client.send("PING", 0).await;
        client.send("NOPE", 0).await;

        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 2);
        assert_eq!(stats.command_errors.load(Ordering::Relaxed), 1);
        assert!(stats.bytes_read.load(Ordering::Relaxed) > 0);
        assert!(stats.bytes_written.load(Ordering::Relaxed) > 0);

        drop(client);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_is_quit() {
        assert!(is_quit("quit"));
        assert!(is_quit("EXIT"));
        assert!(is_quit("Bye"));
        assert!(!is_quit("quit now"));
        assert!(!is_quit("q"));
    }
}
