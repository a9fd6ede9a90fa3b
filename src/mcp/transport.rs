//! Newline-delimited JSON-RPC transport over the process's own stdio.
//!
//! Each outbound message is one JSON value followed by `\n`; inbound
//! framing splits on `\n`, retaining any trailing partial chunk across
//! reads. Blank lines are skipped silently. A malformed line never
//! terminates the stream — that's the caller's job to decide.

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdin, Stdout};

use crate::mcp::protocol::{JsonRpcError, JsonRpcResponse};

/// Newline-delimited JSON-RPC transport bound to the process's stdin/stdout.
pub struct StdioTransport {
    reader: BufReader<Stdin>,
    writer: Stdout,
    started: bool,
    closed: bool,
}

impl StdioTransport {
    /// Creates a transport bound to the process's own stdio streams.
    #[must_use]
    pub fn new() -> Self {
        Self {
            reader: BufReader::new(tokio::io::stdin()),
            writer: tokio::io::stdout(),
            started: false,
            closed: false,
        }
    }

    /// Attaches the transport. Idempotent before [`Self::close`]; fails if
    /// the transport has already been closed.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport was already closed.
    pub fn start(&mut self) -> std::io::Result<()> {
        if self.closed {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "transport already closed",
            ));
        }
        self.started = true;
        Ok(())
    }

    /// Reads the next newline-framed line, skipping blank lines.
    ///
    /// Returns `Ok(None)` on end-of-input.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying read fails.
    pub async fn read_line(&mut self) -> std::io::Result<Option<String>> {
        loop {
            let mut buf = String::new();
            let bytes_read = self.reader.read_line(&mut buf).await?;
            if bytes_read == 0 {
                return Ok(None);
            }

            let trimmed = buf.trim_end_matches(['\n', '\r']);
            if trimmed.trim().is_empty() {
                continue;
            }
            return Ok(Some(trimmed.to_string()));
        }
    }

    /// Writes a successful response frame.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` if [`Self::start`] has not been called, or an
    /// IO error if the write fails.
    pub async fn write_response(&mut self, response: &JsonRpcResponse) -> std::io::Result<()> {
        self.send(response).await
    }

    /// Writes an error frame.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` if [`Self::start`] has not been called, or an
    /// IO error if the write fails.
    pub async fn write_error(&mut self, error: &JsonRpcError) -> std::io::Result<()> {
        self.send(error).await
    }

    /// Serializes `message` and writes it followed by a single `\n`, then
    /// flushes. Never coalesces multiple messages into one write.
    async fn send<T: Serialize>(&mut self, message: &T) -> std::io::Result<()> {
        if !self.started {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "transport not started",
            ));
        }

        let mut bytes = serde_json::to_vec(message)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        bytes.push(b'\n');
        self.writer.write_all(&bytes).await?;
        self.writer.flush().await
    }

    /// Closes the transport. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing the underlying writer fails.
    pub async fn close(&mut self) -> std::io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.writer.flush().await
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_before_start_fails_not_connected() {
        let mut transport = StdioTransport::new();
        let response = JsonRpcResponse::success(
            crate::mcp::protocol::RequestId::Number(1),
            serde_json::json!({}),
        );
        let err = transport.write_response(&response).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotConnected);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let mut transport = StdioTransport::new();
        transport.start().unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();
    }

    #[test]
    fn start_after_close_fails() {
        let mut transport = StdioTransport::new();
        transport.closed = true;
        let err = transport.start().unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotConnected);
    }
}
