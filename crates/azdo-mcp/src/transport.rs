//! Stdio transport: newline-delimited JSON-RPC over stdin/stdout.
//!
//! Stdout carries protocol messages only; logging goes to stderr.

use std::io::{self, BufRead, Write};

use crate::protocol::{IncomingMessage, JsonRpcError, JsonRpcResponse};

/// One framed line read from the client.
#[derive(Debug)]
pub enum Frame {
    Message(IncomingMessage),
    /// The line could not be turned into a message
    Invalid(JsonRpcError),
}

/// Transport for reading/writing JSON-RPC messages.
pub struct StdioTransport {
    reader: Box<dyn BufRead + Send>,
    writer: Box<dyn Write + Send>,
}

impl StdioTransport {
    /// Create a transport using stdin/stdout.
    pub fn stdio() -> Self {
        Self {
            reader: Box::new(io::BufReader::new(io::stdin())),
            writer: Box::new(io::stdout()),
        }
    }

    /// Create a transport with custom reader/writer.
    pub fn new(reader: Box<dyn BufRead + Send>, writer: Box<dyn Write + Send>) -> Self {
        Self { reader, writer }
    }

    /// Read the next frame. Blank lines are skipped; `None` means EOF.
    pub fn read_frame(&mut self) -> io::Result<Option<Frame>> {
        loop {
            let mut line = String::new();
            if self.reader.read_line(&mut line)? == 0 {
                return Ok(None);
            }

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            tracing::debug!(line = line, "Received");

            return Ok(Some(match IncomingMessage::parse(line) {
                Ok(msg) => Frame::Message(msg),
                Err(e) => {
                    tracing::warn!(error = %e.message, "Failed to parse message");
                    Frame::Invalid(e)
                }
            }));
        }
    }

    /// Write a JSON-RPC response as one line.
    pub fn write_response(&mut self, response: &JsonRpcResponse) -> io::Result<()> {
        let json = serde_json::to_string(response).map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("Serialization error: {}", e))
        })?;

        tracing::debug!(line = %json, "Sending");

        writeln!(self.writer, "{}", json)?;
        self.writer.flush()
    }
}
