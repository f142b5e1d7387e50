//! Per-session outbound path
//!
//! Each connection owns an unbounded FIFO queue drained by its writer task.
//! The router and relay never touch a socket directly; they push [`Outbound`]
//! items through a [`SessionHandle`], so delivery order per recipient is the
//! order the router produced and a slow receiver never blocks a sender's read
//! loop.

use bytes::Bytes;
use tokio::sync::mpsc;
use uuid::Uuid;

/// One unit on a session's outbound queue
#[derive(Debug, Clone)]
pub enum Outbound {
    /// A text line; the writer appends the terminator
    Line(String),
    /// A relayed file: a `/recvfile` header line followed by exactly
    /// `payload.len()` raw bytes
    File {
        source: String,
        filename: String,
        payload: Bytes,
    },
}

/// The registry's non-owning view of a live session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    conn_id: Uuid,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl SessionHandle {
    pub fn new(conn_id: Uuid, outbound: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { conn_id, outbound }
    }

    /// Connection id this handle belongs to
    pub fn conn_id(&self) -> Uuid {
        self.conn_id
    }

    /// Queue a text line for this session.
    ///
    /// A closed queue means the session is already tearing down; the line is
    /// dropped, matching a disconnect racing the delivery.
    pub fn send_line<T: Into<String>>(&self, line: T) {
        let _ = self.outbound.send(Outbound::Line(line.into()));
    }

    /// Queue an `[INFO]` status line
    pub fn send_info<T: std::fmt::Display>(&self, msg: T) {
        self.send_line(format!("[INFO] {}", msg));
    }

    /// Queue an `[ERROR]` line
    pub fn send_error<T: std::fmt::Display>(&self, msg: T) {
        self.send_line(format!("[ERROR] {}", msg));
    }

    /// Queue a relayed file
    pub fn send_file(&self, source: &str, filename: &str, payload: Bytes) {
        let _ = self.outbound.send(Outbound::File {
            source: source.to_string(),
            filename: filename.to_string(),
            payload,
        });
    }
}
