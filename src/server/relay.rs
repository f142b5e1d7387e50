//! File transfer relay
//!
//! Payload bytes accumulate against the sender's session while the framer is
//! in BINARY mode. Delivery happens only on completion: recipients are
//! resolved at that moment (not at header-parse time), the sender is
//! excluded, and each recipient gets a `/recvfile` header followed by exactly
//! the declared bytes on its outbound queue. An unresolvable destination
//! still drains the payload from the stream so framing stays consistent; the
//! sender just gets an error line instead.

use bytes::{Bytes, BytesMut};

use crate::error::{RelayError, Result};
use crate::protocol::Destination;
use crate::server::groups::GroupDirectory;
use crate::server::registry::SessionRegistry;

/// An in-progress inbound file transfer, owned by the sending session
#[derive(Debug)]
pub struct FileTransfer {
    source: String,
    dest: Destination,
    filename: String,
    declared: u64,
    buffer: BytesMut,
}

impl FileTransfer {
    pub fn new(source: &str, dest: Destination, filename: String, declared: u64) -> Self {
        Self {
            source: source.to_string(),
            dest,
            filename,
            declared,
            buffer: BytesMut::with_capacity(declared.min(64 * 1024) as usize),
        }
    }

    /// Append a payload chunk handed out by the framer
    pub fn push_chunk(&mut self, chunk: &Bytes) {
        self.buffer.extend_from_slice(chunk);
    }

    pub fn declared(&self) -> u64 {
        self.declared
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn destination(&self) -> &Destination {
        &self.dest
    }
}

/// Deliver a completed transfer to every resolved recipient.
///
/// Returns the number of sessions the file was queued for.
pub fn deliver(
    registry: &SessionRegistry,
    groups: &GroupDirectory,
    transfer: FileTransfer,
) -> Result<usize> {
    let FileTransfer {
        source,
        dest,
        filename,
        declared,
        buffer,
    } = transfer;

    debug_assert_eq!(buffer.len() as u64, declared);
    let payload = buffer.freeze();

    match dest {
        Destination::User(handle) => {
            let recipient = registry
                .lookup(&handle)
                .ok_or_else(|| RelayError::recipient_not_found(&handle))?;
            recipient.send_file(&source, &filename, payload);
            Ok(1)
        }
        Destination::Group(name) => {
            let members = groups
                .members_of(&name)
                .ok_or_else(|| RelayError::group_not_found(&name))?;
            if !members.contains(&source) {
                return Err(RelayError::not_a_member(&name));
            }

            let mut delivered = 0;
            for member in members {
                if member == &source {
                    continue;
                }
                if let Some(recipient) = registry.lookup(member) {
                    recipient.send_file(&source, &filename, payload.clone());
                    delivered += 1;
                }
            }
            Ok(delivered)
        }
    }
}
