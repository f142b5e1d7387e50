//! Message routing against the registry and group directory
//!
//! One [`Router`] instance holds all shared state. The concurrency driver
//! wraps it in a single mutex, so every public method here is one atomic
//! critical section: registration, routing, transfer completion, and the
//! disconnect purge can never interleave partially. The router itself
//! performs no I/O; delivery is a push onto a recipient's outbound queue.

use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::ServerConfig;
use crate::error::{RelayError, Result};
use crate::protocol::{self, Command};
use crate::server::groups::GroupDirectory;
use crate::server::registry::SessionRegistry;
use crate::server::relay::{self, FileTransfer};
use crate::server::session::{Outbound, SessionHandle};

/// Outcome of dispatching one text line
#[derive(Debug)]
pub enum Dispatch {
    /// The line was fully handled
    Done,
    /// A file-transfer header was accepted; the connection must switch its
    /// framer to BINARY mode for the transfer's declared length
    BeginTransfer(FileTransfer),
}

pub struct Router {
    registry: SessionRegistry,
    groups: GroupDirectory,
    max_clients: usize,
    max_file_len: u64,
}

impl Router {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            registry: SessionRegistry::new(),
            groups: GroupDirectory::new(),
            max_clients: config.max_clients,
            max_file_len: config.max_file_len,
        }
    }

    /// Register a newly connected session under `requested`.
    ///
    /// On success the session receives its welcome line. Every error here
    /// closes the connection by policy.
    pub fn register(
        &mut self,
        conn_id: Uuid,
        requested: &str,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) -> Result<()> {
        if !protocol::valid_name(requested) {
            return Err(RelayError::invalid_handle(requested));
        }
        if self.registry.len() >= self.max_clients {
            return Err(RelayError::resource_limit(format!(
                "server is full ({} clients)",
                self.max_clients
            )));
        }

        let session = SessionHandle::new(conn_id, outbound);
        self.registry.register(requested, session)?;

        info!(handle = %requested, %conn_id, "registered");
        if let Some(session) = self.registry.lookup(requested) {
            session.send_info(format!("Welcome, {}!", requested));
        }
        Ok(())
    }

    /// Dispatch one decoded text line from a registered session.
    pub fn dispatch(&mut self, sender: &str, line: &str) -> Result<Dispatch> {
        let command =
            protocol::parse(line).map_err(|e| RelayError::malformed(e.to_string()))?;

        match command {
            Command::Private { to, text } => {
                self.private_message(sender, &to, &text)?;
                Ok(Dispatch::Done)
            }
            Command::Group { group, text } => {
                self.group_message(sender, &group, &text)?;
                Ok(Dispatch::Done)
            }
            Command::CreateGroup { name } => {
                self.groups.create(&name, sender)?;
                info!(group = %name, founder = %sender, "group created");
                self.notify(sender, format!("Group '{}' created.", name));
                Ok(Dispatch::Done)
            }
            Command::JoinGroup { name } => {
                let joined = self.groups.join(&name, sender)?;
                if joined {
                    debug!(group = %name, handle = %sender, "joined group");
                    self.notify(sender, format!("Joined group '{}'.", name));
                } else {
                    self.notify(
                        sender,
                        format!("You are already a member of group '{}'.", name),
                    );
                }
                Ok(Dispatch::Done)
            }
            Command::SendFile {
                dest,
                filename,
                length,
            } => {
                if length > self.max_file_len {
                    return Err(RelayError::malformed(format!(
                        "declared length {} exceeds the {} byte limit",
                        length, self.max_file_len
                    )));
                }
                debug!(
                    from = %sender,
                    dest = %dest,
                    file = %filename,
                    length,
                    "file transfer started"
                );
                Ok(Dispatch::BeginTransfer(FileTransfer::new(
                    sender, dest, filename, length,
                )))
            }
        }
    }

    /// Deliver a completed file transfer; returns the recipient count.
    pub fn finish_transfer(&mut self, transfer: FileTransfer) -> Result<usize> {
        let dest = transfer.destination().clone();
        let delivered = relay::deliver(&self.registry, &self.groups, transfer)?;
        info!(dest = %dest, recipients = delivered, "file relayed");
        Ok(delivered)
    }

    /// Purge a disconnected session from the registry and every group, as one
    /// critical section. Idempotent.
    pub fn disconnect(&mut self, handle: &str, conn_id: Uuid) {
        if self.registry.remove(handle, conn_id) {
            self.groups.leave_all(handle);
            info!(handle = %handle, %conn_id, "disconnected");
        }
    }

    fn private_message(&self, sender: &str, to: &str, text: &str) -> Result<()> {
        let recipient = self
            .registry
            .lookup(to)
            .ok_or_else(|| RelayError::recipient_not_found(to))?;
        recipient.send_line(format!("[{} -> you]: {}", sender, text));
        Ok(())
    }

    /// Strict policy: the sender must already be a member.
    fn group_message(&self, sender: &str, group: &str, text: &str) -> Result<()> {
        let members = self
            .groups
            .members_of(group)
            .ok_or_else(|| RelayError::group_not_found(group))?;
        if !members.contains(sender) {
            return Err(RelayError::not_a_member(group));
        }

        let line = format!("[{}] {}: {}", group, sender, text);
        for member in members {
            if member == sender {
                continue;
            }
            if let Some(session) = self.registry.lookup(member) {
                session.send_line(line.clone());
            }
        }
        Ok(())
    }

    fn notify(&self, handle: &str, msg: String) {
        if let Some(session) = self.registry.lookup(handle) {
            session.send_info(msg);
        }
    }
}
