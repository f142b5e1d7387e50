//! TCP chat relay with mixed text/binary framing
//!
//! Clients connect over TCP, register a unique handle, and exchange private
//! messages, group messages, and raw file payloads through the server. The
//! wire protocol is line-oriented UTF-8 text interleaved with exact-length
//! binary blocks (see [`protocol`]).

pub mod client;
pub mod error;
pub mod protocol;
pub mod server;

pub use client::{ClientConfig, RelayClient};
pub use error::{RelayError, Result};
pub use server::RelayServer;

/// Relay server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Listen address
    pub bind_addr: std::net::SocketAddr,
    /// Maximum number of registered clients
    pub max_clients: usize,
    /// Maximum declared file-transfer length in bytes
    pub max_file_len: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:55555".parse().unwrap(),
            max_clients: 1000,
            max_file_len: 16 * 1024 * 1024, // 16 MiB
        }
    }
}
