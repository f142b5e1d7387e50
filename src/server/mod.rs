//! TCP chat relay server
//!
//! Task-per-connection architecture on the tokio runtime:
//!
//! - **Acceptor** (this module): binds, accepts, spawns a connection driver
//!   per client.
//! - **Connection driver**: reader task feeding the framer/router, writer
//!   task draining the session's outbound queue.
//! - **Router**: registry + group directory behind one mutex; every logical
//!   operation is a single critical section.
//!
//! Either concurrency strategy from the protocol's design space would do; the
//! routing core performs no I/O, so a single-threaded reactor could drive the
//! same code. The task-per-connection form is what this server ships.

pub mod connection;
pub mod groups;
pub mod registry;
pub mod relay;
pub mod router;
pub mod session;

pub use groups::GroupDirectory;
pub use registry::SessionRegistry;
pub use relay::FileTransfer;
pub use router::{Dispatch, Router};
pub use session::{Outbound, SessionHandle};

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::ServerConfig;
use crate::error::Result;

/// The accept loop and the shared routing state
pub struct RelayServer {
    listener: TcpListener,
    router: Arc<Mutex<Router>>,
}

impl RelayServer {
    /// Bind the listening endpoint. This is the only failure that is fatal to
    /// the server process.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        info!(addr = %listener.local_addr()?, "relay listening");
        Ok(Self {
            listener,
            router: Arc::new(Mutex::new(Router::new(&config))),
        })
    }

    /// Actual bound address (useful with port 0)
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` resolves.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("relay shutting down");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _peer)) => {
                        let router = Arc::clone(&self.router);
                        tokio::spawn(connection::handle_connection(stream, router));
                    }
                    Err(e) => warn!(error = %e, "failed to accept connection"),
                }
            }
        }

        Ok(())
    }

    /// Accept connections until ctrl-c.
    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}
