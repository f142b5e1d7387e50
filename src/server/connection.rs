//! Per-connection driver
//!
//! Each accepted TCP stream gets a reader loop (this task) and a spawned
//! writer task. The reader feeds the framer and dispatches decoded units
//! through the shared router; the writer drains the session's outbound queue
//! to the socket. Cleanup runs exactly once on the way out: the router purge
//! happens before the local queue sender is dropped, so no routing operation
//! can observe a half-closed session.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{RelayError, Result};
use crate::protocol::{Framer, Unit};
use crate::server::relay::FileTransfer;
use crate::server::router::{Dispatch, Router};
use crate::server::session::Outbound;

/// Per-connection state: identity, framer, and the optional in-progress
/// inbound transfer. The handle stays `None` until registration completes.
struct Session {
    conn_id: Uuid,
    handle: Option<String>,
    framer: Framer,
    transfer: Option<FileTransfer>,
}

pub(crate) async fn handle_connection(stream: TcpStream, router: Arc<Mutex<Router>>) {
    let conn_id = Uuid::new_v4();
    let peer = stream.peer_addr().ok();
    info!(?peer, %conn_id, "connection accepted");

    let (mut read_half, write_half) = stream.into_split();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_loop(write_half, outbound_rx));

    let mut session = Session {
        conn_id,
        handle: None,
        framer: Framer::new(),
        transfer: None,
    };

    if let Err(e) = read_loop(&mut read_half, &mut session, &router, &outbound_tx).await {
        debug!(?peer, %conn_id, error = %e, "read loop ended");
    }

    // Purge before dropping our queue sender: once this completes no routing
    // operation can resolve this session, and the writer then drains whatever
    // was queued (error lines included) and closes the socket.
    if let Some(handle) = session.handle.as_deref() {
        router.lock().await.disconnect(handle, conn_id);
    }
    drop(outbound_tx);
    let _ = writer.await;

    info!(?peer, %conn_id, "connection closed");
}

async fn read_loop(
    read_half: &mut (impl AsyncReadExt + Unpin),
    session: &mut Session,
    router: &Arc<Mutex<Router>>,
    outbound_tx: &mpsc::UnboundedSender<Outbound>,
) -> Result<()> {
    let mut buf = vec![0u8; 4096];

    loop {
        let n = read_half.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        session.framer.feed(&buf[..n]);

        loop {
            let unit = match session.framer.decode_next() {
                Ok(Some(unit)) => unit,
                Ok(None) => break,
                Err(e) => {
                    send_error(outbound_tx, &RelayError::framing(e.to_string()));
                    return Err(RelayError::framing(e.to_string()));
                }
            };
            if !process_unit(session, router, outbound_tx, unit).await {
                return Ok(());
            }
        }
    }
}

/// Handle one decoded unit. Returns `false` when the connection must close.
async fn process_unit(
    session: &mut Session,
    router: &Arc<Mutex<Router>>,
    outbound_tx: &mpsc::UnboundedSender<Outbound>,
    unit: Unit,
) -> bool {
    match unit {
        Unit::Line(line) => match session.handle.clone() {
            None => register(session, router, outbound_tx, line).await,
            Some(handle) => dispatch_line(session, router, outbound_tx, &handle, &line).await,
        },
        Unit::FilePayload { data, complete } => {
            match session.transfer.as_mut() {
                Some(transfer) => transfer.push_chunk(&data),
                None => {
                    // The framer only enters BINARY mode through dispatch.
                    debug_assert!(false, "payload unit without a pending transfer");
                    return false;
                }
            }
            if complete {
                if let Some(transfer) = session.transfer.take() {
                    let filename = transfer.filename().to_string();
                    match router.lock().await.finish_transfer(transfer) {
                        Ok(delivered) => {
                            let _ = outbound_tx.send(Outbound::Line(format!(
                                "[INFO] File '{}' relayed to {} recipient(s).",
                                filename, delivered
                            )));
                        }
                        Err(e) => send_error(outbound_tx, &e),
                    }
                }
            }
            true
        }
    }
}

/// The first line from an unregistered session is the requested handle.
async fn register(
    session: &mut Session,
    router: &Arc<Mutex<Router>>,
    outbound_tx: &mpsc::UnboundedSender<Outbound>,
    requested: String,
) -> bool {
    let result =
        router
            .lock()
            .await
            .register(session.conn_id, &requested, outbound_tx.clone());
    match result {
        Ok(()) => {
            session.handle = Some(requested);
            true
        }
        Err(e) => {
            // Rejected registrations close by policy; the queued error line
            // is flushed by the writer before the socket drops.
            warn!(conn_id = %session.conn_id, error = %e, "registration rejected");
            send_error(outbound_tx, &e);
            false
        }
    }
}

async fn dispatch_line(
    session: &mut Session,
    router: &Arc<Mutex<Router>>,
    outbound_tx: &mpsc::UnboundedSender<Outbound>,
    handle: &str,
    line: &str,
) -> bool {
    match router.lock().await.dispatch(handle, line) {
        Ok(Dispatch::Done) => true,
        Ok(Dispatch::BeginTransfer(transfer)) => {
            session.framer.begin_binary(transfer.declared());
            session.transfer = Some(transfer);
            true
        }
        Err(e) => {
            send_error(outbound_tx, &e);
            !e.closes_connection()
        }
    }
}

fn send_error(outbound_tx: &mpsc::UnboundedSender<Outbound>, error: &RelayError) {
    let _ = outbound_tx.send(Outbound::Line(format!("[ERROR] {}", error)));
}

/// Drain the outbound queue to the socket, in queue order. Exits when every
/// sender is gone (session purged) or the peer stops accepting writes.
async fn write_loop(mut write_half: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<Outbound>) {
    while let Some(item) = rx.recv().await {
        let result = match item {
            Outbound::Line(line) => write_line(&mut write_half, &line).await,
            Outbound::File {
                source,
                filename,
                payload,
            } => {
                let header = format!("/recvfile {} {} {}", source, filename, payload.len());
                match write_line(&mut write_half, &header).await {
                    Ok(()) => write_half.write_all(&payload).await,
                    Err(e) => Err(e),
                }
            }
        };
        if let Err(e) = result {
            debug!(error = %e, "outbound write failed");
            break;
        }
    }
    let _ = write_half.shutdown().await;
}

async fn write_line(write_half: &mut OwnedWriteHalf, line: &str) -> std::io::Result<()> {
    write_half.write_all(line.as_bytes()).await?;
    write_half.write_all(b"\n").await
}
