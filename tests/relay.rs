//! End-to-end tests: an in-process relay on an ephemeral port driven by raw
//! TCP clients speaking the wire protocol.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::oneshot;
use tokio::time::timeout;

use palaver::{RelayServer, ServerConfig};

const READ_TIMEOUT: Duration = Duration::from_secs(3);

/// Boot a relay on an ephemeral port; the returned sender shuts it down.
async fn start_relay(config: ServerConfig) -> Result<(SocketAddr, oneshot::Sender<()>)> {
    let server = RelayServer::bind(config).await?;
    let addr = server.local_addr()?;
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        let _ = server
            .run_until(async {
                let _ = shutdown_rx.await;
            })
            .await;
    });
    Ok((addr, shutdown_tx))
}

fn ephemeral_config() -> ServerConfig {
    ServerConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        ..Default::default()
    }
}

struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr).await.context("connect")?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        })
    }

    /// Connect and register, consuming the welcome line.
    async fn register(addr: SocketAddr, handle: &str) -> Result<Self> {
        let mut client = Self::connect(addr).await?;
        client.send_line(handle).await?;
        let welcome = client
            .read_line()
            .await?
            .ok_or_else(|| anyhow!("closed before welcome for {handle}"))?;
        if welcome != format!("[INFO] Welcome, {}!", handle) {
            return Err(anyhow!("unexpected welcome for {handle}: '{welcome}'"));
        }
        Ok(client)
    }

    async fn send_line(&mut self, line: &str) -> Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        Ok(())
    }

    async fn send_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes).await?;
        Ok(())
    }

    /// Read one line, `None` on EOF. Timeout-guarded so a missing delivery
    /// fails the test instead of hanging it.
    async fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        let n = timeout(READ_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .map_err(|_| anyhow!("timed out waiting for line"))??;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    async fn expect_line(&mut self, expected: &str) -> Result<()> {
        let line = self
            .read_line()
            .await?
            .ok_or_else(|| anyhow!("closed while expecting '{expected}'"))?;
        if line != expected {
            return Err(anyhow!("expected '{expected}', got '{line}'"));
        }
        Ok(())
    }

    async fn read_exact(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        timeout(READ_TIMEOUT, self.reader.read_exact(&mut buf))
            .await
            .map_err(|_| anyhow!("timed out waiting for {len} payload bytes"))??;
        Ok(buf)
    }

    async fn expect_closed(&mut self) -> Result<()> {
        match self.read_line().await? {
            None => Ok(()),
            Some(line) => Err(anyhow!("expected close, got '{line}'")),
        }
    }
}

#[tokio::test]
async fn duplicate_handle_is_rejected_and_first_wins() -> Result<()> {
    let (addr, _shutdown) = start_relay(ephemeral_config()).await?;

    let mut alice = TestClient::register(addr, "alice").await?;

    let mut imposter = TestClient::connect(addr).await?;
    imposter.send_line("alice").await?;
    imposter
        .expect_line("[ERROR] handle 'alice' is already in use")
        .await?;
    imposter.expect_closed().await?;

    // The original registration is intact and still routable.
    let mut bob = TestClient::register(addr, "bob").await?;
    bob.send_line("@alice:still there?").await?;
    alice.expect_line("[bob -> you]: still there?").await?;

    Ok(())
}

#[tokio::test]
async fn first_line_is_a_handle_not_a_command() -> Result<()> {
    let (addr, _shutdown) = start_relay(ephemeral_config()).await?;

    // No routing happens before registration; the line is taken as a handle
    // request, which the sigil makes invalid.
    let mut client = TestClient::connect(addr).await?;
    client.send_line("@alice:sneaky").await?;
    client
        .expect_line("[ERROR] invalid handle '@alice:sneaky'")
        .await?;
    client.expect_closed().await?;

    Ok(())
}

#[tokio::test]
async fn private_message_routing_and_missing_recipient() -> Result<()> {
    let (addr, _shutdown) = start_relay(ephemeral_config()).await?;

    let mut alice = TestClient::register(addr, "alice").await?;
    let mut bob = TestClient::register(addr, "bob").await?;

    alice.send_line("@bob:hello bob").await?;
    bob.expect_line("[alice -> you]: hello bob").await?;

    // The error goes to the sender only; the connection survives.
    alice.send_line("@carol:anyone home").await?;
    alice
        .expect_line("[ERROR] no user 'carol' is connected")
        .await?;

    alice.send_line("@bob:again").await?;
    bob.expect_line("[alice -> you]: again").await?;

    Ok(())
}

#[tokio::test]
async fn group_messaging_is_strict_until_joined() -> Result<()> {
    let (addr, _shutdown) = start_relay(ephemeral_config()).await?;

    let mut alice = TestClient::register(addr, "alice").await?;
    let mut bob = TestClient::register(addr, "bob").await?;
    let mut carol = TestClient::register(addr, "carol").await?;

    alice.send_line("/creategroup team").await?;
    alice.expect_line("[INFO] Group 'team' created.").await?;

    bob.send_line("#team:let me in").await?;
    bob.expect_line("[ERROR] you are not a member of group 'team'")
        .await?;

    bob.send_line("/joingroup team").await?;
    bob.expect_line("[INFO] Joined group 'team'.").await?;

    bob.send_line("#team:hi").await?;
    alice.expect_line("[team] bob: hi").await?;

    // Non-members and the sender see nothing; prove it by routing something
    // else to carol and checking it arrives first.
    alice.send_line("@carol:direct").await?;
    carol.expect_line("[alice -> you]: direct").await?;

    Ok(())
}

#[tokio::test]
async fn group_lifecycle_errors() -> Result<()> {
    let (addr, _shutdown) = start_relay(ephemeral_config()).await?;

    let mut alice = TestClient::register(addr, "alice").await?;
    let mut bob = TestClient::register(addr, "bob").await?;

    alice.send_line("/creategroup team").await?;
    alice.expect_line("[INFO] Group 'team' created.").await?;

    bob.send_line("/creategroup team").await?;
    bob.expect_line("[ERROR] group 'team' already exists").await?;

    bob.send_line("/joingroup nowhere").await?;
    bob.expect_line("[ERROR] group 'nowhere' not found").await?;

    alice.send_line("/joingroup team").await?;
    alice
        .expect_line("[INFO] You are already a member of group 'team'.")
        .await?;

    Ok(())
}

#[tokio::test]
async fn malformed_lines_keep_the_connection_open() -> Result<()> {
    let (addr, _shutdown) = start_relay(ephemeral_config()).await?;

    let mut alice = TestClient::register(addr, "alice").await?;
    let mut bob = TestClient::register(addr, "bob").await?;

    alice.send_line("hello everyone").await?;
    let line = alice.read_line().await?.unwrap();
    assert!(line.starts_with("[ERROR] malformed command:"), "{line}");

    alice.send_line("@:empty").await?;
    let line = alice.read_line().await?.unwrap();
    assert!(line.starts_with("[ERROR] malformed command:"), "{line}");

    alice.send_line("/sendfile @bob nope").await?;
    let line = alice.read_line().await?.unwrap();
    assert!(line.starts_with("[ERROR] malformed command:"), "{line}");

    // Still registered, still routable.
    alice.send_line("@bob:survived").await?;
    bob.expect_line("[alice -> you]: survived").await?;

    Ok(())
}

#[tokio::test]
async fn file_transfer_to_user() -> Result<()> {
    let (addr, _shutdown) = start_relay(ephemeral_config()).await?;

    let mut alice = TestClient::register(addr, "alice").await?;
    let mut bob = TestClient::register(addr, "bob").await?;

    alice.send_line("/sendfile @bob report.txt 5").await?;
    alice.send_bytes(b"HELLO").await?;

    bob.expect_line("/recvfile alice report.txt 5").await?;
    assert_eq!(bob.read_exact(5).await?, b"HELLO");

    alice
        .expect_line("[INFO] File 'report.txt' relayed to 1 recipient(s).")
        .await?;

    Ok(())
}

#[tokio::test]
async fn file_payload_may_contain_newlines() -> Result<()> {
    let (addr, _shutdown) = start_relay(ephemeral_config()).await?;

    let mut alice = TestClient::register(addr, "alice").await?;
    let mut bob = TestClient::register(addr, "bob").await?;

    let payload = b"line one\nline two\n\x00\xff";
    alice
        .send_line(&format!("/sendfile @bob mixed.bin {}", payload.len()))
        .await?;
    alice.send_bytes(payload).await?;

    bob.expect_line(&format!("/recvfile alice mixed.bin {}", payload.len()))
        .await?;
    assert_eq!(bob.read_exact(payload.len()).await?, payload);

    Ok(())
}

#[tokio::test]
async fn zero_length_file_to_group() -> Result<()> {
    let (addr, _shutdown) = start_relay(ephemeral_config()).await?;

    let mut alice = TestClient::register(addr, "alice").await?;
    let mut bob = TestClient::register(addr, "bob").await?;
    let mut carol = TestClient::register(addr, "carol").await?;

    alice.send_line("/creategroup team").await?;
    alice.expect_line("[INFO] Group 'team' created.").await?;
    bob.send_line("/joingroup team").await?;
    bob.expect_line("[INFO] Joined group 'team'.").await?;
    carol.send_line("/joingroup team").await?;
    carol.expect_line("[INFO] Joined group 'team'.").await?;

    // Header with no payload bytes at all.
    alice.send_line("/sendfile #team data.bin 0").await?;

    bob.expect_line("/recvfile alice data.bin 0").await?;
    carol.expect_line("/recvfile alice data.bin 0").await?;
    alice
        .expect_line("[INFO] File 'data.bin' relayed to 2 recipient(s).")
        .await?;

    // Zero payload bytes means the next line is text again, for everyone.
    alice.send_line("#team:that was empty").await?;
    bob.expect_line("[team] alice: that was empty").await?;
    carol.expect_line("[team] alice: that was empty").await?;

    Ok(())
}

#[tokio::test]
async fn pipelined_payload_and_trailing_command_in_one_write() -> Result<()> {
    let (addr, _shutdown) = start_relay(ephemeral_config()).await?;

    let mut alice = TestClient::register(addr, "alice").await?;
    let mut bob = TestClient::register(addr, "bob").await?;

    // Header, payload, and the next command arrive in a single segment; the
    // framer must split at exactly the declared length.
    alice
        .send_bytes(b"/sendfile @bob blob.bin 4\nWXYZ@bob:after the file\n")
        .await?;

    bob.expect_line("/recvfile alice blob.bin 4").await?;
    assert_eq!(bob.read_exact(4).await?, b"WXYZ");
    bob.expect_line("[alice -> you]: after the file").await?;

    Ok(())
}

#[tokio::test]
async fn unresolvable_file_destination_is_drained() -> Result<()> {
    let (addr, _shutdown) = start_relay(ephemeral_config()).await?;

    let mut alice = TestClient::register(addr, "alice").await?;
    let mut bob = TestClient::register(addr, "bob").await?;

    alice.send_line("/sendfile @ghost spooky.bin 3").await?;
    alice.send_bytes(b"boo").await?;
    alice
        .expect_line("[ERROR] no user 'ghost' is connected")
        .await?;

    // The payload was consumed; the stream is still in frame.
    alice.send_line("@bob:framing intact").await?;
    bob.expect_line("[alice -> you]: framing intact").await?;

    // Same for a group the sender never joined.
    bob.send_line("/creategroup team").await?;
    bob.expect_line("[INFO] Group 'team' created.").await?;
    alice.send_line("/sendfile #team x.bin 2").await?;
    alice.send_bytes(b"xy").await?;
    alice
        .expect_line("[ERROR] you are not a member of group 'team'")
        .await?;
    alice.send_line("@bob:still fine").await?;
    bob.expect_line("[alice -> you]: still fine").await?;

    Ok(())
}

#[tokio::test]
async fn oversized_file_declaration_is_rejected_in_line_mode() -> Result<()> {
    let config = ServerConfig {
        max_file_len: 8,
        ..ephemeral_config()
    };
    let (addr, _shutdown) = start_relay(config).await?;

    let mut alice = TestClient::register(addr, "alice").await?;
    let mut bob = TestClient::register(addr, "bob").await?;

    alice.send_line("/sendfile @bob big.bin 9").await?;
    let line = alice.read_line().await?.unwrap();
    assert!(line.starts_with("[ERROR] malformed command:"), "{line}");

    // The framer never left LINE mode, so this routes as text.
    alice.send_line("@bob:no binary happened").await?;
    bob.expect_line("[alice -> you]: no binary happened").await?;

    Ok(())
}

#[tokio::test]
async fn server_full_rejects_registration() -> Result<()> {
    let config = ServerConfig {
        max_clients: 1,
        ..ephemeral_config()
    };
    let (addr, _shutdown) = start_relay(config).await?;

    let _alice = TestClient::register(addr, "alice").await?;

    let mut bob = TestClient::connect(addr).await?;
    bob.send_line("bob").await?;
    bob.expect_line("[ERROR] resource limit exceeded: server is full (1 clients)")
        .await?;
    bob.expect_closed().await?;

    Ok(())
}

#[tokio::test]
async fn disconnect_purges_registry_and_groups() -> Result<()> {
    let (addr, _shutdown) = start_relay(ephemeral_config()).await?;

    let mut alice = TestClient::register(addr, "alice").await?;
    let mut bob = TestClient::register(addr, "bob").await?;

    // A group only alice belongs to, and one she shares with bob.
    alice.send_line("/creategroup solo").await?;
    alice.expect_line("[INFO] Group 'solo' created.").await?;
    alice.send_line("/creategroup team").await?;
    alice.expect_line("[INFO] Group 'team' created.").await?;
    bob.send_line("/joingroup team").await?;
    bob.expect_line("[INFO] Joined group 'team'.").await?;

    drop(alice);

    // The purge frees the handle; retry registration until it lands.
    let mut second_alice = reregister_until_free(addr, "alice").await?;

    // Her solo group emptied and vanished; the shared one kept bob.
    second_alice.send_line("/joingroup solo").await?;
    second_alice
        .expect_line("[ERROR] group 'solo' not found")
        .await?;
    second_alice.send_line("/joingroup team").await?;
    second_alice.expect_line("[INFO] Joined group 'team'.").await?;

    second_alice.send_line("#team:back again").await?;
    bob.expect_line("[team] alice: back again").await?;

    Ok(())
}

/// Register `handle`, retrying while the server still holds the previous
/// session's entry. Proves the handle becomes available after a disconnect.
async fn reregister_until_free(addr: SocketAddr, handle: &str) -> Result<TestClient> {
    for _ in 0..100 {
        match TestClient::register(addr, handle).await {
            Ok(client) => return Ok(client),
            Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    }
    Err(anyhow!("handle '{handle}' never became available"))
}
