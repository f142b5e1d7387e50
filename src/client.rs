//! Interactive chat relay client
//!
//! Connects to the relay, registers a handle, then bridges stdin to the
//! server and prints inbound traffic. Because relayed files arrive as a
//! `/recvfile` header followed by raw bytes on the same stream, the receiver
//! runs the same two-state [`Framer`] the server uses; payloads are saved
//! under the download directory as `from_<sender>_<filename>`.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::{debug, warn};

use crate::error::{RelayError, Result};
use crate::protocol::{Framer, Unit};

/// Chat client configuration
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Server address to connect to
    pub server_addr: SocketAddr,
    /// Directory where received files are saved
    pub download_dir: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:55555".parse().unwrap(),
            download_dir: PathBuf::from("received_files"),
        }
    }
}

/// Interactive relay client
pub struct RelayClient {
    config: ClientConfig,
}

impl RelayClient {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Connect, register under `handle`, and run until `/exit`, stdin EOF, or
    /// the server closes the connection.
    pub async fn run(self, handle: String) -> Result<()> {
        let stream = TcpStream::connect(self.config.server_addr)
            .await
            .map_err(|e| {
                RelayError::transport(format!(
                    "could not connect to {}: {}",
                    self.config.server_addr, e
                ))
            })?;
        let (read_half, mut write_half) = stream.into_split();

        // Registration: the first line is the requested handle.
        write_line(&mut write_half, &handle).await?;

        let mut receiver = tokio::spawn(receive_loop(read_half, self.config.download_dir));
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        println!("--- Connected. Type /exit to leave. ---");
        loop {
            tokio::select! {
                _ = &mut receiver => {
                    println!("Disconnected from server.");
                    return Ok(());
                }
                line = lines.next_line() => {
                    let Some(input) = line? else { break };
                    let input = input.trim();
                    if input.is_empty() {
                        continue;
                    }
                    if input.eq_ignore_ascii_case("/exit") {
                        break;
                    }
                    if let Some(args) = input.strip_prefix("/sendfile ") {
                        // A failed upload that already wrote a header leaves
                        // the stream out of sync, so send_file distinguishes
                        // local errors (keep going) from wire errors (bail).
                        match send_file(&mut write_half, args).await {
                            Ok(()) | Err(SendFileError::Local) => {}
                            Err(SendFileError::Wire(e)) => return Err(e),
                        }
                    } else {
                        write_line(&mut write_half, input).await?;
                    }
                }
            }
        }

        println!("Disconnecting...");
        let _ = write_half.shutdown().await;
        receiver.abort();
        Ok(())
    }
}

enum SendFileError {
    /// Nothing hit the wire; the session continues
    Local,
    /// The header or payload write failed or was cut short
    Wire(RelayError),
}

/// Handle `/sendfile <@user|#group> <path>`: stat the file, send the header
/// with its real name and size, then stream the bytes.
async fn send_file(write_half: &mut OwnedWriteHalf, args: &str) -> std::result::Result<(), SendFileError> {
    let parts: Vec<&str> = args.split_whitespace().collect();
    if parts.len() != 2 {
        eprintln!("[ERROR] usage: /sendfile <@user|#group> <path>");
        return Err(SendFileError::Local);
    }
    let dest = parts[0];
    let path = Path::new(parts[1]);

    let metadata = match fs::metadata(path).await {
        Ok(m) if m.is_file() => m,
        Ok(_) => {
            eprintln!("[ERROR] '{}' is not a regular file", path.display());
            return Err(SendFileError::Local);
        }
        Err(e) => {
            eprintln!("[ERROR] cannot read '{}': {}", path.display(), e);
            return Err(SendFileError::Local);
        }
    };

    let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
        eprintln!("[ERROR] '{}' has no usable file name", path.display());
        return Err(SendFileError::Local);
    };
    if filename.chars().any(char::is_whitespace) {
        // The header is whitespace-delimited.
        eprintln!("[ERROR] file names with whitespace cannot be sent");
        return Err(SendFileError::Local);
    }

    let length = metadata.len();
    let file = match fs::File::open(path).await {
        Ok(f) => f,
        Err(e) => {
            eprintln!("[ERROR] cannot open '{}': {}", path.display(), e);
            return Err(SendFileError::Local);
        }
    };

    let header = format!("/sendfile {} {} {}", dest, filename, length);
    write_line(write_half, &header)
        .await
        .map_err(SendFileError::Wire)?;

    // Never send more than declared, even if the file grew under us.
    let mut limited = file.take(length);
    let sent = tokio::io::copy(&mut limited, write_half)
        .await
        .map_err(|e| SendFileError::Wire(RelayError::from(e)))?;
    if sent != length {
        // The server still expects the missing bytes; the framing is broken.
        return Err(SendFileError::Wire(RelayError::transport(format!(
            "'{}' shrank mid-send ({} of {} bytes)",
            filename, sent, length
        ))));
    }

    println!("[INFO] Sent '{}' ({} bytes) to {}.", filename, length, dest);
    Ok(())
}

/// A `/recvfile` header from the server
#[derive(Debug, PartialEq, Eq)]
struct RecvFileHeader {
    source: String,
    filename: String,
    length: u64,
}

fn parse_recvfile(line: &str) -> Option<RecvFileHeader> {
    let rest = line.strip_prefix("/recvfile ")?;
    let mut tokens = rest.split_whitespace();
    let source = tokens.next()?.to_string();
    let filename = tokens.next()?.to_string();
    let length: u64 = tokens.next()?.parse().ok()?;
    if tokens.next().is_some() {
        return None;
    }
    Some(RecvFileHeader {
        source,
        filename,
        length,
    })
}

/// Where an incoming file lands: `<dir>/from_<sender>_<name>`, with any path
/// components stripped from the sender-supplied name.
fn received_file_path(dir: &Path, source: &str, filename: &str) -> PathBuf {
    let safe_name = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("download");
    dir.join(format!("from_{}_{}", source, safe_name))
}

/// An in-progress download
struct IncomingFile {
    file: fs::File,
    path: PathBuf,
    header: RecvFileHeader,
}

impl IncomingFile {
    async fn create(dir: &Path, header: RecvFileHeader) -> std::io::Result<Self> {
        fs::create_dir_all(dir).await?;
        let path = received_file_path(dir, &header.source, &header.filename);
        let file = fs::File::create(&path).await?;
        Ok(Self { file, path, header })
    }

    async fn write_chunk(&mut self, chunk: &[u8]) -> std::io::Result<()> {
        self.file.write_all(chunk).await
    }

    async fn finish(mut self) -> std::io::Result<PathBuf> {
        self.file.flush().await?;
        Ok(self.path)
    }
}

/// Print inbound lines and save relayed files until the server closes.
async fn receive_loop(mut read_half: OwnedReadHalf, download_dir: PathBuf) {
    let mut framer = Framer::new();
    let mut incoming: Option<IncomingFile> = None;
    let mut buf = vec![0u8; 4096];

    loop {
        let n = match read_half.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!(error = %e, "receive loop read failed");
                break;
            }
        };
        framer.feed(&buf[..n]);

        loop {
            let unit = match framer.decode_next() {
                Ok(Some(unit)) => unit,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "server sent an oversized line");
                    return;
                }
            };
            match unit {
                Unit::Line(line) => {
                    if let Some(header) = parse_recvfile(&line) {
                        println!(
                            "[FILE] Receiving '{}' from {} ({} bytes)...",
                            header.filename, header.source, header.length
                        );
                        let length = header.length;
                        match IncomingFile::create(&download_dir, header).await {
                            Ok(file) => incoming = Some(file),
                            Err(e) => {
                                // Still drain the payload to stay in frame.
                                eprintln!("[ERROR] cannot save file: {}", e);
                                incoming = None;
                            }
                        }
                        framer.begin_binary(length);
                    } else {
                        println!("{}", line);
                    }
                }
                Unit::FilePayload { data, complete } => {
                    if let Some(file) = incoming.as_mut() {
                        if let Err(e) = file.write_chunk(&data).await {
                            eprintln!("[ERROR] write failed: {}", e);
                            incoming = None;
                        }
                    }
                    if complete {
                        if let Some(file) = incoming.take() {
                            let expected = file.header.length;
                            match file.finish().await {
                                Ok(path) => println!(
                                    "[FILE] Saved {} bytes to {}",
                                    expected,
                                    path.display()
                                ),
                                Err(e) => eprintln!("[ERROR] could not finish file: {}", e),
                            }
                        }
                    }
                }
            }
        }
    }
}

async fn write_line(write_half: &mut OwnedWriteHalf, line: &str) -> Result<()> {
    write_half.write_all(line.as_bytes()).await?;
    write_half.write_all(b"\n").await?;
    Ok(())
}
