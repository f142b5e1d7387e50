//! Chat relay over TCP
//!
//! Usage:
//!   cargo run -- server                          # run the relay
//!   cargo run -- server --bind 0.0.0.0:55555     # bind a specific address
//!   cargo run -- client --handle alice           # connect interactively

use std::env;
use std::io::Write;

use anyhow::Result;

use palaver::{ClientConfig, RelayClient, RelayServer, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return Ok(());
    }

    match args[1].as_str() {
        "server" => run_server(&args).await,
        "client" => run_client(&args).await,
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            Ok(())
        }
    }
}

fn print_usage() {
    println!("Palaver - TCP Chat Relay");
    println!();
    println!("USAGE:");
    println!("    cargo run -- server [OPTIONS]");
    println!("    cargo run -- client [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("    server              Start the relay server");
    println!("    client              Connect an interactive client");
    println!("    help                Show this help message");
    println!();
    println!("SERVER OPTIONS:");
    println!("    --bind <ADDR>       Listen address (default: 127.0.0.1:55555)");
    println!("    --max-clients <N>   Maximum registered clients (default: 1000)");
    println!();
    println!("CLIENT OPTIONS:");
    println!("    --server <ADDR>     Relay address (default: 127.0.0.1:55555)");
    println!("    --handle <NAME>     Handle to register (prompted if omitted)");
    println!("    --downloads <DIR>   Where received files go (default: received_files)");
    println!();
    println!("CLIENT COMMANDS:");
    println!("    @user:<message>                 Private message");
    println!("    #group:<message>                Group message");
    println!("    /creategroup <name>             Create a group");
    println!("    /joingroup <name>               Join a group");
    println!("    /sendfile <@user|#group> <path> Send a local file");
    println!("    /exit                           Disconnect");
    println!();
    println!("EXAMPLES:");
    println!("    cargo run -- server");
    println!("    cargo run -- client --handle alice");
    println!("    RUST_LOG=debug cargo run -- server --bind 0.0.0.0:5000");
}

/// Value of a `--flag value` pair, if present
fn parse_flag<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|pair| pair[0] == name)
        .map(|pair| pair[1].as_str())
}

async fn run_server(args: &[String]) -> Result<()> {
    let mut config = ServerConfig::default();
    if let Some(addr) = parse_flag(args, "--bind") {
        config.bind_addr = addr.parse()?;
    }
    if let Some(max) = parse_flag(args, "--max-clients") {
        config.max_clients = max.parse()?;
    }

    let server = RelayServer::bind(config).await?;
    server.run_until_ctrl_c().await?;
    Ok(())
}

async fn run_client(args: &[String]) -> Result<()> {
    let mut config = ClientConfig::default();
    if let Some(addr) = parse_flag(args, "--server") {
        config.server_addr = addr.parse()?;
    }
    if let Some(dir) = parse_flag(args, "--downloads") {
        config.download_dir = dir.into();
    }

    let handle = match parse_flag(args, "--handle") {
        Some(handle) => handle.to_string(),
        None => prompt_handle()?,
    };

    RelayClient::new(config).run(handle).await?;
    Ok(())
}

fn prompt_handle() -> Result<String> {
    print!("Enter your handle: ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
