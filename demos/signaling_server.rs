//! WebRTC signaling server example
//!
//! Run with: cargo run --example signaling_server [BIND_ADDR]
//!
//! Examples:
//!   cargo run --example signaling_server                    # binds to 0.0.0.0:3000 (or $PORT)
//!   cargo run --example signaling_server localhost          # binds to 127.0.0.1:3000
//!   cargo run --example signaling_server 127.0.0.1:3001     # binds to 127.0.0.1:3001
//!
//! Environment:
//!   PORT, BIND_ADDR, PUBLIC_URL, MAX_CONNECTIONS (see `ServerConfig::from_env`)
//!   RUST_LOG for log filtering
//!
//! ## Streaming
//!
//! A streamer connects to ws://localhost:3000 and sends
//!   {"type":"register-streamer","streamId":"cam-1"}
//! Viewers send
//!   {"type":"register-viewer","streamId":"cam-1"}
//! and the server relays offers, answers and ICE candidates between them.

use std::net::SocketAddr;
use std::time::Duration;

use rtc_signal::server::config::DEFAULT_PORT;
use rtc_signal::{ServerConfig, SignalingServer};

/// Parse bind address from command line argument.
///
/// Accepts formats:
/// - "localhost" -> 127.0.0.1:3000
/// - "localhost:3001" -> 127.0.0.1:3001
/// - "127.0.0.1" -> 127.0.0.1:3000
/// - "0.0.0.0:3000" -> 0.0.0.0:3000
fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    Err(format!(
        "Invalid bind address: '{}'. Expected format: IP:PORT or IP or 'localhost'",
        arg
    ))
}

fn print_usage() {
    eprintln!("Usage: signaling_server [BIND_ADDR]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR    Address to bind to (default: 0.0.0.0:$PORT, PORT defaults to 3000)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rtc_signal=debug".parse()?)
                .add_directive("signaling_server=debug".parse()?),
        )
        .init();

    let mut config = ServerConfig::from_env();
    if let Some(arg) = args.get(1) {
        match parse_bind_addr(arg) {
            Ok(addr) => config = config.bind(addr),
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        }
    }

    println!("Starting signaling server on ws://{}", config.bind_addr);
    println!("Viewer links look like {}", config.embed_url("<stream-id>"));
    println!();

    let server = SignalingServer::new(config);
    let mediator = server.mediator().clone();

    // Periodic health line, the data behind a /api/health and /api/streams pair
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(30));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let stats = mediator.stats().await;
            let relay = mediator.metrics();
            tracing::info!(
                clients = stats.active_clients,
                streams = stats.active_streams,
                relayed = relay.relayed,
                dropped = relay.dropped,
                malformed = relay.malformed,
                "Health"
            );
            for stream in mediator.list_streams().await {
                tracing::debug!(
                    stream = %stream.id,
                    viewers = stream.viewer_count,
                    created_at = %stream.created_at,
                    "Active stream"
                );
            }
        }
    });

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
            println!("\nShutting down...");
        })
        .await?;

    Ok(())
}
