//! Entry point for `chat-over-udp`.
//!
//! Parses CLI arguments and dispatches into either **server** or **client**
//! mode. All actual protocol work is delegated to library modules; `main.rs`
//! owns only process setup (logging, argument parsing, address resolution).

use std::net::SocketAddr;

use anyhow::Context;
use clap::{Parser, Subcommand};

use chat_over_udp::client::Client;
use chat_over_udp::config::TransportConfig;
use chat_over_udp::server::Server;
use chat_over_udp::socket::ReliableSocket;

/// Chat over a reliable message transport built on UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Run the chat server.
    Server {
        /// Port to listen on.
        #[arg(short, long, default_value_t = 15000)]
        port: u16,
        /// Address to bind.
        #[arg(short, long, default_value = "127.0.0.1")]
        address: String,
        /// Sliding-window size for outbound messages.
        #[arg(short, long, default_value_t = 3)]
        window: usize,
    },
    /// Run an interactive chat client.
    Client {
        /// Username to join as.
        #[arg(short, long)]
        user: String,
        /// Server port.
        #[arg(short, long, default_value_t = 15000)]
        port: u16,
        /// Server address or hostname.
        #[arg(short, long, default_value = "127.0.0.1")]
        address: String,
        /// Sliding-window size for outbound messages.
        #[arg(short, long, default_value_t = 3)]
        window: usize,
    },
}

/// Resolve `host:port`, accepting hostnames as well as literal addresses.
async fn resolve(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    tokio::net::lookup_host((host, port))
        .await
        .with_context(|| format!("could not resolve {host}:{port}"))?
        .next()
        .with_context(|| format!("no addresses for {host}:{port}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();
    match cli.mode {
        Mode::Server {
            port,
            address,
            window,
        } => {
            let bind = resolve(&address, port).await?;
            let socket = ReliableSocket::bind(bind, TransportConfig::with_window(window)).await?;
            log::info!("server listening on {}", socket.local_addr());
            Server::new(socket).run().await?;
        }
        Mode::Client {
            user,
            port,
            address,
            window,
        } => {
            let server = resolve(&address, port).await?;
            let bind = resolve("0.0.0.0", 0).await?;
            let socket = ReliableSocket::bind(bind, TransportConfig::with_window(window)).await?;
            log::info!("client {} bound to {}", user, socket.local_addr());
            Client::new(socket, server, user).run().await?;
        }
    }
    Ok(())
}
