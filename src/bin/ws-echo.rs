//! WebSocket echo server and interactive client.
//!
//! `ws-echo server` answers upgrades on every accepted connection and echoes
//! frames back. `ws-echo client` sends each stdin line as a text frame and
//! prints what comes back.

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;

use relay_proxy::config::ObservabilityConfig;
use relay_proxy::observability::init_logging;
use relay_proxy::ws::{Frame, WsClient, WsServer};

#[derive(Parser)]
#[command(name = "ws-echo")]
#[command(about = "WebSocket echo server and client", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Accept WebSocket connections and echo every frame
    Server {
        #[arg(short, long, default_value = "127.0.0.1:8000")]
        bind: String,
    },
    /// Send stdin lines to a WebSocket server
    Client {
        #[arg(short, long, default_value = "ws://127.0.0.1:8000/")]
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(&ObservabilityConfig {
        log_level: "info".to_string(),
    })?;

    match cli.command {
        Commands::Server { bind } => serve(&bind).await,
        Commands::Client { url } => client(&url).await,
    }
}

async fn serve(bind: &str) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(bind).await?;
    tracing::info!(address = %listener.local_addr()?, "Echo server listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        tokio::spawn(async move {
            let mut server = WsServer::new(stream);
            if let Err(e) = server.accept().await {
                tracing::warn!(peer = %peer, error = %e, "Handshake failed");
                return;
            }
            tracing::info!(peer = %peer, "Client connected");
            if let Err(e) = server.echo().await {
                tracing::warn!(peer = %peer, error = %e, "Echo ended with error");
            }
        });
    }
}

async fn client(url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = WsClient::connect(url).await?;
    client.handshake().await?;
    tracing::info!(url = %client.url(), "Connected; type a line to send it");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        client.send(Frame::text(line.into_bytes())).await?;
        match client.recv().await? {
            Some(frame) => println!("{}", String::from_utf8_lossy(&frame.payload)),
            None => {
                tracing::info!("Server closed the connection");
                break;
            }
        }
    }

    client.close().await?;
    Ok(())
}
