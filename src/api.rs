//! Health & status endpoints
//!
//! - GET /health - liveness
//! - GET /metrics - Prometheus metrics
//! - GET /status - uptime and per-chain sync state

use eyre::Result;
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::metrics;
use crate::relayer::RelayContext;

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    uptime_seconds: u64,
    chains: Vec<ChainStatus>,
}

#[derive(Serialize)]
struct ChainStatus {
    chain_id: String,
    name: String,
    connected: bool,
    last_processed_block: Option<u64>,
    nonce: Option<u64>,
}

/// Bind `addr` and serve until the task is dropped
pub async fn start_api_server(addr: SocketAddr, ctx: Arc<RelayContext>) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "API server started");
    serve(listener, ctx).await
}

/// Serve requests on an already bound listener
pub async fn serve(listener: TcpListener, ctx: Arc<RelayContext>) -> Result<()> {
    let started = Instant::now();
    metrics::UP.set(1.0);

    loop {
        let (socket, peer) = listener.accept().await?;
        debug!(%peer, "API connection");
        let ctx = ctx.clone();
        tokio::spawn(async move {
            handle(socket, ctx, started).await;
        });
    }
}

async fn handle(mut socket: TcpStream, ctx: Arc<RelayContext>, started: Instant) {
    let mut buf = [0u8; 1024];
    if socket.readable().await.is_ok() {
        let _ = socket.try_read(&mut buf);
    }
    let request = String::from_utf8_lossy(&buf);

    let (content_type, body) = if request.starts_with("GET /metrics") {
        let mut buffer = Vec::new();
        let _ = TextEncoder::new().encode(&prometheus::gather(), &mut buffer);
        ("text/plain; charset=utf-8", buffer)
    } else if request.starts_with("GET /health") {
        ("text/plain", b"OK".to_vec())
    } else if request.starts_with("GET /status") {
        let status = build_status(&ctx, started).await;
        let body = serde_json::to_vec(&status).unwrap_or_else(|_| b"{}".to_vec());
        ("application/json", body)
    } else {
        let _ = socket
            .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n")
            .await;
        return;
    };

    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n",
        content_type,
        body.len()
    );
    let _ = socket.write_all(header.as_bytes()).await;
    let _ = socket.write_all(&body).await;
}

async fn build_status(ctx: &RelayContext, started: Instant) -> StatusResponse {
    let mut chains = Vec::with_capacity(ctx.registry.len());
    for chain in ctx.registry.chains() {
        chains.push(ChainStatus {
            chain_id: chain.id.to_string(),
            name: chain.name.clone(),
            connected: chain.is_connected(),
            last_processed_block: ctx.watermarks.load(chain.id).await.ok().flatten(),
            nonce: chain.current_nonce().await,
        });
    }

    StatusResponse {
        status: "ok",
        uptime_seconds: started.elapsed().as_secs(),
        chains,
    }
}
