//! WebSocket transport.
//!
//! Each socket is split into a reader loop, which forwards text frames into the server
//! queue, and a writer task draining the connection's outbound channel.

use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;

use super::ServerHandle;

pub fn router(handle: ServerHandle) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/healthz", get(healthz))
        .with_state(handle)
}

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn serve<F>(addr: &str, handle: ServerHandle, shutdown: F) -> Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("invalid bind address {}", addr))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    log::info!("Listening for WebSocket clients on ws://{}/ws", addr);
    axum::serve(listener, router(handle))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn ws_handler(ws: WebSocketUpgrade, State(handle): State<ServerHandle>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, handle))
}

async fn handle_socket(socket: WebSocket, handle: ServerHandle) {
    let (mut sender, mut receiver) = socket.split();
    let (conn_id, mut rx) = handle.connect();

    let write_task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => handle.frame(conn_id, text),
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                log::debug!("WebSocket error on conn {}: {}", conn_id, e);
                break;
            }
        }
    }

    handle.disconnect(conn_id);
    write_task.abort();
}

async fn healthz() -> &'static str {
    "ok"
}
