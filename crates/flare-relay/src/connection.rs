//! Per-connection handler: register, fan out inbound frames, clean up.

use std::net::SocketAddr;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::http::RelayState;
use crate::registry::Frame;

impl Frame {
    fn into_message(self) -> Message {
        match self {
            Frame::Text(text) => Message::Text(text),
            Frame::Binary(data) => Message::Binary(data),
        }
    }
}

/// Drive one upgraded WebSocket until either side closes it.
pub async fn handle_socket(socket: WebSocket, addr: SocketAddr, state: RelayState) {
    let (mut sink, mut stream) = socket.split();

    let (tx, mut rx) = mpsc::channel::<Frame>(state.member_buffer);
    let id = state.registry.register(tx).await;

    let clients = state.registry.count().await;
    tracing::info!(conn = %id, peer = %addr, clients, "Client connected");

    // Writer: drains this member's queue. Ends when the registry drops the
    // sender (unregister or shutdown), then says goodbye.
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(frame.into_message()).await.is_err() {
                return;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    // Reader: everything this member says goes to everyone else.
    while let Some(result) = stream.next().await {
        let frame = match result {
            Ok(Message::Text(text)) => Frame::Text(text),
            Ok(Message::Binary(data)) => Frame::Binary(data),
            Ok(Message::Close(_)) => break,
            // Ping/pong are answered by the protocol layer, never relayed.
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(conn = %id, peer = %addr, error = %e, "WS error");
                break;
            }
        };

        let size = frame.len();
        let fanout = state.registry.broadcast(id, frame).await;
        tracing::debug!(
            conn = %id,
            bytes = size,
            delivered = fanout.delivered,
            dropped = fanout.dropped,
            "Relayed frame"
        );
    }

    state.registry.unregister(id).await;

    let clients = state.registry.count().await;
    tracing::info!(conn = %id, peer = %addr, clients, "Client disconnected");
}
