//! Debug WebSocket bridge (§6): `GET /ws?topic=passing|rawpass|status|replay`
//! subscribes the caller to one `BroadcastSink` topic and streams its
//! JSON-encoded messages verbatim. This is the one concrete consumer of
//! `Sink` in this repo; the real message-broker client is an external
//! collaborator per spec §1.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;
use tracing::debug;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    topic: String,
}

pub async fn upgrade(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_topic(socket, state, query.topic))
}

async fn stream_topic(mut socket: WebSocket, state: Arc<AppState>, topic: String) {
    let Some(mut rx) = state.sink.subscribe(&topic) else {
        let _ = socket.send(Message::Text(format!("unknown topic: {topic}"))).await;
        let _ = socket.close().await;
        return;
    };

    loop {
        tokio::select! {
            msg = rx.recv() => {
                match msg {
                    Ok(json) => {
                        if socket.send(Message::Text(json)).await.is_err() {
                            return;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        debug!(topic = %topic, skipped = n, "ws subscriber lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => return,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => return,
                }
            }
        }
    }
}
