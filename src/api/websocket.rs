use crate::engine::StressEngine;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(engine): State<Arc<StressEngine>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_websocket(socket, engine))
}

/// Forward every engine event to the client as JSON
async fn handle_websocket(mut socket: WebSocket, engine: Arc<StressEngine>) {
    let mut events = engine.subscribe();

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if let Ok(json) = serde_json::to_string(&event) {
                            if socket.send(Message::Text(json)).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!("WebSocket client lagged, skipped {} events", skipped);
                    }
                    Err(RecvError::Closed) => return,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if text == "ping"
                            && socket.send(Message::Text("pong".to_string())).await.is_err() {
                                return;
                            }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    _ => {}
                }
            }
        }
    }
}
