//! WebSocket connection handler.
//!
//! One connection subscribes to exactly one event's book. On upgrade
//! it registers with the hub, gets an immediate snapshot, then forwards hub
//! pushes to the socket while reading client `ping`/`refresh` frames.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::services::matching::BookProjector;
use crate::websocket::channels::{ClientMessage, ServerMessage};
use crate::AppState;

pub async fn handle_socket(socket: WebSocket, state: Arc<AppState>, event_id: i64) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let handle = state.hub.subscribe(event_id, tx.clone());

    {
        let projector = BookProjector::new(state.engine.book(), state.engine.order_store());
        let snapshot = ServerMessage::snapshot(projector.snapshot(event_id));
        if tx.send(snapshot).is_err() {
            state.hub.unsubscribe(handle);
            return;
        }
    }

    loop {
        tokio::select! {
            outgoing = rx.recv() => {
                match outgoing {
                    Some(msg) => {
                        let Ok(text) = serde_json::to_string(&msg) else { continue };
                        if sender.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Ping) => {
                                if tx.send(ServerMessage::Pong).is_err() {
                                    break;
                                }
                            }
                            Ok(ClientMessage::Refresh) => {
                                let projector = BookProjector::new(state.engine.book(), state.engine.order_store());
                                let snapshot = ServerMessage::snapshot(projector.snapshot(event_id));
                                if tx.send(snapshot).is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::debug!(error = %e, "ignoring unrecognized client message");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "websocket receive error");
                        break;
                    }
                }
            }
        }
    }

    state.hub.unsubscribe(handle);
}
