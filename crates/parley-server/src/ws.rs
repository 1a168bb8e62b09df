//! WebSocket endpoint for realtime traffic.
//!
//! A client connects as a named user (`/ws?user=alice`) and drives the
//! session with JSON frames tagged by `action`.  Subscribing to a topic
//! spawns a forwarder task that copies broker payloads onto the socket;
//! private message topics are guarded so only the two named participants
//! can listen in.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::stream::StreamExt;
use futures::SinkExt;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use parley_shared::channel::{can_access, is_private};
use parley_shared::topics::friend_request_status_topic;

use crate::relay::IncomingMessage;
use crate::state::AppState;

const OUTBOUND_BUFFER: usize = 64;

const MESSAGE_TOPIC_PREFIX: &str = "topic/messages/";

/// Client frames, tagged by `action`.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
enum ClientFrame {
    /// Subscribe to a broker topic.
    Subscribe { topic: String },
    /// Submit a chat message over the socket.
    Send { message: IncomingMessage },
    /// Ask for an immediate friend-request snapshot.
    FetchFriendRequests { username: String },
}

#[derive(Deserialize)]
pub struct WsParams {
    user: String,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params.user))
}

async fn handle_socket(socket: WebSocket, state: AppState, user: String) {
    info!(user = %user, "websocket connected");

    let (mut sink, mut stream) = socket.split();

    // All outbound traffic is funneled through one writer task so the
    // per-topic forwarders never contend for the sink.
    let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);
    let mut writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut forwarders: Vec<JoinHandle<()>> = Vec::new();

    loop {
        tokio::select! {
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_frame(&state, &user, &text, &tx, &mut forwarders).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(user = %user, error = %e, "websocket read error");
                        break;
                    }
                }
            }
            _ = &mut writer => break,
        }
    }

    for task in forwarders {
        task.abort();
    }
    writer.abort();
    info!(user = %user, "websocket disconnected");
}

async fn handle_frame(
    state: &AppState,
    user: &str,
    text: &str,
    tx: &mpsc::Sender<String>,
    forwarders: &mut Vec<JoinHandle<()>>,
) {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(user = %user, error = %e, "unreadable websocket frame");
            send_error(tx, &format!("invalid frame: {e}")).await;
            return;
        }
    };

    match frame {
        ClientFrame::Subscribe { topic } => {
            if !may_subscribe(user, &topic) {
                warn!(user = %user, topic = %topic, "subscription refused");
                send_error(tx, &format!("not allowed to subscribe to {topic}")).await;
                return;
            }

            let receiver = match state.broker.subscribe(&topic).await {
                Ok(rx) => rx,
                Err(e) => {
                    send_error(tx, &e.to_string()).await;
                    return;
                }
            };

            debug!(user = %user, topic = %topic, "subscribed");
            forwarders.push(spawn_forwarder(receiver, tx.clone()));

            // A fresh status subscriber gets its pending traffic pushed
            // once the subscription has settled.
            if topic == friend_request_status_topic(user) {
                state.notifier.push_snapshot_later(user);
            }
        }

        ClientFrame::Send { message } => {
            if let Err(e) = state.relay.send_direct(message).await {
                send_error(tx, &e.to_string()).await;
            }
        }

        ClientFrame::FetchFriendRequests { username } => {
            state.notifier.push_snapshot(&username).await;
        }
    }
}

/// Copy broker payloads onto the socket until either side goes away.
fn spawn_forwarder(
    mut receiver: tokio::sync::broadcast::Receiver<serde_json::Value>,
    tx: mpsc::Sender<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(payload) => {
                    let text = payload.to_string();
                    if tx.send(text).await.is_err() {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "slow websocket subscriber lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Gate topic subscriptions on the connected user's identity.
///
/// Private message topics admit only the two users named in the channel;
/// everything else is open.
fn may_subscribe(user: &str, topic: &str) -> bool {
    match topic.strip_prefix(MESSAGE_TOPIC_PREFIX) {
        Some(channel) if is_private(channel) => can_access(user, channel),
        _ => true,
    }
}

async fn send_error(tx: &mpsc::Sender<String>, message: &str) {
    let frame = json!({ "type": "error", "error": message }).to_string();
    let _ = tx.send(frame).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_topics_are_gated() {
        assert!(may_subscribe("alice", "topic/messages/private_alice_bob"));
        assert!(may_subscribe("Bob", "topic/messages/private_alice_bob"));
        assert!(!may_subscribe("mallory", "topic/messages/private_alice_bob"));
    }

    #[test]
    fn public_topics_are_open() {
        assert!(may_subscribe("anyone", "topic/messages/general"));
        assert!(may_subscribe("anyone", "topic/friend-request-status/anyone"));
        assert!(may_subscribe("anyone", "topic/friend-request-status/someone-else"));
    }

    #[test]
    fn frames_deserialize_by_action() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"action":"subscribe","topic":"topic/messages/general"}"#)
                .unwrap();
        assert!(matches!(frame, ClientFrame::Subscribe { topic } if topic == "topic/messages/general"));

        let frame: ClientFrame = serde_json::from_str(
            r#"{"action":"send","message":{"sender":"alice","content":"hi","channel":"general"}}"#,
        )
        .unwrap();
        assert!(matches!(frame, ClientFrame::Send { .. }));

        let frame: ClientFrame =
            serde_json::from_str(r#"{"action":"fetch-friend-requests","username":"alice"}"#)
                .unwrap();
        assert!(matches!(frame, ClientFrame::FetchFriendRequests { username } if username == "alice"));
    }
}
