//! WebSocket session endpoint
//!
//! Clients send framed JSON commands (`subscribe`, `unsubscribe`,
//! `ping`); the server delivers topic envelopes from the session's
//! outbound queue. Any inbound frame counts as liveness; sessions
//! silent past the ping timeout are closed by the registry sweep.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::debug;
use types::time::now_nanos;

use feed::envelope::{Envelope, EventBody, Topic};
use feed::session::SessionState;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct ClientMessage {
    #[serde(rename = "type")]
    kind: String,
    channel: Option<String>,
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let session = state.sessions.register(now_nanos());
    let (mut sender, mut receiver) = socket.split();

    'session: loop {
        tokio::select! {
            _ = session.notify.notified() => {
                if session.is_closed() {
                    break 'session;
                }
                for payload in session.drain() {
                    if sender.send(Message::Text(payload)).await.is_err() {
                        break 'session;
                    }
                }
            }
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        session.touch(now_nanos());
                        handle_client_message(&state, &session, &text);
                    }
                    Some(Ok(Message::Ping(data))) => {
                        session.touch(now_nanos());
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break 'session;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        session.touch(now_nanos());
                    }
                    Some(Ok(Message::Close(_))) | None => break 'session,
                    Some(Err(_)) => break 'session,
                    _ => {}
                }
            }
        }
    }

    state.sessions.disconnect(session.id);
}

fn handle_client_message(state: &AppState, session: &Arc<SessionState>, raw: &str) {
    let timestamp = now_nanos();
    let Ok(message) = serde_json::from_str::<ClientMessage>(raw) else {
        send_error(session, "Invalid JSON message received", timestamp);
        return;
    };

    match message.kind.as_str() {
        "subscribe" | "unsubscribe" => {
            let Some(channel) = message.channel else {
                send_error(session, "Missing channel", timestamp);
                return;
            };
            let Some(topic) = Topic::parse(&channel) else {
                send_error(session, &format!("Unknown channel: {channel}"), timestamp);
                return;
            };
            let subscribed = message.kind == "subscribe";
            if subscribed {
                state.bus.subscribe(session.id, &topic);
            } else {
                state.bus.unsubscribe(session.id, &topic);
            }
            debug!(session_id = session.id, channel = %channel, action = %message.kind, "Subscription change");
            session.send_direct(
                Envelope::new(
                    EventBody::Subscription {
                        channel,
                        status: if subscribed { "subscribed".into() } else { "unsubscribed".into() },
                    },
                    timestamp,
                )
                .to_json(),
            );
        }
        "ping" => {
            session.send_direct(Envelope::new(EventBody::Pong, timestamp).to_json());
        }
        other => send_error(session, &format!("Unknown action: {other}"), timestamp),
    }
}

fn send_error(session: &Arc<SessionState>, message: &str, timestamp: i64) {
    session.send_direct(
        Envelope::new(EventBody::Error { message: message.to_string() }, timestamp).to_json(),
    );
}
