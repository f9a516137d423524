//! Broadcasting events to relays over WebSocket.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt, future::join_all};
use serde_json::{Value, json};
use thiserror::Error;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{info, warn};
use url::Url;

use super::event::Event;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("websocket failure: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("relay closed the connection before acknowledging")]
    Closed,
    #[error("relay rejected the event: {0}")]
    Rejected(String),
    #[error("relay did not answer within {0:?}")]
    Timeout(Duration),
}

/// Sends one event to one relay and waits for its acknowledgement.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    async fn send(&self, relay: &Url, event: &Event) -> Result<(), RelayError>;
}

/// Real transport speaking the NIP-01 `EVENT` / `OK` exchange.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketTransport;

#[async_trait]
impl RelayTransport for WebSocketTransport {
    async fn send(&self, relay: &Url, event: &Event) -> Result<(), RelayError> {
        let (mut socket, _) = connect_async(relay.as_str()).await?;
        let frame = json!(["EVENT", event]).to_string();
        socket.send(Message::Text(frame)).await?;

        let outcome = loop {
            let Some(message) = socket.next().await else {
                break Err(RelayError::Closed);
            };
            let message = message?;
            if message.is_close() {
                break Err(RelayError::Closed);
            }
            let Ok(text) = message.to_text() else {
                continue;
            };
            if let Some(ack) = parse_ok(text, &event.id) {
                break ack;
            }
        };

        let _ = socket.close(None).await;
        outcome
    }
}

/// Accepts every event without touching the network.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunTransport;

#[async_trait]
impl RelayTransport for DryRunTransport {
    async fn send(&self, relay: &Url, event: &Event) -> Result<(), RelayError> {
        info!(
            target = "lantern::nostr",
            relay = %relay,
            event_id = %event.id,
            "Dry run: pretending the relay accepted the event"
        );
        Ok(())
    }
}

/// Read an `["OK", <id>, <accepted>, <message>]` frame for `event_id`.
/// Other frames yield `None`.
fn parse_ok(text: &str, event_id: &str) -> Option<Result<(), RelayError>> {
    let Ok(Value::Array(frame)) = serde_json::from_str::<Value>(text) else {
        return None;
    };
    if frame.first().and_then(Value::as_str) != Some("OK")
        || frame.get(1).and_then(Value::as_str) != Some(event_id)
    {
        return None;
    }
    let accepted = frame.get(2).and_then(Value::as_bool).unwrap_or(false);
    if accepted {
        Some(Ok(()))
    } else {
        let reason = frame
            .get(3)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Some(Err(RelayError::Rejected(reason)))
    }
}

/// Result of sending one event to a relay set.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    pub accepted: Vec<Url>,
    pub failed: Vec<(Url, String)>,
}

impl BroadcastReport {
    pub fn any_accepted(&self) -> bool {
        !self.accepted.is_empty()
    }
}

/// Send `event` to every relay concurrently, each bounded by `timeout`.
pub async fn broadcast(
    transport: &dyn RelayTransport,
    relays: &[Url],
    event: &Event,
    timeout: Duration,
) -> BroadcastReport {
    let attempts = relays.iter().map(|relay| async move {
        let outcome = match tokio::time::timeout(timeout, transport.send(relay, event)).await {
            Ok(result) => result,
            Err(_) => Err(RelayError::Timeout(timeout)),
        };
        (relay, outcome)
    });

    let mut report = BroadcastReport::default();
    for (relay, outcome) in join_all(attempts).await {
        match outcome {
            Ok(()) => {
                info!(
                    target = "lantern::nostr",
                    relay = %relay,
                    event_id = %event.id,
                    "Relay accepted event"
                );
                report.accepted.push(relay.clone());
            }
            Err(err) => {
                warn!(
                    target = "lantern::nostr",
                    relay = %relay,
                    event_id = %event.id,
                    error = %err,
                    "Relay did not accept event"
                );
                report.failed.push((relay.clone(), err.to_string()));
            }
        }
    }
    report
}
