use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info};

use super::api::SharedState;
use super::hub::{BroadcastHub, Frame};
use super::models::Issue;
use super::snapshot::Snapshot;

/// How often to send WebSocket Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong response before considering the connection dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

/// A single socket write taking longer than this ends the connection.
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

// ── WebSocket message types ──────────────────────────────────────────

/// Server → client push messages, sent as `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum WsMessage {
    /// The whole snapshot was replaced.
    IssuesUpdated(Snapshot),
    IssueCreated(Issue),
    IssueUpdated(Issue),
    /// Reserved: nothing deletes issues through this server.
    IssueDeleted { id: String },
}

impl WsMessage {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::IssuesUpdated(_) => "issues_updated",
            Self::IssueCreated(_) => "issue_created",
            Self::IssueUpdated(_) => "issue_updated",
            Self::IssueDeleted { .. } => "issue_deleted",
        }
    }
}

// ── WebSocket handler ────────────────────────────────────────────────

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

async fn handle_socket(socket: WebSocket, hub: BroadcastHub) {
    let (id, outbox) = hub.register();
    info!(connection = id, "WebSocket client connected");

    let (sender, receiver) = socket.split();
    run_socket_loop(sender, receiver, outbox).await;

    hub.unregister(id);
    info!(connection = id, "WebSocket client disconnected");
}

/// Send one message, giving up after `limit`. Returns false when the
/// connection should be closed.
async fn send_with_timeout<S>(sender: &mut S, msg: Message, limit: Duration) -> bool
where
    S: futures_util::Sink<Message> + Unpin,
{
    match tokio::time::timeout(limit, sender.send(msg)).await {
        Ok(Ok(())) => true,
        Ok(Err(_)) => false,
        Err(_) => {
            debug!("socket write timed out");
            false
        }
    }
}

/// Core WebSocket loop with ping/pong keepalive.
///
/// Forwards outbox frames to the socket and watches the inbound stream for
/// Pong and Close. Exits on the first failed or stuck write, on close, when
/// the hub drops the outbox, or when no Pong arrives within
/// [`PONG_TIMEOUT`] of a Ping.
async fn run_socket_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut outbox: mpsc::Receiver<Frame>,
) {
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    // The first tick completes immediately; consume it so the first real
    // ping fires after PING_INTERVAL has elapsed.
    ping_interval.tick().await;

    let mut last_pong = Instant::now();
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            // ── Periodic ping ───────────────────────────────────────
            _ = ping_interval.tick() => {
                if awaiting_pong && last_pong.elapsed() > PONG_TIMEOUT {
                    debug!("pong timeout");
                    break;
                }
                let ping = Message::Ping(Bytes::new());
                if !send_with_timeout(&mut sender, ping, WRITE_TIMEOUT).await {
                    break;
                }
                awaiting_pong = true;
            }

            // ── Outbox forwarding ───────────────────────────────────
            frame = outbox.recv() => {
                match frame {
                    Some(frame) => {
                        let msg = Message::Text(frame.to_string().into());
                        if !send_with_timeout(&mut sender, msg, WRITE_TIMEOUT).await {
                            break;
                        }
                    }
                    // Dropped by the hub: closed or stalled.
                    None => break,
                }
            }

            // ── Client messages (pong, close, etc.) ─────────────────
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        // No client → server protocol; ignore Text, Binary, Ping.
                    }
                    Some(Err(e)) => {
                        debug!(error = %e, "WebSocket receive error");
                        break;
                    }
                }
            }
        }
    }

    // Best-effort close frame
    let _ = send_with_timeout(&mut sender, Message::Close(None), WRITE_TIMEOUT).await;
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_issues_updated_carries_snapshot_as_data() {
        let snapshot: Snapshot = Arc::new(vec![Issue::new("bd-1", "A"), Issue::new("bd-2", "B")]);
        let msg = WsMessage::IssuesUpdated(snapshot);
        let parsed: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(parsed["type"], "issues_updated");
        assert_eq!(parsed["data"][1]["title"], "B");
    }

    #[test]
    fn test_issue_created_serialization() {
        let msg = WsMessage::IssueCreated(Issue::new("bd-3", "Test"));
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"issue_created\""));
        assert!(json.contains("\"data\""));
        assert!(json.contains("\"title\":\"Test\""));
    }

    #[test]
    fn test_issue_deleted_serialization() {
        let msg = WsMessage::IssueDeleted { id: "bd-42".into() };
        let parsed: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(parsed["type"], "issue_deleted");
        assert_eq!(parsed["data"]["id"], "bd-42");
    }

    #[test]
    fn test_client_side_deserialization() {
        let raw = r#"{"type":"issue_updated","data":{"id":"bd-1","title":"Renamed","status":"closed"}}"#;
        match serde_json::from_str::<WsMessage>(raw).unwrap() {
            WsMessage::IssueUpdated(issue) => {
                assert_eq!(issue.title, "Renamed");
                assert_eq!(issue.status.as_str(), "closed");
            }
            other => panic!("Expected IssueUpdated, got {}", other.type_name()),
        }
        assert!(serde_json::from_str::<WsMessage>(r#"{"type":"bogus","data":null}"#).is_err());
    }

    #[test]
    fn test_type_names_match_wire_tags() {
        let msgs = [
            WsMessage::IssuesUpdated(Arc::new(vec![])),
            WsMessage::IssueCreated(Issue::new("a", "b")),
            WsMessage::IssueUpdated(Issue::new("a", "b")),
            WsMessage::IssueDeleted { id: "a".into() },
        ];
        for msg in msgs {
            let parsed: serde_json::Value = serde_json::to_value(&msg).unwrap();
            assert_eq!(parsed["type"], msg.type_name());
        }
    }

    /// A peer whose receive window never opens.
    struct StalledSink;

    impl futures_util::Sink<Message> for StalledSink {
        type Error = std::convert::Infallible;

        fn poll_ready(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Result<(), Self::Error>> {
            std::task::Poll::Pending
        }

        fn start_send(self: std::pin::Pin<&mut Self>, _item: Message) -> Result<(), Self::Error> {
            Ok(())
        }

        fn poll_flush(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Result<(), Self::Error>> {
            std::task::Poll::Pending
        }

        fn poll_close(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Result<(), Self::Error>> {
            std::task::Poll::Pending
        }
    }

    #[tokio::test]
    async fn test_stuck_write_gives_up() {
        let mut sink = StalledSink;
        let sent = send_with_timeout(
            &mut sink,
            Message::Text("{}".to_string().into()),
            Duration::from_millis(50),
        )
        .await;
        assert!(!sent);
    }

    #[tokio::test]
    async fn test_ready_write_succeeds() {
        let mut sink = futures_util::sink::drain::<Message>();
        assert!(send_with_timeout(&mut sink, Message::Ping(Bytes::new()), WRITE_TIMEOUT).await);
    }

    #[test]
    fn test_keepalive_constants() {
        assert!(PONG_TIMEOUT > PING_INTERVAL);
        assert_eq!(PING_INTERVAL, Duration::from_secs(30));
        assert_eq!(PONG_TIMEOUT, Duration::from_secs(60));
    }
}
