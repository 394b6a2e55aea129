//! Client end of the `/ws` push channel.
//!
//! One connection per session and no reconnect: when the socket goes away
//! the session shows "disconnected" until it is restarted.

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::errors::ClientError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    Opened,
    /// A raw text frame, parsed later by the session.
    Frame(String),
    Closed,
}

/// Connect to `url` and forward socket events to `events` until the
/// connection ends. [`PushEvent::Closed`] is always the last event sent,
/// including when the connection could not be opened.
pub async fn listen(url: &str, events: mpsc::UnboundedSender<PushEvent>) -> Result<(), ClientError> {
    let push_err = |source| ClientError::Push {
        url: url.to_string(),
        source,
    };

    let mut stream = match connect_async(url).await {
        Ok((stream, _response)) => stream,
        Err(source) => {
            warn!(url, error = %source, "Push connection failed");
            let _ = events.send(PushEvent::Closed);
            return Err(push_err(source));
        }
    };
    info!(url, "Push connection open");
    let _ = events.send(PushEvent::Opened);

    let result = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                if events.send(PushEvent::Frame(text.to_string())).is_err() {
                    // Nobody is listening any more.
                    break Ok(());
                }
            }
            Some(Ok(Message::Close(_))) | None => break Ok(()),
            // Pings are answered by tungstenite while reading.
            Some(Ok(other)) => debug!(kind = ?other, "ignoring non-text frame"),
            Some(Err(source)) => {
                warn!(url, error = %source, "Push connection error");
                break Err(push_err(source));
            }
        }
    };

    info!(url, "Push connection closed");
    let _ = events.send(PushEvent::Closed);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_refused_connection_reports_closed() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let result = listen(&format!("ws://127.0.0.1:{}/ws", port), tx).await;

        assert!(matches!(result, Err(ClientError::Push { .. })));
        assert_eq!(rx.recv().await, Some(PushEvent::Closed));
        assert_eq!(rx.recv().await, None);
    }
}
