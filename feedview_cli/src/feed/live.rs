//! Live feed subscriber over WebSocket
//!
//! Owns at most one push connection. Each inbound text frame is decoded into
//! an entry and forwarded to the dispatch loop, tagged with the connection's
//! generation so the session can ignore anything from a connection it closed.

use super::transport::FeedEvent;
use anyhow::{Context, Result};
use feedview_common::{constants, Entry, LiveSubscribe};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Live feed connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
        }
    }
}

/// Parameters of one live connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveRequest {
    pub generation: u64,
    /// Entry id to resume after, or the live cursor
    pub from_cursor: String,
    pub query: String,
    pub initial_fetch_limit: u32,
    pub initial_fetch_timeout_ms: u64,
}

impl LiveRequest {
    fn subscribe_message(&self) -> LiveSubscribe {
        LiveSubscribe {
            left_off: self.from_cursor.clone(),
            query: self.query.clone(),
            fetch: self.initial_fetch_limit,
            timeout_ms: self.initial_fetch_timeout_ms,
        }
    }
}

/// What a live connection reports to the dispatch loop
#[derive(Debug, Clone)]
pub enum LiveEvent {
    Entry(Entry),
    /// Transport-level closure
    Closed,
}

/// Decode one push frame, dropping anything that is not an entry
pub fn decode_push_message(msg: &Message) -> Option<Entry> {
    let text = match msg {
        Message::Text(text) => text.as_str(),
        _ => return None,
    };

    if text.trim().is_empty() {
        return None;
    }

    match Entry::from_json(text) {
        Ok(entry) => Some(entry),
        Err(e) => {
            tracing::warn!("Dropping push message: {}", e);
            None
        }
    }
}

/// Maintains the push connection
pub struct LiveFeedSubscriber {
    url: String,
    events: mpsc::Sender<FeedEvent>,
    task: Option<JoinHandle<()>>,
}

impl LiveFeedSubscriber {
    /// `ws_base` is the WebSocket origin of the capture backend
    pub fn new(ws_base: &str, events: mpsc::Sender<FeedEvent>) -> Self {
        Self {
            url: format!("{}{}", ws_base.trim_end_matches('/'), constants::LIVE_PATH),
            events,
            task: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Open a new connection, replacing any current one
    pub fn open(&mut self, request: LiveRequest) {
        self.close();

        tracing::debug!(
            "Opening live feed #{} from {} (query {:?})",
            request.generation,
            request.from_cursor,
            request.query
        );

        let url = self.url.clone();
        let events = self.events.clone();
        self.task = Some(tokio::spawn(async move {
            let generation = request.generation;
            if let Err(e) = stream_entries(&url, &request, &events).await {
                tracing::warn!("Live feed #{} failed: {:#}", generation, e);
            }
            let _ = events
                .send(FeedEvent::Live {
                    generation,
                    event: LiveEvent::Closed,
                })
                .await;
        }));
    }

    /// Terminate the current connection; nothing more is delivered from it
    pub fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_open(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for LiveFeedSubscriber {
    fn drop(&mut self) {
        self.close();
    }
}

async fn stream_entries(
    url: &str,
    request: &LiveRequest,
    events: &mpsc::Sender<FeedEvent>,
) -> Result<()> {
    let (ws_stream, _) = connect_async(url)
        .await
        .with_context(|| format!("Failed to connect to {}", url))?;
    let (mut write, mut read) = ws_stream.split();

    let subscribe = request
        .subscribe_message()
        .to_json()
        .context("Failed to encode subscribe message")?;
    write
        .send(Message::Text(subscribe.into()))
        .await
        .context("Failed to send subscribe message")?;

    while let Some(msg) = read.next().await {
        let msg = msg.context("Live feed read failed")?;
        if let Message::Close(_) = msg {
            break;
        }

        if let Some(entry) = decode_push_message(&msg) {
            let event = FeedEvent::Live {
                generation: request.generation,
                event: LiveEvent::Entry(entry),
            };
            if events.send(event).await.is_err() {
                // Dispatch loop is gone
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::test_support::spawn_backend;
    use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
    use axum::{response::Response, routing::get, Router};
    use std::time::Duration;

    fn request(generation: u64) -> LiveRequest {
        LiveRequest {
            generation,
            from_cursor: "latest".to_string(),
            query: "http".to_string(),
            initial_fetch_limit: 5,
            initial_fetch_timeout_ms: 100,
        }
    }

    async fn next_event(rx: &mut mpsc::Receiver<FeedEvent>) -> (u64, LiveEvent) {
        match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Some(FeedEvent::Live { generation, event })) => (generation, event),
            other => panic!("Expected live event, got {:?}", other),
        }
    }

    async fn scripted(mut socket: WebSocket) {
        // First frame must be the subscribe message
        let subscribe = match socket.recv().await {
            Some(Ok(WsMessage::Text(text))) => text.as_str().to_string(),
            _ => return,
        };
        if !subscribe.contains(r#""leftOff":"latest""#) {
            return;
        }

        for frame in [
            "{not json",
            "",
            r#"{"id":"1","worker":"w","timestamp":1,"method":"GET"}"#,
            r#"{"id":"2","worker":"w","timestamp":2}"#,
        ] {
            let _ = socket.send(WsMessage::Text(frame.to_string().into())).await;
        }
        let _ = socket.send(WsMessage::Close(None)).await;
    }

    async fn scripted_handler(ws: WebSocketUpgrade) -> Response {
        ws.on_upgrade(scripted)
    }

    async fn endless(mut socket: WebSocket) {
        let mut n = 0u64;
        loop {
            n += 1;
            let frame = format!(r#"{{"id":"{}","worker":"w","timestamp":{}}}"#, n, n);
            if socket.send(WsMessage::Text(frame.into())).await.is_err() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn endless_handler(ws: WebSocketUpgrade) -> Response {
        ws.on_upgrade(endless)
    }

    #[test]
    fn test_decode_skips_non_entries() {
        assert!(decode_push_message(&Message::Text(String::new().into())).is_none());
        assert!(decode_push_message(&Message::Text("[1,2]".to_string().into())).is_none());
        assert!(decode_push_message(&Message::Ping(Vec::new().into())).is_none());

        let entry = decode_push_message(&Message::Text(r#"{"id":"a","worker":"w"}"#.to_string().into()));
        assert_eq!(entry.map(|e| e.id), Some("a".to_string()));
    }

    #[tokio::test]
    async fn test_malformed_frames_do_not_end_the_stream() {
        let addr = spawn_backend(Router::new().route("/ws", get(scripted_handler))).await;
        let (tx, mut rx) = mpsc::channel(16);
        let mut live = LiveFeedSubscriber::new(&format!("ws://{}/", addr), tx);
        assert_eq!(live.url(), format!("ws://{}/ws", addr));

        live.open(request(7));

        let (generation, first) = next_event(&mut rx).await;
        assert_eq!(generation, 7);
        assert!(matches!(first, LiveEvent::Entry(ref e) if e.id == "1"));

        let (_, second) = next_event(&mut rx).await;
        assert!(matches!(second, LiveEvent::Entry(ref e) if e.id == "2"));

        let (_, closed) = next_event(&mut rx).await;
        assert!(matches!(closed, LiveEvent::Closed));
    }

    #[tokio::test]
    async fn test_close_stops_delivery() {
        let addr = spawn_backend(Router::new().route("/ws", get(endless_handler))).await;
        let (tx, mut rx) = mpsc::channel(256);
        let mut live = LiveFeedSubscriber::new(&format!("ws://{}", addr), tx);

        live.open(request(1));
        let (_, event) = next_event(&mut rx).await;
        assert!(matches!(event, LiveEvent::Entry(_)));

        live.close();
        assert!(!live.is_open());

        tokio::time::sleep(Duration::from_millis(100)).await;
        while rx.try_recv().is_ok() {}
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unreachable_backend_reports_closed() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut live = LiveFeedSubscriber::new("ws://127.0.0.1:9", tx);
        live.open(request(3));

        let (generation, event) = next_event(&mut rx).await;
        assert_eq!(generation, 3);
        assert!(matches!(event, LiveEvent::Closed));
    }
}
