//! Push channel transports.
//!
//! A [`PushTransport`] opens a per-room subscription. A reader task decodes
//! frames into [`StreamEvent`]s and forwards them over a bounded channel;
//! the channel closing means the connection is gone.
//!
//! | Transport          | Path                          | Framing                  |
//! |--------------------|-------------------------------|--------------------------|
//! | [`SsePush`]        | `/message/sse/room/{room}`    | `data:` lines            |
//! | [`WebSocketPush`]  | `/message/ws/room/{room}`     | one JSON text per frame  |

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use log::{debug, info, warn};
use reqwest::{header, Client};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};

use chatsync_core::{Result, RoomId, StreamEvent, SyncError};

use crate::config::{PushKind, SyncConfig};
use crate::identity::Identity;
use crate::remote::transport_error;
use crate::sse::SseDecoder;

/// An open push subscription. Dropping it stops the reader task.
pub struct PushSubscription {
    events: mpsc::Receiver<StreamEvent>,
    reader: Option<JoinHandle<()>>,
}

impl PushSubscription {
    pub fn new(events: mpsc::Receiver<StreamEvent>, reader: JoinHandle<()>) -> Self {
        Self {
            events,
            reader: Some(reader),
        }
    }

    /// Subscription fed by a caller-owned sender, with no reader task.
    pub fn from_receiver(events: mpsc::Receiver<StreamEvent>) -> Self {
        Self { events, reader: None }
    }

    /// Next event, or `None` once the connection is gone.
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    pub fn close(&mut self) {
        self.events.close();
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

impl Drop for PushSubscription {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

impl fmt::Debug for PushSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushSubscription")
            .field("has_reader", &self.reader.is_some())
            .finish()
    }
}

#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Open the room's push channel. Resolves once the channel is established.
    async fn subscribe(&self, identity: &Identity, room: RoomId) -> Result<PushSubscription>;
}

/// Build the transport selected by the config.
pub fn push_transport(config: &SyncConfig) -> Result<Arc<dyn PushTransport>> {
    Ok(match config.push {
        PushKind::Sse => Arc::new(SsePush::new(config)?),
        PushKind::WebSocket => Arc::new(WebSocketPush::new(config)),
    })
}

// ─── Server-sent events ─────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SsePush {
    client: Client,
    base_url: String,
    capacity: usize,
}

impl SsePush {
    pub fn new(config: &SyncConfig) -> Result<Self> {
        // The stream stays open indefinitely: only the connect is bounded.
        let client = Client::builder()
            .connect_timeout(config.request_timeout())
            .build()
            .map_err(transport_error)?;
        Ok(Self {
            client,
            base_url: config.base().to_string(),
            capacity: config.event_channel_capacity(),
        })
    }
}

#[async_trait]
impl PushTransport for SsePush {
    async fn subscribe(&self, identity: &Identity, room: RoomId) -> Result<PushSubscription> {
        let url = format!("{}/message/sse/room/{room}", self.base_url);
        let response = self
            .client
            .get(url)
            .header(header::AUTHORIZATION, identity.credential().bearer())
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::from_status(status.as_u16()));
        }

        info!("room {room}: event stream open");
        let (tx, rx) = mpsc::channel(self.capacity);
        let reader = tokio::spawn(forward_sse(response.bytes_stream(), tx, room));
        Ok(PushSubscription::new(rx, reader))
    }
}

/// Decode an SSE byte stream into events until it ends or the receiver goes away.
pub async fn forward_sse<S, B, E>(stream: S, events: mpsc::Sender<StreamEvent>, room: RoomId)
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: fmt::Display,
{
    futures_util::pin_mut!(stream);
    let mut decoder = SseDecoder::new();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                warn!("room {room}: event stream read failed: {err}");
                break;
            }
        };
        for payload in decoder.push(chunk.as_ref()) {
            if !forward_payload(&payload, &events, room).await {
                return;
            }
        }
    }
    info!("room {room}: event stream ended");
}

// ─── WebSocket ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct WebSocketPush {
    base_url: String,
    capacity: usize,
}

impl WebSocketPush {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            base_url: config.base().to_string(),
            capacity: config.event_channel_capacity(),
        }
    }

    fn room_url(&self, room: RoomId) -> String {
        let base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.base_url.clone()
        };
        format!("{base}/message/ws/room/{room}")
    }
}

#[async_trait]
impl PushTransport for WebSocketPush {
    async fn subscribe(&self, identity: &Identity, room: RoomId) -> Result<PushSubscription> {
        let mut request = self
            .room_url(room)
            .into_client_request()
            .map_err(ws_error)?;
        let bearer = HeaderValue::from_str(&identity.credential().bearer())
            .map_err(|err| SyncError::Network(format!("invalid credential header: {err}")))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (ws_stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(ws_error)?;

        info!("room {room}: websocket open");
        let (tx, rx) = mpsc::channel(self.capacity);
        let reader = tokio::spawn(forward_frames(ws_stream, tx, room));
        Ok(PushSubscription::new(rx, reader))
    }
}

/// Forward WebSocket text frames as events until close, error or receiver drop.
pub async fn forward_frames<S>(mut stream: S, events: mpsc::Sender<StreamEvent>, room: RoomId)
where
    S: Stream<Item = std::result::Result<WsMessage, WsError>> + Unpin,
{
    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(WsMessage::Text(text)) => text.as_str().to_owned(),
            Ok(WsMessage::Binary(data)) => match String::from_utf8(data.to_vec()) {
                Ok(text) => text,
                Err(_) => {
                    warn!("room {room}: non-UTF-8 binary frame skipped");
                    continue;
                }
            },
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue,
            Err(err) => {
                warn!("room {room}: websocket read failed: {err}");
                break;
            }
        };

        if !forward_payload(&text, &events, room).await {
            return;
        }
    }
    info!("room {room}: websocket closed");
}

fn ws_error(err: WsError) -> SyncError {
    match err {
        WsError::Http(response) => SyncError::from_status(response.status().as_u16()),
        other => SyncError::Network(other.to_string()),
    }
}

/// Decode and forward one payload. Returns false once nobody is listening.
async fn forward_payload(payload: &str, events: &mpsc::Sender<StreamEvent>, room: RoomId) -> bool {
    match StreamEvent::decode(payload) {
        Ok(event) => {
            debug!("room {room}: push event for message {}", event.message_id());
            events.send(event).await.is_ok()
        }
        Err(err) => {
            warn!("room {room}: undecodable push event skipped: {err}");
            true
        }
    }
}
