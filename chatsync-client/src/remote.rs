//! Request/response adapter for the remote chat service.
//!
//! Endpoints (every call carries `Authorization: Bearer <token>`):
//!
//! ```text
//! GET  /message/{room}                              history
//! GET  /message/{room}/{user}/unseenMessages        unseen messages
//! POST /message/{room}/{user}/markseen   [ids]      acknowledge
//! GET  /message/{room}/{message}/{user}/viewers     viewers
//! POST /message                          {..}       send
//! PUT  /join/{user}/{room}                          mark inactive
//! ```
//!
//! No logic beyond framing: status and transport failures are mapped to
//! [`SyncError`] and handed back to the session.

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use chatsync_core::{Message, MessageId, NewMessage, Result, RoomId, SyncError, UserInfo};

use crate::config::SyncConfig;
use crate::identity::Identity;

/// Calls the room session needs from the remote service.
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Full history of a room, ordered by time.
    async fn fetch_history(&self, identity: &Identity, room: RoomId) -> Result<Vec<Message>>;

    /// Ids of the room's messages the user has not seen.
    async fn fetch_unseen(&self, identity: &Identity, room: RoomId) -> Result<Vec<MessageId>>;

    /// Mark messages seen. Idempotent on the remote side.
    async fn mark_seen(&self, identity: &Identity, room: RoomId, ids: &[MessageId]) -> Result<()>;

    /// Users recorded as having seen a message.
    async fn fetch_viewers(&self, identity: &Identity, room: RoomId, message: MessageId) -> Result<Vec<UserInfo>>;

    async fn send_message(&self, identity: &Identity, message: &NewMessage) -> Result<()>;

    /// Tell the service the user left the room.
    async fn mark_inactive(&self, identity: &Identity, room: RoomId) -> Result<()>;
}

/// [`RemoteService`] over HTTP/JSON.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
    base_url: String,
}

/// The unseen endpoint returns whole messages; only the id is needed.
#[derive(Deserialize)]
struct UnseenEntry {
    id: MessageId,
}

impl HttpRemote {
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(transport_error)?;
        Ok(Self::with_client(client, config.base()))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorized(&self, builder: RequestBuilder, identity: &Identity) -> RequestBuilder {
        builder.header(header::AUTHORIZATION, identity.credential().bearer())
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(SyncError::from_status(status.as_u16()))
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, identity: &Identity, path: &str) -> Result<T> {
        let request = self.authorized(self.client.get(self.url(path)), identity);
        let body = self.send(request).await?.bytes().await.map_err(transport_error)?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl RemoteService for HttpRemote {
    async fn fetch_history(&self, identity: &Identity, room: RoomId) -> Result<Vec<Message>> {
        self.get_json(identity, &format!("/message/{room}")).await
    }

    async fn fetch_unseen(&self, identity: &Identity, room: RoomId) -> Result<Vec<MessageId>> {
        let path = format!("/message/{room}/{}/unseenMessages", identity.user_id());
        let entries: Vec<UnseenEntry> = self.get_json(identity, &path).await?;
        Ok(entries.into_iter().map(|entry| entry.id).collect())
    }

    async fn mark_seen(&self, identity: &Identity, room: RoomId, ids: &[MessageId]) -> Result<()> {
        let url = self.url(&format!("/message/{room}/{}/markseen", identity.user_id()));
        let request = self.authorized(self.client.post(url), identity).json(ids);
        self.send(request).await?;
        Ok(())
    }

    async fn fetch_viewers(&self, identity: &Identity, room: RoomId, message: MessageId) -> Result<Vec<UserInfo>> {
        let path = format!("/message/{room}/{message}/{}/viewers", identity.user_id());
        self.get_json(identity, &path).await
    }

    async fn send_message(&self, identity: &Identity, message: &NewMessage) -> Result<()> {
        let request = self.authorized(self.client.post(self.url("/message")), identity).json(message);
        self.send(request).await?;
        Ok(())
    }

    async fn mark_inactive(&self, identity: &Identity, room: RoomId) -> Result<()> {
        let url = self.url(&format!("/join/{}/{room}", identity.user_id()));
        let request = self
            .authorized(self.client.put(url), identity)
            .json(&serde_json::json!({}));
        self.send(request).await?;
        Ok(())
    }
}

/// Map a `reqwest` failure onto the sync error taxonomy.
pub(crate) fn transport_error(err: reqwest::Error) -> SyncError {
    if err.is_timeout() {
        SyncError::Timeout
    } else if err.is_decode() {
        SyncError::Decode(err.to_string())
    } else if let Some(status) = err.status() {
        SyncError::from_status(status.as_u16())
    } else {
        SyncError::Network(err.to_string())
    }
}
