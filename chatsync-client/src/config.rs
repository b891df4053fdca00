//! Client configuration.

use std::time::Duration;

/// How the push channel is carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushKind {
    /// `text/event-stream` over plain HTTP.
    Sse,
    /// JSON text frames over a WebSocket.
    WebSocket,
}

impl std::str::FromStr for PushKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sse" => Ok(Self::Sse),
            "ws" | "websocket" => Ok(Self::WebSocket),
            other => Err(format!("unknown push transport `{other}` (expected sse or ws)")),
        }
    }
}

/// Sync client configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the remote service (`http://` or `https://`)
    pub base_url: String,
    /// Push channel transport
    pub push: PushKind,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// Viewer fetches allowed in flight at once per session
    pub viewer_fetch_concurrency: usize,
    /// Push events buffered between the reader task and the session
    pub event_channel_capacity: usize,
    /// How long leaving a room may take before the session task is aborted
    pub shutdown_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            push: PushKind::Sse,
            request_timeout_secs: 10,
            viewer_fetch_concurrency: 8,
            event_channel_capacity: 256,
            shutdown_timeout_secs: 2,
        }
    }
}

impl SyncConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn viewer_fetch_concurrency(&self) -> usize {
        self.viewer_fetch_concurrency.max(1)
    }

    pub fn event_channel_capacity(&self) -> usize {
        self.event_channel_capacity.max(1)
    }

    /// Base URL without a trailing slash.
    pub fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.push, PushKind::Sse);
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.viewer_fetch_concurrency(), 8);
    }

    #[test]
    fn test_zero_limits_clamped() {
        let config = SyncConfig {
            viewer_fetch_concurrency: 0,
            event_channel_capacity: 0,
            ..SyncConfig::default()
        };
        assert_eq!(config.viewer_fetch_concurrency(), 1);
        assert_eq!(config.event_channel_capacity(), 1);
    }

    #[test]
    fn test_base_strips_trailing_slash() {
        let config = SyncConfig::new("https://chat.example.com/");
        assert_eq!(config.base(), "https://chat.example.com");
    }

    #[test]
    fn test_push_kind_parse() {
        assert_eq!("sse".parse::<PushKind>(), Ok(PushKind::Sse));
        assert_eq!("WS".parse::<PushKind>(), Ok(PushKind::WebSocket));
        assert_eq!("websocket".parse::<PushKind>(), Ok(PushKind::WebSocket));
        assert!("carrier-pigeon".parse::<PushKind>().is_err());
    }
}
