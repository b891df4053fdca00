//! # chatsync-client: network runtime for room sync
//!
//! Runs [`chatsync_core::RoomSession`]s against a remote chat service:
//!
//! ```text
//!          ┌──────────── RoomSync ────────────┐
//!  host ──►│ enter_room / leave_room / logout │
//!          └───────────────┬──────────────────┘
//!                          │ spawns one task per room
//!                          ▼
//!   RoomHandle ◄──watch── SessionDriver ──► RemoteService (HTTP/JSON)
//!                                       ◄── PushTransport (SSE | WebSocket)
//! ```
//!
//! ## Modules
//!
//! - [`config`]: client settings
//! - [`identity`]: user and bearer credential
//! - [`remote`]: request/response calls
//! - [`sse`]: event-stream framing
//! - [`push`]: push channel transports
//! - [`controller`]: room lifecycle and the per-session task

pub mod config;
pub mod controller;
pub mod identity;
pub mod push;
pub mod remote;
pub mod sse;

pub use config::{PushKind, SyncConfig};
pub use controller::{RoomHandle, RoomSync};
pub use identity::{Credential, Identity};
pub use push::{push_transport, PushSubscription, PushTransport, SsePush, WebSocketPush};
pub use remote::{HttpRemote, RemoteService};
pub use sse::SseDecoder;
