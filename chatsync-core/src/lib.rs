//! # chatsync-core: room synchronization state
//!
//! Keeps one chat room's history, the current user's read receipts and
//! per-message viewer presence consistent across three feeds: a history
//! snapshot, an unseen-message query and a push event stream.
//!
//! ## Architecture
//!
//! ```text
//!  snapshot ─┐                         ┌─► MessageStore   (ordered, dedup by id)
//!  unseen  ──┼─► RoomSession ──────────┼─► SeenTracker    (acknowledge cycle)
//!  stream  ──┘   (state machine)       └─► ViewerPresence (who saw what)
//!                     │
//!                     ├─► Effect      (work for the runtime: fetch, ack, close…)
//!                     └─► RoomView    (rendering-ready state)
//! ```
//!
//! Nothing in this crate performs I/O. The runtime in `chatsync-client`
//! executes [`Effect`]s and feeds results back as [`Completion`]s.
//!
//! ## Modules
//!
//! - [`model`]: wire data model (messages, users, rooms)
//! - [`event`]: push-channel payload decoding
//! - [`store`]: ordered, deduplicated message history
//! - [`seen`]: unseen ids and acknowledgement batches
//! - [`presence`]: per-message viewer sets
//! - [`session`]: the room session state machine
//! - [`view`]: rendering snapshot

pub mod error;
pub mod event;
pub mod model;
pub mod presence;
pub mod seen;
pub mod session;
pub mod store;
pub mod view;

pub use error::{Result, SyncError};
pub use event::{StreamEvent, ViewerUpdate};
pub use model::{Message, MessageId, NewMessage, RoomId, RoomRef, UserId, UserInfo};
pub use presence::{ViewerPresence, ViewerSet};
pub use seen::{AckBatch, SeenTracker};
pub use session::{ChannelStatus, Completion, Effect, Phase, RoomSession, SessionId};
pub use store::{Append, MessageStore, Messages};
pub use view::{MessageView, Receipt, RoomView, ViewerList};
