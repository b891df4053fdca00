//! Terminal front end for chatsync.
//!
//! Joins one room and mirrors it on stdout. Every input line counts as
//! activity in the room.
//!
//! | Input            | Effect                              |
//! |------------------|-------------------------------------|
//! | any text         | send it as a message                |
//! | `/viewers <id>`  | show or hide who has seen a message |
//! | `/leave`         | leave the room and exit             |
//!
//! Settings come from `CHATSYNC_*` environment variables; `RUST_LOG`
//! controls logging.

use std::collections::{HashMap, HashSet};
use std::env;
use std::error::Error;

use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};

use chatsync_client::{Credential, Identity, PushKind, RoomSync, SyncConfig};
use chatsync_core::{
    ChannelStatus, MessageId, MessageView, Receipt, RoomRef, RoomView, SyncError, UserInfo,
    ViewerList,
};

// ─── Settings ───────────────────────────────────────────────────────

struct Settings {
    config: SyncConfig,
    identity: Identity,
    room: RoomRef,
}

impl Settings {
    fn from_env() -> Result<Self, String> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let required = |name: &str| lookup(name).ok_or_else(|| format!("{name} is not set"));
        let number = |name: &str| -> Result<i64, String> {
            required(name)?
                .trim()
                .parse()
                .map_err(|err| format!("{name}: {err}"))
        };

        let mut config = SyncConfig::default();
        if let Some(url) = lookup("CHATSYNC_URL") {
            config.base_url = url;
        }
        if let Some(push) = lookup("CHATSYNC_PUSH") {
            config.push = push.parse::<PushKind>()?;
        }

        let user_id = number("CHATSYNC_USER_ID")?;
        let user_name = lookup("CHATSYNC_USER_NAME").unwrap_or_else(|| format!("user{user_id}"));
        let identity = Identity::new(
            UserInfo::new(user_id, user_name),
            Credential::new(required("CHATSYNC_TOKEN")?),
        );

        let room_id = number("CHATSYNC_ROOM_ID")?;
        let room = RoomRef::new(room_id, lookup("CHATSYNC_ROOM_LABEL").unwrap_or_default());

        Ok(Self {
            config,
            identity,
            room,
        })
    }
}

// ─── Input ──────────────────────────────────────────────────────────

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Blank,
    Leave,
    Viewers(MessageId),
    Text(String),
    Unknown(String),
}

impl Input {
    fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Self::Blank;
        }
        if trimmed == "/leave" {
            return Self::Leave;
        }
        if let Some(arg) = trimmed.strip_prefix("/viewers") {
            return match arg.trim().trim_start_matches('#').parse() {
                Ok(id) => Self::Viewers(MessageId(id)),
                Err(_) => Self::Unknown(trimmed.to_string()),
            };
        }
        if trimmed.starts_with('/') {
            return Self::Unknown(trimmed.to_string());
        }
        Self::Text(line.to_string())
    }
}

// ─── Output ─────────────────────────────────────────────────────────

/// Prints what changed between two views.
#[derive(Default)]
struct Printer {
    shown: HashSet<MessageId>,
    receipts: HashMap<MessageId, Receipt>,
    channel: Option<ChannelStatus>,
    anchor: Option<MessageId>,
    viewer_list: Option<ViewerList>,
    error: Option<SyncError>,
}

impl Printer {
    fn render(&mut self, view: &RoomView) -> Vec<String> {
        let mut lines = Vec::new();

        if self.channel != Some(view.channel) {
            self.channel = Some(view.channel);
            lines.push(format!("-- push channel {}", channel_label(view.channel)));
        }

        for message in &view.messages {
            if self.shown.insert(message.id) {
                lines.push(format_message(message));
                if let Some(receipt) = message.receipt {
                    self.receipts.insert(message.id, receipt);
                }
            } else if let Some(receipt) = message.receipt {
                if self.receipts.insert(message.id, receipt) != Some(receipt) {
                    lines.push(format!("   #{} {}", message.id, receipt_label(receipt)));
                }
            }
        }

        if view.scroll_anchor.is_some() && view.scroll_anchor != self.anchor {
            self.anchor = view.scroll_anchor;
            if let Some(anchor) = self.anchor {
                lines.push(format!("-- {} unread, oldest #{anchor}", view.unseen));
            }
        }

        if view.viewer_list != self.viewer_list {
            self.viewer_list = view.viewer_list.clone();
            if let Some(list) = &self.viewer_list {
                let names: Vec<&str> = list.viewers.iter().map(|v| v.display_name.as_str()).collect();
                lines.push(format!("   seen #{} by: {}", list.message_id, names.join(", ")));
            }
        }

        if view.error.is_some() && view.error != self.error {
            self.error = view.error.clone();
            if let Some(err) = &self.error {
                lines.push(format!("!! {err}"));
            }
        }

        lines
    }
}

fn format_message(message: &MessageView) -> String {
    let mut line = format!(
        "[{}] {}: {}  (#{})",
        message.created_at.format("%H:%M"),
        message.author.display_name,
        message.body,
        message.id
    );
    if let Some(receipt) = message.receipt {
        line.push(' ');
        line.push_str(&receipt_label(receipt));
    }
    line
}

fn receipt_label(receipt: Receipt) -> String {
    match receipt {
        Receipt::Unread => "✓".to_string(),
        Receipt::Read { viewers } => format!("✓✓ {viewers}"),
    }
}

fn channel_label(status: ChannelStatus) -> &'static str {
    match status {
        ChannelStatus::Closed => "closed",
        ChannelStatus::Opening => "opening",
        ChannelStatus::Open => "open",
        ChannelStatus::Dropped => "dropped (re-enter the room to resync)",
        ChannelStatus::Failed => "failed to open",
    }
}

// ─── Main ───────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let settings = Settings::from_env()?;
    info!(
        "joining room {} as {} via {}",
        settings.room.id,
        settings.identity.user().display_name,
        settings.config.base()
    );

    let mut sync = RoomSync::connect(settings.identity, settings.config)?;
    let mut handle = sync.enter_room(settings.room).await?;
    let mut printer = Printer::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                handle.notify_activity();
                match Input::parse(&line) {
                    Input::Blank => {}
                    Input::Leave => break,
                    Input::Viewers(id) => handle.toggle_viewers(id),
                    Input::Text(body) => {
                        if let Err(err) = handle.send_message(body.as_str()).await {
                            eprintln!("!! not sent ({err}); draft kept: {body}");
                        }
                    }
                    Input::Unknown(command) => eprintln!("!! unknown command: {command}"),
                }
            }
            view = handle.changed() => match view {
                Ok(view) => {
                    for line in printer.render(&view) {
                        println!("{line}");
                    }
                }
                Err(err) => {
                    warn!("room session ended: {err}");
                    break;
                }
            },
        }
    }

    sync.logout().await;
    Ok(())
}
