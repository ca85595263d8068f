//! Server-pushed events.
//!
//! Every payload struct tolerates missing optional fields (zero/empty value).
//! Fields without `#[serde(default)]` are required: a frame with a known
//! discriminator that lacks them is a decode error, not an `Unknown` event.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// Typed inbound event.
#[derive(Debug, Clone)]
pub enum RtmEvent {
    /// Session established; first frame of every connection.
    Hello,
    PresenceChange(PresenceChangeEvent),
    ManualPresenceChange(ManualPresenceChangeEvent),
    UserTyping(UserTypingEvent),
    PrefChange(PrefChangeEvent),
    UserChange(UserChangeEvent),
    BotAdded(BotEvent),
    BotChanged(BotEvent),
    EmailDomainChanged(EmailDomainChangedEvent),
    EmojiChanged(WorkspaceChangeEvent),
    CommandsChanged(WorkspaceChangeEvent),
    AccountsChanged,
    /// Replacement address for future reconnects.
    ReconnectUrl(ReconnectUrlEvent),
    Message(MessageEvent),
    DesktopNotification(DesktopNotificationEvent),
    /// Discriminator absent or not registered. Never an error.
    Unknown {
        event_type: Option<String>,
        raw: Box<RawValue>,
    },
}

impl RtmEvent {
    /// Wire discriminator of this event, if it has one.
    pub fn event_type(&self) -> Option<&str> {
        let t = match self {
            RtmEvent::Hello => "hello",
            RtmEvent::PresenceChange(_) => "presence_change",
            RtmEvent::ManualPresenceChange(_) => "manual_presence_change",
            RtmEvent::UserTyping(_) => "user_typing",
            RtmEvent::PrefChange(_) => "pref_change",
            RtmEvent::UserChange(_) => "user_change",
            RtmEvent::BotAdded(_) => "bot_added",
            RtmEvent::BotChanged(_) => "bot_changed",
            RtmEvent::EmailDomainChanged(_) => "email_domain_changed",
            RtmEvent::EmojiChanged(_) => "emoji_changed",
            RtmEvent::CommandsChanged(_) => "commands_changed",
            RtmEvent::AccountsChanged => "accounts_changed",
            RtmEvent::ReconnectUrl(_) => "reconnect_url",
            RtmEvent::Message(_) => "message",
            RtmEvent::DesktopNotification(_) => "desktop_notification",
            RtmEvent::Unknown { event_type, .. } => return event_type.as_deref(),
        };
        Some(t)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, RtmEvent::Unknown { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PresenceChangeEvent {
    pub user: String,
    #[serde(default)]
    pub presence: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ManualPresenceChangeEvent {
    #[serde(default)]
    pub presence: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserTypingEvent {
    pub user: String,
    pub channel: String,
}

/// A user preference changed. The value's shape depends on the preference,
/// so it stays raw until the receiver asks for a concrete type.
#[derive(Debug, Clone, Deserialize)]
pub struct PrefChangeEvent {
    pub name: String,
    #[serde(default)]
    pub value: Option<Box<RawValue>>,
}

impl PrefChangeEvent {
    /// Decode the deferred value. `Ok(None)` when the frame carried none.
    pub fn value_as<T: DeserializeOwned>(&self) -> serde_json::Result<Option<T>> {
        self.value
            .as_deref()
            .map(|raw| serde_json::from_str(raw.get()))
            .transpose()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub real_name: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub tz: Option<String>,
    /// Profile fields vary by workspace; kept as generic JSON.
    #[serde(default)]
    pub profile: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UserChangeEvent {
    pub user: User,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bot {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub icons: HashMap<String, String>,
}

/// Shared by `bot_added` and `bot_changed`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BotEvent {
    pub bot: Bot,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EmailDomainChangedEvent {
    #[serde(default)]
    pub event_ts: String,
    #[serde(default)]
    pub email_domain: String,
}

/// Workspace metadata change that only carries the server event timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorkspaceChangeEvent {
    #[serde(default)]
    pub event_ts: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReconnectUrlEvent {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MessageEvent {
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub ts: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub thread_ts: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DesktopNotificationEvent {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default, rename = "launchUri")]
    pub launch_uri: String,
    #[serde(default, rename = "avatarImage")]
    pub avatar_image: String,
    #[serde(default, rename = "ssbFilename")]
    pub ssb_filename: String,
    #[serde(default)]
    pub event_ts: String,
    #[serde(default)]
    pub is_shared: bool,
    /// Either a URL string or `null`/absent depending on the client.
    #[serde(default, rename = "imageUri")]
    pub image_uri: Option<Box<RawValue>>,
}
