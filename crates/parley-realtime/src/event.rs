//! Real-time event types.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// A server-pushed event, decoded from a transport frame.
///
/// Exactly one [`EventKind`] per event. Payload fields are only populated as
/// relevant to that kind, so every payload accessor is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event kind tag.
    #[serde(rename = "type")]
    pub kind: EventKind,

    /// Composite channel id (`type:id`) the event belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,

    /// Message payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,

    /// User who triggered the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,

    /// Reaction payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reaction: Option<Reaction>,

    /// Member payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member: Option<Member>,

    /// Channel payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<ChannelData>,

    /// Number of users watching the channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watcher_count: Option<u32>,

    /// Connection status for `connection.changed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub online: Option<bool>,

    /// Connection id assigned by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,

    /// The connected user, sent with health checks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub me: Option<User>,

    /// Server timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl Event {
    /// Create an event with only its kind set.
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            cid: None,
            message: None,
            user: None,
            reaction: None,
            member: None,
            channel: None,
            watcher_count: None,
            online: None,
            connection_id: None,
            me: None,
            created_at: None,
        }
    }

    /// Decode an event from a JSON transport frame.
    pub fn from_json(frame: &str) -> Result<Self> {
        Ok(serde_json::from_str(frame)?)
    }

    /// Encode the event as JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Set the composite channel id.
    pub fn with_cid(mut self, cid: impl Into<String>) -> Self {
        self.cid = Some(cid.into());
        self
    }

    /// Set the message payload.
    pub fn with_message(mut self, message: Message) -> Self {
        self.message = Some(message);
        self
    }

    /// Set the user payload.
    pub fn with_user(mut self, user: User) -> Self {
        self.user = Some(user);
        self
    }

    /// Set the reaction payload.
    pub fn with_reaction(mut self, reaction: Reaction) -> Self {
        self.reaction = Some(reaction);
        self
    }

    /// Set the member payload.
    pub fn with_member(mut self, member: Member) -> Self {
        self.member = Some(member);
        self
    }

    /// Set the channel payload.
    pub fn with_channel(mut self, channel: ChannelData) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Set the watcher count.
    pub fn with_watcher_count(mut self, count: u32) -> Self {
        self.watcher_count = Some(count);
        self
    }

    /// Set the online flag.
    pub fn with_online(mut self, online: bool) -> Self {
        self.online = Some(online);
        self
    }

    /// Set the connection id.
    pub fn with_connection_id(mut self, connection_id: impl Into<String>) -> Self {
        self.connection_id = Some(connection_id.into());
        self
    }

    /// Set the connected user.
    pub fn with_me(mut self, me: User) -> Self {
        self.me = Some(me);
        self
    }

    /// The user this event carries, preferring `user` over `me`.
    pub fn acting_user(&self) -> Option<&User> {
        self.user.as_ref().or(self.me.as_ref())
    }
}

/// Event kind tag.
///
/// Tags the client does not know are kept verbatim in [`EventKind::Unknown`];
/// parsing a tag never fails.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    /// Keepalive; the first one after connecting carries the connection id.
    HealthCheck,
    /// New message in a channel.
    MessageNew,
    /// Message edited.
    MessageUpdated,
    /// Message deleted.
    MessageDeleted,
    /// Channel marked read by a user.
    MessageRead,
    /// Reaction added to a message.
    ReactionNew,
    /// Reaction removed from a message.
    ReactionDeleted,
    /// User started typing.
    TypingStart,
    /// User stopped typing.
    TypingStop,
    /// User went online or offline.
    UserPresenceChanged,
    /// User profile changed.
    UserUpdated,
    /// User started watching a channel.
    UserWatchingStart,
    /// User stopped watching a channel.
    UserWatchingStop,
    /// Member joined a channel.
    MemberAdded,
    /// Member role or state changed.
    MemberUpdated,
    /// Member left a channel.
    MemberRemoved,
    /// Channel data changed.
    ChannelUpdated,
    /// Channel deleted.
    ChannelDeleted,
    /// New message in a channel the user is a member of but not watching.
    NotificationMessageNew,
    /// Read state changed for the current user.
    NotificationMarkRead,
    /// Current user added to a channel.
    NotificationAddedToChannel,
    /// Current user removed from a channel.
    NotificationRemovedFromChannel,
    /// Local connection status changed.
    ConnectionChanged,
    /// Connection restored after an interruption.
    ConnectionRecovered,
    /// Any tag this client does not recognise.
    Unknown(String),
}

impl EventKind {
    /// Parse a wire tag.
    pub fn parse(tag: &str) -> Self {
        match tag {
            "health.check" => EventKind::HealthCheck,
            "message.new" => EventKind::MessageNew,
            "message.updated" => EventKind::MessageUpdated,
            "message.deleted" => EventKind::MessageDeleted,
            "message.read" => EventKind::MessageRead,
            "reaction.new" => EventKind::ReactionNew,
            "reaction.deleted" => EventKind::ReactionDeleted,
            "typing.start" => EventKind::TypingStart,
            "typing.stop" => EventKind::TypingStop,
            "user.presence.changed" => EventKind::UserPresenceChanged,
            "user.updated" => EventKind::UserUpdated,
            "user.watching.start" => EventKind::UserWatchingStart,
            "user.watching.stop" => EventKind::UserWatchingStop,
            "member.added" => EventKind::MemberAdded,
            "member.updated" => EventKind::MemberUpdated,
            "member.removed" => EventKind::MemberRemoved,
            "channel.updated" => EventKind::ChannelUpdated,
            "channel.deleted" => EventKind::ChannelDeleted,
            "notification.message_new" => EventKind::NotificationMessageNew,
            "notification.mark_read" => EventKind::NotificationMarkRead,
            "notification.added_to_channel" => EventKind::NotificationAddedToChannel,
            "notification.removed_from_channel" => EventKind::NotificationRemovedFromChannel,
            "connection.changed" => EventKind::ConnectionChanged,
            "connection.recovered" => EventKind::ConnectionRecovered,
            other => EventKind::Unknown(other.to_string()),
        }
    }

    /// The wire tag.
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::HealthCheck => "health.check",
            EventKind::MessageNew => "message.new",
            EventKind::MessageUpdated => "message.updated",
            EventKind::MessageDeleted => "message.deleted",
            EventKind::MessageRead => "message.read",
            EventKind::ReactionNew => "reaction.new",
            EventKind::ReactionDeleted => "reaction.deleted",
            EventKind::TypingStart => "typing.start",
            EventKind::TypingStop => "typing.stop",
            EventKind::UserPresenceChanged => "user.presence.changed",
            EventKind::UserUpdated => "user.updated",
            EventKind::UserWatchingStart => "user.watching.start",
            EventKind::UserWatchingStop => "user.watching.stop",
            EventKind::MemberAdded => "member.added",
            EventKind::MemberUpdated => "member.updated",
            EventKind::MemberRemoved => "member.removed",
            EventKind::ChannelUpdated => "channel.updated",
            EventKind::ChannelDeleted => "channel.deleted",
            EventKind::NotificationMessageNew => "notification.message_new",
            EventKind::NotificationMarkRead => "notification.mark_read",
            EventKind::NotificationAddedToChannel => "notification.added_to_channel",
            EventKind::NotificationRemovedFromChannel => "notification.removed_from_channel",
            EventKind::ConnectionChanged => "connection.changed",
            EventKind::ConnectionRecovered => "connection.recovered",
            EventKind::Unknown(tag) => tag,
        }
    }

    /// Whether this is one of the recognised kinds.
    pub fn is_known(&self) -> bool {
        !matches!(self, EventKind::Unknown(_))
    }

    /// Get all known event kinds.
    pub fn all() -> Vec<EventKind> {
        vec![
            EventKind::HealthCheck,
            EventKind::MessageNew,
            EventKind::MessageUpdated,
            EventKind::MessageDeleted,
            EventKind::MessageRead,
            EventKind::ReactionNew,
            EventKind::ReactionDeleted,
            EventKind::TypingStart,
            EventKind::TypingStop,
            EventKind::UserPresenceChanged,
            EventKind::UserUpdated,
            EventKind::UserWatchingStart,
            EventKind::UserWatchingStop,
            EventKind::MemberAdded,
            EventKind::MemberUpdated,
            EventKind::MemberRemoved,
            EventKind::ChannelUpdated,
            EventKind::ChannelDeleted,
            EventKind::NotificationMessageNew,
            EventKind::NotificationMarkRead,
            EventKind::NotificationAddedToChannel,
            EventKind::NotificationRemovedFromChannel,
            EventKind::ConnectionChanged,
            EventKind::ConnectionRecovered,
        ]
    }
}

impl From<String> for EventKind {
    fn from(tag: String) -> Self {
        match EventKind::parse(&tag) {
            EventKind::Unknown(_) => EventKind::Unknown(tag),
            known => known,
        }
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Unknown(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chat user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// User id.
    pub id: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Presence flag.
    #[serde(default)]
    pub online: bool,
    /// Last activity timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_active: Option<String>,
}

impl User {
    /// Create a user with only an id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// A chat message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message id.
    pub id: String,
    /// Message text.
    #[serde(default)]
    pub text: String,
    /// Author.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    /// Composite id of the owning channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
    /// Creation timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Last edit timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    /// Deletion timestamp, set on deleted messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<String>,
    /// Thread reply count.
    #[serde(default)]
    pub reply_count: u32,
    /// Most recent reactions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub latest_reactions: Vec<Reaction>,
}

impl Message {
    /// Create a message with id and text.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            ..Default::default()
        }
    }

    /// Set the author.
    pub fn with_user(mut self, user: User) -> Self {
        self.user = Some(user);
        self
    }

    /// Author id, if the author is known.
    pub fn author_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.id.as_str())
    }
}

/// A reaction on a message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    /// Message the reaction belongs to.
    pub message_id: String,
    /// Reaction type (e.g. "like").
    #[serde(rename = "type")]
    pub reaction_type: String,
    /// Reacting user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    /// Reaction score.
    #[serde(default)]
    pub score: u32,
}

/// A channel member.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Member {
    /// Member user.
    pub user: User,
    /// Channel role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl Member {
    /// Create a member for a user.
    pub fn new(user: User) -> Self {
        Self { user, role: None }
    }
}

/// Channel metadata carried by channel events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelData {
    /// Channel id (without type prefix).
    pub id: String,
    /// Channel type.
    #[serde(rename = "type")]
    pub channel_type: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Member count.
    #[serde(default)]
    pub member_count: u32,
    /// Whether the channel is frozen.
    #[serde(default)]
    pub frozen: bool,
}
