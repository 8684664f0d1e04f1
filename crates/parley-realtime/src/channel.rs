//! Composite channel ids and cached per-channel state.

use crate::error::{RealtimeError, Result};
use crate::event::{ChannelData, Event, EventKind, Member, Message, User};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A channel identifier of the form `type:id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId {
    /// Channel type (e.g. "messaging").
    pub channel_type: String,
    /// Channel id within its type.
    pub id: String,
}

impl ChannelId {
    /// Create a channel id from its parts.
    pub fn new(channel_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            channel_type: channel_type.into(),
            id: id.into(),
        }
    }

    /// Parse a composite id.
    ///
    /// The type ends at the first `:`; the remainder, which may itself contain
    /// colons, is the id. Neither half may be empty.
    pub fn parse(s: &str) -> Result<Self> {
        let (channel_type, id) = s.split_once(':').ok_or_else(|| {
            RealtimeError::InvalidChannel(format!("missing channel type prefix: {}", s))
        })?;

        if channel_type.is_empty() || id.is_empty() {
            return Err(RealtimeError::InvalidChannel(format!(
                "channel type and id cannot be empty: {}",
                s
            )));
        }

        Ok(Self::new(channel_type, id))
    }

    /// The composite `type:id` string.
    pub fn cid(&self) -> String {
        self.to_string()
    }

    /// Exact comparison against a composite id string, without allocating.
    pub fn matches(&self, cid: &str) -> bool {
        cid.split_once(':') == Some((self.channel_type.as_str(), self.id.as_str()))
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.channel_type, self.id)
    }
}

impl std::str::FromStr for ChannelId {
    type Err = RealtimeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Locally cached state of an active channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelState {
    /// Channel id.
    pub cid: ChannelId,
    /// Latest channel metadata.
    pub data: Option<ChannelData>,
    /// Messages in arrival order, unique by id.
    pub messages: Vec<Message>,
    /// Channel members.
    pub members: Vec<Member>,
    /// Ids of users currently watching.
    pub watchers: BTreeSet<String>,
    /// Watcher count as last reported by the server.
    pub watcher_count: u32,
    /// Users currently typing, by id.
    pub typing: BTreeMap<String, User>,
    /// Last-read timestamp per user id.
    pub reads: BTreeMap<String, Option<String>>,
    /// Unread messages for the current user.
    pub unread_count: u32,
    /// Channel was deleted on the server.
    pub deleted: bool,
    /// State may have missed events and should be re-queried.
    pub needs_resync: bool,
}

impl ChannelState {
    /// Create empty state for a channel.
    pub fn new(cid: ChannelId) -> Self {
        Self {
            cid,
            data: None,
            messages: Vec::new(),
            members: Vec::new(),
            watchers: BTreeSet::new(),
            watcher_count: 0,
            typing: BTreeMap::new(),
            reads: BTreeMap::new(),
            unread_count: 0,
            deleted: false,
            needs_resync: false,
        }
    }

    /// Apply an event to this channel. Returns whether the state changed.
    pub fn apply(&mut self, event: &Event, current_user_id: Option<&str>) -> bool {
        match event.kind {
            EventKind::MessageNew | EventKind::NotificationMessageNew => {
                let Some(message) = &event.message else {
                    return false;
                };
                let from_other = message.author_id() != current_user_id;
                if self.upsert_message(message.clone()) && from_other {
                    self.unread_count += 1;
                }
                if let Some(author) = message.author_id() {
                    self.typing.remove(author);
                }
                true
            }
            EventKind::MessageUpdated
            | EventKind::MessageDeleted
            | EventKind::ReactionNew
            | EventKind::ReactionDeleted => match &event.message {
                Some(message) => self.replace_message(message.clone()),
                None => false,
            },
            EventKind::MessageRead | EventKind::NotificationMarkRead => {
                let reader = event.user.as_ref().map(|u| u.id.as_str());
                if let Some(reader) = reader {
                    self.reads
                        .insert(reader.to_string(), event.created_at.clone());
                }
                let is_current = match reader {
                    Some(reader) => Some(reader) == current_user_id,
                    None => event.kind == EventKind::NotificationMarkRead,
                };
                if is_current {
                    self.unread_count = 0;
                }
                reader.is_some() || is_current
            }
            EventKind::TypingStart => match &event.user {
                Some(user) => {
                    self.typing.insert(user.id.clone(), user.clone());
                    true
                }
                None => false,
            },
            EventKind::TypingStop => match &event.user {
                Some(user) => self.typing.remove(&user.id).is_some(),
                None => false,
            },
            EventKind::UserWatchingStart | EventKind::UserWatchingStop => {
                if let Some(user) = &event.user {
                    if event.kind == EventKind::UserWatchingStart {
                        self.watchers.insert(user.id.clone());
                    } else {
                        self.watchers.remove(&user.id);
                    }
                }
                self.watcher_count = event
                    .watcher_count
                    .unwrap_or(self.watchers.len() as u32);
                true
            }
            EventKind::MemberAdded | EventKind::MemberUpdated => match &event.member {
                Some(member) => {
                    self.upsert_member(member.clone());
                    true
                }
                None => false,
            },
            EventKind::MemberRemoved => {
                let user_id = event
                    .member
                    .as_ref()
                    .map(|m| &m.user)
                    .or(event.user.as_ref())
                    .map(|u| u.id.clone());
                match user_id {
                    Some(id) => {
                        let before = self.members.len();
                        self.members.retain(|m| m.user.id != id);
                        self.members.len() != before
                    }
                    None => false,
                }
            }
            EventKind::ChannelUpdated => match &event.channel {
                Some(data) => {
                    self.data = Some(data.clone());
                    true
                }
                None => false,
            },
            EventKind::ChannelDeleted => {
                self.deleted = true;
                true
            }
            EventKind::UserPresenceChanged | EventKind::UserUpdated => match &event.user {
                Some(user) => self.update_user(user),
                None => false,
            },
            _ => false,
        }
    }

    /// Refresh every cached copy of a user. Returns whether any copy changed.
    pub fn update_user(&mut self, user: &User) -> bool {
        let mut changed = false;

        for member in self.members.iter_mut().filter(|m| m.user.id == user.id) {
            if member.user != *user {
                member.user = user.clone();
                changed = true;
            }
        }

        if let Some(typing) = self.typing.get_mut(&user.id) {
            if typing != user {
                *typing = user.clone();
                changed = true;
            }
        }

        for message in self.messages.iter_mut() {
            if let Some(author) = message.user.as_mut().filter(|a| a.id == user.id) {
                if author != user {
                    *author = user.clone();
                    changed = true;
                }
            }
        }

        changed
    }

    /// Look up a message by id.
    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Ids of users currently typing.
    pub fn typing_user_ids(&self) -> Vec<&str> {
        self.typing.keys().map(String::as_str).collect()
    }

    /// Insert or replace a message. Returns `true` if it was new.
    fn upsert_message(&mut self, message: Message) -> bool {
        match self.messages.iter_mut().find(|m| m.id == message.id) {
            Some(existing) => {
                *existing = message;
                false
            }
            None => {
                self.messages.push(message);
                true
            }
        }
    }

    /// Replace a known message. Returns `false` if the id is not cached.
    fn replace_message(&mut self, message: Message) -> bool {
        match self.messages.iter_mut().find(|m| m.id == message.id) {
            Some(existing) => {
                *existing = message;
                true
            }
            None => false,
        }
    }

    fn upsert_member(&mut self, member: Member) {
        match self
            .members
            .iter_mut()
            .find(|m| m.user.id == member.user.id)
        {
            Some(existing) => *existing = member,
            None => self.members.push(member),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> ChannelState {
        ChannelState::new(ChannelId::parse("messaging:general").unwrap())
    }

    fn new_message(id: &str, author: &str) -> Event {
        Event::new(EventKind::MessageNew)
            .with_cid("messaging:general")
            .with_message(Message::new(id, "hi").with_user(User::new(author)))
    }

    #[test]
    fn test_channel_id_parse() {
        let cid = ChannelId::parse("messaging:general").unwrap();
        assert_eq!(cid.channel_type, "messaging");
        assert_eq!(cid.id, "general");
        assert_eq!(cid.to_string(), "messaging:general");
    }

    #[test]
    fn test_channel_id_parse_keeps_extra_colons() {
        let cid = ChannelId::parse("livestream:match:42").unwrap();
        assert_eq!(cid.channel_type, "livestream");
        assert_eq!(cid.id, "match:42");
        assert_eq!(cid.cid(), "livestream:match:42");
    }

    #[test]
    fn test_channel_id_matches() {
        let cid = ChannelId::parse("messaging:general").unwrap();
        assert!(cid.matches("messaging:general"));
        assert!(!cid.matches("messaging:gen"));
        assert!(!cid.matches("team:general"));
        assert!(!cid.matches("messaging"));
    }

    #[test]
    fn test_channel_id_parse_invalid() {
        assert!(ChannelId::parse("general").is_err());
        assert!(ChannelId::parse(":general").is_err());
        assert!(ChannelId::parse("messaging:").is_err());
        assert!(ChannelId::parse("").is_err());
    }

    #[test]
    fn test_new_message_counts_unread_from_others() {
        let mut state = state();

        assert!(state.apply(&new_message("m1", "bob"), Some("alice")));
        assert!(state.apply(&new_message("m2", "alice"), Some("alice")));

        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.unread_count, 1);
    }

    #[test]
    fn test_duplicate_message_replaces_in_place() {
        let mut state = state();
        state.apply(&new_message("m1", "bob"), Some("alice"));
        state.apply(&new_message("m1", "bob"), Some("alice"));

        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.unread_count, 1);
    }

    #[test]
    fn test_message_updated_replaces_known_only() {
        let mut state = state();
        state.apply(&new_message("m1", "bob"), None);

        let edit = Event::new(EventKind::MessageUpdated).with_message(Message::new("m1", "edited"));
        assert!(state.apply(&edit, None));
        assert_eq!(state.message("m1").unwrap().text, "edited");

        let unknown = Event::new(EventKind::MessageUpdated).with_message(Message::new("m9", "x"));
        assert!(!state.apply(&unknown, None));
        assert_eq!(state.messages.len(), 1);
    }

    #[test]
    fn test_read_by_current_user_resets_unread() {
        let mut state = state();
        state.apply(&new_message("m1", "bob"), Some("alice"));
        state.apply(&new_message("m2", "bob"), Some("alice"));
        assert_eq!(state.unread_count, 2);

        let read = Event::new(EventKind::MessageRead).with_user(User::new("bob"));
        state.apply(&read, Some("alice"));
        assert_eq!(state.unread_count, 2);
        assert!(state.reads.contains_key("bob"));

        let read = Event::new(EventKind::MessageRead).with_user(User::new("alice"));
        state.apply(&read, Some("alice"));
        assert_eq!(state.unread_count, 0);
    }

    #[test]
    fn test_typing_start_stop() {
        let mut state = state();
        let start = Event::new(EventKind::TypingStart).with_user(User::new("bob"));
        let stop = Event::new(EventKind::TypingStop).with_user(User::new("bob"));

        assert!(state.apply(&start, None));
        assert_eq!(state.typing_user_ids(), vec!["bob"]);

        assert!(state.apply(&stop, None));
        assert!(state.typing.is_empty());
        assert!(!state.apply(&stop, None));
    }

    #[test]
    fn test_new_message_clears_author_typing() {
        let mut state = state();
        state.apply(
            &Event::new(EventKind::TypingStart).with_user(User::new("bob")),
            None,
        );
        state.apply(&new_message("m1", "bob"), None);
        assert!(state.typing.is_empty());
    }

    #[test]
    fn test_watchers_use_reported_count() {
        let mut state = state();
        let start = Event::new(EventKind::UserWatchingStart)
            .with_user(User::new("bob"))
            .with_watcher_count(7);
        state.apply(&start, None);

        assert!(state.watchers.contains("bob"));
        assert_eq!(state.watcher_count, 7);

        let stop = Event::new(EventKind::UserWatchingStop).with_user(User::new("bob"));
        state.apply(&stop, None);
        assert!(state.watchers.is_empty());
        assert_eq!(state.watcher_count, 0);
    }

    #[test]
    fn test_member_events() {
        let mut state = state();
        let added = Event::new(EventKind::MemberAdded).with_member(Member::new(User::new("bob")));
        state.apply(&added, None);
        assert_eq!(state.members.len(), 1);

        let mut promoted = Member::new(User::new("bob"));
        promoted.role = Some("moderator".to_string());
        state.apply(
            &Event::new(EventKind::MemberUpdated).with_member(promoted),
            None,
        );
        assert_eq!(state.members.len(), 1);
        assert_eq!(state.members[0].role.as_deref(), Some("moderator"));

        let removed = Event::new(EventKind::MemberRemoved).with_user(User::new("bob"));
        assert!(state.apply(&removed, None));
        assert!(state.members.is_empty());
    }

    #[test]
    fn test_channel_updated_and_deleted() {
        let mut state = state();
        let data = ChannelData {
            id: "general".to_string(),
            channel_type: "messaging".to_string(),
            name: Some("General".to_string()),
            ..Default::default()
        };
        state.apply(&Event::new(EventKind::ChannelUpdated).with_channel(data), None);
        assert_eq!(
            state.data.as_ref().and_then(|d| d.name.as_deref()),
            Some("General")
        );

        state.apply(&Event::new(EventKind::ChannelDeleted), None);
        assert!(state.deleted);
    }

    #[test]
    fn test_presence_refreshes_cached_users() {
        let mut state = state();
        state.apply(
            &Event::new(EventKind::MemberAdded).with_member(Member::new(User::new("bob"))),
            None,
        );
        state.apply(&new_message("m1", "bob"), None);

        let mut online = User::new("bob");
        online.online = true;
        let presence = Event::new(EventKind::UserPresenceChanged).with_user(online);

        assert!(state.apply(&presence, None));
        assert!(state.members[0].user.online);
        assert!(state.message("m1").unwrap().user.as_ref().unwrap().online);
        assert!(!state.apply(&presence, None));
    }

    #[test]
    fn test_unrelated_kinds_are_ignored() {
        let mut state = state();
        assert!(!state.apply(&Event::new(EventKind::HealthCheck), None));
        assert!(!state.apply(
            &Event::new(EventKind::Unknown("poll.closed".to_string())),
            None
        ));
        assert_eq!(state, self::state());
    }
}
