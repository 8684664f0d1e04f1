//! Event handler trait and the kind switch that drives it.
//!
//! Every hook has a no-op default, so a handler only overrides what it needs.
//! [`dispatch`] always calls [`EventHandler::on_any_event`] first and then at
//! most one kind-specific hook.

use crate::event::{Event, EventKind};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::error;

/// Receiver of chat events.
#[allow(unused_variables)]
pub trait EventHandler: Send + Sync {
    /// Called for every event, before the kind-specific hook.
    fn on_any_event(&self, event: &Event) {}

    /// `health.check`
    fn on_health_check(&self, event: &Event) {}
    /// `message.new`
    fn on_message_new(&self, event: &Event) {}
    /// `message.updated`
    fn on_message_updated(&self, event: &Event) {}
    /// `message.deleted`
    fn on_message_deleted(&self, event: &Event) {}
    /// `message.read`
    fn on_message_read(&self, event: &Event) {}
    /// `reaction.new`
    fn on_reaction_new(&self, event: &Event) {}
    /// `reaction.deleted`
    fn on_reaction_deleted(&self, event: &Event) {}
    /// `typing.start`
    fn on_typing_start(&self, event: &Event) {}
    /// `typing.stop`
    fn on_typing_stop(&self, event: &Event) {}
    /// `user.presence.changed`
    fn on_user_presence_changed(&self, event: &Event) {}
    /// `user.updated`
    fn on_user_updated(&self, event: &Event) {}
    /// `user.watching.start`
    fn on_user_watching_start(&self, event: &Event) {}
    /// `user.watching.stop`
    fn on_user_watching_stop(&self, event: &Event) {}
    /// `member.added`
    fn on_member_added(&self, event: &Event) {}
    /// `member.updated`
    fn on_member_updated(&self, event: &Event) {}
    /// `member.removed`
    fn on_member_removed(&self, event: &Event) {}
    /// `channel.updated`
    fn on_channel_updated(&self, event: &Event) {}
    /// `channel.deleted`
    fn on_channel_deleted(&self, event: &Event) {}
    /// `notification.message_new`
    fn on_notification_message_new(&self, event: &Event) {}
    /// `notification.mark_read`
    fn on_notification_mark_read(&self, event: &Event) {}
    /// `notification.added_to_channel`
    fn on_notification_added_to_channel(&self, event: &Event) {}
    /// `notification.removed_from_channel`
    fn on_notification_removed_from_channel(&self, event: &Event) {}
    /// `connection.changed`
    fn on_connection_changed(&self, event: &Event) {}
    /// `connection.recovered`
    fn on_connection_recovered(&self, event: &Event) {}
}

/// Deliver an event to one handler.
pub fn dispatch(event: &Event, handler: &dyn EventHandler) {
    handler.on_any_event(event);

    match event.kind {
        EventKind::HealthCheck => handler.on_health_check(event),
        EventKind::MessageNew => handler.on_message_new(event),
        EventKind::MessageUpdated => handler.on_message_updated(event),
        EventKind::MessageDeleted => handler.on_message_deleted(event),
        EventKind::MessageRead => handler.on_message_read(event),
        EventKind::ReactionNew => handler.on_reaction_new(event),
        EventKind::ReactionDeleted => handler.on_reaction_deleted(event),
        EventKind::TypingStart => handler.on_typing_start(event),
        EventKind::TypingStop => handler.on_typing_stop(event),
        EventKind::UserPresenceChanged => handler.on_user_presence_changed(event),
        EventKind::UserUpdated => handler.on_user_updated(event),
        EventKind::UserWatchingStart => handler.on_user_watching_start(event),
        EventKind::UserWatchingStop => handler.on_user_watching_stop(event),
        EventKind::MemberAdded => handler.on_member_added(event),
        EventKind::MemberUpdated => handler.on_member_updated(event),
        EventKind::MemberRemoved => handler.on_member_removed(event),
        EventKind::ChannelUpdated => handler.on_channel_updated(event),
        EventKind::ChannelDeleted => handler.on_channel_deleted(event),
        EventKind::NotificationMessageNew => handler.on_notification_message_new(event),
        EventKind::NotificationMarkRead => handler.on_notification_mark_read(event),
        EventKind::NotificationAddedToChannel => handler.on_notification_added_to_channel(event),
        EventKind::NotificationRemovedFromChannel => {
            handler.on_notification_removed_from_channel(event)
        }
        EventKind::ConnectionChanged => handler.on_connection_changed(event),
        EventKind::ConnectionRecovered => handler.on_connection_recovered(event),
        EventKind::Unknown(_) => {}
    }
}

/// Deliver an event to one handler, containing a panic inside it.
///
/// Returns `false` if the handler panicked. The panic is logged and the
/// caller can carry on with the remaining handlers.
pub fn dispatch_isolated(event: &Event, handler: &dyn EventHandler) -> bool {
    match catch_unwind(AssertUnwindSafe(|| dispatch(event, handler))) {
        Ok(()) => true,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(event = %event.kind, reason = %reason, "Event handler panicked");
            false
        }
    }
}

/// Adapts a closure into a handler that only sees [`EventHandler::on_any_event`].
pub struct FnHandler<F>(pub F);

impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&Event) + Send + Sync,
{
    fn on_any_event(&self, event: &Event) {
        (self.0)(event)
    }
}

impl<F> std::fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FnHandler")
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;

    /// Handler that records every hook call as `"<hook>:<kind>"`.
    #[derive(Debug, Default)]
    pub struct Recorder {
        pub calls: Mutex<Vec<String>>,
    }

    impl Recorder {
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }

        fn record(&self, hook: &str, event: &Event) {
            self.calls.lock().push(format!("{}:{}", hook, event.kind));
        }
    }

    impl EventHandler for Recorder {
        fn on_any_event(&self, event: &Event) {
            self.record("any", event);
        }
        fn on_health_check(&self, event: &Event) {
            self.record("health_check", event);
        }
        fn on_message_new(&self, event: &Event) {
            self.record("message_new", event);
        }
        fn on_message_read(&self, event: &Event) {
            self.record("message_read", event);
        }
        fn on_typing_start(&self, event: &Event) {
            self.record("typing_start", event);
        }
        fn on_typing_stop(&self, event: &Event) {
            self.record("typing_stop", event);
        }
        fn on_channel_updated(&self, event: &Event) {
            self.record("channel_updated", event);
        }
        fn on_connection_changed(&self, event: &Event) {
            self.record("connection_changed", event);
        }
        fn on_connection_recovered(&self, event: &Event) {
            self.record("connection_recovered", event);
        }
    }
}
