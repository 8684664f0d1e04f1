//! # Parley Real-time
//!
//! Client-side event handling for the Parley chat SDK.
//!
//! The transport layer feeds decoded server events into a [`Client`], which
//! keeps local channel state current and fans each event out to registered
//! subscribers.
//!
//! ## Features
//!
//! - **Subscriber Registry**: Thread-safe handler registration with monotonic ids
//! - **Event Dispatch**: One typed hook per event kind, plus a catch-all
//! - **Channel State**: Cached messages, members, typing and read state
//! - **Connection Waiters**: One-shot callbacks released when the connection resolves
//!
//! ## Channel Ids
//!
//! Channels are addressed by a composite id, `type:id`:
//!
//! - `messaging:general` - A group channel
//! - `livestream:launch` - A livestream channel
//! - `team:ops:alerts` - Type `team`, id `ops:alerts`
//!
//! ## Example
//!
//! ```rust
//! use parley_realtime::{Client, ClientConfig, Event, EventHandler};
//! use std::sync::Arc;
//!
//! struct Typing;
//!
//! impl EventHandler for Typing {
//!     fn on_typing_start(&self, event: &Event) {
//!         println!("{:?} is typing", event.user);
//!     }
//! }
//!
//! let client = Client::new(ClientConfig::default().with_user("alice"));
//! client.watch_channel("messaging:general").unwrap();
//! client.add_event_handler(Arc::new(Typing));
//!
//! client
//!     .handle_frame(r#"{"type":"typing.start","cid":"messaging:general","user":{"id":"bob"}}"#)
//!     .unwrap();
//!
//! let general = client.channel("messaging:general").unwrap();
//! assert_eq!(general.typing_user_ids(), vec!["bob"]);
//! ```
//!
//! ## Wire Format
//!
//! Every frame is one JSON object tagged by `type`:
//!
//! ```json
//! {"type": "health.check", "connection_id": "abc", "me": {"id": "alice"}}
//! {"type": "message.new", "cid": "messaging:general", "message": {"id": "m1", "text": "hi"}}
//! {"type": "connection.changed", "online": false}
//! ```
//!
//! Unrecognised types still reach the catch-all hook.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │                 Client                  │
//! │  ┌───────────────────────────────────┐  │
//! │  │        ConnectionTracker          │  │
//! │  │    state, waiters, failures       │  │
//! │  └───────────────────────────────────┘  │
//! │                  │                      │
//! │  ┌───────────────▼───────────────────┐  │
//! │  │         Active Channels           │  │
//! │  │    cid -> ChannelState            │  │
//! │  └───────────────────────────────────┘  │
//! │                  │                      │
//! │  ┌───────────────▼───────────────────┐  │
//! │  │       Subscriber Registries       │  │
//! │  │  per-channel, then global         │  │
//! │  └───────────────────────────────────┘  │
//! └─────────────────────────────────────────┘
//! ```

pub mod channel;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod handler;
pub mod reconnect;
pub mod registry;

// Re-export main types
pub use channel::{ChannelId, ChannelState};
pub use client::{Client, ClientStats, DispatchReport};
pub use config::{ClientConfig, DEFAULT_MAX_ACTIVE_CHANNELS};
pub use connection::{ConnectionInfo, ConnectionState, WaiterHandle, WaiterId};
pub use error::{RealtimeError, Result};
pub use event::{ChannelData, Event, EventKind, Member, Message, Reaction, User};
pub use handler::{dispatch, dispatch_isolated, EventHandler, FnHandler};
pub use reconnect::ReconnectPolicy;
pub use registry::{SubscriberRegistry, SubscriptionId};

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_public_api() {
        // Test that main types are accessible
        let client = Client::default();
        assert_eq!(client.handler_count(), 0);
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_full_flow() {
        let client = Arc::new(Client::new(ClientConfig::default().with_user("alice")));
        let seen = Arc::new(Mutex::new(Vec::new()));

        // Subscribe
        let sink = seen.clone();
        let id = client.add_event_handler(Arc::new(FnHandler(move |event: &Event| {
            sink.lock().push(event.kind.to_string());
        })));
        assert_eq!(id, SubscriptionId(1));
        client.watch_channel("messaging:general").unwrap();

        // Connect
        let waiter = {
            let client = client.clone();
            tokio::spawn(async move { client.connected(Some(Duration::from_secs(5))).await })
        };
        while client.pending_waiters() == 0 {
            tokio::task::yield_now().await;
        }
        client
            .handle_frame(r#"{"type":"health.check","connection_id":"c1","me":{"id":"alice"}}"#)
            .unwrap();
        let info = waiter.await.unwrap().unwrap();
        assert_eq!(info.connection_id, "c1");

        // Receive a message
        let report = client
            .handle_frame(
                r#"{"type":"message.new","cid":"messaging:general",
                    "message":{"id":"m1","text":"hi","user":{"id":"bob"}}}"#,
            )
            .unwrap();
        assert!(report.channel_updated);
        assert_eq!(report.delivered, 1);
        assert_eq!(client.channel("messaging:general").unwrap().unread_count, 1);

        // Read it
        client
            .handle_frame(
                r#"{"type":"message.read","cid":"messaging:general","user":{"id":"alice"}}"#,
            )
            .unwrap();
        assert_eq!(client.channel("messaging:general").unwrap().unread_count, 0);

        assert_eq!(
            *seen.lock(),
            vec!["health.check", "message.new", "message.read"]
        );

        // Logout
        client.reset();
        assert_eq!(client.handler_count(), 0);
        assert!(client.active_channels().is_empty());
    }
}
