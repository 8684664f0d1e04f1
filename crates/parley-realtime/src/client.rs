//! Chat client: receives transport events, keeps local state, and fans events
//! out to subscribers.

use crate::channel::{ChannelId, ChannelState};
use crate::config::ClientConfig;
use crate::connection::{
    ConnectionInfo, ConnectionState, ConnectionTracker, Fired, Registration, WaiterCallback,
    WaiterHandle,
};
use crate::error::{RealtimeError, Result};
use crate::event::{Event, EventKind, User};
use crate::handler::{dispatch, dispatch_isolated, EventHandler};
use crate::registry::{SubscriberRegistry, SubscriptionId};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

type HandlerRegistry = SubscriberRegistry<dyn EventHandler>;

/// The chat client.
///
/// Construct one per session and share it by `Arc`. Channel state is written
/// only while handling an event or a watch call, and readers always get
/// cloned snapshots.
#[derive(Debug)]
pub struct Client {
    config: ClientConfig,
    /// Subscribers for every event.
    handlers: HandlerRegistry,
    /// Subscribers scoped to one channel, keyed by composite id.
    channel_handlers: RwLock<HashMap<String, Arc<HandlerRegistry>>>,
    /// Active channels, looked up by linear scan.
    channels: RwLock<Vec<ChannelState>>,
    /// Users seen on any event, by id.
    users: RwLock<HashMap<String, User>>,
    connection: Arc<Mutex<ConnectionTracker>>,
    stats: RwLock<ClientStats>,
}

impl Client {
    /// Create a client.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            handlers: SubscriberRegistry::new(),
            channel_handlers: RwLock::new(HashMap::new()),
            channels: RwLock::new(Vec::new()),
            users: RwLock::new(HashMap::new()),
            connection: Arc::new(Mutex::new(ConnectionTracker::new())),
            stats: RwLock::new(ClientStats::default()),
        }
    }

    /// Create a client with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ClientConfig::default())
    }

    /// Client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // ==================== Subscribers ====================

    /// Subscribe to every event.
    pub fn add_event_handler(&self, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        let id = self.handlers.add(handler);
        debug!(subscription = %id, "Event handler added");
        id
    }

    /// Unsubscribe. Unknown ids are ignored.
    pub fn remove_event_handler(&self, id: SubscriptionId) {
        if self.handlers.remove(id) {
            debug!(subscription = %id, "Event handler removed");
        }
    }

    /// Subscribe to events for one watched channel.
    ///
    /// Ids come from the same counter as [`add_event_handler`](Self::add_event_handler),
    /// so no two live subscriptions on this client share an id.
    pub fn add_channel_handler(
        &self,
        cid: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<SubscriptionId> {
        let channel = ChannelId::parse(cid)?;

        // Held until the handler is in place so stop_watching can't interleave.
        let channels = self.channels.read();
        if !channels.iter().any(|c| c.cid == channel) {
            return Err(RealtimeError::ChannelNotWatched(cid.to_string()));
        }

        let id = self.handlers.allocate();
        self.channel_handlers
            .write()
            .entry(channel.cid())
            .or_default()
            .insert(id, handler);
        drop(channels);

        debug!(cid = %channel, subscription = %id, "Channel handler added");
        Ok(id)
    }

    /// Remove a channel subscriber. Unknown ids are ignored.
    pub fn remove_channel_handler(&self, cid: &str, id: SubscriptionId) {
        if let Some(registry) = self.channel_handlers.read().get(cid) {
            registry.remove(id);
        }
    }

    /// Number of global subscribers.
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    // ==================== Active channels ====================

    /// Start tracking a channel. Watching an active channel is a no-op.
    pub fn watch_channel(&self, cid: &str) -> Result<ChannelState> {
        let channel = ChannelId::parse(cid)?;
        let mut channels = self.channels.write();

        if let Some(existing) = channels.iter().find(|c| c.cid == channel) {
            return Ok(existing.clone());
        }

        if channels.len() >= self.config.max_active_channels {
            return Err(RealtimeError::ChannelLimit(self.config.max_active_channels));
        }

        let state = ChannelState::new(channel);
        channels.push(state.clone());
        drop(channels);

        info!(cid = %state.cid, "Watching channel");
        Ok(state)
    }

    /// Stop tracking a channel and drop its subscribers.
    pub fn stop_watching(&self, cid: &str) -> bool {
        let mut channels = self.channels.write();
        let before = channels.len();
        channels.retain(|c| !c.cid.matches(cid));
        let removed = channels.len() != before;

        if removed {
            self.channel_handlers.write().remove(cid);
        }
        drop(channels);

        if removed {
            info!(cid = %cid, "Stopped watching channel");
        }
        removed
    }

    /// Whether a channel is active.
    pub fn is_watching(&self, cid: &str) -> bool {
        self.channels.read().iter().any(|c| c.cid.matches(cid))
    }

    /// Snapshot of one active channel.
    pub fn channel(&self, cid: &str) -> Option<ChannelState> {
        self.channels
            .read()
            .iter()
            .find(|c| c.cid.matches(cid))
            .cloned()
    }

    /// Snapshot of every active channel.
    pub fn active_channels(&self) -> Vec<ChannelState> {
        self.channels.read().clone()
    }

    /// Active channels flagged after a connection recovery.
    pub fn channels_needing_resync(&self) -> Vec<ChannelId> {
        self.channels
            .read()
            .iter()
            .filter(|c| c.needs_resync)
            .map(|c| c.cid.clone())
            .collect()
    }

    /// Clear a channel's resync flag.
    pub fn mark_synced(&self, cid: &str) -> Result<()> {
        let mut channels = self.channels.write();
        match channels.iter_mut().find(|c| c.cid.matches(cid)) {
            Some(state) => {
                state.needs_resync = false;
                Ok(())
            }
            None => Err(RealtimeError::ChannelNotWatched(cid.to_string())),
        }
    }

    /// Replace a channel's cached state with a freshly queried one.
    ///
    /// Clears the resync flag. The channel must already be watched.
    pub fn sync_channel(&self, mut state: ChannelState) -> Result<()> {
        state.needs_resync = false;
        let mut channels = self.channels.write();
        match channels.iter_mut().find(|c| c.cid == state.cid) {
            Some(existing) => {
                *existing = state;
                Ok(())
            }
            None => Err(RealtimeError::ChannelNotWatched(state.cid.cid())),
        }
    }

    // ==================== Users ====================

    /// Cached copy of a user.
    pub fn user(&self, id: &str) -> Option<User> {
        self.users.read().get(id).cloned()
    }

    /// Snapshot of every cached user.
    pub fn users(&self) -> Vec<User> {
        self.users.read().values().cloned().collect()
    }

    // ==================== Event handling ====================

    /// Decode a transport frame and handle it.
    pub fn handle_frame(&self, frame: &str) -> Result<DispatchReport> {
        match Event::from_json(frame) {
            Ok(event) => Ok(self.handle_event(&event)),
            Err(e) => {
                self.stats.write().decode_failures += 1;
                debug!(error = %e, "Dropping undecodable frame");
                Err(e)
            }
        }
    }

    /// Handle one inbound event.
    ///
    /// Channel state is updated before any subscriber sees the event. Channel
    /// subscribers are called before global ones, and no lock is held while
    /// handlers run.
    pub fn handle_event(&self, event: &Event) -> DispatchReport {
        self.expire_waiters(Instant::now());
        self.track_connection(event);
        self.track_users(event);

        let mut report = DispatchReport::default();

        let channel_registry = match event.cid.as_deref() {
            Some(cid) => {
                report.channel_updated = self.apply_to_channel(cid, event);
                self.channel_handlers.read().get(cid).cloned()
            }
            None => None,
        };

        if let Some(registry) = channel_registry {
            self.deliver(event, &registry.snapshot(), &mut report);
        }
        self.deliver(event, &self.handlers.snapshot(), &mut report);

        {
            let mut stats = self.stats.write();
            stats.events_received += 1;
            stats.deliveries += report.delivered as u64;
            stats.handler_failures += report.failed as u64;
            if !event.kind.is_known() {
                stats.unknown_events += 1;
            }
        }

        debug!(
            event = %event.kind,
            cid = ?event.cid,
            delivered = report.delivered,
            failed = report.failed,
            "Event dispatched"
        );

        report
    }

    fn deliver(
        &self,
        event: &Event,
        handlers: &[Arc<dyn EventHandler>],
        report: &mut DispatchReport,
    ) {
        for handler in handlers {
            if !self.config.isolate_handler_panics {
                dispatch(event, handler.as_ref());
                report.delivered += 1;
            } else if dispatch_isolated(event, handler.as_ref()) {
                report.delivered += 1;
            } else {
                report.failed += 1;
            }
        }
    }

    fn apply_to_channel(&self, cid: &str, event: &Event) -> bool {
        let user_id = self.config.user_id.as_deref();
        let mut channels = self.channels.write();
        match channels.iter_mut().find(|c| c.cid.matches(cid)) {
            Some(state) => {
                state.apply(event, user_id);
                true
            }
            None => false,
        }
    }

    fn track_users(&self, event: &Event) {
        let Some(user) = event.acting_user() else {
            return;
        };

        self.users.write().insert(user.id.clone(), user.clone());

        // Presence and profile changes carry no cid but touch every channel.
        if event.cid.is_none()
            && matches!(
                event.kind,
                EventKind::UserPresenceChanged | EventKind::UserUpdated
            )
        {
            for channel in self.channels.write().iter_mut() {
                channel.update_user(user);
            }
        }
    }

    fn track_connection(&self, event: &Event) {
        let fired = {
            let mut tracker = self.connection.lock();
            match event.kind {
                EventKind::HealthCheck => match &event.connection_id {
                    Some(id) if tracker.state() != &connected_state(id) => {
                        info!(connection_id = %id, "Connection resolved");
                        Some(tracker.resolve(ConnectionInfo {
                            connection_id: id.clone(),
                            user: event.me.clone(),
                        }))
                    }
                    _ => None,
                },
                EventKind::ConnectionChanged => match (event.online, &event.connection_id) {
                    (Some(false), _) => {
                        if tracker.disconnect() {
                            warn!("Connection lost");
                            self.stats.write().disconnects += 1;
                        }
                        None
                    }
                    (Some(true), Some(id)) if tracker.state() != &connected_state(id) => {
                        info!(connection_id = %id, "Connection resolved");
                        Some(tracker.resolve(ConnectionInfo {
                            connection_id: id.clone(),
                            user: event.me.clone(),
                        }))
                    }
                    _ => None,
                },
                EventKind::ConnectionRecovered => {
                    let id = event
                        .connection_id
                        .clone()
                        .or_else(|| tracker.info().map(|i| i.connection_id.clone()));
                    match id {
                        Some(id) => {
                            let user = event
                                .me
                                .clone()
                                .or_else(|| tracker.info().and_then(|i| i.user.clone()));
                            let fired = tracker.resolve(ConnectionInfo {
                                connection_id: id.clone(),
                                user,
                            });
                            let flagged = self.flag_resync();
                            info!(connection_id = %id, channels = flagged, "Connection recovered");
                            Some(fired)
                        }
                        None => {
                            warn!("Recovery event without a known connection id");
                            None
                        }
                    }
                }
                _ => None,
            }
        };

        if let Some(fired) = fired {
            let count = fired.run();
            if count > 0 {
                debug!(waiters = count, "Connection waiters released");
            }
            self.stats.write().connections += 1;
        }
    }

    fn flag_resync(&self) -> usize {
        let mut channels = self.channels.write();
        for channel in channels.iter_mut() {
            channel.needs_resync = true;
        }
        channels.len()
    }

    // ==================== Connection ====================

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.lock().state().clone()
    }

    /// Whether the connection is up.
    pub fn is_connected(&self) -> bool {
        self.connection.lock().is_connected()
    }

    /// Details of the current or most recent connection.
    pub fn connection_info(&self) -> Option<ConnectionInfo> {
        self.connection.lock().info().cloned()
    }

    /// Number of queued connection waiters.
    pub fn pending_waiters(&self) -> usize {
        self.connection.lock().pending()
    }

    /// Run `callback` once the connection resolves, or right away if it
    /// already has.
    ///
    /// Waiters released by the same resolution fire in registration order.
    /// A waiter registered from another thread just after the connection
    /// resolves runs immediately on that thread, and may do so before the
    /// resolving thread has finished running the earlier queued waiters.
    pub fn wait_for_connection<F>(&self, callback: F) -> WaiterHandle
    where
        F: FnOnce(Result<ConnectionInfo>) + Send + 'static,
    {
        self.register_waiter(Box::new(callback), None)
    }

    /// Like [`wait_for_connection`](Self::wait_for_connection), failing with
    /// [`RealtimeError::WaitTimeout`] once `deadline` passes.
    ///
    /// Called inside a tokio runtime, a timer task fires the timeout even if
    /// no further events arrive. Outside one, deadlines are only checked on
    /// handled events and on [`expire_waiters`](Self::expire_waiters), which
    /// the embedder must then call periodically.
    pub fn wait_for_connection_until<F>(&self, deadline: Instant, callback: F) -> WaiterHandle
    where
        F: FnOnce(Result<ConnectionInfo>) + Send + 'static,
    {
        self.register_waiter(Box::new(callback), Some(deadline))
    }

    fn register_waiter(&self, callback: WaiterCallback, deadline: Option<Instant>) -> WaiterHandle {
        let (id, registration) = self.connection.lock().register(callback, deadline);
        match registration {
            Registration::Ready(callback, info) => callback(Ok(info)),
            Registration::Queued(_) => {
                debug!(?id, "Connection waiter queued");
                if let Some(deadline) = deadline {
                    self.schedule_expiry(deadline);
                }
            }
        }
        WaiterHandle::new(id, &self.connection)
    }

    fn schedule_expiry(&self, deadline: Instant) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let tracker = Arc::downgrade(&self.connection);
        runtime.spawn(async move {
            tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
            let Some(tracker) = tracker.upgrade() else {
                return;
            };
            let fired = tracker.lock().expire(Instant::now());
            let count = fired.run();
            if count > 0 {
                debug!(waiters = count, "Connection waiters timed out");
            }
        });
    }

    /// Wait for the connection to resolve.
    ///
    /// Uses `timeout`, falling back to the configured default; with neither,
    /// waits until the connection resolves, fails, or the client is reset.
    pub async fn connected(&self, timeout: Option<Duration>) -> Result<ConnectionInfo> {
        let (tx, rx) = oneshot::channel();
        let handle = self.wait_for_connection(move |result| {
            let _ = tx.send(result);
        });

        match timeout.or_else(|| self.config.wait_timeout()) {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(RealtimeError::ChannelClosed),
                Err(_) => {
                    handle.cancel();
                    Err(RealtimeError::WaitTimeout)
                }
            },
            None => rx.await.map_err(|_| RealtimeError::ChannelClosed)?,
        }
    }

    /// Fail waiters whose deadline has passed. Returns how many fired.
    pub fn expire_waiters(&self, now: Instant) -> usize {
        let fired = self.connection.lock().expire(now);
        let count = fired.run();
        if count > 0 {
            debug!(waiters = count, "Connection waiters timed out");
        }
        count
    }

    /// Report a transport failure to every waiting caller.
    pub fn on_connection_error(&self, code: i32, message: &str) {
        let fired: Fired = self.connection.lock().fail(code, message);
        warn!(code, message = %message, waiters = fired.len(), "Connection failed");
        self.stats.write().connection_failures += 1;
        fired.run();
    }

    /// Delay before the next reconnect attempt, or `None` once the policy is
    /// exhausted.
    pub fn reconnect_delay(&self) -> Option<Duration> {
        let failures = self.connection.lock().failures();
        self.config.reconnect.next_delay(failures)
    }

    /// Full reset, e.g. on logout.
    ///
    /// Drops every subscriber (ids restart at 1), every active channel and
    /// cached user, disconnects, and fails pending waiters with
    /// [`RealtimeError::ClientReset`].
    pub fn reset(&self) {
        self.handlers.clear();
        self.channel_handlers.write().clear();
        self.channels.write().clear();
        self.users.write().clear();

        let fired = self.connection.lock().reset();
        let count = fired.run();
        info!(waiters = count, "Client reset");
    }

    /// Client statistics.
    pub fn stats(&self) -> ClientStats {
        let mut stats = self.stats.read().clone();
        stats.handlers = self.handlers.len();
        stats.active_channels = self.channels.read().len();
        stats.pending_waiters = self.pending_waiters();
        stats
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn connected_state(id: &str) -> ConnectionState {
    ConnectionState::Connected {
        connection_id: id.to_string(),
    }
}

/// Outcome of handling one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers that received the event.
    pub delivered: usize,
    /// Handlers that panicked.
    pub failed: usize,
    /// Whether an active channel matched the event's cid.
    pub channel_updated: bool,
}

/// Client statistics.
#[derive(Debug, Clone, Default)]
pub struct ClientStats {
    /// Current number of global subscribers.
    pub handlers: usize,
    /// Current number of active channels.
    pub active_channels: usize,
    /// Current number of queued waiters.
    pub pending_waiters: usize,
    /// Events handled since start.
    pub events_received: u64,
    /// Events with an unrecognised kind.
    pub unknown_events: u64,
    /// Frames that failed to decode.
    pub decode_failures: u64,
    /// Individual handler deliveries.
    pub deliveries: u64,
    /// Handler panics contained during dispatch.
    pub handler_failures: u64,
    /// Successful connection resolutions.
    pub connections: u64,
    /// Connected -> Disconnected transitions.
    pub disconnects: u64,
    /// Reported transport failures.
    pub connection_failures: u64,
}
