//! Connection state and connection waiters.
//!
//! A waiter is a one-shot callback that fires when the connection resolves,
//! fails, times out, or the client is reset. Waiters registered while already
//! connected fire immediately. The tracker never runs callbacks itself: state
//! transitions return a [`Fired`] batch which the caller runs after releasing
//! its lock, so a callback may safely register another waiter.

use crate::error::{RealtimeError, Result};
use crate::event::User;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Instant;

/// Callback invoked once with the outcome of a connection wait.
pub type WaiterCallback = Box<dyn FnOnce(Result<ConnectionInfo>) + Send + 'static>;

/// Connection status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No live connection.
    Disconnected,
    /// Connected with a server-assigned id.
    Connected {
        /// Connection id from the resolving health check.
        connection_id: String,
    },
}

/// Details of a resolved connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionInfo {
    /// Server-assigned connection id.
    pub connection_id: String,
    /// The connected user, if the server sent it.
    pub user: Option<User>,
}

/// Identifier of a registered waiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaiterId(u64);

struct Waiter {
    id: WaiterId,
    deadline: Option<Instant>,
    callback: WaiterCallback,
}

impl std::fmt::Debug for Waiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Waiter")
            .field("id", &self.id)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

/// Outcome of [`ConnectionTracker::register`].
pub enum Registration {
    /// Waiter queued until the connection resolves.
    Queued(WaiterId),
    /// Already connected; the caller must fire the callback now.
    Ready(WaiterCallback, ConnectionInfo),
}

/// Callbacks released by a state transition.
#[must_use = "released waiters must be run"]
#[derive(Default)]
pub struct Fired(Vec<(WaiterCallback, Result<ConnectionInfo>)>);

impl Fired {
    /// Run every callback in registration order. Returns how many ran.
    pub fn run(self) -> usize {
        let count = self.0.len();
        for (callback, outcome) in self.0 {
            callback(outcome);
        }
        count
    }

    /// Number of released callbacks.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no callbacks were released.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Connection state machine and waiter queue.
#[derive(Debug)]
pub struct ConnectionTracker {
    state: ConnectionState,
    info: Option<ConnectionInfo>,
    waiters: Vec<Waiter>,
    next_waiter: u64,
    failures: u32,
}

impl ConnectionTracker {
    /// Create a disconnected tracker.
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            info: None,
            waiters: Vec::new(),
            next_waiter: 0,
            failures: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Details of the current or most recent connection.
    pub fn info(&self) -> Option<&ConnectionInfo> {
        self.info.as_ref()
    }

    /// Whether the connection is up.
    pub fn is_connected(&self) -> bool {
        matches!(self.state, ConnectionState::Connected { .. })
    }

    /// Consecutive failures since the last successful connection.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Number of queued waiters.
    pub fn pending(&self) -> usize {
        self.waiters.len()
    }

    /// Whether a waiter is still queued.
    pub fn is_pending(&self, id: WaiterId) -> bool {
        self.waiters.iter().any(|w| w.id == id)
    }

    /// Register a waiter, or hand it back for immediate firing if connected.
    pub fn register(
        &mut self,
        callback: WaiterCallback,
        deadline: Option<Instant>,
    ) -> (WaiterId, Registration) {
        self.next_waiter += 1;
        let id = WaiterId(self.next_waiter);

        if let Some(info) = self.info.clone().filter(|_| self.is_connected()) {
            return (id, Registration::Ready(callback, info));
        }

        self.waiters.push(Waiter {
            id,
            deadline,
            callback,
        });
        (id, Registration::Queued(id))
    }

    /// Disconnected -> Connected. Releases every waiter with `Ok(info)`.
    pub fn resolve(&mut self, info: ConnectionInfo) -> Fired {
        self.state = ConnectionState::Connected {
            connection_id: info.connection_id.clone(),
        };
        self.info = Some(info.clone());
        self.failures = 0;

        Fired(
            self.waiters
                .drain(..)
                .map(|w| (w.callback, Ok(info.clone())))
                .collect(),
        )
    }

    /// Connected -> Disconnected. Queued waiters keep waiting.
    ///
    /// Returns whether the state changed.
    pub fn disconnect(&mut self) -> bool {
        let was_connected = self.is_connected();
        self.state = ConnectionState::Disconnected;
        was_connected
    }

    /// Record a failed connection attempt and fail every waiter.
    pub fn fail(&mut self, code: i32, message: &str) -> Fired {
        self.disconnect();
        self.failures = self.failures.saturating_add(1);

        Fired(
            self.waiters
                .drain(..)
                .map(|w| {
                    let err = RealtimeError::ConnectionFailed {
                        code,
                        message: message.to_string(),
                    };
                    (w.callback, Err(err))
                })
                .collect(),
        )
    }

    /// Release waiters whose deadline is at or before `now`.
    pub fn expire(&mut self, now: Instant) -> Fired {
        let (expired, kept): (Vec<_>, Vec<_>) = self
            .waiters
            .drain(..)
            .partition(|w| w.deadline.is_some_and(|d| d <= now));
        self.waiters = kept;

        Fired(
            expired
                .into_iter()
                .map(|w| (w.callback, Err(RealtimeError::WaitTimeout)))
                .collect(),
        )
    }

    /// Remove a waiter without firing it.
    pub fn cancel(&mut self, id: WaiterId) -> bool {
        let before = self.waiters.len();
        self.waiters.retain(|w| w.id != id);
        self.waiters.len() != before
    }

    /// Full reset: disconnect, clear failures, and fail every waiter with
    /// [`RealtimeError::ClientReset`].
    pub fn reset(&mut self) -> Fired {
        self.disconnect();
        self.info = None;
        self.failures = 0;

        Fired(
            self.waiters
                .drain(..)
                .map(|w| (w.callback, Err(RealtimeError::ClientReset)))
                .collect(),
        )
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancellation handle for a connection waiter.
#[derive(Debug, Clone)]
pub struct WaiterHandle {
    id: WaiterId,
    tracker: Weak<Mutex<ConnectionTracker>>,
}

impl WaiterHandle {
    pub(crate) fn new(id: WaiterId, tracker: &Arc<Mutex<ConnectionTracker>>) -> Self {
        Self {
            id,
            tracker: Arc::downgrade(tracker),
        }
    }

    /// Waiter id.
    pub fn id(&self) -> WaiterId {
        self.id
    }

    /// Whether the waiter is still queued.
    pub fn is_pending(&self) -> bool {
        self.tracker
            .upgrade()
            .is_some_and(|t| t.lock().is_pending(self.id))
    }

    /// Remove the waiter if it has not fired yet. Returns whether it was removed.
    pub fn cancel(&self) -> bool {
        self.tracker
            .upgrade()
            .is_some_and(|t| t.lock().cancel(self.id))
    }
}
