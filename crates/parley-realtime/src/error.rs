//! Error types for the real-time module.

use thiserror::Error;

/// Errors that can occur in real-time operations.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Invalid composite channel id.
    #[error("invalid channel: {0}")]
    InvalidChannel(String),

    /// Channel is not in the active set.
    #[error("channel not watched: {0}")]
    ChannelNotWatched(String),

    /// Active channel limit exceeded.
    #[error("active channel limit exceeded: max {0} channels")]
    ChannelLimit(usize),

    /// The transport reported a connection failure.
    #[error("connection failed ({code}): {message}")]
    ConnectionFailed {
        /// Transport-specific error code.
        code: i32,
        /// Human-readable reason.
        message: String,
    },

    /// A connection waiter passed its deadline.
    #[error("timed out waiting for connection")]
    WaitTimeout,

    /// The client was reset while the operation was pending.
    #[error("client was reset")]
    ClientReset,

    /// Channel closed.
    #[error("channel closed")]
    ChannelClosed,

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for real-time operations.
pub type Result<T> = std::result::Result<T, RealtimeError>;
