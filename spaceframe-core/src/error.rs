//! Spaceframe error types.
//!
//! One error enum for every operation surfaced by the library. Engine-level
//! I/O failures fold in through `Io`; everything else maps one of the
//! documented public error kinds.

use std::io;
use thiserror::Error;

/// Main error type for spaceframe operations.
#[derive(Error, Debug)]
pub enum SpaceframeError {
    /// A non-blocking operation would have to block.
    #[error("operation would block")]
    Again,

    /// A blocking operation exceeded its configured deadline.
    #[error("operation timed out")]
    TimedOut,

    /// The operation was interrupted by a socket close.
    #[error("operation interrupted by socket close")]
    Interrupted,

    /// The owning context is terminating; no further work is accepted.
    #[error("context is terminating")]
    Terminating,

    /// Unknown, already-closed, or foreign socket handle.
    #[error("unknown or closed socket handle")]
    BadHandle,

    /// The address string does not parse or names an unknown transport.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// An option value was rejected or the option does not apply.
    #[error("invalid option: {0}")]
    InvalidOption(&'static str),

    /// A peer violated the pattern envelope.
    #[error("protocol violation: {0}")]
    Protocol(&'static str),

    /// The operation is not legal in the pattern's current state.
    #[error("operation not allowed in current state: {0}")]
    BadState(&'static str),

    /// The pattern never supports this operation (e.g. receiving on PUB).
    #[error("operation not supported by this protocol")]
    NotSupported,

    /// The endpoint name or address is already bound.
    #[error("address already in use: {0}")]
    AddrInUse(String),

    /// The address cannot be serviced (no such bound name, no such interface).
    #[error("address not available: {0}")]
    AddrNotAvailable(String),

    /// Message exceeds the configured maximum size.
    #[error("message of {size} bytes exceeds limit of {max}")]
    MessageTooLarge { size: usize, max: usize },

    /// I/O error from the engine or a transport.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for spaceframe operations.
pub type Result<T> = std::result::Result<T, SpaceframeError>;

impl SpaceframeError {
    /// True for errors a caller is expected to retry around: the operation
    /// itself is fine, it just could not complete right now.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Again | Self::TimedOut | Self::Interrupted)
    }

    /// True when the target socket or context is gone for good.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::BadHandle | Self::Terminating)
    }
}
