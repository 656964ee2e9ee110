//! Reconnect backoff bookkeeping.
//!
//! Reconnecting transports (TCP, IPC, WS) sit outside this library but share
//! one contract: after a connection failure they retry with exponential
//! backoff bounded by the socket's reconnect-interval options. This tracker
//! owns that schedule.

use std::time::Duration;

use crate::options::SocketOptions;

/// Reconnection attempt tracker with exponential backoff.
///
/// # Examples
///
/// ```
/// use spaceframe_core::backoff::ReconnectState;
/// use spaceframe_core::options::SocketOptions;
/// use std::time::Duration;
///
/// let opts = SocketOptions::default()
///     .with_reconnect_ivl(Duration::from_millis(100))
///     .with_reconnect_ivl_max(Duration::from_secs(2));
/// let mut backoff = ReconnectState::new(&opts);
///
/// assert_eq!(backoff.next_delay(), Duration::from_millis(100));
/// assert_eq!(backoff.next_delay(), Duration::from_millis(200));
/// backoff.reset();
/// assert_eq!(backoff.next_delay(), Duration::from_millis(100));
/// ```
#[derive(Debug, Clone)]
pub struct ReconnectState {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl ReconnectState {
    /// Create a tracker from the socket's reconnect options.
    #[must_use]
    pub const fn new(options: &SocketOptions) -> Self {
        Self {
            base: options.reconnect_ivl,
            max: options.reconnect_ivl_max,
            attempt: 0,
        }
    }

    /// Delay to wait before the next reconnection attempt.
    ///
    /// Doubles per attempt up to the configured ceiling; with a zero ceiling
    /// the base interval is used every time.
    pub fn next_delay(&mut self) -> Duration {
        let delay = if self.max.is_zero() {
            self.base
        } else {
            let scaled = self.base.saturating_mul(1 << self.attempt.min(16));
            scaled.min(self.max)
        };
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Reset the schedule after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Number of attempts since the last reset.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }
}
