//! Socket configuration options.
//!
//! `SocketOptions` is the per-socket option store; every field maps one of
//! the library's socket-level options. `SocketOption` is the runtime edit
//! applied through `set_option`, including the subscription edits that are
//! routed to the pattern rather than stored here.

use std::time::Duration;

use bytes::Bytes;

use crate::error::{Result, SpaceframeError};

/// Lowest endpoint priority class.
pub const PRIORITY_MIN: u8 = 1;
/// Highest endpoint priority class (numerically largest, logically last).
pub const PRIORITY_MAX: u8 = 16;

/// Per-socket option values.
///
/// Timeouts follow the convention used throughout the library:
/// - `None`: block indefinitely
/// - `Some(Duration::ZERO)`: non-blocking, fail with `Again` immediately
/// - `Some(d)`: wait up to `d`, then fail with `TimedOut`
///
/// # Examples
///
/// ```
/// use spaceframe_core::options::SocketOptions;
/// use std::time::Duration;
///
/// let opts = SocketOptions::default()
///     .with_recv_timeout(Some(Duration::from_secs(5)))
///     .with_linger(Some(Duration::from_millis(200)));
/// ```
#[derive(Debug, Clone)]
pub struct SocketOptions {
    /// Maximum time to flush pending sends on close. `None` discards
    /// pending messages immediately.
    pub linger: Option<Duration>,

    /// Per-pipe outbound high-water mark in bytes.
    pub send_buffer: usize,

    /// Per-pipe inbound high-water mark in bytes.
    pub recv_buffer: usize,

    /// Blocking deadline for `send`.
    pub send_timeout: Option<Duration>,

    /// Blocking deadline for `recv`.
    pub recv_timeout: Option<Duration>,

    /// Initial reconnection delay for reconnecting endpoints.
    pub reconnect_ivl: Duration,

    /// Backoff ceiling; `Duration::ZERO` disables backoff growth.
    pub reconnect_ivl_max: Duration,

    /// Priority class stamped on pipes of subsequently created endpoints,
    /// send side. Lower numbers are served first.
    pub send_priority: u8,

    /// Priority class for the receive side.
    pub recv_priority: u8,

    /// Restrict name resolution to IPv4.
    pub ipv4_only: bool,

    /// Debug label carried in trace output.
    pub socket_name: String,

    /// Reject messages larger than this many wire bytes. `None` = no limit.
    pub max_msg_size: Option<usize>,

    /// Maximum hop count tolerated on BUS/SURVEY envelopes.
    pub max_ttl: u8,

    /// REQ retransmission interval.
    pub resend_ivl: Duration,

    /// SURVEYOR response deadline.
    pub survey_deadline: Duration,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            linger: Some(Duration::from_secs(1)),
            send_buffer: 128 * 1024,
            recv_buffer: 128 * 1024,
            send_timeout: None,
            recv_timeout: None,
            reconnect_ivl: Duration::from_millis(100),
            reconnect_ivl_max: Duration::ZERO,
            send_priority: 8,
            recv_priority: 8,
            ipv4_only: true,
            socket_name: String::new(),
            max_msg_size: None,
            max_ttl: 8,
            resend_ivl: Duration::from_secs(60),
            survey_deadline: Duration::from_secs(1),
        }
    }
}

impl SocketOptions {
    /// Create options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the linger window.
    #[must_use]
    pub fn with_linger(mut self, linger: Option<Duration>) -> Self {
        self.linger = linger;
        self
    }

    /// Set the outbound high-water mark in bytes.
    #[must_use]
    pub fn with_send_buffer(mut self, bytes: usize) -> Self {
        self.send_buffer = bytes;
        self
    }

    /// Set the inbound high-water mark in bytes.
    #[must_use]
    pub fn with_recv_buffer(mut self, bytes: usize) -> Self {
        self.recv_buffer = bytes;
        self
    }

    /// Set the send deadline.
    #[must_use]
    pub fn with_send_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Set the receive deadline.
    #[must_use]
    pub fn with_recv_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.recv_timeout = timeout;
        self
    }

    /// Set the base reconnection interval.
    #[must_use]
    pub fn with_reconnect_ivl(mut self, ivl: Duration) -> Self {
        self.reconnect_ivl = ivl;
        self
    }

    /// Set the reconnection backoff ceiling.
    #[must_use]
    pub fn with_reconnect_ivl_max(mut self, max: Duration) -> Self {
        self.reconnect_ivl_max = max;
        self
    }

    /// Set the REQ retransmission interval.
    #[must_use]
    pub fn with_resend_ivl(mut self, ivl: Duration) -> Self {
        self.resend_ivl = ivl;
        self
    }

    /// Set the SURVEYOR deadline.
    #[must_use]
    pub fn with_survey_deadline(mut self, deadline: Duration) -> Self {
        self.survey_deadline = deadline;
        self
    }

    /// Set the maximum accepted message size.
    #[must_use]
    pub fn with_max_msg_size(mut self, max: Option<usize>) -> Self {
        self.max_msg_size = max;
        self
    }

    /// True when `send` must not block.
    #[must_use]
    pub fn is_send_nonblocking(&self) -> bool {
        matches!(self.send_timeout, Some(d) if d.is_zero())
    }

    /// True when `recv` must not block.
    #[must_use]
    pub fn is_recv_nonblocking(&self) -> bool {
        matches!(self.recv_timeout, Some(d) if d.is_zero())
    }

    /// Apply a runtime option edit to this store.
    ///
    /// Pattern-routed edits (`Subscribe`/`Unsubscribe`) are not stored here;
    /// callers must hand them to the pattern and never pass them in.
    ///
    /// # Errors
    ///
    /// `InvalidOption` when a value is out of range or the edit is not a
    /// stored option.
    pub fn apply(&mut self, option: SocketOption) -> Result<()> {
        match option {
            SocketOption::Linger(v) => self.linger = v,
            SocketOption::SendBuffer(v) => {
                if v == 0 {
                    return Err(SpaceframeError::InvalidOption("send buffer must be > 0"));
                }
                self.send_buffer = v;
            }
            SocketOption::RecvBuffer(v) => {
                if v == 0 {
                    return Err(SpaceframeError::InvalidOption("recv buffer must be > 0"));
                }
                self.recv_buffer = v;
            }
            SocketOption::SendTimeout(v) => self.send_timeout = v,
            SocketOption::RecvTimeout(v) => self.recv_timeout = v,
            SocketOption::ReconnectIvl(v) => self.reconnect_ivl = v,
            SocketOption::ReconnectIvlMax(v) => self.reconnect_ivl_max = v,
            SocketOption::SendPriority(v) => {
                self.send_priority = check_priority(v)?;
            }
            SocketOption::RecvPriority(v) => {
                self.recv_priority = check_priority(v)?;
            }
            SocketOption::Ipv4Only(v) => self.ipv4_only = v,
            SocketOption::SocketName(v) => self.socket_name = v,
            SocketOption::MaxMsgSize(v) => self.max_msg_size = v,
            SocketOption::MaxTtl(v) => {
                if v == 0 {
                    return Err(SpaceframeError::InvalidOption("max ttl must be > 0"));
                }
                self.max_ttl = v;
            }
            SocketOption::ResendIvl(v) => self.resend_ivl = v,
            SocketOption::SurveyDeadline(v) => self.survey_deadline = v,
            SocketOption::Subscribe(_) | SocketOption::Unsubscribe(_) => {
                return Err(SpaceframeError::InvalidOption(
                    "subscription edits are pattern options",
                ));
            }
        }
        Ok(())
    }
}

fn check_priority(v: u8) -> Result<u8> {
    if (PRIORITY_MIN..=PRIORITY_MAX).contains(&v) {
        Ok(v)
    } else {
        Err(SpaceframeError::InvalidOption("priority out of range 1..=16"))
    }
}

/// A runtime option edit.
///
/// Most variants update the `SocketOptions` store; `Subscribe` and
/// `Unsubscribe` are routed to the pattern (SUB-family only).
#[derive(Debug, Clone)]
pub enum SocketOption {
    Linger(Option<Duration>),
    SendBuffer(usize),
    RecvBuffer(usize),
    SendTimeout(Option<Duration>),
    RecvTimeout(Option<Duration>),
    ReconnectIvl(Duration),
    ReconnectIvlMax(Duration),
    SendPriority(u8),
    RecvPriority(u8),
    Ipv4Only(bool),
    SocketName(String),
    MaxMsgSize(Option<usize>),
    MaxTtl(u8),
    ResendIvl(Duration),
    SurveyDeadline(Duration),
    Subscribe(Bytes),
    Unsubscribe(Bytes),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let opts = SocketOptions::default();
        assert_eq!(opts.linger, Some(Duration::from_secs(1)));
        assert_eq!(opts.send_buffer, 128 * 1024);
        assert!(opts.send_timeout.is_none());
        assert_eq!(opts.send_priority, 8);
        assert_eq!(opts.max_ttl, 8);
        assert!(!opts.is_send_nonblocking());
    }

    #[test]
    fn builder_pattern() {
        let opts = SocketOptions::new()
            .with_recv_timeout(Some(Duration::ZERO))
            .with_send_buffer(64)
            .with_resend_ivl(Duration::from_millis(200));
        assert!(opts.is_recv_nonblocking());
        assert_eq!(opts.send_buffer, 64);
        assert_eq!(opts.resend_ivl, Duration::from_millis(200));
    }

    #[test]
    fn apply_edits() {
        let mut opts = SocketOptions::default();
        opts.apply(SocketOption::Linger(None)).unwrap();
        opts.apply(SocketOption::SendPriority(2)).unwrap();
        assert_eq!(opts.linger, None);
        assert_eq!(opts.send_priority, 2);
    }

    #[test]
    fn apply_rejects_bad_values() {
        let mut opts = SocketOptions::default();
        assert!(opts.apply(SocketOption::SendPriority(0)).is_err());
        assert!(opts.apply(SocketOption::SendPriority(17)).is_err());
        assert!(opts.apply(SocketOption::RecvBuffer(0)).is_err());
        assert!(opts
            .apply(SocketOption::Subscribe(Bytes::from_static(b"x")))
            .is_err());
    }
}
