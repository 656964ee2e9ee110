//! Scalability-protocol cores.
//!
//! Every pattern implements `ProtocolCore`: a policy layer over the pipes
//! its socket owns. The socket base drives it under the socket lock —
//! `send`/`recv` from user threads, pipe and timer events from the owning
//! worker — and reads `events()` after every call to decide who to wake.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use spaceframe_aio::TimerToken;
use spaceframe_core::error::{Result, SpaceframeError};
use spaceframe_core::message::Message;
use spaceframe_core::options::{SocketOption, SocketOptions};

use crate::pipe::{CoreFsm, PipeEnd, PipeId};

pub(crate) mod dist;
pub(crate) mod excl;
pub(crate) mod priolist;

pub(crate) mod bus;
pub(crate) mod pair;
pub(crate) mod pipeline;
pub(crate) mod pubsub;
pub(crate) mod reqrep;
pub(crate) mod survey;

pub(crate) type PipeHandle = Arc<PipeEnd>;

/// Envelope word tagging a request/survey id (high bit set).
pub(crate) const ID_FLAG: u32 = 0x8000_0000;

/// Readiness flags the socket base reads after each protocol call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    /// A `send` would make progress right now.
    pub can_send: bool,
    /// A `recv` would make progress right now.
    pub can_recv: bool,
}

/// Outcome of a protocol-level send.
#[derive(Debug)]
pub(crate) enum SendOutcome {
    /// The message was taken.
    Sent,
    /// No pipe can take it; the caller keeps the message and waits.
    Full(Message),
}

/// Engine services available to a protocol while it runs.
pub(crate) struct ProtoCtx<'a> {
    fsm: &'a Arc<CoreFsm>,
    opts: &'a SocketOptions,
}

impl<'a> ProtoCtx<'a> {
    pub(crate) fn new(fsm: &'a Arc<CoreFsm>, opts: &'a SocketOptions) -> Self {
        Self { fsm, opts }
    }

    /// The socket's options, as currently configured.
    pub(crate) fn opts(&self) -> &SocketOptions {
        self.opts
    }

    /// Arm a one-shot pattern timer; fires back into `on_timer`.
    pub(crate) fn arm_timer(&self, delay: Duration) -> TimerToken {
        self.fsm.arm_timer(delay)
    }

    /// Disarm a pattern timer.
    pub(crate) fn cancel_timer(&self, token: TimerToken) {
        self.fsm.cancel_timer(token);
    }
}

/// One scalability pattern, as a policy over pipes.
///
/// Calls arrive serialized under the socket lock. `send` and `recv` may
/// assume nothing beyond their own bookkeeping: a pipe is only usable
/// between `add_pipe` and `rm_pipe`, and only in a direction it has
/// reported ready.
pub(crate) trait ProtocolCore: Send {
    /// Adopt a new pipe. `Err` rejects it (the socket closes the pipe).
    fn add_pipe(&mut self, pipe: PipeHandle, send_prio: u8, recv_prio: u8) -> Result<()>;

    /// The pipe is gone; drop every reference to it.
    fn rm_pipe(&mut self, ctx: &mut ProtoCtx<'_>, id: PipeId);

    /// The pipe became readable.
    fn pipe_in(&mut self, ctx: &mut ProtoCtx<'_>, id: PipeId);

    /// The pipe became writable.
    fn pipe_out(&mut self, ctx: &mut ProtoCtx<'_>, id: PipeId);

    /// Route one outgoing message.
    fn send(&mut self, ctx: &mut ProtoCtx<'_>, msg: Message) -> Result<SendOutcome>;

    /// Produce one incoming message, or `Again` when none is deliverable.
    fn recv(&mut self, ctx: &mut ProtoCtx<'_>) -> Result<Message>;

    /// Current readiness flags.
    fn events(&self) -> Readiness;

    /// Apply a pattern option. `Ok(false)` means "not mine".
    fn set_option(&mut self, option: &SocketOption) -> Result<bool> {
        let _ = option;
        Ok(false)
    }

    /// A pattern timer armed through `ProtoCtx` fired.
    fn on_timer(&mut self, ctx: &mut ProtoCtx<'_>, token: TimerToken) {
        let _ = (ctx, token);
    }
}

/// The scalability patterns.
///
/// The `X`-prefixed variants are the raw flavor: no envelope is added or
/// stripped for the user, which is what bridging devices compose with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Pair,
    XPair,
    Push,
    XPush,
    Pull,
    XPull,
    Pub,
    XPub,
    Sub,
    XSub,
    Req,
    XReq,
    Rep,
    XRep,
    Surveyor,
    XSurveyor,
    Respondent,
    XRespondent,
    Bus,
    XBus,
}

impl Protocol {
    /// The pattern name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pair => "PAIR",
            Self::XPair => "XPAIR",
            Self::Push => "PUSH",
            Self::XPush => "XPUSH",
            Self::Pull => "PULL",
            Self::XPull => "XPULL",
            Self::Pub => "PUB",
            Self::XPub => "XPUB",
            Self::Sub => "SUB",
            Self::XSub => "XSUB",
            Self::Req => "REQ",
            Self::XReq => "XREQ",
            Self::Rep => "REP",
            Self::XRep => "XREP",
            Self::Surveyor => "SURVEYOR",
            Self::XSurveyor => "XSURVEYOR",
            Self::Respondent => "RESPONDENT",
            Self::XRespondent => "XRESPONDENT",
            Self::Bus => "BUS",
            Self::XBus => "XBUS",
        }
    }

    /// True for the raw flavor of a pattern.
    #[must_use]
    pub const fn is_raw(self) -> bool {
        matches!(
            self,
            Self::XPair
                | Self::XPush
                | Self::XPull
                | Self::XPub
                | Self::XSub
                | Self::XReq
                | Self::XRep
                | Self::XSurveyor
                | Self::XRespondent
                | Self::XBus
        )
    }

    /// The cooked pattern this protocol belongs to.
    #[must_use]
    pub const fn base(self) -> Self {
        match self {
            Self::XPair => Self::Pair,
            Self::XPush => Self::Push,
            Self::XPull => Self::Pull,
            Self::XPub => Self::Pub,
            Self::XSub => Self::Sub,
            Self::XReq => Self::Req,
            Self::XRep => Self::Rep,
            Self::XSurveyor => Self::Surveyor,
            Self::XRespondent => Self::Respondent,
            Self::XBus => Self::Bus,
            other => other,
        }
    }

    /// Whether two sockets of these protocols may share a pipe.
    #[must_use]
    pub const fn compatible_with(self, peer: Self) -> bool {
        matches!(
            (self.base(), peer.base()),
            (Self::Pair, Self::Pair)
                | (Self::Push, Self::Pull)
                | (Self::Pull, Self::Push)
                | (Self::Pub, Self::Sub)
                | (Self::Sub, Self::Pub)
                | (Self::Req, Self::Rep)
                | (Self::Rep, Self::Req)
                | (Self::Surveyor, Self::Respondent)
                | (Self::Respondent, Self::Surveyor)
                | (Self::Bus, Self::Bus)
        )
    }

    /// Build the pattern state for a new socket.
    pub(crate) fn instantiate(self) -> Box<dyn ProtocolCore> {
        match self {
            Self::Pair | Self::XPair => Box::new(pair::Pair::new()),
            Self::Push | Self::XPush => Box::new(pipeline::Push::new()),
            Self::Pull | Self::XPull => Box::new(pipeline::Pull::new()),
            Self::Pub | Self::XPub => Box::new(pubsub::Pub::new()),
            Self::Sub => Box::new(pubsub::Sub::new()),
            Self::XSub => Box::new(pubsub::XSub::new()),
            Self::Req => Box::new(reqrep::Req::new()),
            Self::XReq => Box::new(reqrep::XReq::new()),
            Self::Rep => Box::new(reqrep::Rep::new()),
            Self::XRep => Box::new(reqrep::XRep::new()),
            Self::Surveyor => Box::new(survey::Surveyor::new()),
            Self::XSurveyor => Box::new(survey::XSurveyor::new()),
            Self::Respondent => Box::new(survey::Respondent::new()),
            Self::XRespondent => Box::new(survey::XRespondent::new()),
            Self::Bus => Box::new(bus::Bus::new()),
            Self::XBus => Box::new(bus::XBus::new()),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = SpaceframeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PAIR" => Ok(Self::Pair),
            "XPAIR" => Ok(Self::XPair),
            "PUSH" => Ok(Self::Push),
            "XPUSH" => Ok(Self::XPush),
            "PULL" => Ok(Self::Pull),
            "XPULL" => Ok(Self::XPull),
            "PUB" => Ok(Self::Pub),
            "XPUB" => Ok(Self::XPub),
            "SUB" => Ok(Self::Sub),
            "XSUB" => Ok(Self::XSub),
            "REQ" => Ok(Self::Req),
            "XREQ" => Ok(Self::XReq),
            "REP" => Ok(Self::Rep),
            "XREP" => Ok(Self::XRep),
            "SURVEYOR" => Ok(Self::Surveyor),
            "XSURVEYOR" => Ok(Self::XSurveyor),
            "RESPONDENT" => Ok(Self::Respondent),
            "XRESPONDENT" => Ok(Self::XRespondent),
            "BUS" => Ok(Self::Bus),
            "XBUS" => Ok(Self::XBus),
            _ => Err(SpaceframeError::InvalidOption("unknown protocol name")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_compatibility() {
        assert!(Protocol::Pair.compatible_with(Protocol::Pair));
        assert!(Protocol::Push.compatible_with(Protocol::Pull));
        assert!(Protocol::Sub.compatible_with(Protocol::XPub));
        assert!(Protocol::XReq.compatible_with(Protocol::Rep));
        assert!(Protocol::Bus.compatible_with(Protocol::XBus));
        assert!(Protocol::Surveyor.compatible_with(Protocol::Respondent));

        assert!(!Protocol::Push.compatible_with(Protocol::Push));
        assert!(!Protocol::Req.compatible_with(Protocol::Sub));
        assert!(!Protocol::Pub.compatible_with(Protocol::Pub));
    }

    #[test]
    fn raw_flavors() {
        assert!(Protocol::XRep.is_raw());
        assert!(!Protocol::Rep.is_raw());
        assert_eq!(Protocol::XSurveyor.base(), Protocol::Surveyor);
    }

    #[test]
    fn parse_names() {
        assert_eq!("pair".parse::<Protocol>().unwrap(), Protocol::Pair);
        assert_eq!("XREP".parse::<Protocol>().unwrap(), Protocol::XRep);
        assert!("DEALER".parse::<Protocol>().is_err());
    }
}
