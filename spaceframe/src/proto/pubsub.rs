//! PUB/SUB: broadcast distribution with receiver-side prefix filtering.
//!
//! PUB copies each outgoing message to every writable pipe and drops it for
//! the rest; it never blocks and never receives. SUB keeps a subscription
//! trie and delivers only messages whose body carries a subscribed prefix.
//! The raw XSUB does no filtering at all: it fair-queues every message
//! through unmodified, which is what bridging devices sit on.

use spaceframe_core::error::{Result, SpaceframeError};
use spaceframe_core::message::Message;
use spaceframe_core::options::SocketOption;
use spaceframe_core::trie::SubscriptionTrie;
use tracing::trace;

use crate::pipe::PipeId;

use super::dist::Dist;
use super::priolist::PrioList;
use super::{PipeHandle, ProtoCtx, ProtocolCore, Readiness, SendOutcome};

/// Publisher: distribute to all writable pipes.
pub(crate) struct Pub {
    dist: Dist,
}

impl Pub {
    pub(crate) fn new() -> Self {
        Self { dist: Dist::new() }
    }
}

impl ProtocolCore for Pub {
    fn add_pipe(&mut self, pipe: PipeHandle, _send_prio: u8, _recv_prio: u8) -> Result<()> {
        self.dist.add(pipe);
        Ok(())
    }

    fn rm_pipe(&mut self, _ctx: &mut ProtoCtx<'_>, id: PipeId) {
        self.dist.rm(id);
    }

    fn pipe_in(&mut self, _ctx: &mut ProtoCtx<'_>, _id: PipeId) {
        // Subscribers do not talk back in this pattern.
    }

    fn pipe_out(&mut self, _ctx: &mut ProtoCtx<'_>, id: PipeId) {
        self.dist.on_out(id);
    }

    fn send(&mut self, _ctx: &mut ProtoCtx<'_>, msg: Message) -> Result<SendOutcome> {
        // Drop-for-slow semantics: delivery count is best effort.
        self.dist.send(&msg, None);
        Ok(SendOutcome::Sent)
    }

    fn recv(&mut self, _ctx: &mut ProtoCtx<'_>) -> Result<Message> {
        Err(SpaceframeError::NotSupported)
    }

    fn events(&self) -> Readiness {
        Readiness {
            can_send: true,
            can_recv: false,
        }
    }
}

/// Subscriber: fair-queue across pipes, filter through the trie.
pub(crate) struct Sub {
    fq: PrioList,
    subscriptions: SubscriptionTrie,
}

impl Sub {
    pub(crate) fn new() -> Self {
        Self {
            fq: PrioList::new(),
            subscriptions: SubscriptionTrie::new(),
        }
    }
}

impl ProtocolCore for Sub {
    fn add_pipe(&mut self, pipe: PipeHandle, _send_prio: u8, recv_prio: u8) -> Result<()> {
        self.fq.register(pipe, recv_prio);
        Ok(())
    }

    fn rm_pipe(&mut self, _ctx: &mut ProtoCtx<'_>, id: PipeId) {
        self.fq.unregister(id);
    }

    fn pipe_in(&mut self, _ctx: &mut ProtoCtx<'_>, id: PipeId) {
        self.fq.activate(id);
    }

    fn pipe_out(&mut self, _ctx: &mut ProtoCtx<'_>, _id: PipeId) {}

    fn send(&mut self, _ctx: &mut ProtoCtx<'_>, _msg: Message) -> Result<SendOutcome> {
        Err(SpaceframeError::NotSupported)
    }

    fn recv(&mut self, _ctx: &mut ProtoCtx<'_>) -> Result<Message> {
        // Unmatched messages are consumed and discarded here, so a slow
        // subscriber only queues what it asked for.
        while let Some((_, msg)) = self.fq.recv_one() {
            if self.subscriptions.matches(msg.body()) {
                return Ok(msg);
            }
            trace!(len = msg.len(), "message dropped by subscription filter");
        }
        Err(SpaceframeError::Again)
    }

    fn events(&self) -> Readiness {
        Readiness {
            can_send: false,
            can_recv: self.fq.has_ready(),
        }
    }

    fn set_option(&mut self, option: &SocketOption) -> Result<bool> {
        match option {
            SocketOption::Subscribe(prefix) => {
                self.subscriptions.subscribe(prefix);
                Ok(true)
            }
            SocketOption::Unsubscribe(prefix) => {
                self.subscriptions.unsubscribe(prefix);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Raw subscriber: fair-queue across pipes, no filtering, no envelope
/// processing.
pub(crate) struct XSub {
    fq: PrioList,
}

impl XSub {
    pub(crate) fn new() -> Self {
        Self {
            fq: PrioList::new(),
        }
    }
}

impl ProtocolCore for XSub {
    fn add_pipe(&mut self, pipe: PipeHandle, _send_prio: u8, recv_prio: u8) -> Result<()> {
        self.fq.register(pipe, recv_prio);
        Ok(())
    }

    fn rm_pipe(&mut self, _ctx: &mut ProtoCtx<'_>, id: PipeId) {
        self.fq.unregister(id);
    }

    fn pipe_in(&mut self, _ctx: &mut ProtoCtx<'_>, id: PipeId) {
        self.fq.activate(id);
    }

    fn pipe_out(&mut self, _ctx: &mut ProtoCtx<'_>, _id: PipeId) {}

    fn send(&mut self, _ctx: &mut ProtoCtx<'_>, _msg: Message) -> Result<SendOutcome> {
        Err(SpaceframeError::NotSupported)
    }

    fn recv(&mut self, _ctx: &mut ProtoCtx<'_>) -> Result<Message> {
        match self.fq.recv_one() {
            Some((_, msg)) => Ok(msg),
            None => Err(SpaceframeError::Again),
        }
    }

    fn events(&self) -> Readiness {
        Readiness {
            can_send: false,
            can_recv: self.fq.has_ready(),
        }
    }
}
