//! PUSH/PULL: one-way pipeline with load-balanced send and fair-queued
//! receive.

use spaceframe_core::error::{Result, SpaceframeError};
use spaceframe_core::message::Message;

use crate::pipe::PipeId;

use super::priolist::PrioList;
use super::{PipeHandle, ProtoCtx, ProtocolCore, Readiness, SendOutcome};

/// Pipeline sender: round-robin over writable pipes, never receives.
pub(crate) struct Push {
    lb: PrioList,
}

impl Push {
    pub(crate) fn new() -> Self {
        Self { lb: PrioList::new() }
    }
}

impl ProtocolCore for Push {
    fn add_pipe(&mut self, pipe: PipeHandle, send_prio: u8, _recv_prio: u8) -> Result<()> {
        self.lb.register(pipe, send_prio);
        Ok(())
    }

    fn rm_pipe(&mut self, _ctx: &mut ProtoCtx<'_>, id: PipeId) {
        self.lb.unregister(id);
    }

    fn pipe_in(&mut self, _ctx: &mut ProtoCtx<'_>, _id: PipeId) {
        // A conforming PULL peer never sends.
    }

    fn pipe_out(&mut self, _ctx: &mut ProtoCtx<'_>, id: PipeId) {
        self.lb.activate(id);
    }

    fn send(&mut self, _ctx: &mut ProtoCtx<'_>, msg: Message) -> Result<SendOutcome> {
        Ok(self.lb.send_outcome(msg))
    }

    fn recv(&mut self, _ctx: &mut ProtoCtx<'_>) -> Result<Message> {
        Err(SpaceframeError::NotSupported)
    }

    fn events(&self) -> Readiness {
        Readiness {
            can_send: self.lb.has_ready(),
            can_recv: false,
        }
    }
}

/// Pipeline receiver: fair-queue over readable pipes, never sends.
pub(crate) struct Pull {
    fq: PrioList,
}

impl Pull {
    pub(crate) fn new() -> Self {
        Self { fq: PrioList::new() }
    }
}

impl ProtocolCore for Pull {
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
