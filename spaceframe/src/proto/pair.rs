//! PAIR: exactly one peer, messages pass verbatim.

use spaceframe_aio::TimerToken;
use spaceframe_core::error::{Result, SpaceframeError};
use spaceframe_core::message::Message;

use crate::pipe::PipeId;

use super::excl::Excl;
use super::{PipeHandle, ProtoCtx, ProtocolCore, Readiness, SendOutcome};

/// Exclusive-pair pattern; also serves the raw flavor, which carries no
/// envelope either.
pub(crate) struct Pair {
    excl: Excl,
}

impl Pair {
    pub(crate) fn new() -> Self {
        Self { excl: Excl::new() }
    }
}

impl ProtocolCore for Pair {
    fn add_pipe(&mut self, pipe: PipeHandle, _send_prio: u8, _recv_prio: u8) -> Result<()> {
        if self.excl.add(pipe) {
            Ok(())
        } else {
            Err(SpaceframeError::Protocol("pair socket already has a peer"))
        }
    }

    fn rm_pipe(&mut self, _ctx: &mut ProtoCtx<'_>, id: PipeId) {
        self.excl.rm(id);
    }

    fn pipe_in(&mut self, _ctx: &mut ProtoCtx<'_>, id: PipeId) {
        self.excl.on_in(id);
    }

    fn pipe_out(&mut self, _ctx: &mut ProtoCtx<'_>, id: PipeId) {
        self.excl.on_out(id);
    }

    fn send(&mut self, _ctx: &mut ProtoCtx<'_>, msg: Message) -> Result<SendOutcome> {
        Ok(self.excl.send(msg))
    }

    fn recv(&mut self, _ctx: &mut ProtoCtx<'_>) -> Result<Message> {
        self.excl.recv().ok_or(SpaceframeError::Again)
    }

    fn events(&self) -> Readiness {
        Readiness {
            can_send: self.excl.can_send(),
            can_recv: self.excl.can_recv(),
        }
    }

    fn on_timer(&mut self, _ctx: &mut ProtoCtx<'_>, _token: TimerToken) {}
}
