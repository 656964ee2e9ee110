//! BUS: every peer hears every message except its originator's echo.
//!
//! Raw receive tags each message with the pipe it arrived on; raw send
//! reads that outermost word to exclude the arrival pipe while the hop
//! list keeps travelling for TTL accounting. Cooked BUS originates with an
//! empty envelope (everyone hears) and strips the envelope on delivery.

use spaceframe_core::error::{Result, SpaceframeError};
use spaceframe_core::message::Message;
use tracing::trace;

use crate::pipe::PipeId;

use super::dist::Dist;
use super::priolist::PrioList;
use super::{PipeHandle, ProtoCtx, ProtocolCore, Readiness, SendOutcome};

/// Raw bus node: envelope words are the hop list, newest first.
pub(crate) struct XBus {
    dist: Dist,
    fq: PrioList,
}

impl XBus {
    pub(crate) fn new() -> Self {
        Self {
            dist: Dist::new(),
            fq: PrioList::new(),
        }
    }
}

impl ProtocolCore for XBus {
    fn add_pipe(&mut self, pipe: PipeHandle, _send_prio: u8, recv_prio: u8) -> Result<()> {
        self.dist.add(pipe.clone());
        self.fq.register(pipe, recv_prio);
        Ok(())
    }

    fn rm_pipe(&mut self, _ctx: &mut ProtoCtx<'_>, id: PipeId) {
        self.dist.rm(id);
        self.fq.unregister(id);
    }

    fn pipe_in(&mut self, _ctx: &mut ProtoCtx<'_>, id: PipeId) {
        self.fq.activate(id);
    }

    fn pipe_out(&mut self, _ctx: &mut ProtoCtx<'_>, id: PipeId) {
        self.dist.on_out(id);
    }

    fn send(&mut self, _ctx: &mut ProtoCtx<'_>, msg: Message) -> Result<SendOutcome> {
        // A forwarded message names its arrival pipe in the outermost word;
        // everyone but that pipe hears it.
        let exclude = msg.peek_header_word();
        self.dist.send(&msg, exclude);
        Ok(SendOutcome::Sent)
    }

    fn recv(&mut self, ctx: &mut ProtoCtx<'_>) -> Result<Message> {
        let max_ttl = usize::from(ctx.opts().max_ttl);
        while let Some((pipe, mut msg)) = self.fq.recv_one() {
            if msg.header_word_count() >= max_ttl {
                trace!("bus message exceeded hop limit, dropped");
                continue;
            }
            msg.push_header_word(pipe);
            return Ok(msg);
        }
        Err(SpaceframeError::Again)
    }

    fn events(&self) -> Readiness {
        Readiness {
            can_send: true,
            can_recv: self.fq.has_ready(),
        }
    }
}

/// Cooked bus node: originate to everyone, deliver bodies only.
pub(crate) struct Bus {
    raw: XBus,
}

impl Bus {
    pub(crate) fn new() -> Self {
        Self { raw: XBus::new() }
    }
}

impl ProtocolCore for Bus {
    fn add_pipe(&mut self, pipe: PipeHandle, send_prio: u8, recv_prio: u8) -> Result<()> {
        self.raw.add_pipe(pipe, send_prio, recv_prio)
    }

    fn rm_pipe(&mut self, ctx: &mut ProtoCtx<'_>, id: PipeId) {
        self.raw.rm_pipe(ctx, id);
    }

    fn pipe_in(&mut self, ctx: &mut ProtoCtx<'_>, id: PipeId) {
        self.raw.pipe_in(ctx, id);
    }

    fn pipe_out(&mut self, ctx: &mut ProtoCtx<'_>, id: PipeId) {
        self.raw.pipe_out(ctx, id);
    }

    fn send(&mut self, ctx: &mut ProtoCtx<'_>, msg: Message) -> Result<SendOutcome> {
        // Originated here: fresh envelope, no exclusion.
        let mut msg = msg;
        msg.clear_header();
        self.raw.send(ctx, msg)
    }

    fn recv(&mut self, ctx: &mut ProtoCtx<'_>) -> Result<Message> {
        let msg = self.raw.recv(ctx)?;
        Ok(Message::from_body(msg.into_body()))
    }

    fn events(&self) -> Readiness {
        self.raw.events()
    }
}
