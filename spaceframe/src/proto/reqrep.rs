//! REQ/REP: request/reply with retransmission.
//!
//! A request travels with a synthetic envelope word: a fresh 31-bit id with
//! the high bit set. REQ load-balances the request to one pipe, arms a
//! resend timer, and matches replies by id; REP saves the incoming routing
//! stack and reattaches it on the reply so the raw layer routes it back to
//! the originating pipe. The raw flavors expose the envelope untouched.

use bytes::Bytes;
use hashbrown::HashMap;
use rand::Rng;
use spaceframe_aio::TimerToken;
use spaceframe_core::error::{Result, SpaceframeError};
use spaceframe_core::message::Message;
use tracing::trace;

use crate::pipe::{PipeId, PipeSendStatus};

use super::priolist::PrioList;
use super::{PipeHandle, ProtoCtx, ProtocolCore, Readiness, SendOutcome, ID_FLAG};

/// Raw request side: load-balanced send, fair-queued receive, envelope
/// owned by the caller.
pub(crate) struct XReq {
    lb: PrioList,
    fq: PrioList,
}

impl XReq {
    pub(crate) fn new() -> Self {
        Self {
            lb: PrioList::new(),
            fq: PrioList::new(),
        }
    }
}

impl ProtocolCore for XReq {
    fn add_pipe(&mut self, pipe: PipeHandle, send_prio: u8, recv_prio: u8) -> Result<()> {
        self.lb.register(pipe.clone(), send_prio);
        self.fq.register(pipe, recv_prio);
        Ok(())
    }

    fn rm_pipe(&mut self, _ctx: &mut ProtoCtx<'_>, id: PipeId) {
        self.lb.unregister(id);
        self.fq.unregister(id);
    }

    fn pipe_in(&mut self, _ctx: &mut ProtoCtx<'_>, id: PipeId) {
        self.fq.activate(id);
    }

    fn pipe_out(&mut self, _ctx: &mut ProtoCtx<'_>, id: PipeId) {
        self.lb.activate(id);
    }

    fn send(&mut self, _ctx: &mut ProtoCtx<'_>, msg: Message) -> Result<SendOutcome> {
        Ok(self.lb.send_outcome(msg))
    }

    fn recv(&mut self, _ctx: &mut ProtoCtx<'_>) -> Result<Message> {
        match self.fq.recv_one() {
            Some((_, msg)) => Ok(msg),
            None => Err(SpaceframeError::Again),
        }
    }

    fn events(&self) -> Readiness {
        Readiness {
            can_send: self.lb.has_ready(),
            can_recv: self.fq.has_ready(),
        }
    }
}

enum ReqState {
    Idle,
    Active {
        id: u32,
        /// The enveloped request, kept for retransmission.
        request: Message,
        timer: Option<TimerToken>,
        /// Pipe carrying the in-flight copy; `None` while unplaced.
        last_pipe: Option<PipeId>,
    },
}

/// Cooked requester: one in-flight request, resent on a timer; a new send
/// abandons the previous request.
pub(crate) struct Req {
    lb: PrioList,
    fq: PrioList,
    state: ReqState,
    next_id: u32,
}

impl Req {
    pub(crate) fn new() -> Self {
        Self {
            lb: PrioList::new(),
            fq: PrioList::new(),
            state: ReqState::Idle,
            next_id: rand::thread_rng().gen(),
        }
    }

    fn fresh_id(&mut self) -> u32 {
        let id = self.next_id & !ID_FLAG;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    /// Place (or re-place) the in-flight request and rearm the resend timer.
    fn place_request(lb: &mut PrioList, state: &mut ReqState, ctx: &mut ProtoCtx<'_>) {
        let ReqState::Active {
            request,
            timer,
            last_pipe,
            ..
        } = state
        else {
            return;
        };
        if let Some(token) = timer.take() {
            ctx.cancel_timer(token);
        }
        match lb.send_one(request.clone()) {
            Ok(pipe) => *last_pipe = Some(pipe),
            Err(_) => *last_pipe = None,
        }
        *timer = Some(ctx.arm_timer(ctx.opts().resend_ivl));
    }
}

impl ProtocolCore for Req {
    fn add_pipe(&mut self, pipe: PipeHandle, send_prio: u8, recv_prio: u8) -> Result<()> {
        self.lb.register(pipe.clone(), send_prio);
        self.fq.register(pipe, recv_prio);
        Ok(())
    }

    fn rm_pipe(&mut self, ctx: &mut ProtoCtx<'_>, id: PipeId) {
        self.lb.unregister(id);
        self.fq.unregister(id);
        // Losing the pipe that carried the request triggers an immediate
        // resend attempt; the timer keeps running as an upper bound.
        let lost = matches!(
            self.state,
            ReqState::Active { last_pipe: Some(p), .. } if p == id
        );
        if lost {
            if let ReqState::Active { last_pipe, .. } = &mut self.state {
                *last_pipe = None;
            }
            trace!(pipe = id, "in-flight request lost its pipe");
            Self::place_request(&mut self.lb, &mut self.state, ctx);
        }
    }

    fn pipe_in(&mut self, _ctx: &mut ProtoCtx<'_>, id: PipeId) {
        self.fq.activate(id);
    }

    fn pipe_out(&mut self, ctx: &mut ProtoCtx<'_>, id: PipeId) {
        self.lb.activate(id);
        if let ReqState::Active {
            last_pipe: None, ..
        } = self.state
        {
            Self::place_request(&mut self.lb, &mut self.state, ctx);
        }
    }

    fn send(&mut self, ctx: &mut ProtoCtx<'_>, msg: Message) -> Result<SendOutcome> {
        // A new request abandons the previous one.
        if let ReqState::Active { timer: Some(t), .. } = &self.state {
            ctx.cancel_timer(*t);
        }
        let id = self.fresh_id();
        let mut request = msg;
        request.push_header_word(id | ID_FLAG);
        self.state = ReqState::Active {
            id,
            request,
            timer: None,
            last_pipe: None,
        };
        Self::place_request(&mut self.lb, &mut self.state, ctx);
        Ok(SendOutcome::Sent)
    }

    fn recv(&mut self, ctx: &mut ProtoCtx<'_>) -> Result<Message> {
        let ReqState::Active { id, timer, .. } = &self.state else {
            return Err(SpaceframeError::BadState("no request in flight"));
        };
        let (id, timer) = (*id, *timer);
        loop {
            let Some((_, mut msg)) = self.fq.recv_one() else {
                return Err(SpaceframeError::Again);
            };
            match msg.pop_header_word() {
                Some(word) if word & ID_FLAG != 0 && word & !ID_FLAG == id => {
                    if let Some(token) = timer {
                        ctx.cancel_timer(token);
                    }
                    self.state = ReqState::Idle;
                    return Ok(msg);
                }
                _ => trace!("reply with stale or malformed request id dropped"),
            }
        }
    }

    fn events(&self) -> Readiness {
        Readiness {
            // Sending is always possible; a fresh request replaces the old.
            can_send: true,
            can_recv: matches!(self.state, ReqState::Active { .. }) && self.fq.has_ready(),
        }
    }

    fn on_timer(&mut self, ctx: &mut ProtoCtx<'_>, token: TimerToken) {
        if let ReqState::Active { timer: Some(t), .. } = &self.state {
            if *t == token {
                trace!("resend interval elapsed, retransmitting request");
                Self::place_request(&mut self.lb, &mut self.state, ctx);
            }
        }
    }
}

struct OutPipe {
    pipe: PipeHandle,
    writable: bool,
}

/// Raw reply side: tags arrivals with their pipe id, routes replies by the
/// outermost envelope word.
pub(crate) struct XRep {
    fq: PrioList,
    pipes: HashMap<PipeId, OutPipe>,
}

impl XRep {
    pub(crate) fn new() -> Self {
        Self {
            fq: PrioList::new(),
            pipes: HashMap::new(),
        }
    }
}

impl ProtocolCore for XRep {
    fn add_pipe(&mut self, pipe: PipeHandle, _send_prio: u8, recv_prio: u8) -> Result<()> {
        self.fq.register(pipe.clone(), recv_prio);
        self.pipes.insert(
            pipe.id(),
            OutPipe {
                pipe,
                writable: false,
            },
        );
        Ok(())
    }

    fn rm_pipe(&mut self, _ctx: &mut ProtoCtx<'_>, id: PipeId) {
        self.fq.unregister(id);
        self.pipes.remove(&id);
    }

    fn pipe_in(&mut self, _ctx: &mut ProtoCtx<'_>, id: PipeId) {
        self.fq.activate(id);
    }

    fn pipe_out(&mut self, _ctx: &mut ProtoCtx<'_>, id: PipeId) {
        if let Some(out) = self.pipes.get_mut(&id) {
            out.writable = true;
        }
    }

    fn send(&mut self, _ctx: &mut ProtoCtx<'_>, mut msg: Message) -> Result<SendOutcome> {
        let Some(route) = msg.pop_header_word() else {
            return Err(SpaceframeError::Protocol("reply without routing envelope"));
        };
        // A vanished or congested peer silently loses the reply; the
        // requester's retransmission covers it.
        match self.pipes.get_mut(&route) {
            Some(out) if out.writable => {
                if out.pipe.send(msg) == PipeSendStatus::Release {
                    out.writable = false;
                }
            }
            _ => trace!(pipe = route, "reply dropped, destination gone or full"),
        }
        Ok(SendOutcome::Sent)
    }

    fn recv(&mut self, _ctx: &mut ProtoCtx<'_>) -> Result<Message> {
        match self.fq.recv_one() {
            Some((pipe, mut msg)) => {
                msg.push_header_word(pipe);
                Ok(msg)
            }
            None => Err(SpaceframeError::Again),
        }
    }

    fn events(&self) -> Readiness {
        Readiness {
            can_send: true,
            can_recv: self.fq.has_ready(),
        }
    }
}

/// Cooked replier: strip and save the routing stack, reattach it on send.
pub(crate) struct Rep {
    raw: XRep,
    saved: Option<Bytes>,
}

impl Rep {
    pub(crate) fn new() -> Self {
        Self {
            raw: XRep::new(),
            saved: None,
        }
    }
}

/// A well-formed request envelope is a run of routing words closed by
/// exactly one id word carrying the high bit.
pub(super) fn envelope_is_well_formed(msg: &Message) -> bool {
    let count = msg.header_word_count();
    if count == 0 {
        return false;
    }
    msg.header_words()
        .enumerate()
        .all(|(i, word)| (word & ID_FLAG != 0) == (i == count - 1))
}

impl ProtocolCore for Rep {
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
        let Some(envelope) = self.saved.take() else {
            return Err(SpaceframeError::BadState("no request to reply to"));
        };
        let mut reply = msg;
        reply.set_header(envelope);
        self.raw.send(ctx, reply)
    }

    fn recv(&mut self, ctx: &mut ProtoCtx<'_>) -> Result<Message> {
        loop {
            let msg = self.raw.recv(ctx)?;
            if !envelope_is_well_formed(&msg) {
                trace!("malformed request envelope dropped");
                continue;
            }
            // Receiving a new request abandons an unanswered one.
            self.saved = Some(msg.header().clone());
            return Ok(Message::from_body(msg.into_body()));
        }
    }

    fn events(&self) -> Readiness {
        Readiness {
            can_send: self.saved.is_some(),
            can_recv: self.raw.events().can_recv,
        }
    }
}
