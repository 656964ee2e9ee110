//! SURVEYOR/RESPONDENT: one-to-many question with a response deadline.
//!
//! A survey broadcasts with a fresh id word, like PUB with an envelope.
//! Responses matching the id arrive until the deadline elapses; after that
//! every `recv` reports a timeout until the next survey opens. The
//! respondent side mirrors REP: the routing stack is saved on receive and
//! reattached on the reply.

use bytes::Bytes;
use hashbrown::HashMap;
use rand::Rng;
use spaceframe_aio::TimerToken;
use spaceframe_core::error::{Result, SpaceframeError};
use spaceframe_core::message::Message;
use tracing::trace;

use crate::pipe::{PipeId, PipeSendStatus};

use super::dist::Dist;
use super::priolist::PrioList;
use super::reqrep::envelope_is_well_formed;
use super::{PipeHandle, ProtoCtx, ProtocolCore, Readiness, SendOutcome, ID_FLAG};

/// Hop-count guard for survey envelopes: every word but the terminal id is
/// a device hop.
fn over_ttl(msg: &Message, max_ttl: u8) -> bool {
    msg.header_word_count().saturating_sub(1) >= usize::from(max_ttl)
}

/// Raw surveyor: broadcast send, fair-queued receive, envelope untouched.
pub(crate) struct XSurveyor {
    dist: Dist,
    fq: PrioList,
}

impl XSurveyor {
    pub(crate) fn new() -> Self {
        Self {
            dist: Dist::new(),
            fq: PrioList::new(),
        }
    }
}

impl ProtocolCore for XSurveyor {
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
        self.dist.send(&msg, None);
        Ok(SendOutcome::Sent)
    }

    fn recv(&mut self, ctx: &mut ProtoCtx<'_>) -> Result<Message> {
        let max_ttl = ctx.opts().max_ttl;
        while let Some((_, msg)) = self.fq.recv_one() {
            if over_ttl(&msg, max_ttl) {
                trace!("survey response exceeded hop limit, dropped");
                continue;
            }
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

enum SurveyState {
    Idle,
    Active { id: u32, timer: TimerToken },
    Expired,
}

/// Cooked surveyor: stamps the survey id, enforces the deadline.
pub(crate) struct Surveyor {
    raw: XSurveyor,
    state: SurveyState,
    next_id: u32,
}

impl Surveyor {
    pub(crate) fn new() -> Self {
        Self {
            raw: XSurveyor::new(),
            state: SurveyState::Idle,
            next_id: rand::thread_rng().gen(),
        }
    }

    fn fresh_id(&mut self) -> u32 {
        let id = self.next_id & !ID_FLAG;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }
}

impl ProtocolCore for Surveyor {
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
        // A new survey closes the previous one.
        if let SurveyState::Active { timer, .. } = &self.state {
            ctx.cancel_timer(*timer);
        }
        let id = self.fresh_id();
        let mut survey = msg;
        survey.push_header_word(id | ID_FLAG);
        self.raw.send(ctx, survey)?;
        self.state = SurveyState::Active {
            id,
            timer: ctx.arm_timer(ctx.opts().survey_deadline),
        };
        Ok(SendOutcome::Sent)
    }

    fn recv(&mut self, ctx: &mut ProtoCtx<'_>) -> Result<Message> {
        let id = match &self.state {
            SurveyState::Idle => return Err(SpaceframeError::BadState("no survey in progress")),
            SurveyState::Expired => return Err(SpaceframeError::TimedOut),
            SurveyState::Active { id, .. } => *id,
        };
        loop {
            let mut msg = self.raw.recv(ctx)?;
            match msg.pop_header_word() {
                Some(word) if word & ID_FLAG != 0 && word & !ID_FLAG == id => return Ok(msg),
                _ => trace!("response with stale survey id dropped"),
            }
        }
    }

    fn events(&self) -> Readiness {
        let can_recv = match &self.state {
            SurveyState::Idle => false,
            // Expired reports ready so blocked receivers wake to observe
            // the timeout.
            SurveyState::Expired => true,
            SurveyState::Active { .. } => self.raw.events().can_recv,
        };
        Readiness {
            can_send: true,
            can_recv,
        }
    }

    fn on_timer(&mut self, _ctx: &mut ProtoCtx<'_>, token: TimerToken) {
        if let SurveyState::Active { timer, .. } = &self.state {
            if *timer == token {
                trace!("survey deadline elapsed");
                self.state = SurveyState::Expired;
            }
        }
    }
}

struct OutPipe {
    pipe: PipeHandle,
    writable: bool,
}

/// Raw respondent: tags arrivals with their pipe id, routes responses back
/// by the outermost envelope word.
pub(crate) struct XRespondent {
    fq: PrioList,
    pipes: HashMap<PipeId, OutPipe>,
}

impl XRespondent {
    pub(crate) fn new() -> Self {
        Self {
            fq: PrioList::new(),
            pipes: HashMap::new(),
        }
    }
}

impl ProtocolCore for XRespondent {
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
            return Err(SpaceframeError::Protocol("response without routing envelope"));
        };
        match self.pipes.get_mut(&route) {
            Some(out) if out.writable => {
                if out.pipe.send(msg) == PipeSendStatus::Release {
                    out.writable = false;
                }
            }
            _ => trace!(pipe = route, "response dropped, destination gone or full"),
        }
        Ok(SendOutcome::Sent)
    }

    fn recv(&mut self, ctx: &mut ProtoCtx<'_>) -> Result<Message> {
        let max_ttl = ctx.opts().max_ttl;
        while let Some((pipe, mut msg)) = self.fq.recv_one() {
            if over_ttl(&msg, max_ttl) {
                trace!("survey exceeded hop limit, dropped");
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

/// Cooked respondent: mirror of REP over the survey envelope.
pub(crate) struct Respondent {
    raw: XRespondent,
    saved: Option<Bytes>,
}

impl Respondent {
    pub(crate) fn new() -> Self {
        Self {
            raw: XRespondent::new(),
            saved: None,
        }
    }
}

impl ProtocolCore for Respondent {
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
            return Err(SpaceframeError::BadState("no survey to respond to"));
        };
        let mut response = msg;
        response.set_header(envelope);
        self.raw.send(ctx, response)
    }

    fn recv(&mut self, ctx: &mut ProtoCtx<'_>) -> Result<Message> {
        loop {
            let msg = self.raw.recv(ctx)?;
            if !envelope_is_well_formed(&msg) {
                trace!("malformed survey envelope dropped");
                continue;
            }
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
