//! Socket base: protocol-agnostic socket concerns.
//!
//! `SocketCore` owns what every pattern shares: option storage, the
//! condvars blocking `send`/`recv` callers wait on, endpoint bookkeeping,
//! and the dispatch of pipe events into the pattern. Pattern state mutates
//! under one socket-level lock, reached from user threads (send/recv/
//! options) and from the socket's pinned worker (pipe and timer events).
//!
//! Closing runs through the socket's state machine: optionally drain
//! writable pipes within the linger window, then stop the endpoint
//! children bottom-up, and only then report the socket stopped.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use hashbrown::HashMap;
use spaceframe_aio::{FsmCtx, FsmEvent, Progress, StateMachine, TimerToken};
use spaceframe_core::addr::Address;
use spaceframe_core::error::{Result, SpaceframeError};
use spaceframe_core::message::Message;
use spaceframe_core::options::{SocketOption, SocketOptions};
use tracing::{debug, trace};

use crate::ctx::ContextShared;
use crate::pipe::{CoreFsm, PipeEnd, PipeEvent, PipeId};
use crate::proto::{PipeHandle, ProtoCtx, Protocol, ProtocolCore, Readiness, SendOutcome};
use crate::transport::inproc::{self, EndpointCore, EndpointKind};

pub(crate) type SocketId = u64;

/// Identifies one bind or connect on a socket.
pub type EndpointId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SocketStatus {
    Active,
    Closing,
    Closed,
}

pub(crate) struct SocketState {
    proto: Box<dyn ProtocolCore>,
    opts: SocketOptions,
    pipes: HashMap<PipeId, PipeHandle>,
    endpoints: HashMap<EndpointId, Arc<CoreFsm>>,
    next_endpoint: EndpointId,
    status: SocketStatus,
    readiness: Readiness,
    watchers: Vec<flume::Sender<()>>,
    /// Set while the close sequence waits for outbound queues to empty.
    draining: bool,
    linger_timer: Option<TimerToken>,
    /// Set once endpoint teardown has been requested.
    teardown: bool,
}

/// The socket body shared between user handles and the engine.
pub(crate) struct SocketCore {
    id: SocketId,
    protocol: Protocol,
    ctx: Weak<ContextShared>,
    fsm: Arc<CoreFsm>,
    state: Mutex<SocketState>,
    send_cv: Condvar,
    recv_cv: Condvar,
}

fn lock<'a>(mutex: &'a Mutex<SocketState>) -> MutexGuard<'a, SocketState> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SocketCore {
    pub(crate) fn create(
        ctx: &Arc<ContextShared>,
        id: SocketId,
        protocol: Protocol,
    ) -> Arc<Self> {
        let core = Arc::new_cyclic(|weak: &Weak<SocketCore>| {
            let fsm = crate::ctx::new_root_fsm(
                ctx,
                SocketDriver {
                    core: weak.clone(),
                },
            );
            Self {
                id,
                protocol,
                ctx: Arc::downgrade(ctx),
                fsm,
                state: Mutex::new(SocketState {
                    proto: protocol.instantiate(),
                    opts: SocketOptions::default(),
                    pipes: HashMap::new(),
                    endpoints: HashMap::new(),
                    next_endpoint: 0,
                    status: SocketStatus::Active,
                    readiness: Readiness::default(),
                    watchers: Vec::new(),
                    draining: false,
                    linger_timer: None,
                    teardown: false,
                }),
                send_cv: Condvar::new(),
                recv_cv: Condvar::new(),
            }
        });
        core.fsm.start();
        debug!(socket = id, protocol = %protocol, "socket created");
        core
    }

    pub(crate) fn id(&self) -> SocketId {
        self.id
    }

    pub(crate) fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub(crate) fn fsm(&self) -> &Arc<CoreFsm> {
        &self.fsm
    }

    /// Inbound queue parameters a new pipe toward this socket should use.
    pub(crate) fn queue_params(&self) -> (usize, Option<usize>) {
        let st = lock(&self.state);
        (st.opts.recv_buffer, st.opts.max_msg_size)
    }

    // ---- user-facing operations -----------------------------------------

    pub(crate) fn bind(self: &Arc<Self>, addr: &str) -> Result<EndpointId> {
        self.create_endpoint(addr, EndpointKind::Bind)
    }

    pub(crate) fn connect(self: &Arc<Self>, addr: &str) -> Result<EndpointId> {
        self.create_endpoint(addr, EndpointKind::Connect)
    }

    fn create_endpoint(self: &Arc<Self>, addr: &str, kind: EndpointKind) -> Result<EndpointId> {
        let addr: Address = addr
            .parse()
            .map_err(|e: spaceframe_core::addr::AddressError| {
                SpaceframeError::InvalidAddress(e.to_string())
            })?;
        let ctx = self.ctx.upgrade().ok_or(SpaceframeError::Terminating)?;
        if ctx.is_terminating() {
            return Err(SpaceframeError::Terminating);
        }
        if !addr.is_inproc() {
            return Err(SpaceframeError::InvalidAddress(format!(
                "no transport available for {addr}"
            )));
        }

        let (eid, send_prio, recv_prio) = {
            let mut st = lock(&self.state);
            if st.status != SocketStatus::Active {
                return Err(SpaceframeError::BadHandle);
            }
            st.next_endpoint += 1;
            (st.next_endpoint, st.opts.send_priority, st.opts.recv_priority)
        };

        let ep = EndpointCore::new(
            eid,
            addr.clone(),
            kind,
            Arc::downgrade(self),
            Arc::downgrade(&ctx),
            send_prio,
            recv_prio,
        );
        let fsm = inproc::spawn_endpoint(&self.fsm, eid, Arc::clone(&ep));

        match kind {
            EndpointKind::Bind => {
                let matched = match ctx.inproc().bind(Arc::clone(&ep)) {
                    Ok(matched) => matched,
                    Err(e) => {
                        fsm.stop();
                        return Err(e);
                    }
                };
                self.install_endpoint(eid, Arc::clone(&fsm));
                fsm.start();
                for pending in matched {
                    inproc::attach_pair(&ctx, &ep, &pending);
                }
            }
            EndpointKind::Connect => {
                // Compatibility is checked against an already-bound peer;
                // otherwise the connect parks until a matching bind shows up.
                if let Some(bound) = ctx.inproc().peer_of(&addr) {
                    let compatible = bound
                        .socket()
                        .is_some_and(|peer| self.protocol.compatible_with(peer.protocol()));
                    if !compatible {
                        fsm.stop();
                        return Err(SpaceframeError::InvalidAddress(format!(
                            "{addr}: bound socket protocol is incompatible"
                        )));
                    }
                }
                self.install_endpoint(eid, Arc::clone(&fsm));
                fsm.start();
                if let Some(bound) = ctx.inproc().connect(Arc::clone(&ep)) {
                    inproc::attach_pair(&ctx, &bound, &ep);
                }
            }
        }
        debug!(socket = self.id, endpoint = eid, %addr, ?kind, "endpoint created");
        Ok(eid)
    }

    fn install_endpoint(&self, eid: EndpointId, fsm: Arc<CoreFsm>) {
        let mut st = lock(&self.state);
        st.endpoints.insert(eid, fsm);
    }

    /// Remove one endpoint; its pipes are torn down asynchronously.
    pub(crate) fn shutdown_endpoint(&self, eid: EndpointId) -> Result<()> {
        let entry = {
            let st = lock(&self.state);
            if st.status != SocketStatus::Active {
                return Err(SpaceframeError::BadHandle);
            }
            st.endpoints
                .get(&eid)
                .map(Arc::clone)
                .ok_or(SpaceframeError::InvalidOption("unknown endpoint id"))?
        };
        entry.stop();
        Ok(())
    }

    pub(crate) fn set_option(&self, option: SocketOption) -> Result<()> {
        let mut st = lock(&self.state);
        if st.status == SocketStatus::Closed {
            return Err(SpaceframeError::BadHandle);
        }
        let handled = st.proto.set_option(&option)?;
        if !handled {
            st.opts.apply(option)?;
        }
        // Option freshness: blocked callers re-evaluate their deadlines,
        // and pattern edits may change readiness.
        self.update_readiness(&mut st);
        self.send_cv.notify_all();
        self.recv_cv.notify_all();
        Ok(())
    }

    pub(crate) fn options(&self) -> SocketOptions {
        lock(&self.state).opts.clone()
    }

    pub(crate) fn readiness(&self) -> Result<Readiness> {
        let st = lock(&self.state);
        if st.status == SocketStatus::Closed {
            return Err(SpaceframeError::BadHandle);
        }
        Ok(st.readiness)
    }

    pub(crate) fn add_watcher(&self, tx: flume::Sender<()>) {
        let mut st = lock(&self.state);
        st.watchers.push(tx);
    }

    pub(crate) fn send(&self, msg: Message, block: bool) -> Result<()> {
        let mut st = lock(&self.state);
        if let Some(max) = st.opts.max_msg_size {
            if msg.wire_size() > max {
                return Err(SpaceframeError::MessageTooLarge {
                    size: msg.wire_size(),
                    max,
                });
            }
        }
        let started = Instant::now();
        let mut pending = msg;
        loop {
            match st.status {
                SocketStatus::Active => {}
                SocketStatus::Closing => return Err(SpaceframeError::Interrupted),
                SocketStatus::Closed => return Err(SpaceframeError::BadHandle),
            }
            let outcome = {
                let SocketState { proto, opts, .. } = &mut *st;
                let mut pctx = ProtoCtx::new(&self.fsm, opts);
                proto.send(&mut pctx, pending)
            };
            self.update_readiness(&mut st);
            match outcome? {
                SendOutcome::Sent => return Ok(()),
                SendOutcome::Full(msg) => {
                    pending = msg;
                    st = self.wait_writable(st, started, block)?;
                }
            }
        }
    }

    pub(crate) fn recv(&self, block: bool) -> Result<Message> {
        let mut st = lock(&self.state);
        let started = Instant::now();
        loop {
            match st.status {
                SocketStatus::Active => {}
                SocketStatus::Closing => return Err(SpaceframeError::Interrupted),
                SocketStatus::Closed => return Err(SpaceframeError::BadHandle),
            }
            let result = {
                let SocketState { proto, opts, .. } = &mut *st;
                let mut pctx = ProtoCtx::new(&self.fsm, opts);
                proto.recv(&mut pctx)
            };
            self.update_readiness(&mut st);
            match result {
                Ok(msg) => return Ok(msg),
                Err(SpaceframeError::Again) => {
                    st = self.wait_readable(st, started, block)?;
                }
                Err(other) => return Err(other),
            }
        }
    }

    fn wait_writable<'a>(
        &self,
        st: MutexGuard<'a, SocketState>,
        started: Instant,
        block: bool,
    ) -> Result<MutexGuard<'a, SocketState>> {
        let timeout = if block {
            st.opts.send_timeout
        } else {
            Some(Duration::ZERO)
        };
        Self::wait_on(&self.send_cv, st, started, timeout)
    }

    fn wait_readable<'a>(
        &self,
        st: MutexGuard<'a, SocketState>,
        started: Instant,
        block: bool,
    ) -> Result<MutexGuard<'a, SocketState>> {
        let timeout = if block {
            st.opts.recv_timeout
        } else {
            Some(Duration::ZERO)
        };
        Self::wait_on(&self.recv_cv, st, started, timeout)
    }

    /// One bounded condvar wait. The deadline is re-derived from the
    /// options every pass, so an option change mid-wait takes effect.
    fn wait_on<'a>(
        cv: &Condvar,
        guard: MutexGuard<'a, SocketState>,
        started: Instant,
        timeout: Option<Duration>,
    ) -> Result<MutexGuard<'a, SocketState>> {
        match timeout {
            Some(d) if d.is_zero() => Err(SpaceframeError::Again),
            Some(d) => {
                let elapsed = started.elapsed();
                if elapsed >= d {
                    return Err(SpaceframeError::TimedOut);
                }
                let (guard, _timed_out) = cv
                    .wait_timeout(guard, d - elapsed)
                    .unwrap_or_else(PoisonError::into_inner);
                Ok(guard)
            }
            None => Ok(cv.wait(guard).unwrap_or_else(PoisonError::into_inner)),
        }
    }

    /// Close with linger, remove from the context, invalidate the handle.
    pub(crate) fn close(&self) -> Result<()> {
        {
            let mut st = lock(&self.state);
            if st.status != SocketStatus::Active {
                return Err(SpaceframeError::BadHandle);
            }
            st.status = SocketStatus::Closing;
            self.send_cv.notify_all();
            self.recv_cv.notify_all();
            Self::notify_watchers(&mut st);
        }
        let done = self.fsm.stopped_rx();
        self.fsm.stop();
        let _ = done.recv();
        {
            let mut st = lock(&self.state);
            st.status = SocketStatus::Closed;
            st.watchers.clear();
        }
        if let Some(ctx) = self.ctx.upgrade() {
            ctx.remove_socket(self.id);
        }
        debug!(socket = self.id, "socket closed");
        Ok(())
    }

    // ---- engine-facing operations (socket worker thread) ----------------

    fn update_readiness(&self, st: &mut SocketState) {
        let now = st.proto.events();
        if now == st.readiness {
            return;
        }
        let send_edge = now.can_send && !st.readiness.can_send;
        let recv_edge = now.can_recv && !st.readiness.can_recv;
        st.readiness = now;
        if send_edge {
            self.send_cv.notify_all();
        }
        if recv_edge {
            self.recv_cv.notify_all();
        }
        if send_edge || recv_edge {
            Self::notify_watchers(st);
        }
    }

    fn notify_watchers(st: &mut SocketState) {
        st.watchers.retain(|tx| tx.send(()).is_ok());
    }

    fn handle_attached(&self, end: Arc<PipeEnd>) {
        let mut st = lock(&self.state);
        if st.status != SocketStatus::Active || end.is_closed() {
            drop(st);
            end.close();
            return;
        }
        let (send_prio, recv_prio) = end.priorities();
        match st.proto.add_pipe(Arc::clone(&end), send_prio, recv_prio) {
            Ok(()) => {
                let id = end.id();
                st.pipes.insert(id, Arc::clone(&end));
                {
                    let SocketState { proto, opts, .. } = &mut *st;
                    let mut pctx = ProtoCtx::new(&self.fsm, opts);
                    // A fresh pipe starts writable and empty.
                    proto.pipe_out(&mut pctx, id);
                }
                self.update_readiness(&mut st);
                trace!(socket = self.id, pipe = id, "pipe attached");
            }
            Err(e) => {
                drop(st);
                debug!(socket = self.id, pipe = end.id(), error = %e, "pipe rejected");
                end.close();
            }
        }
    }

    fn handle_pipe_in(&self, id: PipeId) {
        let mut st = lock(&self.state);
        if !st.pipes.contains_key(&id) {
            return;
        }
        {
            let SocketState { proto, opts, .. } = &mut *st;
            let mut pctx = ProtoCtx::new(&self.fsm, opts);
            proto.pipe_in(&mut pctx, id);
        }
        self.update_readiness(&mut st);
    }

    fn handle_pipe_out(&self, id: PipeId) {
        let mut st = lock(&self.state);
        if !st.pipes.contains_key(&id) {
            return;
        }
        {
            let SocketState { proto, opts, .. } = &mut *st;
            let mut pctx = ProtoCtx::new(&self.fsm, opts);
            proto.pipe_out(&mut pctx, id);
        }
        self.update_readiness(&mut st);
    }

    fn handle_pipe_closed(&self, id: PipeId) {
        let mut st = lock(&self.state);
        if st.pipes.remove(&id).is_none() {
            return;
        }
        {
            let SocketState { proto, opts, .. } = &mut *st;
            let mut pctx = ProtoCtx::new(&self.fsm, opts);
            proto.rm_pipe(&mut pctx, id);
        }
        self.update_readiness(&mut st);
        trace!(socket = self.id, pipe = id, "pipe removed");
    }

    fn handle_timer(&self, token: TimerToken) {
        let mut st = lock(&self.state);
        {
            let SocketState { proto, opts, .. } = &mut *st;
            let mut pctx = ProtoCtx::new(&self.fsm, opts);
            proto.on_timer(&mut pctx, token);
        }
        self.update_readiness(&mut st);
    }

    fn handle_endpoint_stopped(&self, eid: EndpointId) {
        let mut st = lock(&self.state);
        st.endpoints.remove(&eid);
    }

    // ---- close sequence --------------------------------------------------

    /// First shutdown step: enter the linger window when something is
    /// still queued outbound, otherwise tear down immediately.
    fn begin_teardown(&self, fctx: &mut FsmCtx<'_, PipeEvent>) -> Progress {
        let wait_for_drain = {
            let mut st = lock(&self.state);
            let linger = st.opts.linger.filter(|d| !d.is_zero());
            let undrained = st.pipes.values().any(|p| !p.outbound_empty());
            match (linger, undrained) {
                (Some(window), true) => {
                    for pipe in st.pipes.values() {
                        pipe.flush_for_close();
                    }
                    st.draining = true;
                    st.linger_timer = Some(fctx.arm_timer(window));
                    debug!(socket = self.id, ?window, "lingering until pipes drain");
                    true
                }
                _ => false,
            }
        };
        if wait_for_drain {
            Progress::Pending
        } else {
            self.start_teardown(fctx)
        }
    }

    /// Linger finished (drained or expired): stop the endpoint children.
    fn start_teardown(&self, fctx: &mut FsmCtx<'_, PipeEvent>) -> Progress {
        {
            let mut st = lock(&self.state);
            st.draining = false;
            st.teardown = true;
            if let Some(token) = st.linger_timer.take() {
                self.fsm.cancel_timer(token);
            }
        }
        fctx.stop_children();
        self.teardown_progress(fctx)
    }

    fn teardown_progress(&self, fctx: &mut FsmCtx<'_, PipeEvent>) -> Progress {
        if !fctx.children_stopped() {
            return Progress::Pending;
        }
        let mut st = lock(&self.state);
        // Endpoint teardown closed every pipe; sweep whatever raced in.
        let leftovers: Vec<_> = st.pipes.drain().map(|(_, p)| p).collect();
        for pipe in &leftovers {
            pipe.close();
            let id = pipe.id();
            let SocketState { proto, opts, .. } = &mut *st;
            let mut pctx = ProtoCtx::new(&self.fsm, opts);
            proto.rm_pipe(&mut pctx, id);
        }
        Progress::Done
    }

    /// A pipe event arrived while closing; re-evaluate the drain or the
    /// teardown, whichever phase we are in.
    fn drain_progress(&self, fctx: &mut FsmCtx<'_, PipeEvent>) -> Progress {
        let phase = {
            let st = lock(&self.state);
            if st.teardown {
                DrainPhase::Teardown
            } else if st.draining && st.pipes.values().all(|p| p.outbound_empty()) {
                DrainPhase::Drained
            } else {
                DrainPhase::Waiting
            }
        };
        match phase {
            DrainPhase::Teardown => self.teardown_progress(fctx),
            DrainPhase::Drained => {
                debug!(socket = self.id, "outbound pipes drained");
                self.start_teardown(fctx)
            }
            DrainPhase::Waiting => Progress::Pending,
        }
    }

    fn linger_timer_fired(&self, fctx: &mut FsmCtx<'_, PipeEvent>, token: TimerToken) -> Progress {
        let is_linger = {
            let mut st = lock(&self.state);
            if st.linger_timer == Some(token) {
                st.linger_timer = None;
                true
            } else {
                false
            }
        };
        if is_linger {
            debug!(socket = self.id, "linger window expired");
            self.start_teardown(fctx)
        } else {
            // Stale pattern timer; nothing to do while closing.
            Progress::Pending
        }
    }
}

enum DrainPhase {
    Waiting,
    Drained,
    Teardown,
}

/// The socket's state machine body: routes engine events into the core.
struct SocketDriver {
    core: Weak<SocketCore>,
}

impl StateMachine<PipeEvent> for SocketDriver {
    fn handle(&mut self, _ctx: &mut FsmCtx<'_, PipeEvent>, event: FsmEvent<PipeEvent>) {
        let Some(core) = self.core.upgrade() else {
            return;
        };
        match event {
            FsmEvent::User(PipeEvent::Attached(end)) => core.handle_attached(end),
            FsmEvent::User(PipeEvent::In(id)) => core.handle_pipe_in(id),
            FsmEvent::User(PipeEvent::Out(id)) => core.handle_pipe_out(id),
            FsmEvent::User(PipeEvent::Closed(id)) => core.handle_pipe_closed(id),
            FsmEvent::User(PipeEvent::Drained(_)) => {}
            FsmEvent::Timer(token) => core.handle_timer(token),
            FsmEvent::ChildStopped(eid) => core.handle_endpoint_stopped(eid),
            FsmEvent::Started | FsmEvent::StopRequested | FsmEvent::Io(_) => {}
        }
    }

    fn shutdown(&mut self, ctx: &mut FsmCtx<'_, PipeEvent>, event: FsmEvent<PipeEvent>) -> Progress {
        let Some(core) = self.core.upgrade() else {
            return Progress::Done;
        };
        match event {
            FsmEvent::StopRequested => core.begin_teardown(ctx),
            FsmEvent::Timer(token) => core.linger_timer_fired(ctx, token),
            FsmEvent::User(PipeEvent::Out(_) | PipeEvent::Drained(_)) => core.drain_progress(ctx),
            FsmEvent::User(PipeEvent::Closed(id)) => {
                core.handle_pipe_closed(id);
                core.drain_progress(ctx)
            }
            FsmEvent::User(PipeEvent::Attached(end)) => {
                // Too late to adopt; refuse politely.
                end.close();
                Progress::Pending
            }
            FsmEvent::ChildStopped(eid) => {
                core.handle_endpoint_stopped(eid);
                core.drain_progress(ctx)
            }
            FsmEvent::User(PipeEvent::In(_)) | FsmEvent::Started | FsmEvent::Io(_) => {
                Progress::Pending
            }
        }
    }
}

/// A user handle on one socket.
///
/// Handles are cheap to clone; every clone refers to the same socket, and
/// closing through any of them invalidates all.
#[derive(Clone)]
pub struct Socket {
    core: Arc<SocketCore>,
}

impl Socket {
    pub(crate) fn new(core: Arc<SocketCore>) -> Self {
        Self { core }
    }

    pub(crate) fn core(&self) -> &Arc<SocketCore> {
        &self.core
    }

    /// The socket's pattern.
    #[must_use]
    pub fn protocol(&self) -> Protocol {
        self.core.protocol()
    }

    /// Bind a local address; peers connect to it.
    pub fn bind(&self, addr: &str) -> Result<EndpointId> {
        self.core.bind(addr)
    }

    /// Connect to a remote (or in-process) address.
    pub fn connect(&self, addr: &str) -> Result<EndpointId> {
        self.core.connect(addr)
    }

    /// Remove one endpoint created by `bind` or `connect`.
    pub fn shutdown(&self, endpoint: EndpointId) -> Result<()> {
        self.core.shutdown_endpoint(endpoint)
    }

    /// Send a message, blocking per the configured send timeout.
    pub fn send(&self, msg: Message) -> Result<()> {
        self.core.send(msg, true)
    }

    /// Send without blocking; `Again` when the pattern cannot take it now.
    pub fn try_send(&self, msg: Message) -> Result<()> {
        self.core.send(msg, false)
    }

    /// Copying-mode send of a byte slice.
    pub fn send_bytes(&self, data: &[u8]) -> Result<()> {
        self.send(Message::from_body(data.to_vec()))
    }

    /// Receive a message, blocking per the configured receive timeout.
    pub fn recv(&self) -> Result<Message> {
        self.core.recv(true)
    }

    /// Receive without blocking; `Again` when nothing is deliverable.
    pub fn try_recv(&self) -> Result<Message> {
        self.core.recv(false)
    }

    /// Apply one option edit; blocked callers observe it immediately.
    pub fn set_option(&self, option: SocketOption) -> Result<()> {
        self.core.set_option(option)
    }

    /// Snapshot of the current options.
    #[must_use]
    pub fn options(&self) -> SocketOptions {
        self.core.options()
    }

    /// Current readiness flags, as the poll API reports them.
    pub fn readiness(&self) -> Result<Readiness> {
        self.core.readiness()
    }

    /// Close the socket: linger, tear down endpoints and pipes, free the
    /// handle. Further operations fail with `BadHandle`.
    pub fn close(&self) -> Result<()> {
        self.core.close()
    }
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("id", &self.core.id())
            .field("protocol", &self.core.protocol())
            .finish()
    }
}
