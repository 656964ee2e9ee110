//! In-process transport.
//!
//! A per-context registry maps endpoint names to bound endpoints. Binding a
//! taken name fails; connecting to an absent name parks the connector until
//! a matching bind shows up. Matching creates one pipe (a bounded message
//! queue per direction) and hands an end to each socket.
//!
//! Endpoint bodies are children of their socket's state machine, so a
//! socket close stops them bottom-up; stopping an endpoint unregisters it
//! and tears down every pipe created through it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use hashbrown::HashMap;
use spaceframe_aio::{FsmCtx, FsmEvent, Progress, StateMachine};
use spaceframe_core::addr::Address;
use spaceframe_core::error::{Result, SpaceframeError};
use tracing::{debug, trace};

use crate::ctx::ContextShared;
use crate::pipe::{create_pipe, CoreFsm, PipeEnd, PipeEvent, PipeSide};
use crate::socket::{EndpointId, SocketCore};

/// Whether the endpoint was created by `bind` or `connect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EndpointKind {
    Bind,
    Connect,
}

/// Shared endpoint body: address, owner, and the pipes created through it.
pub(crate) struct EndpointCore {
    eid: EndpointId,
    addr: Address,
    kind: EndpointKind,
    socket: Weak<SocketCore>,
    ctx: Weak<ContextShared>,
    send_prio: u8,
    recv_prio: u8,
    pipes: Mutex<Vec<Weak<PipeEnd>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl EndpointCore {
    pub(crate) fn new(
        eid: EndpointId,
        addr: Address,
        kind: EndpointKind,
        socket: Weak<SocketCore>,
        ctx: Weak<ContextShared>,
        send_prio: u8,
        recv_prio: u8,
    ) -> Arc<Self> {
        Arc::new(Self {
            eid,
            addr,
            kind,
            socket,
            ctx,
            send_prio,
            recv_prio,
            pipes: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn name(&self) -> &str {
        self.addr.inproc_name().unwrap_or_default()
    }

    pub(crate) fn socket(&self) -> Option<Arc<SocketCore>> {
        self.socket.upgrade()
    }

    fn track(&self, end: &Arc<PipeEnd>) {
        lock(&self.pipes).push(Arc::downgrade(end));
    }

    fn close_pipes(&self) {
        for weak in lock(&self.pipes).drain(..) {
            if let Some(pipe) = weak.upgrade() {
                pipe.close();
            }
        }
    }
}

/// The endpoint's state machine body. Its only asynchronous duty is the
/// teardown half of the lifecycle contract.
struct EndpointDriver {
    ep: Arc<EndpointCore>,
}

impl StateMachine<PipeEvent> for EndpointDriver {
    fn handle(&mut self, _ctx: &mut FsmCtx<'_, PipeEvent>, event: FsmEvent<PipeEvent>) {
        if matches!(event, FsmEvent::Started) {
            trace!(endpoint = self.ep.eid, addr = %self.ep.addr, "endpoint active");
        }
    }

    fn shutdown(&mut self, _ctx: &mut FsmCtx<'_, PipeEvent>, event: FsmEvent<PipeEvent>) -> Progress {
        if !matches!(event, FsmEvent::StopRequested) {
            return Progress::Pending;
        }
        if let Some(ctx) = self.ep.ctx.upgrade() {
            ctx.inproc().forget(&self.ep);
        }
        self.ep.close_pipes();
        trace!(endpoint = self.ep.eid, addr = %self.ep.addr, "endpoint stopped");
        Progress::Done
    }
}

/// Create the endpoint state machine as a child of the socket's.
pub(crate) fn spawn_endpoint(
    parent: &Arc<CoreFsm>,
    eid: EndpointId,
    ep: Arc<EndpointCore>,
) -> Arc<CoreFsm> {
    CoreFsm::child(parent, eid, EndpointDriver { ep })
}

/// The per-context inproc name table.
pub(crate) struct InprocTable {
    inner: Mutex<Registry>,
}

#[derive(Default)]
struct Registry {
    bound: HashMap<String, Arc<EndpointCore>>,
    pending: Vec<Arc<EndpointCore>>,
}

impl InprocTable {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Registry::default()),
        }
    }

    /// Register a bound endpoint. Returns the parked connectors for the
    /// name, which the caller attaches after the table lock is gone.
    pub(crate) fn bind(&self, ep: Arc<EndpointCore>) -> Result<Vec<Arc<EndpointCore>>> {
        let name = ep.name().to_string();
        let mut registry = lock(&self.inner);
        if registry.bound.contains_key(&name) {
            return Err(SpaceframeError::AddrInUse(format!("inproc://{name}")));
        }
        let matched: Vec<_> = {
            let (matching, rest): (Vec<_>, Vec<_>) = registry
                .pending
                .drain(..)
                .partition(|pending| pending.name() == name);
            registry.pending = rest;
            matching
        };
        registry.bound.insert(name, ep);
        Ok(matched)
    }

    /// Look up the bound endpoint a connector would attach to.
    pub(crate) fn peer_of(&self, addr: &Address) -> Option<Arc<EndpointCore>> {
        let name = addr.inproc_name()?;
        lock(&self.inner).bound.get(name).cloned()
    }

    /// Register a connector. Returns the bound peer when present; otherwise
    /// the connector parks until a matching bind.
    pub(crate) fn connect(&self, ep: Arc<EndpointCore>) -> Option<Arc<EndpointCore>> {
        let mut registry = lock(&self.inner);
        match registry.bound.get(ep.name()) {
            Some(bound) => Some(Arc::clone(bound)),
            None => {
                trace!(name = ep.name(), "connect parked until bind");
                registry.pending.push(ep);
                None
            }
        }
    }

    /// Drop whatever the table knows about this endpoint.
    pub(crate) fn forget(&self, ep: &Arc<EndpointCore>) {
        let mut registry = lock(&self.inner);
        match ep.kind {
            EndpointKind::Bind => {
                if let Some(bound) = registry.bound.get(ep.name()) {
                    if Arc::ptr_eq(bound, ep) {
                        registry.bound.remove(ep.name());
                    }
                }
            }
            EndpointKind::Connect => {
                registry.pending.retain(|p| !Arc::ptr_eq(p, ep));
            }
        }
    }
}

/// Wire a bound endpoint and a connector together with a fresh pipe.
///
/// Best effort: a vanished socket or a pattern mismatch leaves the pair
/// unconnected.
pub(crate) fn attach_pair(
    ctx: &Arc<ContextShared>,
    bound: &Arc<EndpointCore>,
    conn: &Arc<EndpointCore>,
) {
    let (Some(bsock), Some(csock)) = (bound.socket(), conn.socket()) else {
        return;
    };
    if !bsock.protocol().compatible_with(csock.protocol()) {
        debug!(
            bound = %bsock.protocol(),
            connector = %csock.protocol(),
            addr = %bound.addr,
            "inproc match refused, incompatible patterns"
        );
        return;
    }

    let (bound_cap, bound_max) = bsock.queue_params();
    let (conn_cap, conn_max) = csock.queue_params();
    let (bound_end, conn_end) = create_pipe(
        PipeSide {
            id: ctx.next_pipe_id(),
            fsm: Arc::downgrade(bsock.fsm()),
            recv_capacity: bound_cap,
            max_msg: bound_max,
            send_prio: bound.send_prio,
            recv_prio: bound.recv_prio,
        },
        PipeSide {
            id: ctx.next_pipe_id(),
            fsm: Arc::downgrade(csock.fsm()),
            recv_capacity: conn_cap,
            max_msg: conn_max,
            send_prio: conn.send_prio,
            recv_prio: conn.recv_prio,
        },
    );
    bound.track(&bound_end);
    conn.track(&conn_end);
    debug!(addr = %bound.addr, "inproc pipe established");

    bsock.fsm().send_user(PipeEvent::Attached(bound_end));
    csock.fsm().send_user(PipeEvent::Attached(conn_end));
}
