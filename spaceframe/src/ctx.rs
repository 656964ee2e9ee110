//! Context: the process-wide home of sockets, workers and global tables.
//!
//! A `Context` owns the worker pool, the socket handle table and the inproc
//! name registry. Handles are cheap clones; sockets keep their context
//! alive until they close. Terminating a context closes every live socket
//! (honoring linger) and then stops the workers.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use spaceframe_aio::{Fsm, Pool, StateMachine};
use spaceframe_core::error::{Result, SpaceframeError};
use tracing::debug;

use crate::pipe::{CoreFsm, PipeEvent, PipeId};
use crate::proto::Protocol;
use crate::socket::{Socket, SocketCore, SocketId};
use crate::transport::inproc::InprocTable;

/// Shared context body.
pub(crate) struct ContextShared {
    pool: Pool<PipeEvent>,
    sockets: DashMap<SocketId, Arc<SocketCore>>,
    inproc: InprocTable,
    next_socket: AtomicU64,
    next_pipe: AtomicU32,
    terminating: AtomicBool,
}

impl ContextShared {
    pub(crate) fn inproc(&self) -> &InprocTable {
        &self.inproc
    }

    pub(crate) fn next_pipe_id(&self) -> PipeId {
        self.next_pipe.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn is_terminating(&self) -> bool {
        self.terminating.load(Ordering::Acquire)
    }

    pub(crate) fn remove_socket(&self, id: SocketId) {
        self.sockets.remove(&id);
    }
}

/// Place a socket's root machine on the context's pool.
pub(crate) fn new_root_fsm(
    ctx: &Arc<ContextShared>,
    machine: impl StateMachine<PipeEvent>,
) -> Arc<CoreFsm> {
    Fsm::root(&ctx.pool, machine)
}

/// A handle on one messaging context.
///
/// Most processes use a single context for their whole lifetime; separate
/// contexts are fully isolated, including their inproc namespaces.
#[derive(Clone)]
pub struct Context {
    shared: Arc<ContextShared>,
}

impl Context {
    /// Create a context with one worker.
    pub fn new() -> Result<Self> {
        Self::with_workers(1)
    }

    /// Create a context with a fixed number of engine workers.
    pub fn with_workers(workers: usize) -> Result<Self> {
        let pool = Pool::new(workers).map_err(SpaceframeError::Io)?;
        debug!(workers = pool.worker_count(), "context created");
        Ok(Self {
            shared: Arc::new(ContextShared {
                pool,
                sockets: DashMap::new(),
                inproc: InprocTable::new(),
                next_socket: AtomicU64::new(0),
                next_pipe: AtomicU32::new(1),
                terminating: AtomicBool::new(false),
            }),
        })
    }

    /// The process-wide default context, created on first use.
    pub fn global() -> Result<Self> {
        static GLOBAL: OnceCell<Context> = OnceCell::new();
        GLOBAL.get_or_try_init(Self::new).cloned()
    }

    /// Number of engine workers.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.shared.pool.worker_count()
    }

    /// Open a socket speaking the given pattern.
    pub fn socket(&self, protocol: Protocol) -> Result<Socket> {
        if self.shared.is_terminating() {
            return Err(SpaceframeError::Terminating);
        }
        let id = self.shared.next_socket.fetch_add(1, Ordering::Relaxed) + 1;
        let core = SocketCore::create(&self.shared, id, protocol);
        self.shared.sockets.insert(id, Arc::clone(&core));
        Ok(Socket::new(core))
    }

    /// Number of sockets not yet closed.
    #[must_use]
    pub fn socket_count(&self) -> usize {
        self.shared.sockets.len()
    }

    /// Close every live socket (with linger) and stop the workers. Further
    /// operations on this context fail with `Terminating`. Idempotent.
    pub fn terminate(&self) -> Result<()> {
        if self.shared.terminating.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        debug!(sockets = self.shared.sockets.len(), "context terminating");
        let live: Vec<_> = self
            .shared
            .sockets
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for socket in live {
            // A concurrent user close loses the race benignly; either way
            // the workers must not stop before this socket has.
            let done = socket.fsm().stopped_rx();
            let _ = socket.close();
            let _ = done.recv();
        }
        self.shared.pool.shutdown();
        Ok(())
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("workers", &self.worker_count())
            .field("sockets", &self.socket_count())
            .finish()
    }
}
