//! Event-driven state machines with parent/child composition.
//!
//! An `Fsm` is the unit of concurrency in the engine: a machine pinned to
//! one worker, receiving its events in FIFO order on that worker's thread.
//! Machines expose two handlers: `handle` for live operation and `shutdown`
//! for graceful termination. A parent stops its children by sending them a
//! stop request; each child reports back when it reaches idle, and the
//! parent only completes its own shutdown after every child has. This is
//! the sole mechanism keeping in-flight work off structures being freed.
//!
//! Lock discipline: `send`, `arm_timer` and `cancel_timer` never take the
//! machine lock and are safe to call from any thread, including while the
//! caller holds its own state lock inside a handler-reachable path. The
//! lifecycle calls (`start`, `stop`, `stopped_rx`) do lock and must not be
//! made while holding a lock that a handler also takes.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tracing::trace;

use crate::poller::{IoEvent, PollKey};
use crate::pool::Pool;
use crate::worker::{Task, WorkerHandle};

/// Unique machine identifier, never reused within a process.
pub type FsmId = u64;

static NEXT_FSM_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one armed timer of one machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(pub(crate) u64);

/// Machine lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Constructed, not yet started.
    Idle,
    /// Live; events go to `handle`.
    Active,
    /// Terminating; events go to `shutdown`.
    Stopping,
    /// Terminal; events are dropped silently.
    Stopped,
}

/// Shutdown handler verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// More work or child stops outstanding.
    Pending,
    /// The machine reached idle; the framework finalizes it.
    Done,
}

/// Events delivered to a machine.
#[derive(Debug)]
pub enum FsmEvent<E> {
    /// First event after `start`.
    Started,
    /// First event after `stop`; delivered to the shutdown handler.
    StopRequested,
    /// A child machine reached idle.
    ChildStopped(u32),
    /// An armed timer fired.
    Timer(TimerToken),
    /// A registered I/O handle reported readiness.
    Io(IoEvent),
    /// Domain event from the owning layer.
    User(E),
}

/// A state machine body.
///
/// Handlers run synchronously on the owning worker and must not block.
pub trait StateMachine<E: Send>: Send + 'static {
    /// Live event handler.
    fn handle(&mut self, ctx: &mut FsmCtx<'_, E>, event: FsmEvent<E>);

    /// Termination handler; return `Done` once idle.
    fn shutdown(&mut self, ctx: &mut FsmCtx<'_, E>, event: FsmEvent<E>) -> Progress;
}

struct FsmInner<E: Send + 'static> {
    machine: Option<Box<dyn StateMachine<E>>>,
    lifecycle: Lifecycle,
    parent: Option<(Weak<Fsm<E>>, u32)>,
    stopped_txs: Vec<flume::Sender<()>>,
}

/// A machine node: identity, worker pinning, and the guarded machine body.
pub struct Fsm<E: Send + 'static> {
    id: FsmId,
    worker: Arc<WorkerHandle<E>>,
    timer_seq: AtomicU64,
    children: Mutex<Vec<(u32, Weak<Fsm<E>>)>>,
    inner: Mutex<FsmInner<E>>,
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<E: Send + 'static> Fsm<E> {
    /// Create a root machine, placed on a pool worker round-robin.
    pub fn root(pool: &Pool<E>, machine: impl StateMachine<E>) -> Arc<Self> {
        Self::build(pool.choose(), None, Box::new(machine))
    }

    /// Create a child machine on its parent's worker.
    ///
    /// `child_id` is the identifier the parent sees in `ChildStopped`.
    pub fn child(parent: &Arc<Self>, child_id: u32, machine: impl StateMachine<E>) -> Arc<Self> {
        let fsm = Self::build(
            parent.worker.clone(),
            Some((Arc::downgrade(parent), child_id)),
            Box::new(machine),
        );
        lock(&parent.children).push((child_id, Arc::downgrade(&fsm)));
        fsm
    }

    fn build(
        worker: Arc<WorkerHandle<E>>,
        parent: Option<(Weak<Fsm<E>>, u32)>,
        machine: Box<dyn StateMachine<E>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_FSM_ID.fetch_add(1, Ordering::Relaxed),
            worker,
            timer_seq: AtomicU64::new(1),
            children: Mutex::new(Vec::new()),
            inner: Mutex::new(FsmInner {
                machine: Some(machine),
                lifecycle: Lifecycle::Idle,
                parent,
                stopped_txs: Vec::new(),
            }),
        })
    }

    pub fn id(&self) -> FsmId {
        self.id
    }

    /// Index of the worker this machine is pinned to.
    pub fn worker_index(&self) -> usize {
        self.worker.index()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        lock(&self.inner).lifecycle
    }

    pub fn is_stopped(&self) -> bool {
        self.lifecycle() == Lifecycle::Stopped
    }

    /// Begin live operation; the machine receives `Started` on its worker.
    pub fn start(self: &Arc<Self>) {
        {
            let mut inner = lock(&self.inner);
            if inner.lifecycle != Lifecycle::Idle {
                return;
            }
            inner.lifecycle = Lifecycle::Active;
        }
        self.enqueue(FsmEvent::Started);
    }

    /// Request graceful termination. Idempotent; a machine that never
    /// started completes immediately.
    pub fn stop(self: &Arc<Self>) {
        let finish = {
            let mut inner = lock(&self.inner);
            match inner.lifecycle {
                Lifecycle::Idle => true,
                Lifecycle::Active => {
                    inner.lifecycle = Lifecycle::Stopping;
                    false
                }
                Lifecycle::Stopping | Lifecycle::Stopped => return,
            }
        };
        if finish {
            self.finish_stop();
        } else {
            self.enqueue(FsmEvent::StopRequested);
        }
    }

    /// Enqueue an event for this machine (the `raiseto` path). Lock-free;
    /// events to a stopped machine are dropped at dispatch.
    pub fn send(self: &Arc<Self>, event: FsmEvent<E>) {
        self.enqueue(event);
    }

    /// Enqueue a domain event.
    pub fn send_user(self: &Arc<Self>, event: E) {
        self.enqueue(FsmEvent::User(event));
    }

    /// Arm a one-shot timer on this machine's worker. Lock-free.
    pub fn arm_timer(self: &Arc<Self>, delay: Duration) -> TimerToken {
        let token = TimerToken(self.timer_seq.fetch_add(1, Ordering::Relaxed));
        self.worker.push(Task::ArmTimer {
            target: Arc::downgrade(self),
            token,
            delay,
        });
        token
    }

    /// Disarm a timer; a disarmed timer never fires. Lock-free.
    pub fn cancel_timer(&self, token: TimerToken) {
        self.worker.push(Task::CancelTimer {
            fsm: self.id,
            token,
        });
    }

    /// Hand an I/O handle to this machine's worker poller; readiness arrives
    /// as `FsmEvent::Io`. The reply carries the poll key.
    pub fn register_io(
        self: &Arc<Self>,
        source: Box<dyn mio::event::Source + Send>,
        read: bool,
        write: bool,
    ) -> flume::Receiver<io::Result<PollKey>> {
        let (reply, rx) = flume::bounded(1);
        self.worker.push(Task::RegisterIo {
            target: Arc::downgrade(self),
            source,
            read,
            write,
            reply,
        });
        rx
    }

    /// Change the watched directions of a registered handle.
    pub fn update_io(&self, key: PollKey, read: bool, write: bool) {
        self.worker.push(Task::UpdateIo { key, read, write });
    }

    /// Drop a registered handle.
    pub fn deregister_io(&self, key: PollKey) {
        self.worker.push(Task::DeregisterIo { key });
    }

    /// A channel that receives one message when the machine stops.
    pub fn stopped_rx(&self) -> flume::Receiver<()> {
        let (tx, rx) = flume::bounded(1);
        let mut inner = lock(&self.inner);
        if inner.lifecycle == Lifecycle::Stopped {
            let _ = tx.send(());
        } else {
            inner.stopped_txs.push(tx);
        }
        rx
    }

    fn enqueue(self: &Arc<Self>, event: FsmEvent<E>) {
        self.worker.push(Task::Dispatch {
            target: Arc::downgrade(self),
            event,
        });
    }

    /// Run one delivered event (plus any synchronous self-events it queues)
    /// through the machine. Worker thread only.
    pub(crate) fn dispatch(self: &Arc<Self>, event: FsmEvent<E>) {
        let mut inner = lock(&self.inner);
        let stopping = match inner.lifecycle {
            Lifecycle::Idle | Lifecycle::Stopped => return,
            Lifecycle::Active => false,
            Lifecycle::Stopping => true,
        };
        let Some(mut machine) = inner.machine.take() else {
            return;
        };

        let mut actions = VecDeque::new();
        actions.push_back(event);
        let mut done = false;
        while let Some(ev) = actions.pop_front() {
            let mut ctx = FsmCtx {
                fsm: self,
                inner: &mut *inner,
                actions: &mut actions,
            };
            if stopping {
                if machine.shutdown(&mut ctx, ev) == Progress::Done {
                    done = true;
                    break;
                }
            } else {
                machine.handle(&mut ctx, ev);
            }
        }

        if done {
            // The machine body drops outside the lock.
            drop(inner);
            self.finish_stop();
            drop(machine);
        } else {
            inner.machine = Some(machine);
        }
    }

    fn finish_stop(self: &Arc<Self>) {
        let (parent, watchers) = {
            let mut inner = lock(&self.inner);
            if inner.lifecycle == Lifecycle::Stopped {
                return;
            }
            inner.lifecycle = Lifecycle::Stopped;
            inner.machine = None;
            (inner.parent.take(), std::mem::take(&mut inner.stopped_txs))
        };
        trace!(fsm = self.id, "state machine stopped");
        for tx in watchers {
            let _ = tx.send(());
        }
        if let Some((parent, child_id)) = parent {
            if let Some(parent) = parent.upgrade() {
                parent.send(FsmEvent::ChildStopped(child_id));
            }
        }
    }
}

/// Handler-side view of the machine's surroundings.
pub struct FsmCtx<'a, E: Send + 'static> {
    fsm: &'a Arc<Fsm<E>>,
    inner: &'a mut FsmInner<E>,
    actions: &'a mut VecDeque<FsmEvent<E>>,
}

impl<E: Send + 'static> FsmCtx<'_, E> {
    /// This machine's id.
    pub fn id(&self) -> FsmId {
        self.fsm.id
    }

    /// The machine node, for handing to structures that must reach it later.
    pub fn fsm(&self) -> &Arc<Fsm<E>> {
        self.fsm
    }

    /// Queue a synchronous self-event, processed before dispatch returns.
    pub fn action(&mut self, event: E) {
        self.actions.push_back(FsmEvent::User(event));
    }

    /// Queue an event to the parent machine, if any.
    pub fn raise(&mut self, event: E) {
        if let Some((parent, _)) = &self.inner.parent {
            if let Some(parent) = parent.upgrade() {
                parent.send(FsmEvent::User(event));
            }
        }
    }

    /// Arm a one-shot timer; fires as `FsmEvent::Timer` on this machine.
    pub fn arm_timer(&mut self, delay: Duration) -> TimerToken {
        self.fsm.arm_timer(delay)
    }

    /// Disarm a timer.
    pub fn cancel_timer(&mut self, token: TimerToken) {
        self.fsm.cancel_timer(token);
    }

    /// Request a stop of every live child.
    pub fn stop_children(&mut self) {
        let children: Vec<_> = {
            let mut list = lock(&self.fsm.children);
            list.retain(|(_, weak)| weak.strong_count() > 0);
            list.iter().filter_map(|(_, weak)| weak.upgrade()).collect()
        };
        for child in children {
            child.stop();
        }
    }

    /// True when every child reached `Stopped` (or was dropped).
    pub fn children_stopped(&self) -> bool {
        lock(&self.fsm.children)
            .iter()
            .all(|(_, weak)| weak.upgrade().map_or(true, |c| c.is_stopped()))
    }
}
