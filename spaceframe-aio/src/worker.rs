//! Worker threads.
//!
//! Each worker owns one poller, one timer set and one task queue, and runs
//! the loop: drain cross-thread tasks, fire due timers, wait on the poller
//! with the next-deadline timeout, hand I/O readiness to the owning
//! machines. Machine handlers execute synchronously on this thread.

use std::io;
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use hashbrown::HashMap;
use tracing::{debug, warn};

use crate::fsm::{Fsm, FsmEvent, FsmId, TimerToken};
use crate::poller::{PollKey, Poller};
use crate::timers::TimerSet;
use crate::wakeup::WakeFlag;

/// Cross-thread work handed to a worker.
pub(crate) enum Task<E: Send + 'static> {
    Dispatch {
        target: Weak<Fsm<E>>,
        event: FsmEvent<E>,
    },
    ArmTimer {
        target: Weak<Fsm<E>>,
        token: TimerToken,
        delay: Duration,
    },
    CancelTimer {
        fsm: FsmId,
        token: TimerToken,
    },
    RegisterIo {
        target: Weak<Fsm<E>>,
        source: Box<dyn mio::event::Source + Send>,
        read: bool,
        write: bool,
        reply: flume::Sender<io::Result<PollKey>>,
    },
    UpdateIo {
        key: PollKey,
        read: bool,
        write: bool,
    },
    DeregisterIo {
        key: PollKey,
    },
    Shutdown,
}

/// Shared handle for pushing work onto a worker.
pub struct WorkerHandle<E: Send + 'static> {
    index: usize,
    tx: flume::Sender<Task<E>>,
    wake: Arc<WakeFlag>,
}

impl<E: Send + 'static> WorkerHandle<E> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn push(&self, task: Task<E>) {
        // A send failure means the worker is gone; the work dies with it.
        if self.tx.send(task).is_ok() {
            self.wake.signal();
        }
    }
}

/// One engine thread. Owned by the pool.
pub(crate) struct Worker<E: Send + 'static> {
    handle: Arc<WorkerHandle<E>>,
    thread: Option<JoinHandle<()>>,
}

impl<E: Send + 'static> Worker<E> {
    pub(crate) fn spawn(index: usize) -> io::Result<Self> {
        let poller = Poller::new()?;
        let wake = Arc::new(WakeFlag::new(poller.registry(), Poller::WAKE_TOKEN)?);
        let (tx, rx) = flume::unbounded();
        let handle = Arc::new(WorkerHandle {
            index,
            tx,
            wake: Arc::clone(&wake),
        });

        let thread = std::thread::Builder::new()
            .name(format!("spaceframe-worker-{index}"))
            .spawn(move || run(index, poller, rx, wake))?;

        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    pub(crate) fn handle(&self) -> Arc<WorkerHandle<E>> {
        Arc::clone(&self.handle)
    }

    pub(crate) fn shutdown(&mut self) {
        self.handle.push(Task::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn run<E: Send + 'static>(
    index: usize,
    mut poller: Poller,
    rx: flume::Receiver<Task<E>>,
    wake: Arc<WakeFlag>,
) {
    debug!(worker = index, "worker loop starting");
    let mut timers: TimerSet<(FsmId, TimerToken)> = TimerSet::new();
    let mut timer_targets: HashMap<(FsmId, TimerToken), Weak<Fsm<E>>> = HashMap::new();
    let mut io_targets: HashMap<PollKey, Weak<Fsm<E>>> = HashMap::new();

    'outer: loop {
        wake.drain();

        // Cross-thread tasks first; dispatching may arm timers or queue
        // more events, which re-signal the wake flag.
        loop {
            match rx.try_recv() {
                Ok(Task::Shutdown) => break 'outer,
                Ok(Task::Dispatch { target, event }) => {
                    if let Some(fsm) = target.upgrade() {
                        fsm.dispatch(event);
                    }
                }
                Ok(Task::ArmTimer {
                    target,
                    token,
                    delay,
                }) => {
                    if let Some(fsm) = target.upgrade() {
                        let key = (fsm.id(), token);
                        timers.add(key, delay);
                        timer_targets.insert(key, target);
                    }
                }
                Ok(Task::CancelTimer { fsm, token }) => {
                    let key = (fsm, token);
                    timers.remove(&key);
                    timer_targets.remove(&key);
                }
                Ok(Task::RegisterIo {
                    target,
                    source,
                    read,
                    write,
                    reply,
                }) => {
                    let key = poller.add(source);
                    let result = poller
                        .set_interest(key, read, write)
                        .map(|()| key);
                    if result.is_ok() {
                        io_targets.insert(key, target);
                    } else {
                        let _ = poller.remove(key);
                    }
                    let _ = reply.send(result);
                }
                Ok(Task::UpdateIo { key, read, write }) => {
                    if let Err(e) = poller.set_interest(key, read, write) {
                        warn!(worker = index, error = %e, "io interest update failed");
                    }
                }
                Ok(Task::DeregisterIo { key }) => {
                    io_targets.remove(&key);
                    if let Err(e) = poller.remove(key) {
                        warn!(worker = index, error = %e, "io deregister failed");
                    }
                }
                Err(flume::TryRecvError::Empty) => break,
                Err(flume::TryRecvError::Disconnected) => break 'outer,
            }
        }

        // Due timers.
        let now = Instant::now();
        while let Some(key) = timers.pop_expired(now) {
            if let Some(target) = timer_targets.remove(&key) {
                if let Some(fsm) = target.upgrade() {
                    fsm.dispatch(FsmEvent::Timer(key.1));
                }
            }
        }

        // Sleep until the next deadline, a wakeup, or I/O readiness.
        let timeout = timers.timeout(Instant::now());
        if let Err(e) = poller.wait(timeout) {
            warn!(worker = index, error = %e, "poll wait failed");
        }
        let _ = poller.woken();
        while let Some(event) = poller.next_event() {
            if let Some(target) = io_targets.get(&event.key) {
                if let Some(fsm) = target.upgrade() {
                    fsm.dispatch(FsmEvent::Io(event));
                }
            }
        }
    }
    debug!(worker = index, "worker loop exiting");
}
