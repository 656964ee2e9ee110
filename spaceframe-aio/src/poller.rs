//! Readiness poller over OS I/O handles.
//!
//! Thin ownership layer over `mio::Poll`. Handles are registered as boxed
//! event sources and addressed by `PollKey`; per-direction interest is
//! toggled with `set_in`/`reset_in`/`set_out`/`reset_out`. The poller
//! presents a level view: every interest change reregisters the source, so
//! readiness that already exists at the OS level is reported again on the
//! next `wait`.

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use hashbrown::HashMap;
use mio::event::Source;
use mio::{Events, Interest, Poll, Registry, Token};

/// Identifies one registered handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PollKey(usize);

/// One readiness report.
#[derive(Debug, Clone, Copy)]
pub struct IoEvent {
    pub key: PollKey,
    pub readable: bool,
    pub writable: bool,
    /// Peer hung up or the handle saw an error.
    pub closed: bool,
}

struct Entry {
    source: Box<dyn Source + Send>,
    read: bool,
    write: bool,
    registered: bool,
}

/// Readiness multiplexer owning its registered sources.
pub struct Poller {
    poll: Poll,
    events: Events,
    ready: VecDeque<IoEvent>,
    woken: bool,
    entries: HashMap<usize, Entry>,
    next_key: usize,
}

impl Poller {
    /// Token reserved for the worker's wakeup flag.
    pub const WAKE_TOKEN: Token = Token(usize::MAX);

    pub fn new() -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(256),
            ready: VecDeque::new(),
            woken: false,
            entries: HashMap::new(),
            next_key: 0,
        })
    }

    /// Registry for wiring a `WakeFlag` to this poller.
    pub fn registry(&self) -> &Registry {
        self.poll.registry()
    }

    /// Take ownership of a handle. No readiness is watched until an
    /// interest is set.
    pub fn add(&mut self, source: Box<dyn Source + Send>) -> PollKey {
        let key = self.next_key;
        self.next_key += 1;
        self.entries.insert(
            key,
            Entry {
                source,
                read: false,
                write: false,
                registered: false,
            },
        );
        PollKey(key)
    }

    /// Deregister and hand the handle back.
    pub fn remove(&mut self, key: PollKey) -> io::Result<Option<Box<dyn Source + Send>>> {
        match self.entries.remove(&key.0) {
            None => Ok(None),
            Some(mut entry) => {
                if entry.registered {
                    self.poll.registry().deregister(&mut *entry.source)?;
                }
                self.ready.retain(|ev| ev.key != key);
                Ok(Some(entry.source))
            }
        }
    }

    /// Watch the handle for readability.
    pub fn set_in(&mut self, key: PollKey) -> io::Result<()> {
        self.update(key, Some(true), None)
    }

    /// Stop watching readability.
    pub fn reset_in(&mut self, key: PollKey) -> io::Result<()> {
        self.update(key, Some(false), None)
    }

    /// Watch the handle for writability.
    pub fn set_out(&mut self, key: PollKey) -> io::Result<()> {
        self.update(key, None, Some(true))
    }

    /// Stop watching writability.
    pub fn reset_out(&mut self, key: PollKey) -> io::Result<()> {
        self.update(key, None, Some(false))
    }

    /// Set both directions at once.
    pub fn set_interest(&mut self, key: PollKey, read: bool, write: bool) -> io::Result<()> {
        self.update(key, Some(read), Some(write))
    }

    fn update(&mut self, key: PollKey, read: Option<bool>, write: Option<bool>) -> io::Result<()> {
        let entry = self
            .entries
            .get_mut(&key.0)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "unknown poll key"))?;
        if let Some(read) = read {
            entry.read = read;
        }
        if let Some(write) = write {
            entry.write = write;
        }

        let registry = self.poll.registry();
        let interest = match (entry.read, entry.write) {
            (true, true) => Some(Interest::READABLE | Interest::WRITABLE),
            (true, false) => Some(Interest::READABLE),
            (false, true) => Some(Interest::WRITABLE),
            (false, false) => None,
        };
        match (interest, entry.registered) {
            (Some(interest), true) => {
                registry.reregister(&mut *entry.source, Token(key.0), interest)?;
            }
            (Some(interest), false) => {
                registry.register(&mut *entry.source, Token(key.0), interest)?;
                entry.registered = true;
            }
            (None, true) => {
                registry.deregister(&mut *entry.source)?;
                entry.registered = false;
            }
            (None, false) => {}
        }
        Ok(())
    }

    /// Block until a handle is ready, the wakeup flag fires, or the timeout
    /// elapses. `None` waits indefinitely.
    pub fn wait(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            // Spurious; the loop re-evaluates timers and tasks anyway.
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(e),
        }
        for ev in self.events.iter() {
            if ev.token() == Self::WAKE_TOKEN {
                self.woken = true;
            } else {
                self.ready.push_back(IoEvent {
                    key: PollKey(ev.token().0),
                    readable: ev.is_readable(),
                    writable: ev.is_writable(),
                    closed: ev.is_read_closed() || ev.is_write_closed() || ev.is_error(),
                });
            }
        }
        Ok(())
    }

    /// True when the last `wait` returned because of the wakeup flag;
    /// clears on read.
    pub fn woken(&mut self) -> bool {
        std::mem::take(&mut self.woken)
    }

    /// Next pending readiness report, if any.
    pub fn next_event(&mut self) -> Option<IoEvent> {
        self.ready.pop_front()
    }

    /// Number of registered handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
