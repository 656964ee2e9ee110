//! Multi-socket readiness polling.
//!
//! `poll` waits until at least one of the given sockets is ready in a
//! requested direction or the timeout elapses. Sockets notify registered
//! watchers on readiness rising edges; the poll loop re-snapshots after
//! every notification, so a race between snapshot and registration only
//! costs one extra pass.

use std::time::{Duration, Instant};

use spaceframe_core::error::Result;

use crate::socket::Socket;

/// One socket's entry in a `poll` call.
#[derive(Clone)]
pub struct PollItem {
    socket: Socket,
    poll_send: bool,
    poll_recv: bool,
    ready_send: bool,
    ready_recv: bool,
}

impl PollItem {
    /// Watch the socket for the given directions.
    #[must_use]
    pub fn new(socket: &Socket, poll_send: bool, poll_recv: bool) -> Self {
        Self {
            socket: socket.clone(),
            poll_send,
            poll_recv,
            ready_send: false,
            ready_recv: false,
        }
    }

    /// Watch for readability only.
    #[must_use]
    pub fn readable(socket: &Socket) -> Self {
        Self::new(socket, false, true)
    }

    /// Watch for writability only.
    #[must_use]
    pub fn writable(socket: &Socket) -> Self {
        Self::new(socket, true, false)
    }

    /// After `poll` returns: a send would make progress.
    #[must_use]
    pub fn can_send(&self) -> bool {
        self.ready_send
    }

    /// After `poll` returns: a recv would make progress.
    #[must_use]
    pub fn can_recv(&self) -> bool {
        self.ready_recv
    }

    /// The watched socket.
    #[must_use]
    pub fn socket(&self) -> &Socket {
        &self.socket
    }
}

fn snapshot(items: &mut [PollItem]) -> Result<usize> {
    let mut ready = 0;
    for item in items.iter_mut() {
        let readiness = item.socket.core().readiness()?;
        item.ready_send = item.poll_send && readiness.can_send;
        item.ready_recv = item.poll_recv && readiness.can_recv;
        if item.ready_send || item.ready_recv {
            ready += 1;
        }
    }
    Ok(ready)
}

/// Wait until some watched socket is ready or the timeout elapses.
///
/// Returns the number of ready items, `0` on timeout. `None` waits
/// indefinitely; `Some(Duration::ZERO)` is a non-blocking check.
pub fn poll(items: &mut [PollItem], timeout: Option<Duration>) -> Result<usize> {
    let deadline = timeout.map(|d| Instant::now() + d);
    loop {
        let ready = snapshot(items)?;
        if ready > 0 {
            return Ok(ready);
        }

        let remaining = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Ok(0);
                }
                Some(deadline - now)
            }
            None => None,
        };

        // Register for rising edges, then re-check to close the race
        // between the snapshot above and registration.
        let (tx, rx) = flume::unbounded();
        for item in items.iter() {
            item.socket.core().add_watcher(tx.clone());
        }
        drop(tx);
        let ready = snapshot(items)?;
        if ready > 0 {
            return Ok(ready);
        }

        let woken = match remaining {
            Some(d) => rx.recv_timeout(d).is_ok(),
            None => rx.recv().is_ok(),
        };
        if !woken {
            // Timed out (or every socket vanished); report the final state.
            return snapshot(items);
        }
    }
}
