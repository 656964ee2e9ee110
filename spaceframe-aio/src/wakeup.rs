//! Cross-thread wakeup primitive.
//!
//! One `WakeFlag` pairs with one poll loop. Any thread may `signal()` it to
//! make that loop's next (or current) `wait` return; the loop calls `drain()`
//! once per iteration before it processes queued work.
//!
//! Contract: `signal` is lock-free and idempotent between one `drain` and the
//! next — only the first signal after a drain pays for an OS wakeup.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use mio::{Registry, Token, Waker};

/// Wakeup flag bound to a poll registry.
pub struct WakeFlag {
    armed: AtomicBool,
    waker: Waker,
}

impl WakeFlag {
    /// Create a wakeup flag that fires `token` on the given registry.
    pub fn new(registry: &Registry, token: Token) -> io::Result<Self> {
        Ok(Self {
            armed: AtomicBool::new(false),
            waker: Waker::new(registry, token)?,
        })
    }

    /// Wake the owning poll loop. Cheap no-op when already signaled.
    pub fn signal(&self) {
        if !self.armed.swap(true, Ordering::AcqRel) {
            // Waker failures mean the poll is gone; the loop is over anyway.
            let _ = self.waker.wake();
        }
    }

    /// Clear the flag. Called by the owning loop, once per iteration.
    pub fn drain(&self) {
        self.armed.store(false, Ordering::Release);
    }

    /// True when a signal has not been drained yet.
    #[must_use]
    pub fn is_signaled(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn signal_wakes_poll() {
        let mut poll = mio::Poll::new().unwrap();
        let flag = std::sync::Arc::new(WakeFlag::new(poll.registry(), Token(7)).unwrap());

        let remote = flag.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.signal();
            remote.signal(); // idempotent between drains
        });

        let mut events = mio::Events::with_capacity(4);
        poll.poll(&mut events, Some(Duration::from_secs(5))).unwrap();
        let fired: Vec<_> = events.iter().map(|e| e.token()).collect();
        assert_eq!(fired, vec![Token(7)]);

        assert!(flag.is_signaled());
        flag.drain();
        assert!(!flag.is_signaled());
        handle.join().unwrap();
    }

    #[test]
    fn signal_before_wait_is_not_lost() {
        let mut poll = mio::Poll::new().unwrap();
        let flag = WakeFlag::new(poll.registry(), Token(1)).unwrap();
        flag.signal();

        let mut events = mio::Events::with_capacity(4);
        poll.poll(&mut events, Some(Duration::from_secs(5))).unwrap();
        assert!(events.iter().next().is_some());
    }
}
