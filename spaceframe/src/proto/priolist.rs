//! Priority list: the shared engine behind load-balancing and fair-queueing.
//!
//! Pipes register with a priority class (1..=16, lower first) and are
//! activated when ready in the relevant direction. `pop_ready` always serves
//! the best non-empty class; rotation within a class round-robins equal
//! peers, which yields plain load-balancing/fair-queueing when everything
//! shares the default class.

use hashbrown::HashMap;
use spaceframe_core::message::Message;
use spaceframe_core::options::{PRIORITY_MAX, PRIORITY_MIN};
use std::collections::VecDeque;

use crate::pipe::{PipeId, PipeRecvStatus, PipeSendStatus};

use super::{PipeHandle, SendOutcome};

struct Registration {
    pipe: PipeHandle,
    priority: u8,
    active: bool,
}

/// Priority-bucketed rotation over ready pipes.
pub(crate) struct PrioList {
    registered: HashMap<PipeId, Registration>,
    buckets: Vec<VecDeque<PipeId>>,
}

impl PrioList {
    pub(crate) fn new() -> Self {
        Self {
            registered: HashMap::new(),
            buckets: (0..usize::from(PRIORITY_MAX)).map(|_| VecDeque::new()).collect(),
        }
    }

    /// Register a pipe with its priority class. Not active until it reports
    /// ready.
    pub(crate) fn register(&mut self, pipe: PipeHandle, priority: u8) {
        let priority = priority.clamp(PRIORITY_MIN, PRIORITY_MAX);
        self.registered.insert(
            pipe.id(),
            Registration {
                pipe,
                priority,
                active: false,
            },
        );
    }

    /// Forget a pipe entirely.
    pub(crate) fn unregister(&mut self, id: PipeId) {
        if let Some(reg) = self.registered.remove(&id) {
            if reg.active {
                self.buckets[usize::from(reg.priority) - 1].retain(|&p| p != id);
            }
        }
    }

    /// Mark a registered pipe ready; it joins the tail of its class.
    pub(crate) fn activate(&mut self, id: PipeId) {
        if let Some(reg) = self.registered.get_mut(&id) {
            if !reg.active {
                reg.active = true;
                self.buckets[usize::from(reg.priority) - 1].push_back(id);
            }
        }
    }

    /// Any pipe ready?
    pub(crate) fn has_ready(&self) -> bool {
        self.buckets.iter().any(|b| !b.is_empty())
    }

    /// Take the current head of the best class. The caller must follow up
    /// with `requeue` or leave the pipe inactive.
    fn pop_ready(&mut self) -> Option<(PipeId, PipeHandle)> {
        for bucket in &mut self.buckets {
            while let Some(id) = bucket.pop_front() {
                match self.registered.get_mut(&id) {
                    Some(reg) => {
                        reg.active = false;
                        return Some((id, reg.pipe.clone()));
                    }
                    // Stale entry from an unregister race; skip it.
                    None => continue,
                }
            }
        }
        None
    }

    /// Return a popped pipe to the tail of its class.
    fn requeue(&mut self, id: PipeId) {
        self.activate(id);
    }

    /// Load-balance one message. On success returns the pipe used; when no
    /// pipe is ready the message comes back.
    pub(crate) fn send_one(&mut self, msg: Message) -> Result<PipeId, Message> {
        let Some((id, pipe)) = self.pop_ready() else {
            return Err(msg);
        };
        let status = pipe.send(msg);
        if status == PipeSendStatus::Sent {
            self.requeue(id);
        }
        Ok(id)
    }

    /// Fair-queue one message: the head pipe yields exactly one message and
    /// rotates behind its equal-priority peers.
    pub(crate) fn recv_one(&mut self) -> Option<(PipeId, Message)> {
        loop {
            let (id, pipe) = self.pop_ready()?;
            match pipe.recv() {
                Some((msg, status)) => {
                    if status == PipeRecvStatus::Readable {
                        self.requeue(id);
                    }
                    return Some((id, msg));
                }
                // Raced with the peer; this pipe is dry after all.
                None => continue,
            }
        }
    }

    /// Load-balance with the outcome shape protocols hand up.
    pub(crate) fn send_outcome(&mut self, msg: Message) -> SendOutcome {
        match self.send_one(msg) {
            Ok(_) => SendOutcome::Sent,
            Err(msg) => SendOutcome::Full(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::{create_pipe, PipeSide};
    use std::sync::Weak;

    fn pipe_pair(id_a: PipeId, id_b: PipeId) -> (PipeHandle, PipeHandle) {
        create_pipe(
            PipeSide {
                id: id_a,
                fsm: Weak::new(),
                recv_capacity: 1 << 20,
                max_msg: None,
                send_prio: 8,
                recv_prio: 8,
            },
            PipeSide {
                id: id_b,
                fsm: Weak::new(),
                recv_capacity: 1 << 20,
                max_msg: None,
                send_prio: 8,
                recv_prio: 8,
            },
        )
    }

    #[test]
    fn send_rotates_equal_priorities() {
        let (a, _ra) = pipe_pair(1, 101);
        let (b, _rb) = pipe_pair(2, 102);

        let mut list = PrioList::new();
        list.register(a, 8);
        list.register(b, 8);
        list.activate(1);
        list.activate(2);

        let order: Vec<_> = (0..4)
            .map(|_| list.send_one(Message::from("m")).unwrap())
            .collect();
        assert_eq!(order, vec![1, 2, 1, 2]);
    }

    #[test]
    fn lower_priority_class_wins() {
        let (a, _ra) = pipe_pair(1, 101);
        let (b, _rb) = pipe_pair(2, 102);

        let mut list = PrioList::new();
        list.register(a, 8);
        list.register(b, 2);
        list.activate(1);
        list.activate(2);

        assert_eq!(list.send_one(Message::from("m")).unwrap(), 2);
        assert_eq!(list.send_one(Message::from("m")).unwrap(), 2);
    }

    #[test]
    fn full_pipe_leaves_the_rotation() {
        let (a, _ra) = create_pipe(
            PipeSide {
                id: 1,
                fsm: Weak::new(),
                recv_capacity: 1 << 20,
                max_msg: None,
                send_prio: 8,
                recv_prio: 8,
            },
            PipeSide {
                id: 101,
                fsm: Weak::new(),
                recv_capacity: 1, // releases after a single message
                max_msg: None,
                send_prio: 8,
                recv_prio: 8,
            },
        );
        let mut list = PrioList::new();
        list.register(a, 8);
        list.activate(1);

        assert!(list.send_one(Message::from("fits")).is_ok());
        assert!(!list.has_ready());
        assert!(list.send_one(Message::from("kept")).is_err());
    }

    #[test]
    fn recv_fair_queues_one_message_per_pipe() {
        let (a, ra) = pipe_pair(1, 101);
        let (b, rb) = pipe_pair(2, 102);
        // Two messages waiting on each incoming pipe.
        ra.send(Message::from("a1"));
        ra.send(Message::from("a2"));
        rb.send(Message::from("b1"));
        rb.send(Message::from("b2"));

        let mut list = PrioList::new();
        list.register(a, 8);
        list.register(b, 8);
        list.activate(1);
        list.activate(2);

        let order: Vec<_> = (0..4).map(|_| list.recv_one().unwrap().0).collect();
        assert_eq!(order, vec![1, 2, 1, 2]);
        assert!(list.recv_one().is_none());
    }

    #[test]
    fn unregister_purges_active_entries() {
        let (a, _ra) = pipe_pair(1, 101);
        let mut list = PrioList::new();
        list.register(a, 8);
        list.activate(1);
        list.unregister(1);
        assert!(!list.has_ready());
        assert!(list.send_one(Message::from("m")).is_err());
    }
}
