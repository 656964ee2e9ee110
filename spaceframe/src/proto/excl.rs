//! Single-slot pipe holder for exclusive-peer patterns (PAIR).

use spaceframe_core::message::Message;

use crate::pipe::{PipeId, PipeRecvStatus, PipeSendStatus};

use super::{PipeHandle, SendOutcome};

/// At most one active pipe, with per-direction readiness.
#[derive(Default)]
pub(crate) struct Excl {
    pipe: Option<PipeHandle>,
    can_send: bool,
    can_recv: bool,
}

impl Excl {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Adopt the pipe; fails when the slot is taken.
    pub(crate) fn add(&mut self, pipe: PipeHandle) -> bool {
        if self.pipe.is_some() {
            return false;
        }
        self.pipe = Some(pipe);
        self.can_send = false;
        self.can_recv = false;
        true
    }

    pub(crate) fn rm(&mut self, id: PipeId) {
        if self.pipe.as_ref().is_some_and(|p| p.id() == id) {
            self.pipe = None;
            self.can_send = false;
            self.can_recv = false;
        }
    }

    pub(crate) fn on_in(&mut self, id: PipeId) {
        if self.pipe.as_ref().is_some_and(|p| p.id() == id) {
            self.can_recv = true;
        }
    }

    pub(crate) fn on_out(&mut self, id: PipeId) {
        if self.pipe.as_ref().is_some_and(|p| p.id() == id) {
            self.can_send = true;
        }
    }

    pub(crate) fn can_send(&self) -> bool {
        self.can_send
    }

    pub(crate) fn can_recv(&self) -> bool {
        self.can_recv
    }

    pub(crate) fn send(&mut self, msg: Message) -> SendOutcome {
        let Some(pipe) = self.pipe.as_ref().filter(|_| self.can_send) else {
            return SendOutcome::Full(msg);
        };
        if pipe.send(msg) == PipeSendStatus::Release {
            self.can_send = false;
        }
        SendOutcome::Sent
    }

    pub(crate) fn recv(&mut self) -> Option<Message> {
        let pipe = self.pipe.as_ref().filter(|_| self.can_recv)?;
        match pipe.recv() {
            Some((msg, PipeRecvStatus::Readable)) => Some(msg),
            Some((msg, PipeRecvStatus::Drained)) => {
                self.can_recv = false;
                Some(msg)
            }
            None => {
                self.can_recv = false;
                None
            }
        }
    }
}
