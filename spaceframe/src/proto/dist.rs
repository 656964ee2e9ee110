//! Distribution list: broadcast to every currently writable pipe.

use spaceframe_core::message::Message;

use crate::pipe::{PipeId, PipeSendStatus};

use super::PipeHandle;

struct Slot {
    pipe: PipeHandle,
    writable: bool,
}

/// Ordered list of pipes with broadcast send.
#[derive(Default)]
pub(crate) struct Dist {
    slots: Vec<Slot>,
}

impl Dist {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Adopt a pipe; it joins the broadcast once it reports writable.
    pub(crate) fn add(&mut self, pipe: PipeHandle) {
        self.slots.push(Slot {
            pipe,
            writable: false,
        });
    }

    pub(crate) fn rm(&mut self, id: PipeId) {
        self.slots.retain(|s| s.pipe.id() != id);
    }

    pub(crate) fn on_out(&mut self, id: PipeId) {
        if let Some(slot) = self.slots.iter_mut().find(|s| s.pipe.id() == id) {
            slot.writable = true;
        }
    }

    /// Copy the message to every writable pipe except `exclude`. Pipes that
    /// are not writable are skipped (dropped-for-them semantics). Returns
    /// how many pipes took a copy.
    pub(crate) fn send(&mut self, msg: &Message, exclude: Option<PipeId>) -> usize {
        let mut delivered = 0;
        for slot in &mut self.slots {
            if !slot.writable || exclude == Some(slot.pipe.id()) {
                continue;
            }
            if slot.pipe.send(msg.clone()) == PipeSendStatus::Release {
                slot.writable = false;
            }
            delivered += 1;
        }
        delivered
    }
}
