//! Pending optimistic operations, keyed by the id of the entry they touch
//!
//! Sends are keyed by a provisional id (`temp-<uuid>`) that stands in for the
//! server id until the send settles. Edits and deletes are keyed by the real
//! message id and keep the original message so a failure can put it back.

use std::collections::HashMap;

use gigi_chat::{DeleteMode, ErrorBody, Message, NewMessage};

const PROVISIONAL_PREFIX: &str = "temp-";

pub fn provisional_id() -> String {
    format!("{}{}", PROVISIONAL_PREFIX, uuid::Uuid::new_v4())
}

pub fn is_provisional(id: &str) -> bool {
    id.starts_with(PROVISIONAL_PREFIX)
}

#[derive(Debug, Clone, PartialEq)]
pub enum SendState {
    InFlight,
    Failed(ErrorBody),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PendingOp {
    Send {
        input: NewMessage,
        state: SendState,
    },
    Edit {
        original: Message,
    },
    Delete {
        original: Message,
        index: usize,
        mode: DeleteMode,
    },
}

#[derive(Debug, Default)]
pub struct PendingOps {
    ops: HashMap<String, PendingOp>,
    // Issue order of sends, so reconciliation re-appends them in order
    send_order: Vec<String>,
}

impl PendingOps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_send(&mut self, provisional_id: &str, input: NewMessage) {
        self.ops.insert(
            provisional_id.to_string(),
            PendingOp::Send {
                input,
                state: SendState::InFlight,
            },
        );
        self.send_order.push(provisional_id.to_string());
    }

    pub fn begin_edit(&mut self, original: Message) {
        self.ops
            .insert(original.id.clone(), PendingOp::Edit { original });
    }

    pub fn begin_delete(&mut self, original: Message, index: usize, mode: DeleteMode) {
        self.ops.insert(
            original.id.clone(),
            PendingOp::Delete {
                original,
                index,
                mode,
            },
        );
    }

    pub fn get(&self, id: &str) -> Option<&PendingOp> {
        self.ops.get(id)
    }

    /// Input of a send that has failed, ready to be re-issued
    pub fn failed_send(&self, provisional_id: &str) -> Option<&NewMessage> {
        match self.ops.get(provisional_id) {
            Some(PendingOp::Send {
                input,
                state: SendState::Failed(_),
            }) => Some(input),
            _ => None,
        }
    }

    pub fn mark_send_failed(&mut self, provisional_id: &str, error: ErrorBody) {
        if let Some(PendingOp::Send { state, .. }) = self.ops.get_mut(provisional_id) {
            *state = SendState::Failed(error);
        }
    }

    pub fn mark_send_in_flight(&mut self, provisional_id: &str) {
        if let Some(PendingOp::Send { state, .. }) = self.ops.get_mut(provisional_id) {
            *state = SendState::InFlight;
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<PendingOp> {
        self.send_order.retain(|pending| pending != id);
        self.ops.remove(id)
    }

    /// Provisional ids of unsettled or failed sends, oldest first
    pub fn sends(&self) -> &[String] {
        &self.send_order
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
