//! Per-actor message queue with a peek cursor.
//!
//! Receiving never removes anything: each peek returns the entry under the
//! cursor and moves the cursor forward. A program scans messages this way,
//! then either removes the last one it peeked or rewinds to the front.

use avm_runtime::Value;

#[derive(Debug, Default)]
pub struct Mailbox {
    messages: Vec<Value>,
    cursor: usize,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Index of the next entry a peek will return.
    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn push(&mut self, msg: Value) {
        self.messages.push(msg);
    }

    #[inline]
    pub fn has_unpeeked(&self) -> bool {
        self.cursor < self.messages.len()
    }

    pub fn peek(&mut self) -> Option<Value> {
        let msg = self.messages.get(self.cursor).copied()?;
        self.cursor += 1;
        Some(msg)
    }

    /// Removes the most recently peeked entry and rewinds. `None` if nothing
    /// has been peeked since the last rewind.
    pub fn remove_peeked(&mut self) -> Option<Value> {
        let idx = self.cursor.checked_sub(1)?;
        self.cursor = 0;
        Some(self.messages.remove(idx))
    }

    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    pub(crate) fn values_mut(&mut self) -> &mut [Value] {
        &mut self.messages
    }
}
