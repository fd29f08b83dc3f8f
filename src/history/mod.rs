//! Conversation history: ordered storage, reasoning cleanup, turn regrouping.

pub mod grouping;
pub mod reasoning;
pub mod store;
pub mod wire;

pub use grouping::reconstruct_grouped;
pub use reasoning::{Extracted, ReasoningExtractor};
pub use store::{HistoryStore, InsertOutcome};
pub use wire::{message_to_wire, messages_to_wire};

use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::Result;
use crate::types::{Message, MessagePatch};

/// Cloneable handle over one [`HistoryStore`].
///
/// Every method takes the lock for a single synchronous mutation, so no
/// partial update is ever visible across an await point.
#[derive(Debug, Clone, Default)]
pub struct SharedHistory {
    inner: Arc<Mutex<HistoryStore>>,
}

impl SharedHistory {
    pub fn new(store: HistoryStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    /// Run `f` with exclusive access to the store.
    pub fn with<R>(&self, f: impl FnOnce(&mut HistoryStore) -> R) -> R {
        f(&mut self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, HistoryStore> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert(&self, message: Message) -> Result<InsertOutcome> {
        self.lock().insert(message)
    }

    pub fn get(&self) -> Vec<Message> {
        self.lock().get()
    }

    pub fn replace(&self, messages: Vec<Message>, validate: bool) -> Result<()> {
        self.lock().replace(messages, validate)
    }

    pub fn update(&self, index: usize, patch: &MessagePatch) -> Result<()> {
        self.lock().update(index, patch)
    }

    pub fn delete(&self, index: usize) -> Result<Message> {
        self.lock().delete(index)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn request_messages(&self) -> Vec<Message> {
        self.lock().request_messages()
    }
}
