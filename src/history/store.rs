//! Bounded, chronologically ordered transcript.

use tracing::{debug, trace};

use super::grouping::reconstruct_grouped;
use super::reasoning::ReasoningExtractor;
use crate::config::CadenceConfig;
use crate::error::{CadenceError, Result};
use crate::types::{Message, MessagePatch, Role};

/// Where an inserted message ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Stored at this position (before any eviction).
    Inserted(usize),
    /// Assistant message with nothing left after reasoning extraction.
    DroppedEmpty,
    /// `history_size` is zero.
    RetentionDisabled,
    /// System messages replace the held system prompt instead.
    SystemPromptSet,
}

/// Ordered transcript, non-decreasing by `timestamp` at all times.
///
/// The system prompt is held outside the sequence and never evicted.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    messages: Vec<Message>,
    history_size: usize,
    system_prompt: Option<String>,
    extractor: ReasoningExtractor,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::with_capacity(CadenceConfig::default().history_size)
    }
}

impl HistoryStore {
    pub fn with_capacity(history_size: usize) -> Self {
        Self {
            messages: Vec::new(),
            history_size,
            system_prompt: None,
            extractor: ReasoningExtractor::default(),
        }
    }

    pub fn from_config(config: &CadenceConfig) -> Result<Self> {
        Ok(Self {
            messages: Vec::new(),
            history_size: config.history_size,
            system_prompt: config.system_prompt.clone(),
            extractor: ReasoningExtractor::new(
                &config.reasoning_open_tag,
                &config.reasoning_close_tag,
            )?,
        })
    }

    pub fn history_size(&self) -> usize {
        self.history_size
    }

    /// Change capacity, evicting the oldest entries if needed.
    pub fn set_history_size(&mut self, history_size: usize) {
        self.history_size = history_size;
        self.enforce_capacity();
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn set_system_prompt(&mut self, prompt: Option<String>) {
        self.system_prompt = prompt;
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Borrow the stored sequence.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Deep copy of the stored sequence.
    pub fn get(&self) -> Vec<Message> {
        self.messages.clone()
    }

    /// The last `n` stored messages.
    pub fn last_n(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    /// Insert in timestamp order, then evict the oldest entries over capacity.
    pub fn insert(&mut self, message: Message) -> Result<InsertOutcome> {
        message.validate()?;

        if message.role == Role::System {
            self.system_prompt = message.content;
            return Ok(InsertOutcome::SystemPromptSet);
        }
        if self.history_size == 0 {
            return Ok(InsertOutcome::RetentionDisabled);
        }

        let message = match self.clean_assistant(message) {
            Some(message) => message,
            None => {
                debug!("dropping assistant message with no visible content");
                return Ok(InsertOutcome::DroppedEmpty);
            }
        };

        let position = self.insertion_point(&message);
        trace!(position, len = self.messages.len(), role = %message.role, "inserting message");
        self.messages.insert(position, message);
        self.enforce_capacity();
        Ok(InsertOutcome::Inserted(position))
    }

    /// Position right after the last entry whose timestamp is `<=` the new one.
    fn insertion_point(&self, message: &Message) -> usize {
        let mut position = self.messages.len();
        while position > 0 && message.timestamp < self.messages[position - 1].timestamp {
            position -= 1;
        }
        position
    }

    /// Extract reasoning from assistant content. `None` means the message
    /// carries nothing worth keeping.
    fn clean_assistant(&self, mut message: Message) -> Option<Message> {
        if message.role != Role::Assistant {
            return Some(message);
        }
        if let Some(content) = message.content.take() {
            let extracted = self.extractor.extract(&content);
            message.reasoning = merge_reasoning(message.reasoning.take(), extracted.reasoning);
            message.content = Some(extracted.content);
        }
        let empty = message.text().trim().is_empty();
        if empty && !message.has_tool_calls() && message.reasoning.is_none() {
            return None;
        }
        Some(message)
    }

    fn enforce_capacity(&mut self) {
        if self.messages.len() > self.history_size {
            let excess = self.messages.len() - self.history_size;
            debug!(evicted = excess, capacity = self.history_size, "evicting oldest messages");
            self.messages.drain(..excess);
        }
    }

    /// Replace the whole sequence. With `validate`, any invalid message
    /// rejects the call and leaves the store unchanged. System messages are
    /// lifted into the system prompt; the rest are ordered by timestamp.
    pub fn replace(&mut self, messages: Vec<Message>, validate: bool) -> Result<()> {
        if validate {
            for (index, message) in messages.iter().enumerate() {
                message.validate().map_err(|e| {
                    CadenceError::Validation(format!("message {index}: {e}"))
                })?;
            }
        }

        let mut system_prompt = None;
        let mut next: Vec<Message> = Vec::with_capacity(messages.len());
        for message in messages {
            if message.role == Role::System {
                system_prompt = message.content;
            } else {
                next.push(message);
            }
        }
        next.sort_by_key(|m| m.timestamp);

        if system_prompt.is_some() {
            self.system_prompt = system_prompt;
        }
        self.messages = next;
        self.enforce_capacity();
        Ok(())
    }

    /// Apply a partial update to the message at `index`.
    pub fn update(&mut self, index: usize, patch: &MessagePatch) -> Result<()> {
        let current = self.messages.get(index).ok_or(CadenceError::IndexOutOfBounds {
            index,
            len: self.messages.len(),
        })?;
        if patch.is_empty() {
            return Err(CadenceError::Validation("empty patch".into()));
        }

        let patched = patch.applied_to(current);
        patched.validate()?;
        let patched = self.clean_assistant(patched).ok_or_else(|| {
            CadenceError::Validation("update would leave an empty assistant message".into())
        })?;
        self.messages[index] = patched;
        Ok(())
    }

    /// Remove and return the message at `index`.
    pub fn delete(&mut self, index: usize) -> Result<Message> {
        if index >= self.messages.len() {
            return Err(CadenceError::IndexOutOfBounds {
                index,
                len: self.messages.len(),
            });
        }
        Ok(self.messages.remove(index))
    }

    /// Drop every stored message. The system prompt is kept.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// See [`reconstruct_grouped`].
    pub fn reconstruct_grouped(&self, messages: &[Message]) -> Vec<Message> {
        reconstruct_grouped(messages)
    }

    /// Outbound view: system prompt first, then one message per logical turn.
    pub fn request_messages(&self) -> Vec<Message> {
        let mut out = Vec::with_capacity(self.messages.len() + 1);
        if let Some(prompt) = &self.system_prompt {
            out.push(Message::system(prompt.clone()));
        }
        out.extend(reconstruct_grouped(&self.messages));
        out
    }
}

fn merge_reasoning(existing: Option<String>, extracted: Option<String>) -> Option<String> {
    match (existing, extracted) {
        (Some(a), Some(b)) if !a.trim().is_empty() => Some(format!("{a}\n\n{b}")),
        (_, Some(b)) => Some(b),
        (a, None) => a.filter(|a| !a.trim().is_empty()),
    }
}
