//! Seams to the outside world: where turns land, image generation, follow-ups.

use async_trait::async_trait;

use crate::error::Result;
use crate::history::{InsertOutcome, SharedHistory};
use crate::types::{GroupMetadata, Message, ToolCall};

/// One turn, ready to be shown.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveredTurn {
    pub content: String,
    pub group: GroupMetadata,
    /// Set on the first turn of a group only.
    pub reasoning: Option<String>,
    /// Set on the last turn of a group only.
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Set on the last turn of a group only.
    pub compliance_violations: Option<Vec<String>>,
}

impl DeliveredTurn {
    /// The assistant message this turn becomes in history.
    pub fn to_message(&self) -> Message {
        let mut message = Message::assistant(self.content.clone()).with_group(&self.group);
        message.reasoning = self.reasoning.clone();
        message.tool_calls = self.tool_calls.clone().filter(|calls| !calls.is_empty());
        message.compliance_violations = self.compliance_violations.clone();
        message
    }
}

/// Receives each turn when its timer fires.
#[async_trait]
pub trait TurnSink: Send + Sync {
    async fn deliver(&self, turn: DeliveredTurn) -> Result<()>;

    /// Store a synthesized, ungrouped message (e.g. a generated image).
    async fn deliver_message(&self, message: Message) -> Result<()>;
}

/// Turns image prompts into a displayable reference (usually a URL).
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Issues the continuation request after a response signalled `has_next`.
/// Fire-and-forget: the result is only logged and reported.
#[async_trait]
pub trait FollowUpTrigger: Send + Sync {
    async fn trigger_follow_up(&self) -> Result<()>;
}

#[async_trait]
impl TurnSink for SharedHistory {
    async fn deliver(&self, turn: DeliveredTurn) -> Result<()> {
        match self.insert(turn.to_message())? {
            InsertOutcome::Inserted(position) => {
                tracing::debug!(
                    group_id = %turn.group.group_id,
                    index = turn.group.message_index,
                    position,
                    "turn stored"
                );
            }
            outcome => {
                tracing::debug!(group_id = %turn.group.group_id, ?outcome, "turn not stored");
            }
        }
        Ok(())
    }

    async fn deliver_message(&self, message: Message) -> Result<()> {
        self.insert(message)?;
        Ok(())
    }
}
