//! Message types stored in the transcript.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{CadenceError, Result};

/// A message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliance_violations: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_in_group: Option<usize>,
}

impl Message {
    fn with_role(role: Role, content: Option<String>) -> Self {
        Self {
            role,
            content,
            name: None,
            reasoning: None,
            timestamp: Utc::now(),
            tool_calls: None,
            tool_call_id: None,
            compliance_violations: None,
            group_id: None,
            message_index: None,
            total_in_group: None,
        }
    }

    /// Create a system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::with_role(Role::System, Some(text.into()))
    }

    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::with_role(Role::User, Some(text.into()))
    }

    /// Create an assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, Some(text.into()))
    }

    /// Create an assistant message that only carries tool calls.
    pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        let mut message = Self::with_role(Role::Assistant, None);
        message.tool_calls = Some(tool_calls);
        message
    }

    /// Create a tool result message.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut message = Self::with_role(Role::Tool, Some(content.into()));
        message.tool_call_id = Some(tool_call_id.into());
        message
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Tag this message as one fragment of a split response.
    pub fn with_group(mut self, group: &GroupMetadata) -> Self {
        self.group_id = Some(group.group_id.clone());
        self.message_index = Some(group.message_index);
        self.total_in_group = Some(group.total_in_group);
        if let Some(processed) = group.processed_timestamp {
            self.timestamp = processed;
        }
        self
    }

    /// Group fields, if this message is a fragment of a split response.
    pub fn group_metadata(&self) -> Option<GroupMetadata> {
        let group_id = self.group_id.clone()?;
        Some(GroupMetadata {
            group_id,
            message_index: self.message_index.unwrap_or(0),
            total_in_group: self.total_in_group.unwrap_or(1),
            group_timestamp: None,
            processed_timestamp: Some(self.timestamp),
        })
    }

    /// Text content, or an empty string for tool-only messages.
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|calls| !calls.is_empty())
    }

    /// Check the structural invariants a stored message must satisfy.
    pub fn validate(&self) -> Result<()> {
        match self.role {
            Role::System | Role::User => {
                if self.content.is_none() {
                    return Err(CadenceError::Validation(format!(
                        "{} message requires content",
                        self.role
                    )));
                }
            }
            Role::Assistant => {
                if self.content.is_none() && !self.has_tool_calls() {
                    return Err(CadenceError::Validation(
                        "assistant message without content must carry tool calls".into(),
                    ));
                }
            }
            Role::Tool => {
                if self.content.is_none() || self.tool_call_id.is_none() {
                    return Err(CadenceError::Validation(
                        "tool message requires content and tool_call_id".into(),
                    ));
                }
            }
        }
        if let Some(calls) = &self.tool_calls {
            if let Some(call) = calls.iter().find(|c| c.function.name.is_empty()) {
                return Err(CadenceError::Validation(format!(
                    "tool call {:?} has no function name",
                    call.id
                )));
            }
        }
        if let (Some(index), Some(total)) = (self.message_index, self.total_in_group) {
            if index >= total {
                return Err(CadenceError::Validation(format!(
                    "message_index {index} outside group of {total}"
                )));
            }
        }
        Ok(())
    }
}

/// Conversation role.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool call requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "default_tool_type")]
    pub kind: String,
    pub function: FunctionCall,
}

fn default_tool_type() -> String {
    "function".to_string()
}

impl ToolCall {
    pub fn function(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: default_tool_type(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }

    /// Parse the accumulated argument string as JSON.
    pub fn parsed_arguments(&self) -> Result<serde_json::Value> {
        if self.function.arguments.trim().is_empty() {
            return Ok(serde_json::Value::Object(Default::default()));
        }
        Ok(serde_json::from_str(&self.function.arguments)?)
    }
}

/// Function name plus JSON-encoded arguments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

/// Marks a message as one fragment of a response split into turns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupMetadata {
    pub group_id: String,
    pub message_index: usize,
    pub total_in_group: usize,
    /// Shared logical moment of the whole group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_timestamp: Option<DateTime<Utc>>,
    /// When this particular fragment was delivered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_timestamp: Option<DateTime<Utc>>,
}

/// Partial update applied by [`HistoryStore::update`](crate::history::HistoryStore::update).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessagePatch {
    pub content: Option<Option<String>>,
    pub reasoning: Option<Option<String>>,
    pub name: Option<Option<String>>,
    pub tool_calls: Option<Option<Vec<ToolCall>>>,
    pub compliance_violations: Option<Option<Vec<String>>>,
}

impl MessagePatch {
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content: Some(Some(text.into())),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Apply to a copy of `message`.
    pub fn applied_to(&self, message: &Message) -> Message {
        let mut next = message.clone();
        if let Some(content) = &self.content {
            next.content = content.clone();
        }
        if let Some(reasoning) = &self.reasoning {
            next.reasoning = reasoning.clone();
        }
        if let Some(name) = &self.name {
            next.name = name.clone();
        }
        if let Some(tool_calls) = &self.tool_calls {
            next.tool_calls = tool_calls.clone();
        }
        if let Some(violations) = &self.compliance_violations {
            next.compliance_violations = violations.clone();
        }
        next
    }
}
