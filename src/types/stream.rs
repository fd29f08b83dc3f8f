//! Streaming types: wire frames, partial-response chunks, finalized responses.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::message::ToolCall;
use crate::error::{CadenceError, Result};

/// One frame yielded by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum WireFrame {
    /// JSON-encoded partial response.
    Data(serde_json::Value),
    /// End of the response.
    Terminator,
}

impl WireFrame {
    /// Parse an SSE line. Returns `None` for blank lines, comments, and
    /// non-`data` fields.
    pub fn from_sse_line(line: &str) -> Option<Result<Self>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with(':') {
            return None;
        }
        let data = line.strip_prefix("data:")?.trim_start();
        if data == "[DONE]" {
            return Some(Ok(Self::Terminator));
        }
        Some(
            serde_json::from_str(data)
                .map(Self::Data)
                .map_err(|e| CadenceError::malformed(format!("invalid JSON in data line: {e}"))),
        )
    }
}

/// Typed view of a data frame's payload.
///
/// Unknown top-level fields are ignored; known fields with the wrong type
/// make the whole frame malformed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    #[serde(default)]
    pub turns: Option<Vec<String>>,
    #[serde(default, alias = "hasNext")]
    pub has_next: Option<bool>,
    #[serde(default, alias = "complianceViolations")]
    pub compliance_violations: Option<Vec<String>>,
    #[serde(default, alias = "imagePrompt")]
    pub image_prompt: Option<String>,
}

impl StreamChunk {
    /// Validate and decode a data frame payload.
    pub fn from_payload(payload: serde_json::Value) -> Result<Self> {
        if !payload.is_object() {
            return Err(CadenceError::malformed(format!(
                "expected a JSON object, got {}",
                json_kind(&payload)
            )));
        }
        serde_json::from_value(payload).map_err(|e| CadenceError::malformed(e.to_string()))
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: ChunkDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

/// Fragment of one tool call, keyed by its stable stream index.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolCallDelta {
    pub index: usize,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub function: Option<FunctionDelta>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FunctionDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

/// Why generation finished.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
}

/// One complete logical response, produced by the aggregator or handed in
/// directly for non-streamed replies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalizedResponse {
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliance_violations: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turns: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_next: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

impl FinalizedResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn with_turns<I, S>(mut self, turns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.turns = Some(turns.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_has_next(mut self, has_next: bool) -> Self {
        self.has_next = Some(has_next);
        self
    }

    pub fn with_image_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.image_prompt = Some(prompt.into());
        self
    }

    pub fn has_next(&self) -> bool {
        self.has_next.unwrap_or(false)
    }

    /// Nothing worth storing or delivering.
    pub fn is_empty(&self) -> bool {
        self.content.as_deref().map_or(true, |c| c.trim().is_empty())
            && self.tool_calls.is_empty()
            && self.reasoning.is_none()
            && self.image_prompt.is_none()
    }
}

/// Result of driving an aggregator over a whole stream.
///
/// `response` is always populated, even when `error` is set: content
/// received before the failure is kept.
#[derive(Debug)]
pub struct StreamOutcome {
    pub response: FinalizedResponse,
    pub error: Option<CadenceError>,
}

impl StreamOutcome {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}
