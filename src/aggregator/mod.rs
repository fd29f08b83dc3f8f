//! Stream response aggregation.
//!
//! Rebuilds one logical response (text, tool calls, companion flags) from a
//! sequence of partial wire frames.

pub mod sse;

pub use sse::sse_frames;

use futures::stream::Stream;
use futures::StreamExt;
use tracing::{debug, warn};

use crate::error::{CadenceError, Result};
use crate::types::{
    FinalizedResponse, FinishReason, StreamChunk, StreamOutcome, ToolCall, ToolCallDelta, WireFrame,
};

/// How far past the known tool calls a delta may point before the frame is
/// rejected as malformed.
pub const MAX_TOOL_CALL_INDEX_GAP: usize = 64;

/// What the aggregator wants after consuming a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Continue,
    Finished,
}

/// Incremental accumulator for one streamed response.
#[derive(Debug, Default)]
pub struct StreamAggregator {
    content: Option<String>,
    reasoning: Option<String>,
    tool_calls: Vec<ToolCall>,
    compliance_violations: Option<Vec<String>>,
    turns: Option<Vec<String>>,
    has_next: Option<bool>,
    image_prompt: Option<String>,
    finish_reason: Option<FinishReason>,
    frames_seen: usize,
    finished: bool,
}

impl StreamAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content accumulated so far.
    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn frames_seen(&self) -> usize {
        self.frames_seen
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Consume one frame. A malformed payload is reported as an error and
    /// leaves the already-accumulated state untouched.
    pub fn push_frame(&mut self, frame: WireFrame) -> Result<FrameOutcome> {
        if self.finished {
            debug!("ignoring frame after terminator");
            return Ok(FrameOutcome::Finished);
        }
        match frame {
            WireFrame::Terminator => {
                self.finished = true;
                Ok(FrameOutcome::Finished)
            }
            WireFrame::Data(payload) => {
                let chunk = StreamChunk::from_payload(payload)?;
                self.check_tool_indices(&chunk)?;
                self.apply_chunk(chunk);
                self.frames_seen += 1;
                Ok(FrameOutcome::Continue)
            }
        }
    }

    /// Reject the chunk before touching any state if a tool-call index jumps
    /// too far ahead.
    fn check_tool_indices(&self, chunk: &StreamChunk) -> Result<()> {
        let mut known = self.tool_calls.len();
        let deltas = chunk
            .choices
            .iter()
            .filter_map(|choice| choice.delta.tool_calls.as_ref())
            .flatten();
        for delta in deltas {
            let limit = known.saturating_add(MAX_TOOL_CALL_INDEX_GAP);
            let next_len = delta.index.checked_add(1).filter(|_| delta.index <= limit);
            match next_len {
                Some(len) => known = known.max(len),
                None => {
                    return Err(CadenceError::malformed(format!(
                        "tool call index {} too far past {known} known calls",
                        delta.index
                    )))
                }
            }
        }
        Ok(())
    }

    fn apply_chunk(&mut self, chunk: StreamChunk) {
        for choice in chunk.choices {
            let delta = choice.delta;
            if let Some(text) = delta.content {
                self.content.get_or_insert_with(String::new).push_str(&text);
            }
            if let Some(text) = delta.reasoning {
                self.reasoning.get_or_insert_with(String::new).push_str(&text);
            }
            for call in delta.tool_calls.unwrap_or_default() {
                self.merge_tool_call(call);
            }
            if let Some(reason) = choice.finish_reason.as_deref() {
                self.finish_reason = parse_finish_reason(reason);
            }
        }

        // Companion fields: last value seen wins.
        if let Some(turns) = chunk.turns {
            self.turns = Some(turns);
        }
        if let Some(has_next) = chunk.has_next {
            self.has_next = Some(has_next);
        }
        if let Some(violations) = chunk.compliance_violations {
            self.compliance_violations = Some(violations);
        }
        if let Some(prompt) = chunk.image_prompt {
            self.image_prompt = Some(prompt);
        }
    }

    fn merge_tool_call(&mut self, delta: ToolCallDelta) {
        if delta.index >= self.tool_calls.len() {
            if delta.index > self.tool_calls.len() {
                debug!(
                    index = delta.index,
                    known = self.tool_calls.len(),
                    "tool call index skipped ahead, filling placeholders"
                );
            }
            self.tool_calls.resize_with(delta.index + 1, placeholder_tool_call);
        }
        let slot = &mut self.tool_calls[delta.index];
        if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
            slot.id = id;
        }
        if let Some(kind) = delta.kind.filter(|kind| !kind.is_empty()) {
            slot.kind = kind;
        }
        if let Some(function) = delta.function {
            if let Some(name) = function.name.filter(|name| !name.is_empty()) {
                slot.function.name = name;
            }
            if let Some(arguments) = function.arguments {
                slot.function.arguments.push_str(&arguments);
            }
        }
    }

    /// Produce the finalized response. Tool calls that never received a
    /// function name (unfilled placeholders, or calls cut off mid-stream)
    /// are dropped.
    pub fn finalize(self) -> FinalizedResponse {
        let total_slots = self.tool_calls.len();
        let tool_calls: Vec<ToolCall> = self
            .tool_calls
            .into_iter()
            .filter(|call| !call.function.name.is_empty())
            .collect();
        if tool_calls.len() < total_slots {
            warn!(
                dropped = total_slots - tool_calls.len(),
                "discarding tool calls without a function name"
            );
        }

        let mut content = self.content;
        let tool_only =
            self.finish_reason == Some(FinishReason::ToolCalls) || !tool_calls.is_empty();
        if tool_only && content.as_deref().is_some_and(str::is_empty) {
            content = None;
        }

        FinalizedResponse {
            content,
            tool_calls,
            reasoning: self.reasoning.filter(|r| !r.trim().is_empty()),
            compliance_violations: self.compliance_violations,
            turns: self.turns,
            has_next: self.has_next,
            image_prompt: self.image_prompt,
            finish_reason: self.finish_reason,
        }
    }
}

fn placeholder_tool_call() -> ToolCall {
    ToolCall::function("", "", "")
}

fn parse_finish_reason(s: &str) -> Option<FinishReason> {
    match s {
        "stop" => Some(FinishReason::Stop),
        "length" => Some(FinishReason::Length),
        "tool_calls" | "function_call" => Some(FinishReason::ToolCalls),
        "content_filter" => Some(FinishReason::ContentFilter),
        _ => None,
    }
}

/// Drive an aggregator over a whole frame stream.
///
/// Stops at the terminator, at the end of the stream, or at the first error.
/// In every case the content received so far is finalized.
pub async fn aggregate<S>(frames: S) -> StreamOutcome
where
    S: Stream<Item = Result<WireFrame>>,
{
    let mut aggregator = StreamAggregator::new();
    let mut error = None;
    futures::pin_mut!(frames);

    while let Some(item) = frames.next().await {
        let step = item.and_then(|frame| aggregator.push_frame(frame));
        match step {
            Ok(FrameOutcome::Continue) => {}
            Ok(FrameOutcome::Finished) => break,
            Err(e) => {
                warn!(
                    error = %e,
                    frames = aggregator.frames_seen(),
                    "stream aborted, finalizing partial response"
                );
                error = Some(e);
                break;
            }
        }
    }

    if error.is_none() && !aggregator.is_finished() {
        debug!("transport ended without terminator");
    }

    StreamOutcome {
        response: aggregator.finalize(),
        error,
    }
}
