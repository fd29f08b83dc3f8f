//! Conversation facade: aggregator → delivery engine → history.

use std::sync::Arc;

use futures::stream::Stream;
use tracing::{debug, warn};

use crate::aggregator::aggregate;
use crate::config::CadenceConfig;
use crate::delivery::events::emit;
use crate::delivery::{
    DeliveryEvent, EventSink, FollowUpTrigger, ImageGenerator, TurnDeliveryEngine,
};
use crate::error::Result;
use crate::history::{messages_to_wire, HistoryStore, SharedHistory};
use crate::types::{FinalizedResponse, Message, Role, StreamOutcome, WireFrame};
use crate::util::{Clock, Jitter};

/// How a response was handed to history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Split into paced turns by the delivery engine.
    Split,
    /// Stored as one assistant message.
    Single,
    /// Nothing to store.
    Empty,
}

/// One conversation: its transcript plus the engine pacing replies into it.
///
/// # Example
///
/// ```no_run
/// use cadence::prelude::*;
///
/// # async fn example() -> cadence::error::Result<()> {
/// let conversation = Conversation::new(CadenceConfig::load()?)?;
/// let outbound = conversation.send_user_message("hey, how are you?")?;
/// // ... send `outbound` through the transport, then:
/// let reply = FinalizedResponse::text("Hey babe, I'm doing great! What about you?")
///     .with_turns(["Hey babe,", "I'm doing great!", "What about you?"]);
/// conversation.receive_response(reply).await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Conversation {
    history: SharedHistory,
    engine: TurnDeliveryEngine,
}

impl Conversation {
    pub fn new(config: CadenceConfig) -> Result<Self> {
        config.validate()?;
        let history = SharedHistory::new(HistoryStore::from_config(&config)?);
        let engine = TurnDeliveryEngine::new(config, Arc::new(history.clone()));
        Ok(Self { history, engine })
    }

    pub fn with_image_generator(mut self, images: Arc<dyn ImageGenerator>) -> Self {
        self.engine = self.engine.with_image_generator(images);
        self
    }

    pub fn with_follow_up(mut self, follow_up: Arc<dyn FollowUpTrigger>) -> Self {
        self.engine = self.engine.with_follow_up(follow_up);
        self
    }

    pub fn with_event_sink(mut self, events: EventSink) -> Self {
        self.engine = self.engine.with_event_sink(events);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.engine = self.engine.with_clock(clock);
        self
    }

    pub fn with_jitter(mut self, jitter: Arc<dyn Jitter>) -> Self {
        self.engine = self.engine.with_jitter(jitter);
        self
    }

    pub fn history(&self) -> &SharedHistory {
        &self.history
    }

    pub fn engine(&self) -> &TurnDeliveryEngine {
        &self.engine
    }

    /// Record a new user message and return the outbound request view.
    ///
    /// Starts a new epoch: turns of earlier responses that have not been
    /// shown yet are discarded.
    pub fn send_user_message(&self, text: impl Into<String>) -> Result<Vec<Message>> {
        let canceled = self.engine.cancel_pending_messages();
        if canceled > 0 {
            debug!(canceled, "new user message superseded pending turns");
        }
        let message = Message::user(text).with_timestamp(self.engine.clock().now());
        self.history.insert(message)?;
        Ok(self.history.request_messages())
    }

    /// Outbound request view: system prompt plus regrouped history.
    pub fn request_messages(&self) -> Vec<Message> {
        self.history.request_messages()
    }

    /// Outbound request view as chat-completions JSON.
    pub fn wire_messages(&self) -> Vec<serde_json::Value> {
        messages_to_wire(&self.history.request_messages())
    }

    /// Aggregate a streamed response and deliver it. A stream error is
    /// reported as [`DeliveryEvent::StreamError`]; whatever arrived before it
    /// is still delivered.
    pub async fn receive_stream<S>(&self, frames: S) -> StreamOutcome
    where
        S: Stream<Item = Result<WireFrame>>,
    {
        let outcome = aggregate(frames).await;
        if let Some(error) = &outcome.error {
            emit(
                self.engine.event_sink(),
                DeliveryEvent::StreamError {
                    error: error.to_string(),
                    partial_content: outcome.response.content.clone(),
                },
            );
        }
        self.receive_response(outcome.response.clone()).await;
        outcome
    }

    /// Deliver a complete response: paced turns when the engine accepts it,
    /// otherwise a single assistant message.
    pub async fn receive_response(&self, response: FinalizedResponse) -> DeliveryMode {
        if response.is_empty() && response.turns.as_ref().map_or(true, Vec::is_empty) {
            debug!("empty response, nothing to deliver");
            if response.has_next() {
                self.engine.request_follow_up(None);
            }
            return DeliveryMode::Empty;
        }
        if self.engine.process_response(&response) {
            return DeliveryMode::Split;
        }

        let timestamp = self.engine.clock().now();
        let message = single_message(&response).with_timestamp(timestamp);
        if let Err(e) = self.history.insert(message) {
            warn!(error = %e, "failed to store response");
        }
        if let Some(prompt) = response.image_prompt.as_deref().filter(|p| !p.trim().is_empty()) {
            self.engine.deliver_image(prompt.trim(), None, timestamp).await;
        }
        if response.has_next() {
            self.engine.request_follow_up(None);
        }
        DeliveryMode::Single
    }

    /// Cancel pending turns and drop the transcript. The system prompt stays.
    pub fn clear_history(&self) -> usize {
        let canceled = self.engine.cancel_pending_messages();
        self.history.clear();
        canceled
    }
}

/// The unsplit form of a response. A lone server turn stands in for
/// missing content.
fn single_message(response: &FinalizedResponse) -> Message {
    let content = response
        .content
        .clone()
        .filter(|c| !c.trim().is_empty())
        .or_else(|| response.turns.as_ref().map(|turns| turns.join(" ")))
        .or_else(|| response.tool_calls.is_empty().then(String::new));

    Message {
        role: Role::Assistant,
        content,
        reasoning: response.reasoning.clone(),
        tool_calls: (!response.tool_calls.is_empty()).then(|| response.tool_calls.clone()),
        compliance_violations: response.compliance_violations.clone(),
        ..Message::assistant("")
    }
}
