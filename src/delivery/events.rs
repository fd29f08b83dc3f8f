//! Notification events emitted by the delivery pipeline.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Callback receiving every [`DeliveryEvent`].
pub type EventSink = Arc<dyn Fn(DeliveryEvent) + Send + Sync>;

/// What happened, in delivery order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeliveryEvent {
    // -- Turns --
    TurnDelivered {
        group_id: String,
        message_index: usize,
        total_in_group: usize,
        content: String,
    },
    GroupComplete {
        group_id: String,
        total_in_group: usize,
    },
    TurnsCanceled {
        count: usize,
        epoch: u64,
    },

    // -- Image pseudo-turn --
    ImageStart {
        group_id: Option<String>,
        prompt: String,
    },
    ImageComplete {
        group_id: Option<String>,
        url: String,
    },
    ImageError {
        group_id: Option<String>,
        error: String,
    },

    // -- Follow-up --
    FollowUpTriggered {
        group_id: Option<String>,
    },
    FollowUpError {
        error: String,
    },

    // -- Stream --
    StreamError {
        error: String,
        partial_content: Option<String>,
    },
}

impl DeliveryEvent {
    /// Short name, handy for logs and assertions.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TurnDelivered { .. } => "turn_delivered",
            Self::GroupComplete { .. } => "group_complete",
            Self::TurnsCanceled { .. } => "turns_canceled",
            Self::ImageStart { .. } => "image_start",
            Self::ImageComplete { .. } => "image_complete",
            Self::ImageError { .. } => "image_error",
            Self::FollowUpTriggered { .. } => "follow_up_triggered",
            Self::FollowUpError { .. } => "follow_up_error",
            Self::StreamError { .. } => "stream_error",
        }
    }
}

pub(crate) fn emit(sink: Option<&EventSink>, event: DeliveryEvent) {
    tracing::trace!(kind = event.kind(), "delivery event");
    if let Some(sink) = sink {
        sink(event);
    }
}
