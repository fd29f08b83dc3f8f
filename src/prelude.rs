//! Convenience re-exports.

pub use crate::aggregator::{aggregate, sse_frames, StreamAggregator};
pub use crate::config::CadenceConfig;
pub use crate::conversation::{Conversation, DeliveryMode};
pub use crate::delivery::{
    DeliveredTurn, DeliveryEvent, EventSink, FollowUpTrigger, ImageGenerator, TurnDeliveryEngine,
    TurnSink,
};
pub use crate::error::{CadenceError, Result};
pub use crate::history::{HistoryStore, SharedHistory};
pub use crate::types::{
    FinalizedResponse, GroupMetadata, Message, MessagePatch, Role, StreamOutcome, ToolCall,
    WireFrame,
};
