//! Turn delivery: pacing split responses into history.

pub mod collaborators;
pub mod engine;
pub mod events;
pub mod pacing;

pub use collaborators::{DeliveredTurn, FollowUpTrigger, ImageGenerator, TurnSink};
pub use engine::TurnDeliveryEngine;
pub use events::{DeliveryEvent, EventSink};
pub use pacing::PacingPolicy;
