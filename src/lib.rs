//! Cadence — human-paced message delivery for conversational AI clients
//!
//! Turns a completed (or streamed) model response into a believable,
//! multi-message conversation while keeping a bounded, chronologically
//! ordered transcript that can be replayed into the next request.
//!
//! - [`aggregator`] rebuilds one logical response from partial wire frames.
//! - [`delivery`] splits responses into paced turns, with epoch-based
//!   cancellation and chained follow-up requests.
//! - [`history`] stores the transcript and regroups split turns for
//!   outbound requests.
//! - [`conversation`] wires the three together.
//!
//! # Quick Start
//!
//! ```no_run
//! use cadence::prelude::*;
//!
//! # async fn example() -> cadence::error::Result<()> {
//! let conversation = Conversation::new(CadenceConfig::default())?;
//! conversation.send_user_message("how was your day?")?;
//!
//! let frames = futures::stream::iter(vec![
//!     Ok(WireFrame::Data(serde_json::json!({
//!         "choices": [{"delta": {"content": "Great! You?"}}],
//!         "turns": ["Great!", "You?"]
//!     }))),
//!     Ok(WireFrame::Terminator),
//! ]);
//! conversation.receive_stream(frames).await;
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod config;
pub mod conversation;
pub mod delivery;
pub mod error;
pub mod history;
pub mod prelude;
pub mod types;
pub mod util;
