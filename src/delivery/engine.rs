//! Split-response delivery with human pacing and epoch-based cancellation.
//!
//! A response carrying more than one server turn is delivered as a group of
//! messages, each released by a timer at a cumulative offset. Every queued
//! turn is tagged with the epoch active when it was scheduled;
//! [`TurnDeliveryEngine::cancel_pending_messages`] bumps the epoch, so a timer
//! that fires afterwards sees a stale tag and drops its turn. A turn whose
//! delivery already started always completes.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::collaborators::{DeliveredTurn, FollowUpTrigger, ImageGenerator, TurnSink};
use super::events::{emit, DeliveryEvent, EventSink};
use super::pacing::PacingPolicy;
use crate::config::CadenceConfig;
use crate::types::{FinalizedResponse, GroupMetadata, Message, ToolCall};
use crate::util::{Clock, Jitter, SystemClock};

#[derive(Debug, Default)]
struct EngineState {
    epoch: u64,
    next_group_seq: u64,
    queue: Vec<QueuedTurn>,
    /// Group whose `has_next` turn was delivered before the group drained.
    pending_follow_up: Option<String>,
}

#[derive(Debug, Clone)]
struct QueuedTurn {
    group_id: String,
    slot: usize,
    epoch: u64,
    fired: bool,
}

#[derive(Debug, Clone)]
enum TurnKind {
    Text {
        content: String,
        group: GroupMetadata,
        reasoning: Option<String>,
        tool_calls: Option<Vec<ToolCall>>,
        compliance_violations: Option<Vec<String>>,
    },
    Image {
        prompt: String,
        timestamp: DateTime<Utc>,
    },
}

#[derive(Debug, Clone)]
struct PlannedTurn {
    slot: usize,
    offset: Duration,
    has_next: bool,
    kind: TurnKind,
}

/// Paces split responses into history and fires follow-up requests.
///
/// Cloning yields another handle to the same engine state.
#[derive(Clone)]
pub struct TurnDeliveryEngine {
    config: CadenceConfig,
    pacing: PacingPolicy,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn TurnSink>,
    images: Option<Arc<dyn ImageGenerator>>,
    follow_up: Option<Arc<dyn FollowUpTrigger>>,
    events: Option<EventSink>,
    state: Arc<Mutex<EngineState>>,
}

impl std::fmt::Debug for TurnDeliveryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock_state();
        f.debug_struct("TurnDeliveryEngine")
            .field("pacing", &self.pacing)
            .field("epoch", &state.epoch)
            .field("queued", &state.queue.len())
            .field("has_images", &self.images.is_some())
            .field("has_follow_up", &self.follow_up.is_some())
            .finish()
    }
}

impl TurnDeliveryEngine {
    pub fn new(config: CadenceConfig, sink: Arc<dyn TurnSink>) -> Self {
        Self {
            pacing: PacingPolicy::from_config(&config),
            config,
            clock: Arc::new(SystemClock),
            sink,
            images: None,
            follow_up: None,
            events: None,
            state: Arc::new(Mutex::new(EngineState::default())),
        }
    }

    pub fn with_image_generator(mut self, images: Arc<dyn ImageGenerator>) -> Self {
        self.images = Some(images);
        self
    }

    pub fn with_follow_up(mut self, follow_up: Arc<dyn FollowUpTrigger>) -> Self {
        self.follow_up = Some(follow_up);
        self
    }

    pub fn with_event_sink(mut self, events: EventSink) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_jitter(mut self, jitter: Arc<dyn Jitter>) -> Self {
        self.pacing = self.pacing.with_jitter(jitter);
        self
    }

    pub fn config(&self) -> &CadenceConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub(crate) fn event_sink(&self) -> Option<&EventSink> {
        self.events.as_ref()
    }

    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current cancellation epoch.
    pub fn current_epoch(&self) -> u64 {
        self.lock_state().epoch
    }

    /// Scheduled turns whose timers have not fired yet.
    pub fn pending_count(&self) -> usize {
        self.lock_state().queue.iter().filter(|q| !q.fired).count()
    }

    /// Split `response` into paced turns if it carries more than one server
    /// turn. Returns `false` when the caller should deliver it as a single
    /// message instead. Blank turns are dropped before counting, so
    /// `["A", "  "]` is not split.
    ///
    /// Must be called from within a tokio runtime; without one the response
    /// is left to the caller.
    pub fn process_response(&self, response: &FinalizedResponse) -> bool {
        if !self.config.multi_turn_enabled {
            return false;
        }
        let turns: Vec<&str> = match &response.turns {
            Some(turns) => turns
                .iter()
                .map(|t| t.trim())
                .filter(|t| !t.is_empty())
                .collect(),
            None => return false,
        };
        if turns.len() <= 1 {
            return false;
        }
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("no tokio runtime available, delivering response unsplit");
                return false;
            }
        };

        let image_prompt = response
            .image_prompt
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty());
        let slots = turns.len() + usize::from(image_prompt.is_some());
        let mut offsets = self.pacing.schedule(&turns);
        if image_prompt.is_some() {
            let last = offsets.last().copied().unwrap_or_default();
            offsets.push(last + self.config.image_turn_delay());
        }

        let start = Instant::now();
        let group_timestamp = self.clock.now();
        let (group_id, epoch) = {
            let mut state = self.lock_state();
            state.next_group_seq += 1;
            let epoch = state.epoch;
            let group_id = format!("{epoch}-{}", state.next_group_seq);
            for slot in 0..slots {
                state.queue.push(QueuedTurn {
                    group_id: group_id.clone(),
                    slot,
                    epoch,
                    fired: false,
                });
            }
            (group_id, epoch)
        };

        let last_slot = slots - 1;
        let last_text = turns.len() - 1;
        let plan: Vec<PlannedTurn> = offsets
            .into_iter()
            .enumerate()
            .map(|(slot, offset)| {
                let timestamp = group_timestamp + chrono::Duration::from_std(offset).unwrap_or_default();
                let kind = match turns.get(slot) {
                    Some(text) => TurnKind::Text {
                        content: text.to_string(),
                        group: GroupMetadata {
                            group_id: group_id.clone(),
                            message_index: slot,
                            total_in_group: turns.len(),
                            group_timestamp: Some(group_timestamp),
                            processed_timestamp: Some(timestamp),
                        },
                        reasoning: (slot == 0).then(|| response.reasoning.clone()).flatten(),
                        tool_calls: (slot == last_text && !response.tool_calls.is_empty())
                            .then(|| response.tool_calls.clone()),
                        compliance_violations: (slot == last_text)
                            .then(|| response.compliance_violations.clone())
                            .flatten(),
                    },
                    None => TurnKind::Image {
                        prompt: image_prompt.unwrap_or_default().to_string(),
                        timestamp,
                    },
                };
                PlannedTurn {
                    slot,
                    offset,
                    has_next: slot == last_slot && response.has_next(),
                    kind,
                }
            })
            .collect();

        info!(
            group_id = %group_id,
            epoch,
            turns = turns.len(),
            image = image_prompt.is_some(),
            has_next = response.has_next(),
            "delivering response as paced turns"
        );

        let total_in_group = turns.len();
        let engine = self.clone();
        runtime.spawn(async move {
            engine.run_group(group_id, epoch, total_in_group, start, plan).await;
        });
        true
    }

    async fn run_group(
        self,
        group_id: String,
        epoch: u64,
        total_in_group: usize,
        start: Instant,
        plan: Vec<PlannedTurn>,
    ) {
        for turn in plan {
            tokio::time::sleep_until(start + turn.offset).await;
            if !self.begin_delivery(&group_id, turn.slot, epoch) {
                debug!(group_id = %group_id, slot = turn.slot, "turn canceled before delivery");
                return;
            }

            match turn.kind {
                TurnKind::Text {
                    content,
                    group,
                    reasoning,
                    tool_calls,
                    compliance_violations,
                } => {
                    let delivered = DeliveredTurn {
                        content,
                        group,
                        reasoning,
                        tool_calls,
                        compliance_violations,
                    };
                    self.deliver_text(delivered).await;
                }
                TurnKind::Image { prompt, timestamp } => {
                    self.deliver_image(&prompt, Some(&group_id), timestamp).await;
                }
            }

            self.finish_delivery(&group_id, turn.slot, epoch, total_in_group, turn.has_next);
        }
    }

    /// Claim a queued turn for delivery. `false` when it was canceled.
    fn begin_delivery(&self, group_id: &str, slot: usize, epoch: u64) -> bool {
        let mut state = self.lock_state();
        if state.epoch != epoch {
            return false;
        }
        match state
            .queue
            .iter_mut()
            .find(|q| q.group_id == group_id && q.slot == slot && q.epoch == epoch)
        {
            Some(queued) => {
                queued.fired = true;
                true
            }
            None => false,
        }
    }

    fn finish_delivery(
        &self,
        group_id: &str,
        slot: usize,
        epoch: u64,
        total_in_group: usize,
        has_next: bool,
    ) {
        let (group_done, trigger) = {
            let mut state = self.lock_state();
            state
                .queue
                .retain(|q| !(q.group_id == group_id && q.slot == slot));
            if state.epoch != epoch {
                return;
            }
            let remaining = state.queue.iter().any(|q| q.group_id == group_id);
            let mut trigger = false;
            if has_next {
                if remaining {
                    state.pending_follow_up = Some(group_id.to_string());
                } else {
                    trigger = true;
                }
            } else if !remaining && state.pending_follow_up.as_deref() == Some(group_id) {
                state.pending_follow_up = None;
                trigger = true;
            }
            (!remaining, trigger)
        };

        if group_done {
            info!(group_id = %group_id, "turn group complete");
            emit(
                self.events.as_ref(),
                DeliveryEvent::GroupComplete {
                    group_id: group_id.to_string(),
                    total_in_group,
                },
            );
        }
        if trigger {
            self.request_follow_up(Some(group_id));
        }
    }

    async fn deliver_text(&self, turn: DeliveredTurn) {
        let group_id = turn.group.group_id.clone();
        let message_index = turn.group.message_index;
        let total_in_group = turn.group.total_in_group;
        let content = turn.content.clone();

        match self.sink.deliver(turn).await {
            Ok(()) => {
                debug!(group_id = %group_id, message_index, total_in_group, "turn delivered");
                emit(
                    self.events.as_ref(),
                    DeliveryEvent::TurnDelivered {
                        group_id,
                        message_index,
                        total_in_group,
                        content,
                    },
                );
            }
            Err(e) => {
                warn!(group_id = %group_id, message_index, error = %e, "turn sink rejected turn");
            }
        }
    }

    /// Run the image collaborator and store the result as an assistant
    /// message. Failures are reported, never propagated.
    pub async fn deliver_image(
        &self,
        prompt: &str,
        group_id: Option<&str>,
        timestamp: DateTime<Utc>,
    ) -> Option<Message> {
        let group_id = group_id.map(str::to_string);
        emit(
            self.events.as_ref(),
            DeliveryEvent::ImageStart {
                group_id: group_id.clone(),
                prompt: prompt.to_string(),
            },
        );

        let result = match &self.images {
            Some(images) => images.generate(prompt).await,
            None => Err(crate::error::CadenceError::ImageGeneration(
                "no image generator configured".into(),
            )),
        };

        match result {
            Ok(url) => {
                info!(group_id = ?group_id, "image generated");
                emit(
                    self.events.as_ref(),
                    DeliveryEvent::ImageComplete {
                        group_id,
                        url: url.clone(),
                    },
                );
                let message = Message::assistant(format!("![image]({url})")).with_timestamp(timestamp);
                if let Err(e) = self.sink.deliver_message(message.clone()).await {
                    warn!(error = %e, "failed to store image message");
                    return None;
                }
                Some(message)
            }
            Err(e) => {
                warn!(group_id = ?group_id, error = %e, "image generation failed");
                emit(
                    self.events.as_ref(),
                    DeliveryEvent::ImageError {
                        group_id,
                        error: e.to_string(),
                    },
                );
                None
            }
        }
    }

    /// Fire the follow-up collaborator without waiting for it.
    pub fn request_follow_up(&self, group_id: Option<&str>) {
        let Some(trigger) = self.follow_up.clone() else {
            debug!(group_id, "has_next set but no follow-up trigger configured");
            return;
        };
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("no tokio runtime available, follow-up skipped");
                return;
            }
        };

        info!(group_id, "triggering follow-up request");
        emit(
            self.events.as_ref(),
            DeliveryEvent::FollowUpTriggered {
                group_id: group_id.map(str::to_string),
            },
        );
        let events = self.events.clone();
        runtime.spawn(async move {
            if let Err(e) = trigger.trigger_follow_up().await {
                warn!(error = %e, "follow-up request failed");
                emit(
                    events.as_ref(),
                    DeliveryEvent::FollowUpError {
                        error: e.to_string(),
                    },
                );
            }
        });
    }

    /// Invalidate every turn whose timer has not fired yet. Returns how many
    /// were discarded.
    pub fn cancel_pending_messages(&self) -> usize {
        let (count, epoch) = {
            let mut state = self.lock_state();
            state.epoch += 1;
            let count = state.queue.iter().filter(|q| !q.fired).count();
            state.queue.clear();
            state.pending_follow_up = None;
            (count, state.epoch)
        };

        if count > 0 {
            info!(count, epoch, "canceled pending turns");
            emit(
                self.events.as_ref(),
                DeliveryEvent::TurnsCanceled { count, epoch },
            );
        }
        count
    }
}
