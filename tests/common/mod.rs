//! Shared test helpers and mock collaborators.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use cadence::config::CadenceConfig;
use cadence::delivery::{DeliveredTurn, DeliveryEvent, EventSink, FollowUpTrigger, ImageGenerator, TurnSink};
use cadence::error::{CadenceError, Result};
use cadence::types::Message;

/// Deterministic pacing: 500ms base, 10 chars/s, 3s cap, no jitter.
pub fn test_config() -> CadenceConfig {
    CadenceConfig::builder()
        .history_size(20)
        .base_delay_ms(500)
        .max_delay_ms(3000)
        .typing_chars_per_second(10.0)
        .jitter_ratio(0.0)
        .image_turn_delay_ms(1000)
        .build()
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap()
}

pub fn capture_events() -> (EventSink, Arc<Mutex<Vec<DeliveryEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::<DeliveryEvent>::new()));
    let sink_events = events.clone();
    let sink: EventSink = Arc::new(move |event| {
        if let Ok(mut guard) = sink_events.lock() {
            guard.push(event);
        }
    });
    (sink, events)
}

pub fn event_kinds(events: &Arc<Mutex<Vec<DeliveryEvent>>>) -> Vec<&'static str> {
    events.lock().unwrap().iter().map(|e| e.kind()).collect()
}

/// Records every turn instead of storing it.
#[derive(Default)]
pub struct RecordingSink {
    pub turns: Mutex<Vec<DeliveredTurn>>,
    pub messages: Mutex<Vec<Message>>,
}

impl RecordingSink {
    pub fn contents(&self) -> Vec<String> {
        self.turns
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.content.clone())
            .collect()
    }
}

#[async_trait]
impl TurnSink for RecordingSink {
    async fn deliver(&self, turn: DeliveredTurn) -> Result<()> {
        self.turns.lock().unwrap().push(turn);
        Ok(())
    }

    async fn deliver_message(&self, message: Message) -> Result<()> {
        self.messages.lock().unwrap().push(message);
        Ok(())
    }
}

/// Image generator returning a canned URL or failing.
pub struct MockImageGenerator {
    url: Option<String>,
    pub prompts: Mutex<Vec<String>>,
}

impl MockImageGenerator {
    pub fn succeeding(url: &str) -> Self {
        Self {
            url: Some(url.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            url: None,
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ImageGenerator for MockImageGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.url
            .clone()
            .ok_or_else(|| CadenceError::ImageGeneration("model overloaded".into()))
    }
}

/// Counts follow-up requests.
#[derive(Default)]
pub struct CountingFollowUp {
    calls: AtomicUsize,
    fail: bool,
}

impl CountingFollowUp {
    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FollowUpTrigger for CountingFollowUp {
    async fn trigger_follow_up(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(CadenceError::FollowUp("upstream refused".into()));
        }
        Ok(())
    }
}
