//! Tests for the turn delivery engine, driven by tokio's paused clock.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use pretty_assertions::assert_eq;

use cadence::delivery::{DeliveryEvent, TurnDeliveryEngine};
use cadence::history::{HistoryStore, SharedHistory};
use cadence::types::{FinalizedResponse, Message, ToolCall};
use cadence::util::{FixedClock, NoJitter};

use common::*;

fn history_engine() -> (SharedHistory, TurnDeliveryEngine) {
    let history = SharedHistory::new(HistoryStore::with_capacity(20));
    let engine = TurnDeliveryEngine::new(test_config(), Arc::new(history.clone()))
        .with_jitter(Arc::new(NoJitter))
        .with_clock(Arc::new(FixedClock::new(t0())));
    (history, engine)
}

fn texts(history: &SharedHistory) -> Vec<String> {
    history.get().iter().map(|m| m.text().to_string()).collect()
}

async fn settle(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn single_turn_passes_through() {
    let (history, engine) = history_engine();
    let response = FinalizedResponse::text("only one turn")
        .with_turns(["only one turn"])
        .with_has_next(true);

    assert!(!engine.process_response(&response));
    settle(5_000).await;
    assert!(history.is_empty());
    assert_eq!(engine.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn blank_turns_do_not_count_toward_a_split() {
    let (history, engine) = history_engine();
    assert!(!engine.process_response(&FinalizedResponse::text("A").with_turns(["A", "  "])));
    settle(5_000).await;
    assert!(history.is_empty());
}

#[tokio::test(start_paused = true)]
async fn missing_or_empty_turns_pass_through() {
    let (_history, engine) = history_engine();
    assert!(!engine.process_response(&FinalizedResponse::text("plain")));
    let empty: [&str; 0] = [];
    assert!(!engine.process_response(&FinalizedResponse::text("plain").with_turns(empty)));
    assert!(!engine.process_response(&FinalizedResponse::text("x").with_turns(["  ", "x"])));
}

#[tokio::test(start_paused = true)]
async fn disabled_engine_never_splits() {
    let history = SharedHistory::default();
    let mut config = test_config();
    config.multi_turn_enabled = false;
    let engine = TurnDeliveryEngine::new(config, Arc::new(history));

    assert!(!engine.process_response(&FinalizedResponse::default().with_turns(["a", "b"])));
}

#[tokio::test(start_paused = true)]
async fn turns_arrive_in_order_with_group_metadata() {
    let (history, engine) = history_engine();
    let response = FinalizedResponse::default().with_turns([
        "Hey babe,",
        "I'm doing great!",
        "What about you?",
    ]);

    assert!(engine.process_response(&response));
    assert_eq!(engine.pending_count(), 3);

    settle(10).await;
    assert_eq!(texts(&history), vec!["Hey babe,"]);

    settle(10_000).await;
    let stored = history.get();
    assert_eq!(
        texts(&history),
        vec!["Hey babe,", "I'm doing great!", "What about you?"]
    );
    let group_id = stored[0].group_id.clone().expect("grouped");
    for (index, message) in stored.iter().enumerate() {
        assert_eq!(message.group_id.as_deref(), Some(group_id.as_str()));
        assert_eq!(message.message_index, Some(index));
        assert_eq!(message.total_in_group, Some(3));
    }

    // 500ms base + 16 chars at 10/s, then 500ms + 15 chars.
    assert_eq!(stored[0].timestamp, t0());
    assert_eq!(stored[1].timestamp, t0() + ChronoDuration::milliseconds(2100));
    assert_eq!(stored[2].timestamp, t0() + ChronoDuration::milliseconds(4100));
    assert_eq!(engine.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancellation_keeps_delivered_and_drops_pending() {
    let (history, engine) = history_engine();
    let response = FinalizedResponse::default().with_turns(["one", "two", "three"]);

    assert!(engine.process_response(&response));
    settle(10).await;
    assert_eq!(texts(&history), vec!["one"]);

    let epoch_before = engine.current_epoch();
    assert_eq!(engine.cancel_pending_messages(), 2);
    assert_eq!(engine.current_epoch(), epoch_before + 1);

    settle(30_000).await;
    assert_eq!(texts(&history), vec!["one"]);
    assert_eq!(engine.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancel_with_nothing_queued_returns_zero() {
    let (_history, engine) = history_engine();
    assert_eq!(engine.cancel_pending_messages(), 0);
    assert_eq!(engine.current_epoch(), 1);
}

#[tokio::test(start_paused = true)]
async fn follow_up_fires_once_after_last_turn() {
    let follow_up = Arc::new(CountingFollowUp::default());
    let (history, engine) = history_engine();
    let engine = engine.with_follow_up(follow_up.clone());

    let response = FinalizedResponse::default()
        .with_turns(["A", "B"])
        .with_has_next(true);
    assert!(engine.process_response(&response));

    settle(10).await;
    assert_eq!(texts(&history), vec!["A"]);
    assert_eq!(follow_up.calls(), 0);

    settle(5_000).await;
    assert_eq!(texts(&history), vec!["A", "B"]);
    assert_eq!(follow_up.calls(), 1);

    settle(60_000).await;
    assert_eq!(follow_up.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn canceled_group_never_triggers_follow_up() {
    let follow_up = Arc::new(CountingFollowUp::default());
    let (history, engine) = history_engine();
    let engine = engine.with_follow_up(follow_up.clone());

    let response = FinalizedResponse::default()
        .with_turns(["A", "B"])
        .with_has_next(true);
    assert!(engine.process_response(&response));
    settle(10).await;
    assert_eq!(engine.cancel_pending_messages(), 1);

    settle(10_000).await;
    assert_eq!(texts(&history), vec!["A"]);
    assert_eq!(follow_up.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn failing_follow_up_is_reported_not_propagated() {
    let follow_up = Arc::new(CountingFollowUp::failing());
    let (events_sink, events) = capture_events();
    let (_history, engine) = history_engine();
    let engine = engine
        .with_follow_up(follow_up.clone())
        .with_event_sink(events_sink);

    engine.process_response(
        &FinalizedResponse::default()
            .with_turns(["A", "B"])
            .with_has_next(true),
    );
    settle(10_000).await;

    assert_eq!(follow_up.calls(), 1);
    let events = events.lock().unwrap();
    assert!(events.iter().any(|e| matches!(
        e,
        DeliveryEvent::FollowUpError { error } if error.contains("upstream refused")
    )));
}

#[tokio::test(start_paused = true)]
async fn emits_turn_and_group_events() {
    let (events_sink, events) = capture_events();
    let (_history, engine) = history_engine();
    let engine = engine.with_event_sink(events_sink);

    engine.process_response(&FinalizedResponse::default().with_turns(["x", "y"]));
    settle(10_000).await;

    assert_eq!(
        event_kinds(&events),
        vec!["turn_delivered", "turn_delivered", "group_complete"]
    );
}

#[tokio::test(start_paused = true)]
async fn cancel_emits_turns_canceled_event() {
    let (events_sink, events) = capture_events();
    let (_history, engine) = history_engine();
    let engine = engine.with_event_sink(events_sink);

    engine.process_response(&FinalizedResponse::default().with_turns(["x", "y", "z"]));
    settle(10).await;
    engine.cancel_pending_messages();

    let events = events.lock().unwrap();
    assert!(events
        .iter()
        .any(|e| matches!(e, DeliveryEvent::TurnsCanceled { count: 2, epoch: 1 })));
}

#[tokio::test(start_paused = true)]
async fn image_turn_follows_text_turns() {
    let images = Arc::new(MockImageGenerator::succeeding("https://img.example/cat.png"));
    let follow_up = Arc::new(CountingFollowUp::default());
    let (events_sink, events) = capture_events();
    let (history, engine) = history_engine();
    let engine = engine
        .with_image_generator(images.clone())
        .with_follow_up(follow_up.clone())
        .with_event_sink(events_sink);

    let response = FinalizedResponse::default()
        .with_turns(["Look at this", "so cute"])
        .with_image_prompt("a cat in a hat")
        .with_has_next(true);
    assert!(engine.process_response(&response));
    assert_eq!(engine.pending_count(), 3);

    settle(10_000).await;
    assert_eq!(
        texts(&history),
        vec![
            "Look at this",
            "so cute",
            "![image](https://img.example/cat.png)"
        ]
    );
    assert_eq!(*images.prompts.lock().unwrap(), vec!["a cat in a hat".to_string()]);
    assert_eq!(follow_up.calls(), 1);

    assert!(events.lock().unwrap().iter().any(|e| matches!(
        e,
        DeliveryEvent::GroupComplete { total_in_group: 2, .. }
    )));

    let kinds = event_kinds(&events);
    let start = kinds.iter().position(|k| *k == "image_start").unwrap();
    let complete = kinds.iter().position(|k| *k == "image_complete").unwrap();
    let follow = kinds.iter().position(|k| *k == "follow_up_triggered").unwrap();
    assert!(start < complete && complete < follow);
}

#[tokio::test(start_paused = true)]
async fn image_failure_does_not_stop_follow_up() {
    let follow_up = Arc::new(CountingFollowUp::default());
    let (events_sink, events) = capture_events();
    let (history, engine) = history_engine();
    let engine = engine
        .with_image_generator(Arc::new(MockImageGenerator::failing()))
        .with_follow_up(follow_up.clone())
        .with_event_sink(events_sink);

    engine.process_response(
        &FinalizedResponse::default()
            .with_turns(["one", "two"])
            .with_image_prompt("sunset")
            .with_has_next(true),
    );
    settle(10_000).await;

    assert_eq!(texts(&history), vec!["one", "two"]);
    assert_eq!(follow_up.calls(), 1);
    assert!(event_kinds(&events).contains(&"image_error"));
}

#[tokio::test(start_paused = true)]
async fn reasoning_on_first_turn_tool_calls_on_last() {
    let sink = Arc::new(RecordingSink::default());
    let engine = TurnDeliveryEngine::new(test_config(), sink.clone()).with_jitter(Arc::new(NoJitter));

    let response = FinalizedResponse {
        reasoning: Some("user seems happy".into()),
        tool_calls: vec![ToolCall::function("call_1", "remember", "{}")],
        compliance_violations: Some(vec![]),
        ..FinalizedResponse::default().with_turns(["first", "second"])
    };
    engine.process_response(&response);
    settle(10_000).await;

    let turns = sink.turns.lock().unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].reasoning.as_deref(), Some("user seems happy"));
    assert!(turns[0].tool_calls.is_none());
    assert_eq!(turns[1].reasoning, None);
    assert_eq!(turns[1].tool_calls.as_ref().map(Vec::len), Some(1));
    assert_eq!(turns[1].compliance_violations, Some(vec![]));
}

#[tokio::test(start_paused = true)]
async fn delayed_turn_is_inserted_before_later_message() {
    let (history, engine) = history_engine();
    engine.process_response(&FinalizedResponse::default().with_turns(["early", "late"]));
    settle(10).await;

    // A message produced between the two turns but stored before "late" fires.
    history
        .insert(Message::user("between").with_timestamp(t0() + ChronoDuration::milliseconds(200)))
        .unwrap();
    history
        .insert(Message::user("after").with_timestamp(t0() + ChronoDuration::seconds(60)))
        .unwrap();

    settle(10_000).await;
    assert_eq!(texts(&history), vec!["early", "between", "late", "after"]);
}

#[tokio::test(start_paused = true)]
async fn superseded_group_delivers_nothing() {
    let sink = Arc::new(RecordingSink::default());
    let engine = TurnDeliveryEngine::new(test_config(), sink.clone()).with_jitter(Arc::new(NoJitter));

    engine.process_response(&FinalizedResponse::default().with_turns(["a", "b"]));
    assert_eq!(engine.cancel_pending_messages(), 2);
    engine.process_response(&FinalizedResponse::default().with_turns(["c", "d"]));
    settle(10_000).await;

    let turns = sink.turns.lock().unwrap();
    let ids: Vec<&str> = turns.iter().map(|t| t.group.group_id.as_str()).collect();
    assert!(ids.iter().all(|id| *id == ids[0]));
    drop(turns);
    assert_eq!(sink.contents(), vec!["c", "d"]);
}
