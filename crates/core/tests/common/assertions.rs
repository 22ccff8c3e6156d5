//! Event helpers and assertions for integration tests.

#![allow(dead_code)]

use gxp_core::orchestrator::StageManager;
use gxp_protocol::ipc::Event;
use gxp_protocol::settings_models::Settings;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Upper bound for any single stage run in the tests.
pub const RUN_TIMEOUT: Duration = Duration::from_secs(10);

/// A manager with a roomy events channel.
pub fn manager(settings: Settings) -> (StageManager, mpsc::Receiver<Event>) {
    let (events_tx, events_rx) = mpsc::channel(1024);
    (StageManager::new(settings, events_tx), events_rx)
}

/// Receive events until the first terminal one, which is included.
///
/// Panics if no terminal event arrives within [`RUN_TIMEOUT`].
pub async fn collect_until_terminal(events_rx: &mut mpsc::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    let collect = async {
        while let Some(event) = events_rx.recv().await {
            let terminal = event.is_terminal();
            events.push(event);
            if terminal {
                break;
            }
        }
    };
    tokio::time::timeout(RUN_TIMEOUT, collect)
        .await
        .expect("no terminal event in time");
    events
}

/// Events currently queued, without waiting.
pub fn drain(events_rx: &mut mpsc::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = events_rx.try_recv() {
        events.push(event);
    }
    events
}

/// Task id of the first TaskStarted event.
pub fn started_task_id(events: &[Event]) -> Option<Uuid> {
    events.iter().find_map(|e| match e {
        Event::TaskStarted { task_id, .. } => Some(*task_id),
        _ => None,
    })
}

/// All tool output of a run, concatenated.
pub fn output_text(events: &[Event]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            Event::TaskOutput { content, .. } => Some(content.as_str()),
            _ => None,
        })
        .collect()
}

/// Status messages of a run, in order.
pub fn messages(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::TaskMessage { message, .. } => Some(message.clone()),
            _ => None,
        })
        .collect()
}

/// Assert the run starts with TaskStarted, ends with a terminal event, and
/// every event in between belongs to the same task.
pub fn assert_event_sequence(events: &[Event]) {
    assert!(!events.is_empty(), "Event sequence is empty");

    assert!(
        matches!(events[0], Event::TaskStarted { .. }),
        "First event should be TaskStarted, got: {:?}",
        events[0]
    );

    let last = events.last().unwrap();
    assert!(
        last.is_terminal(),
        "Last event should be terminal, got: {last:?}"
    );

    let id = started_task_id(events);
    for event in events {
        assert_eq!(event.task_id(), id, "Event of another task: {event:?}");
    }
}

/// Assert progress never goes backwards.
pub fn assert_progress_monotonic(events: &[Event]) {
    let mut last = 0.0;
    for event in events {
        if let Event::TaskProgress {
            progress: Some(p), ..
        } = event
        {
            assert!(*p + 1e-9 >= last, "Progress went from {last} to {p}");
            last = *p;
        }
    }
}
