//! End-to-end pipeline tests: utterance in, bus traffic and durable
//! state out, including a simulated process restart.

use chrono::{Duration as ChronoDuration, Utc};
use magus::bus::{BusMessage, SpeakMessage, TOPIC_NOTIFICATION, TOPIC_SPEAK};
use magus::parser::args::ToolArgs;
use magus::scheduler::{EventKind, EventStatus};
use magus::{
    Agent, EventChecker, EventStore, IntentParser, MessageBus, SchedulerEngine, Tool,
    ToolDispatcher,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::Receiver;
use tokio_util::sync::CancellationToken;

fn pipeline(store: Arc<EventStore>) -> (Agent, Arc<SchedulerEngine>, MessageBus) {
    let bus = MessageBus::default();
    let scheduler = Arc::new(SchedulerEngine::new(store, bus.clone()));
    let dispatcher = ToolDispatcher::new(Arc::clone(&scheduler), None);
    let agent = Agent::new(IntentParser::new(0.4), dispatcher, None, bus.clone());
    (agent, scheduler, bus)
}

async fn next_on(rx: &mut Receiver<BusMessage>, topic: &str) -> SpeakMessage {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(3), rx.recv())
            .await
            .expect("timed out waiting for bus message")
            .unwrap();
        if msg.topic == topic {
            return serde_json::from_str(&msg.payload).unwrap();
        }
    }
}

#[tokio::test]
async fn timer_utterance_fires_through_the_checker() {
    let store = Arc::new(EventStore::open_in_memory().unwrap());
    let (agent, scheduler, bus) = pipeline(store.clone());
    let mut rx = bus.subscribe();

    let cancel = CancellationToken::new();
    let checker = EventChecker::new(
        Arc::clone(&scheduler),
        Duration::from_millis(20),
        cancel.clone(),
    );
    let checker_handle = tokio::spawn(checker.run());

    let ack = agent
        .handle_utterance("поставь таймер на 1 секунду", None)
        .await;
    assert_eq!(ack, "Поставил таймер");
    assert_eq!(next_on(&mut rx, TOPIC_SPEAK).await.text, "Поставил таймер");

    // The checker picks the event up once the second elapses.
    let fired = next_on(&mut rx, TOPIC_SPEAK).await;
    assert_eq!(fired.text, "Таймер активирован");

    // Completed durably and never fired twice.
    let events = store.pending_events().await.unwrap();
    assert!(events.is_empty());
    assert_eq!(scheduler.pending_count(), 0);

    cancel.cancel();
    checker_handle.await.unwrap();
}

#[tokio::test]
async fn reminder_survives_restart_when_still_future() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("events.db");

    // First process: schedule a reminder 1 hour out, then drop everything.
    {
        let store = Arc::new(EventStore::open(&db_path).unwrap());
        let (agent, scheduler, _bus) = pipeline(store);
        agent
            .handle_utterance("напомни выключить духовку", None)
            .await;
        assert_eq!(scheduler.pending_count(), 1);
    }

    // Second process: recovery re-registers the still-future reminder.
    let store = Arc::new(EventStore::open(&db_path).unwrap());
    let (_agent, scheduler, bus) = pipeline(store);
    let mut rx = bus.subscribe();

    let report = scheduler.recover().await.unwrap();
    assert_eq!(report.restored, 1);
    assert_eq!(report.expired, 0);
    assert_eq!(scheduler.pending_count(), 1);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn reminder_missed_during_downtime_is_expired_silently() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("events.db");

    let id = {
        let store = EventStore::open(&db_path).unwrap();
        store
            .insert_event(
                EventKind::Notification,
                Utc::now() - ChronoDuration::minutes(30),
                Some("прошло"),
            )
            .await
            .unwrap()
    };

    let store = Arc::new(EventStore::open(&db_path).unwrap());
    let (_agent, scheduler, bus) = pipeline(store.clone());
    let mut rx = bus.subscribe();

    let report = scheduler.recover().await.unwrap();
    assert_eq!(report.expired, 1);
    assert_eq!(
        store.event_status(id).await.unwrap(),
        Some(EventStatus::Completed)
    );
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn tagged_utterance_bypasses_scoring() {
    let store = Arc::new(EventStore::open_in_memory().unwrap());
    let (agent, _scheduler, _bus) = pipeline(store);

    let resp = agent.handle_utterance("[таймер] на 2 минуты", None).await;
    assert_eq!(resp, "Поставил таймер");
}

#[tokio::test]
async fn chatty_utterance_degrades_without_fallback() {
    let store = Arc::new(EventStore::open_in_memory().unwrap());
    let (agent, _scheduler, _bus) = pipeline(store);

    let resp = agent
        .handle_utterance("расскажи что-нибудь интересное", None)
        .await;
    assert_eq!(resp, "Не поняла");
}

#[tokio::test]
async fn fired_notification_fans_out_with_kind_and_timestamp() {
    let store = Arc::new(EventStore::open_in_memory().unwrap());
    let (_agent, scheduler, bus) = pipeline(store);
    let mut rx = bus.subscribe();

    scheduler
        .schedule(
            EventKind::Notification,
            Utc::now() - ChronoDuration::seconds(1),
            Some("проверить почту".to_string()),
        )
        .await
        .unwrap();
    scheduler.poll_once();

    loop {
        let msg = tokio::time::timeout(Duration::from_secs(3), rx.recv())
            .await
            .expect("timed out waiting for fan-out")
            .unwrap();
        if msg.topic == TOPIC_NOTIFICATION {
            let v: serde_json::Value = serde_json::from_str(&msg.payload).unwrap();
            assert_eq!(v["type"], "notification");
            assert_eq!(v["text"], "Ваше напоминание: проверить почту");
            assert!(v["timestamp"].is_string());
            break;
        }
    }
}

#[tokio::test]
async fn call_utterance_reads_the_number_digit_by_digit() {
    let store = Arc::new(EventStore::open_in_memory().unwrap());
    store.add_contact("Мэри", "89170000001").await.unwrap();
    let (agent, _scheduler, _bus) = pipeline(store);

    let resp = agent.handle_utterance("позвони Мэри", None).await;
    assert_eq!(resp, "Контакт Мэри найден, звоню 8 9 1 7 0 0 0 0 0 0 1");
}

#[tokio::test]
async fn parser_and_dispatcher_agree_on_argument_shapes() {
    let parser = IntentParser::new(0.4);
    let call = parser
        .resolve_direct("напомни проверить плиту")
        .expect("reminder should resolve directly");
    assert_eq!(call.tool, Tool::SetNotification);
    match &call.args {
        ToolArgs::Notification { duration, text } => {
            // No explicit duration marker: the 5-minute default applies.
            assert_eq!(duration.minutes, 5);
            assert!(text.contains("проверить плиту"));
        }
        other => panic!("unexpected args: {other:?}"),
    }
}
