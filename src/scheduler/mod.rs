//! Scheduled-event engine: durable timers and reminders.
//!
//! The engine owns an in-memory registry of pending events backed by the
//! durable [`EventStore`]. The request path adds events; a single polling
//! task detects due ones and delivers each exactly once. Removal from the
//! registry happens in the same operation that claims the event for
//! delivery, before any slow I/O, so a failed delivery is logged but never
//! re-queued; the timer has already gone off from a wall-clock standpoint.
//!
//! On startup, [`SchedulerEngine::recover`] re-registers still-future
//! pending rows and silently completes past-due ones: a missed reminder is
//! not replayed hours late.

pub mod store;

pub use store::{Contact, EventStore, StoreError};

use crate::bus::{MessageBus, NotificationMessage, SpeakMessage, TOPIC_NOTIFICATION, TOPIC_SPEAK};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Poll interval for due-event detection.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);
/// Upper bound on a single delivery's I/O.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Kind of a scheduled event. Closed set, matched explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Timer,
    Notification,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Timer => "timer",
            EventKind::Notification => "notification",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "timer" => Some(EventKind::Timer),
            "notification" => Some(EventKind::Notification),
            _ => None,
        }
    }
}

/// Durable status of an event. Transitions only `Pending → Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    Pending,
    Completed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Pending => "pending",
            EventStatus::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(EventStatus::Pending),
            "completed" => Some(EventStatus::Completed),
            _ => None,
        }
    }
}

/// A pending timed action. The due timestamp is set at creation and never
/// mutated.
#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    pub id: i64,
    pub kind: EventKind,
    pub due_at: DateTime<Utc>,
    /// Notification text; `None` for timers.
    pub payload: Option<String>,
}

impl ScheduledEvent {
    /// The spoken response produced when this event fires.
    pub fn completion_text(&self) -> String {
        match self.kind {
            EventKind::Timer => "Таймер активирован".to_string(),
            EventKind::Notification => {
                let body = self.payload.as_deref().unwrap_or("Напоминание");
                format!("Ваше напоминание: {body}")
            }
        }
    }
}

/// Outcome of startup recovery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Events re-registered for normal delivery.
    pub restored: usize,
    /// Past-due events completed without delivery.
    pub expired: usize,
}

/// In-memory registry of pending events plus the delivery machinery.
pub struct SchedulerEngine {
    store: Arc<EventStore>,
    bus: MessageBus,
    pending: Mutex<HashMap<i64, ScheduledEvent>>,
    delivery_timeout: Duration,
}

impl SchedulerEngine {
    pub fn new(store: Arc<EventStore>, bus: MessageBus) -> Self {
        Self {
            store,
            bus,
            pending: Mutex::new(HashMap::new()),
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
        }
    }

    pub fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    /// Persist a new event and register it for delivery. The durable write
    /// happens first; a crash after it is handled by startup recovery.
    pub async fn schedule(
        &self,
        kind: EventKind,
        due_at: DateTime<Utc>,
        payload: Option<String>,
    ) -> Result<i64> {
        let id = self
            .store
            .insert_event(kind, due_at, payload.as_deref())
            .await
            .context("Failed to persist scheduled event")?;

        let event = ScheduledEvent {
            id,
            kind,
            due_at,
            payload,
        };
        self.pending.lock().unwrap().insert(id, event);
        debug!(id, kind = kind.as_str(), %due_at, "event scheduled");
        Ok(id)
    }

    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    /// Number of events currently awaiting delivery.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Startup scan of the durable store: future-due pending events go back
    /// into the registry; past-due ones are completed without firing.
    pub async fn recover(&self) -> Result<RecoveryReport> {
        let events = self
            .store
            .pending_events()
            .await
            .context("Failed to read pending events from store")?;

        let now = Utc::now();
        let mut report = RecoveryReport::default();

        for event in events {
            if event.due_at > now {
                self.pending.lock().unwrap().insert(event.id, event);
                report.restored += 1;
            } else {
                // The process was down past the deadline; a stale alert is
                // worse than a dropped one.
                self.store.mark_completed(event.id).await?;
                report.expired += 1;
            }
        }

        info!(restored = report.restored, expired = report.expired, "event recovery done");
        Ok(report)
    }

    /// Claim every due event and fire each as an independent delivery task.
    /// Returns the number of events claimed this tick.
    pub fn poll_once(self: &Arc<Self>) -> usize {
        let now = Utc::now();

        // Removal and claim are the same operation: once an event leaves the
        // registry here, nothing can deliver it a second time.
        let due: Vec<ScheduledEvent> = {
            let mut pending = self.pending.lock().unwrap();
            let ids: Vec<i64> = pending
                .iter()
                .filter(|(_, e)| e.due_at <= now)
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| pending.remove(id)).collect()
        };

        let claimed = due.len();
        for event in due {
            let engine = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(e) = engine.deliver(event).await {
                    // Not re-queued: the deadline has passed either way.
                    warn!("event delivery failed: {e:#}");
                }
            });
        }

        claimed
    }

    /// Fire one claimed event: produce the response, flip the durable
    /// status, publish to the speak and notification topics.
    async fn deliver(&self, event: ScheduledEvent) -> Result<()> {
        let response = event.completion_text();
        info!(id = event.id, kind = event.kind.as_str(), "event fired");

        tokio::time::timeout(self.delivery_timeout, async {
            self.store
                .mark_completed(event.id)
                .await
                .context("Failed to mark event completed")?;

            self.bus.publish(
                TOPIC_SPEAK,
                &SpeakMessage {
                    text: response.clone(),
                },
            )?;
            self.bus.publish(
                TOPIC_NOTIFICATION,
                &NotificationMessage {
                    kind: event.kind.as_str().to_string(),
                    text: response,
                    timestamp: Utc::now().to_rfc3339(),
                },
            )?;
            Ok::<_, anyhow::Error>(())
        })
        .await
        .context("Delivery timed out")??;

        Ok(())
    }
}

/// Background polling loop. One instance per process; stops cooperatively
/// via the cancellation token without interrupting in-flight deliveries.
pub struct EventChecker {
    engine: Arc<SchedulerEngine>,
    poll_interval: Duration,
    cancel: CancellationToken,
}

impl EventChecker {
    pub fn new(engine: Arc<SchedulerEngine>, poll_interval: Duration, cancel: CancellationToken) -> Self {
        Self {
            engine,
            poll_interval,
            cancel,
        }
    }

    /// Run until cancelled. Should be spawned as a tokio task.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            self.engine.poll_once();
        }

        debug!("event checker stopped");
    }
}
