//! In-process message bus and the wire shapes of the transport boundary.
//!
//! The real deployment moves intents and speech over an external broker;
//! this module fixes only the interface: topic names, JSON message shapes
//! (hermes-style `intentName` / `slotName` casing), and a broadcast-backed
//! bus that test and single-process setups plug straight into.

use crate::parser::args::{extract_contact_name, extract_notification_text, DurationArgs, ToolArgs};
use crate::parser::Tool;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

/// Topic the assistant speaks on.
pub const TOPIC_SPEAK: &str = "hermes/tts/say";
/// Topic inbound resolved intents arrive on.
pub const TOPIC_INTENT: &str = "hermes/intent";
/// Topic the upstream NLU publishes recognition failures on.
pub const TOPIC_UNRECOGNIZED: &str = "hermes/nlu/intentNotRecognized";
/// Fan-out topic for fired timers and reminders.
pub const TOPIC_NOTIFICATION: &str = "hermes/notification";

/// Per-request response topic for a correlated inbound message.
pub fn response_topic(request_id: &str) -> String {
    format!("{TOPIC_INTENT}/response/{request_id}")
}

/// Inbound resolved-intent message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentMessage {
    pub intent: IntentRef,
    #[serde(default)]
    pub slots: Vec<Slot>,
    #[serde(rename = "rawInput", default, skip_serializing_if = "Option::is_none")]
    pub raw_input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentRef {
    #[serde(rename = "intentName", alias = "name")]
    pub intent_name: String,
}

/// A typed slot value. The wire format nests the value one level down.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slot {
    #[serde(rename = "slotName")]
    pub slot_name: String,
    pub value: SlotValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotValue {
    pub value: serde_json::Value,
}

impl Slot {
    pub fn numeric(name: &str, value: u64) -> Self {
        Self {
            slot_name: name.to_string(),
            value: SlotValue {
                value: serde_json::json!(value),
            },
        }
    }

    fn as_u64(&self) -> Option<u64> {
        self.value.value.as_u64()
    }
}

/// Outbound speech message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakMessage {
    pub text: String,
}

/// Fan-out message published when a scheduled event fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
    /// ISO-8601 timestamp of the delivery.
    pub timestamp: String,
}

/// Convert an inbound intent message into a dispatchable tool call.
///
/// Hour/minute/second slots fold into a duration; reminder bodies and callee
/// names are recovered from the raw utterance when present. Unknown intent
/// names yield `None`.
pub fn tool_call_from_intent(msg: &IntentMessage) -> Option<(Tool, ToolArgs)> {
    let tool = Tool::from_intent_name(&msg.intent.intent_name)?;
    let raw = msg.raw_input.as_deref().unwrap_or("");

    let args = match tool {
        Tool::GetTime | Tool::GetWeather => ToolArgs::None,
        Tool::SetTimer => ToolArgs::Timer(fold_duration_slots(&msg.slots)),
        Tool::SetNotification => ToolArgs::Notification {
            duration: fold_duration_slots(&msg.slots),
            text: extract_notification_text(raw),
        },
        Tool::CallContact => ToolArgs::Contact {
            name: extract_contact_name(raw),
        },
    };

    Some((tool, args))
}

fn fold_duration_slots(slots: &[Slot]) -> DurationArgs {
    let mut duration = DurationArgs::default();
    for slot in slots {
        let Some(value) = slot.as_u64() else { continue };
        match slot.slot_name.as_str() {
            "hour" => duration.hours = value,
            "minute" => duration.minutes = value,
            "second" => duration.seconds = value,
            _ => {}
        }
    }
    duration
}

/// A published message: topic plus serialized JSON payload.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub topic: String,
    pub payload: String,
}

/// Broadcast-backed topic bus.
///
/// Publishing never fails on missing subscribers: a fired timer with nobody
/// listening is not an error, the event has still semantically gone off.
#[derive(Clone)]
pub struct MessageBus {
    tx: broadcast::Sender<BusMessage>,
}

impl MessageBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        self.tx.subscribe()
    }

    /// Serialize and publish a message to a topic.
    pub fn publish<T: Serialize>(&self, topic: &str, message: &T) -> Result<()> {
        let payload = serde_json::to_string(message)?;
        trace!(%topic, %payload, "bus publish");
        // A send error only means there are no subscribers right now.
        let _ = self.tx.send(BusMessage {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }

    /// Publish a speak message, and mirror it onto the per-request response
    /// topic when the inbound message carried a correlation id.
    pub fn publish_response(&self, text: &str, request_id: Option<&str>) -> Result<()> {
        let msg = SpeakMessage {
            text: text.to_string(),
        };
        self.publish(TOPIC_SPEAK, &msg)?;
        if let Some(id) = request_id {
            self.publish(&response_topic(id), &msg)?;
        }
        Ok(())
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(64)
    }
}
