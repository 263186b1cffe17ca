//! Request path: utterance in, spoken response out.
//!
//! The agent glues the parser, the dispatcher and the message bus together.
//! Every inbound utterance or intent message ends in exactly one published
//! response, whatever fails along the way.

use crate::bus::{self, IntentMessage, MessageBus};
use crate::fallback::{FallbackResolver, LlmClient};
use crate::parser::args::ToolArgs;
use crate::parser::IntentParser;
use crate::tools::ToolDispatcher;
use tracing::{debug, info, warn};

const NOT_UNDERSTOOD: &str = "Не поняла";

pub struct Agent {
    parser: IntentParser,
    dispatcher: ToolDispatcher,
    fallback: Option<LlmClient>,
    bus: MessageBus,
}

impl Agent {
    pub fn new(
        parser: IntentParser,
        dispatcher: ToolDispatcher,
        fallback: Option<LlmClient>,
        bus: MessageBus,
    ) -> Self {
        Self {
            parser,
            dispatcher,
            fallback,
            bus,
        }
    }

    /// Handle a free-form utterance and return the spoken response.
    ///
    /// Recognized commands run their tool; a parse-miss goes to the chat
    /// model when one is configured, and degrades to a fixed phrase
    /// otherwise.
    pub async fn handle_utterance(&self, text: &str, request_id: Option<&str>) -> String {
        info!(%text, "utterance received");

        let fallback = self
            .fallback
            .as_ref()
            .map(|c| c as &dyn FallbackResolver);

        let response = match self.parser.resolve(text, fallback).await {
            Some(call) => {
                debug!(tool = %call.tool, confidence = call.confidence, "executing tool");
                self.dispatcher.dispatch(call.tool, &call.args).await
            }
            None => self.chat_or_shrug(text).await,
        };

        if let Err(e) = self.bus.publish_response(&response, request_id) {
            warn!("failed to publish response: {e:#}");
        }
        response
    }

    /// Handle a structured intent message from the bus.
    pub async fn handle_intent_message(&self, msg: &IntentMessage) -> String {
        let response = match bus::tool_call_from_intent(msg) {
            Some((tool, args)) => {
                debug!(tool = %tool, "executing intent");
                self.dispatch_with_raw_input(tool, args, msg).await
            }
            None => {
                warn!(intent = %msg.intent.intent_name, "unknown intent name");
                NOT_UNDERSTOOD.to_string()
            }
        };

        if let Err(e) = self
            .bus
            .publish_response(&response, msg.request_id.as_deref())
        {
            warn!("failed to publish response: {e:#}");
        }
        response
    }

    /// Recognition failure reported by the speech front-end.
    pub fn handle_unrecognized(&self) -> String {
        debug!("intent not recognized upstream");
        if let Err(e) = self.bus.publish_response(NOT_UNDERSTOOD, None) {
            warn!("failed to publish response: {e:#}");
        }
        NOT_UNDERSTOOD.to_string()
    }

    /// Argument-less intent messages still carry the raw utterance; mine it
    /// for arguments the slots did not provide.
    async fn dispatch_with_raw_input(
        &self,
        tool: crate::parser::Tool,
        args: ToolArgs,
        msg: &IntentMessage,
    ) -> String {
        let args = match (&args, &msg.raw_input) {
            (ToolArgs::Timer(d), Some(raw)) if d.is_zero() => {
                crate::parser::args::extract_args(tool, raw)
            }
            (ToolArgs::Notification { duration, .. }, Some(raw)) if duration.is_zero() => {
                crate::parser::args::extract_args(tool, raw)
            }
            _ => args,
        };
        self.dispatcher.dispatch(tool, &args).await
    }

    async fn chat_or_shrug(&self, text: &str) -> String {
        if let Some(llm) = &self.fallback {
            match llm.chat_reply(text).await {
                Ok(reply) if !reply.trim().is_empty() => return reply,
                Ok(_) => {}
                Err(e) => warn!("chat fallback failed: {e:#}"),
            }
        }
        NOT_UNDERSTOOD.to_string()
    }
}
