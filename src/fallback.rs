//! Fallback intent resolution via an external language model.
//!
//! The model is an opaque text-in/text-out collaborator: the parser hands it
//! the raw utterance under a constrained single-word prompt and expects one
//! token out of a closed label set back. Anything else (an unknown token, a
//! transport error, a timeout) is "no mapping" and the utterance falls
//! through to open conversation.

use crate::parser::Tool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// Single-word classification prompt. The label set is closed; the parser
/// maps tokens back to tools via [`tool_for_label`].
const CLASSIFIER_PROMPT: &str = "Отвечай ТОЛЬКО одним словом:\n\
- ВРЕМЯ - если спрашивают про время\n\
- ПОГОДА - если спрашивают про погоду\n\
- ТАЙМЕР - если просят поставить таймер\n\
- НАПОМИНАНИЕ - если просят напомнить\n\
- ЗВОНОК - если просят позвонить\n\
- НЕТ - если это обычный разговор";

/// Conversational prompt for utterances no tool claimed.
const CHAT_PROMPT: &str = "Ты дружелюбный голосовой помощник. \
Отвечай кратко и естественно на русском языке. \
Если не понимаешь команду, честно скажи об этом и предложи помощь.";

/// Map a fallback label token back to a tool. Unknown tokens (including
/// "НЕТ") map to nothing.
pub fn tool_for_label(label: &str) -> Option<Tool> {
    match label.trim().to_uppercase().as_str() {
        "ВРЕМЯ" => Some(Tool::GetTime),
        "ПОГОДА" => Some(Tool::GetWeather),
        "ТАЙМЕР" => Some(Tool::SetTimer),
        "НАПОМИНАНИЕ" => Some(Tool::SetNotification),
        "ЗВОНОК" => Some(Tool::CallContact),
        _ => None,
    }
}

/// External resolver consulted when direct parsing is inconclusive.
#[async_trait]
pub trait FallbackResolver: Send + Sync {
    /// Return one token from the closed label set for the given utterance.
    async fn resolve_label(&self, text: &str) -> Result<String>;
}

/// Bounded FIFO response cache. Spoken commands repeat a lot; the model
/// does not need to see "который час" twice.
struct ResponseCache {
    entries: VecDeque<(String, String)>,
    capacity: usize,
}

impl ResponseCache {
    fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    fn insert(&mut self, key: String, value: String) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((key, value));
    }
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct LlmClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    cache: Mutex<ResponseCache>,
}

impl LlmClient {
    pub fn new(
        base_url: String,
        model: String,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client for LLM fallback")?;

        Ok(Self {
            http,
            base_url,
            model,
            api_key,
            cache: Mutex::new(ResponseCache::new(50)),
        })
    }

    /// One-shot completion with a system prompt. Responses are cached per
    /// (system, user) pair.
    pub async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let cache_key = format!("{system}|{user}");
        if let Some(cached) = self.cache.lock().unwrap().get(&cache_key) {
            debug!("llm cache hit");
            return Ok(cached);
        }

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });

        let mut builder = self.http.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let resp = builder.send().await.context("LLM request failed")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("LLM provider returned {}: {}", status, text);
        }

        let data: serde_json::Value = resp.json().await.context("Invalid JSON from LLM")?;
        let content = data["choices"][0]["message"]["content"]
            .as_str()
            .context("LLM response carries no content")?
            .trim()
            .to_string();

        self.cache.lock().unwrap().insert(cache_key, content.clone());
        Ok(content)
    }

    /// Conversational reply for utterances that resolved to no tool.
    pub async fn chat_reply(&self, text: &str) -> Result<String> {
        self.complete(CHAT_PROMPT, text).await
    }
}

#[async_trait]
impl FallbackResolver for LlmClient {
    async fn resolve_label(&self, text: &str) -> Result<String> {
        let label = self.complete(CLASSIFIER_PROMPT, text).await?;
        Ok(label.to_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_map_to_tools() {
        assert_eq!(tool_for_label("ВРЕМЯ"), Some(Tool::GetTime));
        assert_eq!(tool_for_label(" таймер "), Some(Tool::SetTimer));
        assert_eq!(tool_for_label("НЕТ"), None);
        assert_eq!(tool_for_label("МАРМЕЛАД"), None);
    }

    #[test]
    fn cache_evicts_oldest() {
        let mut cache = ResponseCache::new(2);
        cache.insert("a".into(), "1".into());
        cache.insert("b".into(), "2".into());
        cache.insert("c".into(), "3".into());
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b").as_deref(), Some("2"));
        assert_eq!(cache.get("c").as_deref(), Some("3"));
    }
}
