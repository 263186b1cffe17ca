//! Hybrid intent parser.
//!
//! Resolves an utterance to a single tool call in three stages:
//!
//! 1. **Tag shortcut**: a leading `[метка]` from a constrained upstream
//!    classifier maps straight to a tool at confidence 0.9.
//! 2. **Keyword/pattern scoring**: each candidate tool is scored against
//!    static keyword and regex tables; ties are broken by static priority,
//!    with a dedicated rule for the time-vs-weather vocabulary overlap.
//! 3. **Fallback**: when direct confidence stays below the configured
//!    threshold, an external resolver (LLM) is asked for one label out of a
//!    closed set; a mapped label comes back at fixed confidence 0.7.
//!
//! The parser is a pure function of the utterance and its rule tables. It
//! never errors: "no tool" is a valid terminal state that routes the
//! utterance to open conversation.

pub mod args;
pub mod numbers;

use crate::fallback::FallbackResolver;
use args::{extract_args, ToolArgs};
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

/// Confidence assigned to explicitly tagged input.
const TAG_CONFIDENCE: f32 = 0.9;
/// Confidence assigned to a fallback-resolved label.
const FALLBACK_CONFIDENCE: f32 = 0.7;
/// Candidates scoring below this are discarded outright.
const MIN_CANDIDATE_SCORE: f32 = 0.3;
/// Score contribution per matching keyword occurrence.
const KEYWORD_WEIGHT: f32 = 0.3;
/// Score contribution when any regex pattern matches.
const PATTERN_WEIGHT: f32 = 0.5;

/// The closed set of tools this assistant can invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    GetTime,
    GetWeather,
    SetTimer,
    SetNotification,
    CallContact,
}

impl Tool {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tool::GetTime => "get_time",
            Tool::GetWeather => "get_weather",
            Tool::SetTimer => "set_timer",
            Tool::SetNotification => "set_notification",
            Tool::CallContact => "call_contact",
        }
    }

    /// Map an intent name from the wire format (`GetTime`, `SetTimer`, ...).
    pub fn from_intent_name(name: &str) -> Option<Self> {
        match name {
            "GetTime" => Some(Tool::GetTime),
            "GetWeather" => Some(Tool::GetWeather),
            "SetTimer" => Some(Tool::SetTimer),
            "SetNotification" => Some(Tool::SetNotification),
            "InitiateCall" => Some(Tool::CallContact),
            _ => None,
        }
    }

    /// Map a bracketed action tag or a fallback-resolver label.
    fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "время" => Some(Tool::GetTime),
            "погода" => Some(Tool::GetWeather),
            "таймер" => Some(Tool::SetTimer),
            "напоминание" => Some(Tool::SetNotification),
            "звонок" => Some(Tool::CallContact),
            _ => None,
        }
    }
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved tool invocation with its heuristic confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub tool: Tool,
    pub args: ToolArgs,
    /// Heuristic score in [0, 1], not a probability.
    pub confidence: f32,
}

impl ToolCall {
    fn new(tool: Tool, args: ToolArgs, confidence: f32) -> Self {
        Self {
            tool,
            args,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// Static scoring rules for one tool.
struct ToolRules {
    tool: Tool,
    keywords: &'static [&'static str],
    patterns: Vec<Regex>,
    /// Higher wins ties after scoring.
    priority: u8,
    /// Flat confidence boost reflecting how distinctive the vocabulary is.
    boost: f32,
}

fn rule_table() -> &'static Vec<ToolRules> {
    static TABLE: OnceLock<Vec<ToolRules>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let compile = |patterns: &[&str]| -> Vec<Regex> {
            patterns
                .iter()
                .map(|p| Regex::new(&format!("(?i){p}")).unwrap())
                .collect()
        };

        vec![
            ToolRules {
                tool: Tool::GetTime,
                keywords: &[
                    "время",
                    "час",
                    "который час",
                    "сколько времени",
                    "текущее время",
                    "время сейчас",
                ],
                patterns: compile(&[
                    r"(?:сколько|который)\s+(?:сейчас\s+)?час",
                    r"какое\s+(?:сейчас\s+)?время",
                    r"время\s+(?:сейчас|сегодня)",
                    r"current\s+time",
                    r"what\s+time",
                    r"сколько\s+время",
                    r"только\s+время",
                ]),
                priority: 5,
                boost: 0.3,
            },
            ToolRules {
                tool: Tool::GetWeather,
                keywords: &[
                    "погода", "weather", "температура", "градус", "дождь", "солнце", "облачно",
                    "ясно", "пасмурно", "снег", "ветер",
                ],
                patterns: compile(&[
                    r"какая\s+(?:сегодня\s+|сейчас\s+)?погода",
                    r"погода\s+(?:на\s+)?(?:сегодня|завтра|сейчас)",
                    r"температура\s+(?:на\s+)?(?:улице|сегодня|сейчас)",
                    r"(?:дождь|солнце|облачно|ясно|снег)",
                    r"weather\s+(?:today|tomorrow|now)",
                ]),
                priority: 3,
                boost: 0.2,
            },
            ToolRules {
                tool: Tool::SetTimer,
                keywords: &["таймер", "поставь таймер", "установи таймер", "засеки", "timer"],
                patterns: compile(&[
                    r"(?:поставь|установи|засеки|включи|запусти)\s+таймер",
                    r"таймер\s+на\s+(?:\d+|\w+)",
                    r"(?:\d+|\w+)\s+(?:минут|мин|секунд|сек|час)",
                    r"timer\s+(?:for\s+)?\d+",
                ]),
                priority: 4,
                boost: 0.2,
            },
            ToolRules {
                tool: Tool::SetNotification,
                keywords: &[
                    "напомни",
                    "напоминание",
                    "уведомление",
                    "reminder",
                    "notify",
                    "напомни мне",
                ],
                patterns: compile(&[
                    r"напомни\s+(?:мне\s+)?(?:о\s+)?.+",
                    r"напоминание\s+(?:о\s+)?.+",
                    r"remind\s+me\s+(?:to\s+)?.+",
                ]),
                priority: 3,
                boost: 0.2,
            },
            ToolRules {
                tool: Tool::CallContact,
                keywords: &["позвони", "звони", "call", "набери номер", "вызов", "звонок"],
                patterns: compile(&[
                    r"(?:позвони|звони|набери)\s+.+",
                    r"call\s+.+",
                    r"(?:сделай\s+)?звонок\s+.+",
                ]),
                priority: 3,
                boost: 0.2,
            },
        ]
    })
}

/// Phrases that settle the time/weather conflict in favor of time.
const TIME_ONLY_PHRASES: &[&str] = &["только время", "сколько время", "который час", "час сейчас"];

/// Words that settle the time/weather conflict in favor of weather.
const WEATHER_ONLY_WORDS: &[&str] = &[
    "температура",
    "погода",
    "дождь",
    "солнце",
    "облачно",
    "ясно",
    "снег",
    "ветер",
];

fn action_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([^\]]+)\]\s*(.+)").unwrap())
}

/// Rule-based intent parser with an external fallback hook.
pub struct IntentParser {
    /// Minimum confidence for a direct match to be acted upon.
    confidence_threshold: f32,
}

impl IntentParser {
    pub fn new(confidence_threshold: f32) -> Self {
        Self {
            confidence_threshold: confidence_threshold.clamp(0.0, 1.0),
        }
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    /// Deterministic resolution: tag shortcut, then keyword/pattern scoring.
    ///
    /// Returns the best candidate regardless of threshold so the caller can
    /// decide between acting on it and consulting the fallback.
    pub fn resolve_direct(&self, text: &str) -> Option<ToolCall> {
        if let Some(call) = self.parse_action_tag(text) {
            return Some(call);
        }
        self.parse_by_priority(text)
    }

    /// Full resolution contract: direct parse first, then the fallback
    /// resolver when the direct result does not clear the threshold.
    pub async fn resolve(
        &self,
        text: &str,
        fallback: Option<&dyn FallbackResolver>,
    ) -> Option<ToolCall> {
        let direct = self.resolve_direct(text);

        if let Some(call) = &direct {
            if call.confidence >= self.confidence_threshold {
                debug!(tool = %call.tool, confidence = call.confidence, "direct parse");
                return direct;
            }
        }

        if let Some(resolver) = fallback {
            if let Some(call) = self.resolve_via_fallback(text, resolver).await {
                return Some(call);
            }
        }

        // A sub-threshold direct candidate is a parse-miss, not a result.
        None
    }

    async fn resolve_via_fallback(
        &self,
        text: &str,
        resolver: &dyn FallbackResolver,
    ) -> Option<ToolCall> {
        let label = match resolver.resolve_label(text).await {
            Ok(label) => label,
            Err(e) => {
                debug!("fallback resolver unavailable: {e:#}");
                return None;
            }
        };

        let tool = crate::fallback::tool_for_label(&label)?;
        debug!(tool = %tool, %label, "fallback parse");
        let call = ToolCall::new(tool, extract_args(tool, text), FALLBACK_CONFIDENCE);
        (call.confidence >= self.confidence_threshold).then_some(call)
    }

    /// `[метка] rest-of-text` shortcut for explicitly tagged input.
    fn parse_action_tag(&self, text: &str) -> Option<ToolCall> {
        let cap = action_tag_re().captures(text)?;
        let tool = Tool::from_label(&cap[1])?;
        let rest = cap[2].trim();
        Some(ToolCall::new(tool, extract_args(tool, rest), TAG_CONFIDENCE))
    }

    fn parse_by_priority(&self, text: &str) -> Option<ToolCall> {
        let lower = text.to_lowercase();

        let mut candidates: Vec<(u8, f32, Tool)> = Vec::new();
        for rules in rule_table() {
            let keyword_hits = rules.keywords.iter().filter(|k| lower.contains(**k)).count();
            let mut score = keyword_hits as f32 * KEYWORD_WEIGHT;

            if rules.patterns.iter().any(|re| re.is_match(&lower)) {
                score += PATTERN_WEIGHT;
            }

            // The boost rewards distinctive vocabulary; it must not turn a
            // zero-evidence tool into a candidate on its own.
            if score > 0.0 {
                score += rules.boost;
            }

            if score >= MIN_CANDIDATE_SCORE {
                candidates.push((rules.priority, score, rules.tool));
            }
        }

        if candidates.is_empty() {
            return None;
        }

        let time = candidates.iter().find(|(_, _, t)| *t == Tool::GetTime).copied();
        let weather = candidates
            .iter()
            .find(|(_, _, t)| *t == Tool::GetWeather)
            .copied();

        // Time and weather share vocabulary ("сейчас", "сегодня"); when both
        // survive scoring, explicit marker lists decide, and time wins the
        // remaining ties since time queries dominate in practice.
        if let (Some(time), Some(weather)) = (time, weather) {
            let (_, score, tool) = if TIME_ONLY_PHRASES.iter().any(|p| lower.contains(p)) {
                time
            } else if WEATHER_ONLY_WORDS.iter().any(|w| lower.contains(w)) {
                weather
            } else {
                time
            };
            return Some(ToolCall::new(tool, extract_args(tool, text), score));
        }

        candidates.sort_by(|a, b| {
            (b.0, b.1)
                .partial_cmp(&(a.0, a.1))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let (_, score, tool) = candidates[0];
        Some(ToolCall::new(tool, extract_args(tool, text), score))
    }
}

#[cfg(test)]
mod tests {
    use super::args::DurationArgs;
    use super::*;

    fn parser() -> IntentParser {
        IntentParser::new(0.4)
    }

    #[test]
    fn tagged_input_short_circuits() {
        // Weather keywords in the remainder must not override the tag.
        let call = parser()
            .resolve_direct("[время] какая там температура")
            .unwrap();
        assert_eq!(call.tool, Tool::GetTime);
        assert!((call.confidence - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn tagged_timer_extracts_args_from_remainder() {
        let call = parser().resolve_direct("[таймер] на пять минут").unwrap();
        assert_eq!(call.tool, Tool::SetTimer);
        assert_eq!(call.args, ToolArgs::Timer(DurationArgs::minutes(5)));
    }

    #[test]
    fn timer_utterance_resolves_with_duration() {
        let call = parser().resolve_direct("поставь таймер на пять минут").unwrap();
        assert_eq!(call.tool, Tool::SetTimer);
        assert!(call.confidence >= 0.4);
        assert_eq!(call.args, ToolArgs::Timer(DurationArgs::minutes(5)));
    }

    #[test]
    fn weather_utterance_resolves() {
        let call = parser().resolve_direct("какая сейчас погода").unwrap();
        assert_eq!(call.tool, Tool::GetWeather);
    }

    #[test]
    fn time_utterance_resolves() {
        let call = parser().resolve_direct("который час").unwrap();
        assert_eq!(call.tool, Tool::GetTime);
    }

    #[test]
    fn notification_utterance_resolves() {
        let call = parser().resolve_direct("напомни купить хлеб").unwrap();
        assert_eq!(call.tool, Tool::SetNotification);
    }

    #[test]
    fn call_utterance_resolves() {
        let call = parser().resolve_direct("позвони маме").unwrap();
        assert_eq!(call.tool, Tool::CallContact);
    }

    #[test]
    fn time_only_marker_beats_weather_words() {
        let call = parser()
            .resolve_direct("только время, какая там температура")
            .unwrap();
        assert_eq!(call.tool, Tool::GetTime);
    }

    #[test]
    fn weather_marker_beats_shared_vocabulary() {
        let call = parser()
            .resolve_direct("какая температура на улице сейчас")
            .unwrap();
        assert_eq!(call.tool, Tool::GetWeather);
    }

    #[test]
    fn small_talk_is_a_parse_miss() {
        assert!(parser().resolve_direct("привет как дела").is_none());
    }

    #[test]
    fn confidence_is_clamped() {
        // Many keyword hits plus a pattern plus the boost exceed 1.0 raw.
        let call = parser()
            .resolve_direct("время время время который час сколько времени")
            .unwrap();
        assert!(call.confidence <= 1.0);
    }

    #[tokio::test]
    async fn sub_threshold_direct_match_is_dropped_without_fallback() {
        // Keyword-only evidence ("градус", no pattern hit) scores 0.5.
        let utterance = "сколько градусов на улице";
        let call = parser().resolve_direct(utterance).unwrap();
        assert!(call.confidence < 0.95);

        let strict = IntentParser::new(0.95);
        assert!(strict.resolve(utterance, None).await.is_none());
    }
}
