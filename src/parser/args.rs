//! Argument extraction for resolved tools.
//!
//! Once the parser has settled on a tool, the raw utterance is mined for the
//! structured arguments that tool needs: duration fields for timers and
//! reminders, the reminder body, the callee name. Extraction never fails:
//! every tool has a documented default when the text carries nothing usable.

use super::numbers::{parse_quantity, parse_word_quantity};
use super::Tool;
use chrono::Duration;
use regex::Regex;
use std::sync::OnceLock;

/// Typed arguments for a tool call.
///
/// A closed enum rather than a string-keyed map: each tool knows exactly
/// which shape it expects and matches on it explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolArgs {
    /// No arguments (time, weather).
    None,
    /// Timer duration.
    Timer(DurationArgs),
    /// Reminder duration plus the text to read back when it fires.
    Notification { duration: DurationArgs, text: String },
    /// Callee name for contact lookup.
    Contact { name: String },
}

/// Hour/minute/second fields of a spoken duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DurationArgs {
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
}

impl DurationArgs {
    pub fn minutes(minutes: u64) -> Self {
        Self {
            minutes,
            ..Self::default()
        }
    }

    pub fn is_zero(&self) -> bool {
        self.hours == 0 && self.minutes == 0 && self.seconds == 0
    }

    pub fn to_duration(self) -> Duration {
        Duration::hours(self.hours as i64)
            + Duration::minutes(self.minutes as i64)
            + Duration::seconds(self.seconds as i64)
    }

    /// Human-readable rendering for acknowledgement strings, e.g. "5 минут 30 секунд".
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if self.hours > 0 {
            parts.push(format!("{} ч", self.hours));
        }
        if self.minutes > 0 {
            parts.push(format!("{} мин", self.minutes));
        }
        if self.seconds > 0 {
            parts.push(format!("{} сек", self.seconds));
        }
        if parts.is_empty() {
            "0 сек".to_string()
        } else {
            parts.join(" ")
        }
    }
}

#[derive(Clone, Copy)]
enum Unit {
    Seconds,
    Minutes,
    Hours,
}

impl Unit {
    fn alternatives(self) -> &'static str {
        match self {
            Unit::Seconds => "секунд|секунды|секунду|сек",
            Unit::Minutes => "минут|минуты|минуту|мин",
            Unit::Hours => "час(?:а|ов)?",
        }
    }

    fn into_args(self, value: u64) -> DurationArgs {
        match self {
            Unit::Seconds => DurationArgs {
                seconds: value,
                ..DurationArgs::default()
            },
            Unit::Minutes => DurationArgs {
                minutes: value,
                ..DurationArgs::default()
            },
            Unit::Hours => DurationArgs {
                hours: value,
                ..DurationArgs::default()
            },
        }
    }
}

/// Compiled "<через> <qty> <unit>" patterns, prepositional forms first.
///
/// Each pattern captures an optional tens word and the word or digit group
/// immediately before the unit, so "двадцать пять минут" combines to 25
/// while surrounding command words ("поставь таймер на ...") stay out of
/// the capture.
fn duration_patterns() -> &'static Vec<(Regex, Unit)> {
    static PATTERNS: OnceLock<Vec<(Regex, Unit)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let mut patterns = Vec::new();
        for with_preposition in [true, false] {
            for unit in [Unit::Seconds, Unit::Minutes, Unit::Hours] {
                let prefix = if with_preposition { r"через\s+" } else { "" };
                let re = Regex::new(&format!(
                    r"(?i){prefix}(?:([а-яё]+)\s+)?(\d+|[а-яё]+)\s*(?:{})\b",
                    unit.alternatives()
                ))
                .unwrap();
                patterns.push((re, unit));
            }
        }
        patterns
    })
}

/// Parse the quantity captured in front of a unit word.
///
/// Digits first, then the one- or two-word written form.
fn captured_quantity(tens: Option<&str>, qty: &str) -> Option<u64> {
    if let Some(tens) = tens {
        let compound = format!("{tens} {qty}");
        if let Some(n) = parse_word_quantity(&compound) {
            return Some(n);
        }
    }
    parse_quantity(qty)
}

/// Extract a duration phrase from the text, or `None` if no duration marker
/// is present. "через N <unit>" forms take precedence over bare "N <unit>".
pub fn extract_duration(text: &str) -> Option<DurationArgs> {
    for (re, unit) in duration_patterns() {
        for cap in re.captures_iter(text) {
            let tens = cap.get(1).map(|m| m.as_str());
            if let Some(value) = captured_quantity(tens, &cap[2]) {
                return Some(unit.into_args(value));
            }
        }
    }
    None
}

fn notification_trigger_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:поставь\s+)?напомни(?:ть|е)?\s*(?:мне\s+)?(?:о\s+том\s*,?\s*(?:что\s+)?|о\s+|про\s+)?").unwrap()
    })
}

fn duration_phrase_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)через\s+(?:\d+|[а-яё]+(?:\s+[а-яё]+)?)\s*(?:секунд|секунды|секунду|сек|минут|минуты|минуту|мин|час(?:а|ов)?)\b")
            .unwrap()
    })
}

fn call_trigger_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:позвони|звони|набери|(?:сделай\s+)?звонок|call)\s+(.+)").unwrap()
    })
}

/// Reminder body: the utterance minus the trigger phrase and the duration
/// phrase. Locale note: the trigger strip also swallows the connective
/// "о том, что" so the body starts at the actual content.
pub(crate) fn extract_notification_text(text: &str) -> String {
    let without_trigger = notification_trigger_re().replace(text, "");
    let without_duration = duration_phrase_re().replace_all(&without_trigger, "");
    let cleaned = without_duration.split_whitespace().collect::<Vec<_>>().join(" ");

    if cleaned.is_empty() {
        "Напоминание".to_string()
    } else {
        cleaned
    }
}

/// Callee name: whatever follows the call trigger, minus filler words like
/// "номер" / "телефон".
pub(crate) fn extract_contact_name(text: &str) -> String {
    let name = call_trigger_re()
        .captures(text)
        .map(|cap| cap[1].to_string())
        .unwrap_or_default();

    let name = name
        .split_whitespace()
        .filter(|w| {
            let w = w.to_lowercase();
            w != "номер" && w != "телефон"
        })
        .collect::<Vec<_>>()
        .join(" ");

    if name.is_empty() {
        "неизвестный контакт".to_string()
    } else {
        name
    }
}

/// Derive the argument set a tool needs from the raw utterance.
pub fn extract_args(tool: Tool, text: &str) -> ToolArgs {
    match tool {
        Tool::GetTime | Tool::GetWeather => ToolArgs::None,
        Tool::SetTimer => {
            // Default: 1 minute when no duration marker is present.
            let duration = extract_duration(text).unwrap_or(DurationArgs::minutes(1));
            ToolArgs::Timer(duration)
        }
        Tool::SetNotification => {
            // Default: 5 minutes.
            let duration = extract_duration(text).unwrap_or(DurationArgs::minutes(5));
            ToolArgs::Notification {
                duration,
                text: extract_notification_text(text),
            }
        }
        Tool::CallContact => ToolArgs::Contact {
            name: extract_contact_name(text),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digit_and_word_durations_agree() {
        let a = extract_duration("поставь таймер на 5 минут").unwrap();
        let b = extract_duration("поставь таймер на пять минут").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, DurationArgs::minutes(5));
    }

    #[test]
    fn stray_word_before_digit_keeps_the_digit() {
        let args = extract_duration("таймер ещё 7 минут").unwrap();
        assert_eq!(args, DurationArgs::minutes(7));
    }

    #[test]
    fn preposition_form_wins() {
        let args = extract_duration("напомни через 30 секунд про 10 минут дел").unwrap();
        assert_eq!(args.seconds, 30);
        assert_eq!(args.minutes, 0);
    }

    #[test]
    fn compound_word_duration() {
        let args = extract_duration("таймер на двадцать пять минут").unwrap();
        assert_eq!(args, DurationArgs::minutes(25));
    }

    #[test]
    fn hours_declensions() {
        assert_eq!(
            extract_duration("через два часа").unwrap(),
            DurationArgs {
                hours: 2,
                ..DurationArgs::default()
            }
        );
        assert_eq!(
            extract_duration("через 5 часов").unwrap(),
            DurationArgs {
                hours: 5,
                ..DurationArgs::default()
            }
        );
    }

    #[test]
    fn timer_defaults_to_one_minute() {
        assert_eq!(
            extract_args(Tool::SetTimer, "поставь таймер"),
            ToolArgs::Timer(DurationArgs::minutes(1))
        );
    }

    #[test]
    fn notification_defaults_to_five_minutes() {
        match extract_args(Tool::SetNotification, "напомни покормить кота") {
            ToolArgs::Notification { duration, text } => {
                assert_eq!(duration, DurationArgs::minutes(5));
                assert_eq!(text, "покормить кота");
            }
            other => panic!("unexpected args: {other:?}"),
        }
    }

    #[test]
    fn notification_text_drops_trigger_and_duration() {
        match extract_args(
            Tool::SetNotification,
            "напомни мне о том, что надо выключить плиту через десять минут",
        ) {
            ToolArgs::Notification { duration, text } => {
                assert_eq!(duration, DurationArgs::minutes(10));
                assert_eq!(text, "надо выключить плиту");
            }
            other => panic!("unexpected args: {other:?}"),
        }
    }

    #[test]
    fn empty_notification_body_gets_placeholder() {
        match extract_args(Tool::SetNotification, "напомни через пять минут") {
            ToolArgs::Notification { text, .. } => assert_eq!(text, "Напоминание"),
            other => panic!("unexpected args: {other:?}"),
        }
    }

    #[test]
    fn contact_name_strips_filler() {
        assert_eq!(
            extract_args(Tool::CallContact, "набери номер Маша"),
            ToolArgs::Contact {
                name: "Маша".to_string()
            }
        );
    }

    #[test]
    fn missing_contact_gets_placeholder() {
        assert_eq!(
            extract_args(Tool::CallContact, "звонок"),
            ToolArgs::Contact {
                name: "неизвестный контакт".to_string()
            }
        );
    }

    #[test]
    fn duration_description() {
        let args = DurationArgs {
            hours: 1,
            minutes: 5,
            seconds: 0,
        };
        assert_eq!(args.describe(), "1 ч 5 мин");
    }
}
