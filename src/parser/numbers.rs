//! Cardinal-number extraction from free-form Russian utterances.
//!
//! Spoken commands carry quantities either as digits ("таймер на 5 минут")
//! or as words ("таймер на пять минут"), including two-word compounds
//! ("двадцать пять"). Both forms must land on the same value.

use regex::Regex;
use std::sync::OnceLock;

/// Written-word numerals, including declined unit forms that show up in
/// recognized speech ("одну минуту", "две минуты").
static WORD_NUMBERS: &[(&str, u64)] = &[
    ("ноль", 0),
    ("один", 1),
    ("одну", 1),
    ("одна", 1),
    ("два", 2),
    ("две", 2),
    ("три", 3),
    ("четыре", 4),
    ("пять", 5),
    ("шесть", 6),
    ("семь", 7),
    ("восемь", 8),
    ("девять", 9),
    ("десять", 10),
    ("одиннадцать", 11),
    ("двенадцать", 12),
    ("тринадцать", 13),
    ("четырнадцать", 14),
    ("пятнадцать", 15),
    ("шестнадцать", 16),
    ("семнадцать", 17),
    ("восемнадцать", 18),
    ("девятнадцать", 19),
    ("двадцать", 20),
    ("тридцать", 30),
    ("сорок", 40),
    ("пятьдесят", 50),
    ("шестьдесят", 60),
    // Colloquial quantities
    ("полчаса", 30),
    ("четверть", 15),
];

fn digit_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d+)\b").unwrap())
}

fn lookup_word(word: &str) -> Option<u64> {
    WORD_NUMBERS
        .iter()
        .find(|(w, _)| *w == word)
        .map(|(_, n)| *n)
}

/// Parse a quantity from anywhere in the text: digits win, then the first
/// written-word numeral found.
pub fn parse_quantity(text: &str) -> Option<u64> {
    if let Some(cap) = digit_re().captures(text) {
        if let Ok(n) = cap[1].parse() {
            return Some(n);
        }
    }

    let lower = text.to_lowercase();
    lower.split_whitespace().find_map(lookup_word)
}

/// Parse a written-word quantity that is known to occupy the whole snippet,
/// e.g. the capture group of a duration pattern.
///
/// Exact table hits win; otherwise a two-word "tens units" compound is
/// combined additively ("двадцать пять" → 25).
pub fn parse_word_quantity(snippet: &str) -> Option<u64> {
    let snippet = snippet.trim().to_lowercase();

    if let Some(n) = lookup_word(&snippet) {
        return Some(n);
    }

    let parts: Vec<&str> = snippet.split_whitespace().collect();
    if let [tens, units] = parts.as_slice() {
        if let (Some(t), Some(u)) = (lookup_word(tens), lookup_word(units)) {
            return Some(t + u);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digits_win_over_words() {
        assert_eq!(parse_quantity("таймер на 5 минут или пять"), Some(5));
    }

    #[test]
    fn word_numerals() {
        assert_eq!(parse_quantity("поставь таймер на пять минут"), Some(5));
        assert_eq!(parse_quantity("напомни через двенадцать секунд"), Some(12));
    }

    #[test]
    fn declined_forms() {
        assert_eq!(parse_quantity("через одну минуту"), Some(1));
        assert_eq!(parse_quantity("через две минуты"), Some(2));
    }

    #[test]
    fn compound_word_quantity() {
        assert_eq!(parse_word_quantity("двадцать пять"), Some(25));
        assert_eq!(parse_word_quantity("сорок две"), Some(42));
        assert_eq!(parse_word_quantity("пятьдесят"), Some(50));
    }

    #[test]
    fn exact_hit_beats_compound() {
        // "двадцать" alone must not be misread as a failed compound.
        assert_eq!(parse_word_quantity("двадцать"), Some(20));
    }

    #[test]
    fn colloquial_quantities() {
        assert_eq!(parse_word_quantity("полчаса"), Some(30));
        assert_eq!(parse_word_quantity("четверть"), Some(15));
    }

    #[test]
    fn no_quantity() {
        assert_eq!(parse_quantity("привет как дела"), None);
        assert_eq!(parse_word_quantity("какая погода"), None);
    }

    #[test]
    fn garbage_compound_rejected() {
        assert_eq!(parse_word_quantity("пять сорок три"), None);
    }
}
