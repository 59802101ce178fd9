//! Token-level language and locale hints.
//!
//! Purely lexical: keyword hits, umlaut transliteration markers, month
//! names, and date/number formats. No statistical model; the hints only
//! steer OCR language selection and downstream routing.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Closed hint set shared by language and locale classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LangHint {
    De,
    En,
    Mixed,
    #[default]
    Unknown,
}

impl LangHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            LangHint::De => "de",
            LangHint::En => "en",
            LangHint::Mixed => "mixed",
            LangHint::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for LangHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

const DE_TRIGGER_MARKERS: [&str; 4] = ["ue", "oe", "ae", "ss"];

const DE_KEYWORDS: [&str; 22] = [
    "und", "der", "die", "das", "ein", "eine", "ist", "nicht", "mit", "fuer", "aus", "dem", "den",
    "des", "bei", "oder", "wir", "sie", "dass", "zum", "zur", "ueber",
];

const EN_KEYWORDS: [&str; 17] = [
    "the", "and", "for", "with", "from", "this", "that", "your", "you", "please", "dear", "hello",
    "thank", "invoice", "date", "page", "tax",
];

const DATE_KEYWORDS_DE: [&str; 12] = [
    "januar",
    "februar",
    "maerz",
    "april",
    "mai",
    "juni",
    "juli",
    "august",
    "september",
    "oktober",
    "november",
    "dezember",
];

const DATE_KEYWORDS_EN: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

lazy_static! {
    static ref DE_DATE: Regex = Regex::new(r"\b\d{1,2}\.\d{1,2}\.\d{2,4}\b").unwrap();
    static ref EN_DATE: Regex = Regex::new(r"\b\d{1,2}/\d{1,2}/\d{2,4}\b").unwrap();
    static ref DE_NUMBER: Regex = Regex::new(r"\b\d{1,3}(?:\.\d{3})*,\d{2}\b").unwrap();
    static ref EN_NUMBER: Regex = Regex::new(r"\b\d{1,3}(?:,\d{3})*\.\d{2}\b").unwrap();
}

/// Coarse language label for a run of text.
pub fn language_hint(text: &str) -> LangHint {
    if text.is_empty() {
        return LangHint::Unknown;
    }
    let normalized: String = text
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == ' ' {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect();
    let tokens: Vec<&str> = normalized.split_whitespace().collect();
    if tokens.is_empty() {
        return LangHint::Unknown;
    }

    let mut de_score = tokens
        .iter()
        .filter(|tok| {
            DE_KEYWORDS.contains(tok) || DE_TRIGGER_MARKERS.iter().any(|m| tok.contains(m))
        })
        .count();
    let mut en_score = tokens.iter().filter(|tok| EN_KEYWORDS.contains(tok)).count();
    if tokens.iter().any(|tok| DATE_KEYWORDS_DE.contains(tok)) {
        de_score += 1;
    }
    if tokens.iter().any(|tok| DATE_KEYWORDS_EN.contains(tok)) {
        en_score += 1;
    }

    if de_score == 0 && en_score == 0 {
        return LangHint::Unknown;
    }
    if de_score > 0 && en_score > 0 && de_score.abs_diff(en_score) <= 1 {
        return LangHint::Mixed;
    }
    if de_score > en_score {
        LangHint::De
    } else {
        LangHint::En
    }
}

/// Locale label derived from number and date formats found in the text.
pub fn locale_hint(text: &str) -> LangHint {
    if text.is_empty() {
        return LangHint::Unknown;
    }
    let has_de = DE_DATE.is_match(text) || DE_NUMBER.is_match(text);
    let has_en = EN_DATE.is_match(text) || EN_NUMBER.is_match(text);
    match (has_de, has_en) {
        (true, true) => LangHint::Mixed,
        (true, false) => LangHint::De,
        (false, true) => LangHint::En,
        (false, false) => LangHint::Unknown,
    }
}

/// Fold a new hint into an accumulated one. Unknown always yields; two
/// distinct known hints collapse to mixed.
pub fn merge_hint(existing: LangHint, new_hint: LangHint) -> LangHint {
    if existing == LangHint::Unknown {
        return new_hint;
    }
    if new_hint == LangHint::Unknown || new_hint == existing {
        return existing;
    }
    LangHint::Mixed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_german() {
        let text = "Wir bedanken uns fuer die Zahlung und den Auftrag";
        assert_eq!(language_hint(text), LangHint::De);
    }

    #[test]
    fn detects_english() {
        let text = "Thank you for your invoice, please see the attached page";
        assert_eq!(language_hint(text), LangHint::En);
    }

    #[test]
    fn near_tie_is_mixed() {
        // One German keyword, one English keyword.
        let text = "der invoice";
        assert_eq!(language_hint(text), LangHint::Mixed);
    }

    #[test]
    fn no_signal_is_unknown() {
        assert_eq!(language_hint(""), LangHint::Unknown);
        assert_eq!(language_hint("12345 67890"), LangHint::Unknown);
    }

    #[test]
    fn month_names_contribute() {
        assert_eq!(language_hint("14 Dezember"), LangHint::De);
        assert_eq!(language_hint("14 December"), LangHint::En);
    }

    #[test]
    fn locale_from_dates_and_numbers() {
        assert_eq!(locale_hint("Rechnung vom 03.12.2024"), LangHint::De);
        assert_eq!(locale_hint("due 03/12/2024"), LangHint::En);
        assert_eq!(locale_hint("Betrag 1.234,56"), LangHint::De);
        assert_eq!(locale_hint("amount 1,234.56"), LangHint::En);
        assert_eq!(locale_hint("03.12.2024 or 03/12/2024"), LangHint::Mixed);
        assert_eq!(locale_hint("no numerals here"), LangHint::Unknown);
    }

    #[test]
    fn merge_rules() {
        assert_eq!(merge_hint(LangHint::Unknown, LangHint::De), LangHint::De);
        assert_eq!(merge_hint(LangHint::De, LangHint::Unknown), LangHint::De);
        assert_eq!(merge_hint(LangHint::De, LangHint::De), LangHint::De);
        assert_eq!(merge_hint(LangHint::De, LangHint::En), LangHint::Mixed);
        assert_eq!(merge_hint(LangHint::Mixed, LangHint::De), LangHint::Mixed);
    }
}
