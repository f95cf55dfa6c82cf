//! Person-name removal from candidate addresses.
//!
//! OCR line joins and greedy patterns sometimes drag a grantor's or
//! lienholder's name into the address. Removal never shrinks a candidate
//! below the minimum address length; in that case the unscrubbed text is
//! kept.

use std::ops::Range;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::debug;

use crate::extract::MIN_ADDRESS_LEN;
use crate::normalize::tidy;
use crate::profile::CompiledProfile;

static CAMEL_CASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][a-z]{2,}[A-Z][a-z]{2,}\b").unwrap());

static LEADING_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z][A-Za-z'-]+)\s+([A-Z][A-Za-z'-]+)[\s,]+(\d)").unwrap()
});

static TRAILING_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{5}(?:-\d{4})?)[\s,]+([A-Z][A-Za-z'-]+)\s+([A-Z][A-Za-z'-]+)$").unwrap()
});

static HOUSE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,6}[A-Za-z]?$").unwrap());

const CAMEL_PREFIXES: &[&str] = &["Mc", "Mac", "De", "La", "Van"];

pub struct NameScrubber {
    profile: CompiledProfile,
    known_names: Option<Regex>,
    first_name: Option<Regex>,
}

impl NameScrubber {
    pub fn new(profile: CompiledProfile) -> Self {
        let known_names = literal_alternation(profile.known_names())
            .and_then(|alt| Regex::new(&format!(r"(?i)\b{}", alt)).ok());
        let first_name = literal_alternation(profile.first_names()).and_then(|alt| {
            Regex::new(&format!(
                r"\b(?i:{})\s+(?:[A-Z]\.?\s+)?([A-Z][A-Za-z'-]+)\b",
                alt
            ))
            .ok()
        });
        Self {
            profile,
            known_names,
            first_name,
        }
    }

    /// Remove person names from `candidate`.
    pub fn scrub(&self, candidate: &str) -> String {
        let original = tidy(candidate);
        let mut text = original.clone();

        if let Some(known) = &self.known_names {
            text = known.replace_all(&text, " ").into_owned();
        }
        text = self.remove_camel_case(&text);
        text = self.remove_first_last(&text);
        text = tidy(&text);
        text = self.remove_anchored(&text);
        let text = tidy(&text);

        if text.chars().count() < MIN_ADDRESS_LEN {
            debug!("Scrubbing would leave {:?}, keeping {:?}", text, original);
            return original;
        }
        if text != original {
            debug!("Scrubbed {:?} -> {:?}", original, text);
        }
        text
    }

    fn is_place_word(&self, word: &str) -> bool {
        self.profile.is_city(word) || self.profile.is_suffix(word) || self.profile.is_state(word)
    }

    fn remove_camel_case(&self, text: &str) -> String {
        CAMEL_CASE
            .replace_all(text, |caps: &Captures| {
                let word = &caps[0];
                let keep = CAMEL_PREFIXES.iter().any(|p| {
                    word.starts_with(p) && word[p.len()..].starts_with(|c: char| c.is_uppercase())
                }) || self.profile.is_city(word);
                if keep {
                    word.to_string()
                } else {
                    String::new()
                }
            })
            .into_owned()
    }

    /// "First [I.] Last" where First is a known first name.
    fn remove_first_last(&self, text: &str) -> String {
        let Some(first_name) = &self.first_name else {
            return text.to_string();
        };

        let mut removals: Vec<Range<usize>> = Vec::new();
        for caps in first_name.captures_iter(text) {
            let (Some(whole), Some(surname)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if self.is_place_word(surname.as_str()) {
                continue;
            }
            // "14 Paul Revere Rd" is a street, not a person.
            let after_number = text[..whole.start()]
                .split_whitespace()
                .last()
                .is_some_and(|w| HOUSE_NUMBER.is_match(w));
            let before_suffix = text[whole.end()..]
                .split_whitespace()
                .next()
                .is_some_and(|w| self.profile.is_suffix(w.trim_end_matches(',')));
            if after_number || before_suffix {
                continue;
            }
            removals.push(whole.range());
        }

        let mut out = text.to_string();
        for range in removals.into_iter().rev() {
            out.replace_range(range, " ");
        }
        out
    }

    /// Two capitalized words before the house number or after the ZIP.
    fn remove_anchored(&self, text: &str) -> String {
        let text = LEADING_NAME
            .replace(text, |caps: &Captures| {
                if self.is_place_word(&caps[1]) || self.is_place_word(&caps[2]) {
                    caps[0].to_string()
                } else {
                    caps[3].to_string()
                }
            })
            .into_owned();
        TRAILING_NAME
            .replace(&text, |caps: &Captures| {
                if self.is_place_word(&caps[2]) || self.is_place_word(&caps[3]) {
                    caps[0].to_string()
                } else {
                    caps[1].to_string()
                }
            })
            .into_owned()
    }
}

/// Escaped, case-insensitive-ready alternation, longest first.
fn literal_alternation(words: &[String]) -> Option<String> {
    let mut words: Vec<&str> = words
        .iter()
        .map(|w| w.trim())
        .filter(|w| !w.is_empty())
        .collect();
    if words.is_empty() {
        return None;
    }
    words.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    let escaped: Vec<String> = words.iter().map(|w| regex::escape(w)).collect();
    Some(format!("(?:{})", escaped.join("|")))
}
