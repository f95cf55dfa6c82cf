//! Regex-driven stages: boundary phrases, street patterns, proximity.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::trace::PatternTrace;
use super::{AddressCandidate, Stage, MIN_ADDRESS_LEN};
use crate::normalize::tidy;
use crate::profile::{CompiledPattern, CompiledProfile};

/// Boilerplate that ends an address when a pattern over-captures.
static STOP_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:described as|legally described|known as|known and numbered|being more particularly|more particularly|recorded in|county of|registry of deeds)\b",
    )
    .unwrap()
});

static TRAILING_CONNECTOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:[\s,;:]+(?:and|being|which|said|the|is|as|of|at|in|with))+[\s,;:]*$")
        .unwrap()
});

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Join lines into one line of single-spaced text.
pub fn flatten(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Trim a raw match down to the address it most likely holds.
///
/// The address starts at the first house number followed by a word; text
/// before it is dropped. Returns `None` when there is no such start or fewer
/// than [`MIN_ADDRESS_LEN`] characters survive.
pub fn clean_candidate(raw: &str, profile: &CompiledProfile) -> Option<String> {
    let flat = flatten(raw);
    let start = profile.street_start.find(&flat)?.start();
    let mut text = flat[start..].to_string();

    if let Some(stop) = STOP_PHRASE.find(&text) {
        text.truncate(stop.start());
    }
    if let Some(state_zip) = profile.state_zip.find(&text) {
        text.truncate(state_zip.end());
    }
    let text = TRAILING_CONNECTOR.replace(&text, "");
    let text = tidy(&text);

    (text.chars().count() >= MIN_ADDRESS_LEN).then_some(text)
}

/// Run every pattern of a stage over flattened text.
pub fn run_patterns(
    stage: Stage,
    patterns: &[CompiledPattern],
    flat: &str,
    profile: &CompiledProfile,
    trace: &mut PatternTrace,
) -> Vec<AddressCandidate> {
    let mut candidates = Vec::new();

    for pattern in patterns {
        let mut first_capture = None;
        for caps in pattern.regex.captures_iter(flat) {
            let Some(raw) = caps.get(1).or_else(|| caps.get(0)) else {
                continue;
            };
            let raw = raw.as_str();
            first_capture.get_or_insert(raw);

            match clean_candidate(raw, profile) {
                Some(cleaned) => candidates.push(AddressCandidate {
                    raw_match: raw.to_string(),
                    pattern_id: pattern.id.clone(),
                    priority_rank: pattern.rank,
                    source_stage: stage,
                    cleaned,
                }),
                None => debug!("{} capture too short after cleaning: {:?}", pattern.id, raw),
            }
        }
        trace.record(stage, &pattern.id, first_capture);
    }

    candidates
}

/// Street fragment on the same line as, or the line before, a state + ZIP.
pub fn proximity(
    text: &str,
    profile: &CompiledProfile,
    trace: &mut PatternTrace,
) -> Vec<AddressCandidate> {
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let mut candidates = Vec::new();

    for (index, line) in lines.iter().enumerate() {
        let Some(state_zip) = profile.state_zip.find(line) else {
            continue;
        };
        let through_zip = &line[..state_zip.end()];

        let (raw, pattern_id) = match street_start(line, state_zip.start(), profile) {
            Some(start) => (through_zip[start..].to_string(), "same_line"),
            None => {
                let previous = lines[..index].iter().rev().find(|l| !l.is_empty());
                let Some(fragment) = previous.and_then(|p| trailing_street(p, profile)) else {
                    trace.record(Stage::Proximity, "city_state_zip_line", None);
                    continue;
                };
                (format!("{} {}", fragment, through_zip), "previous_line")
            }
        };

        trace.record(Stage::Proximity, pattern_id, Some(&raw));
        if let Some(cleaned) = clean_candidate(&raw, profile) {
            candidates.push(AddressCandidate {
                raw_match: raw,
                pattern_id: pattern_id.to_string(),
                priority_rank: 0,
                source_stage: Stage::Proximity,
                cleaned,
            });
        }
    }

    if candidates.is_empty() && !trace.reached(Stage::Proximity) {
        trace.record(Stage::Proximity, "city_state_zip_line", None);
    }
    candidates
}

/// Start of the last house number before `limit` that is followed by at
/// least two words.
fn street_start(line: &str, limit: usize, profile: &CompiledProfile) -> Option<usize> {
    let head = &line[..limit];
    let starts: Vec<usize> = profile
        .street_start
        .find_iter(head)
        .map(|m| m.start())
        .collect();
    starts
        .into_iter()
        .rev()
        .find(|&start| alphabetic_words(&head[start..]) >= 2)
}

/// The street fragment at the end of a line (house number onwards).
fn trailing_street<'a>(line: &'a str, profile: &CompiledProfile) -> Option<&'a str> {
    street_start(line, line.len(), profile).map(|start| line[start..].trim())
}

fn alphabetic_words(text: &str) -> usize {
    text.split_whitespace()
        .filter(|w| {
            let w = w.trim_matches(|c: char| !c.is_alphanumeric());
            !w.is_empty() && w.chars().all(|c| c.is_alphabetic() || c == '\'')
        })
        .count()
}

/// Longest cleaned candidate; the earliest wins ties.
pub fn pick_longest(candidates: Vec<AddressCandidate>) -> Option<AddressCandidate> {
    let mut best: Option<AddressCandidate> = None;
    for candidate in candidates {
        let longer = best
            .as_ref()
            .map_or(true, |b| candidate.cleaned.chars().count() > b.cleaned.chars().count());
        if longer {
            best = Some(candidate);
        }
    }
    best
}
