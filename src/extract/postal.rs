//! General-purpose US postal address parser.
//!
//! Works on any text, independent of the jurisdiction profile: tokens are
//! labeled house number, directional, street name, suffix, unit, city, state
//! and ZIP using USPS suffix and state tables. A parse needs at least a house
//! number, one street-name word and a suffix.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9#][A-Za-z0-9'.#-]*").unwrap());

static HOUSE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,6}(?:-\d{1,4})?[A-Za-z]?$").unwrap());

static ORDINAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\d{1,3}(?:st|nd|rd|th)$").unwrap());

static ZIP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{5}(?:-\d{4})?$").unwrap());

const MAX_NAME_WORDS: usize = 5;
const MAX_CITY_WORDS: usize = 3;

const DIRECTIONALS: &[&str] = &[
    "n", "s", "e", "w", "ne", "nw", "se", "sw", "north", "south", "east", "west",
];

const UNIT_DESIGNATORS: &[&str] = &["apt", "apartment", "unit", "ste", "suite", "#", "no", "lot"];

/// USPS street suffixes (common forms and standard abbreviations).
const SUFFIXES: &[&str] = &[
    "alley", "aly", "avenue", "ave", "av", "bend", "bnd", "boulevard", "blvd", "bypass", "byp",
    "circle", "cir", "cove", "cv", "court", "ct", "crossing", "xing", "drive", "dr", "estates",
    "ests", "expressway", "expy", "extension", "ext", "freeway", "fwy", "glen", "gln", "heights",
    "hts", "highway", "hwy", "hill", "hl", "hollow", "holw", "lane", "ln", "loop", "manor",
    "mnr", "parkway", "pkwy", "path", "pike", "place", "pl", "plaza", "plz", "point", "pt",
    "ridge", "rdg", "road", "rd", "route", "rte", "row", "run", "square", "sq", "street", "st",
    "terrace", "ter", "trace", "trce", "trail", "trl", "turnpike", "tpke", "walk", "way",
];

const STATE_ABBREVIATIONS: &[&str] = &[
    "al", "ak", "az", "ar", "ca", "co", "ct", "de", "dc", "fl", "ga", "hi", "id", "il", "in", "ia",
    "ks", "ky", "la", "me", "md", "ma", "mi", "mn", "ms", "mo", "mt", "ne", "nv", "nh", "nj", "nm",
    "ny", "nc", "nd", "oh", "ok", "or", "pa", "ri", "sc", "sd", "tn", "tx", "ut", "vt", "va", "wa",
    "wv", "wi", "wy",
];

const STATE_NAMES: &[&str] = &[
    "alabama", "alaska", "arizona", "arkansas", "california", "colorado", "connecticut",
    "delaware", "florida", "georgia", "hawaii", "idaho", "illinois", "indiana", "iowa", "kansas",
    "kentucky", "louisiana", "maine", "maryland", "massachusetts", "michigan", "minnesota",
    "mississippi", "missouri", "montana", "nebraska", "nevada", "new hampshire", "new jersey",
    "new mexico", "new york", "north carolina", "north dakota", "ohio", "oklahoma", "oregon",
    "pennsylvania", "rhode island", "south carolina", "south dakota", "tennessee", "texas",
    "utah", "vermont", "virginia", "washington", "west virginia", "wisconsin", "wyoming",
];

static STATE_ZIP: LazyLock<Regex> = LazyLock::new(|| {
    let mut names: Vec<String> = STATE_NAMES
        .iter()
        .map(|n| n.replace(' ', r"\s+"))
        .collect();
    names.extend(STATE_ABBREVIATIONS.iter().map(|s| s.to_string()));
    Regex::new(&format!(
        r"(?i)\b(?:{})\.?,?\s+\d{{5}}(?:-\d{{4}})?\b",
        names.join("|")
    ))
    .unwrap()
});

/// Whether `text` contains a US state (abbreviation or name) followed by a ZIP.
pub fn has_state_and_zip(text: &str) -> bool {
    STATE_ZIP.is_match(text)
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Token<'a> {
    text: &'a str,
    /// Lowercased, trailing '.' and ',' removed.
    key: String,
    start: usize,
    end: usize,
    /// A comma directly follows the token.
    comma: bool,
}

/// A labeled address found in text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAddress {
    pub house_number: String,
    pub street: String,
    pub suffix: String,
    pub unit: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    /// Byte span in the parsed text.
    pub start: usize,
    pub end: usize,
}

impl ParsedAddress {
    pub fn is_complete(&self) -> bool {
        self.city.is_some() && self.state.is_some() && self.zip.is_some()
    }
}

impl fmt::Display for ParsedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.house_number, self.street, self.suffix)?;
        if let Some(unit) = &self.unit {
            write!(f, " {}", unit)?;
        }
        if let Some(city) = &self.city {
            write!(f, ", {}", city)?;
        }
        if let Some(state) = &self.state {
            write!(f, " {}", state)?;
        }
        if let Some(zip) = &self.zip {
            write!(f, " {}", zip)?;
        }
        Ok(())
    }
}

/// Find every address-shaped token run in `text`, left to right.
pub fn parse_all(text: &str) -> Vec<ParsedAddress> {
    let tokens = tokenize(text);
    let mut found = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        match parse_at(&tokens, i) {
            Some((parsed, next)) => {
                found.push(parsed);
                i = next;
            }
            None => i += 1,
        }
    }
    found
}

fn tokenize(text: &str) -> Vec<Token<'_>> {
    TOKEN
        .find_iter(text)
        .map(|m| {
            let raw = m.as_str();
            let trimmed = raw.trim_end_matches(['.', ',']);
            let comma = raw.ends_with(',') || text[m.end()..].starts_with(',');
            Token {
                text: trimmed,
                key: trimmed.to_lowercase(),
                start: m.start(),
                end: m.start() + trimmed.len(),
                comma,
            }
        })
        .filter(|t| !t.text.is_empty())
        .collect()
}

fn is_word(token: &Token<'_>) -> bool {
    token
        .text
        .chars()
        .all(|c| c.is_alphabetic() || c == '\'' || c == '-' || c == '.')
        && token.text.chars().any(|c| c.is_alphabetic())
}

fn is_suffix(token: &Token<'_>) -> bool {
    SUFFIXES.contains(&token.key.as_str())
}

fn is_directional(token: &Token<'_>) -> bool {
    DIRECTIONALS.contains(&token.key.trim_end_matches('.'))
}

/// Match a state starting at `i`; returns the number of tokens used.
fn state_at(tokens: &[Token<'_>], i: usize) -> Option<usize> {
    let first = tokens.get(i)?;
    let key = first.key.replace('.', "");
    if STATE_ABBREVIATIONS.contains(&key.as_str()) && first.text.chars().all(|c| !c.is_lowercase())
    {
        return Some(1);
    }
    if STATE_NAMES.contains(&first.key.as_str()) {
        return Some(1);
    }
    let second = tokens.get(i + 1)?;
    let two = format!("{} {}", first.key, second.key);
    STATE_NAMES.contains(&two.as_str()).then_some(2)
}

fn join(tokens: &[Token<'_>]) -> String {
    tokens.iter().map(|t| t.text).collect::<Vec<_>>().join(" ")
}

fn parse_at(tokens: &[Token<'_>], start: usize) -> Option<(ParsedAddress, usize)> {
    let number = tokens.get(start)?;
    if !HOUSE_NUMBER.is_match(number.text)
        || (ZIP.is_match(number.text) && number.text.contains('-'))
    {
        return None;
    }

    // Street name words up to the first suffix.
    let name_start = start + 1;
    let mut j = name_start;
    let mut suffix_at = None;
    while j < tokens.len() && j - name_start <= MAX_NAME_WORDS {
        let token = &tokens[j];
        if j > name_start && is_suffix(token) {
            suffix_at = Some(j);
            break;
        }
        if !(is_word(token) || ORDINAL.is_match(token.text)) || token.comma && j > name_start {
            break;
        }
        j += 1;
    }
    let mut suffix_at = suffix_at?;
    // "Cedar Ridge Rd": an earlier suffix word belongs to the name.
    while !tokens[suffix_at].comma && tokens.get(suffix_at + 1).is_some_and(is_suffix) {
        suffix_at += 1;
    }
    let street = join(&tokens[name_start..suffix_at]);
    let suffix = tokens[suffix_at].text.to_string();
    let mut end = tokens[suffix_at].end;
    let mut next = suffix_at + 1;

    if let Some(token) = tokens.get(next) {
        if is_directional(token) && state_at(tokens, next).is_none() {
            end = token.end;
            next += 1;
        }
    }

    let mut unit = None;
    if let Some(token) = tokens.get(next) {
        if token.text.starts_with('#') && token.text.len() > 1 {
            unit = Some(token.text.to_string());
            end = token.end;
            next += 1;
        } else if UNIT_DESIGNATORS.contains(&token.key.as_str()) {
            if let Some(id) = tokens.get(next + 1) {
                if id.text.chars().any(|c| c.is_ascii_digit()) {
                    unit = Some(format!("{} {}", token.text, id.text));
                    end = id.end;
                    next += 2;
                }
            }
        }
    }

    let mut parsed = ParsedAddress {
        house_number: number.text.to_string(),
        street,
        suffix,
        unit,
        city: None,
        state: None,
        zip: None,
        start: number.start,
        end,
    };

    // City words, then a state, then an optional ZIP.
    for city_len in 0..=MAX_CITY_WORDS {
        let state_index = next + city_len;
        if city_len > 0 && !tokens.get(state_index - 1).is_some_and(is_word) {
            break;
        }
        let Some(state_len) = state_at(tokens, state_index) else {
            continue;
        };
        if city_len > 0 {
            parsed.city = Some(join(&tokens[next..state_index]));
        }
        let state_end = state_index + state_len;
        parsed.state = Some(join(&tokens[state_index..state_end]));
        parsed.end = tokens[state_end - 1].end;
        next = state_end;
        if let Some(zip) = tokens.get(next).filter(|t| ZIP.is_match(t.text)) {
            parsed.zip = Some(zip.text.to_string());
            parsed.end = zip.end;
            next += 1;
        }
        break;
    }

    Some((parsed, next))
}
