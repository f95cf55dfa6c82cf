//! OCR text cleanup ahead of pattern matching.
//!
//! Normalization keeps line structure (the proximity stage works line by
//! line) but otherwise flattens the OCR output into something regexes can
//! anchor on reliably.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::warn;

/// Known OCR misreads of domain vocabulary, lowercase misread -> correction.
const BUILTIN_CORRECTIONS: &[(&str, &str)] = &[
    ("streel", "Street"),
    ("sireet", "Street"),
    ("stroet", "Street"),
    ("slreet", "Street"),
    ("strect", "Street"),
    ("avonue", "Avenue"),
    ("avenuo", "Avenue"),
    ("aveneu", "Avenue"),
    ("raod", "Road"),
    ("rcad", "Road"),
    ("dnve", "Drive"),
    ("drlve", "Drive"),
    ("lanc", "Lane"),
    ("courl", "Court"),
    ("circie", "Circle"),
    ("hampshlre", "Hampshire"),
    ("manchesler", "Manchester"),
    ("nashna", "Nashua"),
    ("pelharn", "Pelham"),
    ("numbored", "Numbered"),
    ("nurnbered", "Numbered"),
    ("kncwn", "Known"),
    ("descrlbed", "Described"),
    ("cornmonly", "Commonly"),
    ("propcrty", "Property"),
    ("resldence", "Residence"),
];

static UNICODE_REPLACEMENTS: &[(char, &str)] = &[
    ('\u{2018}', "'"),
    ('\u{2019}', "'"),
    ('\u{201A}', "'"),
    ('\u{201B}', "'"),
    ('\u{2032}', "'"),
    ('\u{201C}', "\""),
    ('\u{201D}', "\""),
    ('\u{201E}', "\""),
    ('\u{2033}', "\""),
    ('\u{2010}', "-"),
    ('\u{2011}', "-"),
    ('\u{2012}', "-"),
    ('\u{2013}', "-"),
    ('\u{2014}', "-"),
    ('\u{2015}', "-"),
    ('\u{2212}', "-"),
    ('\u{00A0}', " "),
    ('\u{2007}', " "),
    ('\u{202F}', " "),
    ('\u{200B}', ""),
    ('\u{FEFF}', ""),
    ('\t', " "),
    ('\r', "\n"),
];

static ZIP_AFTER_STATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(NH|GA|N\.H\.|New Hampshire|Georgia)(\.?,?\s+)([0-9OoIlS]{5}(?:-[0-9OoIlS]{4})?)\b")
        .unwrap()
});

static HOUSE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[0-9]+[OolI][0-9OolI]*\b").unwrap());

static HYPHEN_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Za-z])-[ ]*\n[ ]*([A-Za-z])").unwrap());

static INLINE_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \x0B\x0C]+").unwrap());

static ANY_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

static BOILERPLATE: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (
            Regex::new(r"(?i)\bknown?\s+and\s+numbered\s+as\b").unwrap(),
            "known and numbered as",
        ),
        (
            Regex::new(r"(?i)\bcommonly\s+known\s+as\b").unwrap(),
            "commonly known as",
        ),
        (
            Regex::new(r"(?i)\blegally\s+described\s+as\b").unwrap(),
            "legally described as",
        ),
        (
            Regex::new(r"(?i)\bdescribed\s+as\s+follow(?:s|ed|ing)?\b").unwrap(),
            "described as follows",
        ),
        (Regex::new(r"(?i)\bknown\s+as\b").unwrap(), "known as"),
        (
            Regex::new(r"(?i)\bproperty\s+address\s*:").unwrap(),
            "property address:",
        ),
    ]
});

static FURNITURE_LINES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        // lone punctuation, rules, underscores
        Regex::new(r"^[^A-Za-z0-9]+$").unwrap(),
        // page numbers: "7", "- 3 -", "Page 2 of 5"
        Regex::new(r"(?i)^(?:page\s+)?-?\s*\d{1,3}\s*-?(?:\s+of\s+\d{1,3})?$").unwrap(),
        // signature blocks
        Regex::new(r"(?i)^(?:/s/|x\s*_{3,}|signature\b|notary public\b|my commission expires\b)")
            .unwrap(),
    ]
});

/// Cleans raw OCR output. Pure and deterministic; `normalize` is idempotent.
#[derive(Debug, Clone)]
pub struct TextNormalizer {
    corrections: HashMap<String, String>,
    correction_pattern: Option<Regex>,
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::new(std::iter::empty::<(String, String)>())
    }
}

impl TextNormalizer {
    /// Build a normalizer with the built-in correction table plus `extra`
    /// entries (misread, correction). Extra entries override built-ins.
    pub fn new<I, K, V>(extra: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut corrections: HashMap<String, String> = BUILTIN_CORRECTIONS
            .iter()
            .map(|(from, to)| (from.to_string(), to.to_string()))
            .collect();
        for (from, to) in extra {
            let from = from.as_ref().trim().to_lowercase();
            if !from.is_empty() {
                corrections.insert(from, to.into());
            }
        }

        // Identity entries would never change anything.
        corrections.retain(|from, to| *from != to.to_lowercase());

        // A correction whose result is itself a misread would keep rewriting.
        let chained: Vec<String> = corrections
            .iter()
            .filter(|(_, to)| corrections.contains_key(&to.to_lowercase()))
            .map(|(from, _)| from.clone())
            .collect();
        for from in chained {
            if let Some(to) = corrections.remove(&from) {
                warn!("Ignoring chained OCR correction {:?} -> {:?}", from, to);
            }
        }

        let mut keys: Vec<&String> = corrections.keys().collect();
        keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        let correction_pattern = if keys.is_empty() {
            None
        } else {
            let alternation = keys
                .iter()
                .map(|k| regex::escape(k))
                .collect::<Vec<_>>()
                .join("|");
            Regex::new(&format!(r"(?i)\b(?:{})\b", alternation)).ok()
        };

        Self {
            corrections,
            correction_pattern,
        }
    }

    /// Normalize raw OCR text.
    ///
    /// Passes repeat until the text stops changing, so the result is a
    /// fixpoint of [`Self::pass`]. A text seen before also ends the loop.
    pub fn normalize(&self, raw: &str) -> String {
        let mut seen = HashSet::new();
        let mut text = raw.to_string();
        loop {
            let next = self.pass(&text);
            if next == text || !seen.insert(text) {
                return next;
            }
            text = next;
        }
    }

    fn pass(&self, text: &str) -> String {
        let text = normalize_unicode(text);
        let text = self.apply_corrections(&text);
        let text = fix_zip_codes(&text);
        let text = fix_house_numbers(&text);
        let text = HYPHEN_BREAK.replace_all(&text, "$1$2").into_owned();
        let text = collapse_whitespace(&text);
        let text = canonicalize_boilerplate(&text);
        remove_furniture_lines(&text)
    }

    fn apply_corrections(&self, text: &str) -> String {
        let Some(pattern) = &self.correction_pattern else {
            return text.to_string();
        };
        pattern
            .replace_all(text, |caps: &Captures| {
                let found = &caps[0];
                match self.corrections.get(&found.to_lowercase()) {
                    Some(to) => match_case(found, to),
                    None => found.to_string(),
                }
            })
            .into_owned()
    }
}

/// Collapse every whitespace run (newlines included) to one space and strip
/// leading/trailing punctuation.
pub fn tidy(text: &str) -> String {
    let collapsed = ANY_SPACE.replace_all(text, " ");
    collapsed
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_string()
}

fn normalize_unicode(text: &str) -> String {
    let text = text.replace("\r\n", "\n");
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match UNICODE_REPLACEMENTS.iter().find(|(from, _)| *from == c) {
            Some((_, to)) => out.push_str(to),
            None => out.push(c),
        }
    }
    out
}

/// Apply the replacement with the casing of what was found.
fn match_case(found: &str, replacement: &str) -> String {
    let letters: Vec<char> = found.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() > 1 && letters.iter().all(|c| c.is_uppercase()) {
        replacement.to_uppercase()
    } else if letters.first().is_some_and(|c| c.is_uppercase()) {
        let mut chars = replacement.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    } else {
        replacement.to_lowercase()
    }
}

fn digitize(token: &str) -> String {
    token
        .chars()
        .map(|c| match c {
            'O' | 'o' => '0',
            'I' | 'l' => '1',
            'S' => '5',
            other => other,
        })
        .collect()
}

fn fix_zip_codes(text: &str) -> String {
    ZIP_AFTER_STATE
        .replace_all(text, |caps: &Captures| {
            let zip = &caps[3];
            let digits = zip.chars().filter(|c| c.is_ascii_digit()).count();
            if digits >= 3 {
                format!("{}{}{}", &caps[1], &caps[2], digitize(zip))
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

fn fix_house_numbers(text: &str) -> String {
    HOUSE_NUMBER
        .replace_all(text, |caps: &Captures| digitize(&caps[0]))
        .into_owned()
}

/// Collapse spaces within each line, trim lines, squeeze blank-line runs.
fn collapse_whitespace(text: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    for line in text.lines() {
        let line = INLINE_SPACE.replace_all(line, " ").trim().to_string();
        if line.is_empty() && lines.last().map_or(true, |l| l.is_empty()) {
            continue;
        }
        lines.push(line);
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

fn canonicalize_boilerplate(text: &str) -> String {
    let mut text = text.to_string();
    for (pattern, canonical) in BOILERPLATE.iter() {
        text = pattern.replace_all(&text, *canonical).into_owned();
    }
    text
}

fn remove_furniture_lines(text: &str) -> String {
    text.lines()
        .filter(|line| {
            let line = line.trim();
            line.is_empty() || !FURNITURE_LINES.iter().any(|re| re.is_match(line))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(text: &str) -> String {
        TextNormalizer::default().normalize(text)
    }

    #[test]
    fn test_unicode_quotes_and_dashes() {
        assert_eq!(
            normalize("O\u{2019}Brien \u{201C}Lot\u{201D} 12\u{2013}14\u{00A0}Main"),
            "O'Brien \"Lot\" 12-14 Main"
        );
    }

    #[test]
    fn test_corrections_keep_case() {
        assert_eq!(normalize("14 Elm Streel"), "14 Elm Street");
        assert_eq!(normalize("14 ELM STREEL"), "14 ELM STREET");
        assert_eq!(normalize("an avonue"), "an avenue");
        assert_eq!(normalize("Manchesler, New Hampshlre"), "Manchester, New Hampshire");
        // Only whole words are corrected.
        assert_eq!(normalize("Streelton"), "Streelton");
    }

    #[test]
    fn test_extra_corrections() {
        let normalizer = TextNormalizer::new([("SEWALL", "Seawall")]);
        assert_eq!(normalizer.normalize("12 SEWALL RD"), "12 SEAWALL RD");
    }

    #[test]
    fn test_zip_and_house_number_confusions() {
        assert_eq!(normalize("Pelham NH O3O76"), "Pelham NH 03076");
        assert_eq!(normalize("1O4 Elm St"), "104 Elm St");
        assert_eq!(normalize("Atlanta, GA 3O3l8-12S4"), "Atlanta, GA 30318-1254");
        // Too few digits to be a ZIP.
        assert_eq!(normalize("NH SOLD"), "NH SOLD");
    }

    #[test]
    fn test_dehyphenation() {
        assert_eq!(normalize("14 Ladyslip-\nper Ave"), "14 Ladyslipper Ave");
    }

    #[test]
    fn test_whitespace_keeps_lines() {
        assert_eq!(
            normalize("  14   Main \t St  \n\n\n\n  Nashua   NH  \n\n"),
            "14 Main St\n\nNashua NH"
        );
    }

    #[test]
    fn test_boilerplate_canonical_spacing() {
        assert_eq!(
            normalize("being know   and\nnumbered  as 14 Elm St and described as followed:"),
            "being known and numbered as 14 Elm St and described as follows:"
        );
        assert_eq!(
            normalize("COMMONLY KNOWN  AS 9 Oak Rd"),
            "commonly known as 9 Oak Rd"
        );
        assert_eq!(normalize("Property Address : 9 Oak Rd"), "property address: 9 Oak Rd");
    }

    #[test]
    fn test_furniture_lines_removed() {
        let raw = "NOTICE OF LIEN\n- 3 -\nPage 2 of 5\n______________\n/s/ Jane Roe\n***\n7\nSignature of Grantor\n42 ELM ST NASHUA NH 03060";
        assert_eq!(normalize(raw), "NOTICE OF LIEN\n42 ELM ST NASHUA NH 03060");
    }

    #[test]
    fn test_chained_corrections_are_dropped() {
        let normalizer = TextNormalizer::new([("Rd", "Road"), ("Road", "Rd"), ("Ln", "Lane")]);
        let once = normalizer.normalize("9 Oak Rd and 4 Elm Ln");
        assert_eq!(once, "9 Oak Rd and 4 Elm Lane");
        assert_eq!(normalizer.normalize(&once), once);
    }

    #[test]
    fn test_idempotent() {
        let samples = [
            "being know and numbered as 14 LADYSLIPPER AVE PELHAM NH O3O76-2959 and described as followed",
            "Ladyslip-\n per  Avonue\n\n\n- 2 -\n\u{201C}commonly   known as\u{201D} 1O4 Elm Streel",
            "   \n\n   ",
            "Page 1 of 2\n\n\n\n__\n\n42 ELM ST\nNASHUA NH 03060\n",
            "A-\n-\nB",
        ];
        let normalizer = TextNormalizer::default();
        for sample in samples {
            let once = normalizer.normalize(sample);
            assert_eq!(normalizer.normalize(&once), once, "sample: {:?}", sample);
        }
    }

    #[test]
    fn test_tidy() {
        assert_eq!(tidy("  , 14 Elm St\nNashua NH 03060 ;. "), "14 Elm St Nashua NH 03060");
        assert_eq!(tidy("--"), "");
    }
}
