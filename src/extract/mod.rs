//! Address extraction from normalized OCR text.
//!
//! Stages run strictly in priority order and the first stage producing a
//! candidate wins; lower stages are never consulted after that:
//!
//! 1. boundary phrases ("known and numbered as ... described as follows")
//! 2. street patterns (number, name, suffix, city, state, ZIP)
//! 3. proximity to a state + ZIP line
//! 4. generic postal parser
//! 5. LLM polish, only when stage 4 came up empty or looks implausible
//!
//! Within a stage the longest cleaned candidate wins.

mod postal;
mod stages;
mod trace;

use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::polish::{AddressPolisher, NoopPolisher};
use crate::profile::CompiledProfile;

pub use postal::{has_state_and_zip, parse_all, ParsedAddress};
pub use stages::{clean_candidate, flatten};
pub use trace::{PatternTrace, TraceEntry};

/// Shortest string accepted as an address.
pub const MIN_ADDRESS_LEN: usize = 6;

/// Longest plausible single-line address before the LLM is asked to tidy it.
const MAX_PLAUSIBLE_LEN: usize = 100;

static LEGAL_TOKENS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:lot|block|plat|cause\s+no|notary|book|page|grantor|grantee|mortgage|parcel|tract)\b",
    )
    .unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    BoundaryPhrase,
    StreetPattern,
    Proximity,
    AddressParser,
    Llm,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::BoundaryPhrase => "boundary_phrase",
            Stage::StreetPattern => "street_pattern",
            Stage::Proximity => "proximity",
            Stage::AddressParser => "address_parser",
            Stage::Llm => "llm",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A possible address produced by one pattern of one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressCandidate {
    pub raw_match: String,
    pub pattern_id: String,
    /// Position of the pattern within its stage (0 = highest priority).
    pub priority_rank: usize,
    pub source_stage: Stage,
    /// The raw match after cleaning; what gets compared and returned.
    pub cleaned: String,
}

/// Outcome of running the stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Found { address: String, stage: Stage },
    NotFound,
}

impl Extraction {
    pub fn address(&self) -> Option<&str> {
        match self {
            Extraction::Found { address, .. } => Some(address),
            Extraction::NotFound => None,
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            Extraction::Found { stage, .. } => Some(*stage),
            Extraction::NotFound => None,
        }
    }
}

/// Flags a postal-parser result that should go through the LLM before use:
/// too long, missing state/ZIP, or carrying legal-description vocabulary.
pub fn needs_llm_polish(candidate: &str) -> bool {
    candidate.chars().count() > MAX_PLAUSIBLE_LEN
        || !has_state_and_zip(candidate)
        || LEGAL_TOKENS.is_match(candidate)
}

pub struct AddressExtractor {
    profile: CompiledProfile,
    polisher: Arc<dyn AddressPolisher>,
}

impl AddressExtractor {
    pub fn new(profile: CompiledProfile, polisher: Arc<dyn AddressPolisher>) -> Self {
        Self { profile, polisher }
    }

    /// Extractor without the LLM stage.
    pub fn without_polisher(profile: CompiledProfile) -> Self {
        Self::new(profile, Arc::new(NoopPolisher))
    }

    pub fn profile(&self) -> &CompiledProfile {
        &self.profile
    }

    /// Run the stages over normalized text.
    pub fn extract(&self, text: &str) -> (Extraction, PatternTrace) {
        let mut trace = PatternTrace::new();
        let flat = flatten(text);
        if flat.is_empty() {
            return (Extraction::NotFound, trace);
        }

        let regex_stages = [
            (Stage::BoundaryPhrase, &self.profile.boundary),
            (Stage::StreetPattern, &self.profile.street),
        ];
        for (stage, patterns) in regex_stages {
            let candidates = stages::run_patterns(stage, patterns, &flat, &self.profile, &mut trace);
            if let Some(found) = self.settle(stage, candidates) {
                return (found, trace);
            }
        }

        let candidates = stages::proximity(text, &self.profile, &mut trace);
        if let Some(found) = self.settle(Stage::Proximity, candidates) {
            return (found, trace);
        }

        let parsed = self.postal_stage(&flat, &mut trace);
        let wants_llm = parsed
            .as_ref()
            .map_or(true, |candidate| needs_llm_polish(&candidate.cleaned));

        if wants_llm && self.polisher.is_enabled() {
            let payload = parsed.as_ref().map_or(flat.as_str(), |c| c.cleaned.as_str());
            if let Some(outcome) = self.llm_stage(payload, &mut trace) {
                return (outcome, trace);
            }
        }

        let outcome = match parsed {
            Some(candidate) => {
                info!("Address found by {}: {}", Stage::AddressParser, candidate.cleaned);
                Extraction::Found {
                    address: candidate.cleaned,
                    stage: Stage::AddressParser,
                }
            }
            None => {
                debug!("No stage produced an address");
                Extraction::NotFound
            }
        };
        (outcome, trace)
    }

    fn settle(&self, stage: Stage, candidates: Vec<AddressCandidate>) -> Option<Extraction> {
        let count = candidates.len();
        let best = stages::pick_longest(candidates)?;
        info!(
            "Address found by {} ({} of {} candidates): {}",
            stage, best.pattern_id, count, best.cleaned
        );
        Some(Extraction::Found {
            address: best.cleaned,
            stage,
        })
    }

    fn postal_stage(&self, flat: &str, trace: &mut PatternTrace) -> Option<AddressCandidate> {
        let candidates: Vec<AddressCandidate> = parse_all(flat)
            .into_iter()
            .filter_map(|parsed| {
                let raw = &flat[parsed.start..parsed.end];
                clean_candidate(raw, &self.profile).map(|cleaned| AddressCandidate {
                    raw_match: raw.to_string(),
                    pattern_id: "postal".to_string(),
                    priority_rank: 0,
                    source_stage: Stage::AddressParser,
                    cleaned,
                })
            })
            .collect();

        trace.record(
            Stage::AddressParser,
            "postal",
            candidates.first().map(|c| c.raw_match.as_str()),
        );
        stages::pick_longest(candidates)
    }

    /// `None` means the polisher failed and the caller keeps what it had.
    fn llm_stage(&self, payload: &str, trace: &mut PatternTrace) -> Option<Extraction> {
        match self.polisher.polish(payload) {
            Ok(response) => {
                let address = response.trim().to_string();
                if address.chars().count() >= MIN_ADDRESS_LEN {
                    trace.record(Stage::Llm, self.polisher.name(), Some(&address));
                    info!("Address found by {}: {}", Stage::Llm, address);
                    Some(Extraction::Found {
                        address,
                        stage: Stage::Llm,
                    })
                } else {
                    trace.record(Stage::Llm, self.polisher.name(), None);
                    debug!("LLM returned no address");
                    Some(Extraction::NotFound)
                }
            }
            Err(e) => {
                warn!("Address polish skipped: {}", e);
                trace.record(Stage::Llm, self.polisher.name(), None);
                None
            }
        }
    }
}
