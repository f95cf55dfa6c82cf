//! Jurisdiction profiles.
//!
//! Boilerplate anchors, street shapes and the word lists behind them are
//! plain data so a new county's templates can be supported by writing a TOML
//! file instead of touching the extractor. The built-in profile covers the
//! New Hampshire and Georgia filings this tool started with.
//!
//! Patterns are regexes with placeholders expanded at compile time:
//!
//! | Placeholder | Expands to |
//! |---|---|
//! | `{NUMBER}` | house number, optional letter |
//! | `{NAME}` | one to four street-name words (lazy) |
//! | `{SUFFIX}` | street suffix alternation |
//! | `{UNIT}` | apartment / unit designator |
//! | `{CITY}` | known-city alternation |
//! | `{STATE}` | state alternation |
//! | `{ZIP}` | ZIP or ZIP+4 |
//! | `{VARIANT}` | OCR-tolerant street-name variants |
//!
//! All patterns are case-insensitive. Boundary patterns must capture the
//! address in group 1; street patterns may, otherwise the whole match is used.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const NUMBER: &str = r"\d{1,6}[A-Z]?";
const ZIP: &str = r"\d{5}(?:-\d{4})?";
const NAME: &str = r"(?:(?:[A-Z][A-Z'.-]*|\d+(?:ST|ND|RD|TH))\s+){1,4}?";
const UNIT: &str = r"(?:(?:APT|APARTMENT|UNIT|STE|SUITE|#)\.?\s*#?\s*[A-Z0-9-]+)";

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{([A-Z]+)\}").unwrap());

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("Failed to read profile {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid profile: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize profile: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Unknown placeholder {{{placeholder}}} in pattern {id}")]
    UnknownPlaceholder { id: String, placeholder: String },

    #[error("Pattern {id} does not compile: {source}")]
    InvalidPattern {
        id: String,
        #[source]
        source: regex::Error,
    },
}

/// A named extraction pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSpec {
    pub id: String,
    pub pattern: String,
}

impl PatternSpec {
    pub fn new(id: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pattern: pattern.into(),
        }
    }
}

/// An extra OCR correction (whole word, case-insensitive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correction {
    pub from: String,
    pub to: String,
}

/// Jurisdiction data driving normalization, extraction and scrubbing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub name: String,
    /// State abbreviations and names accepted next to a ZIP.
    pub states: Vec<String>,
    /// Known cities; an allow-list for street patterns and the scrubber.
    pub cities: Vec<String>,
    pub street_suffixes: Vec<String>,
    /// Regex fragments for street names OCR tends to mangle.
    pub street_variants: Vec<String>,
    /// Literal names (people, lenders) removed from candidates.
    pub known_names: Vec<String>,
    pub first_names: Vec<String>,
    pub corrections: Vec<Correction>,
    /// Stage 1, in priority order.
    pub boundary_patterns: Vec<PatternSpec>,
    /// Stage 2, in priority order.
    pub street_patterns: Vec<PatternSpec>,
}

impl Default for Profile {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Profile {
    /// The New Hampshire / Georgia profile.
    pub fn builtin() -> Self {
        Self {
            name: "nh-ga".to_string(),
            states: strings(&["NH", "N.H.", "New Hampshire", "GA", "Georgia"]),
            cities: strings(BUILTIN_CITIES),
            street_suffixes: strings(BUILTIN_SUFFIXES),
            street_variants: strings(&[r"SEA?WALL", r"LADY\s?SLIPPER", r"MAM+OTH"]),
            known_names: strings(&[
                "Mortgage Electronic Registration Systems, Inc.",
                "Mortgage Electronic Registration Systems",
                "Federal National Mortgage Association",
                "Federal Home Loan Mortgage Corporation",
            ]),
            first_names: strings(BUILTIN_FIRST_NAMES),
            corrections: Vec::new(),
            boundary_patterns: vec![
                PatternSpec::new(
                    "known_and_numbered",
                    r"known and numbered as\s+(.{6,200}?)\s*,?\s+(?:and\s+)?(?:being\s+)?(?:described as follows|legally described as|more particularly described)",
                ),
                PatternSpec::new(
                    "known_and_numbered_zip",
                    r"known and numbered as\s+(.{6,150}?{STATE}\.?,?\s+{ZIP})\b",
                ),
                PatternSpec::new(
                    "commonly_known_as",
                    r"commonly known as\s*:?\s+(.{6,150}?{STATE}\.?,?\s+{ZIP})\b",
                ),
                PatternSpec::new(
                    "residence_to_zip",
                    r"\bresidence\s*(?:located at|at|of|is)?\s*:?\s+(.{6,150}?{STATE}\.?,?\s+{ZIP})\b",
                ),
                PatternSpec::new(
                    "residence_to_boilerplate",
                    r"\bresidence\s*(?:located at|at|of|is)?\s*:?\s+(.{6,150}?)\s*,?\s+(?:and\s+)?(?:described as follows|legally described as|known and numbered as|commonly known as)",
                ),
                PatternSpec::new(
                    "property_address",
                    r"property address:\s*(.{6,150}?{STATE}\.?,?\s+{ZIP})\b",
                ),
                PatternSpec::new(
                    "located_at",
                    r"\b(?:property|premises|real estate)\s+(?:located|situated)\s+at\s+(.{6,150}?{STATE}\.?,?\s+{ZIP})\b",
                ),
            ],
            street_patterns: vec![
                PatternSpec::new(
                    "street_city_state_zip",
                    r"\b({NUMBER}\s+{NAME}{SUFFIX}(?:\s+{UNIT})?,?\s+(?:[A-Z][A-Z'.-]*,?\s+){1,3}?{STATE}\.?,?\s+{ZIP})\b",
                ),
                PatternSpec::new(
                    "street_known_city",
                    r"\b({NUMBER}\s+{NAME}{SUFFIX}(?:\s+{UNIT})?,?\s+{CITY}\b(?:,?\s+{STATE}\b)?(?:\.?,?\s+{ZIP}\b)?)",
                ),
                PatternSpec::new(
                    "known_street_variant",
                    r"\b({NUMBER}\s+(?:[A-Z]+\s+){0,2}?{VARIANT}\b(?:\s+{SUFFIX})?(?:,?\s+(?:[A-Z][A-Z'.-]*,?\s+){1,3}?{STATE}\.?,?\s+{ZIP}\b)?)",
                ),
            ],
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ProfileError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ProfileError> {
        let text = std::fs::read_to_string(path).map_err(|source| ProfileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String, ProfileError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Expand placeholders and compile every pattern.
    pub fn compile(&self) -> Result<CompiledProfile, ProfileError> {
        let alternations = Alternations {
            state: alternation(&self.states, ""),
            suffix: alternation(&self.street_suffixes, r"\b\.?"),
            city: alternation(&self.cities, ""),
            variant: raw_alternation(&self.street_variants),
        };

        let boundary = compile_specs(&self.boundary_patterns, &alternations)?;
        let street = compile_specs(&self.street_patterns, &alternations)?;
        let state_zip = compile_pattern(
            "state_zip",
            r"\b{STATE}\.?,?\s+{ZIP}\b",
            &alternations,
        )?;
        let street_start = compile_pattern("street_start", r"\b{NUMBER}\s+[A-Z]", &alternations)?;

        Ok(CompiledProfile {
            boundary,
            street,
            state_zip,
            street_start,
            cities: lowercase_set(&self.cities),
            suffixes: lowercase_set(&self.street_suffixes),
            states: lowercase_set(&self.states),
            first_names: lowercase_set(&self.first_names),
            profile: self.clone(),
        })
    }
}

/// A compiled pattern and its position in the stage's priority list.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub id: String,
    pub rank: usize,
    pub regex: Regex,
}

/// A profile with its patterns compiled and word lists indexed.
#[derive(Debug, Clone)]
pub struct CompiledProfile {
    pub boundary: Vec<CompiledPattern>,
    pub street: Vec<CompiledPattern>,
    /// State followed by ZIP, used by the proximity stage.
    pub state_zip: Regex,
    /// A house number followed by a word.
    pub street_start: Regex,
    cities: HashSet<String>,
    suffixes: HashSet<String>,
    states: HashSet<String>,
    first_names: HashSet<String>,
    profile: Profile,
}

impl CompiledProfile {
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn is_city(&self, word: &str) -> bool {
        self.cities.contains(&word.to_lowercase())
    }

    pub fn is_suffix(&self, word: &str) -> bool {
        self.suffixes
            .contains(&word.trim_end_matches('.').to_lowercase())
    }

    pub fn is_state(&self, word: &str) -> bool {
        self.states.contains(&word.to_lowercase())
    }

    pub fn is_first_name(&self, word: &str) -> bool {
        self.first_names.contains(&word.to_lowercase())
    }

    pub fn known_names(&self) -> &[String] {
        &self.profile.known_names
    }

    pub fn first_names(&self) -> &[String] {
        &self.profile.first_names
    }

    pub fn corrections(&self) -> impl Iterator<Item = (&str, &str)> {
        self.profile
            .corrections
            .iter()
            .map(|c| (c.from.as_str(), c.to.as_str()))
    }
}

struct Alternations {
    state: String,
    suffix: String,
    city: String,
    variant: String,
}

fn compile_specs(
    specs: &[PatternSpec],
    alternations: &Alternations,
) -> Result<Vec<CompiledPattern>, ProfileError> {
    specs
        .iter()
        .enumerate()
        .map(|(rank, spec)| {
            Ok(CompiledPattern {
                id: spec.id.clone(),
                rank,
                regex: compile_pattern(&spec.id, &spec.pattern, alternations)?,
            })
        })
        .collect()
}

fn compile_pattern(
    id: &str,
    pattern: &str,
    alternations: &Alternations,
) -> Result<Regex, ProfileError> {
    let mut expanded = String::with_capacity(pattern.len() * 4);
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(pattern) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        expanded.push_str(&pattern[last..whole.start()]);
        let replacement = match name.as_str() {
            "NUMBER" => NUMBER,
            "ZIP" => ZIP,
            "NAME" => NAME,
            "UNIT" => UNIT,
            "STATE" => alternations.state.as_str(),
            "SUFFIX" => alternations.suffix.as_str(),
            "CITY" => alternations.city.as_str(),
            "VARIANT" => alternations.variant.as_str(),
            other => {
                return Err(ProfileError::UnknownPlaceholder {
                    id: id.to_string(),
                    placeholder: other.to_string(),
                })
            }
        };
        expanded.push_str(replacement);
        last = whole.end();
    }
    expanded.push_str(&pattern[last..]);

    Regex::new(&format!("(?i){}", expanded)).map_err(|source| ProfileError::InvalidPattern {
        id: id.to_string(),
        source,
    })
}

/// Escaped alternation, longest first so "AVENUE" wins over "AVE".
fn alternation(words: &[String], tail: &str) -> String {
    let mut words: Vec<&str> = words
        .iter()
        .map(|w| w.trim())
        .filter(|w| !w.is_empty())
        .collect();
    if words.is_empty() {
        // Matches nothing.
        return r"\b\B".to_string();
    }
    words.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    words.dedup();
    let escaped: Vec<String> = words
        .iter()
        .map(|w| regex::escape(w).replace(' ', r"\s+"))
        .collect();
    format!("(?:{}){}", escaped.join("|"), tail)
}

fn raw_alternation(fragments: &[String]) -> String {
    let fragments: Vec<&str> = fragments
        .iter()
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .collect();
    if fragments.is_empty() {
        return r"\b\B".to_string();
    }
    format!("(?:{})", fragments.join("|"))
}

fn lowercase_set(words: &[String]) -> HashSet<String> {
    words.iter().map(|w| w.trim().to_lowercase()).collect()
}

fn strings(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

const BUILTIN_SUFFIXES: &[&str] = &[
    "AVENUE", "AVE", "AV", "STREET", "ST", "ROAD", "RD", "DRIVE", "DR", "LANE", "LN", "COURT",
    "CT", "CIRCLE", "CIR", "BOULEVARD", "BLVD", "PLACE", "PL", "TERRACE", "TER", "WAY", "HIGHWAY",
    "HWY", "PARKWAY", "PKWY", "TRAIL", "TRL", "PIKE", "SQUARE", "SQ", "EXTENSION", "EXT", "RIDGE",
    "RDG", "HILL", "POINT", "PT", "COVE", "CV", "RUN", "PATH", "LOOP", "ROW", "CROSSING", "XING",
    "BEND", "TRACE", "WALK", "GLEN", "HOLLOW", "PLAZA", "ALLEY", "ALY", "ESTATES",
];

const BUILTIN_CITIES: &[&str] = &[
    // New Hampshire
    "Manchester", "Nashua", "Concord", "Derry", "Dover", "Rochester", "Salem", "Merrimack",
    "Hudson", "Londonderry", "Keene", "Bedford", "Portsmouth", "Goffstown", "Laconia", "Hampton",
    "Milford", "Durham", "Exeter", "Windham", "Hooksett", "Claremont", "Lebanon", "Pelham",
    "Somersworth", "Hanover", "Amherst", "Raymond", "Conway", "Berlin", "Newmarket", "Weare",
    "Seabrook", "Barrington", "Hampstead", "Franklin", "Litchfield", "Hollis", "Plaistow", "Bow",
    "Belmont", "Stratham", "Swanzey", "Pembroke", "Rye", "Gilford", "Sandown", "Atkinson",
    "Kingston", "Brookline", "Nottingham", "Epping", "Auburn", "Candia", "Chester", "Danville",
    "Fremont", "Hampton Falls", "New Boston", "Wilton", "Mason", "Greenville",
    // Georgia
    "Atlanta", "Augusta", "Columbus", "Macon", "Savannah", "Athens", "Sandy Springs", "Roswell",
    "Johns Creek", "Albany", "Warner Robins", "Alpharetta", "Marietta", "Valdosta", "Smyrna",
    "Dunwoody", "Brookhaven", "Peachtree City", "Peachtree Corners", "Gainesville", "Newnan",
    "Dalton", "Rome", "Kennesaw", "Lawrenceville", "Duluth", "Stockbridge", "Decatur",
    "Douglasville", "Woodstock", "Canton", "Cumming", "Snellville", "Lilburn", "Norcross",
    "Tucker", "Conyers", "Covington", "McDonough", "Hinesville", "Statesboro", "Carrollton",
    "Griffin", "Buford", "Suwanee", "Acworth", "Loganville", "Hiram", "Powder Springs", "Austell",
    "Fayetteville", "Riverdale", "Jonesboro", "Union City", "East Point", "College Park",
    "Stone Mountain", "Lithonia", "Ellenwood",
];

const BUILTIN_FIRST_NAMES: &[&str] = &[
    "James", "John", "Robert", "Michael", "William", "David", "Richard", "Joseph", "Thomas",
    "Charles", "Christopher", "Daniel", "Matthew", "Anthony", "Donald", "Mark", "Paul", "Steven",
    "Kenneth", "Joshua", "Kevin", "Brian", "George", "Timothy", "Ronald", "Edward", "Jason",
    "Jeffrey", "Ryan", "Jacob", "Gary", "Nicholas", "Eric", "Jonathan", "Stephen", "Larry",
    "Justin", "Scott", "Brandon", "Benjamin", "Samuel", "Gregory", "Patrick", "Dennis", "Jerry",
    "Tyler", "Aaron", "Henry", "Douglas", "Peter", "Adam", "Nathan", "Zachary", "Walter", "Kyle",
    "Harold", "Carl", "Jeremy", "Keith", "Roger", "Gerald", "Ethan", "Arthur", "Terry", "Sean",
    "Joe", "Noah", "Jesse", "Albert", "Bryan", "Billy", "Bruce", "Willie", "Dylan", "Alan",
    "Ralph", "Gabriel", "Roy", "Juan", "Wayne", "Eugene", "Logan", "Randy", "Louis", "Russell",
    "Vincent", "Philip", "Bobby", "Johnny", "Bradley", "Mary", "Patricia", "Jennifer", "Linda",
    "Elizabeth", "Barbara", "Susan", "Jessica", "Sarah", "Karen", "Nancy", "Lisa", "Betty",
    "Margaret", "Sandra", "Ashley", "Kimberly", "Emily", "Donna", "Michelle", "Dorothy", "Carol",
    "Amanda", "Melissa", "Deborah", "Stephanie", "Rebecca", "Sharon", "Laura", "Cynthia",
    "Kathleen", "Amy", "Shirley", "Angela", "Helen", "Anna", "Brenda", "Pamela", "Nicole",
    "Emma", "Samantha", "Katherine", "Christine", "Debra", "Rachel", "Catherine", "Carolyn",
    "Janet", "Ruth", "Maria", "Heather", "Diane", "Julie", "Joyce", "Victoria", "Olivia", "Kelly",
    "Christina", "Lauren", "Joan", "Evelyn", "Judith", "Megan", "Cheryl", "Andrea", "Hannah",
    "Martha", "Jacqueline", "Frances", "Gloria", "Ann", "Teresa", "Kathryn", "Sara", "Janice",
    "Jean", "Alice", "Doris", "Abigail", "Julia", "Judy", "Denise", "Amber", "Marilyn", "Beverly",
    "Danielle", "Theresa", "Sophia", "Marie", "Diana", "Brittany", "Natalie", "Isabella",
    "Alexis", "Kayla",
];
