//! Per-pattern match log, written into the diagnostics file so regex
//! changes can be audited against saved documents.

use std::fmt::Write as _;

use serde::Serialize;

use super::Stage;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEntry {
    pub stage: Stage,
    pub pattern_id: String,
    pub matched: bool,
    /// First capture of the pattern, before cleaning.
    pub capture: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PatternTrace {
    entries: Vec<TraceEntry>,
}

impl PatternTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, stage: Stage, pattern_id: &str, capture: Option<&str>) {
        self.entries.push(TraceEntry {
            stage,
            pattern_id: pattern_id.to_string(),
            matched: capture.is_some(),
            capture: capture.map(str::to_string),
        });
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn matched(&self) -> impl Iterator<Item = &TraceEntry> {
        self.entries.iter().filter(|e| e.matched)
    }

    /// Whether `stage` was evaluated at all.
    pub fn reached(&self, stage: Stage) -> bool {
        self.entries.iter().any(|e| e.stage == stage)
    }

    /// One line per evaluated pattern.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            let _ = match &entry.capture {
                Some(capture) => writeln!(
                    out,
                    "[{}] {}: MATCH -> {}",
                    entry.stage, entry.pattern_id, capture
                ),
                None => writeln!(out, "[{}] {}: no match", entry.stage, entry.pattern_id),
            };
        }
        out
    }
}
