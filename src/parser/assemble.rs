use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::formulas::FormulaSet;
use super::rules::SectionName;
use super::sections::SectionBuckets;

/// Segmented paper as handed to the summarization stage.
///
/// Serializes to exactly eight keys. `other` is only present when the run was
/// configured to retain unclassified content for auditing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedDocument {
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub introduction: String,
    pub methods: String,
    pub results: String,
    pub discussion: String,
    pub conclusion: String,
    pub references: String,
    pub formulas: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other: Option<String>,
}

impl ProcessedDocument {
    pub fn get(&self, name: SectionName) -> Option<&str> {
        match name {
            SectionName::Abstract => Some(&self.abstract_text),
            SectionName::Introduction => Some(&self.introduction),
            SectionName::Methods => Some(&self.methods),
            SectionName::Results => Some(&self.results),
            SectionName::Discussion => Some(&self.discussion),
            SectionName::Conclusion => Some(&self.conclusion),
            SectionName::References => Some(&self.references),
            SectionName::Other => self.other.as_deref(),
        }
    }

    fn slot_mut(&mut self, name: SectionName) -> &mut String {
        match name {
            SectionName::Abstract => &mut self.abstract_text,
            SectionName::Introduction => &mut self.introduction,
            SectionName::Methods => &mut self.methods,
            SectionName::Results => &mut self.results,
            SectionName::Discussion => &mut self.discussion,
            SectionName::Conclusion => &mut self.conclusion,
            SectionName::References => &mut self.references,
            SectionName::Other => self.other.get_or_insert_with(String::new),
        }
    }

    pub fn field(&self, key: DocumentKey) -> Option<&str> {
        match key {
            DocumentKey::Section(name) => self.get(name),
            DocumentKey::Formulas => Some(&self.formulas),
        }
    }

    /// Headed sections that came out empty.
    pub fn missing_sections(&self) -> Vec<SectionName> {
        SectionName::HEADED
            .into_iter()
            .filter(|&name| self.get(name).is_some_and(str::is_empty))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.missing_sections().len() == SectionName::HEADED.len()
            && self.formulas.is_empty()
            && self.other.as_deref().map_or(true, str::is_empty)
    }
}

/// Any key of a serialized document: a section, or `formulas`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKey {
    Section(SectionName),
    Formulas,
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKey::Section(name) => fmt::Display::fmt(name, f),
            DocumentKey::Formulas => f.write_str("formulas"),
        }
    }
}

impl FromStr for DocumentKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("formulas") {
            return Ok(DocumentKey::Formulas);
        }
        s.parse::<SectionName>()
            .map(DocumentKey::Section)
            .map_err(|_| format!("unknown document key '{}'", s))
    }
}

fn join_trimmed(lines: &[String]) -> String {
    lines.join("\n").trim().to_string()
}

pub fn assemble(buckets: &SectionBuckets, formulas: &FormulaSet, keep_other: bool) -> ProcessedDocument {
    let mut doc = ProcessedDocument::default();
    for (name, lines) in buckets.iter() {
        if name == SectionName::Other && !keep_other {
            continue;
        }
        *doc.slot_mut(name) = join_trimmed(lines);
    }
    doc.formulas = join_trimmed(formulas);
    doc
}

// ── Tests ──
