use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::SegmentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionName {
    Abstract,
    Introduction,
    Methods,
    Results,
    Discussion,
    Conclusion,
    References,
    Other,
}

impl SectionName {
    pub const ALL: [SectionName; 8] = [
        SectionName::Abstract,
        SectionName::Introduction,
        SectionName::Methods,
        SectionName::Results,
        SectionName::Discussion,
        SectionName::Conclusion,
        SectionName::References,
        SectionName::Other,
    ];

    /// Sections a heading can open, in rule evaluation order.
    pub const HEADED: [SectionName; 7] = [
        SectionName::Abstract,
        SectionName::Introduction,
        SectionName::Methods,
        SectionName::Results,
        SectionName::Discussion,
        SectionName::Conclusion,
        SectionName::References,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SectionName::Abstract => "abstract",
            SectionName::Introduction => "introduction",
            SectionName::Methods => "methods",
            SectionName::Results => "results",
            SectionName::Discussion => "discussion",
            SectionName::Conclusion => "conclusion",
            SectionName::References => "references",
            SectionName::Other => "other",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for SectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SectionName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SectionName::ALL
            .into_iter()
            .find(|name| name.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown section '{}'", s))
    }
}

const BUILTIN_PATTERNS: [(SectionName, &str); 7] = [
    (SectionName::Abstract, "abstract"),
    (SectionName::Introduction, "introduction"),
    (SectionName::Methods, "materials and methods|methods?|methodology"),
    (SectionName::Results, "results?"),
    (SectionName::Discussion, "discussion"),
    (SectionName::Conclusion, "conclusions?"),
    (SectionName::References, "references?"),
];

#[derive(Debug, Clone)]
pub struct HeadingRule {
    pub section: SectionName,
    pub pattern: Regex,
}

impl HeadingRule {
    /// Anchors `body` at the start of the line, case-insensitive, ending on a word boundary.
    fn compile(section: SectionName, body: &str) -> Result<Self, SegmentError> {
        let pattern = Regex::new(&format!(r"(?i)^\s*(?:{})\b", body))
            .map_err(|source| SegmentError::InvalidRule { section, source })?;
        Ok(HeadingRule { section, pattern })
    }

    pub fn matches(&self, line: &str) -> bool {
        self.pattern.is_match(line)
    }
}

/// Ordered heading rules, compiled once and shared across classifier runs.
#[derive(Debug, Clone)]
pub struct HeadingRules {
    rules: Vec<HeadingRule>,
}

impl HeadingRules {
    pub fn standard() -> Result<Self, SegmentError> {
        Self::with_overrides(&HashMap::new())
    }

    /// Built-in table with the pattern body replaced for any section present in
    /// `overrides`. Evaluation order never changes. `Other` cannot carry a rule.
    pub fn with_overrides(overrides: &HashMap<SectionName, String>) -> Result<Self, SegmentError> {
        if overrides.contains_key(&SectionName::Other) {
            return Err(SegmentError::UnheadedSection(SectionName::Other));
        }
        let rules = BUILTIN_PATTERNS
            .iter()
            .map(|&(section, body)| {
                let body = overrides.get(&section).map(String::as_str).unwrap_or(body);
                HeadingRule::compile(section, body)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(HeadingRules { rules })
    }

    /// First rule (in declared order) matching the start of `line`.
    pub fn detect(&self, line: &str) -> Option<SectionName> {
        self.iter()
            .find(|rule| rule.matches(line))
            .map(|rule| rule.section)
    }

    pub fn iter(&self) -> impl Iterator<Item = &HeadingRule> {
        self.rules.iter()
    }
}
