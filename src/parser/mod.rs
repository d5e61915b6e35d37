pub mod assemble;
pub mod formulas;
pub mod lines;
pub mod rules;
pub mod sections;

use thiserror::Error;

pub use assemble::{DocumentKey, ProcessedDocument};
pub use rules::{HeadingRules, SectionName};

#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("no document text to segment")]
    EmptyInput,
    #[error("heading rule for '{section}' does not compile: {source}")]
    InvalidRule {
        section: SectionName,
        #[source]
        source: regex::Error,
    },
    #[error("section '{0}' cannot have a heading rule")]
    UnheadedSection(SectionName),
}

/// Two-pass segmentation: lines → section buckets + formulas → document.
pub fn segment_text(
    text: &str,
    rules: &HeadingRules,
    keep_other: bool,
) -> Result<ProcessedDocument, SegmentError> {
    if text.is_empty() {
        return Err(SegmentError::EmptyInput);
    }
    let lines = lines::split_lines(text);
    let buckets = sections::SectionClassifier::new(rules).classify(&lines);
    let formulas = formulas::extract_formulas(&lines);
    tracing::debug!(
        lines = buckets.line_count(),
        formulas = formulas.len(),
        "Classified document"
    );
    Ok(assemble::assemble(&buckets, &formulas, keep_other))
}
