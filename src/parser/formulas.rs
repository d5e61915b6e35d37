use std::sync::LazyLock;

use regex::Regex;

use super::lines::Line;

static FORMULA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Za-z]\s*=\s*[^=]+)|(\b\d+\s*[\+\-\*/]\s*\d+\b)").unwrap()
});

/// Trimmed formula-looking lines in document order. Duplicates are kept.
pub type FormulaSet = Vec<String>;

pub fn looks_like_formula(line: &str) -> bool {
    FORMULA_RE.is_match(line)
}

/// Independent pass over all lines; section state plays no part.
pub fn extract_formulas(lines: &[Line<'_>]) -> FormulaSet {
    lines
        .iter()
        .filter(|line| looks_like_formula(line.raw))
        .map(|line| line.trimmed().to_string())
        .collect()
}
