use super::lines::Line;
use super::rules::{HeadingRules, SectionName};

/// Per-section line buffers produced by one classifier pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionBuckets {
    buckets: [Vec<String>; 8],
}

impl SectionBuckets {
    pub fn get(&self, name: SectionName) -> &[String] {
        &self.buckets[name.index()]
    }

    fn push(&mut self, name: SectionName, line: &str) {
        self.buckets[name.index()].push(line.to_string());
    }

    /// Total number of lines across every bucket, `other` included.
    pub fn line_count(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SectionName, &[String])> {
        SectionName::ALL
            .into_iter()
            .map(move |name| (name, self.get(name)))
    }
}

/// The only state carried from one line to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentationState {
    pub current: SectionName,
}

impl Default for SegmentationState {
    fn default() -> Self {
        SegmentationState {
            current: SectionName::Other,
        }
    }
}

pub struct SectionClassifier<'r> {
    rules: &'r HeadingRules,
}

impl<'r> SectionClassifier<'r> {
    pub fn new(rules: &'r HeadingRules) -> Self {
        SectionClassifier { rules }
    }

    /// Assign every non-blank line to the section open at that point.
    /// A heading line belongs to the section it opens.
    pub fn classify(&self, lines: &[Line<'_>]) -> SectionBuckets {
        let mut state = SegmentationState::default();
        let mut buckets = SectionBuckets::default();

        for line in lines {
            if line.is_blank() {
                continue;
            }
            let text = line.trimmed();
            if let Some(section) = self.rules.detect(text) {
                state.current = section;
            }
            buckets.push(state.current, text);
        }

        buckets
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::lines::split_lines;

    fn classify(text: &str) -> SectionBuckets {
        let rules = HeadingRules::standard().unwrap();
        SectionClassifier::new(&rules).classify(&split_lines(text))
    }

    #[test]
    fn sticky_section() {
        let b = classify("Methods\nfoo bar\nbaz");
        assert_eq!(b.get(SectionName::Methods), ["Methods", "foo bar", "baz"]);
        assert!(b.get(SectionName::Other).is_empty());
    }

    #[test]
    fn heading_included_in_its_section() {
        let b = classify("Introduction\nWe propose...");
        assert_eq!(b.get(SectionName::Introduction), ["Introduction", "We propose..."]);
    }

    #[test]
    fn methodology_is_methods() {
        let b = classify("Methodology and Materials");
        assert_eq!(b.get(SectionName::Methods), ["Methodology and Materials"]);
    }

    #[test]
    fn no_headings_all_other() {
        let b = classify("Random paragraph\nthat matches nothing");
        assert_eq!(b.get(SectionName::Other).len(), 2);
        assert_eq!(b.line_count(), 2);
    }

    #[test]
    fn preamble_goes_to_other() {
        let b = classify("Training language models\nOuyang et al.\nAbstract\nWe fine-tune.");
        assert_eq!(b.get(SectionName::Other), ["Training language models", "Ouyang et al."]);
        assert_eq!(b.get(SectionName::Abstract), ["Abstract", "We fine-tune."]);
    }

    #[test]
    fn blank_lines_skipped_and_lines_trimmed() {
        let b = classify("\n   \n  Results  \n\n\t42 percent better\n");
        assert_eq!(b.get(SectionName::Results), ["Results", "42 percent better"]);
        assert_eq!(b.line_count(), 2);
    }

    #[test]
    fn heading_with_inline_content() {
        let b = classify("Abstract We study X.\nMore text.");
        assert_eq!(b.get(SectionName::Abstract), ["Abstract We study X.", "More text."]);
    }

    #[test]
    fn later_heading_switches_back() {
        let b = classify("Results\nr1\nDiscussion\nd1\nResults again\nr2");
        assert_eq!(b.get(SectionName::Results), ["Results", "r1", "Results again", "r2"]);
        assert_eq!(b.get(SectionName::Discussion), ["Discussion", "d1"]);
    }

    #[test]
    fn exhaustive_over_non_blank_lines() {
        let text = std::fs::read_to_string("tests/fixtures/instructgpt.txt").unwrap();
        let non_blank = text.lines().filter(|l| !l.trim().is_empty()).count();
        let b = classify(&text);
        assert_eq!(b.line_count(), non_blank);
    }

    #[test]
    fn idempotent() {
        let text = std::fs::read_to_string("tests/fixtures/instructgpt.txt").unwrap();
        assert_eq!(classify(&text), classify(&text));
    }

    #[test]
    fn fixture_sections() {
        let text = std::fs::read_to_string("tests/fixtures/instructgpt.txt").unwrap();
        let b = classify(&text);
        for name in SectionName::HEADED {
            assert!(!b.get(name).is_empty(), "empty section {}", name);
        }
        assert!(b.get(SectionName::Abstract)[0].starts_with("Abstract"));
        assert!(b.get(SectionName::References).iter().any(|l| l.contains("Ziegler")));
    }
}
