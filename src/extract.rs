use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

/// Extract page texts from `path`. PDFs go through `pdf-extract`; `.txt` and
/// `.md` files are read as a single already-extracted page.
pub fn extract_pages(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        bail!("Document not found at {:?}", path);
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if ext == "txt" || ext == "md" {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {:?}", path))?;
        return Ok(vec![text]);
    }

    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    if !is_pdf(&bytes) {
        bail!("{:?} is not a PDF file", path);
    }
    let pages = pdf_extract::extract_text_from_mem_by_pages(&bytes)
        .with_context(|| format!("Failed to extract text from {:?}", path))?;

    let blank = pages.iter().filter(|p| p.trim().is_empty()).count();
    if blank > 0 {
        warn!("{} of {} pages had no extractable text", blank, pages.len());
    }
    info!("Extracted {} pages from {:?}", pages.len(), path);
    Ok(pages)
}

pub fn join_pages(pages: &[String]) -> String {
    pages.join("\n")
}

fn is_pdf(head: &[u8]) -> bool {
    head.starts_with(b"%PDF-")
}

/// Stable document id from a file name: lowercase stem, runs of
/// non-alphanumerics collapsed to a single `-`.
pub fn document_id(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    let mut id = String::with_capacity(stem.len());
    for c in stem.chars() {
        if c.is_alphanumeric() {
            id.extend(c.to_lowercase());
        } else if !id.is_empty() && !id.ends_with('-') {
            id.push('-');
        }
    }
    let id = id.trim_end_matches('-');
    if id.is_empty() {
        "document".to_string()
    } else {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_from_file_names() {
        assert_eq!(document_id(Path::new("include/2203.02155v1.pdf")), "2203-02155v1");
        assert_eq!(document_id(Path::new("My Paper (final).pdf")), "my-paper-final");
        assert_eq!(document_id(Path::new("__.pdf")), "document");
    }

    #[test]
    fn pages_joined_by_newline() {
        let pages = vec!["Abstract".to_string(), String::new(), "Introduction".to_string()];
        assert_eq!(join_pages(&pages), "Abstract\n\nIntroduction");
    }

    #[test]
    fn missing_file() {
        let err = extract_pages(Path::new("/nonexistent/paper.pdf")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn text_file_is_one_page() {
        let pages = extract_pages(Path::new("tests/fixtures/instructgpt.txt")).unwrap();
        assert_eq!(pages.len(), 1);
        assert!(pages[0].contains("Abstract"));
    }

    #[test]
    fn non_pdf_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.pdf");
        std::fs::write(&path, b"hello").unwrap();
        assert!(extract_pages(&path).is_err());
    }
}
