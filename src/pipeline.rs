use std::path::Path;

use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::db::{self, SlotWrite};
use crate::extract;
use crate::parser::{self, HeadingRules, ProcessedDocument};
use crate::summarizer::Summarizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extract,
    Segment,
    Summarize,
}

impl Stage {
    pub fn input_slot(self) -> Option<&'static str> {
        match self {
            Stage::Extract => None,
            Stage::Segment => Some(db::RAW_TEXT),
            Stage::Summarize => Some(db::SECTIONS),
        }
    }

    pub fn output_slot(self) -> &'static str {
        match self {
            Stage::Extract => db::RAW_TEXT,
            Stage::Segment => db::SECTIONS,
            Stage::Summarize => db::SUMMARY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Done,
    /// Output slot already filled and `force` was not set.
    Skipped,
}

/// Options shared by the segmentation entry points.
pub struct SegmentOptions<'a> {
    pub rules: &'a HeadingRules,
    pub keep_other: bool,
    pub force: bool,
}

fn should_skip(conn: &Connection, doc_id: &str, stage: Stage, force: bool) -> Result<bool> {
    if force || !db::has_slot(conn, doc_id, stage.output_slot())? {
        return Ok(false);
    }
    info!(doc = doc_id, stage = ?stage, "Output slot already filled, skipping");
    Ok(true)
}

fn read_input(conn: &Connection, doc_id: &str, stage: Stage) -> Result<String> {
    let slot = stage.input_slot().unwrap_or(db::RAW_TEXT);
    db::get_slot(conn, doc_id, slot)?
        .with_context(|| format!("No '{}' slot for document '{}'", slot, doc_id))
}

// ── Stage 1 ──

/// Extract a document's text into the `raw_text` slot. Returns the document id.
/// An id already bound to a different source file is rejected.
pub fn run_extract(conn: &Connection, path: &Path, force: bool) -> Result<(String, StageOutcome)> {
    let doc_id = extract::document_id(path);
    let source = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let source = source.to_string_lossy();
    if let Some(existing) = db::document_source(conn, &doc_id)? {
        if existing != source {
            bail!(
                "Document id '{}' already belongs to {}; rename {:?} to extract it separately",
                doc_id,
                existing,
                path
            );
        }
    }
    db::upsert_document(conn, &doc_id, &source)?;
    if should_skip(conn, &doc_id, Stage::Extract, force)? {
        return Ok((doc_id, StageOutcome::Skipped));
    }

    let pages = extract::extract_pages(path)?;
    let text = extract::join_pages(&pages);
    db::put_slot(conn, &doc_id, db::RAW_TEXT, &text)?;
    info!(doc = %doc_id, pages = pages.len(), chars = text.len(), "Extracted");
    Ok((doc_id, StageOutcome::Done))
}

// ── Stage 2 ──

fn segment_to_json(text: &str, opts: &SegmentOptions<'_>) -> Result<(ProcessedDocument, String)> {
    let doc = parser::segment_text(text, opts.rules, opts.keep_other)?;
    let json = serde_json::to_string_pretty(&doc)?;
    Ok((doc, json))
}

pub fn run_segment(conn: &Connection, doc_id: &str, opts: &SegmentOptions<'_>) -> Result<StageOutcome> {
    if should_skip(conn, doc_id, Stage::Segment, opts.force)? {
        return Ok(StageOutcome::Skipped);
    }
    let text = read_input(conn, doc_id, Stage::Segment)?;
    let (doc, json) = segment_to_json(&text, opts)
        .with_context(|| format!("Segmentation failed for '{}'", doc_id))?;
    db::put_slot(conn, doc_id, db::SECTIONS, &json)?;
    if doc.is_empty() {
        warn!(doc = doc_id, "Segmentation produced an empty document");
    }
    let missing = doc.missing_sections();
    if !missing.is_empty() {
        debug!(doc = doc_id, ?missing, "Sections not found");
    }
    info!(doc = doc_id, formulas = doc.formulas.lines().count(), "Segmented");
    Ok(StageOutcome::Done)
}

pub struct SegmentCounts {
    pub documents: usize,
    pub failed: usize,
}

/// Segment every document whose `raw_text` has no `sections` yet.
/// Documents are independent, so each chunk is classified in parallel.
pub fn segment_pending(
    conn: &Connection,
    opts: &SegmentOptions<'_>,
    limit: Option<usize>,
) -> Result<SegmentCounts> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let pending = db::fetch_pending(conn, db::RAW_TEXT, db::SECTIONS, limit)?;
    let mut counts = SegmentCounts {
        documents: 0,
        failed: 0,
    };
    if pending.is_empty() {
        return Ok(counts);
    }

    let pb = ProgressBar::new(pending.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    for chunk in pending.chunks(100) {
        let results: Vec<_> = chunk
            .par_iter()
            .map(|p| (p.doc_id.as_str(), segment_to_json(&p.body, opts)))
            .collect();

        let mut rows = Vec::with_capacity(results.len());
        for (doc_id, result) in results {
            match result {
                Ok((_, json)) => rows.push(SlotWrite {
                    doc_id: doc_id.to_string(),
                    name: db::SECTIONS,
                    body: json,
                }),
                Err(e) => {
                    pb.suspend(|| warn!(doc = doc_id, "Segmentation failed: {:#}", e));
                    counts.failed += 1;
                }
            }
        }

        counts.documents += rows.len();
        db::put_slots(conn, &rows)?;
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    Ok(counts)
}

// ── Stage 3 ──

pub async fn run_summarize<S: Summarizer>(
    conn: &Connection,
    doc_id: &str,
    summarizer: &S,
    force: bool,
) -> Result<StageOutcome> {
    if should_skip(conn, doc_id, Stage::Summarize, force)? {
        return Ok(StageOutcome::Skipped);
    }
    let json = read_input(conn, doc_id, Stage::Summarize)?;
    let doc: ProcessedDocument = serde_json::from_str(&json)
        .with_context(|| format!("Stored sections for '{}' are not valid JSON", doc_id))?;

    let summary = summarizer
        .summarize(&doc)
        .await
        .with_context(|| format!("Summarization failed for '{}'", doc_id))?;
    db::put_slot(conn, doc_id, db::SUMMARY, &summary)?;
    info!(doc = doc_id, chars = summary.len(), "Summarized");
    Ok(StageOutcome::Done)
}

pub struct SummarizeReport {
    pub outcomes: Vec<(String, StageOutcome)>,
    pub failed: usize,
}

/// Summarize each document in turn. A failure is logged and counted, and the
/// remaining documents are still attempted.
pub async fn summarize_each<S: Summarizer>(
    conn: &Connection,
    doc_ids: &[String],
    summarizer: &S,
    force: bool,
) -> SummarizeReport {
    let mut report = SummarizeReport {
        outcomes: Vec::with_capacity(doc_ids.len()),
        failed: 0,
    };
    for doc_id in doc_ids {
        match run_summarize(conn, doc_id, summarizer, force).await {
            Ok(outcome) => report.outcomes.push((doc_id.clone(), outcome)),
            Err(e) => {
                warn!(doc = doc_id.as_str(), "{:#}", e);
                report.failed += 1;
            }
        }
    }
    report
}

/// Extract → segment → summarize for one file. Returns the document id.
pub async fn run_all<S: Summarizer>(
    conn: &Connection,
    path: &Path,
    opts: &SegmentOptions<'_>,
    summarizer: &S,
) -> Result<String> {
    let (doc_id, extracted) = run_extract(conn, path, opts.force)?;
    // A fresh extraction invalidates downstream slots.
    let force = opts.force || extracted == StageOutcome::Done;
    let seg_opts = SegmentOptions { force, ..*opts };
    run_segment(conn, &doc_id, &seg_opts)?;
    run_summarize(conn, &doc_id, summarizer, force).await?;
    Ok(doc_id)
}
