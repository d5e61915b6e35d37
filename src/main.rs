mod config;
mod db;
mod extract;
mod parser;
mod pipeline;
mod summarizer;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use crate::parser::{DocumentKey, ProcessedDocument};
use crate::pipeline::{SegmentOptions, StageOutcome};
use crate::summarizer::AzureOpenAi;

#[derive(Parser)]
#[command(name = "paper_digest", about = "PDF paper → sections → LLM summary")]
struct Cli {
    /// SQLite database holding the stage slots
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Configuration file (TOML/JSON/YAML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract raw text from PDFs into the raw_text slot
    Extract {
        files: Vec<PathBuf>,
        /// Re-extract even if the slot is filled
        #[arg(long)]
        force: bool,
    },
    /// Split extracted text into sections
    Segment {
        /// Only this document (default: every pending document)
        #[arg(long)]
        doc: Option<String>,
        /// Max documents to segment
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        #[arg(long)]
        force: bool,
        /// Keep unclassified lines under an `other` key
        #[arg(long)]
        keep_other: bool,
    },
    /// Summarize segmented documents with the LLM
    Summarize {
        #[arg(long)]
        doc: Option<String>,
        /// Also write the summary to this file (single document only)
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long)]
        force: bool,
    },
    /// Extract + segment + summarize one file
    Run {
        file: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long)]
        force: bool,
        #[arg(long)]
        keep_other: bool,
    },
    /// Print one slot of a document
    Show {
        doc: String,
        /// raw_text, sections or summary
        #[arg(long, default_value = db::SUMMARY)]
        slot: String,
        /// Print a single key of the sections slot (a section name or `formulas`)
        #[arg(long, conflicts_with = "slot")]
        section: Option<DocumentKey>,
    },
    /// List documents and their filled slots
    List,
    /// Show pipeline statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = config::load(cli.config.as_deref())?;
    let db_path = cli.db.clone().unwrap_or_else(|| settings.database.path.clone());
    let conn = db::connect(&db_path)?;
    db::init_schema(&conn)?;

    let result = match cli.command {
        Commands::Extract { files, force } => {
            if files.is_empty() {
                bail!("No input files given");
            }
            for file in &files {
                let (doc_id, outcome) = pipeline::run_extract(&conn, file, force)?;
                println!("{:<32} {}", doc_id, outcome_label(outcome));
            }
            Ok(())
        }
        Commands::Segment { doc, limit, force, keep_other } => {
            let rules = settings.segmentation.heading_rules()?;
            let opts = SegmentOptions {
                rules: &rules,
                keep_other: keep_other || settings.segmentation.keep_other,
                force,
            };
            match doc {
                Some(doc_id) => {
                    let outcome = pipeline::run_segment(&conn, &doc_id, &opts)?;
                    println!("{:<32} {}", doc_id, outcome_label(outcome));
                }
                None => {
                    if force {
                        bail!("--force needs --doc; pending documents are never forced");
                    }
                    let counts = pipeline::segment_pending(&conn, &opts, limit)?;
                    if counts.documents + counts.failed == 0 {
                        println!("No pending documents. Run 'extract' first.");
                    } else {
                        println!("Segmented {} documents ({} failed).", counts.documents, counts.failed);
                    }
                }
            }
            Ok(())
        }
        Commands::Summarize { doc, out, force } => {
            let summarizer = AzureOpenAi::new(settings.summarizer.clone())?;
            let doc_ids = match doc {
                Some(id) => vec![id],
                None => db::fetch_pending(&conn, db::SECTIONS, db::SUMMARY, None)?
                    .into_iter()
                    .map(|p| p.doc_id)
                    .collect(),
            };
            if doc_ids.is_empty() {
                println!("Nothing to summarize. Run 'segment' first.");
                return Ok(());
            }
            if out.is_some() && doc_ids.len() > 1 {
                bail!("--out needs a single document (use --doc)");
            }
            let report = pipeline::summarize_each(&conn, &doc_ids, &summarizer, force).await;
            for (doc_id, outcome) in &report.outcomes {
                println!("{:<32} {}", doc_id, outcome_label(*outcome));
                if let Some(path) = &out {
                    write_summary(&conn, doc_id, path)?;
                }
            }
            if report.failed > 0 {
                bail!("{} of {} documents failed to summarize", report.failed, doc_ids.len());
            }
            Ok(())
        }
        Commands::Run { file, out, force, keep_other } => {
            let rules = settings.segmentation.heading_rules()?;
            let summarizer = AzureOpenAi::new(settings.summarizer.clone())?;
            let opts = SegmentOptions {
                rules: &rules,
                keep_other: keep_other || settings.segmentation.keep_other,
                force,
            };
            let doc_id = pipeline::run_all(&conn, &file, &opts, &summarizer).await?;
            let summary = db::get_slot(&conn, &doc_id, db::SUMMARY)?.unwrap_or_default();
            println!("\n===== LLM SUMMARY START =====\n");
            println!("{}", summary);
            println!("\n===== LLM SUMMARY END =====\n");
            if let Some(path) = &out {
                write_summary(&conn, &doc_id, path)?;
            }
            Ok(())
        }
        Commands::Show { doc, section: Some(section), .. } => {
            let json = db::get_slot(&conn, &doc, db::SECTIONS)?
                .with_context(|| format!("'{}' has not been segmented", doc))?;
            let processed: ProcessedDocument = serde_json::from_str(&json)?;
            match processed.field(section) {
                Some(text) if !text.is_empty() => println!("{}", text),
                Some(_) => println!("Section '{}' is empty.", section),
                None => println!("Section '{}' was not retained (segment with --keep-other).", section),
            }
            Ok(())
        }
        Commands::Show { doc, slot, section: None } => {
            if !db::SLOT_NAMES.contains(&slot.as_str()) {
                bail!("Unknown slot '{}' (expected one of {:?})", slot, db::SLOT_NAMES);
            }
            if !db::document_exists(&conn, &doc)? {
                bail!("Unknown document '{}'", doc);
            }
            match db::get_slot(&conn, &doc, &slot)? {
                Some(body) => println!("{}", body),
                None => println!("Slot '{}' of '{}' is empty.", slot, doc),
            }
            Ok(())
        }
        Commands::List => {
            let rows = db::list_documents(&conn)?;
            if rows.is_empty() {
                println!("No documents.");
                return Ok(());
            }
            println!("{:<32} | {:<28} | {:<19} | {}", "Document", "Slots", "Updated", "Source");
            println!("{}", "-".repeat(110));
            for r in &rows {
                let updated = r
                    .last_update
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".into());
                println!(
                    "{:<32} | {:<28} | {:<19} | {}",
                    truncate(&r.id, 32),
                    r.slots.join(","),
                    updated,
                    r.source_path
                );
            }
            Ok(())
        }
        Commands::Stats => {
            let s = db::get_stats(&conn)?;
            println!("Documents:  {}", s.documents);
            println!("Extracted:  {}", s.extracted);
            println!("Segmented:  {}", s.segmented);
            println!("Summarized: {}", s.summarized);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn outcome_label(outcome: StageOutcome) -> &'static str {
    match outcome {
        StageOutcome::Done => "done",
        StageOutcome::Skipped => "skipped (already present)",
    }
}

fn write_summary(conn: &rusqlite::Connection, doc_id: &str, path: &Path) -> anyhow::Result<()> {
    let summary = db::get_slot(conn, doc_id, db::SUMMARY)?
        .with_context(|| format!("No summary for '{}'", doc_id))?;
    std::fs::write(path, summary).with_context(|| format!("Failed to write {:?}", path))?;
    println!("Summary written to {}", path.display());
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
