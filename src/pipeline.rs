use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use rusqlite::Connection;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::db::{self, Outcome, PlantRecord};
use crate::error::FetchError;
use crate::fetch::Fetch;
use crate::parser::{self, PageData};

/// Where mapped records go.
pub enum Sink<'a> {
    Store(&'a Connection),
    /// Dry run: print each page as JSON, touch no storage.
    Print,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub total: usize,
    pub inserted: usize,
    pub existing: usize,
    pub rejected: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RunStats {
    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Inserted => self.inserted += 1,
            Outcome::AlreadyExists => self.existing += 1,
            Outcome::Rejected(_) => self.rejected += 1,
            Outcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn print(&self) {
        println!(
            "Done: {} total ({} inserted, {} existing, {} rejected, {} failed, {} skipped).",
            self.total, self.inserted, self.existing, self.rejected, self.failed, self.skipped,
        );
    }
}

enum PageResult {
    Fetched(PageData),
    Skipped { url: String, error: FetchError },
}

/// Fetch and map pages concurrently; every result funnels through this task,
/// so writes to `sink` are serialized.
pub async fn run_pipeline<F: Fetch>(
    sink: Sink<'_>,
    fetcher: Arc<F>,
    urls: Vec<String>,
    concurrency: usize,
) -> Result<RunStats> {
    let concurrency = concurrency.max(1);
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let total = urls.len();

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let (tx, mut rx) = tokio::sync::mpsc::channel::<PageResult>(concurrency * 2);

    for url in urls {
        let fetcher = Arc::clone(&fetcher);
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();

        tokio::spawn(async move {
            let Ok(_permit) = sem.acquire_owned().await else {
                return;
            };
            let fetched = fetcher.fetch(&url).await;
            let result = match fetched {
                Ok(html) => PageResult::Fetched(parser::process_page(&html, &url)),
                Err(error) => PageResult::Skipped { url, error },
            };
            let _ = tx.send(result).await;
        });
    }

    // rx closes once every spawned task has dropped its sender
    drop(tx);

    let mut stats = RunStats {
        total,
        ..Default::default()
    };

    while let Some(result) = rx.recv().await {
        match result {
            PageResult::Skipped { url, error } => {
                warn!("Skipping {}: {}", url, error);
                stats.skipped += 1;
            }
            PageResult::Fetched(page) => {
                if page.properties.is_empty() {
                    warn!("No facts block found on {}", page.source);
                } else {
                    debug!("{}: {} properties", page.source, page.properties.len());
                }
                match &sink {
                    Sink::Print => println!("{}", serde_json::to_string_pretty(&page)?),
                    Sink::Store(conn) => {
                        let outcome = db::persist(conn, &page.record);
                        log_outcome(&page.source, &page.record, &outcome);
                        stats.record(&outcome);
                    }
                }
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    Ok(stats)
}

/// Persist pre-built records (seed data) through the same insert-or-ignore path.
pub fn persist_records(conn: &Connection, records: &[PlantRecord], origin: &str) -> RunStats {
    let mut stats = RunStats {
        total: records.len(),
        ..Default::default()
    };
    for record in records {
        let outcome = db::persist(conn, record);
        log_outcome(origin, record, &outcome);
        stats.record(&outcome);
    }
    stats
}

pub fn load_seed_file(path: &Path) -> Result<Vec<PlantRecord>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let records: Vec<PlantRecord> = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid plant records in {}", path.display()))?;
    Ok(records)
}

/// Offline mode: run extraction and mapping over saved HTML files in parallel.
/// The file stem stands in for the page name.
pub fn extract_files(paths: &[PathBuf]) -> Result<Vec<PageData>> {
    paths
        .par_iter()
        .map(|path| -> Result<PageData> {
            let html = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let source = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok(parser::process_page(&html, &source))
        })
        .collect()
}

fn log_outcome(source: &str, record: &PlantRecord, outcome: &Outcome) {
    match outcome {
        Outcome::Inserted | Outcome::AlreadyExists => {
            info!("{} [{}]: {}", source, record.botanical_name, outcome)
        }
        Outcome::Rejected(_) | Outcome::Failed(_) => {
            warn!("{} [{}]: {}", source, record.botanical_name, outcome)
        }
    }
}
