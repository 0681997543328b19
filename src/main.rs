mod db;
mod error;
mod fetch;
mod parser;
mod pipeline;
mod settings;
mod utils;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};

use fetch::HttpFetcher;
use pipeline::Sink;
use settings::Settings;

#[derive(Parser)]
#[command(name = "plant_scraper", about = "Extract plant facts from wiki pages into SQLite")]
struct Cli {
    /// Settings file (default: ./plants.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// SQLite database path, overrides settings
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the plants table
    Init,
    /// Fetch, extract, map and store plant pages
    Run {
        /// Page URLs (default: `urls` from settings)
        urls: Vec<String>,
        /// Max pages to process
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Concurrent fetches, overrides settings
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,
        /// Print mapped records as JSON instead of storing them
        #[arg(long)]
        dry_run: bool,
    },
    /// Extract and map saved HTML files, print JSON
    Extract {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Insert plant records from a JSON file
    Seed { file: PathBuf },
    /// Show one stored plant
    Show { botanical_name: String },
    /// Stored plants overview
    List {
        /// Only nitrogen fixers
        #[arg(long)]
        nitrogen_fixing: bool,
        /// Only pollinator attractants
        #[arg(long)]
        pollinator: bool,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Show storage statistics
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
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        settings.db_path = db;
    }

    let result = match cli.command {
        Commands::Init => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            println!("Plants table ready in {}", settings.db_path.display());
            Ok(())
        }
        Commands::Run {
            urls,
            limit,
            concurrency,
            dry_run,
        } => {
            let mut urls = if urls.is_empty() { settings.urls.clone() } else { urls };
            if let Some(n) = limit {
                urls.truncate(n);
            }
            if urls.is_empty() {
                println!("No URLs given. Pass URLs or set `urls` in plants.toml.");
                return Ok(());
            }

            let fetcher = Arc::new(HttpFetcher::new(
                &settings.user_agent,
                Duration::from_secs(settings.timeout_secs),
            )?);
            let concurrency = concurrency.unwrap_or(settings.concurrency);

            let stats = if dry_run {
                pipeline::run_pipeline(Sink::Print, fetcher, urls, concurrency).await?
            } else {
                let conn = db::connect(&settings.db_path)?;
                db::ensure_plants_table(&conn)?;
                println!("Processing {} pages...", urls.len());
                pipeline::run_pipeline(Sink::Store(&conn), fetcher, urls, concurrency).await?
            };
            stats.print();
            Ok(())
        }
        Commands::Extract { files } => {
            let pages = pipeline::extract_files(&files)?;
            println!("{}", serde_json::to_string_pretty(&pages)?);
            Ok(())
        }
        Commands::Seed { file } => {
            let records = pipeline::load_seed_file(&file)?;
            let conn = db::connect(&settings.db_path)?;
            db::ensure_plants_table(&conn)?;
            let origin = file.display().to_string();
            let stats = pipeline::persist_records(&conn, &records, &origin);
            stats.print();
            Ok(())
        }
        Commands::Show { botanical_name } => {
            let conn = db::connect(&settings.db_path)?;
            db::ensure_plants_table(&conn)?;
            match db::fetch_plant(&conn, &botanical_name)? {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => println!("No plant named '{}'.", botanical_name),
            }
            Ok(())
        }
        Commands::List {
            nitrogen_fixing,
            pollinator,
            limit,
        } => {
            let conn = db::connect(&settings.db_path)?;
            db::ensure_plants_table(&conn)?;
            let filter = db::PlantFilter {
                nitrogen_fixing,
                pollinator_attractant: pollinator,
            };
            let rows = db::fetch_plants(&conn, filter, limit)?;
            if rows.is_empty() {
                println!("No plants found.");
                return Ok(());
            }

            println!(
                "{:>3} | {:<26} | {:<22} | {:<12} | {:<10} | {:>2} | {:>2}",
                "#", "Botanical name", "Common name", "Type", "Sun", "N", "P"
            );
            println!("{}", "-".repeat(96));

            for (i, r) in rows.iter().enumerate() {
                println!(
                    "{:>3} | {:<26} | {:<22} | {:<12} | {:<10} | {:>2} | {:>2}",
                    i + 1,
                    truncate(&r.botanical_name, 26),
                    truncate(r.common_name.as_deref().unwrap_or("-"), 22),
                    truncate(r.plant_type.as_deref().unwrap_or("-"), 12),
                    truncate(r.sun_exposure.as_deref().unwrap_or("-"), 10),
                    flag(r.nitrogen_fixing),
                    flag(r.pollinator_attractant),
                );
            }

            println!("\n{} plants | N = nitrogen fixer, P = pollinator attractant", rows.len());
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect(&settings.db_path)?;
            db::ensure_plants_table(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Plants:                 {}", s.total);
            println!("Nitrogen fixers:        {}", s.nitrogen_fixers);
            println!("Pollinator attractants: {}", s.pollinator_attractants);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn flag(b: bool) -> &'static str {
    if b {
        "x"
    } else {
        ""
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
