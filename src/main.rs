mod browser;
mod config;
mod dates;
mod db;
mod error;
mod extract;
mod harvester;
mod model;
mod pipeline;
mod query;
mod resolver;
mod sites;
#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use crate::browser::BrowserSession;
use crate::harvester::Harvester;
use crate::model::SiteId;
use crate::pipeline::{Pipeline, TriggerResponse};
use crate::query::ListingResponse;

#[derive(Parser)]
#[command(name = "intern_scraper", about = "Internship listing scraper for Internshala and MakeIntern")]
struct Cli {
    /// TOML config file (missing file means built-in defaults)
    #[arg(long, global = true, default_value = "intern_scraper.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape every configured source and upsert listings into the store
    Scrape {
        /// Only run this source (Internshala, MakeIntern)
        #[arg(short, long, value_parser = parse_site)]
        source: Option<SiteId>,
    },
    /// List stored listings, newest first
    List {
        /// Max rows to display
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Filter by source site
        #[arg(short, long, value_parser = parse_site)]
        source: Option<SiteId>,
        /// Print the client-facing JSON array instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Print one stored listing, looked up by its link
    Show { link: String },
    /// Show store statistics
    Stats,
    /// Normalize a deadline string to YYYY-MM-DD
    Normalize { text: String },
}

fn parse_site(s: &str) -> Result<SiteId, String> {
    SiteId::parse(s).ok_or_else(|| format!("unknown source '{}' (expected Internshala or MakeIntern)", s))
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

    let result = match cli.command {
        Commands::Normalize { text } => {
            println!("{}", dates::normalize_date(&text));
            Ok(())
        }
        Commands::Scrape { source } => {
            let cfg = config::load(Some(&cli.config))?;
            let conn = db::connect(&cfg.db_path)?;
            db::init_schema(&conn)?;

            let session = Arc::new(
                BrowserSession::launch(cfg.user_agent.as_deref())
                    .context("Failed to start browser session")?,
            );
            let harvesters = cfg
                .sources
                .into_iter()
                .filter(|s| source.map_or(true, |site| s.site_id == site))
                .map(|s| Harvester::new(s, Arc::clone(&session)))
                .collect::<Result<Vec<_>, _>>()?;
            if harvesters.is_empty() {
                println!("No sources configured.");
                return Ok(());
            }

            info!(sources = harvesters.len(), db = ?cfg.db_path, "Starting scrape");
            let report = Pipeline::new(&conn, session, harvesters)
                .with_progress(true)
                .run()
                .await;
            let response = TriggerResponse::from(&report);
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Commands::List { limit, source, json } => {
            let cfg = config::load(Some(&cli.config))?;
            let conn = db::connect(&cfg.db_path)?;
            db::init_schema(&conn)?;
            let rows = db::fetch_listings(&conn, source, limit)?;

            if json {
                let out: Vec<ListingResponse> = rows.into_iter().map(ListingResponse::from).collect();
                println!("{}", serde_json::to_string_pretty(&out)?);
                return Ok(());
            }
            if rows.is_empty() {
                println!("No listings stored. Run 'scrape' first.");
                return Ok(());
            }

            println!(
                "{:>3} | {:<32} | {:<20} | {:<16} | {:<18} | {:<10} | {:<11}",
                "#", "Title", "Company", "Location", "Stipend", "Apply by", "Source"
            );
            println!("{}", "-".repeat(128));

            for (i, r) in rows.iter().enumerate() {
                let apply_by = if r.apply_by.is_empty() { "-" } else { r.apply_by.as_str() };
                println!(
                    "{:>3} | {:<32} | {:<20} | {:<16} | {:<18} | {:<10} | {:<11}",
                    i + 1,
                    truncate(&r.title, 32),
                    truncate(&r.company, 20),
                    truncate(&r.location, 16),
                    truncate(&r.stipend, 18),
                    truncate(apply_by, 10),
                    r.source_site
                );
            }

            println!("\n{} listings", rows.len());
            Ok(())
        }
        Commands::Show { link } => {
            let cfg = config::load(Some(&cli.config))?;
            let conn = db::connect(&cfg.db_path)?;
            db::init_schema(&conn)?;
            match db::fetch_listing(&conn, link.trim())? {
                Some(row) => {
                    println!("{}", serde_json::to_string_pretty(&ListingResponse::from(row))?);
                    Ok(())
                }
                None => Err(anyhow::anyhow!("No listing stored for {}", link)),
            }
        }
        Commands::Stats => {
            let cfg = config::load(Some(&cli.config))?;
            let conn = db::connect(&cfg.db_path)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Total:        {}", s.total);
            for (site, n) in &s.per_source {
                println!("  {:<11} {}", site, n);
            }
            println!("ISO deadline: {}", s.with_iso_deadline);
            println!("No deadline:  {}", s.without_deadline);
            println!("Last scrape:  {}", s.last_scraped.as_deref().unwrap_or("never"));
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        eprintln!("\nDone in {}", format_duration(elapsed));
    }

    result
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
