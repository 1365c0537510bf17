use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row};

use crate::model::{CanonicalListing, SiteId};

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {:?}", dir))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub fn connect_in_memory() -> Result<Connection> {
    Ok(Connection::open_in_memory()?)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS listings (
            id          INTEGER PRIMARY KEY,
            link        TEXT NOT NULL UNIQUE CHECK(link <> ''),
            title       TEXT NOT NULL,
            company     TEXT NOT NULL,
            location    TEXT NOT NULL,
            duration    TEXT NOT NULL DEFAULT '',
            stipend     TEXT NOT NULL DEFAULT '',
            apply_by    TEXT NOT NULL DEFAULT '',
            source_site TEXT NOT NULL,
            logo_url    TEXT NOT NULL DEFAULT '',
            tags        TEXT NOT NULL DEFAULT '[]',
            skills      TEXT NOT NULL DEFAULT '[]',
            scraped_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_listings_scraped_at ON listings(scraped_at);
        CREATE INDEX IF NOT EXISTS idx_listings_source ON listings(source_site);
        ",
    )?;
    Ok(())
}

// ── Listings ──

/// A persisted listing as read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredListing {
    pub id: i64,
    pub link: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub duration: String,
    pub stipend: String,
    pub apply_by: String,
    /// Kept as text so rows written by other tools still load.
    pub source_site: String,
    pub logo_url: String,
    pub tags: Vec<String>,
    pub skills: Vec<String>,
    pub scraped_at: Option<DateTime<Utc>>,
}

const LISTING_COLUMNS: &str = "id, link, title, company, location, duration, stipend, apply_by,
     source_site, logo_url, tags, skills, scraped_at";

fn row_to_listing(row: &Row) -> rusqlite::Result<StoredListing> {
    let tags: String = row.get(10)?;
    let skills: String = row.get(11)?;
    let scraped_at: String = row.get(12)?;
    Ok(StoredListing {
        id: row.get(0)?,
        link: row.get(1)?,
        title: row.get(2)?,
        company: row.get(3)?,
        location: row.get(4)?,
        duration: row.get(5)?,
        stipend: row.get(6)?,
        apply_by: row.get(7)?,
        source_site: row.get(8)?,
        logo_url: row.get(9)?,
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        skills: serde_json::from_str(&skills).unwrap_or_default(),
        scraped_at: DateTime::parse_from_rfc3339(&scraped_at)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
    })
}

/// Insert a listing, or overwrite the stored one with the same link.
///
/// `tags` and `skills` are not produced by scraping and survive the update.
pub fn upsert_listing(
    conn: &Connection,
    listing: &CanonicalListing,
    scraped_at: DateTime<Utc>,
) -> Result<StoredListing> {
    if listing.link.trim().is_empty() {
        bail!(
            "{} listing {:?} has no link and cannot be stored",
            listing.source_site,
            listing.title
        );
    }

    let sql = format!(
        "INSERT INTO listings
             (link, title, company, location, duration, stipend, apply_by, source_site, logo_url, scraped_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(link) DO UPDATE SET
             title = excluded.title,
             company = excluded.company,
             location = excluded.location,
             duration = excluded.duration,
             stipend = excluded.stipend,
             apply_by = excluded.apply_by,
             source_site = excluded.source_site,
             logo_url = excluded.logo_url,
             scraped_at = excluded.scraped_at
         RETURNING {}",
        LISTING_COLUMNS
    );

    let stored = conn
        .query_row(
            &sql,
            rusqlite::params![
                listing.link,
                listing.title,
                listing.company,
                listing.location,
                listing.duration,
                listing.stipend,
                listing.apply_by,
                listing.source_site.as_str(),
                listing.logo_url,
                format_timestamp(scraped_at),
            ],
            row_to_listing,
        )
        .with_context(|| format!("Failed to upsert {}", listing.link))?;
    Ok(stored)
}

/// Newest first. Both filters are optional.
pub fn fetch_listings(
    conn: &Connection,
    source: Option<SiteId>,
    limit: Option<usize>,
) -> Result<Vec<StoredListing>> {
    let mut sql = format!("SELECT {} FROM listings", LISTING_COLUMNS);
    if source.is_some() {
        sql.push_str(" WHERE source_site = ?1");
    }
    sql.push_str(" ORDER BY scraped_at DESC, id DESC");
    if let Some(n) = limit {
        sql.push_str(&format!(" LIMIT {}", n));
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = match source {
        Some(site) => stmt
            .query_map([site.as_str()], row_to_listing)?
            .collect::<Result<Vec<_>, _>>()?,
        None => stmt
            .query_map([], row_to_listing)?
            .collect::<Result<Vec<_>, _>>()?,
    };
    Ok(rows)
}

pub fn fetch_listing(conn: &Connection, link: &str) -> Result<Option<StoredListing>> {
    let sql = format!("SELECT {} FROM listings WHERE link = ?1", LISTING_COLUMNS);
    Ok(conn.query_row(&sql, [link], row_to_listing).optional()?)
}

fn format_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ── Stats ──

pub struct Stats {
    pub total: usize,
    pub with_iso_deadline: usize,
    pub without_deadline: usize,
    pub per_source: Vec<(String, usize)>,
    pub last_scraped: Option<String>,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let total: usize = conn.query_row("SELECT COUNT(*) FROM listings", [], |r| r.get(0))?;
    let with_iso_deadline: usize = conn.query_row(
        "SELECT COUNT(*) FROM listings
         WHERE apply_by GLOB '[0-9][0-9][0-9][0-9]-[0-9][0-9]-[0-9][0-9]'",
        [],
        |r| r.get(0),
    )?;
    let without_deadline: usize =
        conn.query_row("SELECT COUNT(*) FROM listings WHERE apply_by = ''", [], |r| r.get(0))?;
    let last_scraped: Option<String> =
        conn.query_row("SELECT MAX(scraped_at) FROM listings", [], |r| r.get(0))?;

    let mut stmt = conn.prepare(
        "SELECT source_site, COUNT(*) FROM listings GROUP BY source_site ORDER BY source_site",
    )?;
    let per_source = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Stats {
        total,
        with_iso_deadline,
        without_deadline,
        per_source,
        last_scraped,
    })
}
