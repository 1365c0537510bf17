use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::model::SiteId;

const DEFAULT_DB_PATH: &str = "data/internships.sqlite";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            user_agent: None,
            sources: default_sources(),
        }
    }
}

/// One external site: where to start, how to find things, how long to wait.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub site_id: SiteId,
    pub listing_url: String,
    /// Base for relative listing links; defaults to the listing URL's origin.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub fallback_logo: Option<String>,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    /// Listing URL for pages after the first, with a `{page}` placeholder.
    #[serde(default)]
    pub page_url_template: Option<String>,
    /// Per-key overrides of the site's built-in selector table.
    #[serde(default)]
    pub selectors: BTreeMap<String, String>,
    #[serde(default)]
    pub timeouts: Timeouts,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub navigation_ms: u64,
    pub detail_navigation_ms: u64,
    pub selector_wait_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            navigation_ms: 60_000,
            detail_navigation_ms: 30_000,
            selector_wait_ms: 10_000,
        }
    }
}

impl Timeouts {
    pub fn navigation(&self) -> Duration {
        Duration::from_millis(self.navigation_ms)
    }

    pub fn detail_navigation(&self) -> Duration {
        Duration::from_millis(self.detail_navigation_ms)
    }

    pub fn selector_wait(&self) -> Duration {
        Duration::from_millis(self.selector_wait_ms)
    }
}

impl SourceConfig {
    pub fn builtin(site_id: SiteId) -> Self {
        let (listing_url, page_url_template) = match site_id {
            SiteId::Internshala => (
                "https://internshala.com/internships/",
                Some("https://internshala.com/internships/page-{page}/"),
            ),
            SiteId::MakeIntern => (
                "https://www.makeintern.com/internships/office-internship",
                None,
            ),
        };
        Self {
            site_id,
            listing_url: listing_url.to_string(),
            base_url: None,
            fallback_logo: None,
            max_pages: default_max_pages(),
            page_url_template: page_url_template.map(str::to_string),
            selectors: BTreeMap::new(),
            timeouts: Timeouts::default(),
        }
    }

    pub fn fallback_logo(&self) -> &str {
        match &self.fallback_logo {
            Some(url) if !url.is_empty() => url,
            _ => match self.site_id {
                SiteId::Internshala => "https://internshala.com/favicon.ico",
                SiteId::MakeIntern => "https://www.makeintern.com/favicon.ico",
            },
        }
    }

    /// Listing URL for a 1-based page number, if that page exists in config.
    pub fn page_url(&self, page: u32) -> Option<String> {
        if page <= 1 {
            return Some(self.listing_url.clone());
        }
        if page > self.max_pages {
            return None;
        }
        self.page_url_template
            .as_ref()
            .map(|t| t.replace("{page}", &page.to_string()))
    }
}

/// Layered load: built-in defaults, then the optional TOML file, then `INTERN_*` env vars.
pub fn load(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = config::Config::builder();
    if let Some(p) = path {
        builder = builder.add_source(config::File::from(p).required(false));
    }
    let settings = builder
        .add_source(config::Environment::with_prefix("INTERN"))
        .build()?;
    Ok(settings.try_deserialize()?)
}

fn default_db_path() -> PathBuf {
    PathBuf::from(DEFAULT_DB_PATH)
}

fn default_max_pages() -> u32 {
    1
}

fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig::builtin(SiteId::Internshala),
        SourceConfig::builtin(SiteId::MakeIntern),
    ]
}
