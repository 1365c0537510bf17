//! Typed errors for the scraping seams.
//!
//! Page-level errors are recovered by the detail resolver, harvest errors are
//! absorbed by the pipeline, and config errors stop the process at startup.

use std::time::Duration;

use thiserror::Error;

use crate::model::SiteId;

/// A single navigation or wait step on a page context failed.
#[derive(Debug, Error)]
pub enum PageError {
    #[error("browser session is closed")]
    SessionClosed,

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("{step} timed out after {}ms on {url}", .after.as_millis())]
    Timeout {
        step: &'static str,
        url: String,
        after: Duration,
    },

    #[error("`{selector}` not found on {url}")]
    SelectorMissing { selector: String, url: String },

    #[error("evaluating {url} failed: {reason}")]
    Evaluation { url: String, reason: String },

    #[error("page has no document loaded")]
    NotLoaded,
}

/// A harvester could not produce any records.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("{site} listing page unavailable: {source}")]
    ListingUnavailable {
        site: SiteId,
        #[source]
        source: PageError,
    },

    #[error("{site} record sink closed before harvest finished")]
    SinkClosed { site: SiteId },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("{site}: invalid selector for `{key}`: {selector}")]
    InvalidSelector {
        site: SiteId,
        key: String,
        selector: String,
    },

    #[error("{site}: invalid URL `{url}`: {reason}")]
    InvalidUrl {
        site: SiteId,
        url: String,
        reason: String,
    },
}
