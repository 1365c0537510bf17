use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dates::normalize_date;

/// Known listing sources. Serialized with the exact names stored in `source_site`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SiteId {
    #[serde(alias = "internshala")]
    Internshala,
    #[serde(alias = "makeintern", alias = "Makeintern")]
    MakeIntern,
}

impl SiteId {
    pub fn as_str(&self) -> &'static str {
        match self {
            SiteId::Internshala => "Internshala",
            SiteId::MakeIntern => "MakeIntern",
        }
    }

    pub fn parse(s: &str) -> Option<SiteId> {
        match s.trim().to_lowercase().as_str() {
            "internshala" => Some(SiteId::Internshala),
            "makeintern" => Some(SiteId::MakeIntern),
            _ => None,
        }
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Pipeline stages ──

/// Whatever a listing page card exposes. Missing elements are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawListing {
    pub title: String,
    pub link: String,
    pub company: String,
    pub location: String,
    pub duration: String,
    pub stipend: String,
}

impl RawListing {
    pub fn from_link(link: impl Into<String>) -> Self {
        RawListing {
            link: link.into(),
            ..Default::default()
        }
    }
}

/// Fields only a detail page carries. `None` means the element was absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailFields {
    pub title: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub duration: Option<String>,
    pub stipend: Option<String>,
    pub apply_by: Option<String>,
    pub logo_url: Option<String>,
    /// Final URL of the detail page, for sources whose identity is the detail URL.
    pub canonical_link: Option<String>,
}

/// Raw listing merged with its detail page; `apply_by` is still free text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichedListing {
    pub raw: RawListing,
    pub apply_by: String,
    pub logo_url: Option<String>,
}

impl EnrichedListing {
    /// Detail values win over listing values whenever they are non-empty.
    pub fn merge(raw: RawListing, detail: DetailFields) -> Self {
        fn pick(listing: String, detail: Option<String>) -> String {
            match detail {
                Some(v) if !v.is_empty() => v,
                _ => listing,
            }
        }

        let merged = RawListing {
            title: pick(raw.title, detail.title),
            link: pick(raw.link, detail.canonical_link),
            company: pick(raw.company, detail.company),
            location: pick(raw.location, detail.location),
            duration: pick(raw.duration, detail.duration),
            stipend: pick(raw.stipend, detail.stipend),
        };

        EnrichedListing {
            raw: merged,
            apply_by: detail.apply_by.unwrap_or_default(),
            logo_url: detail.logo_url.filter(|u| !u.is_empty()),
        }
    }

    pub fn normalize(self, site: SiteId, fallback_logo: &str) -> CanonicalListing {
        CanonicalListing {
            link: self.raw.link,
            title: self.raw.title,
            company: self.raw.company,
            location: self.raw.location,
            duration: self.raw.duration,
            stipend: self.raw.stipend,
            apply_by: normalize_date(&self.apply_by),
            source_site: site,
            logo_url: self.logo_url.unwrap_or_else(|| fallback_logo.to_string()),
        }
    }
}

/// The unit of persistence. `link` is the natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalListing {
    pub link: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub duration: String,
    pub stipend: String,
    pub apply_by: String,
    pub source_site: SiteId,
    pub logo_url: String,
}

impl CanonicalListing {
    /// Record for a listing whose detail page could not be used.
    pub fn degraded(raw: RawListing, site: SiteId, fallback_logo: &str) -> Self {
        CanonicalListing {
            link: raw.link,
            title: raw.title,
            company: raw.company,
            location: raw.location,
            duration: raw.duration,
            stipend: raw.stipend,
            apply_by: String::new(),
            source_site: site,
            logo_url: fallback_logo.to_string(),
        }
    }
}
