//! Per-source dispatch: each variant carries its compiled selectors and knows
//! how to read its own listing and detail pages.

use scraper::Html;
use url::Url;

use crate::config::SourceConfig;
use crate::error::ConfigError;
use crate::extract::{internshala, makeintern, CssSelector};
use crate::model::{DetailFields, RawListing, SiteId};

#[derive(Debug, Clone)]
pub enum Site {
    Internshala {
        selectors: internshala::Selectors,
        base: Url,
    },
    MakeIntern {
        selectors: makeintern::Selectors,
    },
}

impl Site {
    pub fn from_config(cfg: &SourceConfig) -> Result<Self, ConfigError> {
        match cfg.site_id {
            SiteId::Internshala => {
                let raw_base = cfg.base_url.as_deref().unwrap_or(&cfg.listing_url);
                let base = Url::parse(raw_base).map_err(|e| ConfigError::InvalidUrl {
                    site: cfg.site_id,
                    url: raw_base.to_string(),
                    reason: e.to_string(),
                })?;
                Ok(Site::Internshala {
                    selectors: internshala::Selectors::compile(&cfg.selectors)?,
                    base,
                })
            }
            SiteId::MakeIntern => Ok(Site::MakeIntern {
                selectors: makeintern::Selectors::compile(&cfg.selectors)?,
            }),
        }
    }

    pub fn id(&self) -> SiteId {
        match self {
            Site::Internshala { .. } => SiteId::Internshala,
            Site::MakeIntern { .. } => SiteId::MakeIntern,
        }
    }

    /// Element whose presence means the listing page has rendered.
    pub fn listing_ready(&self) -> &CssSelector {
        match self {
            Site::Internshala { selectors, .. } => &selectors.listing_container,
            Site::MakeIntern { selectors } => &selectors.card,
        }
    }

    /// Element whose presence means the detail page has rendered.
    pub fn detail_ready(&self) -> &CssSelector {
        match self {
            Site::Internshala { selectors, .. } => &selectors.detail_container,
            Site::MakeIntern { selectors } => &selectors.detail_container,
        }
    }

    pub fn extract_listing(&self, html: &str) -> Vec<RawListing> {
        let doc = Html::parse_document(html);
        match self {
            Site::Internshala { selectors, base } => {
                internshala::extract_listing(&doc, selectors, base)
            }
            Site::MakeIntern { selectors } => makeintern::extract_listing(&doc, selectors),
        }
    }

    pub fn extract_detail(&self, html: &str, page_url: &str) -> DetailFields {
        let doc = Html::parse_document(html);
        match self {
            Site::Internshala { selectors, .. } => internshala::extract_detail(&doc, selectors),
            Site::MakeIntern { selectors } => makeintern::extract_detail(&doc, selectors, page_url),
        }
    }
}
