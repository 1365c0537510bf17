use tracing::{debug, warn};

use crate::browser::BrowserSession;
use crate::config::Timeouts;
use crate::error::PageError;
use crate::model::{CanonicalListing, DetailFields, EnrichedListing, RawListing};
use crate::sites::Site;

/// How a listing's detail page contributed to its record.
#[derive(Debug)]
pub enum DetailOutcome {
    Resolved,
    SkippedNoLink,
    Degraded(PageError),
}

/// Turns raw listings into canonical records by visiting their detail pages.
/// Never fails: an unreachable detail page yields a degraded record.
pub struct DetailResolver<'a> {
    session: &'a BrowserSession,
    site: &'a Site,
    timeouts: Timeouts,
    fallback_logo: &'a str,
}

impl<'a> DetailResolver<'a> {
    pub fn new(
        session: &'a BrowserSession,
        site: &'a Site,
        timeouts: Timeouts,
        fallback_logo: &'a str,
    ) -> Self {
        Self {
            session,
            site,
            timeouts,
            fallback_logo,
        }
    }

    /// Always yields a record; the outcome says whether the detail page contributed.
    pub async fn resolve(&self, raw: RawListing) -> (CanonicalListing, DetailOutcome) {
        let site = self.site.id();
        if raw.link.trim().is_empty() {
            debug!(%site, title = raw.title.as_str(), "Listing has no link, skipping detail page");
            let listing = CanonicalListing::degraded(raw, site, self.fallback_logo);
            return (listing, DetailOutcome::SkippedNoLink);
        }

        match self.fetch_detail(&raw.link).await {
            Ok(detail) => {
                let listing = EnrichedListing::merge(raw, detail).normalize(site, self.fallback_logo);
                (listing, DetailOutcome::Resolved)
            }
            Err(e) => {
                warn!(%site, link = raw.link.as_str(), error = %e, "Detail page unavailable, keeping listing fields");
                let listing = CanonicalListing::degraded(raw, site, self.fallback_logo);
                (listing, DetailOutcome::Degraded(e))
            }
        }
    }

    async fn fetch_detail(&self, link: &str) -> Result<DetailFields, PageError> {
        let mut page = self.session.new_page()?;
        page.goto(link, self.timeouts.detail_navigation()).await?;
        page.wait_for_selector(self.site.detail_ready(), self.timeouts.selector_wait())
            .await?;
        Ok(self.site.extract_detail(page.html()?, page.url()))
    }
}
