use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::browser::BrowserSession;
use crate::config::SourceConfig;
use crate::error::{ConfigError, HarvestError, PageError};
use crate::model::{CanonicalListing, RawListing, SiteId};
use crate::resolver::{DetailOutcome, DetailResolver};
use crate::sites::Site;

/// A canonical record tagged with the index of the harvester that produced it.
#[derive(Debug)]
pub struct Harvested {
    pub source: usize,
    pub listing: CanonicalListing,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestSummary {
    pub listed: usize,
    pub resolved: usize,
    pub degraded: usize,
    pub pagination_failures: usize,
}

/// Runs one source end to end: listing pages, then every detail page in order.
pub struct Harvester {
    site: Site,
    config: SourceConfig,
    session: Arc<BrowserSession>,
}

impl Harvester {
    pub fn new(config: SourceConfig, session: Arc<BrowserSession>) -> Result<Self, ConfigError> {
        Ok(Self {
            site: Site::from_config(&config)?,
            config,
            session,
        })
    }

    pub fn site_id(&self) -> SiteId {
        self.site.id()
    }

    /// Send each record, tagged with `source`, as soon as its detail page is resolved.
    ///
    /// Only a first listing page that never loads is fatal; everything after
    /// that degrades per page or per record.
    pub async fn harvest(
        &self,
        source: usize,
        tx: mpsc::Sender<Harvested>,
    ) -> Result<HarvestSummary, HarvestError> {
        let site = self.site.id();
        info!(%site, url = self.config.listing_url.as_str(), "Harvesting");

        let mut raws = self
            .load_listing_page(&self.config.listing_url)
            .await
            .map_err(|source| HarvestError::ListingUnavailable { site, source })?;

        let mut summary = HarvestSummary::default();
        for page in 2..=self.config.max_pages {
            let Some(url) = self.config.page_url(page) else {
                break;
            };
            match self.load_listing_page(&url).await {
                Ok(more) if more.is_empty() => break,
                Ok(more) => raws.extend(more),
                Err(e) => {
                    warn!(%site, page, error = %e, "Listing page failed, stopping pagination");
                    summary.pagination_failures += 1;
                    break;
                }
            }
        }

        let raws = dedup_by_link(raws);
        summary.listed = raws.len();
        info!(%site, listed = summary.listed, "Resolving detail pages");

        let resolver = DetailResolver::new(
            &self.session,
            &self.site,
            self.config.timeouts,
            self.config.fallback_logo(),
        );
        for raw in raws {
            let (listing, outcome) = resolver.resolve(raw).await;
            match outcome {
                DetailOutcome::Resolved => summary.resolved += 1,
                DetailOutcome::SkippedNoLink => summary.degraded += 1,
                DetailOutcome::Degraded(e) => {
                    debug!(%site, link = listing.link.as_str(), error = %e, "Sending degraded record");
                    summary.degraded += 1;
                }
            }
            tx.send(Harvested { source, listing })
                .await
                .map_err(|_| HarvestError::SinkClosed { site })?;
        }

        info!(
            %site,
            resolved = summary.resolved,
            degraded = summary.degraded,
            "Harvest finished"
        );
        Ok(summary)
    }

    async fn load_listing_page(&self, url: &str) -> Result<Vec<RawListing>, PageError> {
        let limit = self.config.timeouts.navigation();
        let mut page = self.session.new_page()?;
        page.goto(url, limit).await?;
        page.wait_for_selector(self.site.listing_ready(), limit).await?;
        Ok(self.site.extract_listing(page.html()?))
    }
}

/// Drop repeated links, keeping the first. Link-less entries are all kept.
fn dedup_by_link(raws: Vec<RawListing>) -> Vec<RawListing> {
    let mut seen = HashSet::new();
    raws.into_iter()
        .filter(|r| r.link.is_empty() || seen.insert(r.link.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Timeouts;
    use crate::testing::FakeFetcher;

    const LISTING_URL: &str = "https://internshala.com/internships/";

    fn card(id: u32, href: &str, title: &str) -> String {
        format!(
            r#"<div id="individual_internship_{id}"><h3 class="job-internship-name">
               <a class="job-title-href" href="{href}">{title}</a></h3>
               <p class="company-name">Company {id}</p></div>"#
        )
    }

    fn listing_page(cards: &[String]) -> String {
        format!(
            r#"<div id="internship_list_container_1">{}</div>"#,
            cards.join("\n")
        )
    }

    fn detail(apply_by: &str) -> String {
        format!(
            r#"<div class="internship_meta"><div class="apply_by"><div class="item_body">{apply_by}</div></div></div>"#
        )
    }

    fn config() -> SourceConfig {
        let mut cfg = SourceConfig::builtin(SiteId::Internshala);
        cfg.timeouts = Timeouts {
            navigation_ms: 200,
            detail_navigation_ms: 100,
            selector_wait_ms: 50,
        };
        cfg
    }

    async fn run(
        fetcher: FakeFetcher,
        cfg: SourceConfig,
    ) -> (Result<HarvestSummary, HarvestError>, Vec<CanonicalListing>) {
        let session = Arc::new(BrowserSession::new(Arc::new(fetcher)));
        let harvester = Harvester::new(cfg, Arc::clone(&session)).unwrap();
        let (tx, mut rx) = mpsc::channel(64);
        let result = harvester.harvest(0, tx).await;
        let mut out = Vec::new();
        while let Some(h) = rx.recv().await {
            out.push(h.listing);
        }
        assert_eq!(session.open_pages(), 0);
        (result, out)
    }

    #[tokio::test]
    async fn records_arrive_in_listing_order() {
        let fetcher = FakeFetcher::new()
            .page(
                LISTING_URL,
                &listing_page(&[
                    card(1, "/internship/detail/a-1", "Alpha"),
                    card(2, "/internship/detail/b-2", "Beta"),
                    card(3, "/internship/detail/c-3", "Gamma"),
                ]),
            )
            .page("https://internshala.com/internship/detail/a-1", &detail("15/03/2024"))
            .page("https://internshala.com/internship/detail/b-2", "<p>gone</p>")
            .page("https://internshala.com/internship/detail/c-3", &detail("5 Jan' 24"));

        let (result, records) = run(fetcher, config()).await;
        let summary = result.unwrap();

        assert_eq!(summary.listed, 3);
        assert_eq!(summary.resolved, 2);
        assert_eq!(summary.degraded, 1);
        let titles: Vec<&str> = records.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Alpha", "Beta", "Gamma"]);
        assert_eq!(records[0].apply_by, "2024-03-15");
        assert_eq!(records[1].apply_by, "");
        assert_eq!(records[2].apply_by, "2024-01-05");
    }

    #[tokio::test]
    async fn listing_failure_is_fatal_and_sends_nothing() {
        let fetcher = FakeFetcher::new().failing(LISTING_URL, "dns error");
        let (result, records) = run(fetcher, config()).await;
        assert!(matches!(
            result,
            Err(HarvestError::ListingUnavailable { site: SiteId::Internshala, .. })
        ));
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn listing_without_container_is_fatal_after_one_fetch() {
        let fetcher = Arc::new(
            FakeFetcher::new().page(LISTING_URL, "<html><body>captcha</body></html>"),
        );
        let session = Arc::new(BrowserSession::new(fetcher.clone()));
        let harvester = Harvester::new(config(), Arc::clone(&session)).unwrap();
        let (tx, mut rx) = mpsc::channel(8);

        let result = harvester.harvest(0, tx).await;
        assert!(matches!(
            result,
            Err(HarvestError::ListingUnavailable {
                source: PageError::SelectorMissing { .. },
                ..
            })
        ));
        assert!(rx.recv().await.is_none());
        assert_eq!(fetcher.calls(), vec![LISTING_URL]);
        assert_eq!(session.open_pages(), 0);
    }

    #[tokio::test]
    async fn later_page_failure_keeps_earlier_pages() {
        let mut cfg = config();
        cfg.max_pages = 3;
        let fetcher = FakeFetcher::new()
            .page(LISTING_URL, &listing_page(&[card(1, "/internship/detail/a-1", "Alpha")]))
            .page(
                "https://internshala.com/internships/page-2/",
                &listing_page(&[
                    card(2, "/internship/detail/b-2", "Beta"),
                    card(9, "/internship/detail/a-1", "Alpha again"),
                ]),
            )
            .failing("https://internshala.com/internships/page-3/", "reset")
            .page("https://internshala.com/internship/detail/a-1", &detail("1/1/2025"))
            .page("https://internshala.com/internship/detail/b-2", &detail("2/1/2025"));

        let (result, records) = run(fetcher, cfg).await;
        let summary = result.unwrap();
        assert_eq!(summary.pagination_failures, 1);
        assert_eq!(summary.listed, 2);
        let titles: Vec<&str> = records.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Alpha", "Beta"]);
    }

    #[tokio::test]
    async fn makeintern_records_come_from_detail_pages() {
        let listing = r#"<div id="internship-content"><div class="view">
            <a class="pull-right btn btn-default btn-setting" href="http://makeintern.com/i/7">Apply</a>
            </div></div>"#;
        let detail_html = r#"<div id="internship-content">
            <h1 class="intern_headings">HR Intern</h1>
            <div class="detail_inner"><ul class="students-rank">
            <li><span class="pull-left lefty-part">By :</span><span class="pull-right righty-part">Peoplefirst</span></li>
            <li><span class="pull-left lefty-part">Last Apply Date :</span><span class="pull-right righty-part">20 Mar' 24</span></li>
            </ul></div></div>"#;
        let mut cfg = SourceConfig::builtin(SiteId::MakeIntern);
        cfg.timeouts = config().timeouts;
        let fetcher = FakeFetcher::new()
            .page(&cfg.listing_url.clone(), listing)
            .redirected("http://makeintern.com/i/7", "https://www.makeintern.com/i/7", detail_html);

        let (result, records) = run(fetcher, cfg).await;
        assert_eq!(result.unwrap().resolved, 1);
        let r = &records[0];
        assert_eq!(r.link, "https://www.makeintern.com/i/7");
        assert_eq!(r.title, "HR Intern");
        assert_eq!(r.company, "Peoplefirst");
        assert_eq!(r.apply_by, "2024-03-20");
        assert_eq!(r.source_site, SiteId::MakeIntern);
        assert_eq!(r.logo_url, "https://www.makeintern.com/favicon.ico");
    }

    #[test]
    fn dedup_keeps_first_and_linkless() {
        let raws = vec![
            RawListing::from_link("a"),
            RawListing::default(),
            RawListing::from_link("a"),
            RawListing::default(),
            RawListing::from_link("b"),
        ];
        assert_eq!(dedup_by_link(raws).len(), 4);
    }
}
