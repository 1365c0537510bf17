//! Runs every configured harvester and persists their records as they arrive.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::browser::BrowserSession;
use crate::db;
use crate::harvester::{HarvestSummary, Harvested, Harvester};
use crate::model::SiteId;

const CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    CompletedWithErrors,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::CompletedWithErrors => "completed with errors",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SourceStatus {
    Completed,
    PartiallyCompleted,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceReport {
    pub site: SiteId,
    pub status: SourceStatus,
    pub listed: usize,
    pub persisted: usize,
    pub degraded: usize,
    pub persistence_failures: usize,
    pub error: Option<String>,
}

impl SourceReport {
    fn new(site: SiteId) -> Self {
        Self {
            site,
            status: SourceStatus::Completed,
            listed: 0,
            persisted: 0,
            degraded: 0,
            persistence_failures: 0,
            error: None,
        }
    }

    fn finish(&mut self, outcome: Result<HarvestSummary, String>) {
        match outcome {
            Ok(summary) => {
                self.listed = summary.listed;
                self.degraded = summary.degraded;
                let partial = summary.degraded > 0
                    || summary.pagination_failures > 0
                    || self.persistence_failures > 0;
                self.status = if partial {
                    SourceStatus::PartiallyCompleted
                } else {
                    SourceStatus::Completed
                };
            }
            Err(e) => {
                // Records sent before the failure are already in the store
                let received = self.persisted + self.persistence_failures;
                self.listed = self.listed.max(received);
                self.status = SourceStatus::Failed;
                self.error = Some(if received > 0 {
                    format!("{} (after {} of its records reached the store)", e, received)
                } else {
                    e
                });
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub state: RunState,
    pub count: usize,
    pub sources: Vec<SourceReport>,
}

/// What a trigger caller sees after a run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerResponse {
    pub message: String,
    pub count: usize,
    pub failed_sources: Vec<SourceReport>,
}

impl From<&RunReport> for TriggerResponse {
    fn from(report: &RunReport) -> Self {
        let message = match report.state {
            RunState::Completed => "Scraping completed successfully".to_string(),
            _ => "Scraping completed with errors".to_string(),
        };
        TriggerResponse {
            message,
            count: report.count,
            failed_sources: report
                .sources
                .iter()
                .filter(|s| s.status != SourceStatus::Completed)
                .cloned()
                .collect(),
        }
    }
}

/// One scrape run. Owns the harvesters and closes the shared session when done.
pub struct Pipeline<'c> {
    conn: &'c Connection,
    session: Arc<BrowserSession>,
    harvesters: Vec<Harvester>,
    state: RunState,
    progress: bool,
}

impl<'c> Pipeline<'c> {
    pub fn new(conn: &'c Connection, session: Arc<BrowserSession>, harvesters: Vec<Harvester>) -> Self {
        Self {
            conn,
            session,
            harvesters,
            state: RunState::Idle,
            progress: false,
        }
    }

    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.progress = enabled;
        self
    }

    #[cfg(test)]
    pub fn state(&self) -> RunState {
        self.state
    }

    fn transition(&mut self, next: RunState) {
        info!(from = %self.state, to = %next, "Pipeline state");
        self.state = next;
    }

    pub async fn run(mut self) -> RunReport {
        self.transition(RunState::Running);

        let mut reports: Vec<SourceReport> = self
            .harvesters
            .iter()
            .map(|h| SourceReport::new(h.site_id()))
            .collect();

        let (tx, mut rx) = mpsc::channel::<Harvested>(CHANNEL_CAPACITY);
        let mut handles = Vec::with_capacity(self.harvesters.len());
        for (source, harvester) in std::mem::take(&mut self.harvesters).into_iter().enumerate() {
            let tx = tx.clone();
            handles.push(tokio::spawn(async move { harvester.harvest(source, tx).await }));
        }
        // Receiver closes once every harvester has dropped its sender
        drop(tx);

        let pb = if self.progress {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {pos} listings saved {msg}")
            {
                pb.set_style(style);
            }
            pb
        } else {
            ProgressBar::hidden()
        };

        let mut count = 0usize;
        while let Some(Harvested { source, listing }) = rx.recv().await {
            match db::upsert_listing(self.conn, &listing, Utc::now()) {
                Ok(_) => {
                    count += 1;
                    reports[source].persisted += 1;
                    pb.inc(1);
                }
                Err(e) => {
                    warn!(site = %listing.source_site, error = %e, "Failed to persist listing");
                    reports[source].persistence_failures += 1;
                }
            }
        }
        pb.finish_and_clear();

        for (report, handle) in reports.iter_mut().zip(handles) {
            let outcome = match handle.await {
                Ok(Ok(summary)) => Ok(summary),
                Ok(Err(e)) => {
                    error!(site = %report.site, error = %e, "Harvester failed");
                    Err(e.to_string())
                }
                Err(e) => {
                    error!(site = %report.site, error = %e, "Harvester task aborted");
                    Err(format!("harvester task aborted: {}", e))
                }
            };
            report.finish(outcome);
        }

        self.session.close();

        let clean = reports.iter().all(|r| r.status == SourceStatus::Completed);
        self.transition(if clean {
            RunState::Completed
        } else {
            RunState::CompletedWithErrors
        });
        info!(count, state = %self.state, "Scrape run finished");

        RunReport {
            state: self.state,
            count,
            sources: reports,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SourceConfig, Timeouts};
    use crate::testing::FakeFetcher;

    const INTERNSHALA_LISTING: &str = "https://internshala.com/internships/";
    const MAKEINTERN_LISTING: &str = "https://www.makeintern.com/internships/office-internship";

    fn fast(site: SiteId) -> SourceConfig {
        let mut cfg = SourceConfig::builtin(site);
        cfg.timeouts = Timeouts {
            navigation_ms: 200,
            detail_navigation_ms: 100,
            selector_wait_ms: 50,
        };
        cfg
    }

    fn makeintern_pages(fetcher: FakeFetcher, n: usize) -> FakeFetcher {
        let cards: String = (1..=n)
            .map(|i| {
                format!(
                    r#"<div id="internship-content"><div class="view">
                    <a class="pull-right btn btn-default btn-setting" href="https://www.makeintern.com/i/{i}">Apply</a>
                    </div></div>"#
                )
            })
            .collect();
        let mut fetcher = fetcher.page(MAKEINTERN_LISTING, &cards);
        for i in 1..=n {
            fetcher = fetcher.page(
                &format!("https://www.makeintern.com/i/{i}"),
                &format!(
                    r#"<div id="internship-content"><h1 class="intern_headings">Role {i}</h1></div>"#
                ),
            );
        }
        fetcher
    }

    fn setup(fetcher: FakeFetcher) -> (Connection, Arc<BrowserSession>, Vec<Harvester>) {
        let conn = db::connect_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        let session = Arc::new(BrowserSession::new(Arc::new(fetcher)));
        let harvesters = [SiteId::Internshala, SiteId::MakeIntern]
            .into_iter()
            .map(|site| Harvester::new(fast(site), Arc::clone(&session)).unwrap())
            .collect();
        (conn, session, harvesters)
    }

    #[tokio::test]
    async fn failed_source_does_not_block_the_other() {
        let fetcher = makeintern_pages(
            FakeFetcher::new().failing(INTERNSHALA_LISTING, "connection refused"),
            3,
        );
        let (conn, session, harvesters) = setup(fetcher);

        let report = Pipeline::new(&conn, Arc::clone(&session), harvesters).run().await;

        assert_eq!(report.state, RunState::CompletedWithErrors);
        assert_eq!(report.count, 3);
        assert_eq!(report.sources[0].site, SiteId::Internshala);
        assert_eq!(report.sources[0].status, SourceStatus::Failed);
        assert!(report.sources[0].error.is_some());
        assert_eq!(report.sources[1].status, SourceStatus::Completed);
        assert_eq!(report.sources[1].persisted, 3);
        assert_eq!(db::fetch_listings(&conn, None, None).unwrap().len(), 3);

        assert!(session.is_closed());
        assert_eq!(session.open_pages(), 0);

        let response = TriggerResponse::from(&report);
        assert_eq!(response.count, 3);
        assert_eq!(response.failed_sources.len(), 1);
        assert_eq!(response.failed_sources[0].site, SiteId::Internshala);
    }

    #[tokio::test]
    async fn rerun_converges_instead_of_duplicating() {
        let listing = r#"<div id="internship_list_container_1">
            <div id="individual_internship_1"><h3 class="job-internship-name">
            <a class="job-title-href" href="/internship/detail/a-1">Alpha</a></h3></div></div>"#;
        let build = || {
            makeintern_pages(
                FakeFetcher::new()
                    .page(INTERNSHALA_LISTING, listing)
                    .page(
                        "https://internshala.com/internship/detail/a-1",
                        r#"<div class="internship_meta"><div class="apply_by"><div class="item_body">1/4/2024</div></div></div>"#,
                    ),
                2,
            )
        };

        let (conn, session, harvesters) = setup(build());
        let first = Pipeline::new(&conn, session, harvesters).run().await;
        assert_eq!(first.state, RunState::Completed);
        assert_eq!(first.count, 3);

        let session = Arc::new(BrowserSession::new(Arc::new(build())));
        let harvesters = [SiteId::Internshala, SiteId::MakeIntern]
            .into_iter()
            .map(|site| Harvester::new(fast(site), Arc::clone(&session)).unwrap())
            .collect();
        let second = Pipeline::new(&conn, session, harvesters).run().await;
        assert_eq!(second.count, 3);

        let stored = db::fetch_listings(&conn, None, None).unwrap();
        assert_eq!(stored.len(), 3);
        let alpha = db::fetch_listing(&conn, "https://internshala.com/internship/detail/a-1")
            .unwrap()
            .unwrap();
        assert_eq!(alpha.apply_by, "2024-04-01");
    }

    #[tokio::test]
    async fn unpersistable_records_are_counted_not_fatal() {
        let listing = r#"<div id="internship_list_container_1">
            <div id="individual_internship_1"><p class="company-name">No link</p></div>
            <div id="individual_internship_2"><h3 class="job-internship-name">
            <a class="job-title-href" href="/internship/detail/b-2">Beta</a></h3></div></div>"#;
        let fetcher = makeintern_pages(
            FakeFetcher::new()
                .page(INTERNSHALA_LISTING, listing)
                .hanging("https://internshala.com/internship/detail/b-2"),
            1,
        );
        let (conn, session, harvesters) = setup(fetcher);

        let report = Pipeline::new(&conn, session, harvesters).run().await;
        let internshala = &report.sources[0];
        assert_eq!(internshala.status, SourceStatus::PartiallyCompleted);
        assert_eq!(internshala.listed, 2);
        assert_eq!(internshala.persistence_failures, 1);
        assert_eq!(internshala.persisted, 1);
        assert_eq!(internshala.degraded, 2);
        assert_eq!(report.count, 2);
        assert_eq!(report.state, RunState::CompletedWithErrors);

        let beta = db::fetch_listing(&conn, "https://internshala.com/internship/detail/b-2")
            .unwrap()
            .unwrap();
        assert_eq!(beta.apply_by, "");
        assert_eq!(beta.logo_url, "https://internshala.com/favicon.ico");
    }

    #[tokio::test]
    async fn panicking_source_fails_alone_and_releases_pages() {
        let listing = r#"<div id="internship_list_container_1">
            <div id="individual_internship_1"><h3 class="job-internship-name">
            <a class="job-title-href" href="/internship/detail/a-1">Alpha</a></h3></div>
            <div id="individual_internship_2"><h3 class="job-internship-name">
            <a class="job-title-href" href="/internship/detail/b-2">Beta</a></h3></div></div>"#;
        let fetcher = makeintern_pages(
            FakeFetcher::new()
                .page(INTERNSHALA_LISTING, listing)
                .page(
                    "https://internshala.com/internship/detail/a-1",
                    r#"<div class="internship_meta"><div class="apply_by"><div class="item_body">1/4/2024</div></div></div>"#,
                )
                .panicking("https://internshala.com/internship/detail/b-2"),
            2,
        );
        let (conn, session, harvesters) = setup(fetcher);

        let report = Pipeline::new(&conn, Arc::clone(&session), harvesters).run().await;

        assert_eq!(report.state, RunState::CompletedWithErrors);
        let internshala = &report.sources[0];
        assert_eq!(internshala.status, SourceStatus::Failed);
        assert_eq!(internshala.persisted, 1);
        assert_eq!(internshala.listed, 1);
        assert!(internshala
            .error
            .as_deref()
            .is_some_and(|e| e.contains("after 1 of its records")));

        let makeintern = &report.sources[1];
        assert_eq!(makeintern.status, SourceStatus::Completed);
        assert_eq!(makeintern.persisted, 2);
        assert_eq!(report.count, 3);
        assert_eq!(db::fetch_listings(&conn, None, None).unwrap().len(), 3);

        assert_eq!(session.open_pages(), 0);
        assert!(session.is_closed());
    }

    #[test]
    fn failure_without_records_keeps_plain_error() {
        let mut report = SourceReport::new(SiteId::MakeIntern);
        report.finish(Err("listing page unavailable".into()));
        assert_eq!(report.status, SourceStatus::Failed);
        assert_eq!(report.listed, 0);
        assert_eq!(report.error.as_deref(), Some("listing page unavailable"));
    }

    #[tokio::test]
    async fn empty_pipeline_completes() {
        let conn = db::connect_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        let session = Arc::new(BrowserSession::new(Arc::new(FakeFetcher::new())));
        let pipeline = Pipeline::new(&conn, Arc::clone(&session), Vec::new());
        assert_eq!(pipeline.state(), RunState::Idle);
        let report = pipeline.run().await;
        assert_eq!(report.state, RunState::Completed);
        assert_eq!(report.count, 0);
        assert!(session.is_closed());
    }
}
