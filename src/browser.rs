//! Shared automation session and short-lived page contexts.
//!
//! A `BrowserSession` is created once per run and shared by every harvester.
//! Each navigation happens on a `PageContext`, which is released when dropped,
//! so early returns, `?` and panics all give the page back.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::task;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::PageError;
use crate::extract::CssSelector;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// A rendered document and the URL it ended up at after redirects.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub final_url: String,
    pub html: String,
}

/// Loads a document for a page context.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, PageError>;
}

/// `Fetcher` backed by a browser-like reqwest client.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(user_agent: Option<&str>) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            reqwest::header::HeaderValue::from_static("en-US,en;q=0.5"),
        );

        let client = reqwest::Client::builder()
            .user_agent(user_agent.unwrap_or(USER_AGENT))
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, PageError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PageError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PageError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().to_string();
        let html = response.text().await.map_err(|e| PageError::Navigation {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        Ok(FetchedPage { final_url, html })
    }
}

// ── Session ──

pub struct BrowserSession {
    fetcher: Arc<dyn Fetcher>,
    open_pages: Arc<AtomicUsize>,
    pages_opened: AtomicUsize,
    closed: AtomicBool,
}

impl BrowserSession {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            open_pages: Arc::new(AtomicUsize::new(0)),
            pages_opened: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn launch(user_agent: Option<&str>) -> Result<Self> {
        let fetcher = HttpFetcher::new(user_agent)?;
        info!("Browser session launched");
        Ok(Self::new(Arc::new(fetcher)))
    }

    pub fn new_page(&self) -> Result<PageContext, PageError> {
        if self.is_closed() {
            return Err(PageError::SessionClosed);
        }
        self.open_pages.fetch_add(1, Ordering::SeqCst);
        self.pages_opened.fetch_add(1, Ordering::Relaxed);
        Ok(PageContext {
            fetcher: Arc::clone(&self.fetcher),
            open_pages: Arc::clone(&self.open_pages),
            current: None,
            requested_url: String::new(),
        })
    }

    /// Page contexts currently alive.
    pub fn open_pages(&self) -> usize {
        self.open_pages.load(Ordering::SeqCst)
    }

    pub fn pages_opened(&self) -> usize {
        self.pages_opened.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Close the session. Returns `true` only for the call that actually closed it.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        let leaked = self.open_pages();
        if leaked > 0 {
            warn!(leaked, "Browser session closed with open pages");
        }
        info!(pages = self.pages_opened(), "Browser session closed");
        true
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.close();
    }
}

// ── Page context ──

/// One navigation's worth of browsing state. Dropping it releases the page.
pub struct PageContext {
    fetcher: Arc<dyn Fetcher>,
    open_pages: Arc<AtomicUsize>,
    current: Option<FetchedPage>,
    requested_url: String,
}

impl PageContext {
    pub async fn goto(&mut self, url: &str, limit: Duration) -> Result<(), PageError> {
        debug!(url, "Navigating");
        self.requested_url = url.to_string();
        let page = timeout(limit, self.fetcher.fetch(url))
            .await
            .map_err(|_| PageError::Timeout {
                step: "navigation",
                url: url.to_string(),
                after: limit,
            })??;
        self.current = Some(page);
        Ok(())
    }

    /// Wait for the loaded document to contain `selector`.
    ///
    /// A fetched document does not change after `goto`, so it is evaluated
    /// once on a blocking thread within `limit` and never downloaded again.
    pub async fn wait_for_selector(
        &self,
        selector: &CssSelector,
        limit: Duration,
    ) -> Result<(), PageError> {
        let html = self.html()?.to_string();
        let url = self.requested_url.clone();
        let wanted = selector.clone();

        let found = timeout(limit, task::spawn_blocking(move || wanted.matches_in(&html)))
            .await
            .map_err(|_| PageError::Timeout {
                step: "wait for selector",
                url: url.clone(),
                after: limit,
            })?
            .map_err(|e| PageError::Evaluation {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        if found {
            Ok(())
        } else {
            debug!(url = url.as_str(), selector = selector.as_str(), "Selector absent from document");
            Err(PageError::SelectorMissing {
                selector: selector.as_str().to_string(),
                url,
            })
        }
    }

    pub fn html(&self) -> Result<&str, PageError> {
        self.current
            .as_ref()
            .map(|p| p.html.as_str())
            .ok_or(PageError::NotLoaded)
    }

    /// URL of the loaded document after redirects.
    pub fn url(&self) -> &str {
        self.current
            .as_ref()
            .map(|p| p.final_url.as_str())
            .unwrap_or(&self.requested_url)
    }
}

impl Drop for PageContext {
    fn drop(&mut self) {
        self.open_pages.fetch_sub(1, Ordering::SeqCst);
    }
}
