//! In-memory `Fetcher` for tests: canned pages, failures, hangs and panics keyed by URL.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::browser::{FetchedPage, Fetcher};
use crate::error::PageError;

enum Route {
    Page(FetchedPage),
    Fail(String),
    Hang,
    Panic,
}

#[derive(Default)]
pub struct FakeFetcher {
    routes: HashMap<String, Route>,
    calls: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, url: &str, html: &str) -> Self {
        self.redirected(url, url, html)
    }

    pub fn redirected(mut self, url: &str, final_url: &str, html: &str) -> Self {
        self.routes.insert(
            url.to_string(),
            Route::Page(FetchedPage {
                final_url: final_url.to_string(),
                html: html.to_string(),
            }),
        );
        self
    }

    pub fn failing(mut self, url: &str, reason: &str) -> Self {
        self.routes.insert(url.to_string(), Route::Fail(reason.to_string()));
        self
    }

    pub fn hanging(mut self, url: &str) -> Self {
        self.routes.insert(url.to_string(), Route::Hang);
        self
    }

    /// Panics inside `fetch`, like a page evaluation blowing up mid-harvest.
    pub fn panicking(mut self, url: &str) -> Self {
        self.routes.insert(url.to_string(), Route::Panic);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, PageError> {
        self.calls.lock().unwrap().push(url.to_string());
        match self.routes.get(url) {
            Some(Route::Page(page)) => Ok(page.clone()),
            Some(Route::Fail(reason)) => Err(PageError::Navigation {
                url: url.to_string(),
                reason: reason.clone(),
            }),
            Some(Route::Hang) => std::future::pending().await,
            Some(Route::Panic) => panic!("page crashed while loading {}", url),
            None => Err(PageError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}
