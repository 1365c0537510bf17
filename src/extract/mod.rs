pub mod internshala;
pub mod makeintern;

use std::collections::BTreeMap;
use std::fmt;

use scraper::{ElementRef, Html, Selector};
use tracing::warn;
use url::Url;

use crate::error::ConfigError;
use crate::model::SiteId;

/// A compiled CSS selector that remembers its source text for logs and errors.
#[derive(Clone)]
pub struct CssSelector {
    raw: String,
    compiled: Selector,
}

impl CssSelector {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let compiled = Selector::parse(raw).map_err(|e| e.to_string())?;
        Ok(Self {
            raw: raw.to_string(),
            compiled,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn selector(&self) -> &Selector {
        &self.compiled
    }

    /// Whether anything in `html` matches.
    pub fn matches_in(&self, html: &str) -> bool {
        Html::parse_document(html)
            .select(&self.compiled)
            .next()
            .is_some()
    }
}

impl fmt::Debug for CssSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CssSelector({:?})", self.raw)
    }
}

/// Built-in selectors for one source, with per-key overrides from config.
pub struct SelectorTable<'a> {
    site: SiteId,
    defaults: &'static [(&'static str, &'static str)],
    overrides: &'a BTreeMap<String, String>,
}

impl<'a> SelectorTable<'a> {
    pub fn new(
        site: SiteId,
        defaults: &'static [(&'static str, &'static str)],
        overrides: &'a BTreeMap<String, String>,
    ) -> Self {
        for key in overrides.keys() {
            if !defaults.iter().any(|(k, _)| k == key) {
                warn!(%site, key = key.as_str(), "Ignoring unknown selector override");
            }
        }
        Self {
            site,
            defaults,
            overrides,
        }
    }

    pub fn get(&self, key: &str) -> Result<CssSelector, ConfigError> {
        let raw = self
            .overrides
            .get(key)
            .map(String::as_str)
            .or_else(|| {
                self.defaults
                    .iter()
                    .find(|(k, _)| *k == key)
                    .map(|(_, v)| *v)
            })
            .unwrap_or_default();
        CssSelector::parse(raw).map_err(|_| ConfigError::InvalidSelector {
            site: self.site,
            key: key.to_string(),
            selector: raw.to_string(),
        })
    }
}

// ── Helpers: absent elements become empty strings, never errors ──

/// Trimmed text content with whitespace runs collapsed.
pub fn element_text(el: ElementRef) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn first<'a>(scope: ElementRef<'a>, sel: &CssSelector) -> Option<ElementRef<'a>> {
    scope.select(sel.selector()).next()
}

pub fn text_of(scope: ElementRef, sel: &CssSelector) -> String {
    first(scope, sel).map(element_text).unwrap_or_default()
}

pub fn attr_of(scope: ElementRef, sel: &CssSelector, attr: &str) -> Option<String> {
    first(scope, sel)
        .and_then(|el| el.value().attr(attr))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Resolve a possibly relative href. Unparseable hrefs are kept as written.
pub fn resolve_href(base: &Url, href: &str) -> String {
    base.join(href.trim())
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.trim().to_string())
}
