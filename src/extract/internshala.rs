use std::collections::BTreeMap;

use scraper::{ElementRef, Html};
use url::Url;

use super::{element_text, first, text_of, CssSelector, SelectorTable};
use crate::error::ConfigError;
use crate::model::{DetailFields, RawListing, SiteId};

pub const DEFAULT_SELECTORS: &[(&str, &str)] = &[
    ("listing_container", "#internship_list_container_1"),
    ("card", r#"[id^="individual_internship_"]"#),
    ("title_link", "h3.job-internship-name a.job-title-href"),
    ("company", "p.company-name"),
    ("location", ".row-1-item.locations span a"),
    ("duration_icon", ".ic-16-calendar"),
    ("duration_value", "span"),
    ("stipend", "span.stipend"),
    ("detail_container", ".internship_meta"),
    ("apply_by", ".apply_by .item_body"),
];

#[derive(Debug, Clone)]
pub struct Selectors {
    pub listing_container: CssSelector,
    pub card: CssSelector,
    pub title_link: CssSelector,
    pub company: CssSelector,
    pub location: CssSelector,
    pub duration_icon: CssSelector,
    pub duration_value: CssSelector,
    pub stipend: CssSelector,
    pub detail_container: CssSelector,
    pub apply_by: CssSelector,
}

impl Selectors {
    pub fn compile(overrides: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let t = SelectorTable::new(SiteId::Internshala, DEFAULT_SELECTORS, overrides);
        Ok(Self {
            listing_container: t.get("listing_container")?,
            card: t.get("card")?,
            title_link: t.get("title_link")?,
            company: t.get("company")?,
            location: t.get("location")?,
            duration_icon: t.get("duration_icon")?,
            duration_value: t.get("duration_value")?,
            stipend: t.get("stipend")?,
            detail_container: t.get("detail_container")?,
            apply_by: t.get("apply_by")?,
        })
    }
}

/// Every card inside the listing container, in page order.
pub fn extract_listing(doc: &Html, sel: &Selectors, base: &Url) -> Vec<RawListing> {
    let Some(container) = doc.select(sel.listing_container.selector()).next() else {
        return Vec::new();
    };
    container
        .select(sel.card.selector())
        .map(|card| extract_card(card, sel, base))
        .collect()
}

fn extract_card(card: ElementRef, sel: &Selectors, base: &Url) -> RawListing {
    let anchor = first(card, &sel.title_link);
    let title = anchor.map(element_text).unwrap_or_default();
    let link = anchor
        .and_then(|a| a.value().attr("href"))
        .filter(|href| !href.trim().is_empty())
        .map(|href| super::resolve_href(base, href))
        .unwrap_or_default();

    // Duration sits in a sibling span of the calendar icon
    let duration = first(card, &sel.duration_icon)
        .and_then(|icon| icon.parent())
        .and_then(ElementRef::wrap)
        .map(|parent| text_of(parent, &sel.duration_value))
        .unwrap_or_default();

    RawListing {
        title,
        link,
        company: text_of(card, &sel.company),
        location: text_of(card, &sel.location),
        duration,
        stipend: text_of(card, &sel.stipend),
    }
}

pub fn extract_detail(doc: &Html, sel: &Selectors) -> DetailFields {
    let apply_by = doc
        .select(sel.detail_container.selector())
        .next()
        .map(|meta| text_of(meta, &sel.apply_by))
        .filter(|s| !s.is_empty());

    DetailFields {
        apply_by,
        ..Default::default()
    }
}
