use std::collections::BTreeMap;

use scraper::Html;
use url::Url;

use super::{attr_of, element_text, first, resolve_href, text_of, CssSelector, SelectorTable};
use crate::error::ConfigError;
use crate::model::{DetailFields, RawListing, SiteId};

pub const DEFAULT_SELECTORS: &[(&str, &str)] = &[
    ("card", "div#internship-content"),
    (
        "apply_link",
        r#"div.view a.pull-right.btn.btn-default.btn-setting[href^="http"]"#,
    ),
    ("detail_container", "#internship-content"),
    ("title", "h1.intern_headings"),
    ("detail_row", "div.detail_inner ul.students-rank li"),
    ("row_label", ".pull-left.lefty-part"),
    ("row_value", ".pull-right.righty-part"),
    ("logo", ".logo_details img"),
];

#[derive(Debug, Clone)]
pub struct Selectors {
    pub card: CssSelector,
    pub apply_link: CssSelector,
    pub detail_container: CssSelector,
    pub title: CssSelector,
    pub detail_row: CssSelector,
    pub row_label: CssSelector,
    pub row_value: CssSelector,
    pub logo: CssSelector,
}

impl Selectors {
    pub fn compile(overrides: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let t = SelectorTable::new(SiteId::MakeIntern, DEFAULT_SELECTORS, overrides);
        Ok(Self {
            card: t.get("card")?,
            apply_link: t.get("apply_link")?,
            detail_container: t.get("detail_container")?,
            title: t.get("title")?,
            detail_row: t.get("detail_row")?,
            row_label: t.get("row_label")?,
            row_value: t.get("row_value")?,
            logo: t.get("logo")?,
        })
    }
}

/// Detail fields a row label maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowField {
    Company,
    Location,
    Stipend,
    ApplyBy,
    Duration,
}

fn classify_label(label: &str) -> Option<RowField> {
    let key: String = label
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    match key.as_str() {
        "by:" => Some(RowField::Company),
        "location(s):" => Some(RowField::Location),
        "stipend:" => Some(RowField::Stipend),
        "duration:" => Some(RowField::Duration),
        k if k.contains("lastapplydate") => Some(RowField::ApplyBy),
        _ => None,
    }
}

/// Listing cards only carry the detail-page link; cards without one are skipped.
pub fn extract_listing(doc: &Html, sel: &Selectors) -> Vec<RawListing> {
    doc.select(sel.card.selector())
        .filter_map(|card| attr_of(card, &sel.apply_link, "href"))
        .map(RawListing::from_link)
        .collect()
}

pub fn extract_detail(doc: &Html, sel: &Selectors, page_url: &str) -> DetailFields {
    let Some(root) = doc.select(sel.detail_container.selector()).next() else {
        return DetailFields::default();
    };

    let mut detail = DetailFields {
        title: Some(text_of(root, &sel.title)).filter(|t| !t.is_empty()),
        canonical_link: Some(page_url.to_string()).filter(|u| !u.is_empty()),
        ..Default::default()
    };

    for row in root.select(sel.detail_row.selector()) {
        let (Some(label), Some(value)) = (first(row, &sel.row_label), first(row, &sel.row_value))
        else {
            continue;
        };
        let value = element_text(value);
        let slot = match classify_label(&element_text(label)) {
            Some(RowField::Company) => &mut detail.company,
            Some(RowField::Location) => &mut detail.location,
            Some(RowField::Stipend) => &mut detail.stipend,
            Some(RowField::ApplyBy) => &mut detail.apply_by,
            Some(RowField::Duration) => &mut detail.duration,
            None => continue,
        };
        *slot = Some(value);
    }

    detail.logo_url = attr_of(root, &sel.logo, "src").map(|src| match Url::parse(page_url) {
        Ok(base) => resolve_href(&base, &src),
        Err(_) => src,
    });

    detail
}
