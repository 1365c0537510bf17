use chrono::Local;
use serde::Serialize;

use crate::db::StoredListing;

/// Client-facing shape of a stored listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingResponse {
    pub id: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub salary: String,
    pub deadline: String,
    pub source: String,
    pub description: String,
    pub logo_url: String,
    pub tags: Vec<String>,
    pub skills: Vec<String>,
    pub apply_by: String,
    pub link: String,
}

impl From<StoredListing> for ListingResponse {
    fn from(l: StoredListing) -> Self {
        let scraped = l
            .scraped_at
            .map(|t| t.with_timezone(&Local).format("%-m/%-d/%Y, %-I:%M:%S %p").to_string())
            .unwrap_or_default();
        let source = if l.source_site.trim().is_empty() {
            "Unknown".to_string()
        } else {
            l.source_site
        };

        ListingResponse {
            id: l.id.to_string(),
            title: l.title,
            company: l.company,
            location: l.location,
            salary: l.stipend,
            deadline: l.apply_by.clone(),
            source,
            description: format!("Scraped at: {}", scraped),
            logo_url: l.logo_url,
            tags: l.tags,
            skills: l.skills,
            apply_by: l.apply_by,
            link: l.link,
        }
    }
}
