use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder stored for optional posting fields the marketplace omitted.
pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyword {
    pub id: i64,
    pub text: String,
    pub processed: bool,
}

/// Either the engagement length (hourly work) or the budget (fixed-price work).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriceDetail {
    Duration(String),
    FixedBudget(String),
}

impl PriceDetail {
    pub fn as_str(&self) -> &str {
        match self {
            PriceDetail::Duration(s) | PriceDetail::FixedBudget(s) => s,
        }
    }
}

/// One job tile as read off a search results page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedJob {
    pub title: String,
    /// Absolute posting URL.
    pub url: String,
    /// e.g. "Posted 45 minutes ago"
    pub posted_text: Option<String>,
    pub payment_type: Option<String>,
    pub experience_level: Option<String>,
    pub price_detail: Option<PriceDetail>,
    pub description: Option<String>,
    pub skills: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPosting {
    /// The posting URL; unique across the store.
    pub id: String,
    pub title: String,
    pub url: String,
    pub description: String,
    pub posted_at: DateTime<Utc>,
    pub category: String,
    pub skills: Vec<String>,
    pub price_type: String,
    pub price_value: String,
    pub source_keyword: String,
}

impl JobPosting {
    /// Assemble the stored record, substituting `N/A` for anything missing.
    pub fn from_extracted(job: ExtractedJob, keyword: &str, posted_at: DateTime<Utc>) -> Self {
        let skills = if job.skills.is_empty() {
            vec![NOT_AVAILABLE.to_string()]
        } else {
            job.skills
        };

        Self {
            id: job.url.clone(),
            title: job.title,
            url: job.url,
            description: job.description.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            posted_at,
            category: job
                .experience_level
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            skills,
            price_type: job.payment_type.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            price_value: job
                .price_detail
                .map(|detail| detail.as_str().to_string())
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            source_keyword: keyword.to_string(),
        }
    }
}
