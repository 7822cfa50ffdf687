//! Job tile extraction from marketplace search result pages.
//!
//! Extraction is per-tile best-effort: a tile without a title or a link
//! is dropped, every other field is optional and never aborts the page.

use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use tracing::debug;
use upwatch_core::{CoreError, ExtractedJob, MarketplaceError, PriceDetail};
use url::Url;

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

static TILE: LazyLock<Selector> = LazyLock::new(|| selector("article.job-tile"));
static TITLE: LazyLock<Selector> = LazyLock::new(|| selector("h2.job-tile-title"));
static LINK: LazyLock<Selector> = LazyLock::new(|| selector("a.up-n-link[href]"));
// The marketplace ships the misspelled attribute; accept the fixed one too.
static POSTED: LazyLock<Selector> = LazyLock::new(|| {
    selector(r#"small[data-test="job-pubilshed-date"], small[data-test="job-published-date"]"#)
});
static PAYMENT: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"li[data-test="job-type-label"]"#));
static EXPERIENCE: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"li[data-test="experience-level"]"#));
static DURATION: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"li[data-test="duration-label"]"#));
static FIXED_BUDGET: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"li[data-test="is-fixed-price"]"#));
static DESCRIPTION: LazyLock<Selector> = LazyLock::new(|| selector("div.air3-line-clamp"));
static SKILL: LazyLock<Selector> = LazyLock::new(|| selector(r#"span[data-test="token"]"#));

#[derive(Debug, Clone)]
pub struct JobExtractor {
    base_url: Url,
}

impl JobExtractor {
    /// `base_url` completes the relative links found on tiles.
    pub fn new(base_url: &str) -> Result<Self, CoreError> {
        let base_url = Url::parse(base_url).map_err(|_| MarketplaceError::InvalidUrl {
            url: base_url.to_string(),
        })?;
        Ok(Self { base_url })
    }

    /// All well-formed job tiles in document order.
    pub fn extract(&self, html: &str) -> Vec<ExtractedJob> {
        let document = Html::parse_document(html);
        let mut jobs = Vec::new();

        for (index, tile) in document.select(&TILE).enumerate() {
            match self.extract_tile(tile) {
                Some(job) => jobs.push(job),
                None => debug!("Skipping job tile #{}: missing title or link", index),
            }
        }

        jobs
    }

    fn extract_tile(&self, tile: ElementRef<'_>) -> Option<ExtractedJob> {
        let title = first_text(tile, &TITLE)?;
        let href = tile
            .select(&LINK)
            .filter_map(|a| a.value().attr("href"))
            .map(str::trim)
            .find(|href| !href.is_empty())?;
        let url = self.base_url.join(href).ok()?.to_string();

        let price_detail = first_text(tile, &DURATION)
            .map(PriceDetail::Duration)
            .or_else(|| first_text(tile, &FIXED_BUDGET).map(PriceDetail::FixedBudget));

        let skills = tile
            .select(&SKILL)
            .map(element_text)
            .filter(|skill| !skill.is_empty())
            .collect();

        Some(ExtractedJob {
            title,
            url,
            posted_text: first_text(tile, &POSTED),
            payment_type: first_text(tile, &PAYMENT),
            experience_level: first_text(tile, &EXPERIENCE),
            price_detail,
            description: first_text(tile, &DESCRIPTION),
            skills,
        })
    }
}

/// Trimmed text fragments joined by single spaces.
fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|fragment| !fragment.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_text(tile: ElementRef<'_>, selector: &Selector) -> Option<String> {
    tile.select(selector)
        .next()
        .map(element_text)
        .filter(|text| !text.is_empty())
}
