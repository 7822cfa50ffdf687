use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use upwatch_core::{CoreError, MarketplaceConfig, MarketplaceError};
use url::Url;

/// Body fragments served by common bot-check interstitials.
const CHALLENGE_MARKERS: &[&str] = &[
    "Just a moment...",
    "cf-chl-",
    "challenge-platform",
    "Attention Required!",
    "Checking your browser",
];

/// Source of raw search result pages, one keyword at a time.
#[async_trait]
pub trait JobFeed: Send + Sync {
    /// HTML of the first page of results for `keyword`, newest first.
    async fn fetch_search_page(&self, keyword: &str) -> Result<String, CoreError>;
}

/// `"web scraping"` becomes `"(web AND scraping)"`.
pub fn build_search_query(keyword: &str) -> String {
    let terms: Vec<&str> = keyword.split_whitespace().collect();
    format!("({})", terms.join(" AND "))
}

pub fn search_params(keyword: &str) -> [(&'static str, String); 3] {
    [
        ("q", build_search_query(keyword)),
        ("sort", "recency".to_string()),
        ("page", "1".to_string()),
    ]
}

/// Whether a response is a bot-check interstitial rather than real content.
pub fn looks_like_challenge(status: StatusCode, headers: &HeaderMap, body: &str) -> bool {
    if headers
        .get("cf-mitigated")
        .map_or(false, |v| v.as_bytes().eq_ignore_ascii_case(b"challenge"))
    {
        return true;
    }

    matches!(status.as_u16(), 403 | 429 | 503)
        && CHALLENGE_MARKERS.iter().any(|marker| body.contains(marker))
}

enum FetchOutcome {
    Page(String),
    Challenge(StatusCode),
}

#[derive(Debug)]
pub struct MarketplaceClient {
    http_client: Client,
    search_url: Url,
    challenge_retries: u32,
    challenge_wait: Duration,
}

impl MarketplaceClient {
    pub fn new(config: &MarketplaceConfig) -> Result<Self, CoreError> {
        let search_url = Url::parse(&config.search_url).map_err(|_| MarketplaceError::InvalidUrl {
            url: config.search_url.clone(),
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.9"),
        );
        headers.insert(
            reqwest::header::UPGRADE_INSECURE_REQUESTS,
            HeaderValue::from_static("1"),
        );
        headers.insert("Sec-Fetch-Dest", HeaderValue::from_static("document"));
        headers.insert("Sec-Fetch-Mode", HeaderValue::from_static("navigate"));
        headers.insert("Sec-Fetch-Site", HeaderValue::from_static("none"));

        // Challenge clearance cookies must survive between attempts.
        let http_client = Client::builder()
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .timeout(config.request_timeout())
            .connect_timeout(config.request_timeout())
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        Ok(Self {
            http_client,
            search_url,
            challenge_retries: config.challenge_retries,
            challenge_wait: config.challenge_wait(),
        })
    }

    async fn fetch_once(&self, keyword: &str) -> Result<FetchOutcome, CoreError> {
        let start_time = Instant::now();
        let response = self
            .http_client
            .get(self.search_url.clone())
            .query(&search_params(keyword))
            .send()
            .await
            .map_err(|e| {
                error!("Network error fetching jobs for '{}': {}", keyword, e);
                if e.is_timeout() {
                    CoreError::Marketplace(MarketplaceError::RequestTimeout)
                } else {
                    CoreError::Network(e)
                }
            })?;

        let status = response.status();
        let headers = response.headers().clone();
        info!(
            "Fetching jobs from {} for '{}'... Status Code: {}",
            self.search_url,
            keyword,
            status.as_u16()
        );

        // Invalid byte sequences are replaced rather than rejected.
        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                CoreError::Marketplace(MarketplaceError::RequestTimeout)
            } else {
                CoreError::Network(e)
            }
        })?;
        let body = String::from_utf8_lossy(&bytes).into_owned();
        debug!(
            "Read {} bytes for '{}' in {:?}",
            bytes.len(),
            keyword,
            start_time.elapsed()
        );

        if looks_like_challenge(status, &headers, &body) {
            return Ok(FetchOutcome::Challenge(status));
        }

        if !status.is_success() {
            return Err(CoreError::Marketplace(MarketplaceError::HttpStatus {
                status_code: status.as_u16(),
                url: self.search_url.to_string(),
            }));
        }

        Ok(FetchOutcome::Page(body))
    }
}

#[async_trait]
impl JobFeed for MarketplaceClient {
    async fn fetch_search_page(&self, keyword: &str) -> Result<String, CoreError> {
        let attempts = self.challenge_retries + 1;

        for attempt in 1..=attempts {
            match self.fetch_once(keyword).await? {
                FetchOutcome::Page(body) => return Ok(body),
                FetchOutcome::Challenge(status) => {
                    warn!(
                        "Bot challenge (HTTP {}) for '{}' on attempt {}/{}",
                        status.as_u16(),
                        keyword,
                        attempt,
                        attempts
                    );
                    if attempt < attempts {
                        sleep(self.challenge_wait).await;
                    }
                }
            }
        }

        Err(CoreError::Marketplace(MarketplaceError::ChallengeNotPassed { attempts }))
    }
}
