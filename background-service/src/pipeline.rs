use crate::notifier::Notifier;
use database::Database;
use marketplace_client::{JobExtractor, JobFeed};
use std::ops::AddAssign;
use std::sync::Arc;
use tracing::{debug, info};
use upwatch_core::posted_time::posted_at_from_now;
use upwatch_core::{CoreError, ErrorRecovery, ExtractedJob, JobPosting};

/// Tally for one keyword, or summed over a cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineReport {
    pub fetch_failures: usize,
    pub extracted: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub notified: usize,
    pub notify_failures: usize,
}

impl AddAssign for PipelineReport {
    fn add_assign(&mut self, other: Self) {
        self.fetch_failures += other.fetch_failures;
        self.extracted += other.extracted;
        self.inserted += other.inserted;
        self.duplicates += other.duplicates;
        self.notified += other.notified;
        self.notify_failures += other.notify_failures;
    }
}

/// Fetch, extract, dedup and persist the postings for a single keyword.
pub struct JobPipeline {
    db: Arc<Database>,
    feed: Arc<dyn JobFeed>,
    extractor: JobExtractor,
    notifier: Notifier,
}

impl JobPipeline {
    pub fn new(
        db: Arc<Database>,
        feed: Arc<dyn JobFeed>,
        extractor: JobExtractor,
        notifier: Notifier,
    ) -> Self {
        Self {
            db,
            feed,
            extractor,
            notifier,
        }
    }

    /// A failed fetch yields an empty result. Only persistence errors
    /// escape.
    pub async fn run_keyword(&self, keyword: &str, notify: bool) -> Result<PipelineReport, CoreError> {
        let page = self.feed.fetch_search_page(keyword).await;
        let context = format!("Fetching jobs for '{}'", keyword);

        let Some(html) = ErrorRecovery::recover(page, &context)? else {
            return Ok(PipelineReport {
                fetch_failures: 1,
                ..PipelineReport::default()
            });
        };

        let jobs = self.extractor.extract(&html);
        info!("Found {} jobs for '{}'", jobs.len(), keyword);

        self.persist_new(keyword, jobs, notify).await
    }

    /// Insert every job whose URL has not been stored yet and, when
    /// `notify` is set, send one alert per insert.
    pub async fn persist_new(
        &self,
        keyword: &str,
        jobs: Vec<ExtractedJob>,
        notify: bool,
    ) -> Result<PipelineReport, CoreError> {
        let mut report = PipelineReport {
            extracted: jobs.len(),
            ..PipelineReport::default()
        };

        for job in jobs {
            if self.db.posting_exists(&job.url).await? {
                debug!("Already stored: {}", job.url);
                report.duplicates += 1;
                continue;
            }

            let posted_at = posted_at_from_now(job.posted_text.as_deref().unwrap_or_default());
            let posting = JobPosting::from_extracted(job, keyword, posted_at);

            self.db.insert_posting(&posting).await?;
            report.inserted += 1;
            info!("Stored new job: {}", posting.title);

            if !notify {
                continue;
            }

            let context = format!("Sending alert for {}", posting.url);
            match ErrorRecovery::recover(self.notifier.notify(&posting).await, &context)? {
                Some(()) => report.notified += 1,
                None => report.notify_failures += 1,
            }
        }

        Ok(report)
    }
}
