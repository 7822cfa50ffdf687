use crate::pipeline::{JobPipeline, PipelineReport};
use database::Database;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};
use upwatch_core::{CoreError, DelayRange, ScheduleConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub interval: Duration,
    pub keyword_delay: DelayRange,
    pub poll_jitter: DelayRange,
    pub shuffle: bool,
}

impl From<&ScheduleConfig> for SchedulerSettings {
    fn from(config: &ScheduleConfig) -> Self {
        Self {
            interval: config.interval(),
            keyword_delay: config.keyword_delay_secs,
            poll_jitter: config.poll_jitter_secs,
            shuffle: config.shuffle,
        }
    }
}

/// Uniform pick from an inclusive range of seconds, at millisecond
/// resolution.
pub fn sample_delay(range: DelayRange) -> Duration {
    let low = range.0.min(range.1).saturating_mul(1000);
    let high = range.0.max(range.1).saturating_mul(1000);
    Duration::from_millis(fastrand::u64(low..=high))
}

/// Next-due bookkeeping for the fixed-interval trigger.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleClock {
    interval: Duration,
    next_due: Instant,
}

impl ScheduleClock {
    pub fn new(started: Instant, interval: Duration) -> Self {
        Self {
            interval,
            next_due: started + interval,
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_due
    }

    pub fn mark_run(&mut self, run_started: Instant) {
        self.next_due = run_started + self.interval;
    }

    pub fn next_due(&self) -> Instant {
        self.next_due
    }
}

/// Holds the `running` flag for the lifetime of one cycle.
struct CycleGuard<'a> {
    running: &'a AtomicBool,
}

impl<'a> CycleGuard<'a> {
    fn try_acquire(running: &'a AtomicBool) -> Option<Self> {
        running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { running })
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub keywords_processed: usize,
    /// Notifications were suppressed for this invocation.
    pub priming: bool,
    pub postings: PipelineReport,
    pub reset: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// Another invocation was still running.
    Skipped,
}

pub struct CycleScheduler {
    db: Arc<Database>,
    pipeline: JobPipeline,
    settings: SchedulerSettings,
    // Set until the first invocation completes; new postings found while
    // set are stored without alerts.
    priming: AtomicBool,
    running: AtomicBool,
}

impl CycleScheduler {
    pub fn new(db: Arc<Database>, pipeline: JobPipeline, settings: SchedulerSettings) -> Self {
        Self {
            db,
            pipeline,
            settings,
            priming: AtomicBool::new(true),
            running: AtomicBool::new(false),
        }
    }

    pub fn is_priming(&self) -> bool {
        self.priming.load(Ordering::Acquire)
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Process every unprocessed keyword once.
    ///
    /// Returns [`CycleOutcome::Skipped`] without touching the store when an
    /// invocation is already in flight. Persistence errors abort the
    /// invocation and leave the priming flag untouched.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, CoreError> {
        let Some(_guard) = CycleGuard::try_acquire(&self.running) else {
            warn!("Cycle already running, skipping this trigger");
            return Ok(CycleOutcome::Skipped);
        };

        let priming = self.is_priming();
        if priming {
            info!("Priming pass: storing current postings without sending alerts");
        }

        let report = self.process_keywords(priming).await?;
        self.priming.store(false, Ordering::Release);

        Ok(CycleOutcome::Completed(report))
    }

    async fn process_keywords(&self, priming: bool) -> Result<CycleReport, CoreError> {
        let mut keywords = self.db.unprocessed_keywords().await?;
        if self.settings.shuffle {
            fastrand::shuffle(&mut keywords);
        }

        let mut report = CycleReport {
            priming,
            ..CycleReport::default()
        };

        for keyword in &keywords {
            report.postings += self.pipeline.run_keyword(&keyword.text, !priming).await?;

            self.db.mark_keyword_processed(keyword.id).await?;
            report.keywords_processed += 1;
            info!("Keyword '{}' processed", keyword.text);

            let delay = sample_delay(self.settings.keyword_delay);
            debug!("Waiting {:?} before the next keyword", delay);
            sleep(delay).await;
        }

        if self.db.count_unprocessed_keywords().await? == 0 {
            info!("All keywords processed. Resetting statuses.");
            self.db.reset_keywords().await?;
            report.reset = true;
        }

        Ok(report)
    }

    /// Run once now, then again every interval until an invocation fails.
    pub async fn run_forever(&self) -> Result<(), CoreError> {
        let mut clock = ScheduleClock::new(Instant::now(), self.settings.interval);
        self.run_and_log().await?;

        loop {
            sleep(sample_delay(self.settings.poll_jitter)).await;

            let now = Instant::now();
            if clock.is_due(now) {
                clock.mark_run(now);
                self.run_and_log().await?;
            }
        }
    }

    async fn run_and_log(&self) -> Result<(), CoreError> {
        if let CycleOutcome::Completed(report) = self.run_cycle().await? {
            info!(
                keywords = report.keywords_processed,
                inserted = report.postings.inserted,
                duplicates = report.postings.duplicates,
                notified = report.postings.notified,
                notify_failures = report.postings.notify_failures,
                fetch_failures = report.postings.fetch_failures,
                reset = report.reset,
                "Cycle finished"
            );
        }
        Ok(())
    }
}
