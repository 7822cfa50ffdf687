pub mod notifier;
pub mod pipeline;
pub mod scheduler;

pub use notifier::{render_job_alert, render_skills, EmailMessage, Mailer, Notifier, SmtpMailer};
pub use pipeline::{JobPipeline, PipelineReport};
pub use scheduler::{
    sample_delay, CycleOutcome, CycleReport, CycleScheduler, ScheduleClock, SchedulerSettings,
};

use database::Database;
use marketplace_client::{JobExtractor, MarketplaceClient};
use std::sync::Arc;
use tracing::info;
use upwatch_core::{AppConfig, CoreError};

/// The polling service wired from configuration.
pub struct BackgroundService {
    db: Arc<Database>,
    scheduler: CycleScheduler,
}

impl BackgroundService {
    /// Open the store, seed keywords and build the scraping pipeline.
    pub async fn from_config(config: &AppConfig) -> Result<Self, CoreError> {
        let db = Arc::new(Database::open(&config.database.url).await?);
        db.seed_keywords(&config.keywords).await?;

        let feed = Arc::new(MarketplaceClient::new(&config.marketplace)?);
        let extractor = JobExtractor::new(&config.marketplace.base_url)?;

        let mailer = Arc::new(SmtpMailer::new(&config.mail)?);
        let notifier = Notifier::new(
            mailer,
            config.mail.recipient.clone(),
            config.display.zone()?,
            config.display.label_override().map(str::to_string),
        );

        let pipeline = JobPipeline::new(db.clone(), feed, extractor, notifier);
        let scheduler = CycleScheduler::new(
            db.clone(),
            pipeline,
            SchedulerSettings::from(&config.schedule),
        );

        Ok(Self { db, scheduler })
    }

    /// Runs until an invocation fails.
    pub async fn start(&self) -> Result<(), CoreError> {
        info!(
            "Polling every {:?}",
            self.scheduler.settings().interval
        );
        self.scheduler.run_forever().await
    }

    pub async fn stop(&self) {
        self.db.close().await;
        info!("Background service stopped");
    }
}
