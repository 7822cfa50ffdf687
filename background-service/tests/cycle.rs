use async_trait::async_trait;
use background_service::{
    CycleOutcome, CycleReport, CycleScheduler, EmailMessage, JobPipeline, Mailer, Notifier,
    SchedulerSettings,
};
use database::Database;
use marketplace_client::{JobExtractor, JobFeed};
use std::collections::HashMap;
use std::env;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::sleep;
use upwatch_core::{CoreError, DatabaseError, DelayRange, MailError, MarketplaceError};

const BASE_URL: &str = "https://www.upwork.com";

/// Serves canned search pages; keywords without a page fail like an
/// upstream 500.
#[derive(Default)]
struct FakeFeed {
    pages: Mutex<HashMap<String, String>>,
    gate: Option<Arc<Notify>>,
    fetches: AtomicUsize,
}

impl FakeFeed {
    fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    fn set_page(&self, keyword: &str, html: String) {
        self.pages
            .lock()
            .unwrap()
            .insert(keyword.to_string(), html);
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobFeed for FakeFeed {
    async fn fetch_search_page(&self, keyword: &str) -> Result<String, CoreError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let page = self.pages.lock().unwrap().get(keyword).cloned();
        page.ok_or_else(|| {
            MarketplaceError::HttpStatus {
                status_code: 500,
                url: format!("{}/nx/search/jobs/?q={}", BASE_URL, keyword),
            }
            .into()
        })
    }
}

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
    failing: AtomicBool,
}

impl RecordingMailer {
    fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), CoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MailError::AuthenticationFailed {
                reason: "535 5.7.8 Username and Password not accepted".to_string(),
            }
            .into());
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

struct Harness {
    db: Arc<Database>,
    feed: Arc<FakeFeed>,
    mailer: Arc<RecordingMailer>,
    scheduler: CycleScheduler,
}

async fn harness(keywords: &[&str], feed: FakeFeed) -> Harness {
    harness_with_interval(keywords, feed, Duration::from_secs(1200)).await
}

async fn harness_with_interval(keywords: &[&str], feed: FakeFeed, interval: Duration) -> Harness {
    let db_path = env::temp_dir().join(format!("test_cycle_{}.db", uuid::Uuid::new_v4()));
    let db = Arc::new(
        Database::open(&format!("sqlite://{}", db_path.display()))
            .await
            .expect("open test database"),
    );
    let keywords: Vec<String> = keywords.iter().map(|k| k.to_string()).collect();
    db.seed_keywords(&keywords).await.unwrap();

    let feed = Arc::new(feed);
    let mailer = Arc::new(RecordingMailer::default());
    let notifier = Notifier::new(
        mailer.clone(),
        "me@example.com".to_string(),
        "Asia/Karachi".parse().unwrap(),
        Some("PKT".to_string()),
    );
    let pipeline = JobPipeline::new(
        db.clone(),
        feed.clone(),
        JobExtractor::new(BASE_URL).unwrap(),
        notifier,
    );
    let settings = SchedulerSettings {
        interval,
        keyword_delay: DelayRange(0, 0),
        poll_jitter: DelayRange(0, 0),
        shuffle: true,
    };

    Harness {
        scheduler: CycleScheduler::new(db.clone(), pipeline, settings),
        db,
        feed,
        mailer,
    }
}

fn tile(title: &str, slug: &str, skills: &[&str]) -> String {
    let tokens: String = skills
        .iter()
        .map(|s| format!(r#"<span data-test="token">{}</span>"#, s))
        .collect();
    format!(
        r#"<article class="job-tile">
             <small data-test="job-pubilshed-date">Posted 45 minutes ago</small>
             <h2 class="job-tile-title"><a class="up-n-link" href="/jobs/{slug}/">{title}</a></h2>
             <ul>
               <li data-test="job-type-label">Hourly</li>
               <li data-test="experience-level">Expert</li>
               <li data-test="duration-label">1 to 3 months</li>
             </ul>
             <div class="air3-line-clamp">Work on {title}</div>
             <div>{tokens}</div>
           </article>"#,
        slug = slug,
        title = title,
        tokens = tokens
    )
}

fn page(tiles: &[String]) -> String {
    format!("<html><body><section>{}</section></body></html>", tiles.concat())
}

fn completed(outcome: CycleOutcome) -> CycleReport {
    match outcome {
        CycleOutcome::Completed(report) => report,
        CycleOutcome::Skipped => panic!("cycle unexpectedly skipped"),
    }
}

#[tokio::test]
async fn first_invocation_primes_without_alerts_then_second_notifies() {
    let h = harness(&["web scraping"], FakeFeed::default()).await;
    let scraper = tile("Scraper", "Scraper_~01a", &["python", "automation"]);
    h.feed.set_page("web scraping", page(&[scraper.clone()]));

    let first = completed(h.scheduler.run_cycle().await.unwrap());
    assert!(first.priming);
    assert_eq!(first.postings.inserted, 1);
    assert_eq!(first.postings.notified, 0);
    assert!(h.mailer.sent().is_empty());
    assert!(!h.scheduler.is_priming());

    let dashboard = tile("Dashboard", "Dashboard_~01b", &[]);
    h.feed.set_page("web scraping", page(&[scraper, dashboard]));

    let second = completed(h.scheduler.run_cycle().await.unwrap());
    assert!(!second.priming);
    assert_eq!(second.postings.inserted, 1);
    assert_eq!(second.postings.duplicates, 1);
    assert_eq!(second.postings.notified, 1);

    let sent = h.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "New Job Alert: Dashboard");
    assert_eq!(sent[0].to, "me@example.com");
    assert!(sent[0].html_body.contains("<strong>Skills:</strong> N/A"));
    assert!(sent[0].html_body.contains("<strong>Keyword:</strong> web scraping"));
}

#[tokio::test]
async fn alert_lists_skills_comma_joined() {
    let h = harness(&["django"], FakeFeed::default()).await;
    h.feed.set_page("django", page(&[]));
    completed(h.scheduler.run_cycle().await.unwrap());

    h.feed.set_page(
        "django",
        page(&[tile("Bot", "Bot_~01c", &["python", "automation"])]),
    );
    completed(h.scheduler.run_cycle().await.unwrap());

    let sent = h.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0]
        .html_body
        .contains("<strong>Skills:</strong> python, automation"));
}

#[tokio::test]
async fn rerunning_same_content_inserts_nothing() {
    let h = harness(&["flask", "fastapi"], FakeFeed::default()).await;
    let shared = tile("API work", "API_~01d", &["python"]);
    h.feed.set_page("flask", page(&[shared.clone()]));
    h.feed.set_page(
        "fastapi",
        page(&[shared, tile("Other", "Other_~01e", &[])]),
    );

    let first = completed(h.scheduler.run_cycle().await.unwrap());
    assert_eq!(first.postings.inserted, 2);
    assert_eq!(first.postings.duplicates, 1);
    assert_eq!(h.db.count_postings().await.unwrap(), 2);

    let second = completed(h.scheduler.run_cycle().await.unwrap());
    assert_eq!(second.postings.inserted, 0);
    assert_eq!(second.postings.duplicates, 3);
    assert_eq!(second.postings.notified, 0);
    assert_eq!(h.db.count_postings().await.unwrap(), 2);
    assert!(h.mailer.sent().is_empty());
}

#[tokio::test]
async fn statuses_reset_once_every_keyword_is_processed() {
    let h = harness(&["selenium", "chatbot", "streamlit"], FakeFeed::default()).await;
    for keyword in ["selenium", "chatbot", "streamlit"] {
        h.feed.set_page(keyword, page(&[]));
    }

    // Two keywords were handled by an earlier, interrupted run
    let keywords = h.db.all_keywords().await.unwrap();
    h.db.mark_keyword_processed(keywords[0].id).await.unwrap();
    h.db.mark_keyword_processed(keywords[1].id).await.unwrap();

    let report = completed(h.scheduler.run_cycle().await.unwrap());
    assert_eq!(report.keywords_processed, 1);
    assert!(report.reset);
    assert_eq!(h.db.count_unprocessed_keywords().await.unwrap(), 3);
    assert!(h
        .db
        .all_keywords()
        .await
        .unwrap()
        .iter()
        .all(|k| !k.processed));

    let next = completed(h.scheduler.run_cycle().await.unwrap());
    assert_eq!(next.keywords_processed, 3);
}

#[tokio::test]
async fn failed_fetch_still_marks_keyword_processed() {
    let h = harness(&["discord bot", "adb automation"], FakeFeed::default()).await;
    h.feed.set_page(
        "adb automation",
        page(&[tile("ADB", "ADB_~01f", &["android"])]),
    );

    let report = completed(h.scheduler.run_cycle().await.unwrap());
    assert_eq!(report.keywords_processed, 2);
    assert_eq!(report.postings.fetch_failures, 1);
    assert_eq!(report.postings.inserted, 1);
    assert!(report.reset);
}

#[tokio::test]
async fn mail_failure_keeps_posting_stored() {
    let h = harness(&["web automation"], FakeFeed::default()).await;
    h.feed.set_page("web automation", page(&[]));
    completed(h.scheduler.run_cycle().await.unwrap());

    h.mailer.failing.store(true, Ordering::SeqCst);
    h.feed.set_page(
        "web automation",
        page(&[tile("Crawler", "Crawler_~01g", &[])]),
    );

    let report = completed(h.scheduler.run_cycle().await.unwrap());
    assert_eq!(report.postings.inserted, 1);
    assert_eq!(report.postings.notify_failures, 1);
    assert_eq!(report.postings.notified, 0);

    let stored = h
        .db
        .find_posting("https://www.upwork.com/jobs/Crawler_~01g/")
        .await
        .unwrap()
        .expect("posting persisted despite mail failure");
    assert_eq!(stored.title, "Crawler");
    assert_eq!(stored.skills, vec!["N/A".to_string()]);
    assert_eq!(stored.category, "Expert");
    assert_eq!(stored.price_value, "1 to 3 months");
}

#[tokio::test]
async fn overlapping_trigger_is_skipped() {
    let gate = Arc::new(Notify::new());
    let h = harness(&["bot development"], FakeFeed::gated(gate.clone())).await;
    h.feed.set_page("bot development", page(&[]));

    let (first, second) = tokio::join!(h.scheduler.run_cycle(), async {
        let outcome = h.scheduler.run_cycle().await;
        gate.notify_one();
        outcome
    });

    assert_eq!(second.unwrap(), CycleOutcome::Skipped);
    assert_eq!(completed(first.unwrap()).keywords_processed, 1);

    // The guard is released once the running cycle finishes
    gate.notify_one();
    assert!(matches!(
        h.scheduler.run_cycle().await.unwrap(),
        CycleOutcome::Completed(_)
    ));
}

#[tokio::test]
async fn run_forever_runs_at_once_then_after_each_interval() {
    let h = harness_with_interval(
        &["web scraping"],
        FakeFeed::default(),
        Duration::from_millis(400),
    )
    .await;
    h.feed.set_page("web scraping", page(&[]));

    let observed = async {
        sleep(Duration::from_millis(200)).await;
        let before_interval = h.feed.fetches();
        sleep(Duration::from_millis(400)).await;
        (before_interval, h.feed.fetches())
    };

    let (before_interval, after_interval) = tokio::select! {
        result = h.scheduler.run_forever() => panic!("scheduler stopped: {:?}", result),
        counts = observed => counts,
    };

    assert_eq!(before_interval, 1);
    assert_eq!(after_interval, 2);
    assert!(!h.scheduler.is_priming());
}

#[tokio::test]
async fn store_failure_aborts_cycle_and_keeps_priming() {
    let h = harness(&["chatbot"], FakeFeed::default()).await;
    h.feed.set_page("chatbot", page(&[tile("Bot", "Bot_~01h", &[])]));
    h.db.close().await;

    let result = h.scheduler.run_cycle().await;

    assert!(matches!(result, Err(CoreError::Database(_))));
    assert!(h.scheduler.is_priming());
    assert_eq!(h.feed.fetches(), 0);

    // The guard was released despite the failure
    assert!(matches!(
        h.scheduler.run_cycle().await,
        Err(CoreError::Database(DatabaseError::Sql(_)))
    ));
}
