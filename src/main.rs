use background_service::BackgroundService;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use upwatch_core::{AppConfig, CoreError, ErrorReporter, LoggingConfig, DEFAULT_CONFIG_PATH};

#[tokio::main]
async fn main() -> Result<(), CoreError> {
    let reporter = ErrorReporter::new();

    let (config, source) = match AppConfig::load() {
        Ok(loaded) => loaded,
        Err(e) => {
            init_logging(&LoggingConfig::default());
            reporter.report_error(&e);
            return Err(e);
        }
    };
    init_logging(&config.logging);

    info!("Starting Upwatch - marketplace job watcher");
    match &source {
        Some(path) => info!("Configuration read from {}", path.display()),
        None => info!("No {} found, using built-in defaults", DEFAULT_CONFIG_PATH),
    }
    info!(
        database = %config.database.url,
        search_url = %config.marketplace.search_url,
        recipient = %config.mail.recipient,
        timezone = %config.display.timezone,
        keywords = config.keywords.len(),
        interval_minutes = config.schedule.interval_minutes,
        "Configuration loaded"
    );

    let service = match BackgroundService::from_config(&config).await {
        Ok(service) => service,
        Err(e) => {
            reporter.report_error(&e);
            return Err(e);
        }
    };

    let result = tokio::select! {
        result = service.start() => result,
        _ = signal::ctrl_c() => {
            info!("Interrupt received, shutting down");
            Ok(())
        }
    };
    service.stop().await;

    if let Err(e) = &result {
        reporter.report_error(e);
    }
    result
}

/// Log to the configured file in append mode, or stdout when it cannot be
/// opened. `RUST_LOG` wins over the configured filter.
fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false);

    let Some(path) = &config.file else {
        builder.init();
        return;
    };

    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => builder.with_writer(Mutex::new(file)).init(),
        Err(e) => {
            builder.init();
            warn!("Cannot open log file {}: {}; logging to stdout", path.display(), e);
        }
    }
}
