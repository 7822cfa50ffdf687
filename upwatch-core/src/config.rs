use crate::error::{ConfigError, CoreError};
use chrono_tz::Tz;
use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_CONFIG_PATH: &str = "upwatch.toml";
pub const CONFIG_PATH_ENV: &str = "UPWATCH_CONFIG";

/// One week.
pub const MAX_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

const DEFAULT_KEYWORDS: &[&str] = &[
    "web scraping",
    "API development",
    "mobile automation",
    "django",
    "fastapi",
    "flask",
    "adb automation",
    "selenium",
    "streamlit",
    "chatbot",
    "bot development",
    "discord bot",
    "web automation",
];

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub marketplace: MarketplaceConfig,
    pub mail: MailConfig,
    pub schedule: ScheduleConfig,
    pub display: DisplayConfig,
    pub logging: LoggingConfig,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MarketplaceConfig {
    pub search_url: String,
    /// Prefix for the relative links found on job tiles.
    pub base_url: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub challenge_retries: u32,
    pub challenge_wait_secs: u64,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    /// Sender address; the SMTP username when unset.
    pub from: Option<String>,
    pub recipient: String,
    pub timeout_secs: u64,
}

/// Inclusive `[min, max]` range in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DelayRange(pub u64, pub u64);

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub interval_minutes: u64,
    pub keyword_delay_secs: DelayRange,
    pub poll_jitter_secs: DelayRange,
    pub shuffle: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub timezone: String,
    pub zone_label: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub file: Option<PathBuf>,
    pub filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            marketplace: MarketplaceConfig::default(),
            mail: MailConfig::default(),
            schedule: ScheduleConfig::default(),
            display: DisplayConfig::default(),
            logging: LoggingConfig::default(),
            keywords: DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://upwatch.db".to_string(),
        }
    }
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            search_url: "https://www.upwork.com/nx/search/jobs/".to_string(),
            base_url: "https://www.upwork.com".to_string(),
            user_agent: BROWSER_USER_AGENT.to_string(),
            request_timeout_secs: 30,
            challenge_retries: 2,
            challenge_wait_secs: 5,
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            username: String::new(),
            password: String::new(),
            from: None,
            recipient: String::new(),
            timeout_secs: 30,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 20,
            keyword_delay_secs: DelayRange(20, 40),
            poll_jitter_secs: DelayRange(100, 300),
            shuffle: true,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            timezone: "Asia/Karachi".to_string(),
            zone_label: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: Some(PathBuf::from("job_alerts.log")),
            filter: "info".to_string(),
        }
    }
}

impl fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("from", &self.from)
            .field("recipient", &self.recipient)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl MailConfig {
    pub fn sender(&self) -> &str {
        self.from.as_deref().unwrap_or(&self.username)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl MarketplaceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn challenge_wait(&self) -> Duration {
        Duration::from_secs(self.challenge_wait_secs)
    }
}

impl ScheduleConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.saturating_mul(60))
    }
}

impl DisplayConfig {
    pub fn zone(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::InvalidValue {
                field: "display.timezone".to_string(),
                value: self.timezone.clone(),
            })
    }

    /// Fixed label for notification timestamps. When unset, each alert
    /// shows the abbreviation in effect at the posting's instant.
    pub fn label_override(&self) -> Option<&str> {
        self.zone_label
            .as_deref()
            .map(str::trim)
            .filter(|label| !label.is_empty())
    }
}

impl AppConfig {
    /// Load `.env`, then the TOML file named by `UPWATCH_CONFIG` (or
    /// `upwatch.toml`), then environment overrides, then validate.
    ///
    /// Also returns the file that was read, if any, so the caller can log
    /// it once logging is up.
    pub fn load() -> Result<(Self, Option<PathBuf>), CoreError> {
        let _ = dotenvy::dotenv();
        let explicit = env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from);
        Self::load_with(explicit, |name| env::var(name).ok())
    }

    /// [`AppConfig::load`] with the path and environment supplied by the
    /// caller. A missing explicit path is an error; a missing default one
    /// means built-in defaults.
    pub fn load_with<F>(
        explicit_path: Option<PathBuf>,
        lookup: F,
    ) -> Result<(Self, Option<PathBuf>), CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = explicit_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        let (mut config, source) = if explicit_path.is_some() || path.exists() {
            (Self::from_file(&path)?, Some(path))
        } else {
            (Self::default(), None)
        };

        config.apply_overrides(lookup);
        config.validate()?;
        Ok((config, source))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        debug!("Read configuration from {}", path.display());
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply `UPWATCH_*` overrides; `lookup` is usually `std::env::var`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("UPWATCH_DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(host) = lookup("UPWATCH_SMTP_HOST") {
            self.mail.smtp_host = host;
        }
        if let Some(port) = lookup("UPWATCH_SMTP_PORT").and_then(|p| p.parse().ok()) {
            self.mail.smtp_port = port;
        }
        if let Some(username) = lookup("UPWATCH_SMTP_USERNAME") {
            self.mail.username = username;
        }
        if let Some(password) = lookup("UPWATCH_SMTP_PASSWORD") {
            self.mail.password = password;
        }
        if let Some(recipient) = lookup("UPWATCH_RECIPIENT") {
            self.mail.recipient = recipient;
        }
        if let Some(timezone) = lookup("UPWATCH_TIMEZONE") {
            self.display.timezone = timezone;
        }
        if let Some(keywords) = lookup("UPWATCH_KEYWORDS") {
            self.keywords = keywords
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(ConfigError::MissingField {
                field: "keywords".to_string(),
            });
        }
        if self.mail.recipient.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "mail.recipient".to_string(),
            });
        }
        if self.mail.username.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "mail.username".to_string(),
            });
        }
        if self.mail.password.is_empty() {
            return Err(ConfigError::MissingField {
                field: "mail.password".to_string(),
            });
        }
        if self.schedule.interval_minutes == 0
            || self.schedule.interval_minutes > MAX_INTERVAL_MINUTES
        {
            return Err(ConfigError::InvalidValue {
                field: "schedule.interval_minutes".to_string(),
                value: self.schedule.interval_minutes.to_string(),
            });
        }
        for (field, range) in [
            ("schedule.keyword_delay_secs", self.schedule.keyword_delay_secs),
            ("schedule.poll_jitter_secs", self.schedule.poll_jitter_secs),
        ] {
            if range.0 > range.1 {
                return Err(ConfigError::ValidationFailed {
                    reason: format!("{} minimum {} exceeds maximum {}", field, range.0, range.1),
                });
            }
        }
        self.display.zone()?;
        Ok(())
    }
}
