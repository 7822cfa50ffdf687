use async_trait::async_trait;
use chrono_tz::Tz;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::Error as SmtpError;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Arc;
use tracing::{debug, info};
use upwatch_core::posted_time::{format_for_display, zone_abbreviation};
use upwatch_core::{CoreError, JobPosting, MailConfig, MailError, NOT_AVAILABLE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

/// Synchronous hand-off to a mail delivery service.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), CoreError>;
}

/// Authenticated SMTP submission over STARTTLS.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> Result<Self, CoreError> {
        let from = parse_mailbox(config.sender())?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| MailError::ConnectionFailed {
                reason: e.to_string(),
            })?
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .timeout(Some(config.timeout()))
            .build();

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), CoreError> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(parse_mailbox(&message.to)?)
            .subject(message.subject.as_str())
            .header(ContentType::TEXT_HTML)
            .body(message.html_body.clone())
            .map_err(|e| MailError::MessageBuild {
                reason: e.to_string(),
            })?;

        self.transport
            .send(email)
            .await
            .map_err(classify_smtp_error)?;
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MailError> {
    address.parse().map_err(|_| MailError::InvalidAddress {
        address: address.to_string(),
    })
}

fn classify_smtp_error(err: SmtpError) -> MailError {
    let reason = err.to_string();
    match err.status() {
        // 530/534/535: authentication required or rejected
        Some(code) if code.to_string().starts_with("53") => {
            MailError::AuthenticationFailed { reason }
        }
        Some(_) => MailError::Rejected { reason },
        None => MailError::ConnectionFailed { reason },
    }
}

/// Renders and sends one alert per newly discovered posting.
pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    recipient: String,
    zone: Tz,
    zone_label: Option<String>,
}

impl Notifier {
    /// Without `zone_label`, timestamps carry the zone's own abbreviation
    /// for the posting's instant.
    pub fn new(
        mailer: Arc<dyn Mailer>,
        recipient: String,
        zone: Tz,
        zone_label: Option<String>,
    ) -> Self {
        Self {
            mailer,
            recipient,
            zone,
            zone_label,
        }
    }

    pub fn render(&self, posting: &JobPosting) -> EmailMessage {
        render_job_alert(
            posting,
            &self.recipient,
            self.zone,
            self.zone_label.as_deref(),
        )
    }

    pub async fn notify(&self, posting: &JobPosting) -> Result<(), CoreError> {
        let message = self.render(posting);
        debug!("Sending alert for {}", posting.id);
        self.mailer.send(&message).await?;
        info!("Mail sent to {}", self.recipient);
        Ok(())
    }
}

/// Comma-joined skills, or `N/A` when there are none.
pub fn render_skills(skills: &[String]) -> String {
    let shown: Vec<&str> = skills
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();

    if shown.is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        shown.join(", ")
    }
}

pub fn render_job_alert(
    posting: &JobPosting,
    recipient: &str,
    zone: Tz,
    zone_label: Option<&str>,
) -> EmailMessage {
    let title = escape_html(&posting.title);
    let link = escape_html(&posting.url);
    let posted_on = format_for_display(posting.posted_at, zone);
    let label = zone_label
        .map(str::to_string)
        .unwrap_or_else(|| zone_abbreviation(posting.posted_at, zone));

    let rows = [
        format!("<td><h2>New Job Alert: {}</h2></td>", title),
        format!("<td><strong>Title:</strong> {}</td>", title),
        format!(
            "<td><strong>Link:</strong> <a href=\"{link}\">{link}</a></td>",
            link = link
        ),
        format!(
            "<td><strong>Description:</strong> {}</td>",
            escape_html(&posting.description)
        ),
        format!(
            "<td><strong>Posted On:</strong> {} ({})</td>",
            posted_on,
            escape_html(&label)
        ),
        format!(
            "<td><strong>Category:</strong> {}</td>",
            escape_html(&posting.category)
        ),
        format!(
            "<td><strong>Skills:</strong> {}</td>",
            escape_html(&render_skills(&posting.skills))
        ),
        format!(
            "<td><strong>Price Type:</strong> {}</td>",
            escape_html(&posting.price_type)
        ),
        format!(
            "<td><strong>Price Value:</strong> {}</td>",
            escape_html(&posting.price_value)
        ),
        format!(
            "<td><strong>Keyword:</strong> {}</td>",
            escape_html(&posting.source_keyword)
        ),
    ];

    let table: String = rows
        .iter()
        .map(|cell| format!("      <tr>{}</tr>\n", cell))
        .collect();

    EmailMessage {
        to: recipient.to_string(),
        subject: format!("New Job Alert: {}", posting.title),
        html_body: format!(
            "<html>\n  <body>\n    <table>\n{}    </table>\n  </body>\n</html>\n",
            table
        ),
    }
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
