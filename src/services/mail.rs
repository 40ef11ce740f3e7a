//! Outbound email
//!
//! Handlers enqueue a [`MailJob`] and move on. A single background worker
//! renders the job's template and hands the result to a [`Mailer`]. Delivery
//! failures are logged and dropped; nothing is retried and nothing reaches
//! the request that queued the job.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;
use tera::Context as TeraContext;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::MailConfig;
use crate::templates::{TemplateEngine, SITE_NAME};

/// Email verification template
pub const VERIFICATION_TEMPLATE: &str = "emails/user_email_verification.html";
/// Password reset template
pub const PASSWORD_RESET_TEMPLATE: &str = "emails/password_reset_email.html";

/// One email waiting to be sent
#[derive(Debug, Clone)]
pub struct MailJob {
    pub to: String,
    pub subject: String,
    pub template: String,
    pub context: serde_json::Value,
}

/// Delivers a rendered message
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: String) -> Result<()>;
}

/// SMTP delivery through lettre
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(host: &str, config: &MailConfig) -> Result<Self> {
        let from: Mailbox = config
            .from_address
            .parse()
            .map_err(|e| anyhow!("Invalid from address '{}': {}", config.from_address, e))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| anyhow!("Failed to create SMTP transport: {}", e))?
            .port(config.smtp_port);
        if let (Some(username), Some(password)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, html: String) -> Result<()> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(to.parse().map_err(|e| anyhow!("Invalid to address: {}", e))?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html)
            .map_err(|e| anyhow!("Failed to build email: {}", e))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| anyhow!("Failed to send email: {}", e))?;
        Ok(())
    }
}

/// Writes messages to the log; used when no SMTP host is configured
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, html: String) -> Result<()> {
        tracing::info!(to = %to, subject = %subject, "Email not sent, no SMTP host");
        tracing::debug!(to = %to, "Email body:\n{}", html);
        Ok(())
    }
}

/// Pick the mailer for a configuration
pub fn mailer_from_config(config: &MailConfig) -> Result<Arc<dyn Mailer>> {
    match config.smtp_host.as_deref().filter(|h| !h.trim().is_empty()) {
        Some(host) => {
            tracing::info!("Sending email through SMTP host {}:{}", host, config.smtp_port);
            Ok(Arc::new(SmtpMailer::new(host, config)?))
        }
        None => {
            tracing::info!("No SMTP host configured, emails will be logged");
            Ok(Arc::new(LogMailer))
        }
    }
}

/// Sending half of the mail queue
#[derive(Clone)]
pub struct MailQueue {
    tx: mpsc::UnboundedSender<MailJob>,
}

impl MailQueue {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<MailJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a job without waiting for delivery
    pub fn enqueue(&self, job: MailJob) {
        let to = job.to.clone();
        if self.tx.send(job).is_err() {
            tracing::warn!("Mail worker is gone, dropping email to {}", to);
        }
    }

    /// Start the worker that drains `rx`
    pub fn spawn_worker(
        rx: mpsc::UnboundedReceiver<MailJob>,
        templates: Arc<TemplateEngine>,
        mailer: Arc<dyn Mailer>,
    ) -> JoinHandle<()> {
        tokio::spawn(run_worker(rx, templates, mailer))
    }
}

/// Render and send jobs until every sender is dropped
pub async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<MailJob>,
    templates: Arc<TemplateEngine>,
    mailer: Arc<dyn Mailer>,
) {
    while let Some(job) = rx.recv().await {
        if let Err(e) = deliver(&job, &templates, mailer.as_ref()).await {
            tracing::warn!("Failed to send '{}' to {}: {:#}", job.subject, job.to, e);
        }
    }
    tracing::debug!("Mail worker stopped");
}

async fn deliver(job: &MailJob, templates: &TemplateEngine, mailer: &dyn Mailer) -> Result<()> {
    let mut context = TeraContext::from_serialize(&job.context)
        .map_err(|e| anyhow!("Invalid mail context: {}", e))?;
    context.insert("site_name", SITE_NAME);
    let html = templates.render(&job.template, &context)?;
    mailer.send(&job.to, &job.subject, html).await?;
    tracing::debug!("Sent '{}' to {}", job.subject, job.to);
    Ok(())
}
