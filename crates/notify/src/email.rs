//! Email provider: per-recipient messages handed to a mail queue.
//!
//! Rendering happens inline; delivery is fire-and-forget. The SMTP queue
//! spawns one task per message via `lettre` and never reports back to the
//! dispatcher. Pending sends are tracked so the process can [`flush`]
//! them before exiting.
//!
//! [`flush`]: MailQueue::flush

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use fanout_core::config::MailConfig;
use fanout_core::{Activity, ActivityId, GroupId, Provider};
use lettre::{
    message::{
        header::{HeaderName, HeaderValue},
        Mailbox, MultiPart,
    },
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tokio::task::JoinSet;

use crate::activity::ActivityNotification;
use crate::context::build_recipient_context;
use crate::links::LinkBuilder;
use crate::participants::Recipient;
use crate::templating::EmailTemplates;
use crate::traits::{Destination, Envelope, NotificationProvider, NotifyError};

/// A rendered email ready for the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct MailMessage {
    pub to: String,
    /// Encoded subject line.
    pub subject: Vec<u8>,
    pub headers: BTreeMap<String, String>,
    pub text: String,
    pub html: String,
    /// `notify.activity.<activity type>`
    pub email_type: String,
    /// Activity the message is about.
    pub reference: ActivityId,
    /// Group replies are threaded to.
    pub reply_reference: Option<GroupId>,
    pub reply_to: Option<String>,
}

impl MailMessage {
    pub fn subject_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.subject)
    }
}

/// Asynchronous mail hand-off. `enqueue` must not wait for delivery.
#[async_trait::async_trait]
pub trait MailQueue: Send + Sync {
    fn enqueue(&self, message: MailMessage) -> Result<(), NotifyError>;

    /// Wait for every message enqueued so far to finish sending.
    async fn flush(&self) {}
}

// ── SMTP queue ────────────────────────────────────────────────

/// Sends each message on its own tokio task through an SMTP relay.
#[derive(Debug, Clone)]
pub struct SmtpMailQueue {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    pending: Arc<Mutex<JoinSet<()>>>,
}

impl SmtpMailQueue {
    /// Build from mail configuration.
    ///
    /// Port 465 uses implicit TLS; other ports use STARTTLS when `smtp_tls`
    /// is set. Credentials come from `SMTP_USERNAME` / `SMTP_PASSWORD` when
    /// both are set.
    pub fn from_config(config: &MailConfig) -> Result<Self, NotifyError> {
        let host = config
            .smtp_host
            .as_deref()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| NotifyError::Config("SMTP_HOST is required for the smtp backend".into()))?;

        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e: lettre::address::AddressError| NotifyError::Config(e.to_string()))?;

        let port = config.smtp_port;
        let mut builder = if port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .map_err(|e| NotifyError::Config(e.to_string()))?
                .port(port)
        } else if config.smtp_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| NotifyError::Config(e.to_string()))?
                .port(port)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host).port(port)
        };

        if let (Ok(username), Ok(password)) =
            (std::env::var("SMTP_USERNAME"), std::env::var("SMTP_PASSWORD"))
        {
            builder = builder.credentials(Credentials::new(username, password));
        }

        Ok(Self {
            transport: builder.build(),
            from,
            pending: Arc::new(Mutex::new(JoinSet::new())),
        })
    }

    fn build(&self, message: &MailMessage) -> Result<Message, NotifyError> {
        let to: Mailbox = message
            .to
            .parse()
            .map_err(|e: lettre::address::AddressError| NotifyError::Config(e.to_string()))?;

        let mut builder = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject_str());

        if let Some(reply_to) = &message.reply_to {
            let mailbox: Mailbox = reply_to
                .parse()
                .map_err(|e: lettre::address::AddressError| NotifyError::Config(e.to_string()))?;
            builder = builder.reply_to(mailbox);
        }

        for (name, value) in &message.headers {
            let name = HeaderName::new_from_ascii(name.clone())
                .map_err(|e| NotifyError::Smtp(format!("invalid header '{name}': {e}")))?;
            builder = builder.raw_header(HeaderValue::new(name, value.clone()));
        }

        builder
            .multipart(MultiPart::alternative_plain_html(
                message.text.clone(),
                message.html.clone(),
            ))
            .map_err(|e| NotifyError::Smtp(e.to_string()))
    }
}

#[async_trait::async_trait]
impl MailQueue for SmtpMailQueue {
    fn enqueue(&self, message: MailMessage) -> Result<(), NotifyError> {
        let email = self.build(&message)?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| NotifyError::Transport(format!("no async runtime for mail hand-off: {e}")))?;

        let transport = self.transport.clone();
        let send = async move {
            match transport.send(email).await {
                Ok(_) => tracing::info!(
                    channel = "email",
                    email_type = %message.email_type,
                    reference = message.reference,
                    "mail delivered"
                ),
                Err(e) => tracing::warn!(
                    channel = "email",
                    email_type = %message.email_type,
                    reference = message.reference,
                    error = %e,
                    "mail delivery failed"
                ),
            }
        };

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        while pending.try_join_next().is_some() {}
        pending.spawn_on(send, &runtime);
        Ok(())
    }

    async fn flush(&self) {
        let mut pending = std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner));
        if pending.is_empty() {
            return;
        }
        tracing::info!(channel = "email", pending = pending.len(), "waiting for queued mail");
        while let Some(joined) = pending.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(channel = "email", error = %e, "mail task did not complete");
            }
        }
    }
}

/// Writes messages to the log instead of sending them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailQueue;

#[async_trait::async_trait]
impl MailQueue for LogMailQueue {
    fn enqueue(&self, message: MailMessage) -> Result<(), NotifyError> {
        tracing::info!(
            channel = "email",
            to = %message.to,
            subject = %message.subject_str(),
            email_type = %message.email_type,
            reference = message.reference,
            headers = ?message.headers,
            "mail queued (log backend)"
        );
        tracing::debug!(body = %message.text, "mail body");
        Ok(())
    }
}

/// Queue for the configured `MAIL_BACKEND`.
pub fn mail_queue_from_config(config: &MailConfig) -> Result<Arc<dyn MailQueue>, NotifyError> {
    match config.backend.as_str() {
        "smtp" => Ok(Arc::new(SmtpMailQueue::from_config(config)?)),
        "log" => Ok(Arc::new(LogMailQueue)),
        other => Err(NotifyError::Config(format!(
            "unknown MAIL_BACKEND '{other}' (expected smtp or log)"
        ))),
    }
}

// ── Subject and headers ───────────────────────────────────────

/// Project prefix, then organization prefix, then `default`. An empty project
/// or organization prefix counts as unset; an empty `default` means no prefix.
pub fn subject_prefix<'a>(activity: &'a Activity, default: &'a str) -> &'a str {
    [
        activity.project.subject_prefix.as_deref(),
        activity.organization.subject_prefix.as_deref(),
    ]
    .into_iter()
    .flatten()
    .find(|p| !p.is_empty())
    .unwrap_or(default)
}

/// Prefixed subject line, encoded.
pub fn subject_with_prefix(
    kind: &dyn ActivityNotification,
    activity: &Activity,
    default_prefix: &str,
) -> Vec<u8> {
    format!(
        "{}{}",
        subject_prefix(activity, default_prefix),
        kind.subject(activity)
    )
    .into_bytes()
}

pub fn headers(
    kind: &dyn ActivityNotification,
    activity: &Activity,
    links: &LinkBuilder,
) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    headers.insert("X-Sentry-Project".to_string(), activity.project.slug.clone());
    headers.insert(
        "X-SMTPAPI".to_string(),
        serde_json::json!({ "category": kind.category() }).to_string(),
    );
    if let Some(group) = &activity.group {
        headers.insert("X-Sentry-Logger".to_string(), group.logger.clone());
        headers.insert(
            "X-Sentry-Logger-Level".to_string(),
            group.level.as_str().to_string(),
        );
        headers.insert(
            "X-Sentry-Reply-To".to_string(),
            links.reply_to_address(group.id),
        );
    }
    headers
}

// ── Provider ──────────────────────────────────────────────────

pub struct EmailProvider {
    templates: EmailTemplates,
    queue: Arc<dyn MailQueue>,
}

impl EmailProvider {
    pub fn new(queue: Arc<dyn MailQueue>) -> Self {
        Self {
            templates: EmailTemplates::new(),
            queue,
        }
    }

    pub fn with_templates(mut self, templates: EmailTemplates) -> Self {
        self.templates = templates;
        self
    }

    pub fn from_config(config: &MailConfig) -> Result<Self, NotifyError> {
        Ok(Self::new(mail_queue_from_config(config)?))
    }

    /// Render the message for one recipient without enqueuing it.
    pub fn render(&self, envelope: &Envelope<'_>, recipient: &Recipient) -> Result<MailMessage, NotifyError> {
        let activity = envelope.activity;
        let kind = envelope.kind;
        let links = &envelope.services.links;

        let context = build_recipient_context(
            envelope.context,
            &recipient.user,
            recipient.reason,
            activity.group.as_ref(),
            links,
            kind.user_context(activity, &recipient.user),
        );

        Ok(MailMessage {
            to: recipient.user.email.clone(),
            subject: subject_with_prefix(kind, activity, &envelope.services.default_subject_prefix),
            headers: headers(kind, activity, links),
            text: self.templates.render(kind.template(), &context)?,
            html: self.templates.render(kind.html_template(), &context)?,
            email_type: format!("notify.activity.{}", activity.kind.as_str()),
            reference: activity.id,
            reply_reference: activity.group.as_ref().map(|g| g.id),
            reply_to: activity
                .group
                .as_ref()
                .map(|g| links.reply_to_address(g.id)),
        })
    }
}

#[async_trait::async_trait]
impl NotificationProvider for EmailProvider {
    fn provider(&self) -> Provider {
        Provider::Email
    }

    async fn deliver(
        &self,
        envelope: &Envelope<'_>,
        _destination: &Destination,
        recipient: &Recipient,
    ) -> Result<(), NotifyError> {
        if recipient.user.email.is_empty() {
            tracing::debug!(recipient = recipient.user.id, "recipient has no email address, skipping");
            return Ok(());
        }
        let message = self.render(envelope, recipient)?;
        self.queue.enqueue(message)
    }

    async fn flush(&self) {
        self.queue.flush().await;
    }
}
