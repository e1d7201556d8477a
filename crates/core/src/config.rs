use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

/// Like [`profiled_env_opt`], but a set-and-empty value counts as set.
fn profiled_env_raw(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        if let Ok(v) = env::var(format!("{}_{}", profile, key)) {
            return Some(v);
        }
    }
    env::var(key).ok()
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub mail: MailConfig,
    pub links: LinkConfig,
    pub slack: SlackConfig,
    pub dispatch: DispatchConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `FANOUT_PROFILE`. When set (e.g. `PROD`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Result<Self, CoreError> {
        let profile = env_or("FANOUT_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Result<Self, CoreError> {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Ok(Self {
            profile: p.to_string(),
            mail: MailConfig::from_env_profiled(p),
            links: LinkConfig::from_env_profiled(p),
            slack: SlackConfig::from_env_profiled(p),
            dispatch: DispatchConfig::from_env_profiled(p)?,
        })
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  mail:        backend={}, prefix={:?}, from={}",
            self.mail.backend,
            self.mail.subject_prefix,
            self.mail.from
        );
        tracing::info!(
            "  smtp:        host={}, port={}",
            self.mail.smtp_host.as_deref().unwrap_or("(none)"),
            self.mail.smtp_port
        );
        tracing::info!("  links:       url_prefix={}", self.links.url_prefix);
        tracing::info!(
            "  slack:       api_base={}, timeout={}s",
            self.slack.api_base,
            self.slack.timeout_secs
        );
        tracing::info!(
            "  dispatch:    concurrency={}, unit_timeout={}s, chat_recipients={}",
            self.dispatch.max_concurrency,
            self.dispatch.unit_timeout_secs,
            self.dispatch.chat_recipients
        );
    }

    /// Return a redacted view safe for API responses (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "mail": {
                "backend": self.mail.backend,
                "subject_prefix": self.mail.subject_prefix,
                "from": self.mail.from,
                "reply_hostname": self.mail.reply_hostname(),
                "smtp_configured": self.mail.smtp_host.is_some(),
            },
            "links": {
                "url_prefix": self.links.url_prefix,
                "signing_configured": self.links.signing_secret.is_some(),
            },
            "slack": { "api_base": self.slack.api_base, "timeout_secs": self.slack.timeout_secs },
            "dispatch": {
                "max_concurrency": self.dispatch.max_concurrency,
                "unit_timeout_secs": self.dispatch.unit_timeout_secs,
                "chat_recipients": self.dispatch.chat_recipients.as_str(),
            },
        })
    }
}

// ── Mail ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// System-wide subject prefix used when neither project nor organization
    /// sets one. `MAIL_SUBJECT_PREFIX=""` disables it.
    pub subject_prefix: String,
    pub from: String,
    /// Domain for signed reply-to addresses; falls back to the `from` domain.
    pub reply_hostname: Option<String>,
    /// "smtp" or "log"
    pub backend: String,
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_tls: bool,
}

impl MailConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            subject_prefix: profiled_env_raw(p, "MAIL_SUBJECT_PREFIX")
                .unwrap_or_else(|| "[Sentry] ".to_string()),
            from: profiled_env_or(p, "MAIL_FROM", "root@localhost"),
            reply_hostname: profiled_env_opt(p, "MAIL_REPLY_HOSTNAME"),
            backend: profiled_env_or(p, "MAIL_BACKEND", "log"),
            smtp_host: profiled_env_opt(p, "SMTP_HOST"),
            smtp_port: profiled_env_u16(p, "SMTP_PORT", 587),
            smtp_tls: profiled_env_or(p, "SMTP_TLS", "true") == "true",
        }
    }

    pub fn reply_hostname(&self) -> String {
        self.reply_hostname.clone().unwrap_or_else(|| {
            self.from
                .trim_end_matches('>')
                .rsplit_once('@')
                .map(|(_, domain)| domain.to_string())
                .unwrap_or_else(|| "localhost".to_string())
        })
    }
}

// ── Links ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Absolute URL prefix for deep-links, e.g. `https://sentry.example.com`.
    pub url_prefix: String,
    #[serde(skip_serializing)]
    pub signing_secret: Option<String>,
}

impl LinkConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            url_prefix: profiled_env_or(p, "URL_PREFIX", "http://localhost:9000"),
            signing_secret: profiled_env_opt(p, "SIGNING_SECRET"),
        }
    }
}

// ── Slack ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    pub api_base: String,
    pub timeout_secs: u64,
}

impl SlackConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            api_base: profiled_env_or(p, "SLACK_API_BASE", "https://slack.com/api"),
            timeout_secs: profiled_env_u64(p, "SLACK_TIMEOUT_SECS", 5),
        }
    }
}

// ── Dispatch ──────────────────────────────────────────────────

/// Which population receives chat notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRecipientPolicy {
    /// Chat reuses the email subscription set.
    #[default]
    SameAsEmail,
    /// Chat reads its own provider-scoped subscription set.
    ProviderSubscriptions,
}

impl ChatRecipientPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SameAsEmail => "same_as_email",
            Self::ProviderSubscriptions => "provider_subscriptions",
        }
    }
}

impl std::fmt::Display for ChatRecipientPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatRecipientPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "same_as_email" => Ok(Self::SameAsEmail),
            "provider_subscriptions" => Ok(Self::ProviderSubscriptions),
            other => Err(CoreError::InvalidConfig {
                key: "CHAT_RECIPIENTS".into(),
                value: other.into(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Delivery units (destination × recipient) in flight per provider.
    pub max_concurrency: usize,
    pub unit_timeout_secs: u64,
    pub chat_recipients: ChatRecipientPolicy,
}

impl DispatchConfig {
    fn from_env_profiled(p: &str) -> Result<Self, CoreError> {
        let chat_recipients = match profiled_env_opt(p, "CHAT_RECIPIENTS") {
            Some(v) => v.parse()?,
            None => ChatRecipientPolicy::default(),
        };
        Ok(Self {
            max_concurrency: profiled_env_u64(p, "DISPATCH_MAX_CONCURRENCY", 8).max(1) as usize,
            unit_timeout_secs: profiled_env_u64(p, "DISPATCH_UNIT_TIMEOUT_SECS", 5),
            chat_recipients,
        })
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            unit_timeout_secs: 5,
            chat_recipients: ChatRecipientPolicy::default(),
        }
    }
}
