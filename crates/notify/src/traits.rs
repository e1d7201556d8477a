//! Provider capability trait and shared error types.

use std::time::Duration;

use fanout_core::{Activity, Integration, IntegrationId, Organization, Provider, UserId};

use crate::activity::ActivityNotification;
use crate::context::Context;
use crate::participants::Recipient;
use crate::sources::NotifyServices;

/// Errors that can occur during notification rendering and delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("SMTP delivery failed: {0}")]
    Smtp(String),

    #[error("Template rendering failed: {0}")]
    Template(String),

    #[error("{kind} does not implement {method}")]
    NotImplemented { kind: String, method: &'static str },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Data source error: {0}")]
    Source(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Delivery timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid signature: {0}")]
    Signature(String),
}

impl From<minijinja::Error> for NotifyError {
    fn from(e: minijinja::Error) -> Self {
        NotifyError::Template(e.to_string())
    }
}

/// Where a single delivery unit goes.
#[derive(Debug, Clone)]
pub enum Destination {
    /// Addressed straight to the recipient (email).
    Direct,
    /// Routed through an organization's integration (chat).
    Integration(Integration),
}

impl Destination {
    pub fn integration_id(&self) -> Option<IntegrationId> {
        match self {
            Destination::Direct => None,
            Destination::Integration(i) => Some(i.id),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Destination::Direct => "direct".to_string(),
            Destination::Integration(i) => format!("integration:{}", i.id),
        }
    }
}

/// Everything shared by all delivery units of one `send` call.
pub struct Envelope<'a> {
    pub activity: &'a Activity,
    pub kind: &'a dyn ActivityNotification,
    /// Base context merged with the kind's own context.
    pub context: &'a Context,
    pub services: &'a NotifyServices,
}

/// A delivery channel the dispatcher can fan out to.
///
/// The dispatcher calls [`destinations`](Self::destinations) once per
/// `send` and then [`deliver`](Self::deliver) once per
/// (destination, recipient) pair. Units are independent; an error from one
/// never stops the others.
#[async_trait::async_trait]
pub trait NotificationProvider: Send + Sync {
    fn provider(&self) -> Provider;

    /// Destinations to fan out over. Defaults to a single direct destination.
    async fn destinations(
        &self,
        _organization: &Organization,
        _services: &NotifyServices,
    ) -> Result<Vec<Destination>, NotifyError> {
        Ok(vec![Destination::Direct])
    }

    /// Deliver to one recipient through one destination.
    async fn deliver(
        &self,
        envelope: &Envelope<'_>,
        destination: &Destination,
        recipient: &Recipient,
    ) -> Result<(), NotifyError>;

    /// Wait for work handed off by `deliver` to finish. Called before shutdown.
    async fn flush(&self) {}
}

/// Result of a single (destination, recipient) delivery unit.
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub provider: Provider,
    pub destination: String,
    pub recipient: UserId,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}
