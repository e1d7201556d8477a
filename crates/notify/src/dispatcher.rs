//! Fans one activity out to every registered provider.
//!
//! The dispatcher looks up the notification kind, evaluates its guard once,
//! builds the shared context, resolves recipients and then runs one
//! delivery unit per (provider, destination, recipient). Units run with
//! bounded concurrency and a per-unit timeout. Individual unit failures
//! don't block other units or providers.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use fanout_core::config::Config;
use fanout_core::{Activity, Provider};
use futures::stream::{self, StreamExt};

use crate::activity::NotificationRegistry;
use crate::context::build_notification_context;
use crate::email::EmailProvider;
use crate::participants::{Recipient, RecipientResolver};
use crate::slack::SlackProvider;
use crate::sources::NotifyServices;
use crate::traits::{DispatchResult, Destination, Envelope, NotificationProvider, NotifyError};

const DEFAULT_MAX_CONCURRENCY: usize = 8;
const DEFAULT_UNIT_TIMEOUT: Duration = Duration::from_secs(5);

/// What a `send` call did.
#[derive(Debug)]
pub enum SendOutcome {
    /// The kind's guard declined; nothing was resolved or sent.
    Suppressed,
    /// Rendering failed before any delivery.
    Aborted(NotifyError),
    /// One result per delivery unit.
    Dispatched(Vec<DispatchResult>),
}

impl SendOutcome {
    pub fn results(&self) -> &[DispatchResult] {
        match self {
            SendOutcome::Dispatched(results) => results,
            _ => &[],
        }
    }

    pub fn is_suppressed(&self) -> bool {
        matches!(self, SendOutcome::Suppressed)
    }
}

pub struct Dispatcher {
    services: Arc<NotifyServices>,
    registry: NotificationRegistry,
    resolver: RecipientResolver,
    providers: BTreeMap<Provider, Arc<dyn NotificationProvider>>,
    max_concurrency: usize,
    unit_timeout: Duration,
}

impl Dispatcher {
    /// Dispatcher without providers.
    pub fn new(
        services: Arc<NotifyServices>,
        registry: NotificationRegistry,
        resolver: RecipientResolver,
    ) -> Self {
        Self {
            services,
            registry,
            resolver,
            providers: BTreeMap::new(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            unit_timeout: DEFAULT_UNIT_TIMEOUT,
        }
    }

    /// Built-in kinds, the default recipient strategies, and email plus
    /// Slack providers configured from `config`.
    pub fn from_config(config: &Config, services: Arc<NotifyServices>) -> Result<Self, NotifyError> {
        let resolver = RecipientResolver::with_defaults(
            services.subscriptions.clone(),
            config.dispatch.chat_recipients,
        );
        let mut dispatcher = Self::new(services, NotificationRegistry::with_defaults(), resolver)
            .with_limits(
                config.dispatch.max_concurrency,
                Duration::from_secs(config.dispatch.unit_timeout_secs),
            );
        dispatcher.register_provider(Arc::new(EmailProvider::from_config(&config.mail)?));
        dispatcher.register_provider(Arc::new(SlackProvider::from_config(&config.slack)));
        Ok(dispatcher)
    }

    /// Register a provider, replacing any previous one for the same channel.
    pub fn register_provider(&mut self, provider: Arc<dyn NotificationProvider>) {
        self.providers.insert(provider.provider(), provider);
    }

    pub fn with_limits(mut self, max_concurrency: usize, unit_timeout: Duration) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self.unit_timeout = unit_timeout;
        self
    }

    pub fn registry(&self) -> &NotificationRegistry {
        &self.registry
    }

    pub fn services(&self) -> &NotifyServices {
        &self.services
    }

    /// Wait for every provider's background deliveries to finish.
    pub async fn flush(&self) {
        for provider in self.providers.values() {
            provider.flush().await;
        }
    }

    /// Notify everyone interested in `activity` on every registered provider.
    pub async fn send(&self, activity: &Activity) -> SendOutcome {
        let Some(kind) = self.registry.get(activity.kind) else {
            tracing::warn!(activity = activity.id, kind = %activity.kind, "no notification kind registered");
            return SendOutcome::Aborted(NotifyError::NotImplemented {
                kind: activity.kind.to_string(),
                method: "notification",
            });
        };

        if !kind.should_send(activity) {
            tracing::debug!(activity = activity.id, kind = kind.name(), "notification suppressed");
            return SendOutcome::Suppressed;
        }

        let context = match build_notification_context(kind.as_ref(), activity, &self.services).await {
            Ok(context) => context,
            Err(e) => {
                tracing::error!(
                    activity = activity.id,
                    organization = %activity.organization.slug,
                    kind = kind.name(),
                    error = %e,
                    "notification rendering failed"
                );
                return SendOutcome::Aborted(e);
            }
        };

        let recipients = self.resolver.resolve_for(kind.as_ref(), activity).await;
        let envelope = Envelope {
            activity,
            kind: kind.as_ref(),
            context: &context,
            services: &self.services,
        };

        let mut units: Vec<(Arc<dyn NotificationProvider>, Destination, &Recipient)> = Vec::new();
        for (provider_kind, provider_recipients) in &recipients {
            let Some(provider) = self.providers.get(provider_kind) else {
                tracing::warn!(provider = %provider_kind, "no provider registered, skipping");
                continue;
            };
            let destinations = match provider
                .destinations(&activity.organization, &self.services)
                .await
            {
                Ok(destinations) => destinations,
                Err(e) => {
                    tracing::warn!(
                        organization = %activity.organization.slug,
                        provider = %provider_kind,
                        error = %e,
                        "destination lookup failed"
                    );
                    continue;
                }
            };
            for destination in destinations {
                for recipient in provider_recipients.values() {
                    units.push((provider.clone(), destination.clone(), recipient));
                }
            }
        }

        if units.is_empty() {
            tracing::debug!(activity = activity.id, kind = kind.name(), "no delivery units");
            return SendOutcome::Dispatched(Vec::new());
        }

        let envelope = &envelope;
        let results = stream::iter(units)
            .map(|(provider, destination, recipient)| async move {
                self.run_unit(envelope, provider.as_ref(), &destination, recipient)
                    .await
            })
            .buffer_unordered(self.max_concurrency)
            .collect::<Vec<_>>()
            .await;

        let failed = results.iter().filter(|r| !r.success).count();
        tracing::info!(
            activity = activity.id,
            kind = kind.name(),
            units = results.len(),
            failed,
            "notification dispatched"
        );
        SendOutcome::Dispatched(results)
    }

    async fn run_unit(
        &self,
        envelope: &Envelope<'_>,
        provider: &dyn NotificationProvider,
        destination: &Destination,
        recipient: &Recipient,
    ) -> DispatchResult {
        let organization = &envelope.activity.organization.slug;
        let start = Instant::now();
        let result = tokio::time::timeout(
            self.unit_timeout,
            provider.deliver(envelope, destination, recipient),
        )
        .await
        .unwrap_or(Err(NotifyError::Timeout(self.unit_timeout)));
        let duration_ms = start.elapsed().as_millis() as u64;

        let (success, error) = match result {
            Ok(()) => {
                tracing::info!(
                    organization = %organization,
                    provider = %provider.provider(),
                    destination = %destination.label(),
                    integration = ?destination.integration_id(),
                    recipient = recipient.user.id,
                    duration_ms,
                    "Notification delivered"
                );
                (true, None)
            }
            Err(e) => {
                tracing::warn!(
                    organization = %organization,
                    provider = %provider.provider(),
                    destination = %destination.label(),
                    integration = ?destination.integration_id(),
                    recipient = recipient.user.id,
                    error = %e,
                    duration_ms,
                    "Notification delivery failed"
                );
                (false, Some(e.to_string()))
            }
        };

        DispatchResult {
            provider: provider.provider(),
            destination: destination.label(),
            recipient: recipient.user.id,
            success,
            error,
            duration_ms,
        }
    }
}
