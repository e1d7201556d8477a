//! Recipient resolution: activity → provider → {user → reason}.
//!
//! Each provider registers a [`RecipientStrategy`]. The resolver runs every
//! registered strategy and never special-cases a provider.

use std::collections::BTreeMap;
use std::sync::Arc;

use fanout_core::config::ChatRecipientPolicy;
use fanout_core::{Activity, Group, GroupSubscriptionReason, Provider, User, UserId};

use crate::activity::ActivityNotification;
use crate::sources::SubscriptionSource;
use crate::traits::NotifyError;

/// A user selected for delivery and why.
#[derive(Debug, Clone, PartialEq)]
pub struct Recipient {
    pub user: User,
    pub reason: GroupSubscriptionReason,
}

/// Recipients for one provider, ordered by user id.
pub type ProviderRecipients = BTreeMap<UserId, Recipient>;

pub type RecipientMap = BTreeMap<Provider, ProviderRecipients>;

/// "Given an activity on a group, return this provider's recipients."
#[async_trait::async_trait]
pub trait RecipientStrategy: Send + Sync {
    async fn recipients(
        &self,
        activity: &Activity,
        group: &Group,
        source: &dyn SubscriptionSource,
    ) -> Result<ProviderRecipients, NotifyError>;
}

/// Users subscribed to the group through `subscription_provider`, minus the
/// actor unless the actor opted in to their own activity.
#[derive(Debug, Clone, Copy)]
pub struct GroupSubscribers {
    pub subscription_provider: Provider,
}

impl GroupSubscribers {
    pub fn new(subscription_provider: Provider) -> Self {
        Self {
            subscription_provider,
        }
    }
}

#[async_trait::async_trait]
impl RecipientStrategy for GroupSubscribers {
    async fn recipients(
        &self,
        activity: &Activity,
        group: &Group,
        source: &dyn SubscriptionSource,
    ) -> Result<ProviderRecipients, NotifyError> {
        let mut recipients = ProviderRecipients::new();
        for sub in source
            .group_subscribers(group.id, self.subscription_provider)
            .await?
        {
            recipients.entry(sub.user.id).or_insert(Recipient {
                user: sub.user,
                reason: sub.reason,
            });
        }

        if let Some(actor) = &activity.user {
            if recipients.contains_key(&actor.id) && !source.receive_own_activity(actor.id).await? {
                recipients.remove(&actor.id);
            }
        }
        Ok(recipients)
    }
}

pub struct RecipientResolver {
    source: Arc<dyn SubscriptionSource>,
    strategies: BTreeMap<Provider, Arc<dyn RecipientStrategy>>,
}

impl RecipientResolver {
    pub fn new(source: Arc<dyn SubscriptionSource>) -> Self {
        Self {
            source,
            strategies: BTreeMap::new(),
        }
    }

    /// Email from email subscriptions; chat according to `chat_policy`.
    pub fn with_defaults(source: Arc<dyn SubscriptionSource>, chat_policy: ChatRecipientPolicy) -> Self {
        let chat_population = match chat_policy {
            ChatRecipientPolicy::SameAsEmail => Provider::Email,
            ChatRecipientPolicy::ProviderSubscriptions => Provider::Slack,
        };

        let mut resolver = Self::new(source);
        resolver.register(Provider::Email, Arc::new(GroupSubscribers::new(Provider::Email)));
        resolver.register(Provider::Slack, Arc::new(GroupSubscribers::new(chat_population)));
        resolver
    }

    pub fn register(&mut self, provider: Provider, strategy: Arc<dyn RecipientStrategy>) {
        self.strategies.insert(provider, strategy);
    }

    /// Recipients for `activity` under `kind`: the kind's own selection when
    /// it makes one, otherwise [`resolve`](Self::resolve). A failing kind
    /// lookup yields no recipients.
    pub async fn resolve_for(&self, kind: &dyn ActivityNotification, activity: &Activity) -> RecipientMap {
        match kind.recipients(activity, self.source.as_ref()).await {
            Ok(Some(map)) => map
                .into_iter()
                .filter(|(_, recipients)| !recipients.is_empty())
                .collect(),
            Ok(None) => self.resolve(activity).await,
            Err(e) => {
                tracing::warn!(
                    activity = activity.id,
                    kind = kind.name(),
                    error = %e,
                    "recipient resolution failed"
                );
                RecipientMap::new()
            }
        }
    }

    /// Resolve every registered provider. Activity without a group has no
    /// recipients. A failing strategy is logged and leaves its provider out.
    pub async fn resolve(&self, activity: &Activity) -> RecipientMap {
        let mut map = RecipientMap::new();
        let Some(group) = &activity.group else {
            tracing::debug!(activity = activity.id, "activity has no group, no recipients");
            return map;
        };

        for (provider, strategy) in &self.strategies {
            match strategy
                .recipients(activity, group, self.source.as_ref())
                .await
            {
                Ok(recipients) if recipients.is_empty() => {}
                Ok(recipients) => {
                    map.insert(*provider, recipients);
                }
                Err(e) => {
                    tracing::warn!(
                        activity = activity.id,
                        group = group.id,
                        provider = %provider,
                        error = %e,
                        "recipient resolution failed"
                    );
                }
            }
        }
        map
    }
}
