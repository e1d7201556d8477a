//! Read-only data sources the fan-out core depends on.
//!
//! Persistence is owned elsewhere; the core only sees these traits.
//! [`InMemoryStore`] implements all of them from a JSON document and backs
//! the `fanout-send` binary and the tests.

use std::collections::HashSet;
use std::sync::Arc;

use fanout_core::config::Config;
use fanout_core::{
    ExternalActor, GroupId, Integration, IntegrationId, OrganizationId, ProjectId, Provider,
    Subscription, Team, TeamId, User, UserId,
};
use serde::Deserialize;

use crate::links::LinkBuilder;
use crate::traits::NotifyError;

/// Subscription and preference lookups.
#[async_trait::async_trait]
pub trait SubscriptionSource: Send + Sync {
    /// All (recipient, reason) pairs subscribed to a group for one provider.
    async fn group_subscribers(
        &self,
        group_id: GroupId,
        provider: Provider,
    ) -> Result<Vec<Subscription>, NotifyError>;

    /// Whether the user wants notifications about their own activity.
    async fn receive_own_activity(&self, user_id: UserId) -> Result<bool, NotifyError>;

    /// Users who receive project-level notifications through `provider`.
    async fn project_recipients(
        &self,
        project_id: ProjectId,
        provider: Provider,
    ) -> Result<Vec<User>, NotifyError>;
}

/// Integration bindings and chat identities.
#[async_trait::async_trait]
pub trait IntegrationRegistry: Send + Sync {
    /// Integrations in active status bound to the organization for a provider.
    async fn active_integrations(
        &self,
        organization_id: OrganizationId,
        provider: Provider,
    ) -> Result<Vec<Integration>, NotifyError>;

    async fn external_actor(
        &self,
        organization_id: OrganizationId,
        integration_id: IntegrationId,
        user_id: UserId,
    ) -> Result<Option<ExternalActor>, NotifyError>;
}

/// User and team lookups for description parameters.
#[async_trait::async_trait]
pub trait Directory: Send + Sync {
    async fn user(&self, id: UserId) -> Result<Option<User>, NotifyError>;
    async fn team(&self, id: TeamId) -> Result<Option<Team>, NotifyError>;
}

/// Services constructed once at startup and shared by every `send`.
pub struct NotifyServices {
    pub subscriptions: Arc<dyn SubscriptionSource>,
    pub integrations: Arc<dyn IntegrationRegistry>,
    pub directory: Arc<dyn Directory>,
    pub links: LinkBuilder,
    /// Used when neither project nor organization sets a subject prefix.
    pub default_subject_prefix: String,
}

impl NotifyServices {
    /// Wire every data source to one backing store.
    pub fn from_store<S>(store: Arc<S>, links: LinkBuilder, default_subject_prefix: String) -> Self
    where
        S: SubscriptionSource + IntegrationRegistry + Directory + 'static,
    {
        Self {
            subscriptions: store.clone(),
            integrations: store.clone(),
            directory: store,
            links,
            default_subject_prefix,
        }
    }

    pub fn from_config<S>(config: &Config, store: Arc<S>) -> Result<Self, NotifyError>
    where
        S: SubscriptionSource + IntegrationRegistry + Directory + 'static,
    {
        let secret = match config.links.signing_secret.as_deref() {
            Some(secret) => secret.to_string(),
            None => {
                tracing::warn!("SIGNING_SECRET not set, signed links use an insecure development key");
                "insecure-development-key".to_string()
            }
        };
        let links = LinkBuilder::new(
            &config.links.url_prefix,
            secret.as_bytes(),
            config.mail.reply_hostname(),
        )?;
        Ok(Self::from_store(
            store,
            links,
            config.mail.subject_prefix.clone(),
        ))
    }
}

// ── In-memory store ───────────────────────────────────────────

/// A user opted in to project-level notifications for one provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectRecipient {
    pub project_id: ProjectId,
    pub provider: Provider,
    pub user: User,
}

/// A complete data set held in memory.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct InMemoryStore {
    pub users: Vec<User>,
    pub teams: Vec<Team>,
    pub subscriptions: Vec<Subscription>,
    pub project_recipients: Vec<ProjectRecipient>,
    /// Users who opted in to notifications about their own activity.
    pub self_notifications: HashSet<UserId>,
    pub integrations: Vec<Integration>,
    pub external_actors: Vec<ExternalActor>,
}

impl InMemoryStore {
    pub fn from_json(json: &str) -> Result<Self, NotifyError> {
        serde_json::from_str(json).map_err(|e| NotifyError::Source(format!("invalid store: {e}")))
    }

    pub fn subscribe(
        mut self,
        group_id: GroupId,
        provider: Provider,
        user: &User,
        reason: fanout_core::GroupSubscriptionReason,
    ) -> Self {
        self.subscriptions.push(Subscription {
            group_id,
            provider,
            user: user.clone(),
            reason,
        });
        self
    }

    pub fn with_project_recipient(mut self, project_id: ProjectId, provider: Provider, user: &User) -> Self {
        self.project_recipients.push(ProjectRecipient {
            project_id,
            provider,
            user: user.clone(),
        });
        self
    }

    pub fn with_user(mut self, user: User) -> Self {
        self.users.push(user);
        self
    }

    pub fn with_team(mut self, team: Team) -> Self {
        self.teams.push(team);
        self
    }

    pub fn with_self_notifications(mut self, user_id: UserId) -> Self {
        self.self_notifications.insert(user_id);
        self
    }

    pub fn with_integration(mut self, integration: Integration) -> Self {
        self.integrations.push(integration);
        self
    }

    pub fn with_external_actor(mut self, actor: ExternalActor) -> Self {
        self.external_actors.push(actor);
        self
    }
}

#[async_trait::async_trait]
impl SubscriptionSource for InMemoryStore {
    async fn group_subscribers(
        &self,
        group_id: GroupId,
        provider: Provider,
    ) -> Result<Vec<Subscription>, NotifyError> {
        Ok(self
            .subscriptions
            .iter()
            .filter(|s| s.group_id == group_id && s.provider == provider)
            .cloned()
            .collect())
    }

    async fn receive_own_activity(&self, user_id: UserId) -> Result<bool, NotifyError> {
        Ok(self.self_notifications.contains(&user_id))
    }

    async fn project_recipients(
        &self,
        project_id: ProjectId,
        provider: Provider,
    ) -> Result<Vec<User>, NotifyError> {
        Ok(self
            .project_recipients
            .iter()
            .filter(|r| r.project_id == project_id && r.provider == provider)
            .map(|r| r.user.clone())
            .collect())
    }
}

#[async_trait::async_trait]
impl IntegrationRegistry for InMemoryStore {
    async fn active_integrations(
        &self,
        organization_id: OrganizationId,
        provider: Provider,
    ) -> Result<Vec<Integration>, NotifyError> {
        Ok(self
            .integrations
            .iter()
            .filter(|i| {
                i.provider == provider
                    && i.is_active()
                    && i.organization_ids.contains(&organization_id)
            })
            .cloned()
            .collect())
    }

    async fn external_actor(
        &self,
        organization_id: OrganizationId,
        integration_id: IntegrationId,
        user_id: UserId,
    ) -> Result<Option<ExternalActor>, NotifyError> {
        Ok(self
            .external_actors
            .iter()
            .find(|a| {
                a.organization_id == organization_id
                    && a.integration_id == integration_id
                    && a.user_id == user_id
            })
            .cloned())
    }
}

#[async_trait::async_trait]
impl Directory for InMemoryStore {
    async fn user(&self, id: UserId) -> Result<Option<User>, NotifyError> {
        Ok(self.users.iter().find(|u| u.id == id).cloned())
    }

    async fn team(&self, id: TeamId) -> Result<Option<Team>, NotifyError> {
        Ok(self.teams.iter().find(|t| t.id == id).cloned())
    }
}
