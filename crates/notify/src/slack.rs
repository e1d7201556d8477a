//! Slack provider: direct messages through every active Slack integration.
//!
//! Each (integration, recipient) pair is one delivery. Recipients without a
//! linked Slack identity on that integration are skipped.

use std::sync::Arc;
use std::time::Duration;

use fanout_core::config::SlackConfig;
use fanout_core::{Activity, Organization, Provider};
use serde::Serialize;

use crate::context::Context;
use crate::participants::Recipient;
use crate::sources::NotifyServices;
use crate::traits::{Destination, Envelope, NotificationProvider, NotifyError};

/// Attachment colour for activity messages (the "info" level colour).
pub const INFO_COLOR: &str = "#2788CE";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlackAttachment {
    pub title: String,
    pub text: String,
    pub mrkdwn_in: Vec<String>,
    pub footer_icon: String,
    pub footer: String,
    pub color: String,
}

/// Form body of `chat.postMessage`; `attachments` is a JSON-encoded list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlackPayload {
    pub token: String,
    pub channel: String,
    pub attachments: String,
}

impl SlackPayload {
    pub fn new(token: &str, channel: &str, attachments: &[SlackAttachment]) -> Result<Self, NotifyError> {
        let attachments = serde_json::to_string(attachments)
            .map_err(|e| NotifyError::Transport(format!("attachment encoding: {e}")))?;
        Ok(Self {
            token: token.to_string(),
            channel: channel.to_string(),
            attachments,
        })
    }
}

/// Message posting seam.
#[async_trait::async_trait]
pub trait ChatTransport: Send + Sync {
    async fn post_message(&self, payload: &SlackPayload) -> Result<(), NotifyError>;
}

/// Slack Web API client.
#[derive(Debug, Clone)]
pub struct SlackClient {
    api_base: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl SlackClient {
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            timeout,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &SlackConfig) -> Self {
        Self::new(&config.api_base, Duration::from_secs(config.timeout_secs))
    }
}

#[async_trait::async_trait]
impl ChatTransport for SlackClient {
    async fn post_message(&self, payload: &SlackPayload) -> Result<(), NotifyError> {
        let url = format!("{}/chat.postMessage", self.api_base);

        tracing::debug!(channel = %payload.channel, "Sending Slack message");

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .form(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NotifyError::Timeout(self.timeout)
                } else {
                    NotifyError::Http(e)
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30);
            return Err(NotifyError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        let body: serde_json::Value = response.json().await?;
        if body.get("ok") == Some(&serde_json::Value::Bool(true)) {
            tracing::info!(channel = %payload.channel, "Slack message sent");
            return Ok(());
        }

        let error = body
            .get("error")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown Slack API error");
        Err(NotifyError::Transport(format!(
            "Slack API error ({status}): {error}"
        )))
    }
}

pub struct SlackProvider {
    transport: Arc<dyn ChatTransport>,
}

impl SlackProvider {
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self { transport }
    }

    pub fn from_config(config: &SlackConfig) -> Self {
        Self::new(Arc::new(SlackClient::from_config(config)))
    }
}

/// The attachment describing one activity.
pub fn build_attachment(envelope: &Envelope<'_>) -> SlackAttachment {
    let activity = envelope.activity;
    SlackAttachment {
        title: envelope.kind.chat_title(activity),
        text: envelope.kind.chat_text(activity, envelope.context),
        mrkdwn_in: vec!["text".to_string()],
        footer_icon: envelope.services.links.system_avatar_url(),
        footer: footer(activity, envelope.context),
        color: INFO_COLOR.to_string(),
    }
}

fn footer(activity: &Activity, context: &Context) -> String {
    let label = activity
        .group
        .as_ref()
        .and_then(|g| g.qualified_short_id.clone())
        .unwrap_or_else(|| activity.project.slug.clone());
    match context.get("link").and_then(|v| v.as_str()) {
        Some(link) => format!("<{link}|{label}>"),
        None => label,
    }
}

#[async_trait::async_trait]
impl NotificationProvider for SlackProvider {
    fn provider(&self) -> Provider {
        Provider::Slack
    }

    async fn destinations(
        &self,
        organization: &Organization,
        services: &NotifyServices,
    ) -> Result<Vec<Destination>, NotifyError> {
        Ok(services
            .integrations
            .active_integrations(organization.id, Provider::Slack)
            .await?
            .into_iter()
            .map(Destination::Integration)
            .collect())
    }

    async fn deliver(
        &self,
        envelope: &Envelope<'_>,
        destination: &Destination,
        recipient: &Recipient,
    ) -> Result<(), NotifyError> {
        let Destination::Integration(integration) = destination else {
            return Err(NotifyError::Config(
                "slack delivery requires an integration destination".to_string(),
            ));
        };
        let organization = &envelope.activity.organization;

        let actor = envelope
            .services
            .integrations
            .external_actor(organization.id, integration.id, recipient.user.id)
            .await?;
        let Some(actor) = actor else {
            tracing::debug!(
                organization = %organization.slug,
                integration = integration.id,
                recipient = recipient.user.id,
                "no linked Slack identity, skipping"
            );
            return Ok(());
        };

        let channel = if actor.external_id.is_empty() {
            actor.external_name.as_str()
        } else {
            actor.external_id.as_str()
        };
        let token = integration.access_token().ok_or_else(|| {
            NotifyError::Config(format!("integration {} has no access token", integration.id))
        })?;

        let payload = SlackPayload::new(token, channel, &[build_attachment(envelope)])?;
        self.transport.post_message(&payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{ActivityNotification, NoteActivityNotification};
    use crate::context::build_notification_context;
    use crate::sources::InMemoryStore;
    use crate::testing::{activity, links, user};
    use fanout_core::{ActivityType, ExternalActor, GroupSubscriptionReason, Integration, IntegrationStatus};
    use serde_json::json;
    use std::sync::Mutex;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct RecordingTransport {
        payloads: Mutex<Vec<SlackPayload>>,
    }

    #[async_trait::async_trait]
    impl ChatTransport for RecordingTransport {
        async fn post_message(&self, payload: &SlackPayload) -> Result<(), NotifyError> {
            self.payloads.lock().unwrap().push(payload.clone());
            Ok(())
        }
    }

    fn integration(id: u64, token: Option<&str>) -> Integration {
        let mut metadata = serde_json::Map::new();
        if let Some(token) = token {
            metadata.insert("access_token".into(), json!(token));
        }
        Integration {
            id,
            provider: Provider::Slack,
            name: format!("workspace-{id}"),
            external_id: format!("T{id}"),
            status: IntegrationStatus::Active,
            metadata,
            organization_ids: vec![1],
        }
    }

    fn slack_identity(integration_id: u64, user_id: u64) -> ExternalActor {
        ExternalActor {
            organization_id: 1,
            integration_id,
            user_id,
            provider: Provider::Slack,
            external_id: format!("U{user_id}"),
            external_name: String::new(),
        }
    }

    fn services(store: InMemoryStore) -> NotifyServices {
        NotifyServices::from_store(Arc::new(store), links(), "[Sentry] ".into())
    }

    fn recipient(id: u64) -> Recipient {
        Recipient {
            user: user(id, "Bob", "bob@x.io"),
            reason: GroupSubscriptionReason::Comment,
        }
    }

    #[tokio::test]
    async fn destinations_are_active_bound_integrations() {
        let mut disabled = integration(2, Some("xoxb-2"));
        disabled.status = IntegrationStatus::Disabled;
        let mut other_org = integration(3, Some("xoxb-3"));
        other_org.organization_ids = vec![99];
        let services = services(
            InMemoryStore::default()
                .with_integration(integration(1, Some("xoxb-1")))
                .with_integration(disabled)
                .with_integration(other_org),
        );

        let act = activity(ActivityType::Note, None);
        let provider = SlackProvider::new(Arc::new(RecordingTransport::default()));
        let destinations = provider
            .destinations(&act.organization, &services)
            .await
            .unwrap();
        let ids: Vec<_> = destinations.iter().filter_map(|d| d.integration_id()).collect();
        assert_eq!(ids, vec![1]);
    }

    #[tokio::test]
    async fn note_attachment_and_payload() {
        let services = services(
            InMemoryStore::default()
                .with_integration(integration(1, Some("xoxb-1")))
                .with_external_actor(slack_identity(1, 5)),
        );
        let mut act = activity(ActivityType::Note, Some(user(1, "", "admin@localhost")));
        act.data.insert("text".into(), json!("sorry, wrong issue"));
        let kind = NoteActivityNotification;
        let context = build_notification_context(&kind, &act, &services).await.unwrap();
        let envelope = Envelope {
            activity: &act,
            kind: &kind,
            context: &context,
            services: &services,
        };

        let transport = Arc::new(RecordingTransport::default());
        let provider = SlackProvider::new(transport.clone());
        provider
            .deliver(&envelope, &Destination::Integration(integration(1, Some("xoxb-1"))), &recipient(5))
            .await
            .unwrap();

        let payloads = transport.payloads.lock().unwrap();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].token, "xoxb-1");
        assert_eq!(payloads[0].channel, "U5");

        let attachments: serde_json::Value = serde_json::from_str(&payloads[0].attachments).unwrap();
        let attachment = &attachments[0];
        assert_eq!(attachment["title"], "New comment by admin@localhost");
        assert_eq!(attachment["text"], "sorry, wrong issue");
        assert_eq!(attachment["mrkdwn_in"], json!(["text"]));
        assert_eq!(attachment["color"], "#2788CE");
        assert_eq!(
            attachment["footer_icon"],
            "https://sentry.example.com/_static/sentry/images/sentry-email-avatar.png"
        );
        assert!(attachment["footer"].as_str().unwrap().ends_with("|PROJ-123>"));
        assert_eq!(kind.chat_title(&act), attachment["title"]);
    }

    #[tokio::test]
    async fn missing_identity_is_skipped_and_missing_token_fails() {
        let services = services(
            InMemoryStore::default().with_external_actor(slack_identity(2, 5)),
        );
        let act = activity(ActivityType::Note, None);
        let context = Context::new();
        let envelope = Envelope {
            activity: &act,
            kind: &NoteActivityNotification,
            context: &context,
            services: &services,
        };
        let transport = Arc::new(RecordingTransport::default());
        let provider = SlackProvider::new(transport.clone());

        provider
            .deliver(&envelope, &Destination::Integration(integration(1, Some("xoxb-1"))), &recipient(5))
            .await
            .unwrap();
        assert!(transport.payloads.lock().unwrap().is_empty());

        let err = provider
            .deliver(&envelope, &Destination::Integration(integration(2, None)), &recipient(5))
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::Config(_)), "got: {err:?}");

        let err = provider
            .deliver(&envelope, &Destination::Direct, &recipient(5))
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::Config(_)), "got: {err:?}");
    }

    fn payload() -> SlackPayload {
        SlackPayload::new("xoxb-1", "U5", &[]).unwrap()
    }

    async fn mount_post_message(server: &MockServer, response: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string("token=xoxb-1&channel=U5&attachments=%5B%5D"))
            .respond_with(response)
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn client_posts_form_and_accepts_ok() {
        let server = MockServer::start().await;
        mount_post_message(&server, ResponseTemplate::new(200).set_body_json(json!({"ok": true}))).await;

        let client = SlackClient::new(format!("{}/", server.uri()), Duration::from_secs(5));
        client.post_message(&payload()).await.unwrap();
    }

    #[tokio::test]
    async fn client_treats_missing_ok_as_error() {
        let server = MockServer::start().await;
        mount_post_message(
            &server,
            ResponseTemplate::new(200).set_body_json(json!({"ok": false, "error": "channel_not_found"})),
        )
        .await;

        let client = SlackClient::new(server.uri(), Duration::from_secs(5));
        match client.post_message(&payload()).await.unwrap_err() {
            NotifyError::Transport(msg) => assert!(msg.contains("channel_not_found"), "got: {msg}"),
            other => panic!("expected Transport error, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn client_reports_rate_limit() {
        let server = MockServer::start().await;
        mount_post_message(
            &server,
            ResponseTemplate::new(429)
                .insert_header("Retry-After", "7")
                .set_body_json(json!({"ok": false})),
        )
        .await;

        let client = SlackClient::new(server.uri(), Duration::from_secs(5));
        match client.post_message(&payload()).await.unwrap_err() {
            NotifyError::RateLimited { retry_after_secs } => assert_eq!(retry_after_secs, 7),
            other => panic!("expected RateLimited, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn client_times_out_slow_api() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"ok": true}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let client = SlackClient::new(server.uri(), Duration::from_millis(200));
        match client.post_message(&payload()).await.unwrap_err() {
            NotifyError::Timeout(after) => assert_eq!(after, Duration::from_millis(200)),
            other => panic!("expected Timeout, got: {other:?}"),
        }
    }

    #[test]
    fn client_from_config_trims_base() {
        let client = SlackClient::from_config(&SlackConfig {
            api_base: "https://slack.example.com/api/".into(),
            timeout_secs: 5,
        });
        assert_eq!(client.api_base, "https://slack.example.com/api");
        assert_eq!(client.timeout, Duration::from_secs(5));
    }
}
