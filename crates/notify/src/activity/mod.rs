//! Notification kinds, one per activity type.
//!
//! A kind supplies the category, the activity name, template ids and the
//! description for its activity type. The fan-out core only talks to the
//! [`ActivityNotification`] trait; kinds are looked up by activity type in
//! a [`NotificationRegistry`].

mod assigned;
mod new_processing_issues;
mod note;
mod regression;
mod resolved;

use std::collections::HashMap;
use std::sync::Arc;

use fanout_core::{Activity, ActivityType, User};

use crate::context::Context;
use crate::description::{Description, DescriptionRenderer};
use crate::participants::RecipientMap;
use crate::sources::{NotifyServices, SubscriptionSource};
use crate::traits::NotifyError;

pub use assigned::{AssignedActivityNotification, UnassignedActivityNotification};
pub use new_processing_issues::NewProcessingIssuesActivityNotification;
pub use note::NoteActivityNotification;
pub use regression::RegressionActivityNotification;
pub use resolved::{ResolvedActivityNotification, ResolvedInReleaseActivityNotification};

pub const GENERIC_TEMPLATE: &str = "activity/generic.txt";
pub const GENERIC_HTML_TEMPLATE: &str = "activity/generic.html";

#[async_trait::async_trait]
pub trait ActivityNotification: Send + Sync {
    fn activity_type(&self) -> ActivityType;

    /// Identifying name, used as the link referrer.
    fn name(&self) -> &'static str;

    /// Human-readable activity name shown in messages.
    fn activity_name(&self) -> &'static str;

    /// Category tag attached to outgoing mail.
    fn category(&self) -> &'static str;

    fn template(&self) -> &'static str {
        GENERIC_TEMPLATE
    }

    fn html_template(&self) -> &'static str {
        GENERIC_HTML_TEMPLATE
    }

    /// Hook evaluated once before any delivery; `false` suppresses the send.
    fn should_send(&self, _activity: &Activity) -> bool {
        true
    }

    /// Recipients chosen by the kind itself. `None` defers to the
    /// registered recipient strategies.
    async fn recipients(
        &self,
        _activity: &Activity,
        _source: &dyn SubscriptionSource,
    ) -> Result<Option<RecipientMap>, NotifyError> {
        Ok(None)
    }

    /// Description template and parameters for this activity.
    async fn description(
        &self,
        _activity: &Activity,
        _services: &NotifyServices,
    ) -> Result<Description, NotifyError> {
        Err(NotifyError::NotImplemented {
            kind: self.name().to_string(),
            method: "description",
        })
    }

    /// Kind-specific context merged over the base context.
    async fn context(
        &self,
        activity: &Activity,
        services: &NotifyServices,
    ) -> Result<Context, NotifyError> {
        let description = self.description(activity, services).await?;
        let renderer = DescriptionRenderer::new(activity, &services.links, self.name());

        let mut context = Context::new();
        context.insert("activity_name".into(), self.activity_name().into());
        context.insert(
            "text_description".into(),
            renderer.render_text(&description)?.into(),
        );
        context.insert(
            "html_description".into(),
            renderer.render_html(&description)?.into(),
        );
        Ok(context)
    }

    /// Recipient-specific keys, merged last.
    fn user_context(&self, _activity: &Activity, _user: &User) -> Context {
        Context::new()
    }

    /// Subject line without prefix.
    fn subject(&self, activity: &Activity) -> String {
        match &activity.group {
            Some(group) => {
                let short_id = group
                    .qualified_short_id
                    .clone()
                    .unwrap_or_else(|| group.id.to_string());
                format!("{short_id} - {}", group.title)
            }
            None => format!("{} - {}", activity.project.slug, self.activity_name()),
        }
    }

    /// Title of a chat message.
    fn chat_title(&self, _activity: &Activity) -> String {
        self.activity_name().to_string()
    }

    /// Body of a chat message.
    fn chat_text(&self, _activity: &Activity, context: &Context) -> String {
        context
            .get("text_description")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }
}

/// Maps activity types to their notification kind.
#[derive(Clone, Default)]
pub struct NotificationRegistry {
    kinds: HashMap<ActivityType, Arc<dyn ActivityNotification>>,
}

impl NotificationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in kind.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(NoteActivityNotification));
        registry.register(Arc::new(AssignedActivityNotification));
        registry.register(Arc::new(UnassignedActivityNotification));
        registry.register(Arc::new(ResolvedActivityNotification));
        registry.register(Arc::new(ResolvedInReleaseActivityNotification));
        registry.register(Arc::new(RegressionActivityNotification));
        registry.register(Arc::new(NewProcessingIssuesActivityNotification));
        registry
    }

    /// Register a kind, replacing any previous one for the same activity type.
    pub fn register(&mut self, kind: Arc<dyn ActivityNotification>) {
        self.kinds.insert(kind.activity_type(), kind);
    }

    pub fn get(&self, activity_type: ActivityType) -> Option<Arc<dyn ActivityNotification>> {
        self.kinds.get(&activity_type).cloned()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

/// Display name of the activity's actor for chat text.
pub(crate) fn actor_name(activity: &Activity) -> String {
    activity
        .user
        .as_ref()
        .map(|u| u.display_name().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| crate::description::SYSTEM_NAME.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{activity, links};

    struct Incomplete;

    #[async_trait::async_trait]
    impl ActivityNotification for Incomplete {
        fn activity_type(&self) -> ActivityType {
            ActivityType::Deploy
        }
        fn name(&self) -> &'static str {
            "IncompleteNotification"
        }
        fn activity_name(&self) -> &'static str {
            "Incomplete"
        }
        fn category(&self) -> &'static str {
            "incomplete"
        }
    }

    #[test]
    fn defaults_cover_built_in_kinds() {
        let registry = NotificationRegistry::with_defaults();
        assert_eq!(registry.len(), 7);
        assert!(registry.get(ActivityType::NewProcessingIssues).is_some());
        assert!(registry.get(ActivityType::Note).is_some());
        assert!(registry.get(ActivityType::Deploy).is_none());
        assert_eq!(
            registry.get(ActivityType::SetRegression).unwrap().category(),
            "regression_activity_email"
        );
    }

    #[test]
    fn register_replaces_existing_kind() {
        let mut registry = NotificationRegistry::new();
        registry.register(Arc::new(Incomplete));
        registry.register(Arc::new(Incomplete));
        assert_eq!(registry.len(), 1);
        assert!(registry.get(ActivityType::Deploy).is_some());
    }

    #[tokio::test]
    async fn missing_description_is_not_implemented() {
        let services = crate::sources::NotifyServices::from_store(
            Arc::new(crate::sources::InMemoryStore::default()),
            links(),
            "[Sentry] ".into(),
        );
        let act = activity(ActivityType::Deploy, None);

        let err = Incomplete.context(&act, &services).await.unwrap_err();
        match err {
            NotifyError::NotImplemented { kind, method } => {
                assert_eq!(kind, "IncompleteNotification");
                assert_eq!(method, "description");
            }
            other => panic!("expected NotImplemented, got: {other:?}"),
        }
    }

    #[test]
    fn subject_uses_short_id_and_title() {
        let act = activity(ActivityType::Deploy, None);
        assert_eq!(Incomplete.subject(&act), "PROJ-123 - NPE in handler");

        let mut no_group = act.clone();
        no_group.group = None;
        assert_eq!(Incomplete.subject(&no_group), "web - Incomplete");
    }
}
