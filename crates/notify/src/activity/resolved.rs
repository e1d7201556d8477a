use fanout_core::{Activity, ActivityType};

use super::ActivityNotification;
use crate::description::{escape_html, Description};
use crate::sources::NotifyServices;
use crate::traits::NotifyError;

pub struct ResolvedActivityNotification;

#[async_trait::async_trait]
impl ActivityNotification for ResolvedActivityNotification {
    fn activity_type(&self) -> ActivityType {
        ActivityType::SetResolved
    }

    fn name(&self) -> &'static str {
        "ResolvedActivityNotification"
    }

    fn activity_name(&self) -> &'static str {
        "Resolved Issue"
    }

    fn category(&self) -> &'static str {
        "resolved_activity_email"
    }

    async fn description(
        &self,
        _activity: &Activity,
        _services: &NotifyServices,
    ) -> Result<Description, NotifyError> {
        Ok(Description::new("{author} marked {an issue} as resolved"))
    }
}

/// Resolution scheduled for a release; `data.version` names it when known.
pub struct ResolvedInReleaseActivityNotification;

#[async_trait::async_trait]
impl ActivityNotification for ResolvedInReleaseActivityNotification {
    fn activity_type(&self) -> ActivityType {
        ActivityType::SetResolvedInRelease
    }

    fn name(&self) -> &'static str {
        "ResolvedInReleaseActivityNotification"
    }

    fn activity_name(&self) -> &'static str {
        "Resolved Issue"
    }

    fn category(&self) -> &'static str {
        "resolved_in_release_activity_email"
    }

    async fn description(
        &self,
        activity: &Activity,
        services: &NotifyServices,
    ) -> Result<Description, NotifyError> {
        match activity.data_str("version") {
            Some(version) => Ok(Description::new(
                "{author} marked {an issue} as resolved in {version}",
            )
            .with_markup(
                "version",
                version.clone(),
                version_anchor(services, activity, &version),
            )),
            None => Ok(Description::new(
                "{author} marked {an issue} as resolved in an upcoming release",
            )),
        }
    }
}

pub(super) fn version_anchor(services: &NotifyServices, activity: &Activity, version: &str) -> String {
    format!(
        r#"<a href="{}">{}</a>"#,
        escape_html(&services.links.release_link(&activity.organization, version)),
        escape_html(version)
    )
}
