use fanout_core::{Activity, ActivityType};

use super::ActivityNotification;
use crate::description::Description;
use crate::sources::NotifyServices;
use crate::traits::NotifyError;

/// Issue assigned to a user or a team.
///
/// Reads `data.assignee` (id) and `data.assigneeType` (`"user"` or `"team"`,
/// defaulting to user).
pub struct AssignedActivityNotification;

#[async_trait::async_trait]
impl ActivityNotification for AssignedActivityNotification {
    fn activity_type(&self) -> ActivityType {
        ActivityType::Assigned
    }

    fn name(&self) -> &'static str {
        "AssignedActivityNotification"
    }

    fn activity_name(&self) -> &'static str {
        "Assigned"
    }

    fn category(&self) -> &'static str {
        "assigned_activity_email"
    }

    async fn description(
        &self,
        activity: &Activity,
        services: &NotifyServices,
    ) -> Result<Description, NotifyError> {
        let assignee_id = activity
            .data_str("assignee")
            .and_then(|s| s.parse::<u64>().ok());
        let assignee_type = activity
            .data_str("assigneeType")
            .unwrap_or_else(|| "user".to_string());

        let Some(assignee_id) = assignee_id else {
            return Ok(Description::new("{author} assigned {an issue} to an unknown user"));
        };

        if assignee_type == "team" {
            return Ok(match services.directory.team(assignee_id).await? {
                Some(team) => Description::new("{author} assigned {an issue} to the {assignee} team")
                    .with_param("assignee", format!("#{}", team.slug)),
                None => Description::new("{author} assigned {an issue} to an unknown team"),
            });
        }

        if activity.user.as_ref().map(|u| u.id) == Some(assignee_id) {
            return Ok(Description::new("{author} assigned {an issue} to themselves"));
        }

        Ok(match services.directory.user(assignee_id).await? {
            Some(user) => Description::new("{author} assigned {an issue} to {assignee}")
                .with_param("assignee", user.display_name()),
            None => Description::new("{author} assigned {an issue} to an unknown user"),
        })
    }
}

pub struct UnassignedActivityNotification;

#[async_trait::async_trait]
impl ActivityNotification for UnassignedActivityNotification {
    fn activity_type(&self) -> ActivityType {
        ActivityType::Unassigned
    }

    fn name(&self) -> &'static str {
        "UnassignedActivityNotification"
    }

    fn activity_name(&self) -> &'static str {
        "Unassigned"
    }

    fn category(&self) -> &'static str {
        "unassigned_activity_email"
    }

    async fn description(
        &self,
        _activity: &Activity,
        _services: &NotifyServices,
    ) -> Result<Description, NotifyError> {
        Ok(Description::new("{author} unassigned {an issue}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::InMemoryStore;
    use crate::testing::{activity, links, user};
    use fanout_core::Team;
    use serde_json::json;
    use std::sync::Arc;

    fn services() -> NotifyServices {
        let store = InMemoryStore::default()
            .with_user(user(2, "Bob", "bob@x.io"))
            .with_team(Team {
                id: 7,
                slug: "backend".into(),
            });
        NotifyServices::from_store(Arc::new(store), links(), String::new())
    }

    async fn text_for(data: serde_json::Value) -> String {
        let services = services();
        let mut act = activity(ActivityType::Assigned, Some(user(1, "Jane", "jane@x.io")));
        act.data = data.as_object().cloned().unwrap_or_default();
        let ctx = AssignedActivityNotification
            .context(&act, &services)
            .await
            .unwrap();
        ctx["text_description"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn assigned_to_self() {
        assert_eq!(
            text_for(json!({"assignee": "1", "assigneeType": "user"})).await,
            "Jane assigned PROJ-123 to themselves"
        );
    }

    #[tokio::test]
    async fn assigned_to_other_user() {
        assert_eq!(
            text_for(json!({"assignee": 2})).await,
            "Jane assigned PROJ-123 to Bob"
        );
    }

    #[tokio::test]
    async fn assigned_to_team() {
        assert_eq!(
            text_for(json!({"assignee": "7", "assigneeType": "team"})).await,
            "Jane assigned PROJ-123 to the #backend team"
        );
    }

    #[tokio::test]
    async fn assigned_to_missing_user() {
        assert_eq!(
            text_for(json!({"assignee": "99"})).await,
            "Jane assigned PROJ-123 to an unknown user"
        );
        assert_eq!(
            text_for(json!({})).await,
            "Jane assigned PROJ-123 to an unknown user"
        );
    }

    #[tokio::test]
    async fn unassigned_description() {
        let services = services();
        let act = activity(ActivityType::Unassigned, None);
        let ctx = UnassignedActivityNotification
            .context(&act, &services)
            .await
            .unwrap();
        assert_eq!(ctx["text_description"], "Sentry unassigned PROJ-123");
        assert_eq!(ctx["activity_name"], "Unassigned");
    }
}
