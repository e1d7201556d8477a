use fanout_core::{Activity, ActivityType, GroupSubscriptionReason, Provider};
use serde_json::{json, Value};

use super::ActivityNotification;
use crate::context::Context;
use crate::participants::{ProviderRecipients, Recipient, RecipientMap};
use crate::sources::{NotifyServices, SubscriptionSource};
use crate::traits::NotifyError;

/// Events in a project failed processing (missing debug files, mappings).
///
/// Project-level: recipients are the project's email notification
/// recipients, not group subscribers, and there is no group to link to.
pub struct NewProcessingIssuesActivityNotification;

#[async_trait::async_trait]
impl ActivityNotification for NewProcessingIssuesActivityNotification {
    fn activity_type(&self) -> ActivityType {
        ActivityType::NewProcessingIssues
    }

    fn name(&self) -> &'static str {
        "NewProcessingIssuesActivityNotification"
    }

    fn activity_name(&self) -> &'static str {
        "Processing Issues"
    }

    fn category(&self) -> &'static str {
        "new_processing_issues_activity_email"
    }

    fn template(&self) -> &'static str {
        "activity/new_processing_issues.txt"
    }

    fn html_template(&self) -> &'static str {
        "activity/new_processing_issues.html"
    }

    async fn recipients(
        &self,
        activity: &Activity,
        source: &dyn SubscriptionSource,
    ) -> Result<Option<RecipientMap>, NotifyError> {
        let recipients: ProviderRecipients = source
            .project_recipients(activity.project.id, Provider::Email)
            .await?
            .into_iter()
            .map(|user| {
                (
                    user.id,
                    Recipient {
                        user,
                        reason: GroupSubscriptionReason::ProcessingIssue,
                    },
                )
            })
            .collect();

        let mut map = RecipientMap::new();
        map.insert(Provider::Email, recipients);
        Ok(Some(map))
    }

    async fn context(
        &self,
        activity: &Activity,
        services: &NotifyServices,
    ) -> Result<Context, NotifyError> {
        let issues = activity
            .data
            .get("issues")
            .and_then(Value::as_array)
            .map(|issues| summarize_issues(issues))
            .unwrap_or_default();
        let reprocessing_active = activity
            .data
            .get("reprocessing_active")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let mut context = Context::new();
        context.insert("activity_name".into(), self.activity_name().into());
        context.insert("issues".into(), Value::Array(issues));
        context.insert("reprocessing_active".into(), reprocessing_active.into());
        context.insert(
            "info_url".into(),
            services
                .links
                .absolute_uri(&format!(
                    "/settings/{}/projects/{}/processing-issues/",
                    activity.organization.slug, activity.project.slug
                ))
                .into(),
        );
        Ok(context)
    }

    fn subject(&self, activity: &Activity) -> String {
        format!("Processing Issues on {}", activity.project.slug)
    }

    fn chat_text(&self, activity: &Activity, context: &Context) -> String {
        let count = context
            .get("issues")
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        format!(
            "{count} processing issue(s) on {}",
            activity.project.slug
        )
    }
}

/// One `{message, extra_info}` entry per raw issue. `extra_info` names the
/// affected image file, with its architecture when known.
fn summarize_issues(issues: &[Value]) -> Vec<Value> {
    issues
        .iter()
        .map(|issue| {
            let kind = issue.get("type").and_then(Value::as_str).unwrap_or_default();
            let data = issue.get("data");
            let field = |key: &str| data.and_then(|d| d.get(key)).and_then(Value::as_str);

            let extra_info = field("image_path").map(|path| {
                let file = path.rsplit('/').next().unwrap_or(path);
                match field("image_arch") {
                    Some(arch) => format!("{file} ({arch})"),
                    None => file.to_string(),
                }
            });
            json!({ "message": issue_message(kind), "extra_info": extra_info })
        })
        .collect()
}

fn issue_message(kind: &str) -> &'static str {
    match kind {
        "native_missing_dsym" => "A required debug information file was missing.",
        "native_bad_dsym" => "The debug information file used was broken.",
        "native_missing_system_dsym" => "A system debug information file was missing.",
        "native_missing_symbol" => "Could not resolve one or more frames in debug information file.",
        "native_simulator_frame" => "Encountered an unprocessable simulator frame.",
        "native_unknown_image" => "A binary image is referenced that is unknown.",
        "proguard_missing_mapping" => "A proguard mapping file was missing.",
        "proguard_missing_lineno" => "A proguard mapping file does not contain line info.",
        _ => "Unknown error",
    }
}
