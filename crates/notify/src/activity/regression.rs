use fanout_core::{Activity, ActivityType};

use super::resolved::version_anchor;
use super::ActivityNotification;
use crate::description::Description;
use crate::sources::NotifyServices;
use crate::traits::NotifyError;

pub struct RegressionActivityNotification;

#[async_trait::async_trait]
impl ActivityNotification for RegressionActivityNotification {
    fn activity_type(&self) -> ActivityType {
        ActivityType::SetRegression
    }

    fn name(&self) -> &'static str {
        "RegressionActivityNotification"
    }

    fn activity_name(&self) -> &'static str {
        "Regression"
    }

    fn category(&self) -> &'static str {
        "regression_activity_email"
    }

    async fn description(
        &self,
        activity: &Activity,
        services: &NotifyServices,
    ) -> Result<Description, NotifyError> {
        match activity.data_str("version") {
            Some(version) => Ok(Description::new(
                "{author} marked {an issue} as a regression in {version}",
            )
            .with_markup(
                "version",
                version.clone(),
                version_anchor(services, activity, &version),
            )),
            None => Ok(Description::new("{author} marked {an issue} as a regression")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::InMemoryStore;
    use crate::testing::{activity, links};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn regression_with_and_without_version() {
        let services =
            NotifyServices::from_store(Arc::new(InMemoryStore::default()), links(), String::new());

        let mut act = activity(ActivityType::SetRegression, None);
        let ctx = RegressionActivityNotification
            .context(&act, &services)
            .await
            .unwrap();
        assert_eq!(ctx["text_description"], "Sentry marked PROJ-123 as a regression");

        act.data.insert("version".into(), json!("2.1.0"));
        let ctx = RegressionActivityNotification
            .context(&act, &services)
            .await
            .unwrap();
        assert_eq!(
            ctx["text_description"],
            "Sentry marked PROJ-123 as a regression in 2.1.0"
        );
        let html = ctx["html_description"].as_str().unwrap();
        assert!(html.ends_with(
            r#"as a regression in <a href="https://sentry.example.com/organizations/acme/releases/2.1.0/">2.1.0</a>"#
        ), "got: {html}");
    }
}
