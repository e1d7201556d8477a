use fanout_core::{Activity, ActivityType};

use super::{actor_name, ActivityNotification};
use crate::context::Context;
use crate::sources::NotifyServices;
use crate::traits::NotifyError;

/// A comment left on an issue. The body templates read the comment from
/// `data.text`, so no description is rendered.
pub struct NoteActivityNotification;

#[async_trait::async_trait]
impl ActivityNotification for NoteActivityNotification {
    fn activity_type(&self) -> ActivityType {
        ActivityType::Note
    }

    fn name(&self) -> &'static str {
        "NoteActivityNotification"
    }

    fn activity_name(&self) -> &'static str {
        "Note"
    }

    fn category(&self) -> &'static str {
        "note_activity_email"
    }

    fn template(&self) -> &'static str {
        "activity/note.txt"
    }

    fn html_template(&self) -> &'static str {
        "activity/note.html"
    }

    async fn context(
        &self,
        _activity: &Activity,
        _services: &NotifyServices,
    ) -> Result<Context, NotifyError> {
        Ok(Context::new())
    }

    fn chat_title(&self, activity: &Activity) -> String {
        format!("New comment by {}", actor_name(activity))
    }

    fn chat_text(&self, activity: &Activity, _context: &Context) -> String {
        activity.data_str("text").unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::InMemoryStore;
    use crate::testing::{activity, links, user};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn note_context_is_empty() {
        let services =
            NotifyServices::from_store(Arc::new(InMemoryStore::default()), links(), String::new());
        let act = activity(ActivityType::Note, None);
        let ctx = NoteActivityNotification.context(&act, &services).await.unwrap();
        assert!(ctx.is_empty());
    }

    #[test]
    fn chat_title_names_commenter() {
        let mut act = activity(
            ActivityType::Note,
            Some(user(1, "", "admin@localhost")),
        );
        act.data.insert("text".into(), json!("sorry, wrong issue"));

        assert_eq!(
            NoteActivityNotification.chat_title(&act),
            "New comment by admin@localhost"
        );
        assert_eq!(
            NoteActivityNotification.chat_text(&act, &Context::new()),
            "sorry, wrong issue"
        );

        act.user = None;
        assert_eq!(NoteActivityNotification.chat_title(&act), "New comment by Sentry");
    }
}
