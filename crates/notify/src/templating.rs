//! Minijinja body templates for notification email.
//!
//! Templates are addressed by id (e.g. `activity/generic.txt`). Ids ending
//! in `.html` are auto-escaped, so pre-rendered HTML fragments such as
//! `html_description` must be marked `|safe` in the template.

use minijinja::Environment;

use crate::context::Context;
use crate::traits::NotifyError;

const GENERIC_TXT: &str = "\
{{ text_description }}
{% if link %}
{{ link }}
{% endif %}
{% if reason %}
You are receiving this email because you {{ reason }}.
{% endif %}
{% if unsubscribe_link %}
Unsubscribe: {{ unsubscribe_link }}
{% endif %}";

const GENERIC_HTML: &str = r#"<div class="activity">
  <h3>{{ activity_name }}</h3>
  <p>{{ html_description|safe }}</p>
  {% if link %}<p><a href="{{ link }}" class="btn">View on Sentry</a></p>{% endif %}
</div>
{% if reason %}<p class="footer">You are receiving this email because you {{ reason }}.{% if unsubscribe_link %} <a href="{{ unsubscribe_link }}">Unsubscribe from this issue</a>{% endif %}</p>{% endif %}"#;

const NOTE_TXT: &str = "\
{% if author %}{{ author.name or author.email }}{% else %}Sentry{% endif %} commented on {% if group %}{{ group.qualified_short_id or group.title }}{% else %}{{ project.slug }}{% endif %}:

{{ data.text }}
{% if activity_link %}
{{ activity_link }}
{% endif %}
{% if reason %}
You are receiving this email because you {{ reason }}.
{% endif %}
{% if unsubscribe_link %}
Unsubscribe: {{ unsubscribe_link }}
{% endif %}";

const NOTE_HTML: &str = r#"<div class="note">
  <p><strong>{% if author %}{{ author.name or author.email }}{% else %}Sentry{% endif %}</strong> commented:</p>
  <blockquote>{{ data.text }}</blockquote>
  {% if activity_link %}<p><a href="{{ activity_link }}" class="btn">Reply on Sentry</a></p>{% endif %}
</div>
{% if reason %}<p class="footer">You are receiving this email because you {{ reason }}.{% if unsubscribe_link %} <a href="{{ unsubscribe_link }}">Unsubscribe from this issue</a>{% endif %}</p>{% endif %}"#;

const NEW_PROCESSING_ISSUES_TXT: &str = "\
Some events in {{ project.slug }} could not be processed:
{% for issue in issues %}
- {{ issue.message }}{% if issue.extra_info %} ({{ issue.extra_info }}){% endif %}
{% endfor %}
{% if reprocessing_active %}
Affected events are held back and will be reprocessed once these issues are resolved.
{% else %}
Reprocessing is disabled for this project; affected events were stored with incomplete information.
{% endif %}
Details: {{ info_url }}";

const NEW_PROCESSING_ISSUES_HTML: &str = r#"<div class="activity">
  <h3>Processing Issues on {{ project.slug }}</h3>
  <ul>
  {% for issue in issues %}<li>{{ issue.message }}{% if issue.extra_info %} <code>{{ issue.extra_info }}</code>{% endif %}</li>
  {% endfor %}</ul>
  {% if reprocessing_active %}<p>Affected events are held back and will be reprocessed once these issues are resolved.</p>{% else %}<p>Reprocessing is disabled for this project.</p>{% endif %}
  <p><a href="{{ info_url }}" class="btn">Show Processing Issues</a></p>
</div>"#;

/// Registered body templates.
#[derive(Debug)]
pub struct EmailTemplates {
    env: Environment<'static>,
}

impl EmailTemplates {
    /// Environment with the built-in activity templates.
    pub fn new() -> Self {
        let mut templates = Self {
            env: Environment::new(),
        };
        for (name, source) in [
            ("activity/generic.txt", GENERIC_TXT),
            ("activity/generic.html", GENERIC_HTML),
            ("activity/note.txt", NOTE_TXT),
            ("activity/note.html", NOTE_HTML),
            ("activity/new_processing_issues.txt", NEW_PROCESSING_ISSUES_TXT),
            ("activity/new_processing_issues.html", NEW_PROCESSING_ISSUES_HTML),
        ] {
            if let Err(e) = templates.env.add_template(name, source) {
                tracing::error!(template = name, error = %e, "built-in template failed to parse");
            }
        }
        templates
    }

    /// Add or replace a template.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Template`] if the source has syntax errors.
    pub fn register(&mut self, name: impl Into<String>, source: impl Into<String>) -> Result<(), NotifyError> {
        self.env.add_template_owned(name.into(), source.into())?;
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.env.get_template(name).is_ok()
    }

    /// Render a registered template with the given context.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Template`] for unknown ids or render failures.
    pub fn render(&self, name: &str, context: &Context) -> Result<String, NotifyError> {
        let template = self.env.get_template(name)?;
        Ok(template.render(context)?)
    }
}

impl Default for EmailTemplates {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context(value: serde_json::Value) -> Context {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn builtins_are_registered() {
        let templates = EmailTemplates::new();
        for name in [
            "activity/generic.txt",
            "activity/generic.html",
            "activity/note.txt",
            "activity/note.html",
            "activity/new_processing_issues.txt",
            "activity/new_processing_issues.html",
        ] {
            assert!(templates.contains(name), "missing {name}");
        }
        assert!(!templates.contains("activity/unknown.txt"));
    }

    #[test]
    fn generic_text_includes_description_and_reason() {
        let templates = EmailTemplates::new();
        let ctx = context(json!({
            "text_description": "Jane marked PROJ-1 as resolved",
            "link": "https://sentry.example.com/organizations/acme/issues/1/",
            "reason": "have commented on this issue",
        }));
        let out = templates.render("activity/generic.txt", &ctx).unwrap();
        assert!(out.starts_with("Jane marked PROJ-1 as resolved"));
        assert!(out.contains("because you have commented on this issue."));
        assert!(!out.contains("Unsubscribe"));
    }

    #[test]
    fn html_description_is_not_escaped_but_values_are() {
        let templates = EmailTemplates::new();
        let ctx = context(json!({
            "activity_name": "Resolved <Issue>",
            "html_description": "<strong>Jane</strong> resolved it",
        }));
        let out = templates.render("activity/generic.html", &ctx).unwrap();
        assert!(out.contains("<p><strong>Jane</strong> resolved it</p>"), "got: {out}");
        assert!(out.contains("Resolved &lt;Issue&gt;"), "got: {out}");
    }

    #[test]
    fn note_text_quotes_comment() {
        let templates = EmailTemplates::new();
        let ctx = context(json!({
            "author": {"name": "", "email": "admin@localhost"},
            "group": {"qualified_short_id": "PROJ-1", "title": "NPE"},
            "data": {"text": "sorry, wrong issue"},
        }));
        let out = templates.render("activity/note.txt", &ctx).unwrap();
        assert!(out.starts_with("admin@localhost commented on PROJ-1:"), "got: {out}");
        assert!(out.contains("sorry, wrong issue"));
    }

    #[test]
    fn note_html_escapes_comment() {
        let templates = EmailTemplates::new();
        let ctx = context(json!({
            "author": null,
            "group": {"qualified_short_id": "PROJ-1", "title": "NPE"},
            "data": {"text": "<script>"},
        }));
        let out = templates.render("activity/note.html", &ctx).unwrap();
        assert!(out.contains("<strong>Sentry</strong>"));
        assert!(out.contains("&lt;script&gt;"), "got: {out}");
    }

    #[test]
    fn register_overrides_and_rejects_bad_syntax() {
        let mut templates = EmailTemplates::new();
        templates
            .register("activity/generic.txt", "custom: {{ text_description }}")
            .unwrap();
        let out = templates
            .render("activity/generic.txt", &context(json!({"text_description": "x"})))
            .unwrap();
        assert_eq!(out, "custom: x");

        match templates.register("broken.txt", "{{ unclosed").unwrap_err() {
            NotifyError::Template(msg) => assert!(!msg.is_empty()),
            other => panic!("Expected Template error, got: {:?}", other),
        }
    }

    #[test]
    fn unknown_template_is_an_error() {
        let templates = EmailTemplates::new();
        assert!(templates.render("nope.txt", &Context::new()).is_err());
    }

    #[test]
    fn processing_issues_list_each_issue() {
        let templates = EmailTemplates::new();
        let ctx = context(json!({
            "project": {"slug": "web"},
            "issues": [
                {"message": "A required debug information file was missing.", "extra_info": "App (arm64)"},
                {"message": "Unknown error", "extra_info": null},
            ],
            "reprocessing_active": false,
            "info_url": "https://sentry.example.com/settings/acme/projects/web/processing-issues/",
        }));

        let text = templates.render("activity/new_processing_issues.txt", &ctx).unwrap();
        assert!(text.contains("- A required debug information file was missing. (App (arm64))"), "got: {text}");
        assert!(text.contains("- Unknown error\n"), "got: {text}");
        assert!(text.contains("Reprocessing is disabled"), "got: {text}");
        assert!(text.ends_with("Details: https://sentry.example.com/settings/acme/projects/web/processing-issues/"));

        let html = templates.render("activity/new_processing_issues.html", &ctx).unwrap();
        assert!(html.contains("<code>App (arm64)</code>"), "got: {html}");
    }
}
