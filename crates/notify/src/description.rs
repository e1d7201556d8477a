//! Description templates rendered to plain text and HTML.
//!
//! A description is a sentence with `{token}` placeholders, e.g.
//! `"{author} marked {an issue} as resolved"`. The text and HTML renderings
//! substitute the same tokens with different values: HTML gets an avatar,
//! bold display name and a link to the issue.

use std::collections::BTreeMap;

use fanout_core::Activity;

use crate::avatar::avatar_markup;
use crate::links::LinkBuilder;
use crate::traits::NotifyError;

/// Name shown when an activity has no actor.
pub const SYSTEM_NAME: &str = "Sentry";
const ISSUE_FALLBACK: &str = "an issue";

/// A description template plus its text and HTML parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Description {
    pub template: String,
    pub text_params: BTreeMap<String, String>,
    pub html_params: BTreeMap<String, String>,
}

impl Description {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            ..Default::default()
        }
    }

    /// Add a parameter with the same value in both renderings.
    pub fn with_param(mut self, key: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        self.html_params.insert(key.to_string(), escape_html(&value));
        self.text_params.insert(key.to_string(), value);
        self
    }

    /// Add a parameter whose HTML value is pre-built markup.
    pub fn with_markup(mut self, key: &str, text: impl Into<String>, html: impl Into<String>) -> Self {
        self.text_params.insert(key.to_string(), text.into());
        self.html_params.insert(key.to_string(), html.into());
        self
    }
}

/// Renders descriptions for one activity.
pub struct DescriptionRenderer<'a> {
    activity: &'a Activity,
    links: &'a LinkBuilder,
    referrer: &'a str,
}

impl<'a> DescriptionRenderer<'a> {
    pub fn new(activity: &'a Activity, links: &'a LinkBuilder, referrer: &'a str) -> Self {
        Self {
            activity,
            links,
            referrer,
        }
    }

    /// Plain-text rendering with the description's text parameters.
    pub fn render_text(&self, description: &Description) -> Result<String, NotifyError> {
        let name = match &self.activity.user {
            Some(user) if !user.name.is_empty() => user.name.clone(),
            Some(user) => user.email.clone(),
            None => SYSTEM_NAME.to_string(),
        };

        let mut context = BTreeMap::new();
        context.insert("author".to_string(), name);
        context.insert("an issue".to_string(), self.issue_name());
        context.extend(description.text_params.clone());

        format_description(&description.template, &context)
    }

    /// HTML rendering with the description's HTML parameters.
    ///
    /// Every literal value is escaped; only the constructed author and issue
    /// fragments and the caller's HTML parameters are inserted raw.
    pub fn render_html(&self, description: &Description) -> Result<String, NotifyError> {
        let name = self
            .activity
            .user
            .as_ref()
            .map(|u| u.display_name().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| SYSTEM_NAME.to_string());

        let author = format!(
            r#"<span class="avatar-container">{}</span> <strong>{}</strong>"#,
            avatar_markup(self.activity.user.as_ref(), self.links),
            escape_html(&name)
        );

        let issue_name = escape_html(&self.issue_name());
        let an_issue = match &self.activity.group {
            Some(group) => {
                let link = self
                    .links
                    .group_link(&self.activity.organization, group, self.referrer);
                format!(r#"<a href="{}">{}</a>"#, escape_html(&link), issue_name)
            }
            None => issue_name,
        };

        let mut context = BTreeMap::new();
        context.insert("author".to_string(), author);
        context.insert("an issue".to_string(), an_issue);
        context.extend(description.html_params.clone());

        format_description(&description.template, &context)
    }

    fn issue_name(&self) -> String {
        self.activity
            .group
            .as_ref()
            .and_then(|g| g.qualified_short_id.clone())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| ISSUE_FALLBACK.to_string())
    }
}

/// Substitute `{token}` placeholders. `{{` and `}}` produce literal braces.
///
/// # Errors
///
/// Returns [`NotifyError::Template`] when a token has no value or braces
/// are unbalanced.
pub fn format_description(
    template: &str,
    params: &BTreeMap<String, String>,
) -> Result<String, NotifyError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '{' => {
                let mut token = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    token.push(c);
                }
                if !closed {
                    return Err(NotifyError::Template(format!(
                        "unclosed placeholder in description {template:?}"
                    )));
                }
                let value = params.get(&token).ok_or_else(|| {
                    NotifyError::Template(format!(
                        "missing parameter '{token}' for description {template:?}"
                    ))
                })?;
                out.push_str(value);
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => {
                return Err(NotifyError::Template(format!(
                    "single '}}' in description {template:?}"
                )));
            }
            _ => out.push(ch),
        }
    }

    Ok(out)
}

/// Escape text for inclusion in HTML element content or attribute values.
pub fn escape_html(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&#x27;"),
            _ => result.push(ch),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{activity, group, links, user};
    use fanout_core::ActivityType;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn format_substitutes_every_token() {
        let out = format_description(
            "{author} marked {an issue} as resolved in {version}",
            &params(&[("author", "Jane"), ("an issue", "PROJ-1"), ("version", "1.0")]),
        )
        .unwrap();
        assert_eq!(out, "Jane marked PROJ-1 as resolved in 1.0");
    }

    #[test]
    fn format_missing_token_is_an_error() {
        let err = format_description("{author} did {thing}", &params(&[("author", "Jane")]))
            .unwrap_err();
        match err {
            NotifyError::Template(msg) => assert!(msg.contains("thing"), "got: {msg}"),
            other => panic!("expected Template error, got: {other:?}"),
        }
    }

    #[test]
    fn format_handles_escaped_and_unbalanced_braces() {
        assert_eq!(
            format_description("{{literal}} {x}", &params(&[("x", "y")])).unwrap(),
            "{literal} y"
        );
        assert!(format_description("{unclosed", &params(&[])).is_err());
        assert!(format_description("stray } brace", &params(&[])).is_err());
    }

    #[test]
    fn escape_html_covers_special_characters() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#x27;Jerry&#x27;&lt;/a&gt;"
        );
    }

    #[test]
    fn text_uses_name_then_email_then_system() {
        let links = links();
        let description = Description::new("{author} unassigned {an issue}");

        let mut act = activity(ActivityType::Unassigned, Some(user(1, "Jane", "jane@x.io")));
        let text = DescriptionRenderer::new(&act, &links, "Ref")
            .render_text(&description)
            .unwrap();
        assert_eq!(text, "Jane unassigned PROJ-123");

        act.user = Some(user(1, "", "jane@x.io"));
        let text = DescriptionRenderer::new(&act, &links, "Ref")
            .render_text(&description)
            .unwrap();
        assert_eq!(text, "jane@x.io unassigned PROJ-123");

        act.user = None;
        act.group.as_mut().unwrap().qualified_short_id = None;
        let text = DescriptionRenderer::new(&act, &links, "Ref")
            .render_text(&description)
            .unwrap();
        assert_eq!(text, "Sentry unassigned an issue");
    }

    #[test]
    fn caller_params_override_defaults() {
        let links = links();
        let act = activity(ActivityType::Note, None);
        let description = Description::new("{author}").with_param("author", "Someone else");
        let text = DescriptionRenderer::new(&act, &links, "Ref")
            .render_text(&description)
            .unwrap();
        assert_eq!(text, "Someone else");
    }

    #[test]
    fn html_issue_token_links_to_group() {
        let links = links();
        let mut act = activity(ActivityType::SetResolved, None);
        act.group = Some(group(1, "PROJ-123"));
        let description = Description::new("{an issue}");

        let html = DescriptionRenderer::new(&act, &links, "ResolvedActivityNotification")
            .render_html(&description)
            .unwrap();
        let expected_link =
            links.group_link(&act.organization, act.group.as_ref().unwrap(), "ResolvedActivityNotification");
        assert_eq!(html, format!(r#"<a href="{expected_link}">PROJ-123</a>"#));
    }

    #[test]
    fn html_escapes_literal_text() {
        let links = links();
        let mut act = activity(ActivityType::SetResolved, Some(user(1, "<Eve>", "eve@x.io")));
        act.group.as_mut().unwrap().qualified_short_id = Some("A&B-1".into());

        let html = DescriptionRenderer::new(&act, &links, "Ref")
            .render_html(&Description::new("{author} resolved {an issue}"))
            .unwrap();
        assert!(html.contains("<strong>&lt;Eve&gt;</strong>"), "got: {html}");
        assert!(html.contains(">A&amp;B-1</a>"), "got: {html}");
        assert!(html.starts_with(r#"<span class="avatar-container">"#));
    }

    #[test]
    fn with_param_escapes_html_value() {
        let description = Description::new("{v}").with_param("v", "<1.0>");
        assert_eq!(description.text_params["v"], "<1.0>");
        assert_eq!(description.html_params["v"], "&lt;1.0&gt;");
    }
}
