//! Notification context assembly.
//!
//! Context is built in layers: the base layer (activity, project and group
//! derived) is shared by every recipient and provider; the recipient layer
//! adds the subscription reason and unsubscribe link; the kind's
//! per-recipient overrides are merged last and win on conflicts.

use fanout_core::{Activity, Group, GroupSubscriptionReason, User};
use serde_json::{Map, Value};

use crate::activity::ActivityNotification;
use crate::links::LinkBuilder;
use crate::sources::NotifyServices;
use crate::traits::NotifyError;

pub type Context = Map<String, Value>;

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, NotifyError> {
    serde_json::to_value(value).map_err(|e| NotifyError::Template(format!("context encoding: {e}")))
}

/// Activity/project derived context, extended with group context when the
/// activity has a group. `referrer` is the notification kind's name.
pub fn build_base_context(
    activity: &Activity,
    referrer: &str,
    links: &LinkBuilder,
) -> Result<Context, NotifyError> {
    let mut context = Context::new();
    context.insert("data".into(), Value::Object(activity.data.clone()));
    context.insert("author".into(), to_value(&activity.user)?);
    context.insert("project".into(), to_value(&activity.project)?);
    context.insert(
        "project_link".into(),
        links
            .project_link(&activity.organization, &activity.project)
            .into(),
    );

    if let Some(group) = &activity.group {
        context.extend(build_group_context(activity, group, referrer, links)?);
    }
    Ok(context)
}

pub fn build_group_context(
    activity: &Activity,
    group: &Group,
    referrer: &str,
    links: &LinkBuilder,
) -> Result<Context, NotifyError> {
    let link = links.group_link(&activity.organization, group, referrer);
    let activity_link = links.activity_link(&link)?;

    let mut context = Context::new();
    context.insert("group".into(), to_value(group)?);
    context.insert("link".into(), link.into());
    context.insert("activity_link".into(), activity_link.into());
    context.insert("referrer".into(), referrer.into());
    Ok(context)
}

/// Per-recipient context on top of `base`; `overrides` are merged last.
pub fn build_recipient_context(
    base: &Context,
    user: &User,
    reason: GroupSubscriptionReason,
    group: Option<&Group>,
    links: &LinkBuilder,
    overrides: Context,
) -> Context {
    let mut context = base.clone();
    if let Some(group) = group {
        context.insert("reason".into(), reason.description().into());
        context.insert(
            "unsubscribe_link".into(),
            links.unsubscribe_link(user.id, group.id).into(),
        );
    }
    context.extend(overrides);
    context
}

/// Base context merged with the kind's own context (descriptions, activity name).
pub async fn build_notification_context(
    kind: &dyn ActivityNotification,
    activity: &Activity,
    services: &NotifyServices,
) -> Result<Context, NotifyError> {
    let mut context = build_base_context(activity, kind.name(), &services.links)?;
    context.extend(kind.context(activity, services).await?);
    Ok(context)
}
