//! Domain records shared by the fan-out engine.
//!
//! Everything here is owned by external subsystems (the event producer,
//! the persistence layer) and is treated as immutable input.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;

pub type ActivityId = u64;
pub type GroupId = u64;
pub type IntegrationId = u64;
pub type OrganizationId = u64;
pub type ProjectId = u64;
pub type TeamId = u64;
pub type UserId = u64;

// ── Activity ──────────────────────────────────────────────────

/// Kind of event recorded against a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Note,
    Assigned,
    Unassigned,
    SetResolved,
    SetResolvedInRelease,
    SetRegression,
    Deploy,
    NewProcessingIssues,
}

impl ActivityType {
    pub const ALL: [ActivityType; 8] = [
        ActivityType::Note,
        ActivityType::Assigned,
        ActivityType::Unassigned,
        ActivityType::SetResolved,
        ActivityType::SetResolvedInRelease,
        ActivityType::SetRegression,
        ActivityType::Deploy,
        ActivityType::NewProcessingIssues,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::Note => "note",
            ActivityType::Assigned => "assigned",
            ActivityType::Unassigned => "unassigned",
            ActivityType::SetResolved => "set_resolved",
            ActivityType::SetResolvedInRelease => "set_resolved_in_release",
            ActivityType::SetRegression => "set_regression",
            ActivityType::Deploy => "deploy",
            ActivityType::NewProcessingIssues => "new_processing_issues",
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| CoreError::UnknownActivityType(s.to_string()))
    }
}

/// An event tied to one project and, usually, one group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    pub kind: ActivityType,
    pub organization: Organization,
    pub project: Project,
    /// Release-level activity has no group.
    #[serde(default)]
    pub group: Option<Group>,
    /// `None` for system-generated activity.
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl Activity {
    /// String value of a data key; numbers are rendered in decimal.
    pub fn data_str(&self, key: &str) -> Option<String> {
        match self.data.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

// ── Organization / project / group ────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub slug: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub subject_prefix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub slug: String,
    #[serde(default)]
    pub name: String,
    pub organization_id: OrganizationId,
    #[serde(default)]
    pub subject_prefix: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupLevel {
    Debug,
    Info,
    Warning,
    #[default]
    Error,
    Fatal,
}

impl GroupLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupLevel::Debug => "debug",
            GroupLevel::Info => "info",
            GroupLevel::Warning => "warning",
            GroupLevel::Error => "error",
            GroupLevel::Fatal => "fatal",
        }
    }
}

/// An issue aggregating related events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub project_id: ProjectId,
    /// Organization-scoped short id, e.g. `PROJ-123`.
    #[serde(default)]
    pub qualified_short_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub logger: String,
    #[serde(default)]
    pub level: GroupLevel,
}

// ── Users ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvatarType {
    Upload,
    #[serde(alias = "letter_avatar")]
    Letter,
    Gravatar,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Avatar {
    pub kind: AvatarType,
    /// Identifier of the uploaded image record; absent when the record is missing.
    #[serde(default)]
    pub ident: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub avatar: Option<Avatar>,
    #[serde(default)]
    pub is_superuser: bool,
}

impl User {
    pub fn display_name(&self) -> &str {
        if !self.name.is_empty() {
            &self.name
        } else if !self.email.is_empty() {
            &self.email
        } else {
            self.username.as_deref().unwrap_or_default()
        }
    }

    /// Stable identifier used for generated avatars.
    pub fn label(&self) -> String {
        if !self.email.is_empty() {
            self.email.clone()
        } else {
            self.id.to_string()
        }
    }

    pub fn avatar_type(&self) -> AvatarType {
        self.avatar
            .as_ref()
            .map(|a| a.kind)
            .unwrap_or(AvatarType::Letter)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub slug: String,
}

// ── Subscriptions ─────────────────────────────────────────────

/// Why a recipient is receiving a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupSubscriptionReason {
    Implicit,
    Committed,
    ProcessingIssue,
    Comment,
    Assigned,
    Bookmark,
    StatusChange,
    DeploySetting,
    Mentioned,
    TeamMentioned,
    #[serde(other)]
    Unknown,
}

impl GroupSubscriptionReason {
    pub const DEFAULT_DESCRIPTION: &'static str = "are subscribed to this issue";

    /// User-facing explanation, completing the sentence "You are receiving this because you ...".
    pub fn description(&self) -> &'static str {
        match self {
            Self::Implicit => {
                "have opted to receive updates for all issues within projects that you are a member of"
            }
            Self::Committed => "were involved in a commit that is part of this release",
            Self::ProcessingIssue => "are subscribed to alerts for this project",
            Self::Comment => "have commented on this issue",
            Self::Assigned => "have been assigned to this issue",
            Self::Bookmark => "have bookmarked this issue",
            Self::StatusChange => "have changed the resolution status of this issue",
            Self::DeploySetting => "opted to receive all deploy notifications for this organization",
            Self::Mentioned => "have been mentioned in this issue",
            Self::TeamMentioned => "are a member of a team mentioned in this issue",
            Self::Unknown => Self::DEFAULT_DESCRIPTION,
        }
    }
}

/// A delivery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Email,
    Slack,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Email => "email",
            Provider::Slack => "slack",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "email" => Ok(Provider::Email),
            "slack" => Ok(Provider::Slack),
            other => Err(CoreError::UnknownProvider(other.to_string())),
        }
    }
}

/// A (recipient, reason) pair subscribed to a group for one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub group_id: GroupId,
    pub provider: Provider,
    pub user: User,
    pub reason: GroupSubscriptionReason,
}

// ── Integrations ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationStatus {
    #[default]
    Active,
    Disabled,
    PendingDeletion,
}

/// An organization's configured connection to a provider's external system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Integration {
    pub id: IntegrationId,
    pub provider: Provider,
    pub name: String,
    /// Workspace id on the provider side.
    pub external_id: String,
    #[serde(default)]
    pub status: IntegrationStatus,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub organization_ids: Vec<OrganizationId>,
}

impl Integration {
    pub fn is_active(&self) -> bool {
        self.status == IntegrationStatus::Active
    }

    pub fn access_token(&self) -> Option<&str> {
        self.metadata.get("access_token").and_then(Value::as_str)
    }
}

/// A user's identity inside a chat integration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalActor {
    pub organization_id: OrganizationId,
    pub integration_id: IntegrationId,
    pub user_id: UserId,
    pub provider: Provider,
    /// Provider-side id used as the message destination.
    pub external_id: String,
    #[serde(default)]
    pub external_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str, email: &str) -> User {
        User {
            id: 1,
            name: name.into(),
            email: email.into(),
            username: Some("fallback".into()),
            avatar: None,
            is_superuser: false,
        }
    }

    #[test]
    fn activity_type_round_trips_through_names() {
        for kind in ActivityType::ALL {
            assert_eq!(kind.as_str().parse::<ActivityType>().unwrap(), kind);
        }
        assert!("bogus".parse::<ActivityType>().is_err());
    }

    #[test]
    fn display_name_falls_back_to_email_then_username() {
        assert_eq!(user("Jane", "jane@example.com").display_name(), "Jane");
        assert_eq!(user("", "jane@example.com").display_name(), "jane@example.com");
        assert_eq!(user("", "").display_name(), "fallback");
    }

    #[test]
    fn unknown_reason_uses_default_description() {
        let reason: GroupSubscriptionReason = serde_json::from_str("\"something_new\"").unwrap();
        assert_eq!(reason, GroupSubscriptionReason::Unknown);
        assert_eq!(reason.description(), "are subscribed to this issue");
        assert_eq!(
            GroupSubscriptionReason::Assigned.description(),
            "have been assigned to this issue"
        );
    }

    #[test]
    fn letter_avatar_alias_is_accepted() {
        let avatar: Avatar = serde_json::from_str(r#"{"kind": "letter_avatar"}"#).unwrap();
        assert_eq!(avatar.kind, AvatarType::Letter);
    }

    #[test]
    fn integration_reads_access_token_from_metadata() {
        let integration: Integration = serde_json::from_value(serde_json::json!({
            "id": 1,
            "provider": "slack",
            "name": "Team A",
            "external_id": "TXXXXXXX1",
            "metadata": {"access_token": "xoxp-1"}
        }))
        .unwrap();
        assert!(integration.is_active());
        assert_eq!(integration.access_token(), Some("xoxp-1"));
    }

    #[test]
    fn numeric_data_values_render_as_strings() {
        let activity: Activity = serde_json::from_value(serde_json::json!({
            "id": 9,
            "kind": "assigned",
            "organization": {"id": 1, "slug": "org"},
            "project": {"id": 2, "slug": "proj", "organization_id": 1},
            "data": {"assignee": 42, "assigneeType": "user", "empty": ""}
        }))
        .unwrap();
        assert_eq!(activity.data_str("assignee").as_deref(), Some("42"));
        assert_eq!(activity.data_str("empty"), None);
        assert!(activity.group.is_none());
    }
}
