//! Shared fixtures for unit tests.

use fanout_core::{Activity, ActivityType, Group, GroupLevel, Organization, Project, User, UserId};

use crate::links::LinkBuilder;

pub fn links() -> LinkBuilder {
    LinkBuilder::new("https://sentry.example.com", b"test-key", "reply.example.com").unwrap()
}

pub fn user(id: UserId, name: &str, email: &str) -> User {
    User {
        id,
        name: name.into(),
        email: email.into(),
        username: None,
        avatar: None,
        is_superuser: false,
    }
}

pub fn group(id: u64, short_id: &str) -> Group {
    Group {
        id,
        project_id: 2,
        qualified_short_id: Some(short_id.into()),
        title: "NPE in handler".into(),
        logger: "root".into(),
        level: GroupLevel::Error,
    }
}

pub fn activity(kind: ActivityType, actor: Option<User>) -> Activity {
    Activity {
        id: 100,
        kind,
        organization: Organization {
            id: 1,
            slug: "acme".into(),
            name: "Acme".into(),
            subject_prefix: None,
        },
        project: Project {
            id: 2,
            slug: "web".into(),
            name: "Web".into(),
            organization_id: 1,
            subject_prefix: None,
        },
        group: Some(group(10, "PROJ-123")),
        user: actor,
        data: Default::default(),
    }
}
