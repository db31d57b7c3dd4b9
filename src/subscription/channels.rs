use std::fmt;

use crate::notification::{NotificationType, TypeRule};

/// Placeholder replaced with the username in channel templates
const USERNAME_PLACEHOLDER: &str = "{username}";

/// Marketplace role decoded from the bearer token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Student,
    Employer,
    Admin,
}

impl Role {
    /// Parse the role claim, ignoring case. Unknown or empty claims yield `None`.
    pub fn from_claim(claim: &str) -> Option<Role> {
        let claim = claim.trim();
        if claim.eq_ignore_ascii_case("student") {
            Some(Role::Student)
        } else if claim.eq_ignore_ascii_case("employer") {
            Some(Role::Employer)
        } else if claim.eq_ignore_ascii_case("admin") {
            Some(Role::Admin)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Employer => "employer",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A channel name template with its type rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDescriptor {
    pub template: &'static str,
    pub rule: TypeRule,
}

impl ChannelDescriptor {
    pub fn destination(&self, username: &str) -> String {
        self.template.replace(USERNAME_PLACEHOLDER, username)
    }
}

/// Channels every authenticated user subscribes to
static COMMON_CHANNELS: [ChannelDescriptor; 4] = [
    ChannelDescriptor {
        template: "/user/{username}/topic/job-notifications",
        rule: TypeRule::Default(NotificationType::Job),
    },
    ChannelDescriptor {
        template: "/user/{username}/topic/update-notifications",
        rule: TypeRule::Default(NotificationType::Update),
    },
    ChannelDescriptor {
        template: "/user/{username}/topic/admin-notifications",
        rule: TypeRule::Default(NotificationType::System),
    },
    ChannelDescriptor {
        template: "/topic/admin-notifications",
        rule: TypeRule::Default(NotificationType::System),
    },
];

static STUDENT_CHANNELS: [ChannelDescriptor; 1] = [ChannelDescriptor {
    template: "/user/student/topic/admin-notifications",
    rule: TypeRule::Default(NotificationType::System),
}];

static EMPLOYER_CHANNELS: [ChannelDescriptor; 1] = [ChannelDescriptor {
    template: "/user/employer/topic/admin-notifications",
    rule: TypeRule::Default(NotificationType::System),
}];

// Report payloads are always surfaced as system notifications, whatever
// type the backend labels them with.
static ADMIN_CHANNELS: [ChannelDescriptor; 1] = [ChannelDescriptor {
    template: "/user/admin/topic/report-notifications",
    rule: TypeRule::Forced(NotificationType::System),
}];

pub fn common_channels() -> &'static [ChannelDescriptor] {
    &COMMON_CHANNELS
}

/// Additional channels for a role
pub fn role_channels(role: Role) -> &'static [ChannelDescriptor] {
    match role {
        Role::Student => &STUDENT_CHANNELS,
        Role::Employer => &EMPLOYER_CHANNELS,
        Role::Admin => &ADMIN_CHANNELS,
    }
}

/// A concrete destination to subscribe to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSubscription {
    pub destination: String,
    pub rule: TypeRule,
}

/// Resolve the full channel set for a user
pub fn channels_for(username: &str, role: Option<Role>) -> Vec<ChannelSubscription> {
    let extra = role.map(role_channels).unwrap_or(&[]);

    common_channels()
        .iter()
        .chain(extra.iter())
        .map(|descriptor| ChannelSubscription {
            destination: descriptor.destination(username),
            rule: descriptor.rule.clone(),
        })
        .collect()
}
