//! Authorization levels and per-route role requirements.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Ordered authorization level. Comparisons are the only access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Deserialize)]
#[serde(try_from = "LevelRepr")]
pub enum AuthorizationLevel {
    #[default]
    Everyone = 0,
    ThreadAdmin = 1,
    BotAdmin = 2,
    Owner = 3,
}

impl AuthorizationLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Everyone => "everyone",
            Self::ThreadAdmin => "thread_admin",
            Self::BotAdmin => "bot_admin",
            Self::Owner => "owner",
        }
    }

    pub fn from_rank(rank: u8) -> Option<Self> {
        match rank {
            0 => Some(Self::Everyone),
            1 => Some(Self::ThreadAdmin),
            2 => Some(Self::BotAdmin),
            3 => Some(Self::Owner),
            _ => None,
        }
    }
}

impl fmt::Display for AuthorizationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthorizationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "everyone" | "user" => Ok(Self::Everyone),
            "thread_admin" | "group_admin" => Ok(Self::ThreadAdmin),
            "bot_admin" | "admin" => Ok(Self::BotAdmin),
            "owner" => Ok(Self::Owner),
            other => Err(format!("unknown authorization level \"{other}\"")),
        }
    }
}

/// Manifests may write a level by name or by numeric rank.
#[derive(Deserialize)]
#[serde(untagged)]
enum LevelRepr {
    Rank(u8),
    Name(String),
}

impl TryFrom<LevelRepr> for AuthorizationLevel {
    type Error = String;

    fn try_from(repr: LevelRepr) -> Result<Self, Self::Error> {
        match repr {
            LevelRepr::Rank(rank) => {
                Self::from_rank(rank).ok_or_else(|| format!("role rank {rank} is out of range 0..=3"))
            }
            LevelRepr::Name(name) => name.parse(),
        }
    }
}

/// Which entry point of a handler an event is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoutingClass {
    Run,
    OnReply,
    OnReaction,
    OnChat,
    OnMembership,
}

impl fmt::Display for RoutingClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Run => "run",
            Self::OnReply => "on_reply",
            Self::OnReaction => "on_reaction",
            Self::OnChat => "on_chat",
            Self::OnMembership => "on_membership",
        })
    }
}

/// Per-class levels; a missing class requires [`AuthorizationLevel::Everyone`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleTable {
    #[serde(default)]
    pub run: Option<AuthorizationLevel>,
    #[serde(default, alias = "onReply")]
    pub on_reply: Option<AuthorizationLevel>,
    #[serde(default, alias = "onReaction")]
    pub on_reaction: Option<AuthorizationLevel>,
    #[serde(default, alias = "onChat")]
    pub on_chat: Option<AuthorizationLevel>,
    #[serde(default, alias = "onMembership")]
    pub on_membership: Option<AuthorizationLevel>,
}

/// A handler's declared role requirement.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RoleRequirement {
    Uniform(AuthorizationLevel),
    PerClass(RoleTable),
}

impl Default for RoleRequirement {
    fn default() -> Self {
        Self::Uniform(AuthorizationLevel::Everyone)
    }
}

impl RoleRequirement {
    pub fn for_class(&self, class: RoutingClass) -> AuthorizationLevel {
        match self {
            Self::Uniform(level) => *level,
            Self::PerClass(table) => {
                let level = match class {
                    RoutingClass::Run => table.run,
                    RoutingClass::OnReply => table.on_reply,
                    RoutingClass::OnReaction => table.on_reaction,
                    RoutingClass::OnChat => table.on_chat,
                    RoutingClass::OnMembership => table.on_membership,
                };
                level.unwrap_or_default()
            }
        }
    }
}
