//! Handler capabilities, descriptors and the per-invocation context.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::catalog::BehaviorCatalog;
use super::continuation::{ContinuationKind, ContinuationToken};
use super::error::LoadError;
use super::event::{InboundEvent, MembershipChange, MessageId, ThreadId, UserId};
use super::manifest::HandlerManifest;
use super::source::UnitId;
use super::state::AppState;
use crate::i18n;
use crate::permissions::{AuthorizationLevel, RoleRequirement, RoutingClass};

/// Primary command entry point.
#[async_trait]
pub trait Invocable: Send + Sync {
    async fn run(&self, ctx: &HandlerContext, args: &[String]) -> anyhow::Result<()>;
}

/// Follow-up to a reply on a message the handler registered.
#[async_trait]
pub trait Repliable: Send + Sync {
    async fn on_reply(&self, ctx: &HandlerContext, token: &ContinuationToken) -> anyhow::Result<()>;
}

/// Follow-up to a reaction on a message the handler registered.
#[async_trait]
pub trait Reactable: Send + Sync {
    async fn on_reaction(&self, ctx: &HandlerContext, token: &ContinuationToken) -> anyhow::Result<()>;
}

/// Sees every admitted plain message.
#[async_trait]
pub trait Passive: Send + Sync {
    async fn on_chat(&self, ctx: &HandlerContext) -> anyhow::Result<()>;
}

/// Sees joins, leaves and admin changes in threads the bot is in.
#[async_trait]
pub trait MembershipListener: Send + Sync {
    async fn on_membership(&self, ctx: &HandlerContext, change: MembershipChange) -> anyhow::Result<()>;
}

/// A handler behavior exposes whichever capabilities it implements.
pub trait Handler: Send + Sync {
    fn invocable(&self) -> Option<&dyn Invocable> {
        None
    }

    fn repliable(&self) -> Option<&dyn Repliable> {
        None
    }

    fn reactable(&self) -> Option<&dyn Reactable> {
        None
    }

    fn passive(&self) -> Option<&dyn Passive> {
        None
    }

    fn membership(&self) -> Option<&dyn MembershipListener> {
        None
    }
}

/// One loaded handler unit. Never mutated; a reload builds a new one.
pub struct HandlerDescriptor {
    pub unit: UnitId,
    pub name: String,
    pub kind: String,
    pub aliases: Vec<String>,
    pub role: RoleRequirement,
    pub cooldown: Duration,
    pub category: String,
    pub description: String,
    usage: Option<String>,
    pub handler: Arc<dyn Handler>,
}

impl HandlerDescriptor {
    pub fn from_manifest(
        unit: &UnitId,
        manifest: &HandlerManifest,
        catalog: &BehaviorCatalog,
    ) -> Result<Self, LoadError> {
        let name = manifest.normalized_name(unit)?;
        let kind = manifest
            .kind
            .as_deref()
            .map(|k| k.trim().to_lowercase())
            .unwrap_or_else(|| name.clone());

        let handler = catalog
            .build(&kind, &manifest.options)
            .ok_or_else(|| LoadError::UnknownKind {
                unit: unit.clone(),
                kind: kind.clone(),
            })?
            .map_err(|reason| LoadError::InvalidOptions {
                unit: unit.clone(),
                reason,
            })?;

        let aliases = manifest
            .normalized_aliases()
            .into_iter()
            .filter(|alias| *alias != name)
            .collect();

        Ok(Self {
            unit: unit.clone(),
            name,
            kind,
            aliases,
            role: manifest.role.clone(),
            cooldown: Duration::from_secs(manifest.cooldown),
            category: manifest
                .category
                .clone()
                .unwrap_or_else(|| "general".to_string()),
            description: manifest.description.clone().unwrap_or_default(),
            usage: manifest.usage.clone(),
            handler,
        })
    }

    pub fn required_role(&self, class: RoutingClass) -> AuthorizationLevel {
        self.role.for_class(class)
    }

    /// Name followed by aliases.
    pub fn triggers(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }

    pub fn usage_for(&self, prefix: &str) -> String {
        match &self.usage {
            Some(usage) => i18n::fill(usage, &[("prefix", prefix)]),
            None => format!("{prefix}{}", self.name),
        }
    }
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("unit", &self.unit)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("aliases", &self.aliases)
            .field("role", &self.role)
            .field("cooldown", &self.cooldown)
            .finish_non_exhaustive()
    }
}

/// Everything an entry point gets to work with.
#[derive(Clone)]
pub struct HandlerContext {
    pub state: AppState,
    pub event: Arc<InboundEvent>,
    /// The thread's resolved command prefix.
    pub prefix: String,
    pub handler: Arc<HandlerDescriptor>,
}

impl HandlerContext {
    pub fn thread(&self) -> ThreadId {
        self.event.thread
    }

    pub fn sender(&self) -> UserId {
        self.event.sender
    }

    /// Send in the event's thread as a reply to the triggering message.
    pub async fn reply(&self, content: &str) -> anyhow::Result<MessageId> {
        self.state
            .transport
            .send_message(self.event.thread, content, Some(self.event.message_id))
            .await
    }

    pub async fn send(&self, content: &str) -> anyhow::Result<MessageId> {
        self.state
            .transport
            .send_message(self.event.thread, content, None)
            .await
    }

    /// Localized text for `key`.
    pub fn text(&self, key: &str) -> String {
        self.state.text(key)
    }

    /// A token for a follow-up on `anchor`, owned by this handler and
    /// restricted to the current sender.
    pub fn continuation(&self, anchor: MessageId) -> ContinuationToken {
        ContinuationToken::new(self.event.thread, anchor, self.handler.name.clone())
            .with_author(self.event.sender)
    }

    pub fn expect_reply(&self, token: ContinuationToken) {
        self.state.continuations.register(ContinuationKind::Reply, token);
    }

    pub fn expect_reaction(&self, token: ContinuationToken) {
        self.state.continuations.register(ContinuationKind::Reaction, token);
    }
}
