//! Fakes and a wired-up engine for tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;

use super::catalog::{BehaviorCatalog, parse_options};
use super::continuation::{ContinuationStore, ContinuationToken};
use super::cooldown::CooldownTracker;
use super::dispatcher::{DispatchOutcome, Dispatcher};
use super::error::LoadError;
use super::event::{InboundEvent, MembershipChange, MessageId, ThreadId, UserId};
use super::handler::{
    Handler, HandlerContext, Invocable, MembershipListener, Passive, Reactable, Repliable,
};
use super::prefix::PrefixResolver;
use super::registry::HandlerRegistry;
use super::source::{HandlerSource, UnitId};
use super::state::AppState;
use super::stats::DispatchStats;
use super::throttle::{SafetyConfig, SafetyThrottle};
use super::transport::Transport;
use crate::database::MemoryPrefixStore;
use crate::permissions::{AdminDirectory, RoleResolver};

pub const OWNER: UserId = UserId(1);
pub const BOT_ADMIN: UserId = UserId(2);
pub const THREAD_ADMIN: UserId = UserId(3);
pub const MEMBER: UserId = UserId(10);
pub const THREAD: ThreadId = ThreadId(-100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub id: MessageId,
    pub thread: ThreadId,
    pub content: String,
    pub reply_to: Option<MessageId>,
}

/// Records every outbound message.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<SentMessage>>,
    next_id: AtomicI32,
    failing: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI32::new(1_000),
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent.lock().iter().map(|m| m.content.clone()).collect()
    }

    pub fn last_id(&self) -> MessageId {
        self.sent.lock().last().map(|m| m.id).unwrap_or(MessageId(0))
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_message(
        &self,
        thread: ThreadId,
        content: &str,
        reply_to: Option<MessageId>,
    ) -> anyhow::Result<MessageId> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("transport offline");
        }
        let id = MessageId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.sent.lock().push(SentMessage {
            id,
            thread,
            content: content.to_string(),
            reply_to,
        });
        Ok(id)
    }
}

/// Admin directory backed by a map, counting lookups.
#[derive(Default)]
pub struct StaticAdmins {
    admins: Mutex<HashMap<ThreadId, HashSet<UserId>>>,
    failing: AtomicBool,
    lookups: AtomicUsize,
}

impl StaticAdmins {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_admins(self, thread: ThreadId, ids: impl IntoIterator<Item = UserId>) -> Self {
        self.set_admins(thread, ids);
        self
    }

    pub fn set_admins(&self, thread: ThreadId, ids: impl IntoIterator<Item = UserId>) {
        self.admins.lock().insert(thread, ids.into_iter().collect());
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AdminDirectory for StaticAdmins {
    async fn thread_admins(&self, thread: ThreadId) -> anyhow::Result<HashSet<UserId>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            bail!("admin directory unavailable");
        }
        Ok(self.admins.lock().get(&thread).cloned().unwrap_or_default())
    }
}

/// In-memory handler manifests.
#[derive(Default)]
pub struct MemorySource {
    units: Mutex<BTreeMap<String, String>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(self, unit: &str, text: &str) -> Self {
        self.set(unit, text);
        self
    }

    pub fn set(&self, unit: &str, text: &str) {
        self.units.lock().insert(unit.to_string(), text.to_string());
    }

    pub fn remove(&self, unit: &str) {
        self.units.lock().remove(unit);
    }
}

impl HandlerSource for MemorySource {
    fn units(&self) -> Result<Vec<UnitId>, LoadError> {
        Ok(self.units.lock().keys().map(UnitId::new).collect())
    }

    fn read(&self, unit: &UnitId) -> Result<String, LoadError> {
        self.units
            .lock()
            .get(unit.as_str())
            .cloned()
            .ok_or_else(|| LoadError::NotFound { unit: unit.clone() })
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ProbeMode {
    #[default]
    Ok,
    Fail,
    Panic,
    Hang,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ProbeExpect {
    Reply,
    Reaction,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct ProbeOptions {
    command: bool,
    passive: bool,
    membership: bool,
    mode: ProbeMode,
    /// Register a continuation on the message sent by `run`.
    expect: Option<ProbeExpect>,
    /// Let anyone continue, not just the invoking user.
    open: bool,
    persistent: bool,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            command: true,
            passive: false,
            membership: false,
            mode: ProbeMode::Ok,
            expect: None,
            open: false,
            persistent: false,
        }
    }
}

/// Configurable test behavior. Every call announces itself as
/// `[name] entry ...` before acting on its mode.
struct Probe {
    options: ProbeOptions,
}

impl Probe {
    async fn act(&self, ctx: &HandlerContext, line: String) -> anyhow::Result<MessageId> {
        let text = format!("[{}] {}", ctx.handler.name, line);
        // Membership events have no message to reply to.
        let sent = if ctx.event.membership_change().is_some() {
            ctx.send(&text).await?
        } else {
            ctx.reply(&text).await?
        };
        match self.options.mode {
            ProbeMode::Ok => Ok(sent),
            ProbeMode::Fail => bail!("probe {} failed on purpose", ctx.handler.name),
            ProbeMode::Panic => panic!("probe {} panicked on purpose", ctx.handler.name),
            ProbeMode::Hang => {
                std::future::pending::<()>().await;
                Ok(sent)
            }
        }
    }
}

#[async_trait]
impl Invocable for Probe {
    async fn run(&self, ctx: &HandlerContext, args: &[String]) -> anyhow::Result<()> {
        let line = if args.is_empty() {
            "run".to_string()
        } else {
            format!("run {}", args.join(" "))
        };
        let sent = self.act(ctx, line).await?;

        if let Some(expect) = self.options.expect {
            let mut token = if self.options.open {
                ContinuationToken::new(ctx.thread(), sent, ctx.handler.name.clone())
            } else {
                ctx.continuation(sent)
            };
            if self.options.persistent {
                token = token.persistent();
            }
            match expect {
                ProbeExpect::Reply => ctx.expect_reply(token),
                ProbeExpect::Reaction => ctx.expect_reaction(token),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Repliable for Probe {
    async fn on_reply(&self, ctx: &HandlerContext, _token: &ContinuationToken) -> anyhow::Result<()> {
        self.act(ctx, "reply".to_string()).await.map(drop)
    }
}

#[async_trait]
impl Reactable for Probe {
    async fn on_reaction(&self, ctx: &HandlerContext, _token: &ContinuationToken) -> anyhow::Result<()> {
        let emoji = ctx.event.reaction_emoji().unwrap_or_default();
        self.act(ctx, format!("reaction {emoji}")).await.map(drop)
    }
}

#[async_trait]
impl Passive for Probe {
    async fn on_chat(&self, ctx: &HandlerContext) -> anyhow::Result<()> {
        let body = ctx.event.text().unwrap_or_default();
        self.act(ctx, format!("chat {body}")).await.map(drop)
    }
}

#[async_trait]
impl MembershipListener for Probe {
    async fn on_membership(&self, ctx: &HandlerContext, change: MembershipChange) -> anyhow::Result<()> {
        self.act(ctx, format!("membership {change:?}")).await.map(drop)
    }
}

impl Handler for Probe {
    fn invocable(&self) -> Option<&dyn Invocable> {
        self.options.command.then_some(self as &dyn Invocable)
    }

    fn repliable(&self) -> Option<&dyn Repliable> {
        (self.options.expect == Some(ProbeExpect::Reply)).then_some(self as &dyn Repliable)
    }

    fn reactable(&self) -> Option<&dyn Reactable> {
        (self.options.expect == Some(ProbeExpect::Reaction)).then_some(self as &dyn Reactable)
    }

    fn passive(&self) -> Option<&dyn Passive> {
        self.options.passive.then_some(self as &dyn Passive)
    }

    fn membership(&self) -> Option<&dyn MembershipListener> {
        self.options.membership.then_some(self as &dyn MembershipListener)
    }
}

pub fn probe_factory(options: &toml::Table) -> anyhow::Result<Arc<dyn Handler>> {
    Ok(Arc::new(Probe {
        options: parse_options(options)?,
    }))
}

pub fn probe_catalog() -> BehaviorCatalog {
    BehaviorCatalog::new().with("probe", probe_factory)
}

/// A dispatcher wired to fakes: owner [`OWNER`], bot admin [`BOT_ADMIN`],
/// and [`THREAD_ADMIN`] administering [`THREAD`].
pub struct Harness {
    pub dispatcher: Dispatcher,
    pub state: AppState,
    pub transport: Arc<RecordingTransport>,
    pub admins: Arc<StaticAdmins>,
    pub source: Arc<MemorySource>,
    next_message: AtomicI32,
}

pub struct HarnessBuilder {
    source: MemorySource,
    catalog: BehaviorCatalog,
    safety: SafetyConfig,
    timeout: Option<Duration>,
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            source: MemorySource::new(),
            catalog: probe_catalog(),
            safety: SafetyConfig::default(),
            timeout: Some(Duration::from_secs(30)),
        }
    }

    pub async fn dispatch(&self, event: InboundEvent) -> DispatchOutcome {
        self.dispatcher.dispatch(event).await
    }

    /// A message in [`THREAD`] with a fresh id.
    pub fn message(&self, sender: UserId, body: &str) -> InboundEvent {
        let id = MessageId(self.next_message.fetch_add(1, Ordering::SeqCst));
        InboundEvent::message(sender, THREAD, id, body)
    }

    pub fn reaction(&self, sender: UserId, anchor: MessageId, emoji: &str) -> InboundEvent {
        InboundEvent::reaction(sender, THREAD, anchor, emoji)
    }

    pub fn last_text(&self) -> String {
        self.transport.texts().pop().unwrap_or_default()
    }

    /// How many times probe `name` announced an invocation.
    pub fn probe_calls(&self, name: &str) -> usize {
        let marker = format!("[{name}] ");
        self.transport
            .texts()
            .iter()
            .filter(|t| t.starts_with(&marker))
            .count()
    }
}

impl HarnessBuilder {
    #[must_use]
    pub fn unit(self, id: &str, manifest: &str) -> Self {
        self.source.set(id, manifest);
        self
    }

    #[must_use]
    pub fn catalog(mut self, catalog: BehaviorCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    #[must_use]
    pub fn safety(mut self, safety: SafetyConfig) -> Self {
        self.safety = safety;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Harness {
        let transport = Arc::new(RecordingTransport::new());
        let admins = Arc::new(StaticAdmins::new().with_admins(THREAD, [THREAD_ADMIN]));
        let source = Arc::new(self.source);

        let registry = Arc::new(HandlerRegistry::new(source.clone(), self.catalog));
        if let Err(e) = registry.load() {
            panic!("test handlers failed to load: {e}");
        }

        let state = AppState {
            transport: transport.clone(),
            registry,
            roles: RoleResolver::new([OWNER], [BOT_ADMIN], admins.clone()),
            cooldowns: CooldownTracker::new(),
            throttle: Arc::new(SafetyThrottle::new(self.safety)),
            prefixes: PrefixResolver::new("!", Arc::new(MemoryPrefixStore::new())),
            continuations: ContinuationStore::new(Duration::from_secs(3600)),
            stats: Arc::new(DispatchStats::new()),
            locale: Arc::from("en"),
        };

        Harness {
            dispatcher: Dispatcher::new(state.clone(), self.timeout),
            state,
            transport,
            admins,
            source,
            next_message: AtomicI32::new(1),
        }
    }
}
