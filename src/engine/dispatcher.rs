//! Event routing.
//!
//! For each inbound event: membership sync and fan-out, safety gate, then
//! the first routing class that matches among reply continuation, reaction
//! continuation and message routing (passive fan-out, then commands).
//! Handler failures of any sort stop at this boundary.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::continuation::ContinuationKind;
use super::cooldown::CooldownCheck;
use super::error::InvocationError;
use super::event::{EventKind, InboundEvent, MembershipChange, MessageId};
use super::handler::{HandlerContext, HandlerDescriptor};
use super::state::AppState;
use crate::permissions::{AuthorizationLevel, RoutingClass};

/// Whether an invoked entry point finished cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationResult {
    Completed,
    Failed,
}

/// What one dispatch did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Rejected by the safety throttle.
    Dropped,
    /// Admins refreshed; this many membership handlers ran.
    MembershipSynced { invoked: usize },
    /// Nothing applied.
    Ignored,
    Replied { handler: String, result: InvocationResult },
    Reacted { handler: String, result: InvocationResult },
    Invoked { handler: String, result: InvocationResult },
    Denied { handler: String, class: RoutingClass },
    CoolingDown { handler: String, retry_after_secs: u64 },
    NotFound { command: String },
    /// Prefix with no command after it.
    UsageHint,
    /// Plain message; this many passive handlers ran.
    Passive { invoked: usize },
}

#[derive(Clone)]
pub struct Dispatcher {
    state: AppState,
    handler_timeout: Option<Duration>,
}

impl Dispatcher {
    /// `handler_timeout` of `None` lets entry points run unbounded.
    pub fn new(state: AppState, handler_timeout: Option<Duration>) -> Self {
        Self {
            state,
            handler_timeout,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Dispatch on its own task.
    pub fn spawn(&self, event: InboundEvent) -> JoinHandle<DispatchOutcome> {
        let this = self.clone();
        tokio::spawn(async move { this.dispatch(event).await })
    }

    pub async fn dispatch(&self, event: InboundEvent) -> DispatchOutcome {
        let event = Arc::new(event);

        if let EventKind::Membership(change) = event.kind {
            return self.sync_membership(&event, change).await;
        }

        if !self.state.throttle.admit(&event) {
            self.state.stats.record_dropped();
            return DispatchOutcome::Dropped;
        }
        self.state.stats.record_admitted();

        if event.is_message() {
            self.route_message(&event).await
        } else {
            self.route_continuation(ContinuationKind::Reaction, event.message_id, &event)
                .await
                .unwrap_or(DispatchOutcome::Ignored)
        }
    }

    /// Membership events skip the safety gate.
    async fn sync_membership(&self, event: &Arc<InboundEvent>, change: MembershipChange) -> DispatchOutcome {
        debug!("Membership change {:?} in thread {}", change, event.thread);
        self.state.roles.refresh_thread(event.thread).await;

        let handlers = self.state.registry.membership_handlers();
        let invoked = self.fan_out(event, RoutingClass::OnMembership, handlers).await;
        DispatchOutcome::MembershipSynced { invoked }
    }

    async fn route_message(&self, event: &Arc<InboundEvent>) -> DispatchOutcome {
        if let Some(anchor) = event.reply_to
            && let Some(outcome) = self.route_continuation(ContinuationKind::Reply, anchor, event).await
        {
            return outcome;
        }

        let handlers = self.state.registry.passive_handlers();
        let invoked = self.fan_out(event, RoutingClass::OnChat, handlers).await;
        match self.route_command(event).await {
            Some(outcome) => outcome,
            None => DispatchOutcome::Passive { invoked },
        }
    }

    /// `None` means no live continuation applies and routing goes on.
    async fn route_continuation(
        &self,
        kind: ContinuationKind,
        anchor: MessageId,
        event: &Arc<InboundEvent>,
    ) -> Option<DispatchOutcome> {
        let token = self.state.continuations.peek(kind, event.thread, anchor)?;
        if !token.accepts(event.sender) {
            debug!("Continuation on {} belongs to someone else", anchor);
            return None;
        }

        let Some(descriptor) = self.state.registry.get(&token.handler) else {
            debug!("Continuation handler {} is no longer registered", token.handler);
            return None;
        };
        let (class, capable) = match kind {
            ContinuationKind::Reply => (RoutingClass::OnReply, descriptor.handler.repliable().is_some()),
            ContinuationKind::Reaction => (RoutingClass::OnReaction, descriptor.handler.reactable().is_some()),
        };
        if !capable {
            debug!("Handler {} no longer takes {}", descriptor.name, class);
            return None;
        }

        if !self.authorized(&descriptor, class, event).await {
            return Some(self.deny(&descriptor, class, event).await);
        }
        if !self.state.continuations.consume(kind, &token) {
            // Another event claimed this one-shot token first.
            return None;
        }

        let ctx = self.context(event, &descriptor);
        let result = self
            .guarded(async {
                match kind {
                    ContinuationKind::Reply => match descriptor.handler.repliable() {
                        Some(entry) => entry.on_reply(&ctx, &token).await,
                        None => Ok(()),
                    },
                    ContinuationKind::Reaction => match descriptor.handler.reactable() {
                        Some(entry) => entry.on_reaction(&ctx, &token).await,
                        None => Ok(()),
                    },
                }
            })
            .await;
        let result = self.settle(&descriptor, class, event, result, true).await;

        let handler = descriptor.name.clone();
        Some(match kind {
            ContinuationKind::Reply => DispatchOutcome::Replied { handler, result },
            ContinuationKind::Reaction => DispatchOutcome::Reacted { handler, result },
        })
    }

    /// Run every handler authorized for `class` concurrently; returns how
    /// many ran. Failures are logged, never announced.
    async fn fan_out(
        &self,
        event: &Arc<InboundEvent>,
        class: RoutingClass,
        handlers: Vec<Arc<HandlerDescriptor>>,
    ) -> usize {
        if handlers.is_empty() {
            return 0;
        }

        let needs_role = handlers
            .iter()
            .any(|d| d.required_role(class) > AuthorizationLevel::Everyone);
        let role = if needs_role {
            self.state.roles.role_of(event.sender, event.thread).await
        } else {
            AuthorizationLevel::Everyone
        };

        let runs: Vec<_> = handlers
            .into_iter()
            .filter(|descriptor| {
                let allowed = role >= descriptor.required_role(class);
                if !allowed {
                    debug!("Skipping {} of {} for user {}", class, descriptor.name, event.sender);
                }
                allowed
            })
            .map(|descriptor| async move {
                let ctx = self.context(event, &descriptor);
                let result = self.guarded(listen(&ctx, class)).await;
                self.settle(&descriptor, class, event, result, false).await
            })
            .collect();

        join_all(runs).await.len()
    }

    /// `None` when the message is not a command.
    async fn route_command(&self, event: &Arc<InboundEvent>) -> Option<DispatchOutcome> {
        let body = event.text()?;
        let prefix = self.state.prefixes.resolve(event.thread);
        let rest = body.strip_prefix(prefix.as_str())?;

        let mut tokens = rest.split_whitespace();
        let Some(command) = tokens.next() else {
            let hint = self.state.format("dispatch.usage_hint", &[("prefix", &prefix)]);
            self.notify(event, &hint).await;
            return Some(DispatchOutcome::UsageHint);
        };
        let command = command.to_lowercase();

        let descriptor = match self.state.registry.resolve(&command) {
            Some(d) if d.handler.invocable().is_some() => d,
            _ => {
                let text = self.state.format(
                    "dispatch.not_found",
                    &[("command", &command), ("prefix", &prefix)],
                );
                self.notify(event, &text).await;
                return Some(DispatchOutcome::NotFound { command });
            }
        };

        if !self.authorized(&descriptor, RoutingClass::Run, event).await {
            return Some(self.deny(&descriptor, RoutingClass::Run, event).await);
        }

        if let CooldownCheck::Active { retry_after_secs } =
            self.state
                .cooldowns
                .check(event.sender, &descriptor.name, descriptor.cooldown)
        {
            let text = self.state.format(
                "dispatch.cooldown",
                &[
                    ("seconds", &retry_after_secs.to_string()),
                    ("command", &descriptor.name),
                ],
            );
            self.notify(event, &text).await;
            return Some(DispatchOutcome::CoolingDown {
                handler: descriptor.name.clone(),
                retry_after_secs,
            });
        }

        let args: Vec<String> = tokens.map(str::to_string).collect();
        let ctx = self.context(event, &descriptor);
        let result = self
            .guarded(async {
                match descriptor.handler.invocable() {
                    Some(entry) => entry.run(&ctx, &args).await,
                    None => Ok(()),
                }
            })
            .await;
        let result = self.settle(&descriptor, RoutingClass::Run, event, result, true).await;
        if result == InvocationResult::Completed {
            self.state.stats.record_command(&descriptor.name);
        }

        Some(DispatchOutcome::Invoked {
            handler: descriptor.name.clone(),
            result,
        })
    }

    fn context(&self, event: &Arc<InboundEvent>, descriptor: &Arc<HandlerDescriptor>) -> HandlerContext {
        HandlerContext {
            state: self.state.clone(),
            event: Arc::clone(event),
            prefix: self.state.prefixes.resolve(event.thread),
            handler: Arc::clone(descriptor),
        }
    }

    async fn authorized(
        &self,
        descriptor: &HandlerDescriptor,
        class: RoutingClass,
        event: &InboundEvent,
    ) -> bool {
        let required = descriptor.required_role(class);
        if required == AuthorizationLevel::Everyone {
            return true;
        }
        self.state.roles.role_of(event.sender, event.thread).await >= required
    }

    async fn deny(
        &self,
        descriptor: &HandlerDescriptor,
        class: RoutingClass,
        event: &InboundEvent,
    ) -> DispatchOutcome {
        debug!(
            "User {} denied {} of {} in thread {}",
            event.sender, class, descriptor.name, event.thread
        );
        self.state.stats.record_denied();
        self.notify(event, &self.state.text("dispatch.permission_denied"))
            .await;
        DispatchOutcome::Denied {
            handler: descriptor.name.clone(),
            class,
        }
    }

    /// Run an entry point, turning errors, panics and overruns into
    /// [`InvocationError`]s.
    async fn guarded<F>(&self, entry: F) -> Result<(), InvocationError>
    where
        F: Future<Output = anyhow::Result<()>>,
    {
        let caught = AssertUnwindSafe(entry).catch_unwind();
        let finished = match self.handler_timeout {
            Some(limit) => match tokio::time::timeout(limit, caught).await {
                Ok(finished) => finished,
                Err(_) => return Err(InvocationError::TimedOut(limit)),
            },
            None => caught.await,
        };

        match finished {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(InvocationError::Failed(e)),
            Err(panic) => Err(InvocationError::Panicked(panic_message(panic.as_ref()))),
        }
    }

    async fn settle(
        &self,
        descriptor: &HandlerDescriptor,
        class: RoutingClass,
        event: &InboundEvent,
        result: Result<(), InvocationError>,
        announce: bool,
    ) -> InvocationResult {
        match result {
            Ok(()) => InvocationResult::Completed,
            Err(e) => {
                error!(
                    "Handler {} ({}) failed in thread {}: {}",
                    descriptor.name, class, event.thread, e
                );
                self.state.stats.record_failure();
                if announce {
                    self.notify(event, &self.state.text("dispatch.failed")).await;
                }
                InvocationResult::Failed
            }
        }
    }

    /// Reply in the event's thread; send failures are only logged.
    async fn notify(&self, event: &InboundEvent, text: &str) {
        if let Err(e) = self
            .state
            .transport
            .send_message(event.thread, text, Some(event.message_id))
            .await
        {
            warn!("Failed to send reply in thread {}: {:#}", event.thread, e);
        }
    }
}

/// Listener entry point of `ctx.handler` for `class`.
async fn listen(ctx: &HandlerContext, class: RoutingClass) -> anyhow::Result<()> {
    let handler = &ctx.handler.handler;
    match (class, ctx.event.membership_change()) {
        (RoutingClass::OnMembership, Some(change)) => match handler.membership() {
            Some(entry) => entry.on_membership(ctx, change).await,
            None => Ok(()),
        },
        (RoutingClass::OnChat, None) => match handler.passive() {
            Some(entry) => entry.on_chat(ctx).await,
            None => Ok(()),
        },
        _ => Ok(()),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Local, Timelike};

    use super::*;
    use crate::engine::UnitId;
    use crate::engine::event::{MembershipChange, ThreadId, UserId};
    use crate::engine::testing::{BOT_ADMIN, Harness, MEMBER, OWNER, THREAD, THREAD_ADMIN};
    use crate::engine::throttle::{ActiveHours, SafetyConfig};

    const PING: &str = r#"
        name = "ping"
        kind = "probe"
        cooldown = 2
    "#;

    fn invoked(handler: &str) -> DispatchOutcome {
        DispatchOutcome::Invoked {
            handler: handler.to_string(),
            result: InvocationResult::Completed,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ping_cooldown_scenario() {
        let h = Harness::builder().unit("ping.toml", PING).build();

        assert_eq!(h.dispatch(h.message(MEMBER, "!ping")).await, invoked("ping"));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(
            h.dispatch(h.message(MEMBER, "!ping")).await,
            DispatchOutcome::CoolingDown {
                handler: "ping".to_string(),
                retry_after_secs: 1
            }
        );
        assert!(h.last_text().contains("1s"));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(h.dispatch(h.message(MEMBER, "!ping")).await, invoked("ping"));
        assert_eq!(h.probe_calls("ping"), 2);
    }

    #[tokio::test]
    async fn unknown_command_gets_a_single_not_found_reply() {
        let h = Harness::builder().unit("ping.toml", PING).build();

        assert_eq!(
            h.dispatch(h.message(MEMBER, "!frobnicate now")).await,
            DispatchOutcome::NotFound {
                command: "frobnicate".to_string()
            }
        );
        let texts = h.transport.texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("frobnicate"));
        assert_eq!(h.probe_calls("ping"), 0);
    }

    #[tokio::test]
    async fn commands_are_case_insensitive_and_receive_arguments() {
        let h = Harness::builder()
            .unit("echo.toml", "name = \"echo\"\nkind = \"probe\"\naliases = [\"say\"]")
            .build();

        assert_eq!(h.dispatch(h.message(MEMBER, "!SAY hello  world")).await, invoked("echo"));
        assert_eq!(h.last_text(), "[echo] run hello world");
    }

    #[tokio::test]
    async fn bare_prefix_gets_usage_hint() {
        let h = Harness::builder().unit("ping.toml", PING).build();

        assert_eq!(h.dispatch(h.message(MEMBER, "!   ")).await, DispatchOutcome::UsageHint);
        assert!(h.last_text().contains("!help"));
    }

    #[tokio::test]
    async fn unauthorized_command_only_gets_a_denial() {
        let h = Harness::builder()
            .unit("ban.toml", "name = \"ban\"\nkind = \"probe\"\nrole = \"thread_admin\"")
            .build();

        assert_eq!(
            h.dispatch(h.message(MEMBER, "!ban someone")).await,
            DispatchOutcome::Denied {
                handler: "ban".to_string(),
                class: RoutingClass::Run
            }
        );
        assert_eq!(h.transport.texts().len(), 1);
        assert_eq!(h.probe_calls("ban"), 0);

        for user in [THREAD_ADMIN, BOT_ADMIN, OWNER] {
            assert_eq!(h.dispatch(h.message(user, "!ban someone")).await, invoked("ban"));
        }
    }

    #[tokio::test]
    async fn only_the_thread_prefix_triggers_commands() {
        let h = Harness::builder().unit("ping.toml", PING).build();
        h.state.prefixes.set(THREAD, "?").await.unwrap();

        assert_eq!(
            h.dispatch(h.message(MEMBER, "!ping")).await,
            DispatchOutcome::Passive { invoked: 0 }
        );
        assert_eq!(h.dispatch(h.message(MEMBER, "?ping")).await, invoked("ping"));
    }

    #[tokio::test]
    async fn events_outside_active_hours_are_dropped_silently() {
        let hour = Local::now().hour() as u8;
        let closed = ActiveHours::new((hour + 2) % 24, (hour + 3) % 24).unwrap();
        let h = Harness::builder()
            .unit("ping.toml", PING)
            .safety(SafetyConfig {
                active_hours: closed,
                ..Default::default()
            })
            .build();

        assert_eq!(h.dispatch(h.message(MEMBER, "!ping")).await, DispatchOutcome::Dropped);
        assert!(h.transport.texts().is_empty());
        assert_eq!(h.state.stats.snapshot(1).dropped, 1);
    }

    #[tokio::test]
    async fn reply_continuation_beats_command_prefix() {
        let h = Harness::builder()
            .unit("ask.toml", "name = \"ask\"\nkind = \"probe\"\n[options]\nexpect = \"reply\"")
            .unit("ping.toml", PING)
            .build();

        assert_eq!(h.dispatch(h.message(MEMBER, "!ask")).await, invoked("ask"));
        let anchor = h.transport.last_id();

        let reply = h.message(MEMBER, "!ping").replying_to(anchor);
        assert_eq!(
            h.dispatch(reply).await,
            DispatchOutcome::Replied {
                handler: "ask".to_string(),
                result: InvocationResult::Completed
            }
        );
        assert_eq!(h.probe_calls("ping"), 0);
        assert_eq!(h.last_text(), "[ask] reply");

        // One-shot: the second reply falls through to command routing.
        let again = h.message(MEMBER, "!ping").replying_to(anchor);
        assert_eq!(h.dispatch(again).await, invoked("ping"));
    }

    #[tokio::test]
    async fn continuation_is_restricted_to_its_author() {
        let h = Harness::builder()
            .unit("ask.toml", "name = \"ask\"\nkind = \"probe\"\n[options]\nexpect = \"reply\"")
            .build();
        h.dispatch(h.message(MEMBER, "!ask")).await;
        let anchor = h.transport.last_id();

        let stranger = h.message(UserId(99), "me too").replying_to(anchor);
        assert_eq!(h.dispatch(stranger).await, DispatchOutcome::Passive { invoked: 0 });

        let author = h.message(MEMBER, "ok").replying_to(anchor);
        assert!(matches!(h.dispatch(author).await, DispatchOutcome::Replied { .. }));
    }

    #[tokio::test]
    async fn reaction_continuation_checks_its_own_role() {
        let h = Harness::builder()
            .unit(
                "vote.toml",
                r#"
                name = "vote"
                kind = "probe"
                [role]
                onReaction = "bot_admin"
                [options]
                expect = "reaction"
                open = true
                persistent = true
                "#,
            )
            .build();
        assert_eq!(h.dispatch(h.message(MEMBER, "!vote")).await, invoked("vote"));
        let anchor = h.transport.last_id();

        assert_eq!(
            h.dispatch(h.reaction(MEMBER, anchor, "👍")).await,
            DispatchOutcome::Denied {
                handler: "vote".to_string(),
                class: RoutingClass::OnReaction
            }
        );
        for _ in 0..2 {
            assert!(matches!(
                h.dispatch(h.reaction(BOT_ADMIN, anchor, "👍")).await,
                DispatchOutcome::Reacted { .. }
            ));
        }
        assert_eq!(h.last_text(), "[vote] reaction 👍");
    }

    #[tokio::test]
    async fn continuation_for_unloaded_handler_is_no_match() {
        let h = Harness::builder()
            .unit("ask.toml", "name = \"ask\"\nkind = \"probe\"\n[options]\nexpect = \"reaction\"")
            .build();
        h.dispatch(h.message(MEMBER, "!ask")).await;
        let anchor = h.transport.last_id();

        h.state.registry.unload(&crate::engine::UnitId::new("ask.toml"));
        assert_eq!(
            h.dispatch(h.reaction(MEMBER, anchor, "👍")).await,
            DispatchOutcome::Ignored
        );
    }

    #[tokio::test]
    async fn failing_passive_handler_does_not_stop_the_others() {
        let h = Harness::builder()
            .unit("a.toml", "name = \"broken\"\nkind = \"probe\"\n[options]\npassive = true\nmode = \"fail\"")
            .unit("b.toml", "name = \"echo\"\nkind = \"probe\"\n[options]\npassive = true")
            .build();

        assert_eq!(
            h.dispatch(h.message(MEMBER, "hello")).await,
            DispatchOutcome::Passive { invoked: 2 }
        );
        let texts = h.transport.texts();
        assert!(texts.contains(&"[echo] chat hello".to_string()));
        assert!(!texts.iter().any(|t| t == &h.state.text("dispatch.failed")));
        assert_eq!(h.state.stats.snapshot(1).failures, 1);
    }

    #[tokio::test]
    async fn passive_handlers_run_before_command_routing() {
        let h = Harness::builder()
            .unit("echo.toml", "name = \"echo\"\nkind = \"probe\"\n[options]\npassive = true")
            .unit("ping.toml", PING)
            .build();

        assert_eq!(h.dispatch(h.message(MEMBER, "!ping")).await, invoked("ping"));
        assert_eq!(h.probe_calls("echo"), 1);
    }

    #[tokio::test]
    async fn passive_role_denial_is_silent() {
        let h = Harness::builder()
            .unit(
                "audit.toml",
                "name = \"audit\"\nkind = \"probe\"\n[role]\nonChat = \"owner\"\n[options]\npassive = true",
            )
            .build();

        assert_eq!(
            h.dispatch(h.message(MEMBER, "hello")).await,
            DispatchOutcome::Passive { invoked: 0 }
        );
        assert!(h.transport.texts().is_empty());
        assert_eq!(
            h.dispatch(h.message(OWNER, "hello")).await,
            DispatchOutcome::Passive { invoked: 1 }
        );
    }

    #[tokio::test]
    async fn failing_command_reports_generic_notice() {
        let h = Harness::builder()
            .unit("boom.toml", "name = \"boom\"\nkind = \"probe\"\n[options]\nmode = \"fail\"")
            .unit("bang.toml", "name = \"bang\"\nkind = \"probe\"\n[options]\nmode = \"panic\"")
            .build();

        for cmd in ["!boom", "!bang"] {
            assert!(matches!(
                h.dispatch(h.message(MEMBER, cmd)).await,
                DispatchOutcome::Invoked {
                    result: InvocationResult::Failed,
                    ..
                }
            ));
            assert_eq!(h.last_text(), h.state.text("dispatch.failed"));
        }
        assert!(h.state.stats.snapshot(5).top_commands.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_handler_times_out() {
        let h = Harness::builder()
            .unit("slow.toml", "name = \"slow\"\nkind = \"probe\"\n[options]\nmode = \"hang\"")
            .timeout(Duration::from_secs(5))
            .build();

        assert!(matches!(
            h.dispatch(h.message(MEMBER, "!slow")).await,
            DispatchOutcome::Invoked {
                result: InvocationResult::Failed,
                ..
            }
        ));
        assert_eq!(h.last_text(), h.state.text("dispatch.failed"));
    }

    #[tokio::test]
    async fn membership_events_refresh_admins_and_bypass_throttle() {
        let h = Harness::builder()
            .unit("ban.toml", "name = \"ban\"\nkind = \"probe\"\nrole = \"thread_admin\"")
            .safety(SafetyConfig {
                max_daily_messages: 0,
                ..Default::default()
            })
            .build();
        h.admins.set_admins(THREAD, [MEMBER]);

        let event = InboundEvent::membership(MEMBER, THREAD, MembershipChange::AdminsChanged);
        assert_eq!(
            h.dispatch(event).await,
            DispatchOutcome::MembershipSynced { invoked: 0 }
        );
        assert_eq!(h.admins.lookups(), 1);
        assert_eq!(
            h.state.roles.role_of(MEMBER, THREAD).await,
            AuthorizationLevel::ThreadAdmin
        );
    }

    #[tokio::test]
    async fn membership_changes_fan_out_to_listeners_in_isolation() {
        let h = Harness::builder()
            .unit("a.toml", "name = \"broken\"\nkind = \"probe\"\n[options]\nmembership = true\nmode = \"panic\"")
            .unit("b.toml", "name = \"greeter\"\nkind = \"probe\"\n[options]\nmembership = true")
            .unit("c.toml", "name = \"chat\"\nkind = \"probe\"\n[options]\npassive = true")
            .safety(SafetyConfig {
                max_daily_messages: 0,
                ..Default::default()
            })
            .build();

        let event = InboundEvent::membership(MEMBER, THREAD, MembershipChange::Joined);
        assert_eq!(
            h.dispatch(event).await,
            DispatchOutcome::MembershipSynced { invoked: 2 }
        );

        let sent = h.transport.sent();
        assert!(sent.iter().any(|m| m.content == "[greeter] membership Joined"));
        assert!(sent.iter().all(|m| m.reply_to.is_none()));
        assert!(!h.transport.texts().contains(&h.state.text("dispatch.failed")));
        assert_eq!(h.probe_calls("chat"), 0);
        assert_eq!(h.state.stats.snapshot(1).failures, 1);
    }

    #[tokio::test]
    async fn membership_listener_role_is_checked_against_the_member() {
        let h = Harness::builder()
            .unit(
                "audit.toml",
                "name = \"audit\"\nkind = \"probe\"\n[role]\nonMembership = \"thread_admin\"\n[options]\nmembership = true",
            )
            .build();

        let joined = InboundEvent::membership(MEMBER, THREAD, MembershipChange::Joined);
        assert_eq!(
            h.dispatch(joined).await,
            DispatchOutcome::MembershipSynced { invoked: 0 }
        );
        assert!(h.transport.texts().is_empty());

        let promoted = InboundEvent::membership(THREAD_ADMIN, THREAD, MembershipChange::AdminsChanged);
        assert_eq!(
            h.dispatch(promoted).await,
            DispatchOutcome::MembershipSynced { invoked: 1 }
        );
        assert_eq!(h.last_text(), "[audit] membership AdminsChanged");
    }

    #[tokio::test(start_paused = true)]
    async fn reloading_one_unit_keeps_other_units_cooling_down() {
        let h = Harness::builder()
            .unit("a.toml", "name = \"alpha\"\nkind = \"probe\"\ncooldown = 60")
            .unit("b.toml", "name = \"beta\"\nkind = \"probe\"\ncooldown = 60")
            .build();
        assert_eq!(h.dispatch(h.message(MEMBER, "!alpha")).await, invoked("alpha"));
        assert_eq!(h.dispatch(h.message(MEMBER, "!beta")).await, invoked("beta"));
        let beta = h.state.registry.resolve("beta").unwrap();

        h.source.set(
            "a.toml",
            "name = \"alpha\"\nkind = \"probe\"\ncooldown = 60\naliases = [\"al\"]",
        );
        h.state.registry.reload_one(&UnitId::new("a.toml")).unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;

        assert!(Arc::ptr_eq(&beta, &h.state.registry.resolve("beta").unwrap()));
        assert_eq!(
            h.dispatch(h.message(MEMBER, "!beta")).await,
            DispatchOutcome::CoolingDown {
                handler: "beta".to_string(),
                retry_after_secs: 59
            }
        );
        assert!(matches!(
            h.dispatch(h.message(MEMBER, "!al")).await,
            DispatchOutcome::CoolingDown { handler, .. } if handler == "alpha"
        ));
        assert_eq!(h.probe_calls("beta"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn enormous_cooldown_keeps_cooling_instead_of_crashing() {
        let h = Harness::builder()
            .unit("slow.toml", "name = \"slow\"\nkind = \"probe\"\ncooldown = 9223372036854775807")
            .build();

        assert_eq!(h.dispatch(h.message(MEMBER, "!slow")).await, invoked("slow"));
        tokio::time::advance(Duration::from_secs(86_400)).await;
        assert!(matches!(
            h.dispatch(h.message(MEMBER, "!slow")).await,
            DispatchOutcome::CoolingDown { .. }
        ));
        assert_eq!(h.probe_calls("slow"), 1);
    }

    #[tokio::test]
    async fn spawned_dispatches_run_independently() {
        let h = Harness::builder().unit("echo.toml", "name = \"echo\"\nkind = \"probe\"").build();

        let tasks: Vec<_> = (0..8)
            .map(|i| h.dispatcher.spawn(h.message(UserId(100 + i), "!echo")))
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap(), invoked("echo"));
        }
        assert_eq!(h.probe_calls("echo"), 8);
        assert_eq!(h.state.stats.snapshot(1).top_commands, vec![("echo".to_string(), 8)]);
    }

    #[tokio::test]
    async fn other_threads_do_not_see_continuations() {
        let h = Harness::builder()
            .unit("ask.toml", "name = \"ask\"\nkind = \"probe\"\n[options]\nexpect = \"reply\"")
            .build();
        h.dispatch(h.message(MEMBER, "!ask")).await;
        let anchor = h.transport.last_id();

        let mut elsewhere = h.message(MEMBER, "hi").replying_to(anchor);
        elsewhere.thread = ThreadId(-555);
        assert_eq!(h.dispatch(elsewhere).await, DispatchOutcome::Passive { invoked: 0 });
    }
}
