//! Shared engine state.

use std::sync::Arc;

use super::continuation::ContinuationStore;
use super::cooldown::CooldownTracker;
use super::prefix::PrefixResolver;
use super::registry::HandlerRegistry;
use super::stats::DispatchStats;
use super::throttle::SafetyThrottle;
use super::transport::Transport;
use crate::i18n;
use crate::permissions::RoleResolver;

/// Shared application state.
///
/// Cloning is cheap; every component carries its own synchronization.
#[derive(Clone)]
pub struct AppState {
    /// Outbound message sink.
    pub transport: Arc<dyn Transport>,

    /// Live handler registry (hot-reloadable).
    pub registry: Arc<HandlerRegistry>,

    /// Role resolution with cached thread admins.
    pub roles: RoleResolver,

    pub cooldowns: CooldownTracker,

    /// Chat-wide gate, consulted once per inbound event.
    pub throttle: Arc<SafetyThrottle>,

    pub prefixes: PrefixResolver,

    pub continuations: ContinuationStore,

    pub stats: Arc<DispatchStats>,

    /// Locale for user-facing texts.
    pub locale: Arc<str>,
}

impl AppState {
    pub fn text(&self, key: &str) -> String {
        i18n::get_text(&self.locale, key)
    }

    /// Localized text with `{name}` placeholders filled in.
    pub fn format(&self, key: &str, args: &[(&str, &str)]) -> String {
        i18n::format_text(&self.locale, key, args)
    }
}
