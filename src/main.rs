//! Nexus - hot-reloadable command dispatcher for Telegram groups.
//!
//! ## Architecture
//!
//! - `config` - Environment configuration
//! - `engine` - Registry, policy checks and dispatch (platform independent)
//! - `permissions` - Authorization levels and cached thread admin lookups
//! - `cache` - Typed Moka caches
//! - `database` - Prefix persistence (MongoDB or in-memory)
//! - `plugins` - Compiled handler behaviors
//! - `bot` - Telegram adapter (with Throttle for API rate limiting)
//! - `i18n` - User-facing texts

mod bot;
mod cache;
mod config;
mod database;
mod engine;
mod i18n;
mod permissions;
mod plugins;

use std::sync::Arc;
use std::time::Duration;

use teloxide::adaptors::throttle::Limits;
use teloxide::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use database::{Database, MemoryPrefixStore, ThreadSettingsRepo};
use engine::{
    AppState, ContinuationStore, CooldownTracker, DirectorySource, DispatchStats, HandlerRegistry,
    PrefixResolver, PrefixStore, ReloadNotifier, ReloadWatcher, SafetyThrottle, UserId,
};
use permissions::RoleResolver;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // If RUST_LOG is not set, default to "info" level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("nexus_dispatch=info,teloxide=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting Nexus dispatcher...");

    let config = Config::from_env()?;
    info!("Configuration loaded, bot mode: {:?}", config.bot_mode);
    if !i18n::is_supported(&config.locale) {
        warn!("Locale {} is not available, texts fall back to {}", config.locale, i18n::DEFAULT_LOCALE);
    }

    let store: Arc<dyn PrefixStore> = match &config.mongodb_uri {
        Some(uri) => {
            let db = Database::connect(uri, &config.mongodb_database).await?;
            Arc::new(ThreadSettingsRepo::new(&db))
        }
        None => {
            warn!("MONGODB_URI is not set; custom prefixes will not survive a restart");
            Arc::new(MemoryPrefixStore::new())
        }
    };

    // Telegram limits: 30 msg/s globally, 1 msg/s per chat, 20 msg/min per group.
    let bot = Bot::new(&config.bot_token).throttle(Limits::default());
    let me = bot.get_me().await?;
    info!("Bot username: @{}", me.username());

    let transport = Arc::new(bot::TelegramTransport::new(bot.clone()));
    let admins = Arc::new(bot::TelegramAdmins::new(bot.inner().clone()));

    let catalog = plugins::catalog();
    info!("Handler kinds: {}", catalog.kinds().join(", "));
    let registry = Arc::new(HandlerRegistry::new(
        Arc::new(DirectorySource::new(config.handlers_dir.clone())),
        catalog,
    ));
    let report = registry.load()?;
    info!(
        "Loaded {} handlers from {} ({} skipped)",
        report.loaded,
        config.handlers_dir.display(),
        report.failures.len()
    );

    let prefixes = PrefixResolver::new(config.prefix.as_str(), store);
    prefixes.preload().await;

    let continuations = ContinuationStore::new(config.continuation_ttl);
    continuations.spawn_sweeper(SWEEP_INTERVAL);

    let state = AppState {
        transport: transport.clone(),
        registry: registry.clone(),
        roles: RoleResolver::new(
            config.owner_ids.iter().copied().map(UserId),
            config.admin_ids.iter().copied().map(UserId),
            admins,
        ),
        cooldowns: CooldownTracker::new(),
        throttle: Arc::new(SafetyThrottle::new(config.safety.clone())),
        prefixes,
        continuations,
        stats: Arc::new(DispatchStats::new()),
        locale: config.locale.as_str().into(),
    };

    let notifier = ReloadNotifier::new(transport, config.owner_ids.iter().copied());
    if let Err(e) = ReloadWatcher::new(registry, config.reload_debounce)
        .with_notifier(notifier)
        .spawn()
    {
        warn!("Hot reload disabled: {:#}", e);
    }

    let engine = engine::Dispatcher::new(state, config.handler_timeout);
    let dispatcher = bot::build_dispatcher(bot.clone(), engine);

    bot::run(&config, dispatcher, bot).await
}
