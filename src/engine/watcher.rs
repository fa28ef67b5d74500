//! Hot reload of handler units on source changes.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::error::LoadError;
use super::event::ThreadId;
use super::registry::HandlerRegistry;
use super::source::UnitId;
use super::transport::Transport;

/// What a change to one unit did to the registry.
#[derive(Debug)]
pub enum ReloadEvent {
    Reloaded { unit: UnitId, name: String },
    Unloaded { unit: UnitId, name: String },
    Failed { unit: UnitId, error: LoadError },
}

/// Tells bot owners about reloads in their private chats.
#[derive(Clone)]
pub struct ReloadNotifier {
    transport: Arc<dyn Transport>,
    owners: Vec<ThreadId>,
}

impl ReloadNotifier {
    /// A private chat shares its id with the user.
    pub fn new(transport: Arc<dyn Transport>, owners: impl IntoIterator<Item = u64>) -> Self {
        Self {
            transport,
            owners: owners
                .into_iter()
                .filter_map(|id| i64::try_from(id).ok())
                .map(ThreadId)
                .collect(),
        }
    }

    pub async fn notify(&self, event: &ReloadEvent) {
        let text = match event {
            ReloadEvent::Reloaded { unit, name } => format!("🔄 Reloaded {name} ({unit})"),
            ReloadEvent::Unloaded { unit, name } => format!("🗑 Unloaded {name} ({unit})"),
            ReloadEvent::Failed { unit, error } => format!("❌ Reload of {unit} failed: {error}"),
        };
        for owner in &self.owners {
            if let Err(e) = self.transport.send_message(*owner, &text, None).await {
                warn!("Could not notify owner {} about reload: {:#}", owner, e);
            }
        }
    }
}

/// Applies source changes to the registry.
pub struct ReloadWatcher {
    registry: Arc<HandlerRegistry>,
    notifier: Option<ReloadNotifier>,
    debounce: Duration,
}

impl ReloadWatcher {
    pub fn new(registry: Arc<HandlerRegistry>, debounce: Duration) -> Self {
        Self {
            registry,
            notifier: None,
            debounce,
        }
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: ReloadNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// [`apply_change`] on the blocking pool, since reading a unit
    /// touches the filesystem.
    pub async fn apply_change_blocking(&self, unit: UnitId) -> Option<ReloadEvent> {
        let registry = Arc::clone(&self.registry);
        match tokio::task::spawn_blocking(move || apply_change(&registry, &unit)).await {
            Ok(event) => event,
            Err(e) => {
                error!("Reload task did not finish: {}", e);
                None
            }
        }
    }

    /// Start watching the registry's source directory.
    ///
    /// Bursts of filesystem events are coalesced per unit; each unit is
    /// applied once after `debounce` of quiet.
    pub fn spawn(self) -> anyhow::Result<JoinHandle<()>> {
        let root = self
            .registry
            .source()
            .watch_root()
            .map(PathBuf::from)
            .context("handler source has no directory to watch")?;

        let (tx, mut rx) = mpsc::unbounded_channel::<PathBuf>();
        let mut watcher: RecommendedWatcher =
            notify::recommended_watcher(move |result: notify::Result<notify::Event>| match result {
                Ok(event) => {
                    if event.kind.is_create() || event.kind.is_modify() || event.kind.is_remove() {
                        for path in event.paths {
                            let _ = tx.send(path);
                        }
                    }
                }
                Err(e) => warn!("Handler watcher error: {}", e),
            })
            .context("failed to create handler watcher")?;
        watcher
            .watch(&root, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch {}", root.display()))?;
        info!("Watching {} for handler changes", root.display());

        Ok(tokio::spawn(async move {
            // Dropping the watcher stops notifications.
            let _watcher = watcher;
            let mut pending = BTreeSet::new();

            while let Some(path) = rx.recv().await {
                self.collect(&mut pending, path);
                while let Ok(Some(path)) = tokio::time::timeout(self.debounce, rx.recv()).await {
                    self.collect(&mut pending, path);
                }

                for unit in std::mem::take(&mut pending) {
                    if let Some(event) = self.apply_change_blocking(unit).await
                        && let Some(notifier) = &self.notifier
                    {
                        notifier.notify(&event).await;
                    }
                }
            }
            debug!("Handler watcher channel closed");
        }))
    }

    fn collect(&self, pending: &mut BTreeSet<UnitId>, path: PathBuf) {
        if let Some(unit) = self.registry.source().unit_for_path(&path) {
            pending.insert(unit);
        }
    }
}

/// Reload a unit that still exists, unload one that is gone.
fn apply_change(registry: &HandlerRegistry, unit: &UnitId) -> Option<ReloadEvent> {
    match registry.reload_one(unit) {
        Ok(descriptor) => Some(ReloadEvent::Reloaded {
            unit: unit.clone(),
            name: descriptor.name.clone(),
        }),
        Err(LoadError::NotFound { .. }) => registry.unload(unit).map(|removed| ReloadEvent::Unloaded {
            unit: unit.clone(),
            name: removed.name.clone(),
        }),
        Err(error) => {
            error!("Reload of {} failed, keeping previous version: {}", unit, error);
            Some(ReloadEvent::Failed {
                unit: unit.clone(),
                error,
            })
        }
    }
}
