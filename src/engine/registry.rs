//! Live handler registry.
//!
//! Readers load an immutable snapshot without locking; writers build the
//! next snapshot under a writer lock and publish it with one atomic swap.
//! In-flight invocations keep their own `Arc<HandlerDescriptor>` and finish
//! on the version they started with.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::catalog::BehaviorCatalog;
use super::error::LoadError;
use super::handler::HandlerDescriptor;
use super::manifest::HandlerManifest;
use super::source::{HandlerSource, UnitId};

#[derive(Clone, Default)]
struct Snapshot {
    /// By canonical name.
    handlers: HashMap<String, Arc<HandlerDescriptor>>,
    /// Name or alias to canonical name.
    triggers: HashMap<String, String>,
    /// Unit to canonical name.
    units: HashMap<UnitId, String>,
}

impl Snapshot {
    /// Add a descriptor unless one of its triggers belongs to another unit.
    fn claim(&mut self, descriptor: Arc<HandlerDescriptor>) -> Result<(), LoadError> {
        for trigger in descriptor.triggers() {
            if let Some(owner) = self.triggers.get(trigger).and_then(|name| self.handlers.get(name))
                && owner.unit != descriptor.unit
            {
                return Err(LoadError::Conflict {
                    unit: descriptor.unit.clone(),
                    trigger: trigger.to_string(),
                    owner: owner.unit.clone(),
                });
            }
        }

        for trigger in descriptor.triggers() {
            self.triggers.insert(trigger.to_string(), descriptor.name.clone());
        }
        self.units.insert(descriptor.unit.clone(), descriptor.name.clone());
        self.handlers.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    fn remove_unit(&mut self, unit: &UnitId) -> Option<Arc<HandlerDescriptor>> {
        let name = self.units.remove(unit)?;
        let removed = self.handlers.remove(&name)?;
        self.triggers.retain(|_, owner| *owner != name);
        Some(removed)
    }
}

/// Outcome of a full load.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: usize,
    /// Units that were skipped, with why.
    pub failures: Vec<LoadError>,
}

pub struct HandlerRegistry {
    live: ArcSwap<Snapshot>,
    writer: Mutex<()>,
    source: Arc<dyn HandlerSource>,
    catalog: BehaviorCatalog,
}

impl HandlerRegistry {
    /// An empty registry; call [`HandlerRegistry::load`] to populate it.
    pub fn new(source: Arc<dyn HandlerSource>, catalog: BehaviorCatalog) -> Self {
        Self {
            live: ArcSwap::from_pointee(Snapshot::default()),
            writer: Mutex::new(()),
            source,
            catalog,
        }
    }

    pub fn source(&self) -> &Arc<dyn HandlerSource> {
        &self.source
    }

    fn build(&self, unit: &UnitId) -> Result<Arc<HandlerDescriptor>, LoadError> {
        let text = self.source.read(unit)?;
        let manifest = HandlerManifest::parse(unit, &text)?;
        let descriptor = HandlerDescriptor::from_manifest(unit, &manifest, &self.catalog)?;
        Ok(Arc::new(descriptor))
    }

    /// Rebuild the whole registry from the source.
    ///
    /// Units load in id order and the first to claim a trigger keeps it.
    /// Broken or conflicting units are skipped and reported. Fails only if
    /// the source itself cannot be listed, leaving the live registry as is.
    pub fn load(&self) -> Result<LoadReport, LoadError> {
        let _writer = self.writer.lock();
        let units = self.source.units()?;

        let mut next = Snapshot::default();
        let mut failures = Vec::new();
        for unit in units {
            if let Err(e) = self.build(&unit).and_then(|d| next.claim(d)) {
                warn!("Skipping handler unit: {}", e);
                failures.push(e);
            }
        }

        let loaded = next.handlers.len();
        self.live.store(Arc::new(next));
        info!("Loaded {} handlers ({} skipped)", loaded, failures.len());

        Ok(LoadReport { loaded, failures })
    }

    /// Re-read one unit and swap only its entry.
    ///
    /// On any error the previous version stays registered. Ids that are
    /// not a plain file name are never looked up.
    pub fn reload_one(&self, unit: &UnitId) -> Result<Arc<HandlerDescriptor>, LoadError> {
        if !unit.is_plain() {
            return Err(LoadError::NotFound { unit: unit.clone() });
        }
        let _writer = self.writer.lock();
        let descriptor = self.build(unit)?;

        let mut next = Snapshot::clone(&self.live.load());
        next.remove_unit(unit);
        next.claim(Arc::clone(&descriptor))?;
        self.live.store(Arc::new(next));

        info!("Reloaded handler {} from {}", descriptor.name, unit);
        Ok(descriptor)
    }

    /// Drop a unit whose source disappeared.
    pub fn unload(&self, unit: &UnitId) -> Option<Arc<HandlerDescriptor>> {
        let _writer = self.writer.lock();
        let mut next = Snapshot::clone(&self.live.load());
        let removed = next.remove_unit(unit)?;
        self.live.store(Arc::new(next));

        info!("Unloaded handler {} ({})", removed.name, unit);
        Some(removed)
    }

    /// Look up by name or alias, case-insensitively.
    pub fn resolve(&self, trigger: &str) -> Option<Arc<HandlerDescriptor>> {
        let trigger = trigger.to_lowercase();
        let snapshot = self.live.load();
        let found = snapshot
            .triggers
            .get(&trigger)
            .and_then(|name| snapshot.handlers.get(name))
            .cloned();
        if found.is_none() {
            debug!("No handler for trigger {:?}", trigger);
        }
        found
    }

    /// Look up by canonical name only.
    pub fn get(&self, name: &str) -> Option<Arc<HandlerDescriptor>> {
        self.live.load().handlers.get(name).cloned()
    }

    /// All handlers, sorted by name.
    pub fn list(&self) -> Vec<Arc<HandlerDescriptor>> {
        let mut all: Vec<_> = self.live.load().handlers.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn passive_handlers(&self) -> Vec<Arc<HandlerDescriptor>> {
        self.listing(|d| d.handler.passive().is_some())
    }

    pub fn membership_handlers(&self) -> Vec<Arc<HandlerDescriptor>> {
        self.listing(|d| d.handler.membership().is_some())
    }

    /// Matching handlers, by name.
    fn listing(&self, keep: impl Fn(&HandlerDescriptor) -> bool) -> Vec<Arc<HandlerDescriptor>> {
        let mut found: Vec<_> = self
            .live
            .load()
            .handlers
            .values()
            .filter(|d| keep(d))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found
    }

    pub fn len(&self) -> usize {
        self.live.load().handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
