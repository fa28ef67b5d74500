//! Dispatch counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;

#[derive(Debug)]
pub struct DispatchStats {
    started_at: DateTime<Utc>,
    started: Instant,
    admitted: AtomicU64,
    dropped: AtomicU64,
    commands: AtomicU64,
    denied: AtomicU64,
    failures: AtomicU64,
    usage: DashMap<String, u64>,
}

#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    pub started_at: DateTime<Utc>,
    pub uptime: Duration,
    pub admitted: u64,
    pub dropped: u64,
    pub commands: u64,
    pub denied: u64,
    pub failures: u64,
    /// Most used commands, busiest first.
    pub top_commands: Vec<(String, u64)>,
}

impl Default for DispatchStats {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchStats {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            started: Instant::now(),
            admitted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            commands: AtomicU64::new(0),
            denied: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            usage: DashMap::new(),
        }
    }

    pub fn record_admitted(&self) {
        self.admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_denied(&self) {
        self.denied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one completed command invocation.
    pub fn record_command(&self, name: &str) {
        self.commands.fetch_add(1, Ordering::Relaxed);
        *self.usage.entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn snapshot(&self, top: usize) -> StatsSnapshot {
        let mut usage: Vec<(String, u64)> = self
            .usage
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        usage.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        usage.truncate(top);

        StatsSnapshot {
            started_at: self.started_at,
            uptime: self.started.elapsed(),
            admitted: self.admitted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            commands: self.commands.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            top_commands: usage,
        }
    }
}
