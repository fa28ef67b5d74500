//! Chat-wide safety throttle.
//!
//! Advisory flow control evaluated once per inbound event before routing:
//! active hours, randomized breaks, a per-sender message window, a daily
//! message quota and a content filter. Rejections are silent; they are logged at debug level only.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, Timelike};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use super::event::{InboundEvent, UserId};

/// Hour-of-day window `[start, end)` in local time.
///
/// `start > end` wraps past midnight, e.g. `22-6`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveHours {
    pub start: u8,
    pub end: u8,
}

impl ActiveHours {
    pub const ALWAYS: Self = Self { start: 0, end: 24 };

    pub fn new(start: u8, end: u8) -> Result<Self, String> {
        if start > 23 || end > 24 {
            return Err(format!("hours must be within 0-24, got {start}-{end}"));
        }
        if start == end {
            return Err("active window is empty".to_string());
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, hour: u32) -> bool {
        let (start, end) = (u32::from(self.start), u32::from(self.end));
        if start < end {
            hour >= start && hour < end
        } else {
            hour >= start || hour < end
        }
    }
}

impl FromStr for ActiveHours {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| format!("expected START-END, got \"{s}\""))?;
        let start = start.trim().parse::<u8>().map_err(|e| e.to_string())?;
        let end = end.trim().parse::<u8>().map_err(|e| e.to_string())?;
        Self::new(start, end)
    }
}

#[derive(Debug, Clone)]
pub struct SafetyConfig {
    pub active_hours: ActiveHours,
    pub max_daily_messages: u64,
    /// Admitted events one sender may produce per `sender_window`; 0 disables.
    pub sender_limit: u32,
    pub sender_window: Duration,
    /// Case-sensitive substrings that block a message.
    pub content_filter: Vec<String>,
    pub auto_breaks: bool,
    /// Chance of starting a break after each admitted message.
    pub break_probability: f64,
    pub break_min: Duration,
    pub break_max: Duration,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            active_hours: ActiveHours::ALWAYS,
            max_daily_messages: 5_000,
            sender_limit: 20,
            sender_window: Duration::from_secs(60),
            content_filter: Vec::new(),
            auto_breaks: false,
            break_probability: 0.1,
            break_min: Duration::from_secs(60),
            break_max: Duration::from_secs(300),
        }
    }
}

/// Why an event was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    OutsideActiveHours,
    OnBreak,
    SenderRateLimited,
    DailyLimit,
    FilteredContent,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OutsideActiveHours => "outside active hours",
            Self::OnBreak => "taking a break",
            Self::SenderRateLimited => "sender rate limit exceeded",
            Self::DailyLimit => "daily limit reached",
            Self::FilteredContent => "filtered content",
        })
    }
}

/// Point-in-time view of the throttle counters.
#[derive(Debug, Clone, Copy)]
pub struct ThrottleSnapshot {
    pub daily_count: u64,
    pub max_daily_messages: u64,
    pub break_until: Option<DateTime<Local>>,
}

/// Fixed window of one sender's admitted events.
#[derive(Debug, Clone, Copy)]
struct SenderWindow {
    started: DateTime<Local>,
    count: u32,
}

impl SenderWindow {
    fn is_open(&self, now: DateTime<Local>, length: Duration) -> bool {
        (now - self.started).to_std().unwrap_or_default() < length
    }
}

struct ThrottleState {
    day: Option<NaiveDate>,
    daily_count: u64,
    break_until: Option<DateTime<Local>>,
    senders: HashMap<UserId, SenderWindow>,
    rng: StdRng,
}

pub struct SafetyThrottle {
    config: SafetyConfig,
    state: Mutex<ThrottleState>,
}

impl SafetyThrottle {
    pub fn new(config: SafetyConfig) -> Self {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    fn with_rng(config: SafetyConfig, rng: StdRng) -> Self {
        Self {
            config,
            state: Mutex::new(ThrottleState {
                day: None,
                daily_count: 0,
                break_until: None,
                senders: HashMap::new(),
                rng,
            }),
        }
    }

    pub fn config(&self) -> &SafetyConfig {
        &self.config
    }

    /// Admit or silently reject an event at the current local time.
    pub fn admit(&self, event: &InboundEvent) -> bool {
        self.admit_at(event, Local::now())
    }

    pub fn admit_at(&self, event: &InboundEvent, now: DateTime<Local>) -> bool {
        match self.evaluate(event, now) {
            Ok(()) => true,
            Err(reason) => {
                debug!("Event in thread {} dropped: {}", event.thread, reason);
                false
            }
        }
    }

    fn evaluate(&self, event: &InboundEvent, now: DateTime<Local>) -> Result<(), Rejection> {
        if !self.config.active_hours.contains(now.hour()) {
            return Err(Rejection::OutsideActiveHours);
        }

        // Everything below is one atomic check-and-update.
        let mut state = self.state.lock();

        if let Some(until) = state.break_until {
            if now < until {
                return Err(Rejection::OnBreak);
            }
            state.break_until = None;
            info!("Break finished");
        }

        let today = now.date_naive();
        if state.day != Some(today) {
            if state.day.is_some() {
                info!("Daily message count reset ({} yesterday)", state.daily_count);
            }
            state.day = Some(today);
            state.daily_count = 0;
            let window = self.config.sender_window;
            state.senders.retain(|_, w| w.is_open(now, window));
        }

        if self.config.sender_limit > 0
            && let Some(window) = state.senders.get(&event.sender)
            && window.count >= self.config.sender_limit
            && window.is_open(now, self.config.sender_window)
        {
            return Err(Rejection::SenderRateLimited);
        }

        if state.daily_count >= self.config.max_daily_messages {
            return Err(Rejection::DailyLimit);
        }

        if let Some(body) = event.text()
            && self.config.content_filter.iter().any(|term| body.contains(term.as_str()))
        {
            return Err(Rejection::FilteredContent);
        }

        state.daily_count += 1;
        if self.config.sender_limit > 0 {
            let length = self.config.sender_window;
            let window = state.senders.entry(event.sender).or_insert(SenderWindow {
                started: now,
                count: 0,
            });
            if !window.is_open(now, length) {
                *window = SenderWindow {
                    started: now,
                    count: 0,
                };
            }
            window.count += 1;
        }

        if self.config.auto_breaks && state.rng.random_bool(self.config.break_probability) {
            let min = self.config.break_min.as_millis() as u64;
            let max = self.config.break_max.as_millis() as u64;
            let millis = state.rng.random_range(min..=max.max(min));
            state.break_until = Some(now + chrono::Duration::milliseconds(millis as i64));
            info!("Taking a break for {} seconds", millis / 1000);
        }

        Ok(())
    }

    pub fn snapshot(&self) -> ThrottleSnapshot {
        let state = self.state.lock();
        ThrottleSnapshot {
            daily_count: state.daily_count,
            max_daily_messages: self.config.max_daily_messages,
            break_until: state.break_until,
        }
    }
}
