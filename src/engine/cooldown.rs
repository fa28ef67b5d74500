//! Per (user, handler) cooldowns.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;

use super::event::UserId;

/// Result of a cooldown check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownCheck {
    Allowed,
    /// Still cooling down; retry after this many whole seconds.
    Active { retry_after_secs: u64 },
}

/// In-memory cooldown tracker (lock-free per key).
///
/// Entries are overwritten on each allowed invocation and never deleted;
/// an expired entry is simply ignored. A window too long for the clock to
/// represent is stored as `None` and never expires.
#[derive(Clone, Default)]
pub struct CooldownTracker {
    expiries: Arc<DashMap<(UserId, String), Option<Instant>>>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check and, if allowed, start a new cooldown window in one atomic step.
    ///
    /// A zero window always allows and records nothing.
    pub fn check(&self, user: UserId, handler: &str, window: Duration) -> CooldownCheck {
        self.check_at(user, handler, window, Instant::now())
    }

    fn check_at(&self, user: UserId, handler: &str, window: Duration, now: Instant) -> CooldownCheck {
        if window.is_zero() {
            return CooldownCheck::Allowed;
        }

        // The entry guard holds the shard lock, so check-and-set cannot race.
        match self.expiries.entry((user, handler.to_string())) {
            Entry::Occupied(mut entry) => {
                match *entry.get() {
                    Some(expiry) if expiry > now => {
                        return CooldownCheck::Active {
                            retry_after_secs: whole_seconds(expiry - now),
                        };
                    }
                    None => {
                        return CooldownCheck::Active {
                            retry_after_secs: window.as_secs().max(1),
                        };
                    }
                    Some(_) => {}
                }
                entry.insert(now.checked_add(window));
                CooldownCheck::Allowed
            }
            Entry::Vacant(entry) => {
                entry.insert(now.checked_add(window));
                CooldownCheck::Allowed
            }
        }
    }

    /// Number of tracked (user, handler) pairs, expired ones included.
    pub fn len(&self) -> usize {
        self.expiries.len()
    }
}

/// Round up to whole seconds, never reporting zero.
fn whole_seconds(remaining: Duration) -> u64 {
    let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
    secs.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER: UserId = UserId(10);

    #[test]
    fn zero_window_never_throttles_or_records() {
        let tracker = CooldownTracker::new();
        let now = Instant::now();

        for _ in 0..3 {
            assert_eq!(tracker.check_at(USER, "ping", Duration::ZERO, now), CooldownCheck::Allowed);
        }
        assert_eq!(tracker.len(), 0);
    }

    #[test]
    fn second_call_inside_window_is_rejected_until_expiry() {
        let tracker = CooldownTracker::new();
        let t0 = Instant::now();
        let window = Duration::from_secs(2);

        assert_eq!(tracker.check_at(USER, "ping", window, t0), CooldownCheck::Allowed);
        assert_eq!(
            tracker.check_at(USER, "ping", window, t0 + Duration::from_secs(1)),
            CooldownCheck::Active { retry_after_secs: 1 }
        );
        assert_eq!(
            tracker.check_at(USER, "ping", window, t0 + Duration::from_secs(3)),
            CooldownCheck::Allowed
        );
    }

    #[test]
    fn keys_are_independent_per_user_and_handler() {
        let tracker = CooldownTracker::new();
        let now = Instant::now();
        let window = Duration::from_secs(30);

        assert_eq!(tracker.check_at(USER, "ping", window, now), CooldownCheck::Allowed);
        assert_eq!(tracker.check_at(UserId(11), "ping", window, now), CooldownCheck::Allowed);
        assert_eq!(tracker.check_at(USER, "help", window, now), CooldownCheck::Allowed);
        assert_eq!(tracker.len(), 3);
    }

    #[test]
    fn huge_window_does_not_overflow_the_clock() {
        let tracker = CooldownTracker::new();
        let now = Instant::now();
        let window = Duration::from_secs(i64::MAX as u64);

        assert_eq!(tracker.check_at(USER, "slow", window, now), CooldownCheck::Allowed);
        assert!(matches!(
            tracker.check_at(USER, "slow", window, now + Duration::from_secs(86_400)),
            CooldownCheck::Active { .. }
        ));
    }

    #[test]
    fn retry_time_rounds_up() {
        assert_eq!(whole_seconds(Duration::from_millis(1)), 1);
        assert_eq!(whole_seconds(Duration::from_millis(1500)), 2);
        assert_eq!(whole_seconds(Duration::from_secs(4)), 4);
    }

    #[test]
    fn concurrent_first_checks_allow_exactly_one() {
        let tracker = CooldownTracker::new();
        let now = Instant::now();
        let window = Duration::from_secs(60);

        let allowed = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| scope.spawn(|| tracker.check_at(USER, "ping", window, now)))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join())
                .filter(|r| matches!(r, Ok(CooldownCheck::Allowed)))
                .count()
        });

        assert_eq!(allowed, 1);
    }
}
