//! Per-user cooldown plus sliding-window throttle.
//!
//! Each user owns a [`RateLimitRecord`]: the instants of their recently
//! admitted requests and an optional explicit block deadline. Records are
//! pruned lazily on every check and evicted once they go stale.

use eventdesk_config::AdmissionConfig;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

/// Result of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The request may enter the queue.
    Allowed,
    /// The request must wait at least `retry_after`.
    Denied { retry_after: Duration },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }
}

/// Thresholds for the limiter.
#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    pub cooldown: Duration,
    pub window: Duration,
    pub max_per_window: usize,
    pub max_tracked_users: usize,
    pub eviction_batch: usize,
}

impl From<&AdmissionConfig> for RateLimitPolicy {
    fn from(config: &AdmissionConfig) -> Self {
        Self {
            cooldown: config.cooldown(),
            window: config.window(),
            max_per_window: config.max_per_window.max(1),
            max_tracked_users: config.max_tracked_users,
            eviction_batch: config.eviction_batch,
        }
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::from(&AdmissionConfig::default())
    }
}

#[derive(Debug, Default)]
struct RateLimitRecord {
    /// Admitted request instants, oldest first.
    timestamps: VecDeque<Instant>,
    /// Kept apart from `timestamps` so the cooldown holds even when it is
    /// longer than the window.
    last_request: Option<Instant>,
    blocked_until: Option<Instant>,
}

impl RateLimitRecord {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.timestamps.front() {
            if now.saturating_duration_since(*oldest) >= window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    fn last_seen(&self) -> Option<Instant> {
        self.last_request
    }

    /// A record is stale when it is not blocked and its newest request is
    /// older than `stale_after`.
    fn is_stale(&self, now: Instant, stale_after: Duration) -> bool {
        if self.blocked_until.is_some_and(|until| until > now) {
            return false;
        }
        match self.last_seen() {
            Some(last) => now.saturating_duration_since(last) > stale_after,
            None => true,
        }
    }
}

/// Thread-safe admission gate.
pub struct RateLimiter {
    policy: RateLimitPolicy,
    records: Mutex<HashMap<String, RateLimitRecord>>,
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Check and, if allowed, record a request from `user_id` now.
    pub fn admit(&self, user_id: &str) -> Admission {
        self.admit_at(user_id, Instant::now())
    }

    /// Check and, if allowed, record a request from `user_id` at `now`.
    pub fn admit_at(&self, user_id: &str, now: Instant) -> Admission {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);

        let decision = {
            let record = records.entry(user_id.to_string()).or_default();
            self.check(record, now)
        };

        if decision.is_allowed() && records.len() > self.policy.max_tracked_users {
            self.evict_stalest(&mut records, now, user_id);
        }

        if let Admission::Denied { retry_after } = decision {
            debug!(
                user_id,
                retry_after_ms = retry_after.as_millis() as u64,
                "Admission denied"
            );
        }
        decision
    }

    fn check(&self, record: &mut RateLimitRecord, now: Instant) -> Admission {
        if let Some(until) = record.blocked_until {
            if now < until {
                return Admission::Denied {
                    retry_after: until - now,
                };
            }
            record.blocked_until = None;
        }

        record.prune(now, self.policy.window);

        if let Some(last) = record.last_seen() {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.policy.cooldown {
                return Admission::Denied {
                    retry_after: self.policy.cooldown - elapsed,
                };
            }
        }

        if record.timestamps.len() >= self.policy.max_per_window {
            if let Some(oldest) = record.timestamps.front().copied() {
                let until = oldest + self.policy.window;
                record.blocked_until = Some(until);
                return Admission::Denied {
                    retry_after: until.saturating_duration_since(now),
                };
            }
        }

        record.timestamps.push_back(now);
        record.last_request = Some(now);
        Admission::Allowed
    }

    /// Drop up to `eviction_batch` records, least recently active first.
    /// Blocked users and the caller are never evicted.
    fn evict_stalest(
        &self,
        records: &mut HashMap<String, RateLimitRecord>,
        now: Instant,
        keep: &str,
    ) {
        let mut candidates: Vec<(String, Option<Instant>)> = records
            .iter()
            .filter(|(user, record)| {
                user.as_str() != keep && !record.blocked_until.is_some_and(|until| until > now)
            })
            .map(|(user, record)| (user.clone(), record.last_seen()))
            .collect();

        // `None` (no recent requests) sorts first.
        candidates.sort_by_key(|(_, last)| *last);

        let evicted = candidates
            .into_iter()
            .take(self.policy.eviction_batch)
            .filter(|(user, _)| records.remove(user).is_some())
            .count();

        debug!(evicted, remaining = records.len(), "Evicted stalest rate-limit records");
    }

    /// Remove every record idle for more than twice the window (or the
    /// cooldown, when that is longer).
    pub fn prune_stale(&self) -> usize {
        self.prune_stale_at(Instant::now())
    }

    pub fn prune_stale_at(&self, now: Instant) -> usize {
        let stale_after = (self.policy.window * 2).max(self.policy.cooldown);
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let before = records.len();
        records.retain(|_, record| !record.is_stale(now, stale_after));
        before - records.len()
    }

    /// Number of users currently tracked.
    pub fn tracked_users(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(cooldown_secs: u64, window_secs: u64, max_per_window: usize) -> RateLimitPolicy {
        RateLimitPolicy {
            cooldown: Duration::from_secs(cooldown_secs),
            window: Duration::from_secs(window_secs),
            max_per_window,
            max_tracked_users: 1_000,
            eviction_batch: 10,
        }
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn first_request_is_admitted() {
        let limiter = RateLimiter::new(policy(5, 60, 2));
        assert_eq!(limiter.admit("alice"), Admission::Allowed);
    }

    #[test]
    fn immediate_repeat_waits_for_cooldown() {
        let limiter = RateLimiter::new(policy(5, 60, 2));
        let t0 = Instant::now();
        assert!(limiter.admit_at("alice", t0).is_allowed());

        match limiter.admit_at("alice", t0) {
            Admission::Denied { retry_after } => assert_eq!(retry_after, secs(5)),
            other => panic!("expected denial, got {other:?}"),
        }

        match limiter.admit_at("alice", t0 + secs(2)) {
            Admission::Denied { retry_after } => assert_eq!(retry_after, secs(3)),
            other => panic!("expected denial, got {other:?}"),
        }
    }

    #[test]
    fn admitted_gap_never_below_cooldown() {
        let limiter = RateLimiter::new(policy(5, 60, 100));
        let t0 = Instant::now();
        let mut admitted = Vec::new();
        for step in 0..40 {
            let now = t0 + Duration::from_millis(step * 700);
            if limiter.admit_at("bob", now).is_allowed() {
                admitted.push(now);
            }
        }
        assert!(admitted.len() > 1);
        for pair in admitted.windows(2) {
            assert!(pair[1] - pair[0] >= secs(5));
        }
    }

    #[test]
    fn cooldown_longer_than_window_still_applies() {
        let limiter = RateLimiter::new(policy(120, 60, 5));
        let t0 = Instant::now();
        assert!(limiter.admit_at("hank", t0).is_allowed());

        // The window has forgotten t0, the cooldown has not.
        match limiter.admit_at("hank", t0 + secs(61)) {
            Admission::Denied { retry_after } => assert_eq!(retry_after, secs(59)),
            other => panic!("expected denial, got {other:?}"),
        }
        assert!(limiter.admit_at("hank", t0 + secs(120)).is_allowed());
    }

    #[test]
    fn third_request_in_window_is_denied() {
        let limiter = RateLimiter::new(policy(5, 60, 2));
        let t0 = Instant::now();
        assert!(limiter.admit_at("carol", t0).is_allowed());
        assert!(limiter.admit_at("carol", t0 + secs(10)).is_allowed());

        match limiter.admit_at("carol", t0 + secs(20)) {
            Admission::Denied { retry_after } => {
                assert!(retry_after > Duration::ZERO);
                // Oldest timestamp expires at t0 + 60s.
                assert_eq!(retry_after, secs(40));
            }
            other => panic!("expected denial, got {other:?}"),
        }
    }

    #[test]
    fn block_deadline_is_stable() {
        let limiter = RateLimiter::new(policy(0, 60, 2));
        let t0 = Instant::now();
        assert!(limiter.admit_at("dave", t0).is_allowed());
        assert!(limiter.admit_at("dave", t0 + secs(1)).is_allowed());
        assert!(!limiter.admit_at("dave", t0 + secs(2)).is_allowed());

        // Still blocked until t0 + 60s, even though nothing new was recorded.
        match limiter.admit_at("dave", t0 + secs(30)) {
            Admission::Denied { retry_after } => assert_eq!(retry_after, secs(30)),
            other => panic!("expected denial, got {other:?}"),
        }

        assert!(limiter.admit_at("dave", t0 + secs(61)).is_allowed());
    }

    #[test]
    fn users_do_not_interfere() {
        let limiter = RateLimiter::new(policy(5, 60, 2));
        let t0 = Instant::now();
        assert!(limiter.admit_at("erin", t0).is_allowed());
        assert!(!limiter.admit_at("erin", t0).is_allowed());
        assert!(limiter.admit_at("frank", t0).is_allowed());
    }

    #[test]
    fn window_slides() {
        let limiter = RateLimiter::new(policy(1, 10, 2));
        let t0 = Instant::now();
        assert!(limiter.admit_at("gina", t0).is_allowed());
        assert!(limiter.admit_at("gina", t0 + secs(2)).is_allowed());
        assert!(!limiter.admit_at("gina", t0 + secs(4)).is_allowed());
        assert!(limiter.admit_at("gina", t0 + secs(11)).is_allowed());
    }

    #[test]
    fn high_water_mark_evicts_stalest() {
        let mut p = policy(0, 60, 5);
        p.max_tracked_users = 3;
        p.eviction_batch = 2;
        let limiter = RateLimiter::new(p);
        let t0 = Instant::now();

        for (i, user) in ["u1", "u2", "u3"].iter().enumerate() {
            assert!(limiter.admit_at(user, t0 + secs(i as u64)).is_allowed());
        }
        assert_eq!(limiter.tracked_users(), 3);

        assert!(limiter.admit_at("u4", t0 + secs(10)).is_allowed());
        // u1 and u2 were least recently active.
        assert_eq!(limiter.tracked_users(), 2);
        assert!(limiter.admit_at("u3", t0 + secs(11)).is_allowed());
    }

    #[test]
    fn prune_removes_records_idle_beyond_twice_window() {
        let limiter = RateLimiter::new(policy(0, 10, 5));
        let t0 = Instant::now();
        limiter.admit_at("old", t0);
        limiter.admit_at("fresh", t0 + secs(15));

        let removed = limiter.prune_stale_at(t0 + secs(25));
        assert_eq!(removed, 1);
        assert_eq!(limiter.tracked_users(), 1);
    }

    #[test]
    fn prune_keeps_records_still_cooling_down() {
        let limiter = RateLimiter::new(policy(300, 10, 5));
        let t0 = Instant::now();
        limiter.admit_at("ivy", t0);

        assert_eq!(limiter.prune_stale_at(t0 + secs(100)), 0);
        assert!(!limiter.admit_at("ivy", t0 + secs(100)).is_allowed());
        assert_eq!(limiter.prune_stale_at(t0 + secs(301)), 1);
    }

    #[test]
    fn policy_from_config() {
        let config = AdmissionConfig {
            cooldown_secs: 3,
            window_secs: 30,
            max_per_window: 4,
            max_tracked_users: 50,
            eviction_batch: 5,
        };
        let p = RateLimitPolicy::from(&config);
        assert_eq!(p.cooldown, secs(3));
        assert_eq!(p.window, secs(30));
        assert_eq!(p.max_per_window, 4);
    }
}
