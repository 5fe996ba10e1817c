//! Per-user query cooldown ledger
//!
//! Tracks the last accepted AI query per user and answers "may this user
//! query now". A rejected attempt never touches the ledger, so asking
//! repeatedly does not extend the wait. Entries are never evicted; the
//! ledger is bounded by the number of distinct users seen.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Clones share the same underlying ledger.
#[derive(Clone)]
pub struct CooldownLedger {
    last_query: Arc<DashMap<u64, Instant>>,
    cooldown: Duration,
}

impl CooldownLedger {
    pub fn new(cooldown: Duration) -> Self {
        CooldownLedger {
            last_query: Arc::new(DashMap::new()),
            cooldown,
        }
    }

    /// Whether `user_id` may query now, and how many whole seconds remain
    /// if not. The remainder rounds up so a user rejected right after a
    /// query sees the full window.
    pub fn can_query(&self, user_id: u64) -> (bool, u64) {
        match self.last_query.get(&user_id) {
            None => (true, 0),
            Some(last) => {
                let elapsed = last.elapsed();
                if elapsed >= self.cooldown {
                    (true, 0)
                } else {
                    (false, Self::round_up_secs(self.cooldown - elapsed))
                }
            }
        }
    }

    /// Mark an accepted query for `user_id`. Call only after the check
    /// passed; prefer [`check_and_record`](Self::check_and_record), which
    /// does both under one entry lock.
    pub fn record_query(&self, user_id: u64) {
        self.last_query.insert(user_id, Instant::now());
    }

    /// Atomic check-and-set: accepts and records the query, or returns the
    /// remaining wait in seconds. The entry guard is held across the
    /// decision so two concurrent calls cannot both be accepted inside one
    /// window.
    pub fn check_and_record(&self, user_id: u64) -> Result<(), u64> {
        let now = Instant::now();
        match self.last_query.entry(user_id) {
            Entry::Vacant(slot) => {
                slot.insert(now);
                Ok(())
            }
            Entry::Occupied(mut slot) => {
                let elapsed = now.saturating_duration_since(*slot.get());
                if elapsed >= self.cooldown {
                    slot.insert(now);
                    Ok(())
                } else {
                    Err(Self::round_up_secs(self.cooldown - elapsed))
                }
            }
        }
    }

    /// Human-readable remaining wait, e.g. `4m 58s`
    pub fn remaining_display(&self, user_id: u64) -> String {
        let (_, remaining) = self.can_query(user_id);
        format!("{}m {}s", remaining / 60, remaining % 60)
    }

    fn round_up_secs(remaining: Duration) -> u64 {
        remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[test]
    fn first_query_is_allowed() {
        let ledger = CooldownLedger::new(Duration::from_secs(300));
        assert_eq!(ledger.can_query(1), (true, 0));
    }

    #[test]
    fn recorded_query_starts_the_full_window() {
        let ledger = CooldownLedger::new(Duration::from_secs(300));
        let (allowed, remaining) = ledger.can_query(7);
        assert!(allowed);
        assert_eq!(remaining, 0);

        ledger.record_query(7);

        let (allowed, remaining) = ledger.can_query(7);
        assert!(!allowed);
        // Rounded up, so immediately after recording the full window shows.
        assert!((299..=300).contains(&remaining), "remaining={remaining}");
    }

    #[test]
    fn rejected_checks_never_extend_the_window() {
        let ledger = CooldownLedger::new(Duration::from_secs(300));
        ledger.record_query(7);

        let (_, first) = ledger.can_query(7);
        for _ in 0..50 {
            let (allowed, remaining) = ledger.can_query(7);
            assert!(!allowed);
            assert!(remaining <= first);
        }
    }

    #[tokio::test]
    async fn window_expires_after_the_cooldown() {
        let ledger = CooldownLedger::new(Duration::from_millis(100));
        ledger.record_query(1);
        assert!(!ledger.can_query(1).0);

        sleep(Duration::from_millis(150)).await;
        assert!(ledger.can_query(1).0);
    }

    #[test]
    fn users_are_independent() {
        let ledger = CooldownLedger::new(Duration::from_secs(300));
        ledger.record_query(1);
        assert!(!ledger.can_query(1).0);
        assert!(ledger.can_query(2).0);
    }

    #[test]
    fn check_and_record_accepts_once_per_window() {
        let ledger = CooldownLedger::new(Duration::from_secs(300));
        assert!(ledger.check_and_record(9).is_ok());
        let remaining = ledger.check_and_record(9).unwrap_err();
        assert!((299..=300).contains(&remaining));
    }

    #[tokio::test]
    async fn check_and_record_accepts_again_after_expiry() {
        let ledger = CooldownLedger::new(Duration::from_millis(80));
        assert!(ledger.check_and_record(9).is_ok());
        assert!(ledger.check_and_record(9).is_err());

        sleep(Duration::from_millis(120)).await;
        assert!(ledger.check_and_record(9).is_ok());
    }

    #[test]
    fn remaining_display_formats_minutes_and_seconds() {
        let ledger = CooldownLedger::new(Duration::from_secs(300));
        assert_eq!(ledger.remaining_display(3), "0m 0s");
        ledger.record_query(3);
        assert_eq!(ledger.remaining_display(3), "5m 0s");
    }
}
