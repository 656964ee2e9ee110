//! Ordered deadline set on the monotonic clock.
//!
//! Keys are caller-defined; deadlines are `Instant`s. Equal deadlines fire
//! in insertion order via a monotone sequence number. Re-arming an existing
//! key moves it; a removed timer never fires. All mutating operations are
//! O(log n).

use std::collections::BTreeMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use hashbrown::HashMap;

/// Ordered `{deadline, key}` set.
#[derive(Debug)]
pub struct TimerSet<K> {
    queue: BTreeMap<(Instant, u64), K>,
    index: HashMap<K, (Instant, u64)>,
    seq: u64,
}

impl<K: Copy + Eq + Hash> TimerSet<K> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: BTreeMap::new(),
            index: HashMap::new(),
            seq: 0,
        }
    }

    /// Arm `key` to fire at `now + delay`. Re-arms if already present.
    pub fn add(&mut self, key: K, delay: Duration) {
        self.add_at(key, Instant::now() + delay);
    }

    /// Arm `key` to fire at an absolute deadline.
    pub fn add_at(&mut self, key: K, deadline: Instant) {
        if let Some(slot) = self.index.remove(&key) {
            self.queue.remove(&slot);
        }
        let slot = (deadline, self.seq);
        self.seq += 1;
        self.queue.insert(slot, key);
        self.index.insert(key, slot);
    }

    /// Disarm `key`. Returns whether it was armed.
    pub fn remove(&mut self, key: &K) -> bool {
        match self.index.remove(key) {
            Some(slot) => {
                self.queue.remove(&slot);
                true
            }
            None => false,
        }
    }

    /// Time until the next deadline, `Some(ZERO)` when overdue, `None` when
    /// no timer is armed.
    #[must_use]
    pub fn timeout(&self, now: Instant) -> Option<Duration> {
        self.queue
            .keys()
            .next()
            .map(|(deadline, _)| deadline.saturating_duration_since(now))
    }

    /// Pop the next expired key, earliest deadline first.
    pub fn pop_expired(&mut self, now: Instant) -> Option<K> {
        let (&slot, _) = self.queue.first_key_value()?;
        if slot.0 > now {
            return None;
        }
        let key = self.queue.remove(&slot)?;
        self.index.remove(&key);
        Some(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl<K: Copy + Eq + Hash> Default for TimerSet<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_in_deadline_order() {
        let mut set = TimerSet::new();
        let now = Instant::now();
        set.add_at(1u32, now + Duration::from_millis(30));
        set.add_at(2u32, now + Duration::from_millis(10));
        set.add_at(3u32, now + Duration::from_millis(20));

        let later = now + Duration::from_millis(100);
        assert_eq!(set.pop_expired(later), Some(2));
        assert_eq!(set.pop_expired(later), Some(3));
        assert_eq!(set.pop_expired(later), Some(1));
        assert_eq!(set.pop_expired(later), None);
    }

    #[test]
    fn equal_deadlines_fire_in_insertion_order() {
        let mut set = TimerSet::new();
        let deadline = Instant::now() + Duration::from_millis(5);
        set.add_at(10u32, deadline);
        set.add_at(20u32, deadline);
        set.add_at(30u32, deadline);

        let later = deadline + Duration::from_millis(1);
        assert_eq!(set.pop_expired(later), Some(10));
        assert_eq!(set.pop_expired(later), Some(20));
        assert_eq!(set.pop_expired(later), Some(30));
    }

    #[test]
    fn removed_timer_never_fires() {
        let mut set = TimerSet::new();
        let now = Instant::now();
        set.add_at(1u32, now + Duration::from_millis(10));
        set.add_at(2u32, now + Duration::from_millis(10));
        assert!(set.remove(&1));
        assert!(!set.remove(&1));

        let later = now + Duration::from_secs(1);
        assert_eq!(set.pop_expired(later), Some(2));
        assert_eq!(set.pop_expired(later), None);
    }

    #[test]
    fn rearm_moves_the_deadline() {
        let mut set = TimerSet::new();
        let now = Instant::now();
        set.add_at(1u32, now + Duration::from_millis(10));
        set.add_at(1u32, now + Duration::from_millis(500));
        assert_eq!(set.len(), 1);

        assert_eq!(set.pop_expired(now + Duration::from_millis(100)), None);
        assert_eq!(set.pop_expired(now + Duration::from_secs(1)), Some(1));
    }

    #[test]
    fn timeout_reports_next_deadline() {
        let mut set = TimerSet::new();
        let now = Instant::now();
        assert_eq!(set.timeout(now), None);

        set.add_at(1u32, now + Duration::from_millis(40));
        let timeout = set.timeout(now).unwrap();
        assert!(timeout <= Duration::from_millis(40));
        assert!(timeout >= Duration::from_millis(35));

        // Overdue clamps to zero rather than underflowing.
        assert_eq!(
            set.timeout(now + Duration::from_millis(50)),
            Some(Duration::ZERO)
        );
    }
}
