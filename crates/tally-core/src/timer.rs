use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use chrono::{DateTime, Utc};
use tracing::trace;

/// Keyed one-shot deadlines on a cooperative scheduler.
///
/// Each key holds at most one pending deadline; arming an already-armed key
/// replaces its deadline, which is exactly the reset a trailing debounce
/// needs. Nothing fires on its own: the owner pumps `due(now)` from its
/// event loop and dispatches on the returned keys.
#[derive(Debug, Default)]
pub struct TimerQueue<K> {
    deadlines: HashMap<K, DateTime<Utc>>,
}

impl<K> TimerQueue<K>
where
    K: Copy + Eq + Hash + Debug,
{
    pub fn new() -> Self {
        Self {
            deadlines: HashMap::new(),
        }
    }

    pub fn arm(&mut self, key: K, at: DateTime<Utc>) {
        trace!(?key, at = %at, "arming timer");
        self.deadlines.insert(key, at);
    }

    pub fn disarm(&mut self, key: K) -> bool {
        trace!(?key, "disarming timer");
        self.deadlines.remove(&key).is_some()
    }

    pub fn is_armed(&self, key: K) -> bool {
        self.deadlines.contains_key(&key)
    }

    pub fn deadline(&self, key: K) -> Option<DateTime<Utc>> {
        self.deadlines.get(&key).copied()
    }

    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.deadlines.values().min().copied()
    }

    /// Drains every key whose deadline has passed, earliest first.
    pub fn due(&mut self, now: DateTime<Utc>) -> Vec<K> {
        let mut fired: Vec<(K, DateTime<Utc>)> = self
            .deadlines
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(key, at)| (*key, *at))
            .collect();
        fired.sort_by_key(|(_, at)| *at);

        for (key, _) in &fired {
            self.deadlines.remove(key);
        }

        fired.into_iter().map(|(key, _)| key).collect()
    }

    /// Cancels everything; used on teardown so no background work leaks.
    pub fn clear(&mut self) {
        trace!(count = self.deadlines.len(), "clearing timer queue");
        self.deadlines.clear();
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::TimerQueue;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Key {
        Flush,
        Tick,
    }

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
            .single()
            .expect("valid now")
    }

    #[test]
    fn fires_only_past_deadlines_in_order() {
        let mut timers = TimerQueue::new();
        timers.arm(Key::Tick, now() + Duration::seconds(30));
        timers.arm(Key::Flush, now() + Duration::seconds(1));

        assert!(timers.due(now()).is_empty());

        let fired = timers.due(now() + Duration::seconds(31));
        assert_eq!(fired, vec![Key::Flush, Key::Tick]);
        assert!(!timers.is_armed(Key::Flush));
        assert!(!timers.is_armed(Key::Tick));
    }

    #[test]
    fn rearming_replaces_the_deadline() {
        let mut timers = TimerQueue::new();
        timers.arm(Key::Flush, now() + Duration::seconds(1));
        timers.arm(Key::Flush, now() + Duration::seconds(5));

        assert!(timers.due(now() + Duration::seconds(2)).is_empty());
        assert_eq!(
            timers.due(now() + Duration::seconds(5)),
            vec![Key::Flush]
        );
    }

    #[test]
    fn clear_cancels_pending_work() {
        let mut timers = TimerQueue::new();
        timers.arm(Key::Flush, now());
        timers.arm(Key::Tick, now());
        timers.clear();

        assert_eq!(timers.next_deadline(), None);
        assert!(timers.due(now() + Duration::hours(1)).is_empty());
    }
}
