//! The periodic per-template scheduler driving the Pool Reconciler
//!
//! A `BTreeMap<DateTime<Utc>, Vec<Uuid>>` ordered by next-fire time, one
//! entry per template, each firing on its own `ttl_interval`. A 10ms poll
//! loop drains every due entry each tick, giving independent per-template
//! cadence and per-uuid clearing as a plain ordered map rather than pulling
//! in a cron library.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A time-ordered queue of template uuids due for reconciliation
#[derive(Debug, Default)]
pub struct TemplateSchedule {
    queue: BTreeMap<DateTime<Utc>, Vec<Uuid>>,
}

impl TemplateSchedule {
    /// Build an empty schedule
    pub fn new() -> Self {
        TemplateSchedule { queue: BTreeMap::new() }
    }

    /// Schedule a template to fire `delay_secs` from `now`
    pub fn schedule_at(&mut self, now: DateTime<Utc>, uuid: Uuid, delay_secs: u64) {
        let fire_at = now + chrono::Duration::seconds(delay_secs as i64);
        self.queue.entry(fire_at).or_default().push(uuid);
    }

    /// Remove every pending entry for a template, the equivalent of the
    /// original's `schedule.clear(uuid)`
    pub fn clear(&mut self, uuid: &Uuid) {
        self.queue.retain(|_, uuids| {
            uuids.retain(|pending| pending != uuid);
            !uuids.is_empty()
        });
    }

    /// Pop every template due at or before `now`
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Vec<Uuid> {
        let due_keys: Vec<DateTime<Utc>> = self.queue.range(..=now).map(|(key, _)| *key).collect();
        let mut due = Vec::new();
        for key in due_keys {
            if let Some(uuids) = self.queue.remove(&key) {
                due.extend(uuids);
            }
        }
        due
    }

    /// True if nothing is pending
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_only_due_entries() {
        let now = Utc::now();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut schedule = TemplateSchedule::new();
        schedule.schedule_at(now, a, 0);
        schedule.schedule_at(now, b, 60);
        let due = schedule.pop_due(now);
        assert_eq!(due, vec![a]);
        assert!(!schedule.is_empty());
    }

    #[test]
    fn clear_removes_all_pending_entries_for_a_uuid() {
        let now = Utc::now();
        let a = Uuid::new_v4();
        let mut schedule = TemplateSchedule::new();
        schedule.schedule_at(now, a, 0);
        schedule.schedule_at(now, a, 5);
        schedule.clear(&a);
        assert!(schedule.is_empty());
    }

    #[test]
    fn colliding_fire_times_keep_both_entries() {
        let now = Utc::now();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut schedule = TemplateSchedule::new();
        schedule.schedule_at(now, a, 0);
        schedule.schedule_at(now, b, 0);
        let mut due = schedule.pop_due(now);
        due.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(due, expected);
    }
}
