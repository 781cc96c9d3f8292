//! Per-instance signal history
//!
//! The only state that survives between diagnostic calls: for each
//! `(equipment_id, instance_id)` pair, the last semantic state of every
//! signal. Different instances are independent entries of a concurrent map;
//! calls against the same instance serialise on that entry's mutex.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use tracing::{debug, info};

use crate::config::defaults::HISTORY_KEY_SEPARATOR;
use crate::types::SemanticState;

/// Last known classification of one signal.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalRecord {
    pub state: SemanticState,
    /// Index of the matched band in the threshold profile (`None` for `unknown`)
    pub band_index: Option<usize>,
    /// When the signal entered `state`
    pub transitioned_at: Option<DateTime<Utc>>,
    pub last_value: f64,
    pub observed_at: DateTime<Utc>,
}

/// Signal records of a single equipment instance.
#[derive(Debug, Clone, Default)]
pub struct SignalHistory {
    records: HashMap<String, SignalRecord>,
}

impl SignalHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, signal_id: &str) -> Option<&SignalRecord> {
        self.records.get(signal_id)
    }

    pub fn previous_state(&self, signal_id: &str) -> Option<&SemanticState> {
        self.records.get(signal_id).map(|r| &r.state)
    }

    /// Replace the record for a signal.
    pub fn record(&mut self, signal_id: impl Into<String>, record: SignalRecord) {
        self.records.insert(signal_id.into(), record);
    }

    /// Most recent observation of any signal.
    pub fn last_observed(&self) -> Option<DateTime<Utc>> {
        self.records.values().map(|r| r.observed_at).max()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Build an "equipment::instance" history key.
fn make_history_key(equipment_id: &str, instance_id: &str) -> String {
    format!("{equipment_id}{HISTORY_KEY_SEPARATOR}{instance_id}")
}

/// Lock a history, recovering the data if a previous holder panicked.
///
/// A panic mid-update can at worst leave some signals of that call unrecorded;
/// every record is individually consistent, so the table stays usable.
pub fn lock_history(history: &Mutex<SignalHistory>) -> MutexGuard<'_, SignalHistory> {
    history.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Concurrent table of instance histories.
///
/// Entries are never dropped on their own. Long-running callers that see many
/// short-lived instances should call [`HistoryTable::evict_idle`] periodically
/// or [`HistoryTable::reset`] when an instance is retired.
#[derive(Debug, Default)]
pub struct HistoryTable {
    instances: DashMap<String, Arc<Mutex<SignalHistory>>>,
}

impl HistoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to an instance's history, created empty on first use.
    ///
    /// The map shard lock is released before the handle is returned, so
    /// holding the instance mutex never blocks other instances.
    pub fn instance(&self, equipment_id: &str, instance_id: &str) -> Arc<Mutex<SignalHistory>> {
        let key = make_history_key(equipment_id, instance_id);
        self.instances
            .entry(key)
            .or_insert_with(|| {
                debug!(equipment = %equipment_id, instance = %instance_id, "Creating instance history");
                Arc::new(Mutex::new(SignalHistory::new()))
            })
            .clone()
    }

    /// Copy of an instance's history, if it has one.
    pub fn snapshot(&self, equipment_id: &str, instance_id: &str) -> Option<SignalHistory> {
        let handle = self
            .instances
            .get(&make_history_key(equipment_id, instance_id))
            .map(|entry| Arc::clone(entry.value()))?;
        let guard = lock_history(&handle);
        Some(guard.clone())
    }

    /// Forget an instance. Returns whether it existed.
    pub fn reset(&self, equipment_id: &str, instance_id: &str) -> bool {
        self.instances
            .remove(&make_history_key(equipment_id, instance_id))
            .is_some()
    }

    /// Drop every instance whose latest observation is older than `cutoff`,
    /// along with instances that never recorded anything. Instances locked by
    /// an in-flight call are kept. Returns how many were dropped.
    pub fn evict_idle(&self, cutoff: DateTime<Utc>) -> usize {
        let before = self.instances.len();
        self.instances.retain(|key, history| {
            let keep = match history.try_lock() {
                Ok(guard) => guard.last_observed().is_some_and(|at| at >= cutoff),
                Err(TryLockError::Poisoned(poisoned)) => poisoned
                    .into_inner()
                    .last_observed()
                    .is_some_and(|at| at >= cutoff),
                Err(TryLockError::WouldBlock) => true,
            };
            if !keep {
                debug!(instance = %key, "Evicting idle instance history");
            }
            keep
        });
        let evicted = before.saturating_sub(self.instances.len());
        if evicted > 0 {
            info!(evicted, remaining = self.instances.len(), "Evicted idle instance histories");
        }
        evicted
    }

    /// Number of tracked instances.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(state: &str) -> SignalRecord {
        SignalRecord {
            state: SemanticState::new(state),
            band_index: Some(0),
            transitioned_at: None,
            last_value: 1.0,
            observed_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    fn record_at(state: &str, observed_at: DateTime<Utc>) -> SignalRecord {
        SignalRecord {
            observed_at,
            ..record(state)
        }
    }

    #[test]
    fn test_instances_are_isolated() {
        let table = HistoryTable::new();
        lock_history(&table.instance("psu", "cam-01")).record("output_12v", record("missing"));

        let other = table.instance("psu", "cam-02");
        assert!(lock_history(&other).is_empty());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_same_instance_shares_history() {
        let table = HistoryTable::new();
        lock_history(&table.instance("psu", "cam-01")).record("output_12v", record("normal"));

        let snapshot = table.snapshot("psu", "cam-01").expect("instance exists");
        assert_eq!(
            snapshot.previous_state("output_12v"),
            Some(&SemanticState::new("normal"))
        );
    }

    #[test]
    fn test_key_includes_equipment() {
        let table = HistoryTable::new();
        lock_history(&table.instance("psu-a", "unit")).record("x", record("low"));
        assert!(table.snapshot("psu-b", "unit").is_none());
    }

    #[test]
    fn test_reset_forgets_instance() {
        let table = HistoryTable::new();
        let _ = table.instance("psu", "cam-01");
        assert!(table.reset("psu", "cam-01"));
        assert!(!table.reset("psu", "cam-01"));
        assert!(table.is_empty());
    }

    #[test]
    fn test_evict_idle_drops_stale_and_empty_instances() {
        let t0 = DateTime::<Utc>::UNIX_EPOCH;
        let later = t0 + chrono::Duration::hours(2);
        let table = HistoryTable::new();
        lock_history(&table.instance("psu", "stale")).record("output_12v", record_at("normal", t0));
        lock_history(&table.instance("psu", "active")).record("output_12v", record_at("normal", later));
        let _ = table.instance("psu", "never-used");

        let evicted = table.evict_idle(t0 + chrono::Duration::hours(1));
        assert_eq!(evicted, 2);
        assert_eq!(table.len(), 1);
        assert!(table.snapshot("psu", "active").is_some());
        assert!(table.snapshot("psu", "stale").is_none());
    }

    #[test]
    fn test_evict_idle_keeps_instance_in_use() {
        let table = HistoryTable::new();
        let handle = table.instance("psu", "busy");
        let guard = lock_history(&handle);
        assert_eq!(table.evict_idle(DateTime::<Utc>::MAX_UTC), 0);
        drop(guard);
        assert_eq!(table.evict_idle(DateTime::<Utc>::MAX_UTC), 1);
    }

    #[test]
    fn test_poisoned_lock_is_recovered() {
        let table = HistoryTable::new();
        let handle = table.instance("psu", "cam-01");
        let poisoner = Arc::clone(&handle);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison the history mutex");
        })
        .join();

        assert!(handle.is_poisoned());
        lock_history(&handle).record("output_12v", record("normal"));
        assert_eq!(lock_history(&handle).len(), 1);
    }
}
