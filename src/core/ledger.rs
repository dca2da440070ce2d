//! Daily step ledger: accumulated totals, day rollover and persistence.
//!
//! The ledger is the only component that reads or writes durable state.
//! Step applications are persisted at most once per persist interval;
//! rollovers, reboots, manual corrections and shutdown write immediately.

use crate::clock::Clock;
use crate::core::estimator::{StepCandidate, Strategy};
use crate::store::{KeyValueStore, StoreError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

const KEY_BASELINE: &str = "baseline_steps";
const KEY_DAILY_STEPS: &str = "daily_steps";
const KEY_TOTAL_STEPS: &str = "total_steps_since_boot";
const KEY_LAST_STEP: &str = "last_step_timestamp";
const KEY_LAST_DATE: &str = "last_date";
const KEY_HISTORY: &str = "history";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Accumulated step totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    /// Hardware counter zero point for today; `None` until a counter reading arrives
    pub baseline_steps: Option<u64>,
    pub daily_steps: u64,
    pub total_steps_since_boot: u64,
    /// Monotonic timestamp of the last applied step
    pub last_step_timestamp: Option<u64>,
    pub last_saved_date: Option<NaiveDate>,
    pub history: BTreeMap<NaiveDate, u64>,
}

/// Archived per-day totals plus the running lifetime total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalSteps {
    pub history: BTreeMap<NaiveDate, u64>,
    #[serde(rename = "totalSteps")]
    pub total_steps: u64,
}

/// Outcome of a day rollover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayRollover {
    /// Day that was archived, if one had been recorded
    pub archived: Option<(NaiveDate, u64)>,
    pub today: NaiveDate,
}

/// Owner of [`LedgerState`] and its durable copy.
pub struct StepLedger {
    state: LedgerState,
    store: Box<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    persist_interval_ms: u64,
    last_persist_attempt_ms: Option<u64>,
    dirty: bool,
    persist_warning: Option<String>,
    persist_count: u64,
    persist_failures: u64,
}

impl StepLedger {
    /// Load the last committed state from `store`.
    pub fn load(
        store: Box<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        persist_interval_ms: u64,
    ) -> Self {
        let state = read_state(store.as_ref());
        tracing::debug!(
            "Loaded ledger: daily={} baseline={:?} total={} date={:?}",
            state.daily_steps,
            state.baseline_steps,
            state.total_steps_since_boot,
            state.last_saved_date
        );

        Self {
            state,
            store,
            clock,
            persist_interval_ms,
            last_persist_attempt_ms: None,
            dirty: false,
            persist_warning: None,
            persist_count: 0,
            persist_failures: 0,
        }
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    pub fn current_daily_steps(&self) -> u64 {
        self.state.daily_steps
    }

    pub fn baseline(&self) -> Option<u64> {
        self.state.baseline_steps
    }

    pub fn total_since_boot(&self) -> u64 {
        self.state.total_steps_since_boot
    }

    /// Most recent persistence failure, cleared by the next successful write.
    pub fn persist_warning(&self) -> Option<&str> {
        self.persist_warning.as_deref()
    }

    /// Number of successful commits made by this ledger.
    pub fn persist_count(&self) -> u64 {
        self.persist_count
    }

    pub fn persist_failures(&self) -> u64 {
        self.persist_failures
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Archive and reset when the calendar date has changed.
    pub fn check_day_rollover(&mut self) -> Option<DayRollover> {
        let today = self.clock.today();
        if self.state.last_saved_date == Some(today) {
            return None;
        }

        let archived = self.state.last_saved_date.map(|date| {
            self.state.history.insert(date, self.state.daily_steps);
            (date, self.state.daily_steps)
        });

        self.state.daily_steps = 0;
        if self.state.baseline_steps.is_some() {
            self.state.baseline_steps = Some(self.state.total_steps_since_boot);
        }
        self.state.last_saved_date = Some(today);
        self.dirty = true;

        match archived {
            Some((date, steps)) => {
                tracing::info!("Day rollover: archived {} steps for {}", steps, date)
            }
            None => tracing::info!("Starting step ledger on {}", today),
        }

        self.write_through();
        Some(DayRollover { archived, today })
    }

    /// Record the first hardware counter reading as today's zero point.
    pub fn establish_baseline(&mut self, cumulative: u64) {
        tracing::info!("Hardware step counter baseline set to {}", cumulative);
        self.state.baseline_steps = Some(cumulative);
        self.state.total_steps_since_boot = cumulative;
        self.dirty = true;
        self.write_through();
    }

    /// The hardware counter restarted below the baseline.
    ///
    /// Returns the previous daily count.
    pub fn handle_reboot(&mut self, cumulative: u64) -> u64 {
        let previous = self.state.daily_steps;
        tracing::info!(
            "Step counter reset detected ({} < baseline {:?}), rebasing",
            cumulative,
            self.state.baseline_steps
        );
        self.state.baseline_steps = Some(cumulative);
        self.state.total_steps_since_boot = cumulative;
        self.state.daily_steps = 0;
        self.dirty = true;
        self.write_through();
        previous
    }

    /// The counter restarted from a lower value without crossing the baseline.
    ///
    /// Today's count is kept; later readings are measured from `cumulative`.
    pub fn rebase_counter(&mut self, cumulative: u64) {
        tracing::info!(
            "Step counter dropped from {} to {}, continuing from the new value",
            self.state.total_steps_since_boot,
            cumulative
        );
        self.state.total_steps_since_boot = cumulative;
        self.dirty = true;
        self.write_through();
    }

    /// Apply a validated step. Returns the new daily count if it changed.
    pub fn apply_step(&mut self, candidate: &StepCandidate) -> Option<u64> {
        self.check_day_rollover();
        let before = self.state.daily_steps;

        match (candidate.source, candidate.raw_cumulative) {
            (Strategy::Hardware, Some(cumulative)) => {
                let Some(baseline) = self.state.baseline_steps else {
                    self.establish_baseline(cumulative);
                    return None;
                };
                if cumulative < baseline {
                    self.handle_reboot(cumulative);
                    return (before != 0).then_some(0);
                }
                if cumulative <= self.state.total_steps_since_boot {
                    return None;
                }
                let delta = cumulative - self.state.total_steps_since_boot;
                self.state.total_steps_since_boot = cumulative;
                self.state.daily_steps = self.state.daily_steps.saturating_add(delta);
            }
            (Strategy::Hardware, None) => return None,
            (Strategy::AccelerometerFallback, _) => {
                self.state.daily_steps = self.state.daily_steps.saturating_add(1);
            }
        }

        self.state.last_step_timestamp = Some(candidate.timestamp_ms);
        self.dirty = true;
        self.maybe_persist(candidate.timestamp_ms);

        (self.state.daily_steps != before).then_some(self.state.daily_steps)
    }

    /// Add user-entered steps directly to today's count.
    pub fn add_manual_steps(&mut self, steps: u64) -> u64 {
        self.check_day_rollover();
        self.state.daily_steps = self.state.daily_steps.saturating_add(steps);
        self.dirty = true;
        self.write_through();
        self.state.daily_steps
    }

    /// Zero today's count. History is untouched.
    pub fn reset_daily_steps(&mut self) {
        self.state.daily_steps = 0;
        // Rebase so the next counter reading does not restore the old count.
        if self.state.baseline_steps.is_some() {
            self.state.baseline_steps = Some(self.state.total_steps_since_boot);
        }
        self.dirty = true;
        self.write_through();
    }

    pub fn historical_steps(&self) -> HistoricalSteps {
        let archived: u64 = self.state.history.values().sum();
        HistoricalSteps {
            history: self.state.history.clone(),
            total_steps: archived.saturating_add(self.state.daily_steps),
        }
    }

    /// Write if the persist interval has passed since the last attempt.
    fn maybe_persist(&mut self, now_ms: u64) {
        let due = match self.last_persist_attempt_ms {
            None => true,
            Some(last) => now_ms >= last && now_ms - last >= self.persist_interval_ms,
        };
        if due {
            self.last_persist_attempt_ms = Some(now_ms);
            self.write_through();
        }
    }

    /// Immediate write. A failure is logged by `persist`, kept in
    /// `persist_warning`, and leaves the ledger dirty for the next attempt.
    fn write_through(&mut self) {
        let _ = self.persist();
    }

    /// Write the full state now, if anything changed since the last commit.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        if self.dirty {
            self.persist()
        } else {
            Ok(())
        }
    }

    /// Stage every key and commit.
    pub fn persist(&mut self) -> Result<(), StoreError> {
        let s = &self.state;
        match s.baseline_steps {
            Some(baseline) => self.store.set(KEY_BASELINE, json!(baseline)),
            None => self.store.remove(KEY_BASELINE),
        }
        self.store.set(KEY_DAILY_STEPS, json!(s.daily_steps));
        self.store.set(KEY_TOTAL_STEPS, json!(s.total_steps_since_boot));
        match s.last_step_timestamp {
            Some(ts) => self.store.set(KEY_LAST_STEP, json!(ts)),
            None => self.store.remove(KEY_LAST_STEP),
        }
        match s.last_saved_date {
            Some(date) => self
                .store
                .set(KEY_LAST_DATE, json!(date.format(DATE_FORMAT).to_string())),
            None => self.store.remove(KEY_LAST_DATE),
        }
        let history = serde_json::to_value(&s.history)
            .map_err(|e| StoreError::Serialize(e.to_string()))?;
        self.store.set(KEY_HISTORY, history);

        match self.store.commit() {
            Ok(()) => {
                self.dirty = false;
                self.persist_warning = None;
                self.persist_count += 1;
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Failed to persist step ledger: {}", e);
                self.persist_warning = Some(e.to_string());
                self.persist_failures += 1;
                Err(e)
            }
        }
    }
}

/// Read a committed ledger state. Missing or malformed keys fall back to defaults.
pub fn read_state(store: &dyn KeyValueStore) -> LedgerState {
    let get_u64 = |key: &str| store.get(key).as_ref().and_then(Value::as_u64);

    let last_saved_date = store
        .get(KEY_LAST_DATE)
        .as_ref()
        .and_then(Value::as_str)
        .and_then(|s| NaiveDate::parse_from_str(s, DATE_FORMAT).ok());

    let history = match store.get(KEY_HISTORY) {
        Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
            tracing::warn!("Discarding unreadable step history: {}", e);
            BTreeMap::new()
        }),
        None => BTreeMap::new(),
    };

    LedgerState {
        baseline_steps: get_u64(KEY_BASELINE),
        daily_steps: get_u64(KEY_DAILY_STEPS).unwrap_or(0),
        total_steps_since_boot: get_u64(KEY_TOTAL_STEPS).unwrap_or(0),
        last_step_timestamp: get_u64(KEY_LAST_STEP),
        last_saved_date,
        history,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn ledger_with(store: MemoryStore, clock: &ManualClock) -> StepLedger {
        StepLedger::load(Box::new(store), Arc::new(clock.clone()), 30_000)
    }

    fn hardware(cumulative: u64, ts: u64) -> StepCandidate {
        StepCandidate {
            source: Strategy::Hardware,
            raw_cumulative: Some(cumulative),
            timestamp_ms: ts,
        }
    }

    fn fallback(ts: u64) -> StepCandidate {
        StepCandidate {
            source: Strategy::AccelerometerFallback,
            raw_cumulative: None,
            timestamp_ms: ts,
        }
    }

    #[test]
    fn test_first_rollover_sets_date_without_archive() {
        let clock = ManualClock::new(day(1));
        let mut ledger = ledger_with(MemoryStore::new(), &clock);

        let rollover = ledger.check_day_rollover().unwrap();
        assert_eq!(rollover.archived, None);
        assert_eq!(ledger.state().last_saved_date, Some(day(1)));
        assert!(ledger.check_day_rollover().is_none());
        assert_eq!(ledger.store().get("last_date"), Some(json!("2024-03-01")));
    }

    #[test]
    fn test_hardware_steps_follow_counter() {
        let clock = ManualClock::new(day(1));
        let mut ledger = ledger_with(MemoryStore::new(), &clock);
        ledger.check_day_rollover();
        ledger.establish_baseline(1000);

        assert_eq!(ledger.apply_step(&hardware(1042, 0)), Some(42));
        assert_eq!(ledger.apply_step(&hardware(1042, 500)), None);
        assert_eq!(ledger.apply_step(&hardware(1100, 1000)), Some(100));
        assert_eq!(ledger.total_since_boot(), 1100);
    }

    #[test]
    fn test_counter_below_baseline_rebases() {
        let clock = ManualClock::new(day(1));
        let mut ledger = ledger_with(MemoryStore::new(), &clock);
        ledger.check_day_rollover();
        ledger.establish_baseline(1000);
        ledger.apply_step(&hardware(1200, 0));

        assert_eq!(ledger.apply_step(&hardware(5, 1000)), Some(0));
        assert_eq!(ledger.baseline(), Some(5));
        assert_eq!(ledger.apply_step(&hardware(25, 2000)), Some(20));
    }

    #[test]
    fn test_rebased_counter_keeps_daily_steps() {
        let clock = ManualClock::new(day(1));
        let mut ledger = ledger_with(MemoryStore::new(), &clock);
        ledger.check_day_rollover();
        ledger.establish_baseline(100);
        ledger.apply_step(&hardware(5100, 0));

        ledger.rebase_counter(300);
        assert_eq!(ledger.current_daily_steps(), 5000);
        assert_eq!(ledger.total_since_boot(), 300);
        assert_eq!(ledger.store().get("total_steps_since_boot"), Some(json!(300)));

        assert_eq!(ledger.apply_step(&hardware(400, 1000)), Some(5100));
    }

    #[test]
    fn test_fallback_steps_increment() {
        let clock = ManualClock::new(day(1));
        let mut ledger = ledger_with(MemoryStore::new(), &clock);
        assert_eq!(ledger.apply_step(&fallback(0)), Some(1));
        assert_eq!(ledger.apply_step(&fallback(300)), Some(2));
        assert_eq!(ledger.state().last_step_timestamp, Some(300));
        assert_eq!(ledger.baseline(), None);
    }

    #[test]
    fn test_day_rollover_archives() {
        let clock = ManualClock::new(day(1));
        let mut ledger = ledger_with(MemoryStore::new(), &clock);
        ledger.check_day_rollover();
        ledger.establish_baseline(1000);
        ledger.apply_step(&hardware(1350, 0));

        clock.advance_day();
        let rollover = ledger.check_day_rollover().unwrap();

        assert_eq!(rollover.archived, Some((day(1), 350)));
        assert_eq!(ledger.state().history.get(&day(1)), Some(&350));
        assert_eq!(ledger.current_daily_steps(), 0);
        assert_eq!(ledger.baseline(), Some(1350));
        assert_eq!(ledger.store().get("daily_steps"), Some(json!(0)));
        assert_eq!(ledger.store().get("history"), Some(json!({"2024-03-01": 350})));
    }

    #[test]
    fn test_rate_limited_persistence() {
        let clock = ManualClock::new(day(1));
        let mut ledger = ledger_with(MemoryStore::new(), &clock);
        ledger.check_day_rollover();
        let after_rollover = ledger.persist_count();

        ledger.apply_step(&fallback(0));
        assert_eq!(ledger.persist_count(), after_rollover + 1);

        ledger.apply_step(&fallback(10_000));
        assert_eq!(ledger.persist_count(), after_rollover + 1);
        assert!(ledger.is_dirty());
        assert_eq!(ledger.store().get("daily_steps"), Some(json!(1)));

        ledger.apply_step(&fallback(30_000));
        assert_eq!(ledger.persist_count(), after_rollover + 2);
        assert_eq!(ledger.store().get("daily_steps"), Some(json!(3)));
        assert!(!ledger.is_dirty());
    }

    #[test]
    fn test_persist_failure_surfaces_warning() {
        let mut store = MemoryStore::new();
        store.set_fail_commits(true);
        let clock = ManualClock::new(day(1));
        let mut ledger = ledger_with(store, &clock);

        assert_eq!(ledger.apply_step(&fallback(0)), Some(1));
        assert!(ledger.persist_warning().is_some());
        assert!(ledger.is_dirty());
        assert_eq!(ledger.current_daily_steps(), 1);
        assert!(ledger.persist_failures() >= 1);
    }

    #[test]
    fn test_manual_steps_and_reset() {
        let clock = ManualClock::new(day(1));
        let mut ledger = ledger_with(MemoryStore::new(), &clock);
        ledger.check_day_rollover();
        ledger.establish_baseline(1000);
        ledger.apply_step(&hardware(1010, 0));

        assert_eq!(ledger.add_manual_steps(500), 510);
        assert_eq!(ledger.store().get("daily_steps"), Some(json!(510)));
        assert_eq!(ledger.apply_step(&hardware(1012, 1000)), Some(512));

        ledger.state.history.insert(day(1).pred_opt().unwrap(), 7);
        ledger.reset_daily_steps();
        assert_eq!(ledger.current_daily_steps(), 0);
        assert_eq!(ledger.state().history.len(), 1);
        assert_eq!(ledger.apply_step(&hardware(1013, 2000)), Some(1));
    }

    #[test]
    fn test_historical_total() {
        let clock = ManualClock::new(day(1));
        let mut ledger = ledger_with(MemoryStore::new(), &clock);
        ledger.check_day_rollover();
        ledger.add_manual_steps(100);
        clock.advance_day();
        ledger.add_manual_steps(40);

        let history = ledger.historical_steps();
        assert_eq!(history.history.get(&day(1)), Some(&100));
        assert_eq!(history.total_steps, 140);

        let json = serde_json::to_value(&history).unwrap();
        assert_eq!(json["totalSteps"], 140);
        assert_eq!(json["history"]["2024-03-01"], 100);
    }

    #[test]
    fn test_state_survives_reload() {
        let clock = ManualClock::new(day(1));
        let mut store = MemoryStore::new();
        store.set("baseline_steps", json!(800));
        store.set("daily_steps", json!(64));
        store.set("total_steps_since_boot", json!(864));
        store.set("last_date", json!("2024-3-1"));
        store.set("history", json!({"2024-02-29": 9000}));
        store.commit().unwrap();

        let mut ledger = ledger_with(store, &clock);
        assert!(ledger.check_day_rollover().is_none());
        assert_eq!(ledger.current_daily_steps(), 64);
        assert_eq!(ledger.baseline(), Some(800));
        assert_eq!(ledger.historical_steps().total_steps, 9064);
    }
}
