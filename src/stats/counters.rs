//! Session statistics for the step engine.
//!
//! Counters are lock-free so the control surface can read them while the
//! worker is processing samples.

use crate::collector::SensorKind;
use crate::core::Rejection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Running counters for the current engine session.
#[derive(Debug)]
pub struct EngineStats {
    step_counter_samples: AtomicU64,
    accelerometer_samples: AtomicU64,
    gyroscope_samples: AtomicU64,
    candidates: AtomicU64,
    accepted: AtomicU64,
    rejected_vehicle: AtomicU64,
    rejected_stationary: AtomicU64,
    rejected_too_soon: AtomicU64,
    rejected_not_moving: AtomicU64,
    duplicates: AtomicU64,
    noise_drops: AtomicU64,
    reboots: AtomicU64,
    rollovers: AtomicU64,
    /// Identifies this engine run in logs and persisted stats
    run_id: Uuid,
    session_start: DateTime<Utc>,
    persist_path: Option<PathBuf>,
}

impl EngineStats {
    pub fn new() -> Self {
        Self {
            step_counter_samples: AtomicU64::new(0),
            accelerometer_samples: AtomicU64::new(0),
            gyroscope_samples: AtomicU64::new(0),
            candidates: AtomicU64::new(0),
            accepted: AtomicU64::new(0),
            rejected_vehicle: AtomicU64::new(0),
            rejected_stationary: AtomicU64::new(0),
            rejected_too_soon: AtomicU64::new(0),
            rejected_not_moving: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
            noise_drops: AtomicU64::new(0),
            reboots: AtomicU64::new(0),
            rollovers: AtomicU64::new(0),
            run_id: Uuid::new_v4(),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create stats that accumulate on top of a previously saved file.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);

        if let Err(e) = stats.load() {
            tracing::warn!("Could not load previous engine stats: {}", e);
        }

        stats
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn record_sample(&self, kind: SensorKind) {
        let counter = match kind {
            SensorKind::StepCounter => &self.step_counter_samples,
            SensorKind::Accelerometer => &self.accelerometer_samples,
            SensorKind::Gyroscope => &self.gyroscope_samples,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_candidate(&self) {
        self.candidates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejection(&self, reason: Rejection) {
        let counter = match reason {
            Rejection::Vehicle => &self.rejected_vehicle,
            Rejection::Stationary => &self.rejected_stationary,
            Rejection::TooSoon => &self.rejected_too_soon,
            Rejection::NotMoving => &self.rejected_not_moving,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_noise(&self) {
        self.noise_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reboot(&self) {
        self.reboots.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rollover(&self) {
        self.rollovers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            run_id: self.run_id,
            step_counter_samples: self.step_counter_samples.load(Ordering::Relaxed),
            accelerometer_samples: self.accelerometer_samples.load(Ordering::Relaxed),
            gyroscope_samples: self.gyroscope_samples.load(Ordering::Relaxed),
            candidates: self.candidates.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected_vehicle: self.rejected_vehicle.load(Ordering::Relaxed),
            rejected_stationary: self.rejected_stationary.load(Ordering::Relaxed),
            rejected_too_soon: self.rejected_too_soon.load(Ordering::Relaxed),
            rejected_not_moving: self.rejected_not_moving.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            noise_drops: self.noise_drops.load(Ordering::Relaxed),
            reboots: self.reboots.load(Ordering::Relaxed),
            rollovers: self.rollovers.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        self.snapshot().summary()
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let json =
                serde_json::to_string_pretty(&self.snapshot()).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let saved: StatsSnapshot =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                let pairs = [
                    (&self.step_counter_samples, saved.step_counter_samples),
                    (&self.accelerometer_samples, saved.accelerometer_samples),
                    (&self.gyroscope_samples, saved.gyroscope_samples),
                    (&self.candidates, saved.candidates),
                    (&self.accepted, saved.accepted),
                    (&self.rejected_vehicle, saved.rejected_vehicle),
                    (&self.rejected_stationary, saved.rejected_stationary),
                    (&self.rejected_too_soon, saved.rejected_too_soon),
                    (&self.rejected_not_moving, saved.rejected_not_moving),
                    (&self.duplicates, saved.duplicates),
                    (&self.noise_drops, saved.noise_drops),
                    (&self.reboots, saved.reboots),
                    (&self.rollovers, saved.rollovers),
                ];
                for (counter, value) in pairs {
                    counter.store(value, Ordering::Relaxed);
                }
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        for counter in [
            &self.step_counter_samples,
            &self.accelerometer_samples,
            &self.gyroscope_samples,
            &self.candidates,
            &self.accepted,
            &self.rejected_vehicle,
            &self.rejected_stationary,
            &self.rejected_too_soon,
            &self.rejected_not_moving,
            &self.duplicates,
            &self.noise_drops,
            &self.reboots,
            &self.rollovers,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for EngineStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub run_id: Uuid,
    pub step_counter_samples: u64,
    pub accelerometer_samples: u64,
    pub gyroscope_samples: u64,
    pub candidates: u64,
    pub accepted: u64,
    pub rejected_vehicle: u64,
    pub rejected_stationary: u64,
    pub rejected_too_soon: u64,
    pub rejected_not_moving: u64,
    pub duplicates: u64,
    pub noise_drops: u64,
    pub reboots: u64,
    pub rollovers: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

impl StatsSnapshot {
    pub fn rejected(&self) -> u64 {
        self.rejected_vehicle
            + self.rejected_stationary
            + self.rejected_too_soon
            + self.rejected_not_moving
    }

    pub fn summary(&self) -> String {
        format!(
            "Engine Statistics:\n\
             - Samples: {} step counter, {} accelerometer, {} gyroscope\n\
             - Candidate steps: {}\n\
             - Accepted: {}\n\
             - Rejected: {} (vehicle {}, stationary {}, too soon {}, not moving {})\n\
             - Duplicate counter readings: {}\n\
             - Counter noise dropped: {}\n\
             - Counter resets detected: {}\n\
             - Day rollovers: {}\n\
             - Session duration: {} seconds",
            self.step_counter_samples,
            self.accelerometer_samples,
            self.gyroscope_samples,
            self.candidates,
            self.accepted,
            self.rejected(),
            self.rejected_vehicle,
            self.rejected_stationary,
            self.rejected_too_soon,
            self.rejected_not_moving,
            self.duplicates,
            self.noise_drops,
            self.reboots,
            self.rollovers,
            self.session_duration_secs
        )
    }
}

/// Thread-safe shared statistics.
pub type SharedEngineStats = Arc<EngineStats>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting() {
        let stats = EngineStats::new();
        stats.record_sample(SensorKind::Accelerometer);
        stats.record_sample(SensorKind::Accelerometer);
        stats.record_sample(SensorKind::Gyroscope);
        stats.record_rejection(Rejection::Vehicle);
        stats.record_rejection(Rejection::TooSoon);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.accelerometer_samples, 2);
        assert_eq!(snapshot.gyroscope_samples, 1);
        assert_eq!(snapshot.rejected(), 2);
    }

    #[test]
    fn test_reset() {
        let stats = EngineStats::new();
        stats.record_accepted();
        stats.record_reboot();
        stats.reset();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.accepted, 0);
        assert_eq!(snapshot.reboots, 0);
    }

    #[test]
    fn test_persistence_accumulates() {
        let path = std::env::temp_dir()
            .join(format!("steptrack-stats-{}", Uuid::new_v4()))
            .join("stats.json");

        let stats = EngineStats::with_persistence(path.clone());
        stats.record_accepted();
        stats.record_accepted();
        stats.save().unwrap();

        let reloaded = EngineStats::with_persistence(path.clone());
        reloaded.record_accepted();
        assert_eq!(reloaded.snapshot().accepted, 3);
        assert_ne!(reloaded.run_id(), stats.run_id());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_summary_format() {
        let summary = EngineStats::new().summary();
        assert!(summary.contains("Candidate steps"));
        assert!(summary.contains("Day rollovers"));
    }
}
