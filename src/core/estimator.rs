//! Candidate step production.
//!
//! Two strategies, chosen once at start:
//! - the hardware cumulative counter when the device has one,
//! - rising-edge peak detection on accelerometer magnitude otherwise.

use crate::collector::SensorAvailability;
use crate::config::Tuning;
use crate::core::motion::AccelReading;
use serde::{Deserialize, Serialize};

/// Which estimator strategy is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Hardware,
    AccelerometerFallback,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Hardware => write!(f, "hardware step counter"),
            Strategy::AccelerometerFallback => write!(f, "accelerometer peak detection"),
        }
    }
}

/// An unvalidated step detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepCandidate {
    pub source: Strategy,
    /// Cumulative counter value (hardware candidates only)
    pub raw_cumulative: Option<u64>,
    pub timestamp_ms: u64,
}

/// What the hardware strategy made of one counter reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterOutcome {
    /// Forward to the validator
    Candidate(StepCandidate),
    /// No baseline existed; this reading becomes the zero point
    Baseline(u64),
    /// Counter fell below the baseline: the device rebooted
    Reboot(u64),
    /// Same value as the last applied one
    Duplicate,
    /// Small decrease that stays above the baseline
    Noise,
    /// Large decrease that stays above the baseline: the counter restarted
    /// from a new origin and counting continues from this value
    Rebase(u64),
}

/// Hardware cumulative counter strategy.
#[derive(Debug, Clone)]
pub struct HardwareCounter {
    seen_first: bool,
    noise_tolerance: u64,
}

impl HardwareCounter {
    pub fn new(noise_tolerance: u64) -> Self {
        Self {
            seen_first: false,
            noise_tolerance,
        }
    }

    /// Classify a counter reading against the ledger's baseline and last total.
    pub fn on_counter(
        &mut self,
        cumulative: u64,
        timestamp_ms: u64,
        baseline: Option<u64>,
        total_since_boot: u64,
    ) -> CounterOutcome {
        let first = !self.seen_first;
        self.seen_first = true;

        let Some(baseline) = baseline else {
            return CounterOutcome::Baseline(cumulative);
        };

        if cumulative < baseline {
            return CounterOutcome::Reboot(cumulative);
        }
        if cumulative == total_since_boot && !first {
            return CounterOutcome::Duplicate;
        }
        if cumulative < total_since_boot {
            if total_since_boot - cumulative <= self.noise_tolerance {
                return CounterOutcome::Noise;
            }
            return CounterOutcome::Rebase(cumulative);
        }

        CounterOutcome::Candidate(StepCandidate {
            source: Strategy::Hardware,
            raw_cumulative: Some(cumulative),
            timestamp_ms,
        })
    }
}

/// Accelerometer peak detector used when no hardware counter exists.
#[derive(Debug, Clone)]
pub struct PeakDetector {
    threshold: f32,
    min_interval_ms: u64,
    last_detection_ms: Option<u64>,
}

impl PeakDetector {
    pub fn new(threshold: f32, min_interval_ms: u64) -> Self {
        Self {
            threshold,
            min_interval_ms,
            last_detection_ms: None,
        }
    }

    /// Detect a rising edge through the threshold.
    pub fn on_accelerometer(
        &mut self,
        reading: &AccelReading,
        timestamp_ms: u64,
    ) -> Option<StepCandidate> {
        if reading.vehicle_condition {
            return None;
        }

        if let Some(last) = self.last_detection_ms {
            if timestamp_ms < last || timestamp_ms - last < self.min_interval_ms {
                return None;
            }
        }

        let rising = reading.magnitude > self.threshold && reading.previous_magnitude < self.threshold;
        if !rising {
            return None;
        }

        self.last_detection_ms = Some(timestamp_ms);
        Some(StepCandidate {
            source: Strategy::AccelerometerFallback,
            raw_cumulative: None,
            timestamp_ms,
        })
    }
}

/// The active estimator.
#[derive(Debug, Clone)]
pub enum StepEstimator {
    Hardware(HardwareCounter),
    Accelerometer(PeakDetector),
}

impl StepEstimator {
    /// Pick the strategy from what the device provides.
    pub fn select(availability: &SensorAvailability, tuning: &Tuning) -> Self {
        if availability.step_counter {
            StepEstimator::Hardware(HardwareCounter::new(tuning.counter_noise_tolerance))
        } else {
            StepEstimator::Accelerometer(PeakDetector::new(
                tuning.step_threshold,
                tuning.min_step_interval_ms,
            ))
        }
    }

    pub fn strategy(&self) -> Strategy {
        match self {
            StepEstimator::Hardware(_) => Strategy::Hardware,
            StepEstimator::Accelerometer(_) => Strategy::AccelerometerFallback,
        }
    }
}
