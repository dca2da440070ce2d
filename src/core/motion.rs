//! Motion classification from accelerometer and gyroscope samples.
//!
//! The classifier keeps only the previous accelerometer magnitude and a
//! stationary-run counter, so it recovers immediately after a restart.
//!
//! Labels other than stationary come from the gyroscope. On devices without
//! one, renewed motion releases a forced stationary label back to unknown.

use crate::config::Tuning;
use serde::{Deserialize, Serialize};

/// Coarse activity classification used to gate step counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityLabel {
    Stationary,
    Walking,
    Running,
    Vehicle,
    #[default]
    Unknown,
}

impl ActivityLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityLabel::Stationary => "stationary",
            ActivityLabel::Walking => "walking",
            ActivityLabel::Running => "running",
            ActivityLabel::Vehicle => "vehicle",
            ActivityLabel::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ActivityLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifier state. Never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MotionState {
    pub last_accel_magnitude: f32,
    pub last_delta: f32,
    pub consecutive_stationary_readings: u32,
    pub activity: ActivityLabel,
    pub is_moving: bool,
    /// Whether the last accelerometer magnitude exceeded the vehicle threshold
    pub vehicle_condition: bool,
}

/// Result of feeding one accelerometer sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccelReading {
    pub magnitude: f32,
    pub previous_magnitude: f32,
    pub vehicle_condition: bool,
    /// Set when the stationary run forced a label change
    pub activity_changed: Option<ActivityLabel>,
}

/// Activity classifier.
#[derive(Debug, Clone)]
pub struct MotionClassifier {
    tuning: Tuning,
    has_gyroscope: bool,
    state: MotionState,
}

impl MotionClassifier {
    pub fn new(tuning: Tuning) -> Self {
        Self {
            tuning,
            has_gyroscope: true,
            state: MotionState::default(),
        }
    }

    /// Whether gyroscope samples will arrive to relabel the activity.
    pub fn with_gyroscope(mut self, available: bool) -> Self {
        self.has_gyroscope = available;
        self
    }

    pub fn state(&self) -> &MotionState {
        &self.state
    }

    pub fn activity(&self) -> ActivityLabel {
        self.state.activity
    }

    pub fn is_moving(&self) -> bool {
        self.state.is_moving
    }

    /// Forget everything, as on a fresh start.
    pub fn reset(&mut self) {
        self.state = MotionState::default();
    }

    /// Update from an accelerometer vector.
    pub fn on_accelerometer(&mut self, x: f32, y: f32, z: f32) -> AccelReading {
        let magnitude = (x * x + y * y + z * z).sqrt();
        let previous_magnitude = self.state.last_accel_magnitude;
        let delta = (magnitude - previous_magnitude).abs();
        let before = self.state.activity;

        self.state.is_moving = delta > self.tuning.movement_threshold;

        if delta < self.tuning.stationary_threshold {
            self.state.consecutive_stationary_readings =
                self.state.consecutive_stationary_readings.saturating_add(1);
            if self.state.consecutive_stationary_readings > self.tuning.stationary_readings {
                self.state.activity = ActivityLabel::Stationary;
                self.state.is_moving = false;
            }
        } else {
            self.state.consecutive_stationary_readings = 0;
            if !self.has_gyroscope && self.state.activity == ActivityLabel::Stationary {
                self.state.activity = ActivityLabel::Unknown;
            }
        }

        self.state.vehicle_condition = magnitude > self.tuning.vehicle_accel_threshold;
        self.state.last_delta = delta;
        self.state.last_accel_magnitude = magnitude;

        AccelReading {
            magnitude,
            previous_magnitude,
            vehicle_condition: self.state.vehicle_condition,
            activity_changed: (self.state.activity != before).then_some(self.state.activity),
        }
    }

    /// Update from a gyroscope vector. Returns the new label if it changed.
    pub fn on_gyroscope(&mut self, x: f32, y: f32, z: f32) -> Option<ActivityLabel> {
        let rotation = (x * x + y * y + z * z).sqrt();
        let t = &self.tuning;

        let walking_pattern = rotation > t.walking_gyro_threshold
            && rotation < t.max_walking_gyro
            && self.state.is_moving;

        let label = if walking_pattern {
            if rotation > t.running_gyro_threshold {
                ActivityLabel::Running
            } else {
                ActivityLabel::Walking
            }
        } else if !self.state.is_moving {
            ActivityLabel::Stationary
        } else {
            ActivityLabel::Vehicle
        };

        let changed = label != self.state.activity;
        self.state.activity = label;
        changed.then_some(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> MotionClassifier {
        MotionClassifier::new(Tuning::default())
    }

    #[test]
    fn test_initial_state() {
        let c = classifier();
        assert_eq!(c.activity(), ActivityLabel::Unknown);
        assert!(!c.is_moving());
    }

    #[test]
    fn test_movement_threshold() {
        let mut c = classifier();
        c.on_accelerometer(0.0, 0.0, 9.8);
        assert!(c.is_moving());

        c.on_accelerometer(0.0, 0.0, 10.0);
        assert!(!c.is_moving(), "delta 0.2 is below the movement threshold");

        c.on_accelerometer(0.0, 0.0, 11.0);
        assert!(c.is_moving());
    }

    #[test]
    fn test_stationary_run_forces_label() {
        let mut c = classifier();
        c.on_accelerometer(0.0, 0.0, 9.8);
        c.on_gyroscope(0.5, 0.0, 0.0);
        assert_eq!(c.activity(), ActivityLabel::Walking);

        let mut forced = None;
        for _ in 0..11 {
            if let Some(label) = c.on_accelerometer(0.0, 0.0, 9.8).activity_changed {
                forced = Some(label);
            }
        }
        assert_eq!(forced, Some(ActivityLabel::Stationary));
        assert_eq!(c.state().consecutive_stationary_readings, 11);
        assert!(!c.is_moving());
    }

    #[test]
    fn test_stationary_counter_resets_on_motion() {
        let mut c = classifier();
        c.on_accelerometer(0.0, 0.0, 9.8);
        for _ in 0..5 {
            c.on_accelerometer(0.0, 0.0, 9.8);
        }
        assert_eq!(c.state().consecutive_stationary_readings, 5);

        c.on_accelerometer(0.0, 0.0, 12.0);
        assert_eq!(c.state().consecutive_stationary_readings, 0);
    }

    #[test]
    fn test_motion_releases_stationary_without_gyroscope() {
        let mut c = classifier().with_gyroscope(false);
        for _ in 0..12 {
            c.on_accelerometer(0.0, 0.0, 9.8);
        }
        assert_eq!(c.activity(), ActivityLabel::Stationary);

        let reading = c.on_accelerometer(0.0, 0.0, 12.0);
        assert_eq!(reading.activity_changed, Some(ActivityLabel::Unknown));
        assert!(c.is_moving());
    }

    #[test]
    fn test_stationary_held_until_gyroscope_relabels() {
        let mut c = classifier();
        for _ in 0..12 {
            c.on_accelerometer(0.0, 0.0, 9.8);
        }
        let reading = c.on_accelerometer(0.0, 0.0, 12.0);
        assert_eq!(reading.activity_changed, None);
        assert_eq!(c.activity(), ActivityLabel::Stationary);
    }

    #[test]
    fn test_gyro_labels() {
        let mut c = classifier();
        c.on_accelerometer(0.0, 0.0, 9.8);

        assert_eq!(c.on_gyroscope(0.5, 0.0, 0.0), Some(ActivityLabel::Walking));
        assert_eq!(c.on_gyroscope(0.0, 1.5, 0.0), Some(ActivityLabel::Running));
        assert_eq!(c.on_gyroscope(0.0, 0.0, 2.5), Some(ActivityLabel::Vehicle));
        assert_eq!(c.on_gyroscope(0.0, 0.0, 0.1), None, "still vehicle while moving");

        c.on_accelerometer(0.0, 0.0, 9.8);
        assert_eq!(c.on_gyroscope(0.5, 0.0, 0.0), Some(ActivityLabel::Stationary));
    }

    #[test]
    fn test_vehicle_condition() {
        let mut c = classifier();
        let reading = c.on_accelerometer(0.0, 0.0, 16.0);
        assert!(reading.vehicle_condition);
        assert_eq!(c.activity(), ActivityLabel::Unknown, "accelerometer alone sets no label");

        let reading = c.on_accelerometer(0.0, 0.0, 9.8);
        assert!(!reading.vehicle_condition);
        assert!((reading.previous_magnitude - 16.0).abs() < 1e-4);
    }
}
