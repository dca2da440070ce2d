//! Raw sensor sample types delivered by the host platform.
//!
//! Samples are immutable and consumed once. Timestamps are monotonic
//! milliseconds (time since boot), never wall-clock time.

use serde::{Deserialize, Serialize};

/// Kind of sensor a sample originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    /// Hardware cumulative step counter (one value: steps since boot)
    StepCounter,
    /// 3-axis accelerometer (m/s²)
    Accelerometer,
    /// 3-axis gyroscope (rad/s)
    Gyroscope,
}

impl SensorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::StepCounter => "step_counter",
            SensorKind::Accelerometer => "accelerometer",
            SensorKind::Gyroscope => "gyroscope",
        }
    }
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single timestamped reading from one sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    pub kind: SensorKind,
    /// Monotonic timestamp in milliseconds
    pub timestamp_ms: u64,
    /// One value for the step counter, three for the motion sensors.
    /// Double precision keeps counter values exact up to 2^53.
    pub values: Vec<f64>,
}

impl SensorSample {
    /// Create a hardware step counter sample.
    pub fn step_counter(timestamp_ms: u64, cumulative: u64) -> Self {
        Self {
            kind: SensorKind::StepCounter,
            timestamp_ms,
            values: vec![cumulative as f64],
        }
    }

    /// Create an accelerometer sample.
    pub fn accelerometer(timestamp_ms: u64, x: f32, y: f32, z: f32) -> Self {
        Self {
            kind: SensorKind::Accelerometer,
            timestamp_ms,
            values: vec![f64::from(x), f64::from(y), f64::from(z)],
        }
    }

    /// Create a gyroscope sample.
    pub fn gyroscope(timestamp_ms: u64, x: f32, y: f32, z: f32) -> Self {
        Self {
            kind: SensorKind::Gyroscope,
            timestamp_ms,
            values: vec![f64::from(x), f64::from(y), f64::from(z)],
        }
    }

    /// Axis value narrowed for the motion classifier. Missing axes read as zero.
    pub fn axis(&self, index: usize) -> f32 {
        self.values.get(index).copied().unwrap_or(0.0) as f32
    }

    /// Cumulative count carried by a step counter sample.
    ///
    /// Returns `None` for other kinds and for negative or non-finite readings.
    pub fn cumulative_steps(&self) -> Option<u64> {
        if self.kind != SensorKind::StepCounter {
            return None;
        }
        let value = *self.values.first()?;
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        Some(value as u64)
    }
}

/// Which sensor kinds the host device exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorAvailability {
    pub step_counter: bool,
    pub accelerometer: bool,
    pub gyroscope: bool,
}

impl SensorAvailability {
    pub fn all() -> Self {
        Self {
            step_counter: true,
            accelerometer: true,
            gyroscope: true,
        }
    }

    pub fn has(&self, kind: SensorKind) -> bool {
        match kind {
            SensorKind::StepCounter => self.step_counter,
            SensorKind::Accelerometer => self.accelerometer,
            SensorKind::Gyroscope => self.gyroscope,
        }
    }

    /// Kinds the host does not provide.
    pub fn missing(&self) -> Vec<SensorKind> {
        [
            SensorKind::StepCounter,
            SensorKind::Accelerometer,
            SensorKind::Gyroscope,
        ]
        .into_iter()
        .filter(|k| !self.has(*k))
        .collect()
    }
}

impl Default for SensorAvailability {
    fn default() -> Self {
        Self::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_defaults_to_zero() {
        let sample = SensorSample {
            kind: SensorKind::Gyroscope,
            timestamp_ms: 0,
            values: vec![0.5],
        };
        assert_eq!(sample.axis(0), 0.5);
        assert_eq!(sample.axis(2), 0.0);
    }

    #[test]
    fn test_large_counter_values_stay_exact() {
        let base = 1u64 << 24;
        assert_eq!(SensorSample::step_counter(0, base + 1).cumulative_steps(), Some(base + 1));
        assert_eq!(SensorSample::step_counter(0, base + 3).cumulative_steps(), Some(base + 3));
    }

    #[test]
    fn test_cumulative_steps() {
        assert_eq!(SensorSample::step_counter(0, 1042).cumulative_steps(), Some(1042));

        let accel = SensorSample::accelerometer(0, 1.0, 1.0, 1.0);
        assert_eq!(accel.cumulative_steps(), None);

        let bogus = SensorSample {
            kind: SensorKind::StepCounter,
            timestamp_ms: 0,
            values: vec![-3.0],
        };
        assert_eq!(bogus.cumulative_steps(), None);

        let empty = SensorSample {
            kind: SensorKind::StepCounter,
            timestamp_ms: 0,
            values: vec![],
        };
        assert_eq!(empty.cumulative_steps(), None);
    }

    #[test]
    fn test_sample_json_shape() {
        let json = r#"{"kind":"gyroscope","timestamp_ms":12,"values":[0.1,0.2,0.3]}"#;
        let sample: SensorSample = serde_json::from_str(json).unwrap();
        assert_eq!(sample.kind, SensorKind::Gyroscope);
        assert_eq!(sample.timestamp_ms, 12);
    }

    #[test]
    fn test_missing_sensors() {
        let availability = SensorAvailability {
            step_counter: false,
            accelerometer: true,
            gyroscope: false,
        };
        assert_eq!(
            availability.missing(),
            vec![SensorKind::StepCounter, SensorKind::Gyroscope]
        );
    }
}
