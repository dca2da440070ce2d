//! The step engine: one serialized processor for every sensor sample.
//!
//! ```text
//! samples ─▶ MotionClassifier ─▶ activity ─▶ StepValidator ─▶ StepLedger ─▶ Notifier
//!    │                                           ▲
//!    └──────────▶ StepEstimator ─▶ candidates ───┘
//! ```
//!
//! The engine is not thread-safe by itself; [`crate::service::StepService`]
//! wraps it in a mutex so concurrent callers are linearized.

use crate::collector::{SensorAvailability, SensorKind, SensorSample};
use crate::config::{Config, Tuning};
use crate::core::{
    ActivityLabel, CounterOutcome, HistoricalSteps, MotionClassifier, StepCandidate,
    StepEstimator, StepLedger, StepValidator, Strategy,
};
use crate::notify::{EngineEvent, Notifier};
use crate::stats::SharedEngineStats;
use crate::store::StoreError;
use std::sync::Arc;
use std::time::Duration;

/// Engine parameters derived from the configuration.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub availability: SensorAvailability,
    pub tuning: Tuning,
    pub persist_interval: Duration,
    pub rollover_check_interval: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            availability: config.sources.availability(),
            tuning: config.tuning,
            persist_interval: config.persist_interval,
            rollover_check_interval: Duration::from_secs(config.rollover_check_interval_secs),
        }
    }
}

/// Sensor fusion and step counting engine.
pub struct StepEngine {
    settings: EngineSettings,
    classifier: MotionClassifier,
    estimator: StepEstimator,
    validator: StepValidator,
    ledger: StepLedger,
    notifier: Arc<Notifier>,
    stats: SharedEngineStats,
}

impl StepEngine {
    pub fn new(
        settings: EngineSettings,
        ledger: StepLedger,
        notifier: Arc<Notifier>,
        stats: SharedEngineStats,
    ) -> Self {
        let tuning = settings.tuning;
        Self {
            classifier: MotionClassifier::new(tuning)
                .with_gyroscope(settings.availability.gyroscope),
            estimator: StepEstimator::select(&settings.availability, &tuning),
            validator: StepValidator::new(tuning.min_step_interval_ms),
            settings,
            ledger,
            notifier,
            stats,
        }
    }

    /// Reset transient state and reconcile the ledger with today's date.
    pub fn start(&mut self) {
        let tuning = self.settings.tuning;
        self.classifier.reset();
        self.estimator = StepEstimator::select(&self.settings.availability, &tuning);
        self.validator = StepValidator::new(tuning.min_step_interval_ms);

        for kind in self.settings.availability.missing() {
            tracing::warn!("Sensor unavailable: {}", kind);
        }
        tracing::info!(
            "Step engine started (run {}) using {}",
            self.stats.run_id(),
            self.estimator.strategy()
        );

        self.check_day_rollover();
    }

    /// Final flush. Always writes, even when nothing changed.
    pub fn shutdown(&mut self) -> Result<(), StoreError> {
        tracing::info!(
            "Step engine stopping with {} steps today",
            self.ledger.current_daily_steps()
        );
        self.ledger.persist()
    }

    /// Feed one sample through the pipeline.
    pub fn process_sample(&mut self, sample: &SensorSample) {
        if sample.values.iter().any(|v| !v.is_finite()) {
            tracing::debug!("Ignoring non-finite {} sample", sample.kind);
            return;
        }
        self.stats.record_sample(sample.kind);

        let (x, y, z) = (sample.axis(0), sample.axis(1), sample.axis(2));
        match sample.kind {
            SensorKind::StepCounter => {
                if let Some(cumulative) = sample.cumulative_steps() {
                    self.on_step_counter(cumulative, sample.timestamp_ms);
                }
            }
            SensorKind::Accelerometer => self.on_accelerometer(x, y, z, sample.timestamp_ms),
            SensorKind::Gyroscope => self.on_gyroscope(x, y, z),
        }
    }

    fn on_step_counter(&mut self, cumulative: u64, timestamp_ms: u64) {
        let StepEstimator::Hardware(counter) = &mut self.estimator else {
            return;
        };

        let outcome = counter.on_counter(
            cumulative,
            timestamp_ms,
            self.ledger.baseline(),
            self.ledger.total_since_boot(),
        );

        match outcome {
            CounterOutcome::Candidate(candidate) => self.submit(candidate),
            CounterOutcome::Baseline(value) => self.ledger.establish_baseline(value),
            CounterOutcome::Reboot(value) => {
                self.stats.record_reboot();
                if self.ledger.handle_reboot(value) != 0 {
                    self.notifier.publish(EngineEvent::StepsChanged(0), 0);
                }
            }
            CounterOutcome::Rebase(value) => {
                self.stats.record_reboot();
                self.ledger.rebase_counter(value);
            }
            CounterOutcome::Duplicate => self.stats.record_duplicate(),
            CounterOutcome::Noise => {
                tracing::debug!(
                    "Counter went back to {} (last {}), ignoring",
                    cumulative,
                    self.ledger.total_since_boot()
                );
                self.stats.record_noise();
            }
        }
    }

    fn on_accelerometer(&mut self, x: f32, y: f32, z: f32, timestamp_ms: u64) {
        let reading = self.classifier.on_accelerometer(x, y, z);
        if let Some(label) = reading.activity_changed {
            self.publish_activity(label);
        }

        if let StepEstimator::Accelerometer(detector) = &mut self.estimator {
            if let Some(candidate) = detector.on_accelerometer(&reading, timestamp_ms) {
                self.submit(candidate);
            }
        }
    }

    fn on_gyroscope(&mut self, x: f32, y: f32, z: f32) {
        if let Some(label) = self.classifier.on_gyroscope(x, y, z) {
            self.publish_activity(label);
        }
    }

    fn publish_activity(&self, label: ActivityLabel) {
        tracing::debug!("Activity changed to {}", label);
        self.notifier.publish(
            EngineEvent::ActivityChanged(label),
            self.ledger.current_daily_steps(),
        );
    }

    /// Validate a candidate and apply it to the ledger.
    fn submit(&mut self, candidate: StepCandidate) {
        self.stats.record_candidate();

        let verdict = self.validator.validate(
            &candidate,
            self.classifier.activity(),
            self.classifier.is_moving(),
        );
        if let Err(reason) = verdict {
            tracing::trace!("Rejected step at {}: {}", candidate.timestamp_ms, reason);
            self.stats.record_rejection(reason);
            return;
        }

        self.stats.record_accepted();
        self.check_day_rollover();
        if let Some(daily) = self.ledger.apply_step(&candidate) {
            tracing::debug!("Daily steps now {}", daily);
            self.notifier.publish(EngineEvent::StepsChanged(daily), daily);
        }
    }

    /// Run the day rollover check, publishing the reset if one happened.
    pub fn check_day_rollover(&mut self) -> bool {
        let before = self.ledger.current_daily_steps();
        match self.ledger.check_day_rollover() {
            Some(rollover) => {
                if rollover.archived.is_some() {
                    self.stats.record_rollover();
                }
                if before != 0 {
                    self.notifier.publish(EngineEvent::StepsChanged(0), 0);
                }
                true
            }
            None => false,
        }
    }

    /// Add user-entered steps, bypassing validation.
    pub fn add_manual_steps(&mut self, steps: u64) -> u64 {
        self.check_day_rollover();
        let daily = self.ledger.add_manual_steps(steps);
        self.notifier.publish(EngineEvent::StepsChanged(daily), daily);
        daily
    }

    pub fn reset_daily_steps(&mut self) {
        self.ledger.reset_daily_steps();
        self.notifier.publish(EngineEvent::StepsChanged(0), 0);
    }

    pub fn daily_steps(&self) -> u64 {
        self.ledger.current_daily_steps()
    }

    pub fn historical_steps(&self) -> HistoricalSteps {
        self.ledger.historical_steps()
    }

    pub fn activity(&self) -> ActivityLabel {
        self.classifier.activity()
    }

    pub fn is_moving(&self) -> bool {
        self.classifier.is_moving()
    }

    pub fn strategy(&self) -> Strategy {
        self.estimator.strategy()
    }

    pub fn ledger(&self) -> &StepLedger {
        &self.ledger
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }
}
