//! Engine control surface.
//!
//! `StepService` owns the engine behind a mutex, the collector the host
//! pushes samples into, and the worker thread that drains it. All read
//! operations work while the service is stopped and return the last
//! persisted values.

use crate::clock::{Clock, SystemClock};
use crate::collector::{ChannelCollector, CollectorConfig, CollectorError, SampleSink, SensorSample};
use crate::config::Config;
use crate::core::{ActivityLabel, HistoricalSteps, StepLedger, Strategy};
use crate::engine::{EngineSettings, StepEngine};
use crate::notify::Notifier;
use crate::stats::{EngineStats, SharedEngineStats, StatsSnapshot};
use crate::store::{JsonFileStore, KeyValueStore, StoreError};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How long the worker waits for a sample before doing idle work.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Control surface errors.
#[derive(Debug)]
pub enum ServiceError {
    AlreadyRunning,
    InvalidInput(String),
    Store(StoreError),
    Collector(CollectorError),
    Worker(String),
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceError::AlreadyRunning => write!(f, "Step service is already running"),
            ServiceError::InvalidInput(e) => write!(f, "Invalid input: {e}"),
            ServiceError::Store(e) => write!(f, "Storage error: {e}"),
            ServiceError::Collector(e) => write!(f, "Collector error: {e}"),
            ServiceError::Worker(e) => write!(f, "Worker error: {e}"),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        ServiceError::Store(e)
    }
}

impl From<CollectorError> for ServiceError {
    fn from(e: CollectorError) -> Self {
        ServiceError::Collector(e)
    }
}

/// Snapshot of the service for status displays.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub running: bool,
    pub strategy: Strategy,
    pub activity: ActivityLabel,
    pub is_moving: bool,
    pub daily_steps: u64,
    /// Last persistence failure, if the latest write did not succeed
    pub persist_warning: Option<String>,
    pub stats: StatsSnapshot,
}

/// Handle to a step engine and its worker.
pub struct StepService {
    engine: Arc<Mutex<StepEngine>>,
    collector: ChannelCollector,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    stats: SharedEngineStats,
    notifier: Arc<Notifier>,
}

impl StepService {
    /// Build a service over an explicit store and clock.
    pub fn new(
        settings: EngineSettings,
        store: Box<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        notifier: Arc<Notifier>,
        stats: SharedEngineStats,
    ) -> Self {
        let persist_interval_ms = settings.persist_interval.as_millis() as u64;
        let ledger = StepLedger::load(store, clock, persist_interval_ms);
        let collector = ChannelCollector::new(CollectorConfig {
            availability: settings.availability,
        });
        let engine = StepEngine::new(settings, ledger, notifier.clone(), stats.clone());

        Self {
            engine: Arc::new(Mutex::new(engine)),
            collector,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
            stats,
            notifier,
        }
    }

    /// Build a service from the on-disk configuration.
    pub fn from_config(config: &Config, notifier: Arc<Notifier>) -> Self {
        let store = JsonFileStore::open_or_empty(config.ledger_path());
        let clock = SystemClock::from_name(config.timezone.as_deref());
        let stats = Arc::new(EngineStats::with_persistence(config.stats_path()));
        Self::new(
            EngineSettings::from(config),
            Box::new(store),
            Arc::new(clock),
            notifier,
            stats,
        )
    }

    /// Register the sensors and start the worker.
    pub fn start(&mut self) -> Result<(), ServiceError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(ServiceError::AlreadyRunning);
        }

        let rollover_check_interval = {
            let mut engine = self.engine();
            engine.start();
            engine.settings().rollover_check_interval
        };
        self.collector.start()?;
        self.running.store(true, Ordering::SeqCst);

        let engine = self.engine.clone();
        let running = self.running.clone();
        let receiver = self.collector.receiver().clone();
        let handle = thread::Builder::new()
            .name("steptrack-engine".to_string())
            .spawn(move || run_worker(engine, receiver, running, rollover_check_interval))
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                self.collector.stop();
                ServiceError::Worker(e.to_string())
            })?;
        self.worker = Some(handle);
        Ok(())
    }

    /// Unregister the sensors, drain the queue and flush the ledger.
    ///
    /// Stopping a stopped service is a no-op.
    pub fn stop(&mut self) -> Result<(), ServiceError> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        self.collector.stop();
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                tracing::error!("Step engine worker panicked");
            }
        }

        let mut engine = self.engine();
        while let Some(sample) = self.collector.try_recv() {
            engine.process_sample(&sample);
        }
        let flushed = engine.shutdown();
        drop(engine);

        if let Err(e) = self.stats.save() {
            tracing::warn!("Could not save engine stats: {}", e);
        }
        flushed.map_err(ServiceError::from)
    }

    /// Sink the host delivers samples through.
    pub fn sink(&self) -> SampleSink {
        self.collector.sink()
    }

    /// Process a sample on the caller's thread.
    ///
    /// For hosts that already serialize sensor callbacks themselves.
    pub fn process_sample(&self, sample: &SensorSample) {
        self.engine().process_sample(sample);
    }

    pub fn get_current_steps(&self) -> u64 {
        self.engine().daily_steps()
    }

    pub fn get_service_status(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Add user-entered steps. Negative counts are rejected without changes.
    pub fn add_manual_steps(&self, steps: i64) -> Result<u64, ServiceError> {
        let steps = u64::try_from(steps).map_err(|_| {
            ServiceError::InvalidInput(format!("step count must not be negative, got {steps}"))
        })?;
        Ok(self.engine().add_manual_steps(steps))
    }

    pub fn reset_daily_steps(&self) {
        self.engine().reset_daily_steps();
    }

    pub fn get_historical_steps(&self) -> HistoricalSteps {
        self.engine().historical_steps()
    }

    pub fn status(&self) -> ServiceStatus {
        let engine = self.engine();
        ServiceStatus {
            running: self.get_service_status(),
            strategy: engine.strategy(),
            activity: engine.activity(),
            is_moving: engine.is_moving(),
            daily_steps: engine.daily_steps(),
            persist_warning: engine.ledger().persist_warning().map(str::to_string),
            stats: self.stats.snapshot(),
        }
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    fn engine(&self) -> MutexGuard<'_, StepEngine> {
        lock_engine(&self.engine)
    }
}

impl Drop for StepService {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!("Step service did not shut down cleanly: {}", e);
        }
    }
}

fn lock_engine(engine: &Mutex<StepEngine>) -> MutexGuard<'_, StepEngine> {
    engine.lock().unwrap_or_else(|e| e.into_inner())
}

/// Drain samples until stopped, checking the day rollover while idle.
fn run_worker(
    engine: Arc<Mutex<StepEngine>>,
    receiver: Receiver<SensorSample>,
    running: Arc<AtomicBool>,
    rollover_check_interval: Duration,
) {
    let mut last_rollover_check = Instant::now();

    while running.load(Ordering::SeqCst) {
        match receiver.recv_timeout(POLL_INTERVAL) {
            Ok(sample) => lock_engine(&engine).process_sample(&sample),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                tracing::error!("Sample source disconnected unexpectedly");
                break;
            }
        }

        if last_rollover_check.elapsed() >= rollover_check_interval {
            lock_engine(&engine).check_day_rollover();
            last_rollover_check = Instant::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::notify::TracingSurface;
    use crate::store::MemoryStore;
    use chrono::NaiveDate;

    fn service(store: MemoryStore) -> StepService {
        let clock = ManualClock::new(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        StepService::new(
            EngineSettings::default(),
            Box::new(store),
            Arc::new(clock),
            Arc::new(Notifier::new(Arc::new(TracingSurface))),
            Arc::new(EngineStats::new()),
        )
    }

    #[test]
    fn test_start_stop_lifecycle() {
        let mut svc = service(MemoryStore::new());
        assert!(!svc.get_service_status());

        svc.start().unwrap();
        assert!(svc.get_service_status());
        assert!(matches!(svc.start(), Err(ServiceError::AlreadyRunning)));

        svc.stop().unwrap();
        assert!(!svc.get_service_status());
        svc.stop().unwrap();
    }

    #[test]
    fn test_negative_manual_steps_rejected() {
        let svc = service(MemoryStore::new());
        svc.add_manual_steps(10).unwrap();

        let err = svc.add_manual_steps(-5).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
        assert_eq!(svc.get_current_steps(), 10);
    }

    #[test]
    fn test_reads_work_while_stopped() {
        let mut store = MemoryStore::new();
        store.set("daily_steps", serde_json::json!(321));
        store.set("last_date", serde_json::json!("2024-06-01"));
        store.commit().unwrap();

        let svc = service(store);
        assert!(!svc.get_service_status());
        assert_eq!(svc.get_current_steps(), 321);
        assert_eq!(svc.get_historical_steps().total_steps, 321);
    }

    #[test]
    fn test_persist_failure_reported_in_status() {
        let mut store = MemoryStore::new();
        store.set_fail_commits(true);
        let mut svc = service(store);

        svc.start().unwrap();
        assert_eq!(svc.add_manual_steps(3).unwrap(), 3);
        let status = svc.status();
        assert!(status.persist_warning.is_some());
        assert_eq!(status.daily_steps, 3);

        assert!(matches!(svc.stop(), Err(ServiceError::Store(_))));
        assert_eq!(svc.get_current_steps(), 3);
    }

    #[test]
    fn test_idle_worker_rolls_day_over() {
        let clock = ManualClock::new(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        let settings = EngineSettings {
            rollover_check_interval: Duration::ZERO,
            ..EngineSettings::default()
        };
        let mut svc = StepService::new(
            settings,
            Box::new(MemoryStore::new()),
            Arc::new(clock.clone()),
            Arc::new(Notifier::new(Arc::new(TracingSurface))),
            Arc::new(EngineStats::new()),
        );
        svc.add_manual_steps(25).unwrap();
        svc.start().unwrap();

        clock.advance_day();
        let yesterday = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let mut archived = None;
        for _ in 0..50 {
            archived = svc.get_historical_steps().history.get(&yesterday).copied();
            if archived.is_some() {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }

        assert_eq!(archived, Some(25));
        assert_eq!(svc.get_current_steps(), 0);
        svc.stop().unwrap();
    }

    #[test]
    fn test_worker_processes_pushed_samples() {
        let mut svc = service(MemoryStore::new());
        svc.start().unwrap();
        let sink = svc.sink();

        assert!(sink.push(SensorSample::accelerometer(0, 0.0, 0.0, 9.8)));
        assert!(sink.push(SensorSample::accelerometer(1, 0.0, 0.0, 11.0)));
        assert!(sink.push(SensorSample::gyroscope(1, 0.5, 0.0, 0.0)));
        assert!(sink.push(SensorSample::step_counter(2, 700)));
        assert!(sink.push(SensorSample::step_counter(400, 730)));

        svc.stop().unwrap();
        assert_eq!(svc.get_current_steps(), 30);
        assert!(!sink.push(SensorSample::step_counter(900, 740)));
    }
}
