//! Channel-backed sample collector.
//!
//! The host platform owns the actual sensor drivers; it pushes samples into
//! the collector's sender and the engine worker drains the receiver. Samples
//! pushed while the collector is stopped are dropped at the source.

use crate::collector::types::{SensorAvailability, SensorKind, SensorSample};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Capacity of the sample queue between host and engine.
const QUEUE_CAPACITY: usize = 10_000;

/// Configuration for which sensor kinds to register.
#[derive(Debug, Clone, Default)]
pub struct CollectorConfig {
    pub availability: SensorAvailability,
}

/// Errors that can occur during collection.
#[derive(Debug)]
pub enum CollectorError {
    AlreadyRunning,
    Io(String),
    Parse { line: usize, message: String },
}

impl std::fmt::Display for CollectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectorError::AlreadyRunning => write!(f, "Collector is already running"),
            CollectorError::Io(e) => write!(f, "IO error: {e}"),
            CollectorError::Parse { line, message } => {
                write!(f, "Invalid sample on line {line}: {message}")
            }
        }
    }
}

impl std::error::Error for CollectorError {}

/// Handle the host uses to deliver samples.
#[derive(Clone)]
pub struct SampleSink {
    sender: Sender<SensorSample>,
    running: Arc<AtomicBool>,
    availability: SensorAvailability,
}

impl SampleSink {
    /// Whether samples of this kind are registered at all.
    pub fn accepts(&self, kind: SensorKind) -> bool {
        self.availability.has(kind)
    }

    /// Whether the collector is currently taking samples.
    pub fn is_open(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Deliver a sample. Returns false if it was dropped (collector stopped,
    /// sensor kind not registered, or queue full).
    pub fn push(&self, sample: SensorSample) -> bool {
        if !self.running.load(Ordering::SeqCst) || !self.availability.has(sample.kind) {
            return false;
        }
        match self.sender.try_send(sample) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!("Sample queue full, dropping sample");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Collector that forwards host-delivered samples to the engine.
pub struct ChannelCollector {
    config: CollectorConfig,
    sender: Sender<SensorSample>,
    receiver: Receiver<SensorSample>,
    running: Arc<AtomicBool>,
}

impl ChannelCollector {
    /// Create a new collector.
    pub fn new(config: CollectorConfig) -> Self {
        let (sender, receiver) = bounded(QUEUE_CAPACITY);
        Self {
            config,
            sender,
            receiver,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Register interest in the configured sensor kinds.
    pub fn start(&mut self) -> Result<(), CollectorError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CollectorError::AlreadyRunning);
        }
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Unregister all sample sources.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Check if the collector is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Sensor kinds this collector registers.
    pub fn availability(&self) -> SensorAvailability {
        self.config.availability
    }

    /// Get a sink the host can push samples into.
    pub fn sink(&self) -> SampleSink {
        SampleSink {
            sender: self.sender.clone(),
            running: self.running.clone(),
            availability: self.config.availability,
        }
    }

    /// Get the receiver for sensor samples.
    pub fn receiver(&self) -> &Receiver<SensorSample> {
        &self.receiver
    }

    /// Try to receive a sample without blocking.
    pub fn try_recv(&self) -> Option<SensorSample> {
        self.receiver.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_twice_fails() {
        let mut collector = ChannelCollector::new(CollectorConfig::default());
        collector.start().unwrap();
        assert!(matches!(collector.start(), Err(CollectorError::AlreadyRunning)));
        collector.stop();
        assert!(!collector.is_running());
    }

    #[test]
    fn test_sink_drops_when_stopped() {
        let mut collector = ChannelCollector::new(CollectorConfig::default());
        let sink = collector.sink();

        assert!(!sink.push(SensorSample::step_counter(1, 10)));
        assert!(collector.try_recv().is_none());

        collector.start().unwrap();
        assert!(sink.push(SensorSample::step_counter(2, 11)));
        assert_eq!(collector.try_recv().unwrap().timestamp_ms, 2);
    }

    #[test]
    fn test_sink_filters_unregistered_kinds() {
        let config = CollectorConfig {
            availability: SensorAvailability {
                step_counter: false,
                accelerometer: true,
                gyroscope: true,
            },
        };
        let mut collector = ChannelCollector::new(config);
        collector.start().unwrap();
        let sink = collector.sink();

        assert!(!sink.push(SensorSample::step_counter(1, 10)));
        assert!(sink.push(SensorSample::accelerometer(1, 0.0, 0.0, 9.8)));
        assert_eq!(collector.try_recv().unwrap().kind, SensorKind::Accelerometer);
        assert!(collector.try_recv().is_none());
    }
}
