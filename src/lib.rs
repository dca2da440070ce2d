//! Steptrack Agent - background step tracking with sensor fusion.
//!
//! This library counts a user's steps from whatever motion sensors the host
//! device provides, rejects phantom steps while stationary or driving, and
//! keeps durable daily totals across restarts, reboots and midnight.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Steptrack Agent                         │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐   ┌────────────┐   ┌───────────┐   ┌──────────┐  │
//! │  │ Collector │──▶│   Motion   │──▶│ Validator │──▶│  Ledger  │  │
//! │  │ (samples) │   │ Classifier │   │  (gate)   │   │ (totals) │  │
//! │  └───────────┘   └────────────┘   └───────────┘   └──────────┘  │
//! │        │                                ▲               │        │
//! │        ▼                                │               ▼        │
//! │  ┌───────────┐                          │        ┌──────────┐   │
//! │  │ Estimator │──────── candidates ──────┘        │ Notifier │   │
//! │  └───────────┘                                   └──────────┘   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use steptrack_agent::{notify, Config, SensorSample, StepService};
//!
//! let config = Config::load().unwrap_or_default();
//! let notifier = Arc::new(notify::Notifier::new(Arc::new(notify::TracingSurface)));
//! let mut service = StepService::from_config(&config, notifier);
//!
//! service.start().expect("Failed to start step service");
//! service.sink().push(SensorSample::step_counter(0, 1200));
//! println!("{} steps today", service.get_current_steps());
//! service.stop().expect("Failed to flush step ledger");
//! ```

pub mod clock;
pub mod collector;
pub mod config;
pub mod core;
pub mod engine;
pub mod notify;
pub mod service;
pub mod stats;
pub mod store;

// Re-export key types at crate root for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use collector::{ChannelCollector, CollectorConfig, CollectorError, SensorKind, SensorSample};
pub use config::{Config, SourceConfig, Tuning};
pub use core::{ActivityLabel, HistoricalSteps, StepLedger, Strategy};
pub use engine::{EngineSettings, StepEngine};
pub use notify::{EngineEvent, Notifier, NotificationSurface, UiBridge};
pub use service::{ServiceError, ServiceStatus, StepService};
pub use stats::{EngineStats, SharedEngineStats, StatsSnapshot};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore, StoreError};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
