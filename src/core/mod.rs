//! Core step tracking logic.
//!
//! This module contains:
//! - Motion classification from accelerometer and gyroscope samples
//! - Candidate step estimation (hardware counter or accelerometer peaks)
//! - Step validation against the current activity
//! - The daily step ledger with day rollover and persistence

pub mod estimator;
pub mod ledger;
pub mod motion;
pub mod validator;

// Re-export commonly used types
pub use estimator::{
    CounterOutcome, HardwareCounter, PeakDetector, StepCandidate, StepEstimator, Strategy,
};
pub use ledger::{DayRollover, HistoricalSteps, LedgerState, StepLedger};
pub use motion::{AccelReading, ActivityLabel, MotionClassifier, MotionState};
pub use validator::{Rejection, StepValidator};
