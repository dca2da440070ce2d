//! Gate between candidate steps and the ledger.

use crate::core::estimator::StepCandidate;
use crate::core::motion::ActivityLabel;
use serde::{Deserialize, Serialize};

/// Why a candidate was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    Vehicle,
    Stationary,
    TooSoon,
    NotMoving,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::Vehicle => write!(f, "in vehicle"),
            Rejection::Stationary => write!(f, "stationary"),
            Rejection::TooSoon => write!(f, "below minimum step interval"),
            Rejection::NotMoving => write!(f, "no movement"),
        }
    }
}

/// Accepts at most one step per minimum interval, and none while idle or driving.
#[derive(Debug, Clone)]
pub struct StepValidator {
    min_interval_ms: u64,
    last_accepted_ms: Option<u64>,
}

impl StepValidator {
    pub fn new(min_interval_ms: u64) -> Self {
        Self {
            min_interval_ms,
            last_accepted_ms: None,
        }
    }

    pub fn last_accepted_ms(&self) -> Option<u64> {
        self.last_accepted_ms
    }

    /// Check a candidate against the current motion state.
    pub fn validate(
        &mut self,
        candidate: &StepCandidate,
        activity: ActivityLabel,
        is_moving: bool,
    ) -> Result<(), Rejection> {
        match activity {
            ActivityLabel::Vehicle => return Err(Rejection::Vehicle),
            ActivityLabel::Stationary => return Err(Rejection::Stationary),
            _ => {}
        }

        let now = candidate.timestamp_ms;
        if let Some(last) = self.last_accepted_ms {
            // Out-of-order samples land inside the window too.
            if now < last || now - last < self.min_interval_ms {
                return Err(Rejection::TooSoon);
            }
        }

        if !is_moving {
            return Err(Rejection::NotMoving);
        }

        self.last_accepted_ms = Some(now);
        Ok(())
    }
}
