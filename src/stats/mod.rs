//! Statistics about what the engine saw and why it dropped candidates.

pub mod counters;

pub use counters::{EngineStats, SharedEngineStats, StatsSnapshot};
