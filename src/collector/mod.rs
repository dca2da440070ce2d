//! Signal sampling for the step tracking engine.
//!
//! Sensor drivers live on the host; this module only defines the sample
//! types and the queue the host delivers them through.

pub mod channel;
pub mod replay;
pub mod types;

// Re-export commonly used types
pub use channel::{ChannelCollector, CollectorConfig, CollectorError, SampleSink};
pub use replay::read_samples;
pub use types::{SensorAvailability, SensorKind, SensorSample};
