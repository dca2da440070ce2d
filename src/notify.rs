//! Fan-out of engine events to the UI bridge and the status notification.
//!
//! Delivery is fire-and-forget. A missing, full or disconnected bridge never
//! blocks sample processing; failures are logged and dropped.

use crate::core::ActivityLabel;
use crossbeam_channel::{Sender, TrySendError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::{Arc, RwLock};

/// Bridge event name for step count updates.
pub const STEP_COUNT_EVENT: &str = "onStepCountUpdate";

/// Bridge event name for activity updates.
pub const ACTIVITY_EVENT: &str = "onActivityUpdate";

/// Identifier of the persistent status notification.
pub const NOTIFICATION_ID: u32 = 1;

const NOTIFICATION_TITLE: &str = "Step Tracking Active";

/// Events emitted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    StepsChanged(u64),
    ActivityChanged(ActivityLabel),
}

/// A message pushed over the UI bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeMessage {
    pub event: String,
    pub payload: Value,
}

/// UI bridge delivery errors.
#[derive(Debug)]
pub enum BridgeError {
    Disconnected,
    Full,
}

impl std::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeError::Disconnected => write!(f, "UI bridge disconnected"),
            BridgeError::Full => write!(f, "UI bridge queue full"),
        }
    }
}

impl std::error::Error for BridgeError {}

/// One-way push channel to the UI.
pub trait UiBridge: Send + Sync {
    fn notify(&self, event: &str, payload: Value) -> Result<(), BridgeError>;
}

/// Persistent status display. Showing the same id again replaces it.
pub trait NotificationSurface: Send + Sync {
    fn show(&self, id: u32, title: &str, text: &str);
}

/// Bridge that forwards messages into a crossbeam channel without blocking.
#[derive(Debug, Clone)]
pub struct ChannelBridge {
    sender: Sender<BridgeMessage>,
}

impl ChannelBridge {
    pub fn new(sender: Sender<BridgeMessage>) -> Self {
        Self { sender }
    }
}

impl UiBridge for ChannelBridge {
    fn notify(&self, event: &str, payload: Value) -> Result<(), BridgeError> {
        let message = BridgeMessage {
            event: event.to_string(),
            payload,
        };
        self.sender.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => BridgeError::Full,
            TrySendError::Disconnected(_) => BridgeError::Disconnected,
        })
    }
}

/// Surface that logs the status line.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSurface;

impl NotificationSurface for TracingSurface {
    fn show(&self, id: u32, title: &str, text: &str) {
        tracing::info!("[notification {}] {}: {}", id, title, text);
    }
}

/// Forwards engine events to the attached collaborators.
pub struct Notifier {
    bridge: RwLock<Option<Arc<dyn UiBridge>>>,
    surface: Arc<dyn NotificationSurface>,
}

impl Notifier {
    pub fn new(surface: Arc<dyn NotificationSurface>) -> Self {
        Self {
            bridge: RwLock::new(None),
            surface,
        }
    }

    pub fn with_bridge(surface: Arc<dyn NotificationSurface>, bridge: Arc<dyn UiBridge>) -> Self {
        let notifier = Self::new(surface);
        notifier.attach_bridge(bridge);
        notifier
    }

    /// Connect (or replace) the UI bridge.
    pub fn attach_bridge(&self, bridge: Arc<dyn UiBridge>) {
        *self.bridge.write().unwrap_or_else(|e| e.into_inner()) = Some(bridge);
    }

    /// Disconnect the UI bridge. Later events only reach the notification.
    pub fn detach_bridge(&self) {
        *self.bridge.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn has_bridge(&self) -> bool {
        self.bridge
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Publish an event together with the latest daily count.
    pub fn publish(&self, event: EngineEvent, daily_steps: u64) {
        let (name, payload) = match event {
            EngineEvent::StepsChanged(steps) => (STEP_COUNT_EVENT, json!(steps)),
            EngineEvent::ActivityChanged(label) => (ACTIVITY_EVENT, json!(label.as_str())),
        };

        let bridge = self
            .bridge
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(bridge) = bridge {
            if let Err(e) = bridge.notify(name, payload) {
                tracing::warn!("Dropped {} update: {}", name, e);
            }
        }

        self.surface.show(
            NOTIFICATION_ID,
            NOTIFICATION_TITLE,
            &format!("{daily_steps} steps today"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSurface {
        shown: Mutex<Vec<(u32, String)>>,
    }

    impl NotificationSurface for RecordingSurface {
        fn show(&self, id: u32, _title: &str, text: &str) {
            self.shown.lock().unwrap().push((id, text.to_string()));
        }
    }

    #[test]
    fn test_publish_reaches_bridge_and_surface() {
        let (tx, rx) = bounded(8);
        let surface = Arc::new(RecordingSurface::default());
        let notifier = Notifier::with_bridge(surface.clone(), Arc::new(ChannelBridge::new(tx)));

        notifier.publish(EngineEvent::StepsChanged(42), 42);
        notifier.publish(EngineEvent::ActivityChanged(ActivityLabel::Running), 42);

        let first = rx.try_recv().unwrap();
        assert_eq!(first.event, STEP_COUNT_EVENT);
        assert_eq!(first.payload, json!(42));
        let second = rx.try_recv().unwrap();
        assert_eq!(second.event, ACTIVITY_EVENT);
        assert_eq!(second.payload, json!("running"));

        let shown = surface.shown.lock().unwrap();
        assert_eq!(shown.len(), 2);
        assert_eq!(shown[0], (NOTIFICATION_ID, "42 steps today".to_string()));
    }

    #[test]
    fn test_disconnected_bridge_does_not_fail() {
        let (tx, rx) = bounded(1);
        drop(rx);
        let surface = Arc::new(RecordingSurface::default());
        let notifier = Notifier::with_bridge(surface.clone(), Arc::new(ChannelBridge::new(tx)));

        notifier.publish(EngineEvent::StepsChanged(1), 1);
        assert_eq!(surface.shown.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_full_bridge_drops_update() {
        let (tx, rx) = bounded(1);
        let bridge = ChannelBridge::new(tx);
        bridge.notify(STEP_COUNT_EVENT, json!(1)).unwrap();
        assert!(matches!(
            bridge.notify(STEP_COUNT_EVENT, json!(2)),
            Err(BridgeError::Full)
        ));
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn test_detach_bridge() {
        let (tx, rx) = bounded(8);
        let notifier = Notifier::with_bridge(Arc::new(TracingSurface), Arc::new(ChannelBridge::new(tx)));
        assert!(notifier.has_bridge());

        notifier.detach_bridge();
        notifier.publish(EngineEvent::StepsChanged(3), 3);
        assert!(!notifier.has_bridge());
        assert!(rx.try_recv().is_err());
    }
}
