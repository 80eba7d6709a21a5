use crate::domain::event::ActivityEvent;
use crate::domain::ports::ActivityNotifier;
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::info;

type NotifyResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Writes every activity event to the log as structured fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl ActivityNotifier for TracingNotifier {
    async fn notify(&self, event: &ActivityEvent) -> NotifyResult {
        let payload = serde_json::to_string(event)?;
        info!(
            kind = ?event.kind,
            clinic = %event.customer_info.clinic_name,
            step = ?event.step,
            %payload,
            "Activity"
        );
        Ok(())
    }
}

/// Fans events out to any number of in-process subscribers.
///
/// Sending with no subscribers is not an error. Slow subscribers lag and miss
/// the oldest events once `capacity` is exceeded.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<ActivityEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ActivityEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl ActivityNotifier for BroadcastNotifier {
    async fn notify(&self, event: &ActivityEvent) -> NotifyResult {
        // Err only means nobody is listening.
        let _ = self.sender.send(event.clone());
        Ok(())
    }
}
