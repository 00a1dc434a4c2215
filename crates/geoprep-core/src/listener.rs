//! Stage completion notifications
//!
//! Delivery is fire-and-forget: `notify` cannot fail and must not block, so a
//! slow or vanished observer never stalls the batch.
use crate::record::StagePayload;
use crate::stage::{Stage, StageStatus};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageEvent {
    pub image: String,
    pub stage: Stage,
    pub status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<StagePayload>,
}

pub trait StageListener: Send + Sync {
    fn notify(&self, event: &StageEvent);
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl StageListener for NoopListener {
    fn notify(&self, _event: &StageEvent) {}
}

/// Emits each event as a `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingListener;

impl StageListener for TracingListener {
    fn notify(&self, event: &StageEvent) {
        match event.status {
            StageStatus::Success => tracing::debug!(
                image = %event.image,
                stage = %event.stage,
                "stage succeeded"
            ),
            StageStatus::Failed => tracing::warn!(
                image = %event.image,
                stage = %event.stage,
                "stage failed"
            ),
        }
    }
}

/// Forwards events to an async consumer, e.g. a progress reporter.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: UnboundedSender<StageEvent>,
}

impl ChannelListener {
    pub fn new(tx: UnboundedSender<StageEvent>) -> Self {
        Self { tx }
    }
}

impl StageListener for ChannelListener {
    fn notify(&self, event: &StageEvent) {
        // A closed receiver only means nobody is watching anymore
        let _ = self.tx.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn event() -> StageEvent {
        StageEvent {
            image: "a.jpg".to_string(),
            stage: Stage::GeotagProcess,
            status: StageStatus::Failed,
            payload: None,
        }
    }

    #[test]
    fn test_channel_listener_forwards() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let listener = ChannelListener::new(tx);

        listener.notify(&event());
        assert_eq!(rx.try_recv().unwrap(), event());
    }

    #[test]
    fn test_channel_listener_ignores_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        ChannelListener::new(tx).notify(&event());
    }
}
