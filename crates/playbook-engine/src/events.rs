//! Lifecycle events.
//!
//! The engine writes events to a bounded channel. A slow consumer applies
//! backpressure to the walk; a dropped consumer is ignored.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::playbook::ComponentType;

/// Event emitted while an execution runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    #[serde(rename = "execution:started")]
    ExecutionStarted {
        execution_id: Uuid,
        playbook_id: String,
        at: DateTime<Utc>,
    },
    #[serde(rename = "step:started")]
    StepStarted {
        execution_id: Uuid,
        component_id: String,
        component_type: ComponentType,
        at: DateTime<Utc>,
    },
    #[serde(rename = "step:completed")]
    StepCompleted {
        execution_id: Uuid,
        component_id: String,
        output: Value,
        at: DateTime<Utc>,
    },
    #[serde(rename = "step:failed")]
    StepFailed {
        execution_id: Uuid,
        component_id: String,
        error: String,
        at: DateTime<Utc>,
    },
    #[serde(rename = "execution:completed")]
    ExecutionCompleted {
        execution_id: Uuid,
        at: DateTime<Utc>,
    },
    #[serde(rename = "execution:failed")]
    ExecutionFailed {
        execution_id: Uuid,
        error: String,
        at: DateTime<Utc>,
    },
    #[serde(rename = "execution:cancelled")]
    ExecutionCancelled {
        execution_id: Uuid,
        at: DateTime<Utc>,
    },
}

impl EngineEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ExecutionStarted { .. } => "execution:started",
            Self::StepStarted { .. } => "step:started",
            Self::StepCompleted { .. } => "step:completed",
            Self::StepFailed { .. } => "step:failed",
            Self::ExecutionCompleted { .. } => "execution:completed",
            Self::ExecutionFailed { .. } => "execution:failed",
            Self::ExecutionCancelled { .. } => "execution:cancelled",
        }
    }

    pub fn execution_id(&self) -> Uuid {
        match self {
            Self::ExecutionStarted { execution_id, .. }
            | Self::StepStarted { execution_id, .. }
            | Self::StepCompleted { execution_id, .. }
            | Self::StepFailed { execution_id, .. }
            | Self::ExecutionCompleted { execution_id, .. }
            | Self::ExecutionFailed { execution_id, .. }
            | Self::ExecutionCancelled { execution_id, .. } => *execution_id,
        }
    }
}

/// Sending half of the lifecycle channel.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<EngineEvent>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<EngineEvent>) -> Self {
        Self { tx }
    }

    /// Send an event, waiting for channel capacity.
    pub async fn emit(&self, event: EngineEvent) {
        if let Err(e) = self.tx.send(event).await {
            debug!(event = e.0.event_type(), "Event receiver dropped");
        }
    }
}

/// Create a bounded lifecycle channel.
pub fn channel(capacity: usize) -> (EventSink, mpsc::Receiver<EngineEvent>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSink::new(tx), rx)
}

/// Drain the channel into `tracing` until every sender is gone.
pub fn spawn_event_logger(mut rx: mpsc::Receiver<EngineEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let execution_id = event.execution_id();
            match &event {
                EngineEvent::StepFailed {
                    component_id, error, ..
                } => warn!(
                    event = event.event_type(),
                    execution_id = %execution_id,
                    component_id = %component_id,
                    error = %error,
                    "Playbook event"
                ),
                EngineEvent::ExecutionFailed { error, .. } => warn!(
                    event = event.event_type(),
                    execution_id = %execution_id,
                    error = %error,
                    "Playbook event"
                ),
                EngineEvent::StepStarted { component_id, .. }
                | EngineEvent::StepCompleted { component_id, .. } => debug!(
                    event = event.event_type(),
                    execution_id = %execution_id,
                    component_id = %component_id,
                    "Playbook event"
                ),
                _ => info!(
                    event = event.event_type(),
                    execution_id = %execution_id,
                    "Playbook event"
                ),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_and_receive() {
        let (sink, mut rx) = channel(4);
        let id = Uuid::new_v4();
        sink.emit(EngineEvent::ExecutionCompleted {
            execution_id: id,
            at: Utc::now(),
        })
        .await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "execution:completed");
        assert_eq!(event.execution_id(), id);
    }

    #[tokio::test]
    async fn test_emit_after_receiver_dropped() {
        let (sink, rx) = channel(1);
        drop(rx);
        sink.emit(EngineEvent::ExecutionCancelled {
            execution_id: Uuid::new_v4(),
            at: Utc::now(),
        })
        .await;
    }

    #[test]
    fn test_serialized_tag() {
        let event = EngineEvent::StepFailed {
            execution_id: Uuid::nil(),
            component_id: "block".to_string(),
            error: "boom".to_string(),
            at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "step:failed");
        assert_eq!(json["component_id"], "block");
    }

    #[tokio::test]
    async fn test_logger_stops_when_senders_drop() {
        let (sink, rx) = channel(2);
        let handle = spawn_event_logger(rx);
        sink.emit(EngineEvent::ExecutionStarted {
            execution_id: Uuid::new_v4(),
            playbook_id: "pb".to_string(),
            at: Utc::now(),
        })
        .await;
        drop(sink);
        handle.await.unwrap();
    }
}
