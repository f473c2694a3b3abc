use crate::{NodeExecutionResult, NodeId, NodeStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Queued,
    Running,
    Success,
    Error,
}

impl From<NodeStatus> for ProgressStatus {
    fn from(status: NodeStatus) -> Self {
        match status {
            NodeStatus::Success => ProgressStatus::Success,
            NodeStatus::Error => ProgressStatus::Error,
        }
    }
}

/// A per-node progress update emitted during streaming execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressEvent {
    pub node_id: NodeId,
    pub status: ProgressStatus,
    /// Fraction in `[0.0, 1.0]`
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<NodeExecutionResult>,
    pub timestamp: DateTime<Utc>,
}

/// Producer half of the progress queue.
///
/// A disabled emitter drops everything, which is how batch mode shares
/// the streaming loop.
#[derive(Debug, Clone)]
pub struct ProgressEmitter {
    sender: Option<mpsc::Sender<ProgressEvent>>,
}

impl ProgressEmitter {
    pub fn new(sender: mpsc::Sender<ProgressEvent>) -> Self {
        Self { sender: Some(sender) }
    }

    pub fn disabled() -> Self {
        Self { sender: None }
    }

    /// Send an event, waiting for queue capacity. A closed consumer is
    /// not an error for the producer.
    pub async fn emit(&self, event: ProgressEvent) {
        if let Some(sender) = &self.sender {
            if sender.send(event).await.is_err() {
                tracing::debug!("Progress consumer closed, dropping event");
            }
        }
    }

    pub async fn queued(&self, node_id: &str) {
        self.emit(event(node_id, ProgressStatus::Queued, 0.0, None)).await;
    }

    pub async fn running(&self, node_id: &str, progress: f64) {
        self.emit(event(node_id, ProgressStatus::Running, progress, None)).await;
    }

    /// Terminal event carrying the full node result
    pub async fn finished(&self, result: &NodeExecutionResult) {
        let status = ProgressStatus::from(result.status);
        self.emit(event(&result.node_id, status, 1.0, Some(result.clone()))).await;
    }
}

fn event(node_id: &str, status: ProgressStatus, progress: f64, result: Option<NodeExecutionResult>) -> ProgressEvent {
    ProgressEvent {
        node_id: node_id.to_string(),
        status,
        progress,
        result,
        timestamp: Utc::now(),
    }
}
