use super::{ProgressEvent, ProgressStatus};
use crate::{NodeExecutionResult, NodeId, WorkflowExecutionResult, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One line of the newline-delimited JSON stream sent to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    Init {
        workflow_id: Option<WorkflowId>,
        total_nodes: usize,
        timestamp: DateTime<Utc>,
    },
    Progress {
        node_id: NodeId,
        status: ProgressStatus,
        progress: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<NodeExecutionResult>,
        timestamp: DateTime<Utc>,
    },
    Complete {
        result: Box<WorkflowExecutionResult>,
        timestamp: DateTime<Utc>,
    },
    Error {
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl StreamMessage {
    pub fn init(workflow_id: Option<WorkflowId>, total_nodes: usize) -> Self {
        StreamMessage::Init {
            workflow_id,
            total_nodes,
            timestamp: Utc::now(),
        }
    }

    pub fn complete(result: WorkflowExecutionResult) -> Self {
        StreamMessage::Complete {
            result: Box::new(result),
            timestamp: Utc::now(),
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        StreamMessage::Error {
            error: error.into(),
            timestamp: Utc::now(),
        }
    }

    /// Serialize as a single NDJSON line, newline included.
    pub fn to_line(&self) -> String {
        encode_line(self)
    }
}

/// Encoding failures become an `error` message, so every line stays valid JSON.
fn encode_line<T: Serialize>(message: &T) -> String {
    let mut line = serde_json::to_string(message).unwrap_or_else(|e| {
        let fallback = StreamMessage::error(format!("failed to encode stream message: {}", e));
        serde_json::to_string(&fallback).unwrap_or_else(|_| r#"{"type":"error"}"#.to_string())
    });
    line.push('\n');
    line
}

impl From<ProgressEvent> for StreamMessage {
    fn from(event: ProgressEvent) -> Self {
        StreamMessage::Progress {
            node_id: event.node_id,
            status: event.status,
            progress: event.progress,
            result: event.result,
            timestamp: event.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_are_tagged_and_terminated() {
        let line = StreamMessage::init(None, 3).to_line();
        assert!(line.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(value["type"], "init");
        assert_eq!(value["total_nodes"], 3);
        assert!(value["timestamp"].is_string());
    }

    struct Unencodable;

    impl Serialize for Unencodable {
        fn serialize<S: serde::Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("bad \"value\"\n"))
        }
    }

    #[test]
    fn encode_failure_yields_valid_error_line() {
        let line = encode_line(&Unencodable);
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        let value: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(value["type"], "error");
        assert!(value["error"].as_str().unwrap().contains("bad \"value\""));
    }

    #[test]
    fn progress_event_converts() {
        let event = ProgressEvent {
            node_id: "n1".into(),
            status: ProgressStatus::Running,
            progress: 0.25,
            result: None,
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(StreamMessage::from(event)).unwrap();
        assert_eq!(value["type"], "progress");
        assert_eq!(value["status"], "running");
        assert_eq!(value["progress"], 0.25);
        assert!(value.get("result").is_none());
    }
}
