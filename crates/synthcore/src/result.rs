use crate::value::{OutputMap, Value};
use crate::{NodeId, WorkflowId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Success,
    PartialSuccess,
    Error,
}

/// Outcome of one node in one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeExecutionResult {
    pub node_id: NodeId,
    pub node_type: String,
    pub node_name: String,
    /// Snapshot of the resolved inputs the node was given
    pub input: Value,
    pub output: OutputMap,
    /// Wall-clock seconds spent in the executor
    pub execution_time: f64,
    pub status: NodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl NodeExecutionResult {
    pub fn is_success(&self) -> bool {
        self.status == NodeStatus::Success
    }
}

/// Summary of an `output` node, surfaced separately from the full trace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputNodeSummary {
    pub node_id: NodeId,
    pub node_name: String,
    pub status: NodeStatus,
    pub output: Value,
}

/// Graph analysis diagnostics for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExecutionMeta {
    pub execution_order: Vec<NodeId>,
    pub input_nodes: Vec<NodeId>,
    pub output_nodes: Vec<NodeId>,
    pub isolated_nodes: Vec<NodeId>,
    pub final_node: Option<NodeId>,
    pub has_cycle: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cycle_nodes: Vec<Vec<NodeId>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unknown_node_ids: Vec<NodeId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Aggregated result of a whole run. Built once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowExecutionResult {
    pub workflow_id: Option<WorkflowId>,
    pub results: Vec<NodeExecutionResult>,
    pub seed_data: OutputMap,
    pub final_output: OutputMap,
    pub execution_time: f64,
    pub status: WorkflowStatus,
    pub output_node_results: Vec<OutputNodeSummary>,
    pub meta: ExecutionMeta,
}

impl WorkflowExecutionResult {
    pub fn result_for(&self, node_id: &str) -> Option<&NodeExecutionResult> {
        self.results.iter().find(|r| r.node_id == node_id)
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }
}
