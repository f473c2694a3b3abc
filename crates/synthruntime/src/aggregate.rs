//! Final output selection and overall status.

use crate::resolver::CompletedOutputs;
use synthcore::value::OUTPUT_KEY;
use synthcore::{
    NodeExecutionResult, NodeId, OutputMap, OutputNodeSummary, Value, WorkflowDefinition, WorkflowStatus,
};

pub fn overall_status(results: &[NodeExecutionResult]) -> WorkflowStatus {
    let succeeded = results.iter().filter(|r| r.is_success()).count();
    match succeeded {
        0 => WorkflowStatus::Error,
        n if n == results.len() => WorkflowStatus::Success,
        _ => WorkflowStatus::PartialSuccess,
    }
}

/// `{"output": reason, "_error": reason}`
pub fn diagnostic_output(reason: impl Into<String>) -> OutputMap {
    let reason = reason.into();
    let mut map = OutputMap::new();
    map.insert(OUTPUT_KEY.to_string(), Value::String(reason.clone()));
    map.insert("_error".to_string(), Value::String(reason));
    map
}

/// Pick the run's final output: the designated final node, then the
/// first completed output node, then the last completed node, and only
/// then a diagnostic describing why nothing was produced.
pub fn select_final_output(
    definition: &WorkflowDefinition,
    final_node: Option<&str>,
    results: &[NodeExecutionResult],
    completed: &CompletedOutputs,
) -> OutputMap {
    if let Some(output) = final_node.and_then(|id| completed.get(id)) {
        return output.clone();
    }

    let completed_output_node = results
        .iter()
        .filter(|r| r.is_success())
        .find(|r| definition.find_node(&r.node_id).is_some_and(|n| n.is_output()));
    if let Some(result) = completed_output_node {
        return result.output.clone();
    }

    if let Some(result) = results.iter().rev().find(|r| r.is_success()) {
        return result.output.clone();
    }

    diagnostic_output(failure_reason(definition, results))
}

fn failure_reason(definition: &WorkflowDefinition, results: &[NodeExecutionResult]) -> String {
    if definition.nodes.is_empty() {
        return "Workflow contains no nodes".to_string();
    }
    if !definition.nodes.iter().any(|n| n.is_output()) {
        return format!(
            "Workflow has no output node and none of its {} nodes completed successfully",
            definition.nodes.len()
        );
    }
    let failed: Vec<&str> = results.iter().filter(|r| !r.is_success()).map(|r| r.node_id.as_str()).collect();
    format!("Workflow execution failed: all nodes failed ({})", failed.join(", "))
}

pub fn output_node_summaries(
    definition: &WorkflowDefinition,
    results: &[NodeExecutionResult],
) -> Vec<OutputNodeSummary> {
    results
        .iter()
        .filter(|r| definition.find_node(&r.node_id).is_some_and(|n| n.is_output()))
        .map(|r| OutputNodeSummary {
            node_id: r.node_id.clone(),
            node_name: r.node_name.clone(),
            status: r.status,
            output: r.output.get(OUTPUT_KEY).cloned().unwrap_or(Value::Null),
        })
        .collect()
}

pub fn output_node_ids(definition: &WorkflowDefinition) -> Vec<NodeId> {
    definition.nodes.iter().filter(|n| n.is_output()).map(|n| n.id.clone()).collect()
}

pub fn input_node_ids(definition: &WorkflowDefinition) -> Vec<NodeId> {
    definition.nodes.iter().filter(|n| n.is_input()).map(|n| n.id.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use synthcore::{node_types, NodeConfig, NodeStatus};

    fn result(id: &str, status: NodeStatus, output: Value) -> NodeExecutionResult {
        NodeExecutionResult {
            node_id: id.into(),
            node_type: "text".into(),
            node_name: id.into(),
            input: Value::Null,
            output: output.as_object().cloned().unwrap_or_default(),
            execution_time: 0.0,
            status,
            error_message: None,
        }
    }

    #[test]
    fn status_reflects_success_mix() {
        let ok = result("a", NodeStatus::Success, json!({}));
        let bad = result("b", NodeStatus::Error, json!({}));
        assert_eq!(overall_status(&[ok.clone()]), WorkflowStatus::Success);
        assert_eq!(overall_status(&[ok, bad.clone()]), WorkflowStatus::PartialSuccess);
        assert_eq!(overall_status(&[bad]), WorkflowStatus::Error);
        assert_eq!(overall_status(&[]), WorkflowStatus::Error);
    }

    #[test]
    fn falls_back_to_first_completed_output_node() {
        let mut def = WorkflowDefinition::new();
        def.add_node(NodeConfig::new("a", node_types::TEXT));
        def.add_node(NodeConfig::new("out", node_types::OUTPUT));
        def.add_node(NodeConfig::new("z", node_types::TEXT));

        let results = vec![
            result("a", NodeStatus::Success, json!({"output": "a"})),
            result("out", NodeStatus::Success, json!({"output": "o"})),
            result("z", NodeStatus::Error, json!({})),
        ];
        let final_output = select_final_output(&def, Some("z"), &results, &CompletedOutputs::new());
        assert_eq!(final_output["output"], json!("o"));
    }

    #[test]
    fn falls_back_to_last_completed_node() {
        let mut def = WorkflowDefinition::new();
        def.add_node(NodeConfig::new("a", node_types::TEXT));
        def.add_node(NodeConfig::new("b", node_types::TEXT));
        def.add_node(NodeConfig::new("c", node_types::TEXT));

        let results = vec![
            result("a", NodeStatus::Success, json!({"output": "a"})),
            result("b", NodeStatus::Success, json!({"output": "b"})),
            result("c", NodeStatus::Error, json!({})),
        ];
        let final_output = select_final_output(&def, Some("c"), &results, &CompletedOutputs::new());
        assert_eq!(final_output["output"], json!("b"));
    }

    #[test]
    fn total_failure_yields_diagnostic() {
        let mut def = WorkflowDefinition::new();
        def.add_node(NodeConfig::new("a", node_types::TEXT));
        let results = vec![result("a", NodeStatus::Error, json!({}))];

        let final_output = select_final_output(&def, Some("a"), &results, &CompletedOutputs::new());
        assert!(final_output["_error"].as_str().unwrap().contains("no output node"));
        assert_eq!(final_output["output"], final_output["_error"]);
    }
}
