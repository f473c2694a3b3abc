//! Assembles each node's inputs from completed upstream outputs.

use std::collections::HashMap;
use synthcore::value::OUTPUT_KEY;
use synthcore::{Connection, NodeConfig, NodeId, NodeInputs, OutputMap, Value, WorkflowDefinition};

/// Seed field mirrored into an input node's `output` and `inputs[0]`.
pub const SEED_TEXT_FIELD: &str = "template_output";

/// Handle names that would collide with the fixed fields of `NodeInputs`.
const RESERVED_HANDLES: [&str; 3] = ["inputs", "input", "seed"];

/// Outputs of nodes that completed successfully in the current run.
pub type CompletedOutputs = HashMap<NodeId, OutputMap>;

pub fn resolve_inputs(
    node: &NodeConfig,
    definition: &WorkflowDefinition,
    completed: &CompletedOutputs,
    seed: &OutputMap,
) -> NodeInputs {
    if node.is_input() {
        return resolve_seed_inputs(seed);
    }

    let mut incoming: Vec<&Connection> = definition
        .connections
        .iter()
        .filter(|c| c.target_node_id == node.id)
        .collect();
    sort_connections(&mut incoming);

    let mut values = Vec::with_capacity(incoming.len());
    let mut handles = OutputMap::new();

    for conn in incoming {
        let Some(source_output) = completed.get(&conn.source_node_id) else {
            tracing::debug!(
                node_id = %node.id,
                source = %conn.source_node_id,
                "Upstream node did not complete, skipping connection"
            );
            continue;
        };

        let value = extract_value(source_output, conn.source_handle());
        if let Some(handle) = conn.target_handle() {
            if !RESERVED_HANDLES.contains(&handle) {
                handles.entry(handle.to_string()).or_insert_with(|| value.clone());
            }
        }
        values.push(value);
    }

    if values.is_empty() {
        tracing::warn!(node_id = %node.id, "No completed upstream inputs, executing with empty inputs");
    }

    let mut inputs = NodeInputs::from_values(values);
    inputs.handles = handles;
    inputs
}

/// Sort by `(source_node_id, source_handle, target_handle)` so positional
/// inputs do not depend on how connections were listed.
pub fn sort_connections(connections: &mut [&Connection]) {
    connections.sort_by(|a, b| {
        (a.source_node_id.as_str(), a.source_handle(), a.target_handle().unwrap_or(""))
            .cmp(&(b.source_node_id.as_str(), b.source_handle(), b.target_handle().unwrap_or("")))
    });
}

/// `output[handle]`, else `output["output"]`, else the whole map.
pub fn extract_value(source_output: &OutputMap, handle: &str) -> Value {
    source_output
        .get(handle)
        .or_else(|| source_output.get(OUTPUT_KEY))
        .cloned()
        .unwrap_or_else(|| Value::Object(source_output.clone()))
}

fn resolve_seed_inputs(seed: &OutputMap) -> NodeInputs {
    let mut handles: OutputMap = seed
        .iter()
        .filter(|(key, _)| !RESERVED_HANDLES.contains(&key.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let mut inputs = match seed.get(SEED_TEXT_FIELD) {
        Some(text) => {
            handles.insert(OUTPUT_KEY.to_string(), text.clone());
            NodeInputs::from_values(vec![text.clone()])
        }
        None => NodeInputs::default(),
    };
    inputs.handles = handles;
    inputs.seed = Some(seed.clone());
    inputs
}
