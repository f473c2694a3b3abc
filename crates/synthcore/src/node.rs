use crate::value::{OutputMap, Value, OUTPUT_KEY};
use crate::{NodeConfig, NodeError, NodeId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Core trait that all executable nodes implement
#[async_trait]
pub trait Node: Send + Sync {
    /// Type discriminant this executor handles (e.g. "model", "transform")
    fn node_type(&self) -> &str;

    /// Execute the node with its resolved inputs
    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError>;

    /// Optional: Validate type-specific configuration before execution
    fn validate_config(&self, _config: &NodeConfig) -> Result<(), NodeError> {
        Ok(())
    }
}

/// Execution context passed to each node
#[derive(Debug, Clone)]
pub struct NodeContext {
    pub node_id: NodeId,

    /// Static configuration for this node
    pub config: NodeConfig,

    /// Values resolved from upstream outputs (or the seed payload)
    pub inputs: NodeInputs,
}

impl NodeContext {
    pub fn new(config: NodeConfig, inputs: NodeInputs) -> Self {
        Self {
            node_id: config.id.clone(),
            config,
            inputs,
        }
    }

    /// Parse the node's type-specific fields into a settings struct
    pub fn settings<T: serde::de::DeserializeOwned>(&self) -> Result<T, NodeError> {
        serde_json::from_value(self.config.fields_value())
            .map_err(|e| NodeError::Configuration(format!("{} node '{}': {}", self.config.node_type, self.node_id, e)))
    }
}

/// Inputs assembled for one node.
///
/// `inputs` is positional and deterministically ordered; `input` is its
/// first element (or an empty string). Values delivered through a named
/// target handle are additionally exposed under that handle name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeInputs {
    pub inputs: Vec<Value>,
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<OutputMap>,
    #[serde(flatten)]
    pub handles: OutputMap,
}

impl Default for NodeInputs {
    fn default() -> Self {
        Self::from_values(Vec::new())
    }
}

impl NodeInputs {
    pub fn from_values(inputs: Vec<Value>) -> Self {
        let input = inputs.first().cloned().unwrap_or_else(|| Value::String(String::new()));
        Self {
            inputs,
            input,
            seed: None,
            handles: OutputMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    /// Look up a named field: an explicit handle first, then a key of
    /// the first input when it is an object, and finally the first input
    /// itself when asking for `"output"`.
    pub fn lookup(&self, field: &str) -> Option<&Value> {
        if let Some(value) = self.handles.get(field) {
            return Some(value);
        }
        if let Some(value) = self.input.as_object().and_then(|obj| obj.get(field)) {
            return Some(value);
        }
        if field == OUTPUT_KEY && !self.inputs.is_empty() {
            return Some(&self.input);
        }
        None
    }

    /// Search every object-valued input for `key`, in order.
    pub fn find_in_objects(&self, key: &str) -> Option<&Value> {
        self.inputs
            .iter()
            .filter_map(|v| v.as_object())
            .find_map(|obj| obj.get(key))
    }

    /// Snapshot used in the per-node trace.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Output from node execution
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeOutput {
    pub outputs: OutputMap,
}

impl NodeOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(outputs: OutputMap) -> Self {
        Self { outputs }
    }

    pub fn with_output(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.outputs.insert(key.into(), value.into());
        self
    }

    pub fn output(&self) -> Option<&Value> {
        self.outputs.get(OUTPUT_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_input_is_exposed() {
        let inputs = NodeInputs::from_values(vec![json!("a"), json!("b")]);
        assert_eq!(inputs.input, json!("a"));
        assert_eq!(NodeInputs::default().input, json!(""));
    }

    #[test]
    fn lookup_prefers_handles_then_object_fields() {
        let mut inputs = NodeInputs::from_values(vec![json!({"output": "inner", "topic": "rust"})]);
        assert_eq!(inputs.lookup("topic"), Some(&json!("rust")));
        assert_eq!(inputs.lookup("output"), Some(&json!("inner")));

        inputs.handles.insert("topic".into(), json!("override"));
        assert_eq!(inputs.lookup("topic"), Some(&json!("override")));
        assert_eq!(inputs.lookup("missing"), None);
    }

    #[test]
    fn scalar_first_input_answers_output() {
        let inputs = NodeInputs::from_values(vec![json!("plain text")]);
        assert_eq!(inputs.lookup("output"), Some(&json!("plain text")));
        assert_eq!(NodeInputs::default().lookup("output"), None);
    }
}
