//! Graph boundary nodes: where seed data enters and results leave.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use synthcore::value::OUTPUT_KEY;
use synthcore::{node_types, Node, NodeConfig, NodeContext, NodeError, NodeOutput, Value};
use synthruntime::{NodeFactory, NodeMetadata};

/// Passes the seed payload through; its `template_output` field (already
/// lifted to `output` by the resolver) becomes this node's `output`.
pub struct InputNode;

#[async_trait]
impl Node for InputNode {
    fn node_type(&self) -> &str {
        node_types::INPUT
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let mut outputs = ctx.inputs.handles;
        if !outputs.contains_key(OUTPUT_KEY) {
            tracing::warn!(node_id = %ctx.node_id, "No seed text supplied, input node emits an empty string");
            outputs.insert(OUTPUT_KEY.to_string(), Value::String(String::new()));
        }
        Ok(NodeOutput::from_map(outputs))
    }
}

pub struct InputNodeFactory;

impl NodeFactory for InputNodeFactory {
    fn create(&self, _config: &NodeConfig) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(InputNode))
    }

    fn node_type(&self) -> &str {
        node_types::INPUT
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Entry point fed from the seed payload".to_string(),
            category: "boundary".to_string(),
        }
    }
}

/// Forwards its first resolved input, stamped with run metadata.
pub struct OutputNode;

#[async_trait]
impl Node for OutputNode {
    fn node_type(&self) -> &str {
        node_types::OUTPUT
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let metadata = json!({
            "node_id": ctx.node_id,
            "node_name": ctx.config.name,
            "input_count": ctx.inputs.len(),
            "completed_at": Utc::now().to_rfc3339(),
        });

        Ok(NodeOutput::new()
            .with_output(OUTPUT_KEY, ctx.inputs.input)
            .with_output("metadata", metadata))
    }
}

pub struct OutputNodeFactory;

impl NodeFactory for OutputNodeFactory {
    fn create(&self, _config: &NodeConfig) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(OutputNode))
    }

    fn node_type(&self) -> &str {
        node_types::OUTPUT
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Collects a workflow result".to_string(),
            category: "boundary".to_string(),
        }
    }
}
