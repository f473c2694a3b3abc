use async_trait::async_trait;
use serde::Deserialize;
use synthcore::value::OUTPUT_KEY;
use synthcore::{node_types, Node, NodeConfig, NodeContext, NodeError, NodeOutput};
use synthruntime::{NodeFactory, NodeMetadata};

#[derive(Debug, Deserialize)]
struct TextSettings {
    #[serde(default)]
    text_content: String,
}

/// Emits its configured static text
pub struct TextNode;

#[async_trait]
impl Node for TextNode {
    fn node_type(&self) -> &str {
        node_types::TEXT
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let settings: TextSettings = ctx.settings()?;
        Ok(NodeOutput::new().with_output(OUTPUT_KEY, settings.text_content))
    }
}

pub struct TextNodeFactory;

impl NodeFactory for TextNodeFactory {
    fn create(&self, _config: &NodeConfig) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(TextNode))
    }

    fn node_type(&self) -> &str {
        node_types::TEXT
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Static text".to_string(),
            category: "source".to_string(),
        }
    }
}
