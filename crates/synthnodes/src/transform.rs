use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use synthcore::value::{coerce_to_string, OUTPUT_KEY};
use synthcore::{node_types, Node, NodeConfig, NodeContext, NodeError, NodeOutput, OutputMap, Value};
use synthruntime::{NodeFactory, NodeMetadata};

fn default_field() -> String {
    OUTPUT_KEY.to_string()
}

#[derive(Debug, Deserialize)]
struct TransformSettings {
    #[serde(default)]
    pattern: String,
    #[serde(default)]
    replacement: String,
    #[serde(default)]
    is_regex: bool,
    #[serde(default = "default_field")]
    apply_to_field: String,
}

impl TransformSettings {
    /// Returns the rewritten text and the number of replacements made.
    fn apply(&self, text: &str) -> Result<(String, usize), NodeError> {
        if self.pattern.is_empty() {
            return Ok((text.to_string(), 0));
        }
        if !self.is_regex {
            let count = text.matches(self.pattern.as_str()).count();
            return Ok((text.replace(&self.pattern, &self.replacement), count));
        }

        let re = Regex::new(&self.pattern)
            .map_err(|e| NodeError::Configuration(format!("Invalid regex '{}': {}", self.pattern, e)))?;
        let count = re.find_iter(text).count();
        Ok((re.replace_all(text, self.replacement.as_str()).into_owned(), count))
    }
}

/// Literal or regex replacement over one field of the upstream output
pub struct TransformNode;

#[async_trait]
impl Node for TransformNode {
    fn node_type(&self) -> &str {
        node_types::TRANSFORM
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let settings: TransformSettings = ctx.settings()?;
        let field = settings.apply_to_field.as_str();

        let original = match ctx.inputs.lookup(field) {
            Some(value) => coerce_to_string(value),
            None => {
                tracing::warn!(node_id = %ctx.node_id, field, "Field not found in inputs, transforming empty text");
                String::new()
            }
        };
        let (transformed, replacements) = settings.apply(&original)?;

        let mut outputs: OutputMap = match &ctx.inputs.input {
            Value::Object(upstream) => upstream.clone(),
            Value::Null => OutputMap::new(),
            plain => OutputMap::from_iter([(OUTPUT_KEY.to_string(), plain.clone())]),
        };
        outputs.insert(field.to_string(), Value::String(transformed.clone()));
        if field == OUTPUT_KEY || !outputs.contains_key(OUTPUT_KEY) {
            outputs.insert(OUTPUT_KEY.to_string(), Value::String(transformed));
        }
        outputs.insert(
            "transformation".to_string(),
            json!({
                "pattern": settings.pattern,
                "replacement": settings.replacement,
                "is_regex": settings.is_regex,
                "field": field,
                "replacements": replacements,
            }),
        );

        Ok(NodeOutput::from_map(outputs))
    }
}

pub struct TransformNodeFactory;

impl NodeFactory for TransformNodeFactory {
    fn create(&self, _config: &NodeConfig) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(TransformNode))
    }

    fn node_type(&self) -> &str {
        node_types::TRANSFORM
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Find and replace on a field, literal or regex".to_string(),
            category: "transform".to_string(),
        }
    }
}
