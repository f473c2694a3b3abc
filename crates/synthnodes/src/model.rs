use crate::prompt::compose_model_prompt;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use synthcore::value::OUTPUT_KEY;
use synthcore::{
    node_types, GenerationParameters, GenerationRequest, GenerationService, Node, NodeConfig, NodeContext,
    NodeError, NodeOutput,
};
use synthruntime::{NodeFactory, NodeMetadata};

/// System instruction sent with every model node prompt.
pub const MODEL_SYSTEM_PROMPT: &str =
    "You are a helpful assistant generating data for a fine-tuning dataset. Follow the instructions exactly.";

#[derive(Debug, Deserialize)]
struct ModelSettings {
    model: String,
    #[serde(default)]
    model_instruction: String,
    #[serde(default)]
    model_parameters: GenerationParameters,
}

/// Sends a prompt composed from `model_instruction` and the resolved inputs
pub struct ModelNode {
    generator: Arc<dyn GenerationService>,
    defaults: GenerationParameters,
}

impl ModelNode {
    pub fn new(generator: Arc<dyn GenerationService>, defaults: GenerationParameters) -> Self {
        Self { generator, defaults }
    }
}

#[async_trait]
impl Node for ModelNode {
    fn node_type(&self) -> &str {
        node_types::MODEL
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let settings: ModelSettings = ctx.settings()?;
        let prompt = compose_model_prompt(&settings.model_instruction, &ctx.inputs.inputs);

        tracing::debug!(node_id = %ctx.node_id, model = %settings.model, prompt_len = prompt.len(), "Calling model");
        let response = self
            .generator
            .generate(GenerationRequest {
                model: settings.model.clone(),
                system_prompt: MODEL_SYSTEM_PROMPT.to_string(),
                user_prompt: prompt.clone(),
                parameters: self.defaults.merged_with(&settings.model_parameters),
                tools: None,
            })
            .await?;

        Ok(NodeOutput::new()
            .with_output(OUTPUT_KEY, response.response)
            .with_output("prompt", prompt)
            .with_output("model", settings.model))
    }

    fn validate_config(&self, config: &NodeConfig) -> Result<(), NodeError> {
        match config.fields.get("model").and_then(|m| m.as_str()) {
            Some(model) if !model.trim().is_empty() => Ok(()),
            _ => Err(NodeError::Configuration(format!("model node '{}' has no model", config.id))),
        }
    }
}

pub struct ModelNodeFactory {
    generator: Arc<dyn GenerationService>,
    defaults: GenerationParameters,
}

impl ModelNodeFactory {
    pub fn new(generator: Arc<dyn GenerationService>, defaults: GenerationParameters) -> Self {
        Self { generator, defaults }
    }
}

impl NodeFactory for ModelNodeFactory {
    fn create(&self, _config: &NodeConfig) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(ModelNode::new(self.generator.clone(), self.defaults.clone())))
    }

    fn node_type(&self) -> &str {
        node_types::MODEL
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Prompt a model with {input_N} placeholders".to_string(),
            category: "generation".to_string(),
        }
    }
}
