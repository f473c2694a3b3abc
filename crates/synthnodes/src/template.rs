use crate::prompt::fill_slots;
use crate::tool_calls::{normalize_native, parse_tool_calls, ToolCall};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use synthcore::value::OUTPUT_KEY;
use synthcore::{
    node_types, GenerationParameters, GenerationRequest, GenerationResponse, GenerationService, Node, NodeConfig,
    NodeContext, NodeError, NodeOutput, TemplateStore, Value,
};
use synthruntime::{NodeFactory, NodeMetadata};

#[derive(Debug, Deserialize)]
struct TemplateSettings {
    template_id: String,
    #[serde(default)]
    instruction: Option<String>,
    #[serde(default)]
    model_parameters: GenerationParameters,
}

/// Fills a stored prompt template from the resolved inputs and calls the
/// generation service.
pub struct TemplateNode {
    generator: Arc<dyn GenerationService>,
    templates: Arc<dyn TemplateStore>,
    defaults: GenerationParameters,
}

impl TemplateNode {
    pub fn new(
        generator: Arc<dyn GenerationService>,
        templates: Arc<dyn TemplateStore>,
        defaults: GenerationParameters,
    ) -> Self {
        Self {
            generator,
            templates,
            defaults,
        }
    }
}

fn system_prompt(base: &str, instruction: Option<&str>) -> String {
    match instruction.map(str::trim).filter(|i| !i.is_empty()) {
        Some(extra) if base.is_empty() => extra.to_string(),
        Some(extra) => format!("{}\n\n{}", base, extra),
        None => base.to_string(),
    }
}

/// Native calls win; otherwise parse the text. `Null` when neither yields any.
fn extract_tool_calls(response: &GenerationResponse) -> Value {
    let calls: Option<Vec<ToolCall>> = response
        .tool_calls
        .as_deref()
        .map(normalize_native)
        .filter(|calls| !calls.is_empty())
        .or_else(|| parse_tool_calls(&response.response));

    match calls {
        Some(calls) => Value::Array(calls.iter().map(ToolCall::to_value).collect()),
        None => Value::Null,
    }
}

#[async_trait]
impl Node for TemplateNode {
    fn node_type(&self) -> &str {
        node_types::TEMPLATE
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let settings: TemplateSettings = ctx.settings()?;
        let template = self.templates.get_template(&settings.template_id).await?;

        let mut resolved = Vec::with_capacity(template.slots.len());
        let mut missing = Vec::new();
        for slot in &template.slots {
            match ctx.inputs.lookup(slot).or_else(|| ctx.inputs.find_in_objects(slot)) {
                Some(value) => resolved.push((slot.as_str(), value)),
                None => missing.push(slot.as_str()),
            }
        }
        if !missing.is_empty() {
            return Err(NodeError::MissingInput(format!(
                "template '{}' slots: {}",
                template.id,
                missing.join(", ")
            )));
        }

        let prompt = fill_slots(&template.user_prompt, resolved);
        let parameters = self
            .defaults
            .merged_with(&template.model_parameters)
            .merged_with(&settings.model_parameters);

        tracing::debug!(
            node_id = %ctx.node_id,
            template_id = %template.id,
            model = %template.model,
            "Calling model with template"
        );
        let response = self
            .generator
            .generate(GenerationRequest {
                model: template.model.clone(),
                system_prompt: system_prompt(&template.system_prompt, settings.instruction.as_deref()),
                user_prompt: prompt.clone(),
                parameters,
                tools: template.is_tool_calling.then(|| template.tool_definitions.clone()).flatten(),
            })
            .await?;

        let tool_calls = if template.is_tool_calling {
            let calls = extract_tool_calls(&response);
            if calls.is_null() {
                tracing::warn!(node_id = %ctx.node_id, "Tool-calling template produced no parsable tool calls");
            }
            calls
        } else {
            Value::Null
        };

        Ok(NodeOutput::new()
            .with_output(OUTPUT_KEY, response.response)
            .with_output("tool_calls", tool_calls)
            .with_output("template_id", template.id)
            .with_output("prompt", prompt))
    }

    fn validate_config(&self, config: &NodeConfig) -> Result<(), NodeError> {
        match config.fields.get("template_id").and_then(|t| t.as_str()) {
            Some(id) if !id.is_empty() => Ok(()),
            _ => Err(NodeError::Configuration(format!("template node '{}' has no template_id", config.id))),
        }
    }
}

pub struct TemplateNodeFactory {
    generator: Arc<dyn GenerationService>,
    templates: Arc<dyn TemplateStore>,
    defaults: GenerationParameters,
}

impl TemplateNodeFactory {
    pub fn new(
        generator: Arc<dyn GenerationService>,
        templates: Arc<dyn TemplateStore>,
        defaults: GenerationParameters,
    ) -> Self {
        Self {
            generator,
            templates,
            defaults,
        }
    }
}

impl NodeFactory for TemplateNodeFactory {
    fn create(&self, _config: &NodeConfig) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(TemplateNode::new(
            self.generator.clone(),
            self.templates.clone(),
            self.defaults.clone(),
        )))
    }

    fn node_type(&self) -> &str {
        node_types::TEMPLATE
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Fill a stored prompt template and call its model".to_string(),
            category: "generation".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn instruction_extends_system_prompt() {
        assert_eq!(system_prompt("Be brief.", Some("Use French.")), "Be brief.\n\nUse French.");
        assert_eq!(system_prompt("", Some("Use French.")), "Use French.");
        assert_eq!(system_prompt("Be brief.", Some("  ")), "Be brief.");
        assert_eq!(system_prompt("Be brief.", None), "Be brief.");
    }

    #[test]
    fn native_tool_calls_take_precedence() {
        let response = GenerationResponse {
            response: r#"{"name": "text_call", "arguments": {}}"#.to_string(),
            tool_calls: Some(vec![json!({"function": {"name": "native", "arguments": "{\"x\": 1}"}})]),
        };
        assert_eq!(extract_tool_calls(&response), json!([{"name": "native", "arguments": {"x": 1}}]));
    }

    #[test]
    fn unparsable_text_yields_null() {
        let response = GenerationResponse {
            response: "no tools here".to_string(),
            tool_calls: None,
        };
        assert_eq!(extract_tool_calls(&response), Value::Null);
    }
}
