// crates/synthnodes/tests/workflow_test.rs

use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use synthcore::{
    node_types, GenerationError, GenerationParameters, GenerationRequest, GenerationResponse, GenerationService,
    NodeConfig, NodeStatus, OutputMap, PromptTemplate, WorkflowDefinition, WorkflowStatus,
};
use synthnodes::{NodeServices, MODEL_SYSTEM_PROMPT};
use synthruntime::{MemoryTemplateStore, RuntimeConfig, SynthRuntime};

/// Replays canned replies in order and records every request.
#[derive(Default)]
struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<GenerationResponse, GenerationError>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    fn replying(replies: Vec<Result<GenerationResponse, GenerationError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::default(),
        })
    }

    fn text(reply: &str) -> Result<GenerationResponse, GenerationError> {
        Ok(GenerationResponse {
            response: reply.to_string(),
            tool_calls: None,
        })
    }

    fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationService for ScriptedGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, GenerationError> {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GenerationError::Connection("no scripted reply".to_string())))
    }
}

fn defaults() -> GenerationParameters {
    GenerationParameters {
        temperature: Some(0.7),
        top_p: Some(0.9),
        max_tokens: Some(1000),
    }
}

fn tool_template() -> PromptTemplate {
    PromptTemplate {
        id: "search-tpl".to_string(),
        name: "Search".to_string(),
        slots: vec!["topic".to_string()],
        user_prompt: "Find sources about {topic}.".to_string(),
        system_prompt: "You can call tools.".to_string(),
        model: "tool-model".to_string(),
        model_parameters: GenerationParameters {
            max_tokens: Some(200),
            ..Default::default()
        },
        is_tool_calling: true,
        tool_definitions: Some(vec![json!({"type": "function", "function": {"name": "search"}})]),
    }
}

fn runtime(generator: Arc<ScriptedGenerator>) -> SynthRuntime {
    let templates = Arc::new(MemoryTemplateStore::with_templates([tool_template()]));
    let services = NodeServices::new(generator, templates, defaults());
    let registry = synthnodes::standard_registry(&services);
    SynthRuntime::with_registry(Arc::new(registry), RuntimeConfig::default())
}

fn seed(value: serde_json::Value) -> OutputMap {
    value.as_object().cloned().unwrap()
}

#[tokio::test]
async fn test_seed_flows_through_model_to_output() {
    let generator = ScriptedGenerator::replying(vec![ScriptedGenerator::text("a short summary")]);
    let rt = runtime(generator.clone());

    let mut def = WorkflowDefinition::new();
    def.add_node(NodeConfig::new("in", node_types::INPUT));
    def.add_node(
        NodeConfig::new("llm", node_types::MODEL)
            .with_field("model", "small-model")
            .with_field("model_instruction", "Summarize: {input_0}")
            .with_field("model_parameters", json!({"temperature": 0.1})),
    );
    def.add_node(NodeConfig::new("out", node_types::OUTPUT));
    def.connect("in", "llm");
    def.connect("llm", "out");

    let result = rt
        .execute(None, &def, seed(json!({"template_output": "hello world"})))
        .await;

    assert_eq!(result.status, WorkflowStatus::Success);
    assert_eq!(result.final_output["output"], json!("a short summary"));
    assert_eq!(result.meta.final_node.as_deref(), Some("out"));

    let requests = generator.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].user_prompt, "Summarize: hello world");
    assert_eq!(requests[0].system_prompt, MODEL_SYSTEM_PROMPT);
    assert_eq!(requests[0].model, "small-model");
    assert_eq!(requests[0].parameters.temperature, Some(0.1));
    assert_eq!(requests[0].parameters.max_tokens, Some(1000));

    let llm = result.result_for("llm").unwrap();
    assert_eq!(llm.output["prompt"], json!("Summarize: hello world"));
}

#[tokio::test]
async fn test_template_node_extracts_tool_calls() {
    let generator = ScriptedGenerator::replying(vec![ScriptedGenerator::text(
        r#"Calling now: {"name": "search", "arguments": {"q": "rust"}}"#,
    )]);
    let rt = runtime(generator.clone());

    let mut def = WorkflowDefinition::new();
    def.add_node(NodeConfig::new("in", node_types::INPUT));
    def.add_node(
        NodeConfig::new("tpl", node_types::TEMPLATE)
            .with_field("template_id", "search-tpl")
            .with_field("instruction", "Prefer primary sources."),
    );
    def.connect("in", "tpl").from_handle("topic").to_handle("topic");

    let result = rt.execute(None, &def, seed(json!({"topic": "rust"}))).await;
    assert_eq!(result.status, WorkflowStatus::Success);

    let tpl = result.result_for("tpl").unwrap();
    assert_eq!(tpl.output["tool_calls"], json!([{"name": "search", "arguments": {"q": "rust"}}]));
    assert_eq!(tpl.output["template_id"], json!("search-tpl"));

    let request = &generator.requests()[0];
    assert_eq!(request.user_prompt, "Find sources about rust.");
    assert_eq!(request.system_prompt, "You can call tools.\n\nPrefer primary sources.");
    assert_eq!(request.model, "tool-model");
    assert_eq!(request.parameters.max_tokens, Some(200));
    assert_eq!(request.parameters.temperature, Some(0.7));
    assert_eq!(request.tools.as_ref().map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_template_reports_missing_slots() {
    let generator = ScriptedGenerator::replying(vec![]);
    let rt = runtime(generator.clone());

    let mut def = WorkflowDefinition::new();
    def.add_node(NodeConfig::new("tpl", node_types::TEMPLATE).with_field("template_id", "search-tpl"));

    let result = rt.execute(None, &def, OutputMap::new()).await;

    assert_eq!(result.status, WorkflowStatus::Error);
    let tpl = result.result_for("tpl").unwrap();
    assert_eq!(tpl.status, NodeStatus::Error);
    assert!(tpl.error_message.as_deref().unwrap().contains("topic"));
    assert!(generator.requests().is_empty());
    assert!(result.final_output.contains_key("_error"));
}

#[tokio::test]
async fn test_unknown_template_fails_node() {
    let rt = runtime(ScriptedGenerator::replying(vec![]));

    let mut def = WorkflowDefinition::new();
    def.add_node(NodeConfig::new("tpl", node_types::TEMPLATE).with_field("template_id", "nope"));

    let result = rt.execute(None, &def, OutputMap::new()).await;
    let tpl = result.result_for("tpl").unwrap();
    assert!(tpl.error_message.as_deref().unwrap().contains("nope"));
}

#[tokio::test]
async fn test_generation_failure_is_partial_success() {
    let generator = ScriptedGenerator::replying(vec![Err(GenerationError::UpstreamStatus {
        status: 503,
        body: "overloaded".to_string(),
    })]);
    let rt = runtime(generator);

    let mut def = WorkflowDefinition::new();
    def.add_node(NodeConfig::new("txt", node_types::TEXT).with_field("text_content", "source text"));
    def.add_node(NodeConfig::new("llm", node_types::MODEL).with_field("model", "m"));
    def.add_node(NodeConfig::new("out", node_types::OUTPUT));
    def.connect("txt", "llm");
    def.connect("llm", "out");

    let result = rt.execute(None, &def, OutputMap::new()).await;

    assert_eq!(result.status, WorkflowStatus::PartialSuccess);
    let llm = result.result_for("llm").unwrap();
    assert!(llm.error_message.as_deref().unwrap().contains("503"));
    // out still runs with no inputs
    assert_eq!(result.result_for("out").unwrap().status, NodeStatus::Success);
}

#[tokio::test]
async fn test_model_without_model_name_is_rejected() {
    let generator = ScriptedGenerator::replying(vec![]);
    let rt = runtime(generator.clone());

    let mut def = WorkflowDefinition::new();
    def.add_node(NodeConfig::new("llm", node_types::MODEL).with_field("model_instruction", "Hi"));

    let result = rt.execute(None, &def, OutputMap::new()).await;
    assert_eq!(result.status, WorkflowStatus::Error);
    assert!(generator.requests().is_empty());
}

#[tokio::test]
async fn test_text_and_transform_chain() {
    let rt = runtime(ScriptedGenerator::replying(vec![]));

    let mut def = WorkflowDefinition::new();
    def.add_node(NodeConfig::new("txt", node_types::TEXT).with_field("text_content", "Question: 2+2?"));
    def.add_node(
        NodeConfig::new("fix", node_types::TRANSFORM)
            .with_field("pattern", r"^Question:\s*")
            .with_field("replacement", "Q: ")
            .with_field("is_regex", true),
    );
    def.add_node(NodeConfig::new("out", node_types::OUTPUT));
    def.connect("txt", "fix");
    def.connect("fix", "out");

    let result = rt.execute(None, &def, OutputMap::new()).await;

    assert_eq!(result.status, WorkflowStatus::Success);
    assert_eq!(result.final_output["output"], json!("Q: 2+2?"));
    assert_eq!(result.output_node_results.len(), 1);
}
