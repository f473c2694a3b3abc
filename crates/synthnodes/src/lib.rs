//! Standard node library
//!
//! Executors for the built-in node types plus the HTTP client for the
//! generation backend they call.

mod boundary;
mod generation;
mod model;
pub mod prompt;
mod template;
mod text;
pub mod tool_calls;
mod transform;

pub use boundary::{InputNode, OutputNode};
pub use generation::HttpGenerationService;
pub use model::{ModelNode, MODEL_SYSTEM_PROMPT};
pub use template::TemplateNode;
pub use text::TextNode;
pub use transform::TransformNode;

use std::sync::Arc;
use synthcore::{GenerationParameters, GenerationService, NodeError, SynthError, TemplateStore};
use synthruntime::{Config, NodeRegistry, SynthRuntime};

/// Collaborators shared by the generation-backed nodes
#[derive(Clone)]
pub struct NodeServices {
    pub generator: Arc<dyn GenerationService>,
    pub templates: Arc<dyn TemplateStore>,
    /// Parameters every model call starts from
    pub defaults: GenerationParameters,
}

impl NodeServices {
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

/// Register all standard nodes with a registry
pub fn register_all(registry: &mut NodeRegistry, services: &NodeServices) {
    registry.register(Arc::new(boundary::InputNodeFactory));
    registry.register(Arc::new(boundary::OutputNodeFactory));
    registry.register(Arc::new(text::TextNodeFactory));
    registry.register(Arc::new(transform::TransformNodeFactory));
    registry.register(Arc::new(model::ModelNodeFactory::new(
        services.generator.clone(),
        services.defaults.clone(),
    )));
    registry.register(Arc::new(template::TemplateNodeFactory::new(
        services.generator.clone(),
        services.templates.clone(),
        services.defaults.clone(),
    )));
}

/// Registry holding every standard node type
pub fn standard_registry(services: &NodeServices) -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    register_all(&mut registry, services);
    registry
}

/// Runtime wired to the HTTP generation backend described by `config`
pub fn build_runtime(config: &Config, templates: Arc<dyn TemplateStore>) -> Result<SynthRuntime, SynthError> {
    let generator = HttpGenerationService::new(&config.generation).map_err(NodeError::from)?;
    let services = NodeServices::new(Arc::new(generator), templates, config.generation.defaults.clone());
    let registry = standard_registry(&services);
    tracing::info!(node_types = registry.list_node_types().len(), "Runtime initialized with standard nodes");
    Ok(SynthRuntime::with_registry(Arc::new(registry), config.runtime.clone()))
}
