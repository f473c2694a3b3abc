use std::collections::HashMap;
use std::sync::Arc;
use synthcore::{Node, NodeConfig, NodeError, WorkflowError};

/// Factory trait for creating node executors
pub trait NodeFactory: Send + Sync {
    /// Create an executor for the given node configuration
    fn create(&self, config: &NodeConfig) -> Result<Box<dyn Node>, NodeError>;

    /// Type discriminant this factory serves
    fn node_type(&self) -> &str;

    /// Optional: Describe the node type for listings
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::default()
    }
}

/// Metadata about a node type
#[derive(Debug, Clone)]
pub struct NodeMetadata {
    pub description: String,
    pub category: String,
}

impl Default for NodeMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            category: "general".to_string(),
        }
    }
}

/// Registry of available node types, keyed by type discriminant
pub struct NodeRegistry {
    factories: HashMap<String, Arc<dyn NodeFactory>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a node factory, replacing any previous one for its type
    pub fn register(&mut self, factory: Arc<dyn NodeFactory>) {
        let node_type = factory.node_type().to_string();
        tracing::debug!("Registering node type: {}", node_type);
        self.factories.insert(node_type, factory);
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.factories.contains_key(node_type)
    }

    /// Create the executor for a node
    pub fn create_node(&self, config: &NodeConfig) -> Result<Box<dyn Node>, WorkflowError> {
        let factory = self
            .factories
            .get(&config.node_type)
            .ok_or_else(|| WorkflowError::UnknownNodeType(config.node_type.clone()))?;

        factory
            .create(config)
            .map_err(|e| WorkflowError::Validation(format!("Failed to create node '{}': {}", config.id, e)))
    }

    /// All registered node types, sorted
    pub fn list_node_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn get_metadata(&self, node_type: &str) -> Option<NodeMetadata> {
        self.factories.get(node_type).map(|f| f.metadata())
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
