//! Core abstractions for the dataset workflow engine
//!
//! This crate provides the data model, the node contract, progress events
//! and the collaborator traits that all other components depend on.

mod error;
pub mod events;
mod node;
mod result;
mod services;
pub mod value;
mod workflow;

pub use error::{GenerationError, NodeError, StoreError, SynthError, WorkflowError};
pub use events::*;
pub use node::{Node, NodeContext, NodeInputs, NodeOutput};
pub use result::{
    ExecutionMeta, NodeExecutionResult, NodeStatus, OutputNodeSummary, WorkflowExecutionResult, WorkflowStatus,
};
pub use services::{
    GenerationParameters, GenerationRequest, GenerationResponse, GenerationService, PromptTemplate, StoredWorkflow,
    TemplateStore, WorkflowPatch, WorkflowStore,
};
pub use value::{OutputMap, Value};
pub use workflow::{node_types, Connection, NodeConfig, NodeId, WorkflowDefinition, WorkflowId};

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, SynthError>;
