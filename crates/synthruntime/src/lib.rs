//! Workflow execution runtime
//!
//! This crate provides the execution engine that analyzes workflow
//! graphs, resolves data flow between nodes, runs them in dependency
//! order and aggregates the outcome, in batch or streaming form.

pub mod aggregate;
mod config;
mod executor;
pub mod graph;
mod registry;
pub mod resolver;
mod runtime;
mod store;

pub use config::{Config, GenerationConfig, RuntimeConfig, ServerConfig};
pub use executor::{ExecutionStream, WorkflowExecutor};
pub use graph::{DependencyGraph, ExecutionOrder};
pub use registry::{NodeFactory, NodeMetadata, NodeRegistry};
pub use runtime::SynthRuntime;
pub use store::{MemoryTemplateStore, MemoryWorkflowStore};
