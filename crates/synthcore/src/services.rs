//! Contracts for the collaborators the engine calls out to: the text
//! generation backend, the prompt template store, and workflow
//! persistence.

use crate::value::Value;
use crate::{GenerationError, NodeError, StoreError, WorkflowDefinition, WorkflowId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sampling parameters; unset fields fall back to whatever they are
/// merged over.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GenerationParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl GenerationParameters {
    /// `overrides` wins field by field.
    pub fn merged_with(&self, overrides: &GenerationParameters) -> GenerationParameters {
        GenerationParameters {
            temperature: overrides.temperature.or(self.temperature),
            top_p: overrides.top_p.or(self.top_p),
            max_tokens: overrides.max_tokens.or(self.max_tokens),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationRequest {
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub parameters: GenerationParameters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GenerationResponse {
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<Value>>,
}

/// Remote text-completion backend.
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, GenerationError>;
}

/// A stored prompt template with named `{slot}` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptTemplate {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slots: Vec<String>,
    pub user_prompt: String,
    #[serde(default)]
    pub system_prompt: String,
    pub model: String,
    #[serde(default)]
    pub model_parameters: GenerationParameters,
    #[serde(default)]
    pub is_tool_calling: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_definitions: Option<Vec<Value>>,
}

#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Returns `NodeError::NotFound` for an unknown id.
    async fn get_template(&self, id: &str) -> Result<PromptTemplate, NodeError>;
}

/// A persisted workflow definition with its optimistic-concurrency version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredWorkflow {
    pub id: WorkflowId,
    pub name: String,
    pub description: Option<String>,
    pub data: WorkflowDefinition,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields to change on update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub data: Option<WorkflowDefinition>,
}

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn create(
        &self,
        name: String,
        description: Option<String>,
        data: WorkflowDefinition,
    ) -> Result<StoredWorkflow, StoreError>;

    async fn get(&self, id: WorkflowId) -> Result<StoredWorkflow, StoreError>;

    /// Applies `patch` only if the stored version equals
    /// `expected_version`; otherwise returns `StoreError::Conflict` and
    /// leaves the record untouched.
    async fn update(
        &self,
        id: WorkflowId,
        patch: WorkflowPatch,
        expected_version: u64,
    ) -> Result<StoredWorkflow, StoreError>;

    async fn delete(&self, id: WorkflowId) -> Result<(), StoreError>;

    /// One page (zero-based) of workflows plus the total count.
    async fn list(&self, page: usize, size: usize) -> Result<(Vec<StoredWorkflow>, usize), StoreError>;
}
