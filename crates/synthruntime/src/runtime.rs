use crate::config::RuntimeConfig;
use crate::executor::{ExecutionStream, WorkflowExecutor};
use crate::registry::NodeRegistry;
use crate::store::MemoryWorkflowStore;
use std::sync::Arc;
use synthcore::{
    OutputMap, ProgressEvent, SynthError, WorkflowDefinition, WorkflowExecutionResult, WorkflowId, WorkflowStore,
};

/// Main runtime for executing workflows
pub struct SynthRuntime {
    registry: Arc<NodeRegistry>,
    executor: WorkflowExecutor,
    store: Arc<dyn WorkflowStore>,
    config: RuntimeConfig,
}

impl SynthRuntime {
    /// Create a new runtime with a pre-configured registry and an
    /// in-memory workflow store
    pub fn with_registry(registry: Arc<NodeRegistry>, config: RuntimeConfig) -> Self {
        Self::with_store(registry, Arc::new(MemoryWorkflowStore::new()), config)
    }

    pub fn with_store(registry: Arc<NodeRegistry>, store: Arc<dyn WorkflowStore>, config: RuntimeConfig) -> Self {
        let executor = WorkflowExecutor::new(registry.clone(), &config);
        Self {
            registry,
            executor,
            store,
            config,
        }
    }

    /// Get access to the node registry
    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn WorkflowStore> {
        &self.store
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Execute a definition directly (without persistence)
    pub async fn execute(
        &self,
        workflow_id: Option<WorkflowId>,
        definition: &WorkflowDefinition,
        seed: OutputMap,
    ) -> WorkflowExecutionResult {
        self.executor.execute(workflow_id, definition, seed).await
    }

    pub async fn execute_with_progress<F>(
        &self,
        workflow_id: Option<WorkflowId>,
        definition: WorkflowDefinition,
        seed: OutputMap,
        on_progress: F,
    ) -> Result<WorkflowExecutionResult, SynthError>
    where
        F: FnMut(ProgressEvent) + Send,
    {
        self.executor
            .execute_with_progress(workflow_id, definition, seed, on_progress)
            .await
    }

    pub fn spawn_streaming(
        &self,
        workflow_id: Option<WorkflowId>,
        definition: WorkflowDefinition,
        seed: OutputMap,
    ) -> ExecutionStream {
        self.executor.spawn_streaming(workflow_id, definition, seed)
    }

    /// Execute a persisted workflow by ID
    pub async fn execute_stored(
        &self,
        workflow_id: WorkflowId,
        seed: OutputMap,
    ) -> Result<WorkflowExecutionResult, SynthError> {
        let workflow = self.store.get(workflow_id).await?;
        Ok(self.executor.execute(Some(workflow.id), &workflow.data, seed).await)
    }
}
