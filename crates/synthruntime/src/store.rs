//! In-memory collaborators: workflow persistence with optimistic
//! concurrency, and a prompt template store.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::Path;
use synthcore::{
    NodeError, PromptTemplate, StoreError, StoredWorkflow, SynthError, TemplateStore, WorkflowDefinition,
    WorkflowId, WorkflowPatch, WorkflowStore,
};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryWorkflowStore {
    workflows: RwLock<HashMap<WorkflowId, StoredWorkflow>>,
}

impl MemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn name_taken(workflows: &HashMap<WorkflowId, StoredWorkflow>, name: &str, except: Option<WorkflowId>) -> bool {
    workflows.values().any(|w| w.name == name && Some(w.id) != except)
}

#[async_trait]
impl WorkflowStore for MemoryWorkflowStore {
    async fn create(
        &self,
        name: String,
        description: Option<String>,
        data: WorkflowDefinition,
    ) -> Result<StoredWorkflow, StoreError> {
        let mut workflows = self.workflows.write().await;
        if name_taken(&workflows, &name, None) {
            return Err(StoreError::DuplicateName(name));
        }

        let now = Utc::now();
        let workflow = StoredWorkflow {
            id: Uuid::new_v4(),
            name,
            description,
            data,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        tracing::info!(workflow_id = %workflow.id, name = %workflow.name, "Created workflow");
        workflows.insert(workflow.id, workflow.clone());
        Ok(workflow)
    }

    async fn get(&self, id: WorkflowId) -> Result<StoredWorkflow, StoreError> {
        self.workflows
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn update(
        &self,
        id: WorkflowId,
        patch: WorkflowPatch,
        expected_version: u64,
    ) -> Result<StoredWorkflow, StoreError> {
        let mut workflows = self.workflows.write().await;

        let actual = workflows
            .get(&id)
            .map(|w| w.version)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if actual != expected_version {
            tracing::warn!(workflow_id = %id, expected_version, actual, "Rejected stale workflow update");
            return Err(StoreError::Conflict {
                expected: expected_version,
                actual,
            });
        }
        if let Some(name) = &patch.name {
            if name_taken(&workflows, name, Some(id)) {
                return Err(StoreError::DuplicateName(name.clone()));
            }
        }

        let workflow = workflows
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if let Some(name) = patch.name {
            workflow.name = name;
        }
        if let Some(description) = patch.description {
            workflow.description = Some(description);
        }
        if let Some(data) = patch.data {
            workflow.data = data;
        }
        workflow.version += 1;
        workflow.updated_at = Utc::now();
        Ok(workflow.clone())
    }

    async fn delete(&self, id: WorkflowId) -> Result<(), StoreError> {
        self.workflows
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn list(&self, page: usize, size: usize) -> Result<(Vec<StoredWorkflow>, usize), StoreError> {
        let workflows = self.workflows.read().await;
        let mut all: Vec<&StoredWorkflow> = workflows.values().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));

        let total = all.len();
        let items = all
            .into_iter()
            .skip(page.saturating_mul(size))
            .take(size)
            .cloned()
            .collect();
        Ok((items, total))
    }
}

/// Templates held in memory, keyed by id.
#[derive(Default)]
pub struct MemoryTemplateStore {
    templates: RwLock<HashMap<String, PromptTemplate>>,
}

impl MemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_templates(templates: impl IntoIterator<Item = PromptTemplate>) -> Self {
        let map = templates.into_iter().map(|t| (t.id.clone(), t)).collect();
        Self {
            templates: RwLock::new(map),
        }
    }

    /// Load a JSON array of templates.
    pub fn from_file(path: &Path) -> Result<Self, SynthError> {
        let data = std::fs::read_to_string(path)?;
        let templates: Vec<PromptTemplate> = serde_json::from_str(&data)?;
        tracing::info!(count = templates.len(), path = %path.display(), "Loaded prompt templates");
        Ok(Self::with_templates(templates))
    }

    pub async fn insert(&self, template: PromptTemplate) {
        self.templates.write().await.insert(template.id.clone(), template);
    }
}

#[async_trait]
impl TemplateStore for MemoryTemplateStore {
    async fn get_template(&self, id: &str) -> Result<PromptTemplate, NodeError> {
        self.templates
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| NodeError::NotFound(format!("template '{}'", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patch_name(name: &str) -> WorkflowPatch {
        WorkflowPatch {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn stale_update_is_rejected() {
        let store = MemoryWorkflowStore::new();
        let created = store.create("wf".into(), None, WorkflowDefinition::new()).await.unwrap();
        assert_eq!(created.version, 1);

        let updated = store.update(created.id, patch_name("renamed"), 1).await.unwrap();
        assert_eq!(updated.version, 2);

        let stale = store.update(created.id, patch_name("clobbered"), 1).await;
        assert_eq!(stale, Err(StoreError::Conflict { expected: 1, actual: 2 }));

        let stored = store.get(created.id).await.unwrap();
        assert_eq!(stored.name, "renamed");
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn names_are_unique() {
        let store = MemoryWorkflowStore::new();
        store.create("wf".into(), None, WorkflowDefinition::new()).await.unwrap();
        let other = store.create("other".into(), None, WorkflowDefinition::new()).await.unwrap();

        let duplicate = store.create("wf".into(), None, WorkflowDefinition::new()).await;
        assert_eq!(duplicate, Err(StoreError::DuplicateName("wf".into())));

        let rename = store.update(other.id, patch_name("wf"), 1).await;
        assert_eq!(rename, Err(StoreError::DuplicateName("wf".into())));
    }

    #[tokio::test]
    async fn missing_workflows_are_not_found() {
        let store = MemoryWorkflowStore::new();
        let id = Uuid::new_v4();
        assert!(matches!(store.get(id).await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.delete(id).await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.update(id, WorkflowPatch::default(), 1).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn list_pages_through_workflows() {
        let store = MemoryWorkflowStore::new();
        for i in 0..5 {
            store.create(format!("wf-{}", i), None, WorkflowDefinition::new()).await.unwrap();
        }

        let (first, total) = store.list(0, 2).await.unwrap();
        let (last, _) = store.list(2, 2).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(first.len(), 2);
        assert_eq!(last.len(), 1);
    }

    #[tokio::test]
    async fn unknown_template_is_not_found() {
        let store = MemoryTemplateStore::new();
        assert!(matches!(store.get_template("nope").await, Err(NodeError::NotFound(_))));
    }
}
