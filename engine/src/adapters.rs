//! Contracts for external system adapters (issue trackers, wikis).
//!
//! The core only consumes these interfaces; concrete HTTP bindings live
//! outside. Adapter failures are carried in the result, never thrown.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Uniform adapter call outcome: failures are data, not errors
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterResult {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
}

impl AdapterResult {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: &str) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
        }
    }
}

/// External task tracker contract
#[async_trait]
pub trait TaskAdapter: Send + Sync {
    fn adapter_name(&self) -> &str;

    async fn create_task(&self, task: Value) -> AdapterResult;
    async fn update_task(&self, task_id: &str, updates: Value) -> AdapterResult;
    async fn transition_task(&self, task_id: &str, target_status: &str) -> AdapterResult;
    async fn get_task(&self, task_id: &str) -> AdapterResult;
    async fn search_tasks(&self, query: &str, limit: u32) -> AdapterResult;
    async fn delete_task(&self, task_id: &str) -> AdapterResult;
    async fn add_comment(&self, task_id: &str, comment: &str) -> AdapterResult;
    async fn get_epic_children(&self, epic_id: &str) -> AdapterResult;
    async fn health_check(&self) -> AdapterResult;
}

/// External document/wiki contract
#[async_trait]
pub trait DocumentAdapter: Send + Sync {
    fn adapter_name(&self) -> &str;

    async fn create_page(&self, page: Value) -> AdapterResult;
    async fn update_page(&self, page_id: &str, updates: Value) -> AdapterResult;
    async fn get_page(&self, page_id: &str) -> AdapterResult;
    async fn delete_page(&self, page_id: &str) -> AdapterResult;
    async fn search_pages(&self, query: &str, limit: u32) -> AdapterResult;
    async fn get_page_children(&self, page_id: &str) -> AdapterResult;
    async fn health_check(&self) -> AdapterResult;
}

/// Registry of named adapters with per-kind defaults
#[derive(Default)]
pub struct AdapterRegistry {
    task_adapters: RwLock<HashMap<String, Arc<dyn TaskAdapter>>>,
    document_adapters: RwLock<HashMap<String, Arc<dyn DocumentAdapter>>>,
    default_task: RwLock<Option<String>>,
    default_document: RwLock<Option<String>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task adapter; the first one becomes the default
    pub fn register_task_adapter(&self, adapter: Arc<dyn TaskAdapter>) {
        let name = adapter.adapter_name().to_string();
        self.task_adapters.write().insert(name.clone(), adapter);
        let mut default = self.default_task.write();
        if default.is_none() {
            *default = Some(name.clone());
        }
        tracing::info!(adapter = %name, "Task adapter registered");
    }

    pub fn register_document_adapter(&self, adapter: Arc<dyn DocumentAdapter>) {
        let name = adapter.adapter_name().to_string();
        self.document_adapters.write().insert(name.clone(), adapter);
        let mut default = self.default_document.write();
        if default.is_none() {
            *default = Some(name.clone());
        }
        tracing::info!(adapter = %name, "Document adapter registered");
    }

    /// Fetch a task adapter by name, or the default with `None`
    pub fn task_adapter(&self, name: Option<&str>) -> Option<Arc<dyn TaskAdapter>> {
        let adapters = self.task_adapters.read();
        match name {
            Some(name) => adapters.get(name).cloned(),
            None => self
                .default_task
                .read()
                .as_ref()
                .and_then(|name| adapters.get(name).cloned()),
        }
    }

    pub fn document_adapter(&self, name: Option<&str>) -> Option<Arc<dyn DocumentAdapter>> {
        let adapters = self.document_adapters.read();
        match name {
            Some(name) => adapters.get(name).cloned(),
            None => self
                .default_document
                .read()
                .as_ref()
                .and_then(|name| adapters.get(name).cloned()),
        }
    }

    pub fn set_default_task_adapter(&self, name: &str) -> bool {
        if self.task_adapters.read().contains_key(name) {
            *self.default_task.write() = Some(name.to_string());
            true
        } else {
            false
        }
    }

    pub fn task_adapter_names(&self) -> Vec<String> {
        self.task_adapters.read().keys().cloned().collect()
    }

    pub fn document_adapter_names(&self) -> Vec<String> {
        self.document_adapters.read().keys().cloned().collect()
    }
}
