//! Structured task records, one JSON object per task in the settings store.
//!
//! This is the source of truth for scheduled tasks; the job list is rendered
//! from it.

use crate::codec::TaskDescriptor;
use crate::error::Result;
use bridge_traits::storage::SettingsStore;
use std::sync::Arc;
use tracing::{debug, warn};

pub const TASK_KEY_PREFIX: &str = "mirror.task.";

pub struct TaskRepository {
    store: Arc<dyn SettingsStore>,
}

impl TaskRepository {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self { store }
    }

    fn key(task_id: &str) -> String {
        format!("{}{}", TASK_KEY_PREFIX, task_id)
    }

    pub async fn get(&self, task_id: &str) -> Result<Option<TaskDescriptor>> {
        match self.store.get_string(&Self::key(task_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn save(&self, task: &TaskDescriptor) -> Result<()> {
        task.validate()?;
        let raw = serde_json::to_string(task)?;
        self.store.set_string(&Self::key(&task.task_id), &raw).await?;
        debug!(task_id = %task.task_id, "Saved task");
        Ok(())
    }

    pub async fn delete(&self, task_id: &str) -> Result<()> {
        self.store.delete(&Self::key(task_id)).await?;
        Ok(())
    }

    /// Every stored task, ordered by configuration then name. Unreadable
    /// records are skipped.
    pub async fn list(&self) -> Result<Vec<TaskDescriptor>> {
        let mut tasks = Vec::new();
        for key in self.store.list_keys().await? {
            let Some(task_id) = key.strip_prefix(TASK_KEY_PREFIX) else {
                continue;
            };
            match self.get(task_id).await {
                Ok(Some(task)) => tasks.push(task),
                Ok(None) => {}
                Err(e) => warn!(task_id, error = %e, "Skipping unreadable task record"),
            }
        }
        tasks.sort_by(|a, b| {
            (&a.config_id, &a.task_name, &a.task_id).cmp(&(&b.config_id, &b.task_name, &b.task_id))
        });
        Ok(tasks)
    }
}
