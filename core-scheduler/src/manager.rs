//! # Task Manager
//!
//! List, add, update, toggle and delete scheduled tasks.
//!
//! Tasks live in the [`TaskRepository`] with an explicit `enabled` flag.
//! After every mutation the job list is reconciled with the repository, so
//! the scheduler sees exactly the stored tasks while lines it does not
//! manage stay untouched. Managed lines whose `task_id` the repository does
//! not know yet (older installs, hand-written entries) are adopted into the
//! repository before any mutation.

use crate::codec::{self, CommandTemplate, OperationKind, TaskDescriptor};
use crate::error::{Result, SchedulerError};
use crate::job_list::JobList;
use crate::schedule::normalize_schedule;
use crate::store::TaskRepository;
use std::collections::HashSet;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{info, instrument};
use uuid::Uuid;

/// Parameters for [`TaskManager::add`]
#[derive(Debug, Clone)]
pub struct NewTasks {
    pub task_name: String,
    pub schedule: String,
    /// One task is created per configuration
    pub config_ids: Vec<String>,
    pub operation: OperationKind,
    pub enabled: bool,
}

/// Fields to change in [`TaskManager::update`]; `None` keeps the current value
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub task_name: Option<String>,
    pub schedule: Option<String>,
    /// Positional: the n-th id receives the n-th configuration
    pub config_ids: Option<Vec<String>>,
    pub operation: Option<OperationKind>,
    pub enabled: Option<bool>,
}

pub struct TaskManager {
    repository: TaskRepository,
    job_list: Arc<dyn JobList>,
    template: CommandTemplate,
}

impl TaskManager {
    pub fn new(repository: TaskRepository, job_list: Arc<dyn JobList>, template: CommandTemplate) -> Self {
        Self {
            repository,
            job_list,
            template,
        }
    }

    /// Stored tasks plus managed job-list lines not adopted yet
    pub async fn list(&self) -> Result<Vec<TaskDescriptor>> {
        let mut tasks = self.repository.list().await?;
        let known: HashSet<String> = tasks.iter().map(|t| t.task_id.clone()).collect();
        let text = self.job_list.read().await?;
        tasks.extend(
            codec::list(&text)
                .into_iter()
                .filter(|task| !known.contains(&task.task_id)),
        );
        Ok(tasks)
    }

    pub async fn get(&self, task_id: &str) -> Result<TaskDescriptor> {
        self.list()
            .await?
            .into_iter()
            .find(|task| task.task_id == task_id)
            .ok_or_else(|| SchedulerError::TaskNotFound(task_id.to_string()))
    }

    /// Adopt managed job-list lines whose task the repository does not know.
    /// Returns the number of tasks imported.
    #[instrument(skip(self))]
    pub async fn import_legacy(&self) -> Result<usize> {
        let text = self.job_list.read().await?;
        let mut imported = 0;
        for task in codec::list(&text) {
            if self.repository.get(&task.task_id).await?.is_none() {
                self.repository.save(&task).await?;
                imported += 1;
            }
        }
        if imported > 0 {
            info!(imported, "Adopted tasks from the job list");
        }
        Ok(imported)
    }

    /// Create one task per configuration and return their ids
    #[instrument(skip(self, request), fields(name = %request.task_name, operation = %request.operation))]
    pub async fn add(&self, request: NewTasks) -> Result<Vec<String>> {
        if request.config_ids.is_empty() {
            return Err(SchedulerError::InvalidTask(
                "at least one configuration is required".to_string(),
            ));
        }
        let schedule = normalize_schedule(&request.schedule)?;

        let tasks: Vec<TaskDescriptor> = request
            .config_ids
            .iter()
            .map(|config_id| {
                TaskDescriptor::new(
                    Uuid::new_v4().to_string(),
                    request.task_name.clone(),
                    config_id.clone(),
                    request.operation,
                    schedule.clone(),
                )
                .with_enabled(request.enabled)
            })
            .collect();
        for task in &tasks {
            task.validate()?;
        }

        self.import_legacy().await?;
        for task in &tasks {
            self.repository.save(task).await?;
        }
        self.install().await?;

        let ids: Vec<String> = tasks.into_iter().map(|t| t.task_id).collect();
        info!(count = ids.len(), "Added tasks");
        Ok(ids)
    }

    /// Apply `changes` to every listed task. Nothing is written unless every
    /// id exists.
    #[instrument(skip(self, changes))]
    pub async fn update(&self, task_ids: &[String], changes: TaskUpdate) -> Result<()> {
        self.import_legacy().await?;

        let schedule = changes.schedule.as_deref().map(normalize_schedule).transpose()?;
        let mut updated = Vec::with_capacity(task_ids.len());
        for (index, task_id) in task_ids.iter().enumerate() {
            let mut task = self
                .repository
                .get(task_id)
                .await?
                .ok_or_else(|| SchedulerError::TaskNotFound(task_id.clone()))?;

            if let Some(name) = &changes.task_name {
                task.task_name = name.clone();
            }
            if let Some(schedule) = &schedule {
                task.schedule = schedule.clone();
            }
            if let Some(config_id) = changes.config_ids.as_ref().and_then(|ids| ids.get(index)) {
                task.config_id = config_id.clone();
            }
            if let Some(operation) = changes.operation {
                task.operation = operation;
            }
            if let Some(enabled) = changes.enabled {
                task.enabled = enabled;
            }
            task.validate()?;
            updated.push(task);
        }

        for task in &updated {
            self.repository.save(task).await?;
        }
        self.install().await?;
        info!(count = updated.len(), "Updated tasks");
        Ok(())
    }

    pub async fn set_enabled(&self, task_ids: &[String], enabled: bool) -> Result<()> {
        self.update(
            task_ids,
            TaskUpdate {
                enabled: Some(enabled),
                ..TaskUpdate::default()
            },
        )
        .await
    }

    /// Remove tasks; unknown ids are ignored
    #[instrument(skip(self))]
    pub async fn delete(&self, task_ids: &[String]) -> Result<usize> {
        self.import_legacy().await?;

        let mut removed = 0;
        for task_id in task_ids {
            if self.repository.get(task_id).await?.is_some() {
                self.repository.delete(task_id).await?;
                removed += 1;
            }
        }
        self.install().await?;
        info!(removed, "Deleted tasks");
        Ok(removed)
    }

    /// Rewrite the job list from the repository
    pub async fn install(&self) -> Result<()> {
        let current = self.job_list.read().await?;
        let tasks = self.repository.list().await?;
        let rendered = codec::reconcile(&current, &tasks, &self.template)?;
        if rendered != current {
            self.job_list.write(&rendered).await?;
        }
        Ok(())
    }

    /// Start a task's command right away without waiting for it
    #[instrument(skip(self))]
    pub async fn run_now(&self, task_id: &str) -> Result<u32> {
        let task = self.get(task_id).await?;
        let child = Command::new(self.template.program())
            .args(self.template.args(&task))
            .stdin(Stdio::null())
            .spawn()?;
        let pid = child.id().unwrap_or_default();
        info!(pid, operation = %task.operation, config_id = %task.config_id, "Started task");
        Ok(pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_list::MemoryJobList;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::storage::SettingsStore;
    use mockall::mock;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        values: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl SettingsStore for MemoryStore {
        async fn set_string(&self, key: &str, value: &str) -> BridgeResult<()> {
            self.values.lock().unwrap().insert(key.into(), value.into());
            Ok(())
        }

        async fn get_string(&self, key: &str) -> BridgeResult<Option<String>> {
            Ok(self.values.lock().unwrap().get(key).cloned())
        }

        async fn delete(&self, key: &str) -> BridgeResult<()> {
            self.values.lock().unwrap().remove(key);
            Ok(())
        }

        async fn list_keys(&self) -> BridgeResult<Vec<String>> {
            Ok(self.values.lock().unwrap().keys().cloned().collect())
        }
    }

    mock! {
        Jobs {}

        #[async_trait]
        impl JobList for Jobs {
            async fn read(&self) -> Result<String>;
            async fn write(&self, text: &str) -> Result<()>;
        }
    }

    fn manager(job_list: Arc<dyn JobList>) -> TaskManager {
        TaskManager::new(
            TaskRepository::new(Arc::new(MemoryStore::default())),
            job_list,
            CommandTemplate::new("strm-mirror"),
        )
    }

    fn request(config_ids: &[&str], operation: OperationKind, enabled: bool) -> NewTasks {
        NewTasks {
            task_name: "Library".to_string(),
            schedule: "*/30 * * * *".to_string(),
            config_ids: config_ids.iter().map(|c| c.to_string()).collect(),
            operation,
            enabled,
        }
    }

    #[tokio::test]
    async fn test_add_one_task_per_config() {
        let jobs = Arc::new(MemoryJobList::new("0 0 * * * /usr/bin/backup.sh\n"));
        let manager = manager(jobs.clone());

        let ids = manager
            .add(request(&["1", "2"], OperationKind::Sync, true))
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);

        let text = jobs.read().await.unwrap();
        assert!(text.starts_with("0 0 * * * /usr/bin/backup.sh\n"));
        assert_eq!(codec::list(&text).len(), 2);
        assert!(text.contains(&format!("strm-mirror sync 1 --task-id {}", ids[0])));
    }

    #[tokio::test]
    async fn test_toggle_comments_the_line() {
        let jobs = Arc::new(MemoryJobList::default());
        let manager = manager(jobs.clone());
        let ids = manager
            .add(request(&["1"], OperationKind::ValidateFast, true))
            .await
            .unwrap();

        manager.set_enabled(&ids, false).await.unwrap();
        let text = jobs.read().await.unwrap();
        assert!(text.starts_with("# "));
        assert!(!manager.get(&ids[0]).await.unwrap().enabled);

        manager.set_enabled(&ids, true).await.unwrap();
        assert!(!jobs.read().await.unwrap().starts_with('#'));
    }

    #[tokio::test]
    async fn test_update_requires_every_id() {
        let jobs = Arc::new(MemoryJobList::default());
        let manager = manager(jobs.clone());
        let mut ids = manager
            .add(request(&["1"], OperationKind::Sync, true))
            .await
            .unwrap();
        let before = jobs.read().await.unwrap();

        ids.push("missing".to_string());
        let err = manager
            .update(
                &ids,
                TaskUpdate {
                    schedule: Some("0 4 * * *".to_string()),
                    ..TaskUpdate::default()
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, SchedulerError::TaskNotFound(id) if id == "missing"));
        assert_eq!(jobs.read().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_update_changes_fields_in_place() {
        let jobs = Arc::new(MemoryJobList::default());
        let manager = manager(jobs.clone());
        let ids = manager
            .add(request(&["1", "2"], OperationKind::Sync, true))
            .await
            .unwrap();

        manager
            .update(
                &ids,
                TaskUpdate {
                    task_name: Some("Nightly".to_string()),
                    schedule: Some("0  3 * * *".to_string()),
                    config_ids: Some(vec!["5".to_string()]),
                    operation: Some(OperationKind::ValidateSlow),
                    enabled: None,
                },
            )
            .await
            .unwrap();

        let first = manager.get(&ids[0]).await.unwrap();
        assert_eq!(first.config_id, "5");
        assert_eq!(first.schedule, "0 3 * * *");
        assert_eq!(first.operation, OperationKind::ValidateSlow);
        let second = manager.get(&ids[1]).await.unwrap();
        assert_eq!(second.config_id, "2");
        assert_eq!(second.task_name, "Nightly");
    }

    #[tokio::test]
    async fn test_legacy_lines_are_adopted() {
        let legacy = concat!(
            "*/10 * * * * cd \"/app\" && /usr/local/bin/python3.9 \"/app/main.py\" 2 old1 ",
            "# task_id=old1 task_name=TV config_id=2 task_mode=strm_creation\n",
            "# 0 */2 * * * cd \"/app\" && /usr/local/bin/python3.9 \"strm_validator.py\" 2 slow old2 ",
            "# task_id=old2 task_name=TV config_id=2\n",
        );
        let jobs = Arc::new(MemoryJobList::new(legacy));
        let manager = manager(jobs.clone());

        let listed = manager.list().await.unwrap();
        assert_eq!(listed.len(), 2);

        assert_eq!(manager.import_legacy().await.unwrap(), 2);
        assert_eq!(manager.import_legacy().await.unwrap(), 0);
        manager.install().await.unwrap();

        let text = jobs.read().await.unwrap();
        assert!(!text.contains("python3.9"));
        assert!(text.contains("strm-mirror sync 2 --task-id old1"));
        assert!(text.contains("# 0 */2 * * * strm-mirror validate 2 slow --task-id old2"));
    }

    #[tokio::test]
    async fn test_delete_keeps_unmanaged_lines() {
        let jobs = Arc::new(MemoryJobList::new("MAILTO=\"\"\n"));
        let manager = manager(jobs.clone());
        let ids = manager
            .add(request(&["1", "2"], OperationKind::Sync, false))
            .await
            .unwrap();

        assert_eq!(manager.delete(&ids[..1]).await.unwrap(), 1);
        assert_eq!(manager.delete(&["nope".to_string()]).await.unwrap(), 0);

        let text = jobs.read().await.unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "MAILTO=\"\"");
        assert!(lines[1].contains(&ids[1]));
    }

    #[tokio::test]
    async fn test_install_skips_write_when_unchanged() {
        let mut jobs = MockJobs::new();
        jobs.expect_read().returning(|| Ok("0 0 * * * /usr/bin/backup.sh\n".to_string()));
        jobs.expect_write().never();

        manager(Arc::new(jobs)).install().await.unwrap();
    }

    #[tokio::test]
    async fn test_add_rejects_bad_schedule() {
        let manager = manager(Arc::new(MemoryJobList::default()));
        let mut bad = request(&["1"], OperationKind::Sync, true);
        bad.schedule = "every day".to_string();
        assert!(matches!(
            manager.add(bad).await,
            Err(SchedulerError::InvalidSchedule(_))
        ));
    }
}
