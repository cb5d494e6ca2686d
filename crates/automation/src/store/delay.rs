//! Delay Task Store — persisted scheduled sub-pipeline replays, backing
//! the `GET /automation/delay/tasks` and cancel endpoints.

use std::path::Path;

use chrono::Utc;
use cw_domain::delay::{DelayStatus, DelayTask};
use uuid::Uuid;

use super::JsonStore;

pub struct DelayStore {
    inner: JsonStore<DelayTask>,
}

impl DelayStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            inner: JsonStore::new(state_dir, "delay_tasks.json"),
        }
    }

    pub async fn insert(&self, task: DelayTask) -> Uuid {
        let id = task.task_id;
        self.inner.set(id.to_string(), task).await;
        id
    }

    pub async fn get(&self, id: &Uuid) -> Option<DelayTask> {
        self.inner.get(&id.to_string()).await
    }

    pub async fn list(&self) -> Vec<DelayTask> {
        self.inner.snapshot().await.into_values().collect()
    }

    pub async fn due(&self) -> Vec<DelayTask> {
        let now = Utc::now();
        self.inner.snapshot().await.into_values().filter(|t| t.is_due(now)).collect()
    }

    pub async fn set_status(&self, id: &Uuid, status: DelayStatus) -> bool {
        if let Some(mut task) = self.get(id).await {
            task.status = status;
            self.inner.set(id.to_string(), task).await;
            true
        } else {
            false
        }
    }

    /// Cancel a scheduled task. Returns `false` if not found or already
    /// past the scheduled state.
    pub async fn cancel(&self, id: &Uuid) -> bool {
        match self.get(id).await {
            Some(task) if task.status == DelayStatus::Scheduled => {
                self.set_status(id, DelayStatus::Cancelled).await
            }
            _ => false,
        }
    }
}
