//! Delay task — a persisted scheduled sub-pipeline replay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::rule::Action;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayStatus {
    Scheduled,
    Running,
    Done,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelayTask {
    pub task_id: Uuid,
    pub rule_id: String,
    pub scheduled_at: DateTime<Utc>,
    pub payload: serde_json::Value,
    pub pipeline: Vec<Action>,
    pub status: DelayStatus,
}

impl DelayTask {
    pub fn new(
        rule_id: impl Into<String>,
        scheduled_at: DateTime<Utc>,
        payload: serde_json::Value,
        pipeline: Vec<Action>,
    ) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            rule_id: rule_id.into(),
            scheduled_at,
            payload,
            pipeline,
            status: DelayStatus::Scheduled,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == DelayStatus::Scheduled && self.scheduled_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn task_is_due_only_after_scheduled_time() {
        let now = Utc::now();
        let task = DelayTask::new("R001", now - Duration::seconds(1), serde_json::json!({}), vec![]);
        assert!(task.is_due(now));

        let future = DelayTask::new("R001", now + Duration::seconds(60), serde_json::json!({}), vec![]);
        assert!(!future.is_due(now));
    }

    #[test]
    fn cancelled_task_is_never_due() {
        let now = Utc::now();
        let mut task = DelayTask::new("R001", now - Duration::seconds(1), serde_json::json!({}), vec![]);
        task.status = DelayStatus::Cancelled;
        assert!(!task.is_due(now));
    }
}
