//! Delay Scheduler — periodically drains due Delay Tasks and replays
//! their sub-pipeline through the executors, independent of the rule
//! that originally enqueued them.
//!
//! Unlike the teacher's cron-expression scheduler, Delay Tasks carry a
//! single absolute `scheduled_at` rather than a recurring cron string —
//! the rules file has no concept of a recurring trigger — so this
//! scheduler is a plain due-task poller, not a cron matcher.

use std::time::Duration;

use cw_bitable::BitableClient;
use cw_domain::delay::{DelayStatus, DelayTask};
use cw_domain::record::Fields;

use crate::executors::{execute, ExecutorConfig};
use crate::store::delay::DelayStore;

pub struct DelayRunner<'a> {
    pub delay_store: &'a DelayStore,
    pub bitable: &'a BitableClient,
    pub http: &'a reqwest::Client,
    pub executor_config: &'a ExecutorConfig,
}

impl<'a> DelayRunner<'a> {
    /// Run every due task's pipeline once. Returns the number of tasks
    /// processed (regardless of individual outcome).
    pub async fn run_due(&self) -> usize {
        let due = self.delay_store.due().await;
        for task in &due {
            self.run_task(task).await;
        }
        due.len()
    }

    async fn run_task(&self, task: &DelayTask) {
        self.delay_store.set_status(&task.task_id, DelayStatus::Running).await;
        let current_fields: Fields = serde_json::from_value(task.payload.clone()).unwrap_or_default();

        let mut all_ok = true;
        for action in &task.pipeline {
            // Delay payloads don't carry a locator; actions that need one
            // (bitable.update/upsert) use the task's own rule id as the
            // log-only correlation key and record id "" is not resolvable —
            // such actions are only meaningful nested under a prior action
            // that already identified the record, so failures here are
            // reported but not retried against a moving target.
            let outcome = execute(
                action,
                "",
                "",
                &current_fields,
                self.bitable,
                self.http,
                self.delay_store,
                &task.rule_id,
                self.executor_config,
            )
            .await;
            if !outcome.ok {
                all_ok = false;
                break;
            }
        }

        let final_status = if all_ok { DelayStatus::Done } else { DelayStatus::Failed };
        self.delay_store.set_status(&task.task_id, final_status).await;
    }

    /// Runs [`Self::run_due`] on a fixed interval until cancelled. Intended
    /// to be spawned as a background task.
    pub async fn run_forever(&self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            self.run_due().await;
        }
    }
}
