//! Run Log and Dead-letter persistence — JSONL-append, bounded
//! in-memory ring buffer for fast queries.

use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};

use cw_domain::runlog::{DeadLetterEntry, RunLogRow};
use parking_lot::RwLock;
use uuid::Uuid;

const MAX_ROWS_IN_MEMORY: usize = 2000;

pub struct RunLogStore {
    rows: RwLock<VecDeque<RunLogRow>>,
    log_path: PathBuf,
    dead_letters: RwLock<VecDeque<DeadLetterEntry>>,
    dead_letter_path: PathBuf,
}

impl RunLogStore {
    pub fn new(state_dir: &Path) -> Self {
        std::fs::create_dir_all(state_dir).ok();
        let log_path = state_dir.join("run_log.jsonl");
        let dead_letter_path = state_dir.join("dead_letter.jsonl");
        Self {
            rows: RwLock::new(load_recent(&log_path)),
            log_path,
            dead_letters: RwLock::new(load_recent(&dead_letter_path)),
            dead_letter_path,
        }
    }

    pub fn append(&self, row: RunLogRow) {
        append_jsonl(&self.log_path, &row);
        let mut rows = self.rows.write();
        rows.push_back(row);
        if rows.len() > MAX_ROWS_IN_MEMORY {
            rows.pop_front();
        }
    }

    pub fn recent(&self, limit: usize) -> Vec<RunLogRow> {
        self.rows.read().iter().rev().take(limit).cloned().collect()
    }

    pub fn dead_letter(&self, entry: DeadLetterEntry) {
        append_jsonl(&self.dead_letter_path, &entry);
        let mut entries = self.dead_letters.write();
        entries.push_back(entry);
        if entries.len() > MAX_ROWS_IN_MEMORY {
            entries.pop_front();
        }
    }

    pub fn dead_letters(&self) -> Vec<DeadLetterEntry> {
        self.dead_letters.read().iter().cloned().collect()
    }

    pub fn reprocess_dead_letter(&self, id: &Uuid) -> Option<DeadLetterEntry> {
        let mut entries = self.dead_letters.write();
        let pos = entries.iter().position(|e| &e.id == id)?;
        entries.remove(pos)
    }
}

fn load_recent<T: serde::de::DeserializeOwned>(path: &Path) -> VecDeque<T> {
    let mut items = VecDeque::new();
    if let Ok(content) = std::fs::read_to_string(path) {
        for line in content.lines().rev().take(MAX_ROWS_IN_MEMORY) {
            if let Ok(item) = serde_json::from_str::<T>(line) {
                items.push_front(item);
            }
        }
    }
    items
}

fn append_jsonl<T: serde::Serialize>(path: &Path, item: &T) {
    if let Ok(json) = serde_json::to_string(item) {
        if let Ok(mut file) = std::fs::OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{json}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use cw_domain::runlog::RunResult;

    fn sample_row() -> RunLogRow {
        RunLogRow {
            timestamp: Utc::now(),
            event_id: "evt1".into(),
            rule_id: "R001".into(),
            app_token: "app1".into(),
            table_id: "tbl1".into(),
            record_id: "rec1".into(),
            rules_evaluated: vec!["R001".into()],
            rules_matched: vec!["R001".into()],
            trigger_field: None,
            changed: None,
            actions_executed: vec!["log.write".into()],
            actions_detail: vec![],
            log_messages: vec!["done".into()],
            result: RunResult::Success,
            error: None,
            retry_count: 0,
            sent_to_dead_letter: false,
            duration_ms: 1,
        }
    }

    #[test]
    fn append_and_recent_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunLogStore::new(dir.path());
        store.append(sample_row());
        assert_eq!(store.recent(10).len(), 1);
    }

    #[test]
    fn reload_reads_jsonl_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = RunLogStore::new(dir.path());
            store.append(sample_row());
        }
        let reloaded = RunLogStore::new(dir.path());
        assert_eq!(reloaded.recent(10).len(), 1);
    }

    #[test]
    fn dead_letter_reprocess_removes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunLogStore::new(dir.path());
        let entry = DeadLetterEntry {
            id: Uuid::new_v4(),
            rule_id: "R001".into(),
            table_id: "tbl1".into(),
            record_id: "rec1".into(),
            action_type: "http.request".into(),
            final_error: "timeout".into(),
            retry_count: 3,
            created_at: Utc::now(),
        };
        let id = entry.id;
        store.dead_letter(entry);
        assert_eq!(store.dead_letters().len(), 1);
        assert!(store.reprocess_dead_letter(&id).is_some());
        assert!(store.dead_letters().is_empty());
    }
}
