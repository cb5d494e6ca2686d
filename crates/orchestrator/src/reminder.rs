//! Reminder storage and natural-language time parsing for `ReminderSkill`.
//!
//! Reuses the automation engine's `JsonStore` rather than inventing a
//! second file-backed map type — a reminder is, mechanically, the same
//! kind of small persisted record a delay task is.

use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use cw_automation::store::JsonStore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStatus {
    Pending,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub reminder_id: Uuid,
    pub open_id: String,
    pub text: String,
    pub due_at: DateTime<Utc>,
    pub status: ReminderStatus,
    /// `true` when the time was inferred rather than stated by the user
    /// (the default-18:00 fallback), so the reply can label it as such.
    pub time_was_inferred: bool,
}

impl Reminder {
    pub fn new(open_id: impl Into<String>, text: impl Into<String>, due_at: DateTime<Utc>, inferred: bool) -> Self {
        Self {
            reminder_id: Uuid::new_v4(),
            open_id: open_id.into(),
            text: text.into(),
            due_at,
            status: ReminderStatus::Pending,
            time_was_inferred: inferred,
        }
    }

    /// Dedup key for the dispatch gateway: one reminder fires at most
    /// once per calendar day per offset within that day.
    pub fn dispatch_key(&self, tz_offset_hours: i64) -> String {
        let local = self.due_at + chrono::Duration::hours(tz_offset_hours);
        format!("{}/{}/{}", self.open_id, local.format("%Y-%m-%d"), local.format("%H%M"))
    }
}

pub struct ReminderStore {
    inner: JsonStore<Reminder>,
}

impl ReminderStore {
    pub fn new(state_dir: &std::path::Path) -> Self {
        Self { inner: JsonStore::new(state_dir, "reminders.json") }
    }

    pub async fn insert(&self, reminder: Reminder) -> Uuid {
        let id = reminder.reminder_id;
        self.inner.set(id.to_string(), reminder).await;
        id
    }

    pub async fn list_for(&self, open_id: &str) -> Vec<Reminder> {
        let mut items: Vec<_> = self
            .inner
            .snapshot()
            .await
            .into_values()
            .filter(|r| r.open_id == open_id && r.status == ReminderStatus::Pending)
            .collect();
        items.sort_by_key(|r| r.due_at);
        items
    }

    pub async fn complete(&self, id: &Uuid) -> bool {
        self.set_status(id, ReminderStatus::Completed).await
    }

    pub async fn cancel(&self, id: &Uuid) -> bool {
        self.set_status(id, ReminderStatus::Cancelled).await
    }

    async fn set_status(&self, id: &Uuid, status: ReminderStatus) -> bool {
        if let Some(mut reminder) = self.inner.get(&id.to_string()).await {
            reminder.status = status;
            self.inner.set(id.to_string(), reminder).await;
            true
        } else {
            false
        }
    }

    pub async fn due(&self, now: DateTime<Utc>) -> Vec<Reminder> {
        self.inner
            .snapshot()
            .await
            .into_values()
            .filter(|r| r.status == ReminderStatus::Pending && r.due_at <= now)
            .collect()
    }
}

/// Parses a handful of natural-language time expressions in the
/// conversation's fixed timezone offset. Returns `(due_at, was_inferred)`.
/// Unparseable or past times are rejected by the caller, not here.
pub fn parse_reminder_time(
    text: &str,
    now: DateTime<Utc>,
    tz_offset_hours: i64,
    default_hour: u32,
) -> Option<(DateTime<Utc>, bool)> {
    let local_now = now + chrono::Duration::hours(tz_offset_hours);

    let day_offset = if text.contains("昨天") {
        return None; // past-day references are always rejected upstream
    } else if text.contains("后天") {
        2
    } else if text.contains("明天") {
        1
    } else {
        0
    };

    let explicit_time = extract_hour_minute(text);
    let (hour, minute, inferred) = match explicit_time {
        Some((h, m)) => (h, m, false),
        None => (default_hour, 0, true),
    };

    let local_date = (local_now + chrono::Duration::days(day_offset)).date_naive();
    let naive_time = NaiveTime::from_hms_opt(hour, minute, 0)?;
    let local_dt = local_date.and_time(naive_time);
    let utc_dt = Utc.from_utc_datetime(&(local_dt - chrono::Duration::hours(tz_offset_hours)));

    Some((utc_dt, inferred))
}

fn extract_hour_minute(text: &str) -> Option<(u32, u32)> {
    // "9点" / "9点30" / "18:00" style extraction — scan for a run of
    // digits immediately followed by `点` or `:`.
    let chars: Vec<char> = text.chars().collect();
    for i in 0..chars.len() {
        if chars[i].is_ascii_digit() {
            let mut j = i;
            while j < chars.len() && chars[j].is_ascii_digit() {
                j += 1;
            }
            let digits: String = chars[i..j].iter().collect();
            if j < chars.len() && (chars[j] == '点' || chars[j] == ':' || chars[j] == '时') {
                let hour: u32 = digits.parse().ok()?;
                if hour > 23 {
                    continue;
                }
                let mut minute = 0u32;
                let mut k = j + 1;
                while k < chars.len() && chars[k].is_ascii_digit() {
                    k += 1;
                }
                if k > j + 1 {
                    let min_digits: String = chars[j + 1..k].iter().collect();
                    minute = min_digits.parse().unwrap_or(0);
                }
                return Some((hour, minute.min(59)));
            }
        }
    }
    None
}
