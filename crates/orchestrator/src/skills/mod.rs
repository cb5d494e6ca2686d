//! The fixed skill roster and the shared context threaded through it.
//!
//! Mirrors how the teacher's turn loop builds one context up front and
//! passes it by reference through an ordered stage sequence — here the
//! stages are skill hops instead of tool-call iterations.

pub mod chitchat;
pub mod mutate;
pub mod query;
pub mod reminder_skill;
pub mod summary;

use chrono::{DateTime, Utc};
use cw_bitable::BitableClient;
use cw_domain::config::OrchestratorConfig;
use cw_domain::conversation::ConversationState;
use cw_llm::LlmRouter;
use cw_sessions::ConversationStore;

use crate::reminder::ReminderStore;
use crate::tables::TableCatalog;

pub struct SkillContext<'a> {
    pub open_id: String,
    pub text: String,
    pub now: DateTime<Utc>,
    pub bitable: &'a BitableClient,
    pub sessions: &'a ConversationStore,
    pub llm: &'a LlmRouter,
    pub reminders: &'a ReminderStore,
    pub tables: &'a TableCatalog,
    pub config: &'a OrchestratorConfig,
    pub default_app_token: String,
    pub state: ConversationState,
    /// The previous skill's `SkillResult.data` in a chained call.
    pub carry: Option<serde_json::Value>,
}

impl<'a> SkillContext<'a> {
    pub fn with_carry(&self, carry: Option<serde_json::Value>) -> Self {
        Self {
            open_id: self.open_id.clone(),
            text: self.text.clone(),
            now: self.now,
            bitable: self.bitable,
            sessions: self.sessions,
            llm: self.llm,
            reminders: self.reminders,
            tables: self.tables,
            config: self.config,
            default_app_token: self.default_app_token.clone(),
            state: self.state.clone(),
            carry,
        }
    }
}

/// `[start_of_local_day, end_of_local_day]` for `now`, converted to
/// epoch-ms, per the fixed conversation timezone offset.
pub fn today_range_ms(now: DateTime<Utc>, tz_offset_hours: i64) -> (i64, i64) {
    let local_now = now + chrono::Duration::hours(tz_offset_hours);
    let local_date = local_now.date_naive();
    let start_local = local_date.and_hms_opt(0, 0, 0).unwrap();
    let end_local = local_date.and_hms_opt(23, 59, 59).unwrap();
    let start_utc = start_local - chrono::Duration::hours(tz_offset_hours);
    let end_utc = end_local - chrono::Duration::hours(tz_offset_hours);
    (start_utc.and_utc().timestamp_millis(), end_utc.and_utc().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn today_range_matches_local_calendar_day() {
        // 2026-02-07T01:00:00Z == 2026-02-07T09:00+08:00
        let now = Utc.with_ymd_and_hms(2026, 2, 7, 1, 0, 0).unwrap();
        let (from, to) = today_range_ms(now, 8);
        let expected_from = Utc.with_ymd_and_hms(2026, 2, 6, 16, 0, 0).unwrap().timestamp_millis();
        let expected_to = Utc.with_ymd_and_hms(2026, 2, 7, 15, 59, 59).unwrap().timestamp_millis();
        assert_eq!(from, expected_from);
        assert_eq!(to, expected_to);
    }
}
