//! Summarizes the preceding query result. Consumes chained `carry` data
//! when present; an `active_record` seeded by an L0 referent token
//! narrows to that one record; otherwise re-fetches the conversation's
//! remembered result ids.

use cw_domain::record::{Locator, Record};

use crate::result::SkillResult;
use crate::skills::query::render_record_list;
use crate::skills::SkillContext;

pub struct SummarySkill;

impl SummarySkill {
    pub fn new() -> Self {
        Self
    }

    pub async fn run(&self, ctx: &SkillContext<'_>) -> SkillResult {
        if let Some(carry) = &ctx.carry {
            if let Some(records) = carry.get("records").and_then(|v| serde_json::from_value::<Vec<Record>>(v.clone()).ok()) {
                return SkillResult::ok(render_record_list(&records));
            }
        }

        if let Some(locator) = ctx.state.active_record.clone() {
            return match ctx.bitable.get_record(&locator).await {
                Ok(record) => SkillResult::ok(render_record_list(&[record])),
                Err(e) => SkillResult::refused(format!("查询记录详情失败：{e}")),
            };
        }

        if ctx.state.last_result_ids.is_empty() {
            return SkillResult::ok("没有可总结的查询结果，请先查询一次。");
        }

        let Some(table_id) = ctx.state.active_table.clone() else {
            return SkillResult::ok("没有可总结的查询结果，请先查询一次。");
        };

        let mut records = Vec::new();
        for record_id in &ctx.state.last_result_ids {
            let locator = Locator::new(ctx.default_app_token.clone(), table_id.clone(), record_id.clone());
            if let Ok(record) = ctx.bitable.get_record(&locator).await {
                records.push(record);
            }
        }

        if records.is_empty() {
            return SkillResult::ok("没有可总结的查询结果，请先查询一次。");
        }

        SkillResult::ok(render_record_list(&records))
    }
}

impl Default for SummarySkill {
    fn default() -> Self {
        Self::new()
    }
}
