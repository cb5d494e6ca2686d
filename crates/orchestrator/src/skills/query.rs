//! Picks a search tool from parsed slots and renders the matching
//! records back as a plain-text list.

use cw_domain::record::Record;

use crate::result::SkillResult;
use crate::skills::{today_range_ms, SkillContext};

pub struct QuerySkill;

impl QuerySkill {
    pub fn new() -> Self {
        Self
    }

    pub async fn run(&self, ctx: &SkillContext<'_>) -> SkillResult {
        let resolved = match ctx.tables.resolve(&ctx.text, ctx.llm).await {
            Ok(r) => r,
            Err(e) => return SkillResult::refused(format!("无法确定查询的数据表：{e}")),
        };

        let records = if ctx.text.contains("我的") || ctx.text.contains("主办") {
            ctx.bitable.search_person(&resolved.app_token, &resolved.table_id, "主办律师", &ctx.open_id).await
        } else if ctx.text.contains("开庭") && (ctx.text.contains("今天") || ctx.text.contains("今日")) {
            let (from, to) = today_range_ms(ctx.now, ctx.config.timezone_offset_hours);
            ctx.bitable.search_date_range(&resolved.app_token, &resolved.table_id, "开庭日", from, to).await
        } else if let Some((field, value)) = extract_exact_query(&ctx.text) {
            ctx.bitable.search_exact(&resolved.app_token, &resolved.table_id, &field, &value).await
        } else {
            ctx.bitable.search_keyword(&resolved.app_token, &resolved.table_id, "案由", ctx.text.trim()).await
        };

        match records {
            Ok(records) => {
                let ids: Vec<String> = records.iter().map(|r| r.locator.record_id.clone()).collect();
                let table_id = resolved.table_id.clone();
                ctx.sessions.update(&ctx.open_id, move |s| {
                    s.last_result_ids = ids.clone();
                    s.active_table = Some(table_id.clone());
                    s.active_record = None;
                    s.slot_memory.remove(crate::l0::PAGE_OFFSET_KEY);
                });
                let message = render_record_list(&records);
                SkillResult::ok(message).with_data(serde_json::json!({ "records": records }))
            }
            Err(e) => SkillResult::refused(format!("查询失败：{e}")),
        }
    }
}

impl Default for QuerySkill {
    fn default() -> Self {
        Self::new()
    }
}

/// Recognizes the `案号 XXX` style exact-field reference. Returns
/// `(field_name, value)`.
fn extract_exact_query(text: &str) -> Option<(String, String)> {
    const EXACT_FIELDS: &[&str] = &["案号", "案件编号", "编号"];
    let tokens: Vec<&str> = text.split_whitespace().collect();
    for (i, token) in tokens.iter().enumerate() {
        if EXACT_FIELDS.contains(token) {
            if let Some(value) = tokens.get(i + 1) {
                return Some((token.to_string(), value.to_string()));
            }
        }
    }
    None
}

pub fn render_record_list(records: &[Record]) -> String {
    if records.is_empty() {
        return "没有找到符合条件的记录。".to_string();
    }
    let mut lines = vec![format!("共找到 {} 条记录：", records.len())];
    for record in records.iter().take(20) {
        let summary: Vec<String> = record.fields.iter().take(3).map(|(k, v)| format!("{k}={}", v.render())).collect();
        lines.push(format!("- {} ({})", record.locator.record_id, summary.join(", ")));
    }
    if records.len() > 20 {
        lines.push(format!("...还有 {} 条未显示。", records.len() - 20));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_exact_query_pulls_field_and_value() {
        let parsed = extract_exact_query("案号 (2026)沪01民终1号 的详情").unwrap();
        assert_eq!(parsed.0, "案号");
        assert_eq!(parsed.1, "(2026)沪01民终1号");
    }

    #[test]
    fn extract_exact_query_is_none_without_a_known_field() {
        assert!(extract_exact_query("我的案件").is_none());
    }

    #[test]
    fn render_record_list_reports_no_results() {
        assert_eq!(render_record_list(&[]), "没有找到符合条件的记录。");
    }
}
