//! Create/Update/Delete: single-table CRUD against a required locator
//! triplet, with `complete_fields` slot-filling and delete confirmation.

use std::collections::BTreeMap;

use cw_domain::conversation::{PendingAction, PendingActionKind};
use cw_domain::record::{Fields, Locator, Value};

use crate::result::SkillResult;
use crate::skills::SkillContext;

/// A one-directional secondary write attempted after a primary create
/// succeeds (e.g. case → contract). Failure preserves the primary record
/// and leaves a retry note in slot memory rather than rolling back.
pub struct LinkedWrite {
    pub from_table_id: String,
    pub to_app_token: String,
    pub to_table_id: String,
    /// primary field name -> secondary field name.
    pub field_map: BTreeMap<String, String>,
}

pub struct CreateSkill {
    required_fields: Vec<String>,
    linked_writes: Vec<LinkedWrite>,
}

impl CreateSkill {
    pub fn new(required_fields: Vec<String>, linked_writes: Vec<LinkedWrite>) -> Self {
        Self { required_fields, linked_writes }
    }

    pub async fn run(&self, ctx: &SkillContext<'_>) -> SkillResult {
        let resuming_pending = ctx
            .state
            .pending_action
            .as_ref()
            .filter(|p| p.kind == PendingActionKind::CompleteFields && p.payload["skill"] == "create");

        let (app_token, table_id, mut fields) = if let Some(pending) = resuming_pending {
            let app_token = pending.payload["table"]["app_token"].as_str().unwrap_or_default().to_string();
            let table_id = pending.payload["table"]["table_id"].as_str().unwrap_or_default().to_string();
            let mut fields = json_to_fields(&pending.payload["fields"]);
            if let Some(missing) = pending.payload["missing_field"].as_str() {
                fields.insert(missing.to_string(), Value::Text(ctx.text.trim().to_string()));
            }
            (app_token, table_id, fields)
        } else {
            let resolved = match ctx.tables.resolve(&ctx.text, ctx.llm).await {
                Ok(r) => r,
                Err(e) => return SkillResult::refused(format!("无法确定要创建记录的数据表：{e}")),
            };
            (resolved.app_token, resolved.table_id, parse_kv_fields(&ctx.text, &self.required_fields))
        };

        if let Some(missing) = self.required_fields.iter().find(|f| !fields.contains_key(f.as_str())) {
            let payload = serde_json::json!({
                "skill": "create",
                "fields": fields_to_json(&fields),
                "missing_field": missing,
                "table": { "app_token": app_token, "table_id": table_id },
            });
            ctx.sessions.set_pending_action(
                &ctx.open_id,
                PendingAction {
                    kind: PendingActionKind::CompleteFields,
                    target_ref: None,
                    payload,
                    expires_at: ctx.now + chrono::Duration::minutes(ctx.config.pending_action_ttl_minutes),
                },
            );
            return SkillResult::ok(format!("请提供「{missing}」后我再创建记录。"));
        }

        match ctx.bitable.create_record(&app_token, &table_id, &fields).await {
            Ok(record) => {
                ctx.sessions.clear_pending_action(&ctx.open_id);
                let mut message = format!("已创建记录 {}。", record.locator.record_id);
                for lw in self.linked_writes.iter().filter(|lw| lw.from_table_id == table_id) {
                    let secondary_fields: Fields = lw
                        .field_map
                        .iter()
                        .filter_map(|(from, to)| fields.remove(from).map(|v| (to.clone(), v)))
                        .collect();
                    if let Err(e) = ctx.bitable.create_record(&lw.to_app_token, &lw.to_table_id, &secondary_fields).await {
                        let primary_id = record.locator.record_id.clone();
                        let to_table = lw.to_table_id.clone();
                        let err_text = e.to_string();
                        ctx.sessions.update(&ctx.open_id, move |s| {
                            s.slot_memory.insert(
                                "linked_write_retry".to_string(),
                                serde_json::json!({
                                    "primary_record_id": primary_id,
                                    "to_table_id": to_table,
                                    "error": err_text,
                                }),
                            );
                        });
                        message.push_str(&format!(" 关联写入「{}」失败，已记录重试任务。", lw.to_table_id));
                    }
                }
                SkillResult::ok(message).with_data(serde_json::json!({ "locator": record.locator }))
            }
            Err(e) => SkillResult::refused(format!("创建失败：{e}")),
        }
    }
}

pub struct UpdateSkill {
    updatable_fields: Vec<String>,
}

impl UpdateSkill {
    pub fn new(updatable_fields: Vec<String>) -> Self {
        Self { updatable_fields }
    }

    pub async fn run(&self, ctx: &SkillContext<'_>) -> SkillResult {
        let locator = match resolve_target_locator(ctx) {
            Some(l) => l,
            None => return SkillResult::refused("请指定要更新的记录编号。"),
        };
        let fields = parse_kv_fields(&ctx.text, &self.updatable_fields);
        if fields.is_empty() {
            return SkillResult::refused("请说明要更新的字段和新值。");
        }

        match ctx.bitable.update_record(&locator, &fields).await {
            Ok(record) => {
                ctx.sessions.clear_pending_action(&ctx.open_id);
                SkillResult::ok(format!("记录 {} 已更新。", record.locator.record_id))
                    .with_data(serde_json::json!({ "locator": record.locator }))
            }
            Err(e) => SkillResult::refused(format!("更新失败：{e}")),
        }
    }
}

pub struct DeleteSkill;

impl DeleteSkill {
    pub fn new() -> Self {
        Self
    }

    pub async fn run(&self, ctx: &SkillContext<'_>) -> SkillResult {
        if let Some(pending) = ctx.state.pending_action.as_ref().filter(|p| p.kind == PendingActionKind::ConfirmDelete) {
            let locator = Locator::new(
                pending.payload["locator"]["app_token"].as_str().unwrap_or_default(),
                pending.payload["locator"]["table_id"].as_str().unwrap_or_default(),
                pending.payload["locator"]["record_id"].as_str().unwrap_or_default(),
            );
            return match ctx.bitable.delete_record(&locator).await {
                Ok(()) => {
                    ctx.sessions.clear_pending_action(&ctx.open_id);
                    SkillResult::ok(format!("记录 {} 已删除。", locator.record_id))
                }
                Err(e) => {
                    ctx.sessions.clear_pending_action(&ctx.open_id);
                    SkillResult::refused(format!("删除失败：{e}"))
                }
            };
        }

        let locator = match resolve_target_locator(ctx) {
            Some(l) => l,
            None => return SkillResult::refused("请指定要删除的记录编号。"),
        };
        ctx.sessions.set_pending_action(
            &ctx.open_id,
            PendingAction {
                kind: PendingActionKind::ConfirmDelete,
                target_ref: Some(locator.clone()),
                payload: serde_json::json!({ "locator": locator }),
                expires_at: ctx.now + chrono::Duration::minutes(ctx.config.pending_action_ttl_minutes),
            },
        );
        SkillResult::ok(format!("确认删除记录 {} 吗？回复「确认」或「取消」。", locator.record_id))
    }
}

impl Default for DeleteSkill {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves a single target record: an `active_record` seeded by an L0
/// referent token ("第2个", "这个") wins outright; otherwise a literal
/// record-id-looking token in the message text; otherwise a single
/// remembered result used unambiguously.
fn resolve_target_locator(ctx: &SkillContext<'_>) -> Option<Locator> {
    if let Some(active) = ctx.state.active_record.clone() {
        return Some(active);
    }

    let table_id = ctx.state.active_table.clone()?;
    let token = ctx
        .text
        .split_whitespace()
        .find(|t| t.chars().any(|c| c.is_ascii_digit()) && t.len() >= 3)
        .map(|s| s.to_string());

    let record_id = token.or_else(|| {
        if ctx.state.last_result_ids.len() == 1 {
            ctx.state.last_result_ids.first().cloned()
        } else {
            None
        }
    })?;

    Some(Locator::new(ctx.default_app_token.clone(), table_id, record_id))
}

fn parse_kv_fields(text: &str, known_fields: &[String]) -> Fields {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let mut fields = Fields::new();
    let mut i = 0;
    while i < tokens.len() {
        if known_fields.iter().any(|f| f == tokens[i]) {
            let field_name = tokens[i].to_string();
            let mut j = i + 1;
            let mut value_tokens = Vec::new();
            while j < tokens.len() && !known_fields.iter().any(|f| f == tokens[j]) {
                value_tokens.push(tokens[j]);
                j += 1;
            }
            if !value_tokens.is_empty() {
                fields.insert(field_name, Value::Text(value_tokens.join(" ")));
            }
            i = j;
        } else {
            i += 1;
        }
    }
    fields
}

fn fields_to_json(fields: &Fields) -> serde_json::Value {
    serde_json::Value::Object(fields.iter().map(|(k, v)| (k.clone(), serde_json::Value::String(v.render()))).collect())
}

fn json_to_fields(value: &serde_json::Value) -> Fields {
    value
        .as_object()
        .map(|obj| obj.iter().map(|(k, v)| (k.clone(), Value::Text(v.as_str().unwrap_or_default().to_string()))).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_kv_fields_splits_on_known_field_names() {
        let known = vec!["案号".to_string(), "委托人".to_string(), "案由".to_string()];
        let fields = parse_kv_fields("案号 (2026)沪01民终1号 委托人 张三", &known);
        assert_eq!(fields.get("案号").unwrap().render(), "(2026)沪01民终1号");
        assert_eq!(fields.get("委托人").unwrap().render(), "张三");
        assert!(!fields.contains_key("案由"));
    }

    #[test]
    fn fields_json_round_trips_through_text_values() {
        let known = vec!["案由".to_string()];
        let fields = parse_kv_fields("案由 合同纠纷", &known);
        let json = fields_to_json(&fields);
        let back = json_to_fields(&json);
        assert_eq!(back.get("案由").unwrap().render(), "合同纠纷");
    }
}
