//! Local CRUD against the durable reminder store: parses a natural-time
//! expression for creation, and list/complete/delete sub-commands.

use uuid::Uuid;

use crate::reminder::{parse_reminder_time, Reminder};
use crate::result::SkillResult;
use crate::skills::SkillContext;

pub struct ReminderSkill;

impl ReminderSkill {
    pub fn new() -> Self {
        Self
    }

    pub async fn run(&self, ctx: &SkillContext<'_>) -> SkillResult {
        let text = ctx.text.trim();

        if text.contains("完成") || text.to_ascii_lowercase().contains("complete") {
            return self.complete(ctx).await;
        }
        if text.contains("删除提醒") || text.contains("取消提醒") {
            return self.cancel(ctx).await;
        }
        if text.contains("我的提醒") || text.contains("提醒列表") || text.contains("list reminders") {
            return self.list(ctx).await;
        }
        self.create(ctx).await
    }

    async fn create(&self, ctx: &SkillContext<'_>) -> SkillResult {
        if ctx.text.contains("昨天") {
            return SkillResult::refused("不能为过去的时间创建提醒，请重新指定时间。");
        }

        let Some((due_at, inferred)) =
            parse_reminder_time(&ctx.text, ctx.now, ctx.config.timezone_offset_hours, ctx.config.reminder_default_hour)
        else {
            return SkillResult::refused("没听懂具体时间，请换个说法，例如「提醒我明天9点开会」。");
        };

        if due_at <= ctx.now {
            return SkillResult::refused("这个时间已经过去了，请指定一个未来的时间。");
        }

        let reminder = Reminder::new(ctx.open_id.clone(), strip_command_words(&ctx.text), due_at, inferred);
        let label = if inferred {
            format!("（未指定时间，默认 {}:00）", ctx.config.reminder_default_hour)
        } else {
            String::new()
        };
        ctx.reminders.insert(reminder).await;
        SkillResult::ok(format!("已记下提醒{label}。"))
    }

    async fn list(&self, ctx: &SkillContext<'_>) -> SkillResult {
        let items = ctx.reminders.list_for(&ctx.open_id).await;
        if items.is_empty() {
            return SkillResult::ok("暂无待办提醒。");
        }
        let lines: Vec<String> = items
            .iter()
            .map(|r| format!("- [{}] {} ({})", r.reminder_id, r.text, r.due_at.to_rfc3339()))
            .collect();
        SkillResult::ok(lines.join("\n"))
    }

    async fn complete(&self, ctx: &SkillContext<'_>) -> SkillResult {
        match extract_reminder_id(&ctx.text) {
            Some(id) if ctx.reminders.complete(&id).await => SkillResult::ok("已标记为完成。"),
            Some(_) => SkillResult::refused("没有找到这条提醒。"),
            None => SkillResult::refused("请提供要完成的提醒编号。"),
        }
    }

    async fn cancel(&self, ctx: &SkillContext<'_>) -> SkillResult {
        match extract_reminder_id(&ctx.text) {
            Some(id) if ctx.reminders.cancel(&id).await => SkillResult::ok("已取消这条提醒。"),
            Some(_) => SkillResult::refused("没有找到这条提醒。"),
            None => SkillResult::refused("请提供要取消的提醒编号。"),
        }
    }
}

impl Default for ReminderSkill {
    fn default() -> Self {
        Self::new()
    }
}

fn extract_reminder_id(text: &str) -> Option<Uuid> {
    text.split_whitespace().find_map(|tok| Uuid::parse_str(tok).ok())
}

fn strip_command_words(text: &str) -> String {
    const COMMAND_WORDS: &[&str] = &["提醒我", "提醒", "remind me"];
    let mut out = text.to_string();
    for word in COMMAND_WORDS {
        out = out.replace(word, "");
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_command_words_leaves_the_task_text() {
        assert_eq!(strip_command_words("提醒我明天9点开会"), "明天9点开会");
    }

    #[test]
    fn extract_reminder_id_finds_a_uuid_token() {
        let id = Uuid::new_v4();
        let text = format!("完成 {id}");
        assert_eq!(extract_reminder_id(&text), Some(id));
    }

    #[test]
    fn extract_reminder_id_is_none_without_a_uuid() {
        assert_eq!(extract_reminder_id("完成 那个提醒"), None);
    }
}
