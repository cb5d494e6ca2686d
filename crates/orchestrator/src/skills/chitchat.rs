//! Greeting pool with time-of-day branching, a soft refusal for
//! out-of-scope requests, and a templated decline for sensitive topics
//! (case-outcome prediction).

use chrono::Timelike;
use rand::seq::SliceRandom;

use crate::result::SkillResult;
use crate::skills::SkillContext;

const GREETINGS: &[&str] = &["你好", "hi", "hello", "在吗", "嗨"];
const THANKS: &[&str] = &["谢谢", "thanks", "thank you"];
const SENSITIVE_TOPICS: &[&str] = &["会不会赢", "能不能赢", "胜诉概率", "会判几年", "outcome prediction", "win the case"];

const MORNING_GREETINGS: &[&str] = &["早上好，有什么可以帮您？", "早安，需要我查点什么吗？"];
const AFTERNOON_GREETINGS: &[&str] = &["下午好，我在，请讲。", "下午好，有什么需要协助的？"];
const EVENING_GREETINGS: &[&str] = &["晚上好，需要我帮忙处理什么吗？", "晚上好，有什么可以效劳的？"];

const THANKS_REPLIES: &[&str] = &["不客气！", "应该的。", "随时找我。"];
const SOFT_REFUSALS: &[&str] = &["这个我帮不上忙，我主要负责案件相关的查询和操作。", "抱歉，这超出了我能处理的范围。"];
const SENSITIVE_DECLINE: &str = "我不能对案件结果做出预测或判断，这类问题建议咨询负责律师。";

pub struct ChitchatSkill;

impl ChitchatSkill {
    pub fn new() -> Self {
        Self
    }

    pub async fn run(&self, ctx: &SkillContext<'_>) -> SkillResult {
        let text = ctx.text.trim();
        let mut rng = rand::thread_rng();

        if SENSITIVE_TOPICS.iter().any(|t| text.contains(t)) {
            return SkillResult::ok(SENSITIVE_DECLINE);
        }

        if THANKS.iter().any(|t| text.contains(t)) {
            return SkillResult::ok(*THANKS_REPLIES.choose(&mut rng).unwrap());
        }

        if GREETINGS.iter().any(|g| text.contains(g)) {
            let local_hour = (ctx.now + chrono::Duration::hours(ctx.config.timezone_offset_hours)).time().hour();
            let pool = greeting_pool_for_hour(local_hour);
            return SkillResult::ok(*pool.choose(&mut rng).unwrap());
        }

        SkillResult::ok(*SOFT_REFUSALS.choose(&mut rng).unwrap())
    }
}

impl Default for ChitchatSkill {
    fn default() -> Self {
        Self::new()
    }
}

fn greeting_pool_for_hour(hour: u32) -> &'static [&'static str] {
    match hour {
        5..=11 => MORNING_GREETINGS,
        12..=17 => AFTERNOON_GREETINGS,
        _ => EVENING_GREETINGS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_pool_branches_on_local_hour() {
        assert_eq!(greeting_pool_for_hour(8), MORNING_GREETINGS);
        assert_eq!(greeting_pool_for_hour(14), AFTERNOON_GREETINGS);
        assert_eq!(greeting_pool_for_hour(21), EVENING_GREETINGS);
    }
}
