//! Conversation orchestration: L0 short-circuits, intent parsing, the
//! fixed seven-skill roster, response rendering, and channel formatting.
//!
//! [`router::Orchestrator`] is the single entry point a channel adapter
//! calls once per inbound message.

pub mod formatter;
pub mod intent;
pub mod l0;
pub mod reminder;
pub mod renderer;
pub mod result;
pub mod router;
pub mod skills;
pub mod tables;

pub use formatter::{Block, CardFormatter, ChannelFormatter};
pub use intent::{IntentParser, ParseVia, ParsedIntent};
pub use l0::{L0Outcome, L0Rules};
pub use reminder::{Reminder, ReminderStatus, ReminderStore};
pub use renderer::{RenderMeta, RenderedResponse, ResponseRenderer};
pub use result::{SkillKind, SkillResult};
pub use router::Orchestrator;
pub use skills::chitchat::ChitchatSkill;
pub use skills::mutate::{CreateSkill, DeleteSkill, LinkedWrite, UpdateSkill};
pub use skills::query::QuerySkill;
pub use skills::reminder_skill::ReminderSkill;
pub use skills::summary::SummarySkill;
pub use skills::SkillContext;
pub use tables::{ResolvedTable, TableAlias, TableCatalog};
