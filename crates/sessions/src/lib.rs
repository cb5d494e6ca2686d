//! Conversation state ownership for the orchestrator process: a
//! `open_id`-keyed store with idle-TTL eviction, and inbound-message
//! deduplication for the conversation channel callback.

pub mod dedupe;
pub mod lifecycle;
pub mod store;

pub use dedupe::DedupeStore;
pub use lifecycle::LifecycleManager;
pub use store::ConversationStore;
