//! Rule-driven automation engine: dispatches change events and scan/sync
//! passes through a match engine and a retrying set of action executors,
//! with idempotent snapshots, a delay scheduler, and a schema watcher
//! that runtime-disables rules whose trigger field disappears.

pub mod dispatcher;
pub mod executors;
pub mod match_engine;
pub mod processor;
pub mod record_lock;
pub mod retry;
pub mod rules;
pub mod scheduler;
pub mod schema_watcher;
pub mod ssrf_guard;
pub mod store;
pub mod template;
pub mod webhook_auth;

pub use dispatcher::{Dispatcher, DispatcherConfig, DispatchOutcome};
pub use executors::{ActionOutcome, ExecutorConfig};
pub use processor::{ProcessMode, Processor};
pub use record_lock::RecordLockMap;
pub use rules::RuleRegistry;
pub use scheduler::DelayRunner;
pub use schema_watcher::{RefreshOutcome, SchemaWatcher, SchemaWatcherConfig};
pub use store::checkpoint::CheckpointStore;
pub use store::delay::DelayStore;
pub use store::idempotency::IdempotencyStore;
pub use store::runlog::RunLogStore;
pub use store::schema_cache::SchemaCacheStore;
pub use store::snapshot::SnapshotStore;
