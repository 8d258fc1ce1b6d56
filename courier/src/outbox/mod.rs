//! 发件箱（Outbox）
//!
//! - `storage`：存储契约与条目模型（按关联 ID 分区）
//! - `in_memory`：进程内参考实现
//! - `manager`：写入、重放、重试退避与死信
//!
//! 以 `PublishMode::Outbox` 发布的事件先写入当前关联 ID 的分区，
//! 在 `Mediator::commit` / `Context::commit_outbox` 时经分发注册表重放。
//!
pub mod in_memory;
pub mod manager;
pub mod storage;

pub use in_memory::InMemoryOutboxStorage;
pub use manager::OutboxManager;
pub use storage::{OutboxEntry, OutboxEntryStatus, OutboxStorage};
