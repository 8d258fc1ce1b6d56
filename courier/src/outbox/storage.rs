//! 发件箱存储契约
//!
//! 存储按关联 ID 分区，调用方显式传入分区键；条目以生成的 UUID 标识。
//! `processed` 与 `dead_letter` 为互斥的终态，进入终态后条目不再变化。
//!
use crate::distribution::DistributionMode;
use crate::error::MediatorResult;
use crate::message::AnyEvent;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxEntryStatus {
    /// 等待投递（可能带有下次尝试时间）
    Pending,
    Processed,
    DeadLettered,
}

#[derive(Clone)]
pub struct OutboxEntry {
    id: Uuid,
    event: Arc<dyn AnyEvent>,
    distribution_mode: DistributionMode,
    processed: bool,
    dead_letter: bool,
    attempts: u32,
    last_error: Option<String>,
    next_attempt_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for OutboxEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboxEntry")
            .field("id", &self.id)
            .field("event", &self.event.name())
            .field("distribution_mode", &self.distribution_mode)
            .field("status", &self.status())
            .field("attempts", &self.attempts)
            .field("last_error", &self.last_error)
            .field("next_attempt_at", &self.next_attempt_at)
            .finish()
    }
}

impl OutboxEntry {
    pub fn new(event: Arc<dyn AnyEvent>, distribution_mode: DistributionMode) -> Self {
        Self {
            id: Uuid::now_v7(),
            event,
            distribution_mode,
            processed: false,
            dead_letter: false,
            attempts: 0,
            last_error: None,
            next_attempt_at: None,
            created_at: Utc::now(),
            processed_at: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn event(&self) -> &Arc<dyn AnyEvent> {
        &self.event
    }

    pub fn event_name(&self) -> &'static str {
        self.event.name()
    }

    pub fn distribution_mode(&self) -> DistributionMode {
        self.distribution_mode
    }

    pub fn is_processed(&self) -> bool {
        self.processed
    }

    pub fn is_dead_letter(&self) -> bool {
        self.dead_letter
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn next_attempt_at(&self) -> Option<DateTime<Utc>> {
        self.next_attempt_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn processed_at(&self) -> Option<DateTime<Utc>> {
        self.processed_at
    }

    pub fn status(&self) -> OutboxEntryStatus {
        if self.processed {
            OutboxEntryStatus::Processed
        } else if self.dead_letter {
            OutboxEntryStatus::DeadLettered
        } else {
            OutboxEntryStatus::Pending
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.processed || self.dead_letter
    }

    /// 未处于终态，且没有下次尝试时间或该时间已到
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.is_terminal() && self.next_attempt_at.is_none_or(|at| at <= now)
    }

    /// 标记为已处理；终态条目不会被修改，返回 `false`
    pub fn mark_processed(&mut self, at: DateTime<Utc>) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.processed = true;
        self.processed_at = Some(at);
        self.last_error = None;
        self.next_attempt_at = None;
        true
    }

    /// 记录一次失败：尝试次数加一；进入死信时清除下次尝试时间。
    /// 终态条目不会被修改，返回 `false`
    pub fn mark_failed(
        &mut self,
        reason: impl Into<String>,
        dead_letter: bool,
        next_attempt_at: Option<DateTime<Utc>>,
    ) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.attempts += 1;
        self.last_error = Some(reason.into());
        if dead_letter {
            self.dead_letter = true;
            self.next_attempt_at = None;
        } else {
            self.next_attempt_at = next_attempt_at;
        }
        true
    }
}

#[async_trait]
pub trait OutboxStorage: Send + Sync {
    /// 追加条目，返回条目 ID
    async fn add(
        &self,
        correlation_id: Uuid,
        event: Arc<dyn AnyEvent>,
        distribution_mode: DistributionMode,
    ) -> MediatorResult<Uuid>;

    /// 到期待投递的条目（按写入顺序）
    async fn pending(&self, correlation_id: Uuid) -> MediatorResult<Vec<OutboxEntry>>;

    async fn mark_processed(&self, correlation_id: Uuid, entry_id: Uuid) -> MediatorResult<()>;

    async fn mark_failed(
        &self,
        correlation_id: Uuid,
        entry_id: Uuid,
        reason: &str,
        dead_letter: bool,
        next_attempt_at: Option<DateTime<Utc>>,
    ) -> MediatorResult<()>;

    async fn dead_letters(&self, correlation_id: Uuid) -> MediatorResult<Vec<OutboxEntry>>;

    /// 条目不存在时返回 `None`
    async fn attempt_count(&self, correlation_id: Uuid, entry_id: Uuid)
    -> MediatorResult<Option<u32>>;

    /// 条目不存在时返回 `LOCAL`
    async fn distribution_mode(
        &self,
        correlation_id: Uuid,
        entry_id: Uuid,
    ) -> MediatorResult<DistributionMode>;

    /// 分区内全部条目（含终态）
    async fn entries(&self, correlation_id: Uuid) -> MediatorResult<Vec<OutboxEntry>>;

    /// 丢弃整个分区
    async fn clear(&self, correlation_id: Uuid) -> MediatorResult<()>;
}
