//! 发件箱管理器
//!
//! - `store`：将事件写入当前关联 ID 的分区
//! - `process_pending`：拉取到期条目（可按批次截断），经分发注册表逐个重放；
//!   成功则标记已处理，失败则按指数退避安排重试或进入死信。
//!   单个条目的失败不会影响同批次其余条目，全部结果合并后返回。
//!
use super::storage::{OutboxEntry, OutboxStorage};
use crate::context::Context;
use crate::dispatch::{DispatchRegistry, EventDispatcher};
use crate::distribution::DistributionMode;
use crate::error::{MediatorError, MediatorResult};
use crate::message::Event;
use crate::metrics::MediatorMetrics;
use crate::options::OutboxOptions;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

pub struct OutboxManager {
    storage: Arc<dyn OutboxStorage>,
    options: OutboxOptions,
    metrics: Arc<dyn MediatorMetrics>,
}

impl OutboxManager {
    pub fn new(
        storage: Arc<dyn OutboxStorage>,
        options: OutboxOptions,
        metrics: Arc<dyn MediatorMetrics>,
    ) -> Self {
        Self {
            storage,
            options,
            metrics,
        }
    }

    pub fn storage(&self) -> &Arc<dyn OutboxStorage> {
        &self.storage
    }

    pub fn options(&self) -> &OutboxOptions {
        &self.options
    }

    /// 写入发件箱；`UNDEFINED` 表示重放时再由路由器决定分发模式
    pub async fn store<E: Event>(
        &self,
        ctx: &Context,
        event: E,
        distribution_mode: DistributionMode,
    ) -> MediatorResult<Uuid> {
        self.storage
            .add(ctx.correlation_id(), Arc::new(event), distribution_mode)
            .await
    }

    pub async fn pending(&self, ctx: &Context) -> MediatorResult<Vec<OutboxEntry>> {
        self.storage.pending(ctx.correlation_id()).await
    }

    pub async fn dead_letters(&self, ctx: &Context) -> MediatorResult<Vec<OutboxEntry>> {
        self.storage.dead_letters(ctx.correlation_id()).await
    }

    pub async fn attempt_count(&self, ctx: &Context, entry_id: Uuid) -> MediatorResult<Option<u32>> {
        self.storage
            .attempt_count(ctx.correlation_id(), entry_id)
            .await
    }

    pub async fn distribution_mode(
        &self,
        ctx: &Context,
        entry_id: Uuid,
    ) -> MediatorResult<DistributionMode> {
        self.storage
            .distribution_mode(ctx.correlation_id(), entry_id)
            .await
    }

    pub async fn entries(&self, ctx: &Context) -> MediatorResult<Vec<OutboxEntry>> {
        self.storage.entries(ctx.correlation_id()).await
    }

    pub async fn clear(&self, ctx: &Context) -> MediatorResult<()> {
        self.storage.clear(ctx.correlation_id()).await
    }

    /// 处理当前关联 ID 下全部到期条目
    pub async fn process_pending(
        &self,
        ctx: &Context,
        dispatcher: &EventDispatcher,
        registry: &DispatchRegistry,
    ) -> MediatorResult<()> {
        let span = info_span!(
            "mediator.outbox.process",
            correlation_id = %ctx.correlation_id()
        );

        async move {
            let mut entries = self.storage.pending(ctx.correlation_id()).await?;
            self.metrics.record_outbox_depth(entries.len());
            if let Some(batch_size) = self.options.batch_size {
                entries.truncate(batch_size);
            }

            if entries.is_empty() {
                debug!("no pending outbox entries");
                return Ok(());
            }

            let total = entries.len();
            info!(total, batch_size = ?self.options.batch_size, "processing pending outbox entries");

            let mut results = Vec::with_capacity(total);
            for (index, entry) in entries.iter().enumerate() {
                if ctx.is_cancelled() {
                    warn!(remaining = total - index, "outbox processing cancelled");
                    results.push(Err(MediatorError::Cancelled));
                    break;
                }
                results.push(self.process_entry(ctx, dispatcher, registry, entry).await);
            }

            let result = MediatorError::combine(results);
            match &result {
                Ok(()) => info!(total, "outbox entries processed"),
                Err(e) => warn!(total, error = %e, "outbox processing completed with failures"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn process_entry(
        &self,
        ctx: &Context,
        dispatcher: &EventDispatcher,
        registry: &DispatchRegistry,
        entry: &OutboxEntry,
    ) -> MediatorResult<()> {
        let correlation_id = ctx.correlation_id();
        let event = entry.event_name();

        let Some(dispatch) = registry.get(entry.event().event_type_id()) else {
            let err = MediatorError::NoDispatcherRegistered(event.to_string());
            error!(event, entry_id = %entry.id(), "no dispatcher registered, dead-lettering outbox entry");
            self.dead_letter(correlation_id, entry, &err).await?;
            return Err(err);
        };

        let mode = self
            .storage
            .distribution_mode(correlation_id, entry.id())
            .await?;
        debug!(event, entry_id = %entry.id(), %mode, "dispatching outbox entry");

        match dispatch
            .invoke(dispatcher, ctx, entry.event().as_ref(), mode)
            .await
        {
            Ok(()) => {
                self.storage
                    .mark_processed(correlation_id, entry.id())
                    .await?;
                self.metrics.record_outbox_processed(event);
                Ok(())
            }
            // 取消不计入尝试次数，条目保持待处理
            Err(MediatorError::Cancelled) => {
                warn!(event, entry_id = %entry.id(), "outbox dispatch cancelled");
                Err(MediatorError::Cancelled)
            }
            Err(err) if err.is_fatal() => {
                error!(event, entry_id = %entry.id(), error = %err, "fatal outbox dispatch failure, dead-lettering");
                self.dead_letter(correlation_id, entry, &err).await?;
                Err(err)
            }
            Err(err) => {
                self.schedule_retry(correlation_id, entry, &err).await?;
                Err(MediatorError::Dispatch {
                    event: event.to_string(),
                    reason: err.to_string(),
                })
            }
        }
    }

    async fn dead_letter(
        &self,
        correlation_id: Uuid,
        entry: &OutboxEntry,
        err: &MediatorError,
    ) -> MediatorResult<()> {
        self.storage
            .mark_failed(correlation_id, entry.id(), &err.to_string(), true, None)
            .await?;
        self.metrics.record_dead_lettered(entry.event_name());
        Ok(())
    }

    async fn schedule_retry(
        &self,
        correlation_id: Uuid,
        entry: &OutboxEntry,
        err: &MediatorError,
    ) -> MediatorResult<()> {
        let event = entry.event_name();
        let attempts = self
            .storage
            .attempt_count(correlation_id, entry.id())
            .await?
            .unwrap_or(0);
        let attempt = attempts + 1;
        let max_attempts = self.options.max_retry_attempts;
        let dead_letter = attempt >= max_attempts;

        let next_attempt_at = if dead_letter {
            None
        } else {
            self.next_attempt_at(attempts)
        };

        if dead_letter {
            error!(
                event,
                attempt,
                max_attempts,
                error = %err,
                "outbox entry exceeded retry attempts, moving to dead letter"
            );
        } else {
            warn!(
                event,
                attempt,
                max_attempts,
                next_attempt_at = ?next_attempt_at,
                error = %err,
                "outbox dispatch failed, retry scheduled"
            );
        }

        self.storage
            .mark_failed(
                correlation_id,
                entry.id(),
                &err.to_string(),
                dead_letter,
                next_attempt_at,
            )
            .await?;

        if dead_letter {
            self.metrics.record_dead_lettered(event);
        } else {
            self.metrics.record_retry(event, attempt);
        }
        Ok(())
    }

    /// `now + initial_retry_delay × backoff_factor^attempts`；无延迟时为 `None`，
    /// 超出时间范围时封顶为 `DateTime::<Utc>::MAX_UTC`
    fn next_attempt_at(&self, attempts: u32) -> Option<DateTime<Utc>> {
        let delay = self.options.retry_delay(attempts)?;
        Some(retry_deadline(Utc::now(), delay))
    }
}

fn retry_deadline(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delay| now.checked_add_signed(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
