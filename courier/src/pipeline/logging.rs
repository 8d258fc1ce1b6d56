//! 日志行为
//!
//! - `LoggingBehavior`：记录请求/事件名称、耗时与失败原因
//! - `LoggingEnrichmentBehavior`：以 span 包裹剩余链路，附带关联 ID 与上下文元数据，
//!   使处理器内部的日志自动携带这些字段
//!
use super::event::EventBehavior;
use super::request::RequestBehavior;
use super::{AnyResponse, Next};
use crate::context::Context;
use crate::error::MediatorResult;
use crate::message::{AnyEvent, AnyMessage};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::{Instrument, info, info_span, warn};

#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingBehavior;

fn elapsed_millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

impl LoggingBehavior {
    fn record<T>(kind: &'static str, name: &'static str, started: Instant, result: &MediatorResult<T>) {
        let elapsed_ms = elapsed_millis(started.elapsed());
        match result {
            Ok(_) => info!(kind, name, elapsed_ms, "handled"),
            Err(e) => warn!(kind, name, elapsed_ms, error = %e, "handled with error"),
        }
    }
}

#[async_trait]
impl RequestBehavior for LoggingBehavior {
    async fn handle(
        &self,
        _ctx: &Context,
        request: &dyn AnyMessage,
        next: Next<'_, ()>,
    ) -> MediatorResult<()> {
        let started = Instant::now();
        let result = next.run().await;
        Self::record("request", request.name(), started, &result);
        result
    }

    async fn handle_with_response(
        &self,
        _ctx: &Context,
        request: &dyn AnyMessage,
        next: Next<'_, AnyResponse>,
    ) -> MediatorResult<AnyResponse> {
        let started = Instant::now();
        let result = next.run().await;
        Self::record("request", request.name(), started, &result);
        result
    }
}

#[async_trait]
impl EventBehavior for LoggingBehavior {
    async fn handle(
        &self,
        _ctx: &Context,
        event: &dyn AnyEvent,
        next: Next<'_, ()>,
    ) -> MediatorResult<()> {
        let started = Instant::now();
        let result = next.run().await;
        Self::record("event", event.name(), started, &result);
        result
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEnrichmentBehavior;

impl LoggingEnrichmentBehavior {
    fn span(ctx: &Context, name: &'static str) -> tracing::Span {
        let metadata = serde_json::to_string(&ctx.metadata()).unwrap_or_default();
        info_span!(
            "mediator.context",
            correlation_id = %ctx.correlation_id(),
            name,
            metadata = %metadata
        )
    }
}

#[async_trait]
impl RequestBehavior for LoggingEnrichmentBehavior {
    async fn handle(
        &self,
        ctx: &Context,
        request: &dyn AnyMessage,
        next: Next<'_, ()>,
    ) -> MediatorResult<()> {
        next.run()
            .instrument(Self::span(ctx, request.name()))
            .await
    }

    async fn handle_with_response(
        &self,
        ctx: &Context,
        request: &dyn AnyMessage,
        next: Next<'_, AnyResponse>,
    ) -> MediatorResult<AnyResponse> {
        next.run()
            .instrument(Self::span(ctx, request.name()))
            .await
    }
}

#[async_trait]
impl EventBehavior for LoggingEnrichmentBehavior {
    async fn handle(
        &self,
        ctx: &Context,
        event: &dyn AnyEvent,
        next: Next<'_, ()>,
    ) -> MediatorResult<()> {
        next.run().instrument(Self::span(ctx, event.name())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_millis_saturates() {
        assert_eq!(elapsed_millis(Duration::from_millis(1500)), 1500);
        assert_eq!(elapsed_millis(Duration::MAX), u64::MAX);
    }
}
