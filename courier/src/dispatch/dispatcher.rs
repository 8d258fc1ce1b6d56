//! 事件分发器（EventDispatcher）
//!
//! 一次分发的流程：
//! 1. 分发模式为 `UNDEFINED` 时交由路由器解析
//! 2. 依次经过事件行为管道
//! 3. 按模式投递：本地（编排器执行处理器）、外部（传输）、或两者并发后合并结果
//!
use super::orchestrator::{EventOrchestrator, Invocation};
use super::router::DistributionRouter;
use super::transport::TransportDispatcher;
use crate::context::Context;
use crate::distribution::DistributionMode;
use crate::error::{MediatorError, MediatorResult};
use crate::handler::EventHandler;
use crate::message::Event;
use crate::metrics::MediatorMetrics;
use crate::pipeline::Next;
use crate::pipeline::event::{self as event_pipeline, EventBehavior};
use futures_util::FutureExt;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, debug, info_span, warn};

/// 事件类型 → `Vec<Arc<dyn EventHandler<E>>>`（类型擦除存放）
pub(crate) type EventHandlerMap = HashMap<TypeId, Box<dyn Any + Send + Sync>>;

pub struct EventDispatcher {
    handlers: EventHandlerMap,
    behaviors: Vec<Arc<dyn EventBehavior>>,
    router: DistributionRouter,
    orchestrator: Arc<dyn EventOrchestrator>,
    transport: Arc<dyn TransportDispatcher>,
    metrics: Arc<dyn MediatorMetrics>,
}

impl EventDispatcher {
    pub(crate) fn new(
        handlers: EventHandlerMap,
        behaviors: Vec<Arc<dyn EventBehavior>>,
        router: DistributionRouter,
        orchestrator: Arc<dyn EventOrchestrator>,
        transport: Arc<dyn TransportDispatcher>,
        metrics: Arc<dyn MediatorMetrics>,
    ) -> Self {
        Self {
            handlers,
            behaviors,
            router,
            orchestrator,
            transport,
            metrics,
        }
    }

    pub fn router(&self) -> &DistributionRouter {
        &self.router
    }

    pub fn handler_count<E: Event>(&self) -> usize {
        self.handlers_for::<E>().len()
    }

    fn handlers_for<E: Event>(&self) -> &[Arc<dyn EventHandler<E>>] {
        self.handlers
            .get(&TypeId::of::<E>())
            .and_then(|h| h.downcast_ref::<Vec<Arc<dyn EventHandler<E>>>>())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// 分发事件；`mode` 为 `UNDEFINED` 时由路由器决定
    pub async fn dispatch<E: Event>(
        &self,
        ctx: &Context,
        event: &E,
        mode: DistributionMode,
    ) -> MediatorResult<()> {
        let mode = if mode.is_undefined() {
            self.router.resolve(event)
        } else {
            mode
        };

        let span = info_span!(
            "mediator.event.dispatch",
            correlation_id = %ctx.correlation_id(),
            event = E::NAME,
            mode = %mode
        );

        async move {
            let started = Instant::now();
            let terminal = Next::new(move || self.dispatch_by_mode(ctx, event, mode));
            let result = event_pipeline::execute(&self.behaviors, ctx, event, terminal).await;

            self.metrics
                .record_dispatch_latency(E::NAME, mode, started.elapsed());
            self.metrics
                .record_event_dispatched(E::NAME, mode, result.is_ok());
            if let Err(e) = &result {
                warn!(error = %e, "event dispatch failed");
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn dispatch_by_mode<E: Event>(
        &self,
        ctx: &Context,
        event: &E,
        mode: DistributionMode,
    ) -> MediatorResult<()> {
        match (mode.is_local(), mode.is_external()) {
            (true, true) => {
                let (local, external) = tokio::join!(
                    self.dispatch_local(ctx, event),
                    self.dispatch_external(ctx, event)
                );
                let result = MediatorError::combine([local, external]);
                if let Err(e) = &result {
                    warn!(event = E::NAME, error = %e, "hybrid dispatch completed with failures");
                }
                result
            }
            (true, false) => self.dispatch_local(ctx, event).await,
            (false, true) => self.dispatch_external(ctx, event).await,
            (false, false) => Err(MediatorError::UnknownDistributionMode(mode.to_string())),
        }
    }

    async fn dispatch_local<E: Event>(&self, ctx: &Context, event: &E) -> MediatorResult<()> {
        let handlers = self.handlers_for::<E>();
        debug!(event = E::NAME, handlers = handlers.len(), "dispatching to local handlers");

        let invocations: Vec<Invocation<'_>> = handlers
            .iter()
            .map(|handler| self.consume(handler.as_ref(), ctx, event))
            .collect();
        self.orchestrator.run(invocations).await
    }

    fn consume<'a, E: Event>(
        &'a self,
        handler: &'a dyn EventHandler<E>,
        ctx: &'a Context,
        event: &'a E,
    ) -> Invocation<'a> {
        async move {
            let started = Instant::now();
            let result = handler.handle(ctx, event).await;
            self.metrics
                .record_consume_latency(E::NAME, started.elapsed());

            match &result {
                Ok(()) => self.metrics.record_consumed(E::NAME),
                Err(e) => warn!(
                    event = E::NAME,
                    handler = handler.handler_name(),
                    error = %e,
                    "event handler failed"
                ),
            }
            result
        }
        .boxed()
    }

    async fn dispatch_external<E: Event>(&self, ctx: &Context, event: &E) -> MediatorResult<()> {
        debug!(event = E::NAME, "dispatching to external transport");
        let started = Instant::now();
        let result = self.transport.dispatch(ctx, event).await;
        self.metrics
            .record_publish_latency(E::NAME, started.elapsed());
        if result.is_ok() {
            self.metrics.record_published(E::NAME);
        }
        result
    }
}
