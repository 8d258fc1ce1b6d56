//! 中介者（Mediator）
//!
//! 运行时的统一入口，同时承担发送者与发布者两种角色：
//! - `send` / `send_with_response`：请求经请求管道到达唯一的处理器
//! - `send_stream`：流式请求经流式管道返回惰性结果流
//! - `publish` / `publish_with`：事件立即分发，或写入发件箱延后投递
//! - `commit`：提交当前关联 ID 下的发件箱
//!
//! 所有处理器与行为在 `MediatorBuilder::build` 时确定，构建后不可变；
//! `Mediator` 内部为 `Arc`，可以低成本克隆并在任务之间共享。
//!
mod builder;

pub use builder::MediatorBuilder;

use crate::context::{Context, ContextBuilder};
use crate::dispatch::{DispatchRegistry, EventDispatcher};
use crate::distribution::{DistributionMode, PublishMode};
use crate::error::{MediatorError, MediatorResult};
use crate::handler::{RequestHandler, ResultStream, StreamRequestHandler};
use crate::message::{AnyMessage, Event, Request, StreamRequest};
use crate::options::MediatorOptions;
use crate::outbox::OutboxManager;
use crate::pipeline::request::{self as request_pipeline, RequestBehavior};
use crate::pipeline::stream::{self as stream_pipeline, StreamBehavior};
use crate::pipeline::{AnyItem, AnyResponse, Next, StreamNext, downcast_erased};
use futures_util::StreamExt;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{Instrument, debug, info_span, warn};

/// 请求类型 → `Arc<dyn RequestHandler<R>>` / `Arc<dyn StreamRequestHandler<R>>`（类型擦除存放）
pub(crate) type HandlerMap = HashMap<TypeId, Box<dyn Any + Send + Sync>>;

#[derive(Clone)]
pub struct Mediator {
    inner: Arc<MediatorInner>,
}

struct MediatorInner {
    requests: HandlerMap,
    streams: HandlerMap,
    request_behaviors: Vec<Arc<dyn RequestBehavior>>,
    stream_behaviors: Arc<[Arc<dyn StreamBehavior>]>,
    dispatcher: EventDispatcher,
    registry: DispatchRegistry,
    outbox: OutboxManager,
    options: MediatorOptions,
}

impl fmt::Debug for Mediator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mediator")
            .field("requests", &self.inner.requests.len())
            .field("streams", &self.inner.streams.len())
            .field("request_behaviors", &self.inner.request_behaviors.len())
            .field("stream_behaviors", &self.inner.stream_behaviors.len())
            .field("events", &self.inner.registry.registered_events())
            .field("options", &self.inner.options)
            .finish()
    }
}

impl Mediator {
    pub fn builder() -> MediatorBuilder {
        MediatorBuilder::new()
    }

    /// 按配置的上下文工厂创建新的操作上下文
    pub fn context(&self) -> Context {
        self.inner.options.context_factory.create(self)
    }

    pub fn context_builder(&self) -> ContextBuilder {
        ContextBuilder::new(self.clone())
    }

    pub fn options(&self) -> &MediatorOptions {
        &self.inner.options
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.inner.dispatcher
    }

    pub fn registry(&self) -> &DispatchRegistry {
        &self.inner.registry
    }

    pub fn outbox(&self) -> &OutboxManager {
        &self.inner.outbox
    }

    pub fn has_request_handler<R: Request>(&self) -> bool {
        self.inner.requests.contains_key(&TypeId::of::<R>())
    }

    pub fn has_stream_handler<R: StreamRequest>(&self) -> bool {
        self.inner.streams.contains_key(&TypeId::of::<R>())
    }

    fn request_handler<R: Request>(&self) -> MediatorResult<&dyn RequestHandler<R>> {
        self.inner
            .requests
            .get(&TypeId::of::<R>())
            .and_then(|h| h.downcast_ref::<Arc<dyn RequestHandler<R>>>())
            .map(|h| h.as_ref())
            .ok_or(MediatorError::MissingHandler {
                kind: "request",
                name: R::NAME,
            })
    }

    fn stream_handler<R: StreamRequest>(&self) -> MediatorResult<Arc<dyn StreamRequestHandler<R>>> {
        self.inner
            .streams
            .get(&TypeId::of::<R>())
            .and_then(|h| h.downcast_ref::<Arc<dyn StreamRequestHandler<R>>>())
            .cloned()
            .ok_or(MediatorError::MissingHandler {
                kind: "stream",
                name: R::NAME,
            })
    }

    fn ensure_active(ctx: &Context, name: &'static str) -> MediatorResult<()> {
        if ctx.is_cancelled() {
            debug!(correlation_id = %ctx.correlation_id(), request = name, "request refused, context cancelled");
            return Err(MediatorError::Cancelled);
        }
        Ok(())
    }

    /// 发送无返回值请求
    pub async fn send<R>(&self, ctx: &Context, request: R) -> MediatorResult<()>
    where
        R: Request<Response = ()>,
    {
        Self::ensure_active(ctx, R::NAME)?;
        let handler = self.request_handler::<R>()?;
        let span = info_span!(
            "mediator.request",
            correlation_id = %ctx.correlation_id(),
            request = R::NAME
        );

        let request = &request;
        let terminal = Next::new(move || handler.handle(ctx, request));
        let pipeline =
            request_pipeline::execute(&self.inner.request_behaviors, ctx, request, terminal);

        ctx.enter(pipeline).instrument(span).await
    }

    /// 发送有返回值请求
    pub async fn send_with_response<R>(&self, ctx: &Context, request: R) -> MediatorResult<R::Response>
    where
        R: Request,
    {
        Self::ensure_active(ctx, R::NAME)?;
        let handler = self.request_handler::<R>()?;
        let span = info_span!(
            "mediator.request",
            correlation_id = %ctx.correlation_id(),
            request = R::NAME
        );

        let request = &request;
        let terminal = Next::new(move || async move {
            let response = handler.handle(ctx, request).await?;
            Ok(Box::new(response) as AnyResponse)
        });
        let pipeline = request_pipeline::execute_with_response(
            &self.inner.request_behaviors,
            ctx,
            request,
            terminal,
        );

        let response = ctx.enter(pipeline).instrument(span).await?;
        downcast_erased::<R::Response>(response)
    }

    /// 发送流式请求。
    ///
    /// 返回的流保持惰性，并在每次产出之间检查上下文的取消令牌；
    /// 处理器与流式行为在被拉取时处于 `ctx` 的环境作用域内。
    pub fn send_stream<R>(&self, ctx: &Context, request: R) -> MediatorResult<ResultStream<R::Item>>
    where
        R: StreamRequest,
    {
        Self::ensure_active(ctx, R::NAME)?;
        let handler = self.stream_handler::<R>()?;
        let request = Arc::new(request);
        let stream = if self.inner.stream_behaviors.is_empty() {
            handler.handle(ctx.clone(), request)
        } else {
            let terminal = {
                let ctx = ctx.clone();
                let request = request.clone();
                StreamNext::new(move || {
                    handler
                        .handle(ctx, request)
                        .map(|item| item.map(|value| Box::new(value) as AnyItem))
                        .boxed()
                })
            };
            let erased: Arc<dyn AnyMessage> = request;
            stream_pipeline::execute(
                self.inner.stream_behaviors.clone(),
                0,
                ctx.clone(),
                erased,
                terminal,
            )
            .map(|item| item.and_then(downcast_erased::<R::Item>))
            .boxed()
        };

        Ok(stream_pipeline::until_cancelled(
            stream,
            ctx.clone(),
            R::NAME,
        ))
    }

    /// 按配置的默认发布方式发布事件，分发模式由路由器决定
    pub async fn publish<E: Event>(&self, ctx: &Context, event: E) -> MediatorResult<()> {
        self.publish_with(ctx, event, PublishMode::Default, DistributionMode::UNDEFINED)
            .await
    }

    /// 按指定发布方式与分发模式发布事件
    /// - `Now`：立即经分发器投递
    /// - `Outbox`：写入当前关联 ID 的发件箱，待 `commit` 时投递
    /// - `Default`：使用 `PublisherOptions::default_mode`
    pub async fn publish_with<E: Event>(
        &self,
        ctx: &Context,
        event: E,
        publish_mode: PublishMode,
        distribution: DistributionMode,
    ) -> MediatorResult<()> {
        let publish_mode = self.inner.options.publisher.resolve(publish_mode);

        let publish = async move {
            match publish_mode {
                PublishMode::Outbox => {
                    if !self.inner.registry.contains::<E>() {
                        warn!(
                            event = E::NAME,
                            "event stored in outbox has no dispatch registration, commit will dead-letter it"
                        );
                    }
                    let entry_id = self.inner.outbox.store(ctx, event, distribution).await?;
                    debug!(
                        correlation_id = %ctx.correlation_id(),
                        event = E::NAME,
                        %entry_id,
                        mode = %distribution,
                        "event stored in outbox"
                    );
                    Ok(())
                }
                PublishMode::Now | PublishMode::Default => {
                    self.inner
                        .dispatcher
                        .dispatch(ctx, &event, distribution)
                        .await
                }
            }
        };

        ctx.enter(publish).await
    }

    /// 投递当前关联 ID 下全部到期的发件箱条目
    pub async fn commit(&self, ctx: &Context) -> MediatorResult<()> {
        let process =
            self.inner
                .outbox
                .process_pending(ctx, &self.inner.dispatcher, &self.inner.registry);
        ctx.enter(process).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::EventHandler;
    use crate::message::Message;
    use crate::options::PublisherOptions;
    use async_trait::async_trait;
    use serde::Serialize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Echo(String);

    impl Message for Echo {
        const NAME: &'static str = "Echo";
    }

    impl Request for Echo {
        type Response = String;
    }

    struct EchoHandler;

    #[async_trait]
    impl RequestHandler<Echo> for EchoHandler {
        async fn handle(&self, ctx: &Context, request: &Echo) -> MediatorResult<String> {
            let current = Context::current().map(|c| c.ptr_eq(ctx));
            Ok(format!("{}:{:?}", request.0, current))
        }
    }

    #[derive(Serialize)]
    struct Shipped;

    impl Message for Shipped {
        const NAME: &'static str = "Shipped";
    }

    impl Event for Shipped {}

    struct Counter(Arc<AtomicUsize>);

    #[async_trait]
    impl EventHandler<Shipped> for Counter {
        async fn handle(&self, _ctx: &Context, _event: &Shipped) -> MediatorResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn send_enters_the_ambient_scope() {
        let mediator = Mediator::builder()
            .request_handler::<Echo, _>(Arc::new(EchoHandler))
            .build()
            .unwrap();

        let ctx = mediator.context();
        let reply = mediator
            .send_with_response(&ctx, Echo("hi".into()))
            .await
            .unwrap();
        assert_eq!(reply, "hi:Some(true)");
        assert!(Context::current().is_none());
    }

    #[tokio::test]
    async fn missing_handler_is_reported() {
        let mediator = Mediator::builder().build().unwrap();
        let ctx = mediator.context();

        let err = mediator
            .send_with_response(&ctx, Echo("x".into()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MediatorError::MissingHandler { kind: "request", name: "Echo" }
        ));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn cancelled_context_refuses_to_send() {
        let mediator = Mediator::builder()
            .request_handler::<Echo, _>(Arc::new(EchoHandler))
            .build()
            .unwrap();

        let ctx = mediator.context();
        ctx.cancel();
        assert!(matches!(
            mediator.send_with_response(&ctx, Echo("x".into())).await,
            Err(MediatorError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn default_publish_mode_follows_options() {
        let consumed = Arc::new(AtomicUsize::new(0));
        let mediator = Mediator::builder()
            .event_handler::<Shipped, _>(Arc::new(Counter(consumed.clone())))
            .options(
                MediatorOptions::builder()
                    .publisher(PublisherOptions::builder().default_mode(PublishMode::Outbox).build())
                    .build(),
            )
            .build()
            .unwrap();

        let ctx = mediator.context();
        mediator.publish(&ctx, Shipped).await.unwrap();
        assert_eq!(consumed.load(Ordering::SeqCst), 0);
        assert_eq!(mediator.outbox().pending(&ctx).await.unwrap().len(), 1);

        ctx.commit_outbox().await.unwrap();
        assert_eq!(consumed.load(Ordering::SeqCst), 1);
        assert!(mediator.outbox().pending(&ctx).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn context_publish_dispatches_immediately() {
        let consumed = Arc::new(AtomicUsize::new(0));
        let mediator = Mediator::builder()
            .event_handler::<Shipped, _>(Arc::new(Counter(consumed.clone())))
            .build()
            .unwrap();

        let ctx = mediator.context();
        ctx.publish_event(Shipped, PublishMode::Now, DistributionMode::LOCAL)
            .await
            .unwrap();
        assert_eq!(consumed.load(Ordering::SeqCst), 1);
    }
}
