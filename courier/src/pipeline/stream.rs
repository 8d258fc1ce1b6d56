//! 流式管道
//!
//! 每个阶段接收“剩余链路产生惰性流”的续延，返回自己的惰性流：
//! 行为不应一次性收集整条流，而是逐项转发/过滤/计数。
//! 取消在每次产出之间检查（见 `until_cancelled`）。
//!
use super::{AnyItem, StreamNext, downcast_erased};
use crate::context::Context;
use crate::handler::ResultStream;
use crate::message::{AnyMessage, StreamRequest};
use futures_util::StreamExt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

pub use super::request::MessagePredicate;

pub trait StreamBehavior: Send + Sync {
    fn handle(
        &self,
        ctx: Context,
        request: Arc<dyn AnyMessage>,
        next: StreamNext<AnyItem>,
    ) -> ResultStream<AnyItem>;
}

pub trait TypedStreamBehavior<R>: Send + Sync
where
    R: StreamRequest,
{
    fn handle(
        &self,
        ctx: Context,
        request: Arc<R>,
        next: StreamNext<R::Item>,
    ) -> ResultStream<R::Item>;
}

pub struct TypedStreamBehaviorAdapter<R, B> {
    inner: Arc<B>,
    _marker: PhantomData<fn() -> R>,
}

impl<R, B> TypedStreamBehaviorAdapter<R, B> {
    pub fn new(inner: Arc<B>) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }
}

impl<R, B> StreamBehavior for TypedStreamBehaviorAdapter<R, B>
where
    R: StreamRequest,
    B: TypedStreamBehavior<R> + 'static,
{
    fn handle(
        &self,
        ctx: Context,
        request: Arc<dyn AnyMessage>,
        next: StreamNext<AnyItem>,
    ) -> ResultStream<AnyItem> {
        let Ok(typed) = request.into_any_arc().downcast::<R>() else {
            return next.run();
        };

        let typed_next = StreamNext::new(move || {
            next.run()
                .map(|item| item.and_then(downcast_erased::<R::Item>))
                .boxed()
        });

        self.inner
            .handle(ctx, typed, typed_next)
            .map(|item| item.map(|value| Box::new(value) as AnyItem))
            .boxed()
    }
}

pub struct ConditionalStreamBehavior {
    inner: Arc<dyn StreamBehavior>,
    predicate: MessagePredicate,
}

impl ConditionalStreamBehavior {
    pub fn new<P>(inner: Arc<dyn StreamBehavior>, predicate: P) -> Self
    where
        P: Fn(&dyn AnyMessage) -> bool + Send + Sync + 'static,
    {
        Self {
            inner,
            predicate: Arc::new(predicate),
        }
    }
}

impl StreamBehavior for ConditionalStreamBehavior {
    fn handle(
        &self,
        ctx: Context,
        request: Arc<dyn AnyMessage>,
        next: StreamNext<AnyItem>,
    ) -> ResultStream<AnyItem> {
        if (self.predicate)(request.as_ref()) {
            self.inner.handle(ctx, request, next)
        } else {
            next.run()
        }
    }
}

/// 组合流式管道：从 `index` 开始的行为依次包裹 `terminal`
pub(crate) fn execute(
    behaviors: Arc<[Arc<dyn StreamBehavior>]>,
    index: usize,
    ctx: Context,
    request: Arc<dyn AnyMessage>,
    terminal: StreamNext<AnyItem>,
) -> ResultStream<AnyItem> {
    let Some(behavior) = behaviors.get(index).cloned() else {
        return terminal.run();
    };

    let next = {
        let ctx = ctx.clone();
        let request = request.clone();
        StreamNext::new(move || execute(behaviors, index + 1, ctx, request, terminal))
    };
    behavior.handle(ctx, request, next)
}

/// 在每次产出之间检查取消；取消后流立即结束。
/// 每次拉取都在 `ctx` 的环境作用域内进行，流内部可通过 `Context::current()` 读取上下文。
pub(crate) fn until_cancelled<T: Send + 'static>(
    mut inner: ResultStream<T>,
    ctx: Context,
    request: &'static str,
) -> ResultStream<T> {
    let token = ctx.cancellation_token().clone();
    let guarded = async_stream::stream! {
        loop {
            let item = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!(request, "stream cancelled");
                    None
                }
                item = ctx.enter(inner.next()) => item,
            };

            match item {
                Some(item) => yield item,
                None => break,
            }
        }
    };
    guarded.boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mediator::Mediator;
    use futures_util::stream;
    use tokio_util::sync::CancellationToken;

    fn context(token: &CancellationToken) -> Context {
        Mediator::builder()
            .build()
            .unwrap()
            .context_builder()
            .cancellation_token(token.clone())
            .build()
    }

    #[tokio::test]
    async fn until_cancelled_stops_between_items() {
        let token = CancellationToken::new();
        let source: ResultStream<u32> = stream::iter((0..10).map(Ok)).boxed();
        let mut guarded = until_cancelled(source, context(&token), "Numbers");

        assert_eq!(guarded.next().await.unwrap().unwrap(), 0);
        assert_eq!(guarded.next().await.unwrap().unwrap(), 1);

        token.cancel();
        assert!(guarded.next().await.is_none());
    }

    #[tokio::test]
    async fn pre_cancelled_token_yields_nothing() {
        let token = CancellationToken::new();
        token.cancel();

        let source: ResultStream<u32> = stream::iter((0..3).map(Ok)).boxed();
        let items: Vec<_> = until_cancelled(source, context(&token), "Numbers")
            .collect()
            .await;
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn items_are_pulled_inside_the_ambient_scope() {
        let ctx = context(&CancellationToken::new());
        let expected = ctx.correlation_id();

        let source: ResultStream<Option<uuid::Uuid>> = async_stream::stream! {
            for _ in 0..2 {
                yield Ok(Context::current().map(|c| c.correlation_id()));
            }
        }
        .boxed();

        let seen: Vec<_> = until_cancelled(source, ctx, "Ambient")
            .map(|item| item.unwrap())
            .collect()
            .await;
        assert_eq!(seen, vec![Some(expected), Some(expected)]);
        assert!(Context::current().is_none());
    }
}
