//! 请求管道
//!
//! - `RequestBehavior`：无类型行为，同时覆盖无返回值与有返回值两种形态（默认直接放行）
//! - `TypedRequestBehavior<R>`：仅作用于请求类型 `R`，经 `TypedRequestBehaviorAdapter` 接入
//! - `ConditionalRequestBehavior`：谓词为真时才委托给内部行为
//!
use super::{AnyResponse, Next, downcast_erased};
use crate::context::Context;
use crate::error::MediatorResult;
use crate::message::{AnyMessage, Request};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::marker::PhantomData;
use std::sync::Arc;

pub type MessagePredicate = Arc<dyn Fn(&dyn AnyMessage) -> bool + Send + Sync>;

#[async_trait]
pub trait RequestBehavior: Send + Sync {
    /// 无返回值请求
    async fn handle(
        &self,
        _ctx: &Context,
        _request: &dyn AnyMessage,
        next: Next<'_, ()>,
    ) -> MediatorResult<()> {
        next.run().await
    }

    /// 有返回值请求；响应以类型擦除形式在链路中传递
    async fn handle_with_response(
        &self,
        _ctx: &Context,
        _request: &dyn AnyMessage,
        next: Next<'_, AnyResponse>,
    ) -> MediatorResult<AnyResponse> {
        next.run().await
    }
}

#[async_trait]
pub trait TypedRequestBehavior<R>: Send + Sync
where
    R: Request,
{
    async fn handle(
        &self,
        ctx: &Context,
        request: &R,
        next: Next<'_, R::Response>,
    ) -> MediatorResult<R::Response>;
}

/// 有类型行为 → 无类型行为：类型不匹配时直接调用 `next`
pub struct TypedRequestBehaviorAdapter<R, B> {
    inner: Arc<B>,
    _marker: PhantomData<fn() -> R>,
}

impl<R, B> TypedRequestBehaviorAdapter<R, B> {
    pub fn new(inner: Arc<B>) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<R, B> RequestBehavior for TypedRequestBehaviorAdapter<R, B>
where
    R: Request,
    B: TypedRequestBehavior<R> + 'static,
{
    async fn handle(
        &self,
        ctx: &Context,
        request: &dyn AnyMessage,
        next: Next<'_, ()>,
    ) -> MediatorResult<()> {
        let Some(typed) = request.downcast_ref::<R>() else {
            return next.run().await;
        };

        // 无返回值管道中 R::Response 即为 ()，经擦除还原以保持泛型
        let typed_next = Next::new(move || async move {
            next.run().await?;
            downcast_erased::<R::Response>(Box::new(()))
        });
        let response = self.inner.handle(ctx, typed, typed_next).await?;
        downcast_erased::<()>(Box::new(response))
    }

    async fn handle_with_response(
        &self,
        ctx: &Context,
        request: &dyn AnyMessage,
        next: Next<'_, AnyResponse>,
    ) -> MediatorResult<AnyResponse> {
        let Some(typed) = request.downcast_ref::<R>() else {
            return next.run().await;
        };

        let typed_next =
            Next::new(move || async move { downcast_erased::<R::Response>(next.run().await?) });
        let response = self.inner.handle(ctx, typed, typed_next).await?;
        Ok(Box::new(response) as AnyResponse)
    }
}

pub struct ConditionalRequestBehavior {
    inner: Arc<dyn RequestBehavior>,
    predicate: MessagePredicate,
}

impl ConditionalRequestBehavior {
    pub fn new<P>(inner: Arc<dyn RequestBehavior>, predicate: P) -> Self
    where
        P: Fn(&dyn AnyMessage) -> bool + Send + Sync + 'static,
    {
        Self {
            inner,
            predicate: Arc::new(predicate),
        }
    }
}

#[async_trait]
impl RequestBehavior for ConditionalRequestBehavior {
    async fn handle(
        &self,
        ctx: &Context,
        request: &dyn AnyMessage,
        next: Next<'_, ()>,
    ) -> MediatorResult<()> {
        if (self.predicate)(request) {
            self.inner.handle(ctx, request, next).await
        } else {
            next.run().await
        }
    }

    async fn handle_with_response(
        &self,
        ctx: &Context,
        request: &dyn AnyMessage,
        next: Next<'_, AnyResponse>,
    ) -> MediatorResult<AnyResponse> {
        if (self.predicate)(request) {
            self.inner.handle_with_response(ctx, request, next).await
        } else {
            next.run().await
        }
    }
}

/// 组合无返回值管道：`behaviors[0]` 最外层，`terminal` 为终端处理器调用
pub(crate) fn execute<'a>(
    behaviors: &'a [Arc<dyn RequestBehavior>],
    ctx: &'a Context,
    request: &'a dyn AnyMessage,
    terminal: Next<'a, ()>,
) -> BoxFuture<'a, MediatorResult<()>> {
    match behaviors.split_first() {
        None => terminal.run(),
        Some((behavior, rest)) => {
            let next = Next::new(move || execute(rest, ctx, request, terminal));
            behavior.handle(ctx, request, next)
        }
    }
}

/// 组合有返回值管道
pub(crate) fn execute_with_response<'a>(
    behaviors: &'a [Arc<dyn RequestBehavior>],
    ctx: &'a Context,
    request: &'a dyn AnyMessage,
    terminal: Next<'a, AnyResponse>,
) -> BoxFuture<'a, MediatorResult<AnyResponse>> {
    match behaviors.split_first() {
        None => terminal.run(),
        Some((behavior, rest)) => {
            let next = Next::new(move || execute_with_response(rest, ctx, request, terminal));
            behavior.handle_with_response(ctx, request, next)
        }
    }
}
