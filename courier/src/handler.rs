//! 处理器（Handler）
//!
//! - `RequestHandler<R>`：每种请求类型恰好一个
//! - `EventHandler<E>`：每种事件类型零个或多个，按注册顺序保存
//! - `StreamRequestHandler<R>`：返回惰性的 `ResultStream`
//!
use crate::context::Context;
use crate::error::MediatorResult;
use crate::message::{Event, Request, StreamRequest};
use async_trait::async_trait;
use futures_core::stream::BoxStream;
use std::sync::Arc;

/// 惰性结果流：每一项都是独立的 `MediatorResult`
pub type ResultStream<T> = BoxStream<'static, MediatorResult<T>>;

#[async_trait]
pub trait RequestHandler<R>: Send + Sync
where
    R: Request,
{
    async fn handle(&self, ctx: &Context, request: &R) -> MediatorResult<R::Response>;
}

#[async_trait]
pub trait EventHandler<E>: Send + Sync
where
    E: Event,
{
    /// 处理器名称（用于日志）
    fn handler_name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn handle(&self, ctx: &Context, event: &E) -> MediatorResult<()>;
}

/// 流式请求处理器。
///
/// 返回的流必须保持惰性：只有被轮询时才产生下一项。
/// 长时间运行的生产者应在每次产出之间检查 `ctx.cancellation_token()`。
pub trait StreamRequestHandler<R>: Send + Sync
where
    R: StreamRequest,
{
    fn handle(&self, ctx: Context, request: Arc<R>) -> ResultStream<R::Item>;
}
