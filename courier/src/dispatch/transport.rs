//! 外部传输
//!
//! 运行时只调用抽象的 `TransportDispatcher`，具体的消息中间件协议由使用方实现。
//! 未注册传输时使用 `NoopTransportDispatcher`，任何外部分发都会明确失败。
//!
use crate::context::Context;
use crate::error::{MediatorError, MediatorResult};
use crate::message::AnyEvent;
use async_trait::async_trait;
use tracing::error;

#[async_trait]
pub trait TransportDispatcher: Send + Sync {
    async fn dispatch(&self, ctx: &Context, event: &dyn AnyEvent) -> MediatorResult<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTransportDispatcher;

#[async_trait]
impl TransportDispatcher for NoopTransportDispatcher {
    async fn dispatch(&self, ctx: &Context, event: &dyn AnyEvent) -> MediatorResult<()> {
        error!(
            correlation_id = %ctx.correlation_id(),
            event = event.name(),
            "external dispatch requested but no transport dispatcher is registered"
        );
        Err(MediatorError::transport("no transport dispatcher is registered"))
    }
}
