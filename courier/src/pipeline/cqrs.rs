//! CQRS 边界守卫
//!
//! 在请求处理期间于上下文元数据中写入“处理中”标记；
//! 若标记已存在，说明某个请求处理器又发起了顶层请求，立即以
//! `CqrsBoundaryViolation` 失败（同时给出当前请求与新请求的名称）。
//! 处理结束后移除标记；标记意外缺失视为被篡改，返回 `CqrsBoundaryTampered`。
//!
use super::{AnyResponse, Next};
use crate::context::Context;
use crate::error::{MediatorError, MediatorResult};
use crate::message::AnyMessage;
use async_trait::async_trait;
use tracing::{debug, error};

use super::request::RequestBehavior;

pub const BOUNDARY_KEY: &str = "__cqrs_boundary";
pub const BOUNDARY_REQUEST_KEY: &str = "__cqrs_boundary_request";

#[derive(Debug, Default, Clone, Copy)]
pub struct CqrsBoundaryBehavior;

impl CqrsBoundaryBehavior {
    fn enter(ctx: &Context, request: &'static str) -> MediatorResult<()> {
        if ctx.try_get_metadata::<bool>(BOUNDARY_KEY).unwrap_or(false) {
            let active = ctx
                .try_get_metadata::<String>(BOUNDARY_REQUEST_KEY)
                .unwrap_or_default();
            error!(
                correlation_id = %ctx.correlation_id(),
                active = %active,
                attempted = request,
                "cqrs boundary violation"
            );
            return Err(MediatorError::CqrsBoundaryViolation {
                active,
                attempted: request,
            });
        }

        ctx.set_metadata(BOUNDARY_KEY, true);
        ctx.set_metadata(BOUNDARY_REQUEST_KEY, request);
        Ok(())
    }

    fn leave(ctx: &Context, request: &'static str) -> MediatorResult<()> {
        if !ctx.remove_metadata(BOUNDARY_KEY) {
            error!(
                correlation_id = %ctx.correlation_id(),
                request,
                "cqrs boundary marker missing on exit"
            );
            return Err(MediatorError::CqrsBoundaryTampered { request });
        }
        ctx.remove_metadata(BOUNDARY_REQUEST_KEY);
        Ok(())
    }

    async fn guard<T: Send + 'static>(
        ctx: &Context,
        request: &'static str,
        next: Next<'_, T>,
    ) -> MediatorResult<T> {
        Self::enter(ctx, request)?;
        let marker = BoundaryMarker::new(ctx, request);
        let result = next.run().await;
        marker.disarm();
        Self::leave(ctx, request)?;
        result
    }
}

/// 请求 future 在处理中途被丢弃时（超时、`select!`），清理遗留的边界标记
struct BoundaryMarker {
    ctx: Context,
    request: &'static str,
    armed: bool,
}

impl BoundaryMarker {
    fn new(ctx: &Context, request: &'static str) -> Self {
        Self {
            ctx: ctx.clone(),
            request,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for BoundaryMarker {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        debug!(
            correlation_id = %self.ctx.correlation_id(),
            request = self.request,
            "request dropped inside cqrs boundary, clearing marker"
        );
        self.ctx.remove_metadata(BOUNDARY_KEY);
        self.ctx.remove_metadata(BOUNDARY_REQUEST_KEY);
    }
}

#[async_trait]
impl RequestBehavior for CqrsBoundaryBehavior {
    async fn handle(
        &self,
        ctx: &Context,
        request: &dyn AnyMessage,
        next: Next<'_, ()>,
    ) -> MediatorResult<()> {
        Self::guard(ctx, request.name(), next).await
    }

    async fn handle_with_response(
        &self,
        ctx: &Context,
        request: &dyn AnyMessage,
        next: Next<'_, AnyResponse>,
    ) -> MediatorResult<AnyResponse> {
        Self::guard(ctx, request.name(), next).await
    }
}
