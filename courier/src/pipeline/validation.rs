//! 请求校验
//!
//! 同一请求类型的全部校验器合并为一个 `ValidationBehavior<R>`：
//! 依次执行所有校验器，汇总失败信息为 `MediatorError::Validation`，
//! 任一失败即短路，不再调用后续链路。
//!
use super::Next;
use super::request::TypedRequestBehavior;
use crate::context::Context;
use crate::error::{MediatorError, MediatorResult};
use crate::message::Request;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

#[async_trait]
pub trait RequestValidator<R>: Send + Sync
where
    R: Request,
{
    async fn validate(&self, ctx: &Context, request: &R) -> MediatorResult<()>;
}

pub struct ValidationBehavior<R> {
    validators: Vec<Arc<dyn RequestValidator<R>>>,
}

impl<R: Request> Default for ValidationBehavior<R> {
    fn default() -> Self {
        Self {
            validators: Vec::new(),
        }
    }
}

impl<R: Request> ValidationBehavior<R> {
    pub fn new(validators: Vec<Arc<dyn RequestValidator<R>>>) -> Self {
        Self { validators }
    }

    pub fn push(&mut self, validator: Arc<dyn RequestValidator<R>>) {
        self.validators.push(validator);
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// 执行全部校验器并合并失败信息
    pub async fn validate(&self, ctx: &Context, request: &R) -> MediatorResult<()> {
        let mut messages = Vec::new();
        for validator in &self.validators {
            let Err(err) = validator.validate(ctx, request).await else {
                continue;
            };
            for err in err.into_errors() {
                match err {
                    MediatorError::Validation(inner) => messages.extend(inner),
                    other => messages.push(other.to_string()),
                }
            }
        }

        if messages.is_empty() {
            return Ok(());
        }

        debug!(request = R::NAME, failures = messages.len(), "request rejected by validation");
        Err(MediatorError::Validation(messages))
    }
}

#[async_trait]
impl<R: Request> TypedRequestBehavior<R> for ValidationBehavior<R> {
    async fn handle(
        &self,
        ctx: &Context,
        request: &R,
        next: Next<'_, R::Response>,
    ) -> MediatorResult<R::Response> {
        self.validate(ctx, request).await?;
        next.run().await
    }
}
