//! 事件编排器（Event Orchestrator）
//!
//! 执行单个事件绑定的全部处理器调用，并合并结果：
//! 全部成功才成功；任一失败则聚合全部失败信息。
//! 任何处理器的失败都不会阻止其余处理器执行。
//!
use crate::error::{MediatorError, MediatorResult};
use crate::options::DispatchStrategy;
use async_trait::async_trait;
use futures_util::future::{BoxFuture, join_all};
use std::sync::Arc;

/// 待执行的处理器调用；在被 await 之前不会开始执行
pub type Invocation<'a> = BoxFuture<'a, MediatorResult<()>>;

#[async_trait]
pub trait EventOrchestrator: Send + Sync {
    async fn run<'a>(&self, invocations: Vec<Invocation<'a>>) -> MediatorResult<()>;
}

/// 按注册顺序逐个执行
#[derive(Debug, Default, Clone, Copy)]
pub struct SequentialOrchestrator;

#[async_trait]
impl EventOrchestrator for SequentialOrchestrator {
    async fn run<'a>(&self, invocations: Vec<Invocation<'a>>) -> MediatorResult<()> {
        let mut results = Vec::with_capacity(invocations.len());
        for invocation in invocations {
            results.push(invocation.await);
        }
        MediatorError::combine(results)
    }
}

/// 并发执行并等待全部完成；不保证完成顺序
#[derive(Debug, Default, Clone, Copy)]
pub struct ConcurrentOrchestrator;

#[async_trait]
impl EventOrchestrator for ConcurrentOrchestrator {
    async fn run<'a>(&self, invocations: Vec<Invocation<'a>>) -> MediatorResult<()> {
        MediatorError::combine(join_all(invocations).await)
    }
}

impl DispatchStrategy {
    pub fn orchestrator(&self) -> Arc<dyn EventOrchestrator> {
        match self {
            Self::Sequential => Arc::new(SequentialOrchestrator),
            Self::Concurrent => Arc::new(ConcurrentOrchestrator),
        }
    }
}
