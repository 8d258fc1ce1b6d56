//! 环境上下文：基于 `tokio::task_local!` 的“当前上下文”访问器。
//!
//! 仅在 `Context::scope` 包裹的异步调用链内可见，不同任务之间互不可见；
//! 新 `tokio::spawn` 出的任务不会继承，需要显式再次 `scope`。
//!
use super::Context;
use std::future::Future;

tokio::task_local! {
    static CURRENT: Context;
}

impl Context {
    /// 当前任务作用域内的上下文
    pub fn current() -> Option<Context> {
        CURRENT.try_with(Context::clone).ok()
    }

    /// 在以 `self` 为当前上下文的作用域内执行 `fut`
    pub async fn scope<F>(self, fut: F) -> F::Output
    where
        F: Future,
    {
        CURRENT.scope(self, fut).await
    }

    /// 进入作用域；若当前上下文已是 `self` 则不再嵌套
    pub(crate) async fn enter<F>(&self, fut: F) -> F::Output
    where
        F: Future,
    {
        match Self::current() {
            Some(current) if current.ptr_eq(self) => fut.await,
            _ => self.clone().scope(fut).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mediator::Mediator;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn current_is_scoped_to_the_task() {
        let mediator = Mediator::builder().build().unwrap();
        assert!(Context::current().is_none());

        let a = mediator.context();
        let b = mediator.context();
        let (a_id, b_id) = (a.correlation_id(), b.correlation_id());

        let task_a = tokio::spawn(a.scope(async move {
            tokio::task::yield_now().await;
            Context::current().map(|c| c.correlation_id())
        }));
        let task_b = tokio::spawn(b.scope(async move {
            tokio::task::yield_now().await;
            Context::current().map(|c| c.correlation_id())
        }));

        assert_eq!(task_a.await.unwrap(), Some(a_id));
        assert_eq!(task_b.await.unwrap(), Some(b_id));
        assert!(Context::current().is_none());
    }

    #[tokio::test]
    async fn enter_reuses_an_active_scope() {
        let mediator = Mediator::builder().build().unwrap();
        let outer = mediator.context();

        let seen = outer
            .clone()
            .scope(async {
                let inner = Context::current().unwrap();
                inner
                    .enter(async { Context::current().map(|c| c.correlation_id()) })
                    .await
            })
            .await;

        assert_eq!(seen, Some(outer.correlation_id()));
    }
}
