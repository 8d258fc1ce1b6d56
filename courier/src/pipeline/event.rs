//! 事件管道：行为包裹的终端为分发器（路由 → 本地/外部投递）
//!
use super::Next;
use crate::context::Context;
use crate::error::MediatorResult;
use crate::message::{AnyEvent, Event};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::marker::PhantomData;
use std::sync::Arc;

pub type EventPredicate = Arc<dyn Fn(&dyn AnyEvent) -> bool + Send + Sync>;

#[async_trait]
pub trait EventBehavior: Send + Sync {
    async fn handle(
        &self,
        ctx: &Context,
        event: &dyn AnyEvent,
        next: Next<'_, ()>,
    ) -> MediatorResult<()>;
}

#[async_trait]
pub trait TypedEventBehavior<E>: Send + Sync
where
    E: Event,
{
    async fn handle(&self, ctx: &Context, event: &E, next: Next<'_, ()>) -> MediatorResult<()>;
}

pub struct TypedEventBehaviorAdapter<E, B> {
    inner: Arc<B>,
    _marker: PhantomData<fn() -> E>,
}

impl<E, B> TypedEventBehaviorAdapter<E, B> {
    pub fn new(inner: Arc<B>) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<E, B> EventBehavior for TypedEventBehaviorAdapter<E, B>
where
    E: Event,
    B: TypedEventBehavior<E> + 'static,
{
    async fn handle(
        &self,
        ctx: &Context,
        event: &dyn AnyEvent,
        next: Next<'_, ()>,
    ) -> MediatorResult<()> {
        match event.downcast_ref::<E>() {
            Some(typed) => self.inner.handle(ctx, typed, next).await,
            None => next.run().await,
        }
    }
}

pub struct ConditionalEventBehavior {
    inner: Arc<dyn EventBehavior>,
    predicate: EventPredicate,
}

impl ConditionalEventBehavior {
    pub fn new<P>(inner: Arc<dyn EventBehavior>, predicate: P) -> Self
    where
        P: Fn(&dyn AnyEvent) -> bool + Send + Sync + 'static,
    {
        Self {
            inner,
            predicate: Arc::new(predicate),
        }
    }
}

#[async_trait]
impl EventBehavior for ConditionalEventBehavior {
    async fn handle(
        &self,
        ctx: &Context,
        event: &dyn AnyEvent,
        next: Next<'_, ()>,
    ) -> MediatorResult<()> {
        if (self.predicate)(event) {
            self.inner.handle(ctx, event, next).await
        } else {
            next.run().await
        }
    }
}

pub(crate) fn execute<'a>(
    behaviors: &'a [Arc<dyn EventBehavior>],
    ctx: &'a Context,
    event: &'a dyn AnyEvent,
    terminal: Next<'a, ()>,
) -> BoxFuture<'a, MediatorResult<()>> {
    match behaviors.split_first() {
        None => terminal.run(),
        Some((behavior, rest)) => {
            let next = Next::new(move || execute(rest, ctx, event, terminal));
            behavior.handle(ctx, event, next)
        }
    }
}
