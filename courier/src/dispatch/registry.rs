//! 分发注册表（Dispatch Registry）
//!
//! 事件具体类型 → 该类型泛型分发调用的函数指针。
//! 发件箱重放时只持有 `dyn AnyEvent`，借助注册表回到正确的 `EventDispatcher::dispatch::<E>`。
//! 同一类型重复注册时保留首次注册的条目。
//!
use super::dispatcher::EventDispatcher;
use crate::context::Context;
use crate::distribution::DistributionMode;
use crate::error::{MediatorError, MediatorResult};
use crate::message::{AnyEvent, Event};
use futures_util::future::BoxFuture;
use std::any::TypeId;
use std::collections::HashMap;
use std::collections::hash_map::Entry;

type DispatchFn = for<'a> fn(
    &'a EventDispatcher,
    &'a Context,
    &'a dyn AnyEvent,
    DistributionMode,
) -> BoxFuture<'a, MediatorResult<()>>;

#[derive(Clone, Copy)]
pub struct DispatchEntry {
    name: &'static str,
    dispatch: DispatchFn,
}

impl DispatchEntry {
    fn of<E: Event>() -> Self {
        Self {
            name: E::NAME,
            dispatch: dispatch_erased::<E>,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn invoke<'a>(
        &self,
        dispatcher: &'a EventDispatcher,
        ctx: &'a Context,
        event: &'a dyn AnyEvent,
        mode: DistributionMode,
    ) -> BoxFuture<'a, MediatorResult<()>> {
        (self.dispatch)(dispatcher, ctx, event, mode)
    }
}

fn dispatch_erased<'a, E: Event>(
    dispatcher: &'a EventDispatcher,
    ctx: &'a Context,
    event: &'a dyn AnyEvent,
    mode: DistributionMode,
) -> BoxFuture<'a, MediatorResult<()>> {
    Box::pin(async move {
        let Some(typed) = event.downcast_ref::<E>() else {
            return Err(MediatorError::TypeMismatch {
                expected: E::NAME,
                found: event.name(),
            });
        };
        dispatcher.dispatch(ctx, typed, mode).await
    })
}

#[derive(Default)]
pub struct DispatchRegistry {
    entries: HashMap<TypeId, DispatchEntry>,
}

impl DispatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册事件类型；已存在时返回 `false` 且不覆盖
    pub fn register<E: Event>(&mut self) -> bool {
        match self.entries.entry(TypeId::of::<E>()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(DispatchEntry::of::<E>());
                true
            }
        }
    }

    pub fn get(&self, event_type: TypeId) -> Option<&DispatchEntry> {
        self.entries.get(&event_type)
    }

    pub fn contains<E: Event>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<E>())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 已注册的事件名称（只读视图）
    pub fn registered_events(&self) -> Vec<&'static str> {
        self.entries.values().map(DispatchEntry::name).collect()
    }
}
