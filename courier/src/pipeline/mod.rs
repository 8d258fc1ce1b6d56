//! 处理管道（Pipeline）
//!
//! 行为（Behavior）按注册顺序右折叠包裹终端处理器：
//! `behavior₀(next → behavior₁(next → … → handler))`。
//!
//! 三条管道彼此独立：
//! - 请求管道（`request`）：无返回值与有返回值两种形态
//! - 事件管道（`event`）：终端为分发器（按分发模式投递）
//! - 流式管道（`stream`）：每个阶段包裹惰性结果流
//!
//! 行为分为无类型（作用于所有消息）与有类型（仅作用于特定消息类型）两种，
//! 有类型行为经适配器接入无类型链路：类型不匹配时直接调用 `next`。
//!
pub mod cqrs;
pub mod event;
pub mod logging;
pub mod request;
pub mod stream;
pub mod validation;

use crate::error::{MediatorError, MediatorResult};
use crate::handler::ResultStream;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use std::any::{Any, type_name};
use std::future::Future;

/// 类型擦除后的请求响应
pub type AnyResponse = Box<dyn Any + Send>;

/// 类型擦除后的流元素
pub type AnyItem = Box<dyn Any + Send>;

/// 管道中“剩余部分”的续延。
///
/// 由于消耗 `self`，每个行为最多只能调用一次；不调用即为短路。
pub struct Next<'a, T> {
    call: Box<dyn FnOnce() -> BoxFuture<'a, MediatorResult<T>> + Send + 'a>,
}

impl<'a, T: Send + 'a> Next<'a, T> {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = MediatorResult<T>> + Send + 'a,
    {
        Self {
            call: Box::new(move || f().boxed()),
        }
    }

    pub fn run(self) -> BoxFuture<'a, MediatorResult<T>> {
        (self.call)()
    }
}

/// 流式管道的续延：调用后得到剩余链路产生的惰性流
pub struct StreamNext<T> {
    call: Box<dyn FnOnce() -> ResultStream<T> + Send>,
}

impl<T: Send + 'static> StreamNext<T> {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() -> ResultStream<T> + Send + 'static,
    {
        Self { call: Box::new(f) }
    }

    pub fn run(self) -> ResultStream<T> {
        (self.call)()
    }
}

/// 还原类型擦除的值
pub(crate) fn downcast_erased<T: 'static>(value: Box<dyn Any + Send>) -> MediatorResult<T> {
    value
        .downcast::<T>()
        .map(|v| *v)
        .map_err(|_| MediatorError::TypeMismatch {
            expected: type_name::<T>(),
            found: "erased value of another type",
        })
}
