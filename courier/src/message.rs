//! 消息模型
//!
//! - `Message`：所有请求/事件的公共约束，提供稳定名称 `NAME`
//! - `Request`：单处理器消息，`Response = ()` 时走无返回值管道
//! - `StreamRequest`：处理器返回惰性结果流
//! - `Event`：广播消息，可被零个或多个处理器订阅
//! - `AnyMessage` / `AnyEvent`：类型擦除视图，供无类型行为、路由过滤器、传输与发件箱使用
//!
use serde::Serialize;
use std::any::{Any, TypeId};
use std::sync::Arc;

pub trait Message: Send + Sync + 'static {
    const NAME: &'static str;
}

pub trait Request: Message {
    type Response: Send + 'static;
}

pub trait StreamRequest: Message {
    type Item: Send + 'static;
}

pub trait Event: Message + Serialize {}

/// 类型擦除后的消息视图
pub trait AnyMessage: Any + Send + Sync {
    fn name(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<M: Message> AnyMessage for M {
    fn name(&self) -> &'static str {
        M::NAME
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl<'a> dyn AnyMessage + 'a {
    pub fn message_type_id(&self) -> TypeId {
        self.as_any().type_id()
    }

    pub fn is<T: Message>(&self) -> bool {
        self.as_any().is::<T>()
    }

    pub fn downcast_ref<T: Message>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// 类型擦除后的事件视图
pub trait AnyEvent: AnyMessage {
    /// 编码为 JSON，供外部传输使用
    fn to_json(&self) -> serde_json::Result<serde_json::Value>;

    fn as_message(&self) -> &dyn AnyMessage;
}

impl<E: Event> AnyEvent for E {
    fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    fn as_message(&self) -> &dyn AnyMessage {
        self
    }
}

impl<'a> dyn AnyEvent + 'a {
    pub fn event_type_id(&self) -> TypeId {
        self.as_any().type_id()
    }

    pub fn is<T: Event>(&self) -> bool {
        self.as_any().is::<T>()
    }

    pub fn downcast_ref<T: Event>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}
