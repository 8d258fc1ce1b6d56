//! 进程内中介者与事件分发运行时
//!
//! - 请求：经请求管道到达唯一的处理器，可无返回值、有返回值或返回惰性结果流
//! - 事件：经事件管道与分发路由，投递到本地处理器、外部传输或两者
//! - 发件箱：延后投递、指数退避重试与死信
//! - CQRS 边界守卫：阻止请求处理器再次发起顶层请求
//!
pub mod context;
pub mod dispatch;
pub mod distribution;
pub mod error;
pub mod handler;
pub mod mediator;
pub mod message;
pub mod metrics;
pub mod options;
pub mod outbox;
pub mod pipeline;

pub use context::Context;
pub use distribution::{DistributionMode, PublishMode};
pub use error::{MediatorError, MediatorResult};
pub use handler::{EventHandler, RequestHandler, ResultStream, StreamRequestHandler};
pub use mediator::{Mediator, MediatorBuilder};
pub use message::{AnyEvent, AnyMessage, Event, Message, Request, StreamRequest};
pub use options::MediatorOptions;

#[cfg(feature = "derive")]
pub use courier_macros::{Event, Request, StreamRequest};

// 允许在本 crate 内部通过 ::courier 进行自引用，
// 以便派生宏生成的路径在本 crate 内同样可以解析。
extern crate self as courier;
