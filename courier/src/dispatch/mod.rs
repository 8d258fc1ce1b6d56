//! 事件分发
//!
//! - `router`：按类型决定分发模式（静态特征 → 路由过滤器 → 默认值，结果按类型缓存）
//! - `orchestrator`：顺序/并发执行同一事件的全部处理器并合并结果
//! - `transport`：外部传输的抽象与默认的失败实现
//! - `registry`：事件类型 → 泛型分发调用，供发件箱重放使用
//! - `dispatcher`：组合以上组件完成一次事件分发
//!
pub mod dispatcher;
pub mod orchestrator;
pub mod registry;
pub mod router;
pub mod transport;

pub use dispatcher::EventDispatcher;
pub use orchestrator::{ConcurrentOrchestrator, EventOrchestrator, Invocation, SequentialOrchestrator};
pub use registry::{DispatchEntry, DispatchRegistry};
pub use router::{DistributionRouter, RoutingFilter};
pub use transport::{NoopTransportDispatcher, TransportDispatcher};
