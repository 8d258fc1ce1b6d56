//! 显式注册构建器
//!
//! 处理器、行为、路由与基础设施都在启动时通过类型参数注册到按 `TypeId` 索引的表中，
//! 不依赖运行时的类型扫描。
//!
//! 请求行为按注册顺序组成管道；`validator::<R>()` 在首次调用的位置为 `R`
//! 占据一个校验槽位，之后同一请求类型的校验器都并入该槽位。
//! 开启 CQRS 边界守卫时，守卫总是位于请求管道的最外层。
//!
use super::{HandlerMap, Mediator, MediatorInner};
use crate::dispatch::dispatcher::EventHandlerMap;
use crate::dispatch::{
    DispatchRegistry, DistributionRouter, EventDispatcher, EventOrchestrator,
    NoopTransportDispatcher, RoutingFilter, TransportDispatcher,
};
use crate::distribution::DistributionMode;
use crate::error::{MediatorError, MediatorResult};
use crate::handler::{EventHandler, RequestHandler, StreamRequestHandler};
use crate::message::{AnyEvent, AnyMessage, Event, Request, StreamRequest};
use crate::metrics::{MediatorMetrics, NoopMetrics};
use crate::options::MediatorOptions;
use crate::outbox::{InMemoryOutboxStorage, OutboxManager, OutboxStorage};
use crate::pipeline::cqrs::CqrsBoundaryBehavior;
use crate::pipeline::event::{ConditionalEventBehavior, EventBehavior, TypedEventBehavior, TypedEventBehaviorAdapter};
use crate::pipeline::request::{
    ConditionalRequestBehavior, RequestBehavior, TypedRequestBehavior, TypedRequestBehaviorAdapter,
};
use crate::pipeline::stream::{
    ConditionalStreamBehavior, StreamBehavior, TypedStreamBehavior, TypedStreamBehaviorAdapter,
};
use crate::pipeline::validation::{RequestValidator, ValidationBehavior};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tracing::debug;

/// 尚未定型的校验槽位：构建时转换为请求行为
trait ValidationSlot: Send + Sync {
    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn finish(self: Box<Self>) -> Arc<dyn RequestBehavior>;
}

impl<R: Request> ValidationSlot for ValidationBehavior<R> {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn finish(self: Box<Self>) -> Arc<dyn RequestBehavior> {
        Arc::new(TypedRequestBehaviorAdapter::<R, _>::new(Arc::new(*self)))
    }
}

enum RequestBehaviorSlot {
    Behavior(Arc<dyn RequestBehavior>),
    Validation(Box<dyn ValidationSlot>),
}

impl RequestBehaviorSlot {
    fn finish(self) -> Arc<dyn RequestBehavior> {
        match self {
            Self::Behavior(behavior) => behavior,
            Self::Validation(slot) => slot.finish(),
        }
    }
}

pub struct MediatorBuilder {
    requests: HandlerMap,
    streams: HandlerMap,
    events: EventHandlerMap,
    registry: DispatchRegistry,
    traits: HashMap<TypeId, DistributionMode>,
    request_behaviors: Vec<RequestBehaviorSlot>,
    validation_slots: HashMap<TypeId, usize>,
    event_behaviors: Vec<Arc<dyn EventBehavior>>,
    stream_behaviors: Vec<Arc<dyn StreamBehavior>>,
    filters: Vec<Arc<dyn RoutingFilter>>,
    transport: Option<Arc<dyn TransportDispatcher>>,
    orchestrator: Option<Arc<dyn EventOrchestrator>>,
    storage: Option<Arc<dyn OutboxStorage>>,
    metrics: Option<Arc<dyn MediatorMetrics>>,
    options: MediatorOptions,
    cqrs_boundary: bool,
    errors: Vec<MediatorError>,
}

impl Default for MediatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MediatorBuilder {
    pub fn new() -> Self {
        Self {
            requests: HashMap::new(),
            streams: HashMap::new(),
            events: HashMap::new(),
            registry: DispatchRegistry::new(),
            traits: HashMap::new(),
            request_behaviors: Vec::new(),
            validation_slots: HashMap::new(),
            event_behaviors: Vec::new(),
            stream_behaviors: Vec::new(),
            filters: Vec::new(),
            transport: None,
            orchestrator: None,
            storage: None,
            metrics: None,
            options: MediatorOptions::default(),
            cqrs_boundary: false,
            errors: Vec::new(),
        }
    }

    // ---------- 处理器 ----------

    /// 注册请求处理器；同一请求类型重复注册会在 `build` 时报错
    pub fn request_handler<R, H>(mut self, handler: Arc<H>) -> Self
    where
        R: Request,
        H: RequestHandler<R> + 'static,
    {
        let handler: Arc<dyn RequestHandler<R>> = handler;
        match self.requests.entry(TypeId::of::<R>()) {
            Entry::Occupied(_) => self.errors.push(MediatorError::AlreadyRegistered {
                kind: "request",
                name: R::NAME,
            }),
            Entry::Vacant(slot) => {
                slot.insert(Box::new(handler));
            }
        }
        self
    }

    pub fn stream_handler<R, H>(mut self, handler: Arc<H>) -> Self
    where
        R: StreamRequest,
        H: StreamRequestHandler<R> + 'static,
    {
        let handler: Arc<dyn StreamRequestHandler<R>> = handler;
        match self.streams.entry(TypeId::of::<R>()) {
            Entry::Occupied(_) => self.errors.push(MediatorError::AlreadyRegistered {
                kind: "stream",
                name: R::NAME,
            }),
            Entry::Vacant(slot) => {
                slot.insert(Box::new(handler));
            }
        }
        self
    }

    /// 注册事件处理器（同一事件可注册多个，按注册顺序执行），并登记到分发注册表
    pub fn event_handler<E, H>(mut self, handler: Arc<H>) -> Self
    where
        E: Event,
        H: EventHandler<E> + 'static,
    {
        let handler: Arc<dyn EventHandler<E>> = handler;
        let handlers = self
            .events
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Box::new(Vec::<Arc<dyn EventHandler<E>>>::new()));
        if let Some(handlers) = handlers.downcast_mut::<Vec<Arc<dyn EventHandler<E>>>>() {
            handlers.push(handler);
        }
        self.registry.register::<E>();
        self
    }

    /// 仅登记到分发注册表（例如只走外部传输、没有本地处理器的事件）
    pub fn event<E: Event>(mut self) -> Self {
        self.registry.register::<E>();
        self
    }

    /// 为事件类型声明静态分发模式，优先于路由过滤器
    pub fn publish_trait<E: Event>(mut self, mode: DistributionMode) -> Self {
        self.traits.insert(TypeId::of::<E>(), mode);
        self.registry.register::<E>();
        self
    }

    // ---------- 请求行为 ----------

    pub fn request_behavior<B>(mut self, behavior: Arc<B>) -> Self
    where
        B: RequestBehavior + 'static,
    {
        self.request_behaviors
            .push(RequestBehaviorSlot::Behavior(behavior));
        self
    }

    pub fn typed_request_behavior<R, B>(self, behavior: Arc<B>) -> Self
    where
        R: Request,
        B: TypedRequestBehavior<R> + 'static,
    {
        self.request_behavior(Arc::new(TypedRequestBehaviorAdapter::<R, B>::new(behavior)))
    }

    pub fn conditional_request_behavior<B, P>(mut self, behavior: Arc<B>, predicate: P) -> Self
    where
        B: RequestBehavior + 'static,
        P: Fn(&dyn AnyMessage) -> bool + Send + Sync + 'static,
    {
        let conditional = ConditionalRequestBehavior::new(behavior, predicate);
        self.request_behaviors
            .push(RequestBehaviorSlot::Behavior(Arc::new(conditional)));
        self
    }

    /// 有类型的条件行为：谓词直接作用于 `&R`
    pub fn conditional_typed_request_behavior<R, B, P>(self, behavior: Arc<B>, predicate: P) -> Self
    where
        R: Request,
        B: TypedRequestBehavior<R> + 'static,
        P: Fn(&R) -> bool + Send + Sync + 'static,
    {
        let adapter = Arc::new(TypedRequestBehaviorAdapter::<R, B>::new(behavior));
        self.conditional_request_behavior(adapter, move |request: &dyn AnyMessage| {
            request.downcast_ref::<R>().is_some_and(&predicate)
        })
    }

    /// 为请求类型 `R` 添加校验器
    pub fn validator<R, V>(mut self, validator: Arc<V>) -> Self
    where
        R: Request,
        V: RequestValidator<R> + 'static,
    {
        let behaviors = &mut self.request_behaviors;
        let index = *self
            .validation_slots
            .entry(TypeId::of::<R>())
            .or_insert_with(|| {
                behaviors.push(RequestBehaviorSlot::Validation(Box::new(
                    ValidationBehavior::<R>::default(),
                )));
                behaviors.len() - 1
            });

        if let Some(RequestBehaviorSlot::Validation(slot)) = behaviors.get_mut(index) {
            if let Some(validation) = slot.as_any_mut().downcast_mut::<ValidationBehavior<R>>() {
                validation.push(validator);
            }
        }
        self
    }

    pub fn enable_cqrs_boundary_enforcement(mut self) -> Self {
        self.cqrs_boundary = true;
        self
    }

    // ---------- 事件行为 ----------

    pub fn event_behavior<B>(mut self, behavior: Arc<B>) -> Self
    where
        B: EventBehavior + 'static,
    {
        self.event_behaviors.push(behavior);
        self
    }

    pub fn typed_event_behavior<E, B>(self, behavior: Arc<B>) -> Self
    where
        E: Event,
        B: TypedEventBehavior<E> + 'static,
    {
        self.event_behavior(Arc::new(TypedEventBehaviorAdapter::<E, B>::new(behavior)))
    }

    pub fn conditional_event_behavior<B, P>(mut self, behavior: Arc<B>, predicate: P) -> Self
    where
        B: EventBehavior + 'static,
        P: Fn(&dyn AnyEvent) -> bool + Send + Sync + 'static,
    {
        self.event_behaviors
            .push(Arc::new(ConditionalEventBehavior::new(behavior, predicate)));
        self
    }

    // ---------- 流式行为 ----------

    pub fn stream_behavior<B>(mut self, behavior: Arc<B>) -> Self
    where
        B: StreamBehavior + 'static,
    {
        self.stream_behaviors.push(behavior);
        self
    }

    pub fn typed_stream_behavior<R, B>(self, behavior: Arc<B>) -> Self
    where
        R: StreamRequest,
        B: TypedStreamBehavior<R> + 'static,
    {
        self.stream_behavior(Arc::new(TypedStreamBehaviorAdapter::<R, B>::new(behavior)))
    }

    pub fn conditional_stream_behavior<B, P>(mut self, behavior: Arc<B>, predicate: P) -> Self
    where
        B: StreamBehavior + 'static,
        P: Fn(&dyn AnyMessage) -> bool + Send + Sync + 'static,
    {
        self.stream_behaviors
            .push(Arc::new(ConditionalStreamBehavior::new(behavior, predicate)));
        self
    }

    // ---------- 基础设施 ----------

    pub fn routing_filter<F>(mut self, filter: Arc<F>) -> Self
    where
        F: RoutingFilter + 'static,
    {
        self.filters.push(filter);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn TransportDispatcher>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// 覆盖 `DispatcherOptions::dispatch_strategy` 决定的编排器
    pub fn orchestrator(mut self, orchestrator: Arc<dyn EventOrchestrator>) -> Self {
        self.orchestrator = Some(orchestrator);
        self
    }

    pub fn outbox_storage(mut self, storage: Arc<dyn OutboxStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn MediatorMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn options(mut self, options: MediatorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(mut self) -> MediatorResult<Mediator> {
        if let Err(e) = self.options.validate() {
            self.errors.push(e);
        }
        MediatorError::combine(self.errors.into_iter().map(Err))?;

        let options = self.options;
        let metrics = self.metrics.unwrap_or_else(|| Arc::new(NoopMetrics));
        let orchestrator = self
            .orchestrator
            .unwrap_or_else(|| options.dispatcher.dispatch_strategy.orchestrator());
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(NoopTransportDispatcher));
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(InMemoryOutboxStorage::new()));

        let mut request_behaviors: Vec<Arc<dyn RequestBehavior>> = Vec::new();
        if self.cqrs_boundary {
            request_behaviors.push(Arc::new(CqrsBoundaryBehavior));
        }
        request_behaviors.extend(
            self.request_behaviors
                .into_iter()
                .map(RequestBehaviorSlot::finish),
        );

        let router = DistributionRouter::new(
            self.traits,
            self.filters,
            options.dispatcher.default_distribution_mode,
        );
        let dispatcher = EventDispatcher::new(
            self.events,
            self.event_behaviors,
            router,
            orchestrator,
            transport,
            metrics.clone(),
        );
        let outbox = OutboxManager::new(storage, options.outbox.clone(), metrics);

        debug!(
            requests = self.requests.len(),
            streams = self.streams.len(),
            events = self.registry.len(),
            request_behaviors = request_behaviors.len(),
            stream_behaviors = self.stream_behaviors.len(),
            cqrs_boundary = self.cqrs_boundary,
            "mediator built"
        );

        Ok(Mediator {
            inner: Arc::new(MediatorInner {
                requests: self.requests,
                streams: self.streams,
                request_behaviors,
                stream_behaviors: self.stream_behaviors.into(),
                dispatcher,
                registry: self.registry,
                outbox,
                options,
            }),
        })
    }
}
